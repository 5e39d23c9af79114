//! Property tests for the task state machine
//!
//! Tests invariants for:
//! - Result count: one entry per target once completed
//! - Duplicate suppression: the first terminal result wins
//! - Order independence: arrival order does not change the final mapping

use std::collections::HashMap;
use std::time::Duration;

use cpd_core::*;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn terminal_result() -> impl Strategy<Value = TargetResult> {
    prop_oneof![
        Just(TargetResult::Success(ResponseCode::Accepted)),
        Just(TargetResult::Success(ResponseCode::Rejected)),
        Just(TargetResult::Success(ResponseCode::Unlocked)),
        Just(TargetResult::Failure(FailureReason::Decode("bad payload".into()))),
        Just(TargetResult::Failure(FailureReason::TransportSend("closed".into()))),
        Just(TargetResult::Timeout),
    ]
}

/// (target count, sequence of (target index, result))
fn record_sequence() -> impl Strategy<Value = (usize, Vec<(usize, TargetResult)>)> {
    (1usize..12).prop_flat_map(|n| {
        (
            Just(n),
            prop::collection::vec((0..n, terminal_result()), 0..40),
        )
    })
}

fn new_task(n: usize) -> Task {
    let targets = (0..n)
        .map(|i| Endpoint::new(format!("CP-{i}"), "ocpp1.6J"))
        .collect();
    Task::new(1, Command::UnlockConnector { connector_id: 1 }, targets, Duration::from_secs(60))
}

fn id(i: usize) -> String {
    format!("CP-{i}")
}

// ============================================================================
// Task Property Tests
// ============================================================================

proptest! {
    /// CORE INVARIANT: a completed task has exactly one terminal result per target
    #[test]
    fn completed_task_has_one_result_per_target((n, records) in record_sequence()) {
        let task = new_task(n);
        for (i, result) in records {
            task.apply(ResponseRecord::new(id(i), result));
        }
        task.expire();

        let snap = task.snapshot();
        prop_assert_eq!(snap.status, TaskStatus::Completed);
        prop_assert_eq!(snap.results.len(), n);
        prop_assert_eq!(snap.pending_count(), 0);
    }

    /// The first terminal result recorded for a target is never overwritten
    #[test]
    fn first_result_wins((n, records) in record_sequence()) {
        let task = new_task(n);
        let mut expected: HashMap<String, TargetResult> = HashMap::new();
        let mut late = 0usize;

        for (i, result) in records {
            if expected.contains_key(&id(i)) {
                late += 1;
            } else {
                expected.insert(id(i), result.clone());
            }
            task.apply(ResponseRecord::new(id(i), result));
        }

        let snap = task.snapshot();
        for (cp, result) in &expected {
            prop_assert_eq!(snap.result_of(cp), Some(result));
        }
        prop_assert_eq!(snap.late_responses, late);
        prop_assert_eq!(snap.status == TaskStatus::Completed, expected.len() == n);
    }

    /// Arrival order of one response per target does not change the outcome
    #[test]
    fn final_mapping_is_order_independent(
        (results, order) in prop::collection::vec(terminal_result(), 1..10)
            .prop_flat_map(|results| {
                let indices: Vec<usize> = (0..results.len()).collect();
                (Just(results), Just(indices).prop_shuffle())
            })
    ) {
        let n = results.len();
        let in_order = new_task(n);
        let shuffled = new_task(n);

        for (i, result) in results.iter().enumerate() {
            in_order.apply(ResponseRecord::new(id(i), result.clone()));
        }
        for &i in &order {
            shuffled.apply(ResponseRecord::new(id(i), results[i].clone()));
        }

        prop_assert_eq!(in_order.status(), TaskStatus::Completed);
        prop_assert_eq!(shuffled.status(), TaskStatus::Completed);
        let a: Vec<_> = in_order.snapshot().results.into_iter().map(|e| e.result).collect();
        let b: Vec<_> = shuffled.snapshot().results.into_iter().map(|e| e.result).collect();
        prop_assert_eq!(a, b);
    }

    /// Cancellation after completion changes nothing
    #[test]
    fn cancel_after_completion_is_noop((n, records) in record_sequence()) {
        let task = new_task(n);
        for (i, result) in records {
            task.apply(ResponseRecord::new(id(i), result));
        }
        task.expire();
        let before = task.snapshot().results;

        prop_assert_eq!(task.cancel(), 0);
        prop_assert_eq!(task.snapshot().results, before);
    }
}
