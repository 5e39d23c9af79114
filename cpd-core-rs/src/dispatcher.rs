//! Command dispatcher
//!
//! Creates a task for a command and its targets, fires one send per target
//! on its own tokio task and hands the task back without waiting for any
//! charge point. Per-target problems (unknown protocol, send rejected) end
//! up in that target's result; only an empty target list fails the call.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::error::{DispatchError, FailureReason};
use crate::registry::SenderRegistry;
use crate::store::TaskStore;
use crate::task::{ResponseSlot, TaskHandle};
use crate::types::{Command, Endpoint, ResponseRecord, TargetResult};

/// Everything the dispatcher needs, passed in explicitly
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub registry: Arc<SenderRegistry>,
    pub tasks: Arc<TaskStore>,
    pub config: DispatchConfig,
}

impl DispatchContext {
    pub fn new(registry: SenderRegistry, config: DispatchConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            tasks: Arc::new(TaskStore::new()),
            config,
        }
    }
}

/// Orchestrates one command invocation
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    ctx: DispatchContext,
}

impl CommandDispatcher {
    pub fn new(ctx: DispatchContext) -> Self {
        Self { ctx }
    }

    pub fn registry(&self) -> &SenderRegistry {
        &self.ctx.registry
    }

    pub fn tasks(&self) -> &Arc<TaskStore> {
        &self.ctx.tasks
    }

    /// Dispatch with the configured default timeout
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(
        &self,
        command: Command,
        targets: Vec<Endpoint>,
    ) -> Result<TaskHandle, DispatchError> {
        self.dispatch_with_timeout(command, targets, self.ctx.config.default_timeout)
    }

    pub fn dispatch_with_timeout(
        &self,
        command: Command,
        targets: Vec<Endpoint>,
        timeout: Duration,
    ) -> Result<TaskHandle, DispatchError> {
        if targets.is_empty() {
            return Err(DispatchError::NoTargets);
        }
        command.validate()?;

        let mut seen = HashSet::new();
        let targets: Vec<Endpoint> = targets
            .into_iter()
            .filter(|t| seen.insert(t.charge_box_id.clone()))
            .collect();

        // Resolve senders up front; a target without one never reaches the network
        let mut sends = Vec::with_capacity(targets.len());
        let mut unsupported = Vec::new();
        for endpoint in &targets {
            match self.ctx.registry.resolve(endpoint) {
                Ok(sender) => sends.push((endpoint.clone(), sender)),
                Err(e) => {
                    warn!(
                        "Dispatcher: {} skipped, protocol {:?} not usable",
                        endpoint.charge_box_id, endpoint.ocpp_protocol
                    );
                    unsupported.push((endpoint.charge_box_id.clone(), e));
                }
            }
        }

        let task = self.ctx.tasks.create(command, targets, timeout);
        for (charge_box_id, e) in unsupported {
            let reason = match e {
                DispatchError::UnsupportedProtocol(value) => FailureReason::UnsupportedProtocol(value),
                other => FailureReason::UnsupportedProtocol(other.to_string()),
            };
            task.apply(ResponseRecord::new(charge_box_id, TargetResult::Failure(reason)));
        }

        info!(
            "Dispatcher: task {} {} -> {} target(s), {} sendable",
            task.id(),
            task.command(),
            task.targets().len(),
            sends.len()
        );

        for (endpoint, sender) in sends {
            let slot = ResponseSlot::new(Arc::clone(&task), endpoint.charge_box_id.clone());
            let command = task.command().clone();

            tokio::spawn(async move {
                match sender.send(&command, &endpoint, slot.clone()).await {
                    Ok(()) => {
                        debug!(
                            "Dispatcher: task {} handed to transport for {}",
                            slot.task_id(),
                            endpoint.charge_box_id
                        );
                    }
                    Err(e) => {
                        warn!(
                            "Dispatcher: task {} send to {} rejected: {}",
                            slot.task_id(),
                            endpoint.charge_box_id,
                            e
                        );
                        slot.record(TargetResult::Failure(FailureReason::TransportSend(e.to_string())));
                    }
                }
            });
        }

        task.arm_deadline();
        Ok(TaskHandle::new(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SendError;
    use crate::protocol::{OcppProtocol, OcppTransport, OcppVersion};
    use crate::registry::CommandSender;
    use crate::task::TaskStatus;
    use crate::types::ResponseCode;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers after a delay, or never when `delay` is `None`
    struct ScriptedSender {
        delay: Option<Duration>,
        code: ResponseCode,
        sends: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CommandSender for ScriptedSender {
        async fn send(
            &self,
            _command: &Command,
            _endpoint: &Endpoint,
            slot: ResponseSlot,
        ) -> Result<(), SendError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                let code = self.code;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    slot.record(TargetResult::Success(code));
                });
            }
            Ok(())
        }
    }

    struct RejectingSender;

    #[async_trait]
    impl CommandSender for RejectingSender {
        async fn send(&self, _: &Command, endpoint: &Endpoint, _: ResponseSlot) -> Result<(), SendError> {
            Err(SendError::NotConnected(endpoint.charge_box_id.clone()))
        }
    }

    fn protocol(v: OcppVersion, t: OcppTransport) -> OcppProtocol {
        OcppProtocol::new(v, t)
    }

    fn dispatcher(registry: SenderRegistry) -> CommandDispatcher {
        CommandDispatcher::new(DispatchContext::new(registry, DispatchConfig::default()))
    }

    #[tokio::test]
    async fn test_empty_targets_create_no_task() {
        let d = dispatcher(SenderRegistry::default());
        let err = d
            .dispatch(Command::UnlockConnector { connector_id: 1 }, Vec::new())
            .unwrap_err();

        assert!(matches!(err, DispatchError::NoTargets));
        assert!(d.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_accepted_and_silent_targets() {
        let sends = Arc::new(AtomicUsize::new(0));
        let registry = SenderRegistry::builder()
            .register(
                protocol(OcppVersion::V1_2, OcppTransport::Soap),
                Arc::new(ScriptedSender {
                    delay: Some(Duration::from_millis(50)),
                    code: ResponseCode::Accepted,
                    sends: sends.clone(),
                }),
            )
            .register(
                protocol(OcppVersion::V1_5, OcppTransport::Json),
                Arc::new(ScriptedSender {
                    delay: None,
                    code: ResponseCode::Accepted,
                    sends: sends.clone(),
                }),
            )
            .build();
        let d = dispatcher(registry);

        let handle = d
            .dispatch_with_timeout(
                Command::UnlockConnector { connector_id: 1 },
                vec![
                    Endpoint::new("CP-A", "ocpp1.2S").with_address("http://cp-a/"),
                    Endpoint::new("CP-B", "ocpp1.5J"),
                ],
                Duration::from_millis(200),
            )
            .unwrap();
        assert_eq!(handle.status(), TaskStatus::Open);

        let snap = tokio::time::timeout(Duration::from_secs(2), handle.wait())
            .await
            .unwrap();
        assert_eq!(snap.status, TaskStatus::Completed);
        assert_eq!(snap.results.len(), 2);
        assert_eq!(
            snap.result_of("CP-A"),
            Some(&TargetResult::Success(ResponseCode::Accepted))
        );
        assert_eq!(snap.result_of("CP-B"), Some(&TargetResult::Timeout));
        assert_eq!(sends.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_descriptor_completes_without_sending() {
        let sends = Arc::new(AtomicUsize::new(0));
        let registry = SenderRegistry::builder()
            .register(
                protocol(OcppVersion::V1_6, OcppTransport::Json),
                Arc::new(ScriptedSender {
                    delay: Some(Duration::from_millis(1)),
                    code: ResponseCode::Accepted,
                    sends: sends.clone(),
                }),
            )
            .build();
        let d = dispatcher(registry);

        let handle = d
            .dispatch(
                Command::RemoteStop { transaction_id: 42 },
                vec![Endpoint::new("CP-X", "ocpp9.9Q")],
            )
            .unwrap();

        let snap = handle.snapshot();
        assert_eq!(snap.status, TaskStatus::Completed);
        assert_eq!(
            snap.result_of("CP-X"),
            Some(&TargetResult::Failure(FailureReason::UnsupportedProtocol(
                "ocpp9.9Q".into()
            )))
        );
        tokio::task::yield_now().await;
        assert_eq!(sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unregistered_pair_fails_only_that_target() {
        let sends = Arc::new(AtomicUsize::new(0));
        let registry = SenderRegistry::builder()
            .register(
                protocol(OcppVersion::V1_6, OcppTransport::Json),
                Arc::new(ScriptedSender {
                    delay: Some(Duration::from_millis(5)),
                    code: ResponseCode::Accepted,
                    sends: sends.clone(),
                }),
            )
            .build();
        let d = dispatcher(registry);

        let handle = d
            .dispatch(
                Command::RemoteStart {
                    connector_id: 1,
                    id_tag: "TAG1".into(),
                },
                vec![
                    Endpoint::new("CP-A", "ocpp1.6J"),
                    Endpoint::new("CP-B", "ocpp1.2J"),
                ],
            )
            .unwrap();

        let snap = tokio::time::timeout(Duration::from_secs(2), handle.wait())
            .await
            .unwrap();
        assert_eq!(
            snap.result_of("CP-A"),
            Some(&TargetResult::Success(ResponseCode::Accepted))
        );
        assert!(matches!(
            snap.result_of("CP-B"),
            Some(TargetResult::Failure(FailureReason::UnsupportedProtocol(_)))
        ));
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_send_is_terminal_failure() {
        let registry = SenderRegistry::builder()
            .register(
                protocol(OcppVersion::V1_6, OcppTransport::Json),
                Arc::new(RejectingSender),
            )
            .build();
        let d = dispatcher(registry);

        let handle = d
            .dispatch(
                Command::UnlockConnector { connector_id: 2 },
                vec![Endpoint::new("CP-A", "ocpp1.6J")],
            )
            .unwrap();
        let snap = tokio::time::timeout(Duration::from_secs(2), handle.wait())
            .await
            .unwrap();

        assert!(matches!(
            snap.result_of("CP-A"),
            Some(TargetResult::Failure(FailureReason::TransportSend(_)))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_targets_are_collapsed() {
        let d = dispatcher(SenderRegistry::default());
        let handle = d
            .dispatch(
                Command::UnlockConnector { connector_id: 1 },
                vec![Endpoint::new("CP-A", "bad"), Endpoint::new("CP-A", "bad")],
            )
            .unwrap();
        assert_eq!(handle.snapshot().results.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_command_is_rejected_up_front() {
        let d = dispatcher(SenderRegistry::default());
        let err = d
            .dispatch(
                Command::UnlockConnector { connector_id: 0 },
                vec![Endpoint::new("CP-A", "ocpp1.6J")],
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidCommand(_)));
        assert!(d.tasks().is_empty());
    }
}
