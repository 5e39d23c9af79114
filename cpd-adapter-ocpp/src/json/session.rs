//! Connected JSON charge points and their outstanding calls
//!
//! One entry per connected charge box (the writer half of its socket and
//! the negotiated version) plus every CALL still waiting for its reply,
//! keyed by message id. A reply is only matched against calls sent to the
//! same charge box.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use cpd_core::{ChargeBoxId, FailureReason, OcppVersion, ResponseSlot, SendError, TargetResult};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ocpp::{Action, Call, OcppMessage};

struct Station {
    session_id: u64,
    version: OcppVersion,
    outgoing: mpsc::Sender<OcppMessage>,
    connected_at: DateTime<Utc>,
}

/// Public view of a connected charge point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationInfo {
    pub charge_box_id: ChargeBoxId,
    pub version: OcppVersion,
    pub connected_at: DateTime<Utc>,
}

/// A CALL waiting for its CALLRESULT or CALLERROR
#[derive(Debug)]
pub struct PendingCall {
    pub charge_box_id: ChargeBoxId,
    pub session_id: u64,
    pub action: Action,
    pub version: OcppVersion,
    pub slot: ResponseSlot,
}

/// Registry of WebSocket sessions
#[derive(Default)]
pub struct SessionRegistry {
    stations: RwLock<HashMap<ChargeBoxId, Station>>,
    pending: Mutex<HashMap<String, PendingCall>>,
    next_session: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly connected charge point, replacing an older
    /// connection of the same charge box. Returns the session id.
    pub fn attach(
        &self,
        charge_box_id: &str,
        version: OcppVersion,
        outgoing: mpsc::Sender<OcppMessage>,
    ) -> u64 {
        let session_id = self.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = self.stations.write().insert(
            charge_box_id.to_string(),
            Station {
                session_id,
                version,
                outgoing,
                connected_at: Utc::now(),
            },
        );

        if previous.is_some() {
            warn!("Sessions: {} reconnected, replacing previous session", charge_box_id);
        }
        info!("Sessions: {} connected ({}, session {})", charge_box_id, version, session_id);
        session_id
    }

    /// Drop a session and fail every call still waiting on it
    ///
    /// A stale session id (the charge box already reconnected) leaves the
    /// current connection alone. Returns the number of failed calls.
    pub fn detach(&self, charge_box_id: &str, session_id: u64) -> usize {
        {
            let mut stations = self.stations.write();
            if stations
                .get(charge_box_id)
                .is_some_and(|s| s.session_id == session_id)
            {
                stations.remove(charge_box_id);
            }
        }

        let orphaned: Vec<PendingCall> = {
            let mut pending = self.pending.lock();
            let ids: Vec<String> = pending
                .iter()
                .filter(|(_, call)| call.session_id == session_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter().filter_map(|id| pending.remove(&id)).collect()
        };

        for call in &orphaned {
            call.slot.record(TargetResult::Failure(FailureReason::TransportSend(
                "connection closed".into(),
            )));
        }

        info!(
            "Sessions: {} disconnected (session {}, {} pending call(s) failed)",
            charge_box_id,
            session_id,
            orphaned.len()
        );
        orphaned.len()
    }

    /// Send a CALL to a connected charge point and remember it for correlation
    pub async fn send_call(
        &self,
        charge_box_id: &str,
        call: Call,
        slot: ResponseSlot,
    ) -> Result<(), SendError> {
        let (session_id, version, outgoing) = {
            let stations = self.stations.read();
            let station = stations
                .get(charge_box_id)
                .ok_or_else(|| SendError::NotConnected(charge_box_id.to_string()))?;
            (station.session_id, station.version, station.outgoing.clone())
        };

        self.purge_closed();

        let message_id = call.message_id.clone();
        self.pending.lock().insert(
            message_id.clone(),
            PendingCall {
                charge_box_id: charge_box_id.to_string(),
                session_id,
                action: call.action.clone(),
                version,
                slot,
            },
        );

        debug!("Sessions: {} -> {} ({})", call.action, charge_box_id, message_id);
        if outgoing.send(OcppMessage::Call(call)).await.is_err() {
            self.pending.lock().remove(&message_id);
            return Err(SendError::Transport("connection closed".into()));
        }
        Ok(())
    }

    /// Take the call a reply from `charge_box_id` answers
    pub fn take(&self, charge_box_id: &str, message_id: &str) -> Option<PendingCall> {
        let mut pending = self.pending.lock();
        match pending.get(message_id) {
            Some(call) if call.charge_box_id == charge_box_id => pending.remove(message_id),
            Some(call) => {
                warn!(
                    "Sessions: {} answered message {} that was sent to {}",
                    charge_box_id, message_id, call.charge_box_id
                );
                None
            }
            None => None,
        }
    }

    /// Forget calls whose target already has a result (timed out or cancelled)
    pub fn purge_closed(&self) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|_, call| call.slot.is_open());
        before - pending.len()
    }

    pub fn is_connected(&self, charge_box_id: &str) -> bool {
        self.stations.read().contains_key(charge_box_id)
    }

    pub fn version_of(&self, charge_box_id: &str) -> Option<OcppVersion> {
        self.stations.read().get(charge_box_id).map(|s| s.version)
    }

    /// Connected charge points, sorted by id
    pub fn connected(&self) -> Vec<StationInfo> {
        let mut list: Vec<StationInfo> = self
            .stations
            .read()
            .iter()
            .map(|(id, s)| StationInfo {
                charge_box_id: id.clone(),
                version: s.version,
                connected_at: s.connected_at,
            })
            .collect();
        list.sort_by(|a, b| a.charge_box_id.cmp(&b.charge_box_id));
        list
    }

    pub fn pending_calls(&self) -> usize {
        self.pending.lock().len()
    }
}
