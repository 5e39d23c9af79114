//! OCPP 1.x message types
//!
//! Only what the central system needs to issue operator commands and to
//! answer the few calls a charge point makes on its own:
//! - UnlockConnector
//! - RemoteStartTransaction / RemoteStopTransaction
//! - Heartbeat

use chrono::{DateTime, Utc};
use cpd_core::{Command, OcppVersion, ResponseCode};
use serde::{Deserialize, Serialize};

// ============================================================================
// Enumerations
// ============================================================================

/// UnlockConnector result (`NotSupported` exists since 1.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnlockStatus {
    Unlocked,
    UnlockFailed,
    NotSupported,
}

/// RemoteStartTransaction / RemoteStopTransaction result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteStartStopStatus {
    Accepted,
    Rejected,
}

impl From<UnlockStatus> for ResponseCode {
    fn from(status: UnlockStatus) -> Self {
        match status {
            UnlockStatus::Unlocked => ResponseCode::Unlocked,
            UnlockStatus::UnlockFailed => ResponseCode::UnlockFailed,
            UnlockStatus::NotSupported => ResponseCode::NotSupported,
        }
    }
}

impl From<RemoteStartStopStatus> for ResponseCode {
    fn from(status: RemoteStartStopStatus) -> Self {
        match status {
            RemoteStartStopStatus::Accepted => ResponseCode::Accepted,
            RemoteStartStopStatus::Rejected => ResponseCode::Rejected,
        }
    }
}

// ============================================================================
// Request Messages (CS -> CP)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockConnectorRequest {
    pub connector_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStartTransactionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<u32>,
    pub id_tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStopTransactionRequest {
    pub transaction_id: i32,
}

// ============================================================================
// Response Messages (CP -> CS)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockConnectorResponse {
    pub status: UnlockStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStartTransactionResponse {
    pub status: RemoteStartStopStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStopTransactionResponse {
    pub status: RemoteStartStopStatus,
}

// ============================================================================
// Charge point initiated
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub current_time: DateTime<Utc>,
}

// ============================================================================
// Command mapping
// ============================================================================

/// Request payload for a command, as a JSON value
pub fn request_payload(command: &Command) -> Result<serde_json::Value, serde_json::Error> {
    match command {
        Command::UnlockConnector { connector_id } => {
            serde_json::to_value(UnlockConnectorRequest {
                connector_id: *connector_id,
            })
        }
        Command::RemoteStart { connector_id, id_tag } => {
            serde_json::to_value(RemoteStartTransactionRequest {
                connector_id: Some(*connector_id),
                id_tag: id_tag.clone(),
            })
        }
        Command::RemoteStop { transaction_id } => {
            serde_json::to_value(RemoteStopTransactionRequest {
                transaction_id: *transaction_id,
            })
        }
    }
}

/// Whether a status value is defined for the given version
///
/// `UnlockStatus::NotSupported` was introduced with 1.6; older charge points
/// sending it are answering outside their protocol.
pub fn unlock_status_allowed(status: UnlockStatus, version: OcppVersion) -> bool {
    !(status == UnlockStatus::NotSupported && version < OcppVersion::V1_6)
}
