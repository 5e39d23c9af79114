//! Core types for command dispatch

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, FailureReason};
use crate::protocol::OcppProtocol;

/// Unique identifier of a charge point (the OCPP `chargeBoxIdentity`)
pub type ChargeBoxId = String;

/// Maximum length of an OCPP `IdToken`
pub const ID_TAG_MAX_LEN: usize = 20;

/// Charge point as seen by the dispatcher
///
/// This is a snapshot. A task keeps its own copy, so later edits of the
/// stored record do not affect commands already in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub charge_box_id: ChargeBoxId,
    /// SOAP endpoint address; JSON charge points connect to us instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_address: Option<String>,
    /// Stored composite protocol value, e.g. `ocpp1.6J`
    pub ocpp_protocol: String,
}

impl Endpoint {
    pub fn new(
        charge_box_id: impl Into<ChargeBoxId>,
        ocpp_protocol: impl Into<String>,
    ) -> Self {
        Self {
            charge_box_id: charge_box_id.into(),
            endpoint_address: None,
            ocpp_protocol: ocpp_protocol.into(),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.endpoint_address = Some(address.into());
        self
    }

    /// Resolve the stored descriptor
    pub fn protocol(&self) -> Result<OcppProtocol, DispatchError> {
        OcppProtocol::from_composite_value(&self.ocpp_protocol)
    }
}

/// Operator command sent to charge points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    UnlockConnector {
        connector_id: u32,
    },
    RemoteStart {
        connector_id: u32,
        id_tag: String,
    },
    RemoteStop {
        transaction_id: i32,
    },
}

impl Command {
    /// OCPP action name of the request
    pub fn action(&self) -> &'static str {
        match self {
            Command::UnlockConnector { .. } => "UnlockConnector",
            Command::RemoteStart { .. } => "RemoteStartTransaction",
            Command::RemoteStop { .. } => "RemoteStopTransaction",
        }
    }

    /// Check field constraints before anything is dispatched
    pub fn validate(&self) -> Result<(), DispatchError> {
        match self {
            Command::UnlockConnector { connector_id } | Command::RemoteStart { connector_id, .. }
                if *connector_id == 0 =>
            {
                Err(DispatchError::InvalidCommand(format!(
                    "{} needs a connector id greater than 0",
                    self.action()
                )))
            }
            Command::RemoteStart { id_tag, .. } if id_tag.is_empty() => Err(
                DispatchError::InvalidCommand("idTag must not be empty".into()),
            ),
            Command::RemoteStart { id_tag, .. } if id_tag.chars().count() > ID_TAG_MAX_LEN => {
                Err(DispatchError::InvalidCommand(format!(
                    "idTag longer than {} characters",
                    ID_TAG_MAX_LEN
                )))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::UnlockConnector { connector_id } => {
                write!(f, "UnlockConnector(connector={})", connector_id)
            }
            Command::RemoteStart { connector_id, id_tag } => {
                write!(f, "RemoteStart(connector={}, idTag={})", connector_id, id_tag)
            }
            Command::RemoteStop { transaction_id } => {
                write!(f, "RemoteStop(transaction={})", transaction_id)
            }
        }
    }
}

/// Canonical status code reported by a charge point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseCode {
    Accepted,
    Rejected,
    Unlocked,
    UnlockFailed,
    NotSupported,
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Outcome of one target within a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "detail")]
pub enum TargetResult {
    Pending,
    Success(ResponseCode),
    Failure(FailureReason),
    Timeout,
    Cancelled,
}

impl TargetResult {
    pub fn is_pending(&self) -> bool {
        matches!(self, TargetResult::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }
}

impl fmt::Display for TargetResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetResult::Pending => f.write_str("pending"),
            TargetResult::Success(code) => write!(f, "success ({})", code),
            TargetResult::Failure(reason) => write!(f, "failure ({})", reason),
            TargetResult::Timeout => f.write_str("timeout"),
            TargetResult::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// A single correlated response, consumed by the task it belongs to
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub charge_box_id: ChargeBoxId,
    pub result: TargetResult,
    pub received_at: DateTime<Utc>,
}

impl ResponseRecord {
    pub fn new(charge_box_id: impl Into<ChargeBoxId>, result: TargetResult) -> Self {
        Self {
            charge_box_id: charge_box_id.into(),
            result,
            received_at: Utc::now(),
        }
    }
}
