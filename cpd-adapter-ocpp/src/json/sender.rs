//! Command sender for JSON charge points

use std::sync::Arc;

use async_trait::async_trait;
use cpd_core::{Command, CommandSender, Endpoint, OcppVersion, ResponseSlot, SendError};
use tracing::debug;

use super::session::SessionRegistry;
use crate::ocpp::Call;

/// Sends commands over the charge point's open WebSocket
///
/// One instance is registered per enabled JSON version; they all share the
/// same session registry. The reply is decoded with the version the
/// charge point negotiated when it connected.
pub struct JsonSender {
    version: OcppVersion,
    sessions: Arc<SessionRegistry>,
}

impl JsonSender {
    pub fn new(version: OcppVersion, sessions: Arc<SessionRegistry>) -> Self {
        Self { version, sessions }
    }
}

#[async_trait]
impl CommandSender for JsonSender {
    async fn send(
        &self,
        command: &Command,
        endpoint: &Endpoint,
        slot: ResponseSlot,
    ) -> Result<(), SendError> {
        let call = Call::for_command(command).map_err(|e| SendError::Encode(e.to_string()))?;

        if let Some(negotiated) = self.sessions.version_of(&endpoint.charge_box_id) {
            if negotiated != self.version {
                debug!(
                    "JsonSender: {} is stored as {} but connected with {}",
                    endpoint.charge_box_id, self.version, negotiated
                );
            }
        }

        self.sessions
            .send_call(&endpoint.charge_box_id, call, slot)
            .await
    }
}
