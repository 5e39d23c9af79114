//! Command sender for SOAP charge points

use std::time::Duration;

use async_trait::async_trait;
use cpd_core::{
    Command, CommandSender, Endpoint, FailureReason, OcppVersion, ResponseSlot, SendError,
    TargetResult,
};
use reqwest::header;
use tracing::{debug, warn};
use uuid::Uuid;

use super::envelope::{self, SoapError};
use crate::correlator;

/// POSTs the request envelope to the charge point and records its reply
///
/// The exchange runs inside `send`, which the dispatcher already runs on
/// its own task. `Ok` means the HTTP request went out; the reply or its
/// absence is recorded through the slot.
pub struct SoapSender {
    version: OcppVersion,
    client: reqwest::Client,
}

impl SoapSender {
    pub fn new(version: OcppVersion, timeout: Duration) -> Result<Self, SoapError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { version, client })
    }

    pub fn version(&self) -> OcppVersion {
        self.version
    }
}

#[async_trait]
impl CommandSender for SoapSender {
    async fn send(
        &self,
        command: &Command,
        endpoint: &Endpoint,
        slot: ResponseSlot,
    ) -> Result<(), SendError> {
        let address = endpoint
            .endpoint_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| SendError::NoEndpointAddress(endpoint.charge_box_id.clone()))?;

        let message_id = Uuid::new_v4().to_string();
        let body = envelope::build_request(
            command,
            self.version,
            &endpoint.charge_box_id,
            &message_id,
            address,
        )
        .map_err(|e| SendError::Encode(e.to_string()))?;

        debug!("SoapSender: {} -> {} at {}", command.action(), endpoint.charge_box_id, address);

        let content_type = format!(
            "{}; action=\"{}\"",
            envelope::CONTENT_TYPE,
            envelope::soap_action(command)
        );
        let response = self
            .client
            .post(address)
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let result = match response.text().await {
            Ok(text) => correlator::soap_result(command, self.version, status, &text),
            Err(e) => {
                warn!("SoapSender: reading reply of {} failed: {}", endpoint.charge_box_id, e);
                TargetResult::Failure(FailureReason::Decode(e.to_string()))
            }
        };

        let outcome = slot.record(result);
        debug!(
            "SoapSender: {} answered task {}: {:?}",
            endpoint.charge_box_id,
            slot.task_id(),
            outcome
        );
        Ok(())
    }
}
