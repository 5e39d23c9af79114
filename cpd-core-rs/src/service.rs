//! Operator-facing charge point service
//!
//! The calls an HTTP or console front end makes. Single charge point calls
//! fail synchronously when the charge point is unknown or its protocol is
//! not usable; group calls record such problems per target instead.

use std::sync::Arc;

use tracing::info;

use crate::dispatcher::CommandDispatcher;
use crate::error::DispatchError;
use crate::protocol::ProtocolFamily;
use crate::selector::{EndpointSelector, TargetSelection};
use crate::store::TaskStore;
use crate::task::{TaskHandle, TaskId, TaskSnapshot};
use crate::types::{Command, Endpoint};

/// Entry point for operator commands
#[derive(Clone)]
pub struct ChargePointService {
    selector: EndpointSelector,
    dispatcher: CommandDispatcher,
}

impl ChargePointService {
    pub fn new(selector: EndpointSelector, dispatcher: CommandDispatcher) -> Self {
        Self { selector, dispatcher }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn tasks(&self) -> &Arc<TaskStore> {
        self.dispatcher.tasks()
    }

    pub async fn unlock_connector(
        &self,
        charge_box_id: &str,
        connector_id: u32,
    ) -> Result<TaskHandle, DispatchError> {
        self.send_to_one(charge_box_id, Command::UnlockConnector { connector_id })
            .await
    }

    pub async fn start_transaction(
        &self,
        charge_box_id: &str,
        connector_id: u32,
        id_tag: &str,
    ) -> Result<TaskHandle, DispatchError> {
        self.send_to_one(
            charge_box_id,
            Command::RemoteStart {
                connector_id,
                id_tag: id_tag.to_string(),
            },
        )
        .await
    }

    pub async fn stop_transaction(
        &self,
        charge_box_id: &str,
        transaction_id: i32,
    ) -> Result<TaskHandle, DispatchError> {
        self.send_to_one(charge_box_id, Command::RemoteStop { transaction_id })
            .await
    }

    /// Send a command to every charge point of a protocol family
    pub async fn broadcast(
        &self,
        command: Command,
        family: ProtocolFamily,
    ) -> Result<TaskHandle, DispatchError> {
        command.validate()?;
        let targets = self.selector.select(&TargetSelection::Group(family)).await?;
        info!("Service: {} to {} ({} charge points)", command, family, targets.len());
        self.dispatcher.dispatch(command, targets)
    }

    pub fn task_status(&self, task_id: TaskId) -> Result<TaskSnapshot, DispatchError> {
        self.tasks()
            .snapshot(task_id)
            .ok_or(DispatchError::TaskNotFound(task_id))
    }

    pub fn task(&self, task_id: TaskId) -> Result<TaskHandle, DispatchError> {
        self.tasks()
            .get(task_id)
            .ok_or(DispatchError::TaskNotFound(task_id))
    }

    /// Cancel a task; returns how many targets were still pending
    pub fn cancel_task(&self, task_id: TaskId) -> Result<usize, DispatchError> {
        Ok(self.task(task_id)?.cancel())
    }

    pub fn list_tasks(&self) -> Vec<TaskSnapshot> {
        self.tasks().list()
    }

    async fn send_to_one(
        &self,
        charge_box_id: &str,
        command: Command,
    ) -> Result<TaskHandle, DispatchError> {
        command.validate()?;
        let endpoint = self.selector.single(charge_box_id).await?;
        self.check_supported(&endpoint)?;

        info!("Service: {} to {}", command, charge_box_id);
        self.dispatcher.dispatch(command, vec![endpoint])
    }

    fn check_supported(&self, endpoint: &Endpoint) -> Result<(), DispatchError> {
        self.dispatcher.registry().resolve(endpoint).map(|_| ())
    }
}
