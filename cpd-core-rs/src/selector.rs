//! Endpoint selection
//!
//! Turns a command target (one charge box, or every charge box of a
//! protocol family) into a non-empty list of endpoint snapshots.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{DispatchError, RepositoryError};
use crate::protocol::ProtocolFamily;
use crate::types::{ChargeBoxId, Endpoint};

/// Read access to stored charge points
#[async_trait]
pub trait EndpointRepository: Send + Sync {
    async fn get_endpoint(&self, charge_box_id: &str) -> Result<Option<Endpoint>, RepositoryError>;

    async fn get_endpoints_by_family(
        &self,
        family: &ProtocolFamily,
    ) -> Result<Vec<Endpoint>, RepositoryError>;
}

/// Target of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelection {
    Single(ChargeBoxId),
    Group(ProtocolFamily),
}

/// Resolves a [`TargetSelection`] against the repository
#[derive(Clone)]
pub struct EndpointSelector {
    repository: Arc<dyn EndpointRepository>,
}

impl EndpointSelector {
    pub fn new(repository: Arc<dyn EndpointRepository>) -> Self {
        Self { repository }
    }

    pub async fn select(&self, selection: &TargetSelection) -> Result<Vec<Endpoint>, DispatchError> {
        match selection {
            TargetSelection::Single(id) => Ok(vec![self.single(id).await?]),
            TargetSelection::Group(family) => self.group(family).await,
        }
    }

    pub async fn single(&self, charge_box_id: &str) -> Result<Endpoint, DispatchError> {
        self.repository
            .get_endpoint(charge_box_id)
            .await?
            .ok_or_else(|| DispatchError::UnknownEndpoint(charge_box_id.to_string()))
    }

    pub async fn group(&self, family: &ProtocolFamily) -> Result<Vec<Endpoint>, DispatchError> {
        let endpoints = self.repository.get_endpoints_by_family(family).await?;
        debug!("Selector: family {} matched {} charge point(s)", family, endpoints.len());

        if endpoints.is_empty() {
            return Err(DispatchError::NoTargets);
        }
        Ok(endpoints)
    }
}
