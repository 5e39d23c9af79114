//! In-memory charge point repository
//!
//! Stand-in for the charge box table. Records can be loaded from a JSON
//! array of [`Endpoint`]s:
//!
//! ```json
//! [
//!   { "chargeBoxId": "CP-A", "ocppProtocol": "ocpp1.6J" },
//!   { "chargeBoxId": "CP-B", "ocppProtocol": "ocpp1.5S", "endpointAddress": "http://10.0.0.7:8080/" }
//! ]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::RepositoryError;
use crate::protocol::{OcppTransport, ProtocolFamily};
use crate::selector::EndpointRepository;
use crate::types::Endpoint;

/// Charge point records kept in memory, ordered by charge box id
#[derive(Debug, Default)]
pub struct InMemoryEndpointRepository {
    endpoints: RwLock<BTreeMap<String, Endpoint>>,
}

impl InMemoryEndpointRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_endpoints(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        let repo = Self::new();
        for endpoint in endpoints {
            repo.upsert(endpoint);
        }
        repo
    }

    /// Load records from a JSON file
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let endpoints: Vec<Endpoint> = serde_json::from_slice(&bytes)?;

        for endpoint in &endpoints {
            if let Err(e) = endpoint.protocol() {
                warn!(
                    "Repository: {} has an unusable protocol ({}), commands to it will fail",
                    endpoint.charge_box_id, e
                );
            }
        }
        info!("Repository: loaded {} charge point(s) from {}", endpoints.len(), path.display());

        Ok(Self::from_endpoints(endpoints))
    }

    /// Insert or replace a record
    pub fn upsert(&self, endpoint: Endpoint) -> Option<Endpoint> {
        self.endpoints
            .write()
            .insert(endpoint.charge_box_id.clone(), endpoint)
    }

    pub fn remove(&self, charge_box_id: &str) -> Option<Endpoint> {
        self.endpoints.write().remove(charge_box_id)
    }

    pub fn all(&self) -> Vec<Endpoint> {
        self.endpoints.read().values().cloned().collect()
    }

    pub fn contains(&self, charge_box_id: &str) -> bool {
        self.endpoints.read().contains_key(charge_box_id)
    }
}

#[async_trait]
impl EndpointRepository for InMemoryEndpointRepository {
    async fn get_endpoint(&self, charge_box_id: &str) -> Result<Option<Endpoint>, RepositoryError> {
        Ok(self.endpoints.read().get(charge_box_id).cloned())
    }

    async fn get_endpoints_by_family(
        &self,
        family: &ProtocolFamily,
    ) -> Result<Vec<Endpoint>, RepositoryError> {
        let endpoints = self.endpoints.read();
        Ok(endpoints
            .values()
            .filter(|e| match e.protocol() {
                // SOAP stations are only reachable with an address
                Ok(p) if p.transport == OcppTransport::Soap && e.endpoint_address.is_none() => false,
                Ok(p) => family.matches(&p),
                Err(_) => false,
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_json_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"chargeBoxId": "CP-A", "ocppProtocol": "ocpp1.6J"}},
                {{"chargeBoxId": "CP-B", "ocppProtocol": "ocpp1.5S", "endpointAddress": "http://cp-b/"}},
                {{"chargeBoxId": "CP-C", "ocppProtocol": "ocpp1.5S"}}
            ]"#
        )
        .unwrap();

        let repo = InMemoryEndpointRepository::load_json(file.path()).unwrap();
        assert_eq!(repo.all().len(), 3);

        let a = repo.get_endpoint("CP-A").await.unwrap().unwrap();
        assert_eq!(a.ocpp_protocol, "ocpp1.6J");

        // CP-C has no address and is left out of SOAP groups
        let soap = repo
            .get_endpoints_by_family(&ProtocolFamily::Transport(OcppTransport::Soap))
            .await
            .unwrap();
        assert_eq!(soap.len(), 1);
        assert_eq!(soap[0].charge_box_id, "CP-B");
    }

    #[test]
    fn test_load_json_rejects_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = InMemoryEndpointRepository::load_json(file.path()).unwrap_err();
        assert!(matches!(err, RepositoryError::Format(_)));
    }

    #[test]
    fn test_upsert_and_remove() {
        let repo = InMemoryEndpointRepository::new();
        assert!(repo.upsert(Endpoint::new("CP-A", "ocpp1.6J")).is_none());
        assert!(repo.upsert(Endpoint::new("CP-A", "ocpp1.5J")).is_some());
        assert!(repo.contains("CP-A"));
        assert!(repo.remove("CP-A").is_some());
        assert!(!repo.contains("CP-A"));
    }
}
