//! Central system assembly
//!
//! Wires the repository, the per-protocol senders, the dispatcher and the
//! WebSocket endpoint together.
//!
//! ```text
//!  operator ──► ChargePointService ──► CommandDispatcher
//!                                            │
//!                     ┌──────────────────────┴───────────────┐
//!                     ▼                                      ▼
//!               JsonSender(1.2/1.5/1.6)                SoapSender(1.2/1.5/1.6)
//!                     │ SessionRegistry                      │ HTTP POST
//!                     ▼                                      ▼
//!          CentralSystemServer ◄══ WebSocket ══ CP    SOAP endpoint of CP
//! ```

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use cpd_core::{
    ChargePointService, CommandDispatcher, CommandSender, DispatchContext, EndpointRepository,
    EndpointSelector, InMemoryEndpointRepository, OcppProtocol, OcppTransport, SenderRegistry,
    TaskStore,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::CentralSystemConfig;
use crate::json::{CentralSystemServer, JsonSender, SessionRegistry, StationInfo};
use crate::soap::{SoapError, SoapSender};

/// Errors while assembling or starting the central system
#[derive(Debug, Error)]
pub enum CentralSystemError {
    #[error("SOAP client setup failed: {0}")]
    Soap(#[from] SoapError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A configured central system
pub struct CentralSystem {
    config: Arc<CentralSystemConfig>,
    repository: Arc<dyn EndpointRepository>,
    sessions: Arc<SessionRegistry>,
    service: ChargePointService,
}

impl CentralSystem {
    pub fn builder(config: CentralSystemConfig) -> CentralSystemBuilder {
        CentralSystemBuilder::new(config)
    }

    pub fn config(&self) -> &CentralSystemConfig {
        &self.config
    }

    pub fn service(&self) -> &ChargePointService {
        &self.service
    }

    pub fn tasks(&self) -> &Arc<TaskStore> {
        self.service.tasks()
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn repository(&self) -> &Arc<dyn EndpointRepository> {
        &self.repository
    }

    /// JSON charge points currently connected
    pub fn connected_stations(&self) -> Vec<StationInfo> {
        self.sessions.connected()
    }

    /// Drop completed tasks older than `retention` and pending JSON calls
    /// whose target is no longer waiting; returns both counts
    pub fn prune(&self, retention: Duration) -> (usize, usize) {
        let tasks = self.tasks().prune_completed(retention);
        let calls = self.sessions.purge_closed();
        if calls > 0 {
            debug!("CentralSystem: dropped {} unanswered call(s)", calls);
        }
        (tasks, calls)
    }

    /// Bind the WebSocket listener
    pub async fn bind(&self) -> Result<CentralSystemServer, CentralSystemError> {
        let server = CentralSystemServer::bind(
            self.config.clone(),
            self.sessions.clone(),
            self.repository.clone(),
        )
        .await?;
        Ok(server)
    }
}

/// Builder for [`CentralSystem`]
pub struct CentralSystemBuilder {
    config: CentralSystemConfig,
    repository: Option<Arc<dyn EndpointRepository>>,
    overrides: HashMap<OcppProtocol, Arc<dyn CommandSender>>,
}

impl CentralSystemBuilder {
    pub fn new(config: CentralSystemConfig) -> Self {
        Self {
            config,
            repository: None,
            overrides: HashMap::new(),
        }
    }

    /// Charge point records (defaults to an empty in-memory repository)
    pub fn repository(mut self, repository: Arc<dyn EndpointRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Use a custom sender for one protocol instead of the built-in one
    pub fn sender(mut self, protocol: OcppProtocol, sender: Arc<dyn CommandSender>) -> Self {
        self.overrides.insert(protocol, sender);
        self
    }

    pub fn build(mut self) -> Result<CentralSystem, CentralSystemError> {
        let sessions = Arc::new(SessionRegistry::new());
        let repository = self
            .repository
            .take()
            .unwrap_or_else(|| Arc::new(InMemoryEndpointRepository::new()));

        let mut registry = SenderRegistry::builder();
        for protocol in &self.config.protocols {
            let sender: Arc<dyn CommandSender> = match self.overrides.remove(protocol) {
                Some(custom) => custom,
                None => match protocol.transport {
                    OcppTransport::Json => {
                        Arc::new(JsonSender::new(protocol.version, sessions.clone()))
                    }
                    OcppTransport::Soap => {
                        Arc::new(SoapSender::new(protocol.version, self.config.soap_timeout)?)
                    }
                },
            };
            registry = registry.register(*protocol, sender);
        }
        let registry = registry.build();
        info!("CentralSystem: senders registered for {:?}", registry.protocols());

        let dispatcher = CommandDispatcher::new(DispatchContext::new(
            registry,
            self.config.dispatch.clone(),
        ));
        let service = ChargePointService::new(EndpointSelector::new(repository.clone()), dispatcher);

        Ok(CentralSystem {
            config: Arc::new(self.config),
            repository,
            sessions,
            service,
        })
    }
}
