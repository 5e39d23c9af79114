//! Configuration for the central system
//!
//! Combines the WebSocket listener, the enabled OCPP protocols, SOAP client
//! settings and the dispatcher settings.

use std::net::SocketAddr;
use std::time::Duration;

use cpd_core::{DispatchConfig, OcppProtocol, OcppTransport, OcppVersion};

/// Complete central system configuration
#[derive(Debug, Clone)]
pub struct CentralSystemConfig {
    /// Address the WebSocket listener binds to
    pub listen_addr: SocketAddr,

    /// Path prefix JSON charge points connect under (`{ws_path}/{chargeBoxId}`)
    pub ws_path: String,

    /// Protocols a sender is registered for
    pub protocols: Vec<OcppProtocol>,

    /// Timeout of one SOAP HTTP exchange
    pub soap_timeout: Duration,

    /// Largest WebSocket message accepted from a charge point
    pub max_message_size: usize,

    /// Dispatcher settings
    pub dispatch: DispatchConfig,
}

impl Default for CentralSystemConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8180)),
            ws_path: "/steve/websocket/CentralSystemService".to_string(),
            protocols: OcppProtocol::all().collect(),
            soap_timeout: Duration::from_secs(30),
            max_message_size: 64 * 1024,
            dispatch: DispatchConfig::default(),
        }
    }
}

impl CentralSystemConfig {
    /// Create config listening on the given address
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    /// Restrict the enabled protocols
    pub fn with_protocols(mut self, protocols: impl IntoIterator<Item = OcppProtocol>) -> Self {
        self.protocols = protocols.into_iter().collect();
        self.protocols.sort();
        self.protocols.dedup();
        self
    }

    /// Disable one protocol
    pub fn without_protocol(mut self, protocol: OcppProtocol) -> Self {
        self.protocols.retain(|p| *p != protocol);
        self
    }

    pub fn with_soap_timeout(mut self, timeout: Duration) -> Self {
        self.soap_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Versions JSON charge points may negotiate
    pub fn json_versions(&self) -> Vec<OcppVersion> {
        self.protocols
            .iter()
            .filter(|p| p.transport == OcppTransport::Json)
            .map(|p| p.version)
            .collect()
    }
}
