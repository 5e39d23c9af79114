//! Sender registry
//!
//! Maps a typed [`OcppProtocol`] to the sender that speaks it. The registry
//! is filled once at start-up through [`SenderRegistryBuilder`] and is
//! read-only afterwards, so lookups need no locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DispatchError, SendError};
use crate::protocol::OcppProtocol;
use crate::task::ResponseSlot;
use crate::types::{Command, Endpoint};

/// Capability to deliver a command to one charge point
///
/// `Ok(())` only means the request was handed to the transport. The charge
/// point's answer is recorded later through `slot`, by the sender itself or
/// by the correlator of its transport.
#[async_trait]
pub trait CommandSender: Send + Sync {
    async fn send(
        &self,
        command: &Command,
        endpoint: &Endpoint,
        slot: ResponseSlot,
    ) -> Result<(), SendError>;
}

/// Immutable lookup table of senders
#[derive(Clone, Default)]
pub struct SenderRegistry {
    senders: HashMap<OcppProtocol, Arc<dyn CommandSender>>,
}

impl SenderRegistry {
    pub fn builder() -> SenderRegistryBuilder {
        SenderRegistryBuilder::default()
    }

    pub fn get(&self, protocol: &OcppProtocol) -> Result<Arc<dyn CommandSender>, DispatchError> {
        self.senders
            .get(protocol)
            .cloned()
            .ok_or_else(|| DispatchError::UnsupportedProtocol(protocol.composite_value()))
    }

    /// Resolve an endpoint's stored descriptor to its sender
    pub fn resolve(&self, endpoint: &Endpoint) -> Result<Arc<dyn CommandSender>, DispatchError> {
        let protocol = endpoint.protocol()?;
        self.get(&protocol)
    }

    pub fn supports(&self, protocol: &OcppProtocol) -> bool {
        self.senders.contains_key(protocol)
    }

    /// Registered protocols, sorted
    pub fn protocols(&self) -> Vec<OcppProtocol> {
        let mut protocols: Vec<_> = self.senders.keys().copied().collect();
        protocols.sort();
        protocols
    }
}

impl fmt::Debug for SenderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderRegistry")
            .field("protocols", &self.protocols())
            .finish()
    }
}

/// Builder for [`SenderRegistry`]
#[derive(Default)]
pub struct SenderRegistryBuilder {
    senders: HashMap<OcppProtocol, Arc<dyn CommandSender>>,
}

impl SenderRegistryBuilder {
    /// Register a sender, replacing any earlier one for the same protocol
    pub fn register(mut self, protocol: OcppProtocol, sender: Arc<dyn CommandSender>) -> Self {
        self.senders.insert(protocol, sender);
        self
    }

    pub fn build(self) -> SenderRegistry {
        SenderRegistry {
            senders: self.senders,
        }
    }
}
