//! CPD Core Library
//!
//! Command dispatch and response correlation for an OCPP central system.
//! Resolves which protocol each charge point speaks, fans a command out to
//! one or many charge points without blocking, and collects per-target
//! outcomes into a task with deadline and cancellation semantics.
//!
//! ```text
//! caller ──► ChargePointService ──► EndpointSelector ──► EndpointRepository
//!                    │
//!                    ▼
//!            CommandDispatcher ──► SenderRegistry[(version, transport)]
//!                    │                      │ send() per target, concurrently
//!                    ▼                      ▼
//!                  Task ◄──── ResponseSlot ◄── correlators / watchdog
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod repository;
pub mod selector;
pub mod service;
pub mod store;
pub mod task;
pub mod types;

pub use config::DispatchConfig;
pub use dispatcher::{CommandDispatcher, DispatchContext};
pub use error::{DispatchError, FailureReason, RepositoryError, SendError};
pub use protocol::{OcppProtocol, OcppTransport, OcppVersion, ProtocolFamily};
pub use registry::{CommandSender, SenderRegistry, SenderRegistryBuilder};
pub use repository::InMemoryEndpointRepository;
pub use selector::{EndpointRepository, EndpointSelector, TargetSelection};
pub use service::ChargePointService;
pub use store::TaskStore;
pub use task::{ApplyOutcome, ResponseSlot, Task, TaskHandle, TaskId, TaskSnapshot, TaskStatus};
pub use types::*;
