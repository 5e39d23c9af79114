//! # CPD OCPP Adapter
//!
//! OCPP 1.2 / 1.5 / 1.6 transports for the charge point command dispatcher.
//!
//! - JSON charge points (OCPP-J) connect to the central system over
//!   WebSocket; commands are CALLs on that socket.
//! - SOAP charge points (OCPP-S) are called over HTTP at the endpoint
//!   address stored for them.
//!
//! Both register a [`cpd_core::CommandSender`] per enabled
//! (version, transport) pair and turn the replies into canonical results
//! through the [`correlator`].
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use cpd_adapter_ocpp::{CentralSystem, CentralSystemConfig};
//! use cpd_core::InMemoryEndpointRepository;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repository = InMemoryEndpointRepository::load_json("charge_points.json")?;
//!     let central = CentralSystem::builder(CentralSystemConfig::default())
//!         .repository(Arc::new(repository))
//!         .build()?;
//!
//!     let server = central.bind().await?;
//!     tokio::spawn(server.run());
//!
//!     let task = central.service().unlock_connector("CP-001", 1).await?;
//!     println!("{:?}", task.wait().await);
//!     Ok(())
//! }
//! ```

pub mod central_system;
pub mod config;
pub mod correlator;
pub mod json;
pub mod ocpp;
pub mod soap;

pub use central_system::{CentralSystem, CentralSystemBuilder, CentralSystemError};
pub use config::CentralSystemConfig;
pub use json::{CentralSystemServer, JsonSender, SessionRegistry, StationInfo};
pub use soap::{SoapError, SoapSender};

// Re-export key types
pub use ocpp::{Action, Call, CallError, CallResult, ErrorCode, OcppError, OcppMessage};
