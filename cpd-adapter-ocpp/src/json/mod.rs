//! OCPP-J transport
//!
//! JSON charge points keep a WebSocket open to the central system. Commands
//! go out as CALLs over that socket and the replies come back on it.

pub mod sender;
pub mod server;
pub mod session;

pub use sender::JsonSender;
pub use server::CentralSystemServer;
pub use session::{PendingCall, SessionRegistry, StationInfo};
