//! OCPP 1.x protocol layer
//!
//! - `types`: request/response payloads of the commands the central system issues
//! - `messages`: OCPP-J framing (CALL, CALLRESULT, CALLERROR)

pub mod messages;
pub mod types;

pub use messages::*;
pub use types::*;
