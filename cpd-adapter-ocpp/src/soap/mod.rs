//! OCPP-S transport
//!
//! The central system reaches SOAP charge points by POSTing a SOAP 1.2
//! envelope to the endpoint address stored for the charge box.

pub mod envelope;
pub mod sender;

pub use envelope::{SoapError, SoapReply};
pub use sender::SoapSender;
