//! OCPP protocol descriptors
//!
//! Charge point records store the protocol as a composite value: the version
//! string followed by a one-letter transport suffix, e.g. `ocpp1.5S` or
//! `ocpp1.6J`. This module turns that value into a typed [`OcppProtocol`]
//! which is the key of the sender registry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// OCPP protocol version spoken by a charge point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OcppVersion {
    #[serde(rename = "ocpp1.2")]
    V1_2,
    #[serde(rename = "ocpp1.5")]
    V1_5,
    #[serde(rename = "ocpp1.6")]
    V1_6,
}

impl OcppVersion {
    pub const ALL: [OcppVersion; 3] = [OcppVersion::V1_2, OcppVersion::V1_5, OcppVersion::V1_6];

    /// Version string as stored and as used for the WebSocket subprotocol
    pub fn value(&self) -> &'static str {
        match self {
            OcppVersion::V1_2 => "ocpp1.2",
            OcppVersion::V1_5 => "ocpp1.5",
            OcppVersion::V1_6 => "ocpp1.6",
        }
    }
}

impl fmt::Display for OcppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

impl FromStr for OcppVersion {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OcppVersion::ALL
            .into_iter()
            .find(|v| v.value() == s)
            .ok_or_else(|| DispatchError::UnsupportedProtocol(s.to_string()))
    }
}

/// Wire transport used to reach a charge point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OcppTransport {
    /// SOAP over HTTP, the central system calls the charge point's endpoint address
    Soap,
    /// JSON-RPC over a WebSocket opened by the charge point
    Json,
}

impl OcppTransport {
    pub const ALL: [OcppTransport; 2] = [OcppTransport::Soap, OcppTransport::Json];

    /// Suffix letter in the composite descriptor
    pub fn suffix(&self) -> char {
        match self {
            OcppTransport::Soap => 'S',
            OcppTransport::Json => 'J',
        }
    }

    fn from_suffix(c: char) -> Option<Self> {
        OcppTransport::ALL.into_iter().find(|t| t.suffix() == c)
    }
}

impl fmt::Display for OcppTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcppTransport::Soap => f.write_str("SOAP"),
            OcppTransport::Json => f.write_str("JSON"),
        }
    }
}

impl FromStr for OcppTransport {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "S" | "SOAP" => Ok(OcppTransport::Soap),
            "J" | "JSON" => Ok(OcppTransport::Json),
            _ => Err(DispatchError::UnsupportedProtocol(s.to_string())),
        }
    }
}

/// Typed (version, transport) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OcppProtocol {
    pub version: OcppVersion,
    pub transport: OcppTransport,
}

impl OcppProtocol {
    pub const fn new(version: OcppVersion, transport: OcppTransport) -> Self {
        Self { version, transport }
    }

    /// Every supported combination, SOAP first
    pub fn all() -> impl Iterator<Item = OcppProtocol> {
        OcppVersion::ALL.into_iter().flat_map(|version| {
            OcppTransport::ALL
                .into_iter()
                .map(move |transport| OcppProtocol::new(version, transport))
        })
    }

    /// Composite value as stored in the charge point record
    pub fn composite_value(&self) -> String {
        format!("{}{}", self.version.value(), self.transport.suffix())
    }

    /// Resolve a stored composite value
    pub fn from_composite_value(value: &str) -> Result<Self, DispatchError> {
        let unsupported = || DispatchError::UnsupportedProtocol(value.to_string());

        let trimmed = value.trim();
        let suffix = trimmed.chars().last().ok_or_else(unsupported)?;
        let transport = OcppTransport::from_suffix(suffix).ok_or_else(unsupported)?;
        let version_str = &trimmed[..trimmed.len() - suffix.len_utf8()];
        let version = version_str.parse::<OcppVersion>().map_err(|_| unsupported())?;

        Ok(Self::new(version, transport))
    }
}

impl fmt::Display for OcppProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.version.value(), self.transport.suffix())
    }
}

impl FromStr for OcppProtocol {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_composite_value(s)
    }
}

impl Serialize for OcppProtocol {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OcppProtocol {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Filter used for group targeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "by", content = "value")]
pub enum ProtocolFamily {
    /// One exact (version, transport) pair
    Exact(OcppProtocol),
    /// Any transport of this version
    Version(OcppVersion),
    /// Any version over this transport
    Transport(OcppTransport),
}

impl ProtocolFamily {
    pub fn matches(&self, protocol: &OcppProtocol) -> bool {
        match self {
            ProtocolFamily::Exact(p) => p == protocol,
            ProtocolFamily::Version(v) => protocol.version == *v,
            ProtocolFamily::Transport(t) => protocol.transport == *t,
        }
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolFamily::Exact(p) => write!(f, "{}", p),
            ProtocolFamily::Version(v) => write!(f, "{}", v),
            ProtocolFamily::Transport(t) => write!(f, "{}", t),
        }
    }
}

impl FromStr for ProtocolFamily {
    type Err = DispatchError;

    /// Accepts `ocpp1.6J`, `ocpp1.6`, `S`/`SOAP` or `J`/`JSON`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(protocol) = OcppProtocol::from_composite_value(s) {
            return Ok(ProtocolFamily::Exact(protocol));
        }
        if let Ok(version) = s.parse::<OcppVersion>() {
            return Ok(ProtocolFamily::Version(version));
        }
        s.parse::<OcppTransport>().map(ProtocolFamily::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_composite_values() {
        let p: OcppProtocol = "ocpp1.5S".parse().unwrap();
        assert_eq!(p.version, OcppVersion::V1_5);
        assert_eq!(p.transport, OcppTransport::Soap);

        let p: OcppProtocol = "ocpp1.6J".parse().unwrap();
        assert_eq!(p, OcppProtocol::new(OcppVersion::V1_6, OcppTransport::Json));
        assert_eq!(p.composite_value(), "ocpp1.6J");
    }

    #[test]
    fn test_reject_malformed_values() {
        for bad in ["", "ocpp1.6", "ocpp1.6X", "ocpp2.0.1J", "1.5S", "J", "ocpp1.5Ş"] {
            let err = OcppProtocol::from_composite_value(bad).unwrap_err();
            assert!(
                matches!(err, DispatchError::UnsupportedProtocol(ref v) if v == bad),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_all_protocols_round_trip_through_display() {
        let all: Vec<_> = OcppProtocol::all().collect();
        assert_eq!(all.len(), 6);
        for p in all {
            assert_eq!(p.to_string().parse::<OcppProtocol>().unwrap(), p);
        }
    }

    #[test]
    fn test_family_matching() {
        let soap15 = OcppProtocol::new(OcppVersion::V1_5, OcppTransport::Soap);
        let json16 = OcppProtocol::new(OcppVersion::V1_6, OcppTransport::Json);

        let family: ProtocolFamily = "ocpp1.5".parse().unwrap();
        assert!(family.matches(&soap15));
        assert!(!family.matches(&json16));

        let family: ProtocolFamily = "JSON".parse().unwrap();
        assert_eq!(family, ProtocolFamily::Transport(OcppTransport::Json));
        assert!(family.matches(&json16));

        let family: ProtocolFamily = "ocpp1.5S".parse().unwrap();
        assert!(family.matches(&soap15));
        assert!(!family.matches(&OcppProtocol::new(OcppVersion::V1_5, OcppTransport::Json)));

        assert!("ocpp3".parse::<ProtocolFamily>().is_err());
    }
}
