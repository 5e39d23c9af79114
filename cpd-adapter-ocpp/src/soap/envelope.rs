//! SOAP 1.2 envelopes for OCPP-S
//!
//! Requests are small and fixed in shape, so they are written out directly.
//! Replies are scanned for either a `Fault` or the `status` element of the
//! response body; nothing else in them matters here.

use std::fmt::Write as _;

use cpd_core::{Command, OcppVersion};
use thiserror::Error;

const SOAP_ENV_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
const WSA_NS: &str = "http://www.w3.org/2005/08/addressing";

/// SOAP content type, the action is appended per request
pub const CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// Errors in SOAP handling
#[derive(Debug, Error)]
pub enum SoapError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Could not build envelope: {0}")]
    Build(#[from] std::fmt::Error),

    #[error("Malformed SOAP reply: {0}")]
    Malformed(String),
}

/// What a charge point answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoapReply {
    /// Response body carrying a `status` value
    Status(String),
    /// SOAP fault
    Fault { code: String, reason: String },
}

/// Charge point service namespace of a version
pub fn namespace(version: OcppVersion) -> &'static str {
    match version {
        OcppVersion::V1_2 => "urn://Ocpp/Cp/2010/08/",
        OcppVersion::V1_5 => "urn://Ocpp/Cp/2012/06/",
        OcppVersion::V1_6 => "urn://Ocpp/Cp/2015/10/",
    }
}

/// `wsa:Action` of a command
pub fn soap_action(command: &Command) -> String {
    format!("/{}", command.action())
}

/// Build the request envelope for one charge point
pub fn build_request(
    command: &Command,
    version: OcppVersion,
    charge_box_id: &str,
    message_id: &str,
    to: &str,
) -> Result<String, SoapError> {
    let mut xml = String::with_capacity(768);

    write!(
        xml,
        r#"<?xml version="1.0" encoding="UTF-8"?><soap:Envelope xmlns:soap="{}" xmlns:wsa="{}" xmlns:cp="{}">"#,
        SOAP_ENV_NS,
        WSA_NS,
        namespace(version)
    )?;
    write!(
        xml,
        "<soap:Header><cp:chargeBoxIdentity>{}</cp:chargeBoxIdentity><wsa:Action>{}</wsa:Action><wsa:MessageID>urn:uuid:{}</wsa:MessageID><wsa:To>{}</wsa:To></soap:Header>",
        escape(charge_box_id),
        soap_action(command),
        escape(message_id),
        escape(to)
    )?;

    xml.push_str("<soap:Body>");
    match command {
        Command::UnlockConnector { connector_id } => {
            write!(
                xml,
                "<cp:unlockConnectorRequest><cp:connectorId>{}</cp:connectorId></cp:unlockConnectorRequest>",
                connector_id
            )?;
        }
        Command::RemoteStart { connector_id, id_tag } => {
            let connector = format!("<cp:connectorId>{}</cp:connectorId>", connector_id);
            let tag = format!("<cp:idTag>{}</cp:idTag>", escape(id_tag));
            // 1.6 moved connectorId in front of idTag
            let (first, second) = if version >= OcppVersion::V1_6 {
                (connector, tag)
            } else {
                (tag, connector)
            };
            write!(
                xml,
                "<cp:remoteStartTransactionRequest>{}{}</cp:remoteStartTransactionRequest>",
                first, second
            )?;
        }
        Command::RemoteStop { transaction_id } => {
            write!(
                xml,
                "<cp:remoteStopTransactionRequest><cp:transactionId>{}</cp:transactionId></cp:remoteStopTransactionRequest>",
                transaction_id
            )?;
        }
    }
    xml.push_str("</soap:Body></soap:Envelope>");

    Ok(xml)
}

/// Extract the fault or status of a reply body
pub fn parse_response(body: &str) -> Result<SoapReply, SoapError> {
    if !has_element(body, "Envelope") {
        return Err(SoapError::Malformed("no SOAP envelope".into()));
    }

    if has_element(body, "Fault") {
        // SOAP 1.2 first, 1.1 names as fallback
        let code = element_text(body, "Value")
            .or_else(|| element_text(body, "faultcode"))
            .unwrap_or_default();
        let reason = element_text(body, "Text")
            .or_else(|| element_text(body, "faultstring"))
            .unwrap_or_default();
        return Ok(SoapReply::Fault { code, reason });
    }

    element_text(body, "status")
        .filter(|s| !s.is_empty())
        .map(SoapReply::Status)
        .ok_or_else(|| SoapError::Malformed("no status element".into()))
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Byte offset just past the first opening tag with this local name
fn find_open_tag(xml: &str, local_name: &str) -> Option<usize> {
    let mut rest = xml;
    let mut offset = 0;

    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let end = after.find('>')?;
        let tag = &after[..end];

        let name = tag
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("");
        let local = name.rsplit(':').next().unwrap_or(name);

        let is_open = !tag.starts_with('/') && !tag.starts_with('?') && !tag.starts_with('!');
        if is_open && local == local_name {
            return Some(offset + start + 1 + end + 1);
        }

        offset += start + 1 + end + 1;
        rest = &after[end + 1..];
    }
    None
}

fn has_element(xml: &str, local_name: &str) -> bool {
    find_open_tag(xml, local_name).is_some()
}

/// Trimmed text content of the first element with this local name
fn element_text(xml: &str, local_name: &str) -> Option<String> {
    let content_start = find_open_tag(xml, local_name)?;
    let content = &xml[content_start..];
    let end = content.find('<').unwrap_or(content.len());
    Some(unescape(content[..end].trim()))
}
