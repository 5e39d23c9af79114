//! WebSocket endpoint for JSON charge points
//!
//! Charge points connect to `{path_prefix}/{chargeBoxId}` offering one or
//! more `ocpp1.x` subprotocols. The highest enabled version wins. Charge
//! boxes that are not in the repository are closed right after the
//! handshake.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use cpd_core::{EndpointRepository, OcppProtocol, OcppTransport, OcppVersion};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    accept_hdr_async_with_config,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::{header, HeaderValue, StatusCode},
        protocol::{frame::coding::CloseCode, CloseFrame, WebSocketConfig},
        Message,
    },
};
use tracing::{debug, error, info, warn};

use super::session::SessionRegistry;
use crate::config::CentralSystemConfig;
use crate::correlator;
use crate::ocpp::{
    Action, Call, CallError, CallResult, ErrorCode, HeartbeatResponse, OcppMessage,
};

/// Accepts charge point connections and serves them until they drop
pub struct CentralSystemServer {
    listener: TcpListener,
    config: Arc<CentralSystemConfig>,
    sessions: Arc<SessionRegistry>,
    repository: Arc<dyn EndpointRepository>,
}

impl CentralSystemServer {
    pub async fn bind(
        config: Arc<CentralSystemConfig>,
        sessions: Arc<SessionRegistry>,
        repository: Arc<dyn EndpointRepository>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        info!(
            "Server: listening on ws://{}{}/{{chargeBoxId}}",
            listener.local_addr()?,
            config.ws_path.trim_end_matches('/')
        );

        Ok(Self {
            listener,
            config,
            sessions,
            repository,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop, one tokio task per connection
    pub async fn run(self) -> io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!("Server: TCP connection from {}", peer);

            let connection = Connection {
                config: self.config.clone(),
                sessions: self.sessions.clone(),
                repository: self.repository.clone(),
            };
            tokio::spawn(async move {
                connection.serve(stream, peer).await;
            });
        }
    }
}

/// Charge box id and version agreed during the handshake
struct Negotiated {
    charge_box_id: String,
    version: OcppVersion,
}

struct Connection {
    config: Arc<CentralSystemConfig>,
    sessions: Arc<SessionRegistry>,
    repository: Arc<dyn EndpointRepository>,
}

impl Connection {
    async fn serve(self, stream: TcpStream, peer: SocketAddr) {
        let ws_config = WebSocketConfig {
            max_message_size: Some(self.config.max_message_size),
            max_frame_size: Some(self.config.max_message_size),
            ..Default::default()
        };

        let mut negotiated: Option<Negotiated> = None;
        let callback = |request: &Request, response: Response| {
            let result = negotiate(&self.config, request);
            match result {
                Ok(agreed) => {
                    let mut response = response;
                    response.headers_mut().insert(
                        header::SEC_WEBSOCKET_PROTOCOL,
                        HeaderValue::from_static(agreed.version.value()),
                    );
                    negotiated = Some(agreed);
                    Ok(response)
                }
                Err(refusal) => Err(refusal),
            }
        };

        let ws = match accept_hdr_async_with_config(stream, callback, Some(ws_config)).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("Server: handshake with {} failed: {}", peer, e);
                return;
            }
        };
        let Some(Negotiated {
            charge_box_id,
            version,
        }) = negotiated
        else {
            return;
        };

        let (mut ws_tx, mut ws_rx) = ws.split();

        if !self.is_known(&charge_box_id, version).await {
            warn!("Server: refusing unknown charge point {} from {}", charge_box_id, peer);
            let close = CloseFrame {
                code: CloseCode::Policy,
                reason: "unknown charge point".into(),
            };
            let _ = ws_tx.send(Message::Close(Some(close))).await;
            return;
        }

        let (out_tx, mut out_rx) = mpsc::channel::<OcppMessage>(64);
        let session_id = self.sessions.attach(&charge_box_id, version, out_tx.clone());

        // Writer task
        let writer_id = charge_box_id.clone();
        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let text = match msg.to_text() {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Server: failed to serialize message for {}: {}", writer_id, e);
                        continue;
                    }
                };
                debug!("Server: {} <- {}", writer_id, text);

                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    warn!("Server: send to {} failed: {}", writer_id, e);
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        // Reader loop
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    debug!("Server: {} -> {}", charge_box_id, text);
                    self.handle_frame(&charge_box_id, text.as_bytes(), &out_tx).await;
                }
                Ok(Message::Binary(_)) => {
                    warn!("Server: {} sent a binary frame, ignored", charge_box_id);
                }
                Ok(Message::Close(_)) => {
                    debug!("Server: {} closed the connection", charge_box_id);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Server: WebSocket error from {}: {}", charge_box_id, e);
                    break;
                }
            }
        }

        self.sessions.detach(&charge_box_id, session_id);
        writer.abort();
    }

    async fn is_known(&self, charge_box_id: &str, version: OcppVersion) -> bool {
        let endpoint = match self.repository.get_endpoint(charge_box_id).await {
            Ok(Some(endpoint)) => endpoint,
            Ok(None) => return false,
            Err(e) => {
                error!("Server: repository lookup for {} failed: {}", charge_box_id, e);
                return false;
            }
        };

        match endpoint.protocol() {
            Ok(OcppProtocol {
                transport: OcppTransport::Json,
                version: stored,
            }) => {
                if stored != version {
                    warn!(
                        "Server: {} is stored as {} but negotiated {}",
                        charge_box_id, stored, version
                    );
                }
                true
            }
            Ok(protocol) => {
                warn!("Server: {} is stored as {}, not a JSON charge point", charge_box_id, protocol);
                false
            }
            Err(e) => {
                warn!("Server: {} has an unusable protocol: {}", charge_box_id, e);
                false
            }
        }
    }

    async fn handle_frame(
        &self,
        charge_box_id: &str,
        bytes: &[u8],
        out_tx: &mpsc::Sender<OcppMessage>,
    ) {
        let message = match OcppMessage::parse(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!("Server: unparseable frame from {}: {}", charge_box_id, e);
                // A broken reply still settles the call it names
                let pending = OcppMessage::reply_id(bytes)
                    .and_then(|id| self.sessions.take(charge_box_id, &id));
                if let Some(pending) = pending {
                    pending.slot.record(correlator::malformed_reply(e));
                }
                return;
            }
        };

        match message {
            OcppMessage::Call(call) => {
                let reply = self.answer_station_call(charge_box_id, call);
                if out_tx.send(reply).await.is_err() {
                    warn!("Server: writer for {} is gone", charge_box_id);
                }
            }
            OcppMessage::CallResult(result) => {
                let Some(pending) = self.sessions.take(charge_box_id, &result.message_id) else {
                    debug!(
                        "Server: CALLRESULT {} from {} matches no pending call",
                        result.message_id, charge_box_id
                    );
                    return;
                };
                let outcome = pending.slot.record(correlator::json_result(
                    pending.slot.command(),
                    pending.version,
                    result.payload,
                ));
                debug!(
                    "Server: {} answered {} for task {}: {:?}",
                    charge_box_id,
                    pending.action,
                    pending.slot.task_id(),
                    outcome
                );
            }
            OcppMessage::CallError(error) => {
                let Some(pending) = self.sessions.take(charge_box_id, &error.message_id) else {
                    debug!(
                        "Server: CALLERROR {} from {} matches no pending call",
                        error.message_id, charge_box_id
                    );
                    return;
                };
                warn!(
                    "Server: {} rejected {}: {} {}",
                    charge_box_id, pending.action, error.error_code, error.error_description
                );
                pending.slot.record(correlator::json_error(&error));
            }
        }
    }

    fn answer_station_call(&self, charge_box_id: &str, call: Call) -> OcppMessage {
        match call.action {
            Action::Heartbeat => {
                let response = HeartbeatResponse {
                    current_time: Utc::now(),
                };
                match CallResult::new(call.message_id.clone(), response) {
                    Ok(result) => OcppMessage::CallResult(result),
                    Err(e) => OcppMessage::CallError(CallError::new(
                        call.message_id,
                        ErrorCode::InternalError,
                        e.to_string(),
                    )),
                }
            }
            other => {
                debug!("Server: {} sent {}, not implemented", charge_box_id, other);
                OcppMessage::CallError(CallError::new(
                    call.message_id,
                    ErrorCode::NotImplemented,
                    format!("{} is not handled by this central system", other),
                ))
            }
        }
    }
}

/// Check path and subprotocol of an upgrade request
fn negotiate(config: &CentralSystemConfig, request: &Request) -> Result<Negotiated, ErrorResponse> {
    let charge_box_id = charge_box_id_from_path(&config.ws_path, request.uri().path())
        .ok_or_else(|| refuse(StatusCode::NOT_FOUND, "unknown path"))?;

    let offered: Vec<&str> = request
        .headers()
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .collect();

    let version = select_version(&config.json_versions(), &offered)
        .ok_or_else(|| refuse(StatusCode::BAD_REQUEST, "no supported OCPP subprotocol"))?;

    Ok(Negotiated {
        charge_box_id,
        version,
    })
}

fn refuse(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

/// `{prefix}/{chargeBoxId}` with exactly one non-empty trailing segment
pub fn charge_box_id_from_path(prefix: &str, path: &str) -> Option<String> {
    let prefix = prefix.trim_end_matches('/');
    let rest = path.strip_prefix(prefix)?.strip_prefix('/')?;
    let id = rest.trim_end_matches('/');

    if id.is_empty() || id.contains('/') {
        return None;
    }
    Some(id.to_string())
}

/// Highest enabled version among the offered subprotocols
pub fn select_version(enabled: &[OcppVersion], offered: &[&str]) -> Option<OcppVersion> {
    offered
        .iter()
        .filter_map(|p| p.parse::<OcppVersion>().ok())
        .filter(|v| enabled.contains(v))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_box_id_from_path() {
        let prefix = "/steve/websocket/CentralSystemService";
        assert_eq!(
            charge_box_id_from_path(prefix, "/steve/websocket/CentralSystemService/CP-A"),
            Some("CP-A".to_string())
        );
        assert_eq!(
            charge_box_id_from_path(&format!("{prefix}/"), "/steve/websocket/CentralSystemService/CP-A/"),
            Some("CP-A".to_string())
        );
        assert_eq!(charge_box_id_from_path(prefix, "/steve/websocket/CentralSystemService"), None);
        assert_eq!(charge_box_id_from_path(prefix, "/steve/websocket/CentralSystemService/"), None);
        assert_eq!(charge_box_id_from_path(prefix, "/other/CP-A"), None);
        assert_eq!(charge_box_id_from_path(prefix, "/steve/websocket/CentralSystemService/a/b"), None);
    }

    #[test]
    fn test_select_version() {
        let all = OcppVersion::ALL;
        assert_eq!(select_version(&all, &["ocpp1.5", "ocpp1.6"]), Some(OcppVersion::V1_6));
        assert_eq!(select_version(&all, &["ocpp2.0.1", "ocpp1.2"]), Some(OcppVersion::V1_2));
        assert_eq!(select_version(&[OcppVersion::V1_5], &["ocpp1.6", "ocpp1.5"]), Some(OcppVersion::V1_5));
        assert_eq!(select_version(&all, &["ocpp2.0.1"]), None);
        assert_eq!(select_version(&all, &[]), None);
    }
}
