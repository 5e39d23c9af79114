//! End-to-end tests with a SOAP charge point
//!
//! The charge point is a bare HTTP responder on a tokio listener that
//! captures the request body and answers with a canned SOAP reply.

use std::sync::Arc;
use std::time::Duration;

use cpd_adapter_ocpp::{CentralSystem, CentralSystemConfig};
use cpd_core::{
    DispatchConfig, Endpoint, FailureReason, InMemoryEndpointRepository, ResponseCode,
    TargetResult,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_test::{assert_err, assert_ok};

/// One-shot HTTP server; returns its URL and the received request body
async fn fake_charge_point(status: u16, reply: &'static str) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/ocpp", listener.local_addr().unwrap());
    let (body_tx, body_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let content_length: usize = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .map(|v| v.trim().parse().unwrap())
            .unwrap_or(0);

        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed mid-body");
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = String::from_utf8_lossy(&buf[header_end..header_end + content_length]).into_owned();
        let _ = body_tx.send(body);

        let response = format!(
            "HTTP/1.1 {} X\r\nContent-Type: application/soap+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            reply.len(),
            reply
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = stream.shutdown().await;
    });

    (url, body_rx)
}

fn central(endpoints: Vec<Endpoint>) -> CentralSystem {
    let config = CentralSystemConfig::new("127.0.0.1:0".parse().unwrap())
        .with_soap_timeout(Duration::from_secs(2))
        .with_dispatch(DispatchConfig::default().with_timeout(Duration::from_secs(5)));
    CentralSystem::builder(config)
        .repository(Arc::new(InMemoryEndpointRepository::from_endpoints(endpoints)))
        .build()
        .unwrap()
}

const ACCEPTED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <remoteStartTransactionResponse xmlns="urn://Ocpp/Cp/2012/06/">
      <status>Accepted</status>
    </remoteStartTransactionResponse>
  </soap:Body>
</soap:Envelope>"#;

const FAULT: &str = r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"><soap:Body>
<soap:Fault><soap:Code><soap:Value>soap:Receiver</soap:Value></soap:Code>
<soap:Reason><soap:Text xml:lang="en">Connector busy</soap:Text></soap:Reason></soap:Fault>
</soap:Body></soap:Envelope>"#;

#[tokio::test]
async fn test_remote_start_over_soap() {
    let (url, body_rx) = fake_charge_point(200, ACCEPTED).await;
    let central = central(vec![Endpoint::new("CP-S", "ocpp1.5S").with_address(url)]);

    let handle = assert_ok!(central.service().start_transaction("CP-S", 1, "TAG1").await);
    let snap = tokio::time::timeout(Duration::from_secs(3), handle.wait())
        .await
        .unwrap();

    assert_eq!(
        snap.result_of("CP-S"),
        Some(&TargetResult::Success(ResponseCode::Accepted))
    );

    let body = body_rx.await.unwrap();
    assert!(body.contains("<cp:chargeBoxIdentity>CP-S</cp:chargeBoxIdentity>"));
    assert!(body.contains("urn://Ocpp/Cp/2012/06/"));
    assert!(body.contains("<cp:idTag>TAG1</cp:idTag>"));
}

#[tokio::test]
async fn test_soap_fault_is_remote_failure() {
    let (url, _body) = fake_charge_point(500, FAULT).await;
    let central = central(vec![Endpoint::new("CP-S", "ocpp1.6S").with_address(url)]);

    let handle = central.service().unlock_connector("CP-S", 1).await.unwrap();
    let snap = tokio::time::timeout(Duration::from_secs(3), handle.wait())
        .await
        .unwrap();

    assert_eq!(
        snap.result_of("CP-S"),
        Some(&TargetResult::Failure(FailureReason::Remote {
            code: "soap:Receiver".into(),
            description: "Connector busy".into(),
        }))
    );
}

#[tokio::test]
async fn test_unreadable_reply_is_decode_failure() {
    let (url, _body) = fake_charge_point(200, "<html>hello</html>").await;
    let central = central(vec![Endpoint::new("CP-S", "ocpp1.2S").with_address(url)]);

    let handle = central.service().stop_transaction("CP-S", 3).await.unwrap();
    let snap = tokio::time::timeout(Duration::from_secs(3), handle.wait())
        .await
        .unwrap();

    assert!(matches!(
        snap.result_of("CP-S"),
        Some(TargetResult::Failure(FailureReason::Decode(_)))
    ));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_send_failure() {
    // Bind and drop to get a port nobody listens on
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    let central = central(vec![
        Endpoint::new("CP-S", "ocpp1.6S").with_address(format!("http://{addr}/ocpp"))
    ]);

    let handle = central.service().unlock_connector("CP-S", 1).await.unwrap();
    let snap = tokio::time::timeout(Duration::from_secs(3), handle.wait())
        .await
        .unwrap();

    assert!(matches!(
        snap.result_of("CP-S"),
        Some(TargetResult::Failure(FailureReason::TransportSend(_)))
    ));
}

#[tokio::test]
async fn test_missing_address_is_send_failure() {
    let central = central(vec![Endpoint::new("CP-S", "ocpp1.6S")]);

    let handle = central.service().unlock_connector("CP-S", 1).await.unwrap();
    let snap = tokio::time::timeout(Duration::from_secs(3), handle.wait())
        .await
        .unwrap();

    match snap.result_of("CP-S") {
        Some(TargetResult::Failure(FailureReason::TransportSend(msg))) => {
            assert!(msg.contains("no endpoint address"))
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_command_never_reaches_the_wire() {
    let central = central(vec![
        Endpoint::new("CP-S", "ocpp1.6S").with_address("http://127.0.0.1:9/ocpp")
    ]);

    assert_err!(central.service().unlock_connector("CP-S", 0).await);
    assert_err!(
        central
            .service()
            .start_transaction("CP-S", 1, "TAG-THAT-IS-FAR-TOO-LONG-FOR-OCPP")
            .await
    );
    assert!(central.service().list_tasks().is_empty());
}
