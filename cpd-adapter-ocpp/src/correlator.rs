//! Response correlation
//!
//! Maps whatever a charge point sent back into the canonical
//! [`TargetResult`]. Every path ends in a result; malformed input becomes
//! `Failure(Decode)` and never escapes as an error.

use cpd_core::{Command, FailureReason, OcppVersion, ResponseCode, TargetResult};
use serde_json::Value;

use crate::ocpp::{
    unlock_status_allowed, CallError, RemoteStartTransactionResponse,
    RemoteStopTransactionResponse, UnlockConnectorResponse,
};
use crate::soap::{envelope, SoapReply};

/// Decode a response payload of `command` for a charge point on `version`
pub fn decode_payload(
    command: &Command,
    version: OcppVersion,
    payload: Value,
) -> Result<ResponseCode, String> {
    match command {
        Command::UnlockConnector { .. } => {
            let response: UnlockConnectorResponse =
                serde_json::from_value(payload).map_err(|e| e.to_string())?;
            if !unlock_status_allowed(response.status, version) {
                return Err(format!("{:?} is not a {} unlock status", response.status, version));
            }
            Ok(response.status.into())
        }
        Command::RemoteStart { .. } => {
            let response: RemoteStartTransactionResponse =
                serde_json::from_value(payload).map_err(|e| e.to_string())?;
            Ok(response.status.into())
        }
        Command::RemoteStop { .. } => {
            let response: RemoteStopTransactionResponse =
                serde_json::from_value(payload).map_err(|e| e.to_string())?;
            Ok(response.status.into())
        }
    }
}

/// CALLRESULT payload
pub fn json_result(command: &Command, version: OcppVersion, payload: Value) -> TargetResult {
    match decode_payload(command, version, payload) {
        Ok(code) => TargetResult::Success(code),
        Err(e) => TargetResult::Failure(FailureReason::Decode(e)),
    }
}

/// CALLERROR
pub fn json_error(error: &CallError) -> TargetResult {
    TargetResult::Failure(FailureReason::Remote {
        code: error.error_code.to_string(),
        description: error.error_description.clone(),
    })
}

/// Reply frame whose message id was readable but whose body was not
pub fn malformed_reply(reason: impl std::fmt::Display) -> TargetResult {
    TargetResult::Failure(FailureReason::Decode(format!("malformed reply: {}", reason)))
}

/// HTTP reply of a SOAP charge point
pub fn soap_result(command: &Command, version: OcppVersion, http_status: u16, body: &str) -> TargetResult {
    match envelope::parse_response(body) {
        Ok(SoapReply::Fault { code, reason }) => TargetResult::Failure(FailureReason::Remote {
            code,
            description: reason,
        }),
        Ok(SoapReply::Status(status)) => {
            json_result(command, version, serde_json::json!({ "status": status }))
        }
        Err(e) if !(200..300).contains(&http_status) => {
            TargetResult::Failure(FailureReason::Decode(format!("HTTP {}: {}", http_status, e)))
        }
        Err(e) => TargetResult::Failure(FailureReason::Decode(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocpp::ErrorCode;

    fn unlock() -> Command {
        Command::UnlockConnector { connector_id: 1 }
    }

    #[test]
    fn test_json_result_per_action() {
        assert_eq!(
            json_result(&unlock(), OcppVersion::V1_6, serde_json::json!({"status": "Unlocked"})),
            TargetResult::Success(ResponseCode::Unlocked)
        );

        let start = Command::RemoteStart {
            connector_id: 1,
            id_tag: "TAG".into(),
        };
        assert_eq!(
            json_result(&start, OcppVersion::V1_5, serde_json::json!({"status": "Rejected"})),
            TargetResult::Success(ResponseCode::Rejected)
        );
    }

    #[test]
    fn test_json_result_decode_failures() {
        let cases = [
            serde_json::json!({}),
            serde_json::json!({"status": "Accepted"}),
            serde_json::json!("Unlocked"),
            Value::Null,
        ];
        for payload in cases {
            assert!(matches!(
                json_result(&unlock(), OcppVersion::V1_6, payload),
                TargetResult::Failure(FailureReason::Decode(_))
            ));
        }
    }

    #[test]
    fn test_malformed_reply_is_decode_failure() {
        match malformed_reply("Invalid message format") {
            TargetResult::Failure(FailureReason::Decode(msg)) => {
                assert!(msg.contains("Invalid message format"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_not_supported_before_1_6_is_decode_failure() {
        let payload = serde_json::json!({"status": "NotSupported"});
        assert_eq!(
            json_result(&unlock(), OcppVersion::V1_6, payload.clone()),
            TargetResult::Success(ResponseCode::NotSupported)
        );
        assert!(matches!(
            json_result(&unlock(), OcppVersion::V1_5, payload),
            TargetResult::Failure(FailureReason::Decode(_))
        ));
    }

    #[test]
    fn test_json_error() {
        let error = CallError::new("m".into(), ErrorCode::NotSupported, "no relay");
        assert_eq!(
            json_error(&error),
            TargetResult::Failure(FailureReason::Remote {
                code: "NotSupported".into(),
                description: "no relay".into(),
            })
        );
    }

    #[test]
    fn test_soap_result() {
        let ok = r#"<s:Envelope><s:Body><remoteStopTransactionResponse><status>Accepted</status></remoteStopTransactionResponse></s:Body></s:Envelope>"#;
        let stop = Command::RemoteStop { transaction_id: 1 };
        assert_eq!(
            soap_result(&stop, OcppVersion::V1_5, 200, ok),
            TargetResult::Success(ResponseCode::Accepted)
        );

        let fault = r#"<s:Envelope><s:Body><s:Fault><s:Code><s:Value>s:Sender</s:Value></s:Code><s:Reason><s:Text>bad</s:Text></s:Reason></s:Fault></s:Body></s:Envelope>"#;
        assert!(matches!(
            soap_result(&stop, OcppVersion::V1_5, 500, fault),
            TargetResult::Failure(FailureReason::Remote { .. })
        ));

        match soap_result(&stop, OcppVersion::V1_5, 502, "Bad Gateway") {
            TargetResult::Failure(FailureReason::Decode(msg)) => assert!(msg.starts_with("HTTP 502")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
