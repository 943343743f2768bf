//! JSON-RPC 2.0 envelopes and inbound message classification.

use serde_json::{Value, json};

use super::request_id::RequestId;
use crate::error::{BridgeError, BridgeResult};

/// JSON-RPC error code for an unsupported server-to-client request.
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;

pub(crate) fn build_request(id: RequestId, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id.as_i64(),
        "method": method,
        "params": params
    })
}

pub(crate) fn build_notification(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params
    })
}

/// Successful reply to a server-initiated request. `id` is echoed verbatim.
pub(crate) fn build_result_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub(crate) fn build_error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message
        }
    })
}

/// One decoded frame from the server.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum InboundMessage {
    /// Reply to one of our requests; the payload is the whole envelope
    Response { id: RequestId, payload: Value },
    /// Request initiated by the server that expects a reply
    ServerRequest {
        id: Value,
        method: String,
        params: Value,
    },
    Notification { method: String, params: Value },
}

impl InboundMessage {
    pub(crate) fn parse(frame: &str) -> BridgeResult<Self> {
        let value: Value = serde_json::from_str(frame)
            .map_err(|err| BridgeError::protocol(format!("invalid JSON frame: {}", err)))?;
        Self::classify(value)
    }

    pub(crate) fn classify(value: Value) -> BridgeResult<Self> {
        if !value.is_object() {
            return Err(BridgeError::protocol("frame is not a JSON object"));
        }

        let method = value
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        let params = value.get("params").cloned().unwrap_or(Value::Null);

        match (method, value.get("id").filter(|id| !id.is_null()).cloned()) {
            (Some(method), Some(id)) => Ok(Self::ServerRequest { id, method, params }),
            (Some(method), None) => Ok(Self::Notification { method, params }),
            (None, Some(_)) => match RequestId::from_json(&value) {
                Some(id) => Ok(Self::Response { id, payload: value }),
                None => Err(BridgeError::protocol("response id is not numeric")),
            },
            (None, None) => Err(BridgeError::protocol(
                "frame has neither method nor id",
            )),
        }
    }
}

/// Turn a response envelope into its result.
///
/// A well-formed `error` member becomes [`BridgeError::Server`]; anything
/// that is neither a result nor a proper error is a protocol error.
pub(crate) fn decode_response(payload: Value) -> BridgeResult<Value> {
    if let Some(error) = payload.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64);
        let message = error.get("message").and_then(Value::as_str);
        return match (code, message) {
            (Some(code), Some(message)) => Err(BridgeError::Server {
                code,
                message: message.to_string(),
            }),
            _ => Err(BridgeError::protocol(format!(
                "malformed error object: {}",
                error
            ))),
        };
    }

    match payload {
        Value::Object(mut map) => map
            .remove("result")
            .ok_or_else(|| BridgeError::protocol("response has neither result nor error")),
        _ => Err(BridgeError::protocol("response is not a JSON object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn request_envelope_has_id_and_method() {
        let request = build_request(RequestId::new(7), "textDocument/formatting", json!({}));
        assert_eq!(request["jsonrpc"], "2.0");
        assert_eq!(request["id"], 7);
        assert_eq!(request["method"], "textDocument/formatting");
    }

    #[test]
    fn notification_envelope_has_no_id() {
        let notification = build_notification("initialized", json!({}));
        assert!(notification.get("id").is_none());
    }

    #[rstest]
    #[case::response(json!({"jsonrpc": "2.0", "id": 3, "result": []}), "response")]
    #[case::error_response(json!({"jsonrpc": "2.0", "id": 3, "error": {"code": 1, "message": "x"}}), "response")]
    #[case::server_request(json!({"jsonrpc": "2.0", "id": "a1", "method": "workspace/configuration", "params": {}}), "request")]
    #[case::notification(json!({"jsonrpc": "2.0", "method": "textDocument/publishDiagnostics", "params": {}}), "notification")]
    #[case::null_id_notification(json!({"jsonrpc": "2.0", "id": null, "method": "window/logMessage"}), "notification")]
    fn classify_distinguishes_message_kinds(#[case] frame: Value, #[case] expected: &str) {
        let kind = match InboundMessage::classify(frame).unwrap() {
            InboundMessage::Response { .. } => "response",
            InboundMessage::ServerRequest { .. } => "request",
            InboundMessage::Notification { .. } => "notification",
        };
        assert_eq!(kind, expected);
    }

    #[rstest]
    #[case::not_json("{nope")]
    #[case::array("[1, 2]")]
    #[case::empty_object("{}")]
    #[case::string_response_id("{\"id\": \"x\", \"result\": null}")]
    fn parse_rejects_garbage(#[case] frame: &str) {
        assert!(matches!(
            InboundMessage::parse(frame),
            Err(BridgeError::Protocol { .. })
        ));
    }

    #[test]
    fn decode_response_returns_result_including_null() {
        assert_eq!(
            decode_response(json!({"id": 1, "result": null})).unwrap(),
            Value::Null
        );
        assert_eq!(
            decode_response(json!({"id": 1, "result": [1]})).unwrap(),
            json!([1])
        );
    }

    #[test]
    fn decode_response_maps_error_object() {
        let err = decode_response(json!({
            "id": 1,
            "error": {"code": -32800, "message": "Request cancelled"}
        }))
        .unwrap_err();

        match err {
            BridgeError::Server { code, message } => {
                assert_eq!(code, -32800);
                assert_eq!(message, "Request cancelled");
            }
            other => panic!("expected server error, got {:?}", other),
        }
    }

    #[test]
    fn decode_response_rejects_malformed_error() {
        let err = decode_response(json!({"id": 1, "error": {"oops": true}})).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol { .. }));
    }
}
