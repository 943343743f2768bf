//! LSP lifecycle message payloads.
//!
//! Provides params for initialize, initialized, shutdown and exit, and the
//! validation of the initialize response.

use serde_json::{Value, json};

use crate::error::{BridgeError, BridgeResult};

/// Params of the `initialize` request.
///
/// Advertises exactly what the bridge handles: full document sync,
/// versioned diagnostics, formatting and file rename operations.
pub(crate) fn initialize_params(language_id: &str, root_uri: Option<&str>) -> Value {
    json!({
        "processId": std::process::id(),
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        },
        "rootUri": root_uri,
        "capabilities": {
            "textDocument": {
                "synchronization": {
                    "didSave": false,
                    "willSave": false,
                    "willSaveWaitUntil": false
                },
                "formatting": {},
                "publishDiagnostics": {
                    "versionSupport": true
                }
            },
            "workspace": {
                "configuration": true,
                "fileOperations": {
                    "willRename": true,
                    "didRename": true
                }
            },
            "window": {
                "workDoneProgress": true
            }
        },
        "initializationOptions": {
            "languageId": language_id
        }
    })
}

/// Params of the `initialized` notification.
pub(crate) fn initialized_params() -> Value {
    json!({})
}

/// Validates a JSON-RPC initialize response.
///
/// Uses lenient interpretation to maximize compatibility with non-conformant servers:
/// - Prioritizes error field if present and non-null
/// - Accepts result with null error field (`{"result": {...}, "error": null}`)
/// - Rejects null or missing result field
pub(crate) fn validate_initialize_response(response: &Value) -> BridgeResult<()> {
    if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(-1);
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");

        return Err(BridgeError::Server {
            code,
            message: format!("initialize failed: {}", message),
        });
    }

    if response.get("result").filter(|r| !r.is_null()).is_none() {
        return Err(BridgeError::protocol(
            "initialize response missing valid result",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn initialize_params_advertise_rename_and_versioned_diagnostics() {
        let params = initialize_params("python", None);

        assert!(params["processId"].as_u64().is_some());
        assert!(params["rootUri"].is_null());
        assert_eq!(
            params["capabilities"]["textDocument"]["publishDiagnostics"]["versionSupport"],
            true
        );
        assert_eq!(
            params["capabilities"]["workspace"]["fileOperations"]["willRename"],
            true
        );
        assert_eq!(params["initializationOptions"]["languageId"], "python");
    }

    #[rstest]
    #[case::valid_result_without_error(json!({"result": {"capabilities": {}}}))]
    #[case::valid_result_with_null_error(json!({"result": {"capabilities": {}}, "error": null}))]
    fn validate_accepts_valid_response(#[case] response: Value) {
        assert!(validate_initialize_response(&response).is_ok());
    }

    #[rstest]
    #[case::null_result(json!({"result": null}))]
    #[case::missing_result_and_error(json!({}))]
    fn validate_rejects_missing_result(#[case] response: Value) {
        let err = validate_initialize_response(&response).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol { .. }));
    }

    #[rstest]
    #[case::error_response(json!({"error": {"code": -32600, "message": "Invalid Request"}}), -32600)]
    #[case::error_even_with_result(
        json!({"result": {"capabilities": {}}, "error": {"code": -32603, "message": "Internal error"}}),
        -32603
    )]
    #[case::malformed_error_missing_code(json!({"error": {"message": "boom"}}), -1)]
    fn validate_rejects_error_response(#[case] response: Value, #[case] expected_code: i64) {
        match validate_initialize_response(&response) {
            Err(BridgeError::Server { code, .. }) => assert_eq!(code, expected_code),
            other => panic!("expected server error, got {:?}", other),
        }
    }
}
