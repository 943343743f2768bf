//! File rename propagation (`workspace/willRenameFiles`, `workspace/didRenameFiles`).

use serde_json::Value;

use super::super::pool::{ConnectionManager, NotificationSendResult};
use super::super::protocol::rename_files_params;
use crate::error::BridgeResult;

impl ConnectionManager {
    /// Ask the server of `language_id` to prepare for a file rename.
    ///
    /// Returns the raw result (a `WorkspaceEdit` or null). The request is
    /// tagged with the old uri.
    pub async fn will_rename_files(
        &self,
        language_id: &str,
        old_uri: &str,
        new_uri: &str,
    ) -> BridgeResult<Value> {
        self.send_request(
            language_id,
            "workspace/willRenameFiles",
            rename_files_params(old_uri, new_uri),
            Some(old_uri),
        )
        .await
    }

    /// Tell the server of `language_id` that a file was renamed.
    pub fn did_rename_files(
        &self,
        language_id: &str,
        old_uri: &str,
        new_uri: &str,
    ) -> NotificationSendResult {
        self.send_notification(
            language_id,
            "workspace/didRenameFiles",
            rename_files_params(old_uri, new_uri),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::lsp::bridge::pool::test_helpers::test_manager;
    use serde_json::{Value, json};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn will_rename_carries_old_and_new_uri() {
        let (manager, mut server, _connector) = test_manager("ws://local", Duration::from_secs(5));

        let serve = async {
            let mut session = server.accept().await;
            session.complete_handshake().await;
            let request = session.next_request("workspace/willRenameFiles").await;
            session.respond(&request, Value::Null).await;
            (session, request)
        };

        let (result, (mut session, request)) = tokio::join!(
            manager.will_rename_files("javascript", "file:///a.js", "file:///c.js"),
            serve
        );

        assert_eq!(result.unwrap(), Value::Null);
        assert_eq!(
            request["params"]["files"],
            json!([{"oldUri": "file:///a.js", "newUri": "file:///c.js"}])
        );

        assert!(
            manager
                .did_rename_files("javascript", "file:///a.js", "file:///c.js")
                .is_queued()
        );
        let notification = session.next_notification("workspace/didRenameFiles").await;
        assert_eq!(notification["params"]["files"][0]["newUri"], "file:///c.js");
    }
}
