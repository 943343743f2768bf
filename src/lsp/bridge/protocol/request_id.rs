//! JSON-RPC request ID type for bridge connections.

/// JSON-RPC request ID.
///
/// Wraps `i64` so ids cannot be confused with document versions or line
/// numbers. The bridge generates every id it sends, so only numeric ids are
/// produced; ids of server-initiated requests are kept as raw JSON instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct RequestId(i64);

impl RequestId {
    #[inline]
    pub(crate) fn new(id: i64) -> Self {
        Self(id)
    }

    #[inline]
    pub(crate) fn as_i64(self) -> i64 {
        self.0
    }

    /// Extract the id of a response.
    ///
    /// Returns `None` if the field is missing, null or not a number.
    pub(crate) fn from_json(message: &serde_json::Value) -> Option<Self> {
        message.get("id")?.as_i64().map(Self)
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_id_from_json_with_numeric_id() {
        let msg = json!({"jsonrpc": "2.0", "id": 42, "result": null});
        assert_eq!(RequestId::from_json(&msg), Some(RequestId::new(42)));
    }

    #[test]
    fn request_id_from_json_without_id_returns_none() {
        let msg = json!({"jsonrpc": "2.0", "method": "initialized", "params": {}});
        assert_eq!(RequestId::from_json(&msg), None);
    }

    #[test]
    fn request_id_from_json_with_string_id_returns_none() {
        let msg = json!({"jsonrpc": "2.0", "id": "abc", "result": null});
        assert_eq!(RequestId::from_json(&msg), None);
    }
}
