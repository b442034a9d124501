//! JSON-RPC 2.0 framing

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::McpError;

/// JSON-RPC 2.0 version string
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 request message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,

    pub method: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// Absent for notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::new(method, params, None)
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Reject structurally invalid requests before dispatch
    pub fn validate(&self) -> Result<(), McpError> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(McpError::bad_request(format!(
                "jsonrpc must be \"2.0\", found {:?}",
                self.jsonrpc
            )));
        }
        if self.method.is_empty() {
            return Err(McpError::bad_request("method must not be empty"));
        }
        match &self.id {
            None | Some(Value::String(_)) | Some(Value::Number(_)) => Ok(()),
            Some(other) => Err(McpError::bad_request(format!(
                "id must be a string or integer, found {}",
                other
            ))),
        }
    }
}

/// JSON-RPC 2.0 response message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,

    pub id: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(result: Value, id: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(error: JsonRpcError, id: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// JSON-RPC 2.0 error information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }
}

impl From<&McpError> for JsonRpcError {
    fn from(err: &McpError) -> Self {
        Self {
            code: err.json_rpc_code(),
            message: err.public_message(),
            data: Some(serde_json::json!({"kind": err.kind()})),
        }
    }
}

impl McpError {
    /// Wrap this error as a JSON-RPC response for `id`
    pub fn to_response(&self, id: Option<Value>) -> JsonRpcResponse {
        JsonRpcResponse::error(JsonRpcError::from(self), id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_roundtrip() {
        let request = JsonRpcRequest::new("tools/list", None, Some(json!(7)));
        let text = serde_json::to_string(&request).unwrap();
        let parsed: JsonRpcRequest = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, request);
        assert!(!parsed.is_notification());
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_notification_has_no_id() {
        let note = JsonRpcRequest::notification("notifications/initialized", None);
        let text = serde_json::to_string(&note).unwrap();
        assert!(!text.contains("\"id\""));
        assert!(note.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        let bad_version = JsonRpcRequest {
            jsonrpc: "1.0".to_string(),
            method: "x".to_string(),
            params: None,
            id: None,
        };
        assert!(bad_version.validate().is_err());

        let bad_id = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "x".to_string(),
            params: None,
            id: Some(json!({"nested": true})),
        };
        assert!(bad_id.validate().is_err());
    }

    #[test]
    fn test_error_response_carries_kind() {
        let response = McpError::RateLimited.to_response(Some(json!(1)));
        let error = response.error.unwrap();
        assert_eq!(error.data.unwrap()["kind"], "RATE_LIMITED");
    }
}
