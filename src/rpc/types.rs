//! JSON-RPC 2.0 wire types and tool-protocol primitives
//!
//! This module defines the wire surface the fleet actually depends on:
//! JSON-RPC 2.0 framing types, the `initialize` / `tools/list` /
//! `tools/call` method constants, and the handshake payloads. All types
//! derive `Debug`, `Clone`, `Serialize`, and `Deserialize` unless noted
//! otherwise. Struct fields are `camelCase` on the wire via
//! `#[serde(rename_all = "camelCase")]`, and `Option<>` fields omit their
//! key from JSON when `None`.
//!
//! `params` and `result` stay opaque [`serde_json::Value`]s at this
//! boundary; typed decoding happens only at call sites that know the
//! expected tool schema.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Protocol constants
// ---------------------------------------------------------------------------

/// Protocol revision this client advertises during the handshake.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Lifecycle: client sends `initialize` to open a session.
pub const METHOD_INITIALIZE: &str = "initialize";
/// Request the list of tools the server advertises.
pub const METHOD_TOOLS_LIST: &str = "tools/list";
/// Invoke a named tool.
pub const METHOD_TOOLS_CALL: &str = "tools/call";
/// Keepalive ping.
pub const METHOD_PING: &str = "ping";

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 wire types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request object.
///
/// `jsonrpc` MUST always be `"2.0"`. `id` is `None` only for notifications.
///
/// # Examples
///
/// ```
/// use toolfleet::rpc::types::JsonRpcRequest;
///
/// let req = JsonRpcRequest {
///     jsonrpc: "2.0".to_string(),
///     id: Some(serde_json::json!(1)),
///     method: "ping".to_string(),
///     params: None,
/// };
/// assert_eq!(req.jsonrpc, "2.0");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version identifier; always `"2.0"`.
    pub jsonrpc: String,
    /// Request correlation identifier. Present for requests, absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// A JSON-RPC 2.0 response object.
///
/// Exactly one of `result` or `error` will be present in a valid response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version identifier; always `"2.0"`.
    pub jsonrpc: String,
    /// Mirrors the `id` from the corresponding request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    /// Successful result value; mutually exclusive with `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error object; mutually exclusive with `result`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// A JSON-RPC 2.0 error object.
///
/// Implements `Display` as `"JSON-RPC error {code}: {message}"`.
///
/// # Examples
///
/// ```
/// use toolfleet::rpc::types::JsonRpcError;
///
/// let e = JsonRpcError { code: -32600, message: "Invalid Request".to_string(), data: None };
/// assert_eq!(e.to_string(), "JSON-RPC error -32600: Invalid Request");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code as defined by JSON-RPC 2.0.
    pub code: i64,
    /// Human-readable error description.
    pub message: String,
    /// Optional additional error context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

// ---------------------------------------------------------------------------
// Handshake payloads
// ---------------------------------------------------------------------------

/// Identifies a client implementation by name and version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Implementation name (e.g. `"toolfleet"`).
    pub name: String,
    /// Implementation version string.
    pub version: String,
}

/// Capability flags this client advertises during `initialize`.
///
/// The fleet only consumes tools, so the structure is intentionally small;
/// unknown server-side fields are ignored on deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    /// Whether the client understands tool invocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<serde_json::Value>,
}

/// Parameters of the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol revision the client speaks.
    pub protocol_version: String,
    /// Capabilities the client advertises.
    pub capabilities: ClientCapabilities,
    /// Client identity.
    pub client_info: ClientInfo,
}

/// The server's response to `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResponse {
    /// Protocol revision the server selected.
    pub protocol_version: String,
    /// Capabilities the server advertises; opaque at this layer.
    #[serde(default)]
    pub capabilities: serde_json::Value,
    /// Server identity, when provided.
    #[serde(default)]
    pub server_info: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Tool discovery and invocation
// ---------------------------------------------------------------------------

/// One tool advertised by a server via `tools/list`.
///
/// Discovered once per session during the handshake and cached for the
/// session's lifetime. A restarted server means a dead session; the cache
/// is rebuilt only by initializing a fresh session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Tool name, unique per server.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema describing the tool's arguments.
    #[serde(default)]
    pub input_schema: serde_json::Value,
}

/// The result of a `tools/list` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResponse {
    /// Tools the server advertises.
    pub tools: Vec<ToolDescriptor>,
}

/// Parameters of a `tools/call` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    /// The tool name as returned by `tools/list`.
    pub name: String,
    /// Arguments matching the tool's `inputSchema`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_without_null_fields() {
        let req = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::json!(7)),
            method: "tools/list".to_string(),
            params: None,
        };
        let s = serde_json::to_string(&req).unwrap();
        assert!(s.contains(r#""id":7"#));
        assert!(!s.contains("params"), "None params must be omitted: {s}");
    }

    #[test]
    fn test_response_roundtrip_with_error() {
        let raw = r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"Method not found"}}"#;
        let resp: JsonRpcResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.result.is_none());
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32601);
        assert_eq!(err.to_string(), "JSON-RPC error -32601: Method not found");
    }

    #[test]
    fn test_initialize_params_camel_case_on_wire() {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo {
                name: "toolfleet".to_string(),
                version: "0.1.0".to_string(),
            },
        };
        let v = serde_json::to_value(&params).unwrap();
        assert_eq!(v["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(v["clientInfo"]["name"], "toolfleet");
    }

    #[test]
    fn test_tool_descriptor_accepts_missing_description() {
        let raw = r#"{"name":"echo","inputSchema":{"type":"object"}}"#;
        let tool: ToolDescriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(tool.name, "echo");
        assert!(tool.description.is_none());
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn test_list_tools_response_parses() {
        let raw = r#"{"tools":[{"name":"a","inputSchema":{}},{"name":"b","inputSchema":{}}]}"#;
        let resp: ListToolsResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.tools.len(), 2);
        assert_eq!(resp.tools[1].name, "b");
    }
}
