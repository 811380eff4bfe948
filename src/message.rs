//! Minimal JSON-RPC 2.0 wire types.
//!
//! Full schema validation of MCP method names, params, and results lives in
//! the higher-level session/dispatch layer, which is out of scope for this
//! transport. This module only carries enough structure to serialize
//! outbound messages, parse inbound ones, and recognize an `initialize`
//! request/response (needed to capture the session id).

use std::fmt;

use serde::{Deserialize, Serialize, de::Error as _};
use serde_json::Value;

/// A JSON-RPC request/response id: a string or a number, per the JSON-RPC
/// 2.0 spec (fractional numbers are not produced by MCP clients/servers in
/// practice, so only integers are represented here).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(i64),
    String(String),
}

impl fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonRpcId::Number(n) => write!(f, "{n}"),
            JsonRpcId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for JsonRpcId {
    fn from(value: i64) -> Self {
        JsonRpcId::Number(value)
    }
}

impl From<String> for JsonRpcId {
    fn from(value: String) -> Self {
        JsonRpcId::String(value)
    }
}

impl From<&str> for JsonRpcId {
    fn from(value: &str) -> Self {
        JsonRpcId::String(value.to_owned())
    }
}

/// Marker type that serializes to, and only deserializes from, the literal
/// string `"2.0"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsonRpcVersion2_0;

impl Serialize for JsonRpcVersion2_0 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion2_0 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s == "2.0" {
            Ok(JsonRpcVersion2_0)
        } else {
            Err(D::Error::custom(format!(
                "expected jsonrpc version \"2.0\", got {s:?}"
            )))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A single JSON-RPC message: request, notification, response, or error.
///
/// All four shapes are represented by one struct rather than an enum keyed
/// on method name, since this transport never branches on anything but
/// `method == "initialize"` and the presence of `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcMessage {
    pub jsonrpc: JsonRpcVersion2_0,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
}

impl JsonRpcMessage {
    pub fn request(id: impl Into<JsonRpcId>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion2_0,
            id: Some(id.into()),
            method: Some(method.into()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion2_0,
            id: None,
            method: Some(method.into()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    pub fn is_initialize_request(&self) -> bool {
        self.id.is_some() && self.method.as_deref() == Some("initialize")
    }
}

/// The body of an outbound POST: one message, or a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundPayload {
    Single(JsonRpcMessage),
    Batch(Vec<JsonRpcMessage>),
}

impl OutboundPayload {
    pub fn contains_initialize_request(&self) -> bool {
        match self {
            OutboundPayload::Single(message) => message.is_initialize_request(),
            OutboundPayload::Batch(messages) => {
                messages.iter().any(JsonRpcMessage::is_initialize_request)
            }
        }
    }

    pub fn into_messages(self) -> Vec<JsonRpcMessage> {
        match self {
            OutboundPayload::Single(message) => vec![message],
            OutboundPayload::Batch(messages) => messages,
        }
    }
}

impl From<JsonRpcMessage> for OutboundPayload {
    fn from(message: JsonRpcMessage) -> Self {
        OutboundPayload::Single(message)
    }
}

impl From<Vec<JsonRpcMessage>> for OutboundPayload {
    fn from(messages: Vec<JsonRpcMessage>) -> Self {
        OutboundPayload::Batch(messages)
    }
}

/// A parsed inline (`application/json`) or SSE `data:` payload: one message
/// or a batch of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundPayload {
    Batch(Vec<JsonRpcMessage>),
    Single(JsonRpcMessage),
}

impl InboundPayload {
    pub fn into_messages(self) -> Vec<JsonRpcMessage> {
        match self {
            InboundPayload::Single(message) => vec![message],
            InboundPayload::Batch(messages) => messages,
        }
    }
}
