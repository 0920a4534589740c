//! Request and response types for the booking line protocol.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Command name echoed on responses to frames that carry no usable command.
pub const ERROR_COMMAND: &str = "ERROR";

/// An inbound request after parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub command: String,
    pub data: Map<String, Value>,
}

impl Request {
    /// Build a request, mainly for tests and clients.
    pub fn new(command: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            command: command.into(),
            data,
        }
    }

    /// Serialise to a single protocol line, terminator included.
    pub fn to_line(&self) -> String {
        let mut obj = Map::new();
        obj.insert("command".into(), Value::String(self.command.clone()));
        if !self.data.is_empty() {
            obj.insert("data".into(), Value::Object(self.data.clone()));
        }
        let mut line = Value::Object(obj).to_string();
        line.push('\n');
        line
    }
}

/// The uniform response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub command: String,
    pub success: bool,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    /// Successful response stamped with the current time.
    pub fn ok(command: impl Into<String>, message: Option<String>, data: Option<Value>) -> Self {
        Self::at(Utc::now(), command, true, message, data)
    }

    /// Failed response carrying a human-readable message.
    pub fn error(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::at(Utc::now(), command, false, Some(message.into()), None)
    }

    /// Response stamped with an explicit time.
    pub fn at(
        now: DateTime<Utc>,
        command: impl Into<String>,
        success: bool,
        message: Option<String>,
        data: Option<Value>,
    ) -> Self {
        Self {
            command: command.into(),
            success,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            message: message.filter(|m| !m.is_empty()),
            data: data.filter(|d| !matches!(d, Value::Object(m) if m.is_empty())),
        }
    }

    /// Serialise to a single compact line, terminator included.
    pub fn to_line(&self) -> crate::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn response_line_is_single_compact_line() {
        let resp = Response::ok(
            "GET_STATIONS",
            None,
            Some(json!({"stations": [], "note": "multi\nline"})),
        );
        let line = resp.to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn empty_message_and_data_are_omitted() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let resp = Response::at(now, "LOGOUT", true, Some(String::new()), Some(json!({})));
        let value: Value = serde_json::to_value(&resp).unwrap();

        assert_eq!(value["timestamp"], "2025-03-01T12:00:00Z");
        assert!(value.get("message").is_none());
        assert!(value.get("data").is_none());
    }

    #[test]
    fn error_response_shape() {
        let resp = Response::error("PAY_TICKET", "Ticket not found");
        assert!(!resp.success);
        assert_eq!(resp.message.as_deref(), Some("Ticket not found"));
        assert!(resp.data.is_none());
    }

    #[test]
    fn request_to_line_skips_empty_data() {
        let req = Request::new("LOGOUT", Value::Null);
        assert_eq!(req.to_line(), "{\"command\":\"LOGOUT\"}\n");
    }
}
