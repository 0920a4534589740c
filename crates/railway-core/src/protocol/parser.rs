//! Request parser for the booking line protocol.
//!
//! Implements tolerant reader pattern: unknown fields ignored, absent or
//! non-object `data` treated as empty.

use serde_json::{Map, Value};

use super::types::Request;
use crate::error::{Error, Result};

/// Parse a single protocol line.
pub fn parse_request(line: &str) -> Result<Request> {
    let raw: Value =
        serde_json::from_str(line).map_err(|e| Error::Protocol(format!("Invalid JSON: {e}")))?;
    parse_value(&raw)
}

/// Parse one raw frame as drained from a `LineBuffer`.
///
/// Non-UTF-8 input is a protocol error, wherever the bad byte sits.
pub fn parse_frame(frame: &[u8]) -> Result<Request> {
    let line = std::str::from_utf8(frame)
        .map_err(|e| Error::Protocol(format!("Invalid UTF-8 in request: {e}")))?;
    parse_request(line)
}

/// Parse a JSON value into a request.
pub fn parse_value(raw: &Value) -> Result<Request> {
    let obj = raw
        .as_object()
        .ok_or_else(|| Error::Protocol("Request must be a JSON object".into()))?;

    let command = obj
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Protocol("Missing 'command' field".into()))?;

    let data = match obj.get("data") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };

    Ok(Request {
        command: command.to_string(),
        data,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_command_and_data() {
        let req =
            parse_request(r#"{"command":"LOGIN","data":{"email":"a@b.cd","password":"x"}}"#)
                .unwrap();
        assert_eq!(req.command, "LOGIN");
        assert_eq!(req.data["email"], json!("a@b.cd"));
    }

    #[test]
    fn data_is_optional() {
        let req = parse_request(r#"{"command":"GET_MY_TICKETS"}"#).unwrap();
        assert!(req.data.is_empty());
    }

    #[test]
    fn non_object_data_reads_as_empty() {
        let req = parse_request(r#"{"command":"GET_PROFILE","data":[1,2]}"#).unwrap();
        assert!(req.data.is_empty());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let req = parse_request(r#"{"command":"LOGOUT","trace":"abc"}"#).unwrap();
        assert_eq!(req.command, "LOGOUT");
    }

    #[test]
    fn invalid_json_is_protocol_error() {
        let err = parse_request("{not json").unwrap_err();
        assert!(matches!(err, Error::Protocol(ref m) if m.starts_with("Invalid JSON")));
    }

    #[test]
    fn array_is_rejected() {
        let err = parse_request("[1,2,3]").unwrap_err();
        assert_eq!(err.to_string(), "Request must be a JSON object");
    }

    #[test]
    fn missing_or_non_string_command_is_rejected() {
        assert_eq!(
            parse_request(r#"{"data":{}}"#).unwrap_err().to_string(),
            "Missing 'command' field"
        );
        assert!(parse_request(r#"{"command":42}"#).is_err());
    }

    #[test]
    fn frame_with_invalid_utf8_is_protocol_error() {
        let frame = b"{\"command\":\"LOGIN\",\"data\":{\"email\":\"a\xFF@b.cd\"}}";
        let err = parse_frame(frame).unwrap_err();
        assert!(matches!(err, Error::Protocol(ref m) if m.starts_with("Invalid UTF-8")));
    }

    #[test]
    fn frame_with_multibyte_text_parses() {
        let frame = r#"{"command":"REGISTER","data":{"name":"Пётр"}}"#.as_bytes();
        let req = parse_frame(frame).unwrap();
        assert_eq!(req.data["name"], json!("Пётр"));
    }
}
