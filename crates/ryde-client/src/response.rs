//! Response normalization
//!
//! Every response flows through [`normalize`]: the one place that turns
//! raw status + body text into the envelope or a typed error. It absorbs
//! the backend's quirks so callers never sniff shapes themselves:
//! XML error pages leaked by the proxy layer, payload fields sitting
//! beside `success` instead of under `data`, and bare bodies with no
//! envelope at all.

use serde_json::{Map, Value};
use tracing::warn;

use common::Envelope;

use crate::error::{Error, Result};

/// Turn one raw response into the normalized envelope.
pub fn normalize(status: u16, text: &str) -> Result<Envelope> {
    let trimmed = text.trim();

    // XML before anything else: these bodies come from the proxy tier and
    // carry the real failure text inside <message>/<error> tags
    if trimmed.starts_with('<') {
        return Err(Error::Server(extract_xml_message(trimmed, status)));
    }

    let parsed: Value = if trimmed.is_empty() {
        Value::Object(Map::new())
    } else {
        match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(e) => {
                warn!(status, error = %e, "response body is neither JSON nor XML");
                return Err(Error::InvalidResponse);
            }
        }
    };

    if !(200..300).contains(&status) {
        let message = parsed
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("An error occurred")
            .to_string();
        return Err(Error::Api { status, message });
    }

    Ok(reshape(parsed))
}

/// Coerce a 2xx JSON body into the envelope shape.
fn reshape(parsed: Value) -> Envelope {
    let mut map = match parsed {
        Value::Object(map) => map,
        other => {
            // Bare arrays and scalars become the payload of a success
            return Envelope {
                success: true,
                message: None,
                data: other,
            };
        }
    };

    match map.get("success").and_then(Value::as_bool) {
        // Payload sits beside `success`; re-wrap the siblings as data
        Some(true) if !map.contains_key("data") => {
            map.remove("success");
            let message = take_string(&mut map, "message");
            Envelope {
                success: true,
                message,
                data: Value::Object(map),
            }
        }
        // Already envelope-shaped
        Some(success) => {
            let message = take_string(&mut map, "message");
            let data = map.remove("data").unwrap_or(Value::Null);
            Envelope {
                success,
                message,
                data,
            }
        }
        // No boolean success marker: the whole object is the payload
        None => Envelope {
            success: true,
            message: None,
            data: Value::Object(map),
        },
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Extract a human-readable message from an XML error page.
///
/// Preference order: `<message>`, then `<error>`, then a generic line
/// built from the numeric `<status>` tag or the HTTP status.
fn extract_xml_message(text: &str, http_status: u16) -> String {
    if let Some(message) = extract_tag(text, "message") {
        return message;
    }
    if let Some(error) = extract_tag(text, "error") {
        return error;
    }
    let status = extract_tag(text, "status")
        .and_then(|s| s.trim().parse::<u16>().ok())
        .unwrap_or(http_status);
    format!("Server error ({status})")
}

/// Content of the first `<tag>...</tag>` span, if present.
fn extract_tag(text: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(text[start..end].to_string())
}
