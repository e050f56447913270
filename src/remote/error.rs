//! Remote table error types and error-string classification.
//!
//! The remote API reports failures as a single line of text:
//!
//! ```text
//! 422 Client Error: Unprocessable Entity for url: https://api.airtable.com/v0/app/Table [Error: {'type': 'INVALID_VALUE', 'message': 'Bad value'}]
//! ```
//!
//! [`parse_request_error`] turns that line into structured [`ErrorDetails`]
//! so callers can log and surface a readable message.

use serde::Serialize;
use std::collections::BTreeMap;

/// Errors returned by a [`RemoteTableClient`](super::RemoteTableClient).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// A non-success HTTP response, rendered as the raw error line.
    #[error("{0}")]
    Http(String),

    /// The request never produced a response (DNS, TLS, connection reset).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The client could not be built for this configuration.
    #[error("Remote table not configured: {0}")]
    NotConfigured(String),
}

impl RemoteError {
    /// Build the canonical 404 error line for a missing record.
    #[must_use]
    pub fn not_found(url: &str) -> Self {
        Self::Http(format!(
            "404 Client Error: Not Found for url: {url} [Error: NOT_FOUND]"
        ))
    }

    /// Parsed status/type/message for this error.
    #[must_use]
    pub fn details(&self) -> ErrorDetails {
        match self {
            Self::Http(raw) => parse_request_error(raw),
            Self::Transport(_) => parse_request_error(""),
            Self::NotConfigured(reason) => ErrorDetails {
                status_code: 0,
                error_type: "NOT_CONFIGURED".to_string(),
                message: reason.clone(),
            },
        }
    }

    /// Whether the remote side answered "record does not exist".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Http(_) => {
                let details = self.details();
                details.status_code == 404 || details.error_type == "NOT_FOUND"
            }
            _ => false,
        }
    }
}

/// Structured form of a remote error line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetails {
    pub status_code: u16,
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

/// Parse a remote HTTP error line into [`ErrorDetails`].
///
/// Fixed cases:
/// - empty input or a `503 Server Error` → `SERVICE_UNAVAILABLE`
/// - status 502 → `SERVER_ERROR`
/// - an `[Error: NOT_FOUND]` body → `NOT_FOUND` / "Record not found"
///
/// Otherwise the bracketed body is read as a JSON object or a
/// single-quoted literal map carrying `type` and `message`. Lines that fit
/// none of these shapes come back as `UNKNOWN` with the raw text.
#[must_use]
pub fn parse_request_error(error: &str) -> ErrorDetails {
    if error.trim().is_empty() || error.contains("503 Server Error") {
        return ErrorDetails {
            status_code: 503,
            error_type: "SERVICE_UNAVAILABLE".to_string(),
            message: "The remote table service may be down, or is otherwise unreachable"
                .to_string(),
        };
    }

    let code = error
        .split(':')
        .next()
        .and_then(|head| head.split_whitespace().next())
        .and_then(|c| c.parse::<u16>().ok());

    let Some(code) = code else {
        return ErrorDetails {
            status_code: 0,
            error_type: "UNKNOWN".to_string(),
            message: error.to_string(),
        };
    };

    if code == 502 {
        return ErrorDetails {
            status_code: code,
            error_type: "SERVER_ERROR".to_string(),
            message: "Service may be down, or is otherwise unreachable".to_string(),
        };
    }

    let Some((_, body)) = error.split_once("[Error: ") else {
        return ErrorDetails {
            status_code: code,
            error_type: "UNKNOWN".to_string(),
            message: error.to_string(),
        };
    };
    let body = body.trim_end().trim_end_matches(']');

    if body == "NOT_FOUND" {
        return ErrorDetails {
            status_code: code,
            error_type: "NOT_FOUND".to_string(),
            message: "Record not found".to_string(),
        };
    }

    let parsed = serde_json::from_str::<BTreeMap<String, serde_json::Value>>(body)
        .ok()
        .map(|map| {
            map.into_iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect::<BTreeMap<_, _>>()
        })
        .or_else(|| parse_literal_map(body));

    match parsed {
        Some(info) => ErrorDetails {
            status_code: code,
            error_type: info
                .get("type")
                .cloned()
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            message: info.get("message").cloned().unwrap_or_else(|| body.to_string()),
        },
        None => ErrorDetails {
            status_code: code,
            error_type: body.to_string(),
            message: body.to_string(),
        },
    }
}

/// Parse `{'key': 'value', "k2": "v2"}` into a string map.
///
/// Only string keys and string values are accepted; anything else fails the
/// whole parse.
fn parse_literal_map(input: &str) -> Option<BTreeMap<String, String>> {
    let mut chars = input.trim().chars().peekable();
    if chars.next()? != '{' {
        return None;
    }

    let mut map = BTreeMap::new();
    loop {
        skip_ws(&mut chars);
        match chars.peek()? {
            '}' => {
                chars.next();
                break;
            }
            ',' => {
                chars.next();
                continue;
            }
            _ => {}
        }

        let key = read_quoted(&mut chars)?;
        skip_ws(&mut chars);
        if chars.next()? != ':' {
            return None;
        }
        skip_ws(&mut chars);
        let value = read_quoted(&mut chars)?;
        map.insert(key, value);
    }

    skip_ws(&mut chars);
    if chars.next().is_some() {
        return None;
    }
    Some(map)
}

fn skip_ws(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

fn read_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<String> {
    let quote = chars.next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }

    let mut out = String::new();
    loop {
        match chars.next()? {
            '\\' => out.push(chars.next()?),
            c if c == quote => return Some(out),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_is_service_unavailable() {
        let details = parse_request_error("");
        assert_eq!(details.status_code, 503);
        assert_eq!(details.error_type, "SERVICE_UNAVAILABLE");
        assert!(details.message.contains("may be down"));
    }

    #[test]
    fn test_parse_503_without_body() {
        let details = parse_request_error(
            "503 Server Error: Service Unavailable for url: https://api.airtable.com/v0/appX/Base",
        );
        assert_eq!(details.status_code, 503);
        assert_eq!(details.error_type, "SERVICE_UNAVAILABLE");
    }

    #[test]
    fn test_parse_502() {
        let details = parse_request_error(
            "502 Server Error: Bad Gateway for url: https://api.airtable.com/v0/appX/Base",
        );
        assert_eq!(details.status_code, 502);
        assert_eq!(details.error_type, "SERVER_ERROR");
    }

    #[test]
    fn test_parse_not_found_literal() {
        let details = parse_request_error(
            "404 Client Error: Not Found for url: https://api.airtable.com/v0/appX/Base/recX [Error: NOT_FOUND]",
        );
        assert_eq!(details.status_code, 404);
        assert_eq!(details.error_type, "NOT_FOUND");
        assert_eq!(details.message, "Record not found");
    }

    #[test]
    fn test_parse_single_quoted_body() {
        let details = parse_request_error(
            "401 Client Error: Unauthorized for url: https://api.airtable.com/v0/appX/T?filterByFormula=x [Error: {'type': 'AUTHENTICATION_REQUIRED', 'message': 'Authentication required'}]",
        );
        assert_eq!(details.status_code, 401);
        assert_eq!(details.error_type, "AUTHENTICATION_REQUIRED");
        assert_eq!(details.message, "Authentication required");
    }

    #[test]
    fn test_parse_json_body_with_apostrophe() {
        let details = parse_request_error(
            r#"422 Client Error: Unprocessable Entity for url: https://x/y [Error: {"type":"INVALID_VALUE_FOR_COLUMN","message":"Field 'Rating' can't accept 7"}]"#,
        );
        assert_eq!(details.status_code, 422);
        assert_eq!(details.error_type, "INVALID_VALUE_FOR_COLUMN");
        assert_eq!(details.message, "Field 'Rating' can't accept 7");
    }

    #[test]
    fn test_parse_garbage_falls_back() {
        let details = parse_request_error("connection refused");
        assert_eq!(details.error_type, "UNKNOWN");
        assert_eq!(details.message, "connection refused");
    }

    #[test]
    fn test_remote_error_not_found() {
        assert!(RemoteError::not_found("https://x/recA").is_not_found());
        assert!(!RemoteError::Transport("reset".into()).is_not_found());
        assert!(!RemoteError::Http("401 Client Error: Unauthorized for url: x [Error: {'type': 'AUTH', 'message': 'no'}]".into()).is_not_found());
    }

    #[test]
    fn test_transport_error_reads_as_unavailable() {
        let details = RemoteError::Transport("timed out".into()).details();
        assert_eq!(details.status_code, 503);
    }
}
