//! Response classification
//!
//! Every response of the business API is reduced to one [`Classification`]
//! by [`classify`], and the pipeline matches on it exhaustively.

use crate::config::AuthSignals;
use crate::types::SUCCESS_CODE;
use bytes::Bytes;
use serde_json::Value;

const DEFAULT_FAILURE_MESSAGE: &str = "Request failed";

/// What the caller expects in the response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseKind {
    /// `{code, message, data}` envelope
    #[default]
    Json,
    /// File download; envelope validation is skipped unless the payload is JSON
    Binary,
}

/// A received response, before interpretation
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub body: Bytes,
}

/// Downloaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    /// File name from `Content-Disposition`, percent-decoded
    pub file_name: Option<String>,
}

/// Which recognizer flagged the authentication failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSignal {
    HttpStatus,
    BusinessCode { code: i64, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Success(Value),
    Download(Download),
    Unauthorized(AuthSignal),
    Business { code: i64, message: String },
    Forbidden(String),
    NotFound(String),
    ServerError { status: u16, message: String },
    HttpError { status: u16, message: String },
    /// 2xx JSON request whose body is not JSON
    Malformed(String),
}

/// Classify a response
pub fn classify(response: &RawResponse, kind: ResponseKind, signals: &AuthSignals) -> Classification {
    let status = response.status;

    if status == 401 && signals.http_status {
        return Classification::Unauthorized(AuthSignal::HttpStatus);
    }

    if !(200..300).contains(&status) {
        let message = error_message(&response.body);
        return match status {
            403 => Classification::Forbidden(message),
            404 => Classification::NotFound(message),
            500..=599 => Classification::ServerError { status, message },
            _ => Classification::HttpError { status, message },
        };
    }

    match kind {
        ResponseKind::Binary => classify_binary(response, signals),
        ResponseKind::Json => classify_json(&response.body, signals),
    }
}

fn classify_binary(response: &RawResponse, signals: &AuthSignals) -> Classification {
    // The caller asked for a file but may have got an error body instead
    if is_json(response.content_type.as_deref()) {
        if let Ok(body) = serde_json::from_slice::<Value>(&response.body) {
            if let Some(code) = body.get("code") {
                if envelope_code(code) != Some(SUCCESS_CODE) {
                    return classify_failure_code(code, &body, signals);
                }
            }
        }
    }

    Classification::Download(Download {
        bytes: response.body.clone(),
        content_type: response.content_type.clone(),
        file_name: response
            .content_disposition
            .as_deref()
            .and_then(parse_file_name),
    })
}

fn classify_json(body: &Bytes, signals: &AuthSignals) -> Classification {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Classification::Success(Value::Null);
    }

    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => return Classification::Malformed(format!("response body is not JSON: {e}")),
    };

    let Some(code) = value.get("code") else {
        // Not an envelope; hand the body over unchanged
        return Classification::Success(value);
    };

    if envelope_code(code) == Some(SUCCESS_CODE) {
        let data = value.get("data").cloned().unwrap_or(Value::Null);
        return Classification::Success(data);
    }

    classify_failure_code(code, &value, signals)
}

fn classify_failure_code(code: &Value, body: &Value, signals: &AuthSignals) -> Classification {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_FAILURE_MESSAGE)
        .to_string();
    let numeric = envelope_code(code).unwrap_or_default();

    if signals.business_code_prefix && code_text(code).starts_with("401") {
        return Classification::Unauthorized(AuthSignal::BusinessCode {
            code: numeric,
            message,
        });
    }

    Classification::Business {
        code: numeric,
        message,
    }
}

/// Envelope code as an integer; numeric strings are accepted
fn envelope_code(code: &Value) -> Option<i64> {
    match code {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn code_text(code: &Value) -> String {
    match code {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        let mime = ct.split(';').next().unwrap_or_default().trim();
        mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
    })
}

/// Message of an error response body, if it is a JSON object with one
fn error_message(body: &Bytes) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string())
}

/// Extract the file name from a `Content-Disposition` header value
///
/// `filename*=UTF-8''...` wins over `filename=...`.
pub fn parse_file_name(disposition: &str) -> Option<String> {
    let mut plain = None;

    for param in disposition.split(';').map(str::trim) {
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');

        if name.eq_ignore_ascii_case("filename*") {
            let encoded = value.rsplit("''").next().unwrap_or(value);
            if let Ok(decoded) = urlencoding::decode(encoded) {
                if !decoded.is_empty() {
                    return Some(decoded.into_owned());
                }
            }
        } else if name.eq_ignore_ascii_case("filename") && !value.is_empty() {
            plain = Some(
                urlencoding::decode(value)
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| value.to_string()),
            );
        }
    }

    plain
}
