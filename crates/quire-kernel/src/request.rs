//! HTTP method / content-type contract shared by the content operations.
//!
//! `GET` renders current state. `POST` with a JSON or url-encoded body
//! performs the mutation. Anything else is a 405 or 415.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// Request body encodings accepted on `POST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Form,
}

/// What a handler should do with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Render,
    Mutate(BodyKind),
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("unsupported content type: {0}")]
    UnsupportedMediaType(String),

    #[error("malformed body: {0}")]
    BadBody(String),
}

impl RequestError {
    /// HTTP status code for the response.
    pub fn status(&self) -> u16 {
        match self {
            Self::MethodNotAllowed(_) => 405,
            Self::UnsupportedMediaType(_) => 415,
            Self::BadBody(_) => 400,
        }
    }
}

/// Media type with parameters and case stripped.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Map a request onto the GET/POST contract.
pub fn classify(method: &str, content_type: Option<&str>) -> Result<Disposition, RequestError> {
    match method {
        "GET" | "HEAD" => Ok(Disposition::Render),
        "POST" => {
            let ct = content_type.map(media_type).unwrap_or_default();
            match ct.as_str() {
                "application/json" => Ok(Disposition::Mutate(BodyKind::Json)),
                "application/x-www-form-urlencoded" => Ok(Disposition::Mutate(BodyKind::Form)),
                _ => Err(RequestError::UnsupportedMediaType(ct)),
            }
        }
        other => Err(RequestError::MethodNotAllowed(other.to_string())),
    }
}

/// Decode a `POST` body into `T`.
///
/// Form fields become JSON strings; a key given more than once becomes an
/// array of strings, so `Vec<String>` fields need at least two values or a
/// JSON body.
pub fn decode_body<T: DeserializeOwned>(kind: BodyKind, body: &[u8]) -> Result<T, RequestError> {
    match kind {
        BodyKind::Json => {
            serde_json::from_slice(body).map_err(|e| RequestError::BadBody(e.to_string()))
        }
        BodyKind::Form => {
            let text =
                std::str::from_utf8(body).map_err(|e| RequestError::BadBody(e.to_string()))?;
            let map = parse_form(text)?;
            serde_json::from_value(Value::Object(map))
                .map_err(|e| RequestError::BadBody(e.to_string()))
        }
    }
}

fn decode_component(raw: &str) -> Result<String, RequestError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .map_err(|e| RequestError::BadBody(e.to_string()))
}

fn parse_form(text: &str) -> Result<Map<String, Value>, RequestError> {
    let mut map = Map::new();
    for pair in text.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(k)?;
        let value = Value::String(decode_component(v)?);
        match map.get_mut(&key) {
            None => {
                map.insert(key, value);
            }
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    Ok(map)
}

/// True if the client asked for a JSON response.
pub fn wants_json(accept: Option<&str>) -> bool {
    accept.is_some_and(|accept| {
        accept
            .split(',')
            .any(|part| media_type(part) == "application/json")
    })
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(authorization: Option<&str>) -> Option<&str> {
    let value = authorization?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
