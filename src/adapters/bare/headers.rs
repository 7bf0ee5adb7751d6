//! Header encoding for bare v3.
//!
//! Browsers cap individual header values, so long JSON blobs travel as
//! `x-bare-headers-0`, `x-bare-headers-1`, ... with each part prefixed by `;`.

use std::collections::BTreeMap;

use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use super::error::BareError;

/// Values longer than this are split across numbered headers.
pub const SPLIT_LIMIT: usize = 3072;

/// Headers the client may never ask us to forward.
pub const FORBIDDEN_FORWARD: &[&str] = &[
    "connection",
    "transfer-encoding",
    "host",
    "origin",
    "referer",
];

/// Headers the client may never ask us to pass back.
pub const FORBIDDEN_PASS: &[&str] = &[
    "vary",
    "connection",
    "transfer-encoding",
    "access-control-allow-headers",
    "access-control-allow-methods",
    "access-control-expose-headers",
    "access-control-max-age",
    "access-control-request-headers",
    "access-control-request-method",
];

pub const DEFAULT_FORWARD: &[&str] = &["accept-encoding", "accept-language"];

pub const DEFAULT_PASS: &[&str] = &["content-encoding", "content-length", "last-modified"];

pub const CACHE_FORWARD: &[&str] = &["if-modified-since", "if-none-match", "cache-control"];

pub const CACHE_PASS: &[&str] = &["cache-control", "etag"];

/// A header value in JSON form: one string or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonHeaderValue {
    One(String),
    Many(Vec<String>),
}

impl JsonHeaderValue {
    pub fn values(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            JsonHeaderValue::One(value) => std::slice::from_ref(value),
            JsonHeaderValue::Many(values) => values,
        };
        values.iter().map(String::as_str)
    }
}

/// Read a header that may have been split into numbered parts.
pub fn read_split(headers: &HeaderMap, name: &str) -> Result<Option<String>, BareError> {
    if let Some(value) = headers.get(name) {
        return header_text(value, name).map(Some);
    }

    let mut joined = String::new();
    let mut index = 0;
    loop {
        let part_name = format!("{name}-{index}");
        let Some(value) = headers.get(part_name.as_str()) else {
            break;
        };
        let text = header_text(value, &part_name)?;
        let Some(rest) = text.strip_prefix(';') else {
            return Err(BareError::invalid_header(
                &part_name,
                "Value didn't begin with semi-colon.",
            ));
        };
        joined.push_str(rest);
        index += 1;
    }

    Ok((index > 0).then_some(joined))
}

fn header_text(value: &HeaderValue, name: &str) -> Result<String, BareError> {
    String::from_utf8(value.as_bytes().to_vec())
        .map_err(|_| BareError::invalid_header(name, "Header value is not valid UTF-8."))
}

/// Split `value` into `(name, value)` pairs that each stay under the limit.
pub fn split(name: &str, value: &str) -> Vec<(String, String)> {
    if value.len() <= SPLIT_LIMIT {
        return vec![(name.to_string(), value.to_string())];
    }

    let mut parts = Vec::new();
    let mut rest = value;
    while !rest.is_empty() {
        let mut end = rest.len().min(SPLIT_LIMIT);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (chunk, tail) = rest.split_at(end);
        parts.push((format!("{name}-{}", parts.len()), format!(";{chunk}")));
        rest = tail;
    }
    parts
}

/// Insert `value` under `name`, splitting it when needed.
pub fn write_split(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), BareError> {
    for (part_name, part_value) in split(name, value) {
        let header_name = HeaderName::from_bytes(part_name.as_bytes())
            .map_err(|e| BareError::unknown(e.to_string()))?;
        let header_value = HeaderValue::from_bytes(part_value.as_bytes())
            .map_err(|e| BareError::unknown(e.to_string()))?;
        headers.insert(header_name, header_value);
    }
    Ok(())
}

/// Decode the `x-bare-headers` JSON object into an outbound header map.
pub fn parse_remote_headers(json: &str) -> Result<HeaderMap, BareError> {
    let parsed: BTreeMap<String, JsonHeaderValue> = serde_json::from_str(json)
        .map_err(|e| BareError::invalid_header("x-bare-headers", e.to_string()))?;

    let mut headers = HeaderMap::new();
    for (name, value) in &parsed {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            BareError::invalid_header("x-bare-headers", format!("Invalid header name: {name}"))
        })?;
        for item in value.values() {
            let header_value = HeaderValue::from_bytes(item.as_bytes()).map_err(|_| {
                BareError::invalid_header("x-bare-headers", format!("Invalid value for {name}"))
            })?;
            headers.append(header_name.clone(), header_value);
        }
    }
    Ok(headers)
}

/// Encode remote response headers as the JSON object bare clients expect.
pub fn encode_remote_headers(headers: &HeaderMap) -> String {
    let mut object: BTreeMap<&str, JsonHeaderValue> = BTreeMap::new();
    for name in headers.keys() {
        let mut values: Vec<String> = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        let value = if values.len() == 1 {
            JsonHeaderValue::One(values.remove(0))
        } else {
            JsonHeaderValue::Many(values)
        };
        object.insert(name.as_str(), value);
    }
    serde_json::to_string(&object).unwrap_or_else(|_| "{}".to_string())
}

/// Parse a comma separated header name list, checking it against `forbidden`.
pub fn parse_name_list(
    raw: Option<&HeaderValue>,
    list: &str,
    forbidden: &[&str],
) -> Result<Vec<String>, BareError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let text = header_text(raw, list)?;

    let mut names = Vec::new();
    for name in text.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let name = name.to_ascii_lowercase();
        if forbidden.contains(&name.as_str()) {
            return Err(BareError::forbidden_header(list, &name));
        }
        names.push(name);
    }
    Ok(names)
}

/// Parse the comma separated status codes in `x-bare-pass-status`.
pub fn parse_status_list(raw: Option<&HeaderValue>) -> Result<Vec<u16>, BareError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let text = header_text(raw, "x-bare-pass-status")?;

    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u16>().map_err(|_| {
                BareError::invalid_header("x-bare-pass-status", format!("Invalid status: {s}"))
            })
        })
        .collect()
}
