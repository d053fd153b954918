// Metadata codec
//
// Decodes the identification, resource and feature-negotiation headers a
// client attaches to every call, and encodes the routing cookie (trailer) and
// retry delay (error detail) a server attaches to failures.

use crate::status::{ErrorDetail, Status};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub const USER_AGENT: &str = "user-agent";
pub const API_CLIENT: &str = "x-goog-api-client";
pub const REQUEST_PARAMS: &str = "x-goog-request-params";
pub const FEATURE_FLAGS: &str = "bigtable-features";
/// Every trailer whose name starts with this prefix is a routing cookie
pub const ROUTING_COOKIE_PREFIX: &str = "x-goog-cbt-cookie";
pub const DEFAULT_ROUTING_COOKIE_HEADER: &str = "x-goog-cbt-cookie-test";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Header '{0}' is missing")]
    Missing(&'static str),
    #[error("Header '{0}' is not valid base64: {1}")]
    Base64(&'static str, base64::DecodeError),
    #[error("Header '{0}' does not hold a valid structure: {1}")]
    Structure(&'static str, serde_json::Error),
}

/// Header name → values, names lower-cased
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataMap(BTreeMap<String, Vec<String>>);

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_ascii_lowercase(), vec![value.into()]);
    }

    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        self.0
            .entry(key.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.0
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        !self.get_all(key).is_empty()
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.0.remove(&key.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Copy every entry of `other` into self, replacing existing keys
    pub fn merge(&mut self, other: &MetadataMap) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

/// Either identification header is enough
pub fn has_client_identity(metadata: &MetadataMap) -> bool {
    metadata.contains_key(USER_AGENT) || metadata.contains_key(API_CLIENT)
}

/// Decoded `x-goog-request-params` value
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestParams {
    pub table_name: Option<String>,
    pub app_profile_id: Option<String>,
    /// The header value as received
    pub raw: String,
}

impl RequestParams {
    pub fn encode(table_name: &str, app_profile_id: &str) -> String {
        let mut value = format!("table_name={}", urlencoding::encode(table_name));
        if !app_profile_id.is_empty() {
            value.push_str("&app_profile_id=");
            value.push_str(&urlencoding::encode(app_profile_id));
        }
        value
    }

    pub fn decode(metadata: &MetadataMap) -> Result<Self, MetadataError> {
        let raw = metadata
            .get(REQUEST_PARAMS)
            .ok_or(MetadataError::Missing(REQUEST_PARAMS))?;
        Ok(Self::parse(raw))
    }

    /// Lenient parse: unknown keys are ignored, undecodable values kept as-is
    pub fn parse(raw: &str) -> Self {
        let mut params = Self {
            raw: raw.to_string(),
            ..Default::default()
        };
        for pair in raw.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            match key {
                "table_name" => params.table_name = Some(value),
                "app_profile_id" => params.app_profile_id = Some(value),
                _ => {}
            }
        }
        params
    }

    /// The resource header names `table` either verbatim or URL-encoded
    pub fn targets(&self, table: &str) -> bool {
        self.raw.contains(table) || self.raw.contains(urlencoding::encode(table).as_ref())
    }
}

/// Features a client advertises it supports
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub reverse_scans: bool,
    pub mutate_rows_rate_limit: bool,
    pub last_scanned_row_responses: bool,
    pub routing_cookie: bool,
    pub retry_info: bool,
    pub client_side_metrics_enabled: bool,
}

impl FeatureFlags {
    pub fn encode(&self) -> String {
        // Serializing a struct of booleans cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE.encode(json)
    }

    pub fn decode_value(value: &str) -> Result<Self, MetadataError> {
        let bytes = URL_SAFE
            .decode(value.trim())
            .map_err(|e| MetadataError::Base64(FEATURE_FLAGS, e))?;
        serde_json::from_slice(&bytes).map_err(|e| MetadataError::Structure(FEATURE_FLAGS, e))
    }

    pub fn decode(metadata: &MetadataMap) -> Result<Self, MetadataError> {
        let value = metadata
            .get(FEATURE_FLAGS)
            .ok_or(MetadataError::Missing(FEATURE_FLAGS))?;
        Self::decode_value(value)
    }
}

/// Place a routing cookie in the trailers of a failing call
pub fn encode_routing_cookie(trailers: &mut MetadataMap, header: &str, cookie: &str) {
    trailers.insert(header, cookie);
}

/// Every routing cookie carried by `metadata`, keyed by header name
pub fn routing_cookies_of(metadata: &MetadataMap) -> MetadataMap {
    let mut cookies = MetadataMap::new();
    for (key, values) in metadata.iter() {
        if key.starts_with(ROUTING_COOKIE_PREFIX) {
            for value in values {
                cookies.append(key, value.clone());
            }
        }
    }
    cookies
}

/// Suggested retry delay travels as a typed detail, never as a header
pub fn attach_retry_info(status: &mut Status, retry_delay: Duration) {
    status
        .details
        .retain(|d| !matches!(d, ErrorDetail::RetryInfo { .. }));
    status.details.push(ErrorDetail::RetryInfo { retry_delay });
}

pub fn retry_delay_of(status: &Status) -> Option<Duration> {
    status.details.iter().find_map(|d| match d {
        ErrorDetail::RetryInfo { retry_delay } => Some(*retry_delay),
        _ => None,
    })
}
