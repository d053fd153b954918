use crate::metadata::MetadataMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use strum::{AsRefStr, Display, EnumIter, EnumString, FromRepr};
use thiserror::Error;

/// Canonical RPC status codes
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
    FromRepr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    pub fn value(self) -> i32 {
        self as i32
    }

    /// Unknown numeric values collapse to `Unknown`
    pub fn from_value(value: i32) -> Self {
        Self::from_repr(value).unwrap_or(Self::Unknown)
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl Default for Code {
    fn default() -> Self {
        Self::Ok
    }
}

/// Typed payloads carried in the error detail channel of a `Status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDetail {
    /// Server-suggested minimum delay before the next attempt
    RetryInfo {
        #[serde(with = "crate::serializer::duration_ms")]
        retry_delay: Duration,
    },
    /// Machine-readable cause of the error
    ErrorInfo { reason: String, domain: String },
}

/// Outcome of a call: a code, a human readable message, typed details and
/// the trailers that accompanied it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Error)]
pub struct Status {
    pub code: Code,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
    #[serde(default, skip_serializing_if = "MetadataMap::is_empty")]
    pub metadata: MetadataMap,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "status: {}", self.code)
        } else {
            write!(f, "status: {}, message: {}", self.code, self.message)
        }
    }
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Vec::new(),
            metadata: MetadataMap::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(Code::Ok, "")
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(Code::PermissionDenied, message)
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(Code::Aborted, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }

    pub fn with_detail(mut self, detail: ErrorDetail) -> Self {
        self.details.push(detail);
        self
    }

    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_code_values_round_trip() {
        for code in Code::iter() {
            assert_eq!(Code::from_value(code.value()), code);
        }
        assert_eq!(Code::from_value(99), Code::Unknown);
    }

    #[test]
    fn test_code_names_are_snake_case() {
        assert_eq!(Code::DeadlineExceeded.to_string(), "deadline_exceeded");
        assert_eq!(
            Code::from_str("permission_denied").unwrap(),
            Code::PermissionDenied
        );
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::ok().to_string(), "status: ok");
        assert_eq!(
            Status::unavailable("client closed").to_string(),
            "status: unavailable, message: client closed"
        );
    }

    #[test]
    fn test_status_serializes_details() {
        let status = Status::unavailable("retry later").with_detail(ErrorDetail::RetryInfo {
            retry_delay: Duration::from_secs(2),
        });
        let json = serde_json::to_string(&status).unwrap();
        let back: Status = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
        assert!(json.contains("2000"));
    }
}
