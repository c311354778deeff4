//! Structured log fields and the helpers that produce the fixed call fields.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use tonic::Code;

/// Key of the field holding the call's outcome code.
pub const CODE_KEY: &str = "grpc.code";
/// Key of the field holding the call's error, or null.
pub const ERROR_KEY: &str = "error";
/// Key of the millisecond duration field.
pub const TIME_MS_KEY: &str = "grpc.time_ms";
/// Key of the native duration field.
pub const DURATION_KEY: &str = "grpc.duration";
/// Key of the call start timestamp.
pub const START_TIME_KEY: &str = "grpc.start_time";
/// Key of the call deadline timestamp.
pub const DEADLINE_KEY: &str = "grpc.request.deadline";
/// Key of the system label.
pub const SYSTEM_KEY: &str = "system";
/// Key of the role label.
pub const SPAN_KIND_KEY: &str = "span.kind";
/// Key of the service name.
pub const SERVICE_KEY: &str = "grpc.service";
/// Key of the method name.
pub const METHOD_KEY: &str = "grpc.method";

/// Metadata key carrying the client's timeout.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// A value attached to a log field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    F32(f32),
    Duration(Duration),
    Bool(bool),
    Null,
}

impl FieldValue {
    /// Returns the string payload, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::F32(v) => write!(f, "{v}"),
            FieldValue::Duration(d) => write!(f, "{d:?}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Null => f.write_str("null"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        FieldValue::F32(value)
    }
}

impl From<Duration> for FieldValue {
    fn from(value: Duration) -> Self {
        FieldValue::Duration(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// A single key/value pair of a structured log record.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: Cow<'static, str>,
    pub value: FieldValue,
}

impl Field {
    pub fn new(key: impl Into<Cow<'static, str>>, value: impl Into<FieldValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Renders a field list as `key=value` pairs, quoting values with whitespace.
pub struct DisplayFields<'a>(pub &'a [Field]);

impl fmt::Display for DisplayFields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            let value = field.value.to_string();
            if value.is_empty() || value.contains(char::is_whitespace) || value.contains('"') {
                write!(f, "{}={:?}", field.key, value)?;
            } else {
                write!(f, "{}={}", field.key, value)?;
            }
        }
        Ok(())
    }
}

/// Canonical gRPC name of a status code, as printed in `grpc.code`.
pub fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "Canceled",
        Code::Unknown => "Unknown",
        Code::InvalidArgument => "InvalidArgument",
        Code::DeadlineExceeded => "DeadlineExceeded",
        Code::NotFound => "NotFound",
        Code::AlreadyExists => "AlreadyExists",
        Code::PermissionDenied => "PermissionDenied",
        Code::ResourceExhausted => "ResourceExhausted",
        Code::FailedPrecondition => "FailedPrecondition",
        Code::Aborted => "Aborted",
        Code::OutOfRange => "OutOfRange",
        Code::Unimplemented => "Unimplemented",
        Code::Internal => "Internal",
        Code::Unavailable => "Unavailable",
        Code::DataLoss => "DataLoss",
        Code::Unauthenticated => "Unauthenticated",
    }
}

/// Splits a full method path (`/package.Service/Method`) into service and method.
///
/// The service is everything before the last `/` with the leading `/` removed;
/// a path without any `/` has an empty service.
pub fn split_method(full_method: &str) -> (&str, &str) {
    match full_method.rsplit_once('/') {
        Some((service, method)) => (service.trim_start_matches('/'), method),
        None => ("", full_method),
    }
}

/// Parses a `grpc-timeout` header value.
///
/// The wire format is at most eight ASCII digits followed by one unit
/// character. Anything else yields `None`.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || value.len() > 9 || !value.is_ascii() {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;
    let duration = match unit {
        "H" => Duration::from_secs(amount.checked_mul(3600)?),
        "M" => Duration::from_secs(amount.checked_mul(60)?),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(duration)
}
