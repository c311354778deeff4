//! Resolution of the logging policy from a list of options.
//!
//! Each [`LogOption`] governs exactly one part of the policy. Options are
//! applied in order on top of role-specific defaults, so a later option wins
//! over an earlier one for the same part.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tonic::{Code, Status};
use tracing::Level;

use super::fields::{DURATION_KEY, Field, TIME_MS_KEY};

/// Decides whether a finished call is logged, given its full method and error.
pub type Decider = Arc<dyn Fn(&str, Option<&Status>) -> bool + Send + Sync>;
/// Maps a call's error (or its absence) to an outcome code.
pub type ErrorToCode = Arc<dyn Fn(Option<&Status>) -> Code + Send + Sync>;
/// Maps an outcome code to a severity.
pub type CodeToLevel = Arc<dyn Fn(Code) -> Level + Send + Sync>;
/// Maps the elapsed call time to log fields.
pub type DurationToFields = Arc<dyn Fn(Duration) -> Vec<Field> + Send + Sync>;

/// Which side of the call the interceptor runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// A fully resolved logging policy.
#[derive(Clone)]
pub struct Options {
    pub should_log: Decider,
    pub error_to_code: ErrorToCode,
    pub code_to_level: CodeToLevel,
    pub duration_to_fields: DurationToFields,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options").finish_non_exhaustive()
    }
}

impl Options {
    /// Resolves options for the given role.
    pub fn resolve(role: Role, opts: impl IntoIterator<Item = LogOption>) -> Self {
        let code_to_level: CodeToLevel = match role {
            Role::Server => Arc::new(default_code_to_level),
            Role::Client => Arc::new(default_client_code_to_level),
        };
        let mut resolved = Options {
            should_log: Arc::new(default_decider),
            error_to_code: Arc::new(default_error_to_code),
            code_to_level,
            duration_to_fields: Arc::new(duration_to_time_millis_field),
        };
        for opt in opts {
            opt.apply(&mut resolved);
        }
        resolved
    }

    /// Resolves options on top of the server defaults.
    pub fn server(opts: impl IntoIterator<Item = LogOption>) -> Self {
        Self::resolve(Role::Server, opts)
    }

    /// Resolves options on top of the client defaults.
    pub fn client(opts: impl IntoIterator<Item = LogOption>) -> Self {
        Self::resolve(Role::Client, opts)
    }
}

/// One override of the logging policy.
#[derive(Clone)]
pub enum LogOption {
    Decider(Decider),
    Levels(CodeToLevel),
    Codes(ErrorToCode),
    DurationField(DurationToFields),
}

impl fmt::Debug for LogOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogOption::Decider(_) => "Decider",
            LogOption::Levels(_) => "Levels",
            LogOption::Codes(_) => "Codes",
            LogOption::DurationField(_) => "DurationField",
        };
        f.write_str(name)
    }
}

impl LogOption {
    fn apply(self, options: &mut Options) {
        match self {
            LogOption::Decider(f) => options.should_log = f,
            LogOption::Levels(f) => options.code_to_level = f,
            LogOption::Codes(f) => options.error_to_code = f,
            LogOption::DurationField(f) => options.duration_to_fields = f,
        }
    }
}

/// Customizes the function deciding whether a call is logged.
pub fn with_decider<F>(f: F) -> LogOption
where
    F: Fn(&str, Option<&Status>) -> bool + Send + Sync + 'static,
{
    LogOption::Decider(Arc::new(f))
}

/// Customizes the mapping from outcome codes to severities.
pub fn with_levels<F>(f: F) -> LogOption
where
    F: Fn(Code) -> Level + Send + Sync + 'static,
{
    LogOption::Levels(Arc::new(f))
}

/// Customizes the mapping from errors to outcome codes.
pub fn with_codes<F>(f: F) -> LogOption
where
    F: Fn(Option<&Status>) -> Code + Send + Sync + 'static,
{
    LogOption::Codes(Arc::new(f))
}

/// Customizes the mapping from call durations to log fields.
pub fn with_duration_field<F>(f: F) -> LogOption
where
    F: Fn(Duration) -> Vec<Field> + Send + Sync + 'static,
{
    LogOption::DurationField(Arc::new(f))
}

/// Logs every call.
pub fn default_decider(_full_method: &str, _err: Option<&Status>) -> bool {
    true
}

/// `None` is success; a status carries its own code.
pub fn default_error_to_code(err: Option<&Status>) -> Code {
    err.map_or(Code::Ok, Status::code)
}

/// Server-side severities.
pub fn default_code_to_level(code: Code) -> Level {
    match code {
        Code::Ok
        | Code::Cancelled
        | Code::InvalidArgument
        | Code::NotFound
        | Code::AlreadyExists
        | Code::Unauthenticated => Level::INFO,
        Code::DeadlineExceeded
        | Code::PermissionDenied
        | Code::ResourceExhausted
        | Code::FailedPrecondition
        | Code::Aborted
        | Code::OutOfRange
        | Code::Unavailable => Level::WARN,
        Code::Unknown | Code::Unimplemented | Code::Internal | Code::DataLoss => Level::ERROR,
    }
}

/// Client-side severities.
///
/// `Code` is exhaustive in tonic, so the "any other code is INFO" rule has no
/// arm of its own.
pub fn default_client_code_to_level(code: Code) -> Level {
    match code {
        Code::Ok
        | Code::Cancelled
        | Code::InvalidArgument
        | Code::NotFound
        | Code::AlreadyExists
        | Code::ResourceExhausted
        | Code::FailedPrecondition
        | Code::Aborted
        | Code::OutOfRange => Level::DEBUG,
        Code::Unknown
        | Code::DeadlineExceeded
        | Code::PermissionDenied
        | Code::Unauthenticated => Level::INFO,
        Code::Unimplemented | Code::Internal | Code::Unavailable | Code::DataLoss => Level::WARN,
    }
}

/// Logs the duration as `grpc.time_ms`, milliseconds with microsecond precision.
pub fn duration_to_time_millis_field(duration: Duration) -> Vec<Field> {
    vec![Field::new(TIME_MS_KEY, duration_to_milliseconds(duration))]
}

/// Logs the duration as a native `grpc.duration` value.
pub fn duration_to_duration_field(duration: Duration) -> Vec<Field> {
    vec![Field::new(DURATION_KEY, duration)]
}

fn duration_to_milliseconds(duration: Duration) -> f32 {
    duration.as_micros() as f32 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::fields::FieldValue;

    const ALL_CODES: [Code; 17] = [
        Code::Ok,
        Code::Cancelled,
        Code::Unknown,
        Code::InvalidArgument,
        Code::DeadlineExceeded,
        Code::NotFound,
        Code::AlreadyExists,
        Code::PermissionDenied,
        Code::ResourceExhausted,
        Code::FailedPrecondition,
        Code::Aborted,
        Code::OutOfRange,
        Code::Unimplemented,
        Code::Internal,
        Code::Unavailable,
        Code::DataLoss,
        Code::Unauthenticated,
    ];

    #[test]
    fn test_server_level_table() {
        let expected = [
            Level::INFO,  // Ok
            Level::INFO,  // Cancelled
            Level::ERROR, // Unknown
            Level::INFO,  // InvalidArgument
            Level::WARN,  // DeadlineExceeded
            Level::INFO,  // NotFound
            Level::INFO,  // AlreadyExists
            Level::WARN,  // PermissionDenied
            Level::WARN,  // ResourceExhausted
            Level::WARN,  // FailedPrecondition
            Level::WARN,  // Aborted
            Level::WARN,  // OutOfRange
            Level::ERROR, // Unimplemented
            Level::ERROR, // Internal
            Level::WARN,  // Unavailable
            Level::ERROR, // DataLoss
            Level::INFO,  // Unauthenticated
        ];
        for (code, level) in ALL_CODES.iter().zip(expected) {
            assert_eq!(default_code_to_level(*code), level, "server level for {code:?}");
        }
    }

    #[test]
    fn test_client_level_table() {
        let expected = [
            Level::DEBUG, // Ok
            Level::DEBUG, // Cancelled
            Level::INFO,  // Unknown
            Level::DEBUG, // InvalidArgument
            Level::INFO,  // DeadlineExceeded
            Level::DEBUG, // NotFound
            Level::DEBUG, // AlreadyExists
            Level::INFO,  // PermissionDenied
            Level::DEBUG, // ResourceExhausted
            Level::DEBUG, // FailedPrecondition
            Level::DEBUG, // Aborted
            Level::DEBUG, // OutOfRange
            Level::WARN,  // Unimplemented
            Level::WARN,  // Internal
            Level::WARN,  // Unavailable
            Level::WARN,  // DataLoss
            Level::INFO,  // Unauthenticated
        ];
        for (code, level) in ALL_CODES.iter().zip(expected) {
            assert_eq!(default_client_code_to_level(*code), level, "client level for {code:?}");
        }
    }

    #[test]
    fn test_empty_options_yield_role_defaults() {
        let server = Options::server(Vec::new());
        let client = Options::client(Vec::new());

        assert!((server.should_log)("/svc/Method", None));
        assert!((client.should_log)("/svc/Method", Some(&Status::internal("x"))));
        assert_eq!((server.code_to_level)(Code::Ok), Level::INFO);
        assert_eq!((client.code_to_level)(Code::Ok), Level::DEBUG);
        assert_eq!((server.error_to_code)(None), Code::Ok);
        assert_eq!(
            (server.error_to_code)(Some(&Status::not_found("gone"))),
            Code::NotFound
        );
    }

    #[test]
    fn test_later_options_override_earlier_ones() {
        let opts = Options::client(vec![
            with_levels(|_| Level::TRACE),
            with_levels(|code| match code {
                Code::Unauthenticated => Level::ERROR,
                other => default_client_code_to_level(other),
            }),
        ]);

        assert_eq!((opts.code_to_level)(Code::Unauthenticated), Level::ERROR);
        assert_eq!((opts.code_to_level)(Code::Ok), Level::DEBUG);
    }

    #[test]
    fn test_options_only_touch_their_own_field() {
        let opts = Options::server(vec![with_decider(|method, _| method != "/health/Check")]);

        assert!(!(opts.should_log)("/health/Check", None));
        assert!((opts.should_log)("/svc/Method", None));
        assert_eq!((opts.code_to_level)(Code::Internal), Level::ERROR);
    }

    #[test]
    fn test_duration_to_time_millis_field() {
        let fields = duration_to_time_millis_field(Duration::from_nanos(1_234_567));
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].key, TIME_MS_KEY);
        assert_eq!(fields[0].value, FieldValue::F32(1.234));
    }

    #[test]
    fn test_duration_to_duration_field() {
        let fields = duration_to_duration_field(Duration::from_millis(5));
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].key, DURATION_KEY);
        assert_eq!(fields[0].value, FieldValue::Duration(Duration::from_millis(5)));
    }
}
