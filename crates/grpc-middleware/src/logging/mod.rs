//! Request-scoped logging for gRPC calls.
//!
//! Every call handled or issued through [`GrpcLogging`] (or its tower
//! [`LoggingLayer`]) produces one summary record carrying the call's outcome
//! code, error and duration, next to the call's identity fields. The policy
//! deciding whether and how a call is logged is an [`Options`] value resolved
//! from [`LogOption`]s over per-role defaults.
//!
//! Server handlers can log through the call's [`CtxLogger`], which is
//! inserted into the request extensions and already carries the call's
//! fields.

mod ctx_logger;
mod fields;
mod interceptor;
mod layer;
mod logger;
mod options;
mod summary;

pub use ctx_logger::{CtxLogger, call_fields};
pub use fields::{
    CODE_KEY, DEADLINE_KEY, DURATION_KEY, DisplayFields, ERROR_KEY, Field, FieldValue,
    GRPC_TIMEOUT_HEADER, METHOD_KEY, SERVICE_KEY, SPAN_KIND_KEY, START_TIME_KEY, SYSTEM_KEY,
    TIME_MS_KEY, code_name, parse_grpc_timeout, split_method,
};
pub use interceptor::{GrpcLogging, GrpcLoggingBuilder};
pub use layer::{LoggedBody, LoggingLayer, LoggingService};
pub use logger::{DEFAULT_TARGET, LogRecord, Logger, MemoryLogger, TracingLogger};
pub use options::{
    CodeToLevel, Decider, DurationToFields, ErrorToCode, LogOption, Options, Role,
    default_client_code_to_level, default_code_to_level, default_decider, default_error_to_code,
    duration_to_duration_field, duration_to_time_millis_field, with_codes, with_decider,
    with_duration_field, with_levels,
};
pub use summary::{CallKind, LoggedStream, summary_message};

/// Values of the fixed identity fields attached to every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallLabels {
    /// Value of the `system` field.
    pub system: String,
    /// Value of `span.kind` on server calls.
    pub server_kind: String,
    /// Value of `span.kind` on client calls.
    pub client_kind: String,
}

impl Default for CallLabels {
    fn default() -> Self {
        Self {
            system: "grpc".to_string(),
            server_kind: "server".to_string(),
            client_kind: "client".to_string(),
        }
    }
}
