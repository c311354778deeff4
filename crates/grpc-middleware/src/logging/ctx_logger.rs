//! The request-scoped logger carried in a call's extensions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tonic::Request;
use tracing::Level;

use super::fields::{
    DEADLINE_KEY, Field, METHOD_KEY, SERVICE_KEY, SPAN_KIND_KEY, START_TIME_KEY, SYSTEM_KEY,
    split_method,
};
use super::logger::Logger;
use super::options::Role;
use super::CallLabels;
use crate::tags::Tags;

/// A logger pre-populated with the fields of one call.
///
/// Server interceptors insert it into the request extensions before the
/// handler runs; handlers fetch it with [`CtxLogger::extract`]. Records
/// emitted through it carry the call's tags as they are at emission time,
/// followed by the call's fixed fields.
#[derive(Clone)]
pub struct CtxLogger {
    logger: Arc<dyn Logger>,
    fields: Vec<Field>,
    tags: Option<Tags>,
}

impl fmt::Debug for CtxLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CtxLogger")
            .field("fields", &self.fields)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

impl CtxLogger {
    /// A logger without call fields.
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            logger,
            fields: Vec::new(),
            tags: None,
        }
    }

    /// Builds the logger for a call starting at `started_at`.
    pub fn for_call(
        logger: Arc<dyn Logger>,
        labels: &CallLabels,
        role: Role,
        full_method: &str,
        started_at: DateTime<Utc>,
        timeout: Option<Duration>,
        tags: Option<Tags>,
    ) -> Self {
        let mut fields = vec![Field::new(START_TIME_KEY, format_timestamp(started_at))];
        if let Some(deadline) = timeout.and_then(|t| deadline_after(started_at, t)) {
            fields.push(Field::new(DEADLINE_KEY, format_timestamp(deadline)));
        }
        fields.extend(call_fields(labels, role, full_method));
        Self {
            logger,
            fields,
            tags,
        }
    }

    /// The logger installed on this request, if any.
    pub fn extract<T>(request: &Request<T>) -> Option<&CtxLogger> {
        request.extensions().get::<CtxLogger>()
    }

    /// Appends fields to every record emitted through this logger.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Tags first, then the call's fixed fields.
    pub fn fields(&self) -> Vec<Field> {
        let mut all = self.tags.as_ref().map(Tags::fields).unwrap_or_default();
        all.extend(self.fields.iter().cloned());
        all
    }

    /// Emits one record with the call's fields followed by `extra`.
    pub fn log(&self, level: Level, message: &str, extra: &[Field]) {
        let mut fields = self.fields();
        fields.extend_from_slice(extra);
        self.logger.log(level, message, &fields);
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message, &[]);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::INFO, message, &[]);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::WARN, message, &[]);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::ERROR, message, &[]);
    }
}

/// The identity fields of a call: system, role, service and method.
pub fn call_fields(labels: &CallLabels, role: Role, full_method: &str) -> Vec<Field> {
    let (service, method) = split_method(full_method);
    let kind = match role {
        Role::Server => labels.server_kind.clone(),
        Role::Client => labels.client_kind.clone(),
    };
    vec![
        Field::new(SYSTEM_KEY, labels.system.clone()),
        Field::new(SPAN_KIND_KEY, kind),
        Field::new(SERVICE_KEY, service.to_string()),
        Field::new(METHOD_KEY, method.to_string()),
    ]
}

fn deadline_after(started_at: DateTime<Utc>, timeout: Duration) -> Option<DateTime<Utc>> {
    let timeout = chrono::Duration::from_std(timeout).ok()?;
    started_at.checked_add_signed(timeout)
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
