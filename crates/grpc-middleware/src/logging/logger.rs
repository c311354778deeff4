//! Logging back-ends the interceptors write their records to.

use std::sync::{Mutex, PoisonError};

use tracing::Level;

use super::fields::{DisplayFields, Field, FieldValue};

/// Default `tracing` target of records emitted by [`TracingLogger`].
pub const DEFAULT_TARGET: &str = "grpc_middleware";

/// A structured logging back-end.
///
/// Receives one record at a time: a severity, a message and an ordered list
/// of fields. Implementations must not block the caller for long.
pub trait Logger: Send + Sync + 'static {
    fn log(&self, level: Level, message: &str, fields: &[Field]);
}

/// Emits records as `tracing` events.
///
/// The fields are rendered as a single logfmt-style `fields` value since
/// `tracing` field names are static.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str, fields: &[Field]) {
        let fields = DisplayFields(fields);
        match level {
            Level::TRACE => tracing::trace!(target: DEFAULT_TARGET, fields = %fields, "{message}"),
            Level::DEBUG => tracing::debug!(target: DEFAULT_TARGET, fields = %fields, "{message}"),
            Level::INFO => tracing::info!(target: DEFAULT_TARGET, fields = %fields, "{message}"),
            Level::WARN => tracing::warn!(target: DEFAULT_TARGET, fields = %fields, "{message}"),
            _ => tracing::error!(target: DEFAULT_TARGET, fields = %fields, "{message}"),
        }
    }
}

/// A record captured by [`MemoryLogger`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    pub fields: Vec<Field>,
}

impl LogRecord {
    /// Last value logged under `key`.
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .rev()
            .find(|f| f.key == key)
            .map(|f| &f.value)
    }

    /// Last string value logged under `key`.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(FieldValue::as_str)
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.field(key).is_some()
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the records logged so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes and returns the records logged so far.
    pub fn take(&self) -> Vec<LogRecord> {
        std::mem::take(&mut *self.records.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, message: &str, fields: &[Field]) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogRecord {
                level,
                message: message.to_string(),
                fields: fields.to_vec(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_logger_records_in_order() {
        let logger = MemoryLogger::new();
        logger.log(Level::INFO, "first", &[Field::new("k", "v1")]);
        logger.log(Level::WARN, "second", &[Field::new("k", "v2")]);

        let records = logger.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "first");
        assert_eq!(records[1].level, Level::WARN);
        assert_eq!(records[1].str_field("k"), Some("v2"));

        assert_eq!(logger.take().len(), 2);
        assert!(logger.is_empty());
    }

    #[test]
    fn test_record_field_prefers_last_value() {
        let record = LogRecord {
            level: Level::INFO,
            message: String::new(),
            fields: vec![Field::new("k", "old"), Field::new("k", "new")],
        };
        assert_eq!(record.str_field("k"), Some("new"));
        assert!(!record.has_field("missing"));
    }

    #[test]
    fn test_tracing_logger_accepts_every_level() {
        let logger = TracingLogger::new();
        for level in [Level::TRACE, Level::DEBUG, Level::INFO, Level::WARN, Level::ERROR] {
            logger.log(level, "finished unary call with code OK", &[Field::new("grpc.code", "OK")]);
        }
    }
}
