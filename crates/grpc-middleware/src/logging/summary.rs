//! The terminal stage of a call: deciding on, and emitting, the summary record.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::Instant;

use futures::Stream;
use tonic::{Code, Status};

use super::ctx_logger::CtxLogger;
use super::fields::{CODE_KEY, ERROR_KEY, Field, code_name};
use super::options::{Options, Role};

/// Shape of the call being summarized, used for the record's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Unary,
    Streaming,
    /// Observed at the HTTP layer, where unary and streaming look alike.
    Transport,
}

/// Builds the summary message for a call.
pub fn summary_message(role: Role, kind: CallKind, code: Code) -> String {
    let code = code_name(code);
    match (role, kind) {
        (Role::Server, CallKind::Unary) => format!("finished unary call with code {code}"),
        (Role::Server, CallKind::Streaming) => format!("finished streaming call with code {code}"),
        (Role::Server, CallKind::Transport) => format!("finished call with code {code}"),
        (Role::Client, CallKind::Unary) => "finished client unary call".to_string(),
        (Role::Client, CallKind::Streaming) => "finished client streaming call".to_string(),
        (Role::Client, CallKind::Transport) => "finished client call".to_string(),
    }
}

/// Everything needed to emit a call's summary once it completes.
///
/// Consumed by [`CallSummary::finish`], so a call can be summarized at most once.
pub(crate) struct CallSummary {
    pub(crate) logger: CtxLogger,
    pub(crate) options: Arc<Options>,
    pub(crate) role: Role,
    pub(crate) kind: CallKind,
    pub(crate) full_method: String,
    pub(crate) started: Instant,
}

impl CallSummary {
    pub(crate) fn finish(self, err: Option<&Status>) {
        let elapsed = self.started.elapsed();
        if !(self.options.should_log)(&self.full_method, err) {
            return;
        }

        let code = (self.options.error_to_code)(err);
        let message = summary_message(self.role, self.kind, code);
        let level = (self.options.code_to_level)(code);

        let mut fields = vec![
            Field::new(ERROR_KEY, err.map(|status| status.message().to_string())),
            Field::new(CODE_KEY, code_name(code)),
        ];
        fields.extend((self.options.duration_to_fields)(elapsed));

        self.logger.log(level, &message, &fields);
    }
}

/// A response stream that emits its call's summary when it ends.
///
/// The summary is emitted when the stream is exhausted, when it yields its
/// first error, or, if neither happened, when it is dropped (as `Canceled`).
pub struct LoggedStream<S> {
    inner: S,
    summary: Option<CallSummary>,
}

impl<S> LoggedStream<S> {
    pub(crate) fn new(inner: S, summary: CallSummary) -> Self {
        Self {
            inner,
            summary: Some(summary),
        }
    }

    /// Whether the summary has already been emitted (or skipped by the decider).
    pub fn is_finished(&self) -> bool {
        self.summary.is_none()
    }

    fn complete(&mut self, err: Option<&Status>) {
        if let Some(summary) = self.summary.take() {
            summary.finish(err);
        }
    }
}

impl<S, T> Stream for LoggedStream<S>
where
    S: Stream<Item = Result<T, Status>> + Unpin,
{
    type Item = Result<T, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let item = ready!(Pin::new(&mut this.inner).poll_next(cx));
        match &item {
            None => this.complete(None),
            Some(Err(status)) => this.complete(Some(status)),
            Some(Ok(_)) => {}
        }
        Poll::Ready(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S> Drop for LoggedStream<S> {
    fn drop(&mut self) {
        if self.summary.is_some() {
            self.complete(Some(&Status::cancelled("stream dropped before completion")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemoryLogger;
    use futures::StreamExt;
    use tracing::Level;

    fn summary(logger: Arc<MemoryLogger>, role: Role, kind: CallKind) -> CallSummary {
        CallSummary {
            logger: CtxLogger::new(logger),
            options: Arc::new(Options::resolve(role, Vec::new())),
            role,
            kind,
            full_method: "/svc/Method".to_string(),
            started: Instant::now(),
        }
    }

    #[test]
    fn test_summary_messages() {
        assert_eq!(
            summary_message(Role::Server, CallKind::Unary, Code::Ok),
            "finished unary call with code OK"
        );
        assert_eq!(
            summary_message(Role::Server, CallKind::Streaming, Code::NotFound),
            "finished streaming call with code NotFound"
        );
        assert_eq!(
            summary_message(Role::Client, CallKind::Streaming, Code::Ok),
            "finished client streaming call"
        );
    }

    #[test]
    fn test_finish_emits_code_error_and_duration() {
        let logger = Arc::new(MemoryLogger::new());
        summary(logger.clone(), Role::Server, CallKind::Unary)
            .finish(Some(&Status::permission_denied("nope")));

        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, Level::WARN);
        assert_eq!(records[0].str_field("grpc.code"), Some("PermissionDenied"));
        assert_eq!(records[0].str_field("error"), Some("nope"));
        assert!(records[0].has_field("grpc.time_ms"));
    }

    #[tokio::test]
    async fn test_stream_logs_once_at_end() {
        let logger = Arc::new(MemoryLogger::new());
        let items = futures::stream::iter((0..5).map(Ok::<_, Status>));
        let mut stream = LoggedStream::new(items, summary(logger.clone(), Role::Server, CallKind::Streaming));

        let mut seen = 0;
        while let Some(item) = stream.next().await {
            item.unwrap();
            seen += 1;
            if seen < 5 {
                assert!(logger.is_empty());
            }
        }
        assert!(stream.is_finished());
        drop(stream);

        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "finished streaming call with code OK");
    }

    #[tokio::test]
    async fn test_stream_logs_first_error() {
        let logger = Arc::new(MemoryLogger::new());
        let items = futures::stream::iter(vec![
            Ok(1),
            Err(Status::data_loss("torn")),
            Err(Status::internal("again")),
        ]);
        let stream = LoggedStream::new(items, summary(logger.clone(), Role::Server, CallKind::Streaming));
        let collected: Vec<_> = stream.collect().await;

        assert_eq!(collected.len(), 3);
        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].str_field("grpc.code"), Some("DataLoss"));
        assert_eq!(records[0].level, Level::ERROR);
    }

    #[test]
    fn test_dropped_stream_logs_canceled() {
        let logger = Arc::new(MemoryLogger::new());
        let items = futures::stream::pending::<Result<u32, Status>>();
        let stream = LoggedStream::new(items, summary(logger.clone(), Role::Client, CallKind::Streaming));
        drop(stream);

        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].str_field("grpc.code"), Some("Canceled"));
        assert_eq!(records[0].level, Level::DEBUG);
    }
}
