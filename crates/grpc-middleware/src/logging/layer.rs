//! Transport-level logging as a tower layer.
//!
//! Works on the HTTP requests tonic exchanges, so it sees every call of a
//! server or channel without touching generated code. The summary is emitted
//! once the `grpc-status` of the call is known: from the response headers of
//! a trailers-only response, or from the trailers frame of the response body.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::future::BoxFuture;
use http_body::{Body, Frame, SizeHint};
use tonic::{Code, Status};
use tower::{Layer, Service};

use super::fields::{GRPC_TIMEOUT_HEADER, parse_grpc_timeout};
use super::interceptor::GrpcLogging;
use super::options::Role;
use super::summary::{CallKind, CallSummary};
use crate::tags::Tags;

/// Layer logging every call passing through the wrapped service.
#[derive(Debug, Clone)]
pub struct LoggingLayer {
    logging: GrpcLogging,
}

impl LoggingLayer {
    pub fn new(logging: GrpcLogging) -> Self {
        Self { logging }
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        LoggingService {
            inner: service,
            logging: self.logging.clone(),
        }
    }
}

/// Service produced by [`LoggingLayer`].
#[derive(Debug, Clone)]
pub struct LoggingService<S> {
    inner: S,
    logging: GrpcLogging,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for LoggingService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: fmt::Display + Send + 'static,
    ResBody: Send + 'static,
{
    type Response = http::Response<LoggedBody<ResBody>>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<ReqBody>) -> Self::Future {
        let timeout = req
            .headers()
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_grpc_timeout);
        let tags = req.extensions().get::<Tags>().cloned();
        let summary = self
            .logging
            .start(req.uri().path(), timeout, tags, CallKind::Transport);
        if self.logging.role() == Role::Server {
            req.extensions_mut().insert(summary.logger.clone());
        }

        let future = self.inner.call(req);
        Box::pin(async move {
            match future.await {
                Ok(response) => Ok(LoggedBody::wrap(response, summary)),
                Err(err) => {
                    summary.finish(Some(&Status::unavailable(err.to_string())));
                    Err(err)
                }
            }
        })
    }
}

/// A response body that emits its call's summary once the call's status is
/// known.
///
/// Dropping the body before that happens logs the call as `Canceled`.
pub struct LoggedBody<B> {
    inner: B,
    summary: Option<CallSummary>,
}

impl<B> LoggedBody<B> {
    fn wrap(response: http::Response<B>, summary: CallSummary) -> http::Response<Self> {
        let mut summary = Some(summary);
        // Trailers-only responses carry the status in the headers.
        if let Some(status) = Status::from_header_map(response.headers()) {
            if let Some(summary) = summary.take() {
                summary.finish(status_error(&status));
            }
        }
        response.map(|inner| LoggedBody { inner, summary })
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

impl<B: fmt::Debug> fmt::Debug for LoggedBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggedBody")
            .field("inner", &self.inner)
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn status_error(status: &Status) -> Option<&Status> {
    (status.code() != Code::Ok).then_some(status)
}

impl<B> Body for LoggedBody<B>
where
    B: Body + Unpin,
    B::Error: fmt::Display,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let frame = ready!(Pin::new(&mut this.inner).poll_frame(cx));
        match &frame {
            Some(Ok(frame)) => {
                if let Some(trailers) = frame.trailers_ref() {
                    let status = Status::from_header_map(trailers)
                        .unwrap_or_else(|| Status::unknown("trailers without grpc-status"));
                    this.complete(status_error(&status));
                }
            }
            Some(Err(err)) => this.complete(Some(&Status::unknown(err.to_string()))),
            None => this.complete(Some(&Status::unknown("response ended without grpc-status"))),
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for LoggedBody<B> {
    fn drop(&mut self) {
        if self.summary.is_some() {
            self.complete(Some(&Status::cancelled("response dropped before completion")));
        }
    }
}
