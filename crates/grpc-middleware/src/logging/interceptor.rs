//! Handler-level logging interceptors for unary and streaming calls.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tonic::{Request, Response, Status};

use super::ctx_logger::CtxLogger;
use super::fields::{GRPC_TIMEOUT_HEADER, parse_grpc_timeout};
use super::layer::LoggingLayer;
use super::logger::Logger;
use super::options::{LogOption, Options, Role};
use super::summary::{CallKind, CallSummary, LoggedStream};
use super::CallLabels;
use crate::error::{Error, Result};
use crate::tags::Tags;

/// Logs one summary record per call.
///
/// Server-side, the call's [`CtxLogger`] is inserted into the request
/// extensions before the handler runs. Client-side, the request is passed to
/// the invoker untouched. Cheap to clone; the resolved policy is shared.
#[derive(Clone)]
pub struct GrpcLogging {
    logger: Arc<dyn Logger>,
    options: Arc<Options>,
    labels: Arc<CallLabels>,
    role: Role,
}

impl std::fmt::Debug for GrpcLogging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcLogging")
            .field("role", &self.role)
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

impl GrpcLogging {
    /// Server-side logging with default labels.
    pub fn server(logger: Arc<dyn Logger>, opts: impl IntoIterator<Item = LogOption>) -> Self {
        Self::with_parts(logger, Role::Server, CallLabels::default(), opts)
    }

    /// Client-side logging with default labels.
    pub fn client(logger: Arc<dyn Logger>, opts: impl IntoIterator<Item = LogOption>) -> Self {
        Self::with_parts(logger, Role::Client, CallLabels::default(), opts)
    }

    pub fn builder(role: Role) -> GrpcLoggingBuilder {
        GrpcLoggingBuilder::new(role)
    }

    fn with_parts(
        logger: Arc<dyn Logger>,
        role: Role,
        labels: CallLabels,
        opts: impl IntoIterator<Item = LogOption>,
    ) -> Self {
        Self {
            logger,
            options: Arc::new(Options::resolve(role, opts)),
            labels: Arc::new(labels),
            role,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn labels(&self) -> &CallLabels {
        &self.labels
    }

    /// A tower layer applying this policy at the HTTP level.
    pub fn layer(&self) -> LoggingLayer {
        LoggingLayer::new(self.clone())
    }

    /// Starts a call: records the start time and builds its logger.
    pub(crate) fn start(
        &self,
        full_method: &str,
        timeout: Option<Duration>,
        tags: Option<Tags>,
        kind: CallKind,
    ) -> CallSummary {
        let started = Instant::now();
        let logger = CtxLogger::for_call(
            self.logger.clone(),
            &self.labels,
            self.role,
            full_method,
            Utc::now(),
            timeout,
            tags,
        );
        CallSummary {
            logger,
            options: self.options.clone(),
            role: self.role,
            kind,
            full_method: full_method.to_string(),
            started,
        }
    }

    fn start_request<T>(
        &self,
        full_method: &str,
        request: &mut Request<T>,
        kind: CallKind,
    ) -> CallSummary {
        let timeout = request
            .metadata()
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_grpc_timeout);
        let tags = request.extensions().get::<Tags>().cloned();
        let summary = self.start(full_method, timeout, tags, kind);
        if self.role == Role::Server {
            request.extensions_mut().insert(summary.logger.clone());
        }
        summary
    }

    /// Runs a unary handler (server) or invoker (client) and logs its outcome.
    ///
    /// The handler's result is returned unchanged.
    pub async fn unary<Req, Resp, F, Fut>(
        &self,
        full_method: &str,
        mut request: Request<Req>,
        handler: F,
    ) -> std::result::Result<Response<Resp>, Status>
    where
        F: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = std::result::Result<Response<Resp>, Status>>,
    {
        let summary = self.start_request(full_method, &mut request, CallKind::Unary);
        let result = handler(request).await;
        summary.finish(result.as_ref().err());
        result
    }

    /// Runs a handler (server) or invoker (client) that answers with a stream,
    /// and logs once the stream completes.
    ///
    /// A handler error is logged right away. Otherwise the response stream is
    /// wrapped in a [`LoggedStream`] which logs when it ends, fails, or is
    /// dropped.
    pub async fn streaming<Req, S, F, Fut>(
        &self,
        full_method: &str,
        mut request: Request<Req>,
        handler: F,
    ) -> std::result::Result<Response<LoggedStream<S>>, Status>
    where
        F: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = std::result::Result<Response<S>, Status>>,
    {
        let summary = self.start_request(full_method, &mut request, CallKind::Streaming);
        match handler(request).await {
            Ok(response) => {
                let (metadata, stream, extensions) = response.into_parts();
                Ok(Response::from_parts(
                    metadata,
                    LoggedStream::new(stream, summary),
                    extensions,
                ))
            }
            Err(status) => {
                summary.finish(Some(&status));
                Err(status)
            }
        }
    }
}

/// Assembles a [`GrpcLogging`]; the logger is mandatory.
pub struct GrpcLoggingBuilder {
    role: Role,
    logger: Option<Arc<dyn Logger>>,
    labels: CallLabels,
    options: Vec<LogOption>,
}

impl GrpcLoggingBuilder {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            logger: None,
            labels: CallLabels::default(),
            options: Vec::new(),
        }
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn labels(mut self, labels: CallLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Appends one option; options apply in the order they were added.
    pub fn option(mut self, option: LogOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn options(mut self, options: impl IntoIterator<Item = LogOption>) -> Self {
        self.options.extend(options);
        self
    }

    /// Fails with [`Error::MissingLogger`] when no logger was set.
    pub fn build(self) -> Result<GrpcLogging> {
        let logger = self.logger.ok_or(Error::MissingLogger)?;
        Ok(GrpcLogging::with_parts(
            logger,
            self.role,
            self.labels,
            self.options,
        ))
    }
}
