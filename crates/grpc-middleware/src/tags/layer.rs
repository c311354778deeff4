//! Tower layer installing tags ahead of the logging layer.

use std::task::{Context, Poll};

use tonic::transport::server::TcpConnectInfo;
use tower::{Layer, Service};

/// Installs a fresh [`Tags`](super::Tags) set on every HTTP request.
///
/// Add it outside of [`LoggingLayer`](crate::logging::LoggingLayer) so the
/// summary records see the tags.
#[derive(Debug, Clone, Default)]
pub struct TagsLayer;

impl TagsLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TagsLayer {
    type Service = TagsService<S>;

    fn layer(&self, service: S) -> Self::Service {
        TagsService { inner: service }
    }
}

/// Service produced by [`TagsLayer`].
#[derive(Debug, Clone)]
pub struct TagsService<S> {
    inner: S,
}

impl<S, B> Service<http::Request<B>> for TagsService<S>
where
    S: Service<http::Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        let remote_addr = req
            .extensions()
            .get::<TcpConnectInfo>()
            .and_then(TcpConnectInfo::remote_addr);
        super::install(req.extensions_mut(), remote_addr);
        self.inner.call(req)
    }
}
