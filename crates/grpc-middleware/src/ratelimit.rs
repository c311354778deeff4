//! Request rate limiting.
//!
//! A [`Limiter`] decides, per call, whether the call may proceed. Rejected
//! calls fail with `RESOURCE_EXHAUSTED` before reaching the handler, either
//! through the tonic [`RateLimitInterceptor`] or the tower [`RateLimitLayer`].

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::{Either, Ready, ready};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use http::header::{CONTENT_TYPE, HeaderValue};
use tonic::{Request, Status};
use tower::{Layer, Service};

use crate::config::RateLimitConfig;

/// Errors returned by a [`Limiter`] or while building one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    /// No tokens left in the bucket.
    #[error("token bucket exhausted")]
    Exhausted,

    /// Capacity or refill rate cannot form a quota.
    #[error("invalid rate limit quota: {0}")]
    InvalidQuota(String),
}

/// Decides whether a call may proceed.
pub trait Limiter: Send + Sync + 'static {
    fn limit(&self) -> Result<(), LimitError>;
}

/// A token bucket taking one token per call, without blocking.
///
/// Starts full with `capacity` tokens and refills one token every
/// `1 / refill_per_second` seconds.
pub struct TokenBucketLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl TokenBucketLimiter {
    pub fn new(capacity: u32, refill_per_second: f64) -> Result<Self, LimitError> {
        let burst = NonZeroU32::new(capacity)
            .ok_or_else(|| LimitError::InvalidQuota("capacity must be greater than 0".into()))?;
        let quota = refill_period(refill_per_second)
            .and_then(Quota::with_period)
            .ok_or_else(|| {
                LimitError::InvalidQuota(format!(
                    "refill rate must be positive and finite, got {refill_per_second}"
                ))
            })?
            .allow_burst(burst);

        Ok(Self {
            limiter: RateLimiter::direct(quota),
        })
    }
}

/// Time to replenish a single token.
fn refill_period(refill_per_second: f64) -> Option<Duration> {
    if !refill_per_second.is_finite() || refill_per_second <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(refill_per_second.recip()).ok()
}

impl fmt::Debug for TokenBucketLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucketLimiter").finish_non_exhaustive()
    }
}

impl Limiter for TokenBucketLimiter {
    fn limit(&self) -> Result<(), LimitError> {
        self.limiter.check().map_err(|_| LimitError::Exhausted)
    }
}

fn rejection(method: &str, err: &LimitError) -> Status {
    Status::resource_exhausted(format!(
        "{method} is rejected by rate limiter, please retry later. {err}"
    ))
}

/// Interceptor rejecting calls the limiter refuses.
#[derive(Clone)]
pub struct RateLimitInterceptor {
    limiter: Arc<dyn Limiter>,
}

impl RateLimitInterceptor {
    pub fn new(limiter: Arc<dyn Limiter>) -> Self {
        Self { limiter }
    }
}

impl fmt::Debug for RateLimitInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitInterceptor").finish_non_exhaustive()
    }
}

impl tonic::service::Interceptor for RateLimitInterceptor {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        match self.limiter.limit() {
            Ok(()) => Ok(request),
            Err(err) => {
                tracing::warn!(error = %err, "Rate limit exceeded");
                Err(rejection("request", &err))
            }
        }
    }
}

/// Layer rejecting calls the limiter refuses with a trailers-only gRPC
/// response.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<dyn Limiter>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<dyn Limiter>) -> Self {
        Self { limiter }
    }

    /// A token bucket layer from configuration, or `None` when disabled.
    pub fn from_config(config: &RateLimitConfig) -> crate::Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let limiter = TokenBucketLimiter::new(config.capacity, config.refill_per_second)?;
        Ok(Some(Self::new(Arc::new(limiter))))
    }
}

impl fmt::Debug for RateLimitLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitLayer").finish_non_exhaustive()
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService {
            inner: service,
            limiter: self.limiter.clone(),
        }
    }
}

/// Service produced by [`RateLimitLayer`].
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<dyn Limiter>,
}

impl<S: fmt::Debug> fmt::Debug for RateLimitService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitService")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for RateLimitService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    ResBody: Default,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Either<Ready<Result<S::Response, S::Error>>, S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        match self.limiter.limit() {
            Ok(()) => Either::Right(self.inner.call(req)),
            Err(err) => {
                let method = req.uri().path();
                tracing::warn!(method = %method, error = %err, "Rate limit exceeded");
                Either::Left(ready(Ok(trailers_only(&rejection(method, &err)))))
            }
        }
    }
}

/// A gRPC response carrying only the status, in its headers.
fn trailers_only<B: Default>(status: &Status) -> http::Response<B> {
    let mut response = http::Response::new(B::default());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    if let Err(err) = status.add_header(headers) {
        tracing::error!(error = %err, "Failed to encode rejection status");
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tonic::Code;
    use tonic::service::Interceptor;
    use tower::ServiceExt;

    /// One token per hour, so nothing refills while a test runs.
    const SLOW_REFILL: f64 = 1.0 / 3600.0;

    #[test]
    fn test_bucket_admits_capacity_then_rejects() {
        let limiter = TokenBucketLimiter::new(3, SLOW_REFILL).unwrap();
        for _ in 0..3 {
            assert!(limiter.limit().is_ok());
        }
        assert_eq!(limiter.limit(), Err(LimitError::Exhausted));
        assert_eq!(limiter.limit(), Err(LimitError::Exhausted));
    }

    #[tokio::test]
    async fn test_bucket_refills_over_time() {
        let limiter = TokenBucketLimiter::new(1, 1000.0).unwrap();
        assert!(limiter.limit().is_ok());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(limiter.limit().is_ok());
    }

    #[test]
    fn test_bucket_rejects_invalid_quota() {
        assert!(matches!(
            TokenBucketLimiter::new(0, 10.0),
            Err(LimitError::InvalidQuota(_))
        ));
        for refill in [0.0, -1.0, f64::NAN, f64::INFINITY, f64::MIN_POSITIVE] {
            assert!(matches!(
                TokenBucketLimiter::new(5, refill),
                Err(LimitError::InvalidQuota(_))
            ));
        }
    }

    #[test]
    fn test_layer_from_config() {
        let mut config = RateLimitConfig::default();
        assert!(RateLimitLayer::from_config(&config).unwrap().is_none());

        config.enabled = true;
        assert!(RateLimitLayer::from_config(&config).unwrap().is_some());

        config.refill_per_second = 0.0;
        let err = RateLimitLayer::from_config(&config).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::RateLimit(LimitError::InvalidQuota(_))
        ));
    }

    #[test]
    fn test_interceptor_rejects_with_resource_exhausted() {
        let limiter = TokenBucketLimiter::new(1, SLOW_REFILL).unwrap();
        let mut interceptor = RateLimitInterceptor::new(Arc::new(limiter));
        assert!(interceptor.call(Request::new(())).is_ok());

        let status = interceptor.call(Request::new(())).unwrap_err();
        assert_eq!(status.code(), Code::ResourceExhausted);
        assert_eq!(
            status.message(),
            "request is rejected by rate limiter, please retry later. token bucket exhausted"
        );
    }

    #[tokio::test]
    async fn test_layer_answers_trailers_only() {
        let limiter = Arc::new(TokenBucketLimiter::new(1, SLOW_REFILL).unwrap());
        let svc = RateLimitLayer::new(limiter).layer(tower::service_fn(
            |_req: http::Request<()>| async move { Ok::<_, Infallible>(http::Response::new(String::from("served"))) },
        ));

        let request = || {
            http::Request::builder()
                .uri("http://localhost/grpc.health.v1.Health/Check")
                .body(())
                .unwrap()
        };

        let response = svc.clone().oneshot(request()).await.unwrap();
        assert_eq!(response.body(), "served");

        let response = svc.oneshot(request()).await.unwrap();
        assert!(response.body().is_empty());
        let status = Status::from_header_map(response.headers()).unwrap();
        assert_eq!(status.code(), Code::ResourceExhausted);
        assert!(
            status
                .message()
                .starts_with("/grpc.health.v1.Health/Check is rejected by rate limiter")
        );
    }
}
