//! Integration tests for rate limiting and auth in front of a logged server.

mod common;

use std::sync::Arc;

use grpc_middleware::auth::{AuthInterceptor, static_token_auth};
use grpc_middleware::logging::{GrpcLogging, MemoryLogger};
use grpc_middleware::ratelimit::{RateLimitLayer, TokenBucketLimiter};
use grpc_middleware::tags::TagsLayer;
use tonic::transport::{Endpoint, Server};
use tonic::{Code, Request};
use tonic_health::pb::HealthCheckRequest;
use tonic_health::pb::health_client::HealthClient;
use tracing::Level;

use common::{bind, health, incoming, wait_for_records};

fn check() -> Request<HealthCheckRequest> {
    Request::new(HealthCheckRequest {
        service: String::new(),
    })
}

fn with_token(token: &str) -> Request<HealthCheckRequest> {
    let mut request = check();
    request
        .metadata_mut()
        .insert("authorization", format!("Bearer {token}").parse().unwrap());
    request
}

#[tokio::test]
async fn test_rate_limited_calls_are_rejected_and_logged() {
    let logger = Arc::new(MemoryLogger::new());
    let logging = GrpcLogging::server(logger.clone(), Vec::new());
    // One token per hour, so only the burst is available.
    let limiter = Arc::new(TokenBucketLimiter::new(2, 1.0 / 3600.0).unwrap());

    let (listener, addr) = bind().await;
    let (reporter, health_service) = health();
    tokio::spawn(async move {
        let _reporter = reporter;
        Server::builder()
            .layer(logging.layer())
            .layer(RateLimitLayer::new(limiter))
            .add_service(health_service)
            .serve_with_incoming(incoming(listener))
            .await
            .unwrap();
    });

    let mut client = HealthClient::new(Endpoint::from_shared(format!("http://{addr}")).unwrap().connect().await.unwrap());
    client.check(check()).await.unwrap();
    client.check(check()).await.unwrap();
    let status = client.check(check()).await.unwrap_err();
    assert_eq!(status.code(), Code::ResourceExhausted);
    assert!(
        status
            .message()
            .starts_with("/grpc.health.v1.Health/Check is rejected by rate limiter")
    );

    let records = wait_for_records(&logger, 3).await;
    assert_eq!(records.len(), 3);
    assert_eq!(records[2].str_field("grpc.code"), Some("ResourceExhausted"));
    assert_eq!(records[2].level, Level::WARN);
}

#[tokio::test]
async fn test_auth_tags_and_rejections_are_logged() {
    let logger = Arc::new(MemoryLogger::new());
    let logging = GrpcLogging::server(logger.clone(), Vec::new());
    let auth = AuthInterceptor::new(static_token_auth("bearer", "secret", "foobar"));

    let (listener, addr) = bind().await;
    let (reporter, health_service) = health();
    tokio::spawn(async move {
        let _reporter = reporter;
        Server::builder()
            .layer(TagsLayer::new())
            .layer(logging.layer())
            .layer(tonic::service::interceptor(auth))
            .add_service(health_service)
            .serve_with_incoming(incoming(listener))
            .await
            .unwrap();
    });

    let mut client = HealthClient::new(Endpoint::from_shared(format!("http://{addr}")).unwrap().connect().await.unwrap());

    client.check(with_token("secret")).await.unwrap();
    let records = wait_for_records(&logger, 1).await;
    assert_eq!(records[0].str_field("auth.sub"), Some("foobar"));
    assert_eq!(records[0].str_field("grpc.code"), Some("OK"));

    let status = client.check(with_token("wrong")).await.unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);
    let status = client.check(check()).await.unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);
    assert_eq!(status.message(), "Request unauthenticated with bearer");

    let records = wait_for_records(&logger, 3).await;
    assert_eq!(records.len(), 3);
    for record in &records[1..] {
        assert_eq!(record.str_field("grpc.code"), Some("Unauthenticated"));
        assert_eq!(record.level, Level::INFO);
        assert!(!record.has_field("auth.sub"));
    }
}
