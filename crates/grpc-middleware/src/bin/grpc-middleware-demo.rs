//! Demo server: the gRPC health service behind the full middleware stack.
//!
//! Usage: `grpc-middleware-demo [config.yaml]`

use std::sync::Arc;

use anyhow::Context;
use grpc_middleware::auth::{AUTH_SUBJECT_TAG, AuthInterceptor, auth_from_metadata};
use grpc_middleware::logging::{GrpcLogging, Role, TracingLogger};
use grpc_middleware::ratelimit::RateLimitLayer;
use grpc_middleware::tags::{Tags, TagsLayer};
use grpc_middleware::{Config, TracingConfig, init_tracing};
use tonic::transport::Server;
use tonic::{Request, Status};
use tonic_health::ServingStatus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_file = std::env::args().nth(1);
    let config = Config::load(config_file.as_deref()).context("failed to load configuration")?;

    init_tracing(TracingConfig::from_config(&config))
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    run(config).await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn run(config: Config) -> grpc_middleware::Result<()> {
    let addr = config.grpc_address()?;

    let logging = GrpcLogging::builder(Role::Server)
        .logger(Arc::new(TracingLogger::new()))
        .labels(config.logging.labels())
        .option(config.logging.duration_option())
        .build()?;

    let rate_limit = RateLimitLayer::from_config(&config.rate_limit)?;

    let scheme = config.auth.scheme.clone();
    let token = config.auth.token.clone();
    if token.is_none() {
        tracing::warn!("No auth token configured; authentication is disabled");
    }
    let auth = AuthInterceptor::new(move |request: Request<()>| {
        let Some(expected) = token.as_deref() else {
            return Ok(request);
        };
        let given = auth_from_metadata(&request, &scheme)?;
        if given != expected {
            return Err(Status::unauthenticated("Invalid auth token"));
        }
        Tags::extract(&request).set(AUTH_SUBJECT_TAG, "demo");
        Ok(request)
    });

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_service_status("", ServingStatus::Serving)
        .await;

    tracing::info!(
        address = %addr,
        rate_limit = config.rate_limit.enabled,
        "gRPC middleware demo listening"
    );

    Server::builder()
        .layer(TagsLayer::new())
        .layer(logging.layer())
        .layer(tonic::service::interceptor(auth))
        .layer(tower::util::option_layer(rate_limit))
        .add_service(health_service)
        .serve_with_shutdown(addr, shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
