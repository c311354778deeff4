//! Request-scoped logging middleware for tonic gRPC services and clients.
//!
//! Every call produces a single summary record with its outcome code, error,
//! and duration, next to the fields identifying the call. Server handlers get
//! a logger already carrying those fields.
//!
//! # Architecture
//!
//! ```text
//!  request ──► TagsLayer ──► LoggingLayer ──► [RateLimitLayer] ──► auth ──► handler
//!                 │               │                                           │
//!                 │               └── CtxLogger in extensions ◄───────────────┤
//!                 └── Tags in extensions ◄── auth.sub, grpc.request.* ────────┘
//!                                 │
//!  response ◄─────────────────────┴── one summary record per call
//! ```
//!
//! The same policy can also be applied per handler with
//! [`GrpcLogging::unary`](logging::GrpcLogging::unary) and
//! [`GrpcLogging::streaming`](logging::GrpcLogging::streaming).
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use grpc_middleware::logging::{GrpcLogging, TracingLogger};
//! use grpc_middleware::tags::TagsLayer;
//! use tonic::transport::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (_reporter, health) = tonic_health::server::health_reporter();
//!     let logging = GrpcLogging::server(Arc::new(TracingLogger::new()), Vec::new());
//!
//!     Server::builder()
//!         .layer(TagsLayer::new())
//!         .layer(logging.layer())
//!         .add_service(health)
//!         .serve("127.0.0.1:50051".parse()?)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod ratelimit;
pub mod tags;
pub mod tracing_config;

// Re-export commonly used types
pub use auth::{AuthInterceptor, auth_from_metadata};
pub use config::{Config, ConfigError};
pub use error::{Error, Result};
pub use logging::{
    CallLabels, CtxLogger, GrpcLogging, GrpcLoggingBuilder, LogOption, Logger, LoggingLayer,
    MemoryLogger, Options, Role, TracingLogger,
};
pub use ratelimit::{
    LimitError, Limiter, RateLimitInterceptor, RateLimitLayer, TokenBucketLimiter,
};
pub use tags::{Tags, TagsInterceptor, TagsLayer};
pub use tracing_config::{TracingConfig, TracingFormat, init_default_tracing, init_tracing};
