//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use grpc_middleware::logging::{LogRecord, MemoryLogger};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic_health::server::HealthReporter;

/// Binds an ephemeral local port.
pub async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

pub fn incoming(listener: TcpListener) -> TcpListenerStream {
    TcpListenerStream::new(listener)
}

/// A health reporter and service with `""` serving.
pub fn health() -> (
    HealthReporter,
    tonic_health::pb::health_server::HealthServer<impl tonic_health::pb::health_server::Health>,
) {
    tonic_health::server::health_reporter()
}

/// Waits until at least `count` records were logged, or gives up after a
/// few seconds, and returns what was logged.
pub async fn wait_for_records(logger: &MemoryLogger, count: usize) -> Vec<LogRecord> {
    for _ in 0..250 {
        if logger.len() >= count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    logger.records()
}

/// Records of the given role, by `span.kind`.
pub fn of_kind(records: &[LogRecord], kind: &str) -> Vec<LogRecord> {
    records
        .iter()
        .filter(|r| r.str_field("span.kind") == Some(kind))
        .cloned()
        .collect()
}
