//! OTLP gRPC receiver.
//!
//! Listens for OTLP log, metric and trace exports and stores each record
//! as a [`TelemetryEvent`](crate::events::TelemetryEvent) through an
//! [`EventSink`](crate::events::EventSink), typically the task event
//! repository.

mod convert;
mod service;

pub use convert::{
    any_value_to_attribute, attributes_from, log_record_to_event, metric_to_events,
    span_to_event, DEFAULT_SPAN_STATUS, UNKNOWN_TRACE_ID,
};
pub use service::OtlpReceiver;

use opentelemetry_proto::tonic::collector::logs::v1::logs_service_server::LogsServiceServer;
use opentelemetry_proto::tonic::collector::metrics::v1::metrics_service_server::MetricsServiceServer;
use opentelemetry_proto::tonic::collector::trace::v1::trace_service_server::TraceServiceServer;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{error, info};

/// Receiver failures.
#[derive(Debug, Error)]
pub enum ReceiverError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// IO error on the bound socket.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The gRPC server failed.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The server task panicked or was aborted.
    #[error("receiver task failed: {0}")]
    Join(String),
}

/// A running receiver.
///
/// Dropping the handle signals shutdown without waiting for it.
#[derive(Debug)]
pub struct ReceiverHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), tonic::transport::Error>>>,
}

impl ReceiverHandle {
    /// Returns the bound address. Useful when listening on port 0.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting requests and waits for in-flight ones to finish.
    pub async fn shutdown(mut self) -> Result<(), ReceiverError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => {
                result?;
                info!(addr = %self.local_addr, "OTLP receiver stopped");
                Ok(())
            }
            Err(e) => Err(ReceiverError::Join(e.to_string())),
        }
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Binds `addr` and serves the logs, metrics and trace services.
///
/// # Errors
///
/// Returns [`ReceiverError::Bind`] if the address cannot be bound.
pub async fn serve(receiver: OtlpReceiver, addr: SocketAddr) -> Result<ReceiverHandle, ReceiverError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ReceiverError::Bind { addr, source })?;
    let local_addr = listener.local_addr()?;
    let (tx, rx) = oneshot::channel::<()>();

    let router = Server::builder()
        .add_service(LogsServiceServer::new(receiver.clone()))
        .add_service(MetricsServiceServer::new(receiver.clone()))
        .add_service(TraceServiceServer::new(receiver));

    let task = tokio::spawn(async move {
        let result = router
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                let _ = rx.await;
            })
            .await;
        if let Err(e) = &result {
            error!(addr = %local_addr, error = %e, "OTLP receiver failed");
        }
        result
    });

    info!(addr = %local_addr, "OTLP receiver listening");
    Ok(ReceiverHandle {
        local_addr,
        shutdown: Some(tx),
        task: Some(task),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, EventPayload};
    use crate::storage::{RepositoryConfig, TaskEventRepository};
    use opentelemetry_proto::tonic::collector::trace::v1::trace_service_client::TraceServiceClient;
    use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
    use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};
    use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
    use std::sync::Arc;

    fn span_request() -> ExportTraceServiceRequest {
        let span = Span {
            name: "payment:charge".to_string(),
            start_time_unix_nano: 1_700_000_000_000_000_000,
            end_time_unix_nano: 1_700_000_000_250_000_000,
            attributes: vec![KeyValue {
                key: "trace_id".to_string(),
                value: Some(AnyValue {
                    value: Some(any_value::Value::StringValue("trace-e2e".to_string())),
                }),
            }],
            ..Span::default()
        };
        ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                scope_spans: vec![ScopeSpans {
                    spans: vec![span],
                    ..ScopeSpans::default()
                }],
                ..ResourceSpans::default()
            }],
        }
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = held.local_addr().unwrap();
        let sink = Arc::new(crate::events::NoOpEventSink);
        let err = serve(OtlpReceiver::new(sink), addr).await.unwrap_err();
        assert!(matches!(err, ReceiverError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_span_export_reaches_repository() {
        let repo = Arc::new(TaskEventRepository::open(&RepositoryConfig::in_memory()).unwrap());
        let handle = serve(
            OtlpReceiver::new(repo.clone()),
            SocketAddr::from(([127, 0, 0, 1], 0)),
        )
        .await
        .unwrap();

        let mut client = TraceServiceClient::connect(format!("http://{}", handle.local_addr()))
            .await
            .unwrap();
        client.export(span_request()).await.unwrap();
        drop(client);
        handle.shutdown().await.unwrap();

        repo.flush().unwrap();
        let events = repo.by_trace_id("trace-e2e").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::Trace);
        let EventPayload::Span(span) = &events[0].payload else {
            panic!("expected a span payload");
        };
        assert_eq!(span.latency_ms, 250);
    }
}
