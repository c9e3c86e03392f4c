//! OTLP gRPC service implementations.

use super::convert::{log_record_to_event, metric_to_events, span_to_event};
use crate::events::{EventSink, TelemetryEvent};
use opentelemetry_proto::tonic::collector::logs::v1::{
    logs_service_server::LogsService, ExportLogsServiceRequest, ExportLogsServiceResponse,
};
use opentelemetry_proto::tonic::collector::metrics::v1::{
    metrics_service_server::MetricsService, ExportMetricsServiceRequest,
    ExportMetricsServiceResponse,
};
use opentelemetry_proto::tonic::collector::trace::v1::{
    trace_service_server::TraceService, ExportTraceServiceRequest, ExportTraceServiceResponse,
};
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, error};

/// Accepts OTLP logs, metrics and traces and writes them to an [`EventSink`].
///
/// Records that fail to convert or store are logged and dropped; exports
/// always succeed.
#[derive(Clone)]
pub struct OtlpReceiver {
    sink: Arc<dyn EventSink>,
}

impl OtlpReceiver {
    /// Creates a receiver writing into `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    fn store(&self, signal: &'static str, events: impl IntoIterator<Item = TelemetryEvent>) -> usize {
        let mut stored = 0;
        for event in events {
            let trace_id = event.trace_id.clone();
            match self.sink.write_event(event) {
                Ok(()) => stored += 1,
                Err(e) => error!(signal, trace_id = %trace_id, error = %e, "Failed to write telemetry event"),
            }
        }
        debug!(signal, stored, "Stored telemetry export");
        stored
    }

    /// Runs an ingest on the blocking pool; storing may flush to SQLite.
    async fn ingest_blocking<Req, F>(&self, signal: &'static str, request: Req, ingest: F)
    where
        Req: Send + 'static,
        F: FnOnce(&Self, &Req) -> usize + Send + 'static,
    {
        let receiver = self.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || ingest(&receiver, &request)).await {
            error!(signal, error = %e, "Telemetry ingest task failed");
        }
    }

    /// Stores every log record of a request; returns how many were stored.
    pub fn ingest_logs(&self, request: &ExportLogsServiceRequest) -> usize {
        let events = request
            .resource_logs
            .iter()
            .flat_map(|r| &r.scope_logs)
            .flat_map(|s| &s.log_records)
            .map(log_record_to_event);
        self.store("logs", events)
    }

    /// Stores every metric data point of a request; returns how many were stored.
    pub fn ingest_metrics(&self, request: &ExportMetricsServiceRequest) -> usize {
        let events = request
            .resource_metrics
            .iter()
            .flat_map(|r| &r.scope_metrics)
            .flat_map(|s| &s.metrics)
            .flat_map(metric_to_events);
        self.store("metrics", events)
    }

    /// Stores every span of a request; returns how many were stored.
    pub fn ingest_traces(&self, request: &ExportTraceServiceRequest) -> usize {
        let events = request
            .resource_spans
            .iter()
            .flat_map(|r| &r.scope_spans)
            .flat_map(|s| &s.spans)
            .map(span_to_event);
        self.store("traces", events)
    }
}

impl std::fmt::Debug for OtlpReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtlpReceiver").finish_non_exhaustive()
    }
}

#[tonic::async_trait]
impl LogsService for OtlpReceiver {
    async fn export(
        &self,
        request: Request<ExportLogsServiceRequest>,
    ) -> Result<Response<ExportLogsServiceResponse>, Status> {
        self.ingest_blocking("logs", request.into_inner(), Self::ingest_logs)
            .await;
        Ok(Response::new(ExportLogsServiceResponse {
            partial_success: None,
        }))
    }
}

#[tonic::async_trait]
impl MetricsService for OtlpReceiver {
    async fn export(
        &self,
        request: Request<ExportMetricsServiceRequest>,
    ) -> Result<Response<ExportMetricsServiceResponse>, Status> {
        self.ingest_blocking("metrics", request.into_inner(), Self::ingest_metrics)
            .await;
        Ok(Response::new(ExportMetricsServiceResponse {
            partial_success: None,
        }))
    }
}

#[tonic::async_trait]
impl TraceService for OtlpReceiver {
    async fn export(
        &self,
        request: Request<ExportTraceServiceRequest>,
    ) -> Result<Response<ExportTraceServiceResponse>, Status> {
        self.ingest_blocking("traces", request.into_inner(), Self::ingest_traces)
            .await;
        Ok(Response::new(ExportTraceServiceResponse {
            partial_success: None,
        }))
    }
}
