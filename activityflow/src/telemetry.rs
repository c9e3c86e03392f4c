//! Telemetry runtime: repositories, persisted logger and OTLP receiver.
//!
//! [`Telemetry::start`] opens the log and task event repositories, attaches
//! the log repository to an [`ActivityLogger`] and, when enabled, starts the
//! receiver writing into the event repository. [`Telemetry::shutdown`] stops
//! the receiver before closing the repositories so in-flight exports are
//! stored.
//!
//! Process-wide state (the `tracing` subscriber and the metrics recorder) is
//! installed separately through [`init_subscriber`](crate::observability::init_subscriber)
//! and [`install_metrics`].

use crate::activities::ActivityDeps;
use crate::config::{Config, MetricsConfig};
use crate::errors::TelemetryError;
use crate::interceptors::CircuitBreakerRegistry;
use crate::observability::{metrics, ActivityLogger};
use crate::storage::{LogRepository, TaskEventRepository};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[cfg(feature = "receiver")]
use crate::receiver::{serve, OtlpReceiver, ReceiverHandle};

/// Running telemetry components.
pub struct Telemetry {
    logs: Arc<LogRepository>,
    events: Arc<TaskEventRepository>,
    logger: ActivityLogger,
    #[cfg(feature = "receiver")]
    receiver: Option<ReceiverHandle>,
}

impl Telemetry {
    /// Validates `config`, opens both repositories and starts the receiver
    /// if it is enabled.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, when a database cannot be opened, or
    /// when the receiver address cannot be bound.
    pub async fn start(config: &Config) -> Result<Self, TelemetryError> {
        config.validate()?;

        let logs = Arc::new(LogRepository::open(&config.storage.logs)?);
        let events = Arc::new(TaskEventRepository::open(&config.storage.events)?);
        let logger = ActivityLogger::new(config.logger_config()).with_sink(logs.clone());

        #[cfg(feature = "receiver")]
        let receiver = if config.observability.receiver.enabled {
            let receiver = OtlpReceiver::new(events.clone());
            Some(serve(receiver, config.observability.receiver.addr).await?)
        } else {
            None
        };

        info!(
            logs = %config.storage.logs.path.display(),
            events = %config.storage.events.path.display(),
            "Telemetry started"
        );

        Ok(Self {
            logs,
            events,
            logger,
            #[cfg(feature = "receiver")]
            receiver,
        })
    }

    /// Returns a logger persisting into the log repository.
    #[must_use]
    pub fn logger(&self) -> ActivityLogger {
        self.logger.clone()
    }

    /// Returns the log repository.
    #[must_use]
    pub const fn logs(&self) -> &Arc<LogRepository> {
        &self.logs
    }

    /// Returns the task event repository.
    #[must_use]
    pub const fn events(&self) -> &Arc<TaskEventRepository> {
        &self.events
    }

    /// Returns the receiver's bound address when it is running.
    #[must_use]
    pub fn receiver_addr(&self) -> Option<SocketAddr> {
        #[cfg(feature = "receiver")]
        {
            self.receiver.as_ref().map(ReceiverHandle::local_addr)
        }
        #[cfg(not(feature = "receiver"))]
        {
            None
        }
    }

    /// Builds activity dependencies from `config` using this logger.
    #[must_use]
    pub fn activity_deps(&self, config: &Config) -> ActivityDeps {
        ActivityDeps {
            logger: self.logger(),
            retry_policy: config.activities.retry_policy(),
            timeout: config.activities.timeout(),
            circuit_breakers: config
                .breaker_config()
                .map(|c| Arc::new(CircuitBreakerRegistry::new(c))),
        }
    }

    /// Stops the receiver, then flushes and closes both repositories.
    ///
    /// Every component is stopped even if an earlier one fails; the first
    /// error is returned.
    pub async fn shutdown(self) -> Result<(), TelemetryError> {
        let mut first_error: Option<TelemetryError> = None;

        #[cfg(feature = "receiver")]
        if let Some(handle) = self.receiver {
            if let Err(e) = handle.shutdown().await {
                first_error.get_or_insert(e.into());
            }
        }
        if let Err(e) = self.logs.close().await {
            first_error.get_or_insert(e.into());
        }
        if let Err(e) = self.events.close().await {
            first_error.get_or_insert(e.into());
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Telemetry stopped");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("receiver_addr", &self.receiver_addr())
            .finish_non_exhaustive()
    }
}

/// Installs the global metrics recorder when metrics are enabled.
///
/// Without the `prometheus` feature only metric descriptions are registered.
/// Returns whether an exporter was installed.
pub fn install_metrics(config: &MetricsConfig) -> Result<bool, TelemetryError> {
    if !config.enabled {
        return Ok(false);
    }
    #[cfg(feature = "prometheus")]
    {
        metrics::install_prometheus_exporter(config.addr)?;
        info!(addr = %config.addr, "Prometheus exporter listening");
        Ok(true)
    }
    #[cfg(not(feature = "prometheus"))]
    {
        metrics::register_metrics();
        Ok(false)
    }
}
