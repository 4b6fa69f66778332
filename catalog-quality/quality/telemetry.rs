use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use tokio::runtime::{Handle, Runtime};

/// Builder for pipeline telemetry sinks.
pub struct QualityTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
    echo: bool,
    run_id: Option<String>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl QualityTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            min_level: LogLevel::Debug,
            echo: false,
            run_id: None,
            event_publisher: None,
        }
    }

    /// Sets the log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Drops log records below `level`.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Mirrors log records to stderr.
    #[must_use]
    pub const fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Tags every log record and event with a run identifier.
    #[must_use]
    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<QualityTelemetry> {
        let logger = match self.log_path {
            Some(path) => {
                Some(JsonLogger::with_min_level(path, self.min_level)?.echo_to_stderr(self.echo))
            }
            None => None,
        };
        let event = match self.event_publisher {
            Some(publisher) => Some(EventHandle::new(publisher)?),
            None => None,
        };
        Ok(QualityTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                run_id: self.run_id,
                logger,
                event,
            }),
        })
    }
}

/// Telemetry handle shared by the labeling, training and pipeline stages.
///
/// Inside a tokio runtime, events are spawned onto that runtime and land asynchronously.
#[derive(Clone)]
pub struct QualityTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for QualityTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualityTelemetry")
            .field("module", &self.inner.module)
            .field("run_id", &self.inner.run_id)
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    run_id: Option<String>,
    logger: Option<JsonLogger>,
    event: Option<EventHandle>,
}

/// Publishes onto the caller's runtime when there is one, otherwise blocks on an owned runtime.
struct EventHandle {
    runtime: Option<Runtime>,
    publisher: Arc<dyn EventPublisher>,
}

impl EventHandle {
    fn new(publisher: Arc<dyn EventPublisher>) -> Result<Self> {
        Ok(Self {
            runtime: Some(Runtime::new()?),
            publisher,
        })
    }

    fn publish(&self, record: EventRecord) -> Result<()> {
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(&self.publisher);
            handle.spawn(async move {
                if let Err(err) = publisher.publish(record).await {
                    eprintln!("telemetry event publish failed: {err:?}");
                }
            });
            Ok(())
        } else if let Some(runtime) = &self.runtime {
            runtime.block_on(self.publisher.publish(record))
        } else {
            Ok(())
        }
    }
}

// The last telemetry clone may be dropped inside an async task, where a blocking shutdown panics.
impl Drop for EventHandle {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl QualityTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> QualityTelemetryBuilder {
        QualityTelemetryBuilder::new(module)
    }

    /// Run identifier attached to records, if any.
    #[must_use]
    pub fn run_id(&self) -> Option<&str> {
        self.inner.run_id.as_deref()
    }

    /// Logs structured metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let mut record = LogRecord::new(&self.inner.module, level, message).with_metadata(metadata);
            if let Some(run_id) = &self.inner.run_id {
                record
                    .metadata
                    .insert("run_id".into(), Value::String(run_id.clone()));
            }
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Emits an event on the bus.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        if let Some(handle) = &self.inner.event {
            let mut record = EventRecord::new(&self.inner.module, event_type, payload);
            if let Some(run_id) = &self.inner.run_id {
                record = record.for_run(run_id);
            }
            handle.publish(record)?;
        }
        Ok(())
    }
}

/// Logs through optional telemetry, ignoring sink failures.
pub(crate) fn log(telemetry: Option<&QualityTelemetry>, level: LogLevel, message: &str, metadata: Value) {
    if let Some(tel) = telemetry {
        let _ = tel.log(level, message, metadata);
    }
}

/// Emits through optional telemetry, ignoring sink failures.
pub(crate) fn event(telemetry: Option<&QualityTelemetry>, event_type: &str, payload: Value) {
    if let Some(tel) = telemetry {
        let _ = tel.event(event_type, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_event_bus::MemoryEventBus;
    use shared_logging::read_log;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_log_and_event() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("quality.log");
        let bus = Arc::new(MemoryEventBus::new(16));
        let telemetry = QualityTelemetry::builder("quality")
            .log_path(&path)
            .run_id("run-7")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "labels engineered", json!({ "records": 3 }))
            .unwrap();
        telemetry
            .event("quality.labels.engineered", json!({ "records": 3 }))
            .unwrap();
        let records = read_log(&path).unwrap();
        assert_eq!(records[0].metadata["run_id"], json!("run-7"));
        assert_eq!(records[0].metadata["records"], json!(3));
        let events = bus.snapshot();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].run_id.as_deref(), Some("run-7"));
    }

    #[test]
    fn drops_cleanly_inside_async_context() {
        let bus = Arc::new(MemoryEventBus::new(4));
        let telemetry = QualityTelemetry::builder("quality")
            .event_publisher(bus)
            .build()
            .unwrap();
        let runtime = Runtime::new().unwrap();
        runtime.block_on(async move {
            telemetry
                .event("quality.run.completed", json!({ "ok": true }))
                .unwrap();
            drop(telemetry);
        });
    }

    #[test]
    fn min_level_filters_debug() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("quality.log");
        let telemetry = QualityTelemetry::builder("quality")
            .log_path(&path)
            .min_level(LogLevel::Info)
            .build()
            .unwrap();
        telemetry.log(LogLevel::Debug, "iteration", Value::Null).unwrap();
        telemetry.log(LogLevel::Warn, "slow", Value::Null).unwrap();
        assert_eq!(read_log(&path).unwrap().len(), 1);
    }
}
