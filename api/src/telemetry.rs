use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::TelemetryConfig;

/// Terminal status of a pipeline run, attached to every latency sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTag {
    Warmup,
    RateLimited,
    RecaptchaBlocked,
    Clarification,
    Success,
    ParseFallback,
    TimeoutFallback,
    Error,
}

impl StatusTag {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusTag::Warmup => "warmup",
            StatusTag::RateLimited => "rate_limited",
            StatusTag::RecaptchaBlocked => "recaptcha_blocked",
            StatusTag::Clarification => "clarification",
            StatusTag::Success => "success",
            StatusTag::ParseFallback => "parse_fallback",
            StatusTag::TimeoutFallback => "timeout_fallback",
            StatusTag::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySample {
    pub latency_ms: u64,
    pub status: StatusTag,
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry sink unavailable: {0}")]
    Unavailable(String),
}

/// Metrics backend contract: accept one latency sample.
pub trait LatencySink: Send + Sync {
    fn record(&self, sample: LatencySample) -> Result<(), TelemetryError>;
}

/// Emits samples as structured tracing events for the log-based metrics
/// pipeline of the hosting project.
pub struct TracingLatencySink {
    project_id: Option<String>,
}

impl TracingLatencySink {
    pub fn new(project_id: Option<String>) -> Self {
        Self { project_id }
    }
}

impl LatencySink for TracingLatencySink {
    fn record(&self, sample: LatencySample) -> Result<(), TelemetryError> {
        tracing::info!(
            target: "recall_telemetry",
            metric = "recall_latency_ms",
            project = self.project_id.as_deref().unwrap_or("unset"),
            latency_ms = sample.latency_ms,
            status = sample.status.as_str(),
            "latency sample"
        );
        Ok(())
    }
}

/// Fire-and-forget recorder. Never blocks or fails the response.
#[derive(Clone)]
pub struct TelemetryRecorder {
    sink: Option<Arc<dyn LatencySink>>,
}

impl TelemetryRecorder {
    pub fn from_config(config: &TelemetryConfig) -> Self {
        if config.enabled {
            Self::with_sink(Arc::new(TracingLatencySink::new(config.project_id.clone())))
        } else {
            Self::disabled()
        }
    }

    pub fn with_sink(sink: Arc<dyn LatencySink>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn record(&self, latency: Duration, status: StatusTag) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        let sample = LatencySample {
            latency_ms: latency.as_millis().min(u64::MAX as u128) as u64,
            status,
        };
        tokio::spawn(async move {
            if let Err(e) = sink.record(sample) {
                tracing::warn!(
                    event = "telemetry_record_failed",
                    error = %e,
                    status = status.as_str(),
                    "Failed to record latency sample"
                );
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use tokio::sync::mpsc;

    use super::*;

    /// Sink that forwards samples to a channel so tests can await them.
    pub struct ChannelSink(pub mpsc::UnboundedSender<LatencySample>);

    impl LatencySink for ChannelSink {
        fn record(&self, sample: LatencySample) -> Result<(), TelemetryError> {
            self.0
                .send(sample)
                .map_err(|e| TelemetryError::Unavailable(e.to_string()))
        }
    }

    pub fn channel_recorder() -> (TelemetryRecorder, mpsc::UnboundedReceiver<LatencySample>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TelemetryRecorder::with_sink(Arc::new(ChannelSink(tx))), rx)
    }
}
