//! Diagnostic events for UI decoupling.
//!
//! Hosts subscribe to engine progress without the engine knowing how (or
//! whether) it is displayed.

use std::fmt;

use crate::state::SourceState;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Transfer pipeline in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    Native,
    Buffered,
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pipeline::Native => write!(f, "native"),
            Pipeline::Buffered => write!(f, "buffered"),
        }
    }
}

/// Events emitted by the session manager and transfer engine.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// Data source lifecycle changed.
    StateChanged { from: SourceState, to: SourceState },
    /// Aggregate outcome of one negotiation pass.
    NegotiationSummary {
        applied: usize,
        rejected: usize,
        unsupported: usize,
        skipped: usize,
    },
    /// Source posted transfer-ready.
    TransferReady { pipeline: Pipeline },
    /// One whole image retrieved.
    ImageTransferred {
        width: u32,
        height: u32,
        pending: u16,
    },
    /// One buffered chunk retrieved.
    ChunkTransferred { rows: u32, bytes: u32, completion: f32 },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Scan finished; `error` carries the failure text if any.
    ScanComplete { images: usize, error: Option<String> },
}

/// Sink for diagnostic events.
///
/// Fire-and-forget: nothing the sink does feeds back into the engine.
pub trait DiagnosticSink: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &ScanEvent);

    fn log(&self, level: LogLevel, message: &str) {
        self.on_event(&ScanEvent::Log {
            level,
            message: message.to_string(),
        });
    }
}

/// No-op sink that discards all events.
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn on_event(&self, _event: &ScanEvent) {}
}

/// Sink that logs events using tracing.
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn on_event(&self, event: &ScanEvent) {
        match event {
            ScanEvent::StateChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "Source state changed");
            }
            ScanEvent::NegotiationSummary {
                applied,
                rejected,
                unsupported,
                skipped,
            } => {
                tracing::info!(
                    applied = applied,
                    rejected = rejected,
                    unsupported = unsupported,
                    skipped = skipped,
                    "Negotiation finished"
                );
            }
            ScanEvent::TransferReady { pipeline } => {
                tracing::info!(pipeline = %pipeline, "Transfer ready");
            }
            ScanEvent::ImageTransferred {
                width,
                height,
                pending,
            } => {
                tracing::info!(width = width, height = height, pending = pending, "Image transferred");
            }
            ScanEvent::ChunkTransferred {
                rows,
                bytes,
                completion,
            } => {
                tracing::trace!(
                    rows = rows,
                    bytes = bytes,
                    progress = %format!("{:.0}%", completion * 100.0),
                    "Chunk"
                );
            }
            ScanEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            ScanEvent::ScanComplete { images, error } => match error {
                Some(error) => tracing::error!(images = images, "Scan failed: {}", error),
                None => tracing::info!(images = images, "Scan complete"),
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Sink that keeps every event for later inspection.
    #[derive(Default, Clone)]
    pub(crate) struct RecordingSink {
        pub events: Arc<Mutex<Vec<ScanEvent>>>,
    }

    impl RecordingSink {
        pub fn warnings(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    ScanEvent::Log {
                        level: LogLevel::Warn,
                        message,
                    } => Some(message.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl DiagnosticSink for RecordingSink {
        fn on_event(&self, event: &ScanEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_log_helper_wraps_message() {
        let sink = RecordingSink::default();
        sink.log(LogLevel::Warn, "scan area rejected");
        assert_eq!(sink.warnings(), vec!["scan area rejected".to_string()]);
    }
}
