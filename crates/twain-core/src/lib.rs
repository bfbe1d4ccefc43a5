//! twain-core: client-side TWAIN protocol engine in Rust.
//!
//! This crate drives image acquisition against a TWAIN data source manager:
//! it negotiates capabilities, walks the source through its lifecycle and
//! retrieves images through either transfer mechanism.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Return/condition codes, message vocabulary, shared structures
//! - **DSM**: Source manager boundary (platform library, scripted mock)
//! - **Capability / Negotiation**: Typed capability calls and the ordered
//!   negotiation sequence
//! - **Source**: Device session state machine and discovery
//! - **Transfer**: Whole-image and incremental-buffered pipelines
//! - **Events**: Diagnostic sink for UI decoupling
//! - **Manager**: High-level orchestrator driven from the host event loop
//!
//! # Example
//!
//! ```no_run
//! use twain_core::config::{EngineConfig, ResolutionSettings, ScanConfiguration};
//! use twain_core::dsm::{MockDsm, MockImage};
//! use twain_core::hook::HeadlessEventSource;
//! use twain_core::manager::SessionManager;
//! use twain_core::protocol::{Msg, PixelType, RawEvent};
//! use twain_core::transfer::{Continuation, ScanObserver, TransferEvent};
//! use twain_core::TwainError;
//!
//! struct Print;
//!
//! impl ScanObserver for Print {
//!     fn on_transfer(&mut self, event: &TransferEvent<'_>) -> Continuation {
//!         println!("{}x{}", event.raster.width, event.raster.height);
//!         Continuation::Continue
//!     }
//!
//!     fn on_complete(&mut self, error: Option<&TwainError>) {
//!         println!("done: {error:?}");
//!     }
//! }
//!
//! let dsm = MockDsm::new();
//! dsm.add_source("Flatbed");
//! dsm.queue_image(MockImage::pattern(850, 1100, PixelType::Grey));
//! dsm.queue_pending_counts(&[0]);
//! dsm.queue_event(Msg::XferReady);
//!
//! let engine = EngineConfig::default();
//! let mut manager = SessionManager::new(dsm, HeadlessEventSource::new(), &engine)?;
//! let config = ScanConfiguration {
//!     resolution: Some(ResolutionSettings::photocopier()),
//!     ..Default::default()
//! };
//! manager.start_scan(config, Box::new(Print))?;
//! while manager.is_scanning() && manager.on_event(&RawEvent::idle()) {}
//! # Ok::<(), TwainError>(())
//! ```

pub mod capability;
pub mod config;
pub mod dsm;
pub mod error;
pub mod events;
pub mod hook;
pub mod manager;
pub mod negotiation;
pub mod protocol;
pub mod raster;
pub mod source;
pub mod state;
pub mod transfer;

// Re-exports for convenience
pub use capability::{CapabilityAccessor, CapabilityRef, RejectReason, StepOutcome};
pub use config::{EngineConfig, ScanConfiguration, TransferMode};
pub use dsm::{DsmTransport, MockDsm, NativeImage};
#[cfg(windows)]
pub use dsm::NativeDsm;
pub use error::{Result, TwainError};
pub use events::{DiagnosticSink, LogLevel, NullSink, ScanEvent, TracingSink};
pub use hook::{EventSource, HeadlessEventSource};
pub use manager::SessionManager;
pub use negotiation::{NegotiationReport, NegotiationWarning};
pub use raster::{DibConverter, Raster, RasterConverter};
pub use source::DataSource;
pub use state::SourceState;
pub use transfer::{Continuation, ScanObserver, TransferEvent};
