//! Session manager - owns the manager connection and drives one scan at a
//! time from the host's event loop.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::config::{EngineConfig, ScanConfiguration};
use crate::dsm::DsmTransport;
use crate::error::{Result, TwainError};
use crate::events::{DiagnosticSink, ScanEvent, TracingSink};
use crate::hook::EventSource;
use crate::negotiation::NegotiationReport;
use crate::protocol::{ApplicationIdentity, Msg, RawEvent, ReturnCode, SourceIdentity};
use crate::raster::{DibConverter, RasterConverter};
use crate::source::{self, DataSource};
use crate::transfer::{ScanObserver, TransferContext, TransferSummary, buffered, native};

/// Scan started by [`SessionManager::start_scan`] and not yet completed.
struct ActiveScan {
    config: ScanConfiguration,
    observer: Box<dyn ScanObserver>,
    images: usize,
}

/// Session manager - one manager connection, one selected source, at most
/// one scan in flight.
///
/// All calls happen on the thread that owns the host event loop. Dropping
/// the manager ends any active scan, closes the source and the manager
/// connection.
pub struct SessionManager<T: DsmTransport, E: EventSource> {
    dsm: T,
    events: E,
    app: ApplicationIdentity,
    source: Option<DataSource>,
    converter: Box<dyn RasterConverter>,
    sink: Arc<dyn DiagnosticSink>,
    scan: Option<ActiveScan>,
}

impl<T: DsmTransport, E: EventSource> SessionManager<T, E> {
    /// Open the manager connection and select the default source.
    #[instrument(skip_all, fields(app = %engine.product_name))]
    pub fn new(dsm: T, events: E, engine: &EngineConfig) -> Result<Self> {
        let mut app = engine.identity();
        let rc = dsm.parent(&mut app, Msg::OpenDsm, events.window_handle());
        if !rc.is_success() {
            let condition = dsm.status(&app, None).condition_code;
            return Err(TwainError::Protocol {
                operation: "open source manager",
                code: rc,
                condition,
            });
        }
        info!(id = app.id, "Source manager opened");

        let source = match source::default_source(&dsm, &app) {
            Ok(identity) => {
                info!(source = %identity, "Default source selected");
                Some(DataSource::new(identity))
            }
            Err(e) => {
                warn!(error = %e, "No default data source");
                None
            }
        };

        Ok(Self {
            dsm,
            events,
            app,
            source,
            converter: Box::new(DibConverter),
            sink: Arc::new(TracingSink),
            scan: None,
        })
    }

    /// Replace the diagnostic sink (defaults to [`TracingSink`]).
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the native-image converter (defaults to [`DibConverter`]).
    pub fn with_converter(mut self, converter: Box<dyn RasterConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn app(&self) -> &ApplicationIdentity {
        &self.app
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn selected_source(&self) -> Option<&SourceIdentity> {
        self.source.as_ref().map(DataSource::identity)
    }

    pub fn is_scanning(&self) -> bool {
        self.scan.is_some()
    }

    /// Open, negotiate and enable the selected source, then arm event
    /// forwarding.
    ///
    /// On failure the device is closed and `observer` has already received
    /// its single completion when this returns.
    #[instrument(skip_all)]
    pub fn start_scan(
        &mut self,
        config: ScanConfiguration,
        mut observer: Box<dyn ScanObserver>,
    ) -> Result<NegotiationReport> {
        if self.scan.is_some() {
            let err = TwainError::ScanInProgress;
            warn!("Scan rejected: another scan is active");
            observer.on_complete(Some(&err));
            return Err(err);
        }
        let Some(source) = self.source.as_mut() else {
            let err = TwainError::NoSourceSelected;
            self.sink.on_event(&ScanEvent::ScanComplete {
                images: 0,
                error: Some(err.to_string()),
            });
            observer.on_complete(Some(&err));
            return Err(err);
        };

        let window = self.events.window_handle();
        match source.open(&self.dsm, &self.app, &config, window, self.sink.as_ref()) {
            Ok(report) => {
                info!(source = %source.identity(), buffered = config.is_buffered(), "Scan armed");
                self.scan = Some(ActiveScan {
                    config,
                    observer,
                    images: 0,
                });
                self.events.set_forwarding(true);
                Ok(report)
            }
            Err(err) => {
                source.close(&self.dsm, &self.app, self.sink.as_ref());
                self.sink.on_event(&ScanEvent::ScanComplete {
                    images: 0,
                    error: Some(err.to_string()),
                });
                observer.on_complete(Some(&err));
                Err(err)
            }
        }
    }

    /// Offer one platform event to the source.
    ///
    /// Returns `true` when the source consumed it; the host must skip its own
    /// processing in that case. Scan failures are delivered to the observer,
    /// never returned from here.
    pub fn on_event(&mut self, event: &RawEvent) -> bool {
        if self.scan.is_none() {
            return false;
        }
        let Some(source) = self.source.as_ref() else {
            return false;
        };

        let outcome = self.dsm.process_event(&self.app, source.identity(), event);
        if outcome.code != ReturnCode::DsEvent {
            return false;
        }
        match outcome.message {
            Msg::XferReady => self.run_transfer(),
            Msg::CloseDs | Msg::CloseDsReq | Msg::CloseDsOk => {
                info!(message = %outcome.message, "Source asked to close");
                self.finish_scan(None);
            }
            Msg::DeviceEvent => debug!("Device event ignored"),
            Msg::Null => {}
            other => debug!(message = %other, "Unhandled source message"),
        }
        true
    }

    fn run_transfer(&mut self) {
        let result = {
            let (Some(source), Some(scan)) = (self.source.as_mut(), self.scan.as_mut()) else {
                return;
            };
            match source.begin_transfer(self.sink.as_ref()) {
                Err(e) => Err(e),
                Ok(()) => {
                    let mut ctx = TransferContext {
                        dsm: &self.dsm,
                        app: &self.app,
                        source: source.identity(),
                        observer: scan.observer.as_mut(),
                        converter: self.converter.as_ref(),
                        sink: self.sink.as_ref(),
                    };
                    let mut summary = TransferSummary::default();
                    let result = if scan.config.is_buffered() {
                        buffered::transfer_into(&mut ctx, &mut summary)
                    } else {
                        native::transfer_into(&mut ctx, &mut summary)
                    };
                    scan.images += summary.images;
                    result
                }
            }
        };
        self.finish_scan(result.err());
    }

    /// Close the device, disarm forwarding and complete the active scan.
    fn finish_scan(&mut self, error: Option<TwainError>) {
        self.events.set_forwarding(false);
        if let Some(source) = self.source.as_mut() {
            source.close(&self.dsm, &self.app, self.sink.as_ref());
        }
        let Some(mut scan) = self.scan.take() else {
            return;
        };
        self.sink.on_event(&ScanEvent::ScanComplete {
            images: scan.images,
            error: error.as_ref().map(ToString::to_string),
        });
        scan.observer.on_complete(error.as_ref());
    }

    /// Make `identity` the source for the next scan.
    pub fn select_source(&mut self, identity: SourceIdentity) -> Result<()> {
        if self.scan.is_some() {
            return Err(TwainError::ScanInProgress);
        }
        if let Some(previous) = self.source.as_mut() {
            previous.close(&self.dsm, &self.app, self.sink.as_ref());
        }
        info!(source = %identity, "Source selected");
        self.source = Some(DataSource::new(identity));
        Ok(())
    }

    /// Select by product name, ignoring case. Returns `false` if no source
    /// has that name.
    pub fn select_source_by_name(&mut self, name: &str) -> Result<bool> {
        match source::source_by_name(&self.dsm, &self.app, name)? {
            Some(identity) => {
                self.select_source(identity)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run the manager's chooser. Returns `false` if the user cancelled.
    pub fn select_source_interactive(&mut self) -> Result<bool> {
        match source::user_select(&self.dsm, &self.app)? {
            Some(identity) => {
                self.select_source(identity)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn source_names(&self) -> Result<Vec<String>> {
        Ok(source::all_sources(&self.dsm, &self.app)?
            .into_iter()
            .map(|s| s.product_name)
            .collect())
    }

    pub fn default_source_name(&self) -> Result<String> {
        Ok(source::default_source(&self.dsm, &self.app)?.product_name)
    }

    /// Probe the selected source's feeder.
    pub fn is_paper_on(&mut self) -> Result<bool> {
        let source = self.source.as_mut().ok_or(TwainError::NoSourceSelected)?;
        source.is_paper_on(&self.dsm, &self.app, self.sink.as_ref())
    }

    /// Run the selected source's vendor calibration.
    pub fn calibrate(&mut self) -> Result<bool> {
        if self.scan.is_some() {
            return Err(TwainError::ScanInProgress);
        }
        let source = self.source.as_mut().ok_or(TwainError::NoSourceSelected)?;
        source.calibrate(&self.dsm, &self.app, self.sink.as_ref())
    }

    /// Whether the selected source reports that calibration is due.
    pub fn needs_calibration(&mut self) -> Result<bool> {
        let source = self.source.as_mut().ok_or(TwainError::NoSourceSelected)?;
        source.needs_calibration(&self.dsm, &self.app, self.sink.as_ref())
    }

    /// End any scan, close the source and the manager connection.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.scan.is_some() {
            self.finish_scan(None);
        }
        if let Some(source) = self.source.as_mut() {
            source.close(&self.dsm, &self.app, self.sink.as_ref());
        }
        if self.app.is_identified() {
            let window = self.events.window_handle();
            let rc = self.dsm.parent(&mut self.app, Msg::CloseDsm, window);
            if !rc.is_success() {
                warn!(rc = %rc, "Failed to close source manager");
            }
            self.app.id = 0;
            info!("Source manager closed");
        }
    }
}

impl<T: DsmTransport, E: EventSource> Drop for SessionManager<T, E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
