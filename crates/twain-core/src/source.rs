//! Device session state machine and source discovery.

use tracing::{debug, info, instrument, warn};

use crate::capability::{CapabilityAccessor, CapabilityRef, StepOutcome};
use crate::config::ScanConfiguration;
use crate::dsm::DsmTransport;
use crate::error::{Result, TwainError};
use crate::events::{DiagnosticSink, ScanEvent};
use crate::negotiation::{NegotiationReport, negotiate};
use crate::protocol::{
    ApplicationIdentity, CapValue, ConditionCode, Msg, ReturnCode, SourceIdentity, UserInterface,
    WindowHandle,
};
use crate::state::{SourceState, StateTracker};

/// One data source and its lifecycle.
///
/// The session holds the device handle between [`open`](Self::open) and
/// [`close`](Self::close); the owning [`crate::manager::SessionManager`]
/// closes it on every exit path.
#[derive(Debug)]
pub struct DataSource {
    identity: SourceIdentity,
    tracker: StateTracker,
}

impl DataSource {
    pub fn new(identity: SourceIdentity) -> Self {
        Self {
            identity,
            tracker: StateTracker::new(),
        }
    }

    pub fn identity(&self) -> &SourceIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.product_name
    }

    pub fn state(&self) -> SourceState {
        self.tracker.state()
    }

    fn transition(&mut self, to: SourceState, sink: &dyn DiagnosticSink) -> bool {
        let from = self.tracker.state();
        let moved = self.tracker.goto_state(to);
        if moved && from != to {
            sink.on_event(&ScanEvent::StateChanged { from, to });
        }
        moved
    }

    fn accessor<'a, T: DsmTransport>(
        &'a self,
        dsm: &'a T,
        app: &'a ApplicationIdentity,
    ) -> CapabilityAccessor<'a, T> {
        CapabilityAccessor::new(dsm, app, &self.identity, self.tracker.state())
    }

    /// Open the device, negotiate `config` and enable it for transfer.
    ///
    /// On any failure after the device opened, it is closed again before the
    /// error is returned.
    #[instrument(skip_all, fields(source = %self.identity))]
    pub fn open<T: DsmTransport>(
        &mut self,
        dsm: &T,
        app: &ApplicationIdentity,
        config: &ScanConfiguration,
        window: WindowHandle,
        sink: &dyn DiagnosticSink,
    ) -> Result<NegotiationReport> {
        config.validate()?;
        self.open_device(dsm, app, sink)?;

        let result = self.negotiate_and_enable(dsm, app, config, window, sink);
        if result.is_err() {
            self.close(dsm, app, sink);
        }
        result
    }

    fn negotiate_and_enable<T: DsmTransport>(
        &mut self,
        dsm: &T,
        app: &ApplicationIdentity,
        config: &ScanConfiguration,
        window: WindowHandle,
        sink: &dyn DiagnosticSink,
    ) -> Result<NegotiationReport> {
        let report = {
            let accessor = self.accessor(dsm, app);
            if config.abort_when_no_paper_detectable
                && !accessor.get_bool(CapabilityRef::FEEDER_LOADED)
            {
                warn!("Feeder is empty");
                return Err(TwainError::FeederEmpty);
            }
            negotiate(&accessor, config)?
        };
        report.log_to(sink);
        self.transition(SourceState::Negotiated, sink);

        let ui = UserInterface {
            show_ui: config.show_twain_ui,
            modal_ui: false,
            parent: window,
        };
        let rc = dsm.user_interface(app, &self.identity, Msg::EnableDs, &ui);
        if !rc.is_success() {
            warn!(rc = %rc, "Enable failed");
            return Err(TwainError::EnableFailed { code: rc });
        }
        self.transition(SourceState::Enabled, sink);
        Ok(report)
    }

    fn open_device<T: DsmTransport>(
        &mut self,
        dsm: &T,
        app: &ApplicationIdentity,
        sink: &dyn DiagnosticSink,
    ) -> Result<()> {
        if self.state().is_open() {
            return Err(TwainError::InvalidState {
                expected: SourceState::Closed,
                actual: self.state(),
            });
        }
        let rc = dsm.identity(app, Msg::OpenDs, &mut self.identity);
        if !rc.is_success() {
            let condition = dsm.status(app, None).condition_code;
            warn!(rc = %rc, condition = %condition, "Failed to open data source");
            return Err(TwainError::DeviceOpenFailed {
                code: rc,
                condition,
            });
        }
        info!(source = %self.identity, "Data source opened");
        self.transition(SourceState::Opened, sink);
        Ok(())
    }

    /// Mark the start of image retrieval after transfer-ready.
    pub fn begin_transfer(&mut self, sink: &dyn DiagnosticSink) -> Result<()> {
        if self.transition(SourceState::Transferring, sink) {
            Ok(())
        } else {
            Err(TwainError::InvalidState {
                expected: SourceState::Enabled,
                actual: self.state(),
            })
        }
    }

    /// Disable the source UI (if enabled) and release the device.
    ///
    /// Idempotent: nothing is sent for a closed or never-selected source.
    pub fn close<T: DsmTransport>(
        &mut self,
        dsm: &T,
        app: &ApplicationIdentity,
        sink: &dyn DiagnosticSink,
    ) {
        if !self.identity.is_selected() || !self.state().is_open() {
            return;
        }
        if self.state().is_enabled() {
            let rc = dsm.user_interface(app, &self.identity, Msg::DisableDs, &UserInterface::default());
            if !rc.is_success() {
                warn!(rc = %rc, "Disable failed");
            }
        }
        let rc = dsm.identity(app, Msg::CloseDs, &mut self.identity);
        if !rc.is_success() {
            warn!(rc = %rc, "Close failed");
        }
        debug!(source = %self.identity, "Data source closed");
        self.transition(SourceState::Closed, sink);
    }

    /// Whether the feeder holds paper.
    ///
    /// Opens the device around the probe when it is not already open.
    pub fn is_paper_on<T: DsmTransport>(
        &mut self,
        dsm: &T,
        app: &ApplicationIdentity,
        sink: &dyn DiagnosticSink,
    ) -> Result<bool> {
        self.with_device(dsm, app, sink, |caps| {
            caps.get_bool(CapabilityRef::FEEDER_LOADED)
        })
    }

    /// Start the vendor calibration pass, with progress indicators off.
    ///
    /// Returns whether the device accepted the calibration request. Only
    /// valid while the source is not enabled.
    pub fn calibrate<T: DsmTransport>(
        &mut self,
        dsm: &T,
        app: &ApplicationIdentity,
        sink: &dyn DiagnosticSink,
    ) -> Result<bool> {
        self.ensure_not_enabled()?;
        let accepted = self.with_device(dsm, app, sink, |caps| {
            let indicators = caps.set(CapabilityRef::INDICATORS, CapValue::Bool(false));
            if !indicators.is_applied() {
                debug!(outcome = ?indicators, "Indicators left on for calibration");
            }
            caps.set(CapabilityRef::CALIBRATE, CapValue::Bool(true))
        })?;
        match &accepted {
            StepOutcome::Applied => info!(source = %self.identity, "Calibration started"),
            other => warn!(source = %self.identity, outcome = ?other, "Calibration refused"),
        }
        Ok(accepted.is_applied())
    }

    /// Whether the device reports that calibration is due. A device that
    /// cannot answer is treated as not needing it.
    pub fn needs_calibration<T: DsmTransport>(
        &mut self,
        dsm: &T,
        app: &ApplicationIdentity,
        sink: &dyn DiagnosticSink,
    ) -> Result<bool> {
        self.with_device(dsm, app, sink, |caps| {
            caps.get(CapabilityRef::CALIBRATION_NEEDED)
                .is_some_and(|value| value.as_i64() > 0)
        })
    }

    fn ensure_not_enabled(&self) -> Result<()> {
        if self.state().is_enabled() {
            return Err(TwainError::InvalidState {
                expected: SourceState::Opened,
                actual: self.state(),
            });
        }
        Ok(())
    }

    /// Run `f` against the device, opening it around the call when it is
    /// not already open.
    fn with_device<T: DsmTransport, R>(
        &mut self,
        dsm: &T,
        app: &ApplicationIdentity,
        sink: &dyn DiagnosticSink,
        f: impl FnOnce(&CapabilityAccessor<'_, T>) -> R,
    ) -> Result<R> {
        if self.state().is_open() {
            return Ok(f(&self.accessor(dsm, app)));
        }
        self.open_device(dsm, app, sink)?;
        let result = f(&self.accessor(dsm, app));
        self.close(dsm, app, sink);
        Ok(result)
    }
}

fn manager_error<T: DsmTransport>(
    dsm: &T,
    app: &ApplicationIdentity,
    operation: &'static str,
    code: ReturnCode,
) -> TwainError {
    let condition = if code == ReturnCode::Failure {
        dsm.status(app, None).condition_code
    } else {
        ConditionCode::Success
    };
    TwainError::Protocol {
        operation,
        code,
        condition,
    }
}

/// The manager's default source.
pub fn default_source<T: DsmTransport>(dsm: &T, app: &ApplicationIdentity) -> Result<SourceIdentity> {
    let mut identity = SourceIdentity::default();
    let rc = dsm.identity(app, Msg::GetDefault, &mut identity);
    if !rc.is_success() {
        return Err(manager_error(dsm, app, "get default source", rc));
    }
    Ok(identity)
}

/// Show the manager's source chooser. Blocks until the user answers;
/// `None` when cancelled.
pub fn user_select<T: DsmTransport>(
    dsm: &T,
    app: &ApplicationIdentity,
) -> Result<Option<SourceIdentity>> {
    let mut identity = SourceIdentity::default();
    match dsm.identity(app, Msg::UserSelect, &mut identity) {
        ReturnCode::Success => Ok(Some(identity)),
        ReturnCode::Cancel => {
            debug!("Source selection cancelled");
            Ok(None)
        }
        rc => Err(manager_error(dsm, app, "select source", rc)),
    }
}

/// Every source the manager knows, in discovery order.
pub fn all_sources<T: DsmTransport>(
    dsm: &T,
    app: &ApplicationIdentity,
) -> Result<Vec<SourceIdentity>> {
    let mut sources = Vec::new();
    let mut msg = Msg::GetFirst;
    loop {
        let mut identity = SourceIdentity::default();
        match dsm.identity(app, msg, &mut identity) {
            ReturnCode::Success => sources.push(identity),
            ReturnCode::EndOfList => break,
            rc => {
                warn!(rc = %rc, found = sources.len(), "Source enumeration failed");
                return Err(TwainError::EnumerationFailed { code: rc });
            }
        }
        msg = Msg::GetNext;
    }
    debug!(count = sources.len(), "Sources enumerated");
    Ok(sources)
}

/// Case-insensitive lookup by product name.
pub fn source_by_name<T: DsmTransport>(
    dsm: &T,
    app: &ApplicationIdentity,
    name: &str,
) -> Result<Option<SourceIdentity>> {
    let wanted = name.to_lowercase();
    Ok(all_sources(dsm, app)?
        .into_iter()
        .find(|s| s.product_name.to_lowercase() == wanted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ResolutionSettings, TransferMode};
    use crate::dsm::MockDsm;
    use crate::events::NullSink;
    use crate::protocol::constants::*;
    use crate::protocol::{CapValue, Version};

    fn setup() -> (MockDsm, ApplicationIdentity, DataSource) {
        let mock = MockDsm::new();
        let identity = mock.add_source("Feeder");
        let mut app = ApplicationIdentity::new("Test", "Test", "Test", Version::default());
        app.id = 1;
        (mock, app, DataSource::new(identity))
    }

    fn config() -> ScanConfiguration {
        ScanConfiguration {
            use_document_feeder: Some(true),
            use_duplex: Some(true),
            resolution: Some(ResolutionSettings::fax()),
            transfer_mode: TransferMode::Native,
            ..Default::default()
        }
    }

    #[test]
    fn test_open_walks_lifecycle() {
        let (mock, app, mut source) = setup();

        source
            .open(&mock, &app, &config(), WindowHandle::NONE, &NullSink)
            .unwrap();

        assert_eq!(source.state(), SourceState::Enabled);
        assert_eq!(mock.count(DAT_IDENTITY, Msg::OpenDs), 1);
        assert_eq!(mock.count(DAT_USERINTERFACE, Msg::EnableDs), 1);
    }

    #[test]
    fn test_open_succeeds_when_every_set_rejected() {
        let (mock, app, mut source) = setup();
        mock.reject_all_sets();

        let report = source
            .open(&mock, &app, &config(), WindowHandle::NONE, &NullSink)
            .unwrap();

        assert!(report.steps.iter().all(|s| !s.outcome.is_applied()));
        assert_eq!(source.state(), SourceState::Enabled);
    }

    #[test]
    fn test_feeder_empty_before_negotiation() {
        let (mock, app, mut source) = setup();
        mock.set_cap(CAP_FEEDERLOADED, CapValue::Bool(false));
        let config = ScanConfiguration {
            abort_when_no_paper_detectable: true,
            ..config()
        };

        let err = source
            .open(&mock, &app, &config, WindowHandle::NONE, &NullSink)
            .unwrap_err();

        assert!(matches!(err, TwainError::FeederEmpty));
        assert!(mock.cap_calls(Msg::Set).is_empty());
        assert_eq!(mock.count(DAT_IDENTITY, Msg::CloseDs), 1);
        assert_eq!(source.state(), SourceState::Closed);
    }

    #[test]
    fn test_enable_failure_closes_device() {
        let (mock, app, mut source) = setup();
        mock.set_enable_result(ReturnCode::Failure);

        let err = source
            .open(&mock, &app, &config(), WindowHandle::NONE, &NullSink)
            .unwrap_err();

        assert!(matches!(err, TwainError::EnableFailed { code: ReturnCode::Failure }));
        assert_eq!(mock.count(DAT_IDENTITY, Msg::CloseDs), 1);
        assert_eq!(mock.count(DAT_USERINTERFACE, Msg::DisableDs), 0);
    }

    #[test]
    fn test_open_failure_reports_code() {
        let (mock, app, mut source) = setup();
        mock.set_open_result(ReturnCode::Failure);

        let err = source
            .open(&mock, &app, &config(), WindowHandle::NONE, &NullSink)
            .unwrap_err();

        assert!(matches!(
            err,
            TwainError::DeviceOpenFailed {
                code: ReturnCode::Failure,
                condition: ConditionCode::NoDs
            }
        ));
        assert!(mock.cap_calls(Msg::Set).is_empty());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mock, app, mut source) = setup();
        source
            .open(&mock, &app, &config(), WindowHandle::NONE, &NullSink)
            .unwrap();

        source.close(&mock, &app, &NullSink);
        let after_first = mock.calls().len();
        source.close(&mock, &app, &NullSink);

        assert_eq!(mock.calls().len(), after_first);
        assert_eq!(mock.count(DAT_USERINTERFACE, Msg::DisableDs), 1);
        assert_eq!(mock.count(DAT_IDENTITY, Msg::CloseDs), 1);
    }

    #[test]
    fn test_close_never_opened_sends_nothing() {
        let (mock, app, mut source) = setup();
        source.close(&mock, &app, &NullSink);

        let mut unselected = DataSource::new(SourceIdentity::default());
        unselected.close(&mock, &app, &NullSink);

        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_paper_probe_opens_and_closes() {
        let (mock, app, mut source) = setup();
        mock.set_cap(CAP_FEEDERLOADED, CapValue::Bool(true));

        assert!(source.is_paper_on(&mock, &app, &NullSink).unwrap());
        assert_eq!(mock.count(DAT_IDENTITY, Msg::OpenDs), 1);
        assert_eq!(mock.count(DAT_IDENTITY, Msg::CloseDs), 1);
        assert_eq!(source.state(), SourceState::Closed);
    }

    #[test]
    fn test_calibrate_turns_indicators_off_first() {
        let (mock, app, mut source) = setup();

        assert!(source.calibrate(&mock, &app, &NullSink).unwrap());
        assert_eq!(mock.cap_calls(Msg::Set), vec![CAP_INDICATORS, CAP_VENDOR_CALIBRATE]);
        assert_eq!(mock.cap_value(CAP_INDICATORS), Some(CapValue::Bool(false)));
        assert_eq!(mock.cap_value(CAP_VENDOR_CALIBRATE), Some(CapValue::Bool(true)));
        assert_eq!(mock.count(DAT_IDENTITY, Msg::CloseDs), 1);
        assert_eq!(source.state(), SourceState::Closed);
    }

    #[test]
    fn test_calibrate_refused_by_device() {
        let (mock, app, mut source) = setup();
        mock.reject_cap(CAP_VENDOR_CALIBRATE);

        assert!(!source.calibrate(&mock, &app, &NullSink).unwrap());
        assert_eq!(source.state(), SourceState::Closed);
    }

    #[test]
    fn test_calibrate_ignores_indicator_rejection() {
        let (mock, app, mut source) = setup();
        mock.reject_cap(CAP_INDICATORS);

        assert!(source.calibrate(&mock, &app, &NullSink).unwrap());
        assert_eq!(mock.cap_value(CAP_VENDOR_CALIBRATE), Some(CapValue::Bool(true)));
    }

    #[test]
    fn test_calibrate_rejected_while_enabled() {
        let (mock, app, mut source) = setup();
        source
            .open(&mock, &app, &config(), WindowHandle::NONE, &NullSink)
            .unwrap();
        mock.clear_calls();

        let err = source.calibrate(&mock, &app, &NullSink).unwrap_err();

        assert!(matches!(err, TwainError::InvalidState { .. }));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_needs_calibration_reads_vendor_cap() {
        let (mock, app, mut source) = setup();
        assert!(!source.needs_calibration(&mock, &app, &NullSink).unwrap());

        mock.set_cap(CAP_VENDOR_CALIBRATE, CapValue::Int32(1));
        assert!(source.needs_calibration(&mock, &app, &NullSink).unwrap());

        mock.set_cap(CAP_VENDOR_CALIBRATE, CapValue::Int32(0));
        assert!(!source.needs_calibration(&mock, &app, &NullSink).unwrap());
        assert_eq!(mock.count(DAT_IDENTITY, Msg::OpenDs), 3);
        assert_eq!(mock.count(DAT_IDENTITY, Msg::CloseDs), 3);
    }

    #[test]
    fn test_all_sources_in_order() {
        let mock = MockDsm::new();
        let app = ApplicationIdentity::new("Test", "Test", "Test", Version::default());
        for name in ["A", "B", "C"] {
            mock.add_source(name);
        }

        let names: Vec<_> = all_sources(&mock, &app)
            .unwrap()
            .into_iter()
            .map(|s| s.product_name)
            .collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_enumeration_fault() {
        let mock = MockDsm::new();
        let app = ApplicationIdentity::new("Test", "Test", "Test", Version::default());
        mock.add_source("A");
        mock.add_source("B");
        mock.fail_enumeration_at(1, ReturnCode::Failure);

        let err = all_sources(&mock, &app).unwrap_err();
        assert!(matches!(err, TwainError::EnumerationFailed { code: ReturnCode::Failure }));
    }

    #[test]
    fn test_empty_enumeration() {
        let mock = MockDsm::new();
        let app = ApplicationIdentity::new("Test", "Test", "Test", Version::default());
        assert!(all_sources(&mock, &app).unwrap().is_empty());
    }

    #[test]
    fn test_source_by_name_ignores_case() {
        let mock = MockDsm::new();
        let app = ApplicationIdentity::new("Test", "Test", "Test", Version::default());
        mock.add_source("Flatbed");
        mock.add_source("Duplex Feeder");

        let found = source_by_name(&mock, &app, "duplex FEEDER").unwrap();
        assert_eq!(found.map(|s| s.product_name), Some("Duplex Feeder".to_string()));
        assert_eq!(source_by_name(&mock, &app, "missing").unwrap(), None);
    }

    #[test]
    fn test_user_select_cancel() {
        let mock = MockDsm::new();
        let app = ApplicationIdentity::new("Test", "Test", "Test", Version::default());
        mock.add_source("A");
        assert_eq!(user_select(&mock, &app).unwrap(), None);

        mock.set_user_choice(Some(0));
        assert_eq!(user_select(&mock, &app).unwrap().unwrap().product_name, "A");
    }
}
