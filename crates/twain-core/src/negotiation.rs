//! Ordered, best-effort application of a [`ScanConfiguration`] to a source.
//!
//! Every step yields a [`StepOutcome`]; none of them aborts the sequence.
//! The only non-step result is a rejected scan area, which is carried as a
//! [`NegotiationWarning`] so the scan proceeds with the device default area.

use std::fmt;

use crate::capability::{CapabilityAccessor, CapabilityRef, RejectReason, StepOutcome};
use crate::config::{ColourSetting, ScanConfiguration};
use crate::dsm::DsmTransport;
use crate::error::Result;
use crate::events::{DiagnosticSink, LogLevel, ScanEvent};
use crate::protocol::constants::*;
use crate::protocol::{CapValue, Fix32, Frame, ImageLayout};

/// One entry of the negotiation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationStep {
    pub name: &'static str,
    pub cap: u16,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationWarning {
    /// The device refused the requested geometry and will scan its default area.
    ScanAreaRejected(RejectReason),
}

impl fmt::Display for NegotiationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationWarning::ScanAreaRejected(reason) => {
                write!(f, "scan area rejected ({reason}); using device default")
            }
        }
    }
}

/// Outcome of a whole negotiation pass, in step order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegotiationReport {
    pub steps: Vec<NegotiationStep>,
    pub warnings: Vec<NegotiationWarning>,
}

impl NegotiationReport {
    fn record(&mut self, name: &'static str, cap: CapabilityRef, outcome: StepOutcome) {
        self.steps.push(NegotiationStep {
            name,
            cap: cap.code,
            outcome,
        });
    }

    /// Outcome of the named step, if it ran.
    pub fn outcome(&self, name: &str) -> Option<StepOutcome> {
        self.steps.iter().find(|s| s.name == name).map(|s| s.outcome)
    }

    fn count(&self, pred: impl Fn(&StepOutcome) -> bool) -> usize {
        self.steps.iter().filter(|s| pred(&s.outcome)).count()
    }

    /// Emit the aggregate result: one summary plus one line per problem.
    pub fn log_to(&self, sink: &dyn DiagnosticSink) {
        for step in &self.steps {
            match step.outcome {
                StepOutcome::Rejected(_) | StepOutcome::Unsupported => sink.log(
                    LogLevel::Debug,
                    &format!("{} (0x{:04X}) {}", step.name, step.cap, step.outcome),
                ),
                _ => {}
            }
        }
        for warning in &self.warnings {
            sink.log(LogLevel::Warn, &warning.to_string());
        }
        sink.on_event(&ScanEvent::NegotiationSummary {
            applied: self.count(StepOutcome::is_applied),
            rejected: self.count(|o| matches!(o, StepOutcome::Rejected(_))),
            unsupported: self.count(|o| matches!(o, StepOutcome::Unsupported)),
            skipped: self.count(|o| matches!(o, StepOutcome::Skipped)),
        });
    }
}

struct Sequencer<'s, 'a, T: DsmTransport> {
    accessor: &'s CapabilityAccessor<'a, T>,
    report: NegotiationReport,
}

impl<T: DsmTransport> Sequencer<'_, '_, T> {
    fn set(&mut self, name: &'static str, cap: CapabilityRef, value: CapValue) {
        let outcome = self.accessor.set(cap, value);
        self.report.record(name, cap, outcome);
    }

    fn set_opt(&mut self, name: &'static str, cap: CapabilityRef, value: Option<CapValue>) {
        match value {
            Some(value) => self.set(name, cap, value),
            None => self.skip(name, cap),
        }
    }

    fn skip(&mut self, name: &'static str, cap: CapabilityRef) {
        self.report.record(name, cap, StepOutcome::Skipped);
    }

    /// Probe `probe`, and only if `supported` accepts its value set `target`.
    fn negotiate_if_supported(
        &mut self,
        name: &'static str,
        probe: CapabilityRef,
        supported: impl Fn(&CapValue) -> bool,
        target: CapabilityRef,
        value: CapValue,
    ) {
        match self.accessor.get(probe) {
            Some(current) if supported(&current) => self.set(name, target, value),
            _ => self.skip(name, target),
        }
    }

    /// Read the current value and write only when it differs. An unreadable
    /// current value is treated as different.
    fn set_if_changed(&mut self, name: &'static str, cap: CapabilityRef, value: CapValue) {
        match self.accessor.get(cap) {
            Some(current) if same_value(&current, &value) => {
                self.report.record(name, cap, StepOutcome::Applied)
            }
            _ => self.set(name, cap, value),
        }
    }
}

fn same_value(a: &CapValue, b: &CapValue) -> bool {
    match (a, b) {
        (CapValue::Fix32(x), CapValue::Fix32(y)) => x == y,
        _ => a.as_i64() == b.as_i64(),
    }
}

/// Apply `config` in the fixed protocol order.
///
/// Fails only for configuration errors (an unrecognized colour mode); device
/// refusals are recorded in the report.
pub fn negotiate<T: DsmTransport>(
    accessor: &CapabilityAccessor<'_, T>,
    config: &ScanConfiguration,
) -> Result<NegotiationReport> {
    let mut seq = Sequencer {
        accessor,
        report: NegotiationReport::default(),
    };

    seq.set_opt(
        "indicators",
        CapabilityRef::INDICATORS,
        config.show_progress_indicator_ui.map(CapValue::Bool),
    );
    seq.set_opt(
        "transfer_count",
        CapabilityRef::XFER_COUNT,
        config.transfer_count.map(CapValue::Int16),
    );

    let feeder = config.use_document_feeder == Some(true);
    seq.set_opt(
        "feeder_enabled",
        CapabilityRef::FEEDER_ENABLED,
        config.use_document_feeder.map(CapValue::Bool),
    );
    seq.set_opt(
        "auto_feed",
        CapabilityRef::AUTO_FEED,
        config.use_auto_feeder.map(|auto| CapValue::Bool(auto && feeder)),
    );
    seq.set_opt(
        "auto_scan",
        CapabilityRef::AUTO_SCAN,
        config.use_auto_scan_cache.map(CapValue::Bool),
    );

    match config.use_duplex {
        Some(duplex) => seq.negotiate_if_supported(
            "duplex_enabled",
            CapabilityRef::DUPLEX,
            |kind| kind.as_i64() != TWDX_NONE as i64,
            CapabilityRef::DUPLEX_ENABLED,
            CapValue::Bool(duplex),
        ),
        None => seq.skip("duplex_enabled", CapabilityRef::DUPLEX_ENABLED),
    }

    match config.page.filter(|_| feeder) {
        Some(page) => {
            seq.set_if_changed(
                "page_size",
                CapabilityRef::SUPPORTED_SIZES,
                CapValue::UInt16(page.size.raw()),
            );
            seq.set_if_changed(
                "orientation",
                CapabilityRef::ORIENTATION,
                CapValue::UInt16(page.orientation.raw()),
            );
        }
        None => {
            seq.skip("page_size", CapabilityRef::SUPPORTED_SIZES);
            seq.skip("orientation", CapabilityRef::ORIENTATION);
        }
    }

    match &config.area {
        Some(area) => {
            seq.set_if_changed("units", CapabilityRef::UNITS, CapValue::UInt16(area.units.raw()));
            let layout = ImageLayout {
                frame: Frame {
                    left: Fix32::from_f32(area.left),
                    top: Fix32::from_f32(area.top),
                    right: Fix32::from_f32(area.right),
                    bottom: Fix32::from_f32(area.bottom),
                },
                ..Default::default()
            };
            if let StepOutcome::Rejected(reason) = accessor.set_layout(&layout) {
                seq.report
                    .warnings
                    .push(NegotiationWarning::ScanAreaRejected(reason));
            }
        }
        None => seq.skip("units", CapabilityRef::UNITS),
    }

    match &config.resolution {
        Some(resolution) => {
            let pixel_type = resolution.colour.pixel_type()?;
            let bit_depth = resolution.colour.bit_depth()?;
            seq.set(
                "pixel_type",
                CapabilityRef::PIXEL_TYPE,
                CapValue::UInt16(pixel_type.raw()),
            );
            if resolution.colour == ColourSetting::Colour {
                seq.skip("bit_depth", CapabilityRef::BIT_DEPTH);
            } else {
                seq.set("bit_depth", CapabilityRef::BIT_DEPTH, CapValue::Int16(bit_depth));
            }
            let dpi = resolution.dpi.map(|dpi| CapValue::Fix32(Fix32::from(dpi)));
            seq.set_opt("x_resolution", CapabilityRef::X_RESOLUTION, dpi);
            seq.set_opt("y_resolution", CapabilityRef::Y_RESOLUTION, dpi);
        }
        None => {
            seq.skip("pixel_type", CapabilityRef::PIXEL_TYPE);
            seq.skip("bit_depth", CapabilityRef::BIT_DEPTH);
            seq.skip("x_resolution", CapabilityRef::X_RESOLUTION);
            seq.skip("y_resolution", CapabilityRef::Y_RESOLUTION);
        }
    }

    // Rotation is requested without a support probe, unlike duplex.
    let rotation = config.rotation.unwrap_or_default();
    seq.set_opt(
        "automatic_rotate",
        CapabilityRef::AUTOMATIC_ROTATE,
        rotation.automatic_rotate.then_some(CapValue::Bool(true)),
    );
    seq.set_opt(
        "automatic_border_detection",
        CapabilityRef::AUTOMATIC_BORDER_DETECTION,
        rotation
            .automatic_border_detection
            .then_some(CapValue::Bool(true)),
    );

    let mech = if config.is_buffered() {
        TWSX_MEMORY
    } else {
        TWSX_NATIVE
    };
    seq.set("xfer_mech", CapabilityRef::XFER_MECH, CapValue::UInt16(mech));

    match config.contrast {
        Some(contrast) => seq.set_if_changed(
            "contrast",
            CapabilityRef::CONTRAST,
            CapValue::Fix32(Fix32::from(contrast)),
        ),
        None => seq.skip("contrast", CapabilityRef::CONTRAST),
    }
    match config.brightness {
        Some(brightness) => seq.set_if_changed(
            "brightness",
            CapabilityRef::BRIGHTNESS,
            CapValue::Fix32(Fix32::from(brightness)),
        ),
        None => seq.skip("brightness", CapabilityRef::BRIGHTNESS),
    }

    Ok(seq.report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AreaSettings, PageSettings, ResolutionSettings, RotationSettings, TransferMode};
    use crate::dsm::MockDsm;
    use crate::events::tests::RecordingSink;
    use crate::protocol::{ApplicationIdentity, Msg, ReturnCode, SourceIdentity, Version};
    use crate::state::SourceState;

    fn setup() -> (MockDsm, ApplicationIdentity, SourceIdentity) {
        let mock = MockDsm::new();
        let source = mock.add_source("Feeder");
        let mut app = ApplicationIdentity::new("Test", "Test", "Test", Version::default());
        app.id = 1;
        (mock, app, source)
    }

    fn full_config() -> ScanConfiguration {
        ScanConfiguration {
            transfer_count: Some(-1),
            use_document_feeder: Some(true),
            use_auto_feeder: Some(true),
            use_auto_scan_cache: Some(false),
            use_duplex: Some(true),
            show_progress_indicator_ui: Some(false),
            transfer_mode: TransferMode::Buffered,
            resolution: Some(ResolutionSettings::photocopier()),
            page: Some(PageSettings::default()),
            area: Some(AreaSettings {
                right: 8.5,
                bottom: 11.0,
                ..Default::default()
            }),
            rotation: Some(RotationSettings {
                automatic_rotate: true,
                automatic_border_detection: true,
            }),
            contrast: Some(10),
            brightness: Some(120),
            ..Default::default()
        }
    }

    #[test]
    fn test_fixed_order_of_sets() {
        let (mock, app, source) = setup();
        mock.set_cap(CAP_DUPLEX, CapValue::UInt16(TWDX_1PASSDUPLEX));
        let acc = CapabilityAccessor::new(&mock, &app, &source, SourceState::Opened);

        negotiate(&acc, &full_config()).unwrap();

        assert_eq!(
            mock.cap_calls(Msg::Set),
            vec![
                CAP_INDICATORS,
                CAP_XFERCOUNT,
                CAP_FEEDERENABLED,
                CAP_AUTOFEED,
                CAP_AUTOSCAN,
                CAP_DUPLEXENABLED,
                ICAP_SUPPORTEDSIZES,
                ICAP_ORIENTATION,
                ICAP_UNITS,
                ICAP_PIXELTYPE,
                ICAP_BITDEPTH,
                ICAP_XRESOLUTION,
                ICAP_YRESOLUTION,
                ICAP_AUTOMATICROTATE,
                ICAP_AUTOMATICBORDERDETECTION,
                ICAP_XFERMECH,
                ICAP_CONTRAST,
                ICAP_BRIGHTNESS,
            ]
        );
        assert_eq!(mock.cap_value(ICAP_XFERMECH), Some(CapValue::UInt16(TWSX_MEMORY)));
    }

    #[test]
    fn test_every_set_rejected_is_not_fatal() {
        let (mock, app, source) = setup();
        mock.reject_all_sets();
        mock.set_layout_result(ReturnCode::Failure);
        let acc = CapabilityAccessor::new(&mock, &app, &source, SourceState::Opened);

        let report = negotiate(&acc, &full_config()).unwrap();
        assert!(report.steps.iter().all(|s| !s.outcome.is_applied()));
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_duplex_gated_on_support_probe() {
        let (mock, app, source) = setup();
        mock.set_cap(CAP_DUPLEX, CapValue::Int16(TWDX_NONE as i16));
        let acc = CapabilityAccessor::new(&mock, &app, &source, SourceState::Opened);

        let report = negotiate(&acc, &full_config()).unwrap();
        assert_eq!(report.outcome("duplex_enabled"), Some(StepOutcome::Skipped));
        assert!(!mock.cap_calls(Msg::Set).contains(&CAP_DUPLEXENABLED));
    }

    #[test]
    fn test_page_needs_feeder() {
        let (mock, app, source) = setup();
        let acc = CapabilityAccessor::new(&mock, &app, &source, SourceState::Opened);
        let config = ScanConfiguration {
            use_document_feeder: Some(false),
            ..full_config()
        };

        let report = negotiate(&acc, &config).unwrap();
        assert_eq!(report.outcome("page_size"), Some(StepOutcome::Skipped));
        assert_eq!(report.outcome("auto_feed"), Some(StepOutcome::Applied));
        assert_eq!(mock.cap_value(CAP_AUTOFEED), Some(CapValue::Bool(false)));
    }

    #[test]
    fn test_colour_skips_bit_depth() {
        let (mock, app, source) = setup();
        let acc = CapabilityAccessor::new(&mock, &app, &source, SourceState::Opened);
        let config = ScanConfiguration {
            resolution: Some(ResolutionSettings::colour_photocopier()),
            ..Default::default()
        };

        let report = negotiate(&acc, &config).unwrap();
        assert_eq!(report.outcome("bit_depth"), Some(StepOutcome::Skipped));
        assert_eq!(mock.cap_value(ICAP_PIXELTYPE), Some(CapValue::UInt16(TWPT_RGB)));
    }

    #[test]
    fn test_set_if_changed_skips_equal_value() {
        let (mock, app, source) = setup();
        mock.set_cap(ICAP_CONTRAST, CapValue::Fix32(Fix32::from(10)));
        let acc = CapabilityAccessor::new(&mock, &app, &source, SourceState::Opened);
        let config = ScanConfiguration {
            contrast: Some(10),
            ..Default::default()
        };

        negotiate(&acc, &config).unwrap();
        assert!(!mock.cap_calls(Msg::Set).contains(&ICAP_CONTRAST));
    }

    #[test]
    fn test_unknown_colour_is_fatal() {
        let (mock, app, source) = setup();
        let acc = CapabilityAccessor::new(&mock, &app, &source, SourceState::Opened);
        let config = ScanConfiguration {
            resolution: Some(ResolutionSettings {
                dpi: Some(300),
                colour: ColourSetting::Unrecognized("sepia".into()),
            }),
            ..Default::default()
        };
        assert!(negotiate(&acc, &config).is_err());
    }

    #[test]
    fn test_report_logs_area_warning() {
        let (mock, app, source) = setup();
        mock.set_layout_result(ReturnCode::Failure);
        let acc = CapabilityAccessor::new(&mock, &app, &source, SourceState::Opened);

        let report = negotiate(&acc, &full_config()).unwrap();
        let sink = RecordingSink::default();
        report.log_to(&sink);
        let warnings = sink.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("scan area rejected"));
    }
}
