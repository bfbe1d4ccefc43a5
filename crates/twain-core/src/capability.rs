//! Typed get/set primitives against a single device capability.

use std::fmt;

use tracing::{debug, trace};

use crate::dsm::DsmTransport;
use crate::protocol::constants::*;
use crate::protocol::{
    ApplicationIdentity, CapValue, CapabilityData, ConditionCode, ImageLayout, ItemType, Msg,
    ReturnCode, SourceIdentity,
};
use crate::state::SourceState;

/// Which operations a capability allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// Stateless descriptor of one device parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityRef {
    pub code: u16,
    pub item_type: ItemType,
    pub access: Access,
}

impl CapabilityRef {
    pub const fn new(code: u16, item_type: ItemType, access: Access) -> Self {
        Self {
            code,
            item_type,
            access,
        }
    }

    pub const XFER_COUNT: Self = Self::new(CAP_XFERCOUNT, ItemType::Int16, Access::ReadWrite);
    pub const INDICATORS: Self = Self::new(CAP_INDICATORS, ItemType::Bool, Access::ReadWrite);
    pub const FEEDER_ENABLED: Self =
        Self::new(CAP_FEEDERENABLED, ItemType::Bool, Access::ReadWrite);
    pub const FEEDER_LOADED: Self = Self::new(CAP_FEEDERLOADED, ItemType::Bool, Access::ReadOnly);
    pub const AUTO_FEED: Self = Self::new(CAP_AUTOFEED, ItemType::Bool, Access::ReadWrite);
    pub const AUTO_SCAN: Self = Self::new(CAP_AUTOSCAN, ItemType::Bool, Access::ReadWrite);
    pub const DUPLEX: Self = Self::new(CAP_DUPLEX, ItemType::Int16, Access::ReadOnly);
    pub const DUPLEX_ENABLED: Self =
        Self::new(CAP_DUPLEXENABLED, ItemType::Bool, Access::ReadWrite);
    pub const SUPPORTED_SIZES: Self =
        Self::new(ICAP_SUPPORTEDSIZES, ItemType::UInt16, Access::ReadWrite);
    pub const ORIENTATION: Self = Self::new(ICAP_ORIENTATION, ItemType::UInt16, Access::ReadWrite);
    pub const UNITS: Self = Self::new(ICAP_UNITS, ItemType::UInt16, Access::ReadWrite);
    pub const PIXEL_TYPE: Self = Self::new(ICAP_PIXELTYPE, ItemType::UInt16, Access::ReadWrite);
    pub const BIT_DEPTH: Self = Self::new(ICAP_BITDEPTH, ItemType::Int16, Access::ReadWrite);
    pub const X_RESOLUTION: Self = Self::new(ICAP_XRESOLUTION, ItemType::Fix32, Access::ReadWrite);
    pub const Y_RESOLUTION: Self = Self::new(ICAP_YRESOLUTION, ItemType::Fix32, Access::ReadWrite);
    pub const AUTOMATIC_ROTATE: Self =
        Self::new(ICAP_AUTOMATICROTATE, ItemType::Bool, Access::ReadWrite);
    pub const AUTOMATIC_BORDER_DETECTION: Self =
        Self::new(ICAP_AUTOMATICBORDERDETECTION, ItemType::Bool, Access::ReadWrite);
    pub const XFER_MECH: Self = Self::new(ICAP_XFERMECH, ItemType::UInt16, Access::ReadWrite);
    pub const CONTRAST: Self = Self::new(ICAP_CONTRAST, ItemType::Fix32, Access::ReadWrite);
    pub const BRIGHTNESS: Self = Self::new(ICAP_BRIGHTNESS, ItemType::Fix32, Access::ReadWrite);
    pub const CALIBRATE: Self = Self::new(CAP_VENDOR_CALIBRATE, ItemType::Bool, Access::ReadWrite);
    /// Same vendor code, read back as a count; non-zero means calibration is due.
    pub const CALIBRATION_NEEDED: Self =
        Self::new(CAP_VENDOR_CALIBRATE, ItemType::Int32, Access::ReadOnly);
}

impl fmt::Display for CapabilityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.code)
    }
}

/// Why the device (or the engine) refused a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The source answered with a failure and this condition code.
    Condition(ConditionCode),
    /// The source answered with an unexpected return code.
    Code(ReturnCode),
    /// The session is not in a negotiable state; nothing was sent.
    OutOfSequence,
    /// The capability is read-only.
    ReadOnly,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Condition(cc) => write!(f, "{cc}"),
            RejectReason::Code(rc) => write!(f, "{rc}"),
            RejectReason::OutOfSequence => write!(f, "out of sequence"),
            RejectReason::ReadOnly => write!(f, "read-only"),
        }
    }
}

/// Typed result of one negotiation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    Rejected(RejectReason),
    Unsupported,
    /// Not attempted: the request was absent or a support probe failed.
    Skipped,
}

impl StepOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, StepOutcome::Applied)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Applied => write!(f, "applied"),
            StepOutcome::Rejected(reason) => write!(f, "rejected ({reason})"),
            StepOutcome::Unsupported => write!(f, "unsupported"),
            StepOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

/// Single round-trip capability calls against the active session.
///
/// Holds no state of its own beyond the borrowed session context. There are
/// no retries: a rejection is final for this negotiation attempt.
pub struct CapabilityAccessor<'a, T: DsmTransport> {
    dsm: &'a T,
    app: &'a ApplicationIdentity,
    source: &'a SourceIdentity,
    state: SourceState,
}

impl<'a, T: DsmTransport> CapabilityAccessor<'a, T> {
    pub fn new(
        dsm: &'a T,
        app: &'a ApplicationIdentity,
        source: &'a SourceIdentity,
        state: SourceState,
    ) -> Self {
        Self {
            dsm,
            app,
            source,
            state,
        }
    }

    /// Set a one-value capability.
    ///
    /// `CheckStatus` (the device substituted a nearby value) counts as applied.
    pub fn set(&self, cap: CapabilityRef, value: CapValue) -> StepOutcome {
        if !self.state.is_negotiable() || !self.source.is_selected() {
            debug!(cap = %cap, state = %self.state, "Capability set out of sequence");
            return StepOutcome::Rejected(RejectReason::OutOfSequence);
        }
        if cap.access == Access::ReadOnly {
            return StepOutcome::Rejected(RejectReason::ReadOnly);
        }

        let mut data = CapabilityData {
            cap: cap.code,
            item_type: cap.item_type,
            value: Some(value),
        };
        let rc = self
            .dsm
            .capability(self.app, self.source, Msg::Set, &mut data);
        trace!(cap = %cap, value = %value, rc = %rc, "MSG_SET");

        match rc {
            ReturnCode::Success | ReturnCode::CheckStatus => StepOutcome::Applied,
            ReturnCode::Failure => {
                let condition = self.condition();
                if condition.is_unsupported() {
                    StepOutcome::Unsupported
                } else {
                    StepOutcome::Rejected(RejectReason::Condition(condition))
                }
            }
            other => StepOutcome::Rejected(RejectReason::Code(other)),
        }
    }

    /// Current value, or `None` when the device cannot report it.
    pub fn get(&self, cap: CapabilityRef) -> Option<CapValue> {
        if !self.source.is_selected() {
            return None;
        }
        let mut data = CapabilityData::query(cap.code, cap.item_type);
        let rc = self
            .dsm
            .capability(self.app, self.source, Msg::GetCurrent, &mut data);
        trace!(cap = %cap, rc = %rc, "MSG_GETCURRENT");

        if rc.is_success() {
            data.value
        } else {
            if rc == ReturnCode::Failure {
                let condition = self.condition();
                trace!(cap = %cap, condition = %condition, "Capability query failed");
            }
            None
        }
    }

    /// Set the scan-area geometry (`DAT_IMAGELAYOUT / MSG_SET`).
    pub fn set_layout(&self, layout: &ImageLayout) -> StepOutcome {
        if !self.state.is_negotiable() || !self.source.is_selected() {
            return StepOutcome::Rejected(RejectReason::OutOfSequence);
        }
        let mut layout = *layout;
        let rc = self
            .dsm
            .image_layout(self.app, self.source, Msg::Set, &mut layout);
        trace!(frame = ?layout.frame, rc = %rc, "DAT_IMAGELAYOUT MSG_SET");

        match rc {
            ReturnCode::Success | ReturnCode::CheckStatus => StepOutcome::Applied,
            ReturnCode::Failure => StepOutcome::Rejected(RejectReason::Condition(self.condition())),
            other => StepOutcome::Rejected(RejectReason::Code(other)),
        }
    }

    /// Boolean view of [`get`](Self::get); `false` on any failure.
    pub fn get_bool(&self, cap: CapabilityRef) -> bool {
        self.get(cap).map(|v| v.as_bool()).unwrap_or(false)
    }

    fn condition(&self) -> ConditionCode {
        self.dsm
            .status(self.app, Some(self.source))
            .condition_code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsm::MockDsm;
    use crate::protocol::{Fix32, Version};

    fn setup() -> (MockDsm, ApplicationIdentity, SourceIdentity) {
        let mock = MockDsm::new();
        let source = mock.add_source("Flatbed");
        let mut app = ApplicationIdentity::new("Test", "Test", "Test", Version::default());
        app.id = 1;
        (mock, app, source)
    }

    #[test]
    fn test_set_applied_and_read_back() {
        let (mock, app, source) = setup();
        let acc = CapabilityAccessor::new(&mock, &app, &source, SourceState::Opened);

        let dpi = CapValue::Fix32(Fix32::from(300));
        assert_eq!(acc.set(CapabilityRef::X_RESOLUTION, dpi), StepOutcome::Applied);
        assert_eq!(acc.get(CapabilityRef::X_RESOLUTION), Some(dpi));
    }

    #[test]
    fn test_set_rejected_carries_condition() {
        let (mock, app, source) = setup();
        mock.reject_cap(ICAP_BITDEPTH);
        let acc = CapabilityAccessor::new(&mock, &app, &source, SourceState::Opened);

        let outcome = acc.set(CapabilityRef::BIT_DEPTH, CapValue::Int16(8));
        assert_eq!(
            outcome,
            StepOutcome::Rejected(RejectReason::Condition(ConditionCode::BadValue))
        );
    }

    #[test]
    fn test_set_unsupported() {
        let (mock, app, source) = setup();
        mock.unsupport_cap(CAP_DUPLEXENABLED);
        let acc = CapabilityAccessor::new(&mock, &app, &source, SourceState::Opened);

        let outcome = acc.set(CapabilityRef::DUPLEX_ENABLED, CapValue::Bool(true));
        assert_eq!(outcome, StepOutcome::Unsupported);
    }

    #[test]
    fn test_set_out_of_sequence_sends_nothing() {
        let (mock, app, source) = setup();
        let acc = CapabilityAccessor::new(&mock, &app, &source, SourceState::Enabled);

        let outcome = acc.set(CapabilityRef::INDICATORS, CapValue::Bool(false));
        assert_eq!(outcome, StepOutcome::Rejected(RejectReason::OutOfSequence));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_get_bool_defaults_to_false() {
        let (mock, app, source) = setup();
        let acc = CapabilityAccessor::new(&mock, &app, &source, SourceState::Opened);
        assert!(!acc.get_bool(CapabilityRef::FEEDER_LOADED));

        mock.set_cap(CAP_FEEDERLOADED, CapValue::Bool(true));
        assert!(acc.get_bool(CapabilityRef::FEEDER_LOADED));
    }
}
