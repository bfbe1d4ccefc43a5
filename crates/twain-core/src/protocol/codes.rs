//! Typed return codes, condition codes and messages.
//!
//! Every call across the protocol boundary answers with a raw `u16`. These
//! wrappers keep unknown values intact so they can be reported verbatim.

use std::fmt;

use super::constants::*;

/// Result of a single protocol call (`TWRC_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    Success,
    Failure,
    CheckStatus,
    Cancel,
    DsEvent,
    NotDsEvent,
    XferDone,
    EndOfList,
    InfoNotSupported,
    DataNotAvailable,
    Other(u16),
}

impl ReturnCode {
    pub const fn from_raw(raw: u16) -> Self {
        match raw {
            TWRC_SUCCESS => Self::Success,
            TWRC_FAILURE => Self::Failure,
            TWRC_CHECKSTATUS => Self::CheckStatus,
            TWRC_CANCEL => Self::Cancel,
            TWRC_DSEVENT => Self::DsEvent,
            TWRC_NOTDSEVENT => Self::NotDsEvent,
            TWRC_XFERDONE => Self::XferDone,
            TWRC_ENDOFLIST => Self::EndOfList,
            TWRC_INFONOTSUPPORTED => Self::InfoNotSupported,
            TWRC_DATANOTAVAILABLE => Self::DataNotAvailable,
            other => Self::Other(other),
        }
    }

    pub const fn raw(self) -> u16 {
        match self {
            Self::Success => TWRC_SUCCESS,
            Self::Failure => TWRC_FAILURE,
            Self::CheckStatus => TWRC_CHECKSTATUS,
            Self::Cancel => TWRC_CANCEL,
            Self::DsEvent => TWRC_DSEVENT,
            Self::NotDsEvent => TWRC_NOTDSEVENT,
            Self::XferDone => TWRC_XFERDONE,
            Self::EndOfList => TWRC_ENDOFLIST,
            Self::InfoNotSupported => TWRC_INFONOTSUPPORTED,
            Self::DataNotAvailable => TWRC_DATANOTAVAILABLE,
            Self::Other(raw) => raw,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "TWRC_SUCCESS"),
            Self::Failure => write!(f, "TWRC_FAILURE"),
            Self::CheckStatus => write!(f, "TWRC_CHECKSTATUS"),
            Self::Cancel => write!(f, "TWRC_CANCEL"),
            Self::DsEvent => write!(f, "TWRC_DSEVENT"),
            Self::NotDsEvent => write!(f, "TWRC_NOTDSEVENT"),
            Self::XferDone => write!(f, "TWRC_XFERDONE"),
            Self::EndOfList => write!(f, "TWRC_ENDOFLIST"),
            Self::InfoNotSupported => write!(f, "TWRC_INFONOTSUPPORTED"),
            Self::DataNotAvailable => write!(f, "TWRC_DATANOTAVAILABLE"),
            Self::Other(raw) => write!(f, "TWRC_0x{raw:04X}"),
        }
    }
}

/// Detailed failure reason reported by `DAT_STATUS` (`TWCC_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConditionCode {
    #[default]
    Success,
    Bummer,
    LowMemory,
    NoDs,
    MaxConnections,
    OperationError,
    BadCap,
    BadProtocol,
    BadValue,
    SeqError,
    BadDest,
    CapUnsupported,
    CapBadOperation,
    CapSeqError,
    Denied,
    PaperJam,
    PaperDoubleFeed,
    CheckDeviceOnline,
    Other(u16),
}

impl ConditionCode {
    pub const fn from_raw(raw: u16) -> Self {
        match raw {
            TWCC_SUCCESS => Self::Success,
            TWCC_BUMMER => Self::Bummer,
            TWCC_LOWMEMORY => Self::LowMemory,
            TWCC_NODS => Self::NoDs,
            TWCC_MAXCONNECTIONS => Self::MaxConnections,
            TWCC_OPERATIONERROR => Self::OperationError,
            TWCC_BADCAP => Self::BadCap,
            TWCC_BADPROTOCOL => Self::BadProtocol,
            TWCC_BADVALUE => Self::BadValue,
            TWCC_SEQERROR => Self::SeqError,
            TWCC_BADDEST => Self::BadDest,
            TWCC_CAPUNSUPPORTED => Self::CapUnsupported,
            TWCC_CAPBADOPERATION => Self::CapBadOperation,
            TWCC_CAPSEQERROR => Self::CapSeqError,
            TWCC_DENIED => Self::Denied,
            TWCC_PAPERJAM => Self::PaperJam,
            TWCC_PAPERDOUBLEFEED => Self::PaperDoubleFeed,
            TWCC_CHECKDEVICEONLINE => Self::CheckDeviceOnline,
            other => Self::Other(other),
        }
    }

    pub const fn raw(self) -> u16 {
        match self {
            Self::Success => TWCC_SUCCESS,
            Self::Bummer => TWCC_BUMMER,
            Self::LowMemory => TWCC_LOWMEMORY,
            Self::NoDs => TWCC_NODS,
            Self::MaxConnections => TWCC_MAXCONNECTIONS,
            Self::OperationError => TWCC_OPERATIONERROR,
            Self::BadCap => TWCC_BADCAP,
            Self::BadProtocol => TWCC_BADPROTOCOL,
            Self::BadValue => TWCC_BADVALUE,
            Self::SeqError => TWCC_SEQERROR,
            Self::BadDest => TWCC_BADDEST,
            Self::CapUnsupported => TWCC_CAPUNSUPPORTED,
            Self::CapBadOperation => TWCC_CAPBADOPERATION,
            Self::CapSeqError => TWCC_CAPSEQERROR,
            Self::Denied => TWCC_DENIED,
            Self::PaperJam => TWCC_PAPERJAM,
            Self::PaperDoubleFeed => TWCC_PAPERDOUBLEFEED,
            Self::CheckDeviceOnline => TWCC_CHECKDEVICEONLINE,
            Self::Other(raw) => raw,
        }
    }

    /// The device does not know or does not implement the capability.
    pub fn is_unsupported(self) -> bool {
        matches!(self, Self::BadCap | Self::CapUnsupported)
    }
}

impl fmt::Display for ConditionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "TWCC_SUCCESS",
            Self::Bummer => "TWCC_BUMMER",
            Self::LowMemory => "TWCC_LOWMEMORY",
            Self::NoDs => "TWCC_NODS",
            Self::MaxConnections => "TWCC_MAXCONNECTIONS",
            Self::OperationError => "TWCC_OPERATIONERROR",
            Self::BadCap => "TWCC_BADCAP",
            Self::BadProtocol => "TWCC_BADPROTOCOL",
            Self::BadValue => "TWCC_BADVALUE",
            Self::SeqError => "TWCC_SEQERROR",
            Self::BadDest => "TWCC_BADDEST",
            Self::CapUnsupported => "TWCC_CAPUNSUPPORTED",
            Self::CapBadOperation => "TWCC_CAPBADOPERATION",
            Self::CapSeqError => "TWCC_CAPSEQERROR",
            Self::Denied => "TWCC_DENIED",
            Self::PaperJam => "TWCC_PAPERJAM",
            Self::PaperDoubleFeed => "TWCC_PAPERDOUBLEFEED",
            Self::CheckDeviceOnline => "TWCC_CHECKDEVICEONLINE",
            Self::Other(raw) => return write!(f, "TWCC_0x{raw:04X}"),
        };
        f.write_str(name)
    }
}

/// Operation selector (`MSG_*`) carried with every call, and the message a
/// source posts back through a forwarded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Msg {
    Null,
    Get,
    GetCurrent,
    GetDefault,
    GetFirst,
    GetNext,
    Set,
    Reset,
    XferReady,
    CloseDsReq,
    CloseDsOk,
    DeviceEvent,
    OpenDsm,
    CloseDsm,
    OpenDs,
    CloseDs,
    UserSelect,
    DisableDs,
    EnableDs,
    ProcessEvent,
    EndXfer,
    Other(u16),
}

impl Msg {
    pub const fn from_raw(raw: u16) -> Self {
        match raw {
            MSG_NULL => Self::Null,
            MSG_GET => Self::Get,
            MSG_GETCURRENT => Self::GetCurrent,
            MSG_GETDEFAULT => Self::GetDefault,
            MSG_GETFIRST => Self::GetFirst,
            MSG_GETNEXT => Self::GetNext,
            MSG_SET => Self::Set,
            MSG_RESET => Self::Reset,
            MSG_XFERREADY => Self::XferReady,
            MSG_CLOSEDSREQ => Self::CloseDsReq,
            MSG_CLOSEDSOK => Self::CloseDsOk,
            MSG_DEVICEEVENT => Self::DeviceEvent,
            MSG_OPENDSM => Self::OpenDsm,
            MSG_CLOSEDSM => Self::CloseDsm,
            MSG_OPENDS => Self::OpenDs,
            MSG_CLOSEDS => Self::CloseDs,
            MSG_USERSELECT => Self::UserSelect,
            MSG_DISABLEDS => Self::DisableDs,
            MSG_ENABLEDS => Self::EnableDs,
            MSG_PROCESSEVENT => Self::ProcessEvent,
            MSG_ENDXFER => Self::EndXfer,
            other => Self::Other(other),
        }
    }

    pub const fn raw(self) -> u16 {
        match self {
            Self::Null => MSG_NULL,
            Self::Get => MSG_GET,
            Self::GetCurrent => MSG_GETCURRENT,
            Self::GetDefault => MSG_GETDEFAULT,
            Self::GetFirst => MSG_GETFIRST,
            Self::GetNext => MSG_GETNEXT,
            Self::Set => MSG_SET,
            Self::Reset => MSG_RESET,
            Self::XferReady => MSG_XFERREADY,
            Self::CloseDsReq => MSG_CLOSEDSREQ,
            Self::CloseDsOk => MSG_CLOSEDSOK,
            Self::DeviceEvent => MSG_DEVICEEVENT,
            Self::OpenDsm => MSG_OPENDSM,
            Self::CloseDsm => MSG_CLOSEDSM,
            Self::OpenDs => MSG_OPENDS,
            Self::CloseDs => MSG_CLOSEDS,
            Self::UserSelect => MSG_USERSELECT,
            Self::DisableDs => MSG_DISABLEDS,
            Self::EnableDs => MSG_ENABLEDS,
            Self::ProcessEvent => MSG_PROCESSEVENT,
            Self::EndXfer => MSG_ENDXFER,
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(raw) => write!(f, "MSG_0x{raw:04X}"),
            other => write!(f, "MSG_{}", format!("{other:?}").to_ascii_uppercase()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_code_roundtrip_keeps_unknown() {
        assert_eq!(ReturnCode::from_raw(6), ReturnCode::XferDone);
        assert_eq!(ReturnCode::from_raw(0x42), ReturnCode::Other(0x42));
        assert_eq!(ReturnCode::Other(0x42).raw(), 0x42);
        assert_eq!(ReturnCode::EndOfList.to_string(), "TWRC_ENDOFLIST");
    }

    #[test]
    fn test_condition_code_unsupported() {
        assert!(ConditionCode::from_raw(TWCC_CAPUNSUPPORTED).is_unsupported());
        assert!(ConditionCode::BadCap.is_unsupported());
        assert!(!ConditionCode::BadValue.is_unsupported());
    }

    #[test]
    fn test_msg_display() {
        assert_eq!(Msg::XferReady.to_string(), "MSG_XFERREADY");
        assert_eq!(Msg::from_raw(MSG_CLOSEDSREQ), Msg::CloseDsReq);
        assert_eq!(Msg::Other(0x0999).to_string(), "MSG_0x0999");
    }
}
