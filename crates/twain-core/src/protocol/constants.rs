//! Protocol constants from the TWAIN 2.x `twain.h` header.
//!
//! Only the subset the engine speaks is listed.

// ============================================================================
// Protocol Version
// ============================================================================

pub const PROTOCOL_MAJOR: u16 = 2;
pub const PROTOCOL_MINOR: u16 = 4;

/// Language / country used in the application identity.
pub const TWLG_USA: u16 = 13;
pub const TWCY_USA: u16 = 1;

// ============================================================================
// Data Groups
// ============================================================================

pub const DG_CONTROL: u32 = 0x0001;
pub const DG_IMAGE: u32 = 0x0002;

/// Application supports the 2.x memory-management scheme.
pub const DF_APP2: u32 = 0x2000_0000;
/// Set by the manager when it speaks 2.x.
pub const DF_DSM2: u32 = 0x1000_0000;
/// Set by a source that speaks 2.x.
pub const DF_DS2: u32 = 0x4000_0000;

// ============================================================================
// Data Argument Types
// ============================================================================

pub const DAT_CAPABILITY: u16 = 0x0001;
pub const DAT_EVENT: u16 = 0x0002;
pub const DAT_IDENTITY: u16 = 0x0003;
pub const DAT_PARENT: u16 = 0x0004;
pub const DAT_PENDINGXFERS: u16 = 0x0005;
pub const DAT_SETUPMEMXFER: u16 = 0x0006;
pub const DAT_STATUS: u16 = 0x0008;
pub const DAT_USERINTERFACE: u16 = 0x0009;
pub const DAT_IMAGEINFO: u16 = 0x0101;
pub const DAT_IMAGELAYOUT: u16 = 0x0102;
pub const DAT_IMAGEMEMXFER: u16 = 0x0103;
pub const DAT_IMAGENATIVEXFER: u16 = 0x0104;

// ============================================================================
// Messages
// ============================================================================

pub const MSG_NULL: u16 = 0x0000;
pub const MSG_GET: u16 = 0x0001;
pub const MSG_GETCURRENT: u16 = 0x0002;
pub const MSG_GETDEFAULT: u16 = 0x0003;
pub const MSG_GETFIRST: u16 = 0x0004;
pub const MSG_GETNEXT: u16 = 0x0005;
pub const MSG_SET: u16 = 0x0006;
pub const MSG_RESET: u16 = 0x0007;

/// Source is ready to transfer (state 5 -> 6).
pub const MSG_XFERREADY: u16 = 0x0101;
pub const MSG_CLOSEDSREQ: u16 = 0x0102;
pub const MSG_CLOSEDSOK: u16 = 0x0103;
pub const MSG_DEVICEEVENT: u16 = 0x0104;

pub const MSG_OPENDSM: u16 = 0x0301;
pub const MSG_CLOSEDSM: u16 = 0x0302;

pub const MSG_OPENDS: u16 = 0x0401;
pub const MSG_CLOSEDS: u16 = 0x0402;
pub const MSG_USERSELECT: u16 = 0x0403;

pub const MSG_DISABLEDS: u16 = 0x0501;
pub const MSG_ENABLEDS: u16 = 0x0502;

pub const MSG_PROCESSEVENT: u16 = 0x0601;

pub const MSG_ENDXFER: u16 = 0x0701;

// ============================================================================
// Return Codes
// ============================================================================

pub const TWRC_SUCCESS: u16 = 0;
pub const TWRC_FAILURE: u16 = 1;
pub const TWRC_CHECKSTATUS: u16 = 2;
pub const TWRC_CANCEL: u16 = 3;
pub const TWRC_DSEVENT: u16 = 4;
pub const TWRC_NOTDSEVENT: u16 = 5;
pub const TWRC_XFERDONE: u16 = 6;
pub const TWRC_ENDOFLIST: u16 = 7;
pub const TWRC_INFONOTSUPPORTED: u16 = 8;
pub const TWRC_DATANOTAVAILABLE: u16 = 9;

// ============================================================================
// Condition Codes
// ============================================================================

pub const TWCC_SUCCESS: u16 = 0;
pub const TWCC_BUMMER: u16 = 1;
pub const TWCC_LOWMEMORY: u16 = 2;
pub const TWCC_NODS: u16 = 3;
pub const TWCC_MAXCONNECTIONS: u16 = 4;
pub const TWCC_OPERATIONERROR: u16 = 5;
pub const TWCC_BADCAP: u16 = 6;
pub const TWCC_BADPROTOCOL: u16 = 9;
pub const TWCC_BADVALUE: u16 = 10;
pub const TWCC_SEQERROR: u16 = 11;
pub const TWCC_BADDEST: u16 = 12;
pub const TWCC_CAPUNSUPPORTED: u16 = 13;
pub const TWCC_CAPBADOPERATION: u16 = 14;
pub const TWCC_CAPSEQERROR: u16 = 15;
pub const TWCC_DENIED: u16 = 16;
pub const TWCC_PAPERJAM: u16 = 20;
pub const TWCC_PAPERDOUBLEFEED: u16 = 21;
pub const TWCC_CHECKDEVICEONLINE: u16 = 23;

// ============================================================================
// Containers and Item Types
// ============================================================================

pub const TWON_ARRAY: u16 = 3;
pub const TWON_ENUMERATION: u16 = 4;
pub const TWON_ONEVALUE: u16 = 5;
pub const TWON_RANGE: u16 = 6;
pub const TWON_DONTCARE16: u16 = 0xFFFF;

pub const TWTY_INT8: u16 = 0x0000;
pub const TWTY_INT16: u16 = 0x0001;
pub const TWTY_INT32: u16 = 0x0002;
pub const TWTY_UINT8: u16 = 0x0003;
pub const TWTY_UINT16: u16 = 0x0004;
pub const TWTY_UINT32: u16 = 0x0005;
pub const TWTY_BOOL: u16 = 0x0006;
pub const TWTY_FIX32: u16 = 0x0007;

// ============================================================================
// Capability Codes
// ============================================================================

pub const CAP_XFERCOUNT: u16 = 0x0001;
pub const ICAP_PIXELTYPE: u16 = 0x0101;
pub const ICAP_UNITS: u16 = 0x0102;
pub const ICAP_XFERMECH: u16 = 0x0103;
pub const CAP_FEEDERENABLED: u16 = 0x1002;
pub const CAP_FEEDERLOADED: u16 = 0x1003;
pub const CAP_AUTOFEED: u16 = 0x1007;
pub const CAP_INDICATORS: u16 = 0x100B;
pub const CAP_AUTOSCAN: u16 = 0x1010;
pub const CAP_DUPLEX: u16 = 0x1012;
pub const CAP_DUPLEXENABLED: u16 = 0x1013;
pub const ICAP_BRIGHTNESS: u16 = 0x1101;
pub const ICAP_CONTRAST: u16 = 0x1103;
pub const ICAP_ORIENTATION: u16 = 0x1110;
pub const ICAP_XRESOLUTION: u16 = 0x1118;
pub const ICAP_YRESOLUTION: u16 = 0x1119;
pub const ICAP_SUPPORTEDSIZES: u16 = 0x1122;
pub const ICAP_BITDEPTH: u16 = 0x112B;
pub const ICAP_AUTOMATICBORDERDETECTION: u16 = 0x1150;
pub const ICAP_AUTOMATICROTATE: u16 = 0x1152;

/// Vendor capability that runs (set) or reports the need for (get) a
/// calibration pass on Avision A8 scanners.
pub const CAP_VENDOR_CALIBRATE: u16 = 0x9259;

// ============================================================================
// Capability Values
// ============================================================================

/// ICAP_PIXELTYPE
pub const TWPT_BW: u16 = 0;
pub const TWPT_GRAY: u16 = 1;
pub const TWPT_RGB: u16 = 2;

/// ICAP_XFERMECH
pub const TWSX_NATIVE: u16 = 0;
pub const TWSX_FILE: u16 = 1;
pub const TWSX_MEMORY: u16 = 2;

/// ICAP_UNITS
pub const TWUN_INCHES: u16 = 0;
pub const TWUN_CENTIMETERS: u16 = 1;
pub const TWUN_PICAS: u16 = 2;
pub const TWUN_POINTS: u16 = 3;
pub const TWUN_TWIPS: u16 = 4;
pub const TWUN_PIXELS: u16 = 5;

/// ICAP_ORIENTATION
pub const TWOR_ROT0: u16 = 0;
pub const TWOR_ROT90: u16 = 1;
pub const TWOR_ROT180: u16 = 2;
pub const TWOR_ROT270: u16 = 3;
pub const TWOR_PORTRAIT: u16 = TWOR_ROT0;
pub const TWOR_LANDSCAPE: u16 = TWOR_ROT270;

/// ICAP_SUPPORTEDSIZES
pub const TWSS_NONE: u16 = 0;
pub const TWSS_A4: u16 = 1;
pub const TWSS_JISB5: u16 = 2;
pub const TWSS_USLETTER: u16 = 3;
pub const TWSS_USLEGAL: u16 = 4;
pub const TWSS_A5: u16 = 5;
pub const TWSS_BUSINESSCARD: u16 = 53;

/// CAP_DUPLEX
pub const TWDX_NONE: u16 = 0;
pub const TWDX_1PASSDUPLEX: u16 = 1;
pub const TWDX_2PASSDUPLEX: u16 = 2;

/// ICAP_COMPRESSION
pub const TWCP_NONE: u16 = 0;

// ============================================================================
// Memory Flags (TW_MEMORY)
// ============================================================================

pub const TWMF_APPOWNS: u32 = 0x0001;
pub const TWMF_DSMOWNS: u32 = 0x0002;
pub const TWMF_DSOWNS: u32 = 0x0004;
pub const TWMF_POINTER: u32 = 0x0008;
pub const TWMF_HANDLE: u32 = 0x0010;

/// Sentinel used by the source for "unknown" in `TW_IMAGEMEMXFER` fields.
pub const TWON_DONTCARE32: u32 = 0xFFFF_FFFF;
