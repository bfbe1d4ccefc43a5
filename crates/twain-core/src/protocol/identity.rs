//! Application and source identity descriptors (`TW_IDENTITY`).

use std::fmt;

use serde::{Deserialize, Serialize};

use super::constants::{DF_APP2, DG_CONTROL, DG_IMAGE, PROTOCOL_MAJOR, PROTOCOL_MINOR, TWCY_USA, TWLG_USA};

/// Version block embedded in every identity (`TW_VERSION`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub language: u16,
    pub country: u16,
    /// Free-form version string, at most 32 characters on the wire.
    pub info: String,
}

impl Default for Version {
    fn default() -> Self {
        Self {
            major: 1,
            minor: 0,
            language: TWLG_USA,
            country: TWCY_USA,
            info: String::new(),
        }
    }
}

/// Descriptor of the calling application.
///
/// Built once per process from [`crate::config::EngineConfig`]. The manager
/// assigns `id` when the connection opens; on teardown it is reset to `0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationIdentity {
    pub id: u32,
    pub version: Version,
    pub protocol_major: u16,
    pub protocol_minor: u16,
    pub supported_groups: u32,
    pub manufacturer: String,
    pub product_family: String,
    pub product_name: String,
}

impl ApplicationIdentity {
    pub fn new(
        manufacturer: impl Into<String>,
        product_family: impl Into<String>,
        product_name: impl Into<String>,
        version: Version,
    ) -> Self {
        Self {
            id: 0,
            version,
            protocol_major: PROTOCOL_MAJOR,
            protocol_minor: PROTOCOL_MINOR,
            supported_groups: DG_CONTROL | DG_IMAGE | DF_APP2,
            manufacturer: manufacturer.into(),
            product_family: product_family.into(),
            product_name: product_name.into(),
        }
    }

    /// Whether the manager has accepted this application.
    pub fn is_identified(&self) -> bool {
        self.id != 0
    }
}

/// Descriptor of one data source (scanner).
///
/// `id == 0` means "not selected / not open". Holders own independent
/// clones so nobody can change another's view of the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceIdentity {
    pub id: u32,
    pub version: Version,
    pub protocol_major: u16,
    pub protocol_minor: u16,
    pub supported_groups: u32,
    pub manufacturer: String,
    pub product_family: String,
    pub product_name: String,
}

impl SourceIdentity {
    /// Identity with only a product name, used to request a specific source.
    pub fn named(product_name: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            ..Default::default()
        }
    }

    pub fn is_selected(&self) -> bool {
        self.id != 0
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (id {})", self.product_name, self.id)
    }
}
