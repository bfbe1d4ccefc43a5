//! Engine and scan configuration.
//!
//! Both types are plain `serde` structures so hosts can keep them in TOML.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TwainError};
use crate::protocol::constants::*;
use crate::protocol::{ApplicationIdentity, PixelType, Version};

/// Process-wide application descriptor.
///
/// Built once by the host and handed to [`crate::manager::SessionManager`]
/// by reference; nothing in the engine keeps a global copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub manufacturer: String,
    pub product_family: String,
    pub product_name: String,
    pub version: Version,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            manufacturer: "twain-rs".into(),
            product_family: "Image Acquisition".into(),
            product_name: "twain-scan".into(),
            version: Version {
                info: env!("CARGO_PKG_VERSION").into(),
                ..Version::default()
            },
        }
    }
}

impl EngineConfig {
    pub fn identity(&self) -> ApplicationIdentity {
        ApplicationIdentity::new(
            self.manufacturer.clone(),
            self.product_family.clone(),
            self.product_name.clone(),
            self.version.clone(),
        )
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// Colour mode requested for the scan.
///
/// Unknown names survive deserialization as `Unrecognized` so that
/// [`ScanConfiguration::validate`] can report them as a configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColourSetting {
    BlackAndWhite,
    #[default]
    GreyScale,
    Colour,
    Unrecognized(String),
}

impl ColourSetting {
    fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "black_and_white" | "bw" => ColourSetting::BlackAndWhite,
            "grey_scale" | "greyscale" | "grey" | "gray" => ColourSetting::GreyScale,
            "colour" | "color" | "rgb" => ColourSetting::Colour,
            _ => ColourSetting::Unrecognized(name.to_string()),
        }
    }

    pub fn pixel_type(&self) -> Result<PixelType> {
        match self {
            ColourSetting::BlackAndWhite => Ok(PixelType::BlackAndWhite),
            ColourSetting::GreyScale => Ok(PixelType::Grey),
            ColourSetting::Colour => Ok(PixelType::Rgb),
            ColourSetting::Unrecognized(name) => Err(unknown_colour(name)),
        }
    }

    /// Bit depth requested alongside the pixel type.
    ///
    /// Colour maps to 16, matching what existing deployments negotiate.
    pub fn bit_depth(&self) -> Result<i16> {
        match self {
            ColourSetting::BlackAndWhite => Ok(1),
            ColourSetting::GreyScale => Ok(8),
            ColourSetting::Colour => Ok(16),
            ColourSetting::Unrecognized(name) => Err(unknown_colour(name)),
        }
    }
}

fn unknown_colour(name: &str) -> TwainError {
    TwainError::InvalidConfig(format!("unknown colour mode '{name}'"))
}

impl From<String> for ColourSetting {
    fn from(name: String) -> Self {
        ColourSetting::parse(&name)
    }
}

impl From<ColourSetting> for String {
    fn from(colour: ColourSetting) -> Self {
        colour.to_string()
    }
}

impl fmt::Display for ColourSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColourSetting::BlackAndWhite => write!(f, "black_and_white"),
            ColourSetting::GreyScale => write!(f, "grey_scale"),
            ColourSetting::Colour => write!(f, "colour"),
            ColourSetting::Unrecognized(name) => write!(f, "{name}"),
        }
    }
}

/// Resolution and colour request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolutionSettings {
    pub dpi: Option<i32>,
    #[serde(default)]
    pub colour: ColourSetting,
}

impl ResolutionSettings {
    /// 200 dpi black and white.
    pub fn fax() -> Self {
        Self {
            dpi: Some(200),
            colour: ColourSetting::BlackAndWhite,
        }
    }

    /// 300 dpi greyscale.
    pub fn photocopier() -> Self {
        Self {
            dpi: Some(300),
            colour: ColourSetting::GreyScale,
        }
    }

    /// 300 dpi colour.
    pub fn colour_photocopier() -> Self {
        Self {
            dpi: Some(300),
            colour: ColourSetting::Colour,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSize {
    None,
    A4,
    A5,
    JisB5,
    #[default]
    UsLetter,
    UsLegal,
    BusinessCard,
}

impl PageSize {
    pub const fn raw(self) -> u16 {
        match self {
            PageSize::None => TWSS_NONE,
            PageSize::A4 => TWSS_A4,
            PageSize::A5 => TWSS_A5,
            PageSize::JisB5 => TWSS_JISB5,
            PageSize::UsLetter => TWSS_USLETTER,
            PageSize::UsLegal => TWSS_USLEGAL,
            PageSize::BusinessCard => TWSS_BUSINESSCARD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
    Rotate90,
    Rotate180,
}

impl Orientation {
    pub const fn raw(self) -> u16 {
        match self {
            Orientation::Portrait => TWOR_PORTRAIT,
            Orientation::Landscape => TWOR_LANDSCAPE,
            Orientation::Rotate90 => TWOR_ROT90,
            Orientation::Rotate180 => TWOR_ROT180,
        }
    }
}

/// Page geometry, only negotiated when the feeder is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSettings {
    pub size: PageSize,
    pub orientation: Orientation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    #[default]
    Inches,
    Centimeters,
    Picas,
    Points,
    Twips,
    Pixels,
}

impl Units {
    pub const fn raw(self) -> u16 {
        match self {
            Units::Inches => TWUN_INCHES,
            Units::Centimeters => TWUN_CENTIMETERS,
            Units::Picas => TWUN_PICAS,
            Units::Points => TWUN_POINTS,
            Units::Twips => TWUN_TWIPS,
            Units::Pixels => TWUN_PIXELS,
        }
    }
}

/// Scan-area rectangle in `units`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AreaSettings {
    #[serde(default)]
    pub units: Units,
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationSettings {
    pub automatic_rotate: bool,
    pub automatic_border_detection: bool,
}

/// Which transfer pipeline handles the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// One whole image per retrieval call.
    #[default]
    Native,
    /// Chunked retrieval into an application buffer.
    Buffered,
}

/// Independently optional negotiation requests for one scan.
///
/// `None` leaves the device's current value untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfiguration {
    /// Images to acquire; `-1` means all the device has.
    pub transfer_count: Option<i16>,
    pub use_document_feeder: Option<bool>,
    pub use_auto_feeder: Option<bool>,
    pub use_auto_scan_cache: Option<bool>,
    pub use_duplex: Option<bool>,
    pub show_progress_indicator_ui: Option<bool>,
    /// Show the device's own dialog when enabling.
    pub show_twain_ui: bool,
    /// Fail with `FeederEmpty` instead of scanning when no paper is loaded.
    pub abort_when_no_paper_detectable: bool,
    pub transfer_mode: TransferMode,
    pub resolution: Option<ResolutionSettings>,
    pub page: Option<PageSettings>,
    pub area: Option<AreaSettings>,
    pub rotation: Option<RotationSettings>,
    pub contrast: Option<i32>,
    pub brightness: Option<i32>,
}

impl ScanConfiguration {
    /// Reject settings that can never be negotiated.
    pub fn validate(&self) -> Result<()> {
        if let Some(resolution) = &self.resolution {
            resolution.colour.pixel_type()?;
            if let Some(dpi) = resolution.dpi
                && dpi <= 0
            {
                return Err(TwainError::InvalidConfig(format!(
                    "resolution must be positive, got {dpi}"
                )));
            }
        }
        if let Some(area) = &self.area
            && (area.right <= area.left || area.bottom <= area.top)
        {
            return Err(TwainError::InvalidConfig(format!(
                "scan area is empty: ({}, {}) - ({}, {})",
                area.left, area.top, area.right, area.bottom
            )));
        }
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ScanConfiguration = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn is_buffered(&self) -> bool {
        self.transfer_mode == TransferMode::Buffered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            transfer_count = -1
            use_document_feeder = true
            use_duplex = true
            abort_when_no_paper_detectable = true
            transfer_mode = "buffered"
            contrast = 10

            [resolution]
            dpi = 300
            colour = "colour"

            [page]
            size = "a4"
            orientation = "landscape"

            [area]
            units = "centimeters"
            left = 0.0
            top = 0.0
            right = 21.0
            bottom = 29.7
        "#;
        let config = ScanConfiguration::from_toml_str(toml).unwrap();
        assert_eq!(config.transfer_count, Some(-1));
        assert!(config.is_buffered());
        assert_eq!(config.resolution, Some(ResolutionSettings::colour_photocopier()));
        assert_eq!(config.page.unwrap().size, PageSize::A4);
        assert_eq!(config.area.unwrap().units, Units::Centimeters);
        assert_eq!(config.brightness, None);
    }

    #[test]
    fn test_unknown_colour_is_invalid_config() {
        let toml = r#"
            [resolution]
            dpi = 300
            colour = "sepia"
        "#;
        let err = ScanConfiguration::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, TwainError::InvalidConfig(_)));
    }

    #[test]
    fn test_colour_mapping() {
        assert_eq!(ColourSetting::BlackAndWhite.bit_depth().unwrap(), 1);
        assert_eq!(ColourSetting::GreyScale.bit_depth().unwrap(), 8);
        assert_eq!(ColourSetting::Colour.bit_depth().unwrap(), 16);
        assert_eq!(ColourSetting::Colour.pixel_type().unwrap(), PixelType::Rgb);
        assert_eq!(ColourSetting::from("Gray".to_string()), ColourSetting::GreyScale);
    }

    #[test]
    fn test_presets() {
        assert_eq!(ResolutionSettings::fax().dpi, Some(200));
        assert_eq!(ResolutionSettings::fax().colour, ColourSetting::BlackAndWhite);
        assert_eq!(ResolutionSettings::photocopier().colour, ColourSetting::GreyScale);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("twain-scan-config-{}.toml", std::process::id()));
        let config = ScanConfiguration {
            use_document_feeder: Some(true),
            resolution: Some(ResolutionSettings::fax()),
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = ScanConfiguration::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_engine_identity() {
        let identity = EngineConfig::default().identity();
        assert_eq!(identity.id, 0);
        assert_eq!(identity.product_name, "twain-scan");
    }
}
