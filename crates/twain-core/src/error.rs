//! Error type shared by the engine.

use thiserror::Error;

use crate::protocol::{ConditionCode, ReturnCode};
use crate::state::SourceState;

pub type Result<T> = std::result::Result<T, TwainError>;

#[derive(Error, Debug)]
pub enum TwainError {
    /// Abort-if-empty was requested and the feeder reported no paper.
    #[error("Feeder is empty")]
    FeederEmpty,

    #[error("Failed to open data source: {code} ({condition})")]
    DeviceOpenFailed {
        code: ReturnCode,
        condition: ConditionCode,
    },

    #[error("Failed to enable data source: {code}")]
    EnableFailed { code: ReturnCode },

    #[error("Source enumeration failed: {code}")]
    EnumerationFailed { code: ReturnCode },

    /// Any other control or transfer call that returned an unexpected code.
    #[error("{operation} failed: {code} ({condition})")]
    Protocol {
        operation: &'static str,
        code: ReturnCode,
        condition: ConditionCode,
    },

    #[error("Invalid scan configuration: {0}")]
    InvalidConfig(String),

    #[error("A scan is already in progress")]
    ScanInProgress,

    #[error("No data source selected")]
    NoSourceSelected,

    #[error("Data source is {actual}, expected {expected}")]
    InvalidState {
        expected: SourceState,
        actual: SourceState,
    },

    #[error("Transfer completed but the source returned no image")]
    MissingImage,

    #[error("Malformed transfer chunk: need {expected} bytes, buffer holds {actual}")]
    MalformedChunk { expected: usize, actual: usize },

    #[error("Raster conversion failed: {0}")]
    Raster(String),

    #[error("Source manager library error: {0}")]
    Library(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}
