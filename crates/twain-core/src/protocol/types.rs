//! Shared structures exchanged across the protocol boundary.

use std::fmt;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use super::codes::{ConditionCode, Msg};
use super::constants::*;

/// 16.16 fixed-point number (`TW_FIX32`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fix32 {
    pub whole: i16,
    pub frac: u16,
}

impl Fix32 {
    pub const fn new(whole: i16, frac: u16) -> Self {
        Self { whole, frac }
    }

    /// Encode with round-to-nearest, as the protocol's reference code does.
    pub fn from_f32(value: f32) -> Self {
        let scaled = (value * 65536.0 + if value < 0.0 { -0.5 } else { 0.5 }) as i32;
        Self {
            whole: (scaled >> 16) as i16,
            frac: (scaled & 0xFFFF) as u16,
        }
    }

    pub fn to_f32(self) -> f32 {
        self.whole as f32 + self.frac as f32 / 65536.0
    }

    /// Item word layout: `Whole` in the low half, `Frac` in the high half.
    pub fn to_bits(self) -> u32 {
        ((self.frac as u32) << 16) | (self.whole as u16 as u32)
    }

    pub fn from_bits(bits: u32) -> Self {
        Self {
            whole: (bits & 0xFFFF) as u16 as i16,
            frac: (bits >> 16) as u16,
        }
    }
}

impl From<f32> for Fix32 {
    fn from(value: f32) -> Self {
        Self::from_f32(value)
    }
}

impl From<i32> for Fix32 {
    fn from(value: i32) -> Self {
        Self::from_f32(value as f32)
    }
}

impl fmt::Display for Fix32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.to_f32())
    }
}

/// Rectangle in the current unit system (`TW_FRAME`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frame {
    pub left: Fix32,
    pub top: Fix32,
    pub right: Fix32,
    pub bottom: Fix32,
}

/// Item type of a capability value (`TWTY_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Int8,
    Int16,
    Int32,
    UInt8,
    UInt16,
    UInt32,
    Bool,
    Fix32,
}

impl ItemType {
    pub const fn raw(self) -> u16 {
        match self {
            Self::Int8 => TWTY_INT8,
            Self::Int16 => TWTY_INT16,
            Self::Int32 => TWTY_INT32,
            Self::UInt8 => TWTY_UINT8,
            Self::UInt16 => TWTY_UINT16,
            Self::UInt32 => TWTY_UINT32,
            Self::Bool => TWTY_BOOL,
            Self::Fix32 => TWTY_FIX32,
        }
    }

    pub const fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            TWTY_INT8 => Some(Self::Int8),
            TWTY_INT16 => Some(Self::Int16),
            TWTY_INT32 => Some(Self::Int32),
            TWTY_UINT8 => Some(Self::UInt8),
            TWTY_UINT16 => Some(Self::UInt16),
            TWTY_UINT32 => Some(Self::UInt32),
            TWTY_BOOL => Some(Self::Bool),
            TWTY_FIX32 => Some(Self::Fix32),
            _ => None,
        }
    }
}

/// A single capability value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CapValue {
    Bool(bool),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Fix32(Fix32),
}

impl CapValue {
    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Bool(_) => ItemType::Bool,
            Self::Int16(_) => ItemType::Int16,
            Self::UInt16(_) => ItemType::UInt16,
            Self::Int32(_) => ItemType::Int32,
            Self::UInt32(_) => ItemType::UInt32,
            Self::Fix32(_) => ItemType::Fix32,
        }
    }

    /// Pack into the little-endian item word of a one-value container.
    pub fn to_item_bytes(&self) -> [u8; 4] {
        let mut buf = Vec::with_capacity(4);
        // Writes into a Vec cannot fail.
        let _ = match *self {
            Self::Bool(v) => buf.write_u32::<LittleEndian>(v as u32),
            Self::Int16(v) => buf.write_u32::<LittleEndian>(v as u16 as u32),
            Self::UInt16(v) => buf.write_u32::<LittleEndian>(v as u32),
            Self::Int32(v) => buf.write_i32::<LittleEndian>(v),
            Self::UInt32(v) => buf.write_u32::<LittleEndian>(v),
            Self::Fix32(v) => buf.write_u32::<LittleEndian>(v.to_bits()),
        };
        let mut out = [0u8; 4];
        out.copy_from_slice(&buf[..4]);
        out
    }

    /// Unpack a little-endian item word according to `item_type`.
    pub fn from_item_bytes(item_type: ItemType, bytes: [u8; 4]) -> Option<Self> {
        let mut cursor = Cursor::new(&bytes[..]);
        let word = cursor.read_u32::<LittleEndian>().ok()?;
        Some(match item_type {
            ItemType::Bool => Self::Bool(word & 0xFFFF != 0),
            ItemType::Int8 => Self::Int16(word as u8 as i8 as i16),
            ItemType::UInt8 => Self::UInt16(word as u8 as u16),
            ItemType::Int16 => Self::Int16(word as u16 as i16),
            ItemType::UInt16 => Self::UInt16(word as u16),
            ItemType::Int32 => Self::Int32(word as i32),
            ItemType::UInt32 => Self::UInt32(word),
            ItemType::Fix32 => Self::Fix32(Fix32::from_bits(word)),
        })
    }

    /// Loose integer view used when comparing against enumerated values.
    pub fn as_i64(&self) -> i64 {
        match *self {
            Self::Bool(v) => v as i64,
            Self::Int16(v) => v as i64,
            Self::UInt16(v) => v as i64,
            Self::Int32(v) => v as i64,
            Self::UInt32(v) => v as i64,
            Self::Fix32(v) => v.to_f32().round() as i64,
        }
    }

    pub fn as_bool(&self) -> bool {
        self.as_i64() != 0
    }
}

impl fmt::Display for CapValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::Fix32(v) => write!(f, "{v}"),
        }
    }
}

/// Capability exchange block (`TW_CAPABILITY` with a one-value container).
///
/// For `MSG_SET` the caller fills `value`; for the get family the source does.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityData {
    pub cap: u16,
    pub item_type: ItemType,
    pub value: Option<CapValue>,
}

impl CapabilityData {
    pub fn query(cap: u16, item_type: ItemType) -> Self {
        Self {
            cap,
            item_type,
            value: None,
        }
    }

    pub fn with_value(cap: u16, value: CapValue) -> Self {
        Self {
            cap,
            item_type: value.item_type(),
            value: Some(value),
        }
    }
}

/// Pixel layout reported by the device (`TWPT_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelType {
    BlackAndWhite,
    #[default]
    Grey,
    Rgb,
    Other(u16),
}

impl PixelType {
    pub const fn raw(self) -> u16 {
        match self {
            Self::BlackAndWhite => TWPT_BW,
            Self::Grey => TWPT_GRAY,
            Self::Rgb => TWPT_RGB,
            Self::Other(raw) => raw,
        }
    }

    pub const fn from_raw(raw: u16) -> Self {
        match raw {
            TWPT_BW => Self::BlackAndWhite,
            TWPT_GRAY => Self::Grey,
            TWPT_RGB => Self::Rgb,
            other => Self::Other(other),
        }
    }
}

/// Image metadata (`TW_IMAGEINFO`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageInfo {
    pub x_resolution: Fix32,
    pub y_resolution: Fix32,
    pub image_width: i32,
    pub image_length: i32,
    pub samples_per_pixel: i16,
    pub bits_per_sample: [i16; 8],
    pub bits_per_pixel: i16,
    pub planar: bool,
    pub pixel_type: PixelType,
    pub compression: u16,
}

impl ImageInfo {
    /// Width times length, zero when the device leaves either unknown (-1).
    pub fn total_pixels(&self) -> u64 {
        if self.image_width <= 0 || self.image_length <= 0 {
            0
        } else {
            self.image_width as u64 * self.image_length as u64
        }
    }

    /// Expected uncompressed byte count, `width * length * bpp / 8`.
    pub fn expected_bytes(&self) -> u64 {
        self.total_pixels() * self.bits_per_pixel.max(0) as u64 / 8
    }
}

/// Scan-area geometry (`TW_IMAGELAYOUT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageLayout {
    pub frame: Frame,
    pub document_number: u32,
    pub page_number: u32,
    pub frame_number: u32,
}

/// Remaining-image counter (`TW_PENDINGXFERS`).
///
/// `count` is authoritative only right after the device fills it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingXfers {
    pub count: u16,
    pub end_of_job: u32,
}

/// Buffer size hints for memory transfers (`TW_SETUPMEMXFER`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetupMemXfer {
    pub min_buf_size: u32,
    pub max_buf_size: u32,
    pub preferred: u32,
}

/// Per-chunk description filled by the device (`TW_IMAGEMEMXFER` minus the
/// memory block, which is passed separately as a byte slice).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemXferChunk {
    pub compression: u16,
    pub bytes_per_row: u32,
    pub columns: u32,
    pub rows: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub bytes_written: u32,
}

/// Opaque host window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WindowHandle(pub usize);

impl WindowHandle {
    pub const NONE: WindowHandle = WindowHandle(0);
}

/// Enable/disable request (`TW_USERINTERFACE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserInterface {
    pub show_ui: bool,
    pub modal_ui: bool,
    pub parent: WindowHandle,
}

/// Result of `DAT_STATUS / MSG_GET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status {
    pub condition_code: ConditionCode,
    pub data: u16,
}

/// One platform event offered to the source while forwarding is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawEvent {
    pub window: WindowHandle,
    pub message: u32,
    pub wparam: usize,
    pub lparam: isize,
    pub time: u32,
    pub x: i16,
    pub y: i16,
}

impl RawEvent {
    /// Event with no platform payload, used by hosts without a window.
    pub fn idle() -> Self {
        Self::default()
    }
}

/// Answer to `DAT_EVENT / MSG_PROCESSEVENT`: whether the event belonged to
/// the source and, if so, the message it wants to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventOutcome {
    pub code: super::codes::ReturnCode,
    pub message: Msg,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix32_rounds_to_nearest() {
        let half = Fix32::from_f32(0.5);
        assert_eq!(half, Fix32::new(0, 0x8000));
        assert_eq!(Fix32::from(300), Fix32::new(300, 0));
        assert!((Fix32::from_f32(-1.25).to_f32() + 1.25).abs() < 1e-4);
    }

    #[test]
    fn test_fix32_item_word_layout() {
        let v = Fix32::new(200, 0x4000);
        assert_eq!(v.to_bits(), 0x4000_00C8);
        assert_eq!(Fix32::from_bits(v.to_bits()), v);
    }

    #[test]
    fn test_cap_value_item_bytes() {
        assert_eq!(CapValue::Bool(true).to_item_bytes(), [1, 0, 0, 0]);
        assert_eq!(CapValue::Int16(-1).to_item_bytes(), [0xFF, 0xFF, 0, 0]);
        assert_eq!(
            CapValue::from_item_bytes(ItemType::Int16, [0xFF, 0xFF, 0, 0]),
            Some(CapValue::Int16(-1))
        );
        let fix = CapValue::Fix32(Fix32::new(120, 0));
        assert_eq!(
            CapValue::from_item_bytes(ItemType::Fix32, fix.to_item_bytes()),
            Some(fix)
        );
    }

    #[test]
    fn test_image_info_expected_bytes() {
        let info = ImageInfo {
            image_width: 37,
            image_length: 10,
            bits_per_pixel: 24,
            ..Default::default()
        };
        assert_eq!(info.total_pixels(), 370);
        assert_eq!(info.expected_bytes(), 1110);

        let unknown = ImageInfo {
            image_length: -1,
            ..info
        };
        assert_eq!(unknown.total_pixels(), 0);
    }
}
