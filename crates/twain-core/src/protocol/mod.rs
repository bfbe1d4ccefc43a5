//! Protocol module - TWAIN codes and shared structures.

pub mod codes;
pub mod constants;
pub mod identity;
pub mod types;

pub use codes::{ConditionCode, Msg, ReturnCode};
pub use constants::*;
pub use identity::{ApplicationIdentity, SourceIdentity, Version};
pub use types::{
    CapValue, CapabilityData, EventOutcome, Fix32, Frame, ImageInfo, ImageLayout, ItemType,
    MemXferChunk, PendingXfers, PixelType, RawEvent, SetupMemXfer, Status, UserInterface,
    WindowHandle,
};
