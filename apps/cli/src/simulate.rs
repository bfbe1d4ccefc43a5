//! Scripted scanner for running the tool without hardware.

use twain_core::config::{ColourSetting, ScanConfiguration};
use twain_core::dsm::{MockDsm, MockImage};
use twain_core::protocol::{CAP_FEEDERLOADED, CapValue, Msg, PixelType};

const PAGE_WIDTH: u32 = 850;
const PAGE_LENGTH: u32 = 1100;
const PAGES: u16 = 3;

/// Mock manager with a flatbed (default) and a loaded feeder.
pub fn device() -> MockDsm {
    let dsm = MockDsm::new();
    dsm.add_source("Simulated Flatbed");
    dsm.add_source("Simulated Feeder");
    dsm.set_cap(CAP_FEEDERLOADED, CapValue::Bool(true));
    dsm
}

/// Queue a batch of pages matching `config`'s colour mode.
pub fn load_pages(dsm: &MockDsm, config: &ScanConfiguration) {
    let pixel_type = match config.resolution.as_ref().map(|r| &r.colour) {
        Some(ColourSetting::BlackAndWhite) => PixelType::BlackAndWhite,
        Some(ColourSetting::Colour) => PixelType::Rgb,
        _ => PixelType::Grey,
    };
    for _ in 0..PAGES {
        dsm.queue_image(MockImage::pattern(PAGE_WIDTH, PAGE_LENGTH, pixel_type));
    }
    let pending: Vec<u16> = (0..PAGES).rev().collect();
    dsm.queue_pending_counts(&pending);
    dsm.queue_event(Msg::XferReady);
}
