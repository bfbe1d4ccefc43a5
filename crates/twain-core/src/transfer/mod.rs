//! Transfer engine: whole-image and incremental-buffered pipelines.
//!
//! Both pipelines run only after the source posts transfer-ready, deliver a
//! [`TransferEvent`] per image (or per chunk), and reset the pending-transfer
//! state exactly once on every exit path.

pub mod buffered;
pub mod native;
pub mod stride;

use std::ops::Range;

use tracing::{debug, warn};

use crate::dsm::DsmTransport;
use crate::error::{Result, TwainError};
use crate::events::DiagnosticSink;
use crate::protocol::{
    ApplicationIdentity, ConditionCode, ImageInfo, Msg, PendingXfers, ReturnCode, SetupMemXfer,
    SourceIdentity,
};
use crate::raster::{Raster, RasterConverter};

/// Caller's answer to a transfer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Continuation {
    #[default]
    Continue,
    /// Stop after this event; no further images are requested.
    Stop,
}

/// One image (native) or one chunk (buffered) ready for the caller.
#[derive(Debug)]
pub struct TransferEvent<'a> {
    /// Whole image, or the image assembled so far for buffered chunks.
    pub raster: &'a Raster,
    pub info: &'a ImageInfo,
    /// Rows of `raster` filled by this event.
    pub rows: Range<u32>,
    pub is_final_for_image: bool,
    /// Share of the current image received, in `[0, 1]`.
    pub completion: f32,
    /// Images the device still holds after this one, as last reported.
    pub pending: u16,
}

/// Caller-supplied receiver for one scan.
///
/// Passed to [`crate::manager::SessionManager::start_scan`] and dropped once
/// `on_complete` has run.
pub trait ScanObserver {
    fn on_transfer(&mut self, event: &TransferEvent<'_>) -> Continuation;

    /// Called exactly once per scan, with the error that ended it, if any.
    fn on_complete(&mut self, error: Option<&TwainError>);
}

/// How a pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferSummary {
    pub images: usize,
    pub stopped: bool,
}

/// Borrowed resources for one pipeline run.
pub struct TransferContext<'a, T: DsmTransport> {
    pub dsm: &'a T,
    pub app: &'a ApplicationIdentity,
    pub source: &'a SourceIdentity,
    pub observer: &'a mut dyn ScanObserver,
    pub converter: &'a dyn RasterConverter,
    pub sink: &'a dyn DiagnosticSink,
}

impl<T: DsmTransport> TransferContext<'_, T> {
    /// Build a protocol error, fetching the condition code for failures.
    pub(crate) fn protocol_error(&self, operation: &'static str, code: ReturnCode) -> TwainError {
        let condition = if code == ReturnCode::Failure {
            self.dsm.status(self.app, Some(self.source)).condition_code
        } else {
            ConditionCode::Success
        };
        warn!(operation, code = %code, condition = %condition, "Transfer call failed");
        TwainError::Protocol {
            operation,
            code,
            condition,
        }
    }

    pub(crate) fn image_info(&self) -> Result<ImageInfo> {
        let mut info = ImageInfo::default();
        let rc = self.dsm.image_info(self.app, self.source, &mut info);
        if !rc.is_success() {
            return Err(self.protocol_error("image info", rc));
        }
        debug!(
            width = info.image_width,
            length = info.image_length,
            bpp = info.bits_per_pixel,
            pixel_type = ?info.pixel_type,
            "Image info"
        );
        Ok(info)
    }

    /// Tell the device this image is finished; returns the refreshed count.
    pub(crate) fn end_transfer(&self) -> Result<PendingXfers> {
        let mut pending = PendingXfers::default();
        let rc = self
            .dsm
            .pending_xfers(self.app, self.source, Msg::EndXfer, &mut pending);
        if !rc.is_success() {
            return Err(self.protocol_error("end transfer", rc));
        }
        debug!(pending = pending.count, "End of transfer");
        Ok(pending)
    }
}

/// Scope guard that discards any images the device still holds.
///
/// Dropping it issues `MSG_RESET` once, whichever way the pipeline exits.
pub(crate) struct PendingReset<'a, T: DsmTransport> {
    dsm: &'a T,
    app: &'a ApplicationIdentity,
    source: &'a SourceIdentity,
}

impl<'a, T: DsmTransport> PendingReset<'a, T> {
    pub(crate) fn new(dsm: &'a T, app: &'a ApplicationIdentity, source: &'a SourceIdentity) -> Self {
        Self { dsm, app, source }
    }
}

impl<T: DsmTransport> Drop for PendingReset<'_, T> {
    fn drop(&mut self) {
        let mut pending = PendingXfers::default();
        let rc = self
            .dsm
            .pending_xfers(self.app, self.source, Msg::Reset, &mut pending);
        if rc.is_success() {
            debug!("Pending transfers reset");
        } else {
            warn!(rc = %rc, "Pending transfer reset failed");
        }
    }
}

/// Application-owned buffer for memory transfers.
///
/// The device is told the declared size (its minimum hint, or the preferred
/// size when the minimum is zero); twice that is allocated.
#[derive(Debug)]
pub struct TransferBuffer {
    declared: usize,
    data: Vec<u8>,
}

impl TransferBuffer {
    pub fn new(setup: &SetupMemXfer) -> Result<Self> {
        let declared = match setup.min_buf_size {
            0 => setup.preferred,
            min => min,
        } as usize;
        if declared == 0 {
            return Err(TwainError::Protocol {
                operation: "memory transfer setup",
                code: ReturnCode::Success,
                condition: ConditionCode::BadValue,
            });
        }
        Ok(Self {
            declared,
            data: vec![0; declared * 2],
        })
    }

    /// Size the device may fill.
    pub fn declared(&self) -> usize {
        self.declared
    }

    pub fn allocated(&self) -> usize {
        self.data.len()
    }

    /// Region handed to the device for the next chunk.
    pub fn device_region(&mut self) -> &mut [u8] {
        &mut self.data[..self.declared]
    }

    pub fn filled(&self) -> &[u8] {
        &self.data[..self.declared]
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Observer that keeps a summary of every event.
    #[derive(Debug, Default)]
    pub(crate) struct Collector {
        pub finals: usize,
        pub completions: Vec<f32>,
        pub pendings: Vec<u16>,
        pub rasters: Vec<Raster>,
        pub stop_after: Option<usize>,
        pub completed: Vec<Option<String>>,
    }

    impl ScanObserver for Collector {
        fn on_transfer(&mut self, event: &TransferEvent<'_>) -> Continuation {
            self.completions.push(event.completion);
            self.pendings.push(event.pending);
            if event.is_final_for_image {
                self.finals += 1;
                self.rasters.push(event.raster.clone());
            }
            match self.stop_after {
                Some(n) if self.completions.len() >= n => Continuation::Stop,
                _ => Continuation::Continue,
            }
        }

        fn on_complete(&mut self, error: Option<&TwainError>) {
            self.completed.push(error.map(|e| e.to_string()));
        }
    }

    #[test]
    fn test_buffer_doubles_minimum() {
        let buffer = TransferBuffer::new(&SetupMemXfer {
            min_buf_size: 1024,
            max_buf_size: 1 << 20,
            preferred: 1 << 20,
        })
        .unwrap();
        assert_eq!(buffer.declared(), 1024);
        assert_eq!(buffer.allocated(), 2048);
    }

    #[test]
    fn test_buffer_falls_back_to_preferred() {
        let buffer = TransferBuffer::new(&SetupMemXfer {
            min_buf_size: 0,
            max_buf_size: 0,
            preferred: 512,
        })
        .unwrap();
        assert_eq!(buffer.declared(), 512);
        assert!(TransferBuffer::new(&SetupMemXfer::default()).is_err());
    }
}
