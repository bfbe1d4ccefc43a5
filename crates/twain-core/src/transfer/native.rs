//! Whole-image pipeline: one blocking retrieval per image.

use tracing::{info, instrument};

use super::{Continuation, PendingReset, TransferContext, TransferEvent, TransferSummary};
use crate::dsm::DsmTransport;
use crate::error::{Result, TwainError};
use crate::events::{Pipeline, ScanEvent};
use crate::protocol::ReturnCode;

/// Retrieve images until the device reports none pending or the observer
/// stops.
///
/// Each native buffer is released right after conversion, before the
/// conversion result is inspected.
pub fn transfer_images<T: DsmTransport>(ctx: &mut TransferContext<'_, T>) -> Result<TransferSummary> {
    let mut summary = TransferSummary::default();
    transfer_into(ctx, &mut summary)?;
    Ok(summary)
}

/// Same as [`transfer_images`], recording progress in `summary` so images
/// delivered before a failure are still counted.
#[instrument(skip(ctx, summary), fields(source = %ctx.source))]
pub fn transfer_into<T: DsmTransport>(
    ctx: &mut TransferContext<'_, T>,
    summary: &mut TransferSummary,
) -> Result<()> {
    let _reset = PendingReset::new(ctx.dsm, ctx.app, ctx.source);
    ctx.sink.on_event(&ScanEvent::TransferReady {
        pipeline: Pipeline::Native,
    });

    loop {
        let info = ctx.image_info()?;

        let mut handle = None;
        let rc = ctx.dsm.image_native_xfer(ctx.app, ctx.source, &mut handle);
        if rc != ReturnCode::XferDone {
            drop(handle);
            return Err(ctx.protocol_error("native transfer", rc));
        }
        let native = handle.ok_or(TwainError::MissingImage)?;
        let converted = ctx.converter.convert(native.bytes(), &info);
        drop(native);
        let raster = converted?;

        let pending = ctx.end_transfer()?;
        summary.images += 1;
        info!(
            image = summary.images,
            width = raster.width,
            height = raster.height,
            pending = pending.count,
            "Image transferred"
        );
        ctx.sink.on_event(&ScanEvent::ImageTransferred {
            width: raster.width,
            height: raster.height,
            pending: pending.count,
        });

        let event = TransferEvent {
            raster: &raster,
            info: &info,
            rows: 0..raster.height,
            is_final_for_image: true,
            completion: 1.0,
            pending: pending.count,
        };
        if ctx.observer.on_transfer(&event) == Continuation::Stop {
            info!("Transfer stopped by caller");
            summary.stopped = true;
            break;
        }
        if pending.count == 0 {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsm::{MockDsm, MockImage};
    use crate::events::NullSink;
    use crate::protocol::constants::*;
    use crate::protocol::{ApplicationIdentity, Msg, PixelType, SourceIdentity, Version};
    use crate::raster::DibConverter;
    use crate::transfer::tests::Collector;

    fn setup(images: usize, pending: &[u16]) -> (MockDsm, ApplicationIdentity, SourceIdentity) {
        let mock = MockDsm::new();
        let source = mock.add_source("Feeder");
        for i in 0..images {
            mock.queue_image(MockImage::pattern(8 + i as u32, 4, PixelType::Grey));
        }
        mock.queue_pending_counts(pending);
        let mut app = ApplicationIdentity::new("Test", "Test", "Test", Version::default());
        app.id = 1;
        (mock, app, source)
    }

    fn run(
        mock: &MockDsm,
        app: &ApplicationIdentity,
        source: &SourceIdentity,
        observer: &mut Collector,
    ) -> Result<TransferSummary> {
        let mut ctx = TransferContext {
            dsm: mock,
            app,
            source,
            observer,
            converter: &DibConverter,
            sink: &NullSink,
        };
        transfer_images(&mut ctx)
    }

    #[test]
    fn test_pending_counts_drive_loop() {
        let (mock, app, source) = setup(3, &[1, 1, 0]);
        let mut observer = Collector::default();

        let summary = run(&mock, &app, &source, &mut observer).unwrap();

        assert_eq!(summary.images, 3);
        assert_eq!(observer.finals, 3);
        assert_eq!(observer.pendings, vec![1, 1, 0]);
        assert_eq!(mock.count(DAT_PENDINGXFERS, Msg::Reset), 1);
        assert_eq!(mock.released_images(), 3);
        assert_eq!(observer.rasters[2].width, 10);
    }

    #[test]
    fn test_stop_halts_retrieval() {
        let (mock, app, source) = setup(3, &[2, 1, 0]);
        let mut observer = Collector {
            stop_after: Some(1),
            ..Default::default()
        };

        let summary = run(&mock, &app, &source, &mut observer).unwrap();

        assert!(summary.stopped);
        assert_eq!(mock.count(DAT_IMAGENATIVEXFER, Msg::Get), 1);
        assert_eq!(mock.count(DAT_PENDINGXFERS, Msg::Reset), 1);
    }

    #[test]
    fn test_device_error_mid_loop_still_resets() {
        let (mock, app, source) = setup(3, &[2, 1, 0]);
        mock.fail_call(DAT_IMAGENATIVEXFER, Msg::Get, 2, ReturnCode::Failure);
        let mut observer = Collector::default();

        let err = run(&mock, &app, &source, &mut observer).unwrap_err();

        assert!(matches!(err, TwainError::Protocol { code: ReturnCode::Failure, .. }));
        assert_eq!(observer.finals, 1);
        assert_eq!(mock.count(DAT_PENDINGXFERS, Msg::Reset), 1);
    }

    #[test]
    fn test_conversion_failure_releases_buffer() {
        let (mock, app, source) = setup(0, &[0]);
        let mut broken = MockImage::pattern(4, 4, PixelType::Grey);
        broken.info.bits_per_pixel = 0;
        broken.rows.clear();
        mock.queue_image(MockImage {
            bytes_per_row: 0,
            ..broken
        });
        let mut observer = Collector::default();

        assert!(run(&mock, &app, &source, &mut observer).is_err());
        assert_eq!(mock.released_images(), 1);
        assert_eq!(mock.count(DAT_PENDINGXFERS, Msg::Reset), 1);
    }
}
