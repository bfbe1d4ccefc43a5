//! Incremental-buffered pipeline: chunked retrieval into an application
//! buffer with row stride correction.

use tracing::{debug, info, instrument};

use super::stride::{align_rows, padded_stride};
use super::{
    Continuation, PendingReset, TransferBuffer, TransferContext, TransferEvent, TransferSummary,
};
use crate::dsm::DsmTransport;
use crate::error::{Result, TwainError};
use crate::events::{Pipeline, ScanEvent};
use crate::protocol::{MemXferChunk, ReturnCode, SetupMemXfer};
use crate::raster::Raster;

/// Retrieve images chunk by chunk until the device reports none pending or
/// the observer stops.
///
/// A stop ends the current image as if its last chunk had arrived.
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
        pipeline: Pipeline::Buffered,
    });

    loop {
        let info = ctx.image_info()?;

        let mut setup = SetupMemXfer::default();
        let rc = ctx.dsm.setup_mem_xfer(ctx.app, ctx.source, &mut setup);
        if !rc.is_success() {
            return Err(ctx.protocol_error("memory transfer setup", rc));
        }
        let mut buffer = TransferBuffer::new(&setup)?;
        debug!(
            min = setup.min_buf_size,
            max = setup.max_buf_size,
            preferred = setup.preferred,
            declared = buffer.declared(),
            "Buffer allocated"
        );

        let mut raster = Raster::blank(&info)?;
        let unknown_length = info.image_length <= 0;
        let total_pixels = info.total_pixels();
        let bits_per_pixel = info.bits_per_pixel.max(1) as u64;
        let mut pixels_written = 0u64;

        loop {
            let mut chunk = MemXferChunk::default();
            let rc = ctx
                .dsm
                .image_mem_xfer(ctx.app, ctx.source, &mut chunk, buffer.device_region());
            let done = match rc {
                ReturnCode::XferDone => true,
                ReturnCode::Success => false,
                other => return Err(ctx.protocol_error("memory transfer", other)),
            };

            let bytes_per_row = chunk.bytes_per_row as usize;
            let rows = chunk.rows as usize;
            let needed = bytes_per_row * rows;
            if needed > buffer.declared() || chunk.bytes_written as usize > buffer.declared() {
                return Err(TwainError::MalformedChunk {
                    expected: needed.max(chunk.bytes_written as usize),
                    actual: buffer.declared(),
                });
            }

            let aligned = align_rows(buffer.filled(), bytes_per_row, rows);
            if unknown_length {
                raster.grow_to(chunk.y_offset + chunk.rows);
            }
            raster.write_rows(chunk.y_offset, chunk.rows, &aligned, padded_stride(bytes_per_row))?;

            pixels_written += chunk.bytes_written as u64 * 8 / bits_per_pixel;
            let completion = if done {
                1.0
            } else if total_pixels == 0 {
                0.0
            } else {
                (pixels_written as f64 / total_pixels as f64).min(1.0) as f32
            };
            ctx.sink.on_event(&ScanEvent::ChunkTransferred {
                rows: chunk.rows,
                bytes: chunk.bytes_written,
                completion,
            });

            let event = TransferEvent {
                raster: &raster,
                info: &info,
                rows: chunk.y_offset..chunk.y_offset + chunk.rows,
                is_final_for_image: done,
                completion,
                pending: 0,
            };
            if ctx.observer.on_transfer(&event) == Continuation::Stop {
                info!("Transfer stopped by caller");
                summary.stopped = true;
                break;
            }
            if done {
                break;
            }
        }
        drop(buffer);

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

        if summary.stopped || pending.count == 0 {
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
    use crate::events::tests::RecordingSink;
    use crate::protocol::constants::*;
    use crate::protocol::{ApplicationIdentity, Msg, PixelType, SourceIdentity, Version};
    use crate::raster::DibConverter;
    use crate::transfer::tests::Collector;

    fn setup() -> (MockDsm, ApplicationIdentity, SourceIdentity) {
        let mock = MockDsm::new();
        let source = mock.add_source("Feeder");
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
    fn test_chunks_reassemble_unaligned_rows() {
        let (mock, app, source) = setup();
        let image = MockImage::pattern(37, 10, PixelType::Grey);
        mock.queue_image(image.clone());
        mock.queue_pending_counts(&[0]);
        mock.set_buffer_sizes(37 * 3, 4096, 4096);
        let mut observer = Collector::default();

        let summary = run(&mock, &app, &source, &mut observer).unwrap();

        assert_eq!(summary.images, 1);
        assert_eq!(mock.count(DAT_IMAGEMEMXFER, Msg::Get), 4);
        assert_eq!(observer.finals, 1);
        let raster = &observer.rasters[0];
        assert_eq!(raster.stride, 40);
        for y in 0..10u32 {
            let expected = &image.rows[y as usize * 37..(y as usize + 1) * 37];
            assert_eq!(&raster.row(y).unwrap()[..37], expected);
        }
        assert_eq!(mock.count(DAT_PENDINGXFERS, Msg::Reset), 1);
    }

    #[test]
    fn test_completion_fractions() {
        let (mock, app, source) = setup();
        mock.queue_image(MockImage::pattern(10, 4, PixelType::Grey));
        mock.queue_pending_counts(&[0]);
        mock.set_buffer_sizes(4096, 4096, 4096);
        mock.set_max_chunk_rows(1);
        let mut observer = Collector::default();

        run(&mock, &app, &source, &mut observer).unwrap();

        assert_eq!(observer.completions, vec![0.25, 0.5, 0.75, 1.0]);
    }

    fn chunk_bytes(sink: &RecordingSink) -> u64 {
        sink.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ScanEvent::ChunkTransferred { bytes, .. } => Some(*bytes as u64),
                _ => None,
            })
            .sum()
    }

    #[test]
    fn test_chunk_bytes_cover_image() {
        for image in [
            MockImage::pattern(7, 9, PixelType::Rgb),
            MockImage::pattern(37, 10, PixelType::Grey),
            MockImage::pattern(8, 5, PixelType::Grey),
        ] {
            let (mock, app, source) = setup();
            let expected = image.info.expected_bytes();
            let bytes_per_row = image.bytes_per_row;
            mock.queue_image(image);
            mock.queue_pending_counts(&[0]);
            mock.set_buffer_sizes(bytes_per_row * 2, 4096, 4096);
            let sink = RecordingSink::default();
            let mut observer = Collector::default();
            let mut ctx = TransferContext {
                dsm: &mock,
                app: &app,
                source: &source,
                observer: &mut observer,
                converter: &DibConverter,
                sink: &sink,
            };

            transfer_images(&mut ctx).unwrap();

            assert_eq!(chunk_bytes(&sink), expected, "bytes_per_row {bytes_per_row}");
            assert!(mock.count(DAT_IMAGEMEMXFER, Msg::Get) > 1);
        }
    }

    #[test]
    fn test_stop_mid_image_ends_transfer() {
        let (mock, app, source) = setup();
        mock.queue_image(MockImage::pattern(10, 4, PixelType::Grey));
        mock.queue_image(MockImage::pattern(10, 4, PixelType::Grey));
        mock.queue_pending_counts(&[1, 0]);
        mock.set_max_chunk_rows(1);
        let mut observer = Collector {
            stop_after: Some(2),
            ..Default::default()
        };

        let summary = run(&mock, &app, &source, &mut observer).unwrap();

        assert!(summary.stopped);
        assert_eq!(mock.count(DAT_IMAGEMEMXFER, Msg::Get), 2);
        assert_eq!(mock.count(DAT_PENDINGXFERS, Msg::EndXfer), 1);
        assert_eq!(mock.count(DAT_PENDINGXFERS, Msg::Reset), 1);
    }

    #[test]
    fn test_transfer_error_still_resets() {
        let (mock, app, source) = setup();
        mock.queue_image(MockImage::pattern(10, 4, PixelType::Grey));
        mock.queue_pending_counts(&[0]);
        mock.set_max_chunk_rows(1);
        mock.fail_call(DAT_IMAGEMEMXFER, Msg::Get, 3, ReturnCode::Cancel);
        let mut observer = Collector::default();

        let err = run(&mock, &app, &source, &mut observer).unwrap_err();

        assert!(matches!(err, TwainError::Protocol { code: ReturnCode::Cancel, .. }));
        assert_eq!(observer.completions.len(), 2);
        assert_eq!(mock.count(DAT_PENDINGXFERS, Msg::Reset), 1);
    }
}
