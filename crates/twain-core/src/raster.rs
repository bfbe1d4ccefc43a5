//! In-memory raster produced by the transfer pipelines.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Result, TwainError};
use crate::protocol::{ImageInfo, PixelType};

/// Row stride in bytes, padded to a 4-byte boundary.
pub fn aligned_stride(width: u32, bits_per_pixel: u16) -> usize {
    ((width as usize * bits_per_pixel as usize).div_ceil(32)) * 4
}

/// Uncompressed image with top-down rows and 4-byte aligned stride.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u16,
    pub pixel_type: PixelType,
    pub stride: usize,
    pub data: Vec<u8>,
}

impl Raster {
    /// Zero-filled raster sized from the device's image metadata.
    ///
    /// An unknown length (`-1`, common with feeders) yields zero rows; grow
    /// it with [`grow_to`](Self::grow_to) as data arrives.
    pub fn blank(info: &ImageInfo) -> Result<Self> {
        if info.image_width <= 0 || info.bits_per_pixel <= 0 {
            return Err(TwainError::Raster(format!(
                "unusable geometry {}x{} at {} bpp",
                info.image_width, info.image_length, info.bits_per_pixel
            )));
        }
        let width = info.image_width as u32;
        let height = info.image_length.max(0) as u32;
        let bits_per_pixel = info.bits_per_pixel as u16;
        let stride = aligned_stride(width, bits_per_pixel);
        Ok(Self {
            width,
            height,
            bits_per_pixel,
            pixel_type: info.pixel_type,
            stride,
            data: vec![0; stride * height as usize],
        })
    }

    /// Extend to at least `height` rows.
    pub fn grow_to(&mut self, height: u32) {
        if height > self.height {
            self.height = height;
            self.data.resize(self.stride * height as usize, 0);
        }
    }

    pub fn row(&self, y: u32) -> Option<&[u8]> {
        let start = y as usize * self.stride;
        self.data.get(start..start + self.stride)
    }

    /// Copy `rows` rows of `src` (laid out at `src_stride`) starting at row
    /// `y_offset`.
    pub fn write_rows(
        &mut self,
        y_offset: u32,
        rows: u32,
        src: &[u8],
        src_stride: usize,
    ) -> Result<()> {
        if y_offset as u64 + rows as u64 > self.height as u64 {
            return Err(TwainError::Raster(format!(
                "rows {}..{} outside image of height {}",
                y_offset,
                y_offset as u64 + rows as u64,
                self.height
            )));
        }
        let needed = src_stride * rows as usize;
        if src.len() < needed {
            return Err(TwainError::MalformedChunk {
                expected: needed,
                actual: src.len(),
            });
        }
        let copy = src_stride.min(self.stride);
        for r in 0..rows as usize {
            let dst = (y_offset as usize + r) * self.stride;
            let from = r * src_stride;
            self.data[dst..dst + copy].copy_from_slice(&src[from..from + copy]);
        }
        Ok(())
    }
}

/// Turns a native transfer buffer into a [`Raster`].
pub trait RasterConverter {
    fn convert(&self, native: &[u8], info: &ImageInfo) -> Result<Raster>;
}

/// Converter for packed device-independent bitmaps (header, palette, rows).
#[derive(Debug, Default, Clone, Copy)]
pub struct DibConverter;

const BI_RGB: u32 = 0;

impl RasterConverter for DibConverter {
    fn convert(&self, native: &[u8], info: &ImageInfo) -> Result<Raster> {
        let mut cursor = Cursor::new(native);
        let header = (|| -> std::io::Result<_> {
            let size = cursor.read_u32::<LittleEndian>()?;
            let width = cursor.read_i32::<LittleEndian>()?;
            let height = cursor.read_i32::<LittleEndian>()?;
            let _planes = cursor.read_u16::<LittleEndian>()?;
            let bit_count = cursor.read_u16::<LittleEndian>()?;
            let compression = cursor.read_u32::<LittleEndian>()?;
            let _size_image = cursor.read_u32::<LittleEndian>()?;
            let _x_ppm = cursor.read_i32::<LittleEndian>()?;
            let _y_ppm = cursor.read_i32::<LittleEndian>()?;
            let clr_used = cursor.read_u32::<LittleEndian>()?;
            Ok((size, width, height, bit_count, compression, clr_used))
        })()
        .map_err(|e| TwainError::Raster(format!("truncated bitmap header: {e}")))?;
        let (size, width, height, bit_count, compression, clr_used) = header;

        if compression != BI_RGB {
            return Err(TwainError::Raster(format!(
                "unsupported bitmap compression {compression}"
            )));
        }
        if width <= 0 || height == 0 || bit_count == 0 {
            return Err(TwainError::Raster(format!(
                "unusable bitmap geometry {width}x{height} at {bit_count} bpp"
            )));
        }

        let palette = match clr_used {
            0 if bit_count <= 8 => 1usize << bit_count,
            n => n as usize,
        };
        let offset = size as usize + palette * 4;
        let bottom_up = height > 0;
        let rows = height.unsigned_abs();
        let stride = aligned_stride(width as u32, bit_count);
        let needed = offset + stride * rows as usize;
        if native.len() < needed {
            return Err(TwainError::MalformedChunk {
                expected: needed,
                actual: native.len(),
            });
        }

        let mut raster = Raster::blank(&ImageInfo {
            image_width: width,
            image_length: rows as i32,
            bits_per_pixel: bit_count as i16,
            pixel_type: info.pixel_type,
            ..info.clone()
        })?;
        let pixels = &native[offset..needed];
        for y in 0..rows as usize {
            let src_row = if bottom_up { rows as usize - 1 - y } else { y };
            let src = &pixels[src_row * stride..(src_row + 1) * stride];
            raster.data[y * stride..(y + 1) * stride].copy_from_slice(src);
        }
        Ok(raster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsm::MockImage;

    #[test]
    fn test_blank_aligns_stride() {
        let info = ImageInfo {
            image_width: 37,
            image_length: 10,
            bits_per_pixel: 8,
            ..Default::default()
        };
        let raster = Raster::blank(&info).unwrap();
        assert_eq!(raster.stride, 40);
        assert_eq!(raster.data.len(), 400);
    }

    #[test]
    fn test_unknown_length_grows() {
        let info = ImageInfo {
            image_width: 37,
            image_length: -1,
            bits_per_pixel: 8,
            ..Default::default()
        };
        let mut raster = Raster::blank(&info).unwrap();
        assert_eq!(raster.height, 0);
        raster.grow_to(3);
        assert_eq!(raster.data.len(), 120);
        assert!(Raster::blank(&ImageInfo::default()).is_err());
    }

    #[test]
    fn test_dib_rows_come_out_top_down() {
        let image = MockImage::pattern(5, 3, PixelType::Grey);
        let raster = DibConverter.convert(&image.to_dib(), &image.info).unwrap();

        assert_eq!((raster.width, raster.height, raster.stride), (5, 3, 8));
        for y in 0..3u32 {
            let expected = &image.rows[y as usize * 5..(y as usize + 1) * 5];
            assert_eq!(&raster.row(y).unwrap()[..5], expected);
        }
    }

    #[test]
    fn test_dib_rgb_without_palette() {
        let image = MockImage::pattern(3, 2, PixelType::Rgb);
        let raster = DibConverter.convert(&image.to_dib(), &image.info).unwrap();
        assert_eq!(raster.bits_per_pixel, 24);
        assert_eq!(raster.stride, 12);
        assert_eq!(&raster.row(1).unwrap()[..9], &image.rows[9..18]);
    }

    #[test]
    fn test_dib_truncated() {
        let image = MockImage::pattern(5, 3, PixelType::Grey);
        let dib = image.to_dib();
        let err = DibConverter
            .convert(&dib[..dib.len() - 4], &image.info)
            .unwrap_err();
        assert!(matches!(err, TwainError::MalformedChunk { .. }));
    }

    #[test]
    fn test_write_rows_bounds() {
        let info = ImageInfo {
            image_width: 4,
            image_length: 2,
            bits_per_pixel: 8,
            ..Default::default()
        };
        let mut raster = Raster::blank(&info).unwrap();
        raster.write_rows(1, 1, &[9, 9, 9, 9], 4).unwrap();
        assert_eq!(raster.row(1).unwrap(), &[9, 9, 9, 9]);
        assert!(raster.write_rows(2, 1, &[0; 4], 4).is_err());
    }
}
