//! Row stride correction for buffered chunks.
//!
//! Devices report `bytes_per_row` without alignment padding; rasters keep
//! rows on 4-byte boundaries.

use std::borrow::Cow;

/// Padding needed to bring `bytes_per_row` to a multiple of 4.
pub fn row_padding(bytes_per_row: usize) -> usize {
    match bytes_per_row % 4 {
        0 => 0,
        rem => 4 - rem,
    }
}

/// Stride of the corrected output.
pub fn padded_stride(bytes_per_row: usize) -> usize {
    bytes_per_row + row_padding(bytes_per_row)
}

/// Spread `rows` rows of `src` onto 4-byte aligned strides.
///
/// Row `r` lands at `r * padded_stride(bytes_per_row)`; pad bytes are zero.
/// When no padding is needed the input is borrowed untouched.
///
/// `src` must hold at least `bytes_per_row * rows` bytes.
pub fn align_rows(src: &[u8], bytes_per_row: usize, rows: usize) -> Cow<'_, [u8]> {
    let len = bytes_per_row * rows;
    let pad = row_padding(bytes_per_row);
    if pad == 0 {
        return Cow::Borrowed(&src[..len]);
    }

    let stride = bytes_per_row + pad;
    let mut out = vec![0u8; len + pad * rows];
    for (r, row) in src[..len].chunks_exact(bytes_per_row).enumerate() {
        out[r * stride..r * stride + bytes_per_row].copy_from_slice(row);
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unaligned_rows_are_padded() {
        let src: Vec<u8> = (0..370u32).map(|i| (i % 251) as u8).collect();
        let out = align_rows(&src, 37, 10);

        assert_eq!(out.len(), 400);
        for r in 0..10 {
            assert_eq!(&src[r * 37..r * 37 + 37], &out[r * 40..r * 40 + 37]);
        }
    }

    #[test]
    fn test_aligned_rows_are_borrowed() {
        let src = vec![7u8; 40 * 3 + 5];
        let out = align_rows(&src, 40, 3);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out.len(), 120);
    }

    #[test]
    fn test_padding() {
        assert_eq!(row_padding(37), 3);
        assert_eq!(row_padding(38), 2);
        assert_eq!(row_padding(40), 0);
        assert_eq!(padded_stride(9), 12);
    }
}
