//! Conversion of raw Z-pixmap scanlines to packed RGB

use crate::error::{Error, Result};
use rayon::prelude::*;

/// Order of the bytes inside a 32-bit pixel as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little endian: B, G, R, X in memory
    LsbFirst,
    /// Big endian: X, R, G, B in memory
    MsbFirst,
}

/// Pixels as they come off the wire
#[derive(Debug, Clone)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u8,
    /// Bytes per scanline including padding
    pub stride: usize,
    pub byte_order: ByteOrder,
    pub data: Vec<u8>,
}

/// Packs `raw` into `width * height * 3` bytes of RGB, dropping padding
/// and the unused alpha byte.
pub fn to_rgb(raw: &RawImage) -> Result<Vec<u8>> {
    if raw.bits_per_pixel != 32 {
        return Err(Error::PixelLayout(format!(
            "{} bits per pixel",
            raw.bits_per_pixel
        )));
    }
    let width = raw.width as usize;
    let height = raw.height as usize;
    if width == 0 || height == 0 {
        return Err(Error::PixelLayout("empty image".to_string()));
    }
    let row_bytes = width * 4;
    if raw.stride < row_bytes || raw.data.len() < raw.stride * (height - 1) + row_bytes {
        return Err(Error::PixelLayout(format!(
            "{} bytes with stride {} for {}x{}",
            raw.data.len(),
            raw.stride,
            width,
            height
        )));
    }

    let (r, g, b) = match raw.byte_order {
        ByteOrder::LsbFirst => (2, 1, 0),
        ByteOrder::MsbFirst => (1, 2, 3),
    };

    let mut rgb = vec![0u8; width * height * 3];
    rgb.par_chunks_mut(width * 3)
        .zip(raw.data.par_chunks(raw.stride))
        .for_each(|(dst, src)| {
            for (out, px) in dst.chunks_exact_mut(3).zip(src[..row_bytes].chunks_exact(4)) {
                out[0] = px[r];
                out[1] = px[g];
                out[2] = px[b];
            }
        });
    Ok(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(byte_order: ByteOrder, stride: usize, data: Vec<u8>) -> RawImage {
        RawImage {
            width: 2,
            height: 2,
            bits_per_pixel: 32,
            stride,
            byte_order,
            data,
        }
    }

    #[test]
    fn test_lsb_first_swaps_red_and_blue() {
        // BGRX
        let data = vec![
            3, 2, 1, 0, 6, 5, 4, 0, //
            9, 8, 7, 0, 12, 11, 10, 0,
        ];
        let rgb = to_rgb(&raw(ByteOrder::LsbFirst, 8, data)).unwrap();
        assert_eq!(rgb, (1..=12).collect::<Vec<u8>>());
    }

    #[test]
    fn test_msb_first_skips_leading_pad() {
        // XRGB
        let data = vec![
            0, 1, 2, 3, 0, 4, 5, 6, //
            0, 7, 8, 9, 0, 10, 11, 12,
        ];
        let rgb = to_rgb(&raw(ByteOrder::MsbFirst, 8, data)).unwrap();
        assert_eq!(rgb, (1..=12).collect::<Vec<u8>>());
    }

    #[test]
    fn test_scanline_padding_is_dropped() {
        let data = vec![
            3, 2, 1, 0, 6, 5, 4, 0, 0xff, 0xff, 0xff, 0xff, //
            9, 8, 7, 0, 12, 11, 10, 0, 0xff, 0xff, 0xff, 0xff,
        ];
        let rgb = to_rgb(&raw(ByteOrder::LsbFirst, 12, data)).unwrap();
        assert_eq!(rgb, (1..=12).collect::<Vec<u8>>());
    }

    #[test]
    fn test_rejects_unsupported_depth_and_short_data() {
        let mut image = raw(ByteOrder::LsbFirst, 8, vec![0; 16]);
        image.bits_per_pixel = 24;
        assert!(matches!(to_rgb(&image), Err(Error::PixelLayout(_))));

        let short = raw(ByteOrder::LsbFirst, 8, vec![0; 10]);
        assert!(matches!(to_rgb(&short), Err(Error::PixelLayout(_))));
    }
}
