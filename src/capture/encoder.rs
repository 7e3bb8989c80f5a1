//! Still image encoders

use crate::error::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotFormat {
    Png,
    Jpeg,
    Ppm,
    Qoi,
}

impl ScreenshotFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ScreenshotFormat::Png => "png",
            ScreenshotFormat::Jpeg => "jpg",
            ScreenshotFormat::Ppm => "ppm",
            ScreenshotFormat::Qoi => "qoi",
        }
    }
}

impl fmt::Display for ScreenshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScreenshotFormat::Png => "PNG",
            ScreenshotFormat::Jpeg => "JPEG",
            ScreenshotFormat::Ppm => "PPM",
            ScreenshotFormat::Qoi => "QOI",
        };
        f.write_str(name)
    }
}

impl FromStr for ScreenshotFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ScreenshotFormat::Png),
            "jpeg" | "jpg" => Ok(ScreenshotFormat::Jpeg),
            "ppm" => Ok(ScreenshotFormat::Ppm),
            "qoi" => Ok(ScreenshotFormat::Qoi),
            other => Err(format!("unknown image format '{}'", other)),
        }
    }
}

/// Encodes tightly packed RGB pixels. The output grows through plain
/// `Write` appends, so encoders never need to know the final size.
pub fn encode(
    rgb: &[u8],
    width: u32,
    height: u32,
    format: ScreenshotFormat,
    quality: u8,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match format {
        ScreenshotFormat::Png => {
            PngEncoder::new(&mut out).write_image(rgb, width, height, ExtendedColorType::Rgb8)?;
        }
        ScreenshotFormat::Jpeg => {
            JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).write_image(
                rgb,
                width,
                height,
                ExtendedColorType::Rgb8,
            )?;
        }
        ScreenshotFormat::Ppm => write_ppm(&mut out, rgb, width, height)?,
        ScreenshotFormat::Qoi => {
            warn!("QOI encoder is not available");
            return Err(Error::UnsupportedFormat(format));
        }
    }
    Ok(out)
}

/// Binary PPM: `P6\n{width} {height}\n255\n` followed by the RGB triples
fn write_ppm<W: Write>(out: &mut W, rgb: &[u8], width: u32, height: u32) -> Result<()> {
    write!(out, "P6\n{} {}\n255\n", width, height)?;
    out.write_all(rgb)?;
    Ok(())
}
