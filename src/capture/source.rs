//! Pull-based byte sources handed to capture callbacks

use super::encoder::ScreenshotFormat;
use std::io::{self, Read};

/// Largest slice handed out by [`CaptureSource::next_chunk`]
pub const CHUNK_SIZE: usize = 64 * 1024;

/// A pull-based stream of captured bytes
pub trait CaptureSource: Send {
    /// Next slice of data, `None` once exhausted or when the capture failed
    fn next_chunk(&mut self) -> Option<&[u8]>;

    /// Why the capture produced no data
    fn error(&self) -> Option<&str>;
}

/// A single captured frame, raw RGB or encoded
#[derive(Debug, Clone)]
pub struct ScreenshotSource {
    width: u32,
    height: u32,
    channels: u8,
    stride: usize,
    encoding: Option<ScreenshotFormat>,
    data: Vec<u8>,
    cursor: usize,
    error: Option<String>,
}

impl ScreenshotSource {
    /// Tightly packed RGB pixels
    pub fn raw(width: u32, height: u32, rgb: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels: 3,
            stride: width as usize * 3,
            encoding: None,
            data: rgb,
            cursor: 0,
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            width: 0,
            height: 0,
            channels: 3,
            stride: 0,
            encoding: None,
            data: Vec::new(),
            cursor: 0,
            error: Some(reason.into()),
        }
    }

    /// Same frame, with the payload replaced by its `format` encoding
    pub(crate) fn into_encoded(self, format: ScreenshotFormat, bytes: Vec<u8>) -> Self {
        Self {
            encoding: Some(format),
            data: bytes,
            cursor: 0,
            ..self
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// `None` while the data is still raw RGB
    pub fn encoding(&self) -> Option<ScreenshotFormat> {
        self.encoding
    }

    /// The whole payload regardless of how much was already consumed
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl CaptureSource for ScreenshotSource {
    fn next_chunk(&mut self) -> Option<&[u8]> {
        if self.error.is_some() || self.cursor >= self.data.len() {
            return None;
        }
        let start = self.cursor;
        let end = (start + CHUNK_SIZE).min(self.data.len());
        self.cursor = end;
        Some(&self.data[start..end])
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl Read for ScreenshotSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(error) = &self.error {
            return Err(io::Error::new(io::ErrorKind::Other, error.clone()));
        }
        let remaining = &self.data[self.cursor.min(self.data.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n;
        Ok(n)
    }
}
