//! Screenshot capture: request validation, pixel grabbing, encoding
//!
//! Video and audio requests are validated the same way but only have
//! placeholder workers for now.

mod encoder;
mod pixels;
mod source;

pub use encoder::{encode, ScreenshotFormat, DEFAULT_JPEG_QUALITY};
pub use pixels::{to_rgb, ByteOrder, RawImage};
pub use source::{CaptureSource, ScreenshotSource, CHUNK_SIZE};

use crate::error::{Error, Result};
use crate::window::{Region, Window, WindowId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

/// Frames per second requested when the caller does not say otherwise
pub const DEFAULT_FPS: u8 = 40;

/// What to read pixels from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabTarget {
    /// The window's own drawable, from its origin
    Window {
        window: WindowId,
        width: u32,
        height: u32,
    },
    /// Part of the default screen, in root coordinates
    Region(Region),
}

/// Source of raw pixels, backed by the display connection
pub trait PixelGrabber: Send + Sync {
    fn grab(&self, target: &GrabTarget) -> Result<RawImage>;

    /// Frees transfer buffers. Later grabs may allocate them again.
    fn release(&self);
}

#[derive(Clone)]
pub enum CaptureTarget {
    Region(Region),
    Window(Arc<dyn Window>),
}

impl CaptureTarget {
    fn is_valid(&self) -> bool {
        match self {
            CaptureTarget::Region(region) => region.is_valid(),
            CaptureTarget::Window(window) => window.region().is_valid(),
        }
    }

    fn grab_target(&self) -> GrabTarget {
        match self {
            CaptureTarget::Region(region) => GrabTarget::Region(*region),
            CaptureTarget::Window(window) => {
                let size = window.size();
                GrabTarget::Window {
                    window: window.id(),
                    width: size.width,
                    height: size.height,
                }
            }
        }
    }
}

impl fmt::Debug for CaptureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureTarget::Region(region) => f.debug_tuple("Region").field(region).finish(),
            CaptureTarget::Window(window) => f
                .debug_struct("Window")
                .field("id", &format_args!("{:#x}", window.id()))
                .field("region", &window.region())
                .finish(),
        }
    }
}

/// A still capture request. Without a target it is never valid.
#[derive(Debug, Clone, Default)]
pub struct ScreenshotConfig {
    pub target: Option<CaptureTarget>,
    /// JPEG quality 1-100; the backend default when unset
    pub quality: Option<u8>,
}

impl ScreenshotConfig {
    pub fn region(region: Region) -> Self {
        Self {
            target: Some(CaptureTarget::Region(region)),
            quality: None,
        }
    }

    pub fn window(window: Arc<dyn Window>) -> Self {
        Self {
            target: Some(CaptureTarget::Window(window)),
            quality: None,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.target.as_ref().is_some_and(CaptureTarget::is_valid)
            && self.quality.map_or(true, |q| (1..=100).contains(&q))
    }
}

#[derive(Debug, Clone)]
pub struct VideoCaptureConfig {
    pub target: Option<CaptureTarget>,
    /// Hint only; the actual rate depends on available resources
    pub fps_hint: u8,
}

impl Default for VideoCaptureConfig {
    fn default() -> Self {
        Self {
            target: None,
            fps_hint: DEFAULT_FPS,
        }
    }
}

impl VideoCaptureConfig {
    pub fn is_valid(&self) -> bool {
        self.fps_hint > 0 && self.target.as_ref().is_some_and(CaptureTarget::is_valid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioCaptureConfig {
    /// 0 means "no source"
    pub source_id: u32,
    /// 0.0 to 1.0
    pub volume: f32,
}

impl Default for AudioCaptureConfig {
    fn default() -> Self {
        Self {
            source_id: 0,
            volume: 1.0,
        }
    }
}

impl AudioCaptureConfig {
    pub fn is_valid(&self) -> bool {
        self.source_id != 0 && (0.0..=1.0).contains(&self.volume)
    }
}

#[derive(Debug, Clone, Default)]
pub struct VideoStreamConfig {
    pub video: VideoCaptureConfig,
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct AudioStreamConfig {
    pub audio: AudioCaptureConfig,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Raw,
    Mp4,
    Webm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Pcm,
    Wav,
    Opus,
}

/// Validates capture requests and runs each accepted one on its own worker
pub struct CaptureEngine {
    grabber: Arc<dyn PixelGrabber>,
    default_quality: u8,
}

impl CaptureEngine {
    pub fn new(grabber: Arc<dyn PixelGrabber>, default_quality: u8) -> Self {
        Self {
            grabber,
            default_quality,
        }
    }

    /// Schedules a screenshot. Invalid requests are refused here and
    /// `callback` is never called; otherwise it is called exactly once from
    /// the capture worker.
    pub fn capture_screenshot<F>(
        &self,
        config: ScreenshotConfig,
        format: ScreenshotFormat,
        callback: F,
    ) -> Result<()>
    where
        F: FnOnce(ScreenshotSource) + Send + 'static,
    {
        let target = match &config.target {
            Some(target) if config.is_valid() => target.grab_target(),
            _ => {
                warn!("Refusing screenshot with invalid configuration: {:?}", config);
                return Err(Error::InvalidConfig("screenshot target must be a non-empty window or region"));
            }
        };
        let quality = config.quality.unwrap_or(self.default_quality);
        let grabber = Arc::clone(&self.grabber);

        spawn_worker(move || {
            let source = take_screenshot(grabber.as_ref(), &target, format, quality);
            callback(source);
        })
    }

    pub fn capture_video<F>(&self, config: VideoCaptureConfig, format: VideoFormat, _callback: F) -> Result<()>
    where
        F: FnOnce(Box<dyn CaptureSource>) + Send + 'static,
    {
        if !config.is_valid() {
            warn!("Refusing video capture with invalid configuration: {:?}", config);
            return Err(Error::InvalidConfig("video target must be a non-empty window or region"));
        }
        spawn_worker(move || {
            warn!("Video capture ({:?}) not yet implemented: {:?}", format, config.target);
        })
    }

    pub fn capture_audio<F>(&self, config: AudioCaptureConfig, format: AudioFormat, _callback: F) -> Result<()>
    where
        F: FnOnce(Box<dyn CaptureSource>) + Send + 'static,
    {
        if !config.is_valid() {
            warn!("Refusing audio capture with invalid configuration: {:?}", config);
            return Err(Error::InvalidConfig("audio source id must be set"));
        }
        spawn_worker(move || {
            warn!("Audio capture ({:?}) of source {} not yet implemented", format, config.source_id);
        })
    }

    pub fn stream_video<F>(&self, config: VideoStreamConfig, format: VideoFormat, _callback: F) -> Result<()>
    where
        F: FnOnce(Box<dyn CaptureSource>) + Send + 'static,
    {
        if config.url.is_empty() || !config.video.is_valid() {
            warn!("Refusing video stream with invalid configuration: {:?}", config);
            return Err(Error::InvalidConfig("video stream needs a valid target and URL"));
        }
        spawn_worker(move || {
            warn!("Video streaming ({:?}) to {} not yet implemented", format, config.url);
        })
    }

    pub fn stream_audio<F>(&self, config: AudioStreamConfig, format: AudioFormat, _callback: F) -> Result<()>
    where
        F: FnOnce(Box<dyn CaptureSource>) + Send + 'static,
    {
        if config.url.is_empty() || !config.audio.is_valid() {
            warn!("Refusing audio stream with invalid configuration: {:?}", config);
            return Err(Error::InvalidConfig("audio stream needs a source id and URL"));
        }
        spawn_worker(move || {
            warn!("Audio streaming ({:?}) to {} not yet implemented", format, config.url);
        })
    }

    /// Frees the grabber's transfer buffers
    pub fn release(&self) {
        self.grabber.release();
    }
}

fn spawn_worker<F>(work: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name("winshot-capture".into())
        .spawn(work)?;
    Ok(())
}

/// Grab, normalise and encode one frame. Failures end up in the returned
/// source: an errored source when no pixels are available, the raw RGB
/// source when only encoding failed.
fn take_screenshot(
    grabber: &dyn PixelGrabber,
    target: &GrabTarget,
    format: ScreenshotFormat,
    quality: u8,
) -> ScreenshotSource {
    let raw = match grabber.grab(target) {
        Ok(raw) => raw,
        Err(e) => {
            error!("Failed to grab {:?}: {}", target, e);
            return ScreenshotSource::failed(e.to_string());
        }
    };
    let rgb = match pixels::to_rgb(&raw) {
        Ok(rgb) => rgb,
        Err(e) => {
            error!("Failed to convert pixels of {:?}: {}", target, e);
            return ScreenshotSource::failed(e.to_string());
        }
    };
    debug!("Grabbed {}x{} from {:?}", raw.width, raw.height, target);

    let source = ScreenshotSource::raw(raw.width, raw.height, rgb);
    match encoder::encode(source.data(), raw.width, raw.height, format, quality) {
        Ok(bytes) => {
            info!("Captured {}x{} {} ({} bytes)", raw.width, raw.height, format, bytes.len());
            source.into_encoded(format, bytes)
        }
        Err(e) => {
            error!("{} encoding failed, delivering raw pixels: {}", format, e);
            source
        }
    }
}
