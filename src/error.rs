//! Library error type

use crate::capture::ScreenshotFormat;
use crate::window::WindowId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[cfg(target_os = "linux")]
    #[error("failed to connect to X11 display: {0}")]
    Connect(#[from] x11rb::errors::ConnectError),

    #[cfg(target_os = "linux")]
    #[error("X11 connection error: {0}")]
    Connection(#[from] x11rb::errors::ConnectionError),

    #[cfg(target_os = "linux")]
    #[error("X11 request failed: {0}")]
    Reply(#[from] x11rb::errors::ReplyError),

    #[cfg(target_os = "linux")]
    #[error("X11 request failed: {0}")]
    ReplyOrId(#[from] x11rb::errors::ReplyOrIdError),

    #[error("window manager hints unavailable: {0}")]
    Hints(String),

    #[error("query for window {window:#x} failed: {reason}")]
    WindowQuery { window: WindowId, reason: String },

    #[error("invalid capture configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("backend is not initialized")]
    NotInitialized,

    #[error("{0} encoding is not supported")]
    UnsupportedFormat(ScreenshotFormat),

    #[error("unsupported pixel layout: {0}")]
    PixelLayout(String),

    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[cfg(target_os = "linux")]
    #[error("shared memory error: {0}")]
    Shm(#[from] nix::errno::Errno),

    #[error("invalid configuration file: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
