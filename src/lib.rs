//! X11 window tracking, event publishing and screenshot capture
//!
//! [`Backend`] is the entry point: it connects to the display server,
//! discovers windows, keeps them up to date from a background event loop and
//! hands domain events to subscribers. Screenshots are captured on demand.

pub mod cancel;
pub mod capture;
pub mod config;
pub mod discovery;
pub mod error;
pub mod event_loop;
pub mod events;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod publisher;
pub mod registry;
pub mod server;
pub mod tracker;
pub mod window;

#[cfg(test)]
mod testing;

pub use cancel::CancellationHandle;
pub use capture::{
    AudioCaptureConfig, AudioFormat, AudioStreamConfig, CaptureSource, CaptureTarget,
    ScreenshotConfig, ScreenshotFormat, ScreenshotSource, VideoCaptureConfig, VideoFormat,
    VideoStreamConfig,
};
pub use config::BackendConfig;
pub use error::{Error, Result};
pub use events::{Event, EventDetail, EventKind, ModifierState, MouseButton};
pub use publisher::PublishStrategy;
pub use server::ScreenInfo;
pub use window::{Position, Region, Size, Window, WindowId, WindowSnapshot, XWindow};

use capture::CaptureEngine;
use event_loop::EventLoop;
use parking_lot::Mutex;
use publisher::Publisher;
use registry::Registry;
use server::{Connector, DisplayServer, Session};
use std::sync::Arc;
use tracker::WindowTracker;
use tracing::{error, info, warn};

/// Everything that only exists while connected
struct Connected {
    server: Arc<dyn DisplayServer>,
    tracker: Arc<WindowTracker>,
    capture: CaptureEngine,
}

pub struct Backend {
    config: BackendConfig,
    connector: Arc<dyn Connector>,
    registry: Arc<Registry>,
    publisher: Arc<Publisher>,
    event_loop: EventLoop,
    /// Serialises init and deinit
    lifecycle: Mutex<()>,
    session: Mutex<Option<Arc<Connected>>>,
}

impl Backend {
    /// A backend talking to the X11 server named in `config`
    #[cfg(target_os = "linux")]
    pub fn new(config: BackendConfig) -> Self {
        Self::with_connector(config, Arc::new(linux::X11Connector))
    }

    pub fn with_connector(config: BackendConfig, connector: Arc<dyn Connector>) -> Self {
        let publisher = Publisher::new(config.publish_strategy, config.publisher_idle());
        Self {
            event_loop: EventLoop::new(config.poll_interval()),
            config,
            connector,
            registry: Registry::new(),
            publisher: Arc::new(publisher),
            lifecycle: Mutex::new(()),
            session: Mutex::new(None),
        }
    }

    /// Connects, discovers windows and starts the event loop. Does nothing
    /// when already connected. On failure the backend stays disconnected and
    /// `init` may be retried.
    pub fn init(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        if self.session.lock().is_some() {
            info!("Backend already initialized");
            return Ok(());
        }

        let Session { server, grabber } = self.connector.connect(&self.config).map_err(|e| {
            error!("Failed to connect to display server: {}", e);
            e
        })?;
        let tracker = Arc::new(WindowTracker::new(
            Arc::clone(&server),
            Arc::clone(&self.registry),
            Arc::clone(&self.publisher),
        ));

        let started = discovery::discover(server.as_ref(), &tracker)
            .and_then(|_| self.event_loop.start(Arc::clone(&server), Arc::clone(&tracker)));
        if let Err(e) = started {
            error!("Failed to initialize backend: {}", e);
            self.event_loop.stop(&tracker);
            grabber.release();
            return Err(e);
        }

        *self.session.lock() = Some(Arc::new(Connected {
            server,
            tracker,
            capture: CaptureEngine::new(grabber, self.config.jpeg_quality),
        }));
        info!("Backend initialized");
        Ok(())
    }

    /// Stops the event loop, waits for queued notifications, then releases
    /// capture buffers and the connection. Does nothing when not connected.
    pub fn deinit(&self) {
        let _lifecycle = self.lifecycle.lock();
        let Some(connected) = self.session.lock().take() else {
            return;
        };
        self.event_loop.stop(&connected.tracker);
        self.publisher.shutdown();
        connected.capture.release();
        info!("Backend deinitialized");
    }

    pub fn is_connected(&self) -> bool {
        self.session.lock().is_some()
    }

    fn connected(&self) -> Option<Arc<Connected>> {
        self.session.lock().clone()
    }

    /// Subscribes to every event of `kind`. Works before `init`; events flow
    /// once connected.
    pub fn listen<F>(&self, kind: EventKind, callback: F) -> CancellationHandle
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.registry.register(kind, Arc::new(callback))
    }

    /// Like [`listen`](Self::listen), restricted to one window
    pub fn listen_window<F>(&self, kind: EventKind, window: WindowId, callback: F) -> CancellationHandle
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.listen(kind, move |event: &Event| {
            if event.window_id == window {
                callback(event);
            }
        })
    }

    pub fn tracked_windows(&self) -> Vec<WindowSnapshot> {
        let Some(connected) = self.connected() else {
            return Vec::new();
        };
        let mut windows: Vec<_> = connected.tracker.tracked().iter().map(|w| w.snapshot()).collect();
        windows.sort_by_key(|w| w.id);
        windows
    }

    pub fn window(&self, id: WindowId) -> Option<Arc<XWindow>> {
        self.connected()?.tracker.window(id)
    }

    /// Current state of any window, tracked or not
    pub fn describe_window(&self, id: WindowId) -> Result<WindowSnapshot> {
        let connected = self.connected().ok_or(Error::NotInitialized)?;
        if let Some(window) = connected.tracker.window(id) {
            return Ok(window.snapshot());
        }
        let info = connected.server.window_info(id)?;
        Ok(WindowSnapshot {
            id,
            name: info.name,
            region: info.region,
            parent: info.parent,
            children: info.children,
        })
    }

    pub fn screens(&self) -> Result<Vec<ScreenInfo>> {
        self.connected().ok_or(Error::NotInitialized)?.server.screens()
    }

    fn capture_engine(&self) -> Result<Arc<Connected>> {
        self.connected().ok_or_else(|| {
            warn!("Capture requested before the backend was initialized");
            Error::NotInitialized
        })
    }

    /// Captures one frame. Invalid requests fail here and `callback` is
    /// never called; otherwise it is called once from a capture worker.
    pub fn capture_screenshot<F>(&self, config: ScreenshotConfig, format: ScreenshotFormat, callback: F) -> Result<()>
    where
        F: FnOnce(ScreenshotSource) + Send + 'static,
    {
        self.capture_engine()?.capture.capture_screenshot(config, format, callback)
    }

    pub fn capture_video<F>(&self, config: VideoCaptureConfig, format: VideoFormat, callback: F) -> Result<()>
    where
        F: FnOnce(Box<dyn CaptureSource>) + Send + 'static,
    {
        self.capture_engine()?.capture.capture_video(config, format, callback)
    }

    pub fn capture_audio<F>(&self, config: AudioCaptureConfig, format: AudioFormat, callback: F) -> Result<()>
    where
        F: FnOnce(Box<dyn CaptureSource>) + Send + 'static,
    {
        self.capture_engine()?.capture.capture_audio(config, format, callback)
    }

    pub fn stream_video<F>(&self, config: VideoStreamConfig, format: VideoFormat, callback: F) -> Result<()>
    where
        F: FnOnce(Box<dyn CaptureSource>) + Send + 'static,
    {
        self.capture_engine()?.capture.stream_video(config, format, callback)
    }

    pub fn stream_audio<F>(&self, config: AudioStreamConfig, format: AudioFormat, callback: F) -> Result<()>
    where
        F: FnOnce(Box<dyn CaptureSource>) + Send + 'static,
    {
        self.capture_engine()?.capture.stream_audio(config, format, callback)
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.deinit();
    }
}
