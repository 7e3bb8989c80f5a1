//! Display server abstraction used by discovery, the tracker and the event loop

use crate::capture::PixelGrabber;
use crate::config::BackendConfig;
use crate::error::Result;
use crate::events::ModifierState;
use crate::window::{Region, WindowId};
use serde::Serialize;
use std::sync::Arc;

/// The "no window" handle
pub const NONE: WindowId = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScreenInfo {
    pub index: usize,
    pub root: WindowId,
    pub width: u32,
    pub height: u32,
    /// Active monitors in root coordinates; the whole screen when the server
    /// reports none
    pub monitors: Vec<Region>,
}

/// Everything the tracker needs to start following a window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowInfo {
    pub name: String,
    pub region: Region,
    pub parent: Option<WindowId>,
    pub children: Vec<WindowId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerPosition {
    /// Child of the queried root under the pointer, if any
    pub child: Option<WindowId>,
    pub win_x: i32,
    pub win_y: i32,
    pub root_x: i32,
    pub root_y: i32,
}

/// Wire events after classification. Anything not listed here is dropped by
/// the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    Enter {
        window: WindowId,
        x: i32,
        y: i32,
    },
    Leave {
        window: WindowId,
        x: i32,
        y: i32,
    },
    Create {
        window: WindowId,
        parent: WindowId,
    },
    Destroy {
        window: WindowId,
    },
    Configure {
        window: WindowId,
        region: Region,
    },
    TitleChanged {
        window: WindowId,
    },
    Motion {
        window: WindowId,
        x: i32,
        y: i32,
        root_x: i32,
        root_y: i32,
    },
    ButtonPress {
        window: WindowId,
        x: i32,
        y: i32,
        button: u8,
        modifiers: ModifierState,
    },
    ButtonRelease {
        window: WindowId,
        x: i32,
        y: i32,
        button: u8,
        modifiers: ModifierState,
    },
}

/// A connected display server.
///
/// All calls are blocking round-trips unless noted otherwise.
pub trait DisplayServer: Send + Sync {
    fn screens(&self) -> Result<Vec<ScreenInfo>>;

    /// Root window of every screen
    fn roots(&self) -> Vec<WindowId>;

    /// Virtual roots advertised by the window manager for a screen root
    fn virtual_roots(&self, root: WindowId) -> Result<Vec<WindowId>>;

    fn children(&self, window: WindowId) -> Result<Vec<WindowId>>;

    fn window_info(&self, window: WindowId) -> Result<WindowInfo>;

    fn window_name(&self, window: WindowId) -> Result<String>;

    /// Whether the window manager classifies the window as a normal
    /// top-level application window
    fn is_normal_window(&self, window: WindowId) -> Result<bool>;

    /// Selects substructure notifications on a root. Checked.
    fn arm_root(&self, root: WindowId) -> Result<()>;

    /// Selects pointer, property and structure notifications on a window.
    /// Unchecked: errors for vanished windows arrive later as wire errors.
    fn arm_window(&self, window: WindowId) -> Result<()>;

    /// Next classified event, without blocking
    fn poll_event(&self) -> Result<Option<WireEvent>>;

    fn query_pointer(&self, root: WindowId) -> Result<Option<PointerPosition>>;

    /// Round-trip so every request sent so far has been processed
    fn sync(&self) -> Result<()>;
}

/// A live connection: the server view plus the pixel source sharing it
pub struct Session {
    pub server: Arc<dyn DisplayServer>,
    pub grabber: Arc<dyn PixelGrabber>,
}

/// Opens sessions. `Backend::init` goes through this so tests can swap the
/// transport.
pub trait Connector: Send + Sync {
    fn connect(&self, config: &BackendConfig) -> Result<Session>;
}
