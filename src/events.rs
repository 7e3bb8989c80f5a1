//! Domain events published to subscribers

use crate::window::{WindowId, WindowSnapshot, XWindow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WindowCreated,
    WindowClose,
    WindowMove,
    WindowResize,
    WindowRenamed,
    MouseEnter,
    MouseLeave,
    MouseMove,
    MouseDown,
    MouseUp,
    MouseWheel,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::WindowCreated,
        EventKind::WindowClose,
        EventKind::WindowMove,
        EventKind::WindowResize,
        EventKind::WindowRenamed,
        EventKind::MouseEnter,
        EventKind::MouseLeave,
        EventKind::MouseMove,
        EventKind::MouseDown,
        EventKind::MouseUp,
        EventKind::MouseWheel,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Button4,
    Button5,
}

/// Pressed modifier keys at the time of the event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierState {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    /// Windows/Super/Command key
    pub meta: bool,
}

/// Kind-specific payload of an [`Event`]. Pointer coordinates are relative
/// to the event window unless prefixed with `screen_`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDetail {
    WindowCreated,
    WindowClose {
        last_known: WindowSnapshot,
    },
    WindowMove {
        x: i32,
        y: i32,
        delta_x: i32,
        delta_y: i32,
    },
    WindowResize {
        width: u32,
        height: u32,
    },
    WindowRenamed {
        name: String,
    },
    MouseEnter {
        x: i32,
        y: i32,
    },
    MouseLeave {
        x: i32,
        y: i32,
    },
    MouseMove {
        x: i32,
        y: i32,
        delta_x: i32,
        delta_y: i32,
        screen_x: i32,
        screen_y: i32,
    },
    MouseDown {
        x: i32,
        y: i32,
        button: MouseButton,
    },
    MouseUp {
        x: i32,
        y: i32,
        button: MouseButton,
    },
    MouseWheel {
        delta_x: i32,
        delta_y: i32,
        modifiers: ModifierState,
    },
}

impl EventDetail {
    pub fn kind(&self) -> EventKind {
        match self {
            EventDetail::WindowCreated => EventKind::WindowCreated,
            EventDetail::WindowClose { .. } => EventKind::WindowClose,
            EventDetail::WindowMove { .. } => EventKind::WindowMove,
            EventDetail::WindowResize { .. } => EventKind::WindowResize,
            EventDetail::WindowRenamed { .. } => EventKind::WindowRenamed,
            EventDetail::MouseEnter { .. } => EventKind::MouseEnter,
            EventDetail::MouseLeave { .. } => EventKind::MouseLeave,
            EventDetail::MouseMove { .. } => EventKind::MouseMove,
            EventDetail::MouseDown { .. } => EventKind::MouseDown,
            EventDetail::MouseUp { .. } => EventKind::MouseUp,
            EventDetail::MouseWheel { .. } => EventKind::MouseWheel,
        }
    }
}

/// An immutable notification about one window.
///
/// `window` is a back-reference only: it stops resolving once the tracker
/// forgets the window, which is always the case for `WindowClose`.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub window_id: WindowId,
    #[serde(skip)]
    pub window: Weak<XWindow>,
    #[serde(flatten)]
    pub detail: EventDetail,
}

impl Event {
    pub fn new(window: &Arc<XWindow>, detail: EventDetail) -> Self {
        use crate::window::Window;
        Self {
            window_id: window.id(),
            window: Arc::downgrade(window),
            detail,
        }
    }

    /// An event for a window that is no longer (or never was) tracked
    pub fn detached(window_id: WindowId, detail: EventDetail) -> Self {
        Self {
            window_id,
            window: Weak::new(),
            detail,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.detail.kind()
    }

    pub fn window(&self) -> Option<Arc<XWindow>> {
        self.window.upgrade()
    }
}
