//! X11 connection and EWMH hints

use super::{display, events};
use crate::error::{Error, Result};
use crate::server::{DisplayServer, PointerPosition, ScreenInfo, WindowInfo, WireEvent};
use crate::window::{Region, WindowId};
use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::errors::ConnectError;
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ChangeWindowAttributesAux, ConnectionExt, EventMask, GetPropertyReply,
    Window,
};
use x11rb::rust_connection::RustConnection;

// EWMH atoms, interned once at connect time
x11rb::atom_manager! {
    pub Hints: HintsCookie {
        _NET_SUPPORTED,
        _NET_WM_NAME,
        _NET_WM_VISIBLE_NAME,
        _NET_VIRTUAL_ROOTS,
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_NORMAL,
        UTF8_STRING,
    }
}

const ROOT_EVENTS: EventMask = EventMask::SUBSTRUCTURE_NOTIFY;

fn window_events() -> EventMask {
    EventMask::ENTER_WINDOW
        | EventMask::LEAVE_WINDOW
        | EventMask::POINTER_MOTION
        | EventMask::EXPOSURE
        | EventMask::PROPERTY_CHANGE
        | EventMask::STRUCTURE_NOTIFY
        | EventMask::SUBSTRUCTURE_NOTIFY
}

pub struct X11Connection {
    conn: RustConnection,
    screen_num: usize,
    hints: Hints,
}

impl X11Connection {
    /// Connects to `display` (or `$DISPLAY`) and interns the hint atoms
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = RustConnection::connect(display)?;
        if conn.setup().roots.get(screen_num).is_none() {
            return Err(ConnectError::InvalidScreen.into());
        }
        let hints = Hints::new(&conn)
            .map_err(|e| Error::Hints(e.to_string()))?
            .reply()
            .map_err(|e| Error::Hints(e.to_string()))?;
        let display_name = display.unwrap_or("$DISPLAY");
        info!(
            "Connected to X11 display {} (screen {} of {})",
            display_name,
            screen_num,
            conn.setup().roots.len()
        );
        Ok(Self {
            conn,
            screen_num,
            hints,
        })
    }

    pub fn conn(&self) -> &RustConnection {
        &self.conn
    }

    pub fn default_root(&self) -> Window {
        self.conn.setup().roots[self.screen_num].root
    }

    fn property(&self, window: Window, property: Atom, type_: impl Into<Atom>) -> Result<Option<GetPropertyReply>> {
        let reply = self
            .conn
            .get_property(false, window, property, type_, 0, u32::MAX)?
            .reply()?;
        if reply.value.is_empty() {
            Ok(None)
        } else {
            Ok(Some(reply))
        }
    }

    fn text_property(&self, window: Window, property: Atom, type_: impl Into<Atom>) -> Result<Option<String>> {
        Ok(self
            .property(window, property, type_)?
            .map(|reply| String::from_utf8_lossy(&reply.value).into_owned())
            .filter(|name| !name.is_empty()))
    }

    fn query_error(window: WindowId, e: impl std::fmt::Display) -> Error {
        Error::WindowQuery {
            window,
            reason: e.to_string(),
        }
    }
}

impl DisplayServer for X11Connection {
    fn screens(&self) -> Result<Vec<ScreenInfo>> {
        Ok(self
            .conn
            .setup()
            .roots
            .iter()
            .enumerate()
            .map(|(index, screen)| ScreenInfo {
                index,
                root: screen.root,
                width: screen.width_in_pixels.into(),
                height: screen.height_in_pixels.into(),
                monitors: display::monitors(&self.conn, screen),
            })
            .collect())
    }

    fn roots(&self) -> Vec<WindowId> {
        self.conn.setup().roots.iter().map(|s| s.root).collect()
    }

    fn virtual_roots(&self, root: WindowId) -> Result<Vec<WindowId>> {
        let reply = self.property(root, self.hints._NET_VIRTUAL_ROOTS, AtomEnum::WINDOW)?;
        Ok(reply
            .and_then(|reply| reply.value32().map(|ids| ids.collect()))
            .unwrap_or_default())
    }

    fn children(&self, window: WindowId) -> Result<Vec<WindowId>> {
        let tree = self
            .conn
            .query_tree(window)?
            .reply()
            .map_err(|e| Self::query_error(window, e))?;
        Ok(tree.children)
    }

    fn window_info(&self, window: WindowId) -> Result<WindowInfo> {
        let geometry = self.conn.get_geometry(window)?;
        let tree = self.conn.query_tree(window)?;
        let geometry = geometry.reply().map_err(|e| Self::query_error(window, e))?;
        let tree = tree.reply().map_err(|e| Self::query_error(window, e))?;
        Ok(WindowInfo {
            name: self.window_name(window)?,
            region: Region::new(
                geometry.x.into(),
                geometry.y.into(),
                geometry.width.into(),
                geometry.height.into(),
            ),
            parent: (tree.parent != x11rb::NONE).then_some(tree.parent),
            children: tree.children,
        })
    }

    /// Tries `_NET_WM_NAME`, then `_NET_WM_VISIBLE_NAME`, then `WM_NAME`
    fn window_name(&self, window: WindowId) -> Result<String> {
        let utf8 = self.hints.UTF8_STRING;
        for property in [self.hints._NET_WM_NAME, self.hints._NET_WM_VISIBLE_NAME] {
            if let Some(name) = self
                .text_property(window, property, utf8)
                .map_err(|e| Self::query_error(window, e))?
            {
                return Ok(name);
            }
        }
        Ok(self
            .text_property(window, AtomEnum::WM_NAME.into(), AtomEnum::ANY)
            .map_err(|e| Self::query_error(window, e))?
            .unwrap_or_default())
    }

    fn is_normal_window(&self, window: WindowId) -> Result<bool> {
        let reply = self
            .property(window, self.hints._NET_WM_WINDOW_TYPE, AtomEnum::ATOM)
            .map_err(|e| Self::query_error(window, e))?;
        let first = reply.and_then(|reply| reply.value32().and_then(|mut types| types.next()));
        Ok(first == Some(self.hints._NET_WM_WINDOW_TYPE_NORMAL))
    }

    fn arm_root(&self, root: WindowId) -> Result<()> {
        self.conn
            .change_window_attributes(root, &ChangeWindowAttributesAux::new().event_mask(ROOT_EVENTS))?
            .check()?;
        debug!("Selected substructure events on root {:#x}", root);
        Ok(())
    }

    fn arm_window(&self, window: WindowId) -> Result<()> {
        // not checked: errors for windows that are already gone show up in
        // the event stream
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().event_mask(window_events()),
        )?;
        Ok(())
    }

    fn poll_event(&self) -> Result<Option<WireEvent>> {
        self.conn.flush()?;
        while let Some(event) = self.conn.poll_for_event()? {
            if let Some(event) = events::classify(event, self.hints._NET_WM_NAME) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    fn query_pointer(&self, root: WindowId) -> Result<Option<PointerPosition>> {
        let reply = self.conn.query_pointer(root)?.reply()?;
        if !reply.same_screen {
            return Ok(None);
        }
        Ok(Some(PointerPosition {
            child: (reply.child != x11rb::NONE).then_some(reply.child),
            win_x: reply.win_x.into(),
            win_y: reply.win_y.into(),
            root_x: reply.root_x.into(),
            root_y: reply.root_y.into(),
        }))
    }

    fn sync(&self) -> Result<()> {
        self.conn.get_input_focus()?.reply()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_display_name_refused() {
        let result = X11Connection::connect(Some("no-colon-here"));
        assert!(matches!(result, Err(Error::Connect(_))));
    }
}
