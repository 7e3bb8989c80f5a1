//! Regions, windows and the set of windows being tracked

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// X11 window handle
pub type WindowId = u32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

/// A rectangle on screen: a window's bounds or an arbitrary part of a screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn position(&self) -> Position {
        Position {
            x: self.x,
            y: self.y,
        }
    }

    pub fn size(&self) -> Size {
        Size {
            width: self.width,
            height: self.height,
        }
    }

    /// A region can only be captured if it covers at least one pixel
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Anything that behaves like an on-screen window
pub trait Window: Send + Sync {
    fn id(&self) -> WindowId;
    fn name(&self) -> String;
    fn region(&self) -> Region;

    fn position(&self) -> Position {
        self.region().position()
    }

    fn size(&self) -> Size {
        self.region().size()
    }
}

#[derive(Debug, Default)]
struct XWindowState {
    name: String,
    region: Region,
    parent: Option<WindowId>,
    children: Vec<WindowId>,
}

/// A window tracked by the backend.
///
/// Readers get a consistent view through the accessors; only the tracker
/// mutates it.
#[derive(Debug)]
pub struct XWindow {
    id: WindowId,
    state: RwLock<XWindowState>,
}

impl XWindow {
    pub(crate) fn new(id: WindowId, region: Region) -> Self {
        Self {
            id,
            state: RwLock::new(XWindowState {
                region,
                ..Default::default()
            }),
        }
    }

    pub fn parent(&self) -> Option<WindowId> {
        self.state.read().parent
    }

    pub fn children(&self) -> Vec<WindowId> {
        self.state.read().children.clone()
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        let state = self.state.read();
        WindowSnapshot {
            id: self.id,
            name: state.name.clone(),
            region: state.region,
            parent: state.parent,
            children: state.children.clone(),
        }
    }

    pub(crate) fn move_to(&self, x: i32, y: i32) {
        let mut state = self.state.write();
        state.region.x = x;
        state.region.y = y;
    }

    pub(crate) fn resize(&self, width: u32, height: u32) {
        let mut state = self.state.write();
        state.region.width = width;
        state.region.height = height;
    }

    pub(crate) fn set_name(&self, name: String) {
        self.state.write().name = name;
    }

    pub(crate) fn set_parent(&self, parent: Option<WindowId>) {
        self.state.write().parent = parent;
    }

    pub(crate) fn set_children(&self, children: Vec<WindowId>) {
        self.state.write().children = children;
    }

    pub(crate) fn add_child(&self, child: WindowId) {
        let mut state = self.state.write();
        if !state.children.contains(&child) {
            state.children.push(child);
        }
    }

    pub(crate) fn remove_child(&self, child: WindowId) {
        self.state.write().children.retain(|&c| c != child);
    }
}

impl Window for XWindow {
    fn id(&self) -> WindowId {
        self.id
    }

    fn name(&self) -> String {
        self.state.read().name.clone()
    }

    fn region(&self) -> Region {
        self.state.read().region
    }
}

/// Owned copy of a window's state at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub id: WindowId,
    pub name: String,
    pub region: Region,
    pub parent: Option<WindowId>,
    pub children: Vec<WindowId>,
}

impl Window for WindowSnapshot {
    fn id(&self) -> WindowId {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn region(&self) -> Region {
        self.region
    }
}

/// Handle -> window map. Each handle appears at most once; the set owns the
/// windows and hands out `Arc`s only for the duration of a call.
#[derive(Debug, Default)]
pub struct TrackedWindowSet {
    windows: HashMap<WindowId, Arc<XWindow>>,
}

impl TrackedWindowSet {
    pub fn get(&self, id: WindowId) -> Option<&Arc<XWindow>> {
        self.windows.get(&id)
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.windows.contains_key(&id)
    }

    /// Inserts the window unless its handle is already present.
    /// Returns the window stored under the handle afterwards.
    pub fn insert(&mut self, window: XWindow) -> Arc<XWindow> {
        self.windows
            .entry(window.id)
            .or_insert_with(|| Arc::new(window))
            .clone()
    }

    pub fn remove(&mut self, id: WindowId) -> Option<Arc<XWindow>> {
        self.windows.remove(&id)
    }

    pub fn clear(&mut self) {
        self.windows.clear();
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn ids(&self) -> Vec<WindowId> {
        let mut ids: Vec<_> = self.windows.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn windows(&self) -> Vec<Arc<XWindow>> {
        self.windows.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_validity() {
        assert!(Region::new(0, 0, 1, 1).is_valid());
        assert!(!Region::new(10, 10, 0, 20).is_valid());
        assert!(!Region::new(10, 10, 20, 0).is_valid());
    }

    #[test]
    fn test_tracked_set_keeps_first_insert() {
        let mut set = TrackedWindowSet::default();
        let first = set.insert(XWindow::new(0x10, Region::new(0, 0, 100, 100)));
        first.set_name("first".to_string());

        let second = set.insert(XWindow::new(0x10, Region::new(5, 5, 1, 1)));
        assert_eq!(set.len(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.name(), "first");
    }

    #[test]
    fn test_snapshot_outlives_window() {
        let mut set = TrackedWindowSet::default();
        let window = set.insert(XWindow::new(0x20, Region::new(1, 2, 3, 4)));
        window.set_name("term".to_string());
        let weak = Arc::downgrade(&window);
        let snapshot = window.snapshot();
        drop(window);

        set.remove(0x20);
        assert!(weak.upgrade().is_none());
        assert_eq!(snapshot.name, "term");
        assert_eq!(snapshot.region, Region::new(1, 2, 3, 4));
    }

    #[test]
    fn test_children_are_unique() {
        let window = XWindow::new(1, Region::default());
        window.add_child(2);
        window.add_child(2);
        window.add_child(3);
        assert_eq!(window.children(), vec![2, 3]);
        window.remove_child(2);
        assert_eq!(window.children(), vec![3]);
    }
}
