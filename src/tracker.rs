//! Tracked windows and pointer state
//!
//! The tracker turns classified wire events into domain events. All state
//! changes happen under one lock; the resulting events are handed to the
//! publisher while it is held, so delivery order matches detection order.

use crate::events::{Event, EventDetail, EventKind, ModifierState, MouseButton};
use crate::publisher::Publisher;
use crate::registry::Registry;
use crate::server::{DisplayServer, NONE};
use crate::window::{Region, TrackedWindowSet, Window, WindowId, XWindow};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Default)]
struct TrackerState {
    windows: TrackedWindowSet,
    roots: Vec<WindowId>,
    /// Window the pointer is currently in
    current: Option<WindowId>,
    /// Last pointer position in root coordinates
    pointer: Option<(i32, i32)>,
}

pub struct WindowTracker {
    server: Arc<dyn DisplayServer>,
    registry: Arc<Registry>,
    publisher: Arc<Publisher>,
    state: Mutex<TrackerState>,
}

impl WindowTracker {
    pub fn new(
        server: Arc<dyn DisplayServer>,
        registry: Arc<Registry>,
        publisher: Arc<Publisher>,
    ) -> Self {
        Self {
            server,
            registry,
            publisher,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Records a root. Returns false if it was already known.
    pub fn add_root(&self, root: WindowId) -> bool {
        let mut state = self.state.lock();
        if state.roots.contains(&root) {
            return false;
        }
        state.roots.push(root);
        true
    }

    pub fn roots(&self) -> Vec<WindowId> {
        self.state.lock().roots.clone()
    }

    /// Starts tracking `id` if it is not tracked yet
    pub fn watch(&self, id: WindowId) -> Option<Arc<XWindow>> {
        let mut state = self.state.lock();
        self.watch_locked(&mut state, id)
    }

    pub fn is_watched(&self, id: WindowId) -> bool {
        self.state.lock().windows.contains(id)
    }

    pub fn window(&self, id: WindowId) -> Option<Arc<XWindow>> {
        self.state.lock().windows.get(id).cloned()
    }

    pub fn tracked(&self) -> Vec<Arc<XWindow>> {
        self.state.lock().windows.windows()
    }

    pub fn tracked_ids(&self) -> Vec<WindowId> {
        self.state.lock().windows.ids()
    }

    pub fn current_window(&self) -> Option<WindowId> {
        self.state.lock().current
    }

    /// Forgets every tracked window, root and the pointer state
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.windows.clear();
        state.roots.clear();
        state.current = None;
        state.pointer = None;
    }

    pub fn on_mouse_enter(&self, id: WindowId, x: i32, y: i32) {
        if id == NONE {
            return;
        }
        let mut state = self.state.lock();
        if let Some(current) = state.current {
            debug!("Pointer entered {:#x} while still in {:#x}", id, current);
            return;
        }
        state.current = Some(id);
        debug!("Pointer entered {:#x}", id);

        if self.interested(EventKind::MouseEnter) {
            if let Some(window) = self.watch_locked(&mut state, id) {
                self.emit(&window, EventDetail::MouseEnter { x, y });
            }
        }
    }

    pub fn on_mouse_leave(&self, id: WindowId, x: i32, y: i32) {
        let mut state = self.state.lock();
        if state.current != Some(id) {
            return;
        }
        state.current = None;
        debug!("Pointer left {:#x}", id);

        if self.interested(EventKind::MouseLeave) {
            if let Some(window) = self.watch_locked(&mut state, id) {
                self.emit(&window, EventDetail::MouseLeave { x, y });
            }
        }
    }

    pub fn on_mouse_move(&self, id: WindowId, x: i32, y: i32, screen_x: i32, screen_y: i32) {
        let mut state = self.state.lock();
        let (delta_x, delta_y) = state
            .pointer
            .map_or((0, 0), |(px, py)| (screen_x - px, screen_y - py));
        state.pointer = Some((screen_x, screen_y));

        if self.interested(EventKind::MouseMove) {
            if let Some(window) = self.watch_locked(&mut state, id) {
                self.emit(
                    &window,
                    EventDetail::MouseMove {
                        x,
                        y,
                        delta_x,
                        delta_y,
                        screen_x,
                        screen_y,
                    },
                );
            }
        }
    }

    pub fn on_button_press(&self, id: WindowId, x: i32, y: i32, button: u8, modifiers: ModifierState) {
        self.on_button(id, button_detail(button, x, y, true, modifiers));
    }

    pub fn on_button_release(&self, id: WindowId, x: i32, y: i32, button: u8, modifiers: ModifierState) {
        self.on_button(id, button_detail(button, x, y, false, modifiers));
    }

    fn on_button(&self, id: WindowId, detail: Option<EventDetail>) {
        let Some(detail) = detail else {
            return;
        };
        if !self.interested(detail.kind()) {
            return;
        }
        let mut state = self.state.lock();
        if let Some(window) = self.watch_locked(&mut state, id) {
            self.emit(&window, detail);
        }
    }

    /// Only top-level windows (children of a root) are considered
    pub fn on_window_created(&self, id: WindowId, parent: WindowId) {
        let mut state = self.state.lock();
        if !state.roots.contains(&parent) {
            return;
        }
        if let Err(e) = self.server.arm_window(id) {
            warn!("Failed to select events on new window {:#x}: {}", id, e);
        }
        match self.server.is_normal_window(id) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                debug!("Window {:#x} vanished before it could be classified: {}", id, e);
                return;
            }
        }
        info!("Window created: {:#x}", id);
        if let Some(window) = self.watch_locked(&mut state, id) {
            self.emit(&window, EventDetail::WindowCreated);
        }
    }

    /// The window is untracked before WindowClose goes out, so subscribers
    /// only see its last known state
    pub fn on_window_destroyed(&self, id: WindowId) {
        let mut state = self.state.lock();
        if state.current == Some(id) {
            state.current = None;
        }
        let Some(window) = state.windows.remove(id) else {
            return;
        };
        if let Some(parent) = window.parent().and_then(|p| state.windows.get(p)) {
            parent.remove_child(id);
        }
        info!("Window removed: {:#x} ({} still tracked)", id, state.windows.len());

        let last_known = window.snapshot();
        drop(window);
        let callbacks = self.registry.snapshot(EventKind::WindowClose);
        if !callbacks.is_empty() {
            self.publisher
                .publish(Event::detached(id, EventDetail::WindowClose { last_known }), callbacks);
        }
    }

    /// Diffs `region` against the last known geometry. A change of position
    /// is published before a change of size.
    pub fn on_configure(&self, id: WindowId, region: Region) {
        let mut state = self.state.lock();
        let window = match state.windows.get(id) {
            Some(window) => Arc::clone(window),
            None => {
                if !self.interested(EventKind::WindowMove) && !self.interested(EventKind::WindowResize) {
                    return;
                }
                match self.watch_locked(&mut state, id) {
                    Some(window) => window,
                    None => return,
                }
            }
        };

        let old = window.region();
        if old.position() != region.position() {
            window.move_to(region.x, region.y);
            debug!("Window {:#x} moved to {},{}", id, region.x, region.y);
            self.emit(
                &window,
                EventDetail::WindowMove {
                    x: region.x,
                    y: region.y,
                    delta_x: region.x - old.x,
                    delta_y: region.y - old.y,
                },
            );
        }
        if old.size() != region.size() {
            window.resize(region.width, region.height);
            debug!("Window {:#x} resized to {}x{}", id, region.width, region.height);
            self.emit(
                &window,
                EventDetail::WindowResize {
                    width: region.width,
                    height: region.height,
                },
            );
        }
    }

    /// `name` is resolved from the server when not supplied
    pub fn on_window_renamed(&self, id: WindowId, name: Option<String>) {
        let mut state = self.state.lock();
        let window = match state.windows.get(id) {
            Some(window) => Arc::clone(window),
            None => {
                if !self.interested(EventKind::WindowRenamed) {
                    return;
                }
                // freshly watched windows already carry the new title
                if let Some(window) = self.watch_locked(&mut state, id) {
                    let name = window.name();
                    self.emit(&window, EventDetail::WindowRenamed { name });
                }
                return;
            }
        };

        let name = match name {
            Some(name) => name,
            None => match self.server.window_name(id) {
                Ok(name) => name,
                Err(e) => {
                    warn!("Failed to read title of {:#x}: {}", id, e);
                    return;
                }
            },
        };
        if window.name() == name {
            return;
        }
        info!("Window {:#x} renamed to {:?}", id, name);
        window.set_name(name.clone());
        self.emit(&window, EventDetail::WindowRenamed { name });
    }

    fn watch_locked(&self, state: &mut TrackerState, id: WindowId) -> Option<Arc<XWindow>> {
        if id == NONE {
            return None;
        }
        if let Some(window) = state.windows.get(id) {
            return Some(Arc::clone(window));
        }
        let info = match self.server.window_info(id) {
            Ok(info) => info,
            Err(e) => {
                warn!("Not watching window {:#x}: {}", id, e);
                return None;
            }
        };
        for &child in &info.children {
            if let Err(e) = self.server.arm_window(child) {
                debug!("Failed to select events on child {:#x}: {}", child, e);
            }
        }

        let parent = info.parent;
        let window = XWindow::new(id, info.region);
        window.set_name(info.name);
        window.set_parent(parent);
        window.set_children(info.children);
        if let Some(parent) = parent.and_then(|p| state.windows.get(p)) {
            parent.add_child(id);
        }
        let window = state.windows.insert(window);
        info!("Watching window {:#x} {:?}", id, window.name());
        Some(window)
    }

    fn interested(&self, kind: EventKind) -> bool {
        self.registry.has_subscribers(kind)
    }

    fn emit(&self, window: &Arc<XWindow>, detail: EventDetail) {
        let callbacks = self.registry.snapshot(detail.kind());
        if callbacks.is_empty() {
            return;
        }
        self.publisher.publish(Event::new(window, detail), callbacks);
    }
}

/// Core protocol buttons: 1-3 are left/middle/right, 4/5 scroll vertically,
/// 6/7 horizontally, 8/9 are the side buttons. Scrolling only produces an
/// event on press.
fn button_detail(button: u8, x: i32, y: i32, pressed: bool, modifiers: ModifierState) -> Option<EventDetail> {
    let button = match button {
        1 => MouseButton::Left,
        2 => MouseButton::Middle,
        3 => MouseButton::Right,
        8 => MouseButton::Button4,
        9 => MouseButton::Button5,
        4..=7 => {
            if !pressed {
                return None;
            }
            let (delta_x, delta_y) = match button {
                4 => (0, 1),
                5 => (0, -1),
                6 => (-1, 0),
                _ => (1, 0),
            };
            return Some(EventDetail::MouseWheel {
                delta_x,
                delta_y,
                modifiers,
            });
        }
        other => {
            debug!("Ignoring pointer button {}", other);
            return None;
        }
    };
    Some(if pressed {
        EventDetail::MouseDown { x, y, button }
    } else {
        EventDetail::MouseUp { x, y, button }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationHandle;
    use crate::publisher::PublishStrategy;
    use crate::testing::FakeServer;
    use std::time::Duration;

    const ROOT: WindowId = 0x1;
    const TERM: WindowId = 0x100;
    const EDITOR: WindowId = 0x200;

    struct Harness {
        server: Arc<FakeServer>,
        registry: Arc<Registry>,
        publisher: Arc<Publisher>,
        tracker: WindowTracker,
    }

    impl Harness {
        fn new() -> Self {
            let server = FakeServer::new();
            server.add_root(ROOT, 1920, 1080);
            server.add_window(TERM, ROOT, "term", Region::new(10, 20, 300, 200), true);
            server.add_window(EDITOR, ROOT, "editor", Region::new(400, 0, 800, 600), true);
            let registry = Registry::new();
            let publisher = Arc::new(Publisher::new(PublishStrategy::Queued, Duration::from_secs(5)));
            let tracker = WindowTracker::new(server.clone(), registry.clone(), publisher.clone());
            tracker.add_root(ROOT);
            Self {
                server,
                registry,
                publisher,
                tracker,
            }
        }

        fn record(&self, kind: EventKind) -> (CancellationHandle, Arc<Mutex<Vec<Event>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let s = Arc::clone(&seen);
            let handle = self.registry.register(
                kind,
                Arc::new(move |event: &Event| s.lock().push(event.clone())),
            );
            (handle, seen)
        }

        /// Waits until everything published so far was delivered
        fn flush(&self) {
            self.publisher.shutdown();
        }
    }

    fn details(seen: &Mutex<Vec<Event>>) -> Vec<EventDetail> {
        seen.lock().iter().map(|e| e.detail.clone()).collect()
    }

    #[test]
    fn test_configure_resize_only() {
        let h = Harness::new();
        let (_moves, moves) = h.record(EventKind::WindowMove);
        let (_resizes, resizes) = h.record(EventKind::WindowResize);
        h.tracker.watch(TERM);

        h.tracker.on_configure(TERM, Region::new(10, 20, 640, 480));
        h.flush();

        assert!(moves.lock().is_empty());
        assert_eq!(
            details(&resizes),
            vec![EventDetail::WindowResize {
                width: 640,
                height: 480
            }]
        );
    }

    #[test]
    fn test_configure_move_only() {
        let h = Harness::new();
        let (_moves, moves) = h.record(EventKind::WindowMove);
        let (_resizes, resizes) = h.record(EventKind::WindowResize);
        h.tracker.watch(TERM);

        h.tracker.on_configure(TERM, Region::new(15, 10, 300, 200));
        h.flush();

        assert!(resizes.lock().is_empty());
        assert_eq!(
            details(&moves),
            vec![EventDetail::WindowMove {
                x: 15,
                y: 10,
                delta_x: 5,
                delta_y: -10
            }]
        );
    }

    #[test]
    fn test_configure_both_publishes_move_then_resize() {
        let h = Harness::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for kind in [EventKind::WindowMove, EventKind::WindowResize] {
            let o = Arc::clone(&order);
            handles.push(
                h.registry
                    .register(kind, Arc::new(move |event: &Event| o.lock().push(event.kind()))),
            );
        }
        h.tracker.watch(TERM);

        h.tracker.on_configure(TERM, Region::new(0, 0, 1, 1));
        h.flush();

        assert_eq!(*order.lock(), vec![EventKind::WindowMove, EventKind::WindowResize]);
        let window = h.tracker.window(TERM).unwrap();
        assert_eq!(window.region(), Region::new(0, 0, 1, 1));
    }

    #[test]
    fn test_configure_without_subscribers_still_updates_geometry() {
        let h = Harness::new();
        h.tracker.watch(TERM);
        h.tracker.on_configure(TERM, Region::new(1, 2, 3, 4));
        assert_eq!(h.tracker.window(TERM).unwrap().region(), Region::new(1, 2, 3, 4));
        assert!(!h.publisher.is_running());
    }

    #[test]
    fn test_configure_untracked_without_interest_is_ignored() {
        let h = Harness::new();
        h.tracker.on_configure(EDITOR, Region::new(1, 2, 3, 4));
        assert!(!h.tracker.is_watched(EDITOR));

        let (_moves, _) = h.record(EventKind::WindowMove);
        h.tracker.on_configure(EDITOR, Region::new(1, 2, 3, 4));
        assert!(h.tracker.is_watched(EDITOR));
    }

    #[test]
    fn test_enter_while_current_is_noop() {
        let h = Harness::new();
        let (_enters, enters) = h.record(EventKind::MouseEnter);

        h.tracker.on_mouse_enter(TERM, 5, 5);
        h.tracker.on_mouse_enter(EDITOR, 7, 7);
        h.flush();

        assert_eq!(h.tracker.current_window(), Some(TERM));
        assert_eq!(enters.lock().len(), 1);
        assert_eq!(enters.lock()[0].window_id, TERM);
        assert!(!h.tracker.is_watched(EDITOR));
    }

    #[test]
    fn test_leave_of_non_current_is_noop() {
        let h = Harness::new();
        let (_leaves, leaves) = h.record(EventKind::MouseLeave);

        h.tracker.on_mouse_enter(TERM, 5, 5);
        h.tracker.on_mouse_leave(EDITOR, 0, 0);
        assert_eq!(h.tracker.current_window(), Some(TERM));

        h.tracker.on_mouse_leave(TERM, 0, 0);
        h.flush();
        assert_eq!(h.tracker.current_window(), None);
        assert_eq!(details(&leaves), vec![EventDetail::MouseLeave { x: 0, y: 0 }]);
    }

    #[test]
    fn test_destroy_publishes_last_known_state() {
        let h = Harness::new();
        let (_closes, closes) = h.record(EventKind::WindowClose);
        h.tracker.watch(TERM);
        h.tracker.watch(EDITOR);
        h.tracker.on_mouse_enter(TERM, 1, 1);

        h.tracker.on_window_destroyed(TERM);
        h.flush();

        assert_eq!(h.tracker.tracked_ids(), vec![EDITOR]);
        assert_eq!(h.tracker.current_window(), None);
        let closes = closes.lock();
        assert_eq!(closes.len(), 1);
        assert!(closes[0].window().is_none());
        match &closes[0].detail {
            EventDetail::WindowClose { last_known } => {
                assert_eq!(last_known.name, "term");
                assert_eq!(last_known.region, Region::new(10, 20, 300, 200));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_destroy_of_untracked_window_is_silent() {
        let h = Harness::new();
        let (_closes, closes) = h.record(EventKind::WindowClose);
        h.tracker.on_window_destroyed(0xdead);
        h.flush();
        assert!(closes.lock().is_empty());
    }

    #[test]
    fn test_created_under_root_is_watched_and_published() {
        let h = Harness::new();
        let (_created, created) = h.record(EventKind::WindowCreated);
        h.server.add_window(0x300, ROOT, "new", Region::new(0, 0, 50, 50), true);
        h.server.add_window(0x301, TERM, "popup", Region::new(0, 0, 5, 5), true);

        h.tracker.on_window_created(0x300, ROOT);
        h.tracker.on_window_created(0x301, TERM);
        h.flush();

        assert!(h.tracker.is_watched(0x300));
        assert!(!h.tracker.is_watched(0x301));
        assert!(h.server.armed_windows().contains(&0x300));
        assert_eq!(created.lock().len(), 1);
    }

    #[test]
    fn test_rename_resolves_title() {
        let h = Harness::new();
        let (_renames, renames) = h.record(EventKind::WindowRenamed);
        h.tracker.watch(TERM);

        h.server.set_name(TERM, "vim");
        h.tracker.on_window_renamed(TERM, None);
        // same title again is not a rename
        h.tracker.on_window_renamed(TERM, None);
        h.flush();

        assert_eq!(h.tracker.window(TERM).unwrap().name(), "vim");
        assert_eq!(
            details(&renames),
            vec![EventDetail::WindowRenamed {
                name: "vim".to_string()
            }]
        );
    }

    #[test]
    fn test_buttons_and_wheel() {
        let h = Harness::new();
        let (_down, down) = h.record(EventKind::MouseDown);
        let (_wheel, wheel) = h.record(EventKind::MouseWheel);
        let modifiers = ModifierState {
            ctrl: true,
            ..Default::default()
        };

        h.tracker.on_button_press(TERM, 3, 4, 1, ModifierState::default());
        h.tracker.on_button_press(TERM, 3, 4, 5, modifiers);
        h.tracker.on_button_release(TERM, 3, 4, 5, modifiers);
        h.flush();

        assert_eq!(
            details(&down),
            vec![EventDetail::MouseDown {
                x: 3,
                y: 4,
                button: MouseButton::Left
            }]
        );
        assert_eq!(
            details(&wheel),
            vec![EventDetail::MouseWheel {
                delta_x: 0,
                delta_y: -1,
                modifiers
            }]
        );
    }

    #[test]
    fn test_motion_deltas_follow_pointer() {
        let h = Harness::new();
        let (_moves, moves) = h.record(EventKind::MouseMove);
        h.tracker.on_mouse_move(TERM, 1, 1, 11, 21);
        h.tracker.on_mouse_move(TERM, 4, 0, 14, 20);
        h.flush();

        let seen = details(&moves);
        assert_eq!(seen.len(), 2);
        assert!(matches!(
            seen[1],
            EventDetail::MouseMove {
                delta_x: 3,
                delta_y: -1,
                screen_x: 14,
                screen_y: 20,
                ..
            }
        ));
    }

    #[test]
    fn test_watch_links_child_to_tracked_parent() {
        let h = Harness::new();
        h.server.add_window(0x101, TERM, "pane", Region::new(0, 0, 10, 10), false);
        h.tracker.watch(TERM);
        let child = h.tracker.watch(0x101).unwrap();

        assert_eq!(child.parent(), Some(TERM));
        assert!(h.tracker.window(TERM).unwrap().children().contains(&0x101));
        assert!(h.server.armed_windows().contains(&0x101));

        h.tracker.on_window_destroyed(0x101);
        assert!(!h.tracker.window(TERM).unwrap().children().contains(&0x101));
    }

    #[test]
    fn test_clear_forgets_everything() {
        let h = Harness::new();
        h.tracker.watch(TERM);
        h.tracker.on_mouse_enter(TERM, 0, 0);
        h.tracker.clear();
        assert!(h.tracker.tracked_ids().is_empty());
        assert!(h.tracker.roots().is_empty());
        assert_eq!(h.tracker.current_window(), None);
    }
}
