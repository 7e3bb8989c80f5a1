//! Background polling of the display server's event queue

use crate::error::Result;
use crate::server::{DisplayServer, WireEvent};
use crate::tracker::WindowTracker;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

pub struct EventLoop {
    poll_interval: Duration,
    running: Arc<AtomicBool>,
    /// Held for the whole of start/stop, so the two never interleave
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EventLoop {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Spawns the loop thread unless it is already running
    pub fn start(&self, server: Arc<dyn DisplayServer>, tracker: Arc<WindowTracker>) -> Result<()> {
        let mut handle = self.handle.lock();
        if let Some(existing) = handle.take() {
            if !existing.is_finished() {
                debug!("Event loop already running");
                *handle = Some(existing);
                return Ok(());
            }
            // ended on its own after a transport error
            let _ = existing.join();
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let interval = self.poll_interval;
        let spawned = thread::Builder::new()
            .name("winshot-events".into())
            .spawn(move || run(server.as_ref(), &tracker, &running, interval));
        match spawned {
            Ok(thread) => {
                *handle = Some(thread);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Blocks until the current cycle has finished, then forgets all tracked
    /// state. Safe to call repeatedly.
    pub fn stop(&self, tracker: &WindowTracker) {
        let mut handle = self.handle.lock();
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = handle.take() {
            if thread.join().is_err() {
                error!("Event loop thread panicked");
            }
            info!("Event loop stopped");
        }
        tracker.clear();
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.handle.get_mut().take() {
            let _ = thread.join();
        }
    }
}

fn run(server: &dyn DisplayServer, tracker: &WindowTracker, running: &AtomicBool, interval: Duration) {
    info!("Event loop started");
    if let Err(e) = server.sync() {
        error!("Failed to sync with display server: {}", e);
        running.store(false, Ordering::SeqCst);
        return;
    }
    enter_pointer_window(server, tracker);

    while running.load(Ordering::SeqCst) {
        while running.load(Ordering::SeqCst) {
            match server.poll_event() {
                Ok(Some(event)) => dispatch(tracker, event),
                Ok(None) => break,
                Err(e) => {
                    error!("Lost connection to display server: {}", e);
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            }
        }
        thread::sleep(interval);
    }
}

/// The pointer may already be inside a window before any enter event
fn enter_pointer_window(server: &dyn DisplayServer, tracker: &WindowTracker) {
    for root in tracker.roots() {
        match server.query_pointer(root) {
            Ok(Some(pointer)) => {
                if let Some(child) = pointer.child {
                    tracker.on_mouse_enter(child, pointer.win_x, pointer.win_y);
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => debug!("Pointer query on {:#x} failed: {}", root, e),
        }
    }
}

pub fn dispatch(tracker: &WindowTracker, event: WireEvent) {
    match event {
        WireEvent::Enter { window, x, y } => tracker.on_mouse_enter(window, x, y),
        WireEvent::Leave { window, x, y } => tracker.on_mouse_leave(window, x, y),
        WireEvent::Create { window, parent } => tracker.on_window_created(window, parent),
        WireEvent::Destroy { window } => tracker.on_window_destroyed(window),
        WireEvent::Configure { window, region } => tracker.on_configure(window, region),
        WireEvent::TitleChanged { window } => tracker.on_window_renamed(window, None),
        WireEvent::Motion {
            window,
            x,
            y,
            root_x,
            root_y,
        } => tracker.on_mouse_move(window, x, y, root_x, root_y),
        WireEvent::ButtonPress {
            window,
            x,
            y,
            button,
            modifiers,
        } => tracker.on_button_press(window, x, y, button, modifiers),
        WireEvent::ButtonRelease {
            window,
            x,
            y,
            button,
            modifiers,
        } => tracker.on_button_release(window, x, y, button, modifiers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::{PublishStrategy, Publisher};
    use crate::registry::Registry;
    use crate::server::PointerPosition;
    use crate::testing::{wait_for, FakeServer};
    use crate::window::{Region, Window, WindowId};

    const ROOT: WindowId = 0x1;
    const TERM: WindowId = 0x100;

    fn setup() -> (Arc<FakeServer>, Arc<WindowTracker>, EventLoop) {
        let server = FakeServer::new();
        server.add_root(ROOT, 1920, 1080);
        server.add_window(TERM, ROOT, "term", Region::new(0, 0, 100, 100), true);
        let publisher = Arc::new(Publisher::new(PublishStrategy::Queued, Duration::from_secs(5)));
        let tracker = Arc::new(WindowTracker::new(server.clone(), Registry::new(), publisher));
        tracker.add_root(ROOT);
        tracker.watch(TERM);
        (server, tracker, EventLoop::new(Duration::from_millis(5)))
    }

    #[test]
    fn test_events_are_dispatched() {
        let (server, tracker, event_loop) = setup();
        server.push_event(WireEvent::Configure {
            window: TERM,
            region: Region::new(50, 60, 100, 100),
        });
        event_loop.start(server.clone(), tracker.clone()).unwrap();

        assert!(wait_for(|| server.pending_events() == 0));
        assert!(wait_for(|| {
            tracker
                .window(TERM)
                .is_some_and(|w| w.region() == Region::new(50, 60, 100, 100))
        }));
        event_loop.stop(&tracker);
    }

    #[test]
    fn test_stop_is_idempotent_and_clears_tracker() {
        let (server, tracker, event_loop) = setup();
        event_loop.start(server.clone(), tracker.clone()).unwrap();
        event_loop.start(server.clone(), tracker.clone()).unwrap();
        assert!(event_loop.is_running());

        event_loop.stop(&tracker);
        event_loop.stop(&tracker);
        assert!(!event_loop.is_running());
        assert!(tracker.tracked_ids().is_empty());
        assert!(tracker.roots().is_empty());
    }

    #[test]
    fn test_initial_pointer_window_becomes_current() {
        let (server, tracker, event_loop) = setup();
        server.set_pointer(
            ROOT,
            PointerPosition {
                child: Some(TERM),
                win_x: 3,
                win_y: 4,
                root_x: 3,
                root_y: 4,
            },
        );
        event_loop.start(server.clone(), tracker.clone()).unwrap();
        assert!(wait_for(|| tracker.current_window() == Some(TERM)));
        event_loop.stop(&tracker);
    }

    #[test]
    fn test_transport_error_ends_loop_and_restart_works() {
        let (server, tracker, event_loop) = setup();
        server.disconnect();
        event_loop.start(server.clone(), tracker.clone()).unwrap();
        assert!(wait_for(|| !event_loop.is_running()));

        let (fresh, _, _) = setup();
        event_loop.start(fresh.clone(), tracker.clone()).unwrap();
        assert!(event_loop.is_running());
        assert!(wait_for(|| fresh.poll_count() > 0));
        event_loop.stop(&tracker);
    }
}
