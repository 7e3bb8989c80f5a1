//! In-memory display server and pixel source for unit tests

use crate::capture::{ByteOrder, GrabTarget, PixelGrabber, RawImage};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::server::{
    Connector, DisplayServer, PointerPosition, ScreenInfo, Session, WindowInfo, WireEvent,
};
use crate::window::{Region, WindowId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct FakeWindow {
    name: String,
    region: Region,
    parent: Option<WindowId>,
    children: Vec<WindowId>,
    normal: bool,
}

#[derive(Default)]
struct FakeState {
    roots: Vec<WindowId>,
    virtual_roots: HashMap<WindowId, Vec<WindowId>>,
    windows: HashMap<WindowId, FakeWindow>,
    events: VecDeque<WireEvent>,
    armed_roots: Vec<WindowId>,
    armed_windows: Vec<WindowId>,
    pointer: Option<(WindowId, PointerPosition)>,
    fail_root_arming: bool,
    disconnected: bool,
    polls: usize,
}

/// Window tree plus a scripted event queue
#[derive(Default)]
pub struct FakeServer {
    state: Mutex<FakeState>,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_root(&self, root: WindowId, width: u32, height: u32) {
        let mut state = self.state.lock();
        state.roots.push(root);
        state.windows.insert(
            root,
            FakeWindow {
                name: String::new(),
                region: Region::new(0, 0, width, height),
                parent: None,
                children: Vec::new(),
                normal: false,
            },
        );
    }

    pub fn add_virtual_root(&self, root: WindowId, virtual_root: WindowId) {
        let mut state = self.state.lock();
        state.virtual_roots.entry(root).or_default().push(virtual_root);
        state.windows.entry(virtual_root).or_insert(FakeWindow {
            name: String::new(),
            region: Region::default(),
            parent: Some(root),
            children: Vec::new(),
            normal: false,
        });
    }

    pub fn add_window(&self, id: WindowId, parent: WindowId, name: &str, region: Region, normal: bool) {
        let mut state = self.state.lock();
        state.windows.insert(
            id,
            FakeWindow {
                name: name.to_string(),
                region,
                parent: Some(parent),
                children: Vec::new(),
                normal,
            },
        );
        if let Some(p) = state.windows.get_mut(&parent) {
            p.children.push(id);
        }
    }

    pub fn remove_window(&self, id: WindowId) {
        let mut state = self.state.lock();
        if let Some(window) = state.windows.remove(&id) {
            if let Some(p) = window.parent.and_then(|p| state.windows.get_mut(&p)) {
                p.children.retain(|&c| c != id);
            }
        }
    }

    pub fn set_name(&self, id: WindowId, name: &str) {
        if let Some(window) = self.state.lock().windows.get_mut(&id) {
            window.name = name.to_string();
        }
    }

    pub fn set_pointer(&self, root: WindowId, position: PointerPosition) {
        self.state.lock().pointer = Some((root, position));
    }

    pub fn push_event(&self, event: WireEvent) {
        self.state.lock().events.push_back(event);
    }

    pub fn pending_events(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn fail_root_arming(&self, fail: bool) {
        self.state.lock().fail_root_arming = fail;
    }

    /// Makes every later poll fail like a broken transport
    pub fn disconnect(&self) {
        self.state.lock().disconnected = true;
    }

    pub fn armed_roots(&self) -> Vec<WindowId> {
        self.state.lock().armed_roots.clone()
    }

    pub fn armed_windows(&self) -> Vec<WindowId> {
        self.state.lock().armed_windows.clone()
    }

    pub fn poll_count(&self) -> usize {
        self.state.lock().polls
    }

    fn missing(window: WindowId) -> Error {
        Error::WindowQuery {
            window,
            reason: "BadWindow".to_string(),
        }
    }
}

impl DisplayServer for FakeServer {
    fn screens(&self) -> Result<Vec<ScreenInfo>> {
        let state = self.state.lock();
        Ok(state
            .roots
            .iter()
            .enumerate()
            .map(|(index, root)| {
                let region = state.windows.get(root).map(|w| w.region).unwrap_or_default();
                ScreenInfo {
                    index,
                    root: *root,
                    width: region.width,
                    height: region.height,
                    monitors: vec![region],
                }
            })
            .collect())
    }

    fn roots(&self) -> Vec<WindowId> {
        self.state.lock().roots.clone()
    }

    fn virtual_roots(&self, root: WindowId) -> Result<Vec<WindowId>> {
        Ok(self.state.lock().virtual_roots.get(&root).cloned().unwrap_or_default())
    }

    fn children(&self, window: WindowId) -> Result<Vec<WindowId>> {
        let state = self.state.lock();
        let w = state.windows.get(&window).ok_or_else(|| Self::missing(window))?;
        Ok(w.children.clone())
    }

    fn window_info(&self, window: WindowId) -> Result<WindowInfo> {
        let state = self.state.lock();
        let w = state.windows.get(&window).ok_or_else(|| Self::missing(window))?;
        Ok(WindowInfo {
            name: w.name.clone(),
            region: w.region,
            parent: w.parent,
            children: w.children.clone(),
        })
    }

    fn window_name(&self, window: WindowId) -> Result<String> {
        let state = self.state.lock();
        let w = state.windows.get(&window).ok_or_else(|| Self::missing(window))?;
        Ok(w.name.clone())
    }

    fn is_normal_window(&self, window: WindowId) -> Result<bool> {
        let state = self.state.lock();
        let w = state.windows.get(&window).ok_or_else(|| Self::missing(window))?;
        Ok(w.normal)
    }

    fn arm_root(&self, root: WindowId) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_root_arming {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "BadAccess: another client selected substructure redirect",
            )));
        }
        state.armed_roots.push(root);
        Ok(())
    }

    fn arm_window(&self, window: WindowId) -> Result<()> {
        self.state.lock().armed_windows.push(window);
        Ok(())
    }

    fn poll_event(&self) -> Result<Option<WireEvent>> {
        let mut state = self.state.lock();
        state.polls += 1;
        if state.disconnected {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "connection closed",
            )));
        }
        Ok(state.events.pop_front())
    }

    fn query_pointer(&self, root: WindowId) -> Result<Option<PointerPosition>> {
        Ok(self
            .state
            .lock()
            .pointer
            .filter(|(r, _)| *r == root)
            .map(|(_, position)| position))
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// Produces a solid-colour image in the requested byte order, with one
/// word of padding per scanline
pub struct FakeGrabber {
    byte_order: Option<ByteOrder>,
    targets: Mutex<Vec<GrabTarget>>,
    releases: AtomicUsize,
}

impl FakeGrabber {
    pub const RGB: [u8; 3] = [10, 20, 30];

    pub fn solid(byte_order: ByteOrder) -> Self {
        Self {
            byte_order: Some(byte_order),
            targets: Mutex::new(Vec::new()),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            byte_order: None,
            targets: Mutex::new(Vec::new()),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn grab_count(&self) -> usize {
        self.targets.lock().len()
    }

    pub fn targets(&self) -> Vec<GrabTarget> {
        self.targets.lock().clone()
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl PixelGrabber for FakeGrabber {
    fn grab(&self, target: &GrabTarget) -> Result<RawImage> {
        self.targets.lock().push(*target);
        let Some(byte_order) = self.byte_order else {
            return Err(Error::Io(io::Error::new(io::ErrorKind::Other, "BadMatch")));
        };
        let (width, height) = match *target {
            GrabTarget::Window { width, height, .. } => (width, height),
            GrabTarget::Region(region) => (region.width, region.height),
        };
        let [r, g, b] = Self::RGB;
        let pixel = match byte_order {
            ByteOrder::LsbFirst => [b, g, r, 0],
            ByteOrder::MsbFirst => [0, r, g, b],
        };
        let stride = width as usize * 4 + 4;
        let mut data = Vec::with_capacity(stride * height as usize);
        for _ in 0..height {
            for _ in 0..width {
                data.extend_from_slice(&pixel);
            }
            data.extend_from_slice(&[0xff; 4]);
        }
        Ok(RawImage {
            width,
            height,
            bits_per_pixel: 32,
            stride,
            byte_order,
            data,
        })
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out the same fake server and grabber on every connect
pub struct FakeConnector {
    pub server: Arc<FakeServer>,
    pub grabber: Arc<FakeGrabber>,
    fail: AtomicBool,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(server: Arc<FakeServer>) -> Arc<Self> {
        Arc::new(Self {
            server,
            grabber: Arc::new(FakeGrabber::solid(ByteOrder::LsbFirst)),
            fail: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
        })
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for FakeConnector {
    fn connect(&self, _config: &BackendConfig) -> Result<Session> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Hints("_NET_SUPPORTED missing".to_string()));
        }
        Ok(Session {
            server: self.server.clone(),
            grabber: self.grabber.clone(),
        })
    }
}

/// Polls `cond` for up to five seconds
pub fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    false
}
