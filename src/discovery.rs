//! Screen and window discovery

use crate::error::Result;
use crate::server::DisplayServer;
use crate::tracker::WindowTracker;
use crate::window::WindowId;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Screen roots plus the window manager's virtual roots, without duplicates
pub fn find_roots(server: &dyn DisplayServer) -> Vec<WindowId> {
    let mut roots = Vec::new();
    for root in server.roots() {
        if !roots.contains(&root) {
            roots.push(root);
        }
        match server.virtual_roots(root) {
            Ok(virtual_roots) => {
                for vroot in virtual_roots {
                    if !roots.contains(&vroot) {
                        debug!("Virtual root {:#x} on {:#x}", vroot, root);
                        roots.push(vroot);
                    }
                }
            }
            Err(e) => debug!("No virtual roots on {:#x}: {}", root, e),
        }
    }
    roots
}

/// Every window below `roots`, parents before children
fn descendants(server: &dyn DisplayServer, roots: &[WindowId]) -> Vec<WindowId> {
    let mut seen: HashSet<WindowId> = roots.iter().copied().collect();
    let mut pending: Vec<WindowId> = roots.to_vec();
    let mut found = Vec::new();

    while let Some(window) = pending.pop() {
        let children = match server.children(window) {
            Ok(children) => children,
            Err(e) => {
                warn!("Skipping children of {:#x}: {}", window, e);
                continue;
            }
        };
        for child in children {
            if seen.insert(child) {
                found.push(child);
                pending.push(child);
            }
        }
    }
    found
}

/// Arms every root and window for notifications and watches every normal
/// window. Failing to arm a root is fatal; per-window failures are skipped.
/// Returns the number of watched windows.
pub fn discover(server: &dyn DisplayServer, tracker: &WindowTracker) -> Result<usize> {
    let roots = find_roots(server);
    for &root in &roots {
        server.arm_root(root)?;
        tracker.add_root(root);
    }

    let windows = descendants(server, &roots);
    let mut watched = 0;
    for &window in &windows {
        if let Err(e) = server.arm_window(window) {
            warn!("Failed to select events on {:#x}: {}", window, e);
            continue;
        }
        match server.is_normal_window(window) {
            Ok(true) => {
                if tracker.watch(window).is_some() {
                    watched += 1;
                }
            }
            Ok(false) => {}
            Err(e) => warn!("Failed to read window type of {:#x}: {}", window, e),
        }
    }

    info!(
        "Discovered {} windows under {} roots, watching {}",
        windows.len(),
        roots.len(),
        watched
    );
    Ok(watched)
}
