//! Reference-counted, exactly-once cancellation

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

type Action = Box<dyn FnOnce() + Send>;

struct Shared {
    fired: AtomicBool,
    action: Mutex<Option<Action>>,
}

impl Shared {
    fn fire(&self) {
        // `take` under the lock is what makes the action run at most once
        let action = self.action.lock().take();
        if let Some(action) = action {
            self.fired.store(true, Ordering::SeqCst);
            action();
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(action) = self.action.get_mut().take() {
            debug!("last cancellation handle dropped, cancelling");
            self.fired.store(true, Ordering::SeqCst);
            action();
        }
    }
}

/// Handle that cancels a subscription.
///
/// Clones share state. The action runs exactly once: on the first
/// [`cancel`](Self::cancel) through any clone, or when the last clone is
/// dropped, whichever comes first. Cancelling again is a no-op.
#[derive(Clone)]
pub struct CancellationHandle {
    shared: Arc<Shared>,
}

impl CancellationHandle {
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                fired: AtomicBool::new(false),
                action: Mutex::new(Some(Box::new(action))),
            }),
        }
    }

    pub fn cancel(&self) {
        self.shared.fire();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.fired.load(Ordering::SeqCst)
    }

    /// Number of live clones of this handle
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    /// Disarms the handle for every clone: dropping them no longer cancels.
    /// The subscription then lives as long as the registry that issued it.
    pub fn detach(self) {
        self.shared.action.lock().take();
    }
}

impl fmt::Debug for CancellationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationHandle")
            .field("cancelled", &self.is_cancelled())
            .field("refs", &self.ref_count())
            .finish()
    }
}
