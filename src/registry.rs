//! Event subscriptions keyed by event kind

use crate::cancel::CancellationHandle;
use crate::events::{Event, EventKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    id: u64,
    callback: Callback,
}

/// Subscriptions grouped by kind. A kind has a bucket only while it has at
/// least one live subscription.
#[derive(Default)]
pub struct Registry {
    buckets: RwLock<HashMap<EventKind, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribes `callback` to `kind`. The returned handle removes the
    /// subscription when cancelled or when its last clone is dropped.
    pub fn register(self: &Arc<Self>, kind: EventKind, callback: Callback) -> CancellationHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.buckets
            .write()
            .entry(kind)
            .or_default()
            .push(Subscription { id, callback });
        debug!("Subscribed to {} (id {})", kind, id);

        let registry = Arc::downgrade(self);
        CancellationHandle::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.unregister(kind, id);
            }
        })
    }

    fn unregister(&self, kind: EventKind, id: u64) {
        let mut buckets = self.buckets.write();
        let Some(bucket) = buckets.get_mut(&kind) else {
            return;
        };
        bucket.retain(|s| s.id != id);
        debug!("Subscription {} to {} cancelled", id, kind);
        if bucket.is_empty() {
            buckets.remove(&kind);
            info!("No more subscribers for {}", kind);
        }
    }

    pub fn has_subscribers(&self, kind: EventKind) -> bool {
        self.buckets.read().contains_key(&kind)
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.buckets.read().get(&kind).map_or(0, Vec::len)
    }

    /// Copies the callbacks currently subscribed to `kind`, so they can be
    /// invoked without holding the lock
    pub fn snapshot(&self, kind: EventKind) -> Vec<Callback> {
        self.buckets
            .read()
            .get(&kind)
            .map(|bucket| bucket.iter().map(|s| Arc::clone(&s.callback)).collect())
            .unwrap_or_default()
    }
}
