//! Delivery of domain events to subscriber callbacks

use crate::events::Event;
use crate::registry::Callback;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStrategy {
    /// One queue for every kind, drained in order by a single worker
    #[default]
    Queued,
    /// A thread per event; no ordering across events
    ThreadPerEvent,
}

struct Delivery {
    event: Arc<Event>,
    callbacks: Vec<Callback>,
}

impl Delivery {
    fn run(self) {
        for callback in &self.callbacks {
            let result = panic::catch_unwind(AssertUnwindSafe(|| callback(&self.event)));
            if result.is_err() {
                error!("Subscriber for {} panicked", self.event.kind());
            }
        }
    }
}

#[derive(Default)]
struct Worker {
    /// Bumped for every worker started; a worker only clears the slot it owns
    generation: u64,
    tx: Option<Sender<Delivery>>,
    handle: Option<JoinHandle<()>>,
    thread_id: Option<ThreadId>,
    /// Worker stopped from one of its own callbacks, possibly still draining
    retired: Option<JoinHandle<()>>,
}

pub struct Publisher {
    strategy: PublishStrategy,
    idle_timeout: Duration,
    worker: Arc<Mutex<Worker>>,
    /// Thread-per-event deliveries that may still be running
    notifiers: Mutex<Vec<JoinHandle<()>>>,
}

impl Publisher {
    pub fn new(strategy: PublishStrategy, idle_timeout: Duration) -> Self {
        Self {
            strategy,
            idle_timeout,
            worker: Arc::new(Mutex::new(Worker::default())),
            notifiers: Mutex::new(Vec::new()),
        }
    }

    /// Hands `event` to `callbacks` on a worker thread. Never blocks on
    /// subscriber code.
    pub fn publish(&self, event: Event, callbacks: Vec<Callback>) {
        if callbacks.is_empty() {
            return;
        }
        debug!("Publishing {} for window {:#x}", event.kind(), event.window_id);
        let delivery = Delivery {
            event: Arc::new(event),
            callbacks,
        };
        match self.strategy {
            PublishStrategy::Queued => self.enqueue(delivery),
            PublishStrategy::ThreadPerEvent => self.notify(delivery),
        }
    }

    fn notify(&self, delivery: Delivery) {
        let mut notifiers = self.notifiers.lock();
        notifiers.retain(|handle| !handle.is_finished());
        match thread::Builder::new()
            .name("winshot-notify".into())
            .spawn(move || delivery.run())
        {
            Ok(handle) => notifiers.push(handle),
            Err(e) => error!("Failed to spawn notification thread: {}", e),
        }
    }

    fn enqueue(&self, delivery: Delivery) {
        let mut worker = self.worker.lock();
        if worker.tx.is_none() {
            let (tx, rx) = crossbeam_channel::unbounded();
            worker.generation += 1;
            let generation = worker.generation;
            let predecessor = worker.retired.take();
            let state = Arc::clone(&self.worker);
            let idle = self.idle_timeout;
            match thread::Builder::new()
                .name("winshot-publish".into())
                .spawn(move || drain(rx, state, idle, generation, predecessor))
            {
                Ok(handle) => {
                    worker.thread_id = Some(handle.thread().id());
                    worker.handle = Some(handle);
                    worker.tx = Some(tx);
                }
                Err(e) => {
                    error!("Failed to start publisher thread: {}", e);
                    return;
                }
            }
        }
        if let Some(tx) = &worker.tx {
            if tx.send(delivery).is_err() {
                warn!("Publisher queue closed, dropping notification");
            }
        }
    }

    /// Whether the queue worker is currently alive
    pub fn is_running(&self) -> bool {
        self.worker.lock().tx.is_some()
    }

    /// Closes the queue and waits until every notification handed out so far
    /// has been delivered. Called from a subscriber it cannot wait for its
    /// own thread; the next worker then waits for that one instead.
    pub fn shutdown(&self) {
        let current = thread::current().id();
        let (tx, handle, retired) = {
            let mut worker = self.worker.lock();
            let tx = worker.tx.take();
            let handle = worker.handle.take();
            if worker.thread_id.take() == Some(current) {
                worker.retired = handle;
                (tx, None, None)
            } else {
                let retired = match worker.retired.take() {
                    Some(own) if own.thread().id() == current => {
                        worker.retired = Some(own);
                        None
                    }
                    other => other,
                };
                (tx, handle, retired)
            }
        };
        drop(tx);

        for handle in handle.into_iter().chain(retired) {
            if handle.join().is_err() {
                error!("Publisher thread panicked");
            }
        }

        let notifiers = std::mem::take(&mut *self.notifiers.lock());
        for handle in notifiers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!("Notification thread panicked");
            }
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn drain(
    rx: Receiver<Delivery>,
    state: Arc<Mutex<Worker>>,
    idle: Duration,
    generation: u64,
    predecessor: Option<JoinHandle<()>>,
) {
    // whatever the previous worker still holds is older than our queue
    if let Some(previous) = predecessor {
        if previous.join().is_err() {
            error!("Publisher thread panicked");
        }
    }
    debug!("Publisher started");
    loop {
        match rx.recv_timeout(idle) {
            Ok(delivery) => delivery.run(),
            Err(RecvTimeoutError::Timeout) => {
                let mut worker = state.lock();
                if worker.generation != generation {
                    // retired; the sender is gone and the queue will disconnect
                    continue;
                }
                // producers enqueue under this lock, so an empty queue here
                // stays empty once the sender is gone
                if rx.is_empty() {
                    worker.tx = None;
                    worker.handle = None;
                    worker.thread_id = None;
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("Publisher idle, exiting");
}
