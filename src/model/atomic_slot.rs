//! Lock-free published-value slot.
//!
//! # Responsibilities
//! - Hand readers the most recently published value without locking
//! - Replace the whole value atomically on publish
//! - Notify callbacks registered against a superseded value
//!
//! # Design Decisions
//! - Each publish allocates a fresh `Published<T>` and swaps it in via `arc-swap`
//! - Waiters live on the published value they were registered against, so a
//!   publish only drains its direct predecessor
//! - Callbacks run on the publishing thread after the swap, outside any lock
//! - Async waiters are oneshot senders, pruned once their receiver is gone

use std::fmt;
use std::sync::{Arc, Mutex};

use arc_swap::{ArcSwap, Guard};
use tokio::sync::oneshot;

type Callback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Waiters {
    callbacks: Vec<Callback>,
    senders: Vec<oneshot::Sender<()>>,
}

/// One published generation of a slot.
struct Published<T> {
    value: Arc<T>,
    /// `None` once this generation has been superseded and its waiters fired.
    waiters: Mutex<Option<Waiters>>,
}

impl<T> Published<T> {
    fn new(value: Arc<T>) -> Self {
        Self {
            value,
            waiters: Mutex::new(Some(Waiters::default())),
        }
    }

    fn is_superseded(&self) -> bool {
        self.waiters
            .lock()
            .expect("slot waiters mutex poisoned")
            .is_none()
    }

    fn register(&self, callback: Callback) {
        {
            let mut waiters = self.waiters.lock().expect("slot waiters mutex poisoned");
            if let Some(pending) = waiters.as_mut() {
                pending.callbacks.push(callback);
                return;
            }
        }
        // Already superseded: fire on the caller's thread.
        callback();
    }

    fn register_sender(&self, sender: oneshot::Sender<()>) {
        {
            let mut waiters = self.waiters.lock().expect("slot waiters mutex poisoned");
            if let Some(pending) = waiters.as_mut() {
                // Receivers dropped by cancelled waits.
                pending.senders.retain(|s| !s.is_closed());
                pending.senders.push(sender);
                return;
            }
        }
        let _ = sender.send(());
    }

    #[cfg(test)]
    fn pending_senders(&self) -> usize {
        self.waiters
            .lock()
            .expect("slot waiters mutex poisoned")
            .as_ref()
            .map_or(0, |w| w.senders.len())
    }

    fn notify(&self) {
        let fired = self
            .waiters
            .lock()
            .expect("slot waiters mutex poisoned")
            .take();
        if let Some(fired) = fired {
            for callback in fired.callbacks {
                callback();
            }
            for sender in fired.senders {
                let _ = sender.send(());
            }
        }
    }
}

/// A container whose value is read without locks and replaced wholesale.
pub struct AtomicSlot<T> {
    current: ArcSwap<Published<T>>,
}

impl<T> AtomicSlot<T> {
    /// Create a slot holding `value`.
    pub fn new(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Create a slot from an already shared value.
    pub fn from_arc(value: Arc<T>) -> Self {
        Self {
            current: ArcSwap::from_pointee(Published::new(value)),
        }
    }

    /// The most recently published value.
    pub fn value(&self) -> Arc<T> {
        Arc::clone(&self.current.load().value)
    }

    /// Publish a new value and notify waiters of the previous one.
    pub fn publish(&self, value: T) {
        self.publish_arc(Arc::new(value));
    }

    /// Publish an already shared value.
    pub fn publish_arc(&self, value: Arc<T>) {
        let previous = self.current.swap(Arc::new(Published::new(value)));
        previous.notify();
    }

    /// Compare-and-swap publish.
    ///
    /// `f` sees the current value and returns `Some(next)` to publish or
    /// `None` to leave the slot alone. On contention `f` is re-run against
    /// the newer value. Returns whether a value was published.
    pub fn update<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&T) -> Option<T>,
    {
        let mut current = self.current.load_full();
        loop {
            let next = match f(&current.value) {
                Some(next) => Arc::new(Published::new(Arc::new(next))),
                None => return false,
            };
            let previous = self.current.compare_and_swap(&current, next);
            if Arc::ptr_eq(&*previous, &current) {
                current.notify();
                return true;
            }
            current = Guard::into_inner(previous);
        }
    }

    /// Capture the current value together with a change registration point.
    pub fn snapshot(&self) -> SlotSnapshot<T> {
        SlotSnapshot {
            published: self.current.load_full(),
        }
    }
}

impl<T: Default> Default for AtomicSlot<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for AtomicSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicSlot")
            .field(&self.current.load().value)
            .finish()
    }
}

/// The value of a slot at one point in time.
pub struct SlotSnapshot<T> {
    published: Arc<Published<T>>,
}

impl<T> SlotSnapshot<T> {
    /// The value captured by this snapshot.
    pub fn value(&self) -> &Arc<T> {
        &self.published.value
    }

    /// True once the slot has published past this snapshot.
    pub fn is_stale(&self) -> bool {
        self.published.is_superseded()
    }

    /// Run `callback` once the slot moves past this snapshot.
    ///
    /// Fires synchronously if that has already happened.
    pub fn on_change<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.published.register(Box::new(callback));
    }

    /// Wait until the slot moves past this snapshot.
    ///
    /// Dropping the future before it resolves leaves nothing behind beyond
    /// a closed sender, reclaimed by the next wait on this generation.
    pub async fn changed(&self) {
        let (tx, rx) = oneshot::channel();
        self.published.register_sender(tx);
        let _ = rx.await;
    }
}

impl<T> Clone for SlotSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            published: Arc::clone(&self.published),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SlotSnapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotSnapshot")
            .field("value", &self.published.value)
            .field("stale", &self.is_stale())
            .finish()
    }
}
