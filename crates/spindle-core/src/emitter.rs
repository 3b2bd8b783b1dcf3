//! The event-client seam and an in-process implementation.
//!
//! Spindle never owns an event loop. It subscribes listeners to an
//! [`Emitter`], and the emitter decides when to fire them. [`EventBus`] is a
//! small emitter for embedding and tests: listeners run sequentially in
//! registration order, and the first failing listener aborts the emit.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::error::SpindleResult;

/// Subscription mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Fire on every emission.
    On,
    /// Fire on the next emission only.
    Once,
}

impl Mode {
    /// Maps a once flag to a mode.
    pub fn from_once(once: bool) -> Self {
        if once { Self::Once } else { Self::On }
    }

    /// Returns the mode name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Once => "once",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A listener subscribed to an emitter. Receives the firing payload.
pub type BoxedListener = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, SpindleResult<()>> + Send + Sync>;

/// Converts an async closure into a [`BoxedListener`].
pub fn listener<F, Fut>(f: F) -> BoxedListener
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SpindleResult<()>> + Send + 'static,
{
    Arc::new(move |args: Vec<Value>| -> BoxFuture<'static, SpindleResult<()>> { Box::pin(f(args)) })
}

/// An event-emitting client.
///
/// Only `on` is required. Clients with native single-fire subscriptions
/// override [`supports_once`](Emitter::supports_once) and
/// [`once`](Emitter::once).
pub trait Emitter: Send + Sync + 'static {
    /// Value returned by a subscription call.
    type Subscription;

    /// Subscribes `listener` to every firing of `event`.
    fn on(&self, event: &str, listener: BoxedListener) -> Self::Subscription;

    /// Whether [`once`](Emitter::once) is available.
    fn supports_once(&self) -> bool {
        false
    }

    /// Subscribes `listener` to the next firing of `event`.
    ///
    /// Returns `None` when the client has no native single-fire subscription.
    fn once(&self, event: &str, listener: BoxedListener) -> Option<Self::Subscription> {
        let _ = (event, listener);
        None
    }
}

impl<E: Emitter> Emitter for Arc<E> {
    type Subscription = E::Subscription;

    fn on(&self, event: &str, listener: BoxedListener) -> Self::Subscription {
        (**self).on(event, listener)
    }

    fn supports_once(&self) -> bool {
        (**self).supports_once()
    }

    fn once(&self, event: &str, listener: BoxedListener) -> Option<Self::Subscription> {
        (**self).once(event, listener)
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// Identifies a listener registered on an [`EventBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Slot {
    id: ListenerId,
    once: bool,
    listener: BoxedListener,
}

/// In-process event emitter.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<IndexMap<String, Vec<Slot>>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&self, event: &str, listener: BoxedListener, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(event.to_string())
            .or_default()
            .push(Slot { id, once, listener });
        trace!(event, once, "Listener added");
        id
    }

    /// Removes a listener. Returns whether it was present.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        for slots in listeners.values_mut() {
            if let Some(pos) = slots.iter().position(|slot| slot.id == id) {
                slots.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of listeners currently subscribed to `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.read().get(event).map_or(0, Vec::len)
    }

    /// Fires `event` with `args`.
    ///
    /// Listeners run one after another in registration order. Once-listeners
    /// are removed before any listener runs. Returns the number of listeners
    /// invoked.
    ///
    /// # Errors
    ///
    /// Returns the first listener error; later listeners do not run.
    pub async fn emit(&self, event: &str, args: Vec<Value>) -> SpindleResult<usize> {
        let snapshot: Vec<BoxedListener> = {
            let mut listeners = self.listeners.write();
            let Some(slots) = listeners.get_mut(event) else {
                return Ok(0);
            };
            let snapshot = slots.iter().map(|slot| Arc::clone(&slot.listener)).collect();
            slots.retain(|slot| !slot.once);
            snapshot
        };

        for listener in &snapshot {
            listener(args.clone()).await?;
        }

        Ok(snapshot.len())
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        f.debug_struct("EventBus")
            .field("events", &listeners.len())
            .field("listeners", &listeners.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

impl Emitter for EventBus {
    type Subscription = ListenerId;

    fn on(&self, event: &str, listener: BoxedListener) -> ListenerId {
        self.add(event, listener, false)
    }

    fn supports_once(&self) -> bool {
        true
    }

    fn once(&self, event: &str, listener: BoxedListener) -> Option<ListenerId> {
        Some(self.add(event, listener, true))
    }
}
