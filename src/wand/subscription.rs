//! Subscription registry
//!
//! Tracks, per stream, whether the wand has been told to notify, whether
//! the notification loop should still deliver it, whether a built-in hook
//! is installed and which listeners are registered.
//!
//! `notifying` follows the CCC writes. `active` only feeds the loop
//! condition, so a stream unsubscribed with `keep_notifications` is active
//! without notifying.

use std::fmt;
use std::sync::Arc;

use crate::wand::types::{ListenerId, Stream, WandEvent};

/// Listener callback; any state it needs is captured by the closure
pub type Listener = Arc<dyn Fn(&WandEvent) + Send + Sync>;

#[derive(Default)]
struct StreamState {
    notifying: bool,
    active: bool,
    hook: bool,
    listeners: Vec<(ListenerId, Listener)>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    streams: [StreamState; 4],
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&self, stream: Stream) -> &StreamState {
        &self.streams[stream.index()]
    }

    fn stream_mut(&mut self, stream: Stream) -> &mut StreamState {
        &mut self.streams[stream.index()]
    }

    pub fn is_notifying(&self, stream: Stream) -> bool {
        self.stream(stream).notifying
    }

    pub fn set_notifying(&mut self, stream: Stream, notifying: bool) {
        self.stream_mut(stream).notifying = notifying;
    }

    pub fn is_active(&self, stream: Stream) -> bool {
        self.stream(stream).active
    }

    pub fn set_active(&mut self, stream: Stream, active: bool) {
        self.stream_mut(stream).active = active;
    }

    /// Whether the notification loop has anything to deliver
    pub fn any_active(&self) -> bool {
        self.streams.iter().any(|state| state.active)
    }

    pub fn deactivate_all(&mut self) {
        for state in &mut self.streams {
            state.notifying = false;
            state.active = false;
        }
    }

    pub fn hook_enabled(&self, stream: Stream) -> bool {
        self.stream(stream).hook
    }

    pub fn set_hook(&mut self, stream: Stream, enabled: bool) {
        self.stream_mut(stream).hook = enabled;
    }

    /// Register a listener under a fresh id
    pub fn add(&mut self, stream: Stream, listener: Listener) -> ListenerId {
        let id = ListenerId::new();
        self.stream_mut(stream).listeners.push((id, listener));
        id
    }

    /// Remove a listener, returning the stream it was registered on
    pub fn remove(&mut self, id: ListenerId) -> Option<Stream> {
        for stream in Stream::ALL {
            let listeners = &mut self.stream_mut(stream).listeners;
            if let Some(position) = listeners.iter().position(|(candidate, _)| *candidate == id) {
                listeners.remove(position);
                return Some(stream);
            }
        }
        None
    }

    pub fn listener_count(&self, stream: Stream) -> usize {
        self.stream(stream).listeners.len()
    }

    /// True once nothing (listener or hook) consumes the stream any more
    pub fn is_unused(&self, stream: Stream) -> bool {
        let state = self.stream(stream);
        state.listeners.is_empty() && !state.hook
    }

    /// Snapshot of the listeners for `stream`, in registration order
    pub fn listeners(&self, stream: Stream) -> Vec<Listener> {
        self.stream(stream)
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_map();
        for stream in Stream::ALL {
            let state = self.stream(stream);
            debug.entry(
                &stream,
                &format_args!(
                    "notifying={} active={} hook={} listeners={}",
                    state.notifying,
                    state.active,
                    state.hook,
                    state.listeners.len()
                ),
            );
        }
        debug.finish()
    }
}
