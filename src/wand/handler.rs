//! Per-session extension points
//!
//! A [`WandHandler`] is the place for behaviour that belongs to a kind of
//! wand rather than to one listener:
//! - Built-in per-stream hooks, run before any registered listener
//! - `post_connect` / `post_disconnect` callbacks
//!
//! Hooks only auto-subscribe when [`WandHandler::subscribes_to`] says so.
//! The flags are read once, when the session connects.

use crate::error::Result;
use crate::wand::session::Wand;
use crate::wand::types::{Position, Stream, WandEvent};

pub trait WandHandler: Send + Sync {
    /// Whether the hook for `stream` is installed
    ///
    /// Installed hooks are subscribed on connect and keep their stream
    /// subscribed after the last listener is removed.
    fn subscribes_to(&self, _stream: Stream) -> bool {
        false
    }

    /// Called once the session is connected and hooks are subscribed
    fn post_connect(&self, _wand: &Wand) -> Result<()> {
        Ok(())
    }

    /// Called after the session has disconnected
    fn post_disconnect(&self, _wand: &Wand) {}

    fn on_position(&self, _wand: &Wand, _position: Position) {}

    fn on_button(&self, _wand: &Wand, _pressed: bool) {}

    fn on_temperature(&self, _wand: &Wand, _temperature: i16) {}

    fn on_battery(&self, _wand: &Wand, _battery: u8) {}
}

/// Run the hook matching `event`
pub(crate) fn dispatch_hook(handler: &dyn WandHandler, wand: &Wand, event: &WandEvent) {
    match *event {
        WandEvent::Position(position) => handler.on_position(wand, position),
        WandEvent::Button(pressed) => handler.on_button(wand, pressed),
        WandEvent::Temperature(temperature) => handler.on_temperature(wand, temperature),
        WandEvent::Battery(battery) => handler.on_battery(wand, battery),
    }
}

/// Handler with no hooks
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl WandHandler for NoopHandler {}
