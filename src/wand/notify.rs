//! Notification loop
//!
//! Each session runs at most one worker thread. Every cycle the worker
//! checks that the session is still connected with something to listen
//! for, waits up to the notification timeout for a frame and routes it.
//! The transport lock is only held for the wait itself.
//!
//! The worker keeps a weak reference, so dropping every `Wand` handle ends
//! the loop as well.

use log::{debug, warn};
use std::thread::{self, JoinHandle};

use crate::error::Result;
use crate::transport::Notification;
use crate::wand::codec;
use crate::wand::handler::dispatch_hook;
use crate::wand::session::{Wand, WeakWand};
use crate::wand::types::ConnectionState;

/// Start the notification worker for `wand`
pub(crate) fn spawn(wand: &Wand) -> Result<JoinHandle<()>> {
    let session = wand.downgrade();
    let handle = thread::Builder::new()
        .name(format!("wand-notify-{}", wand.mac_address()))
        .spawn(move || run(session))?;
    Ok(handle)
}

fn run(session: WeakWand) {
    debug!("Notification thread started");

    loop {
        let Some(wand) = session.upgrade() else {
            break;
        };
        if !wand.keep_listening() {
            break;
        }

        match wand.next_notification() {
            Ok(Some(notification)) => route(&wand, notification),
            Ok(None) => {}
            Err(e) => {
                // Treated as an empty cycle
                debug!("Notification wait failed: {}", e);
                thread::sleep(wand.options().notification_timeout);
            }
        }
    }

    debug!("Notification thread stopped");
}

/// Decode a frame and hand it to the hook and listeners of its stream
pub(crate) fn route(wand: &Wand, notification: Notification) {
    let (event, hook, listeners) = {
        let state = wand.lock_state();
        if state.connection != ConnectionState::Connected {
            debug!("Dropping notification from handle {}", notification.handle);
            return;
        }

        if let Some(calibration) = &state.calibration {
            if calibration.handle == notification.handle {
                if let Some(status) = notification.value.first() {
                    if calibration.status.try_send(*status).is_err() {
                        debug!("Calibration status {} not delivered", status);
                    }
                }
                return;
            }
        }

        let Some(stream) = wand.options().handles.stream_for(notification.handle) else {
            debug!("Ignoring notification from handle {}", notification.handle);
            return;
        };

        let event = match codec::decode_event(stream, &notification.value) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping {} notification: {}", stream, e);
                return;
            }
        };

        (event, state.registry.hook_enabled(stream), state.registry.listeners(stream))
    };

    if hook {
        dispatch_hook(wand.handler(), wand, &event);
    }
    for listener in listeners {
        listener(&event);
    }
}
