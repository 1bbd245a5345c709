//! Kano Wand demo - Main Application
//!
//! Scans for wands and connects to them, vibrates each one and then steps
//! its LED through the configured palette on every button press. Once the
//! palette is used up the next press restores the default colour and
//! disconnects the wand. The program exits when no wand is left connected.

use anyhow::{Context, Result};
use kano_wand::config::Config;
use kano_wand::transport::BtleCentral;
use kano_wand::wand::DEFAULT_LED_COLOR;
use kano_wand::{Pattern, Position, Scanner, Stream, Wand, WandEvent, WandHandler, WeakWand};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Greets each wand on connect and logs its position
struct Greeter {
    color: Option<String>,
}

impl WandHandler for Greeter {
    fn subscribes_to(&self, stream: Stream) -> bool {
        stream == Stream::Position
    }

    fn post_connect(&self, wand: &Wand) -> kano_wand::Result<()> {
        info!("Connected to {}", wand.name());
        wand.vibrate(Pattern::Burst)?;
        if let Some(color) = &self.color {
            wand.set_led(color, true)?;
        }
        Ok(())
    }

    fn on_position(&self, wand: &Wand, position: Position) {
        debug!(
            "{}: roll {:<6} (x, y, z): ({}, {}, {})",
            wand.name(),
            position.roll,
            position.x,
            position.y,
            position.z
        );
    }
}

/// State owned by one button listener
///
/// The listener lives in the wand's own registry, so it only keeps a weak
/// handle to the wand.
struct LedCycle {
    wand: WeakWand,
    colors: Vec<String>,
}

impl LedCycle {
    fn on_button(&mut self, pressed: bool) {
        if !pressed {
            return;
        }
        let Some(wand) = self.wand.upgrade() else {
            return;
        };

        if let Some(color) = self.colors.pop() {
            if let Err(e) = wand.set_led(&color, true) {
                warn!("Failed to set LED of {}: {}", wand.name(), e);
            }
        } else {
            info!("Out of colors, disconnecting {}", wand.name());
            if let Err(e) = wand.set_led(DEFAULT_LED_COLOR, true) {
                warn!("Failed to restore LED of {}: {}", wand.name(), e);
            }
            if let Err(e) = wand.disconnect() {
                warn!("Failed to disconnect {}: {}", wand.name(), e);
            }
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load_default().context("Failed to load configs/default.toml")?;
    let central = BtleCentral::new().context("Failed to open Bluetooth adapter")?;

    let mut palette = config.led.colors.clone();
    let greeting = palette.pop();

    let scanner = Scanner::new(Arc::new(central))
        .with_options(config.wand_options())
        .with_handler(Arc::new(Greeter { color: greeting }));

    let criteria = config.match_criteria();
    let wands = loop {
        let wands = scanner.scan(&criteria, config.scan_timeout(), config.scan.auto_connect)?;
        if !wands.is_empty() {
            break wands;
        }
    };

    for wand in &wands {
        wand.connect()?;

        let cycle = Mutex::new(LedCycle {
            wand: wand.downgrade(),
            colors: palette.clone(),
        });
        wand.on(Stream::Button, move |event| {
            if let WandEvent::Button(pressed) = event {
                cycle.lock().unwrap_or_else(PoisonError::into_inner).on_button(*pressed);
            }
        })?;
    }

    info!("Press the wand button to change colors");
    while wands.iter().any(Wand::is_connected) {
        thread::sleep(Duration::from_secs(1));
    }

    info!("All wands disconnected");
    Ok(())
}
