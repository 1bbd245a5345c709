//! Kano wand support
//!
//! This module provides the wand device session including:
//! - Protocol constants and frame codec
//! - Characteristic handle resolution
//! - Subscriptions, listeners and the notification loop
//! - Handler extension points

pub mod codec;
pub mod constants;
pub mod handler;
pub mod resolver;
pub mod session;
pub mod subscription;
pub mod types;

mod notify;

// Re-export commonly used items
pub use constants::*;
pub use handler::{NoopHandler, WandHandler};
pub use resolver::{Characteristic, CharacteristicResolver, Service};
pub use session::{Wand, WeakWand};
pub use subscription::Listener;
pub use types::*;
