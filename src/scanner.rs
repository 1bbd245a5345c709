//! Wand discovery
//!
//! Runs a timed scan through a [`Central`] and creates one [`Wand`] per
//! matching device. Repeated advertisements from the same MAC address never
//! produce a second session.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::Central;
use crate::wand::constants::WAND_NAME_PREFIX;
use crate::wand::handler::{NoopHandler, WandHandler};
use crate::wand::session::Wand;
use crate::wand::types::{canonical_mac, DeviceIdentity, WandOptions};

/// Which advertisements count as wands
///
/// Every supplied criterion must hold. `name` and `prefix` both test the
/// advertised name and together form a single check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCriteria {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub prefix: Option<String>,

    #[serde(default)]
    pub mac: Option<String>,
}

impl MatchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any device advertising the stock `Kano-Wand` prefix
    pub fn kano_wands() -> Self {
        Self::new().prefix(WAND_NAME_PREFIX)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.prefix.is_none() && self.mac.is_none()
    }

    pub fn matches(&self, device: &DeviceIdentity) -> bool {
        if let Some(mac) = &self.mac {
            if canonical_mac(mac) != device.mac_address {
                return false;
            }
        }

        let advertised = device.name.as_deref();
        match (&self.name, &self.prefix) {
            (Some(name), prefix) => {
                advertised == Some(name.as_str())
                    && prefix.as_deref().map_or(true, |prefix| name.starts_with(prefix))
            }
            (None, Some(prefix)) => advertised.map_or(false, |advertised| advertised.starts_with(prefix.as_str())),
            (None, None) => true,
        }
    }
}

/// Builds the handler for each new session
pub type HandlerFactory = Arc<dyn Fn(&DeviceIdentity) -> Arc<dyn WandHandler> + Send + Sync>;

/// Scanner for Kano wands
pub struct Scanner {
    central: Arc<dyn Central>,
    handler_factory: HandlerFactory,
    options: WandOptions,
}

impl Scanner {
    pub fn new(central: Arc<dyn Central>) -> Self {
        Self {
            central,
            handler_factory: Arc::new(|_: &DeviceIdentity| -> Arc<dyn WandHandler> { Arc::new(NoopHandler) }),
            options: WandOptions::default(),
        }
    }

    /// Share one handler between every session this scanner creates
    pub fn with_handler(self, handler: Arc<dyn WandHandler>) -> Self {
        self.with_handler_factory(move |_: &DeviceIdentity| Arc::clone(&handler))
    }

    /// Build a handler per discovered wand
    pub fn with_handler_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&DeviceIdentity) -> Arc<dyn WandHandler> + Send + Sync + 'static,
    {
        self.handler_factory = Arc::new(factory);
        self
    }

    pub fn with_options(mut self, options: WandOptions) -> Self {
        self.options = options;
        self
    }

    /// Scan for `timeout` and return a session for every matching wand
    ///
    /// With `auto_connect` each session is connected before returning.
    pub fn scan(&self, criteria: &MatchCriteria, timeout: Duration, auto_connect: bool) -> Result<Vec<Wand>> {
        if criteria.is_empty() {
            return Err(Error::InvalidMatchCriteria);
        }

        info!("Scanning for wands ({:?})...", timeout);
        let devices = self.central.scan(timeout)?;

        let mut seen = HashSet::new();
        let mut wands = Vec::new();
        for device in devices {
            let identity = DeviceIdentity::new(&device.mac_address, device.name.as_deref(), device.rssi);
            if !criteria.matches(&identity) {
                debug!("Mac: {}\tName: {}", identity.mac_address, identity.display_name());
                continue;
            }
            if !seen.insert(identity.mac_address.clone()) {
                continue;
            }

            info!("✓ Wand found!");
            info!("  Address: {}", identity.mac_address);
            info!("  Name: {}", identity.display_name());

            let transport = self.central.open(&device)?;
            let handler = (self.handler_factory)(&identity);
            wands.push(Wand::new(identity, transport, handler, self.options));
        }

        if auto_connect {
            for wand in &wands {
                wand.connect()?;
            }
        }

        debug!("Scan matched {} wands", wands.len());
        Ok(wands)
    }
}

impl fmt::Debug for Scanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner").field("options", &self.options).finish_non_exhaustive()
    }
}
