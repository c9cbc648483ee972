//! [`Watchdog`] – heartbeat monitor.
//!
//! The control loop calls [`Watchdog::heartbeat`] once per iteration.  The
//! HTTP health endpoint asks [`Watchdog::health`] whether the last heartbeat
//! is recent enough; a loop stuck inside a simulator call shows up as
//! [`ComponentHealth::TimedOut`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Health state reported for a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    Healthy,
    TimedOut,
}

impl ComponentHealth {
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentHealth::Healthy => "healthy",
            ComponentHealth::TimedOut => "timed_out",
        }
    }
}

struct ComponentEntry {
    last_heartbeat: Instant,
    timeout: Duration,
    beats: u64,
}

/// Tracks heartbeats from registered components.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use carebot_kernel::watchdog::{Watchdog, ComponentHealth};
///
/// let mut wd = Watchdog::new();
/// wd.register("control_loop", Duration::from_secs(1));
/// wd.heartbeat("control_loop");
///
/// assert_eq!(wd.health("control_loop"), ComponentHealth::Healthy);
/// assert_eq!(wd.beats("control_loop"), 1);
/// ```
#[derive(Default)]
pub struct Watchdog {
    components: HashMap<String, ComponentEntry>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `component` with a heartbeat deadline of `timeout`.
    ///
    /// The deadline starts now.  Re-registering resets the deadline and the
    /// beat counter.
    pub fn register(&mut self, component: &str, timeout: Duration) {
        self.components.insert(
            component.to_string(),
            ComponentEntry {
                last_heartbeat: Instant::now(),
                timeout,
                beats: 0,
            },
        );
    }

    /// Record a heartbeat.  Unknown components are ignored.
    pub fn heartbeat(&mut self, component: &str) {
        if let Some(entry) = self.components.get_mut(component) {
            entry.last_heartbeat = Instant::now();
            entry.beats += 1;
        }
    }

    /// Unknown components report [`ComponentHealth::TimedOut`].
    pub fn health(&self, component: &str) -> ComponentHealth {
        match self.components.get(component) {
            Some(entry) if entry.last_heartbeat.elapsed() <= entry.timeout => {
                ComponentHealth::Healthy
            }
            _ => ComponentHealth::TimedOut,
        }
    }

    /// Heartbeats recorded since registration (0 for unknown components).
    pub fn beats(&self, component: &str) -> u64 {
        self.components.get(component).map_or(0, |e| e.beats)
    }

    /// Time since the last heartbeat, if registered.
    pub fn since_last(&self, component: &str) -> Option<Duration> {
        self.components
            .get(component)
            .map(|e| e.last_heartbeat.elapsed())
    }
}
