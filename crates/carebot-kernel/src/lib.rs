//! `carebot-kernel` – Safety & Supervision
//!
//! Enforces physical limits during actuation and tracks whether the control
//! loop is still alive.  It does not move anything itself.
//!
//! # Modules
//!
//! - [`interlock`] – [`ContactInterlock`][interlock::ContactInterlock]:
//!   evaluates contact-sensor readings against registered
//!   [`ContactRule`][interlock::ContactRule]s (the built-in
//!   [`ForceLimitRule`][interlock::ForceLimitRule] caps pressing force) and
//!   tells the actuation code when to back off.
//! - [`watchdog`] – [`Watchdog`][watchdog::Watchdog]:
//!   heartbeat tracker used by the control loop and reported on `/healthz`.

pub mod interlock;
pub mod watchdog;

pub use interlock::{ContactInterlock, ContactRule, ContactVerdict, ForceLimitRule, DEFAULT_FORCE_LIMIT};
pub use watchdog::{ComponentHealth, Watchdog};
