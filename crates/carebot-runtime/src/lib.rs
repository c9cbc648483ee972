//! `carebot-runtime` – command intake and rig control.
//!
//! # Modules
//!
//! - [`queue`] – [`command_queue`][queue::command_queue]: the unbounded
//!   many-producer, single-consumer channel between the HTTP handlers and the
//!   control loop.
//! - [`rig`] – [`Rig`][rig::Rig]: actuation functions that turn one
//!   [`Command`][carebot_types::Command] into a bounded run of simulator
//!   requests and ticks, with the contact-force interlock on `drop`.
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: the
//!   dedicated thread that drains the queue, ticks the simulator, publishes
//!   [`RigSnapshot`][carebot_types::RigSnapshot]s and heartbeats the watchdog.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with optional OTLP export.
//!
//! # Ownership
//!
//! The simulator is moved into the control loop and never shared.  Everything
//! outside the loop talks to it through the queue (writes) and the snapshot
//! watch channel (reads).

pub mod control_loop;
pub mod queue;
pub mod rig;
pub mod telemetry;

pub use control_loop::{
    CONTROL_LOOP_COMPONENT, ControlLoop, ControlLoopConfig, ControlLoopHandle, StepOutcome,
};
pub use queue::{CommandQueue, CommandSender, command_queue};
pub use rig::{ActuationProfile, ActuationReport, Rig, RigPositions};
pub use telemetry::{TracerProviderGuard, init_tracing};
