//! [`ControlLoop`] – the single consumer of the command queue.
//!
//! The loop is the only owner of the simulator.  Each iteration:
//!
//! 1. **Observe** – read the contact sensor's coverage proportion (logged only).
//! 2. **Dequeue** – wait up to `tick_interval` for the next [`Command`].
//! 3. **Dispatch** – hand the command to the matching [`Rig`] function.  A
//!    failing command is logged and counted; the loop keeps going.
//! 4. **Tick** – advance the simulator once, whether or not a command ran.
//! 5. **Publish** – send a [`RigSnapshot`] on the watch channel and record a
//!    watchdog heartbeat.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use carebot_hal::KinematicSim;
//! use carebot_runtime::{command_queue, ControlLoop, ControlLoopConfig, Rig};
//! use carebot_types::{Command, Direction, RigConfig};
//!
//! let rig_config = RigConfig::default();
//! let rig = Rig::new(KinematicSim::for_rig(&rig_config), rig_config);
//! let (sender, queue) = command_queue();
//! let config = ControlLoopConfig {
//!     tick_interval: Duration::from_millis(5),
//!     ..ControlLoopConfig::default()
//! };
//! let mut control = ControlLoop::new(rig, queue, config);
//!
//! sender.enqueue(Command::from(Direction::Up)).unwrap();
//! control.step();
//! assert_eq!(control.snapshots().borrow().tick, 1);
//! ```

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use carebot_hal::Simulator;
use carebot_kernel::Watchdog;
use carebot_types::{CareError, Command, RigSnapshot};
use chrono::Utc;
use crossbeam::channel::bounded;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::queue::CommandQueue;
use crate::rig::{ActuationReport, Rig};

/// Watchdog component name the loop heartbeats under.
pub const CONTROL_LOOP_COMPONENT: &str = "control_loop";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`ControlLoop`].
#[derive(Debug, Clone, Copy)]
pub struct ControlLoopConfig {
    /// Longest wait for a command before an idle tick.
    pub tick_interval: Duration,
    /// Heartbeat deadline registered with the watchdog.  Must cover the
    /// longest actuation function.
    pub heartbeat_timeout: Duration,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(20),
            heartbeat_timeout: Duration::from_secs(5),
        }
    }
}

/// What a single iteration did with the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// No command arrived within `tick_interval`.
    Idle,
    /// A command ran to completion.
    Executed {
        command: Command,
        report: ActuationReport,
    },
    /// A command aborted with a simulator error.
    Failed { command: Command, error: CareError },
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ─────────────────────────────────────────────────────────────────────────────

pub struct ControlLoop<S> {
    rig: Rig<S>,
    queue: CommandQueue,
    config: ControlLoopConfig,
    snapshot_tx: watch::Sender<RigSnapshot>,
    watchdog: Arc<Mutex<Watchdog>>,
    shutdown: Arc<AtomicBool>,
    iterations: u64,
    failed: u64,
}

impl<S: Simulator> ControlLoop<S> {
    pub fn new(rig: Rig<S>, queue: CommandQueue, config: ControlLoopConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(RigSnapshot::default());
        let mut watchdog = Watchdog::new();
        watchdog.register(CONTROL_LOOP_COMPONENT, config.heartbeat_timeout);
        Self {
            rig,
            queue,
            config,
            snapshot_tx,
            watchdog: Arc::new(Mutex::new(watchdog)),
            shutdown: Arc::new(AtomicBool::new(false)),
            iterations: 0,
            failed: 0,
        }
    }

    /// Share an externally owned shutdown flag (e.g. one raised by Ctrl-C).
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    /// Receiver for the snapshot published after every iteration.
    pub fn snapshots(&self) -> watch::Receiver<RigSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn watchdog(&self) -> Arc<Mutex<Watchdog>> {
        Arc::clone(&self.watchdog)
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn rig(&self) -> &Rig<S> {
        &self.rig
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn failed_commands(&self) -> u64 {
        self.failed
    }

    /// Run one iteration.
    pub fn step(&mut self) -> StepOutcome {
        match self.rig.contact() {
            Ok(reading) => debug!(coverage = reading.proportion, "coverage"),
            Err(e) => warn!(error = %e, "contact read failed"),
        }

        let outcome = match self.queue.dequeue_timeout(self.config.tick_interval) {
            None => StepOutcome::Idle,
            Some(command) => match self.rig.execute(command) {
                Ok(report) => StepOutcome::Executed { command, report },
                Err(error) => {
                    self.failed += 1;
                    error!(command = %command.label(), error = %error, "command failed");
                    StepOutcome::Failed { command, error }
                }
            },
        };

        if let Err(e) = self.rig.tick() {
            error!(error = %e, "loop tick failed");
        }
        self.iterations += 1;

        self.publish();
        if let Ok(mut wd) = self.watchdog.lock() {
            wd.heartbeat(CONTROL_LOOP_COMPONENT);
        }
        outcome
    }

    /// Iterate until the shutdown flag is raised.
    pub fn run(&mut self) {
        info!(
            tick_interval_ms = self.config.tick_interval.as_millis() as u64,
            "control loop started"
        );
        while !self.shutdown.load(Ordering::SeqCst) {
            self.step();
        }
        info!(
            iterations = self.iterations,
            failed_commands = self.failed,
            "control loop stopped"
        );
    }

    /// Build a snapshot from the simulator and hand it to every receiver.
    ///
    /// Fields that cannot be read keep their previous values.
    fn publish(&mut self) {
        let mut snapshot = self.snapshot_tx.borrow().clone();
        match self.rig.positions() {
            Ok(p) => {
                snapshot.gripper = p.gripper;
                snapshot.base = p.base;
                snapshot.marker = p.marker;
            }
            Err(e) => warn!(error = %e, "position read failed"),
        }
        if let Ok(reading) = self.rig.contact() {
            snapshot.coverage = reading.proportion;
            snapshot.last_force = reading.latest_force();
        }
        snapshot.tick = self.iterations;
        snapshot.pending_commands = self.queue.pending();
        snapshot.failed_commands = self.failed;
        snapshot.updated_at = Utc::now();
        self.snapshot_tx.send_replace(snapshot);
    }
}

impl<S: Simulator + 'static> ControlLoop<S> {
    /// Move the loop onto its own thread.
    ///
    /// Returns once the first iteration has completed, so the first snapshot
    /// and heartbeat are already in place.
    ///
    /// # Errors
    ///
    /// Returns [`CareError::Simulator`] if the thread cannot be spawned or
    /// exits before finishing its first iteration.
    pub fn spawn(mut self) -> Result<ControlLoopHandle, CareError> {
        let shutdown = self.shutdown_flag();
        let snapshots = self.snapshots();
        let watchdog = self.watchdog();
        let (ready_tx, ready_rx) = bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("carebot-control".to_string())
            .spawn(move || {
                self.step();
                let _ = ready_tx.send(());
                self.run();
            })
            .map_err(|e| CareError::Simulator {
                operation: "spawn".to_string(),
                details: e.to_string(),
            })?;

        ready_rx.recv().map_err(|_| CareError::Simulator {
            operation: "spawn".to_string(),
            details: "control loop exited before its first iteration".to_string(),
        })?;

        Ok(ControlLoopHandle {
            shutdown,
            snapshots,
            watchdog,
            thread: Some(thread),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to a running [`ControlLoop`] thread.
///
/// Dropping the handle raises the shutdown flag and joins the thread.
pub struct ControlLoopHandle {
    shutdown: Arc<AtomicBool>,
    snapshots: watch::Receiver<RigSnapshot>,
    watchdog: Arc<Mutex<Watchdog>>,
    thread: Option<JoinHandle<()>>,
}

impl ControlLoopHandle {
    pub fn snapshots(&self) -> watch::Receiver<RigSnapshot> {
        self.snapshots.clone()
    }

    pub fn watchdog(&self) -> Arc<Mutex<Watchdog>> {
        Arc::clone(&self.watchdog)
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Ask the loop to stop after its current iteration.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to exit.
    pub fn join(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.shutdown();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("control loop thread panicked");
        }
    }
}

impl Drop for ControlLoopHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
