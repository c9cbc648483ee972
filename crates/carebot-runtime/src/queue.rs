//! Command queue between the HTTP handlers (many producers) and the control
//! loop (single consumer).
//!
//! Backed by an unbounded crossbeam channel: enqueue never blocks, order is
//! preserved per producer, and nothing is dropped or duplicated.

use std::time::Duration;

use carebot_types::{CareError, Command};
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use tracing::debug;

/// Create a connected sender/queue pair.
pub fn command_queue() -> (CommandSender, CommandQueue) {
    let (tx, rx) = unbounded();
    (CommandSender { tx }, CommandQueue { rx })
}

/// Producer half.  Clone it once per producer context.
#[derive(Clone, Debug)]
pub struct CommandSender {
    tx: Sender<Command>,
}

impl CommandSender {
    /// Append `command` to the queue without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`CareError::QueueClosed`] when the consumer has gone away.
    pub fn enqueue(&self, command: Command) -> Result<(), CareError> {
        let label = command.label();
        self.tx.send(command).map_err(|_| CareError::QueueClosed)?;
        debug!(command = %label, depth = self.tx.len(), "command enqueued");
        Ok(())
    }

    /// Commands waiting to be consumed.
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

/// Consumer half, owned by the control loop.
#[derive(Debug)]
pub struct CommandQueue {
    rx: Receiver<Command>,
}

impl CommandQueue {
    /// Take the oldest command if one is waiting.
    pub fn try_dequeue(&self) -> Option<Command> {
        match self.rx.try_recv() {
            Ok(cmd) => Some(cmd),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the oldest command.
    ///
    /// When every sender has been dropped nothing can arrive, so the call
    /// still waits out `timeout` before returning `None`; callers keep a
    /// steady cadence either way.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<Command> {
        match self.rx.recv_timeout(timeout) {
            Ok(cmd) => Some(cmd),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                None
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
