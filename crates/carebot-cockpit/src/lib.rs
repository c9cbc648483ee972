//! `carebot-cockpit` – the operator HTTP boundary.
//!
//! Serves the endpoints the mobile controller uses (default
//! `0.0.0.0:8000`).  Every write is validated into a
//! [`Command`][carebot_types::Command] before it reaches the queue; malformed
//! bodies and unknown sub-commands are answered with `400` and a
//! `{"code": "validation"}` body and never enqueued.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::{Arc, Mutex};
//! use carebot_cockpit::{AppState, CockpitServer};
//! use carebot_kernel::Watchdog;
//! use carebot_runtime::command_queue;
//! use carebot_types::RigSnapshot;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (commands, _queue) = command_queue();
//!     let (_tx, snapshots) = tokio::sync::watch::channel(RigSnapshot::default());
//!     let server = CockpitServer::new(AppState {
//!         commands,
//!         snapshots,
//!         watchdog: Arc::new(Mutex::new(Watchdog::new())),
//!     });
//!     let listener = server.bind().await.expect("bind failed");
//!     server
//!         .serve(listener, std::future::pending())
//!         .await
//!         .expect("server failed");
//! }
//! ```

pub mod api;
pub mod server;

pub use api::{ApiError, ErrorCode, HealthReport, Positions};
pub use server::{AppState, CockpitServer, DEFAULT_BIND_ADDR, DEFAULT_PORT, build_router};
