//! `carebot-hal` – the simulator seam.
//!
//! The physics host, its IK solver and its wire protocol live outside this
//! workspace.  Everything above this crate talks to them only through the
//! [`Simulator`] trait.
//!
//! # Modules
//!
//! - [`simulator`] – the [`Simulator`] trait.
//! - [`sim`] – [`KinematicSim`], an in-process stand-in with ideal IK and a
//!   spring contact model, plus [`FlakySim`] for fault-injection in tests.

pub mod sim;
pub mod simulator;

pub use sim::{ContactModel, FlakySim, KinematicSim, KinematicSimBuilder};
pub use simulator::Simulator;
