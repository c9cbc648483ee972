//! Generic `Simulator` trait for the external physics host.
//!
//! Implementations forward each call to the host and return once the host has
//! acknowledged it.  The control loop is the only caller, so implementations
//! need `Send` (to move onto the loop thread) but not `Sync`.

use carebot_types::{CareError, ContactReading, ObjectId, SensorId, Vec3};

/// The operations the teleoperation core needs from a simulation host.
pub trait Simulator: Send {
    /// Advance simulated time by one step.
    ///
    /// # Errors
    ///
    /// Returns [`CareError::Simulator`] if the host does not acknowledge the
    /// step.
    fn tick(&mut self) -> Result<(), CareError>;

    /// Place object `id` at `position` (world coordinates).
    fn set_transform(&mut self, id: ObjectId, position: Vec3) -> Result<(), CareError>;

    /// Current root position of object `id`.
    fn position(&self, id: ObjectId) -> Result<Vec3, CareError>;

    /// Current grasp point of the gripper mounted on `arm`.
    fn grasp_point(&self, arm: ObjectId) -> Result<Vec3, CareError>;

    /// Ask the host's IK solver to move the grasp point of `arm` toward
    /// `target`.
    fn ik_move(&mut self, arm: ObjectId, target: Vec3) -> Result<(), CareError>;

    fn gripper_close(&mut self, arm: ObjectId) -> Result<(), CareError>;

    fn gripper_open(&mut self, arm: ObjectId) -> Result<(), CareError>;

    /// Request that object `id` return to its spawn pose.  The host may need
    /// several ticks to settle.
    fn reset(&mut self, id: ObjectId) -> Result<(), CareError>;

    /// Read the contact sensor attachment `sensor`.
    fn read_contact(&self, sensor: SensorId) -> Result<ContactReading, CareError>;
}

impl<S: Simulator + ?Sized> Simulator for Box<S> {
    fn tick(&mut self) -> Result<(), CareError> {
        (**self).tick()
    }

    fn set_transform(&mut self, id: ObjectId, position: Vec3) -> Result<(), CareError> {
        (**self).set_transform(id, position)
    }

    fn position(&self, id: ObjectId) -> Result<Vec3, CareError> {
        (**self).position(id)
    }

    fn grasp_point(&self, arm: ObjectId) -> Result<Vec3, CareError> {
        (**self).grasp_point(arm)
    }

    fn ik_move(&mut self, arm: ObjectId, target: Vec3) -> Result<(), CareError> {
        (**self).ik_move(arm, target)
    }

    fn gripper_close(&mut self, arm: ObjectId) -> Result<(), CareError> {
        (**self).gripper_close(arm)
    }

    fn gripper_open(&mut self, arm: ObjectId) -> Result<(), CareError> {
        (**self).gripper_open(arm)
    }

    fn reset(&mut self, id: ObjectId) -> Result<(), CareError> {
        (**self).reset(id)
    }

    fn read_contact(&self, sensor: SensorId) -> Result<ContactReading, CareError> {
        (**self).read_contact(sensor)
    }
}
