//! [`Rig`] – actuation functions for the arm, gripper and mobile base.
//!
//! Every function performs a bounded run of *compute target → request →
//! tick*, then puts the IK marker back on the live grasp point.  Functions
//! return only after all their ticks have been acknowledged; a failing
//! simulator call aborts the function with `?` and leaves the rig wherever
//! the last acknowledged request put it.
//!
//! # Example
//!
//! ```rust
//! use carebot_hal::KinematicSim;
//! use carebot_runtime::rig::Rig;
//! use carebot_types::{Direction, RigConfig};
//!
//! let config = RigConfig::default();
//! let mut rig = Rig::new(KinematicSim::for_rig(&config), config);
//!
//! let before = rig.positions().unwrap();
//! let report = rig.move_base(Direction::Up).unwrap();
//! let after = rig.positions().unwrap();
//!
//! assert_eq!(report.ticks, 1);
//! assert!((after.base.x - before.base.x - 0.008).abs() < 1e-12);
//! assert_eq!(after.marker, after.gripper);
//! ```

use carebot_hal::Simulator;
use carebot_kernel::{ContactInterlock, ContactVerdict, DEFAULT_FORCE_LIMIT};
use carebot_types::{
    ArmAction, Axis, CareError, Command, ContactReading, Direction, GripAction, RigConfig, Vec3,
};
use tracing::{debug, info};

// ─────────────────────────────────────────────────────────────────────────────
// Profile & report
// ─────────────────────────────────────────────────────────────────────────────

/// Step sizes and iteration counts used by the actuation functions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuationProfile {
    /// Base offset per joystick command.
    pub base_step: f64,
    /// Marker offset per arm iteration.
    pub arm_step: f64,
    /// Iterations per lift/drop/extend/shrink command.
    pub arm_iterations: u32,
    /// Height above the iteration's starting point the interlock backs off to.
    pub drop_backoff: f64,
    /// Reset + tick cycles per reset command.
    pub reset_cycles: u32,
    /// Interpolation steps for absolute positioning.
    pub interpolation_steps: u32,
}

impl Default for ActuationProfile {
    fn default() -> Self {
        Self {
            base_step: 0.008,
            arm_step: 0.004,
            arm_iterations: 20,
            drop_backoff: 0.006,
            reset_cycles: 10,
            interpolation_steps: 20,
        }
    }
}

/// What an actuation function did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuationReport {
    /// Simulator ticks advanced.
    pub ticks: u32,
    /// Interlock back-offs performed.
    pub corrections: u32,
}

/// Positions read back from the simulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigPositions {
    pub gripper: Vec3,
    pub base: Vec3,
    pub marker: Vec3,
}

// ─────────────────────────────────────────────────────────────────────────────
// Rig
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the simulator handle and drives the teleoperated rig.
pub struct Rig<S> {
    sim: S,
    config: RigConfig,
    profile: ActuationProfile,
    interlock: ContactInterlock,
}

impl<S: Simulator> Rig<S> {
    /// Wrap `sim` with the default profile and a force-limit interlock.
    pub fn new(sim: S, config: RigConfig) -> Self {
        Self {
            sim,
            config,
            profile: ActuationProfile::default(),
            interlock: ContactInterlock::with_force_limit(DEFAULT_FORCE_LIMIT),
        }
    }

    pub fn with_profile(mut self, profile: ActuationProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_interlock(mut self, interlock: ContactInterlock) -> Self {
        self.interlock = interlock;
        self
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    pub fn profile(&self) -> &ActuationProfile {
        &self.profile
    }

    pub fn sim(&self) -> &S {
        &self.sim
    }

    /// Dispatch `command` to the matching actuation function.
    pub fn execute(&mut self, command: Command) -> Result<ActuationReport, CareError> {
        let report = match command {
            Command::Direction { direction } => self.move_base(direction)?,
            Command::Grip { action } => self.grip(action)?,
            Command::Arm { action } => match action {
                ArmAction::Lift => self.lift()?,
                ArmAction::Drop => self.drop_arm()?,
                ArmAction::Extend => self.extend()?,
                ArmAction::Shrink => self.shrink()?,
                ArmAction::Reset => self.reset()?,
            },
            Command::SetPositions { gripper, base } => self.set_positions(gripper, base)?,
        };
        info!(
            command = %command.label(),
            ticks = report.ticks,
            corrections = report.corrections,
            "command executed"
        );
        Ok(report)
    }

    // ── Base ────────────────────────────────────────────────────────────────

    /// Offset the base by one step: `Up`/`Down` along ±x, `Left`/`Right`
    /// along ±z.
    pub fn move_base(&mut self, direction: Direction) -> Result<ActuationReport, CareError> {
        let step = self.profile.base_step;
        let (axis, delta) = match direction {
            Direction::Up => (Axis::X, step),
            Direction::Down => (Axis::X, -step),
            Direction::Left => (Axis::Z, step),
            Direction::Right => (Axis::Z, -step),
        };
        let mut report = ActuationReport::default();
        let target = self.sim.position(self.config.base)?.offset(axis, delta);
        self.sim.set_transform(self.config.base, target)?;
        self.step(&mut report)?;
        self.sync_marker()?;
        Ok(report)
    }

    // ── Gripper ─────────────────────────────────────────────────────────────

    pub fn grip(&mut self, action: GripAction) -> Result<ActuationReport, CareError> {
        let mut report = ActuationReport::default();
        match action {
            GripAction::Catch => self.sim.gripper_close(self.config.arm)?,
            GripAction::Release => self.sim.gripper_open(self.config.arm)?,
        }
        self.step(&mut report)?;
        self.sync_marker()?;
        Ok(report)
    }

    // ── Arm ─────────────────────────────────────────────────────────────────

    pub fn lift(&mut self) -> Result<ActuationReport, CareError> {
        self.nudge_arm(Axis::Y, self.profile.arm_step)
    }

    pub fn extend(&mut self) -> Result<ActuationReport, CareError> {
        self.nudge_arm(Axis::Z, self.profile.arm_step)
    }

    pub fn shrink(&mut self) -> Result<ActuationReport, CareError> {
        self.nudge_arm(Axis::Z, -self.profile.arm_step)
    }

    /// Lower the arm with the contact interlock engaged.
    ///
    /// After each downward tick the latest force sample is checked; when the
    /// interlock trips, the marker goes back to `drop_backoff` above where the
    /// iteration started and one extra tick is spent there.
    pub fn drop_arm(&mut self) -> Result<ActuationReport, CareError> {
        let mut report = ActuationReport::default();
        for i in 0..self.profile.arm_iterations {
            let start = self.sim.position(self.config.marker)?;
            let target = start.offset(Axis::Y, -self.profile.arm_step);
            self.aim(target)?;
            self.step(&mut report)?;

            let reading = self.contact()?;
            if let ContactVerdict::Overpressed { force, .. } = self.interlock.evaluate(&reading) {
                let backoff = start.offset(Axis::Y, self.profile.drop_backoff);
                debug!(iteration = i, force, height = backoff.y, "backing off surface");
                self.aim(backoff)?;
                self.step(&mut report)?;
                report.corrections += 1;
            }
        }
        self.sync_marker()?;
        Ok(report)
    }

    fn nudge_arm(&mut self, axis: Axis, delta: f64) -> Result<ActuationReport, CareError> {
        let mut report = ActuationReport::default();
        for i in 0..self.profile.arm_iterations {
            let target = self.sim.position(self.config.marker)?.offset(axis, delta);
            self.aim(target)?;
            self.step(&mut report)?;
            debug!(iteration = i, ?axis, value = target.get(axis), "arm nudged");
        }
        self.sync_marker()?;
        Ok(report)
    }

    // ── Whole rig ───────────────────────────────────────────────────────────

    /// Reset arm and base, spending one tick per cycle so the host can settle.
    pub fn reset(&mut self) -> Result<ActuationReport, CareError> {
        let mut report = ActuationReport::default();
        for _ in 0..self.profile.reset_cycles {
            self.sim.reset(self.config.arm)?;
            self.sim.reset(self.config.base)?;
            self.step(&mut report)?;
        }
        self.sync_marker()?;
        Ok(report)
    }

    /// Move gripper and base to absolute targets by linear interpolation,
    /// then issue one exact request for the goal pair.
    pub fn set_positions(&mut self, gripper: Vec3, base: Vec3) -> Result<ActuationReport, CareError> {
        let mut report = ActuationReport::default();
        let gripper_from = self.sim.grasp_point(self.config.arm)?;
        let base_from = self.sim.position(self.config.base)?;
        let steps = self.profile.interpolation_steps;

        for i in 1..=steps {
            let t = f64::from(i) / f64::from(steps);
            let gripper_step = gripper_from.lerp(gripper, t);
            let base_step = base_from.lerp(base, t);
            self.aim(gripper_step)?;
            self.sim.set_transform(self.config.base, base_step)?;
            self.step(&mut report)?;
            debug!(step = i, gripper = %gripper_step, base = %base_step, "interpolating");
        }

        self.aim(gripper)?;
        self.sim.set_transform(self.config.base, base)?;
        self.step(&mut report)?;
        self.sync_marker()?;
        info!(gripper = %gripper, base = %base, "final positions set");
        Ok(report)
    }

    // ── Loop support ────────────────────────────────────────────────────────

    /// Advance the simulator one tick outside any actuation function.
    pub fn tick(&mut self) -> Result<(), CareError> {
        self.sim.tick()
    }

    /// Put the marker on the live grasp point.
    pub fn sync_marker(&mut self) -> Result<(), CareError> {
        let grasp = self.sim.grasp_point(self.config.arm)?;
        self.sim.set_transform(self.config.marker, grasp)
    }

    pub fn positions(&self) -> Result<RigPositions, CareError> {
        Ok(RigPositions {
            gripper: self.sim.grasp_point(self.config.arm)?,
            base: self.sim.position(self.config.base)?,
            marker: self.sim.position(self.config.marker)?,
        })
    }

    pub fn contact(&self) -> Result<ContactReading, CareError> {
        self.sim.read_contact(self.config.contact_sensor)
    }

    /// Place the marker at `target` and request an IK move there.
    fn aim(&mut self, target: Vec3) -> Result<(), CareError> {
        self.sim.set_transform(self.config.marker, target)?;
        self.sim.ik_move(self.config.arm, target)
    }

    fn step(&mut self, report: &mut ActuationReport) -> Result<(), CareError> {
        self.sim.tick()?;
        report.ticks += 1;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use carebot_hal::sim::{DEFAULT_ARM_HOME, DEFAULT_BASE_HOME};
    use carebot_hal::{ContactModel, FlakySim, KinematicSim};

    const EPS: f64 = 1e-9;

    fn rig() -> Rig<KinematicSim> {
        let config = RigConfig::default();
        let mut rig = Rig::new(KinematicSim::for_rig(&config), config);
        rig.sync_marker().unwrap();
        rig
    }

    fn assert_marker_on_grasp<S: Simulator>(rig: &Rig<S>) {
        let p = rig.positions().unwrap();
        assert_eq!(p.marker, p.gripper, "marker must sit on the grasp point");
    }

    #[test]
    fn up_moves_base_forward_by_one_step() {
        let mut rig = rig();
        let before = rig.positions().unwrap().base;
        let report = rig.move_base(Direction::Up).unwrap();
        let after = rig.positions().unwrap().base;
        assert_eq!(report, ActuationReport { ticks: 1, corrections: 0 });
        assert_eq!(after.x, before.x + 0.008);
        assert_eq!((after.y, after.z), (before.y, before.z));
        assert_marker_on_grasp(&rig);
    }

    #[test]
    fn directions_cancel_with_their_inverse() {
        let mut rig = rig();
        let origin = rig.positions().unwrap().base;
        for (d, inverse) in [
            (Direction::Up, Direction::Down),
            (Direction::Down, Direction::Up),
            (Direction::Left, Direction::Right),
            (Direction::Right, Direction::Left),
        ] {
            rig.move_base(d).unwrap();
            assert!(rig.positions().unwrap().base.max_abs_diff(origin) > 0.007);
            rig.move_base(inverse).unwrap();
            assert!(rig.positions().unwrap().base.max_abs_diff(origin) < EPS);
            assert_marker_on_grasp(&rig);
        }
    }

    #[test]
    fn left_and_right_use_the_z_axis() {
        let mut rig = rig();
        let before = rig.positions().unwrap().base;
        rig.move_base(Direction::Left).unwrap();
        let after = rig.positions().unwrap().base;
        assert!((after.z - before.z - 0.008).abs() < EPS);
        assert_eq!(after.x, before.x);
    }

    #[test]
    fn grip_toggles_gripper_with_one_tick() {
        let mut rig = rig();
        let arm = rig.config().arm;
        let r = rig.grip(GripAction::Catch).unwrap();
        assert_eq!(r.ticks, 1);
        assert!(rig.sim().gripper_closed(arm).unwrap());
        rig.grip(GripAction::Release).unwrap();
        assert!(!rig.sim().gripper_closed(arm).unwrap());
        assert_marker_on_grasp(&rig);
    }

    #[test]
    fn lift_raises_grasp_point_over_twenty_ticks() {
        let mut rig = rig();
        let before = rig.positions().unwrap().gripper;
        let report = rig.lift().unwrap();
        let after = rig.positions().unwrap().gripper;
        assert_eq!(report.ticks, 20);
        assert!((after.y - before.y - 20.0 * 0.004).abs() < EPS);
        assert!((after.x - before.x).abs() < EPS && (after.z - before.z).abs() < EPS);
        assert_marker_on_grasp(&rig);
    }

    #[test]
    fn extend_and_shrink_move_along_z() {
        let mut rig = rig();
        let before = rig.positions().unwrap().gripper;
        rig.extend().unwrap();
        let extended = rig.positions().unwrap().gripper;
        assert!((extended.z - before.z - 0.08).abs() < EPS);
        assert_marker_on_grasp(&rig);
        rig.shrink().unwrap();
        assert!(rig.positions().unwrap().gripper.max_abs_diff(before) < EPS);
        assert_marker_on_grasp(&rig);
    }

    #[test]
    fn drop_in_free_space_needs_no_correction() {
        let mut rig = rig();
        let before = rig.positions().unwrap().gripper;
        let report = rig.drop_arm().unwrap();
        let after = rig.positions().unwrap().gripper;
        assert_eq!(report, ActuationReport { ticks: 20, corrections: 0 });
        assert!((before.y - after.y - 0.08).abs() < EPS);
        assert_marker_on_grasp(&rig);
    }

    #[test]
    fn drop_backs_off_when_pressing_too_hard() {
        let mut rig = rig();
        let model = ContactModel::default();
        // Start just above the surface so the drop runs into it.
        let above = Vec3::new(0.0, model.surface_height + 0.01, 0.35);
        rig.set_positions(above, DEFAULT_BASE_HOME).unwrap();

        let report = rig.drop_arm().unwrap();
        assert!(report.corrections >= 1, "interlock never tripped");
        assert_eq!(report.ticks, 20 + report.corrections);

        let reading = rig.contact().unwrap();
        let last = reading.latest_force().unwrap();
        assert!(last <= DEFAULT_FORCE_LIMIT, "final force {last} above limit");
        // The gripper is resting on, not hovering above, the surface region.
        assert!(rig.positions().unwrap().gripper.y < model.surface_height + 0.01);
        assert_marker_on_grasp(&rig);
    }

    #[test]
    fn drop_interlock_can_be_disabled() {
        let config = RigConfig::default();
        let mut rig = Rig::new(KinematicSim::for_rig(&config), config)
            .with_interlock(ContactInterlock::new());
        rig.sync_marker().unwrap();
        let model = ContactModel::default();
        rig.set_positions(Vec3::new(0.0, model.surface_height + 0.01, 0.35), DEFAULT_BASE_HOME)
            .unwrap();
        let report = rig.drop_arm().unwrap();
        assert_eq!(report.corrections, 0);
        assert!(rig.contact().unwrap().latest_force().unwrap() > DEFAULT_FORCE_LIMIT);
    }

    #[test]
    fn coverage_rises_while_in_contact() {
        let mut rig = rig();
        let model = ContactModel::default();
        let touching = Vec3::new(0.0, model.surface_height - 0.001, 0.35);
        rig.set_positions(touching, DEFAULT_BASE_HOME).unwrap();
        let before = rig.contact().unwrap().proportion;
        assert!(before > 0.0);

        // Slide along the surface into fresh cells.
        rig.extend().unwrap();
        let after = rig.contact().unwrap().proportion;
        assert!(after > before, "coverage {before} -> {after}");
        assert!(rig.contact().unwrap().latest_force().unwrap() <= DEFAULT_FORCE_LIMIT);
    }

    #[test]
    fn reset_returns_rig_home_over_ten_cycles() {
        let mut rig = rig();
        rig.move_base(Direction::Left).unwrap();
        rig.lift().unwrap();
        rig.grip(GripAction::Catch).unwrap();

        let report = rig.reset().unwrap();
        assert_eq!(report.ticks, 10);
        let p = rig.positions().unwrap();
        assert_eq!(p.gripper, DEFAULT_ARM_HOME);
        assert_eq!(p.base, DEFAULT_BASE_HOME);
        assert!(!rig.sim().gripper_closed(rig.config().arm).unwrap());
        assert_marker_on_grasp(&rig);
    }

    #[test]
    fn set_positions_lands_exactly_on_target() {
        let config = RigConfig::default();
        let sim = KinematicSim::builder()
            .with_arm(config.arm, Vec3::zero())
            .with_mobile_base(config.base, Vec3::zero())
            .with_prop(config.marker, Vec3::zero())
            .with_contact_sensor(config.contact_sensor, config.arm, ContactModel::default())
            .build();
        let mut rig = Rig::new(sim, config);

        let gripper = Vec3::new(1.0, 0.0, 0.0);
        let base = Vec3::new(0.0, 0.0, 1.0);
        let report = rig.set_positions(gripper, base).unwrap();

        assert_eq!(report.ticks, 21);
        let p = rig.positions().unwrap();
        assert_eq!(p.gripper, gripper);
        assert_eq!(p.base, base);
        assert_marker_on_grasp(&rig);
    }

    #[test]
    fn set_positions_from_arbitrary_start_is_exact() {
        let mut rig = rig();
        rig.extend().unwrap();
        rig.move_base(Direction::Right).unwrap();
        let gripper = Vec3::new(0.123, 0.987, 0.456);
        let base = Vec3::new(-0.7, 0.0, 2.1);
        rig.set_positions(gripper, base).unwrap();
        let p = rig.positions().unwrap();
        assert_eq!(p.gripper, gripper);
        assert_eq!(p.base, base);
    }

    #[test]
    fn execute_dispatches_every_variant() {
        let mut rig = rig();
        let cases = [
            (Command::from(Direction::Down), 1),
            (Command::from(GripAction::Catch), 1),
            (Command::from(ArmAction::Lift), 20),
            (Command::from(ArmAction::Drop), 20),
            (Command::from(ArmAction::Extend), 20),
            (Command::from(ArmAction::Shrink), 20),
            (Command::from(ArmAction::Reset), 10),
            (
                Command::SetPositions {
                    gripper: Vec3::new(0.0, 1.0, 0.3),
                    base: Vec3::zero(),
                },
                21,
            ),
        ];
        for (cmd, ticks) in cases {
            let before = rig.sim().ticks();
            let report = rig.execute(cmd).unwrap();
            assert_eq!(report.ticks, ticks, "{}", cmd.label());
            assert_eq!(rig.sim().ticks() - before, u64::from(ticks));
            assert_marker_on_grasp(&rig);
        }
    }

    #[test]
    fn simulator_fault_aborts_mid_interpolation() {
        let config = RigConfig::default();
        let sim = FlakySim::new(KinematicSim::for_rig(&config)).fail_on("tick", 5);
        let mut rig = Rig::new(sim, config);
        let err = rig
            .set_positions(Vec3::new(1.0, 1.0, 1.0), Vec3::new(2.0, 0.0, 2.0))
            .unwrap_err();
        assert!(matches!(err, CareError::Simulator { ref operation, .. } if operation == "tick"));
        // Left at the last acknowledged intermediate request, not the goal.
        let p = rig.positions().unwrap();
        assert_ne!(p.base, Vec3::new(2.0, 0.0, 2.0));
        assert_eq!(rig.sim().inner().ticks(), 4);
    }

    #[test]
    fn custom_profile_changes_step_sizes() {
        let config = RigConfig::default();
        let profile = ActuationProfile {
            base_step: 0.1,
            arm_iterations: 2,
            ..ActuationProfile::default()
        };
        let mut rig = Rig::new(KinematicSim::for_rig(&config), config).with_profile(profile);
        rig.sync_marker().unwrap();
        let before = rig.positions().unwrap();
        rig.move_base(Direction::Up).unwrap();
        assert_eq!(rig.lift().unwrap().ticks, 2);
        let after = rig.positions().unwrap();
        assert!((after.base.x - before.base.x - 0.1).abs() < EPS);
        assert!((after.gripper.y - before.gripper.y - 0.008).abs() < EPS);
    }
}
