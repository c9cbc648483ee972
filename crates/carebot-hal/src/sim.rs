//! In-process simulation for headless runs and CI without the physics host.
//!
//! [`KinematicSim`] keeps a handful of scene bodies in memory and answers the
//! [`Simulator`] calls with plausible kinematic state:
//!
//! | Call | Stub behaviour |
//! |---|---|
//! | `ik_move` | Ideal solver: the grasp point lands exactly on the target. |
//! | `set_transform` | Teleports the body. |
//! | `reset` | Queues a return to the spawn pose, applied on the next `tick`. |
//! | `tick` | Applies pending resets, then samples the contact sensor. |
//! | `read_contact` | Force history plus the touched fraction of the contact patch. |
//!
//! The contact model is a flat horizontal surface at `surface_height`: a grasp
//! point below it produces a force of `stiffness × penetration`, and touched
//! cells of a rectangular patch on the surface count toward coverage.
//!
//! # Example
//!
//! ```rust
//! use carebot_hal::{KinematicSim, Simulator};
//! use carebot_types::{RigConfig, Vec3};
//!
//! let rig = RigConfig::default();
//! let mut sim = KinematicSim::for_rig(&rig);
//!
//! sim.ik_move(rig.arm, Vec3::new(0.1, 0.9, 0.3)).unwrap();
//! sim.tick().unwrap();
//! assert_eq!(sim.grasp_point(rig.arm).unwrap(), Vec3::new(0.1, 0.9, 0.3));
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use carebot_types::{CareError, ContactReading, ObjectId, RigConfig, SensorId, Vec3};
use tracing::{debug, trace};

use crate::simulator::Simulator;

/// Force samples kept per sensor.
const FORCE_HISTORY: usize = 256;

/// Upper bound on coverage cells along one patch axis.
const MAX_CELLS_PER_AXIS: f64 = 10_000.0;

/// Default spawn pose of the arm's grasp point.
pub const DEFAULT_ARM_HOME: Vec3 = Vec3::new(0.0, 0.9, 0.35);

/// Default spawn pose of the mobile base.
pub const DEFAULT_BASE_HOME: Vec3 = Vec3::new(0.0, 0.0, 1.0);

// ────────────────────────────────────────────────────────────────────────────
// Contact model
// ────────────────────────────────────────────────────────────────────────────

/// Parameters of the flat contact surface a sensor reports against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactModel {
    /// Height (world `y`) of the surface.
    pub surface_height: f64,
    /// Force units per unit of penetration below the surface.
    pub stiffness: f64,
    /// Minimum `(x, z)` corner of the coverage patch.
    pub patch_min: (f64, f64),
    /// Maximum `(x, z)` corner of the coverage patch.
    pub patch_max: (f64, f64),
    /// Edge length of one coverage cell.
    pub cell_size: f64,
}

impl Default for ContactModel {
    fn default() -> Self {
        Self {
            surface_height: 0.8,
            stiffness: 50_000.0,
            patch_min: (-0.3, 0.1),
            patch_max: (0.3, 0.6),
            cell_size: 0.05,
        }
    }
}

impl ContactModel {
    fn force_at(&self, point: Vec3) -> f64 {
        (self.surface_height - point.y).max(0.0) * self.stiffness
    }

    fn columns(&self) -> i64 {
        ((self.patch_max.0 - self.patch_min.0) / self.cell_size).ceil().max(1.0) as i64
    }

    fn rows(&self) -> i64 {
        ((self.patch_max.1 - self.patch_min.1) / self.cell_size).ceil().max(1.0) as i64
    }

    fn cell_count(&self) -> usize {
        self.columns().saturating_mul(self.rows()).max(1) as usize
    }

    /// Reject parameters that make force or coverage meaningless.
    ///
    /// # Errors
    ///
    /// [`CareError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), CareError> {
        if !self.surface_height.is_finite() {
            return Err(CareError::Config("sim.surface_height must be finite".to_string()));
        }
        if !(self.stiffness.is_finite() && self.stiffness > 0.0) {
            return Err(CareError::Config(format!(
                "sim.stiffness must be positive, got {}",
                self.stiffness
            )));
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(CareError::Config(format!(
                "sim.cell_size must be positive, got {}",
                self.cell_size
            )));
        }
        let spans = [
            ("x", self.patch_min.0, self.patch_max.0),
            ("z", self.patch_min.1, self.patch_max.1),
        ];
        for (axis, min, max) in spans {
            if !(min.is_finite() && max.is_finite() && max > min) {
                return Err(CareError::Config(format!(
                    "sim patch is empty along {axis}: [{min}, {max}]"
                )));
            }
            if (max - min) / self.cell_size > MAX_CELLS_PER_AXIS {
                return Err(CareError::Config(format!(
                    "sim.cell_size {} splits the patch into more than {MAX_CELLS_PER_AXIS} cells along {axis}",
                    self.cell_size
                )));
            }
        }
        Ok(())
    }

    /// Coverage cell under `point`, or `None` outside the patch.
    fn cell_of(&self, point: Vec3) -> Option<(i64, i64)> {
        let (min_x, min_z) = self.patch_min;
        let (max_x, max_z) = self.patch_max;
        if point.x < min_x || point.x > max_x || point.z < min_z || point.z > max_z {
            return None;
        }
        let col = (((point.x - min_x) / self.cell_size) as i64).min(self.columns() - 1);
        let row = (((point.z - min_z) / self.cell_size) as i64).min(self.rows() - 1);
        Some((col, row))
    }
}

struct ContactSensor {
    arm: ObjectId,
    model: ContactModel,
    forces: VecDeque<f64>,
    touched: HashSet<(i64, i64)>,
}

impl ContactSensor {
    fn sample(&mut self, grasp: Vec3) {
        let force = self.model.force_at(grasp);
        if self.forces.len() == FORCE_HISTORY {
            self.forces.pop_front();
        }
        self.forces.push_back(force);
        if force > 0.0
            && let Some(cell) = self.model.cell_of(grasp)
        {
            self.touched.insert(cell);
        }
    }

    fn reading(&self) -> ContactReading {
        ContactReading {
            proportion: self.touched.len() as f64 / self.model.cell_count() as f64,
            forces: self.forces.iter().copied().collect(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bodies
// ────────────────────────────────────────────────────────────────────────────

enum Body {
    /// Gripper-bearing arm, tracked by its grasp point.
    Arm {
        grasp: Vec3,
        home: Vec3,
        gripper_closed: bool,
    },
    /// Mobile base.
    Mobile { position: Vec3, home: Vec3 },
    /// Passive object (IK marker).
    Prop { position: Vec3, home: Vec3 },
}

impl Body {
    fn position(&self) -> Vec3 {
        match self {
            Body::Arm { grasp, .. } => *grasp,
            Body::Mobile { position, .. } | Body::Prop { position, .. } => *position,
        }
    }

    fn place(&mut self, to: Vec3) {
        match self {
            Body::Arm { grasp, .. } => *grasp = to,
            Body::Mobile { position, .. } | Body::Prop { position, .. } => *position = to,
        }
    }

    fn settle_home(&mut self) {
        match self {
            Body::Arm {
                grasp,
                home,
                gripper_closed,
            } => {
                *grasp = *home;
                *gripper_closed = false;
            }
            Body::Mobile { position, home } | Body::Prop { position, home } => *position = *home,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// KinematicSim
// ────────────────────────────────────────────────────────────────────────────

/// In-process [`Simulator`] with ideal IK and a spring contact model.
pub struct KinematicSim {
    bodies: HashMap<ObjectId, Body>,
    sensors: HashMap<SensorId, ContactSensor>,
    pending_resets: Vec<ObjectId>,
    ticks: u64,
}

impl KinematicSim {
    /// Start building a scene.
    pub fn builder() -> KinematicSimBuilder {
        KinematicSimBuilder::default()
    }

    /// Scene matching `rig` with default spawn poses and contact model.
    pub fn for_rig(rig: &RigConfig) -> Self {
        Self::for_rig_with(rig, ContactModel::default())
    }

    /// Scene matching `rig` with a custom contact model.
    pub fn for_rig_with(rig: &RigConfig, model: ContactModel) -> Self {
        Self::builder()
            .with_arm(rig.arm, DEFAULT_ARM_HOME)
            .with_mobile_base(rig.base, DEFAULT_BASE_HOME)
            .with_prop(rig.marker, Vec3::zero())
            .with_contact_sensor(rig.contact_sensor, rig.arm, model)
            .build()
    }

    /// Number of ticks advanced so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Whether the gripper on `arm` is closed.
    pub fn gripper_closed(&self, arm: ObjectId) -> Result<bool, CareError> {
        match self.bodies.get(&arm) {
            Some(Body::Arm { gripper_closed, .. }) => Ok(*gripper_closed),
            Some(_) => Err(not_an_arm("gripper_closed", arm)),
            None => Err(CareError::UnknownObject(arm)),
        }
    }

    fn body_mut(&mut self, id: ObjectId) -> Result<&mut Body, CareError> {
        self.bodies.get_mut(&id).ok_or(CareError::UnknownObject(id))
    }

    fn set_gripper(&mut self, arm: ObjectId, closed: bool, operation: &str) -> Result<(), CareError> {
        match self.body_mut(arm)? {
            Body::Arm { gripper_closed, .. } => {
                *gripper_closed = closed;
                Ok(())
            }
            _ => Err(not_an_arm(operation, arm)),
        }
    }
}

fn not_an_arm(operation: &str, id: ObjectId) -> CareError {
    CareError::Simulator {
        operation: operation.to_string(),
        details: format!("{id} has no gripper"),
    }
}

impl Simulator for KinematicSim {
    fn tick(&mut self) -> Result<(), CareError> {
        for id in std::mem::take(&mut self.pending_resets) {
            if let Some(body) = self.bodies.get_mut(&id) {
                body.settle_home();
            }
        }

        for sensor in self.sensors.values_mut() {
            if let Some(body) = self.bodies.get(&sensor.arm) {
                sensor.sample(body.position());
            }
        }

        self.ticks += 1;
        trace!(tick = self.ticks, "kinematic sim stepped");
        Ok(())
    }

    fn set_transform(&mut self, id: ObjectId, position: Vec3) -> Result<(), CareError> {
        self.body_mut(id)?.place(position);
        Ok(())
    }

    fn position(&self, id: ObjectId) -> Result<Vec3, CareError> {
        self.bodies
            .get(&id)
            .map(Body::position)
            .ok_or(CareError::UnknownObject(id))
    }

    fn grasp_point(&self, arm: ObjectId) -> Result<Vec3, CareError> {
        match self.bodies.get(&arm) {
            Some(Body::Arm { grasp, .. }) => Ok(*grasp),
            Some(_) => Err(not_an_arm("grasp_point", arm)),
            None => Err(CareError::UnknownObject(arm)),
        }
    }

    fn ik_move(&mut self, arm: ObjectId, target: Vec3) -> Result<(), CareError> {
        match self.body_mut(arm)? {
            Body::Arm { grasp, .. } => {
                *grasp = target;
                Ok(())
            }
            _ => Err(not_an_arm("ik_move", arm)),
        }
    }

    fn gripper_close(&mut self, arm: ObjectId) -> Result<(), CareError> {
        self.set_gripper(arm, true, "gripper_close")
    }

    fn gripper_open(&mut self, arm: ObjectId) -> Result<(), CareError> {
        self.set_gripper(arm, false, "gripper_open")
    }

    fn reset(&mut self, id: ObjectId) -> Result<(), CareError> {
        if !self.bodies.contains_key(&id) {
            return Err(CareError::UnknownObject(id));
        }
        if !self.pending_resets.contains(&id) {
            self.pending_resets.push(id);
        }
        debug!(%id, "reset queued");
        Ok(())
    }

    fn read_contact(&self, sensor: SensorId) -> Result<ContactReading, CareError> {
        self.sensors
            .get(&sensor)
            .map(ContactSensor::reading)
            .ok_or(CareError::UnknownSensor(sensor))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder for a [`KinematicSim`] scene.
#[derive(Default)]
pub struct KinematicSimBuilder {
    bodies: HashMap<ObjectId, Body>,
    sensors: HashMap<SensorId, ContactSensor>,
}

impl KinematicSimBuilder {
    /// Add a gripper-bearing arm whose grasp point spawns at `home`.
    pub fn with_arm(mut self, id: ObjectId, home: Vec3) -> Self {
        self.bodies.insert(
            id,
            Body::Arm {
                grasp: home,
                home,
                gripper_closed: false,
            },
        );
        self
    }

    /// Add a mobile base spawning at `home`.
    pub fn with_mobile_base(mut self, id: ObjectId, home: Vec3) -> Self {
        self.bodies.insert(id, Body::Mobile { position: home, home });
        self
    }

    /// Add a passive object spawning at `home`.
    pub fn with_prop(mut self, id: ObjectId, home: Vec3) -> Self {
        self.bodies.insert(id, Body::Prop { position: home, home });
        self
    }

    /// Attach a contact sensor to the grasp point of `arm`.
    pub fn with_contact_sensor(mut self, id: SensorId, arm: ObjectId, model: ContactModel) -> Self {
        self.sensors.insert(
            id,
            ContactSensor {
                arm,
                model,
                forces: VecDeque::with_capacity(FORCE_HISTORY),
                touched: HashSet::new(),
            },
        );
        self
    }

    pub fn build(self) -> KinematicSim {
        KinematicSim {
            bodies: self.bodies,
            sensors: self.sensors,
            pending_resets: Vec::new(),
            ticks: 0,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Fault injection
// ────────────────────────────────────────────────────────────────────────────

/// Wraps a [`Simulator`] and fails selected calls, for exercising error paths
/// without a real host.
///
/// Failures are keyed by operation name (`"tick"`, `"ik_move"`, …) and the
/// 1-based index of the call to that operation.
pub struct FlakySim<S> {
    inner: S,
    failures: HashSet<(&'static str, u64)>,
    calls: HashMap<&'static str, u64>,
}

impl<S: Simulator> FlakySim<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failures: HashSet::new(),
            calls: HashMap::new(),
        }
    }

    /// Fail the `nth` call (1-based) to `operation`.
    pub fn fail_on(mut self, operation: &'static str, nth: u64) -> Self {
        self.failures.insert((operation, nth));
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&mut self, operation: &'static str) -> Result<(), CareError> {
        let count = self.calls.entry(operation).or_insert(0);
        *count += 1;
        if self.failures.contains(&(operation, *count)) {
            return Err(CareError::Simulator {
                operation: operation.to_string(),
                details: format!("injected fault on call {count}"),
            });
        }
        Ok(())
    }
}

impl<S: Simulator> Simulator for FlakySim<S> {
    fn tick(&mut self) -> Result<(), CareError> {
        self.check("tick")?;
        self.inner.tick()
    }

    fn set_transform(&mut self, id: ObjectId, position: Vec3) -> Result<(), CareError> {
        self.check("set_transform")?;
        self.inner.set_transform(id, position)
    }

    fn position(&self, id: ObjectId) -> Result<Vec3, CareError> {
        self.inner.position(id)
    }

    fn grasp_point(&self, arm: ObjectId) -> Result<Vec3, CareError> {
        self.inner.grasp_point(arm)
    }

    fn ik_move(&mut self, arm: ObjectId, target: Vec3) -> Result<(), CareError> {
        self.check("ik_move")?;
        self.inner.ik_move(arm, target)
    }

    fn gripper_close(&mut self, arm: ObjectId) -> Result<(), CareError> {
        self.check("gripper_close")?;
        self.inner.gripper_close(arm)
    }

    fn gripper_open(&mut self, arm: ObjectId) -> Result<(), CareError> {
        self.check("gripper_open")?;
        self.inner.gripper_open(arm)
    }

    fn reset(&mut self, id: ObjectId) -> Result<(), CareError> {
        self.check("reset")?;
        self.inner.reset(id)
    }

    fn read_contact(&self, sensor: SensorId) -> Result<ContactReading, CareError> {
        self.inner.read_contact(sensor)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn rig() -> RigConfig {
        RigConfig::default()
    }

    #[test]
    fn scene_spawns_at_home_poses() {
        let rig = rig();
        let sim = KinematicSim::for_rig(&rig);
        assert_eq!(sim.grasp_point(rig.arm).unwrap(), DEFAULT_ARM_HOME);
        assert_eq!(sim.position(rig.base).unwrap(), DEFAULT_BASE_HOME);
        assert_eq!(sim.position(rig.marker).unwrap(), Vec3::zero());
        assert_eq!(sim.ticks(), 0);
    }

    #[test]
    fn ik_move_is_exact() {
        let rig = rig();
        let mut sim = KinematicSim::for_rig(&rig);
        let target = Vec3::new(0.2, 1.1, 0.4);
        sim.ik_move(rig.arm, target).unwrap();
        assert_eq!(sim.grasp_point(rig.arm).unwrap(), target);
    }

    #[test]
    fn ik_move_on_non_arm_fails() {
        let rig = rig();
        let mut sim = KinematicSim::for_rig(&rig);
        let err = sim.ik_move(rig.base, Vec3::zero()).unwrap_err();
        assert!(matches!(err, CareError::Simulator { .. }));
    }

    #[test]
    fn unknown_ids_are_reported() {
        let mut sim = KinematicSim::for_rig(&rig());
        assert_eq!(
            sim.set_transform(ObjectId(1), Vec3::zero()).unwrap_err(),
            CareError::UnknownObject(ObjectId(1))
        );
        assert_eq!(
            sim.read_contact(SensorId(1)).unwrap_err(),
            CareError::UnknownSensor(SensorId(1))
        );
    }

    #[test]
    fn reset_settles_on_next_tick() {
        let rig = rig();
        let mut sim = KinematicSim::for_rig(&rig);
        sim.set_transform(rig.base, Vec3::new(3.0, 0.0, 3.0)).unwrap();
        sim.ik_move(rig.arm, Vec3::new(0.1, 1.0, 0.2)).unwrap();
        sim.gripper_close(rig.arm).unwrap();

        sim.reset(rig.arm).unwrap();
        sim.reset(rig.base).unwrap();
        assert_eq!(sim.position(rig.base).unwrap(), Vec3::new(3.0, 0.0, 3.0));

        sim.tick().unwrap();
        assert_eq!(sim.position(rig.base).unwrap(), DEFAULT_BASE_HOME);
        assert_eq!(sim.grasp_point(rig.arm).unwrap(), DEFAULT_ARM_HOME);
        assert!(!sim.gripper_closed(rig.arm).unwrap());
    }

    #[test]
    fn gripper_state_tracks_commands() {
        let rig = rig();
        let mut sim = KinematicSim::for_rig(&rig);
        sim.gripper_close(rig.arm).unwrap();
        assert!(sim.gripper_closed(rig.arm).unwrap());
        sim.gripper_open(rig.arm).unwrap();
        assert!(!sim.gripper_closed(rig.arm).unwrap());
    }

    #[test]
    fn force_is_sampled_on_tick() {
        let rig = rig();
        let model = ContactModel::default();
        let mut sim = KinematicSim::for_rig_with(&rig, model);

        sim.tick().unwrap();
        assert_eq!(sim.read_contact(rig.contact_sensor).unwrap().latest_force(), Some(0.0));

        // 0.01 below the surface.
        sim.ik_move(rig.arm, Vec3::new(0.0, model.surface_height - 0.01, 0.35))
            .unwrap();
        sim.tick().unwrap();
        let force = sim
            .read_contact(rig.contact_sensor)
            .unwrap()
            .latest_force()
            .unwrap();
        assert!((force - 500.0).abs() < 1e-6, "force was {force}");
    }

    #[test]
    fn coverage_counts_touched_cells_once() {
        let rig = rig();
        let model = ContactModel::default();
        let mut sim = KinematicSim::for_rig_with(&rig, model);
        let below = model.surface_height - 0.001;

        sim.ik_move(rig.arm, Vec3::new(0.0, below, 0.35)).unwrap();
        sim.tick().unwrap();
        sim.tick().unwrap();
        let one_cell = 1.0 / model.cell_count() as f64;
        let p = sim.read_contact(rig.contact_sensor).unwrap().proportion;
        assert!((p - one_cell).abs() < 1e-12);

        sim.ik_move(rig.arm, Vec3::new(0.2, below, 0.35)).unwrap();
        sim.tick().unwrap();
        let p = sim.read_contact(rig.contact_sensor).unwrap().proportion;
        assert!((p - 2.0 * one_cell).abs() < 1e-12);

        // Hovering does not count.
        sim.ik_move(rig.arm, Vec3::new(-0.2, 1.0, 0.35)).unwrap();
        sim.tick().unwrap();
        let p = sim.read_contact(rig.contact_sensor).unwrap().proportion;
        assert!((p - 2.0 * one_cell).abs() < 1e-12);
    }

    #[test]
    fn force_history_is_bounded() {
        let rig = rig();
        let mut sim = KinematicSim::for_rig(&rig);
        for _ in 0..(FORCE_HISTORY + 10) {
            sim.tick().unwrap();
        }
        assert_eq!(sim.read_contact(rig.contact_sensor).unwrap().forces.len(), FORCE_HISTORY);
    }

    #[test]
    fn degenerate_cell_size_does_not_panic() {
        let rig = rig();
        let model = ContactModel {
            cell_size: 0.0,
            ..ContactModel::default()
        };
        let mut sim = KinematicSim::for_rig_with(&rig, model);
        sim.ik_move(rig.arm, Vec3::new(0.0, model.surface_height - 0.001, 0.35))
            .unwrap();
        sim.tick().unwrap();
        let reading = sim.read_contact(rig.contact_sensor).unwrap();
        assert!(reading.proportion >= 0.0 && reading.proportion <= 1.0);
        assert!(model.validate().is_err());
    }

    #[test]
    fn contact_model_validation() {
        assert!(ContactModel::default().validate().is_ok());
        let bad = [
            ContactModel { cell_size: -0.1, ..ContactModel::default() },
            ContactModel { cell_size: f64::NAN, ..ContactModel::default() },
            ContactModel { cell_size: 1e-12, ..ContactModel::default() },
            ContactModel { stiffness: 0.0, ..ContactModel::default() },
            ContactModel { patch_max: (-0.3, 0.6), ..ContactModel::default() },
            ContactModel { patch_min: (-0.3, 0.6), ..ContactModel::default() },
            ContactModel { surface_height: f64::INFINITY, ..ContactModel::default() },
        ];
        for model in bad {
            assert!(
                matches!(model.validate(), Err(CareError::Config(_))),
                "{model:?} accepted"
            );
        }
    }

    #[test]
    fn flaky_sim_fails_only_selected_call() {
        let rig = rig();
        let mut sim = FlakySim::new(KinematicSim::for_rig(&rig)).fail_on("tick", 2);
        sim.tick().unwrap();
        assert!(matches!(sim.tick(), Err(CareError::Simulator { .. })));
        sim.tick().unwrap();
        assert_eq!(sim.inner().ticks(), 2);
    }
}
