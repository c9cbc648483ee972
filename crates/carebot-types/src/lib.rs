//! Shared vocabulary for the CareBot workspace: geometry, operator commands,
//! sensor readings, the published rig snapshot, and the workspace-wide error
//! type.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

/// A point or offset in simulator world coordinates.
///
/// Serialises as a bare `[x, y, z]` array, which is the shape the operator
/// endpoints exchange.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Linear interpolation: `self + (to - self) * t`.
    pub fn lerp(self, to: Self, t: f64) -> Self {
        Self::new(
            self.x + (to.x - self.x) * t,
            self.y + (to.y - self.y) * t,
            self.z + (to.z - self.z) * t,
        )
    }

    /// Largest per-axis absolute difference to `other`.
    pub fn max_abs_diff(self, other: Self) -> f64 {
        (self.x - other.x)
            .abs()
            .max((self.y - other.y).abs())
            .max((self.z - other.z).abs())
    }

    /// Copy of `self` with one axis offset by `delta`.
    pub fn offset(self, axis: Axis, delta: f64) -> Self {
        let mut out = self;
        match axis {
            Axis::X => out.x += delta,
            Axis::Y => out.y += delta,
            Axis::Z => out.z += delta,
        }
        out
    }

    pub fn get(self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl From<Vec3> for [f64; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.4}, {:.4}, {:.4}]", self.x, self.y, self.z)
    }
}

/// World axis selector.  `Y` is up; the base drives in the `X`/`Z` plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

// ────────────────────────────────────────────────────────────────────────────
// Identifiers
// ────────────────────────────────────────────────────────────────────────────

/// Simulator-side identifier of a scene object (robot, base, marker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// Simulator-side identifier of a sensor attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(pub u32);

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sensor#{}", self.0)
    }
}

/// Which scene objects make up the teleoperated rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigConfig {
    /// Gripper-bearing arm; its grasp point is the reported gripper position.
    pub arm: ObjectId,
    /// Mobile base driven by the joystick.
    pub base: ObjectId,
    /// Proxy object kept on the grasp point and used as the IK target.
    pub marker: ObjectId,
    /// Contact sensor reporting force samples and coverage.
    pub contact_sensor: SensorId,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            arm: ObjectId(123456),
            base: ObjectId(12346),
            marker: ObjectId(2333),
            contact_sensor: SensorId(509),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Commands
// ────────────────────────────────────────────────────────────────────────────

/// Joystick direction for the mobile base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Discrete gripper actuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GripAction {
    Catch,
    Release,
}

/// Incremental arm motions plus the full rig reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmAction {
    Lift,
    Drop,
    Extend,
    Shrink,
    #[serde(rename = "resetrobot", alias = "reset")]
    Reset,
}

/// An operator command, validated at the boundary and consumed exactly once
/// by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    Direction { direction: Direction },
    Grip { action: GripAction },
    Arm { action: ArmAction },
    SetPositions { gripper: Vec3, base: Vec3 },
}

impl Command {
    /// Short label for logs.
    pub fn label(&self) -> String {
        match self {
            Command::Direction { direction } => format!("direction:{direction}"),
            Command::Grip { action } => format!("grip:{action}"),
            Command::Arm { action } => format!("arm:{action}"),
            Command::SetPositions { .. } => "set_positions".to_string(),
        }
    }
}

impl From<Direction> for Command {
    fn from(direction: Direction) -> Self {
        Command::Direction { direction }
    }
}

impl From<GripAction> for Command {
    fn from(action: GripAction) -> Self {
        Command::Grip { action }
    }
}

impl From<ArmAction> for Command {
    fn from(action: ArmAction) -> Self {
        Command::Arm { action }
    }
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl GripAction {
    pub fn as_str(self) -> &'static str {
        match self {
            GripAction::Catch => "catch",
            GripAction::Release => "release",
        }
    }
}

impl ArmAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ArmAction::Lift => "lift",
            ArmAction::Drop => "drop",
            ArmAction::Extend => "extend",
            ArmAction::Shrink => "shrink",
            ArmAction::Reset => "resetrobot",
        }
    }
}

impl FromStr for Direction {
    type Err = CareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            other => Err(CareError::InvalidCommand(format!(
                "unknown direction '{other}' (expected up, down, left or right)"
            ))),
        }
    }
}

impl FromStr for GripAction {
    type Err = CareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "catch" => Ok(GripAction::Catch),
            "release" => Ok(GripAction::Release),
            other => Err(CareError::InvalidCommand(format!(
                "unknown grip command '{other}' (expected catch or release)"
            ))),
        }
    }
}

impl FromStr for ArmAction {
    type Err = CareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lift" => Ok(ArmAction::Lift),
            "drop" => Ok(ArmAction::Drop),
            "extend" => Ok(ArmAction::Extend),
            "shrink" => Ok(ArmAction::Shrink),
            "resetrobot" | "reset" => Ok(ArmAction::Reset),
            other => Err(CareError::InvalidCommand(format!(
                "unknown arm command '{other}' (expected lift, drop, extend, shrink or resetrobot)"
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for GripAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ArmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sensors & snapshots
// ────────────────────────────────────────────────────────────────────────────

/// Typed view of a contact sensor attachment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactReading {
    /// Fraction of the contact patch touched so far, in `[0, 1]`.
    pub proportion: f64,
    /// Force samples, oldest first.
    pub forces: Vec<f64>,
}

impl ContactReading {
    /// The most recent force sample, if any has been recorded.
    pub fn latest_force(&self) -> Option<f64> {
        self.forces.last().copied()
    }
}

/// State of the rig as observed by the control loop after its latest
/// iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigSnapshot {
    pub tick: u64,
    pub gripper: Vec3,
    pub base: Vec3,
    pub marker: Vec3,
    pub coverage: f64,
    pub last_force: Option<f64>,
    pub pending_commands: usize,
    pub failed_commands: u64,
    pub updated_at: DateTime<Utc>,
}

impl Default for RigSnapshot {
    fn default() -> Self {
        Self {
            tick: 0,
            gripper: Vec3::zero(),
            base: Vec3::zero(),
            marker: Vec3::zero(),
            coverage: 0.0,
            last_force: None,
            pending_commands: 0,
            failed_commands: 0,
            updated_at: Utc::now(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Workspace-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CareError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Simulator call '{operation}' failed: {details}")]
    Simulator { operation: String, details: String },

    #[error("Unknown scene object: {0}")]
    UnknownObject(ObjectId),

    #[error("Unknown sensor: {0}")]
    UnknownSensor(SensorId),

    #[error("Command queue closed")]
    QueueClosed,

    #[error("Server unreachable: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
