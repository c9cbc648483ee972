//! JSON bodies exchanged on the operator endpoints.
//!
//! Field names follow the wire format the mobile controller already speaks
//! (`gripperPosition`, `basePosition`), so these types are shared by the
//! server and the `carebot teleop` client.

use carebot_types::Vec3;
use serde::{Deserialize, Serialize};

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    Unavailable,
}

/// Error body returned with every non-2xx status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// `POST /joystick-direction/` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionRequest {
    pub direction: String,
}

/// `POST /grip-command/` and `POST /arm-command/` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubCommandRequest {
    pub command: String,
}

/// Acknowledgement for the discrete command endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAck {
    pub message: String,
    pub command: String,
}

/// Acknowledgement without an echoed command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageAck {
    pub message: String,
}

/// Gripper and base positions: the `GET /get-positions/` reply and the
/// `POST /set-positions/` body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Positions {
    pub gripper_position: Vec3,
    pub base_position: Vec3,
}

/// `GET /healthz` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// `"ok"` or `"degraded"`.
    pub status: String,
    /// Watchdog verdict for the control loop.
    pub control_loop: String,
    /// Milliseconds since the loop's last heartbeat.
    pub heartbeat_age_ms: Option<u64>,
    pub tick: u64,
    pub pending_commands: usize,
    pub coverage: f64,
}
