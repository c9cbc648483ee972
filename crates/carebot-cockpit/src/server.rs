//! [`CockpitServer`] – the operator HTTP endpoints.
//!
//! Handlers never touch the simulator.  Writes are validated into a
//! [`Command`] and enqueued; reads are answered from the latest
//! [`RigSnapshot`] the control loop published.
//!
//! | Route | Method | Effect |
//! |---|---|---|
//! | `/` | GET | Liveness text. |
//! | `/healthz` | GET | Control loop heartbeat; 503 when it has stalled. |
//! | `/joystick-direction/` | POST | Enqueue a base move. |
//! | `/grip-command/` | POST | Enqueue a gripper action. |
//! | `/arm-command/` | POST | Enqueue an arm motion or reset. |
//! | `/get-positions/` | GET | Gripper and base position from the snapshot. |
//! | `/set-positions/` | POST | Enqueue an absolute move. |

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use carebot_kernel::{ComponentHealth, Watchdog};
use carebot_runtime::{CONTROL_LOOP_COMPONENT, CommandSender};
use carebot_types::{ArmAction, CareError, Command, Direction, GripAction, RigSnapshot};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::{
    ApiError, CommandAck, DirectionRequest, ErrorCode, HealthReport, MessageAck, Positions,
    SubCommandRequest,
};

/// Default TCP port for the operator endpoints.
pub const DEFAULT_PORT: u16 = 8000;

/// Default bind address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Everything the handlers share.
#[derive(Clone)]
pub struct AppState {
    pub commands: CommandSender,
    pub snapshots: watch::Receiver<RigSnapshot>,
    pub watchdog: Arc<Mutex<Watchdog>>,
}

// ---------------------------------------------------------------------------
// CockpitServer
// ---------------------------------------------------------------------------

pub struct CockpitServer {
    state: AppState,
    bind_addr: String,
    port: u16,
}

impl CockpitServer {
    /// Create a server on [`DEFAULT_BIND_ADDR`]:[`DEFAULT_PORT`].
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            port: DEFAULT_PORT,
        }
    }

    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind the listener without serving yet.
    ///
    /// # Errors
    ///
    /// [`CareError::Config`] if the address is invalid or cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener, CareError> {
        let addr: SocketAddr = format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .map_err(|e| CareError::Config(format!("invalid bind address: {e}")))?;
        TcpListener::bind(addr)
            .await
            .map_err(|e| CareError::Config(format!("bind error on {addr}: {e}")))
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), CareError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "operator endpoints listening");
        }
        axum::serve(listener, build_router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| CareError::Config(format!("http server error: {e}")))
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/healthz", get(healthz))
        .route("/joystick-direction/", post(joystick_direction))
        .route("/grip-command/", post(grip_command))
        .route("/arm-command/", post(arm_command))
        .route("/get-positions/", get(get_positions))
        .route("/set-positions/", post(set_positions))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn hello() -> &'static str {
    "Hello world!"
}

async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let (health, age) = state
        .watchdog
        .lock()
        .map(|wd| {
            (
                wd.health(CONTROL_LOOP_COMPONENT),
                wd.since_last(CONTROL_LOOP_COMPONENT),
            )
        })
        .unwrap_or((ComponentHealth::TimedOut, None));
    let (tick, coverage) = {
        let snap = state.snapshots.borrow();
        (snap.tick, snap.coverage)
    };
    let report = HealthReport {
        status: match health {
            ComponentHealth::Healthy => "ok",
            ComponentHealth::TimedOut => "degraded",
        }
        .to_string(),
        control_loop: health.as_str().to_string(),
        heartbeat_age_ms: age.map(|d| d.as_millis() as u64),
        tick,
        pending_commands: state.commands.pending(),
        coverage,
    };
    let status = match health {
        ComponentHealth::Healthy => StatusCode::OK,
        ComponentHealth::TimedOut => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report))
}

async fn joystick_direction(
    State(state): State<AppState>,
    payload: Result<Json<DirectionRequest>, JsonRejection>,
) -> ApiResult<CommandAck> {
    let Json(req) = payload.map_err(rejected)?;
    let direction: Direction = req.direction.parse().map_err(invalid)?;
    enqueue(&state, Command::from(direction))?;
    Ok(Json(CommandAck {
        message: String::new(),
        command: req.direction,
    }))
}

async fn grip_command(
    State(state): State<AppState>,
    payload: Result<Json<SubCommandRequest>, JsonRejection>,
) -> ApiResult<CommandAck> {
    let Json(req) = payload.map_err(rejected)?;
    let action: GripAction = req.command.parse().map_err(invalid)?;
    enqueue(&state, Command::from(action))?;
    Ok(Json(CommandAck {
        message: "Grip command received".to_string(),
        command: req.command,
    }))
}

async fn arm_command(
    State(state): State<AppState>,
    payload: Result<Json<SubCommandRequest>, JsonRejection>,
) -> ApiResult<CommandAck> {
    let Json(req) = payload.map_err(rejected)?;
    let action: ArmAction = req.command.parse().map_err(invalid)?;
    enqueue(&state, Command::from(action))?;
    Ok(Json(CommandAck {
        message: "Arm command received".to_string(),
        command: req.command,
    }))
}

async fn get_positions(State(state): State<AppState>) -> Json<Positions> {
    let snap = state.snapshots.borrow();
    Json(Positions {
        gripper_position: snap.gripper,
        base_position: snap.base,
    })
}

async fn set_positions(
    State(state): State<AppState>,
    payload: Result<Json<Positions>, JsonRejection>,
) -> ApiResult<MessageAck> {
    let Json(req) = payload.map_err(rejected)?;
    enqueue(
        &state,
        Command::SetPositions {
            gripper: req.gripper_position,
            base: req.base_position,
        },
    )?;
    Ok(Json(MessageAck {
        message: "Position setting command received".to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn enqueue(state: &AppState, command: Command) -> Result<(), (StatusCode, Json<ApiError>)> {
    state.commands.enqueue(command).map_err(|e| {
        warn!(command = %command.label(), error = %e, "enqueue failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Unavailable, e.to_string())),
        )
    })
}

fn rejected(rejection: JsonRejection) -> (StatusCode, Json<ApiError>) {
    warn!(reason = %rejection.body_text(), "request body rejected");
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError::new(ErrorCode::Validation, rejection.body_text())),
    )
}

fn invalid(err: CareError) -> (StatusCode, Json<ApiError>) {
    warn!(error = %err, "command rejected");
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError::new(ErrorCode::Validation, err.to_string())),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
