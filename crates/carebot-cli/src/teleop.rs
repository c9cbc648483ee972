//! `carebot teleop` – interactive operator console.
//!
//! Reads one keyword per line and posts it to a running `carebot serve`.
//!
//! | Input | Request |
//! |---|---|
//! | `w` `a` `s` `d` / `up` `left` `down` `right` | `/joystick-direction/` |
//! | `w 10` (any direction + count) | the same direction, posted `count` times |
//! | `catch`, `release`, `grip` (toggle) | `/grip-command/` |
//! | `lift`, `drop`, `extend`, `shrink`, `reset` | `/arm-command/` |
//! | `positions` | `GET /get-positions/` |
//! | `store` | save the last fetched positions to `~/.carebot/stored_pose.toml` |
//! | `restore` | post the stored pose to `/set-positions/` |

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use carebot_cockpit::Positions;
use carebot_cockpit::api::{
    ApiError, CommandAck, DirectionRequest, ErrorCode, MessageAck, SubCommandRequest,
};
use carebot_types::{ArmAction, CareError, Command, Direction, GripAction, Vec3};
use chrono::{DateTime, Utc};
use colored::Colorize;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config;

// ─────────────────────────────────────────────────────────────────────────────
// Input parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Most repeats one `<direction> <count>` line may ask for.
pub const MAX_REPEAT: u32 = 100;

/// One parsed console line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Send(Command),
    /// Joystick held: post the direction this many times.
    Hold(Direction, u32),
    ToggleGrip,
    Positions,
    Store,
    Restore,
    Help,
    Quit,
}

fn direction_key(word: &str) -> Option<Direction> {
    match word {
        "w" => Some(Direction::Up),
        "s" => Some(Direction::Down),
        "a" => Some(Direction::Left),
        "d" => Some(Direction::Right),
        other => other.parse().ok(),
    }
}

pub fn parse_line(line: &str) -> Result<Action, CareError> {
    let mut parts = line.split_whitespace();
    let word = parts.next().unwrap_or_default().to_ascii_lowercase();

    if let Some(count) = parts.next() {
        if parts.next().is_some() {
            return Err(CareError::InvalidCommand(format!(
                "too many words in '{}'",
                line.trim()
            )));
        }
        let Some(direction) = direction_key(&word) else {
            return Err(CareError::InvalidCommand(format!(
                "only directions take a repeat count, not '{word}'"
            )));
        };
        return match count.parse::<u32>() {
            Ok(n) if (1..=MAX_REPEAT).contains(&n) => Ok(Action::Hold(direction, n)),
            _ => Err(CareError::InvalidCommand(format!(
                "repeat count must be 1..={MAX_REPEAT}, got '{count}'"
            ))),
        };
    }

    if let Some(direction) = direction_key(&word) {
        return Ok(Action::Send(direction.into()));
    }
    let action = match word.as_str() {
        "grip" | "g" => Action::ToggleGrip,
        "positions" | "p" => Action::Positions,
        "store" => Action::Store,
        "restore" => Action::Restore,
        "help" | "?" => Action::Help,
        "quit" | "exit" | "q" => Action::Quit,
        other => {
            if let Ok(g) = other.parse::<GripAction>() {
                Action::Send(g.into())
            } else if let Ok(a) = other.parse::<ArmAction>() {
                Action::Send(a.into())
            } else {
                return Err(CareError::InvalidCommand(format!("unknown input '{other}'")));
            }
        }
    };
    Ok(action)
}

// ─────────────────────────────────────────────────────────────────────────────
// Stored pose
// ─────────────────────────────────────────────────────────────────────────────

/// A remembered gripper/base pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPose {
    pub saved_at: DateTime<Utc>,
    pub gripper: Vec3,
    pub base: Vec3,
}

impl StoredPose {
    pub fn from_positions(p: Positions) -> Self {
        Self {
            saved_at: Utc::now(),
            gripper: p.gripper_position,
            base: p.base_position,
        }
    }

    pub fn positions(&self) -> Positions {
        Positions {
            gripper_position: self.gripper,
            base_position: self.base,
        }
    }
}

pub fn pose_path() -> PathBuf {
    pose_path_for_home(&config::home_dir())
}

pub(crate) fn pose_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".carebot").join("stored_pose.toml")
}

pub fn save_pose(pose: &StoredPose, path: &Path) -> Result<(), CareError> {
    let raw = toml::to_string_pretty(pose)
        .map_err(|e| CareError::Serialization(format!("failed to serialize pose: {e}")))?;
    config::write_private(path, &raw)
}

pub fn load_pose(path: &Path) -> Result<Option<StoredPose>, CareError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| CareError::Config(format!("failed to read {}: {e}", path.display())))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| CareError::Serialization(format!("failed to parse stored pose: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP client
// ─────────────────────────────────────────────────────────────────────────────

/// Blocking client for the operator endpoints.
pub struct TeleopClient {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl TeleopClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::blocking::Client::new(),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    /// Post `command` to its endpoint and return the server's message.
    pub fn send(&self, command: Command) -> Result<String, CareError> {
        let builder = match command {
            Command::Direction { direction } => self
                .http
                .post(self.url("/joystick-direction/"))
                .json(&DirectionRequest {
                    direction: direction.to_string(),
                }),
            Command::Grip { action } => self.http.post(self.url("/grip-command/")).json(
                &SubCommandRequest {
                    command: action.to_string(),
                },
            ),
            Command::Arm { action } => self.http.post(self.url("/arm-command/")).json(
                &SubCommandRequest {
                    command: action.to_string(),
                },
            ),
            Command::SetPositions { gripper, base } => {
                return self.set_positions(Positions {
                    gripper_position: gripper,
                    base_position: base,
                });
            }
        };
        let ack: CommandAck = decode(builder.send())?;
        debug!(command = %ack.command, "acknowledged");
        Ok(ack.message)
    }

    pub fn set_positions(&self, positions: Positions) -> Result<String, CareError> {
        let ack: MessageAck = decode(
            self.http
                .post(self.url("/set-positions/"))
                .json(&positions)
                .send(),
        )?;
        Ok(ack.message)
    }

    pub fn positions(&self) -> Result<Positions, CareError> {
        decode(self.http.get(self.url("/get-positions/")).send())
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Result<reqwest::blocking::Response>,
) -> Result<T, CareError> {
    let response = response.map_err(|e| CareError::Transport(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.json::<ApiError>().ok();
        return Err(status_error(status, body));
    }
    response
        .json()
        .map_err(|e| CareError::Serialization(format!("unexpected reply: {e}")))
}

/// Map a non-2xx reply to the error the console shows.
fn status_error(status: StatusCode, body: Option<ApiError>) -> CareError {
    match body {
        Some(ApiError {
            code: ErrorCode::Unavailable,
            ..
        }) => CareError::QueueClosed,
        Some(ApiError {
            code: ErrorCode::Validation,
            message,
        }) => CareError::InvalidCommand(message),
        None if status == StatusCode::SERVICE_UNAVAILABLE => CareError::QueueClosed,
        None => CareError::Transport(format!("HTTP {status}")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// REPL
// ─────────────────────────────────────────────────────────────────────────────

struct Session {
    client: TeleopClient,
    pose_path: PathBuf,
    gripping: bool,
    last_positions: Option<Positions>,
}

/// Run the console until EOF, `quit`, or `shutdown` is raised.
pub fn run(server_url: &str, shutdown: Arc<AtomicBool>) {
    let mut session = Session {
        client: TeleopClient::new(server_url),
        pose_path: pose_path(),
        gripping: false,
        last_positions: None,
    };
    println!("  Connected to {}", server_url.bold());
    println!("  Type {} for the key map.\n", "help".bold().cyan());

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        print!("{} ", "carebot>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }
        if line.trim().is_empty() {
            continue;
        }

        match parse_line(&line) {
            Ok(Action::Quit) => {
                println!("{}", "Goodbye.".green());
                break;
            }
            Ok(action) => session.handle(action),
            Err(e) => println!("{} Type {} for the key map.", e.to_string().red(), "help".bold()),
        }
    }
}

impl Session {
    fn handle(&mut self, action: Action) {
        match action {
            Action::Send(command) => {
                self.send(command);
            }
            Action::Hold(direction, count) => {
                for i in 0..count {
                    if !self.send(direction.into()) {
                        println!("  stopped after {i} of {count}");
                        break;
                    }
                }
            }
            Action::ToggleGrip => {
                let next = if self.gripping {
                    GripAction::Release
                } else {
                    GripAction::Catch
                };
                self.send(next.into());
            }
            Action::Positions => match self.client.positions() {
                Ok(p) => {
                    println!("  gripper {}", p.gripper_position.to_string().yellow());
                    println!("  base    {}", p.base_position.to_string().yellow());
                    self.last_positions = Some(p);
                }
                Err(e) => println!("  {}", e.to_string().red()),
            },
            Action::Store => self.store(),
            Action::Restore => self.restore(),
            Action::Help => print_help(),
            Action::Quit => {}
        }
    }

    /// Post `command`; `false` if the server refused it.
    fn send(&mut self, command: Command) -> bool {
        match self.client.send(command) {
            Ok(message) => {
                if let Command::Grip { action } = command {
                    self.gripping = action == GripAction::Catch;
                }
                let note = if message.is_empty() { "sent" } else { message.as_str() };
                println!("  {} {}", "✓".green(), note);
                true
            }
            Err(e) => {
                println!("  {}", e.to_string().red());
                false
            }
        }
    }

    fn store(&mut self) {
        let positions = match self.last_positions {
            Some(p) => p,
            None => match self.client.positions() {
                Ok(p) => p,
                Err(e) => {
                    println!("  {}", e.to_string().red());
                    return;
                }
            },
        };
        match save_pose(&StoredPose::from_positions(positions), &self.pose_path) {
            Ok(()) => println!(
                "  {} Pose saved to {}",
                "✓".green(),
                self.pose_path.display().to_string().bold()
            ),
            Err(e) => println!("  {}", e.to_string().red()),
        }
    }

    fn restore(&mut self) {
        match load_pose(&self.pose_path) {
            Ok(Some(pose)) => match self.client.set_positions(pose.positions()) {
                Ok(message) => println!("  {} {}", "✓".green(), message),
                Err(e) => println!("  {}", e.to_string().red()),
            },
            Ok(None) => println!("  {}", "No stored pose yet; use `store` first.".yellow()),
            Err(e) => println!("  {}", e.to_string().red()),
        }
    }
}

fn print_help() {
    println!();
    println!("{}", "Teleop Keys".bold().underline());
    println!("  {}        – drive the base", "w a s d".bold().cyan());
    println!("  {}           – hold a direction for 10 steps", "w 10".bold().cyan());
    println!("  {}  – gripper (grip toggles)", "catch release grip".bold().cyan());
    println!("  {} – move the arm", "lift drop extend shrink".bold().cyan());
    println!("  {}          – return arm and base home", "reset".bold().cyan());
    println!("  {}      – show current positions", "positions".bold().cyan());
    println!("  {}  – remember / return to a pose", "store restore".bold().cyan());
    println!("  {}           – leave the console", "quit".bold().cyan());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_commands() {
        let cases = [
            ("w", Action::Send(Direction::Up.into())),
            ("a", Action::Send(Direction::Left.into())),
            ("S", Action::Send(Direction::Down.into())),
            ("right", Action::Send(Direction::Right.into())),
            ("catch", Action::Send(GripAction::Catch.into())),
            ("release\n", Action::Send(GripAction::Release.into())),
            ("grip", Action::ToggleGrip),
            ("lift", Action::Send(ArmAction::Lift.into())),
            ("drop", Action::Send(ArmAction::Drop.into())),
            ("reset", Action::Send(ArmAction::Reset.into())),
            ("resetrobot", Action::Send(ArmAction::Reset.into())),
            ("positions", Action::Positions),
            ("store", Action::Store),
            ("restore", Action::Restore),
            ("quit", Action::Quit),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_line(input).unwrap(), expected, "{input:?}");
        }
    }

    #[test]
    fn direction_with_count_is_a_hold() {
        assert_eq!(parse_line("w 10").unwrap(), Action::Hold(Direction::Up, 10));
        assert_eq!(parse_line("  left 3\n").unwrap(), Action::Hold(Direction::Left, 3));
        assert_eq!(
            parse_line(&format!("d {MAX_REPEAT}")).unwrap(),
            Action::Hold(Direction::Right, MAX_REPEAT)
        );
    }

    #[test]
    fn bad_repeat_counts_are_rejected() {
        let too_many = format!("s {}", MAX_REPEAT + 1);
        for input in ["w 0", "w -2", "w x", "w 1 2", "lift 3", too_many.as_str()] {
            assert!(
                matches!(parse_line(input), Err(CareError::InvalidCommand(_))),
                "{input:?} accepted"
            );
        }
    }

    #[test]
    fn unknown_input_is_rejected() {
        assert!(matches!(parse_line("jump"), Err(CareError::InvalidCommand(_))));
    }

    #[test]
    fn pose_roundtrip() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = pose_path_for_home(&dir.path().to_string_lossy());
        assert!(load_pose(&path).expect("no error").is_none());

        let pose = StoredPose::from_positions(Positions {
            gripper_position: Vec3::new(0.1, 0.9, 0.35),
            base_position: Vec3::new(0.0, 0.0, 1.0),
        });
        save_pose(&pose, &path).expect("save");
        let loaded = load_pose(&path).expect("load").expect("some");
        assert_eq!(loaded, pose);
        assert_eq!(loaded.positions().base_position, Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn pose_path_points_to_carebot_dir() {
        let p = pose_path_for_home("/home/operator");
        assert_eq!(p, PathBuf::from("/home/operator/.carebot/stored_pose.toml"));
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = TeleopClient::new("http://127.0.0.1:8000/");
        assert_eq!(client.url("/get-positions/"), "http://127.0.0.1:8000/get-positions/");
    }

    #[test]
    fn unreachable_server_is_a_transport_error() {
        // Port 9 (discard) on loopback is closed in test environments.
        let client = TeleopClient::new("http://127.0.0.1:9");
        assert!(matches!(client.positions(), Err(CareError::Transport(_))));
    }

    #[test]
    fn error_replies_map_to_matching_variants() {
        let closed = ApiError::new(ErrorCode::Unavailable, "Command queue closed");
        assert_eq!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, Some(closed)),
            CareError::QueueClosed
        );
        assert_eq!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, None),
            CareError::QueueClosed
        );

        let bad = ApiError::new(ErrorCode::Validation, "unknown arm command 'wave'");
        assert_eq!(
            status_error(StatusCode::BAD_REQUEST, Some(bad)),
            CareError::InvalidCommand("unknown arm command 'wave'".to_string())
        );

        match status_error(StatusCode::NOT_FOUND, None) {
            CareError::Transport(msg) => assert!(msg.contains("404"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
