//! Configuration vault: reads and writes `~/.carebot/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use carebot_hal::ContactModel;
use carebot_types::{CareError, RigConfig};
use serde::{Deserialize, Serialize};

/// Contact surface parameters for the in-process simulator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    pub surface_height: f64,
    pub stiffness: f64,
    /// `[x, z]` of the coverage patch's minimum corner.
    pub patch_min: [f64; 2],
    /// `[x, z]` of the coverage patch's maximum corner.
    pub patch_max: [f64; 2],
    pub cell_size: f64,
}

impl Default for SimSettings {
    fn default() -> Self {
        let m = ContactModel::default();
        Self {
            surface_height: m.surface_height,
            stiffness: m.stiffness,
            patch_min: [m.patch_min.0, m.patch_min.1],
            patch_max: [m.patch_max.0, m.patch_max.1],
            cell_size: m.cell_size,
        }
    }
}

impl SimSettings {
    pub fn contact_model(&self) -> ContactModel {
        ContactModel {
            surface_height: self.surface_height,
            stiffness: self.stiffness,
            patch_min: (self.patch_min[0], self.patch_min[1]),
            patch_max: (self.patch_max[0], self.patch_max[1]),
            cell_size: self.cell_size,
        }
    }
}

/// Persisted settings stored in `~/.carebot/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Interface the operator endpoints bind to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Longest idle wait of the control loop between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Base URL `carebot teleop` talks to.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default)]
    pub rig: RigConfig,

    #[serde(default)]
    pub sim: SimSettings,
}

fn default_bind_addr() -> String {
    carebot_cockpit::DEFAULT_BIND_ADDR.to_string()
}
fn default_port() -> u16 {
    carebot_cockpit::DEFAULT_PORT
}
fn default_tick_interval_ms() -> u64 {
    20
}
fn default_server_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            tick_interval_ms: default_tick_interval_ms(),
            server_url: default_server_url(),
            rig: RigConfig::default(),
            sim: SimSettings::default(),
        }
    }
}

impl Config {
    /// Check values a file or environment override could have broken.
    ///
    /// # Errors
    ///
    /// [`CareError::Config`] for a zero `tick_interval_ms` (the loop would
    /// spin without waiting) or an unusable `sim` section.
    pub fn validate(&self) -> Result<(), CareError> {
        if self.tick_interval_ms == 0 {
            return Err(CareError::Config(
                "tick_interval_ms must be at least 1".to_string(),
            ));
        }
        self.sim.contact_model().validate()
    }
}

/// `$HOME`, falling back to `%USERPROFILE%` and then the working directory.
pub fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

/// Path to `~/.carebot/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".carebot").join("config.toml")
}

/// Load the file at `path`, or `None` if it does not exist.  Environment
/// overrides are applied to a loaded config, then it is validated.
pub fn load_from(path: &Path) -> Result<Option<Config>, CareError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        CareError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| CareError::Config(format!("failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(Some(cfg))
}

/// Load `path` if present, else defaults; environment overrides apply either way.
pub fn resolve(path: &Path) -> Result<Config, CareError> {
    match load_from(path)? {
        Some(cfg) => Ok(cfg),
        None => {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            cfg.validate()?;
            Ok(cfg)
        }
    }
}

/// Apply `CAREBOT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `CAREBOT_BIND_ADDR` | `bind_addr` |
/// | `CAREBOT_PORT` | `port` |
/// | `CAREBOT_TICK_INTERVAL_MS` | `tick_interval_ms` |
/// | `CAREBOT_SERVER_URL` | `server_url` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("CAREBOT_BIND_ADDR") {
        cfg.bind_addr = v;
    }
    if let Ok(v) = std::env::var("CAREBOT_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.port = port;
    }
    if let Ok(v) = std::env::var("CAREBOT_TICK_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.tick_interval_ms = ms;
    }
    if let Ok(v) = std::env::var("CAREBOT_SERVER_URL") {
        cfg.server_url = v;
    }
}

pub fn save_to(cfg: &Config, path: &Path) -> Result<(), CareError> {
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| CareError::Serialization(format!("failed to serialize config: {e}")))?;
    write_private(path, &raw)
}

/// Write `contents` to `path`, creating the parent directory.  On Unix the
/// directory is `rwx------` and the file `rw-------`.
pub(crate) fn write_private(path: &Path, contents: &str) -> Result<(), CareError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| CareError::Config(format!("failed to create {}: {e}", parent.display())))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                CareError::Config(format!("failed to set permissions on {}: {e}", parent.display()))
            })?;
        }
    }
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(contents.as_bytes()))
            .map_err(|e| CareError::Config(format!("failed to write {}: {e}", path.display())))?;
    }
    #[cfg(not(unix))]
    fs::write(path, contents)
        .map_err(|e| CareError::Config(format!("failed to write {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use carebot_types::ObjectId;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let raw = std::fs::read_to_string(&path).expect("read");
        let loaded: Config = toml::from_str(&raw).expect("parse");
        assert_eq!(loaded, Config::default());
        assert_eq!(loaded.port, 8000);
        assert_eq!(loaded.tick_interval_ms, 20);
        assert_eq!(loaded.rig.arm, ObjectId(123456));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: Config = toml::from_str("port = 9001\n[sim]\nsurface_height = 0.5\n").expect("parse");
        assert_eq!(cfg.port, 9001);
        assert_eq!(cfg.bind_addr, "0.0.0.0");
        assert_eq!(cfg.sim.surface_height, 0.5);
        assert_eq!(cfg.sim.stiffness, ContactModel::default().stiffness);
        assert_eq!(cfg.rig, RigConfig::default());
    }

    #[test]
    fn sim_settings_map_to_contact_model() {
        assert_eq!(SimSettings::default().contact_model(), ContactModel::default());
    }

    #[test]
    fn config_path_points_to_carebot_dir() {
        let p = config_path_for_home("/home/operator");
        assert_eq!(p, PathBuf::from("/home/operator/.carebot/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = \"not a number\"").expect("write");
        assert!(matches!(load_from(&path), Err(CareError::Config(_))));
    }

    #[test]
    fn zero_cell_size_is_rejected_on_load() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sim]\ncell_size = 0.0\n").expect("write");
        match load_from(&path) {
            Err(CareError::Config(msg)) => assert!(msg.contains("cell_size"), "{msg}"),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn empty_patch_is_rejected_on_load() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sim]\npatch_min = [0.3, 0.1]\npatch_max = [0.3, 0.6]\n")
            .expect("write");
        assert!(matches!(load_from(&path), Err(CareError::Config(_))));
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let cfg: Config = toml::from_str("tick_interval_ms = 0\n").expect("parse");
        match cfg.validate() {
            Err(CareError::Config(msg)) => assert!(msg.contains("tick_interval_ms"), "{msg}"),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    // Env-var tests share one function so they never race each other.
    #[test]
    fn env_overrides() {
        // SAFETY: the only test in this crate touching CAREBOT_* variables.
        unsafe {
            std::env::set_var("CAREBOT_PORT", "9100");
            std::env::set_var("CAREBOT_BIND_ADDR", "127.0.0.1");
            std::env::set_var("CAREBOT_TICK_INTERVAL_MS", "5");
            std::env::set_var("CAREBOT_SERVER_URL", "http://robot-host:8000");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.bind_addr, "127.0.0.1");
        assert_eq!(cfg.tick_interval_ms, 5);
        assert_eq!(cfg.server_url, "http://robot-host:8000");

        unsafe {
            std::env::set_var("CAREBOT_PORT", "not-a-port");
            std::env::set_var("CAREBOT_TICK_INTERVAL_MS", "-3");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.tick_interval_ms, 20);

        // resolve() applies overrides even without a file.
        let dir = tempfile::tempdir().expect("tmp dir");
        let cfg = resolve(&dir.path().join("absent.toml")).expect("resolve");
        assert_eq!(cfg.bind_addr, "127.0.0.1");

        // An override that would make the loop spin is refused.
        unsafe { std::env::set_var("CAREBOT_TICK_INTERVAL_MS", "0") };
        assert!(matches!(
            resolve(&dir.path().join("absent.toml")),
            Err(CareError::Config(_))
        ));

        unsafe {
            std::env::remove_var("CAREBOT_PORT");
            std::env::remove_var("CAREBOT_BIND_ADDR");
            std::env::remove_var("CAREBOT_TICK_INTERVAL_MS");
            std::env::remove_var("CAREBOT_SERVER_URL");
        }
    }
}
