//! `carebot` – command line entry point.
//!
//! * `carebot serve` (default) starts the control loop on its own thread,
//!   then binds the operator endpoints and serves until Ctrl-C.
//! * `carebot teleop` opens the interactive console against a running server.
//! * `carebot init` writes a default `~/.carebot/config.toml`.

mod config;
mod teleop;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use carebot_cockpit::{AppState, CockpitServer};
use carebot_hal::KinematicSim;
use carebot_runtime::{ControlLoop, ControlLoopConfig, Rig, command_queue, init_tracing};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::Notify;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "carebot", version, about = "Teleoperation core for a simulated care robot")]
struct Cli {
    /// Config file (default `~/.carebot/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the HTTP port.
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone)]
enum Mode {
    /// Run the control loop and the operator endpoints.
    Serve,
    /// Interactive console for a running server.
    Teleop {
        /// Server base URL (default from config).
        #[arg(long)]
        server: Option<String>,
    },
    /// Write the default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing("carebot");

    let path = cli.config.clone().unwrap_or_else(config::config_path);
    let mut cfg = config::resolve(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    if let Some(port) = cli.port {
        cfg.port = port;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let notify = Arc::new(Notify::new());
    install_ctrlc(Arc::clone(&shutdown), Arc::clone(&notify));

    match cli.command.unwrap_or(Mode::Serve) {
        Mode::Serve => serve(cfg, shutdown, notify),
        Mode::Teleop { server } => {
            print_banner();
            let url = server.unwrap_or_else(|| cfg.server_url.clone());
            teleop::run(&url, shutdown);
            Ok(())
        }
        Mode::Init { force } => init(&cfg, &path, force),
    }
}

fn serve(cfg: config::Config, shutdown: Arc<AtomicBool>, notify: Arc<Notify>) -> Result<()> {
    print_banner();

    let sim = KinematicSim::for_rig_with(&cfg.rig, cfg.sim.contact_model());
    let rig = Rig::new(sim, cfg.rig);
    let (commands, queue) = command_queue();
    let loop_config = ControlLoopConfig {
        tick_interval: Duration::from_millis(cfg.tick_interval_ms),
        ..ControlLoopConfig::default()
    };
    let handle = ControlLoop::new(rig, queue, loop_config)
        .with_shutdown_flag(Arc::clone(&shutdown))
        .spawn()
        .context("starting control loop")?;
    info!(tick_interval_ms = cfg.tick_interval_ms, "control loop running");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    let state = AppState {
        commands,
        snapshots: handle.snapshots(),
        watchdog: handle.watchdog(),
    };
    let server = CockpitServer::new(state)
        .with_bind_addr(cfg.bind_addr.clone())
        .with_port(cfg.port);

    let served = runtime.block_on(async move {
        let listener = server.bind().await?;
        println!(
            "  Operator endpoints on {}",
            format!("http://{}:{}", cfg.bind_addr, cfg.port).bold()
        );
        server
            .serve(listener, async move { notify.notified().await })
            .await
    });

    handle.join();
    served.context("operator endpoints")?;
    println!("{}", "  ✓ CareBot stopped.".green());
    Ok(())
}

fn init(cfg: &config::Config, path: &std::path::Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!(
            "  {} already exists; pass {} to overwrite.",
            path.display().to_string().bold(),
            "--force".bold()
        );
        return Ok(());
    }
    config::save_to(cfg, path).with_context(|| format!("writing {}", path.display()))?;
    println!(
        "  {} Config saved to {}",
        "✓".green().bold(),
        path.display().to_string().bold()
    );
    Ok(())
}

fn install_ctrlc(shutdown: Arc<AtomicBool>, notify: Arc<Notify>) {
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown.store(true, Ordering::SeqCst);
        notify.notify_one();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }
}

fn print_banner() {
    println!();
    println!("  {} {}", "CareBot".bold().cyan(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Teleoperation core for a simulated care robot");
    println!();
}
