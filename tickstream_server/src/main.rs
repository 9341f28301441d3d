//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p tickstream_server -- [--config server.json] [--addr 127.0.0.1:8086]
//!       [--tick-hz 20] [--snapshot-hz 10] [--speed 140]
//!
//! The server listens for client connections, runs a fixed timestep simulation,
//! and broadcasts snapshots to connected clients.
//!
//! Console commands:
//!   status    - Show server status
//!   sessions  - List sessions and their entities
//!   quit      - Shutdown server

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use tickstream_server::GameServer;
use tickstream_shared::config::EngineConfig;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

fn parse_args() -> anyhow::Result<EngineConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).context("--config needs a path")?;
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read config {path}"))?;
            EngineConfig::from_json_str(&text).with_context(|| format!("parse config {path}"))?
        }
        None => EngineConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => i += 2,
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().context("--tick-hz")?;
                i += 2;
            }
            "--snapshot-hz" if i + 1 < args.len() => {
                cfg.snapshot_hz = args[i + 1].parse().context("--snapshot-hz")?;
                i += 2;
            }
            "--speed" if i + 1 < args.len() => {
                cfg.move_speed = args[i + 1].parse().context("--speed")?;
                i += 2;
            }
            other => {
                warn!(arg = %other, "Ignoring unknown argument");
                i += 1;
            }
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.server_addr, tick_hz = cfg.tick_hz, snapshot_hz = cfg.snapshot_hz, "Starting server");

    let mut server = GameServer::new(cfg).await.context("create server")?;
    info!(local = %server.local_addr(), "Server listening");

    // Set up console input channel.
    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    server.set_console_input(console_rx);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "Ctrl-C handler unavailable");
                // Keep the sender alive so the server keeps running.
                std::future::pending::<()>().await;
            }
        }
    });

    println!("Server ready. Type 'status' for info, 'help' for commands, 'quit' to exit.");
    println!();

    server.run(shutdown_rx).await
}
