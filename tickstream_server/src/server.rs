//! Server implementation.
//!
//! An authoritative, fixed-timestep server. It owns:
//! - the connection registry (sessions + entities)
//! - the simulation engine
//! - the snapshot broadcaster
//! - the TCP listener
//!
//! Determinism notes:
//! - Keep simulation in a fixed timestep.
//! - Avoid wall-clock-dependent branching in gameplay code.
//! - Use stable ordering when iterating collections.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use chrono::Utc;
use tickstream_shared::{config::EngineConfig, net::ReliableListener};
use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    broadcast::{BroadcastReport, SnapshotBroadcaster},
    connection::serve_connection,
    registry::Registry,
    scheduler::TickScheduler,
    simulation::{Simulation, TickStats},
};

/// What one call to [`GameServer::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub sim: TickStats,
    pub snapshot: Option<BroadcastReport>,
}

/// Result of a console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleOutcome {
    Lines(Vec<String>),
    Quit,
}

/// Game server.
pub struct GameServer {
    pub cfg: EngineConfig,
    registry: Arc<Registry>,
    sim: Simulation,
    broadcaster: SnapshotBroadcaster,

    /// Taken by [`GameServer::run`] for the accept loop.
    tcp: Option<ReliableListener>,
    local_addr: SocketAddr,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
}

impl GameServer {
    /// Validates the config and binds the listener.
    pub async fn new(cfg: EngineConfig) -> anyhow::Result<Self> {
        cfg.validate().context("invalid config")?;
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let tcp = ReliableListener::bind(addr).await?;
        let local_addr = tcp.local_addr()?;

        Ok(Self {
            registry: Arc::new(Registry::new(&cfg)),
            sim: Simulation::new(&cfg),
            broadcaster: SnapshotBroadcaster::new(cfg.ticks_per_snapshot()),
            tcp: Some(tcp),
            local_addr,
            console_rx: None,
            cfg,
        })
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Returns the bound address (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Ticks executed so far.
    pub fn tick(&self) -> u64 {
        self.sim.tick()
    }

    /// Executes one fixed simulation step, then broadcasts if due. The
    /// registry stays locked for the whole tick.
    pub fn step(&mut self) -> TickReport {
        let mut world = self.registry.lock();
        let sim = self.sim.step(&mut world);
        let snapshot = self
            .broadcaster
            .on_tick(&world, Utc::now().timestamp_millis());
        TickReport { sim, snapshot }
    }

    /// Runs the server for a number of ticks without accepting connections.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let mut scheduler = TickScheduler::new(self.cfg.tick_interval(), Instant::now());
        for _ in 0..ticks {
            tokio::time::sleep_until(scheduler.deadline()).await;
            self.step();
            scheduler.advance(Instant::now());
        }
        Ok(())
    }

    /// Accepts connections and ticks until `shutdown` becomes `true` (or its
    /// sender is dropped) or the console asks to quit.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = self.tcp.take().context("server is already running")?;
        let (stop_accepting, accept_stop) = watch::channel(false);
        let acceptor = tokio::spawn(accept_loop(
            listener,
            self.registry.clone(),
            self.cfg.outbound_queue,
            accept_stop,
        ));
        let mut console_rx = self.console_rx.take();
        let mut scheduler = TickScheduler::new(self.cfg.tick_interval(), Instant::now());

        info!(
            addr = %self.local_addr,
            tick_hz = self.cfg.tick_hz,
            snapshot_hz = self.cfg.snapshot_hz,
            "Server running"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(scheduler.deadline()) => {
                    self.step();
                    let skipped = scheduler.advance(Instant::now());
                    if skipped > 0 {
                        warn!(skipped, tick = self.tick(), "Tick overran its slot, skipping");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                line = next_console_line(&mut console_rx) => match line {
                    Some(line) => match self.exec_console(&line) {
                        ConsoleOutcome::Lines(out) => out.iter().for_each(|l| println!("{l}")),
                        ConsoleOutcome::Quit => break,
                    },
                    None => console_rx = None,
                },
            }
        }

        let _ = stop_accepting.send(true);
        if let Err(e) = acceptor.await {
            warn!(error = %e, "Accept loop did not stop cleanly");
        }
        info!(ticks = self.tick(), sessions = self.registry.len(), "Server stopped");
        Ok(())
    }

    /// Executes a console command.
    pub fn exec_console(&self, line: &str) -> ConsoleOutcome {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&cmd) = tokens.first() else {
            return ConsoleOutcome::Lines(Vec::new());
        };

        match cmd {
            "status" => {
                let world = self.registry.lock();
                ConsoleOutcome::Lines(vec![
                    format!("Listening: {}", self.local_addr),
                    format!("Tick: {}", self.sim.tick()),
                    format!(
                        "Rates: {} Hz ticks, {} Hz snapshots",
                        self.cfg.tick_hz, self.cfg.snapshot_hz
                    ),
                    format!("Snapshots sent: {}", self.broadcaster.sent()),
                    format!("Sessions: {}", world.len()),
                ])
            }
            "sessions" => {
                let world = self.registry.lock();
                let mut out = vec![format!("Sessions: {}", world.len())];
                for session in world.sessions() {
                    match world.entity(&session.id) {
                        Some(e) => out.push(format!(
                            "  {}: ack={} pos=({:.1}, {:.1}) vel=({:.1}, {:.1}) anim={:?}",
                            session.id,
                            session.last_acked_seq,
                            e.position.x,
                            e.position.y,
                            e.velocity.x,
                            e.velocity.y,
                            e.anim
                        )),
                        None => out.push(format!(
                            "  {}: ack={} (no entity)",
                            session.id, session.last_acked_seq
                        )),
                    }
                }
                ConsoleOutcome::Lines(out)
            }
            "help" => ConsoleOutcome::Lines(vec![
                "status    - show server status".to_string(),
                "sessions  - list sessions and their entities".to_string(),
                "quit      - stop the server".to_string(),
            ]),
            "quit" | "exit" => {
                info!("Server shutting down");
                ConsoleOutcome::Quit
            }
            other => ConsoleOutcome::Lines(vec![format!("Unknown command: {other}")]),
        }
    }
}

async fn next_console_line(rx: &mut Option<mpsc::Receiver<String>>) -> Option<String> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Accepts connections until `stop` flips, then aborts every connection
/// task and waits for them, which removes their sessions.
async fn accept_loop(
    listener: ReliableListener,
    registry: Arc<Registry>,
    outbound_capacity: usize,
    mut stop: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((conn, peer)) => {
                    let registry = registry.clone();
                    connections.spawn(async move {
                        debug!(%peer, "Connection accepted");
                        let (reader, writer) = conn.into_split();
                        match serve_connection(reader, writer, registry, outbound_capacity).await {
                            Ok(()) => debug!(%peer, "Connection closed"),
                            Err(e) => debug!(%peer, error = %e, "Connection closed with error"),
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
    debug!(connections = connections.len(), "Closing connections");
    connections.shutdown().await;
}

/// Helper for tests: bind to an ephemeral localhost port.
pub async fn bind_ephemeral(
    tick_hz: u32,
    snapshot_hz: u32,
) -> anyhow::Result<(GameServer, EngineConfig)> {
    let cfg = EngineConfig {
        server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
        tick_hz,
        snapshot_hz,
        ..Default::default()
    };
    let server = GameServer::new(cfg).await?;
    let mut cfg = server.cfg.clone();
    cfg.server_addr = server.local_addr().to_string();
    Ok((server, cfg))
}

#[cfg(test)]
mod tests {
    use tickstream_shared::net::ReliableConn;

    use super::*;

    #[tokio::test]
    async fn rejects_invalid_config() {
        let cfg = EngineConfig {
            server_addr: "127.0.0.1:0".into(),
            tick_hz: 20,
            snapshot_hz: 7,
            ..Default::default()
        };
        assert!(GameServer::new(cfg).await.is_err());
    }

    #[tokio::test]
    async fn step_broadcasts_every_nth_tick() -> anyhow::Result<()> {
        let (mut server, _cfg) = bind_ephemeral(20, 10).await?;
        let fired: Vec<bool> = (0..6).map(|_| server.step().snapshot.is_some()).collect();
        assert_eq!(fired, vec![false, true, false, true, false, true]);
        assert_eq!(server.tick(), 6);
        Ok(())
    }

    #[tokio::test]
    async fn console_reports_status_and_quits() -> anyhow::Result<()> {
        let (mut server, _cfg) = bind_ephemeral(20, 10).await?;
        server.step();

        let ConsoleOutcome::Lines(lines) = server.exec_console("status") else {
            panic!("status should print");
        };
        assert!(lines.iter().any(|l| l == "Tick: 1"));
        assert!(lines.iter().any(|l| l == "Sessions: 0"));

        assert_eq!(server.exec_console("  "), ConsoleOutcome::Lines(vec![]));
        assert_eq!(server.exec_console("quit"), ConsoleOutcome::Quit);
        assert!(matches!(
            server.exec_console("warp 1 2"),
            ConsoleOutcome::Lines(l) if l[0].contains("Unknown")
        ));
        Ok(())
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() -> anyhow::Result<()> {
        let (mut server, _cfg) = bind_ephemeral(100, 50).await?;
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            server.run(rx).await?;
            Ok::<_, anyhow::Error>(server.tick())
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true)?;
        let ticks = tokio::time::timeout(Duration::from_secs(2), task).await???;
        assert!(ticks > 0);
        Ok(())
    }

    #[tokio::test]
    async fn stopping_closes_open_connections() -> anyhow::Result<()> {
        let (mut server, cfg) = bind_ephemeral(20, 10).await?;
        let registry = server.registry().clone();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move { server.run(rx).await });

        let addr = cfg.server_addr.parse()?;
        let (mut reader, _writer) = ReliableConn::connect(addr).await?.into_split();
        let welcome = tokio::time::timeout(Duration::from_secs(2), reader.recv()).await??;
        assert!(welcome.is_some());
        assert_eq!(registry.len(), 1);

        tx.send(true)?;
        tokio::time::timeout(Duration::from_secs(2), task).await???;
        assert!(registry.is_empty());

        // The server side of the socket is gone too.
        tokio::time::timeout(Duration::from_secs(2), async {
            while let Ok(Some(_)) = reader.recv().await {}
        })
        .await?;
        Ok(())
    }
}
