//! Harness shared by the socket-level tests: a server running in the
//! background on an ephemeral port, plus a few polling helpers.

use std::time::Duration;

use tickstream_client::GameClient;
use tickstream_server::server::bind_ephemeral;
use tickstream_shared::config::EngineConfig;
use tokio::{sync::watch, task::JoinHandle};
use tracing::info;

/// Installs a test-friendly subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

/// A running server. Stops when dropped.
pub struct TestServer {
    pub cfg: EngineConfig,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestServer {
    pub async fn start(tick_hz: u32, snapshot_hz: u32) -> anyhow::Result<Self> {
        init_tracing();
        let (mut server, cfg) = bind_ephemeral(tick_hz, snapshot_hz).await?;
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(async move { server.run(rx).await });
        info!(addr = %cfg.server_addr, "Test server started");
        Ok(Self {
            cfg,
            shutdown,
            task: Some(task),
        })
    }

    pub async fn client(&self, name: &str) -> anyhow::Result<GameClient> {
        let cfg = EngineConfig {
            player_name: name.to_string(),
            ..self.cfg.clone()
        };
        GameClient::connect(&cfg).await
    }

    /// Signals shutdown and waits for the run loop to return.
    pub async fn stop(mut self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        match self.task.take() {
            Some(task) => tokio::time::timeout(Duration::from_secs(5), task).await??,
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Reads snapshots until `pred` holds for one. Fails if `timeout` elapses
/// or the server closes the connection first.
pub async fn snapshot_where(
    client: &mut GameClient,
    timeout: Duration,
    mut pred: impl FnMut(&GameClient) -> bool,
) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let left = deadline.saturating_duration_since(tokio::time::Instant::now());
        if left.is_zero() {
            anyhow::bail!("no matching snapshot within {timeout:?}");
        }
        if client.recv_snapshot_timeout(left).await.is_none() {
            anyhow::bail!("no matching snapshot within {timeout:?}");
        }
        if pred(client) {
            return Ok(());
        }
    }
}
