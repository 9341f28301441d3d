//! Client implementation.
//!
//! The client maintains:
//! - A framed TCP stream to the server
//! - A background reader task decoding server messages into an inbox
//! - A monotonically increasing input sequence, starting at 1
//! - The most recent snapshot

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use tickstream_shared::{
    config::EngineConfig,
    entity::{EntityId, EntityState},
    net::{FrameReader, FrameWriter, ReliableConn, MAX_SERVER_FRAME_LEN},
    protocol::{
        decode_server, encode_client, ClientMsg, Command, InputBatch, ServerMsg, Snapshot,
        PROTOCOL_VERSION,
    },
};
use tokio::{net::tcp::OwnedWriteHalf, sync::mpsc, task::JoinHandle};
use tracing::{debug, info};

const INBOX_CAPACITY: usize = 256;

/// High-level game client.
pub struct GameClient {
    pub self_id: EntityId,
    pub tick_rate: u32,
    pub snapshot_rate: u32,

    writer: FrameWriter<OwnedWriteHalf>,
    inbox: mpsc::Receiver<ServerMsg>,
    reader_task: JoinHandle<()>,
    next_seq: u64,
    last_snapshot: Option<Snapshot>,
}

impl GameClient {
    /// Connects, says hello and waits for the server's welcome.
    pub async fn connect(cfg: &EngineConfig) -> anyhow::Result<Self> {
        let server_addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        info!(server = %server_addr, "Connecting to server");

        let (reader, mut writer) = ReliableConn::connect(server_addr).await?.into_split();
        let reader = reader.with_max_len(MAX_SERVER_FRAME_LEN);
        let (tx, mut inbox) = mpsc::channel(INBOX_CAPACITY);
        let reader_task = tokio::spawn(read_server(reader, tx));

        let hello = ClientMsg::Hello {
            version: PROTOCOL_VERSION,
            name: Some(cfg.player_name.clone()),
        };
        writer.send(&encode_client(&hello)?).await?;

        let welcome = match inbox.recv().await {
            Some(ServerMsg::Welcome(w)) => w,
            Some(other) => anyhow::bail!("expected Welcome, got {other:?}"),
            None => anyhow::bail!("server closed the connection before Welcome"),
        };
        info!(self_id = %welcome.self_id, tick_rate = welcome.tick_rate, "Connected to server");

        Ok(Self {
            self_id: welcome.self_id,
            tick_rate: welcome.tick_rate,
            snapshot_rate: welcome.snapshot_rate,
            writer,
            inbox,
            reader_task,
            next_seq: 1,
            last_snapshot: None,
        })
    }

    /// Sends one input batch and returns the sequence number it was given.
    pub async fn send_commands(&mut self, commands: Vec<Command>) -> anyhow::Result<u64> {
        let sequence = self.next_seq;
        let msg = ClientMsg::Input(InputBatch { sequence, commands });
        self.writer.send(&encode_client(&msg)?).await?;
        self.next_seq += 1;
        Ok(sequence)
    }

    pub async fn move_to(&mut self, x: f32, y: f32) -> anyhow::Result<u64> {
        self.send_commands(vec![Command::MoveTo { x, y }]).await
    }

    pub async fn stop(&mut self) -> anyhow::Result<u64> {
        self.send_commands(vec![Command::Stop]).await
    }

    /// Re-sends `Hello`. The server treats it as a no-op.
    pub async fn say_hello(&mut self, name: Option<String>) -> anyhow::Result<()> {
        let hello = ClientMsg::Hello {
            version: PROTOCOL_VERSION,
            name,
        };
        self.writer.send(&encode_client(&hello)?).await
    }

    /// Waits for the next server message. `None` once the server has gone.
    pub async fn recv(&mut self) -> Option<ServerMsg> {
        let msg = self.inbox.recv().await?;
        if let ServerMsg::State(snap) = &msg {
            self.last_snapshot = Some(snap.clone());
        }
        Some(msg)
    }

    /// Waits for the next snapshot. `None` once the server has gone.
    pub async fn recv_snapshot(&mut self) -> Option<&Snapshot> {
        loop {
            match self.recv().await? {
                ServerMsg::State(_) => break,
                ServerMsg::Welcome(w) => debug!(self_id = %w.self_id, "Extra welcome ignored"),
            }
        }
        self.last_snapshot.as_ref()
    }

    /// Like [`GameClient::recv_snapshot`], giving up after `timeout`.
    pub async fn recv_snapshot_timeout(&mut self, timeout: Duration) -> Option<&Snapshot> {
        tokio::time::timeout(timeout, self.recv_snapshot())
            .await
            .ok()
            .flatten()
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.last_snapshot.as_ref()
    }

    /// This client's own entity in the latest snapshot.
    pub fn own_entity(&self) -> Option<&EntityState> {
        self.last_snapshot
            .as_ref()?
            .entities
            .iter()
            .find(|e| e.id == self.self_id)
    }

    /// Sequence number the next batch will carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_seq
    }
}

impl Drop for GameClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn read_server<R>(mut reader: FrameReader<R>, tx: mpsc::Sender<ServerMsg>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        let frame = match reader.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Server stream broke");
                break;
            }
        };
        match decode_server(&frame) {
            Ok(msg) => {
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(e) => debug!(error = %e, "Dropped undecodable server message"),
        }
    }
}
