//! Per-connection tasks.
//!
//! Each connection registers a session, then runs two halves:
//! - a writer task forwarding the session's outbound frames to the socket;
//! - the receive loop (this task) decoding frames into the input queue.
//!
//! The session is removed as soon as either half ends, or the task is
//! aborted, whatever the reason.

use std::sync::Arc;

use bytes::Bytes;
use tickstream_shared::{
    entity::EntityId,
    net::{FrameReader, FrameWriter},
    protocol::{decode_client, ClientMsg},
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    task::AbortHandle,
};
use tracing::{debug, trace};

use crate::{
    input::InputSender,
    registry::{Outbound, Registry},
};

/// Serves one connection until the peer goes away or the stream breaks.
pub async fn serve_connection<R, W>(
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    registry: Arc<Registry>,
    outbound_capacity: usize,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(outbound_capacity.max(1));
    let handle = registry.connect(Outbound::new(tx))?;
    let mut writer_task = tokio::spawn(write_outbound(writer, rx, handle.id.clone()));
    let _guard = SessionGuard {
        registry,
        id: handle.id.clone(),
        writer: writer_task.abort_handle(),
    };

    tokio::select! {
        result = read_inbound(reader, &handle.id, &handle.input) => result,
        _ = &mut writer_task => {
            debug!(entity = %handle.id, "Outbound writer ended, closing connection");
            Ok(())
        }
    }
}

/// Removes the session and stops its writer when the connection task ends,
/// including when it is aborted.
struct SessionGuard {
    registry: Arc<Registry>,
    id: EntityId,
    writer: AbortHandle,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.disconnect(&self.id);
        self.writer.abort();
    }
}

async fn read_inbound<R: AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    id: &EntityId,
    input: &InputSender,
) -> anyhow::Result<()> {
    while let Some(frame) = reader.recv().await? {
        match decode_client(&frame) {
            ClientMsg::Hello { version, name } => {
                debug!(entity = %id, version, name = ?name, "Hello ignored, already welcomed");
            }
            ClientMsg::Input(batch) => {
                trace!(entity = %id, seq = batch.sequence, cmds = batch.commands.len(), "Input");
                if !input.push(batch) {
                    break;
                }
            }
            ClientMsg::Invalid(reason) => {
                debug!(entity = %id, %reason, "Dropped undecodable message");
            }
        }
    }
    Ok(())
}

async fn write_outbound<W: AsyncWrite + Unpin>(
    mut writer: FrameWriter<W>,
    mut rx: mpsc::Receiver<Bytes>,
    id: EntityId,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = writer.send(&frame).await {
            debug!(entity = %id, error = %e, "Outbound write failed");
            break;
        }
    }
}
