//! Wire protocol.
//!
//! Every message is one JSON object carrying a `t` discriminator; commands
//! inside an input batch carry a `k` discriminator. Inbound decoding never
//! fails: anything that is not a well-formed client message becomes
//! [`ClientMsg::Invalid`].

use anyhow::Context;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, EntityState};

/// Protocol version announced in `Hello`.
pub const PROTOCOL_VERSION: u32 = 1;

/// A single unit of client intent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "k")]
pub enum Command {
    /// Walk towards a target point at the configured speed.
    #[serde(rename = "moveTo")]
    MoveTo { x: f32, y: f32 },
    /// Halt in place.
    #[serde(rename = "stop")]
    Stop,
}

/// Client-sequenced batch of commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBatch {
    #[serde(rename = "seq")]
    pub sequence: u64,
    #[serde(rename = "cmds")]
    pub commands: Vec<Command>,
}

/// Client -> server messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ClientMsg {
    #[serde(rename = "hello")]
    Hello {
        #[serde(rename = "v")]
        version: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    #[serde(rename = "input")]
    Input(InputBatch),
    /// Payload that was not a recognizable client message. Never sent.
    #[serde(skip)]
    Invalid(String),
}

/// Sent once, as the first message on a new connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    #[serde(rename = "selfId")]
    pub self_id: EntityId,
    #[serde(rename = "tickRate")]
    pub tick_rate: u32,
    #[serde(rename = "snapRate")]
    pub snapshot_rate: u32,
}

/// Full world state, personalised with the recipient's own ack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unix time in milliseconds when the snapshot was taken.
    #[serde(rename = "stime")]
    pub server_time: i64,
    #[serde(rename = "ackSeq")]
    pub ack_seq: u64,
    #[serde(rename = "ents")]
    pub entities: Vec<EntityState>,
}

/// Server -> client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ServerMsg {
    #[serde(rename = "welcome")]
    Welcome(Welcome),
    #[serde(rename = "state")]
    State(Snapshot),
}

/// Borrowing mirror of [`ServerMsg::State`] so one entity list can be
/// encoded for many recipients without cloning it.
#[derive(Serialize)]
#[serde(tag = "t")]
enum ServerMsgRef<'a> {
    #[serde(rename = "state")]
    State(SnapshotRef<'a>),
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    #[serde(rename = "stime")]
    server_time: i64,
    #[serde(rename = "ackSeq")]
    ack_seq: u64,
    #[serde(rename = "ents")]
    entities: &'a [EntityState],
}

/// Decodes an inbound payload. Malformed JSON, unknown discriminators and
/// ill-typed fields all yield [`ClientMsg::Invalid`].
pub fn decode_client(b: &[u8]) -> ClientMsg {
    serde_json::from_slice(b).unwrap_or_else(|e| ClientMsg::Invalid(e.to_string()))
}

pub fn encode_client(msg: &ClientMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize client msg")?;
    Ok(Bytes::from(payload))
}

pub fn encode_server(msg: &ServerMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize server msg")?;
    Ok(Bytes::from(payload))
}

/// Encodes a `state` message; byte-identical to encoding the equivalent
/// [`ServerMsg::State`].
pub fn encode_snapshot(
    server_time: i64,
    ack_seq: u64,
    entities: &[EntityState],
) -> anyhow::Result<Bytes> {
    let msg = ServerMsgRef::State(SnapshotRef {
        server_time,
        ack_seq,
        entities,
    });
    let payload = serde_json::to_vec(&msg).context("serialize snapshot")?;
    Ok(Bytes::from(payload))
}

pub fn decode_server(b: &[u8]) -> anyhow::Result<ServerMsg> {
    serde_json::from_slice(b).context("deserialize server msg")
}
