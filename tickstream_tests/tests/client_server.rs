//! Full socket-based integration tests for client ↔ server communication.

use std::time::Duration;

use tickstream_shared::{
    entity::{AnimState, EntityId},
    math::Vec2,
    net::ReliableConn,
    protocol::{
        decode_server, encode_client, ClientMsg, Command, InputBatch, ServerMsg,
        PROTOCOL_VERSION,
    },
};
use tickstream_tests::{snapshot_where, TestServer};

const WAIT: Duration = Duration::from_secs(5);

/// Unit-style test: client messages encode to the documented wire schema.
#[test]
fn client_messages_match_wire_schema() -> anyhow::Result<()> {
    let hello = ClientMsg::Hello {
        version: PROTOCOL_VERSION,
        name: None,
    };
    assert_eq!(&encode_client(&hello)?[..], br#"{"t":"hello","v":1}"#);

    let input = ClientMsg::Input(InputBatch {
        sequence: 1,
        commands: vec![Command::MoveTo { x: 500.0, y: 500.0 }, Command::Stop],
    });
    assert_eq!(
        &encode_client(&input)?[..],
        br#"{"t":"input","seq":1,"cmds":[{"k":"moveTo","x":500.0,"y":500.0},{"k":"stop"}]}"#
    );
    Ok(())
}

/// Spawn at (300,220), walk towards (500,500), see it reflected with ack 1.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn move_to_is_acked_and_replicated() -> anyhow::Result<()> {
    let server = TestServer::start(20, 10).await?;
    let mut client = server.client("walker").await?;
    assert_eq!(client.tick_rate, 20);
    assert_eq!(client.snapshot_rate, 10);

    let spawn = Vec2::new(300.0, 220.0);
    snapshot_where(&mut client, WAIT, |c| c.own_entity().is_some()).await?;
    let me = client.own_entity().unwrap().clone();
    assert_eq!(me.position, spawn);
    assert_eq!(me.velocity, Vec2::ZERO);
    assert_eq!(me.anim, AnimState::Idle);
    assert_eq!(client.last_snapshot().unwrap().ack_seq, 0);

    assert_eq!(client.move_to(500.0, 500.0).await?, 1);
    snapshot_where(&mut client, WAIT, |c| {
        c.last_snapshot().map(|s| s.ack_seq) == Some(1)
    })
    .await?;

    let me = client.own_entity().unwrap().clone();
    let expected_v = Vec2::new(200.0, 280.0).try_normalize().unwrap() * 140.0;
    assert!((me.velocity.x - expected_v.x).abs() < 1e-3);
    assert!((me.velocity.y - expected_v.y).abs() < 1e-3);
    assert_eq!(me.anim, AnimState::Walk);

    // Moved a whole number of ticks along the velocity, 7 units per tick.
    let moved = me.position - spawn;
    let step = 140.0 * 0.05;
    let ticks = moved.length() / step;
    assert!(ticks >= 0.999, "moved {moved:?}");
    assert!((ticks - ticks.round()).abs() < 1e-3, "moved {moved:?}");
    let dir = moved.try_normalize().unwrap();
    let expected_dir = expected_v.try_normalize().unwrap();
    assert!((dir.x - expected_dir.x).abs() < 1e-3 && (dir.y - expected_dir.y).abs() < 1e-3);

    assert_eq!(client.stop().await?, 2);
    snapshot_where(&mut client, WAIT, |c| {
        c.last_snapshot().map(|s| s.ack_seq) == Some(2)
    })
    .await?;
    let me = client.own_entity().unwrap();
    assert_eq!(me.velocity, Vec2::ZERO);
    assert_eq!(me.anim, AnimState::Idle);

    server.stop().await
}

/// A departing client vanishes from everyone else's snapshots; the
/// remaining client keeps being simulated.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_removes_entity_from_later_snapshots() -> anyhow::Result<()> {
    let server = TestServer::start(20, 10).await?;
    let mut stayer = server.client("stayer").await?;
    let leaver = server.client("leaver").await?;
    let leaver_id = leaver.self_id.clone();
    assert_ne!(stayer.self_id, leaver_id);

    let has = |id: &EntityId, c: &tickstream_client::GameClient| {
        c.last_snapshot()
            .is_some_and(|s| s.entities.iter().any(|e| &e.id == id))
    };
    snapshot_where(&mut stayer, WAIT, |c| has(&leaver_id, c) && has(&c.self_id, c)).await?;

    drop(leaver);
    snapshot_where(&mut stayer, WAIT, |c| !has(&leaver_id, c)).await?;
    assert!(has(&stayer.self_id, &stayer));

    stayer.move_to(300.0, 0.0).await?;
    snapshot_where(&mut stayer, WAIT, |c| {
        c.own_entity().is_some_and(|e| e.position.y < 220.0)
    })
    .await?;
    assert!(stayer
        .last_snapshot()
        .unwrap()
        .entities
        .iter()
        .all(|e| e.id != leaver_id));

    server.stop().await
}

/// Garbage, unknown messages and repeated hellos are dropped without
/// closing the connection; out-of-order batches converge to the max ack.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bad_input_is_ignored_and_acks_converge() -> anyhow::Result<()> {
    let server = TestServer::start(20, 10).await?;
    let addr = server.cfg.server_addr.parse()?;
    let (mut reader, mut writer) = ReliableConn::connect(addr).await?.into_split();

    let first = tokio::time::timeout(WAIT, reader.recv())
        .await??
        .ok_or_else(|| anyhow::anyhow!("closed before welcome"))?;
    let self_id = match decode_server(&first)? {
        ServerMsg::Welcome(w) => w.self_id,
        other => anyhow::bail!("expected welcome first, got {other:?}"),
    };

    writer.send(b"\x00\x01garbage").await?;
    writer.send(br#"{"t":"teleport","x":1,"y":2}"#).await?;
    writer.send(br#"{"t":"input","seq":-4,"cmds":[]}"#).await?;
    for _ in 0..2 {
        writer
            .send(&encode_client(&ClientMsg::Hello {
                version: PROTOCOL_VERSION,
                name: Some("twice".into()),
            })?)
            .await?;
    }
    for seq in [3u64, 1, 2] {
        let batch = ClientMsg::Input(InputBatch {
            sequence: seq,
            commands: vec![Command::MoveTo {
                x: 1000.0 + seq as f32,
                y: 220.0,
            }],
        });
        writer.send(&encode_client(&batch)?).await?;
    }

    let snap = tokio::time::timeout(WAIT, async {
        loop {
            let frame = reader
                .recv()
                .await?
                .ok_or_else(|| anyhow::anyhow!("server closed the connection"))?;
            if let ServerMsg::State(snap) = decode_server(&frame)? {
                if snap.ack_seq == 3 {
                    return Ok::<_, anyhow::Error>(snap);
                }
                assert!(snap.ack_seq == 0, "ack jumped to {}", snap.ack_seq);
            }
        }
    })
    .await??;

    // Every target lies far along +x at spawn height.
    let me = snap.entities.iter().find(|e| e.id == self_id).unwrap();
    assert!(me.velocity.x > 0.0);
    assert_eq!(me.velocity.y, 0.0);
    assert_eq!(me.anim, AnimState::Walk);

    server.stop().await
}
