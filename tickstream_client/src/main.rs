//! Headless bot client.
//!
//! Usage:
//!   cargo run -p tickstream_client -- [--addr 127.0.0.1:8086] [--name Bot]
//!       [--every-ms 2000] [--width 800] [--height 600]
//!
//! Connects, then walks to a random point in the field every `--every-ms`
//! milliseconds while logging its own entity from incoming snapshots.

use std::env;
use std::time::Duration;

use anyhow::Context;
use rand::Rng;
use tickstream_client::GameClient;
use tickstream_shared::config::EngineConfig;
use tracing::{debug, info};

struct BotArgs {
    cfg: EngineConfig,
    every: Duration,
    width: f32,
    height: f32,
}

fn parse_args() -> anyhow::Result<BotArgs> {
    let mut bot = BotArgs {
        cfg: EngineConfig {
            player_name: "Bot".to_string(),
            ..Default::default()
        },
        every: Duration::from_millis(2000),
        width: 800.0,
        height: 600.0,
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                bot.cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                bot.cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            "--every-ms" if i + 1 < args.len() => {
                let ms: u64 = args[i + 1].parse().context("--every-ms")?;
                bot.every = Duration::from_millis(ms.max(1));
                i += 2;
            }
            "--width" if i + 1 < args.len() => {
                bot.width = args[i + 1].parse().context("--width")?;
                i += 2;
            }
            "--height" if i + 1 < args.len() => {
                bot.height = args[i + 1].parse().context("--height")?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(bot)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let bot = parse_args()?;
    let mut client = GameClient::connect(&bot.cfg).await.context("connect")?;
    let mut walk = tokio::time::interval(bot.every);

    loop {
        tokio::select! {
            _ = walk.tick() => {
                let (x, y) = {
                    let mut rng = rand::thread_rng();
                    (
                        rng.gen_range(0.0..bot.width.max(1.0)),
                        rng.gen_range(0.0..bot.height.max(1.0)),
                    )
                };
                let seq = client.move_to(x, y).await?;
                info!(seq, x, y, "Walking");
            }
            snap = client.recv_snapshot() => {
                let Some(snap) = snap else {
                    info!("Server closed the connection");
                    return Ok(());
                };
                let ack = snap.ack_seq;
                let others = snap.entities.len().saturating_sub(1);
                if let Some(me) = client.own_entity() {
                    debug!(
                        ack,
                        others,
                        x = me.position.x,
                        y = me.position.y,
                        anim = ?me.anim,
                        "Snapshot"
                    );
                }
            }
        }
    }
}
