//! Configuration system.
//!
//! Loads engine configuration from JSON strings (file IO left to app) and
//! validates it before the server starts.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::Vec2;

/// Reasons a configuration is rejected.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("tick_hz must be greater than zero")]
    ZeroTickRate,

    #[error("snapshot_hz must be greater than zero")]
    ZeroSnapshotRate,

    #[error("snapshot_hz ({snapshot_hz}) must evenly divide tick_hz ({tick_hz})")]
    SnapshotRateNotDivisor { tick_hz: u32, snapshot_hz: u32 },

    #[error("move_speed must be finite and non-negative, got {0}")]
    InvalidMoveSpeed(f32),

    #[error("spawn position must be finite")]
    InvalidSpawn,

    #[error("outbound_queue must be greater than zero")]
    ZeroOutboundQueue,
}

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Server listen address, e.g. `127.0.0.1:8086`.
    pub server_addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// Snapshot broadcast rate. Must evenly divide `tick_hz`.
    #[serde(default = "default_snapshot_hz")]
    pub snapshot_hz: u32,
    /// Where new entities appear.
    #[serde(default = "default_spawn")]
    pub spawn: Vec2,
    /// Speed applied by `MoveTo`, in units per second.
    #[serde(default = "default_move_speed")]
    pub move_speed: f32,
    /// Encoded frames buffered per session before sends start failing.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    /// Player name (client only).
    #[serde(default = "default_player_name")]
    pub player_name: String,
}

fn default_snapshot_hz() -> u32 {
    10
}

fn default_spawn() -> Vec2 {
    Vec2::new(300.0, 220.0)
}

fn default_move_speed() -> f32 {
    140.0
}

fn default_outbound_queue() -> usize {
    64
}

fn default_player_name() -> String {
    "Player".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8086".to_string(),
            tick_hz: 20,
            snapshot_hz: default_snapshot_hz(),
            spawn: default_spawn(),
            move_speed: default_move_speed(),
            outbound_queue: default_outbound_queue(),
            player_name: default_player_name(),
        }
    }
}

impl EngineConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_hz == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.snapshot_hz == 0 {
            return Err(ConfigError::ZeroSnapshotRate);
        }
        if self.snapshot_hz > self.tick_hz || self.tick_hz % self.snapshot_hz != 0 {
            return Err(ConfigError::SnapshotRateNotDivisor {
                tick_hz: self.tick_hz,
                snapshot_hz: self.snapshot_hz,
            });
        }
        if !self.move_speed.is_finite() || self.move_speed < 0.0 {
            return Err(ConfigError::InvalidMoveSpeed(self.move_speed));
        }
        if !self.spawn.is_finite() {
            return Err(ConfigError::InvalidSpawn);
        }
        if self.outbound_queue == 0 {
            return Err(ConfigError::ZeroOutboundQueue);
        }
        Ok(())
    }

    /// Logical duration of one tick, in seconds.
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_hz as f32
    }

    /// Wall-clock spacing between tick deadlines.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz))
    }

    /// Number of ticks between snapshots. Only meaningful on a validated config.
    pub fn ticks_per_snapshot(&self) -> u64 {
        u64::from((self.tick_hz / self.snapshot_hz.max(1)).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.validate(), Ok(()));
        assert_eq!(cfg.ticks_per_snapshot(), 2);
        assert_eq!(cfg.tick_interval(), Duration::from_millis(50));
        assert!((cfg.dt() - 0.05).abs() < f32::EPSILON);
    }

    #[test]
    fn json_fills_missing_fields() {
        let cfg = EngineConfig::from_json_str(
            r#"{ "server_addr": "0.0.0.0:9000", "tick_hz": 30, "snapshot_hz": 15 }"#,
        )
        .unwrap();
        assert_eq!(cfg.server_addr, "0.0.0.0:9000");
        assert_eq!(cfg.ticks_per_snapshot(), 2);
        assert_eq!(cfg.spawn, Vec2::new(300.0, 220.0));
        assert_eq!(cfg.move_speed, 140.0);
        assert_eq!(cfg.player_name, "Player");
    }

    #[test]
    fn rejects_snapshot_rate_that_does_not_divide() {
        let cfg = EngineConfig {
            tick_hz: 20,
            snapshot_hz: 3,
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::SnapshotRateNotDivisor {
                tick_hz: 20,
                snapshot_hz: 3
            })
        );

        let faster = EngineConfig {
            tick_hz: 10,
            snapshot_hz: 20,
            ..Default::default()
        };
        assert!(faster.validate().is_err());
    }

    #[test]
    fn rejects_zero_rates_and_bad_speed() {
        let zero_tick = EngineConfig {
            tick_hz: 0,
            ..Default::default()
        };
        assert_eq!(zero_tick.validate(), Err(ConfigError::ZeroTickRate));

        let zero_snap = EngineConfig {
            snapshot_hz: 0,
            ..Default::default()
        };
        assert_eq!(zero_snap.validate(), Err(ConfigError::ZeroSnapshotRate));

        let bad_speed = EngineConfig {
            move_speed: -1.0,
            ..Default::default()
        };
        assert_eq!(bad_speed.validate(), Err(ConfigError::InvalidMoveSpeed(-1.0)));
    }
}
