//! Simulation engine.
//!
//! One call to [`Simulation::step`] is one tick: every session's input is
//! drained and applied, then every entity is integrated with explicit Euler
//! over the fixed `dt`.
//!
//! Determinism notes:
//! - `dt` never depends on wall-clock time.
//! - Sessions are visited in id order.
//! - Commands overwrite intent; they never compose.

use tickstream_shared::{
    config::EngineConfig,
    entity::{AnimState, EntityState},
    math::Vec2,
    protocol::Command,
};
use tracing::trace;

use crate::registry::World;

/// Per-tick counters, mostly for tracing and the console.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub tick: u64,
    pub updated: usize,
    /// Sessions whose entity was already gone.
    pub skipped: usize,
    pub batches: usize,
    pub commands: usize,
}

/// Sole writer of entity state.
#[derive(Debug, Clone)]
pub struct Simulation {
    dt: f32,
    move_speed: f32,
    tick: u64,
}

impl Simulation {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            dt: cfg.dt(),
            move_speed: cfg.move_speed,
            tick: 0,
        }
    }

    /// Number of ticks executed so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// Executes one fixed simulation step over the whole world.
    pub fn step(&mut self, world: &mut World) -> TickStats {
        self.tick += 1;
        let mut stats = TickStats {
            tick: self.tick,
            ..Default::default()
        };
        let (dt, speed) = (self.dt, self.move_speed);

        world.for_each_mut(|session, entity| {
            let Some(entity) = entity else {
                stats.skipped += 1;
                return;
            };
            let drained = session
                .input
                .drain(&mut session.last_acked_seq, |cmd| apply_command(entity, cmd, speed));
            integrate(entity, dt);

            stats.updated += 1;
            stats.batches += drained.batches;
            stats.commands += drained.commands;
        });

        trace!(
            tick = stats.tick,
            updated = stats.updated,
            skipped = stats.skipped,
            commands = stats.commands,
            "Tick"
        );
        stats
    }
}

/// Applies one command to an entity's intent (velocity and animation).
///
/// A `MoveTo` aimed at the entity's own position, or one whose direction is
/// not finite, behaves exactly like `Stop`.
pub fn apply_command(entity: &mut EntityState, cmd: &Command, move_speed: f32) {
    match *cmd {
        Command::MoveTo { x, y } => {
            let delta = Vec2::new(x, y) - entity.position;
            match delta.try_normalize() {
                Some(dir) => {
                    entity.velocity = dir * move_speed;
                    entity.anim = AnimState::Walk;
                }
                None => stop(entity),
            }
        }
        Command::Stop => stop(entity),
    }
}

fn stop(entity: &mut EntityState) {
    entity.velocity = Vec2::ZERO;
    entity.anim = AnimState::Idle;
}

/// `position += velocity * dt`. No clamping, no collision.
pub fn integrate(entity: &mut EntityState, dt: f32) {
    entity.position += entity.velocity * dt;
}
