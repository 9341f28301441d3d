//! Entity model shared by the simulation and the wire protocol.
//!
//! Every connected session owns exactly one entity; the entity id doubles
//! as the session id.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::math::Vec2;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LEN: usize = 12;

/// Opaque entity id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Draws a fresh 12-character base-36 id (~62 bits of entropy).
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let id = (0..ID_LEN)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Two-state animation machine. Commands set it directly; it never decays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimState {
    #[default]
    Idle,
    Walk,
}

/// Authoritative state of one entity, as simulated and as replicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub id: EntityId,
    #[serde(rename = "p")]
    pub position: Vec2,
    #[serde(rename = "v")]
    pub velocity: Vec2,
    #[serde(rename = "a")]
    pub anim: AnimState,
}

impl EntityState {
    /// A freshly spawned entity: at rest and idle.
    pub fn spawn(id: EntityId, position: Vec2) -> Self {
        Self {
            id,
            position,
            velocity: Vec2::ZERO,
            anim: AnimState::Idle,
        }
    }
}
