//! Connection registry.
//!
//! Sessions and their entities live side by side in one [`World`] behind a
//! single lock. Connect and disconnect take the lock briefly; a tick holds
//! it for its whole duration, so a tick always sees a session together with
//! its entity or sees neither.

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use tickstream_shared::{
    config::EngineConfig,
    entity::{EntityId, EntityState},
    math::Vec2,
    protocol::{encode_server, ServerMsg, Welcome},
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};

use crate::input::{input_channel, InputQueue, InputSender};

/// Why an outbound frame was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// The recipient's queue is full; the frame was dropped.
    Full,
    /// The recipient's writer is gone.
    Closed,
}

/// Non-blocking send handle for one session's encoded frames.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Bytes>,
}

impl Outbound {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    pub fn try_send(&self, frame: Bytes) -> Result<(), SendFailure> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SendFailure::Full,
            TrySendError::Closed(_) => SendFailure::Closed,
        })
    }
}

/// Server-side state of one connection.
#[derive(Debug)]
pub struct Session {
    pub id: EntityId,
    /// Highest input sequence applied so far.
    pub last_acked_seq: u64,
    pub(crate) input: InputQueue,
    pub(crate) outbound: Outbound,
}

/// Everything a tick reads or writes.
#[derive(Debug, Default)]
pub struct World {
    sessions: BTreeMap<EntityId, Session>,
    entities: BTreeMap<EntityId, EntityState>,
}

impl World {
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn session(&self, id: &EntityId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn entity(&self, id: &EntityId) -> Option<&EntityState> {
        self.entities.get(id)
    }

    /// Sessions in id order.
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityState> {
        self.entities.values()
    }

    fn insert(&mut self, session: Session, entity: EntityState) {
        self.entities.insert(session.id.clone(), entity);
        self.sessions.insert(session.id.clone(), session);
    }

    fn remove(&mut self, id: &EntityId) -> bool {
        let session = self.sessions.remove(id);
        let entity = self.entities.remove(id);
        session.is_some() || entity.is_some()
    }

    /// Visits every session with its entity, if it still has one. This is
    /// the only mutable access to entity state.
    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(&mut Session, Option<&mut EntityState>)) {
        for (id, session) in self.sessions.iter_mut() {
            f(session, self.entities.get_mut(id));
        }
    }

    #[cfg(test)]
    pub(crate) fn detach_entity(&mut self, id: &EntityId) -> Option<EntityState> {
        self.entities.remove(id)
    }
}

/// What a connection task keeps after registering.
#[derive(Debug)]
pub struct SessionHandle {
    pub id: EntityId,
    pub input: InputSender,
}

/// Owner of the [`World`]. Shared between the tick loop and connection tasks.
#[derive(Debug)]
pub struct Registry {
    world: Mutex<World>,
    spawn: Vec2,
    tick_rate: u32,
    snapshot_rate: u32,
}

impl Registry {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            world: Mutex::new(World::default()),
            spawn: cfg.spawn,
            tick_rate: cfg.tick_hz,
            snapshot_rate: cfg.snapshot_hz,
        }
    }

    /// Registers a new connection: fresh id, session, entity at the spawn
    /// point. `Welcome` is queued on `outbound` before the lock is released,
    /// so it always precedes the first snapshot.
    pub fn connect(&self, outbound: Outbound) -> anyhow::Result<SessionHandle> {
        let mut world = self.lock();

        let mut rng = rand::thread_rng();
        let id = loop {
            let candidate = EntityId::random(&mut rng);
            if !world.contains(&candidate) {
                break candidate;
            }
        };

        let welcome = encode_server(&ServerMsg::Welcome(Welcome {
            self_id: id.clone(),
            tick_rate: self.tick_rate,
            snapshot_rate: self.snapshot_rate,
        }))?;
        if let Err(failure) = outbound.try_send(welcome) {
            debug!(entity = %id, ?failure, "Welcome not queued");
        }

        let (input_tx, input_rx) = input_channel();
        world.insert(
            Session {
                id: id.clone(),
                last_acked_seq: 0,
                input: input_rx,
                outbound,
            },
            EntityState::spawn(id.clone(), self.spawn),
        );

        info!(entity = %id, sessions = world.len(), "Session registered");
        Ok(SessionHandle {
            id,
            input: input_tx,
        })
    }

    /// Removes the session and its entity together. Returns `false` if the
    /// id was not registered.
    pub fn disconnect(&self, id: &EntityId) -> bool {
        let mut world = self.lock();
        let removed = world.remove(id);
        if removed {
            info!(entity = %id, sessions = world.len(), "Session removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Locks the world, recovering from poisoning.
    pub fn lock(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
