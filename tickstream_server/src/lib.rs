//! `tickstream_server`
//!
//! Server-side systems:
//! - Connection registry (one session + one entity per connection)
//! - Per-session input queues
//! - Fixed timestep simulation
//! - Snapshot broadcast every N ticks
//!
//! Threading model:
//! - One task per connection reads frames into that session's input queue.
//! - One writer task per connection drains its outbound frame queue.
//! - The tick loop is the only writer of entity state and acks.

pub mod broadcast;
pub mod connection;
pub mod input;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod simulation;

pub use server::GameServer;
