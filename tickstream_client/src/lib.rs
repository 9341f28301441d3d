//! `tickstream_client`
//!
//! Client-side systems:
//! - Connection and handshake (`Hello` -> `Welcome`)
//! - Sequenced input batches (`MoveTo` / `Stop`)
//! - Snapshot reception and lookup of the client's own entity
//!
//! Rendering and gesture capture live outside this crate.

pub mod client;

pub use client::GameClient;
