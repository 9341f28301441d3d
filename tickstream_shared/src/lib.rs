//! `tickstream_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - One wire format, owned here, so client and server cannot drift apart.
//! - Deterministic encoding (stable field and entity order).
//! - Transport kept separate from message encoding.
//! - No `unsafe`.

pub mod config;
pub mod entity;
pub mod math;
pub mod net;
pub mod protocol;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::entity::*;
    pub use crate::math::*;
    pub use crate::protocol::*;
}
