//! PLC bridge
//!
//! Owns the single link to a MELSEC controller, polls station registers into
//! an in-memory store, turns named actions into momentary bit pulses and
//! exposes all of it over a small HTTP API.

pub mod api;
pub mod core;
pub mod error;

pub use error::{BridgeError, Result};
