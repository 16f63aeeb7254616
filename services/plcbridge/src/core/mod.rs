//! Controller-facing core: protocol client, guarded access, polling,
//! command dispatch and the servo bridge

pub mod access;
pub mod bootstrap;
pub mod config;
pub mod dispatch;
pub mod mc;
pub mod poller;
pub mod servo;
pub mod store;
pub mod transport;
