//! GPMCP Bridge Core - Platform-independent session machinery
//!
//! This crate provides the configuration, error taxonomy and process traits
//! shared by the platform crates, plus the supervisor, connector, relay and
//! coordinator that make up one stdio to TCP bridging session.

mod config;
mod connector;
mod coordinator;
mod error;
mod process;
mod relay;
mod supervisor;

#[cfg(test)]
mod testing;

pub use config::*;
pub use connector::*;
pub use coordinator::*;
pub use error::*;
pub use process::*;
pub use relay::*;
pub use supervisor::*;
