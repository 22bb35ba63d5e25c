//! Anchorage - an embeddable validating recursive DNS resolver.
//!
//! [`Context`] is the entry point: configure it, then resolve names. The
//! modules below it are public for embedding and benchmarking.

pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod dns;
pub mod error;
pub mod resolver;
pub mod scheduler;
pub mod shard;
pub mod stats;
pub mod transport;
pub mod trust;

#[cfg(test)]
mod test_util;

pub use cache::Security;
pub use config::{Config, ConfigBuilder};
pub use context::Context;
pub use error::{ConfigError, ResolveError, TransportError, WireError};
pub use resolver::{ResolutionResult, ZoneType};
pub use scheduler::QueryHandle;

/// Version of the resolution engine.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
