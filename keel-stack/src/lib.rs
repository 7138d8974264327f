//! Keel Stack
//!
//! The web application topology: configuration, the component builders,
//! resource schemas, exported outputs and a simulated provider to
//! materialize the stack offline.

pub mod compute;
pub mod config;
pub mod database;
pub mod dns;
pub mod events;
pub mod iam;
pub mod network;
pub mod outputs;
pub mod schemas;
pub mod security;
pub mod simulate;
pub mod stack;
pub mod storage;
pub mod traffic;

pub use config::{ConfigError, ConfigSource, StackConfig};
pub use dns::{HostedZone, StaticZones, ZoneLookup};
pub use outputs::{Output, resolve_outputs};
pub use simulate::SimulatedProvider;
pub use stack::{Derivation, Stack, StackError, derive_stack};
