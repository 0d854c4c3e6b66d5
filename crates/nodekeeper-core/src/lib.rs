//! # nodekeeper-core
//!
//! Core types for nodekeeper, a supervisor for a pair of blockchain node
//! processes: one execution client and one consensus client.
//!
//! ## Core Paradigm
//!
//! - Exactly one supervising instance per installation (the primary)
//! - Every other instance is a dashboard-only view (a secondary)
//! - Client behaviour is chosen once at startup from [`ClientKind`]
//! - Metrics and log failures degrade to placeholders, never to crashes

mod config;
mod error;
pub mod fail_open;
mod types;

pub use config::{
    BackgroundPeerConfig, DashboardSettings, EndpointConfig, IntervalConfig, LaunchSpec,
    NodeConfig, NodePaths,
};
pub use error::{NodeError, Result};
pub use types::*;
