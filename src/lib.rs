/// Gatehouse - the front door of a web proxy deployment
///
/// One listening socket carries three kinds of traffic:
/// - Bare v3 requests and WebSocket relays under a configurable directory
/// - WISP tunnels on upgrades whose path ends with the tunnel suffix
/// - Static asset bundles from longest-prefix mount points
// Re-export public modules with explicit visibility controls
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod bootstrap;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::bootstrap::build_app;
pub use crate::core::{AppContext, Dispatcher, RouteDecision};
