//! Ports: the interfaces the dispatch core consumes.
//!
//! Adapters in `crate::adapters` implement them; tests substitute doubles.

pub mod bare;
pub mod file_system;
pub mod http_client;
pub mod http_server;
pub mod tunnel;

pub use bare::BareProxy;
pub use file_system::FileSystem;
pub use http_client::HttpClient;
pub use http_server::HttpServer;
pub use tunnel::TunnelEngine;
