pub mod bare;
pub mod file_system;
pub mod http;
pub mod http_client;
pub mod websocket;
pub mod wisp;

pub use bare::BareServer;
pub use file_system::TowerFileSystem;
pub use http::HyperServer;
pub use http_client::HyperHttpClient;
pub use wisp::WispServer;
