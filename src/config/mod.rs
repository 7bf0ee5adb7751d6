pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{ConfigError, load_config, port_from_env, resolve_port};
pub use models::*;
pub use validation::{ConfigValidator, ValidationError};
