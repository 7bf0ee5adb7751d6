pub mod graceful_shutdown;
pub mod net;
