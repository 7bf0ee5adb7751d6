pub mod addresses;
pub mod app;
pub mod dispatcher;
pub mod lifecycle;
pub mod mount_table;
pub mod static_assets;

pub use app::AppContext;
pub use dispatcher::{DispatchError, Dispatcher, RouteDecision};
pub use lifecycle::{Lifecycle, LifecycleError, LifecycleState};
pub use mount_table::{Mount, MountTable};
pub use static_assets::StaticAssetServer;
