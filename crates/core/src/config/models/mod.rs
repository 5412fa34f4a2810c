pub mod app_config;
pub mod dispatch;
pub mod logging;

pub use app_config::*;
pub use dispatch::*;
pub use logging::*;
