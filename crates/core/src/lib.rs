pub mod config;
pub mod logging;

pub use config::*;
pub use logging::init_logging;
pub use dispatch_errors::{DispatchError, DispatchResult};
