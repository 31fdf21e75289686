pub mod config_watcher;
pub mod logging;
pub mod service;

pub use config_watcher::*;
pub use logging::*;
pub use service::*;
