pub mod app_config;
pub mod sections;

pub use app_config::*;
pub use sections::*;
