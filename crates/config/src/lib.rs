//! 应用配置
//!
//! TOML 文件 + 环境变量覆盖，启动时整体校验

pub mod models;

pub use models::{
    AppConfig, EngineConfig, LoggingConfig, RealtimeConfig, SamplerConfig, SchedulerConfig,
};
