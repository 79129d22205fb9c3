//! 共享库
//!
//! 包含表达式引擎与命令行入口共用的配置加载和可观测性基础设施。

pub mod config;
pub mod observability;

pub use config::{AppConfig, CacheSettings, EngineConfig};
pub use observability::ObservabilityConfig;
