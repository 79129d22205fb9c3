//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::observability::ObservabilityConfig;

/// 单个缓存池的容量与存活时间
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// 最大条目数，超出时淘汰最久未使用的条目
    pub capacity: usize,
    /// 条目的绝对存活时间（秒），与访问频率无关
    pub ttl_seconds: u64,
}

impl CacheSettings {
    pub fn new(capacity: usize, ttl_seconds: u64) -> Self {
        Self {
            capacity,
            ttl_seconds,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 1000,
            ttl_seconds: 3600,
        }
    }
}

/// 表达式引擎配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 编译后表达式程序的缓存
    pub expression_cache: CacheSettings,
    /// 编译后正则表达式的缓存
    pub pattern_cache: CacheSettings,
    /// 占位符展开的最大轮数
    pub max_expansion_depth: usize,
    /// 是否注册 timeBetween / dayOfWeekIn 两个时间谓词
    pub time_predicates: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            expression_cache: CacheSettings::default(),
            pattern_cache: CacheSettings::new(500, 3600),
            max_expansion_depth: 10,
            time_predicates: true,
        }
    }
}

impl EngineConfig {
    /// 校验配置取值
    ///
    /// 容量、存活时间和展开轮数都必须大于零。
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, settings) in [
            ("expression_cache", &self.expression_cache),
            ("pattern_cache", &self.pattern_cache),
        ] {
            if settings.capacity == 0 {
                return Err(ConfigError::Message(format!(
                    "engine.{}.capacity 必须大于 0",
                    name
                )));
            }
            if settings.ttl_seconds == 0 {
                return Err(ConfigError::Message(format!(
                    "engine.{}.ttl_seconds 必须大于 0",
                    name
                )));
            }
        }

        if self.max_expansion_depth == 0 {
            return Err(ConfigError::Message(
                "engine.max_expansion_depth 必须大于 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 配置目录取自 `CONFIG_DIR` 环境变量，缺省为 `config`。
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
        Self::load_from(&config_dir, service_name)
    }

    /// 从指定目录加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. {dir}/default.toml（默认配置）
    /// 2. {dir}/{environment}.toml（环境特定配置）
    /// 3. {dir}/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（FILTER_ 前缀，层级用双下划线分隔，
    ///    如 FILTER_ENGINE__EXPRESSION_CACHE__CAPACITY -> engine.expression_cache.capacity）
    pub fn load_from(config_dir: impl AsRef<Path>, service_name: &str) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let env = std::env::var("FILTER_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            .add_source(
                Environment::with_prefix("FILTER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        config.engine.validate()?;

        Ok(config)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_config_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "filter-shared-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.expression_cache.capacity, 1000);
        assert_eq!(config.expression_cache.ttl_seconds, 3600);
        assert_eq!(config.pattern_cache.capacity, 500);
        assert_eq!(config.max_expansion_depth, 10);
        assert!(config.time_predicates);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = EngineConfig {
            expression_cache: CacheSettings::new(0, 60),
            ..Default::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("expression_cache.capacity"));
    }

    #[test]
    fn test_validate_rejects_zero_ttl_and_depth() {
        let config = EngineConfig {
            pattern_cache: CacheSettings::new(10, 0),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            max_expansion_depth: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let dir = temp_config_dir("missing").join("does-not-exist");
        let config = AppConfig::load_from(&dir, "filter-eval").unwrap();

        assert_eq!(config.service_name, "filter-eval");
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_load_from_service_file() {
        let dir = temp_config_dir("service");
        let mut file = std::fs::File::create(dir.join("filter-eval-test.toml")).unwrap();
        writeln!(
            file,
            r#"
[engine]
max_expansion_depth = 4
time_predicates = false

[engine.expression_cache]
capacity = 64
ttl_seconds = 30
"#
        )
        .unwrap();

        let config = AppConfig::load_from(&dir, "filter-eval-test").unwrap();

        assert_eq!(config.engine.expression_cache, CacheSettings::new(64, 30));
        // 未配置的节保持默认值
        assert_eq!(config.engine.pattern_cache, CacheSettings::new(500, 3600));
        assert_eq!(config.engine.max_expansion_depth, 4);
        assert!(!config.engine.time_predicates);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_from_rejects_invalid_engine_section() {
        let dir = temp_config_dir("invalid");
        let mut file = std::fs::File::create(dir.join("filter-eval-invalid.toml")).unwrap();
        writeln!(file, "[engine.pattern_cache]\ncapacity = 0").unwrap();

        let result = AppConfig::load_from(&dir, "filter-eval-invalid");
        assert!(result.is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
