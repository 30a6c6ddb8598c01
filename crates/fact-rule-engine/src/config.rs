//! 引擎配置
//!
//! 支持 TOML 配置文件加载和环境变量覆盖。

use crate::error::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// 配置文件名（位于配置目录下）
pub const CONFIG_FILE_NAME: &str = "rule-engine.toml";

/// 环境变量前缀
pub const ENV_PREFIX: &str = "RULE_ENGINE";

/// 单个函数的缓存策略，未设置的项回退到默认值
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FunctionCachePolicy {
    pub cacheable: Option<bool>,
    pub expiration_seconds: Option<u64>,
}

/// 函数结果缓存配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FunctionCacheConfig {
    pub default_cacheable: bool,
    pub default_expiration_seconds: u64,
    /// 函数名 -> 覆盖策略
    pub functions: HashMap<String, FunctionCachePolicy>,
}

impl Default for FunctionCacheConfig {
    fn default() -> Self {
        Self {
            default_cacheable: false,
            default_expiration_seconds: 300,
            functions: HashMap::new(),
        }
    }
}

impl FunctionCacheConfig {
    pub fn is_cacheable(&self, function: &str) -> bool {
        self.functions
            .get(function)
            .and_then(|p| p.cacheable)
            .unwrap_or(self.default_cacheable)
    }

    pub fn expiration(&self, function: &str) -> Duration {
        let seconds = self
            .functions
            .get(function)
            .and_then(|p| p.expiration_seconds)
            .unwrap_or(self.default_expiration_seconds);
        Duration::from_secs(seconds)
    }

    /// 为单个函数设置策略
    pub fn with_function(mut self, function: impl Into<String>, policy: FunctionCachePolicy) -> Self {
        self.functions.insert(function.into(), policy);
        self
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// 日志级别（如 "info", "debug"），RUST_LOG 优先
    pub log_level: String,
    /// 是否输出 JSON 格式日志
    pub json_logs: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 顺序模式：命中即执行，后续规则可见之前动作的副作用
    pub sequential_mode: bool,
    /// 多事实名时生成完整笛卡尔积
    pub cross_product_mode: bool,
    /// 已编译规则集的刷新间隔
    pub ruleset_cache_refresh_seconds: u64,
    /// 任一规则编译失败时中止整个规则集加载；否则跳过该规则
    pub abort_on_compile_error: bool,
    /// 加载时排除不在 startDate/expireDate 有效期内的规则，默认关闭
    pub enforce_validity_window: bool,
    pub function_cache: FunctionCacheConfig,
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sequential_mode: false,
            cross_product_mode: false,
            ruleset_cache_refresh_seconds: 300,
            abort_on_compile_error: true,
            enforce_validity_window: false,
            function_cache: FunctionCacheConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// 从配置目录和环境变量加载配置
    ///
    /// 加载顺序（后加载的覆盖先加载的）：
    /// 1. 内置默认值
    /// 2. {config_dir}/rule-engine.toml（可选）
    /// 3. 环境变量（RULE_ENGINE_ 前缀，嵌套字段用 `__` 分隔，
    ///    如 RULE_ENGINE_FUNCTION_CACHE__DEFAULT_CACHEABLE -> function_cache.default_cacheable）
    pub fn load(config_dir: impl AsRef<Path>) -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::from(config_dir.as_ref().join(CONFIG_FILE_NAME)).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn ruleset_cache_refresh(&self) -> Duration {
        Duration::from_secs(self.ruleset_cache_refresh_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(!config.sequential_mode);
        assert!(!config.cross_product_mode);
        assert!(config.abort_on_compile_error);
        assert!(!config.enforce_validity_window);
        assert_eq!(config.ruleset_cache_refresh(), Duration::from_secs(300));
        assert!(!config.function_cache.default_cacheable);
        assert_eq!(
            config.function_cache.expiration("any"),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_function_policy_fallback() {
        let config = FunctionCacheConfig::default().with_function(
            "exchange_rate",
            FunctionCachePolicy {
                cacheable: Some(true),
                expiration_seconds: None,
            },
        );

        assert!(config.is_cacheable("exchange_rate"));
        assert!(!config.is_cacheable("now"));
        assert_eq!(config.expiration("exchange_rate"), Duration::from_secs(300));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        writeln!(
            file,
            r#"
sequential_mode = true
ruleset_cache_refresh_seconds = 60

[function_cache]
default_cacheable = true

[function_cache.functions.lookup]
cacheable = false
expiration_seconds = 10
"#
        )
        .unwrap();

        let config = EngineConfig::load(dir.path()).unwrap();
        assert!(config.sequential_mode);
        assert!(!config.cross_product_mode);
        assert_eq!(config.ruleset_cache_refresh_seconds, 60);
        assert!(config.function_cache.default_cacheable);
        assert!(!config.function_cache.is_cacheable("lookup"));
        assert_eq!(config.function_cache.expiration("lookup"), Duration::from_secs(10));
        assert!(config.function_cache.is_cacheable("other"));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(config.log, LogConfig::default());
        assert_eq!(config.function_cache, FunctionCacheConfig::default());
    }
}
