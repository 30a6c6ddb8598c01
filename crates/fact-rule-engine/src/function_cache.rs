//! 函数结果缓存
//!
//! 同一函数调用可能在多条规则或同一谓词的多处出现。按函数名和已求值参数缓存结果，
//! 是否缓存、缓存多久由每个函数的策略决定，未配置时使用默认策略。

use crate::config::FunctionCacheConfig;
use crate::error::Result;
use crate::invocation::{Arguments, Invokable};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// 每写入这么多条结果清理一次过期条目
pub const SWEEP_INTERVAL: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    function: String,
    arguments: String,
}

#[derive(Debug, Clone)]
struct CachedResult {
    value: Value,
    stored_at: Instant,
    ttl: Duration,
}

impl CachedResult {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }

    fn fresh_value(&self) -> Option<Value> {
        (!self.is_expired()).then(|| self.value.clone())
    }
}

/// 函数结果缓存
pub struct FunctionCache {
    config: FunctionCacheConfig,
    entries: DashMap<CacheKey, CachedResult>,
    inserts: AtomicUsize,
}

impl FunctionCache {
    pub fn new(config: FunctionCacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            inserts: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &FunctionCacheConfig {
        &self.config
    }

    pub fn is_cacheable(&self, function: &str) -> bool {
        self.config.is_cacheable(function)
    }

    pub fn expiration(&self, function: &str) -> Duration {
        self.config.expiration(function)
    }

    /// 调用函数，可缓存的函数优先返回未过期的缓存结果
    ///
    /// 调用失败的结果不会被缓存。查到的过期条目会被移除，
    /// 每写入 [`SWEEP_INTERVAL`] 条结果清理一次全部过期条目。
    pub fn invoke(&self, name: &str, function: &dyn Invokable, args: &Arguments) -> Result<Value> {
        if !self.is_cacheable(name) {
            return function.invoke(args);
        }

        let key = CacheKey {
            function: name.to_string(),
            arguments: args.cache_key(),
        };
        let ttl = self.expiration(name);

        // 先释放读引用再移除，避免在同一分片上死锁
        let cached = self.entries.get(&key).map(|entry| entry.fresh_value());
        match cached {
            Some(Some(value)) => {
                metrics::counter!("rule_engine_function_cache_hits_total", "function" => name.to_string())
                    .increment(1);
                return Ok(value);
            }
            Some(None) => {
                self.entries.remove_if(&key, |_, entry| entry.is_expired());
            }
            None => {}
        }

        metrics::counter!("rule_engine_function_cache_misses_total", "function" => name.to_string())
            .increment(1);

        let value = function.invoke(args)?;
        self.entries.insert(
            key,
            CachedResult {
                value: value.clone(),
                stored_at: Instant::now(),
                ttl,
            },
        );
        debug!(function = %name, "函数结果已缓存");

        if (self.inserts.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
            self.purge_expired();
        }

        Ok(value)
    }

    /// 失效某个函数的全部缓存结果，返回移除的条目数
    pub fn evict(&self, function: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.function != function);
        let removed = before.saturating_sub(self.entries.len());
        info!(function = %function, removed, "函数缓存已失效");
        removed
    }

    /// 移除全部过期条目，返回移除的条目数
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "已清理过期函数缓存");
        }
        removed
    }

    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        info!("已清空 {} 条函数缓存", count);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FunctionCache {
    fn default() -> Self {
        Self::new(FunctionCacheConfig::default())
    }
}
