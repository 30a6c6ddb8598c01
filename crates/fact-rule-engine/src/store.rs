//! 规则集存储管理
//!
//! 规则仓库按 URI 提供规则定义，[`RulesetCache`] 负责编译并缓存结果。
//!
//! ## 缓存刷新策略
//!
//! 每个 URI 一个槽位锁：同一 URI 未命中时只有一个调用方访问仓库并编译，
//! 其余调用方等待同一个结果；不同 URI 互不阻塞。缓存条目超过刷新间隔后重新加载，
//! 刷新失败时使用过期规则集继续服务。

use crate::compiler::{RuleCompiler, RuntimeRules};
use crate::error::{Result, RuleError};
use crate::models::Rule;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// 规则仓库接口
#[cfg_attr(test, mockall::automock)]
pub trait RuleRepository: Send + Sync {
    /// 按 URI 获取规则定义，不存在时返回 None
    fn get(&self, uri: &str) -> Result<Option<Vec<Rule>>>;
}

/// 内存规则仓库
#[derive(Default)]
pub struct InMemoryRuleRepository {
    rulesets: DashMap<String, Vec<Rule>>,
}

impl InMemoryRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ruleset(self, uri: impl Into<String>, rules: Vec<Rule>) -> Self {
        self.insert(uri, rules);
        self
    }

    /// 写入规则集，返回被替换的旧规则集
    pub fn insert(&self, uri: impl Into<String>, rules: Vec<Rule>) -> Option<Vec<Rule>> {
        self.rulesets.insert(uri.into(), rules)
    }

    pub fn remove(&self, uri: &str) -> Option<Vec<Rule>> {
        self.rulesets.remove(uri).map(|(_, rules)| rules)
    }

    pub fn len(&self) -> usize {
        self.rulesets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rulesets.is_empty()
    }
}

impl RuleRepository for InMemoryRuleRepository {
    fn get(&self, uri: &str) -> Result<Option<Vec<Rule>>> {
        Ok(self.rulesets.get(uri).map(|r| r.value().clone()))
    }
}

/// JSON 文件规则仓库：`<dir>/<uri>.json`，内容为规则数组
#[derive(Debug, Clone)]
pub struct JsonFileRuleRepository {
    dir: PathBuf,
}

impl JsonFileRuleRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// URI 对应的文件路径，URI 不能跳出规则目录
    pub fn path_for(&self, uri: &str) -> Result<PathBuf> {
        let relative = Path::new(uri);
        let escapes = uri.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(RuleError::Repository(format!("无效的规则集 URI: '{}'", uri)));
        }
        Ok(self.dir.join(format!("{}.json", uri)))
    }
}

impl RuleRepository for JsonFileRuleRepository {
    fn get(&self, uri: &str) -> Result<Option<Vec<Rule>>> {
        let path = self.path_for(uri)?;
        if !path.is_file() {
            debug!(path = %path.display(), "规则文件不存在");
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let rules: Vec<Rule> = serde_json::from_str(&content)?;
        Ok(Some(rules))
    }
}

#[derive(Debug)]
struct CacheEntry {
    rules: Arc<RuntimeRules>,
    loaded_at: Instant,
}

type Slot = Arc<Mutex<Option<CacheEntry>>>;

/// 已编译规则集缓存
pub struct RulesetCache {
    repository: Arc<dyn RuleRepository>,
    compiler: RuleCompiler,
    refresh_interval: Duration,
    slots: DashMap<String, Slot>,
}

impl RulesetCache {
    pub fn new(
        repository: Arc<dyn RuleRepository>,
        compiler: RuleCompiler,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            repository,
            compiler,
            refresh_interval,
            slots: DashMap::new(),
        }
    }

    pub fn compiler(&self) -> &RuleCompiler {
        &self.compiler
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// 获取已编译规则集，未命中或过期时加载
    ///
    /// 刷新失败且存在旧条目时返回旧条目，下一次调用会再次尝试刷新。
    pub fn get(&self, uri: &str) -> Result<Arc<RuntimeRules>> {
        // 先复制出槽位再加锁，避免持有分片锁访问仓库
        let slot: Slot = self.slots.entry(uri.to_string()).or_default().clone();
        let mut entry = slot.lock();

        if let Some(cached) = entry.as_ref()
            && cached.loaded_at.elapsed() < self.refresh_interval
        {
            return Ok(cached.rules.clone());
        }

        match self.load(uri) {
            Ok(rules) => {
                *entry = Some(CacheEntry {
                    rules: rules.clone(),
                    loaded_at: Instant::now(),
                });
                Ok(rules)
            }
            Err(e) => {
                if let Some(stale) = entry.as_ref() {
                    warn!(
                        uri = %uri,
                        error = %e,
                        "刷新规则集失败，使用过期规则集继续服务"
                    );
                    return Ok(stale.rules.clone());
                }
                drop(entry);
                self.discard_empty_slot(uri, &slot);
                Err(e)
            }
        }
    }

    /// 首次加载失败后移除空槽位，槽位已被替换或已有内容时保留
    fn discard_empty_slot(&self, uri: &str, slot: &Slot) {
        self.slots.remove_if(uri, |_, current| {
            Arc::ptr_eq(current, slot) && current.try_lock().is_some_and(|entry| entry.is_none())
        });
    }

    #[instrument(skip(self))]
    fn load(&self, uri: &str) -> Result<Arc<RuntimeRules>> {
        let start = Instant::now();

        let rules = self
            .repository
            .get(uri)?
            .ok_or_else(|| RuleError::RulesetNotFound(uri.to_string()))?;
        let compiled = self.compiler.compile_ruleset(rules)?;

        metrics::counter!("rule_engine_ruleset_compiles_total").increment(1);
        info!(
            rules_count = compiled.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "规则集已加载"
        );

        Ok(Arc::new(compiled))
    }

    /// 移除单个规则集，下次访问时重新加载
    pub fn evict(&self, uri: &str) -> bool {
        let removed = self.slots.remove(uri).is_some();
        if removed {
            info!(uri = %uri, "规则集缓存已失效");
        }
        removed
    }

    pub fn clear(&self) {
        let count = self.slots.len();
        self.slots.clear();
        info!("已清空 {} 个规则集缓存", count);
    }

    /// 已缓存的规则集 URI（排序）
    ///
    /// 不等待槽位锁，正在加载或刷新的规则集不计入。
    pub fn cached_uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self
            .slots
            .iter()
            .filter(|slot| slot.value().try_lock().is_some_and(|entry| entry.is_some()))
            .map(|slot| slot.key().clone())
            .collect();
        uris.sort();
        uris
    }

    pub fn len(&self) -> usize {
        self.cached_uris().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
