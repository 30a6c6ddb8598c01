//! 规则执行器
//!
//! 一次求值的流程：按 URI 取得已编译规则集，把输入事实按声明类型分组，
//! 选择元组生成策略，再对每个元组按优先级逐条评估规则并执行命中规则的动作。
//!
//! - 顺序模式：命中即执行，后续规则可以看到之前动作对结果的修改
//! - 批量模式（默认）：先评估元组上的全部规则并求值动作参数，再按优先级统一执行

use crate::compiler::{BoundConsequence, ExecutableRule, RuleCompiler, RuntimeRules};
use crate::config::EngineConfig;
use crate::error::{Result, RuleError};
use crate::function_cache::FunctionCache;
use crate::invocation::{
    ActionContext, ActionHandler, ActionRegistry, Arguments, EngineController, FunctionRegistry,
    Invokable,
};
use crate::models::{Fact, Rule, ValueType};
use crate::operators::{OperatorFactory, OperatorRegistry};
use crate::schema::{FieldType, SchemaRegistry};
use crate::store::{RuleRepository, RulesetCache};
use crate::tuples::{FactTuple, TupleGenerator, group_facts};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// 命中并执行的规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FiredRule {
    pub rule_id: String,
    /// 所在元组的序号（从 0 开始）
    pub tuple_index: usize,
}

/// 一次求值的输入和输出
#[derive(Debug)]
pub struct ExecutionContext {
    pub facts: Vec<Fact>,
    /// 动作写入的结果累加器
    pub result: Value,
    pub ruleset_uri: String,
    /// 已编译规则集，存在时不再访问缓存
    pub compiled: Option<Arc<RuntimeRules>>,
    /// 按执行顺序记录的命中规则
    pub fired: Vec<FiredRule>,
    controller: Arc<EngineController>,
}

impl ExecutionContext {
    pub fn new(ruleset_uri: impl Into<String>) -> Self {
        Self {
            facts: Vec::new(),
            result: Value::Object(Default::default()),
            ruleset_uri: ruleset_uri.into(),
            compiled: None,
            fired: Vec::new(),
            controller: Arc::new(EngineController::new()),
        }
    }

    pub fn with_fact(mut self, type_name: impl Into<String>, data: Value) -> Self {
        self.facts.push(Fact::new(type_name, data));
        self
    }

    pub fn with_facts(mut self, facts: impl IntoIterator<Item = Fact>) -> Self {
        self.facts.extend(facts);
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = result;
        self
    }

    pub fn with_compiled(mut self, compiled: Arc<RuntimeRules>) -> Self {
        self.compiled = Some(compiled);
        self
    }

    /// 停止信号，可在求值开始前或动作中请求停止
    pub fn controller(&self) -> &Arc<EngineController> {
        &self.controller
    }

    pub fn fired_rule_ids(&self) -> Vec<&str> {
        self.fired.iter().map(|f| f.rule_id.as_str()).collect()
    }
}

/// 求值错误处理策略
pub trait ErrorHandler: Send + Sync {
    /// 返回 Ok 表示跳过该规则继续求值，返回 Err 中止本次求值
    fn handle(&self, rule_id: &str, error: RuleError) -> Result<()>;
}

/// 中止本次求值（默认）
#[derive(Debug, Default, Clone, Copy)]
pub struct PropagateErrors;

impl ErrorHandler for PropagateErrors {
    fn handle(&self, _rule_id: &str, error: RuleError) -> Result<()> {
        Err(error)
    }
}

/// 记录警告并跳过当前元组上的该规则
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAndSkip;

impl ErrorHandler for LogAndSkip {
    fn handle(&self, rule_id: &str, error: RuleError) -> Result<()> {
        warn!(rule_id = %rule_id, error = %error, "规则求值失败，已跳过");
        Ok(())
    }
}

/// 单个元组上的可变状态
struct TupleRun<'c> {
    index: usize,
    result: &'c mut Value,
    fired: &'c mut Vec<FiredRule>,
    controller: &'c EngineController,
}

/// 规则引擎
pub struct RuleEngine {
    config: EngineConfig,
    cache: RulesetCache,
    error_handler: Arc<dyn ErrorHandler>,
}

impl RuleEngine {
    pub fn builder() -> RuleEngineBuilder {
        RuleEngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ruleset_cache(&self) -> &RulesetCache {
        &self.cache
    }

    pub fn function_cache(&self) -> &Arc<FunctionCache> {
        self.cache.compiler().function_cache()
    }

    /// 直接编译规则集，结果可以放入 [`ExecutionContext::compiled`]
    pub fn compile(&self, rules: Vec<Rule>) -> Result<Arc<RuntimeRules>> {
        self.cache.compiler().compile_ruleset(rules).map(Arc::new)
    }

    /// 失效某个规则集的编译缓存
    pub fn evict(&self, uri: &str) -> bool {
        self.cache.evict(uri)
    }

    /// 执行一次求值
    #[instrument(skip_all, fields(uri = %ctx.ruleset_uri, facts = ctx.facts.len()))]
    pub fn execute(&self, mut ctx: ExecutionContext) -> Result<ExecutionContext> {
        let start = Instant::now();

        let rules = match &ctx.compiled {
            Some(compiled) => compiled.clone(),
            None => {
                let compiled = self.cache.get(&ctx.ruleset_uri)?;
                ctx.compiled = Some(compiled.clone());
                compiled
            }
        };

        let ExecutionContext {
            facts,
            result,
            fired,
            controller,
            ..
        } = &mut ctx;

        let groups = group_facts(facts, &rules.fact_names);
        let mut generator = TupleGenerator::new(groups, self.config.cross_product_mode)?;
        debug!(
            strategy = ?generator.strategy(),
            rules = rules.len(),
            sequential = self.config.sequential_mode,
            "开始求值"
        );

        let mut index = 0usize;
        loop {
            if controller.is_stopped() {
                debug!(tuple_index = index, "收到停止信号，结束求值");
                break;
            }
            let Some(tuple) = generator.next_tuple() else {
                break;
            };

            let mut run = TupleRun {
                index,
                result: &mut *result,
                fired: &mut *fired,
                controller: &**controller,
            };
            if self.config.sequential_mode {
                self.fire_sequential(&rules, &tuple, &mut run)?;
            } else {
                self.fire_batched(&rules, &tuple, &mut run)?;
            }
            index += 1;
        }

        metrics::histogram!("rule_engine_evaluation_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        debug!(
            tuples = index,
            fired = ctx.fired.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "求值完成"
        );

        Ok(ctx)
    }

    /// 评估谓词，命中时求值动作参数
    fn evaluate(
        &self,
        rule: &ExecutableRule,
        tuple: &FactTuple<'_>,
        result: &Value,
        controller: &EngineController,
    ) -> Result<Option<BoundConsequence>> {
        let env = rule.bindings(tuple, result, controller);
        if rule.predicate.matches(&env)? {
            rule.consequence.bind(&env).map(Some)
        } else {
            Ok(None)
        }
    }

    fn fire(&self, rule: &ExecutableRule, bound: &BoundConsequence, run: &mut TupleRun<'_>) -> Result<()> {
        let mut action_ctx = ActionContext::new(&rule.rule_id, run.result, run.controller);
        match bound.fire(&mut action_ctx) {
            Ok(()) => {
                run.fired.push(FiredRule {
                    rule_id: rule.rule_id.clone(),
                    tuple_index: run.index,
                });
                metrics::counter!("rule_engine_rules_fired_total", "rule_id" => rule.rule_id.clone())
                    .increment(1);
                Ok(())
            }
            Err(e) => self.error_handler.handle(&rule.rule_id, e),
        }
    }

    fn fire_sequential(&self, rules: &RuntimeRules, tuple: &FactTuple<'_>, run: &mut TupleRun<'_>) -> Result<()> {
        for rule in rules.iter().filter(|r| r.applies_to(tuple)) {
            match self.evaluate(rule, tuple, run.result, run.controller) {
                Ok(Some(bound)) => self.fire(rule, &bound, run)?,
                Ok(None) => {}
                Err(e) => self.error_handler.handle(&rule.rule_id, e)?,
            }
        }
        Ok(())
    }

    fn fire_batched(&self, rules: &RuntimeRules, tuple: &FactTuple<'_>, run: &mut TupleRun<'_>) -> Result<()> {
        let mut matched = Vec::new();
        for rule in rules.iter().filter(|r| r.applies_to(tuple)) {
            match self.evaluate(rule, tuple, run.result, run.controller) {
                Ok(Some(bound)) => matched.push((rule, bound)),
                Ok(None) => {}
                Err(e) => self.error_handler.handle(&rule.rule_id, e)?,
            }
        }

        for (rule, bound) in &matched {
            self.fire(rule, bound, run)?;
        }
        Ok(())
    }
}

/// 规则引擎构建器
pub struct RuleEngineBuilder {
    config: EngineConfig,
    repository: Option<Arc<dyn RuleRepository>>,
    functions: FunctionRegistry,
    actions: ActionRegistry,
    operators: OperatorRegistry,
    schemas: SchemaRegistry,
    error_handler: Arc<dyn ErrorHandler>,
}

impl RuleEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            repository: None,
            functions: FunctionRegistry::new(),
            actions: ActionRegistry::new(),
            operators: OperatorRegistry::with_defaults(),
            schemas: SchemaRegistry::new(),
            error_handler: Arc::new(PropagateErrors),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn repository(mut self, repository: Arc<dyn RuleRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn function(mut self, name: impl Into<String>, function: Arc<dyn Invokable>) -> Self {
        self.functions.register(name, function);
        self
    }

    pub fn function_fn<F>(mut self, name: impl Into<String>, return_type: ValueType, f: F) -> Self
    where
        F: Fn(&Arguments) -> Result<Value> + Send + Sync + 'static,
    {
        self.functions.register_fn(name, return_type, f);
        self
    }

    pub fn action(mut self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.actions.register(name, handler);
        self
    }

    pub fn action_fn<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Arguments, &mut ActionContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.actions.register_fn(name, f);
        self
    }

    /// 注册或替换操作符
    pub fn operator(mut self, factory: Arc<dyn OperatorFactory>) -> Self {
        self.operators.register(factory);
        self
    }

    pub fn schema(mut self, type_name: impl Into<String>, schema: impl Into<FieldType>) -> Self {
        self.schemas.register(type_name, schema);
        self
    }

    pub fn error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    pub fn build(self) -> Result<RuleEngine> {
        let repository = self
            .repository
            .ok_or_else(|| RuleError::Repository("未配置规则仓库".to_string()))?;

        let function_cache = Arc::new(FunctionCache::new(self.config.function_cache.clone()));
        let compiler = RuleCompiler::new(function_cache)
            .with_operators(Arc::new(self.operators))
            .with_functions(Arc::new(self.functions))
            .with_actions(Arc::new(self.actions))
            .with_schemas(Arc::new(self.schemas))
            .abort_on_compile_error(self.config.abort_on_compile_error)
            .enforce_validity_window(self.config.enforce_validity_window);
        let cache = RulesetCache::new(repository, compiler, self.config.ruleset_cache_refresh());

        Ok(RuleEngine {
            config: self.config,
            cache,
            error_handler: self.error_handler,
        })
    }
}

impl Default for RuleEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
