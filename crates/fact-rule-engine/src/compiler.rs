//! 规则编译器
//!
//! 把规则 AST 编译成可执行形式：谓词树中的操作符、函数和引用全部在编译期
//! 解析并校验，动作编译为按声明顺序执行的后果链。规则集按优先级降序稳定排序，
//! 被忽略的规则不会进入编译结果；启用有效期检查时，不在有效期内的规则同样被排除。

use crate::bindings::Bindings;
use crate::error::{Result, RuleError};
use crate::evaluator::{CompiledValue, ConstantPredicate, FunctionCall, Predicate, Truth, ValuePredicate};
use crate::function_cache::FunctionCache;
use crate::invocation::{
    ActionContext, ActionHandler, ActionRegistry, Arguments, EngineController, FunctionRegistry,
};
use crate::models::{
    ATTR_EXPIRE_DATE, ATTR_START_DATE, Expression, FactDecl, Parameter, Rule, ValueType,
    parse_datetime,
};
use crate::operators::OperatorRegistry;
use crate::resolver::{RefBase, Reference};
use crate::schema::{FieldType, SchemaRegistry};
use crate::tuples::FactTuple;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 事实名表：声明类型 -> 规则中声明的名称
///
/// 按首次声明的顺序保存 (名称, 类型)，同一名称只能对应一种类型。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactNames {
    entries: Vec<(String, String)>,
}

impl FactNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明事实名，同名不同类型时返回错误信息
    pub fn declare(&mut self, name: &str, type_name: &str) -> std::result::Result<(), String> {
        self.check(name, type_name)?;
        if !self.entries.iter().any(|(n, _)| n == name) {
            self.entries.push((name.to_string(), type_name.to_string()));
        }
        Ok(())
    }

    fn check(&self, name: &str, type_name: &str) -> std::result::Result<(), String> {
        match self.entries.iter().find(|(n, _)| n == name) {
            Some((_, existing)) if existing != type_name => Err(format!(
                "事实名 '{}' 已声明为类型 {}，不能再声明为 {}",
                name, existing, type_name
            )),
            _ => Ok(()),
        }
    }

    /// (名称, 类型)，按声明顺序
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t.as_str()))
    }

    /// 某类型对应的全部名称
    pub fn names_for<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(_, t)| t == type_name)
            .map(|(n, _)| n.as_str())
    }

    pub fn declares_type(&self, type_name: &str) -> bool {
        self.entries.iter().any(|(_, t)| t == type_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 编译后的谓词
#[derive(Debug, Clone)]
pub struct CompiledPredicate(Arc<dyn Predicate>);

impl CompiledPredicate {
    /// 三值结果折叠为布尔值，只有真才算命中
    pub fn matches(&self, env: &Bindings<'_>) -> Result<bool> {
        Ok(self.0.test(env)?.is_true())
    }
}

/// 编译后的动作
#[derive(Clone)]
struct CompiledAction {
    name: String,
    handler: Arc<dyn ActionHandler>,
    params: Vec<(String, CompiledValue)>,
}

impl fmt::Debug for CompiledAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledAction")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// 编译后的后果链
#[derive(Debug, Clone, Default)]
pub struct CompiledConsequence {
    actions: Vec<CompiledAction>,
}

impl CompiledConsequence {
    /// 在当前绑定环境上求值全部动作参数
    pub fn bind(&self, env: &Bindings<'_>) -> Result<BoundConsequence> {
        let mut actions = Vec::with_capacity(self.actions.len());
        for action in &self.actions {
            let mut args = Arguments::new();
            for (name, param) in &action.params {
                args.insert(name.clone(), param.evaluate(env)?);
            }
            actions.push(BoundAction {
                name: action.name.clone(),
                handler: action.handler.clone(),
                args,
            });
        }
        Ok(BoundConsequence { actions })
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|a| a.name.as_str())
    }
}

struct BoundAction {
    name: String,
    handler: Arc<dyn ActionHandler>,
    args: Arguments,
}

/// 参数已求值、等待执行的后果链
pub struct BoundConsequence {
    actions: Vec<BoundAction>,
}

impl BoundConsequence {
    /// 按声明顺序执行动作，遇到第一个失败即返回
    pub fn fire(&self, ctx: &mut ActionContext<'_>) -> Result<()> {
        for action in &self.actions {
            debug!(rule_id = %ctx.rule_id(), action = %action.name, "执行动作");
            action.handler.execute(&action.args, ctx)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// 可执行规则
#[derive(Debug, Clone)]
pub struct ExecutableRule {
    pub rule_id: String,
    pub predicate: CompiledPredicate,
    pub consequence: CompiledConsequence,
    pub attributes: BTreeMap<String, Value>,
    /// 排序依据（优先级）
    pub order: i64,
    pub facts: Vec<FactDecl>,
}

impl ExecutableRule {
    /// 规则声明的事实名是否都已绑定
    pub fn applies_to(&self, tuple: &FactTuple<'_>) -> bool {
        self.facts.iter().all(|f| tuple.contains(&f.name))
    }

    /// 为当前元组创建绑定环境
    pub fn bindings<'a>(
        &'a self,
        tuple: &'a FactTuple<'a>,
        context: &'a Value,
        controller: &'a EngineController,
    ) -> Bindings<'a> {
        Bindings::new(&self.rule_id, &self.attributes, tuple, context, controller)
    }
}

/// 规则集统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeRulesStats {
    pub rule_count: usize,
    pub fact_name_count: usize,
    pub action_count: usize,
}

/// 编译后的规则集
#[derive(Debug, Clone, Default)]
pub struct RuntimeRules {
    pub rules: Vec<ExecutableRule>,
    pub fact_names: FactNames,
}

impl RuntimeRules {
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutableRule> {
        self.rules.iter()
    }

    pub fn rule_ids(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.rule_id.as_str()).collect()
    }

    pub fn stats(&self) -> RuntimeRulesStats {
        RuntimeRulesStats {
            rule_count: self.rules.len(),
            fact_name_count: self.fact_names.len(),
            action_count: self.rules.iter().map(|r| r.consequence.action_count()).sum(),
        }
    }
}

/// 单条规则编译期间的名称作用域
struct Scope<'r> {
    rule_id: &'r str,
    attributes: HashMap<&'r str, FieldType>,
    facts: HashMap<&'r str, FieldType>,
}

/// 规则编译器
#[derive(Clone)]
pub struct RuleCompiler {
    operators: Arc<OperatorRegistry>,
    functions: Arc<FunctionRegistry>,
    actions: Arc<ActionRegistry>,
    schemas: Arc<SchemaRegistry>,
    function_cache: Arc<FunctionCache>,
    abort_on_compile_error: bool,
    enforce_validity_window: bool,
}

impl RuleCompiler {
    pub fn new(function_cache: Arc<FunctionCache>) -> Self {
        Self {
            operators: Arc::new(OperatorRegistry::with_defaults()),
            functions: Arc::new(FunctionRegistry::new()),
            actions: Arc::new(ActionRegistry::new()),
            schemas: Arc::new(SchemaRegistry::new()),
            function_cache,
            abort_on_compile_error: true,
            enforce_validity_window: false,
        }
    }

    pub fn with_operators(mut self, operators: Arc<OperatorRegistry>) -> Self {
        self.operators = operators;
        self
    }

    pub fn with_functions(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_actions(mut self, actions: Arc<ActionRegistry>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_schemas(mut self, schemas: Arc<SchemaRegistry>) -> Self {
        self.schemas = schemas;
        self
    }

    /// 为 false 时跳过编译失败的规则，而不是中止整个规则集
    pub fn abort_on_compile_error(mut self, abort: bool) -> Self {
        self.abort_on_compile_error = abort;
        self
    }

    /// 为 true 时在加载阶段排除不在 startDate/expireDate 有效期内的规则
    ///
    /// 默认关闭，两个属性只作为普通属性供谓词引用。
    pub fn enforce_validity_window(mut self, enforce: bool) -> Self {
        self.enforce_validity_window = enforce;
        self
    }

    pub fn function_cache(&self) -> &Arc<FunctionCache> {
        &self.function_cache
    }

    /// 从 JSON 规则数组编译规则集
    pub fn compile_from_json(&self, json: &str) -> Result<RuntimeRules> {
        let rules: Vec<Rule> = serde_json::from_str(json)?;
        self.compile_ruleset(rules)
    }

    /// 编译规则集，启用有效期检查时以当前时间判断
    pub fn compile_ruleset(&self, rules: Vec<Rule>) -> Result<RuntimeRules> {
        self.compile_ruleset_at(rules, Utc::now())
    }

    /// 编译规则集，启用有效期检查时以给定时间判断
    pub fn compile_ruleset_at(&self, rules: Vec<Rule>, now: DateTime<Utc>) -> Result<RuntimeRules> {
        let total = rules.len();
        let mut active: Vec<Rule> = rules
            .into_iter()
            .filter(|rule| {
                if rule.is_ignored() {
                    debug!(rule = ?rule.name(), "规则已标记忽略");
                    return false;
                }
                true
            })
            .collect();

        // 稳定排序：同优先级保持输入顺序
        active.sort_by_key(|rule| Reverse(rule.priority()));

        let mut compiled = Vec::with_capacity(active.len());
        let mut fact_names = FactNames::new();
        let mut skipped = 0usize;

        for rule in &active {
            let outcome = self
                .check_window(rule, now)
                .and_then(|in_window| match in_window {
                    true => self.compile(rule).map(Some),
                    false => Ok(None),
                })
                .and_then(|executable| match executable {
                    Some(executable) => {
                        Self::declare_facts(&mut fact_names, &executable)?;
                        Ok(Some(executable))
                    }
                    None => Ok(None),
                });

            match outcome {
                Ok(Some(executable)) => compiled.push(executable),
                Ok(None) => {}
                Err(e) if self.abort_on_compile_error => return Err(e),
                Err(e) => {
                    skipped += 1;
                    warn!(rule = ?rule.name(), error = %e, "规则编译失败，已跳过");
                }
            }
        }

        info!(
            total,
            compiled = compiled.len(),
            skipped,
            fact_names = fact_names.len(),
            "规则集编译完成"
        );

        Ok(RuntimeRules {
            rules: compiled,
            fact_names,
        })
    }

    /// 规则的事实名与规则集已有声明冲突时，整条规则都不登记
    fn declare_facts(fact_names: &mut FactNames, rule: &ExecutableRule) -> Result<()> {
        for fact in &rule.facts {
            fact_names
                .check(&fact.name, &fact.type_name)
                .map_err(|m| RuleError::compile(&rule.rule_id, m))?;
        }
        for fact in &rule.facts {
            fact_names
                .declare(&fact.name, &fact.type_name)
                .map_err(|m| RuleError::compile(&rule.rule_id, m))?;
        }
        Ok(())
    }

    /// 规则是否在有效期内：startDate <= now < expireDate
    fn check_window(&self, rule: &Rule, now: DateTime<Utc>) -> Result<bool> {
        if !self.enforce_validity_window {
            return Ok(true);
        }
        let rule_id = rule.name().unwrap_or_default();
        let bound = |name: &str| -> Result<Option<DateTime<Utc>>> {
            match rule.attribute(name).map(|a| &a.value) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => parse_datetime(s).map(Some).ok_or_else(|| {
                    RuleError::compile(rule_id, format!("属性 {} 无法解析为日期时间: '{}'", name, s))
                }),
                Some(other) => Err(RuleError::compile(
                    rule_id,
                    format!("属性 {} 必须是日期时间字符串，实际为 {}", name, other),
                )),
            }
        };

        if let Some(start) = bound(ATTR_START_DATE)?
            && now < start
        {
            debug!(rule = %rule_id, %start, "规则尚未生效");
            return Ok(false);
        }
        if let Some(expire) = bound(ATTR_EXPIRE_DATE)?
            && now >= expire
        {
            debug!(rule = %rule_id, %expire, "规则已过期");
            return Ok(false);
        }
        Ok(true)
    }

    /// 编译单条规则
    pub fn compile(&self, rule: &Rule) -> Result<ExecutableRule> {
        let rule_id = match rule.name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("rule-{}", Uuid::new_v4()),
        };

        let mut attributes = BTreeMap::new();
        let mut attribute_types = HashMap::new();
        for attribute in &rule.attributes {
            if attributes.contains_key(&attribute.name) {
                return Err(RuleError::compile(
                    &rule_id,
                    format!("属性 '{}' 重复声明", attribute.name),
                ));
            }
            if !attribute.value_type.accepts(&attribute.value) {
                return Err(RuleError::compile(
                    &rule_id,
                    format!(
                        "属性 '{}' 声明为 {}，值为 {}",
                        attribute.name, attribute.value_type, attribute.value
                    ),
                ));
            }
            let value_type = match attribute.value_type {
                ValueType::Any => ValueType::of(&attribute.value),
                declared => declared,
            };
            attribute_types.insert(attribute.name.as_str(), FieldType::from(value_type));
            attributes.insert(attribute.name.clone(), attribute.value.clone());
        }

        let mut facts = HashMap::new();
        for fact in &rule.facts {
            if facts
                .insert(fact.name.as_str(), self.schemas.resolve(&fact.type_name))
                .is_some()
            {
                return Err(RuleError::compile(
                    &rule_id,
                    format!("事实名 '{}' 重复声明", fact.name),
                ));
            }
        }

        let scope = Scope {
            rule_id: &rule_id,
            attributes: attribute_types,
            facts,
        };

        let predicate = self.compile_predicate(&scope, &rule.predicate, "predicate")?;

        let mut actions = Vec::with_capacity(rule.actions.len());
        for (i, action) in rule.actions.iter().enumerate() {
            let handler = self.actions.get(&action.name).ok_or_else(|| RuleError::UnknownAction {
                rule: rule_id.clone(),
                name: action.name.clone(),
            })?;
            let path = format!("actions[{}].{}", i, action.name);
            actions.push(CompiledAction {
                name: action.name.clone(),
                handler,
                params: self.compile_params(&scope, &action.params, &path)?,
            });
        }

        debug!(rule_id = %rule_id, actions = actions.len(), "规则编译完成");

        Ok(ExecutableRule {
            predicate: CompiledPredicate(predicate),
            consequence: CompiledConsequence { actions },
            order: rule.priority(),
            facts: rule.facts.clone(),
            attributes,
            rule_id,
        })
    }

    /// 谓词位置的表达式必须是布尔类型
    fn compile_predicate(&self, scope: &Scope<'_>, expr: &Expression, path: &str) -> Result<Arc<dyn Predicate>> {
        match expr {
            Expression::Value { value, .. } if placeholder(value).is_none() => match value {
                Value::Bool(b) => Ok(Arc::new(ConstantPredicate(Truth::from_bool(*b)))),
                Value::Null => Ok(Arc::new(ConstantPredicate(Truth::False))),
                other => Err(RuleError::compile(
                    scope.rule_id,
                    format!("{}: 谓词常量必须是布尔值，实际为 {}", path, other),
                )),
            },
            Expression::Values { .. } => Err(RuleError::compile(
                scope.rule_id,
                format!("{}: 值列表不能作为谓词", path),
            )),
            _ => match self.compile_value(scope, expr, path)? {
                CompiledValue::Predicate(predicate) => Ok(predicate),
                CompiledValue::Function(call) => {
                    let return_type = call.function.return_type();
                    if !matches!(return_type, ValueType::Boolean | ValueType::Any) {
                        return Err(RuleError::compile(
                            scope.rule_id,
                            format!("{}: 函数 {} 的返回类型为 {}，不能作为谓词", path, call.name, return_type),
                        ));
                    }
                    Ok(Arc::new(ValuePredicate(CompiledValue::Function(call))))
                }
                CompiledValue::Reference(reference) => {
                    if !reference.static_type().is_boolean_like() {
                        return Err(RuleError::invalid_reference(
                            scope.rule_id,
                            reference.to_string(),
                            format!("类型为 {}，不能作为谓词", reference.static_type()),
                        ));
                    }
                    Ok(Arc::new(ValuePredicate(CompiledValue::Reference(reference))))
                }
                other => Err(RuleError::compile(
                    scope.rule_id,
                    format!("{}: 类型为 {} 的表达式不能作为谓词", path, other.value_type()),
                )),
            },
        }
    }

    fn compile_value(&self, scope: &Scope<'_>, expr: &Expression, path: &str) -> Result<CompiledValue> {
        match expr {
            Expression::Value { value_type, value } => {
                if let Some(inner) = placeholder(value) {
                    let (name, field) = match inner.split_once('.') {
                        Some((name, field)) => (name, Some(field)),
                        None => (inner, None),
                    };
                    return self.compile_reference(scope, name, field);
                }
                let value_type = match value_type {
                    Some(declared) if !declared.accepts(value) => {
                        return Err(RuleError::compile(
                            scope.rule_id,
                            format!("{}: 常量声明为 {}，值为 {}", path, declared, value),
                        ));
                    }
                    Some(declared) if !value.is_null() => FieldType::from(*declared),
                    _ => ValueType::of(value).into(),
                };
                Ok(CompiledValue::Constant {
                    value: value.clone(),
                    value_type,
                })
            }
            Expression::Values { items } => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.compile_value(scope, item, &format!("{}[{}]", path, i)))
                .collect::<Result<Vec<_>>>()
                .map(CompiledValue::List),
            Expression::Operator { name, operands } => {
                let factory = self.operators.get(name).ok_or_else(|| RuleError::UnknownOperator {
                    rule: scope.rule_id.to_string(),
                    name: name.clone(),
                })?;
                let operand_path = format!("{}.{}", path, name);
                let mut compiled = Vec::with_capacity(operands.len());
                for (i, operand) in operands.iter().enumerate() {
                    compiled.push(self.compile_value(scope, operand, &format!("{}[{}]", operand_path, i))?);
                }
                let predicate = factory
                    .create(compiled)
                    .map_err(|m| RuleError::compile(scope.rule_id, format!("{}: {}", operand_path, m)))?;
                Ok(CompiledValue::Predicate(predicate))
            }
            Expression::Function { name, params } => {
                let function = self.functions.get(name).ok_or_else(|| RuleError::UnknownFunction {
                    rule: scope.rule_id.to_string(),
                    name: name.clone(),
                })?;
                let params = self.compile_params(scope, params, &format!("{}.{}", path, name))?;
                Ok(CompiledValue::Function(FunctionCall {
                    name: name.clone(),
                    function,
                    params,
                    cache: self.function_cache.clone(),
                }))
            }
            Expression::Reference { name, path: field } => {
                self.compile_reference(scope, name, field.as_deref())
            }
        }
    }

    fn compile_params(
        &self,
        scope: &Scope<'_>,
        params: &[Parameter],
        path: &str,
    ) -> Result<Vec<(String, CompiledValue)>> {
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(params.len());
        for param in params {
            if !seen.insert(param.name.as_str()) {
                return Err(RuleError::compile(
                    scope.rule_id,
                    format!("{}: 参数 '{}' 重复", path, param.name),
                ));
            }
            let param_path = format!("{}({})", path, param.name);
            compiled.push((param.name.clone(), self.compile_value(scope, &param.value, &param_path)?));
        }
        Ok(compiled)
    }

    /// 名称查找顺序：规则属性、事实、保留名
    fn compile_reference(&self, scope: &Scope<'_>, name: &str, field: Option<&str>) -> Result<CompiledValue> {
        let (base, base_type) = if let Some(field_type) = scope.attributes.get(name) {
            (RefBase::Named(name.to_string()), field_type.clone())
        } else if let Some(field_type) = scope.facts.get(name) {
            (RefBase::Named(name.to_string()), field_type.clone())
        } else if let Some(reserved) = RefBase::reserved(name) {
            let field_type = reserved.reserved_type();
            (reserved, field_type)
        } else {
            let display = match field {
                Some(field) => format!("{}.{}", name, field),
                None => name.to_string(),
            };
            return Err(RuleError::invalid_reference(scope.rule_id, display, "未声明的名称"));
        };

        Reference::new(base, name, field, &base_type)
            .map(CompiledValue::Reference)
            .map_err(|m| {
                let display = match field {
                    Some(field) => format!("{}.{}", name, field),
                    None => name.to_string(),
                };
                RuleError::invalid_reference(scope.rule_id, display, m)
            })
    }
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new(Arc::new(FunctionCache::default()))
    }
}

/// `${expr}` 形式的字符串常量，返回花括号内的引用表达式
fn placeholder(value: &Value) -> Option<&str> {
    let inner = value.as_str()?.strip_prefix("${")?.strip_suffix('}')?;
    let valid = !inner.is_empty() && !inner.contains(['{', '}', '$']);
    valid.then_some(inner)
}
