//! 函数与动作调用适配
//!
//! 规则中的函数和动作按名称引用，实现由使用方在构建引擎时注册。
//! 编译器只在编译期按名称查找并绑定参数表达式，求值期不做任何反射。

use crate::error::Result;
use crate::models::ValueType;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// 已求值的命名参数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(BTreeMap<String, Value>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// 规范化 JSON 表示，用作缓存键
    ///
    /// serde_json 的 Map 默认按键排序，序列化结果与参数声明顺序无关。
    pub fn cache_key(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

impl FromIterator<(String, Value)> for Arguments {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// 可调用函数
pub trait Invokable: Send + Sync {
    /// 声明的返回类型，用于编译期类型检查
    fn return_type(&self) -> ValueType {
        ValueType::Any
    }

    fn invoke(&self, args: &Arguments) -> Result<Value>;
}

/// 闭包函数适配
struct FnInvokable<F> {
    return_type: ValueType,
    f: F,
}

impl<F> Invokable for FnInvokable<F>
where
    F: Fn(&Arguments) -> Result<Value> + Send + Sync,
{
    fn return_type(&self) -> ValueType {
        self.return_type
    }

    fn invoke(&self, args: &Arguments) -> Result<Value> {
        (self.f)(args)
    }
}

/// 单次求值的停止信号
///
/// 动作可以通过 [`ActionContext::controller`] 请求停止，执行器在处理下一个事实元组之前检查。
#[derive(Debug, Default)]
pub struct EngineController {
    stop_requested: AtomicBool,
}

impl EngineController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

/// 动作执行上下文
pub struct ActionContext<'a> {
    rule_id: &'a str,
    result: &'a mut Value,
    controller: &'a EngineController,
}

impl<'a> ActionContext<'a> {
    pub fn new(rule_id: &'a str, result: &'a mut Value, controller: &'a EngineController) -> Self {
        Self {
            rule_id,
            result,
            controller,
        }
    }

    /// 当前命中的规则 ID
    pub fn rule_id(&self) -> &str {
        self.rule_id
    }

    /// 调用方提供的结果累加器
    pub fn result(&mut self) -> &mut Value {
        self.result
    }

    pub fn controller(&self) -> &EngineController {
        self.controller
    }
}

/// 动作处理器
pub trait ActionHandler: Send + Sync {
    fn execute(&self, args: &Arguments, ctx: &mut ActionContext<'_>) -> Result<()>;
}

impl<F> ActionHandler for F
where
    F: Fn(&Arguments, &mut ActionContext<'_>) -> Result<()> + Send + Sync,
{
    fn execute(&self, args: &Arguments, ctx: &mut ActionContext<'_>) -> Result<()> {
        self(args, ctx)
    }
}

/// 函数注册表
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Invokable>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册函数，同名函数会被替换
    pub fn register(&mut self, name: impl Into<String>, function: Arc<dyn Invokable>) -> &mut Self {
        let name = name.into();
        debug!(function = %name, return_type = %function.return_type(), "注册函数");
        self.functions.insert(name, function);
        self
    }

    /// 以闭包注册函数
    pub fn register_fn<F>(&mut self, name: impl Into<String>, return_type: ValueType, f: F) -> &mut Self
    where
        F: Fn(&Arguments) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnInvokable { return_type, f }))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Invokable>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// 动作注册表
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册动作，同名动作会被替换
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) -> &mut Self {
        let name = name.into();
        debug!(action = %name, "注册动作");
        self.actions.insert(name, handler);
        self
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Arguments, &mut ActionContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(f))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
