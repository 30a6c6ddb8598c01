//! 事实规则引擎
//!
//! 可嵌入的规则求值引擎，支持：
//! - JSON 规则定义，编译为可重复执行的谓词和动作
//! - 三值逻辑（true / false / null）的内置操作符，可注册自定义操作符
//! - 按声明类型对输入事实分组，轮询、单实例或笛卡尔积生成事实元组
//! - 已编译规则集缓存（定时刷新）和函数结果缓存
//! - 顺序模式与批量模式两种执行方式

pub mod bindings;
pub mod compiler;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod function_cache;
pub mod invocation;
pub mod models;
pub mod observability;
pub mod operators;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod tuples;

pub use compiler::{ExecutableRule, RuleCompiler, RuntimeRules, RuntimeRulesStats};
pub use config::{EngineConfig, FunctionCacheConfig, FunctionCachePolicy, LogConfig};
pub use error::{Result, RuleError};
pub use evaluator::{CompiledValue, Predicate, Truth};
pub use executor::{
    ErrorHandler, ExecutionContext, FiredRule, LogAndSkip, PropagateErrors, RuleEngine,
    RuleEngineBuilder,
};
pub use function_cache::FunctionCache;
pub use invocation::{
    ActionContext, ActionHandler, ActionRegistry, Arguments, EngineController, FunctionRegistry,
    Invokable,
};
pub use models::{Action, Attribute, Expression, Fact, FactDecl, Parameter, Rule, ValueType};
pub use observability::init_tracing;
pub use operators::{BuiltinOperator, OperatorFactory, OperatorRegistry};
pub use schema::{FieldType, RecordSchema, SchemaRegistry};
pub use store::{InMemoryRuleRepository, JsonFileRuleRepository, RuleRepository, RulesetCache};
pub use tuples::{FactTuple, TupleStrategy};
