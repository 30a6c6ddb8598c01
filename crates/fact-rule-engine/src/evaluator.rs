//! 条件评估器
//!
//! 编译后的值节点和谓词节点，在绑定环境上求值。
//! 谓词内部使用三值逻辑（真、假、空），在规则层面折叠为布尔结果。

use crate::bindings::Bindings;
use crate::error::{Result, RuleError};
use crate::function_cache::FunctionCache;
use crate::invocation::{Arguments, Invokable};
use crate::models::{ValueType, parse_datetime};
use crate::resolver::Reference;
use crate::schema::FieldType;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// 三值逻辑结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Null,
}

impl Truth {
    pub fn from_bool(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }

    /// 布尔值或 null 转换为三值结果，其他类型为类型错误
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(Self::from_bool(*b)),
            Value::Null => Ok(Self::Null),
            other => Err(RuleError::type_mismatch("boolean", type_name(other))),
        }
    }

    pub fn is_true(self) -> bool {
        matches!(self, Self::True)
    }

    pub fn to_value(self) -> Value {
        match self {
            Self::True => Value::Bool(true),
            Self::False => Value::Bool(false),
            Self::Null => Value::Null,
        }
    }
}

/// 编译后的谓词
pub trait Predicate: Send + Sync + fmt::Debug {
    fn test(&self, env: &Bindings<'_>) -> Result<Truth>;
}

/// 编译后的函数调用
#[derive(Clone)]
pub struct FunctionCall {
    pub name: String,
    pub function: Arc<dyn Invokable>,
    pub params: Vec<(String, CompiledValue)>,
    pub cache: Arc<FunctionCache>,
}

impl FunctionCall {
    /// 先求值全部参数，再经过函数结果缓存调用
    pub fn call(&self, env: &Bindings<'_>) -> Result<Value> {
        let mut args = Arguments::new();
        for (name, param) in &self.params {
            args.insert(name.clone(), param.evaluate(env)?);
        }
        self.cache.invoke(&self.name, self.function.as_ref(), &args)
    }
}

impl fmt::Debug for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCall")
            .field("name", &self.name)
            .field("return_type", &self.function.return_type())
            .field("params", &self.params)
            .finish()
    }
}

/// 编译后的值表达式
#[derive(Debug, Clone)]
pub enum CompiledValue {
    Constant { value: Value, value_type: FieldType },
    List(Vec<CompiledValue>),
    Reference(Reference),
    Function(FunctionCall),
    Predicate(Arc<dyn Predicate>),
}

impl CompiledValue {
    /// 常量，静态类型由值推断
    pub fn constant(value: Value) -> Self {
        let value_type = ValueType::of(&value).into();
        Self::Constant { value, value_type }
    }

    pub fn evaluate(&self, env: &Bindings<'_>) -> Result<Value> {
        match self {
            Self::Constant { value, .. } => Ok(value.clone()),
            Self::List(items) => items
                .iter()
                .map(|item| item.evaluate(env))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Self::Reference(reference) => reference.resolve(env),
            Self::Function(call) => call.call(env),
            Self::Predicate(predicate) => predicate.test(env).map(Truth::to_value),
        }
    }

    /// 作为谓词求值
    pub fn truth(&self, env: &Bindings<'_>) -> Result<Truth> {
        match self {
            Self::Predicate(predicate) => predicate.test(env),
            other => Truth::from_value(&other.evaluate(env)?),
        }
    }

    /// 静态类型
    pub fn value_type(&self) -> FieldType {
        match self {
            Self::Constant { value_type, .. } => value_type.clone(),
            Self::List(items) => {
                let mut types = items.iter().map(CompiledValue::value_type);
                let element = match types.next() {
                    Some(first) if types.all(|t| t == first) => first,
                    _ => FieldType::Any,
                };
                FieldType::list(element)
            }
            Self::Reference(reference) => reference.static_type().clone(),
            Self::Function(call) => call.function.return_type().into(),
            Self::Predicate(_) => FieldType::Boolean,
        }
    }

    /// 常量字符串（用于编译期预编译正则）
    pub fn as_constant_str(&self) -> Option<&str> {
        match self {
            Self::Constant { value, .. } => value.as_str(),
            _ => None,
        }
    }
}

/// 常量谓词
#[derive(Debug)]
pub struct ConstantPredicate(pub Truth);

impl Predicate for ConstantPredicate {
    fn test(&self, _env: &Bindings<'_>) -> Result<Truth> {
        Ok(self.0)
    }
}

/// 布尔值谓词：引用或函数的结果直接作为谓词
#[derive(Debug)]
pub struct ValuePredicate(pub CompiledValue);

impl Predicate for ValuePredicate {
    fn test(&self, env: &Bindings<'_>) -> Result<Truth> {
        self.0.truth(env)
    }
}

/// and：遇到第一个假或空即为假
#[derive(Debug)]
pub struct AndPredicate(pub Vec<CompiledValue>);

impl Predicate for AndPredicate {
    fn test(&self, env: &Bindings<'_>) -> Result<Truth> {
        for operand in &self.0 {
            if !operand.truth(env)?.is_true() {
                return Ok(Truth::False);
            }
        }
        Ok(Truth::True)
    }
}

/// or：遇到第一个真即为真
#[derive(Debug)]
pub struct OrPredicate(pub Vec<CompiledValue>);

impl Predicate for OrPredicate {
    fn test(&self, env: &Bindings<'_>) -> Result<Truth> {
        for operand in &self.0 {
            if operand.truth(env)?.is_true() {
                return Ok(Truth::True);
            }
        }
        Ok(Truth::False)
    }
}

/// not：not(null) 为假
#[derive(Debug)]
pub struct NotPredicate(pub CompiledValue);

impl Predicate for NotPredicate {
    fn test(&self, env: &Bindings<'_>) -> Result<Truth> {
        Ok(Truth::from_bool(self.0.truth(env)? == Truth::False))
    }
}

/// 单操作数检查
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    IsTrue,
    IsFalse,
    IsNull,
}

#[derive(Debug)]
pub struct CheckPredicate {
    pub check: Check,
    pub operand: CompiledValue,
}

impl Predicate for CheckPredicate {
    fn test(&self, env: &Bindings<'_>) -> Result<Truth> {
        let result = match self.check {
            Check::IsNull => self.operand.evaluate(env)?.is_null(),
            Check::IsTrue => self.operand.truth(env)? == Truth::True,
            Check::IsFalse => self.operand.truth(env)? == Truth::False,
        };
        Ok(Truth::from_bool(result))
    }
}

/// 关系运算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Equal,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Relation {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Equal => ordering == Ordering::Equal,
            Self::Less => ordering == Ordering::Less,
            Self::LessOrEqual => ordering != Ordering::Greater,
            Self::Greater => ordering == Ordering::Greater,
            Self::GreaterOrEqual => ordering != Ordering::Less,
        }
    }
}

/// 关系谓词：任一操作数为 null 时为假
#[derive(Debug)]
pub struct RelationalPredicate {
    pub relation: Relation,
    pub left: CompiledValue,
    pub right: CompiledValue,
}

impl Predicate for RelationalPredicate {
    fn test(&self, env: &Bindings<'_>) -> Result<Truth> {
        let left = self.left.evaluate(env)?;
        if left.is_null() {
            return Ok(Truth::False);
        }
        let right = self.right.evaluate(env)?;
        if right.is_null() {
            return Ok(Truth::False);
        }

        let result = match self.relation {
            Relation::Equal => values_equal(&left, &right),
            relation => relation.holds(compare(&left, &right)?),
        };
        Ok(Truth::from_bool(result))
    }
}

/// 正则来源：常量模式在编译期预编译
#[derive(Debug)]
pub enum Pattern {
    Compiled(Regex),
    Dynamic(CompiledValue),
}

/// match：左侧字符串完整匹配右侧正则
#[derive(Debug)]
pub struct MatchPredicate {
    subject: CompiledValue,
    pattern: Pattern,
}

impl MatchPredicate {
    /// 常量模式在这里校验，无效时返回错误信息
    pub fn new(subject: CompiledValue, pattern: CompiledValue) -> std::result::Result<Self, String> {
        let pattern = match pattern.as_constant_str() {
            Some(source) => Pattern::Compiled(
                full_match_regex(source).map_err(|e| format!("无效的正则表达式 '{}': {}", source, e))?,
            ),
            None => Pattern::Dynamic(pattern),
        };
        Ok(Self { subject, pattern })
    }
}

impl Predicate for MatchPredicate {
    fn test(&self, env: &Bindings<'_>) -> Result<Truth> {
        let subject = self.subject.evaluate(env)?;
        let text = match &subject {
            Value::Null => return Ok(Truth::False),
            Value::String(s) => s,
            other => return Err(RuleError::type_mismatch("string", type_name(other))),
        };

        let matched = match &self.pattern {
            Pattern::Compiled(regex) => regex.is_match(text),
            Pattern::Dynamic(value) => match value.evaluate(env)? {
                Value::Null => return Ok(Truth::False),
                Value::String(source) => full_match_regex(&source)
                    .map_err(|e| RuleError::invocation("match", e))?
                    .is_match(text),
                other => {
                    return Err(RuleError::type_mismatch(
                        "string (regex pattern)",
                        type_name(&other),
                    ));
                }
            },
        };
        Ok(Truth::from_bool(matched))
    }
}

fn full_match_regex(source: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", source))
}

/// 包含语义
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    /// 集合包含全部元素
    All,
    /// 集合包含任意一个元素
    Any,
}

/// contains / contains-any：标量元素视为单元素列表
#[derive(Debug)]
pub struct ContainsPredicate {
    pub containment: Containment,
    pub collection: CompiledValue,
    pub elements: CompiledValue,
}

impl Predicate for ContainsPredicate {
    fn test(&self, env: &Bindings<'_>) -> Result<Truth> {
        let collection = self.collection.evaluate(env)?;
        let items = match &collection {
            Value::Null => return Ok(Truth::False),
            Value::Array(items) => items,
            other => return Err(RuleError::type_mismatch("array", type_name(other))),
        };

        let elements = self.elements.evaluate(env)?;
        let needles = match &elements {
            Value::Null => return Ok(Truth::False),
            Value::Array(needles) => needles.as_slice(),
            scalar => std::slice::from_ref(scalar),
        };

        let found = |needle: &Value| items.iter().any(|item| values_equal(item, needle));
        let result = match self.containment {
            Containment::All => needles.iter().all(found),
            Containment::Any => needles.iter().any(found),
        };
        Ok(Truth::from_bool(result))
    }
}

/// 值相等：数值跨整数和浮点比较，null 等于 null
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            // 统一转为浮点数，100 与 100.0 相等；浮点数按精确值比较
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => left == right,
    }
}

/// 大小比较
///
/// 数值按数值比较，布尔值 false < true。字符串按字典序比较，
/// 两侧都是日期时间时按时间点比较。其他组合为类型错误。
pub fn compare(left: &Value, right: &Value) -> Result<Ordering> {
    let mismatch = || RuleError::type_mismatch(type_name(left), type_name(right));

    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                return Ok(x.cmp(&y));
            }
            match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(mismatch),
                _ => Err(mismatch()),
            }
        }
        (Value::String(a), Value::String(b)) => match (parse_datetime(a), parse_datetime(b)) {
            (Some(x), Some(y)) => Ok(x.cmp(&y)),
            _ => Ok(a.cmp(b)),
        },
        (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
        _ => Err(mismatch()),
    }
}

/// 获取值的类型名称
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::EngineController;
    use crate::resolver::RefBase;
    use crate::tuples::FactTuple;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn c(value: Value) -> CompiledValue {
        CompiledValue::constant(value)
    }

    fn p(predicate: impl Predicate + 'static) -> CompiledValue {
        CompiledValue::Predicate(Arc::new(predicate))
    }

    fn t() -> CompiledValue {
        p(ConstantPredicate(Truth::True))
    }

    fn f() -> CompiledValue {
        p(ConstantPredicate(Truth::False))
    }

    fn n() -> CompiledValue {
        c(Value::Null)
    }

    /// 在空环境上求值
    fn eval(predicate: &dyn Predicate) -> Result<Truth> {
        let tuple = FactTuple::new();
        let attributes = BTreeMap::new();
        let context = Value::Null;
        let controller = EngineController::new();
        let env = Bindings::new("test", &attributes, &tuple, &context, &controller);
        predicate.test(&env)
    }

    fn relation(relation: Relation, left: Value, right: Value) -> Result<Truth> {
        eval(&RelationalPredicate {
            relation,
            left: c(left),
            right: c(right),
        })
    }

    fn contains(containment: Containment, collection: Value, elements: Value) -> Truth {
        eval(&ContainsPredicate {
            containment,
            collection: c(collection),
            elements: c(elements),
        })
        .unwrap()
    }

    #[test]
    fn test_and_three_valued() {
        assert_eq!(eval(&AndPredicate(vec![t(), n()])).unwrap(), Truth::False);
        assert_eq!(eval(&AndPredicate(vec![t(), f()])).unwrap(), Truth::False);
        assert_eq!(eval(&AndPredicate(vec![t(), t()])).unwrap(), Truth::True);
        assert_eq!(eval(&AndPredicate(vec![n(), t()])).unwrap(), Truth::False);
    }

    #[test]
    fn test_or_three_valued() {
        assert_eq!(eval(&OrPredicate(vec![n(), t()])).unwrap(), Truth::True);
        assert_eq!(eval(&OrPredicate(vec![n(), f()])).unwrap(), Truth::False);
        assert_eq!(eval(&OrPredicate(vec![f(), n()])).unwrap(), Truth::False);
    }

    #[test]
    fn test_not_three_valued() {
        assert_eq!(eval(&NotPredicate(n())).unwrap(), Truth::False);
        assert_eq!(eval(&NotPredicate(f())).unwrap(), Truth::True);
        assert_eq!(eval(&NotPredicate(t())).unwrap(), Truth::False);
    }

    #[test]
    fn test_short_circuit_skips_failing_operand() {
        // 第二个操作数不是布尔值，短路时不会被求值
        let bad = c(json!("not a boolean"));
        assert_eq!(eval(&AndPredicate(vec![f(), bad.clone()])).unwrap(), Truth::False);
        assert_eq!(eval(&OrPredicate(vec![t(), bad.clone()])).unwrap(), Truth::True);
        assert!(eval(&AndPredicate(vec![t(), bad])).is_err());
    }

    #[test]
    fn test_checks() {
        let check = |check, operand| eval(&CheckPredicate { check, operand }).unwrap();
        assert_eq!(check(Check::IsNull, n()), Truth::True);
        assert_eq!(check(Check::IsNull, c(json!(0))), Truth::False);
        assert_eq!(check(Check::IsTrue, c(json!(true))), Truth::True);
        assert_eq!(check(Check::IsTrue, n()), Truth::False);
        assert_eq!(check(Check::IsFalse, c(json!(false))), Truth::True);
        assert_eq!(check(Check::IsFalse, n()), Truth::False);
    }

    #[test]
    fn test_relations_with_null_are_false() {
        for r in [
            Relation::Equal,
            Relation::Less,
            Relation::LessOrEqual,
            Relation::Greater,
            Relation::GreaterOrEqual,
        ] {
            assert_eq!(relation(r, Value::Null, json!(1)).unwrap(), Truth::False);
            assert_eq!(relation(r, json!(1), Value::Null).unwrap(), Truth::False);
        }
        assert_eq!(
            relation(Relation::Equal, Value::Null, Value::Null).unwrap(),
            Truth::False
        );
    }

    #[test]
    fn test_numeric_relations() {
        assert_eq!(relation(Relation::Equal, json!(100), json!(100.0)).unwrap(), Truth::True);
        assert_eq!(relation(Relation::Greater, json!(100), json!(50)).unwrap(), Truth::True);
        assert_eq!(relation(Relation::GreaterOrEqual, json!(100), json!(100)).unwrap(), Truth::True);
        assert_eq!(relation(Relation::Less, json!(1.5), json!(2)).unwrap(), Truth::True);
        assert_eq!(relation(Relation::LessOrEqual, json!(3), json!(2)).unwrap(), Truth::False);
    }

    #[test]
    fn test_tiny_floats_are_not_equal() {
        assert_eq!(relation(Relation::Equal, json!(1e-20), json!(2e-20)).unwrap(), Truth::False);
        assert_eq!(relation(Relation::Equal, json!(0.0), json!(1e-17)).unwrap(), Truth::False);
        assert_eq!(relation(Relation::Equal, json!(2.5e-20), json!(2.5e-20)).unwrap(), Truth::True);
        assert_eq!(contains(Containment::All, json!([1e-20]), json!([2e-20])), Truth::False);
        assert_eq!(contains(Containment::Any, json!([0.0, 3e-18]), json!([3e-18])), Truth::True);
        assert!(!values_equal(&json!(1e-20), &json!(2e-20)));
    }

    #[test]
    fn test_string_and_boolean_relations() {
        assert_eq!(relation(Relation::Equal, json!("hello"), json!("hello")).unwrap(), Truth::True);
        assert_eq!(relation(Relation::Equal, json!("hello"), json!("world")).unwrap(), Truth::False);
        assert_eq!(relation(Relation::Less, json!("apple"), json!("banana")).unwrap(), Truth::True);
        assert_eq!(relation(Relation::Less, json!(false), json!(true)).unwrap(), Truth::True);
    }

    #[test]
    fn test_datetime_strings_compare_as_instants() {
        // 字典序会得出相反结论
        assert_eq!(
            relation(
                Relation::Less,
                json!("2024-01-20T01:00:00Z"),
                json!("2024-01-20T08:00:00+08:00")
            )
            .unwrap(),
            Truth::False
        );
        assert_eq!(
            relation(Relation::Less, json!("2024-01-15"), json!("2024-01-20T10:00:00Z")).unwrap(),
            Truth::True
        );
    }

    #[test]
    fn test_ordering_mismatched_types_fails() {
        let err = relation(Relation::Less, json!(1), json!("a")).unwrap_err();
        assert!(matches!(err, RuleError::TypeMismatch { .. }));
        assert!(relation(Relation::Greater, json!([1]), json!([2])).is_err());
        // 相等比较不要求同类型
        assert_eq!(relation(Relation::Equal, json!(1), json!("1")).unwrap(), Truth::False);
    }

    #[test]
    fn test_contains_all() {
        assert_eq!(contains(Containment::All, json!(["a", "b", "c"]), json!(["a", "b"])), Truth::True);
        assert_eq!(contains(Containment::All, json!(["a", "b", "c"]), json!(["a", "d"])), Truth::False);
        assert_eq!(contains(Containment::All, json!([1, null, 2]), json!([null])), Truth::True);
        assert_eq!(contains(Containment::All, json!([1, 2]), json!([])), Truth::True);
        assert_eq!(contains(Containment::All, json!([1, 2]), json!(2)), Truth::True);
        assert_eq!(contains(Containment::All, json!([1, 2]), json!(2.0)), Truth::True);
    }

    #[test]
    fn test_contains_any() {
        assert_eq!(contains(Containment::Any, json!(["a", "b", "c"]), json!(["b", "d"])), Truth::True);
        assert_eq!(contains(Containment::Any, json!(["a", "b", "c"]), json!(["x", "y"])), Truth::False);
        assert_eq!(contains(Containment::Any, json!([1, 2]), json!([])), Truth::False);
        assert_eq!(contains(Containment::Any, json!([null]), json!([null, 5])), Truth::True);
    }

    #[test]
    fn test_contains_with_null_sides() {
        assert_eq!(contains(Containment::All, Value::Null, json!([1])), Truth::False);
        assert_eq!(contains(Containment::All, json!([1]), Value::Null), Truth::False);
        assert_eq!(contains(Containment::Any, Value::Null, json!([1])), Truth::False);
    }

    #[test]
    fn test_contains_on_scalar_collection_fails() {
        let result = eval(&ContainsPredicate {
            containment: Containment::All,
            collection: c(json!("abc")),
            elements: c(json!("a")),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_match_is_anchored() {
        let matches = |subject: Value, pattern: &str| {
            eval(&MatchPredicate::new(c(subject), c(json!(pattern))).unwrap()).unwrap()
        };
        assert_eq!(matches(json!("abc"), "a.c"), Truth::True);
        assert_eq!(matches(json!("xabc"), "abc"), Truth::False);
        assert_eq!(matches(json!("user@example.com"), r"[\w.-]+@[\w.-]+\.\w+"), Truth::True);
        assert_eq!(matches(Value::Null, "abc"), Truth::False);
        assert_eq!(matches(json!("ab"), "a|ab"), Truth::True);
    }

    #[test]
    fn test_match_rejects_invalid_constant_pattern() {
        let err = MatchPredicate::new(c(json!("abc")), c(json!("("))).unwrap_err();
        assert!(err.contains("无效的正则表达式"));
    }

    #[test]
    fn test_match_dynamic_pattern() {
        let flight = json!({"code": "LH-100", "pattern": "LH-\\d+"});
        let mut tuple = FactTuple::new();
        tuple.bind("flight", &flight);
        let attributes = BTreeMap::new();
        let context = Value::Null;
        let controller = EngineController::new();
        let env = Bindings::new("r", &attributes, &tuple, &context, &controller);

        let field = |path: &str| {
            CompiledValue::Reference(
                Reference::new(RefBase::Named("flight".into()), "flight", Some(path), &FieldType::Any)
                    .unwrap(),
            )
        };
        let predicate = MatchPredicate::new(field("code"), field("pattern")).unwrap();
        assert_eq!(predicate.test(&env).unwrap(), Truth::True);
    }

    #[test]
    fn test_value_predicate_type_checks_at_runtime() {
        assert_eq!(eval(&ValuePredicate(c(json!(true)))).unwrap(), Truth::True);
        assert_eq!(eval(&ValuePredicate(n())).unwrap(), Truth::Null);
        let err = eval(&ValuePredicate(c(json!(42)))).unwrap_err();
        assert!(matches!(err, RuleError::TypeMismatch { .. }));
    }

    #[test]
    fn test_value_types() {
        assert_eq!(c(json!(1)).value_type(), FieldType::Integer);
        assert_eq!(
            CompiledValue::List(vec![c(json!("a")), c(json!("b"))]).value_type(),
            FieldType::list(FieldType::String)
        );
        assert_eq!(
            CompiledValue::List(vec![c(json!("a")), c(json!(1))]).value_type(),
            FieldType::list(FieldType::Any)
        );
        assert_eq!(t().value_type(), FieldType::Boolean);
    }

    #[test]
    fn test_list_materializes_to_array() {
        let list = CompiledValue::List(vec![c(json!(1)), n(), c(json!("x"))]);
        let tuple = FactTuple::new();
        let attributes = BTreeMap::new();
        let context = Value::Null;
        let controller = EngineController::new();
        let env = Bindings::new("r", &attributes, &tuple, &context, &controller);
        assert_eq!(list.evaluate(&env).unwrap(), json!([1, null, "x"]));
    }
}
