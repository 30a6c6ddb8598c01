//! 规则引擎领域模型
//!
//! 规则由属性、事实声明、谓词表达式树和动作列表组成，全部支持 serde 序列化，
//! 可以直接从 JSON 规则文件加载。

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 约定的规则属性名
pub const ATTR_RULE_NAME: &str = "ruleName";
pub const ATTR_PRIORITY: &str = "priority";
pub const ATTR_IGNORED: &str = "ignored";
pub const ATTR_START_DATE: &str = "startDate";
pub const ATTR_EXPIRE_DATE: &str = "expireDate";

/// 保留的上下文引用名
pub const REF_CONTEXT: &str = "ctx";
pub const REF_RULE_NAME: &str = "ruleName";
pub const REF_ENGINE_CONTROLLER: &str = "engineController";

/// 值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Boolean,
    Integer,
    Float,
    String,
    DateTime,
    List,
    Object,
    #[default]
    Any,
}

impl ValueType {
    /// 根据 JSON 值推断类型
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Any,
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            Value::Number(_) => Self::Float,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::List,
            Value::Object(_) => Self::Object,
        }
    }

    /// 值是否符合声明的类型（null 符合任何类型）
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (Self::Any, _) => true,
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Self::Float, Value::Number(_)) => true,
            (Self::String, Value::String(_)) => true,
            (Self::DateTime, Value::String(s)) => parse_datetime(s).is_some(),
            (Self::List, Value::Array(_)) => true,
            (Self::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::DateTime => "datetime",
            Self::List => "list",
            Self::Object => "object",
            Self::Any => "any",
        };
        write!(f, "{}", s)
    }
}

/// 规则属性
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub value: Value,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value_type: ValueType, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value_type,
            value: value.into(),
        }
    }
}

/// 事实声明：规则内的名称到声明类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactDecl {
    pub name: String,
    pub type_name: String,
}

impl FactDecl {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// 命名参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: Expression,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: Expression) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// 表达式节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expression {
    /// 常量；`${...}` 形式的字符串在编译期解析为引用
    Value {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value_type: Option<ValueType>,
        #[serde(default)]
        value: Value,
    },
    /// 有序表达式列表，求值时物化为数组
    Values { items: Vec<Expression> },
    /// 具名操作符
    Operator {
        name: String,
        #[serde(default)]
        operands: Vec<Expression>,
    },
    /// 具名函数调用
    Function {
        name: String,
        #[serde(default)]
        params: Vec<Parameter>,
    },
    /// 事实、属性或保留名引用
    Reference {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

impl Expression {
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::Value {
            value_type: Some(ValueType::of(&value)),
            value,
        }
    }

    pub fn typed(value_type: ValueType, value: impl Into<Value>) -> Self {
        Self::Value {
            value_type: Some(value_type),
            value: value.into(),
        }
    }

    pub fn null() -> Self {
        Self::Value {
            value_type: None,
            value: Value::Null,
        }
    }

    /// `${expr}` 占位符常量
    pub fn placeholder(reference: &str) -> Self {
        Self::Value {
            value_type: Some(ValueType::String),
            value: Value::String(format!("${{{}}}", reference)),
        }
    }

    pub fn values(items: Vec<Expression>) -> Self {
        Self::Values { items }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::Reference {
            name: name.into(),
            path: None,
        }
    }

    pub fn field(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Reference {
            name: name.into(),
            path: Some(path.into()),
        }
    }

    pub fn op(name: impl Into<String>, operands: Vec<Expression>) -> Self {
        Self::Operator {
            name: name.into(),
            operands,
        }
    }

    pub fn and(operands: Vec<Expression>) -> Self {
        Self::op("and", operands)
    }

    pub fn or(operands: Vec<Expression>) -> Self {
        Self::op("or", operands)
    }

    pub fn not(operand: Expression) -> Self {
        Self::op("not", vec![operand])
    }

    pub fn equal(left: Expression, right: Expression) -> Self {
        Self::op("equal", vec![left, right])
    }

    pub fn function(name: impl Into<String>, params: Vec<Parameter>) -> Self {
        Self::Function {
            name: name.into(),
            params,
        }
    }
}

/// 规则命中后执行的动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Parameter>,
}

impl Action {
    pub fn new(name: impl Into<String>, params: Vec<Parameter>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// 规则定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub facts: Vec<FactDecl>,
    pub predicate: Expression,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn new(name: impl Into<String>, predicate: Expression) -> Self {
        Self {
            attributes: vec![Attribute::new(
                ATTR_RULE_NAME,
                ValueType::String,
                name.into(),
            )],
            facts: Vec::new(),
            predicate,
            actions: Vec::new(),
        }
    }

    /// 设置属性，同名属性会被替换
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value_type: ValueType,
        value: impl Into<Value>,
    ) -> Self {
        let attribute = Attribute::new(name, value_type, value);
        self.attributes.retain(|a| a.name != attribute.name);
        self.attributes.push(attribute);
        self
    }

    pub fn with_priority(self, priority: i64) -> Self {
        self.with_attribute(ATTR_PRIORITY, ValueType::Integer, priority)
    }

    pub fn ignored(self) -> Self {
        self.with_attribute(ATTR_IGNORED, ValueType::Boolean, true)
    }

    pub fn with_fact(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.facts.push(FactDecl::new(name, type_name));
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// `ruleName` 属性
    pub fn name(&self) -> Option<&str> {
        self.attribute(ATTR_RULE_NAME).and_then(|a| a.value.as_str())
    }

    /// `priority` 属性，缺省或非整数时为 0
    pub fn priority(&self) -> i64 {
        self.attribute(ATTR_PRIORITY)
            .and_then(|a| a.value.as_i64())
            .unwrap_or(0)
    }

    pub fn is_ignored(&self) -> bool {
        self.attribute(ATTR_IGNORED)
            .and_then(|a| a.value.as_bool())
            .unwrap_or(false)
    }
}

/// 输入事实：运行时类型名 + 数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub type_name: String,
    pub data: Value,
}

impl Fact {
    pub fn new(type_name: impl Into<String>, data: Value) -> Self {
        Self {
            type_name: type_name.into(),
            data,
        }
    }
}

/// 解析日期时间（RFC 3339 或纯日期）
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_serialization() {
        let rule = Rule::new(
            "lufthansa",
            Expression::equal(
                Expression::field("airline", "name"),
                Expression::constant("Lufthansa"),
            ),
        )
        .with_priority(10)
        .with_fact("airline", "Airline")
        .with_action(Action::new(
            "record",
            vec![Parameter::new("code", Expression::field("airline", "code"))],
        ));

        let json = serde_json::to_string_pretty(&rule).unwrap();
        let parsed: Rule = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, rule);
        assert_eq!(parsed.name(), Some("lufthansa"));
        assert_eq!(parsed.priority(), 10);
    }

    #[test]
    fn test_rule_deserialization() {
        let json = r#"
        {
            "attributes": [
                {"name": "ruleName", "value_type": "string", "value": "vip"},
                {"name": "priority", "value_type": "integer", "value": 5},
                {"name": "ignored", "value_type": "boolean", "value": true}
            ],
            "facts": [{"name": "hotel", "type_name": "Hotel"}],
            "predicate": {
                "type": "operator",
                "name": "and",
                "operands": [
                    {"type": "value", "value": "${hotel.vip}"},
                    {"type": "reference", "name": "hotel", "path": "open"}
                ]
            },
            "actions": [{"name": "notify"}]
        }
        "#;

        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.name(), Some("vip"));
        assert_eq!(rule.priority(), 5);
        assert!(rule.is_ignored());
        assert_eq!(rule.facts[0], FactDecl::new("hotel", "Hotel"));
        assert_eq!(rule.actions[0].params.len(), 0);
    }

    #[test]
    fn test_priority_defaults_to_zero() {
        let rule = Rule::new("r", Expression::constant(true));
        assert_eq!(rule.priority(), 0);
        assert!(!rule.is_ignored());
    }

    #[test]
    fn test_with_attribute_replaces() {
        let rule = Rule::new("r", Expression::constant(true))
            .with_priority(1)
            .with_priority(7);
        assert_eq!(rule.priority(), 7);
        assert_eq!(
            rule.attributes
                .iter()
                .filter(|a| a.name == ATTR_PRIORITY)
                .count(),
            1
        );
    }

    #[test]
    fn test_value_type_accepts() {
        assert!(ValueType::Integer.accepts(&json!(5)));
        assert!(!ValueType::Integer.accepts(&json!(5.5)));
        assert!(ValueType::Float.accepts(&json!(5)));
        assert!(ValueType::Boolean.accepts(&Value::Null));
        assert!(ValueType::DateTime.accepts(&json!("2024-01-15")));
        assert!(!ValueType::DateTime.accepts(&json!("yesterday")));
        assert!(!ValueType::String.accepts(&json!(1)));
    }

    #[test]
    fn test_parse_datetime() {
        assert!(parse_datetime("2024-01-15T10:00:00Z").is_some());
        assert!(parse_datetime("2024-01-15T10:00:00+08:00").is_some());
        assert!(parse_datetime("2024-01-15").is_some());
        assert!(parse_datetime("15/01/2024").is_none());
    }
}
