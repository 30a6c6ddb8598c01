//! 引用解析
//!
//! 引用由基础名和可选的点号路径组成，例如 `hotel` + `rooms[*].price`。
//! 以 `[*]` 结尾的段把该字段当作集合，对每个元素继续读取剩余路径并展平结果；
//! 标记重复出现时递归展平。路径链中任一中间值为 null 时，剩余部分解析为 null，
//! 展平集合中的 null 元素保留为 null。

use crate::bindings::Bindings;
use crate::error::{Result, RuleError};
use crate::evaluator::type_name;
use crate::models::{REF_CONTEXT, REF_ENGINE_CONTROLLER, REF_RULE_NAME};
use crate::schema::{FieldType, RecordSchema};
use serde_json::{Value, json};
use std::borrow::Cow;
use std::fmt;

const FLATTEN_MARKER: &str = "[*]";

/// 路径段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    pub flatten: bool,
}

/// 已解析的字段路径
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// 解析路径字符串，出现空段时返回错误信息
    pub fn parse(path: &str) -> std::result::Result<Self, String> {
        if path.is_empty() {
            return Ok(Self::default());
        }

        let mut segments = Vec::new();
        for (i, raw) in path.split('.').enumerate() {
            let (name, flatten) = match raw.strip_suffix(FLATTEN_MARKER) {
                Some(name) => (name, true),
                None => (raw, false),
            };
            if name.is_empty() {
                return Err(format!("路径第 {} 段为空", i + 1));
            }
            if name.contains('[') || name.contains(']') {
                return Err(format!("路径段 '{}' 的集合标记无效", raw));
            }
            segments.push(PathSegment {
                name: name.to_string(),
                flatten,
            });
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// 沿静态类型校验路径，返回路径末端的静态类型
    pub fn check(&self, base: &FieldType) -> std::result::Result<FieldType, String> {
        check_segments(base, &self.segments)
    }

    /// 在运行时值上解析路径
    pub fn resolve(&self, base: &Value) -> Result<Value> {
        walk(base, &self.segments)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", segment.name)?;
            if segment.flatten {
                write!(f, "{}", FLATTEN_MARKER)?;
            }
        }
        Ok(())
    }
}

fn check_segments(current: &FieldType, segments: &[PathSegment]) -> std::result::Result<FieldType, String> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(current.clone());
    };

    let next = match current {
        FieldType::Any => return Ok(FieldType::Any),
        FieldType::Record(schema) => record_field(schema, &segment.name)?,
        FieldType::List(element) if segment.name.parse::<usize>().is_ok() => (**element).clone(),
        other => {
            return Err(format!("类型 {} 上不存在字段 '{}'", other, segment.name));
        }
    };

    if !segment.flatten {
        return check_segments(&next, rest);
    }

    match next {
        FieldType::Any => Ok(FieldType::list(FieldType::Any)),
        FieldType::List(element) => {
            let inner = check_segments(&element, rest)?;
            // 后续还有展平标记时，结果已经是列表，直接展平
            let flattened = match inner {
                FieldType::List(inner_element) if has_flatten(rest) => *inner_element,
                other => other,
            };
            Ok(FieldType::list(flattened))
        }
        other => Err(format!(
            "字段 '{}' 的类型 {} 不是集合，不能使用 {}",
            segment.name, other, FLATTEN_MARKER
        )),
    }
}

fn record_field(schema: &RecordSchema, name: &str) -> std::result::Result<FieldType, String> {
    schema
        .get(name)
        .cloned()
        .ok_or_else(|| format!("字段 '{}' 未声明", name))
}

fn has_flatten(segments: &[PathSegment]) -> bool {
    segments.iter().any(|s| s.flatten)
}

/// 读取单个字段：对象按键，数组按数字下标，缺失时为 null
fn read_field(current: &Value, name: &str) -> Value {
    match current {
        Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
        Value::Array(items) => name
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn walk(current: &Value, segments: &[PathSegment]) -> Result<Value> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(current.clone());
    };

    if current.is_null() {
        return Ok(Value::Null);
    }

    let next = read_field(current, &segment.name);
    if !segment.flatten {
        return walk(&next, rest);
    }

    let items = match next {
        Value::Null => return Ok(Value::Null),
        Value::Array(items) => items,
        other => {
            return Err(RuleError::type_mismatch(
                format!("array (字段 '{}')", segment.name),
                type_name(&other),
            ));
        }
    };

    let nested = has_flatten(rest);
    let mut flattened = Vec::with_capacity(items.len());
    for item in &items {
        match walk(item, rest)? {
            Value::Array(inner) if nested => flattened.extend(inner),
            value => flattened.push(value),
        }
    }

    Ok(Value::Array(flattened))
}

/// 引用的基础名
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefBase {
    /// 规则属性或事实名
    Named(String),
    /// `ctx`：结果累加器
    Context,
    /// `ruleName`：当前规则 ID
    RuleName,
    /// `engineController`：停止信号状态
    EngineController,
}

impl RefBase {
    /// 保留名
    pub fn reserved(name: &str) -> Option<Self> {
        match name {
            REF_CONTEXT => Some(Self::Context),
            REF_RULE_NAME => Some(Self::RuleName),
            REF_ENGINE_CONTROLLER => Some(Self::EngineController),
            _ => None,
        }
    }

    /// 保留名的静态类型
    pub fn reserved_type(&self) -> FieldType {
        match self {
            Self::Named(_) | Self::Context => FieldType::Any,
            Self::RuleName => FieldType::String,
            Self::EngineController => {
                RecordSchema::new()
                    .field("stopRequested", FieldType::Boolean)
                    .into()
            }
        }
    }
}

/// 编译后的引用
#[derive(Debug, Clone)]
pub struct Reference {
    base: RefBase,
    path: FieldPath,
    static_type: FieldType,
    display: String,
}

impl Reference {
    /// 校验路径并构建引用；`base_type` 是基础名的静态类型
    pub fn new(
        base: RefBase,
        display_name: &str,
        path: Option<&str>,
        base_type: &FieldType,
    ) -> std::result::Result<Self, String> {
        let path = FieldPath::parse(path.unwrap_or_default())?;
        let static_type = path.check(base_type)?;
        let display = if path.is_empty() {
            display_name.to_string()
        } else {
            format!("{}.{}", display_name, path)
        };

        Ok(Self {
            base,
            path,
            static_type,
            display,
        })
    }

    pub fn static_type(&self) -> &FieldType {
        &self.static_type
    }

    pub fn base(&self) -> &RefBase {
        &self.base
    }

    pub fn resolve(&self, env: &Bindings<'_>) -> Result<Value> {
        let base: Cow<'_, Value> = match &self.base {
            RefBase::Named(name) => env
                .get(name)
                .map(Cow::Borrowed)
                .unwrap_or(Cow::Owned(Value::Null)),
            RefBase::Context => Cow::Borrowed(env.context()),
            RefBase::RuleName => Cow::Owned(Value::String(env.rule_id().to_string())),
            RefBase::EngineController => {
                Cow::Owned(json!({ "stopRequested": env.controller().is_stopped() }))
            }
        };

        self.path.resolve(&base)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::EngineController;
    use crate::tuples::FactTuple;
    use std::collections::BTreeMap;

    fn hotel_schema() -> FieldType {
        RecordSchema::new()
            .field("name", FieldType::String)
            .field("open", FieldType::Boolean)
            .field(
                "rooms",
                FieldType::list(
                    RecordSchema::new()
                        .field("price", FieldType::Integer)
                        .field("tags", FieldType::list(FieldType::String))
                        .into(),
                ),
            )
            .into()
    }

    fn hotel() -> Value {
        json!({
            "name": "Ritz",
            "open": true,
            "rooms": [
                {"price": 100, "tags": ["sea", "quiet"]},
                null,
                {"price": null, "tags": ["city"]},
                {"price": 300, "tags": null}
            ]
        })
    }

    #[test]
    fn test_parse_path() {
        let path = FieldPath::parse("rooms[*].price").unwrap();
        assert_eq!(path.segments().len(), 2);
        assert!(path.segments()[0].flatten);
        assert!(!path.segments()[1].flatten);
        assert_eq!(path.to_string(), "rooms[*].price");
    }

    #[test]
    fn test_parse_rejects_empty_segment() {
        assert!(FieldPath::parse("rooms..price").is_err());
        assert!(FieldPath::parse(".price").is_err());
        assert!(FieldPath::parse("rooms.").is_err());
        assert!(FieldPath::parse("[*]").is_err());
        assert!(FieldPath::parse("rooms[0]").is_err());
    }

    #[test]
    fn test_check_static_types() {
        let schema = hotel_schema();
        assert_eq!(
            FieldPath::parse("name").unwrap().check(&schema).unwrap(),
            FieldType::String
        );
        assert_eq!(
            FieldPath::parse("rooms[*].price").unwrap().check(&schema).unwrap(),
            FieldType::list(FieldType::Integer)
        );
        assert_eq!(
            FieldPath::parse("rooms[*].tags[*]").unwrap().check(&schema).unwrap(),
            FieldType::list(FieldType::String)
        );
        assert_eq!(
            FieldPath::parse("rooms.0.price").unwrap().check(&schema).unwrap(),
            FieldType::Integer
        );
    }

    #[test]
    fn test_check_rejects_bad_paths() {
        let schema = hotel_schema();
        let missing = FieldPath::parse("stars").unwrap().check(&schema);
        assert!(missing.unwrap_err().contains("未声明"));

        let not_collection = FieldPath::parse("name[*]").unwrap().check(&schema);
        assert!(not_collection.unwrap_err().contains("不是集合"));

        let scalar_field = FieldPath::parse("name.length").unwrap().check(&schema);
        assert!(scalar_field.is_err());
    }

    #[test]
    fn test_check_any_is_unchecked() {
        let path = FieldPath::parse("anything.at[*].all").unwrap();
        assert_eq!(path.check(&FieldType::Any).unwrap(), FieldType::Any);
    }

    #[test]
    fn test_resolve_simple_field() {
        let path = FieldPath::parse("name").unwrap();
        assert_eq!(path.resolve(&hotel()).unwrap(), json!("Ritz"));
    }

    #[test]
    fn test_resolve_flatten_preserves_nulls() {
        let path = FieldPath::parse("rooms[*].price").unwrap();
        assert_eq!(
            path.resolve(&hotel()).unwrap(),
            json!([100, null, null, 300])
        );
    }

    #[test]
    fn test_resolve_nested_flatten() {
        let path = FieldPath::parse("rooms[*].tags[*]").unwrap();
        assert_eq!(
            path.resolve(&hotel()).unwrap(),
            json!(["sea", "quiet", null, "city", null])
        );
    }

    #[test]
    fn test_resolve_null_propagation() {
        let value = json!({"owner": null});
        let path = FieldPath::parse("owner.address.city").unwrap();
        assert_eq!(path.resolve(&value).unwrap(), Value::Null);

        let flatten = FieldPath::parse("owner[*].name").unwrap();
        assert_eq!(flatten.resolve(&value).unwrap(), Value::Null);
    }

    #[test]
    fn test_resolve_flatten_on_scalar_fails() {
        let path = FieldPath::parse("name[*]").unwrap();
        assert!(path.resolve(&hotel()).is_err());
    }

    #[test]
    fn test_reference_resolution() {
        let hotel = hotel();
        let mut tuple = FactTuple::new();
        tuple.bind("hotel", &hotel);
        let attributes = BTreeMap::new();
        let context = json!({"count": 3});
        let controller = EngineController::new();
        let env = Bindings::new("rule-1", &attributes, &tuple, &context, &controller);

        let reference = Reference::new(
            RefBase::Named("hotel".to_string()),
            "hotel",
            Some("rooms[*].price"),
            &hotel_schema(),
        )
        .unwrap();
        assert_eq!(reference.to_string(), "hotel.rooms[*].price");
        assert_eq!(reference.resolve(&env).unwrap(), json!([100, null, null, 300]));

        let ctx = Reference::new(RefBase::Context, "ctx", Some("count"), &FieldType::Any).unwrap();
        assert_eq!(ctx.resolve(&env).unwrap(), json!(3));

        let rule_name =
            Reference::new(RefBase::RuleName, "ruleName", None, &FieldType::String).unwrap();
        assert_eq!(rule_name.resolve(&env).unwrap(), json!("rule-1"));

        let base = RefBase::EngineController;
        let stop = Reference::new(base.clone(), "engineController", Some("stopRequested"), &base.reserved_type())
            .unwrap();
        assert_eq!(stop.static_type(), &FieldType::Boolean);
        assert_eq!(stop.resolve(&env).unwrap(), json!(false));
        controller.stop();
        assert_eq!(stop.resolve(&env).unwrap(), json!(true));
    }

    #[test]
    fn test_unbound_name_resolves_to_null() {
        let tuple = FactTuple::new();
        let attributes = BTreeMap::new();
        let context = Value::Null;
        let controller = EngineController::new();
        let env = Bindings::new("r", &attributes, &tuple, &context, &controller);

        let reference =
            Reference::new(RefBase::Named("hotel".to_string()), "hotel", Some("name"), &FieldType::Any)
                .unwrap();
        assert_eq!(reference.resolve(&env).unwrap(), Value::Null);
    }
}
