//! 事实类型描述
//!
//! 编译器依靠这里的静态类型在编译期校验引用路径、谓词类型和操作数类型。
//! 未注册描述的事实类型视为 `Any`，只在求值时做动态检查。

use crate::models::ValueType;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// 静态字段类型
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldType {
    Boolean,
    Integer,
    Float,
    String,
    DateTime,
    List(Box<FieldType>),
    Record(RecordSchema),
    #[default]
    Any,
}

impl FieldType {
    pub fn list(element: FieldType) -> Self {
        Self::List(Box::new(element))
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    /// 可作为谓词使用（布尔或未知）
    pub fn is_boolean_like(&self) -> bool {
        matches!(self, Self::Boolean | Self::Any)
    }

    /// 可作为集合使用（列表或未知）
    pub fn is_collection_like(&self) -> bool {
        matches!(self, Self::List(_) | Self::Any)
    }

    /// 两个已知类型之间能否做大小比较
    pub fn is_ordered_with(&self, other: &FieldType) -> bool {
        match (self, other) {
            (Self::Any, _) | (_, Self::Any) => true,
            (a, b) if a.is_numeric() && b.is_numeric() => true,
            (Self::String, Self::String)
            | (Self::Boolean, Self::Boolean)
            | (Self::DateTime, Self::DateTime)
            | (Self::DateTime, Self::String)
            | (Self::String, Self::DateTime) => true,
            _ => false,
        }
    }

    /// 两个已知类型之间能否做相等比较
    pub fn is_equatable_with(&self, other: &FieldType) -> bool {
        match (self, other) {
            (Self::List(_), Self::List(_)) | (Self::Record(_), Self::Record(_)) => true,
            _ => self.is_ordered_with(other),
        }
    }
}

impl From<ValueType> for FieldType {
    fn from(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Boolean => Self::Boolean,
            ValueType::Integer => Self::Integer,
            ValueType::Float => Self::Float,
            ValueType::String => Self::String,
            ValueType::DateTime => Self::DateTime,
            ValueType::List => Self::list(Self::Any),
            ValueType::Object | ValueType::Any => Self::Any,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => write!(f, "boolean"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::DateTime => write!(f, "datetime"),
            Self::List(element) => write!(f, "list<{}>", element),
            Self::Record(_) => write!(f, "record"),
            Self::Any => write!(f, "any"),
        }
    }
}

/// 记录类型：字段名到字段类型
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordSchema {
    fields: BTreeMap<String, FieldType>,
}

impl RecordSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl From<RecordSchema> for FieldType {
    fn from(schema: RecordSchema) -> Self {
        Self::Record(schema)
    }
}

/// 事实类型注册表
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    types: HashMap<String, FieldType>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册事实类型，同名类型会被替换
    pub fn register(&mut self, type_name: impl Into<String>, schema: impl Into<FieldType>) -> &mut Self {
        self.types.insert(type_name.into(), schema.into());
        self
    }

    /// 获取事实类型，未注册时返回 `Any`
    pub fn resolve(&self, type_name: &str) -> FieldType {
        self.types.get(type_name).cloned().unwrap_or_default()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
