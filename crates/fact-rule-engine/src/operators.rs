//! 规则操作符定义
//!
//! 操作符按名称注册在 [`OperatorRegistry`] 中，编译器遇到操作符节点时查表，
//! 由工厂校验操作数个数和静态类型并创建谓词。同名注册会替换已有工厂，
//! 调用方可以借此覆盖内置操作符。

use crate::evaluator::{
    AndPredicate, Check, CheckPredicate, CompiledValue, Containment, ContainsPredicate,
    MatchPredicate, NotPredicate, OrPredicate, Predicate, Relation, RelationalPredicate,
};
use crate::schema::FieldType;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// 操作符工厂
pub trait OperatorFactory: Send + Sync {
    fn name(&self) -> &str;

    /// 校验操作数并创建谓词，失败时返回错误信息
    fn create(&self, operands: Vec<CompiledValue>) -> Result<Arc<dyn Predicate>, String>;
}

/// 操作数个数约束
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    fn accepts(&self, count: usize) -> bool {
        match self {
            Self::Exactly(n) => count == *n,
            Self::AtLeast(n) => count >= *n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exactly(n) => write!(f, "{}", n),
            Self::AtLeast(n) => write!(f, "至少 {}", n),
        }
    }
}

/// 内置操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinOperator {
    // 逻辑
    Not,
    And,
    Or,

    // 单值检查
    IsTrue,
    IsFalse,
    IsNull,

    // 关系比较
    Equal,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,

    // 字符串
    Match,

    // 集合
    Contains,
    ContainsAny,
}

impl BuiltinOperator {
    pub const ALL: [Self; 14] = [
        Self::Not,
        Self::And,
        Self::Or,
        Self::IsTrue,
        Self::IsFalse,
        Self::IsNull,
        Self::Equal,
        Self::Less,
        Self::LessOrEqual,
        Self::Greater,
        Self::GreaterOrEqual,
        Self::Match,
        Self::Contains,
        Self::ContainsAny,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Not => "not",
            Self::And => "and",
            Self::Or => "or",
            Self::IsTrue => "is-true",
            Self::IsFalse => "is-false",
            Self::IsNull => "is-null",
            Self::Equal => "equal",
            Self::Less => "less",
            Self::LessOrEqual => "less-or-equal",
            Self::Greater => "greater",
            Self::GreaterOrEqual => "greater-or-equal",
            Self::Match => "match",
            Self::Contains => "contains",
            Self::ContainsAny => "contains-any",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }

    pub fn arity(&self) -> Arity {
        match self {
            Self::And | Self::Or => Arity::AtLeast(1),
            Self::Not | Self::IsTrue | Self::IsFalse | Self::IsNull => Arity::Exactly(1),
            _ => Arity::Exactly(2),
        }
    }

    fn relation(&self) -> Option<Relation> {
        match self {
            Self::Equal => Some(Relation::Equal),
            Self::Less => Some(Relation::Less),
            Self::LessOrEqual => Some(Relation::LessOrEqual),
            Self::Greater => Some(Relation::Greater),
            Self::GreaterOrEqual => Some(Relation::GreaterOrEqual),
            _ => None,
        }
    }

    fn require_boolean(&self, operands: &[CompiledValue]) -> Result<(), String> {
        for (i, operand) in operands.iter().enumerate() {
            let value_type = operand.value_type();
            if !value_type.is_boolean_like() {
                return Err(format!(
                    "操作符 {} 的第 {} 个操作数必须是布尔值，实际为 {}",
                    self,
                    i + 1,
                    value_type
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for BuiltinOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn is_text_like(field_type: &FieldType) -> bool {
    matches!(
        field_type,
        FieldType::String | FieldType::DateTime | FieldType::Any
    )
}

fn take_pair(operands: Vec<CompiledValue>) -> Result<(CompiledValue, CompiledValue), String> {
    let mut iter = operands.into_iter();
    match (iter.next(), iter.next()) {
        (Some(left), Some(right)) => Ok((left, right)),
        _ => Err("缺少操作数".to_string()),
    }
}

fn take_one(operands: Vec<CompiledValue>) -> Result<CompiledValue, String> {
    operands
        .into_iter()
        .next()
        .ok_or_else(|| "缺少操作数".to_string())
}

impl OperatorFactory for BuiltinOperator {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn create(&self, operands: Vec<CompiledValue>) -> Result<Arc<dyn Predicate>, String> {
        let arity = self.arity();
        if !arity.accepts(operands.len()) {
            return Err(format!(
                "操作符 {} 需要 {} 个操作数，实际 {} 个",
                self,
                arity,
                operands.len()
            ));
        }

        let predicate: Arc<dyn Predicate> = match self {
            Self::And => {
                self.require_boolean(&operands)?;
                Arc::new(AndPredicate(operands))
            }
            Self::Or => {
                self.require_boolean(&operands)?;
                Arc::new(OrPredicate(operands))
            }
            Self::Not => {
                self.require_boolean(&operands)?;
                Arc::new(NotPredicate(take_one(operands)?))
            }
            Self::IsTrue | Self::IsFalse => {
                self.require_boolean(&operands)?;
                let check = if *self == Self::IsTrue {
                    Check::IsTrue
                } else {
                    Check::IsFalse
                };
                Arc::new(CheckPredicate {
                    check,
                    operand: take_one(operands)?,
                })
            }
            Self::IsNull => Arc::new(CheckPredicate {
                check: Check::IsNull,
                operand: take_one(operands)?,
            }),
            Self::Equal | Self::Less | Self::LessOrEqual | Self::Greater | Self::GreaterOrEqual => {
                let (left, right) = take_pair(operands)?;
                let (left_type, right_type) = (left.value_type(), right.value_type());
                let compatible = if *self == Self::Equal {
                    left_type.is_equatable_with(&right_type)
                } else {
                    left_type.is_ordered_with(&right_type)
                };
                if !compatible {
                    return Err(format!(
                        "操作符 {} 不能比较 {} 和 {}",
                        self, left_type, right_type
                    ));
                }
                let relation = self
                    .relation()
                    .ok_or_else(|| format!("操作符 {} 不是关系运算", self))?;
                Arc::new(RelationalPredicate {
                    relation,
                    left,
                    right,
                })
            }
            Self::Match => {
                let (subject, pattern) = take_pair(operands)?;
                for (label, operand) in [("左", &subject), ("右", &pattern)] {
                    let value_type = operand.value_type();
                    if !is_text_like(&value_type) {
                        return Err(format!(
                            "操作符 match 的{}操作数必须是字符串，实际为 {}",
                            label, value_type
                        ));
                    }
                }
                Arc::new(MatchPredicate::new(subject, pattern)?)
            }
            Self::Contains | Self::ContainsAny => {
                let (collection, elements) = take_pair(operands)?;
                let collection_type = collection.value_type();
                if !collection_type.is_collection_like() {
                    return Err(format!(
                        "操作符 {} 的左操作数必须是集合，实际为 {}",
                        self, collection_type
                    ));
                }
                let containment = if *self == Self::Contains {
                    Containment::All
                } else {
                    Containment::Any
                };
                Arc::new(ContainsPredicate {
                    containment,
                    collection,
                    elements,
                })
            }
        };

        Ok(predicate)
    }
}

/// 操作符注册表
#[derive(Clone, Default)]
pub struct OperatorRegistry {
    factories: HashMap<String, Arc<dyn OperatorFactory>>,
}

impl OperatorRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册操作符，已存在同名操作符时替换
    pub fn register(&mut self, factory: Arc<dyn OperatorFactory>) -> &mut Self {
        let name = factory.name().to_string();
        let replaced = self.factories.insert(name.clone(), factory).is_some();
        debug!(operator = %name, replaced, "注册操作符");
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn OperatorFactory>> {
        self.factories.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// 已注册的操作符名（排序）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// 创建包含全部内置操作符的注册表
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for operator in BuiltinOperator::ALL {
            registry.register(Arc::new(operator));
        }

        info!(operator_count = registry.len(), "内置操作符初始化完成");

        registry
    }
}
