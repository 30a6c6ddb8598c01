//! 事实元组生成
//!
//! 输入事实按规则声明的名称分组后，根据分组数量和笛卡尔积开关选择生成策略：
//!
//! | 分组数 | 笛卡尔积 | 策略 | 元组数 | 复用缓冲区 |
//! |--------|----------|------|--------|------------|
//! | 1 | 任意 | 轮询 | N | 是 |
//! | 0 或 >1 | 关闭 | 单实例 | 1 | 否 |
//! | >1 | 开启 | 笛卡尔积 | ∏ Nᵢ | 否 |
//!
//! 轮询策略每次返回同一个缓冲区的借用（[`Cow::Borrowed`]），借用检查保证调用方
//! 在请求下一个元组前已经用完当前元组；其余策略每次返回独立的新元组（[`Cow::Owned`]）。

use crate::compiler::FactNames;
use crate::error::{Result, RuleError};
use crate::models::Fact;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::{debug, warn};

/// 事实元组：事实名 -> 实例
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactTuple<'a> {
    facts: HashMap<String, &'a Value>,
}

impl<'a> FactTuple<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定实例，同名绑定会被替换
    pub fn bind(&mut self, name: &str, instance: &'a Value) {
        match self.facts.get_mut(name) {
            Some(slot) => *slot = instance,
            None => {
                self.facts.insert(name.to_string(), instance);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.facts.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.facts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &'a Value)> {
        self.facts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// 同名实例组
#[derive(Debug, Clone, PartialEq)]
pub struct FactGroup<'a> {
    pub name: String,
    pub instances: Vec<&'a Value>,
}

impl<'a> FactGroup<'a> {
    pub fn new(name: impl Into<String>, instances: Vec<&'a Value>) -> Self {
        Self {
            name: name.into(),
            instances,
        }
    }
}

/// 按运行时类型把输入事实分到声明的事实名下
///
/// 分组顺序与事实名的声明顺序一致，没有实例的事实名不会出现在结果中，
/// 未被任何规则声明的类型会被忽略。
pub fn group_facts<'a>(facts: &'a [Fact], fact_names: &FactNames) -> Vec<FactGroup<'a>> {
    let mut groups: Vec<FactGroup<'a>> = Vec::new();

    for (name, type_name) in fact_names.iter() {
        let instances: Vec<&'a Value> = facts
            .iter()
            .filter(|f| f.type_name == type_name)
            .map(|f| &f.data)
            .collect();
        if !instances.is_empty() {
            groups.push(FactGroup::new(name, instances));
        }
    }

    let undeclared = facts
        .iter()
        .filter(|f| !fact_names.declares_type(&f.type_name))
        .count();
    if undeclared > 0 {
        debug!(undeclared, "忽略未被规则声明类型的事实");
    }

    groups
}

/// 元组生成策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TupleStrategy {
    RoundRobin,
    SingleInstance,
    CrossProduct,
}

impl TupleStrategy {
    pub fn select(group_count: usize, cross_product: bool) -> Self {
        match group_count {
            1 => Self::RoundRobin,
            n if n > 1 && cross_product => Self::CrossProduct,
            _ => Self::SingleInstance,
        }
    }

    /// 是否每次返回同一个被修改的缓冲区
    pub fn reuses_buffer(&self) -> bool {
        matches!(self, Self::RoundRobin)
    }
}

fn ensure_non_empty(groups: &[FactGroup<'_>]) -> Result<()> {
    match groups.iter().find(|g| g.instances.is_empty()) {
        Some(group) => Err(RuleError::EmptyFactGroup(group.name.clone())),
        None => Ok(()),
    }
}

/// 轮询：单个事实名，每个实例一个元组，复用同一个缓冲区
#[derive(Debug)]
pub struct RoundRobinGenerator<'a> {
    group: FactGroup<'a>,
    position: usize,
    buffer: FactTuple<'a>,
}

impl<'a> RoundRobinGenerator<'a> {
    pub fn new(group: FactGroup<'a>) -> Result<Self> {
        ensure_non_empty(std::slice::from_ref(&group))?;
        Ok(Self {
            group,
            position: 0,
            buffer: FactTuple::new(),
        })
    }

    /// 返回内部缓冲区的借用，下一次调用会覆盖它
    pub fn next_tuple(&mut self) -> Option<&FactTuple<'a>> {
        let instance = *self.group.instances.get(self.position)?;
        self.position += 1;
        self.buffer.bind(&self.group.name, instance);
        Some(&self.buffer)
    }

    pub fn total(&self) -> usize {
        self.group.instances.len()
    }
}

/// 单实例：每个事实名取第一个实例，只生成一个元组
#[derive(Debug)]
pub struct SingleInstanceGenerator<'a> {
    tuple: Option<FactTuple<'a>>,
    ignored: Vec<(String, usize)>,
}

impl<'a> SingleInstanceGenerator<'a> {
    pub fn new(groups: Vec<FactGroup<'a>>) -> Result<Self> {
        ensure_non_empty(&groups)?;

        let mut tuple = FactTuple::new();
        let mut ignored = Vec::new();
        for group in &groups {
            let extra = group.instances.len() - 1;
            if extra > 0 {
                warn!(
                    fact = %group.name,
                    instances = group.instances.len(),
                    "未开启笛卡尔积模式，只使用第一个实例，其余实例被忽略"
                );
                ignored.push((group.name.clone(), extra));
            }
            tuple.bind(&group.name, group.instances[0]);
        }

        Ok(Self {
            tuple: Some(tuple),
            ignored,
        })
    }

    /// 被忽略的多余实例：(事实名, 忽略数量)
    pub fn ignored(&self) -> &[(String, usize)] {
        &self.ignored
    }

    pub fn next_tuple(&mut self) -> Option<FactTuple<'a>> {
        self.tuple.take()
    }
}

/// 笛卡尔积：混合进制计数器，第一个事实名变化最快，每次返回新元组
#[derive(Debug)]
pub struct CrossProductGenerator<'a> {
    groups: Vec<FactGroup<'a>>,
    indices: Vec<usize>,
    exhausted: bool,
}

impl<'a> CrossProductGenerator<'a> {
    pub fn new(groups: Vec<FactGroup<'a>>) -> Result<Self> {
        ensure_non_empty(&groups)?;
        let indices = vec![0; groups.len()];
        Ok(Self {
            groups,
            indices,
            exhausted: false,
        })
    }

    /// 元组总数
    pub fn total(&self) -> usize {
        self.groups.iter().map(|g| g.instances.len()).product()
    }

    fn snapshot(&self) -> FactTuple<'a> {
        let mut tuple = FactTuple::new();
        for (group, &index) in self.groups.iter().zip(&self.indices) {
            tuple.bind(&group.name, group.instances[index]);
        }
        tuple
    }

    /// 计数器进位，最后一位回绕时结束
    fn advance(&mut self) {
        for (position, group) in self.groups.iter().enumerate() {
            self.indices[position] += 1;
            if self.indices[position] < group.instances.len() {
                return;
            }
            self.indices[position] = 0;
        }
        self.exhausted = true;
    }
}

impl<'a> Iterator for CrossProductGenerator<'a> {
    type Item = FactTuple<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let tuple = self.snapshot();
        self.advance();
        Some(tuple)
    }
}

/// 按策略分派的元组生成器
#[derive(Debug)]
pub enum TupleGenerator<'a> {
    RoundRobin(RoundRobinGenerator<'a>),
    SingleInstance(SingleInstanceGenerator<'a>),
    CrossProduct(CrossProductGenerator<'a>),
}

impl<'a> TupleGenerator<'a> {
    pub fn new(mut groups: Vec<FactGroup<'a>>, cross_product: bool) -> Result<Self> {
        let generator = match TupleStrategy::select(groups.len(), cross_product) {
            TupleStrategy::RoundRobin => match groups.pop() {
                Some(group) => Self::RoundRobin(RoundRobinGenerator::new(group)?),
                None => Self::SingleInstance(SingleInstanceGenerator::new(groups)?),
            },
            TupleStrategy::SingleInstance => {
                Self::SingleInstance(SingleInstanceGenerator::new(groups)?)
            }
            TupleStrategy::CrossProduct => Self::CrossProduct(CrossProductGenerator::new(groups)?),
        };
        Ok(generator)
    }

    pub fn strategy(&self) -> TupleStrategy {
        match self {
            Self::RoundRobin(_) => TupleStrategy::RoundRobin,
            Self::SingleInstance(_) => TupleStrategy::SingleInstance,
            Self::CrossProduct(_) => TupleStrategy::CrossProduct,
        }
    }

    pub fn reuses_buffer(&self) -> bool {
        self.strategy().reuses_buffer()
    }

    /// 下一个元组：轮询策略返回借用的缓冲区，其余策略返回新元组
    pub fn next_tuple(&mut self) -> Option<Cow<'_, FactTuple<'a>>> {
        match self {
            Self::RoundRobin(generator) => generator.next_tuple().map(Cow::Borrowed),
            Self::SingleInstance(generator) => generator.next_tuple().map(Cow::Owned),
            Self::CrossProduct(generator) => generator.next().map(Cow::Owned),
        }
    }
}
