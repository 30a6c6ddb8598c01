//! 绑定环境
//!
//! 每个 (规则, 事实元组) 求值时创建一次：规则属性覆盖在事实元组之上，
//! 同名时属性优先。求值结束即丢弃。

use crate::invocation::EngineController;
use crate::tuples::FactTuple;
use serde_json::Value;
use std::collections::BTreeMap;

pub struct Bindings<'a> {
    rule_id: &'a str,
    attributes: &'a BTreeMap<String, Value>,
    tuple: &'a FactTuple<'a>,
    context: &'a Value,
    controller: &'a EngineController,
}

impl<'a> Bindings<'a> {
    pub fn new(
        rule_id: &'a str,
        attributes: &'a BTreeMap<String, Value>,
        tuple: &'a FactTuple<'a>,
        context: &'a Value,
        controller: &'a EngineController,
    ) -> Self {
        Self {
            rule_id,
            attributes,
            tuple,
            context,
            controller,
        }
    }

    /// 按名称查找：属性优先，其次事实
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.attributes
            .get(name)
            .or_else(|| self.tuple.get(name))
    }

    pub fn rule_id(&self) -> &'a str {
        self.rule_id
    }

    /// `ctx` 保留名：调用方的结果累加器
    pub fn context(&self) -> &'a Value {
        self.context
    }

    pub fn controller(&self) -> &'a EngineController {
        self.controller
    }
}
