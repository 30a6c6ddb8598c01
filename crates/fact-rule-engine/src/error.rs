//! 规则引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则编译失败 [{rule}]: {message}")]
    Compile { rule: String, message: String },

    #[error("无效的引用 [{rule}] '{reference}': {message}")]
    InvalidReference {
        rule: String,
        reference: String,
        message: String,
    },

    #[error("未注册的操作符 [{rule}]: {name}")]
    UnknownOperator { rule: String, name: String },

    #[error("未注册的函数 [{rule}]: {name}")]
    UnknownFunction { rule: String, name: String },

    #[error("未注册的动作 [{rule}]: {name}")]
    UnknownAction { rule: String, name: String },

    #[error("规则集不存在: {0}")]
    RulesetNotFound(String),

    #[error("规则仓库错误: {0}")]
    Repository(String),

    #[error("类型不匹配: 期望 {expected}, 实际 {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("调用失败 {name}: {message}")]
    Invocation { name: String, message: String },

    #[error("事实分组为空: {0}")]
    EmptyFactGroup(String),

    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl RuleError {
    pub fn compile(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compile {
            rule: rule.into(),
            message: message.into(),
        }
    }

    pub fn invalid_reference(
        rule: impl Into<String>,
        reference: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidReference {
            rule: rule.into(),
            reference: reference.into(),
            message: message.into(),
        }
    }

    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invocation(name: impl Into<String>, message: impl ToString) -> Self {
        Self::Invocation {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// 是否属于编译期（配置类）错误
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Self::Compile { .. }
                | Self::InvalidReference { .. }
                | Self::UnknownOperator { .. }
                | Self::UnknownFunction { .. }
                | Self::UnknownAction { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
