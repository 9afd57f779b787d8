//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制

use std::fmt;

use thiserror::Error;

/// 翻译错误类型
#[derive(Error, Debug, Clone)]
pub enum MoxieError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 规则错误（正则表达式无法编译等）
    #[error("规则错误: {0}")]
    Rule(String),

    /// 选择器语法错误
    #[error("选择器错误: {0}")]
    Selector(String),

    /// JLIFF 与 DOM 对象表结构不一致
    #[error("结构不一致: {0}")]
    Structure(String),

    /// 网络或服务端错误，`status` 为 0 表示传输层失败
    #[error("网络错误 (状态码 {status}): {message}")]
    Transport { status: u16, message: String },

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),

    /// 页面已经被翻译过
    #[error("页面已翻译，拒绝重复执行")]
    AlreadyTranslated,

    /// IO错误
    #[error("IO错误: {0}")]
    Io(String),
}

impl MoxieError {
    /// 检查错误是否可在传输层重试
    pub fn is_retryable(&self) -> bool {
        match self {
            MoxieError::Transport { status, .. } => *status == 0,
            MoxieError::Io(_) => true,
            _ => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            MoxieError::Config(_) => ErrorSeverity::Warning,
            MoxieError::Rule(_) => ErrorSeverity::Warning,
            MoxieError::Selector(_) => ErrorSeverity::Warning,
            MoxieError::Structure(_) => ErrorSeverity::Error,
            MoxieError::Transport { .. } => ErrorSeverity::Error,
            MoxieError::Parse(_) => ErrorSeverity::Error,
            MoxieError::AlreadyTranslated => ErrorSeverity::Critical,
            MoxieError::Io(_) => ErrorSeverity::Error,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            MoxieError::Config(_) | MoxieError::Rule(_) | MoxieError::Selector(_) => {
                ErrorCategory::Configuration
            }
            MoxieError::Structure(_) => ErrorCategory::Structure,
            MoxieError::Transport { .. } | MoxieError::Io(_) => ErrorCategory::Transport,
            MoxieError::Parse(_) => ErrorCategory::Parsing,
            MoxieError::AlreadyTranslated => ErrorCategory::Invariant,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(self, context: T) -> Self {
        let add = |msg: String| format!("{} (上下文: {})", msg, context);
        match self {
            MoxieError::Config(msg) => MoxieError::Config(add(msg)),
            MoxieError::Rule(msg) => MoxieError::Rule(add(msg)),
            MoxieError::Selector(msg) => MoxieError::Selector(add(msg)),
            MoxieError::Structure(msg) => MoxieError::Structure(add(msg)),
            MoxieError::Transport { status, message } => MoxieError::Transport {
                status,
                message: add(message),
            },
            MoxieError::Parse(msg) => MoxieError::Parse(add(msg)),
            MoxieError::Io(msg) => MoxieError::Io(add(msg)),
            MoxieError::AlreadyTranslated => MoxieError::AlreadyTranslated,
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Structure,
    Transport,
    Parsing,
    Invariant,
}

impl From<std::io::Error> for MoxieError {
    fn from(error: std::io::Error) -> Self {
        MoxieError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for MoxieError {
    fn from(error: serde_json::Error) -> Self {
        MoxieError::Parse(format!("JSON解析错误: {}", error))
    }
}

impl From<toml::de::Error> for MoxieError {
    fn from(error: toml::de::Error) -> Self {
        MoxieError::Parse(format!("TOML解析错误: {}", error))
    }
}

impl From<config::ConfigError> for MoxieError {
    fn from(error: config::ConfigError) -> Self {
        MoxieError::Config(error.to_string())
    }
}

impl From<regex::Error> for MoxieError {
    fn from(error: regex::Error) -> Self {
        MoxieError::Rule(error.to_string())
    }
}

impl From<reqwest::Error> for MoxieError {
    fn from(error: reqwest::Error) -> Self {
        MoxieError::Transport {
            status: error.status().map(|s| s.as_u16()).unwrap_or(0),
            message: error.to_string(),
        }
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, MoxieError>;

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误
    pub fn log_error(error: &MoxieError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("翻译信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("翻译警告: {}", error),
            ErrorSeverity::Error => tracing::error!("翻译错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("翻译严重错误: {}", error),
        }
    }

    /// 创建结构错误
    pub fn structure_error<T: fmt::Display>(msg: T) -> MoxieError {
        MoxieError::Structure(msg.to_string())
    }

    /// 创建传输错误
    pub fn transport_error<T: fmt::Display>(status: u16, msg: T) -> MoxieError {
        MoxieError::Transport {
            status,
            message: msg.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_retryability() {
        assert!(helpers::transport_error(0, "reset").is_retryable());
        assert!(!helpers::transport_error(502, "bad gateway").is_retryable());
        assert!(!MoxieError::Structure("x".into()).is_retryable());
    }

    #[test]
    fn test_with_context_keeps_variant() {
        let err = helpers::structure_error("missing ph:3").with_context("block 42");
        assert_eq!(err.category(), ErrorCategory::Structure);
        assert!(err.to_string().contains("block 42"));
    }
}
