//! 翻译模块
//!
//! 实时 DOM 本地化的全部环节：
//! - **config**: 引擎配置与 UTICX 规则表
//! - **pipeline**: 分类、记号化、DOM ↔ JLIFF 双向转换、块聚合
//! - **core**: 翻译会话与遍历状态机
//! - **storage**: 译文缓存、预翻译表、已写回值与伪元素样式表
//! - **observer**: 变更监听与防抖
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use moxie::parsers::html::Dom;
//! use moxie::translation::{MoxieConfig, RuleSet, TranslationEngine, TranslationSession};
//! use moxie::translation::pipeline::CollectRoot;
//!
//! let dom = Dom::parse("<html><body><p>Hello</p></body></html>").unwrap();
//! let session = TranslationSession::new(MoxieConfig::default(), RuleSet::default(), "https://example.com/");
//! let mut engine = TranslationEngine::new(session);
//! let body = dom.body().unwrap();
//! let _outcome = engine.begin_pass(&dom, vec![CollectRoot::Node(body)]);
//! ```

/// 配置管理模块
pub mod config;

/// 会话与引擎
pub mod core;

/// 统一的错误类型
pub mod error;

/// 块哈希与页面哈希
pub mod hash;

/// JLIFF 数据模型
pub mod jliff;

/// 变更监听
pub mod observer;

/// 文本处理管道
pub mod pipeline;

/// 缓存与页面范围的存储
pub mod storage;

pub use self::config::{constants, ConfigManager, MoxieConfig, RuleSet};
pub use self::core::{
    FinishedPass, InFlightPass, PassOutcome, PassReport, PassResponses, PassState,
    TranslationEngine, TranslationSession,
};
pub use error::{ErrorCategory, ErrorSeverity, MoxieError, TranslationResult};
pub use hash::{block_hash, content_url_hash};
pub use jliff::{BlockRoot, DisplayKind, JliffItem, SerializedBlock, TextBlock};
pub use observer::{Debouncer, MutationKind, MutationObserver, MutationOrigin, MutationRecord};
pub use storage::{CacheConfig, CacheStats, PretranslationTable, TargetCache};

/// 检查配置文件是否存在
pub fn config_file_exists() -> bool {
    config::config_file_exists()
}

/// 生成示例配置文件 `moxie.toml`
pub fn generate_example_config(path: &str) -> TranslationResult<()> {
    ConfigManager::generate_example_config(path)?;
    tracing::info!("已生成示例配置文件: {}", path);
    Ok(())
}
