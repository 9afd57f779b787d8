//! # Moxie
//!
//! 实时 DOM 本地化引擎：把页面中的可翻译内容提取为 JLIFF 块，批量送往翻译服务，
//! 再把译文写回原来的位置，并持续监听 DOM 变更以翻译动态插入的内容。
//!
//! ## 模块组织
//!
//! - `core` - 对外入口 `Moxie`
//! - `parsers` - HTML 实时 DOM、CSS 与选择器
//! - `network` - 翻译服务协议与 HTTP 客户端
//! - `translation` - 分类、记号化、序列化、写回与变更监听
//! - `env` - 环境变量

pub mod core;
pub mod env;
pub mod network;
pub mod parsers;
pub mod translation;

// Re-export commonly used items for convenience
pub use crate::core::{has_meta_marker, Completion, Moxie};
pub use crate::network::{HttpTransport, LoopbackTransport, TranslationTransport};
pub use crate::parsers::html::Dom;
pub use crate::translation::{MoxieConfig, MoxieError, RuleSet, TranslationResult};
