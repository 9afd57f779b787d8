//! 翻译管道模块
//!
//! DOM 与 JLIFF 之间的双向转换：分类、记号化、序列化、块聚合、收集与写回。

pub mod aggregator;
pub mod classifier;
pub mod collector;
pub mod deserializer;
pub mod serializer;
pub mod tokenizer;

// 重新导出主要类型
pub use aggregator::nearest_block;
pub use classifier::{Classification, Classifier, NoTranslateReason, NodeContext};
pub use collector::{BlockCollector, CollectRoot};
pub use deserializer::{render_source, AppliedText, Deserializer};
pub use serializer::{seen_key, PendingRoot, SerializedRoot, Serializer};
pub use tokenizer::{
    IdentityLocalizer, Localizer, Segment, TokenKind, TokenPass, TokenizeContext, TokenizedText,
    Tokenizer,
};
