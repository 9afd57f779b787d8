//! 存储模块
//!
//! 译文缓存、页面预翻译表与已写回值的登记表。

pub mod applied;
pub mod cache;
pub mod pretranslation;

pub use applied::{AppliedValues, PseudoTable};
pub use cache::{CacheConfig, CacheStats, TargetCache};
pub use pretranslation::PretranslationTable;
