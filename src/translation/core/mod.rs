//! 翻译系统核心模块
//!
//! - **会话** (`session.rs`): 一次页面导航内的共享状态
//! - **引擎** (`engine.rs`): 收集、查缓存、发请求、写回的遍历状态机
//!
//! ```text
//! TranslationEngine (engine.rs)
//!     ├── TranslationSession (session.rs)
//!     │       ├── CompiledRules (config/rules.rs)
//!     │       ├── TargetCache / PretranslationTable (storage)
//!     │       └── TranslationQueue
//!     ├── BlockCollector (pipeline/collector.rs)
//!     └── Deserializer (pipeline/deserializer.rs)
//! ```

pub mod engine;
pub mod session;

pub use engine::{
    FinishedPass, InFlightPass, PassOutcome, PassReport, PassResponses, TranslationEngine,
};
pub use session::{PassState, SelfWriteGuard, TranslationQueue, TranslationSession};
