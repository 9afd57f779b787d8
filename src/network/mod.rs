//! # 网络模块
//!
//! - `protocol` - 翻译、预翻译与 AMI 接口的 JSON 结构
//! - `client` - 翻译后端接口、HTTP 实现与重试策略

pub mod client;
pub mod protocol;

pub use client::{HttpTransport, LoopbackTransport, RetryPolicy, TranslationTransport};
pub use protocol::{
    AmiBlock, AmiRequest, PretranslationResponse, RequestBlock, ResponseBlock, TranslateRequest,
    TranslateResponse,
};
