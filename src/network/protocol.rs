//! 翻译服务的线上协议

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::translation::jliff::JliffItem;

/// 请求中的一个块
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBlock {
    pub source: Vec<JliffItem>,
    pub block_hash: String,
    pub suppress_mt: bool,
}

/// 翻译请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslateRequest {
    pub url: String,
    pub content_url_hash: String,
    pub text: Vec<RequestBlock>,
}

impl TranslateRequest {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }
}

/// 响应中的一个块，与请求按位置对应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBlock {
    pub target: Vec<JliffItem>,
}

/// 翻译响应
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslateResponse {
    pub text: Vec<ResponseBlock>,
    /// 需要回传 AMI 的块哈希
    #[serde(default)]
    pub ami: Vec<String>,
}

/// 预翻译表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PretranslationResponse {
    #[serde(default)]
    pub targets: HashMap<String, Vec<JliffItem>>,
    #[serde(default)]
    pub assets: HashMap<String, serde_json::Value>,
}

/// AMI 回传中的一个块
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmiBlock {
    pub source: Vec<JliffItem>,
    pub block_hash: String,
}

/// AMI 回传请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmiRequest {
    pub url: String,
    pub content_url_hash: String,
    pub text: Vec<AmiBlock>,
}
