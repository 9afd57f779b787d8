//! 页面预翻译表
//!
//! 每次导航按页面路径哈希加载一次，在发出任何翻译请求前先查这里。

use std::collections::HashMap;

use crate::network::protocol::PretranslationResponse;
use crate::translation::jliff::JliffItem;

#[derive(Debug, Default)]
pub struct PretranslationTable {
    page_hash: Option<String>,
    targets: HashMap<String, Vec<JliffItem>>,
    assets: HashMap<String, serde_json::Value>,
}

impl PretranslationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以新页面的数据替换整张表
    pub fn load(&mut self, page_hash: &str, response: PretranslationResponse) {
        tracing::debug!(
            "载入预翻译表: 页面 {}，{} 条译文，{} 个资源",
            page_hash,
            response.targets.len(),
            response.assets.len()
        );
        self.page_hash = Some(page_hash.to_string());
        self.targets = response.targets;
        self.assets = response.assets;
    }

    pub fn is_loaded_for(&self, page_hash: &str) -> bool {
        self.page_hash.as_deref() == Some(page_hash)
    }

    pub fn page_hash(&self) -> Option<&str> {
        self.page_hash.as_deref()
    }

    pub fn get(&self, block_hash: &str) -> Option<&Vec<JliffItem>> {
        self.targets.get(block_hash)
    }

    pub fn assets(&self) -> &HashMap<String, serde_json::Value> {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn clear(&mut self) {
        self.page_hash = None;
        self.targets.clear();
        self.assets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_replaces_previous_page() {
        let mut table = PretranslationTable::new();
        let first: PretranslationResponse =
            serde_json::from_str(r#"{"targets": {"1": [{"kind": "text", "text": "Un"}]}}"#).unwrap();
        table.load("100", first);
        assert!(table.is_loaded_for("100"));
        assert_eq!(table.get("1"), Some(&vec![JliffItem::text("Un")]));

        let second: PretranslationResponse =
            serde_json::from_str(r#"{"targets": {}, "assets": {"logo.png": "logo-fr.png"}}"#).unwrap();
        table.load("200", second);
        assert!(!table.is_loaded_for("100"));
        assert!(table.get("1").is_none());
        assert_eq!(table.assets().len(), 1);
    }
}
