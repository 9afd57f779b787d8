// 集成测试公共模块
//
// 提供 HTML 解析辅助与可编排的翻译后端

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use markup5ever_rcdom::Handle;

use moxie::network::{
    AmiRequest, PretranslationResponse, ResponseBlock, TranslateRequest, TranslateResponse,
    TranslationTransport,
};
use moxie::parsers::html::{get_child_node_by_name, Dom};
use moxie::translation::{JliffItem, MoxieConfig, RuleSet, TranslationResult};
use moxie::Moxie;

pub const PAGE_URL: &str = "https://shop.example.com/products/widget";

/// HTML 测试辅助
pub struct HtmlTestHelper;

impl HtmlTestHelper {
    pub fn parse(html: &str) -> Dom {
        Dom::parse(html).expect("test HTML should parse")
    }

    /// 按标签名逐级查找 `<body>` 下的元素
    pub fn find(dom: &Dom, path: &[&str]) -> Handle {
        let mut node = dom.body().expect("document should have a body");
        for name in path {
            node = get_child_node_by_name(&node, name)
                .unwrap_or_else(|| panic!("missing <{}> on path {:?}", name, path));
        }
        node
    }

    pub fn create_product_page() -> String {
        r#"<!DOCTYPE html>
<html>
<head><title>Widget</title></head>
<body>
<h1>Deluxe Widget</h1>
<p>Only 3 left in stock. Order within 2 hours for delivery on 12/24/2025.</p>
<p>Click <a href="/cart">here</a> for more!</p>
<ul><li>Fast shipping</li><li>Free returns</li></ul>
<button title="Add to your cart">Add to cart</button>
</body>
</html>"#
            .to_string()
    }
}

/// 把每段文本转换成大写的“译文”
pub fn uppercase_target(source: &[JliffItem]) -> Vec<JliffItem> {
    source
        .iter()
        .map(|item| match item {
            JliffItem::Text { text } => JliffItem::text(text.to_uppercase()),
            other => other.clone(),
        })
        .collect()
}

/// 可编排的翻译后端
///
/// 默认把文本转为大写；可以预先排入失败或自定义响应，并记录所有请求。
#[derive(Default)]
pub struct ScriptedTransport {
    pub requests: RefCell<Vec<TranslateRequest>>,
    pub ami: RefCell<Vec<AmiRequest>>,
    pub scripted: RefCell<VecDeque<TranslationResult<TranslateResponse>>>,
    pub pretranslation: RefCell<HashMap<String, Vec<JliffItem>>>,
    pub pretranslation_fetches: Cell<usize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: TranslationResult<TranslateResponse>) {
        self.scripted.borrow_mut().push_back(response);
    }

    pub fn sent_blocks(&self) -> usize {
        self.requests.borrow().iter().map(TranslateRequest::len).sum()
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl TranslationTransport for ScriptedTransport {
    fn translate(&self, request: &TranslateRequest) -> TranslationResult<TranslateResponse> {
        self.requests.borrow_mut().push(request.clone());
        if let Some(scripted) = self.scripted.borrow_mut().pop_front() {
            return scripted;
        }
        Ok(TranslateResponse {
            text: request
                .text
                .iter()
                .map(|block| ResponseBlock {
                    target: uppercase_target(&block.source),
                })
                .collect(),
            ami: Vec::new(),
        })
    }

    fn translate_auto_detect(&self, request: &TranslateRequest) -> TranslationResult<TranslateResponse> {
        self.translate(request)
    }

    fn fetch_pretranslation(&self, _content_url_hash: &str) -> TranslationResult<PretranslationResponse> {
        self.pretranslation_fetches.set(self.pretranslation_fetches.get() + 1);
        Ok(PretranslationResponse {
            targets: self.pretranslation.borrow().clone(),
            assets: HashMap::new(),
        })
    }

    fn post_ami(&self, request: &AmiRequest) -> TranslationResult<()> {
        self.ami.borrow_mut().push(request.clone());
        Ok(())
    }
}

pub fn moxie_with(
    transport: &ScriptedTransport,
    config: MoxieConfig,
    rules: RuleSet,
) -> Moxie<&ScriptedTransport> {
    Moxie::new(config, rules, PAGE_URL, transport)
}
