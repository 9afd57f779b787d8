//! UTICX 翻译规则
//!
//! 规则表是一个 JSON 对象：键为规则类别，值为规则对象数组。
//! 每条规则由 URL、标签栈、id 栈、class 栈的正则以及一个 CSS 选择器组成，
//! 选择器存在时忽略三个栈正则。规则在会话开始时按页面 URL 编译一次。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::rc::Rc;

use lru::LruCache;
use markup5ever_rcdom::{Handle, WeakHandle};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::parsers::html::dom::{downgrade, NodeKey};
use crate::parsers::selector::Selector;
use crate::translation::error::{MoxieError, TranslationResult};
use crate::translation::jliff::Stacks;

/// 规则对象（未编译）
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RuleSpec {
    /// 页面 URL 正则
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u: Option<String>,
    /// 标签栈正则
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    /// id 栈正则
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i: Option<String>,
    /// class 栈正则
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<String>,
    /// CSS 选择器
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// `no_tokenize` 的记号类别
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// `tokenize_patterns` 的正则
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
    /// 属性规则涉及的属性名
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
}

/// 规则类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleCategory {
    NoTranslate,
    Translate,
    IgnoreHidden,
    TranslateAttributes,
    NoTranslateAttributes,
    TranslateInputValue,
    NoTranslateInputValue,
    PseudoTranslate,
    NoPseudoTranslate,
    SuppressMt,
    AutoDetect,
    NoTokenize,
    TokenizePatterns,
    SetAsBlockTag,
    SetAsInlineTag,
    IframeNoTrans,
    NoAmi,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 17] = [
        RuleCategory::NoTranslate,
        RuleCategory::Translate,
        RuleCategory::IgnoreHidden,
        RuleCategory::TranslateAttributes,
        RuleCategory::NoTranslateAttributes,
        RuleCategory::TranslateInputValue,
        RuleCategory::NoTranslateInputValue,
        RuleCategory::PseudoTranslate,
        RuleCategory::NoPseudoTranslate,
        RuleCategory::SuppressMt,
        RuleCategory::AutoDetect,
        RuleCategory::NoTokenize,
        RuleCategory::TokenizePatterns,
        RuleCategory::SetAsBlockTag,
        RuleCategory::SetAsInlineTag,
        RuleCategory::IframeNoTrans,
        RuleCategory::NoAmi,
    ];

    pub fn key(self) -> &'static str {
        match self {
            RuleCategory::NoTranslate => "no_translate",
            RuleCategory::Translate => "translate",
            RuleCategory::IgnoreHidden => "ignore_hidden",
            RuleCategory::TranslateAttributes => "translate_attributes",
            RuleCategory::NoTranslateAttributes => "no_translate_attributes",
            RuleCategory::TranslateInputValue => "translate_inputvalue",
            RuleCategory::NoTranslateInputValue => "no_translate_inputvalue",
            RuleCategory::PseudoTranslate => "pseudo_translate",
            RuleCategory::NoPseudoTranslate => "no_pseudo_translate",
            RuleCategory::SuppressMt => "suppress_mt",
            RuleCategory::AutoDetect => "auto_detect",
            RuleCategory::NoTokenize => "no_tokenize",
            RuleCategory::TokenizePatterns => "tokenize_patterns",
            RuleCategory::SetAsBlockTag => "set_as_block_tag",
            RuleCategory::SetAsInlineTag => "set_as_inline_tag",
            RuleCategory::IframeNoTrans => "iframe_notrans",
            RuleCategory::NoAmi => "no_ami",
        }
    }

    /// 选择器是否也匹配祖先（块/行内覆盖只看元素自身）
    pub fn includes_ancestors(self) -> bool {
        !matches!(
            self,
            RuleCategory::SetAsBlockTag | RuleCategory::SetAsInlineTag | RuleCategory::IframeNoTrans
        )
    }
}

/// 可单独关闭的记号类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenCategory {
    Custom,
    Dates,
    Timezones,
    Time,
    Numbers,
}

impl TokenCategory {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "custom" => Some(TokenCategory::Custom),
            "dates" => Some(TokenCategory::Dates),
            "timezones" => Some(TokenCategory::Timezones),
            "time" => Some(TokenCategory::Time),
            "numbers" => Some(TokenCategory::Numbers),
            _ => None,
        }
    }
}

/// 规则表
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RuleSet {
    pub no_translate: Vec<RuleSpec>,
    pub translate: Vec<RuleSpec>,
    pub ignore_hidden: Vec<RuleSpec>,
    pub translate_attributes: Vec<RuleSpec>,
    pub no_translate_attributes: Vec<RuleSpec>,
    pub translate_inputvalue: Vec<RuleSpec>,
    pub no_translate_inputvalue: Vec<RuleSpec>,
    pub pseudo_translate: Vec<RuleSpec>,
    pub no_pseudo_translate: Vec<RuleSpec>,
    pub suppress_mt: Vec<RuleSpec>,
    pub auto_detect: Vec<RuleSpec>,
    pub no_tokenize: Vec<RuleSpec>,
    pub tokenize_patterns: Vec<RuleSpec>,
    pub set_as_block_tag: Vec<RuleSpec>,
    pub set_as_inline_tag: Vec<RuleSpec>,
    pub iframe_notrans: Vec<RuleSpec>,
    pub no_ami: Vec<RuleSpec>,
}

impl RuleSet {
    /// 解析 JSON 规则表，未知类别被忽略
    pub fn from_json(json: &str) -> TranslationResult<Self> {
        serde_json::from_str(json).map_err(|e| MoxieError::Config(format!("规则表解析失败: {}", e)))
    }

    /// 从文件加载
    pub fn load(path: &Path) -> TranslationResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MoxieError::Config(format!("读取规则表 {} 失败: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn specs(&self, category: RuleCategory) -> &[RuleSpec] {
        match category {
            RuleCategory::NoTranslate => &self.no_translate,
            RuleCategory::Translate => &self.translate,
            RuleCategory::IgnoreHidden => &self.ignore_hidden,
            RuleCategory::TranslateAttributes => &self.translate_attributes,
            RuleCategory::NoTranslateAttributes => &self.no_translate_attributes,
            RuleCategory::TranslateInputValue => &self.translate_inputvalue,
            RuleCategory::NoTranslateInputValue => &self.no_translate_inputvalue,
            RuleCategory::PseudoTranslate => &self.pseudo_translate,
            RuleCategory::NoPseudoTranslate => &self.no_pseudo_translate,
            RuleCategory::SuppressMt => &self.suppress_mt,
            RuleCategory::AutoDetect => &self.auto_detect,
            RuleCategory::NoTokenize => &self.no_tokenize,
            RuleCategory::TokenizePatterns => &self.tokenize_patterns,
            RuleCategory::SetAsBlockTag => &self.set_as_block_tag,
            RuleCategory::SetAsInlineTag => &self.set_as_inline_tag,
            RuleCategory::IframeNoTrans => &self.iframe_notrans,
            RuleCategory::NoAmi => &self.no_ami,
        }
    }

    /// 针对某个页面 URL 编译规则
    ///
    /// `u` 不匹配当前页面的规则在这里就被丢弃；无法编译的正则或选择器
    /// 记录警告，对应规则永不匹配。
    pub fn compile(&self, page_url: &str, cache_size: usize) -> CompiledRules {
        let mut rules: HashMap<RuleCategory, Vec<CompiledRule>> = HashMap::new();
        let mut next_id = 0usize;

        for category in RuleCategory::ALL {
            for spec in self.specs(category) {
                if let Some(url_pattern) = &spec.u {
                    match Regex::new(url_pattern) {
                        Ok(re) if re.is_match(page_url) => {}
                        Ok(_) => continue,
                        Err(e) => {
                            tracing::warn!("{} 规则的 URL 正则无效 '{}': {}", category.key(), url_pattern, e);
                            continue;
                        }
                    }
                }

                let rule = CompiledRule::compile(next_id, category, spec);
                next_id += 1;
                rules.entry(category).or_default().push(rule);
            }
        }

        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        CompiledRules {
            rules,
            generation: Cell::new(0),
            selector_cache: RefCell::new(LruCache::new(capacity)),
        }
    }
}

/// 已编译的匹配条件
#[derive(Debug, Clone)]
pub enum Matcher {
    BySelector(Rc<Selector>),
    ByStacks {
        tag: Option<Regex>,
        id: Option<Regex>,
        class: Option<Regex>,
    },
    /// 配置有误，永不匹配
    Never,
}

/// 已编译的单条规则
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: usize,
    pub matcher: Matcher,
    /// `no_tokenize` 关闭的类别，空表示全部
    pub token_categories: Vec<TokenCategory>,
    pub patterns: Vec<Regex>,
    pub attributes: Vec<String>,
}

impl CompiledRule {
    fn compile(id: usize, category: RuleCategory, spec: &RuleSpec) -> Self {
        let matcher = match &spec.x {
            Some(selector) => match Selector::parse(selector) {
                Ok(selector) => Matcher::BySelector(Rc::new(selector)),
                Err(e) => {
                    tracing::warn!("{} 规则的选择器无效: {}", category.key(), e);
                    Matcher::Never
                }
            },
            None => {
                let compile = |pattern: &Option<String>| -> Result<Option<Regex>, regex::Error> {
                    pattern.as_deref().map(Regex::new).transpose()
                };
                match (compile(&spec.t), compile(&spec.i), compile(&spec.c)) {
                    (Ok(tag), Ok(id), Ok(class)) => Matcher::ByStacks { tag, id, class },
                    (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                        tracing::warn!("{} 规则的栈正则无效: {}", category.key(), e);
                        Matcher::Never
                    }
                }
            }
        };

        let token_categories = match &spec.category {
            None => Vec::new(),
            Some(names) => {
                let parsed: Vec<TokenCategory> = names
                    .split(|c: char| c == ',' || c == '|' || c.is_whitespace())
                    .filter(|n| !n.is_empty())
                    .filter_map(|name| {
                        let parsed = TokenCategory::parse(name);
                        if parsed.is_none() {
                            tracing::warn!("未知的记号类别 '{}'", name);
                        }
                        parsed
                    })
                    .collect();
                parsed
            }
        };

        let patterns = spec
            .patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!("忽略无效的自定义记号正则 '{}': {}", pattern, e);
                    None
                }
            })
            .collect();

        Self {
            id,
            matcher,
            token_categories,
            patterns,
            attributes: spec.attributes.iter().map(|a| a.to_ascii_lowercase()).collect(),
        }
    }
}

#[derive(Debug)]
struct CachedMatch {
    generation: u64,
    node: WeakHandle,
    matched: bool,
}

/// 会话内编译好的规则表
///
/// 选择器匹配结果按 (规则, 节点) 缓存，并记录计算时的代数；
/// 每次观察到 DOM 变更都会递增代数，旧结果随之失效。
pub struct CompiledRules {
    rules: HashMap<RuleCategory, Vec<CompiledRule>>,
    generation: Cell<u64>,
    selector_cache: RefCell<LruCache<(usize, NodeKey), CachedMatch>>,
}

impl CompiledRules {
    /// 没有任何规则
    pub fn empty() -> Self {
        RuleSet::default().compile("", 1)
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub fn bump_generation(&self) {
        self.generation.set(self.generation.get() + 1);
    }

    pub fn rules(&self, category: RuleCategory) -> &[CompiledRule] {
        self.rules.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_rules(&self, category: RuleCategory) -> bool {
        !self.rules(category).is_empty()
    }

    /// 是否有任一规则匹配
    pub fn matches(&self, category: RuleCategory, node: &Handle, stacks: &Stacks) -> bool {
        self.rules(category)
            .iter()
            .any(|rule| self.rule_matches(rule, category, node, stacks))
    }

    /// 所有匹配的规则
    pub fn matching(&self, category: RuleCategory, node: &Handle, stacks: &Stacks) -> Vec<&CompiledRule> {
        self.rules(category)
            .iter()
            .filter(|rule| self.rule_matches(rule, category, node, stacks))
            .collect()
    }

    fn rule_matches(&self, rule: &CompiledRule, category: RuleCategory, node: &Handle, stacks: &Stacks) -> bool {
        match &rule.matcher {
            Matcher::Never => false,
            Matcher::ByStacks { tag, id, class } => {
                let check = |re: &Option<Regex>, value: &str| re.as_ref().map_or(true, |re| re.is_match(value));
                check(tag, &stacks.tag) && check(id, &stacks.id) && check(class, &stacks.class)
            }
            Matcher::BySelector(selector) => {
                let key = (rule.id, NodeKey::of(node));
                let generation = self.generation.get();
                {
                    let mut cache = self.selector_cache.borrow_mut();
                    if let Some(cached) = cache.get(&key) {
                        let same_node = cached
                            .node
                            .upgrade()
                            .map_or(false, |n| Rc::ptr_eq(&n, node));
                        if cached.generation == generation && same_node {
                            return cached.matched;
                        }
                    }
                }

                let matched = if category.includes_ancestors() {
                    selector.matches_self_or_ancestor(node)
                } else {
                    selector.matches(node)
                };
                self.selector_cache.borrow_mut().put(
                    key,
                    CachedMatch {
                        generation,
                        node: downgrade(node),
                        matched,
                    },
                );
                matched
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{get_child_node_by_name, set_node_attr, Dom};

    fn stacks(tag: &str, id: &str, class: &str) -> Stacks {
        Stacks {
            tag: tag.to_string(),
            id: id.to_string(),
            class: class.to_string(),
        }
    }

    #[test]
    fn test_parse_rule_table_ignores_unknown_categories() {
        let rules = RuleSet::from_json(
            r#"{
                "no_translate": [{"x": ".sku"}, {"t": "/code$"}],
                "no_tokenize": [{"category": "numbers"}],
                "tokenize_patterns": [{"patterns": ["SKU-\\d+"]}],
                "language_selector": {"position": "top"},
                "no_host_rewrites": true
            }"#,
        )
        .unwrap();
        assert_eq!(rules.no_translate.len(), 2);
        assert_eq!(rules.no_tokenize[0].category.as_deref(), Some("numbers"));
        assert_eq!(rules.tokenize_patterns[0].patterns, vec!["SKU-\\d+".to_string()]);
    }

    #[test]
    fn test_url_filter_applied_at_compile_time() {
        let rules = RuleSet::from_json(r#"{"no_translate": [{"u": "/checkout", "t": "p$"}, {"t": "span$"}]}"#).unwrap();
        let on_cart = rules.compile("https://shop.example.com/cart", 16);
        let on_checkout = rules.compile("https://shop.example.com/checkout", 16);
        assert_eq!(on_cart.rules(RuleCategory::NoTranslate).len(), 1);
        assert_eq!(on_checkout.rules(RuleCategory::NoTranslate).len(), 2);
    }

    #[test]
    fn test_stack_rules() {
        let dom = Dom::parse("<html><body><p>x</p></body></html>").unwrap();
        let p = get_child_node_by_name(&dom.body().unwrap(), "p").unwrap();
        let rules = RuleSet::from_json(r#"{"no_translate": [{"t": "/body/p$", "i": "^///$"}]}"#)
            .unwrap()
            .compile("", 16);

        assert!(rules.matches(RuleCategory::NoTranslate, &p, &stacks("/html/body/p", "///", "///")));
        assert!(!rules.matches(RuleCategory::NoTranslate, &p, &stacks("/html/body/p", "///main/", "///")));
        assert!(!rules.matches(RuleCategory::Translate, &p, &stacks("/html/body/p", "///", "///")));
    }

    #[test]
    fn test_invalid_rules_never_match() {
        let dom = Dom::parse("<html><body><p>x</p></body></html>").unwrap();
        let p = get_child_node_by_name(&dom.body().unwrap(), "p").unwrap();
        let rules = RuleSet::from_json(r#"{"no_translate": [{"x": "p:hover"}, {"t": "("}]}"#)
            .unwrap()
            .compile("", 16);

        assert_eq!(rules.rules(RuleCategory::NoTranslate).len(), 2);
        assert!(!rules.matches(RuleCategory::NoTranslate, &p, &Stacks::default()));
    }

    #[test]
    fn test_selector_cache_invalidated_by_generation() {
        let dom = Dom::parse("<html><body><div><span>x</span></div></body></html>").unwrap();
        let div = get_child_node_by_name(&dom.body().unwrap(), "div").unwrap();
        let span = get_child_node_by_name(&div, "span").unwrap();
        let rules = RuleSet::from_json(r#"{"no_translate": [{"x": ".private"}]}"#)
            .unwrap()
            .compile("", 16);

        assert!(!rules.matches(RuleCategory::NoTranslate, &span, &Stacks::default()));

        set_node_attr(&div, "class", Some("private".to_string()));
        // 代数未变时沿用缓存结果
        assert!(!rules.matches(RuleCategory::NoTranslate, &span, &Stacks::default()));

        rules.bump_generation();
        assert!(rules.matches(RuleCategory::NoTranslate, &span, &Stacks::default()));
    }

    #[test]
    fn test_block_override_matches_element_only() {
        let dom = Dom::parse("<html><body><custom-card><span>x</span></custom-card></body></html>").unwrap();
        let card = get_child_node_by_name(&dom.body().unwrap(), "custom-card").unwrap();
        let span = get_child_node_by_name(&card, "span").unwrap();
        let rules = RuleSet::from_json(r#"{"set_as_block_tag": [{"x": "custom-card"}]}"#)
            .unwrap()
            .compile("", 16);

        assert!(rules.matches(RuleCategory::SetAsBlockTag, &card, &Stacks::default()));
        assert!(!rules.matches(RuleCategory::SetAsBlockTag, &span, &Stacks::default()));
    }
}
