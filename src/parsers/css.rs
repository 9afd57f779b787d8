//! CSS 解析器模块
//!
//! 使用 cssparser 解析内联 `style` 声明和 `<style>` 样式表，
//! 为文本收集提供 `white-space`、隐藏状态以及 `::before`/`::after` 伪元素的 `content` 值。
//!
//! # 主要功能
//!
//! - **声明解析**: 将 `a: b; c: d` 形式的声明列表拆分为属性与值
//! - **伪元素规则**: 从样式表中提取带 `content` 字符串的伪元素规则
//! - **样式查询**: `StyleResolver` 计算继承后的 `white-space` 与隐藏状态

use cssparser::{serialize_string, Delimiter, ParseError, Parser, ParserInput, Token};
use markup5ever_rcdom::{Handle, NodeData};

use crate::parsers::html::dom::{
    get_node_attr, get_node_name, get_parent_node, text_content, Dom,
};
use crate::parsers::selector::Selector;

/// 注入伪元素翻译样式时使用的 `<style>` id，扫描样式表时跳过
pub const PSEUDO_STYLE_ELEMENT_ID: &str = "moxie-pseudo-styles";

/// 用户代理样式表中默认 `white-space: pre` 的元素
const UA_PRE_ELEMENTS: &[&str] = &["pre", "textarea", "listing", "plaintext", "xmp"];

/// 单条CSS声明
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// 小写属性名
    pub name: String,
    /// 原始值（去掉 `!important`）
    pub value: String,
    /// 值中出现的带引号字符串（已反转义）
    pub strings: Vec<String>,
}

/// `white-space` 取值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhiteSpace {
    #[default]
    Normal,
    Nowrap,
    Pre,
    PreWrap,
    PreLine,
    BreakSpaces,
}

impl WhiteSpace {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(WhiteSpace::Normal),
            "nowrap" => Some(WhiteSpace::Nowrap),
            "pre" => Some(WhiteSpace::Pre),
            "pre-wrap" => Some(WhiteSpace::PreWrap),
            "pre-line" => Some(WhiteSpace::PreLine),
            "break-spaces" => Some(WhiteSpace::BreakSpaces),
            _ => None,
        }
    }

    /// 是否完全保留空白
    pub fn preserves_all(self) -> bool {
        matches!(
            self,
            WhiteSpace::Pre | WhiteSpace::PreWrap | WhiteSpace::BreakSpaces
        )
    }
}

/// 伪元素种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PseudoKind {
    Before,
    After,
}

impl PseudoKind {
    pub fn as_css(self) -> &'static str {
        match self {
            PseudoKind::Before => "::before",
            PseudoKind::After => "::after",
        }
    }
}

/// 样式表中带 `content` 字符串的伪元素规则
#[derive(Debug)]
pub struct PseudoRule {
    pub selector: Selector,
    pub kind: PseudoKind,
    pub content: String,
}

/// 解析声明列表（内联 `style` 属性或规则块内部）
pub fn parse_declarations(css: &str) -> Vec<Declaration> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    parse_declaration_list(&mut parser)
}

fn parse_declaration_list(parser: &mut Parser) -> Vec<Declaration> {
    let mut declarations = Vec::new();

    while !parser.is_exhausted() {
        let result: Result<Declaration, ParseError<'_, ()>> =
            parser.parse_until_after(Delimiter::Semicolon, |p| {
                let name = p.expect_ident()?.to_ascii_lowercase();
                p.expect_colon()?;
                let start = p.position();
                let mut strings = Vec::new();
                while let Ok(token) = p.next() {
                    if let Token::QuotedString(value) = token {
                        strings.push(value.to_string());
                    }
                }
                let raw = p.slice_from(start).trim();
                let value = match raw.to_ascii_lowercase().rfind("!important") {
                    Some(index) => raw[..index].trim().to_string(),
                    None => raw.to_string(),
                };
                Ok(Declaration {
                    name,
                    value,
                    strings,
                })
            });

        if let Ok(declaration) = result {
            declarations.push(declaration);
        }
    }

    declarations
}

/// 从样式表文本中提取伪元素 `content` 规则
///
/// 只处理普通规则以及 `@media`/`@supports` 内部的规则；
/// 无法解析的选择器记录警告后跳过。
pub fn parse_pseudo_rules(css: &str) -> Vec<PseudoRule> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut rules = Vec::new();
    collect_pseudo_rules(&mut parser, &mut rules);
    rules
}

fn collect_pseudo_rules(parser: &mut Parser, rules: &mut Vec<PseudoRule>) {
    loop {
        parser.skip_whitespace();
        if parser.is_exhausted() {
            break;
        }

        let prelude: Result<String, ParseError<'_, ()>> = parser.parse_until_before(
            Delimiter::CurlyBracketBlock | Delimiter::Semicolon,
            |p| {
                let start = p.position();
                while p.next_including_whitespace_and_comments().is_ok() {}
                Ok(p.slice_from(start).trim().to_string())
            },
        );
        let prelude = prelude.unwrap_or_default();

        match parser.next() {
            Ok(Token::CurlyBracketBlock) => {}
            _ => continue,
        }

        if prelude.starts_with('@') {
            let lowered = prelude.to_ascii_lowercase();
            let grouping = lowered.starts_with("@media") || lowered.starts_with("@supports");
            let _: Result<(), ParseError<'_, ()>> = parser.parse_nested_block(|p| {
                if grouping {
                    collect_pseudo_rules(p, rules);
                } else {
                    while p.next().is_ok() {}
                }
                Ok(())
            });
            continue;
        }

        let declarations: Result<Vec<Declaration>, ParseError<'_, ()>> =
            parser.parse_nested_block(|p| Ok(parse_declaration_list(p)));
        let Ok(declarations) = declarations else {
            continue;
        };

        let Some(content) = declarations
            .iter()
            .rev()
            .find(|d| d.name == "content")
            .filter(|d| !d.strings.is_empty())
            .map(|d| d.strings.concat())
        else {
            continue;
        };

        for part in prelude.split(',') {
            let Some((selector_text, kind)) = split_pseudo_element(part.trim()) else {
                continue;
            };
            match Selector::parse(selector_text) {
                Ok(selector) => rules.push(PseudoRule {
                    selector,
                    kind,
                    content: content.clone(),
                }),
                Err(e) => tracing::warn!("忽略无法解析的伪元素选择器 '{}': {}", part.trim(), e),
            }
        }
    }
}

/// 拆出选择器末尾的 `::before`/`::after`（兼容单冒号写法）
fn split_pseudo_element(selector: &str) -> Option<(&str, PseudoKind)> {
    let lowered = selector.to_ascii_lowercase();
    for (suffix, kind) in [
        ("::before", PseudoKind::Before),
        ("::after", PseudoKind::After),
        (":before", PseudoKind::Before),
        (":after", PseudoKind::After),
    ] {
        if lowered.ends_with(suffix) {
            let base = selector[..selector.len() - suffix.len()].trim_end();
            return Some((if base.is_empty() { "*" } else { base }, kind));
        }
    }
    None
}

/// 格式化CSS字符串，用于生成 `content: "..."`
pub fn format_quoted_string(string: &str) -> String {
    let mut res: String = "".to_string();
    let _ = serialize_string(string, &mut res);
    res
}

/// 样式查询
///
/// 相当于浏览器 `getComputedStyle` 的一个子集：只依据内联样式、
/// 用户代理默认值和文档中的伪元素规则。
#[derive(Default)]
pub struct StyleResolver {
    pseudo_rules: Vec<PseudoRule>,
}

impl StyleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 扫描文档中的 `<style>` 元素
    pub fn from_document(dom: &Dom) -> Self {
        let mut resolver = Self::new();
        resolver.scan(&dom.document());
        resolver
    }

    fn scan(&mut self, node: &Handle) {
        if get_node_name(node) == Some("style") {
            if get_node_attr(node, "id").as_deref() != Some(PSEUDO_STYLE_ELEMENT_ID) {
                self.pseudo_rules
                    .extend(parse_pseudo_rules(&text_content(node)));
            }
            return;
        }
        for child in node.children.borrow().iter() {
            self.scan(child);
        }
    }

    pub fn add_stylesheet(&mut self, css: &str) {
        self.pseudo_rules.extend(parse_pseudo_rules(css));
    }

    /// 计算后的 `white-space`（沿祖先继承）
    pub fn white_space(&self, node: &Handle) -> WhiteSpace {
        let mut current = Some(node.clone());
        while let Some(n) = current {
            if let NodeData::Element { .. } = n.data {
                if let Some(ws) = inline_property(&n, "white-space").and_then(|v| WhiteSpace::parse(&v)) {
                    return ws;
                }
                if let Some(name) = get_node_name(&n) {
                    if UA_PRE_ELEMENTS.contains(&name) {
                        return WhiteSpace::Pre;
                    }
                }
            }
            current = get_parent_node(&n);
        }
        WhiteSpace::Normal
    }

    /// 元素自身是否被隐藏（`hidden` 属性、`display:none`、`visibility:hidden`）
    pub fn is_hidden(&self, node: &Handle) -> bool {
        if get_node_attr(node, "hidden").is_some() {
            return true;
        }
        let declarations = get_node_attr(node, "style")
            .map(|s| parse_declarations(&s))
            .unwrap_or_default();
        declarations.iter().any(|d| {
            let value = d.value.to_ascii_lowercase();
            (d.name == "display" && value == "none") || (d.name == "visibility" && value == "hidden")
        })
    }

    /// 伪元素的 `content` 字符串，后出现的规则优先
    pub fn pseudo_content(&self, node: &Handle, kind: PseudoKind) -> Option<String> {
        self.pseudo_rules
            .iter()
            .rev()
            .find(|rule| rule.kind == kind && rule.selector.matches(node))
            .map(|rule| rule.content.clone())
    }
}

fn inline_property(node: &Handle, property: &str) -> Option<String> {
    let style = get_node_attr(node, "style")?;
    parse_declarations(&style)
        .into_iter()
        .rev()
        .find(|d| d.name == property)
        .map(|d| d.value)
}
