//! CSS 选择器模块
//!
//! 将规则中的 CSS 选择器编译一次，然后直接在实时 DOM 上匹配。
//! 支持类型、通配、`#id`、`.class`、属性选择器，后代与子代组合符以及逗号分组；
//! 其他伪类一律视为无法解析。

use cssparser::{ParseError, Parser, ParserInput, Token};
use markup5ever_rcdom::Handle;

use crate::parsers::html::dom::{get_class_list, get_node_attr, get_node_name, get_parent_node, is_element};
use crate::translation::error::{MoxieError, TranslationResult};

/// 已编译的选择器（逗号分隔的多个分支）
#[derive(Debug, Clone)]
pub struct Selector {
    source: String,
    alternatives: Vec<ComplexSelector>,
}

#[derive(Debug, Clone, Default)]
struct ComplexSelector {
    /// 由左到右；每一项的组合符描述它与前一项的关系
    parts: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    /// 第一项
    Start,
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
    universal: bool,
}

impl Compound {
    fn is_empty(&self) -> bool {
        !self.universal
            && self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
    }
}

#[derive(Debug, Clone)]
struct AttrSelector {
    name: String,
    op: Option<(AttrOp, String)>,
    case_insensitive: bool,
}

#[derive(Debug, Clone, Copy)]
enum AttrOp {
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

impl Selector {
    /// 编译选择器
    pub fn parse(source: &str) -> TranslationResult<Self> {
        let mut input = ParserInput::new(source);
        let mut parser = Parser::new(&mut input);
        let alternatives = parse_selector_list(&mut parser)
            .map_err(|reason| MoxieError::Selector(format!("'{}': {}", source, reason)))?;
        Ok(Self {
            source: source.to_string(),
            alternatives,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 节点自身是否匹配
    pub fn matches(&self, node: &Handle) -> bool {
        is_element(node)
            && self
                .alternatives
                .iter()
                .any(|complex| match_complex(complex, complex.parts.len() - 1, node))
    }

    /// 节点自身或任一祖先是否匹配
    pub fn matches_self_or_ancestor(&self, node: &Handle) -> bool {
        let mut current = Some(node.clone());
        while let Some(n) = current {
            if self.matches(&n) {
                return true;
            }
            current = get_parent_node(&n);
        }
        false
    }
}

fn parse_selector_list(parser: &mut Parser) -> Result<Vec<ComplexSelector>, String> {
    let mut alternatives = Vec::new();
    let mut complex = ComplexSelector::default();
    let mut compound = Compound::default();
    let mut pending = Combinator::Start;

    fn flush(
        complex: &mut ComplexSelector,
        compound: &mut Compound,
        pending: &mut Combinator,
    ) -> Result<(), String> {
        if compound.is_empty() {
            return Err("组合符两侧缺少选择器".to_string());
        }
        let combinator = if complex.parts.is_empty() {
            Combinator::Start
        } else {
            *pending
        };
        complex.parts.push((combinator, std::mem::take(compound)));
        *pending = Combinator::Descendant;
        Ok(())
    }

    loop {
        let token = match parser.next_including_whitespace() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };

        match token {
            Token::WhiteSpace(_) => {
                if !compound.is_empty() {
                    flush(&mut complex, &mut compound, &mut pending)?;
                }
            }
            Token::Delim('>') => {
                if !compound.is_empty() {
                    flush(&mut complex, &mut compound, &mut pending)?;
                }
                if complex.parts.is_empty() {
                    return Err("选择器不能以 '>' 开头".to_string());
                }
                pending = Combinator::Child;
            }
            Token::Comma => {
                if !compound.is_empty() {
                    flush(&mut complex, &mut compound, &mut pending)?;
                }
                if complex.parts.is_empty() {
                    return Err("空的选择器分支".to_string());
                }
                alternatives.push(std::mem::take(&mut complex));
                pending = Combinator::Start;
            }
            Token::Ident(name) => {
                if !compound.is_empty() {
                    return Err(format!("类型选择器 '{}' 位置错误", name));
                }
                compound.tag = Some(name.to_ascii_lowercase());
            }
            Token::Delim('*') => {
                if !compound.is_empty() {
                    return Err("通配选择器位置错误".to_string());
                }
                compound.universal = true;
            }
            Token::IDHash(id) => compound.id = Some(id.to_string()),
            Token::Delim('.') => match parser.next_including_whitespace() {
                Ok(Token::Ident(class)) => compound.classes.push(class.to_string()),
                _ => return Err("'.' 之后缺少类名".to_string()),
            },
            Token::SquareBracketBlock => {
                let attr: Result<AttrSelector, ParseError<'_, ()>> =
                    parser.parse_nested_block(|p| parse_attr_selector(p));
                compound
                    .attrs
                    .push(attr.map_err(|_| "属性选择器语法错误".to_string())?);
            }
            Token::Colon => return Err("不支持伪类或伪元素".to_string()),
            other => return Err(format!("无法识别的记号 {:?}", other)),
        }
    }

    if !compound.is_empty() {
        flush(&mut complex, &mut compound, &mut pending)?;
    }
    if complex.parts.is_empty() {
        return Err("空的选择器".to_string());
    }
    alternatives.push(complex);
    Ok(alternatives)
}

fn parse_attr_selector<'i>(p: &mut Parser<'i, '_>) -> Result<AttrSelector, ParseError<'i, ()>> {
    let name = p.expect_ident()?.to_ascii_lowercase();
    if p.is_exhausted() {
        return Ok(AttrSelector {
            name,
            op: None,
            case_insensitive: false,
        });
    }

    let op = match p.next()?.clone() {
        Token::Delim('=') => AttrOp::Equals,
        Token::IncludeMatch => AttrOp::Includes,
        Token::DashMatch => AttrOp::DashMatch,
        Token::PrefixMatch => AttrOp::Prefix,
        Token::SuffixMatch => AttrOp::Suffix,
        Token::SubstringMatch => AttrOp::Substring,
        other => return Err(p.new_unexpected_token_error(other)),
    };
    let value = p.expect_ident_or_string()?.to_string();
    let case_insensitive = match p.try_parse(|p| p.expect_ident().map(|i| i.to_string())) {
        Ok(flag) => flag.eq_ignore_ascii_case("i"),
        Err(_) => false,
    };

    Ok(AttrSelector {
        name,
        op: Some((op, value)),
        case_insensitive,
    })
}

fn match_complex(complex: &ComplexSelector, index: usize, node: &Handle) -> bool {
    let (combinator, compound) = &complex.parts[index];
    if !match_compound(compound, node) {
        return false;
    }
    if index == 0 {
        return true;
    }

    match combinator {
        Combinator::Child => get_parent_node(node)
            .filter(is_element)
            .map(|parent| match_complex(complex, index - 1, &parent))
            .unwrap_or(false),
        _ => {
            let mut current = get_parent_node(node);
            while let Some(ancestor) = current {
                if is_element(&ancestor) && match_complex(complex, index - 1, &ancestor) {
                    return true;
                }
                current = get_parent_node(&ancestor);
            }
            false
        }
    }
}

fn match_compound(compound: &Compound, node: &Handle) -> bool {
    let Some(name) = get_node_name(node) else {
        return false;
    };
    if let Some(tag) = &compound.tag {
        if !tag.eq_ignore_ascii_case(name) {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if get_node_attr(node, "id").as_deref() != Some(id.as_str()) {
            return false;
        }
    }
    if !compound.classes.is_empty() {
        let classes = get_class_list(node);
        if !compound.classes.iter().all(|c| classes.contains(c)) {
            return false;
        }
    }
    compound.attrs.iter().all(|attr| match_attr(attr, node))
}

fn match_attr(attr: &AttrSelector, node: &Handle) -> bool {
    let Some(actual) = get_node_attr(node, &attr.name) else {
        return false;
    };
    let Some((op, expected)) = &attr.op else {
        return true;
    };
    let (actual, expected) = if attr.case_insensitive {
        (actual.to_lowercase(), expected.to_lowercase())
    } else {
        (actual, expected.clone())
    };

    match op {
        AttrOp::Equals => actual == expected,
        AttrOp::Includes => actual.split_ascii_whitespace().any(|w| w == expected),
        AttrOp::DashMatch => actual == expected || actual.starts_with(&format!("{}-", expected)),
        AttrOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
        AttrOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
        AttrOp::Substring => !expected.is_empty() && actual.contains(&expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{get_child_node_by_name, Dom};

    fn fixture() -> Dom {
        Dom::parse(
            "<html><body><div id=\"main\" class=\"content wide\"><ul><li data-kind=\"promo-x\"><a href=\"/x\">x</a></li></ul></div></body></html>",
        )
        .unwrap()
    }

    fn anchor(dom: &Dom) -> Handle {
        let div = get_child_node_by_name(&dom.body().unwrap(), "div").unwrap();
        let ul = get_child_node_by_name(&div, "ul").unwrap();
        let li = get_child_node_by_name(&ul, "li").unwrap();
        get_child_node_by_name(&li, "a").unwrap()
    }

    #[test]
    fn test_descendant_and_child_combinators() {
        let dom = fixture();
        let a = anchor(&dom);

        assert!(Selector::parse("#main a").unwrap().matches(&a));
        assert!(Selector::parse("div.content > ul > li > a").unwrap().matches(&a));
        assert!(!Selector::parse("div > a").unwrap().matches(&a));
        assert!(Selector::parse("span, li a[href^=\"/\"]").unwrap().matches(&a));
    }

    #[test]
    fn test_attribute_operators() {
        let dom = fixture();
        let li = get_parent_node(&anchor(&dom)).unwrap();

        assert!(Selector::parse("[data-kind|=promo]").unwrap().matches(&li));
        assert!(Selector::parse("[data-kind$=\"-x\"]").unwrap().matches(&li));
        assert!(Selector::parse("[data-kind*=OMO i]").unwrap().matches(&li));
        assert!(!Selector::parse("[data-kind=promo]").unwrap().matches(&li));
    }

    #[test]
    fn test_ancestor_match() {
        let dom = fixture();
        let a = anchor(&dom);
        let selector = Selector::parse(".wide").unwrap();
        assert!(!selector.matches(&a));
        assert!(selector.matches_self_or_ancestor(&a));
    }

    #[test]
    fn test_malformed_selectors_are_errors() {
        assert!(Selector::parse("a:hover").is_err());
        assert!(Selector::parse("> a").is_err());
        assert!(Selector::parse("a,,b").is_err());
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse(".").is_err());
    }
}
