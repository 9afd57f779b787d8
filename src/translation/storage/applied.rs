//! 已写回的值
//!
//! 记录引擎自己写进 DOM 的文本、属性值和伪元素内容，用来识别“已经是译文”的内容，
//! 避免重复翻译。键是节点地址，同时保存弱引用以排除地址被复用的情况。

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use markup5ever_rcdom::{Handle, WeakHandle};

use crate::parsers::css::{format_quoted_string, PseudoKind};
use crate::parsers::html::dom::{downgrade, get_node_attr, set_node_attr, NodeKey};
use crate::translation::config::constants::PSEUDO_MARKER_ATTR;

#[derive(Debug, Clone)]
struct Recorded {
    node: WeakHandle,
    value: String,
}

impl Recorded {
    fn new(node: &Handle, value: &str) -> Self {
        Self {
            node: downgrade(node),
            value: value.to_string(),
        }
    }

    fn matches(&self, node: &Handle, value: &str) -> bool {
        self.value == value
            && self
                .node
                .upgrade()
                .map_or(false, |live| Rc::ptr_eq(&live, node))
    }
}

/// 引擎写入值的登记表
#[derive(Debug, Default)]
pub struct AppliedValues {
    text: HashMap<NodeKey, Recorded>,
    attrs: HashMap<(NodeKey, String), Recorded>,
    /// 伪元素登记的是原文，伪元素内容本身无法从 DOM 读回
    pseudo: HashMap<(NodeKey, PseudoKind), Recorded>,
}

impl AppliedValues {
    pub fn record_text(&mut self, node: &Handle, value: &str) {
        self.text.insert(NodeKey::of(node), Recorded::new(node, value));
    }

    pub fn text_matches(&self, node: &Handle, value: &str) -> bool {
        self.text
            .get(&NodeKey::of(node))
            .map_or(false, |r| r.matches(node, value))
    }

    pub fn record_attr(&mut self, element: &Handle, name: &str, value: &str) {
        self.attrs
            .insert((NodeKey::of(element), name.to_string()), Recorded::new(element, value));
    }

    pub fn attr_matches(&self, element: &Handle, name: &str, value: &str) -> bool {
        self.attrs
            .get(&(NodeKey::of(element), name.to_string()))
            .map_or(false, |r| r.matches(element, value))
    }

    pub fn record_pseudo(&mut self, element: &Handle, kind: PseudoKind, source: &str) {
        self.pseudo
            .insert((NodeKey::of(element), kind), Recorded::new(element, source));
    }

    /// 伪元素内容是否已按同一原文翻译过
    pub fn pseudo_matches(&self, element: &Handle, kind: PseudoKind, source: &str) -> bool {
        self.pseudo
            .get(&(NodeKey::of(element), kind))
            .map_or(false, |r| r.matches(element, source))
    }

    /// 丢弃已被释放的节点
    pub fn prune(&mut self) {
        self.text.retain(|_, r| r.node.strong_count() > 0);
        self.attrs.retain(|_, r| r.node.strong_count() > 0);
        self.pseudo.retain(|_, r| r.node.strong_count() > 0);
    }

    pub fn len(&self) -> usize {
        self.text.len() + self.attrs.len() + self.pseudo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.attrs.clear();
        self.pseudo.clear();
    }
}

/// 伪元素译文表
///
/// 元素通过 `data-moxie-pseudo="N"` 标记，译文以生成的样式规则覆盖 `content`。
#[derive(Debug, Default)]
pub struct PseudoTable {
    next_id: u32,
    rules: BTreeMap<(u32, PseudoKind), String>,
}

impl PseudoTable {
    /// 取得元素的标记编号，没有时分配并写入属性
    pub fn assign(&mut self, element: &Handle) -> u32 {
        if let Some(id) = get_node_attr(element, PSEUDO_MARKER_ATTR).and_then(|v| v.parse().ok()) {
            if id < self.next_id {
                return id;
            }
        }
        let id = self.next_id;
        self.next_id += 1;
        set_node_attr(element, PSEUDO_MARKER_ATTR, Some(id.to_string()));
        id
    }

    pub fn set(&mut self, id: u32, kind: PseudoKind, content: &str) {
        self.rules.insert((id, kind), content.to_string());
    }

    pub fn get(&self, id: u32, kind: PseudoKind) -> Option<&str> {
        self.rules.get(&(id, kind)).map(String::as_str)
    }

    /// 生成完整的样式表文本
    pub fn stylesheet(&self) -> String {
        self.rules
            .iter()
            .map(|((id, kind), content)| {
                format!(
                    "[{}=\"{}\"]{}{{content:{} !important}}",
                    PSEUDO_MARKER_ATTR,
                    id,
                    kind.as_css(),
                    format_quoted_string(content)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn clear(&mut self) {
        self.next_id = 0;
        self.rules.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{create_text_node, get_child_node_by_name, Dom};

    #[test]
    fn test_text_match_requires_same_node_and_value() {
        let mut applied = AppliedValues::default();
        let a = create_text_node("Bonjour");
        let b = create_text_node("Bonjour");
        applied.record_text(&a, "Bonjour");

        assert!(applied.text_matches(&a, "Bonjour"));
        assert!(!applied.text_matches(&a, "Hello"));
        assert!(!applied.text_matches(&b, "Bonjour"));
    }

    #[test]
    fn test_prune_drops_released_nodes() {
        let mut applied = AppliedValues::default();
        {
            let node = create_text_node("x");
            applied.record_text(&node, "x");
        }
        applied.prune();
        assert!(applied.is_empty());
    }

    #[test]
    fn test_pseudo_stylesheet() {
        let dom = Dom::parse("<html><body><div class=\"badge\"></div></body></html>").unwrap();
        let div = get_child_node_by_name(&dom.body().unwrap(), "div").unwrap();
        let mut table = PseudoTable::default();

        let id = table.assign(&div);
        assert_eq!(table.assign(&div), id);
        assert_eq!(get_node_attr(&div, PSEUDO_MARKER_ATTR).as_deref(), Some("0"));

        table.set(id, PseudoKind::Before, "Nouveau");
        assert_eq!(
            table.stylesheet(),
            "[data-moxie-pseudo=\"0\"]::before{content:\"Nouveau\" !important}"
        );
    }
}
