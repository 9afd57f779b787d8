//! 块收集器
//!
//! 从一组起始根出发，按文档顺序反复序列化块根，直到没有新的嵌套块。

use std::collections::HashSet;

use markup5ever_rcdom::Handle;

use crate::parsers::html::dom::{Dom, NodeKey};
use crate::translation::jliff::SerializedBlock;
use crate::translation::pipeline::serializer::{PendingRoot, Serializer};

/// 一次遍历的起点
#[derive(Debug, Clone)]
pub enum CollectRoot {
    /// 重新序列化整个子树
    Node(Handle),
    /// 只重新序列化一个属性
    Attribute { element: Handle, name: String },
}

impl CollectRoot {
    pub fn node(&self) -> &Handle {
        match self {
            CollectRoot::Node(node) => node,
            CollectRoot::Attribute { element, .. } => element,
        }
    }
}

/// 块收集器
pub struct BlockCollector<'s, 'a> {
    dom: &'a Dom,
    serializer: &'s Serializer<'a>,
}

impl<'s, 'a> BlockCollector<'s, 'a> {
    pub fn new(dom: &'a Dom, serializer: &'s Serializer<'a>) -> Self {
        Self { dom, serializer }
    }

    /// 收集所有块，顺序与根被发现的顺序一致
    pub fn collect(&self, roots: &[CollectRoot]) -> Vec<SerializedBlock> {
        let roots = self.normalize_roots(roots);
        let mut blocks = Vec::new();
        let mut visited: HashSet<NodeKey> = HashSet::new();

        for root in roots {
            match root {
                CollectRoot::Node(node) => {
                    let mut stack = vec![PendingRoot {
                        parent: self.parent_context(&node),
                        node,
                    }];
                    while let Some(pending) = stack.pop() {
                        if !visited.insert(NodeKey::of(&pending.node)) {
                            continue;
                        }
                        let out = self.serializer.serialize_root(&pending);
                        blocks.extend(out.blocks);
                        stack.extend(out.nested.into_iter().rev());
                    }
                }
                CollectRoot::Attribute { element, name } => {
                    blocks.extend(self.serializer.serialize_attribute(&element, &name));
                }
            }
        }

        tracing::debug!("收集到 {} 个块", blocks.len());
        blocks
    }

    fn parent_context(&self, node: &Handle) -> crate::translation::pipeline::classifier::NodeContext {
        let classifier = self.serializer.classifier();
        match self.dom.composed_parent(node) {
            Some(parent) => classifier.context_for(self.dom, &parent),
            None => classifier.root_context(),
        }
    }

    /// 去掉已断开、重复以及被其他根覆盖的根
    fn normalize_roots(&self, roots: &[CollectRoot]) -> Vec<CollectRoot> {
        let connected: Vec<&CollectRoot> = roots
            .iter()
            .filter(|root| self.dom.is_connected(root.node()))
            .collect();

        let node_roots: Vec<&Handle> = connected
            .iter()
            .filter_map(|root| match root {
                CollectRoot::Node(node) => Some(node),
                CollectRoot::Attribute { .. } => None,
            })
            .collect();

        let mut seen_nodes: HashSet<NodeKey> = HashSet::new();
        let mut seen_attrs: HashSet<(NodeKey, String)> = HashSet::new();
        let mut out = Vec::new();

        for root in connected {
            match root {
                CollectRoot::Node(node) => {
                    let covered = node_roots.iter().any(|other| {
                        !std::rc::Rc::ptr_eq(other, node)
                            && self.dom.is_composed_inclusive_ancestor(other, node)
                    });
                    if !covered && seen_nodes.insert(NodeKey::of(node)) {
                        out.push(root.clone());
                    }
                }
                CollectRoot::Attribute { element, name } => {
                    let covered = node_roots
                        .iter()
                        .any(|other| self.dom.is_composed_inclusive_ancestor(other, element));
                    if !covered && seen_attrs.insert((NodeKey::of(element), name.clone())) {
                        out.push(root.clone());
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::css::StyleResolver;
    use crate::parsers::html::dom::{detach, get_child_node_by_name};
    use crate::translation::config::{MoxieConfig, RuleSet};
    use crate::translation::jliff::BlockRoot;
    use crate::translation::pipeline::classifier::Classifier;
    use crate::translation::pipeline::tokenizer::{IdentityLocalizer, Tokenizer};
    use crate::translation::storage::AppliedValues;

    fn with_collector<R>(dom: &Dom, f: impl FnOnce(&BlockCollector<'_, '_>) -> R) -> R {
        let config = MoxieConfig::default();
        let rules = RuleSet::default().compile("https://example.com/", 64);
        let styles = StyleResolver::from_document(dom);
        let tokenizer = Tokenizer::new(None);
        let seen = HashSet::new();
        let applied = AppliedValues::default();
        let serializer = Serializer::new(
            dom,
            Classifier::new(&config, &rules, &styles),
            &tokenizer,
            &IdentityLocalizer,
            &seen,
            &applied,
        );
        let collector = BlockCollector::new(dom, &serializer);
        f(&collector)
    }

    #[test]
    fn test_document_order_across_nested_blocks() {
        let dom = Dom::parse(
            "<html><body><div>First<p>Second</p><p>Third</p></div><p>Fourth</p></body></html>",
        )
        .unwrap();
        let body = dom.body().unwrap();
        let texts: Vec<String> = with_collector(&dom, |c| {
            c.collect(&[CollectRoot::Node(body.clone())])
                .into_iter()
                .map(|b| match &b.block.source[0] {
                    crate::translation::jliff::JliffItem::Text { text } => text.clone(),
                    _ => String::new(),
                })
                .collect()
        });
        assert_eq!(texts, vec!["First", "Second", "Third", "Fourth"]);
    }

    #[test]
    fn test_covered_and_disconnected_roots_are_dropped() {
        let dom = Dom::parse("<html><body><div><p>One</p></div><section>Gone</section></body></html>").unwrap();
        let body = dom.body().unwrap();
        let div = get_child_node_by_name(&body, "div").unwrap();
        let p = get_child_node_by_name(&div, "p").unwrap();
        let section = get_child_node_by_name(&body, "section").unwrap();
        detach(&section);

        let blocks = with_collector(&dom, |c| {
            c.collect(&[
                CollectRoot::Node(p.clone()),
                CollectRoot::Node(div.clone()),
                CollectRoot::Node(section.clone()),
                CollectRoot::Node(div.clone()),
            ])
        });
        assert_eq!(blocks.len(), 1);
        assert!(matches!(blocks[0].root, BlockRoot::Node(_)));
    }

    #[test]
    fn test_attribute_root() {
        let dom = Dom::parse("<html><body><img title=\"Company logo\"></body></html>").unwrap();
        let img = get_child_node_by_name(&dom.body().unwrap(), "img").unwrap();

        let blocks = with_collector(&dom, |c| {
            c.collect(&[CollectRoot::Attribute {
                element: img.clone(),
                name: "title".to_string(),
            }])
        });
        assert_eq!(blocks.len(), 1);
        assert!(matches!(&blocks[0].root, BlockRoot::Attribute { name, .. } if name == "title"));
    }
}
