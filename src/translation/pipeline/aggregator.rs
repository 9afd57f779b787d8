//! 块聚合
//!
//! 变更发生后，找出需要重新翻译的最近块根：从节点自身开始向上，
//! 第一个在其余后代中含有块级元素的祖先，或直接位于 shadow root 下的节点。
//! shadow 宿主与 slot 分配边界视为终点，不会穿越。

use markup5ever_rcdom::{Handle, NodeData};

use crate::parsers::html::dom::{get_parent_node, is_element, Dom};
use crate::translation::jliff::Stacks;
use crate::translation::pipeline::classifier::Classifier;

/// 最近的块根
pub fn nearest_block(dom: &Dom, classifier: &Classifier<'_>, node: &Handle) -> Handle {
    let mut current = node.clone();
    loop {
        if is_element(&current) && contains_block_descendant(dom, classifier, &current) {
            return current;
        }

        let Some(parent) = get_parent_node(&current) else {
            return current;
        };
        if dom.is_shadow_root(&parent) {
            return current;
        }
        if matches!(parent.data, NodeData::Document) {
            return current;
        }
        if dom.shadow_root(&parent).is_some() {
            // 分配到 slot 的 light DOM 节点
            return current;
        }
        current = parent;
    }
}

fn contains_block_descendant(dom: &Dom, classifier: &Classifier<'_>, element: &Handle) -> bool {
    let stacks = classifier.context_for(dom, element).stacks;
    element
        .children
        .borrow()
        .iter()
        .filter(|child| is_element(child))
        .any(|child| subtree_has_block(classifier, child, &stacks))
}

fn subtree_has_block(classifier: &Classifier<'_>, element: &Handle, parent_stacks: &Stacks) -> bool {
    let stacks = parent_stacks.child(element);
    if classifier.is_block(element, &stacks) {
        return true;
    }
    element
        .children
        .borrow()
        .iter()
        .filter(|child| is_element(child))
        .any(|child| subtree_has_block(classifier, child, &stacks))
}
