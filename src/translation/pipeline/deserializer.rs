//! JLIFF 到 DOM 的反序列化
//!
//! 按译文 JLIFF 重建块根下的子树。先完整校验译文结构并解析出所有需要的节点，
//! 任何一步失败都直接返回错误，此时 DOM 没有被改动；校验通过后才开始写入。
//! 重建时优先复用原有的文本节点。

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use markup5ever_rcdom::Handle;

use crate::parsers::css::{PseudoKind, PSEUDO_STYLE_ELEMENT_ID};
use crate::parsers::html::dom::{
    append_child, create_text_node, is_text, set_node_attr, set_text_value, take_children,
    text_value, Dom, NodeKey,
};
use crate::translation::error::{MoxieError, TranslationResult};
use crate::translation::jliff::{
    placeholder_key, start_key, validate_brackets, BlockRoot, DomObject, DomObjectMap, JliffItem,
    SerializedBlock,
};
use crate::translation::storage::{AppliedValues, PseudoTable};

/// 写入结果：写回的纯文本，用于登记已见译文
#[derive(Debug, Default)]
pub struct AppliedText {
    pub texts: Vec<String>,
}

/// 把源 JLIFF 拼接成纯文本（记号取原文）
pub fn render_source(items: &[JliffItem]) -> String {
    let mut out = String::new();
    for item in items {
        match item {
            JliffItem::Text { text } => out.push_str(text),
            JliffItem::Placeholder {
                equivalent_text: Some(equiv),
                ..
            } => out.push_str(equiv),
            _ => {}
        }
    }
    out
}

/// 反序列化器
pub struct Deserializer<'a> {
    dom: &'a Dom,
    applied: &'a mut AppliedValues,
    pseudo: &'a mut PseudoTable,
}

impl<'a> Deserializer<'a> {
    pub fn new(dom: &'a Dom, applied: &'a mut AppliedValues, pseudo: &'a mut PseudoTable) -> Self {
        Self {
            dom,
            applied,
            pseudo,
        }
    }

    /// 把译文写回块根
    pub fn apply(&mut self, block: &SerializedBlock, target: &[JliffItem]) -> TranslationResult<AppliedText> {
        match &block.root {
            BlockRoot::Node(weak) => {
                let root = weak
                    .upgrade()
                    .ok_or_else(|| MoxieError::Structure("块根节点已被释放".to_string()))?;
                self.apply_structure(&root, &block.objects, target)
            }
            BlockRoot::Text(weak) => {
                let node = weak
                    .upgrade()
                    .ok_or_else(|| MoxieError::Structure("文本节点已被释放".to_string()))?;
                let value = flatten(&block.objects, target)?;
                set_text_value(&node, &value);
                self.applied.record_text(&node, &value);
                Ok(AppliedText { texts: vec![value] })
            }
            BlockRoot::Attribute { element, name } => {
                let element = element
                    .upgrade()
                    .ok_or_else(|| MoxieError::Structure(format!("属性 {} 所在元素已被释放", name)))?;
                let value = flatten(&block.objects, target)?;
                set_node_attr(&element, name, Some(value.clone()));
                self.applied.record_attr(&element, name, &value);
                Ok(AppliedText { texts: vec![value] })
            }
            BlockRoot::Pseudo { element, kind } => {
                let element = element
                    .upgrade()
                    .ok_or_else(|| MoxieError::Structure("伪元素所在元素已被释放".to_string()))?;
                let value = flatten(&block.objects, target)?;
                self.apply_pseudo(&element, *kind, &render_source(&block.block.source), &value);
                Ok(AppliedText { texts: vec![value] })
            }
        }
    }

    fn apply_pseudo(&mut self, element: &Handle, kind: PseudoKind, source: &str, value: &str) {
        let id = self.pseudo.assign(element);
        self.pseudo.set(id, kind, value);
        if let Some(style) = self.dom.ensure_style_element(PSEUDO_STYLE_ELEMENT_ID) {
            self.dom.set_style_text(&style, &self.pseudo.stylesheet());
        }
        self.applied.record_pseudo(element, kind, source);
    }

    fn apply_structure(
        &mut self,
        root: &Handle,
        objects: &DomObjectMap,
        target: &[JliffItem],
    ) -> TranslationResult<AppliedText> {
        let resolved = resolve(objects, target)?;

        // 占位符引用的节点不进入复用池
        let placeholder_nodes: Vec<NodeKey> = resolved
            .values()
            .map(NodeKey::of)
            .collect();
        let mut pools: HashMap<NodeKey, VecDeque<Handle>> = HashMap::new();
        harvest(root, &placeholder_nodes, &mut pools);
        for item in target {
            if let JliffItem::StartCode { id } = item {
                if let Some(element) = resolved.get(&start_key(id)) {
                    harvest(element, &placeholder_nodes, &mut pools);
                }
            }
        }

        take_children(root);

        let mut stack: Vec<Handle> = vec![root.clone()];
        let mut last_text: Option<Handle> = None;
        let mut written: Vec<Handle> = Vec::new();

        for item in target {
            let parent = stack.last().cloned().unwrap_or_else(|| root.clone());
            match item {
                JliffItem::Text { text } => {
                    push_text(&parent, text, &mut last_text, &mut pools, &mut written);
                }
                JliffItem::StartCode { id } => {
                    if let Some(element) = resolved.get(&start_key(id)) {
                        take_children(element);
                        append_child(&parent, element);
                        stack.push(element.clone());
                    }
                    last_text = None;
                }
                JliffItem::EndCode { .. } => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                    last_text = None;
                }
                JliffItem::Placeholder { id, .. } => {
                    let key = placeholder_key(id);
                    if let Some(node) = resolved.get(&key) {
                        append_child(&parent, node);
                        last_text = None;
                    } else if let Some(DomObject::Literal(value)) = objects.get(&key) {
                        push_text(&parent, value, &mut last_text, &mut pools, &mut written);
                    }
                }
            }
        }

        let mut texts = Vec::with_capacity(written.len());
        for node in written {
            if let Some(value) = text_value(&node) {
                self.applied.record_text(&node, &value);
                texts.push(value);
            }
        }
        Ok(AppliedText { texts })
    }
}

/// 校验译文并解析所有需要放回的节点
fn resolve(objects: &DomObjectMap, target: &[JliffItem]) -> TranslationResult<HashMap<String, Handle>> {
    validate_brackets(target)?;

    let mut used: HashMap<String, usize> = HashMap::new();
    let mut resolved: HashMap<String, Handle> = HashMap::new();

    for item in target {
        let key = match item {
            JliffItem::StartCode { id } => start_key(id),
            JliffItem::Placeholder { id, .. } => placeholder_key(id),
            _ => continue,
        };
        let object = objects.get(&key).ok_or_else(|| {
            tracing::error!("译文引用了不存在的对象键 {}", key);
            MoxieError::Structure(format!("缺少对象键 {}", key))
        })?;
        match object {
            DomObject::Element(weak) | DomObject::Node(weak) => {
                let node = weak
                    .upgrade()
                    .ok_or_else(|| MoxieError::Structure(format!("对象 {} 对应的节点已被释放", key)))?;
                *used.entry(key.clone()).or_default() += 1;
                resolved.insert(key, node);
            }
            DomObject::Literal(_) => {
                if key.starts_with("sc:") {
                    return Err(MoxieError::Structure(format!("起始码 {} 指向字面值", key)));
                }
            }
        }
    }

    // 每个结构性对象必须恰好出现一次；空白占位符同样指向原节点，被丢弃或合并时整块保留原文
    for (key, object) in objects {
        if matches!(object, DomObject::Literal(_)) {
            continue;
        }
        match used.get(key) {
            Some(1) => {}
            Some(n) => {
                return Err(MoxieError::Structure(format!("对象 {} 在译文中出现 {} 次", key, n)));
            }
            None => {
                return Err(MoxieError::Structure(format!("译文缺少对象 {}", key)));
            }
        }
    }

    Ok(resolved)
}

/// 字符串目标（文本节点、属性、伪元素）的译文拼接
fn flatten(objects: &DomObjectMap, target: &[JliffItem]) -> TranslationResult<String> {
    let mut out = String::new();
    for item in target {
        match item {
            JliffItem::Text { text } => out.push_str(text),
            JliffItem::Placeholder { id, .. } => {
                let key = placeholder_key(id);
                match objects.get(&key) {
                    Some(DomObject::Literal(value)) => out.push_str(value),
                    Some(_) => {}
                    None => {
                        tracing::error!("译文引用了不存在的对象键 {}", key);
                        return Err(MoxieError::Structure(format!("缺少对象键 {}", key)));
                    }
                }
            }
            JliffItem::StartCode { .. } | JliffItem::EndCode { .. } => {}
        }
    }
    Ok(out)
}

fn harvest(element: &Handle, placeholder_nodes: &[NodeKey], pools: &mut HashMap<NodeKey, VecDeque<Handle>>) {
    let pool: VecDeque<Handle> = element
        .children
        .borrow()
        .iter()
        .filter(|child| is_text(child) && !placeholder_nodes.contains(&NodeKey::of(child)))
        .cloned()
        .collect();
    pools.insert(NodeKey::of(element), pool);
}

fn push_text(
    parent: &Handle,
    value: &str,
    last_text: &mut Option<Handle>,
    pools: &mut HashMap<NodeKey, VecDeque<Handle>>,
    written: &mut Vec<Handle>,
) {
    if value.is_empty() {
        return;
    }
    if let Some(node) = last_text {
        let mut current = text_value(node).unwrap_or_default();
        current.push_str(value);
        set_text_value(node, &current);
        return;
    }

    let node = pools
        .get_mut(&NodeKey::of(parent))
        .and_then(VecDeque::pop_front)
        .unwrap_or_else(|| create_text_node(""));
    set_text_value(&node, value);
    append_child(parent, &node);
    if !written.iter().any(|w| Rc::ptr_eq(w, &node)) {
        written.push(node.clone());
    }
    *last_text = Some(node);
}
