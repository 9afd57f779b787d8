//! 实时DOM适配层
//!
//! 基于 `markup5ever_rcdom` 的节点句柄提供遍历、修改和连接性判断，
//! 并补充 rcdom 本身没有的平台能力：shadow root、slot 分配以及 iframe 内容文档。

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::create_element as create_sink_element;
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, WeakHandle};

use crate::translation::error::{MoxieError, TranslationResult};

/// 节点身份键（按引用比较）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(usize);

impl NodeKey {
    pub fn of(node: &Handle) -> Self {
        NodeKey(Rc::as_ptr(node) as usize)
    }
}

/// iframe 的内容文档
pub enum FrameContent {
    /// 同源文档，可以遍历
    SameOrigin(RcDom),
    /// 跨源文档，访问会触发安全异常
    CrossOrigin,
}

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> TranslationResult<RcDom> {
    let s: String = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => encoding.decode(data).0.into_owned(),
        None => String::from_utf8_lossy(data).into_owned(),
    };

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut s.as_bytes())
        .map_err(|e| MoxieError::Parse(format!("HTML解析失败: {}", e)))
}

/// 根据名称获取子节点
pub fn get_child_node_by_name(parent: &Handle, node_name: &str) -> Option<Handle> {
    let children = parent.children.borrow();
    let matching_children = children.iter().find(|child| match child.data {
        NodeData::Element { ref name, .. } => &*name.local == node_name,
        _ => false,
    });
    matching_children.cloned()
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 获取节点名称（小写标签名）
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 获取父节点
///
/// rcdom 把父指针存放在 `Cell` 中，读取时必须放回原值。
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    child.parent.set(weak);
    parent
}

/// 设置节点属性，`None` 表示移除该属性
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();
        let mut i = 0;
        let mut found_existing_attr: bool = false;

        while i < attrs_mut.len() {
            if &attrs_mut[i].name.local == attr_name {
                found_existing_attr = true;

                if let Some(attr_value) = attr_value.as_deref() {
                    attrs_mut[i].value.clear();
                    attrs_mut[i].value.push_slice(attr_value);
                } else {
                    attrs_mut.remove(i);
                    continue;
                }
            }

            i += 1;
        }

        if !found_existing_attr {
            if let Some(attr_value) = attr_value {
                attrs_mut.push(Attribute {
                    name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                    value: StrTendril::from_slice(&attr_value),
                });
            }
        }
    };
}

/// 元素的 class 列表
pub fn get_class_list(node: &Handle) -> Vec<String> {
    get_node_attr(node, "class")
        .map(|c| c.split_ascii_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

pub fn has_class(node: &Handle, class_name: &str) -> bool {
    get_class_list(node).iter().any(|c| c == class_name)
}

/// 添加 class，已存在时返回 false
pub fn add_class(node: &Handle, class_name: &str) -> bool {
    let mut classes = get_class_list(node);
    if classes.iter().any(|c| c == class_name) {
        return false;
    }
    classes.push(class_name.to_string());
    set_node_attr(node, "class", Some(classes.join(" ")));
    true
}

pub fn remove_class(node: &Handle, class_name: &str) {
    let classes: Vec<String> = get_class_list(node)
        .into_iter()
        .filter(|c| c != class_name)
        .collect();
    let value = (!classes.is_empty()).then(|| classes.join(" "));
    set_node_attr(node, "class", value);
}

pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

pub fn is_text(node: &Handle) -> bool {
    matches!(node.data, NodeData::Text { .. })
}

/// 文本节点的当前值
pub fn text_value(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// 改写文本节点的值，返回是否为文本节点
pub fn set_text_value(node: &Handle, value: &str) -> bool {
    match &node.data {
        NodeData::Text { contents } => {
            let mut contents = contents.borrow_mut();
            contents.clear();
            contents.push_slice(value);
            true
        }
        _ => false,
    }
}

/// 子树的文本内容（与 `textContent` 相同）
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    match &node.data {
        NodeData::Text { contents } => out.push_str(&contents.borrow()),
        _ => {
            for child in node.children.borrow().iter() {
                collect_text(child, out);
            }
        }
    }
}

pub fn create_text_node(value: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(value)),
    })
}

/// 创建 HTML 命名空间下的元素
pub fn create_element(dom: &RcDom, tag: &str, attrs: &[(&str, &str)]) -> Handle {
    let attrs = attrs
        .iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(*name)),
            value: StrTendril::from_slice(value),
        })
        .collect();
    create_sink_element(dom, QualName::new(None, ns!(html), LocalName::from(tag)), attrs)
}

/// 创建 shadow root 使用的文档片段节点
pub fn create_fragment() -> Handle {
    Node::new(NodeData::Document)
}

/// 从原父节点摘下
pub fn detach(node: &Handle) {
    if let Some(parent) = get_parent_node(node) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
    node.parent.set(None);
}

/// 追加子节点（会先从旧位置摘下）
pub fn append_child(parent: &Handle, child: &Handle) {
    detach(child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child.clone());
}

/// 在 `reference` 之前插入
pub fn insert_before(parent: &Handle, child: &Handle, reference: &Handle) {
    detach(child);
    child.parent.set(Some(Rc::downgrade(parent)));
    let mut children = parent.children.borrow_mut();
    let index = children
        .iter()
        .position(|c| Rc::ptr_eq(c, reference))
        .unwrap_or(children.len());
    children.insert(index, child.clone());
}

/// 摘下全部子节点并返回它们
pub fn take_children(parent: &Handle) -> Vec<Handle> {
    let children: Vec<Handle> = parent.children.borrow_mut().drain(..).collect();
    for child in &children {
        child.parent.set(None);
    }
    children
}

pub fn downgrade(node: &Handle) -> WeakHandle {
    Rc::downgrade(node)
}

/// 判断 `ancestor` 是否为 `node` 自身或其祖先（不跨越 shadow 边界）
pub fn is_inclusive_ancestor(ancestor: &Handle, node: &Handle) -> bool {
    let mut current = Some(node.clone());
    while let Some(n) = current {
        if Rc::ptr_eq(&n, ancestor) {
            return true;
        }
        current = get_parent_node(&n);
    }
    false
}

/// 实时文档：rcdom 树加上 shadow root 与 frame 侧表
pub struct Dom {
    pub rcdom: RcDom,
    shadow_roots: HashMap<NodeKey, Handle>,
    shadow_hosts: HashMap<NodeKey, WeakHandle>,
    frames: HashMap<NodeKey, FrameContent>,
    frame_owners: HashMap<NodeKey, WeakHandle>,
}

impl Dom {
    pub fn new(rcdom: RcDom) -> Self {
        Self {
            rcdom,
            shadow_roots: HashMap::new(),
            shadow_hosts: HashMap::new(),
            frames: HashMap::new(),
            frame_owners: HashMap::new(),
        }
    }

    pub fn parse(html: &str) -> TranslationResult<Self> {
        Ok(Self::new(html_to_dom(html.as_bytes(), "utf-8")?))
    }

    pub fn document(&self) -> Handle {
        self.rcdom.document.clone()
    }

    /// `<html>` 元素
    pub fn document_element(&self) -> Option<Handle> {
        get_child_node_by_name(&self.rcdom.document, "html")
    }

    pub fn head(&self) -> Option<Handle> {
        self.document_element()
            .and_then(|html| get_child_node_by_name(&html, "head"))
    }

    pub fn body(&self) -> Option<Handle> {
        self.document_element()
            .and_then(|html| get_child_node_by_name(&html, "body"))
    }

    /// 为宿主元素附加 shadow root，返回片段节点
    pub fn attach_shadow(&mut self, host: &Handle) -> Handle {
        let key = NodeKey::of(host);
        if let Some(existing) = self.shadow_roots.get(&key) {
            return existing.clone();
        }
        let root = create_fragment();
        self.shadow_hosts.insert(NodeKey::of(&root), downgrade(host));
        self.shadow_roots.insert(key, root.clone());
        root
    }

    pub fn shadow_root(&self, host: &Handle) -> Option<Handle> {
        self.shadow_roots.get(&NodeKey::of(host)).cloned()
    }

    /// 若节点是 shadow root，返回其宿主
    pub fn shadow_host(&self, fragment: &Handle) -> Option<Handle> {
        self.shadow_hosts
            .get(&NodeKey::of(fragment))
            .and_then(|w| w.upgrade())
    }

    pub fn is_shadow_root(&self, node: &Handle) -> bool {
        self.shadow_hosts.contains_key(&NodeKey::of(node))
    }

    /// 设置 iframe 的内容文档
    pub fn set_frame_content(&mut self, iframe: &Handle, content: FrameContent) {
        if let FrameContent::SameOrigin(doc) = &content {
            self.frame_owners
                .insert(NodeKey::of(&doc.document), downgrade(iframe));
        }
        self.frames.insert(NodeKey::of(iframe), content);
    }

    /// 读取 iframe 内容文档
    ///
    /// 跨源文档返回 `Err(())`，与浏览器访问 `contentDocument` 时的安全异常对应。
    pub fn frame_document(&self, iframe: &Handle) -> Result<Option<Handle>, ()> {
        match self.frames.get(&NodeKey::of(iframe)) {
            Some(FrameContent::SameOrigin(doc)) => Ok(Some(doc.document.clone())),
            Some(FrameContent::CrossOrigin) => Err(()),
            None => Ok(None),
        }
    }

    /// slot 分配到的 light DOM 节点
    pub fn assigned_nodes(&self, slot: &Handle) -> Vec<Handle> {
        let Some(host) = self.host_of_tree(slot) else {
            return Vec::new();
        };
        let slot_name = get_node_attr(slot, "name").unwrap_or_default();
        let assigned: Vec<Handle> = host
            .children
            .borrow()
            .iter()
            .filter(|child| {
                let assigned = if is_element(child) {
                    get_node_attr(child, "slot").unwrap_or_default()
                } else {
                    String::new()
                };
                assigned == slot_name
            })
            .cloned()
            .collect();
        assigned
    }

    /// 若节点位于 shadow 树中，返回该树的宿主
    pub fn host_of_tree(&self, node: &Handle) -> Option<Handle> {
        let root = self.tree_root(node);
        self.shadow_host(&root)
    }

    /// 不跨越 shadow/frame 边界的树根
    pub fn tree_root(&self, node: &Handle) -> Handle {
        let mut current = node.clone();
        while let Some(parent) = get_parent_node(&current) {
            current = parent;
        }
        current
    }

    /// 节点是否仍连接在主文档上（穿过 shadow 宿主与 iframe 所有者）
    pub fn is_connected(&self, node: &Handle) -> bool {
        let mut current = node.clone();
        loop {
            let root = self.tree_root(&current);
            if Rc::ptr_eq(&root, &self.rcdom.document) {
                return true;
            }
            let key = NodeKey::of(&root);
            let next = self
                .shadow_hosts
                .get(&key)
                .or_else(|| self.frame_owners.get(&key))
                .and_then(|w| w.upgrade());
            match next {
                Some(owner) => current = owner,
                None => return false,
            }
        }
    }

    /// 祖先元素链（由外到内，包含自身），不跨越 shadow 边界
    pub fn element_path(&self, node: &Handle) -> Vec<Handle> {
        let mut path = Vec::new();
        let mut current = Some(node.clone());
        while let Some(n) = current {
            if is_element(&n) {
                path.push(n.clone());
            }
            current = get_parent_node(&n);
        }
        path.reverse();
        path
    }

    /// 穿过 shadow root 与 iframe 文档的父节点
    pub fn composed_parent(&self, node: &Handle) -> Option<Handle> {
        if let Some(parent) = get_parent_node(node) {
            return Some(parent);
        }
        let key = NodeKey::of(node);
        self.shadow_hosts
            .get(&key)
            .or_else(|| self.frame_owners.get(&key))
            .and_then(|w| w.upgrade())
    }

    /// `ancestor` 是否为 `node` 自身或其（跨边界的）祖先
    pub fn is_composed_inclusive_ancestor(&self, ancestor: &Handle, node: &Handle) -> bool {
        let mut current = Some(node.clone());
        while let Some(n) = current {
            if Rc::ptr_eq(&n, ancestor) {
                return true;
            }
            current = self.composed_parent(&n);
        }
        false
    }

    /// 跨边界的祖先元素链（由外到内，包含自身）
    pub fn composed_element_path(&self, node: &Handle) -> Vec<Handle> {
        let mut path = Vec::new();
        let mut current = Some(node.clone());
        while let Some(n) = current {
            if is_element(&n) {
                path.push(n.clone());
            }
            current = self.composed_parent(&n);
        }
        path.reverse();
        path
    }

    /// 主文档节点本身
    pub fn is_main_document(&self, node: &Handle) -> bool {
        Rc::ptr_eq(node, &self.rcdom.document)
    }

    /// 是否为 iframe 的内容文档
    pub fn is_frame_document(&self, node: &Handle) -> bool {
        self.frame_owners.contains_key(&NodeKey::of(node))
    }

    /// 在 `<head>` 中按 id 查找或创建 `<style>` 元素
    pub fn ensure_style_element(&self, id: &str) -> Option<Handle> {
        let head = self.head()?;
        let existing = head
            .children
            .borrow()
            .iter()
            .find(|c| get_node_attr(c, "id").as_deref() == Some(id))
            .cloned();
        if existing.is_some() {
            return existing;
        }
        let style = create_element(&self.rcdom, "style", &[("id", id)]);
        append_child(&head, &style);
        Some(style)
    }

    /// 直接以文本替换 `<style>` 元素的内容
    pub fn set_style_text(&self, style: &Handle, css: &str) {
        take_children(style);
        append_child(style, &create_text_node(css));
    }
}

/// 升级弱引用
pub fn upgrade(weak: &Weak<Node>) -> Option<Handle> {
    weak.upgrade()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_lookup_keeps_parent_pointer() {
        let dom = Dom::parse("<html><body><p>Hi</p></body></html>").unwrap();
        let body = dom.body().unwrap();
        let p = get_child_node_by_name(&body, "p").unwrap();

        assert!(get_parent_node(&p).is_some());
        assert!(get_parent_node(&p).is_some(), "second lookup must still see the parent");
    }

    #[test]
    fn test_detached_node_is_not_connected() {
        let dom = Dom::parse("<html><body><p>Hi</p></body></html>").unwrap();
        let body = dom.body().unwrap();
        let p = get_child_node_by_name(&body, "p").unwrap();

        assert!(dom.is_connected(&p));
        detach(&p);
        assert!(!dom.is_connected(&p));
    }

    #[test]
    fn test_shadow_tree_connected_through_host() {
        let mut dom = Dom::parse("<html><body><x-card><span slot=\"title\">T</span>rest</x-card></body></html>").unwrap();
        let body = dom.body().unwrap();
        let host = get_child_node_by_name(&body, "x-card").unwrap();
        let root = dom.attach_shadow(&host);
        let slot = create_element(&dom.rcdom, "slot", &[("name", "title")]);
        append_child(&root, &slot);

        assert!(dom.is_connected(&slot));
        assert!(dom.is_shadow_root(&root));
        let assigned = dom.assigned_nodes(&slot);
        assert_eq!(assigned.len(), 1);
        assert_eq!(get_node_name(&assigned[0]), Some("span"));
    }

    #[test]
    fn test_unnamed_slot_takes_remaining_children() {
        let mut dom = Dom::parse("<html><body><x-card><span slot=\"title\">T</span>rest</x-card></body></html>").unwrap();
        let host = get_child_node_by_name(&dom.body().unwrap(), "x-card").unwrap();
        let root = dom.attach_shadow(&host);
        let slot = create_element(&dom.rcdom, "slot", &[]);
        append_child(&root, &slot);

        let assigned = dom.assigned_nodes(&slot);
        assert_eq!(assigned.len(), 1);
        assert_eq!(text_value(&assigned[0]).as_deref(), Some("rest"));
        assert!(dom.assigned_nodes(&create_element(&dom.rcdom, "slot", &[])).is_empty());
    }

    #[test]
    fn test_set_node_attr_add_update_remove() {
        let dom = Dom::parse("<html><body><img alt=\"a\"></body></html>").unwrap();
        let img = get_child_node_by_name(&dom.body().unwrap(), "img").unwrap();

        set_node_attr(&img, "alt", Some("b".to_string()));
        assert_eq!(get_node_attr(&img, "alt").as_deref(), Some("b"));
        set_node_attr(&img, "title", Some("t".to_string()));
        assert_eq!(get_node_attr(&img, "title").as_deref(), Some("t"));
        set_node_attr(&img, "alt", None);
        assert_eq!(get_node_attr(&img, "alt"), None);
    }
}
