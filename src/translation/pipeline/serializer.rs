//! DOM 到 JLIFF 的序列化
//!
//! 一次只序列化一个块根：行内元素变成成对的起始码/结束码，块级元素、shadow 宿主、
//! slot 与 iframe 在当前块中只留下一个边界占位符，并作为新的块根交回给调用方。
//! 属性与伪元素内容各自成为独立的旁路块。

use std::collections::HashSet;

use markup5ever_rcdom::{Handle, NodeData, WeakHandle};

use crate::parsers::css::{PseudoKind, WhiteSpace};
use crate::parsers::html::dom::{
    downgrade, get_node_attr, get_node_name, get_parent_node, text_value, Dom,
};
use crate::translation::hash::block_hash;
use crate::translation::jliff::{
    placeholder_key, start_key, BlockRoot, DomObject, DomObjectMap, JliffItem, SerializedBlock,
    TextBlock,
};
use crate::translation::pipeline::classifier::{Classifier, NodeContext};
use crate::translation::pipeline::tokenizer::{
    is_whitespace_only, normalize_whitespace, Localizer, Segment, TokenizedText, Tokenizer,
};
use crate::translation::storage::AppliedValues;

const ELEMENT_MARKER: &str = "<x></x>";
const OPEN_MARKER: &str = "<x>";
const CLOSE_MARKER: &str = "</x>";
const WHITESPACE_MARKER: &str = " ";
const SEEN_MARKER: &str = "{{tx}}";

/// 已见译文集合使用的键
pub fn seen_key(text: &str) -> String {
    normalize_whitespace(text, WhiteSpace::Normal).trim().to_string()
}

/// 等待序列化的块根
#[derive(Debug, Clone)]
pub struct PendingRoot {
    pub node: Handle,
    /// 父节点传下的上下文；文档和片段根直接使用它作为内容上下文
    pub parent: NodeContext,
}

/// 一个块根的序列化结果
#[derive(Debug, Default)]
pub struct SerializedRoot {
    pub blocks: Vec<SerializedBlock>,
    pub nested: Vec<PendingRoot>,
}

struct BlockBuilder {
    items: Vec<JliffItem>,
    hash_input: String,
    objects: DomObjectMap,
    next_id: u32,
    contains_translatable: bool,
}

impl BlockBuilder {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            hash_input: String::new(),
            objects: DomObjectMap::new(),
            next_id: 1,
            contains_translatable: false,
        }
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn opaque(&mut self, node: &Handle, marker: &str) {
        let id = self.allocate();
        self.items.push(JliffItem::placeholder(id));
        self.objects.insert(placeholder_key(&id.to_string()), DomObject::node(node));
        self.hash_input.push_str(marker);
    }

    fn self_closing(&mut self, element: &Handle) {
        let id = self.allocate();
        self.items.push(JliffItem::placeholder(id));
        self.objects
            .insert(placeholder_key(&id.to_string()), DomObject::element(element));
        self.hash_input.push_str(ELEMENT_MARKER);
    }

    /// 已是译文的文本原样透传
    fn pass_through(&mut self, value: &str) {
        let id = self.allocate();
        self.items.push(JliffItem::Placeholder {
            id: id.to_string(),
            display_kind: None,
            equivalent_text: Some(value.to_string()),
        });
        self.objects.insert(
            placeholder_key(&id.to_string()),
            DomObject::Literal(value.to_string()),
        );
        self.hash_input.push_str(SEEN_MARKER);
    }

    fn start(&mut self, element: &Handle) -> u32 {
        let id = self.allocate();
        self.items.push(JliffItem::start(id));
        self.objects.insert(start_key(&id.to_string()), DomObject::element(element));
        self.hash_input.push_str(OPEN_MARKER);
        id
    }

    fn end(&mut self, id: u32) {
        self.items.push(JliffItem::end(id));
        self.hash_input.push_str(CLOSE_MARKER);
    }

    fn push_tokenized(&mut self, tokenized: TokenizedText) {
        for segment in tokenized.segments {
            match segment {
                Segment::Text(text) => self.items.push(JliffItem::text(text)),
                Segment::Token {
                    kind,
                    source,
                    replacement,
                } => {
                    let id = self.allocate();
                    self.items
                        .push(JliffItem::token(id, kind.display_kind(), &source));
                    self.objects.insert(
                        placeholder_key(&id.to_string()),
                        DomObject::Literal(replacement),
                    );
                }
            }
        }
        self.hash_input.push_str(&tokenized.hash_input);
        self.contains_translatable |= tokenized.contains_translatable;
    }

    /// 没有可翻译文本的块被丢弃
    fn finish(self, root: BlockRoot, context: &NodeContext) -> Option<SerializedBlock> {
        if !self.contains_translatable {
            return None;
        }
        let block = TextBlock {
            block_hash: block_hash(&self.hash_input),
            source: self.items,
            suppress_mt: context.suppress_mt,
            auto_detect: context.auto_detect,
            no_ami: context.no_ami,
            contains_translatable: true,
            stacks: context.stacks.clone(),
        };
        tracing::debug!("序列化块 {} ({} 项)", block.block_hash, block.source.len());
        Some(SerializedBlock {
            block,
            root,
            objects: self.objects,
        })
    }
}

/// 序列化器
pub struct Serializer<'a> {
    dom: &'a Dom,
    classifier: Classifier<'a>,
    tokenizer: &'a Tokenizer,
    localizer: &'a dyn Localizer,
    seen: &'a HashSet<String>,
    applied: &'a AppliedValues,
}

impl<'a> Serializer<'a> {
    pub fn new(
        dom: &'a Dom,
        classifier: Classifier<'a>,
        tokenizer: &'a Tokenizer,
        localizer: &'a dyn Localizer,
        seen: &'a HashSet<String>,
        applied: &'a AppliedValues,
    ) -> Self {
        Self {
            dom,
            classifier,
            tokenizer,
            localizer,
            seen,
            applied,
        }
    }

    pub fn classifier(&self) -> &Classifier<'a> {
        &self.classifier
    }

    /// 序列化一个块根
    pub fn serialize_root(&self, root: &PendingRoot) -> SerializedRoot {
        let mut out = SerializedRoot::default();
        let node = &root.node;

        match &node.data {
            NodeData::Document => {
                let mut builder = BlockBuilder::new();
                self.walk_children(node, &root.parent, &mut builder, &mut out);
                out.blocks
                    .extend(builder.finish(BlockRoot::Node(node_ref(node)), &root.parent));
            }
            NodeData::Text { .. } => {
                out.blocks.extend(self.serialize_text_root(node, &root.parent));
            }
            NodeData::Element { .. } => self.serialize_element_root(node, &root.parent, &mut out),
            _ => {}
        }

        // 主块排在旁路块之前
        if let Some(pos) = out
            .blocks
            .iter()
            .position(|b| matches!(b.root, BlockRoot::Node(_) | BlockRoot::Text(_)))
        {
            let main = out.blocks.remove(pos);
            out.blocks.insert(0, main);
        }
        out
    }

    fn serialize_element_root(&self, element: &Handle, parent: &NodeContext, out: &mut SerializedRoot) {
        let class = self.classifier.classify(element, parent);
        if class.is_non_text || class.is_own_ui {
            return;
        }
        let context = class.context;
        let name = get_node_name(element).unwrap_or_default();

        if context.translate {
            self.side_blocks(element, &context, &mut out.blocks);
        }

        if name == "iframe" {
            if self.classifier.skips_iframe(element, &context.stacks) {
                return;
            }
            match self.dom.frame_document(element) {
                Ok(Some(document)) => out.nested.push(PendingRoot {
                    node: document,
                    parent: context,
                }),
                Ok(None) => {}
                // 跨源文档不可访问，按没有内容处理
                Err(()) => {}
            }
            return;
        }

        if let Some(shadow) = self.dom.shadow_root(element) {
            out.nested.push(PendingRoot {
                node: shadow,
                parent: context,
            });
            return;
        }

        if name == "slot" {
            let assigned = self.dom.assigned_nodes(element);
            if !assigned.is_empty() {
                for node in assigned {
                    let parent = match get_parent_node(&node) {
                        Some(host) => self.classifier.context_for(self.dom, &host),
                        None => context.clone(),
                    };
                    out.nested.push(PendingRoot { node, parent });
                }
                return;
            }
        }

        let mut builder = BlockBuilder::new();
        self.walk_children(element, &context, &mut builder, out);
        out.blocks
            .extend(builder.finish(BlockRoot::Node(node_ref(element)), &context));
    }

    fn serialize_text_root(&self, node: &Handle, context: &NodeContext) -> Option<SerializedBlock> {
        if !context.translate {
            return None;
        }
        let raw = text_value(node)?;
        if is_whitespace_only(&raw) || self.is_translated_text(node, &raw) {
            return None;
        }
        let parent = get_parent_node(node).unwrap_or_else(|| node.clone());
        let mut builder = BlockBuilder::new();
        builder.push_tokenized(self.tokenize_text(node, &parent, &raw, context));
        builder.finish(BlockRoot::Text(node_ref(node)), context)
    }

    fn is_translated_text(&self, node: &Handle, raw: &str) -> bool {
        self.applied.text_matches(node, raw) || self.seen.contains(&seen_key(raw))
    }

    fn tokenize_text(&self, node: &Handle, parent: &Handle, raw: &str, context: &NodeContext) -> TokenizedText {
        let white_space = self.classifier.styles().white_space(node);
        let normalized = normalize_whitespace(raw, white_space);
        let tokenize = self.classifier.tokenize_context(parent, &context.stacks);
        self.tokenizer.tokenize(&normalized, &tokenize, self.localizer)
    }

    fn walk_children(
        &self,
        parent: &Handle,
        context: &NodeContext,
        builder: &mut BlockBuilder,
        out: &mut SerializedRoot,
    ) {
        let children: Vec<Handle> = parent.children.borrow().iter().cloned().collect();
        for child in children {
            match &child.data {
                NodeData::Text { .. } => {
                    let raw = text_value(&child).unwrap_or_default();
                    if !context.translate {
                        builder.opaque(&child, ELEMENT_MARKER);
                    } else if self.is_translated_text(&child, &raw) {
                        builder.pass_through(&raw);
                    } else if is_whitespace_only(&raw) {
                        builder.opaque(&child, WHITESPACE_MARKER);
                    } else {
                        builder.push_tokenized(self.tokenize_text(&child, parent, &raw, context));
                    }
                }
                NodeData::Element { .. } => self.walk_element(&child, context, builder, out),
                NodeData::Comment { .. }
                | NodeData::Doctype { .. }
                | NodeData::ProcessingInstruction { .. } => builder.opaque(&child, ELEMENT_MARKER),
                NodeData::Document => {}
            }
        }
    }

    fn walk_element(
        &self,
        element: &Handle,
        context: &NodeContext,
        builder: &mut BlockBuilder,
        out: &mut SerializedRoot,
    ) {
        let class = self.classifier.classify(element, context);
        if class.is_non_text || class.is_own_ui {
            builder.opaque(element, ELEMENT_MARKER);
            return;
        }

        let name = get_node_name(element).unwrap_or_default();
        let boundary = class.is_block
            || name == "iframe"
            || name == "slot"
            || self.dom.shadow_root(element).is_some();
        if boundary {
            builder.opaque(element, ELEMENT_MARKER);
            out.nested.push(PendingRoot {
                node: element.clone(),
                parent: context.clone(),
            });
            return;
        }

        if class.translate {
            self.side_blocks(element, &class.context, &mut out.blocks);
        }

        if element.children.borrow().is_empty() {
            builder.self_closing(element);
            return;
        }

        let id = builder.start(element);
        self.walk_children(element, &class.context, builder, out);
        builder.end(id);
    }

    /// 元素的属性块与伪元素块
    fn side_blocks(&self, element: &Handle, context: &NodeContext, out: &mut Vec<SerializedBlock>) {
        for name in self.classifier.translatable_attributes(element, context) {
            out.extend(self.serialize_attribute_value(element, &name, context));
        }

        if self.classifier.translates_pseudo(element, context) {
            for kind in [PseudoKind::Before, PseudoKind::After] {
                out.extend(self.serialize_pseudo(element, kind, context));
            }
        }
    }

    /// 单独序列化元素的一个属性（属性变更时使用）
    pub fn serialize_attribute(&self, element: &Handle, name: &str) -> Option<SerializedBlock> {
        let context = self.classifier.context_for(self.dom, element);
        let allowed = self.classifier.translatable_attributes(element, &context);
        if !allowed.iter().any(|a| a == name) {
            return None;
        }
        self.serialize_attribute_value(element, name, &context)
    }

    fn serialize_attribute_value(
        &self,
        element: &Handle,
        name: &str,
        context: &NodeContext,
    ) -> Option<SerializedBlock> {
        let value = get_node_attr(element, name)?;
        if is_whitespace_only(&value)
            || self.applied.attr_matches(element, name, &value)
            || self.seen.contains(&seen_key(&value))
        {
            return None;
        }
        let normalized = seen_key(&value);
        let tokenize = self.classifier.tokenize_context(element, &context.stacks);
        let mut builder = BlockBuilder::new();
        builder.push_tokenized(self.tokenizer.tokenize(&normalized, &tokenize, self.localizer));
        builder.finish(
            BlockRoot::Attribute {
                element: node_ref(element),
                name: name.to_string(),
            },
            context,
        )
    }

    fn serialize_pseudo(&self, element: &Handle, kind: PseudoKind, context: &NodeContext) -> Option<SerializedBlock> {
        let content = self.classifier.styles().pseudo_content(element, kind)?;
        let normalized = seen_key(&content);
        if normalized.is_empty() || self.applied.pseudo_matches(element, kind, &normalized) {
            return None;
        }
        let tokenize = self.classifier.tokenize_context(element, &context.stacks);
        let mut builder = BlockBuilder::new();
        builder.push_tokenized(self.tokenizer.tokenize(&normalized, &tokenize, self.localizer));
        builder.finish(
            BlockRoot::Pseudo {
                element: node_ref(element),
                kind,
            },
            context,
        )
    }
}

fn node_ref(node: &Handle) -> WeakHandle {
    downgrade(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::css::StyleResolver;
    use crate::parsers::html::dom::{get_child_node_by_name, text_content};
    use crate::translation::config::{CompiledRules, MoxieConfig, RuleSet};
    use crate::translation::jliff::{validate_brackets, DisplayKind};
    use crate::translation::pipeline::tokenizer::IdentityLocalizer;

    struct Fixture {
        dom: Dom,
        config: MoxieConfig,
        rules: CompiledRules,
        styles: StyleResolver,
        tokenizer: Tokenizer,
        seen: HashSet<String>,
        applied: AppliedValues,
    }

    impl Fixture {
        fn new(html: &str, rules: &str) -> Self {
            let dom = Dom::parse(html).unwrap();
            let styles = StyleResolver::from_document(&dom);
            Self {
                dom,
                config: MoxieConfig::default(),
                rules: RuleSet::from_json(rules).unwrap().compile("https://example.com/", 64),
                styles,
                tokenizer: Tokenizer::new(None),
                seen: HashSet::new(),
                applied: AppliedValues::default(),
            }
        }

        fn serializer(&self) -> Serializer<'_> {
            Serializer::new(
                &self.dom,
                Classifier::new(&self.config, &self.rules, &self.styles),
                &self.tokenizer,
                &IdentityLocalizer,
                &self.seen,
                &self.applied,
            )
        }

        fn serialize(&self, node: &Handle) -> SerializedRoot {
            let serializer = self.serializer();
            let parent = match get_parent_node(node) {
                Some(p) => serializer.classifier().context_for(&self.dom, &p),
                None => serializer.classifier().root_context(),
            };
            serializer.serialize_root(&PendingRoot {
                node: node.clone(),
                parent,
            })
        }

        fn body_child(&self, name: &str) -> Handle {
            get_child_node_by_name(&self.dom.body().unwrap(), name).unwrap()
        }
    }

    #[test]
    fn test_simple_paragraph() {
        let f = Fixture::new("<html><body><p>Click <a href=\"x\">here</a> for more!</p></body></html>", "{}");
        let out = f.serialize(&f.body_child("p"));

        assert_eq!(out.blocks.len(), 1);
        let block = &out.blocks[0].block;
        assert_eq!(
            block.source,
            vec![
                JliffItem::text("Click "),
                JliffItem::start(1),
                JliffItem::text("here"),
                JliffItem::end(1),
                JliffItem::text(" for more!"),
            ]
        );
        assert_eq!(block.block_hash, block_hash("Click <x>here</x> for more!"));
        assert!(out.blocks[0].objects.contains_key("sc:1"));
    }

    #[test]
    fn test_block_children_become_nested_roots() {
        let f = Fixture::new("<html><body><div>Intro<p>Inner text</p></div></body></html>", "{}");
        let out = f.serialize(&f.body_child("div"));

        assert_eq!(out.nested.len(), 1);
        assert_eq!(get_node_name(&out.nested[0].node), Some("p"));
        assert_eq!(out.blocks[0].block.source[1], JliffItem::placeholder(1));
        assert_eq!(out.blocks[0].block.block_hash, block_hash("Intro<x></x>"));
    }

    #[test]
    fn test_whitespace_only_text_is_a_space_placeholder() {
        let f = Fixture::new("<html><body><p><b>One</b>\n\t  \n<i>Two</i></p></body></html>", "{}");
        let out = f.serialize(&f.body_child("p"));
        let block = &out.blocks[0].block;

        assert_eq!(block.source[3], JliffItem::placeholder(2));
        assert_eq!(block.source[4], JliffItem::start(3));
        assert_eq!(block.block_hash, block_hash("<x>One</x> <x>Two</x>"));
    }

    #[test]
    fn test_numbers_become_token_placeholders() {
        let f = Fixture::new("<html><body><p>Order 42 shipped</p><div>Order 99 shipped</div></body></html>", "{}");
        let first = f.serialize(&f.body_child("p"));
        let second = f.serialize(&f.body_child("div"));

        let block = &first.blocks[0].block;
        assert_eq!(block.source[1], JliffItem::token(1, DisplayKind::Number, "42"));
        assert_eq!(block.block_hash, second.blocks[0].block.block_hash);
        assert!(matches!(first.blocks[0].objects.get("ph:1"), Some(DomObject::Literal(v)) if v == "42"));
    }

    #[test]
    fn test_seen_translation_is_passed_through() {
        let mut f = Fixture::new("<html><body><p>Bonjour le monde</p></body></html>", "{}");
        f.seen.insert("Bonjour le monde".to_string());
        let out = f.serialize(&f.body_child("p"));

        // 只剩透传占位符的块不会被送去翻译
        assert!(out.blocks.is_empty());
    }

    #[test]
    fn test_seen_text_inside_mixed_block_round_trips() {
        use crate::translation::pipeline::deserializer::Deserializer;
        use crate::translation::storage::PseudoTable;

        let mut f = Fixture::new("<html><body><p>Hello <b>Bonjour</b></p></body></html>", "{}");
        f.seen.insert(seen_key("Bonjour"));
        let p = f.body_child("p");
        let out = f.serialize(&p);

        let block = &out.blocks[0];
        assert_eq!(
            block.block.source,
            vec![
                JliffItem::text("Hello "),
                JliffItem::start(1),
                JliffItem::Placeholder {
                    id: "2".to_string(),
                    display_kind: None,
                    equivalent_text: Some("Bonjour".to_string()),
                },
                JliffItem::end(1),
            ]
        );
        assert_eq!(block.block.block_hash, block_hash("Hello <x>{{tx}}</x>"));
        assert!(matches!(block.objects.get("ph:2"), Some(DomObject::Literal(v)) if v == "Bonjour"));

        let mut target = block.block.source.clone();
        target[0] = JliffItem::text("Salut ");
        let mut applied = AppliedValues::default();
        let mut pseudo = PseudoTable::default();
        Deserializer::new(&f.dom, &mut applied, &mut pseudo)
            .apply(block, &target)
            .unwrap();

        assert_eq!(text_content(&p), "Salut Bonjour");
        assert_eq!(text_content(&get_child_node_by_name(&p, "b").unwrap()), "Bonjour");
    }

    #[test]
    fn test_nested_inline_codes_are_balanced() {
        let f = Fixture::new("<html><body><p>a <b>b <i>c</i></b> d</p></body></html>", "{}");
        let out = f.serialize(&f.body_child("p"));
        let source = &out.blocks[0].block.source;

        assert_eq!(
            source,
            &vec![
                JliffItem::text("a "),
                JliffItem::start(1),
                JliffItem::text("b "),
                JliffItem::start(2),
                JliffItem::text("c"),
                JliffItem::end(2),
                JliffItem::end(1),
                JliffItem::text(" d"),
            ]
        );
        assert!(validate_brackets(source).is_ok());
        assert_eq!(out.blocks[0].block.block_hash, block_hash("a <x>b <x>c</x></x> d"));

        let crossed = vec![JliffItem::start(1), JliffItem::start(2), JliffItem::end(1), JliffItem::end(2)];
        assert!(validate_brackets(&crossed).is_err());
    }

    #[test]
    fn test_no_translate_text_is_opaque() {
        let f = Fixture::new(
            "<html><body><p>Call <span class=\"notranslate\">Acme Corp</span> now</p></body></html>",
            "{}",
        );
        let out = f.serialize(&f.body_child("p"));
        let block = &out.blocks[0].block;

        assert_eq!(block.block_hash, block_hash("Call <x><x></x></x> now"));
        assert!(matches!(out.blocks[0].objects.get("ph:2"), Some(DomObject::Node(_))));
    }

    #[test]
    fn test_attribute_and_pseudo_side_blocks() {
        let f = Fixture::new(
            "<html><head><style>.new::after { content: \"New\" }</style></head>\
             <body><p>See <img alt=\"A red car\"> <span class=\"new\">item</span></p></body></html>",
            "{}",
        );
        let out = f.serialize(&f.body_child("p"));

        assert_eq!(out.blocks.len(), 3);
        assert!(matches!(out.blocks[0].root, BlockRoot::Node(_)));
        assert!(out.blocks.iter().any(|b| matches!(&b.root, BlockRoot::Attribute { name, .. } if name == "alt")));
        assert!(out
            .blocks
            .iter()
            .any(|b| matches!(b.root, BlockRoot::Pseudo { kind: PseudoKind::After, .. })));
    }

    #[test]
    fn test_shadow_host_and_cross_origin_iframe() {
        let mut f = Fixture::new(
            "<html><body><div>Text <x-card></x-card><iframe></iframe></div></body></html>",
            "{}",
        );
        let div = f.body_child("div");
        let host = get_child_node_by_name(&div, "x-card").unwrap();
        let iframe = get_child_node_by_name(&div, "iframe").unwrap();
        f.dom.attach_shadow(&host);
        f.dom
            .set_frame_content(&iframe, crate::parsers::html::dom::FrameContent::CrossOrigin);

        let out = f.serialize(&div);
        assert_eq!(out.nested.len(), 2);
        let host_root = out.nested.iter().find(|r| get_node_name(&r.node) == Some("x-card")).unwrap();
        let nested = f.serialize(&host_root.node);
        assert_eq!(nested.nested.len(), 1);
        assert!(f.dom.is_shadow_root(&nested.nested[0].node));

        let frame_root = out.nested.iter().find(|r| get_node_name(&r.node) == Some("iframe")).unwrap();
        let frame = f.serialize(&frame_root.node);
        assert!(frame.blocks.is_empty() && frame.nested.is_empty());
    }
}
