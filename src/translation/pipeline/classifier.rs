//! 内容分类器
//!
//! 判断元素是块级、行内还是非文本元素，以及在当前祖先上下文中是否应当翻译。
//! 翻译判定的优先级从高到低：工具自身界面、显式 `translate="no"`/`OneLinkNoTx`/`notranslate`
//! （节点或祖先）、`ignore_hidden`、`no_translate` 规则、`translate` 规则、继承值。

use markup5ever_rcdom::Handle;

use crate::parsers::css::StyleResolver;
use crate::parsers::html::dom::{get_class_list, get_node_attr, get_node_name, Dom};
use crate::translation::config::{
    constants, CompiledRules, MoxieConfig, RuleCategory, TokenCategory,
};
use crate::translation::jliff::Stacks;
use crate::translation::pipeline::tokenizer::TokenizeContext;

/// 不翻译的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoTranslateReason {
    OwnUi,
    Explicit,
    Hidden,
    Rule,
}

impl NoTranslateReason {
    pub fn as_str(self) -> &'static str {
        match self {
            NoTranslateReason::OwnUi => "own-ui",
            NoTranslateReason::Explicit => "explicit",
            NoTranslateReason::Hidden => "hidden",
            NoTranslateReason::Rule => "rule",
        }
    }

    /// 后代无法通过 `translate` 规则重新启用
    fn is_sticky(self) -> bool {
        !matches!(self, NoTranslateReason::Rule)
    }
}

/// 沿祖先链向下传递的状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContext {
    pub translate: bool,
    pub reason: Option<NoTranslateReason>,
    pub auto_detect: bool,
    pub suppress_mt: bool,
    pub no_ami: bool,
    pub stacks: Stacks,
}

impl NodeContext {
    /// 文档根处的上下文
    pub fn root(translate_by_default: bool) -> Self {
        Self {
            translate: translate_by_default,
            reason: None,
            auto_detect: false,
            suppress_mt: false,
            no_ami: false,
            stacks: Stacks::default(),
        }
    }
}

impl Stacks {
    /// 追加一个元素后的栈
    pub fn child(&self, element: &Handle) -> Stacks {
        let tag = get_node_name(element).unwrap_or_default().to_ascii_lowercase();
        let id = get_node_attr(element, "id").unwrap_or_default();
        let class = get_class_list(element).join(" ");
        Stacks {
            tag: format!("{}/{}", self.tag, tag),
            id: format!("{}/{}", self.id, id),
            class: format!("{}/{}", self.class, class),
        }
    }
}

/// 分类结果
#[derive(Debug, Clone)]
pub struct Classification {
    pub is_block: bool,
    pub is_inline: bool,
    pub is_non_text: bool,
    pub is_own_ui: bool,
    pub translate: bool,
    pub no_translate_reason: Option<NoTranslateReason>,
    pub auto_detect_language: bool,
    pub suppress_mt: bool,
    /// 子节点继承的上下文
    pub context: NodeContext,
}

/// 工具自身注入的界面
pub fn is_own_ui(node: &Handle) -> bool {
    if let Some(name) = get_node_name(node) {
        if constants::OWN_UI_ELEMENTS.contains(&name) {
            return true;
        }
    }
    if let Some(id) = get_node_attr(node, "id") {
        if constants::OWN_UI_IDS.contains(&id.as_str()) {
            return true;
        }
    }
    get_class_list(node)
        .iter()
        .any(|c| constants::OWN_UI_CLASSES.contains(&c.as_str()))
}

/// 元素自身带有显式的不翻译标记
///
/// 引擎给根元素加的 `translate="no"` 只针对浏览器自带的翻译，这里不计入。
pub fn has_explicit_no_translate(node: &Handle) -> bool {
    let classes = get_class_list(node);
    if classes
        .iter()
        .any(|c| constants::NO_TRANSLATE_CLASSES.contains(&c.as_str()))
    {
        return true;
    }
    if get_node_attr(node, constants::NO_TRANSLATE_ATTR).is_some() {
        return true;
    }
    let marked_root = classes.iter().any(|c| c == constants::ROOT_MARKER_CLASS);
    !marked_root
        && get_node_attr(node, "translate").map_or(false, |v| v.trim().eq_ignore_ascii_case("no"))
}

pub fn is_non_text_element(name: &str) -> bool {
    constants::NON_TEXT_ELEMENTS.contains(&name)
}

/// 分类器
pub struct Classifier<'a> {
    config: &'a MoxieConfig,
    rules: &'a CompiledRules,
    styles: &'a StyleResolver,
}

impl<'a> Classifier<'a> {
    pub fn new(config: &'a MoxieConfig, rules: &'a CompiledRules, styles: &'a StyleResolver) -> Self {
        Self {
            config,
            rules,
            styles,
        }
    }

    pub fn root_context(&self) -> NodeContext {
        NodeContext::root(self.config.translate_by_default)
    }

    /// 对元素分类，`parent` 为父元素传下的上下文
    pub fn classify(&self, element: &Handle, parent: &NodeContext) -> Classification {
        let name = get_node_name(element).unwrap_or_default();
        let stacks = parent.stacks.child(element);
        let own_ui = is_own_ui(element);
        let non_text = is_non_text_element(name);
        let is_block = !non_text && self.is_block(element, &stacks);

        let mut context = NodeContext {
            stacks,
            ..parent.clone()
        };

        let sticky = parent.reason.map_or(false, NoTranslateReason::is_sticky);
        if own_ui {
            context.translate = false;
            context.reason = Some(NoTranslateReason::OwnUi);
        } else if sticky {
            // 继承显式/隐藏原因
        } else if has_explicit_no_translate(element) {
            context.translate = false;
            context.reason = Some(NoTranslateReason::Explicit);
        } else if self.ignores_hidden(element, &context.stacks) && self.styles.is_hidden(element) {
            context.translate = false;
            context.reason = Some(NoTranslateReason::Hidden);
        } else if self.rules.matches(RuleCategory::NoTranslate, element, &context.stacks) {
            context.translate = false;
            context.reason = Some(NoTranslateReason::Rule);
        } else if self.rules.matches(RuleCategory::Translate, element, &context.stacks) {
            context.translate = true;
            context.reason = None;
        }

        context.auto_detect |= self.rules.matches(RuleCategory::AutoDetect, element, &context.stacks);
        context.suppress_mt |= self.rules.matches(RuleCategory::SuppressMt, element, &context.stacks);
        context.no_ami |= self.rules.matches(RuleCategory::NoAmi, element, &context.stacks);

        Classification {
            is_block,
            is_inline: !is_block && !non_text,
            is_non_text: non_text,
            is_own_ui: own_ui,
            translate: context.translate,
            no_translate_reason: context.reason,
            auto_detect_language: context.auto_detect,
            suppress_mt: context.suppress_mt,
            context,
        }
    }

    /// 块级判定：覆盖规则优先于内置分类
    pub fn is_block(&self, element: &Handle, stacks: &Stacks) -> bool {
        if self.rules.matches(RuleCategory::SetAsBlockTag, element, stacks) {
            return true;
        }
        if self.rules.matches(RuleCategory::SetAsInlineTag, element, stacks) {
            return false;
        }
        get_node_name(element).map_or(false, |name| constants::BLOCK_ELEMENTS.contains(&name))
    }

    fn ignores_hidden(&self, element: &Handle, stacks: &Stacks) -> bool {
        self.config.ignore_hidden || self.rules.matches(RuleCategory::IgnoreHidden, element, stacks)
    }

    /// 节点内容所处的上下文（元素自身的分类也计入）
    pub fn context_for(&self, dom: &Dom, node: &Handle) -> NodeContext {
        dom.composed_element_path(node)
            .iter()
            .fold(self.root_context(), |ctx, element| self.classify(element, &ctx).context)
    }

    /// 元素内文本的记号化设置
    pub fn tokenize_context(&self, element: &Handle, stacks: &Stacks) -> TokenizeContext {
        let mut ctx = TokenizeContext::default();
        for rule in self.rules.matching(RuleCategory::NoTokenize, element, stacks) {
            if rule.token_categories.is_empty() {
                ctx.disabled.extend([
                    TokenCategory::Custom,
                    TokenCategory::Dates,
                    TokenCategory::Timezones,
                    TokenCategory::Time,
                    TokenCategory::Numbers,
                ]);
            } else {
                ctx.disabled.extend(rule.token_categories.iter().copied());
            }
        }
        for rule in self.rules.matching(RuleCategory::TokenizePatterns, element, stacks) {
            ctx.patterns.extend(rule.patterns.iter().cloned());
        }
        ctx
    }

    /// 元素上需要单独翻译的属性名
    pub fn translatable_attributes(&self, element: &Handle, context: &NodeContext) -> Vec<String> {
        if !context.translate {
            return Vec::new();
        }
        let stacks = &context.stacks;

        let mut names: Vec<String> = if self.config.translate_attributes {
            self.config.attributes.iter().map(|a| a.to_ascii_lowercase()).collect()
        } else {
            Vec::new()
        };
        for rule in self.rules.matching(RuleCategory::TranslateAttributes, element, stacks) {
            if rule.attributes.is_empty() {
                names.extend(self.config.attributes.iter().map(|a| a.to_ascii_lowercase()));
            } else {
                names.extend(rule.attributes.iter().cloned());
            }
        }
        for rule in self.rules.matching(RuleCategory::NoTranslateAttributes, element, stacks) {
            if rule.attributes.is_empty() {
                names.clear();
            } else {
                names.retain(|name| !rule.attributes.contains(name));
            }
        }

        if self.translates_input_value(element, stacks) {
            names.push("value".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        names.retain(|name| seen.insert(name.clone()));
        names
    }

    fn translates_input_value(&self, element: &Handle, stacks: &Stacks) -> bool {
        if get_node_name(element) != Some("input") {
            return false;
        }
        let input_type = get_node_attr(element, "type").unwrap_or_default().to_ascii_lowercase();
        if !constants::INPUT_VALUE_TYPES.contains(&input_type.as_str()) {
            return false;
        }
        let enabled = self.config.translate_input_value
            || self.rules.matches(RuleCategory::TranslateInputValue, element, stacks);
        enabled && !self.rules.matches(RuleCategory::NoTranslateInputValue, element, stacks)
    }

    /// 是否翻译元素的 `::before`/`::after` 内容
    pub fn translates_pseudo(&self, element: &Handle, context: &NodeContext) -> bool {
        if !context.translate {
            return false;
        }
        let enabled = self.config.pseudo_translate
            || self.rules.matches(RuleCategory::PseudoTranslate, element, &context.stacks);
        enabled && !self.rules.matches(RuleCategory::NoPseudoTranslate, element, &context.stacks)
    }

    /// iframe 是否被排除
    pub fn skips_iframe(&self, element: &Handle, stacks: &Stacks) -> bool {
        self.rules.matches(RuleCategory::IframeNoTrans, element, stacks)
    }

    pub fn styles(&self) -> &StyleResolver {
        self.styles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::get_child_node_by_name;
    use crate::translation::config::RuleSet;

    struct Fixture {
        dom: Dom,
        config: MoxieConfig,
        rules: CompiledRules,
        styles: StyleResolver,
    }

    fn fixture(html: &str, rules: &str) -> Fixture {
        let dom = Dom::parse(html).unwrap();
        let styles = StyleResolver::from_document(&dom);
        Fixture {
            dom,
            config: MoxieConfig::default(),
            rules: RuleSet::from_json(rules).unwrap().compile("https://example.com/", 64),
            styles,
        }
    }

    fn find(node: &Handle, path: &[&str]) -> Handle {
        path.iter()
            .fold(node.clone(), |n, name| get_child_node_by_name(&n, name).unwrap())
    }

    #[test]
    fn test_taxonomy() {
        let f = fixture("<html><body><div><span>a</span><script>x</script></div></body></html>", "{}");
        let classifier = Classifier::new(&f.config, &f.rules, &f.styles);
        let body = f.dom.body().unwrap();
        let ctx = classifier.context_for(&f.dom, &body);

        let div = classifier.classify(&find(&body, &["div"]), &ctx);
        assert!(div.is_block && !div.is_inline);
        let span = classifier.classify(&find(&body, &["div", "span"]), &div.context);
        assert!(span.is_inline);
        let script = classifier.classify(&find(&body, &["div", "script"]), &div.context);
        assert!(script.is_non_text && !script.is_block && !script.is_inline);
        assert_eq!(span.context.stacks.tag, "/html/body/div/span");
    }

    #[test]
    fn test_explicit_marker_beats_translate_rule() {
        let f = fixture(
            "<html><body><div class=\"notranslate\"><p class=\"keep\">a</p></div></body></html>",
            r#"{"translate": [{"x": ".keep"}]}"#,
        );
        let classifier = Classifier::new(&f.config, &f.rules, &f.styles);
        let p = find(&f.dom.body().unwrap(), &["div", "p"]);
        let ctx = classifier.context_for(&f.dom, &p);
        assert!(!ctx.translate);
        assert_eq!(ctx.reason, Some(NoTranslateReason::Explicit));
    }

    #[test]
    fn test_translate_rule_reincludes_under_stack_rule() {
        let f = fixture(
            "<html><body><div id=\"legal\"><p>a</p><p id=\"summary\">b</p></div></body></html>",
            r#"{"no_translate": [{"i": "/legal$"}], "translate": [{"i": "/legal/summary$"}]}"#,
        );
        let classifier = Classifier::new(&f.config, &f.rules, &f.styles);
        let div = find(&f.dom.body().unwrap(), &["div"]);
        let children: Vec<Handle> = div.children.borrow().iter().cloned().collect();

        assert!(!classifier.context_for(&f.dom, &div).translate);
        assert!(!classifier.context_for(&f.dom, &children[0]).translate);
        assert!(classifier.context_for(&f.dom, &children[1]).translate);
    }

    #[test]
    fn test_root_marker_translate_no_is_ignored() {
        let f = fixture(
            "<html translate=\"no\" class=\"moxie-translated\"><body><p>a</p></body></html>",
            "{}",
        );
        let classifier = Classifier::new(&f.config, &f.rules, &f.styles);
        let p = find(&f.dom.body().unwrap(), &["p"]);
        assert!(classifier.context_for(&f.dom, &p).translate);
    }

    #[test]
    fn test_own_ui_always_excluded() {
        let f = fixture(
            "<html><body><div id=\"moxie-language-selector\"><p>English</p></div></body></html>",
            r#"{"translate": [{"x": "p"}]}"#,
        );
        let classifier = Classifier::new(&f.config, &f.rules, &f.styles);
        let p = find(&f.dom.body().unwrap(), &["div", "p"]);
        let ctx = classifier.context_for(&f.dom, &p);
        assert_eq!(ctx.reason, Some(NoTranslateReason::OwnUi));
    }

    #[test]
    fn test_block_override_rule() {
        let f = fixture(
            "<html><body><custom-card>a</custom-card><div>b</div></body></html>",
            r#"{"set_as_block_tag": [{"x": "custom-card"}], "set_as_inline_tag": [{"t": "/div$"}]}"#,
        );
        let classifier = Classifier::new(&f.config, &f.rules, &f.styles);
        let body = f.dom.body().unwrap();
        let ctx = classifier.context_for(&f.dom, &body);

        assert!(classifier.classify(&find(&body, &["custom-card"]), &ctx).is_block);
        assert!(!classifier.classify(&find(&body, &["div"]), &ctx).is_block);
    }

    #[test]
    fn test_hidden_elements_with_ignore_hidden_rule() {
        let f = fixture(
            "<html><body><div hidden><span>a</span></div></body></html>",
            r#"{"ignore_hidden": [{}]}"#,
        );
        let classifier = Classifier::new(&f.config, &f.rules, &f.styles);
        let span = find(&f.dom.body().unwrap(), &["div", "span"]);
        assert_eq!(classifier.context_for(&f.dom, &span).reason, Some(NoTranslateReason::Hidden));
    }

    #[test]
    fn test_attribute_lists_and_input_value() {
        let f = fixture(
            "<html><body><input type=\"submit\" value=\"Send\" title=\"t\"><img alt=\"a\" title=\"t\"></body></html>",
            r#"{"no_translate_attributes": [{"x": "img", "attributes": ["title"]}]}"#,
        );
        let classifier = Classifier::new(&f.config, &f.rules, &f.styles);
        let body = f.dom.body().unwrap();
        let input = find(&body, &["input"]);
        let img = find(&body, &["img"]);

        let input_attrs = classifier.translatable_attributes(&input, &classifier.context_for(&f.dom, &input));
        assert!(input_attrs.contains(&"value".to_string()));
        let img_attrs = classifier.translatable_attributes(&img, &classifier.context_for(&f.dom, &img));
        assert!(img_attrs.contains(&"alt".to_string()));
        assert!(!img_attrs.contains(&"title".to_string()));
    }

    #[test]
    fn test_tokenize_context_from_rules() {
        let f = fixture(
            "<html><body><p class=\"price\">a</p></body></html>",
            r#"{"no_tokenize": [{"x": ".price", "category": "numbers"}], "tokenize_patterns": [{"patterns": ["SKU-\\d+"]}]}"#,
        );
        let classifier = Classifier::new(&f.config, &f.rules, &f.styles);
        let p = find(&f.dom.body().unwrap(), &["p"]);
        let ctx = classifier.context_for(&f.dom, &p);
        let tokenize = classifier.tokenize_context(&p, &ctx.stacks);
        assert!(!tokenize.is_enabled(TokenCategory::Numbers));
        assert!(tokenize.is_enabled(TokenCategory::Dates));
        assert_eq!(tokenize.patterns.len(), 1);
    }
}
