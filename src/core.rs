//! 对外入口
//!
//! `Moxie` 把翻译引擎、翻译后端与变更监听组合在一起。所有公开入口都不会返回错误：
//! 失败被记录到日志，并通过 `Completion` 告知调用方。

use std::time::Instant;

use markup5ever_rcdom::Handle;

use crate::network::client::TranslationTransport;
use crate::parsers::html::dom::{
    add_class, append_child, create_element, detach, get_node_attr, get_node_name, is_element,
    remove_class, set_node_attr, Dom,
};
use crate::translation::config::{constants, MoxieConfig, RuleSet};
use crate::translation::core::{PassOutcome, PassReport, PassResponses, TranslationEngine, TranslationSession};
use crate::translation::error::{helpers, MoxieError, TranslationResult};
use crate::translation::hash::content_url_hash;
use crate::translation::observer::{MutationObserver, MutationRecord};
use crate::translation::pipeline::collector::CollectRoot;
use crate::translation::pipeline::tokenizer::{IdentityLocalizer, Localizer};

/// 单次调用内最多连续执行的遍历轮数
const MAX_PASSES_PER_CALL: usize = 32;

const HIDE_STYLE: &str = ".onelinkjshide { opacity: 0 }";

const ANSI_COLOR_RED: &str = "\x1b[31m";
const ANSI_COLOR_RESET: &str = "\x1b[0m";

/// 一次调用的结局
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Translated(PassReport),
    /// 已有请求在途，根已进入翻译队列
    Queued,
    /// 页面带有已翻译标记，拒绝再次执行
    AlreadyTranslated,
    Failed(String),
}

impl Completion {
    pub fn is_success(&self) -> bool {
        matches!(self, Completion::Translated(_) | Completion::Queued)
    }

    pub fn report(&self) -> Option<&PassReport> {
        match self {
            Completion::Translated(report) => Some(report),
            _ => None,
        }
    }
}

/// 实时 DOM 本地化引擎
pub struct Moxie<T: TranslationTransport> {
    engine: TranslationEngine,
    transport: T,
    observer: MutationObserver,
}

impl<T: TranslationTransport> Moxie<T> {
    pub fn new(config: MoxieConfig, rules: RuleSet, page_url: &str, transport: T) -> Self {
        Self::with_localizer(config, rules, page_url, transport, Box::new(IdentityLocalizer))
    }

    /// 使用自定义的数字/日期本地化
    pub fn with_localizer(
        config: MoxieConfig,
        rules: RuleSet,
        page_url: &str,
        transport: T,
        localizer: Box<dyn Localizer>,
    ) -> Self {
        let observer = MutationObserver::new(config.debounce(), config.max_wait());
        let session = TranslationSession::new(config, rules, page_url);
        Self {
            engine: TranslationEngine::with_localizer(session, localizer),
            transport,
            observer,
        }
    }

    pub fn engine(&self) -> &TranslationEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut TranslationEngine {
        &mut self.engine
    }

    pub fn session(&self) -> &TranslationSession {
        self.engine.session()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn observer(&self) -> &MutationObserver {
        &self.observer
    }

    fn config(&self) -> &MoxieConfig {
        self.engine.session().config()
    }

    /// 翻译整个页面
    pub fn translate_page(&mut self, dom: &Dom) -> Completion {
        if has_meta_marker(dom) {
            helpers::log_error(&MoxieError::AlreadyTranslated);
            return Completion::AlreadyTranslated;
        }

        let Some(root) = dom.body().or_else(|| dom.document_element()) else {
            let error = MoxieError::Structure("文档没有 <html> 或 <body>".to_string());
            helpers::log_error(&error);
            return Completion::Failed(error.to_string());
        };

        self.ensure_pretranslation();
        self.mark_document(dom);
        self.run(dom, vec![CollectRoot::Node(root)])
    }

    /// 交给引擎一条变更记录
    pub fn on_mutation(&mut self, dom: &Dom, record: &MutationRecord, now: Instant) -> usize {
        let session = self.engine.session_mut();
        self.observer.observe(session, dom, record, now)
    }

    /// 防抖到期时翻译积累的变更；没有到期的工作时返回 `None`
    pub fn tick(&mut self, dom: &Dom, now: Instant) -> Option<Completion> {
        let roots = self.observer.take_ready(self.engine.session_mut(), now)?;
        Some(self.run(dom, roots))
    }

    /// 页面导航；路径变化时重置会话并重新加载预翻译表
    pub fn navigate(&mut self, page_url: &str) {
        let session = self.engine.session_mut();
        if session.content_url_hash() == content_url_hash(page_url) {
            tracing::debug!("路径未变化，保留会话: {}", page_url);
            return;
        }
        session.reset(page_url);
        self.ensure_pretranslation();
    }

    /// 强制重新拉取当前页面的预翻译表
    pub fn refresh_pretranslation(&mut self) -> TranslationResult<usize> {
        let hash = self.engine.session().content_url_hash().to_string();
        let response = self.transport.fetch_pretranslation(&hash)?;
        let session = self.engine.session_mut();
        session.pretranslation.load(&hash, response);
        Ok(session.pretranslation.len())
    }

    fn ensure_pretranslation(&mut self) {
        let hash = self.engine.session().content_url_hash().to_string();
        if self.engine.session().pretranslation.is_loaded_for(&hash) {
            return;
        }
        if let Err(e) = self.refresh_pretranslation() {
            tracing::warn!("预翻译表加载失败，全部走翻译请求: {}", e);
        }
    }

    /// 根元素加上 `translate="no"` 与标记 class，必要时注入 meta 标记
    fn mark_document(&self, dom: &Dom) {
        let _guard = self.engine.session().begin_self_write();
        if let Some(html) = dom.document_element() {
            set_node_attr(&html, "translate", Some("no".to_string()));
            add_class(&html, constants::ROOT_MARKER_CLASS);
        }
        if self.config().inject_meta_marker {
            if let Some(head) = dom.head() {
                let meta = create_element(
                    &dom.rcdom,
                    "meta",
                    &[
                        ("name", constants::META_MARKER_NAME),
                        ("content", self.config().target_lang.as_str()),
                    ],
                );
                append_child(&head, &meta);
            }
        }
    }

    fn run(&mut self, dom: &Dom, roots: Vec<CollectRoot>) -> Completion {
        let hidden = self.hide(dom, &roots);
        let completion = self.run_passes(dom, roots);
        // 无论成功与否，页面都不能停留在隐藏状态
        self.unhide(hidden);
        completion
    }

    fn run_passes(&mut self, dom: &Dom, mut roots: Vec<CollectRoot>) -> Completion {
        let mut total = PassReport::default();
        let mut errors: Vec<String> = Vec::new();
        let mut passes = 0;

        while !roots.is_empty() {
            if passes == MAX_PASSES_PER_CALL {
                tracing::warn!("连续遍历达到 {} 轮，剩余 {} 个根留待下次", passes, roots.len());
                for root in roots {
                    self.engine.session_mut().enqueue(root);
                }
                break;
            }
            passes += 1;

            match self.engine.begin_pass(dom, roots) {
                PassOutcome::Queued => return Completion::Queued,
                PassOutcome::Completed(report) => {
                    total.accumulate(&report);
                    roots = self.engine.session_mut().queue.drain();
                }
                PassOutcome::InFlight(pass) => {
                    let responses = PassResponses {
                        translate: pass.request.as_ref().map(|r| self.transport.translate(r)),
                        auto_detect: pass
                            .auto_detect
                            .as_ref()
                            .map(|r| self.transport.translate_auto_detect(r)),
                    };
                    errors.extend(
                        [&responses.translate, &responses.auto_detect]
                            .into_iter()
                            .flatten()
                            .filter_map(|r| r.as_ref().err().map(ToString::to_string)),
                    );

                    let finished = self.engine.finish_pass(dom, pass, responses);
                    total.accumulate(&finished.report);
                    if let Some(ami) = finished.ami {
                        if let Err(e) = self.transport.post_ami(&ami) {
                            tracing::warn!("AMI 回传失败: {}", e);
                        }
                    }
                    roots = finished.requeued;
                }
            }
        }

        if errors.is_empty() {
            Completion::Translated(total)
        } else {
            Completion::Failed(errors.join("; "))
        }
    }

    /// 翻译期间隐藏根元素，返回需要恢复的元素与样式
    fn hide(&self, dom: &Dom, roots: &[CollectRoot]) -> Vec<Handle> {
        if !self.config().hide_during_translation {
            return Vec::new();
        }
        let _guard = self.engine.session().begin_self_write();
        let mut touched = Vec::new();
        if let Some(style) = dom.ensure_style_element(constants::HIDE_STYLE_ELEMENT_ID) {
            dom.set_style_text(&style, HIDE_STYLE);
            touched.push(style);
        }
        for root in roots {
            let node = root.node();
            if is_element(node) && add_class(node, constants::HIDE_CLASS) {
                touched.push(node.clone());
            }
        }
        touched
    }

    fn unhide(&self, touched: Vec<Handle>) {
        if touched.is_empty() {
            return;
        }
        let _guard = self.engine.session().begin_self_write();
        for node in touched {
            let is_hide_style = get_node_name(&node) == Some("style")
                && get_node_attr(&node, "id").as_deref() == Some(constants::HIDE_STYLE_ELEMENT_ID);
            if is_hide_style {
                detach(&node);
            } else {
                remove_class(&node, constants::HIDE_CLASS);
            }
        }
    }
}

/// 页面是否已带有已翻译标记
pub fn has_meta_marker(dom: &Dom) -> bool {
    let Some(head) = dom.head() else {
        return false;
    };
    let children = head.children.borrow();
    children.iter().any(|child| {
        get_node_name(child) == Some("meta")
            && get_node_attr(child, "name").as_deref() == Some(constants::META_MARKER_NAME)
    })
}

/// Prints an error message to stderr
pub fn print_error_message(msg: &str) {
    eprintln!("{ANSI_COLOR_RED}{msg}{ANSI_COLOR_RESET}");
}

/// Prints an info message to stdout
pub fn print_info_message(msg: &str) {
    println!("{msg}");
}
