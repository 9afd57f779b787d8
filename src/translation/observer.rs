//! 变更监听
//!
//! 宿主把 DOM 变更记录交给 `MutationObserver`，它把每条记录映射成需要重新翻译的根，
//! 放进翻译队列，并通过防抖器决定何时开始下一轮遍历。
//! 引擎自身写回造成的变更（自写区间内或来源为会话的记录）一律忽略。

use std::time::{Duration, Instant};

use markup5ever_rcdom::Handle;

use crate::parsers::css::StyleResolver;
use crate::parsers::html::dom::{get_node_name, is_element, text_value, Dom};
use crate::translation::config::constants;
use crate::translation::core::session::TranslationSession;
use crate::translation::pipeline::aggregator::nearest_block;
use crate::translation::pipeline::collector::CollectRoot;

/// 影响分类结果的属性，变化时整个块需要重新翻译
const STRUCTURAL_ATTRS: &[&str] = &["class", "id", "translate", "style", "hidden", "slot"];

/// 变更类型
#[derive(Debug, Clone)]
pub enum MutationKind {
    /// 子节点增删；`added` 为空时只重新处理 `target`
    ChildList { target: Handle, added: Vec<Handle> },
    Attribute { target: Handle, name: String },
    CharacterData { target: Handle },
    ShadowRootAttached { host: Handle },
    /// `<input>` 的 value 被脚本改写
    InputValue { target: Handle },
}

/// 变更来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOrigin {
    External,
    /// 引擎自己的写回
    Session,
}

#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub origin: MutationOrigin,
}

impl MutationRecord {
    pub fn external(kind: MutationKind) -> Self {
        Self {
            kind,
            origin: MutationOrigin::External,
        }
    }
}

/// 防抖器：静默 `quiet` 后触发，持续变更时最迟 `max_wait` 触发
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    max_wait: Duration,
    first: Option<Instant>,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration, max_wait: Duration) -> Self {
        Self {
            quiet,
            max_wait,
            first: None,
            last: None,
        }
    }

    pub fn notify(&mut self, now: Instant) {
        self.first.get_or_insert(now);
        self.last = Some(now);
    }

    pub fn is_pending(&self) -> bool {
        self.first.is_some()
    }

    pub fn ready(&self, now: Instant) -> bool {
        match (self.first, self.last) {
            (Some(first), Some(last)) => {
                now.saturating_duration_since(last) >= self.quiet
                    || now.saturating_duration_since(first) >= self.max_wait
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.first = None;
        self.last = None;
    }
}

/// 变更监听器
#[derive(Debug)]
pub struct MutationObserver {
    debouncer: Debouncer,
    ignored: usize,
}

impl MutationObserver {
    pub fn new(quiet: Duration, max_wait: Duration) -> Self {
        Self {
            debouncer: Debouncer::new(quiet, max_wait),
            ignored: 0,
        }
    }

    /// 被忽略的自写变更数量
    pub fn ignored(&self) -> usize {
        self.ignored
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// 处理一条变更记录，返回新加入队列的根数量
    pub fn observe(
        &mut self,
        session: &mut TranslationSession,
        dom: &Dom,
        record: &MutationRecord,
        now: Instant,
    ) -> usize {
        if record.origin == MutationOrigin::Session || session.is_self_writing() {
            self.ignored += 1;
            return 0;
        }

        // 任何外部变更都可能改变选择器的匹配结果
        session.rules().bump_generation();

        let roots = Self::roots_for(session, dom, &record.kind);
        let added = roots
            .into_iter()
            .filter(|root| dom.is_connected(root.node()))
            .filter(|root| session.enqueue(root.clone()))
            .count();

        if added > 0 {
            tracing::debug!("变更产生 {} 个待翻译根", added);
            self.debouncer.notify(now);
        }
        added
    }

    /// 防抖到期时取出翻译队列
    pub fn take_ready(&mut self, session: &mut TranslationSession, now: Instant) -> Option<Vec<CollectRoot>> {
        if session.is_in_flight() || !self.debouncer.ready(now) {
            return None;
        }
        self.debouncer.reset();
        let roots = session.queue.drain();
        (!roots.is_empty()).then_some(roots)
    }

    fn roots_for(session: &TranslationSession, dom: &Dom, kind: &MutationKind) -> Vec<CollectRoot> {
        let styles = StyleResolver::from_document(dom);
        let classifier = session.classifier(&styles);
        let block_of = |node: &Handle| CollectRoot::Node(nearest_block(dom, &classifier, node));

        match kind {
            MutationKind::ChildList { target, added } if added.is_empty() => vec![block_of(target)],
            MutationKind::ChildList { added, .. } => added.iter().map(block_of).collect(),
            MutationKind::Attribute { target, name } => {
                if name == constants::PSEUDO_MARKER_ATTR || !is_element(target) {
                    return Vec::new();
                }
                let lowered = name.to_ascii_lowercase();
                if STRUCTURAL_ATTRS.contains(&lowered.as_str()) || name == constants::NO_TRANSLATE_ATTR {
                    return vec![block_of(target)];
                }
                let context = classifier.context_for(dom, target);
                if classifier
                    .translatable_attributes(target, &context)
                    .iter()
                    .any(|attr| attr == &lowered)
                {
                    vec![CollectRoot::Attribute {
                        element: target.clone(),
                        name: lowered,
                    }]
                } else {
                    Vec::new()
                }
            }
            MutationKind::CharacterData { target } => {
                let value = text_value(target).unwrap_or_default();
                if session.applied.text_matches(target, &value) {
                    Vec::new()
                } else {
                    vec![block_of(target)]
                }
            }
            MutationKind::ShadowRootAttached { host } => match dom.shadow_root(host) {
                Some(root) => vec![CollectRoot::Node(root)],
                None => Vec::new(),
            },
            MutationKind::InputValue { target } => {
                if get_node_name(target) == Some("input") {
                    vec![CollectRoot::Attribute {
                        element: target.clone(),
                        name: "value".to_string(),
                    }]
                } else {
                    Vec::new()
                }
            }
        }
    }
}
