//! 翻译会话
//!
//! 一次页面导航内的全部共享状态：编译后的规则、译文缓存、预翻译表、已见译文、
//! 已写回值、翻译队列、请求状态与自写保护。导航到新路径时由 `reset` 一次性清理。

use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::parsers::css::StyleResolver;
use crate::parsers::html::dom::{Dom, NodeKey};
use crate::translation::config::{CompiledRules, MoxieConfig, RuleSet};
use crate::translation::hash::content_url_hash;
use crate::translation::pipeline::classifier::Classifier;
use crate::translation::pipeline::collector::CollectRoot;
use crate::translation::pipeline::serializer::{seen_key, Serializer};
use crate::translation::pipeline::tokenizer::{Localizer, Tokenizer};
use crate::translation::storage::{AppliedValues, PretranslationTable, PseudoTable, TargetCache};

/// 请求状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    RequestInFlight,
}

/// 翻译队列：等待下一轮遍历的根，按引用去重
#[derive(Debug, Default)]
pub struct TranslationQueue {
    entries: Vec<CollectRoot>,
    keys: HashSet<(NodeKey, Option<String>)>,
}

impl TranslationQueue {
    fn key(root: &CollectRoot) -> (NodeKey, Option<String>) {
        match root {
            CollectRoot::Node(node) => (NodeKey::of(node), None),
            CollectRoot::Attribute { element, name } => (NodeKey::of(element), Some(name.clone())),
        }
    }

    /// 加入队列，已存在时返回 false
    pub fn push(&mut self, root: CollectRoot) -> bool {
        if !self.keys.insert(Self::key(&root)) {
            return false;
        }
        self.entries.push(root);
        true
    }

    pub fn drain(&mut self) -> Vec<CollectRoot> {
        self.keys.clear();
        std::mem::take(&mut self.entries)
    }

    pub fn entries(&self) -> &[CollectRoot] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 自写保护：存在期间引擎自身造成的变更不会被当作外部变更
pub struct SelfWriteGuard {
    depth: Rc<Cell<u32>>,
}

impl Drop for SelfWriteGuard {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

/// 翻译会话
pub struct TranslationSession {
    config: MoxieConfig,
    rule_set: RuleSet,
    rules: CompiledRules,
    page_url: String,
    content_url_hash: String,
    tokenizer: Tokenizer,

    pub cache: TargetCache,
    pub pretranslation: PretranslationTable,
    pub seen: HashSet<String>,
    pub applied: AppliedValues,
    pub pseudo: PseudoTable,
    pub queue: TranslationQueue,
    state: PassState,
    self_writes: Rc<Cell<u32>>,
}

impl TranslationSession {
    pub fn new(config: MoxieConfig, rule_set: RuleSet, page_url: &str) -> Self {
        let rules = rule_set.compile(page_url, config.selector_cache_size);
        let tokenizer = Tokenizer::new(config.cookie_token.as_ref());
        Self {
            rules,
            rule_set,
            page_url: page_url.to_string(),
            content_url_hash: content_url_hash(page_url),
            tokenizer,
            config,
            cache: TargetCache::new(),
            pretranslation: PretranslationTable::new(),
            seen: HashSet::new(),
            applied: AppliedValues::default(),
            pseudo: PseudoTable::default(),
            queue: TranslationQueue::default(),
            state: PassState::Idle,
            self_writes: Rc::new(Cell::new(0)),
        }
    }

    /// 导航到新页面：清理页面范围的状态并按新 URL 重新编译规则，译文缓存保留
    pub fn reset(&mut self, page_url: &str) {
        tracing::info!("会话重置: {} -> {}", self.page_url, page_url);
        self.page_url = page_url.to_string();
        self.content_url_hash = content_url_hash(page_url);
        self.rules = self.rule_set.compile(page_url, self.config.selector_cache_size);
        self.pretranslation.clear();
        self.seen.clear();
        self.applied.clear();
        self.pseudo.clear();
        self.queue.drain();
        self.state = PassState::Idle;
    }

    pub fn config(&self) -> &MoxieConfig {
        &self.config
    }

    pub fn rules(&self) -> &CompiledRules {
        &self.rules
    }

    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    pub fn content_url_hash(&self) -> &str {
        &self.content_url_hash
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn set_state(&mut self, state: PassState) {
        self.state = state;
    }

    pub fn is_in_flight(&self) -> bool {
        self.state == PassState::RequestInFlight
    }

    /// 进入自写区间
    pub fn begin_self_write(&self) -> SelfWriteGuard {
        self.self_writes.set(self.self_writes.get() + 1);
        SelfWriteGuard {
            depth: Rc::clone(&self.self_writes),
        }
    }

    pub fn is_self_writing(&self) -> bool {
        self.self_writes.get() > 0
    }

    pub fn enqueue(&mut self, root: CollectRoot) -> bool {
        self.queue.push(root)
    }

    pub fn record_seen(&mut self, text: &str) {
        let key = seen_key(text);
        if !key.is_empty() {
            self.seen.insert(key);
        }
    }

    pub fn is_seen(&self, text: &str) -> bool {
        self.seen.contains(&seen_key(text))
    }

    pub fn classifier<'a>(&'a self, styles: &'a StyleResolver) -> Classifier<'a> {
        Classifier::new(&self.config, &self.rules, styles)
    }

    pub fn serializer<'a>(
        &'a self,
        dom: &'a Dom,
        styles: &'a StyleResolver,
        localizer: &'a dyn Localizer,
    ) -> Serializer<'a> {
        Serializer::new(
            dom,
            self.classifier(styles),
            &self.tokenizer,
            localizer,
            &self.seen,
            &self.applied,
        )
    }
}
