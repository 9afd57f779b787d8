//! 翻译引擎
//!
//! 一轮遍历的状态机：`Idle → RequestInFlight → Idle`。
//!
//! `begin_pass` 收集块，先查预翻译表，再查译文缓存，命中的块立即写回；
//! 其余块按哈希去重后组成一个请求（自动识别语言的块另组一个请求）。
//! 请求在途期间新的根只会进入翻译队列。`finish_pass` 写回响应，
//! 丢弃根已断开或被队列中更新的根覆盖的块，然后交回排空的队列作为下一轮的起点。

use std::collections::{HashMap, HashSet};

use crate::network::protocol::{
    AmiBlock, AmiRequest, RequestBlock, TranslateRequest, TranslateResponse,
};
use crate::parsers::css::StyleResolver;
use crate::parsers::html::dom::Dom;
use crate::translation::core::session::{PassState, TranslationSession};
use crate::translation::error::{helpers, MoxieError, TranslationResult};
use crate::translation::jliff::{BlockRoot, JliffItem, SerializedBlock};
use crate::translation::pipeline::collector::{BlockCollector, CollectRoot};
use crate::translation::pipeline::deserializer::Deserializer;
use crate::translation::pipeline::serializer::seen_key;
use crate::translation::pipeline::tokenizer::{IdentityLocalizer, Localizer};

/// 一轮遍历的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub blocks: usize,
    pub from_pretranslation: usize,
    pub from_cache: usize,
    pub sent: usize,
    pub applied: usize,
    pub superseded: usize,
    pub failed: usize,
}

impl PassReport {
    /// 累加另一轮的统计
    pub fn accumulate(&mut self, other: &PassReport) {
        self.blocks += other.blocks;
        self.from_pretranslation += other.from_pretranslation;
        self.from_cache += other.from_cache;
        self.sent += other.sent;
        self.applied += other.applied;
        self.superseded += other.superseded;
        self.failed += other.failed;
    }
}

#[derive(Debug)]
struct PendingBlock {
    block: SerializedBlock,
    index: usize,
    auto_detect: bool,
}

/// 在途的一轮遍历
#[derive(Debug)]
pub struct InFlightPass {
    pub request: Option<TranslateRequest>,
    pub auto_detect: Option<TranslateRequest>,
    pending: Vec<PendingBlock>,
    report: PassReport,
}

impl InFlightPass {
    pub fn pending_blocks(&self) -> usize {
        self.pending.len()
    }
}

/// `begin_pass` 的结果
#[derive(Debug)]
pub enum PassOutcome {
    /// 已有请求在途，根已进入队列
    Queued,
    /// 无需网络请求即已完成
    Completed(PassReport),
    InFlight(InFlightPass),
}

/// 网络请求的结果
#[derive(Debug, Default)]
pub struct PassResponses {
    pub translate: Option<TranslationResult<TranslateResponse>>,
    pub auto_detect: Option<TranslationResult<TranslateResponse>>,
}

/// `finish_pass` 的结果
#[derive(Debug, Default)]
pub struct FinishedPass {
    pub report: PassReport,
    pub ami: Option<AmiRequest>,
    /// 排空的翻译队列（以及被取代的块根），作为下一轮的起点
    pub requeued: Vec<CollectRoot>,
}

/// 翻译引擎
pub struct TranslationEngine {
    session: TranslationSession,
    localizer: Box<dyn Localizer>,
}

impl TranslationEngine {
    pub fn new(session: TranslationSession) -> Self {
        Self::with_localizer(session, Box::new(IdentityLocalizer))
    }

    pub fn with_localizer(session: TranslationSession, localizer: Box<dyn Localizer>) -> Self {
        Self { session, localizer }
    }

    pub fn session(&self) -> &TranslationSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TranslationSession {
        &mut self.session
    }

    pub fn is_in_flight(&self) -> bool {
        self.session.is_in_flight()
    }

    /// 开始一轮遍历
    pub fn begin_pass(&mut self, dom: &Dom, roots: Vec<CollectRoot>) -> PassOutcome {
        if self.session.is_in_flight() {
            let queued = roots
                .into_iter()
                .filter(|root| self.session.enqueue(root.clone()))
                .count();
            tracing::debug!("请求在途，{} 个根进入翻译队列", queued);
            return PassOutcome::Queued;
        }

        self.session.applied.prune();
        let styles = StyleResolver::from_document(dom);
        let blocks = {
            let serializer = self.session.serializer(dom, &styles, self.localizer.as_ref());
            BlockCollector::new(dom, &serializer).collect(&roots)
        };

        let mut report = PassReport {
            blocks: blocks.len(),
            ..PassReport::default()
        };
        let mut main = RequestBuilder::default();
        let mut auto = RequestBuilder::default();
        let mut pending = Vec::new();

        for block in blocks {
            let hash = block.block.block_hash.clone();
            if block.block.auto_detect {
                let index = auto.add(&block);
                pending.push(PendingBlock {
                    block,
                    index,
                    auto_detect: true,
                });
                continue;
            }

            if let Some(target) = self.session.pretranslation.get(&hash).cloned() {
                report.from_pretranslation += 1;
                self.apply_counted(dom, &block, &target, &mut report);
                continue;
            }
            if let Some(target) = self.session.cache.get(&hash) {
                report.from_cache += 1;
                self.apply_counted(dom, &block, &target, &mut report);
                continue;
            }

            let index = main.add(&block);
            pending.push(PendingBlock {
                block,
                index,
                auto_detect: false,
            });
        }

        if pending.is_empty() {
            tracing::info!(
                "遍历完成: {} 个块，预翻译 {}，缓存 {}",
                report.blocks,
                report.from_pretranslation,
                report.from_cache
            );
            return PassOutcome::Completed(report);
        }

        report.sent = main.blocks.len() + auto.blocks.len();
        let url = self.session.page_url().to_string();
        let hash = self.session.content_url_hash().to_string();
        let pass = InFlightPass {
            request: main.build(&url, &hash),
            auto_detect: auto.build(&url, &hash),
            pending,
            report,
        };
        tracing::info!(
            "发出翻译请求: {} 个块（自动识别 {} 个）",
            pass.request.as_ref().map_or(0, TranslateRequest::len),
            pass.auto_detect.as_ref().map_or(0, TranslateRequest::len)
        );
        self.session.set_state(PassState::RequestInFlight);
        PassOutcome::InFlight(pass)
    }

    /// 结束一轮遍历，写回响应
    pub fn finish_pass(&mut self, dom: &Dom, pass: InFlightPass, responses: PassResponses) -> FinishedPass {
        let InFlightPass {
            request,
            auto_detect,
            pending,
            mut report,
        } = pass;

        let queued = self.session.queue.drain();
        let main = accept_response(request.as_ref(), responses.translate);
        let auto = accept_response(auto_detect.as_ref(), responses.auto_detect);

        let ami_hashes: HashSet<&str> = main
            .iter()
            .chain(auto.iter())
            .flat_map(|response| response.ami.iter().map(String::as_str))
            .collect();
        let mut ami_blocks: Vec<AmiBlock> = Vec::new();
        let mut requeued = queued.clone();

        for entry in &pending {
            let response = if entry.auto_detect { &auto } else { &main };
            let Some(response) = response else {
                report.failed += 1;
                continue;
            };
            let target = &response.text[entry.index].target;
            let hash = &entry.block.block.block_hash;
            self.session.cache.insert(hash.clone(), target.clone());

            match self.check_current(dom, &entry.block, &queued) {
                Ok(()) => {}
                Err(reason) => {
                    tracing::debug!("块 {} 被丢弃: {}", hash, reason);
                    report.superseded += 1;
                    if let Some(root) = requeue_root(dom, &entry.block.root) {
                        let covered = queued
                            .iter()
                            .any(|q| dom.is_composed_inclusive_ancestor(q.node(), root.node()));
                        if !covered {
                            requeued.push(root);
                        }
                    }
                    continue;
                }
            }

            self.apply_counted(dom, &entry.block, target, &mut report);

            if ami_hashes.contains(hash.as_str())
                && !entry.block.block.no_ami
                && !ami_blocks.iter().any(|b| &b.block_hash == hash)
            {
                ami_blocks.push(AmiBlock {
                    source: entry.block.block.source.clone(),
                    block_hash: hash.clone(),
                });
            }
        }

        self.session.set_state(PassState::Idle);
        requeued.retain(|root| dom.is_connected(root.node()));

        tracing::info!(
            "遍历结束: 写回 {}，取代 {}，失败 {}，待处理 {}",
            report.applied,
            report.superseded,
            report.failed,
            requeued.len()
        );

        let ami = (!ami_blocks.is_empty()).then(|| AmiRequest {
            url: self.session.page_url().to_string(),
            content_url_hash: self.session.content_url_hash().to_string(),
            text: ami_blocks,
        });

        FinishedPass {
            report,
            ami,
            requeued,
        }
    }

    /// 块根仍然有效且没有被队列中的根覆盖
    fn check_current(&self, dom: &Dom, block: &SerializedBlock, queued: &[CollectRoot]) -> Result<(), &'static str> {
        let Some(node) = block.root.node() else {
            return Err("根节点已被释放");
        };
        if !dom.is_connected(&node) {
            return Err("根节点已断开");
        }
        let overlaps = queued.iter().any(|entry| {
            let other = entry.node();
            dom.is_composed_inclusive_ancestor(other, &node)
                || dom.is_composed_inclusive_ancestor(&node, other)
        });
        if overlaps {
            return Err("根节点在请求期间发生了变更");
        }
        Ok(())
    }

    fn apply_counted(&mut self, dom: &Dom, block: &SerializedBlock, target: &[JliffItem], report: &mut PassReport) {
        match self.apply_block(dom, block, target) {
            Ok(()) => report.applied += 1,
            Err(e) => {
                helpers::log_error(&e);
                report.failed += 1;
            }
        }
    }

    /// 把译文写回一个块，并登记已见译文
    pub fn apply_block(&mut self, dom: &Dom, block: &SerializedBlock, target: &[JliffItem]) -> TranslationResult<()> {
        let session = &mut self.session;
        let _guard = session.begin_self_write();
        let written = Deserializer::new(dom, &mut session.applied, &mut session.pseudo)
            .apply(block, target)
            .map_err(|e| e.with_context(format!("块 {}", block.block.block_hash)))?;

        let source_keys: HashSet<String> = block
            .block
            .source
            .iter()
            .filter_map(|item| match item {
                JliffItem::Text { text } => Some(seen_key(text)),
                _ => None,
            })
            .collect();
        for text in written.texts {
            if !source_keys.contains(&seen_key(&text)) {
                session.record_seen(&text);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct RequestBuilder {
    blocks: Vec<RequestBlock>,
    index_by_hash: HashMap<String, usize>,
}

impl RequestBuilder {
    /// 相同哈希只发送一次
    fn add(&mut self, block: &SerializedBlock) -> usize {
        let hash = &block.block.block_hash;
        if let Some(index) = self.index_by_hash.get(hash) {
            return *index;
        }
        let index = self.blocks.len();
        self.blocks.push(RequestBlock {
            source: block.block.source.clone(),
            block_hash: hash.clone(),
            suppress_mt: block.block.suppress_mt,
        });
        self.index_by_hash.insert(hash.clone(), index);
        index
    }

    fn build(self, url: &str, content_url_hash: &str) -> Option<TranslateRequest> {
        if self.blocks.is_empty() {
            return None;
        }
        Some(TranslateRequest {
            url: url.to_string(),
            content_url_hash: content_url_hash.to_string(),
            text: self.blocks,
        })
    }
}

/// 响应必须与请求逐一对应，否则整批失败
fn accept_response(
    request: Option<&TranslateRequest>,
    response: Option<TranslationResult<TranslateResponse>>,
) -> Option<TranslateResponse> {
    let request = request?;
    match response {
        Some(Ok(response)) if response.text.len() == request.len() => Some(response),
        Some(Ok(response)) => {
            helpers::log_error(&MoxieError::Structure(format!(
                "响应块数 {} 与请求块数 {} 不一致",
                response.text.len(),
                request.len()
            )));
            None
        }
        Some(Err(e)) => {
            helpers::log_error(&e);
            None
        }
        None => {
            tracing::error!("缺少 {} 个块的翻译响应", request.len());
            None
        }
    }
}

fn requeue_root(dom: &Dom, root: &BlockRoot) -> Option<CollectRoot> {
    match root {
        BlockRoot::Node(weak) | BlockRoot::Text(weak) | BlockRoot::Pseudo { element: weak, .. } => {
            let node = weak.upgrade()?;
            dom.is_connected(&node).then_some(CollectRoot::Node(node))
        }
        BlockRoot::Attribute { element, name } => {
            let element = element.upgrade()?;
            dom.is_connected(&element).then(|| CollectRoot::Attribute {
                element,
                name: name.clone(),
            })
        }
    }
}
