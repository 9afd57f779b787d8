//! 翻译服务客户端
//!
//! `TranslationTransport` 是引擎与翻译后端之间的接缝；`HttpTransport` 用 reqwest 阻塞客户端实现，
//! 并在传输失败或配置的状态码上按随机退避重试。

use std::thread;
use std::time::Duration;

use rand::Rng;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;

use super::protocol::{AmiRequest, PretranslationResponse, ResponseBlock, TranslateRequest, TranslateResponse};
use crate::translation::config::{MoxieConfig, RetryConfig};
use crate::translation::error::{helpers, MoxieError, TranslationResult};

/// 翻译后端
pub trait TranslationTransport {
    fn translate(&self, request: &TranslateRequest) -> TranslationResult<TranslateResponse>;

    /// 源语言自动识别的独立请求
    fn translate_auto_detect(&self, request: &TranslateRequest) -> TranslationResult<TranslateResponse>;

    fn fetch_pretranslation(&self, content_url_hash: &str) -> TranslationResult<PretranslationResponse>;

    fn post_ami(&self, request: &AmiRequest) -> TranslationResult<()>;
}

impl<T: TranslationTransport + ?Sized> TranslationTransport for &T {
    fn translate(&self, request: &TranslateRequest) -> TranslationResult<TranslateResponse> {
        (**self).translate(request)
    }

    fn translate_auto_detect(&self, request: &TranslateRequest) -> TranslationResult<TranslateResponse> {
        (**self).translate_auto_detect(request)
    }

    fn fetch_pretranslation(&self, content_url_hash: &str) -> TranslationResult<PretranslationResponse> {
        (**self).fetch_pretranslation(content_url_hash)
    }

    fn post_ami(&self, request: &AmiRequest) -> TranslationResult<()> {
        (**self).post_ami(request)
    }
}

/// 重试策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    /// 0 表示传输层失败
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            min_backoff: Duration::from_millis(config.min_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            retryable_statuses: config.retryable_statuses.clone(),
        }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, error: &MoxieError) -> bool {
        match error {
            MoxieError::Transport { status, .. } => self.retryable_statuses.contains(status),
            _ => false,
        }
    }

    /// 退避区间内的随机时长
    pub fn backoff(&self) -> Duration {
        let min = self.min_backoff.as_millis() as u64;
        let max = self.max_backoff.as_millis() as u64;
        if max <= min {
            return self.min_backoff;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// 执行操作，按策略重试
    pub fn run<T>(&self, label: &str, mut operation: impl FnMut() -> TranslationResult<T>) -> TranslationResult<T> {
        let mut attempt = 0;
        loop {
            match operation() {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!("{} 在第 {} 次重试后成功", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if attempt < self.max_retries && self.should_retry(&e) => {
                    attempt += 1;
                    let delay = self.backoff();
                    tracing::warn!("{} 失败，{}ms 后进行第 {} 次重试: {}", label, delay.as_millis(), attempt, e);
                    thread::sleep(delay);
                }
                Err(e) => {
                    tracing::error!("{} 失败: {}", label, e);
                    return Err(e);
                }
            }
        }
    }
}

/// HTTP 翻译后端
pub struct HttpTransport {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    target_lang: String,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(config: &MoxieConfig) -> TranslationResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("moxie/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MoxieError::Config(format!("HTTP 客户端创建失败: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            target_lang: config.target_lang.clone(),
            retry: RetryPolicy::from(&config.retry),
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header(ACCEPT, "application/json")
            .query(&[("lang", self.target_lang.as_str())]);
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    /// 发送请求并返回响应体；非 2xx 视为失败
    fn send(&self, build: impl Fn() -> RequestBuilder) -> TranslationResult<String> {
        let response = self
            .authorize(build())
            .send()
            .map_err(|e| helpers::transport_error(0, e))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| helpers::transport_error(0, format!("读取响应失败: {}", e)))?;
        if !status.is_success() {
            return Err(helpers::transport_error(
                status.as_u16(),
                format!("服务端返回 {}", status),
            ));
        }
        Ok(body)
    }

    fn post_json<T: DeserializeOwned>(&self, label: &str, path: &str, body: String) -> TranslationResult<T> {
        let url = self.endpoint(path);
        let text = self.retry.run(label, || {
            self.send(|| {
                self.client
                    .post(&url)
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone())
            })
        })?;
        parse_json(&text)
    }
}

fn parse_json<T: DeserializeOwned>(text: &str) -> TranslationResult<T> {
    serde_json::from_str(text).map_err(|e| MoxieError::Parse(format!("响应 JSON 解析失败: {}", e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> TranslationResult<String> {
    serde_json::to_string(value).map_err(|e| MoxieError::Parse(format!("请求序列化失败: {}", e)))
}

impl TranslationTransport for HttpTransport {
    fn translate(&self, request: &TranslateRequest) -> TranslationResult<TranslateResponse> {
        self.post_json("翻译请求", "translate", to_json(request)?)
    }

    fn translate_auto_detect(&self, request: &TranslateRequest) -> TranslationResult<TranslateResponse> {
        self.post_json("自动识别翻译请求", "translate/detect", to_json(request)?)
    }

    fn fetch_pretranslation(&self, content_url_hash: &str) -> TranslationResult<PretranslationResponse> {
        let url = self.endpoint(&format!("pretranslation/{}", content_url_hash));
        let text = self
            .retry
            .run("预翻译请求", || self.send(|| self.client.get(&url)))?;
        parse_json(&text)
    }

    fn post_ami(&self, request: &AmiRequest) -> TranslationResult<()> {
        let url = self.endpoint("ami");
        let body = to_json(request)?;
        self.retry.run("AMI 回传", || {
            self.send(|| {
                self.client
                    .post(&url)
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone())
            })
        })?;
        Ok(())
    }
}

/// 回环后端：原文即译文，用于演练和测试
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopbackTransport;

impl TranslationTransport for LoopbackTransport {
    fn translate(&self, request: &TranslateRequest) -> TranslationResult<TranslateResponse> {
        Ok(TranslateResponse {
            text: request
                .text
                .iter()
                .map(|block| ResponseBlock {
                    target: block.source.clone(),
                })
                .collect(),
            ami: Vec::new(),
        })
    }

    fn translate_auto_detect(&self, request: &TranslateRequest) -> TranslationResult<TranslateResponse> {
        self.translate(request)
    }

    fn fetch_pretranslation(&self, _content_url_hash: &str) -> TranslationResult<PretranslationResponse> {
        Ok(PretranslationResponse::default())
    }

    fn post_ami(&self, _request: &AmiRequest) -> TranslationResult<()> {
        Ok(())
    }
}
