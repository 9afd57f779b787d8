//! 配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use super::constants;
use crate::translation::error::{MoxieError, TranslationResult};

/// 传输层重试配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// 可重试的 HTTP 状态码，0 表示传输失败
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: constants::DEFAULT_MAX_RETRIES,
            min_backoff_ms: constants::DEFAULT_MIN_BACKOFF_MS,
            max_backoff_ms: constants::DEFAULT_MAX_BACKOFF_MS,
            retryable_statuses: vec![0],
        }
    }
}

/// Cookie 替换记号：`from` 的文本作为记号送出，写回 `to` 的文本
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CookieTokenConfig {
    pub from: String,
    pub to: String,
}

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MoxieConfig {
    // 基础配置
    pub target_lang: String,
    pub source_lang: String,
    pub api_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,

    // 内容开关（对应规则对的默认值）
    pub translate_by_default: bool,
    pub translate_attributes: bool,
    pub attributes: Vec<String>,
    pub translate_input_value: bool,
    pub pseudo_translate: bool,
    pub ignore_hidden: bool,

    // 页面副作用
    pub inject_meta_marker: bool,
    pub hide_during_translation: bool,

    // 变更监听
    pub debounce_ms: u64,
    pub max_wait_ms: u64,
    pub selector_cache_size: usize,

    pub retry: RetryConfig,
    pub cookie_token: Option<CookieTokenConfig>,

    /// UTICX 规则表（JSON）路径
    pub rules_path: Option<String>,
}

impl Default for MoxieConfig {
    fn default() -> Self {
        Self {
            target_lang: constants::DEFAULT_TARGET_LANG.to_string(),
            source_lang: constants::DEFAULT_SOURCE_LANG.to_string(),
            api_url: constants::DEFAULT_API_URL.to_string(),
            api_key: None,
            timeout_secs: constants::DEFAULT_TIMEOUT_SECS,

            translate_by_default: true,
            translate_attributes: true,
            attributes: constants::TRANSLATABLE_ATTRS
                .iter()
                .map(|a| a.to_string())
                .collect(),
            translate_input_value: true,
            pseudo_translate: true,
            ignore_hidden: false,

            inject_meta_marker: true,
            hide_during_translation: false,

            debounce_ms: constants::DEFAULT_DEBOUNCE_MS,
            max_wait_ms: constants::DEFAULT_MAX_WAIT_MS,
            selector_cache_size: constants::DEFAULT_SELECTOR_CACHE_SIZE,

            retry: RetryConfig::default(),
            cookie_token: None,
            rules_path: None,
        }
    }
}

impl MoxieConfig {
    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        if self.api_url.trim().is_empty() {
            return Err(MoxieError::Config("API 地址不能为空".to_string()));
        }

        if self.retry.min_backoff_ms > self.retry.max_backoff_ms {
            return Err(MoxieError::Config(format!(
                "重试退避下限 {}ms 大于上限 {}ms",
                self.retry.min_backoff_ms, self.retry.max_backoff_ms
            )));
        }

        if self.max_wait_ms < self.debounce_ms {
            return Err(MoxieError::Config(
                "max_wait_ms 不能小于 debounce_ms".to_string(),
            ));
        }

        if self.selector_cache_size == 0 {
            return Err(MoxieError::Config("选择器缓存大小不能为0".to_string()));
        }

        if let Some(cookie) = &self.cookie_token {
            if cookie.from.trim().is_empty() {
                return Err(MoxieError::Config("cookie_token.from 不能为空".to_string()));
            }
        }

        Ok(())
    }

    /// 应用类型安全的环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{moxie, EnvVar};

        if let Ok(api_url) = moxie::ApiUrl::get() {
            self.api_url = api_url;
            tracing::info!("环境变量覆盖 API URL: {}", self.api_url);
        }

        if let Ok(target_lang) = moxie::TargetLang::get() {
            self.target_lang = target_lang;
        }

        if let Ok(rules_path) = moxie::RulesPath::get() {
            self.rules_path = Some(rules_path);
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: MoxieConfig,
}

impl ConfigManager {
    /// 按默认搜索路径加载
    pub fn new() -> TranslationResult<Self> {
        use crate::env::{moxie, EnvVar};

        let path = moxie::ConfigPath::get().ok().or_else(|| {
            constants::CONFIG_PATHS
                .iter()
                .map(|path| shellexpand::tilde(path).into_owned())
                .find(|path| Path::new(path).exists())
        });

        match &path {
            Some(path) => tracing::info!("加载配置文件: {}", path),
            None => tracing::info!("未找到配置文件，使用默认配置"),
        }

        Self::from_path(path.as_deref())
    }

    /// 从指定文件加载（`None` 时只使用默认值与环境变量）
    pub fn from_path(path: Option<&str>) -> TranslationResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("MOXIE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: MoxieConfig = builder.build()?.try_deserialize()?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 获取配置
    pub fn get_config(&self) -> &MoxieConfig {
        &self.config
    }

    pub fn into_config(self) -> MoxieConfig {
        self.config
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: &str) -> TranslationResult<()> {
        let content = toml::to_string_pretty(&MoxieConfig::default())
            .map_err(|e| MoxieError::Config(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| MoxieError::Config(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}
