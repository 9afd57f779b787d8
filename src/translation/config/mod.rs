//! 翻译配置管理模块
//!
//! 提供配置文件、环境变量和默认值三层配置，以及 UTICX 规则表的解析与编译

pub mod manager;
pub mod rules;

// 重新导出主要类型
pub use manager::{ConfigManager, CookieTokenConfig, MoxieConfig, RetryConfig};
pub use rules::{
    CompiledRule, CompiledRules, Matcher, RuleCategory, RuleSet, RuleSpec, TokenCategory,
};

/// 配置常量
pub mod constants {
    // 默认API设置
    pub const DEFAULT_API_URL: &str = "http://localhost:8090/moxie";
    pub const DEFAULT_TARGET_LANG: &str = "fr-FR";
    pub const DEFAULT_SOURCE_LANG: &str = "en-US";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    // 传输层重试
    pub const DEFAULT_MAX_RETRIES: u32 = 5;
    pub const DEFAULT_MIN_BACKOFF_MS: u64 = 1;
    pub const DEFAULT_MAX_BACKOFF_MS: u64 = 20;

    // 变更监听
    pub const DEFAULT_DEBOUNCE_MS: u64 = 250;
    pub const DEFAULT_MAX_WAIT_MS: u64 = 2000;

    /// 选择器匹配结果缓存容量
    pub const DEFAULT_SELECTOR_CACHE_SIZE: usize = 4096;

    // 可翻译属性
    pub const TRANSLATABLE_ATTRS: &[&str] = &[
        "title",
        "alt",
        "placeholder",
        "aria-label",
        "aria-roledescription",
        "aria-placeholder",
        "aria-valuetext",
    ];

    /// `value` 可翻译的 `<input>` 类型
    pub const INPUT_VALUE_TYPES: &[&str] = &["button", "submit", "reset"];

    /// 不含可翻译文本的元素，遇到即终止
    pub const NON_TEXT_ELEMENTS: &[&str] = &[
        "script", "style", "link", "base", "noscript", "meter", "progress", "cdata",
    ];

    /// 内置的块级元素
    pub const BLOCK_ELEMENTS: &[&str] = &[
        "address", "article", "aside", "blockquote", "body", "caption", "center", "col",
        "colgroup", "dd", "details", "dialog", "dir", "div", "dl", "dt", "fieldset",
        "figcaption", "figure", "footer", "form", "frameset", "h1", "h2", "h3", "h4", "h5",
        "h6", "head", "header", "hgroup", "hr", "html", "iframe", "legend", "li", "main",
        "menu", "nav", "ol", "optgroup", "option", "p", "pre", "section", "select",
        "summary", "table", "tbody", "td", "textarea", "tfoot", "th", "thead", "title", "tr",
        "ul",
    ];

    /// 内置的行内元素，未列出的标签同样按行内处理
    pub const INLINE_ELEMENTS: &[&str] = &[
        "a", "abbr", "acronym", "b", "bdi", "bdo", "big", "br", "button", "cite", "code",
        "data", "del", "dfn", "em", "font", "i", "img", "input", "ins", "kbd", "label",
        "mark", "q", "s", "samp", "small", "span", "strike", "strong", "sub", "sup", "time",
        "tt", "u", "var", "wbr",
    ];

    /// 显式不翻译标记
    pub const NO_TRANSLATE_CLASSES: &[&str] = &["OneLinkNoTx", "notranslate"];
    pub const NO_TRANSLATE_ATTR: &str = "OneLinkNoTx";

    // 工具自身界面的标记
    pub const OWN_UI_IDS: &[&str] = &[
        "OneLinkLanguageSelector",
        "moxie-language-selector",
        "moxie-pseudo-styles",
        "moxie-hide-styles",
    ];
    pub const OWN_UI_CLASSES: &[&str] = &["OneLinkShow_ui", "moxie-ui"];
    pub const OWN_UI_ELEMENTS: &[&str] = &["onelink-selector", "moxie-selector"];

    // 页面上的副作用
    pub const META_MARKER_NAME: &str = "moxietranslated";
    pub const ROOT_MARKER_CLASS: &str = "moxie-translated";
    pub const HIDE_CLASS: &str = "onelinkjshide";
    pub const HIDE_STYLE_ELEMENT_ID: &str = "moxie-hide-styles";
    pub const PSEUDO_MARKER_ATTR: &str = "data-moxie-pseudo";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &["moxie.toml", ".moxie.toml", "~/.config/moxie/moxie.toml"];
}

/// 是否存在任一配置文件
pub fn config_file_exists() -> bool {
    constants::CONFIG_PATHS
        .iter()
        .any(|path| std::path::Path::new(shellexpand::tilde(path).as_ref()).exists())
}

/// 加载配置，失败时退回默认值
pub fn load_config() -> MoxieConfig {
    match ConfigManager::new() {
        Ok(manager) => manager.into_config(),
        Err(e) => {
            tracing::warn!("配置加载失败，使用默认配置: {}", e);
            MoxieConfig::default()
        }
    }
}
