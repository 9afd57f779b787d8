//! 文本切分与记号化
//!
//! 一段纯文本按固定顺序经过六个记号化步骤：cookie 替换、自定义正则、日期时间、
//! 时区、时间、数字。每一步只处理上一步留下的字面文本，命中的片段成为不透明记号，
//! 在哈希输入中以固定标记代替原文，使仅数字不同的文本得到相同的块哈希。

use std::collections::HashSet;
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

use crate::parsers::css::WhiteSpace;
use crate::translation::config::{CookieTokenConfig, TokenCategory};
use crate::translation::jliff::DisplayKind;

/// 记号种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Cookie,
    Custom,
    DateTime,
    Timezone,
    Time,
    Number,
}

impl TokenKind {
    /// 记号在哈希输入中的标记
    pub fn hash_marker(self) -> &'static str {
        match self {
            TokenKind::Cookie | TokenKind::Custom => "{{ct}}",
            TokenKind::DateTime => "{{dt}}",
            TokenKind::Timezone => "{{tz}}",
            TokenKind::Time => "{{t}}",
            TokenKind::Number => "{{n}}",
        }
    }

    pub fn display_kind(self) -> DisplayKind {
        match self {
            TokenKind::Cookie | TokenKind::Custom => DisplayKind::CustomToken,
            TokenKind::DateTime => DisplayKind::DateTime,
            TokenKind::Timezone => DisplayKind::Timezone,
            TokenKind::Time => DisplayKind::Time,
            TokenKind::Number => DisplayKind::Number,
        }
    }

    /// `no_tokenize` 规则使用的类别
    pub fn category(self) -> TokenCategory {
        match self {
            TokenKind::Cookie | TokenKind::Custom => TokenCategory::Custom,
            TokenKind::DateTime => TokenCategory::Dates,
            TokenKind::Timezone => TokenCategory::Timezones,
            TokenKind::Time => TokenCategory::Time,
            TokenKind::Number => TokenCategory::Numbers,
        }
    }
}

/// 本地化函数，由嵌入方提供；默认原样返回
pub trait Localizer {
    fn localize_number(&self, value: &str) -> String {
        value.to_string()
    }

    fn localize_date_time(&self, value: &str) -> String {
        value.to_string()
    }

    fn localize_time_zone(&self, value: &str) -> String {
        value.to_string()
    }
}

/// 不做任何本地化
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityLocalizer;

impl Localizer for IdentityLocalizer {}

/// 切分结果的一段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Token {
        kind: TokenKind,
        /// 原文
        source: String,
        /// 写回 DOM 的本地化文本
        replacement: String,
    },
}

/// 某段文本所处位置的记号化设置
#[derive(Debug, Clone, Default)]
pub struct TokenizeContext {
    pub disabled: HashSet<TokenCategory>,
    /// 适用于此处的自定义记号正则，按规则顺序排列
    pub patterns: Vec<Regex>,
}

impl TokenizeContext {
    pub fn is_enabled(&self, category: TokenCategory) -> bool {
        !self.disabled.contains(&category)
    }
}

/// 记号化结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenizedText {
    pub segments: Vec<Segment>,
    pub hash_input: String,
    pub contains_translatable: bool,
}

/// 单个记号化步骤
pub trait TokenPass {
    fn kind(&self) -> TokenKind;

    /// 命中的区间，升序且互不重叠
    fn find(&self, text: &str, ctx: &TokenizeContext) -> Vec<Range<usize>>;

    /// 命中片段写回时使用的文本
    fn replacement(&self, source: &str, localizer: &dyn Localizer) -> String {
        match self.kind() {
            TokenKind::Number => localizer.localize_number(source),
            TokenKind::DateTime | TokenKind::Time => localizer.localize_date_time(source),
            TokenKind::Timezone => localizer.localize_time_zone(source),
            TokenKind::Cookie | TokenKind::Custom => source.to_string(),
        }
    }
}

/// cookie 替换：`from` 的值按词边界匹配，写回 `to` 的值
pub struct CookiePass {
    regex: Option<Regex>,
    to: String,
}

impl CookiePass {
    pub fn new(config: Option<&CookieTokenConfig>) -> Self {
        let regex = config.and_then(|c| {
            let from = c.from.trim();
            if from.is_empty() {
                return None;
            }
            Regex::new(&format!(r"\b{}\b", regex::escape(from))).ok()
        });
        Self {
            regex,
            to: config.map(|c| c.to.clone()).unwrap_or_default(),
        }
    }
}

impl TokenPass for CookiePass {
    fn kind(&self) -> TokenKind {
        TokenKind::Cookie
    }

    fn find(&self, text: &str, _ctx: &TokenizeContext) -> Vec<Range<usize>> {
        match &self.regex {
            Some(re) => re.find_iter(text).map(|m| m.range()).collect(),
            None => Vec::new(),
        }
    }

    fn replacement(&self, _source: &str, _localizer: &dyn Localizer) -> String {
        self.to.clone()
    }
}

/// 客户自定义正则
///
/// 多组正则的命中按起点排序，起点相同时规则靠前者优先；
/// 与已接受的命中重叠的后来者被丢弃。
pub struct CustomPatternPass;

impl TokenPass for CustomPatternPass {
    fn kind(&self) -> TokenKind {
        TokenKind::Custom
    }

    fn find(&self, text: &str, ctx: &TokenizeContext) -> Vec<Range<usize>> {
        let mut candidates: Vec<(usize, usize, Range<usize>)> = ctx
            .patterns
            .iter()
            .enumerate()
            .flat_map(|(order, re)| {
                re.find_iter(text)
                    .filter(|m| !m.is_empty())
                    .map(move |m| (m.start(), order, m.range()))
            })
            .collect();
        candidates.sort_by_key(|(start, order, _)| (*start, *order));

        let mut accepted: Vec<Range<usize>> = Vec::new();
        for (_, _, range) in candidates {
            if accepted.last().map_or(true, |last| range.start >= last.end) {
                accepted.push(range);
            }
        }
        accepted
    }
}

/// 基于固定正则的步骤
pub struct RegexPass {
    kind: TokenKind,
    regex: &'static Regex,
    accept: fn(&str) -> bool,
}

impl TokenPass for RegexPass {
    fn kind(&self) -> TokenKind {
        self.kind
    }

    fn find(&self, text: &str, _ctx: &TokenizeContext) -> Vec<Range<usize>> {
        self.regex
            .find_iter(text)
            .filter(|m| (self.accept)(m.as_str()))
            .map(|m| m.range())
            .collect()
    }
}

const MONTHS: &str = "(?:January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sept|Sep|Oct|Nov|Dec)\\.?";

const TIME: &str = r"\d{1,2}:\d{2}(?::\d{2})?(?:\s?[AaPp]\.[Mm]\.|\s?[AaPp][Mm]\b|\b)";

const TIMEZONE_NAMES: &[&str] = &[
    "Coordinated Universal Time",
    "Greenwich Mean Time",
    "Eastern Standard Time",
    "Eastern Daylight Time",
    "Central Standard Time",
    "Central Daylight Time",
    "Mountain Standard Time",
    "Mountain Daylight Time",
    "Pacific Standard Time",
    "Pacific Daylight Time",
    "Alaska Standard Time",
    "Alaska Daylight Time",
    "Hawaii-Aleutian Standard Time",
    "Atlantic Standard Time",
    "Atlantic Daylight Time",
    "Newfoundland Standard Time",
    "British Summer Time",
    "Irish Standard Time",
    "Western European Time",
    "Western European Summer Time",
    "Central European Time",
    "Central European Summer Time",
    "Eastern European Time",
    "Eastern European Summer Time",
    "Moscow Standard Time",
    "India Standard Time",
    "China Standard Time",
    "Japan Standard Time",
    "Korea Standard Time",
    "Singapore Time",
    "Hong Kong Time",
    "Australian Eastern Standard Time",
    "Australian Eastern Daylight Time",
    "Australian Central Standard Time",
    "Australian Western Standard Time",
    "New Zealand Standard Time",
    "New Zealand Daylight Time",
];

const TIMEZONE_ABBREVIATIONS: &[&str] = &[
    "AKST", "AKDT", "AEST", "AEDT", "ACST", "ACDT", "AWST", "NZST", "NZDT", "CEST", "EEST",
    "WEST", "HAST", "UTC", "GMT", "EST", "EDT", "CST", "CDT", "MST", "MDT", "PST", "PDT", "HST",
    "AST", "ADT", "NST", "NDT", "BST", "IST", "CET", "EET", "WET", "MSK", "JST", "KST", "HKT",
    "SGT",
];

fn date_time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let ymd = r"\b\d{4}[-/.]\d{1,2}[-/.]\d{1,2}\b";
        let day_of_month = format!(r"\b\d{{1,2}}(?:st|nd|rd|th)?\s+(?:of\s+)?{MONTHS},?\s+\d{{4}}\b");
        let month_day = format!(r"\b{MONTHS}\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+\d{{4}}\b");
        let pattern = format!(r"(?i)(?:{ymd}|{day_of_month}|{month_day})(?:,?\s+(?:at\s+)?{TIME})?");
        Regex::new(&pattern).expect("日期时间正则无效")
    })
}

fn timezone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let names: Vec<String> = TIMEZONE_NAMES
            .iter()
            .chain(TIMEZONE_ABBREVIATIONS.iter())
            .map(|name| regex::escape(name))
            .collect();
        let pattern = format!(r"\b(?:(?:UTC|GMT)[+-]\d{{1,2}}(?::?\d{{2}})?|{})\b", names.join("|"));
        Regex::new(&pattern).expect("时区正则无效")
    })
}

fn time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"\b{TIME}")).expect("时间正则无效"))
}

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b\d+(?:[.,/-]\d+|[ \u{00A0}]\d{3}\b)*\b").expect("数字正则无效")
    })
}

/// 单独的 "1" 常作为普通文字出现，不作为数字记号
fn accept_number(value: &str) -> bool {
    value != "1"
}

fn accept_any(_value: &str) -> bool {
    true
}

/// 六步记号化级联
pub struct Tokenizer {
    passes: Vec<Box<dyn TokenPass>>,
}

impl Tokenizer {
    /// 标准级联
    pub fn new(cookie: Option<&CookieTokenConfig>) -> Self {
        Self::with_passes(vec![
            Box::new(CookiePass::new(cookie)),
            Box::new(CustomPatternPass),
            Box::new(RegexPass {
                kind: TokenKind::DateTime,
                regex: date_time_regex(),
                accept: accept_any,
            }),
            Box::new(RegexPass {
                kind: TokenKind::Timezone,
                regex: timezone_regex(),
                accept: accept_any,
            }),
            Box::new(RegexPass {
                kind: TokenKind::Time,
                regex: time_regex(),
                accept: accept_any,
            }),
            Box::new(RegexPass {
                kind: TokenKind::Number,
                regex: number_regex(),
                accept: accept_number,
            }),
        ])
    }

    pub fn with_passes(passes: Vec<Box<dyn TokenPass>>) -> Self {
        Self { passes }
    }

    /// 切分文本（文本应已完成空白规范化）
    pub fn tokenize(&self, text: &str, ctx: &TokenizeContext, localizer: &dyn Localizer) -> TokenizedText {
        let mut segments = vec![Segment::Text(text.to_string())];

        for pass in &self.passes {
            if !ctx.is_enabled(pass.kind().category()) {
                continue;
            }
            segments = segments
                .into_iter()
                .flat_map(|segment| match segment {
                    Segment::Text(literal) => split_literal(pass.as_ref(), &literal, ctx, localizer),
                    token => vec![token],
                })
                .collect();
        }

        segments.retain(|s| !matches!(s, Segment::Text(t) if t.is_empty()));

        let mut hash_input = String::new();
        let mut contains_translatable = false;
        for segment in &segments {
            match segment {
                Segment::Text(literal) => {
                    hash_input.push_str(literal);
                    contains_translatable |= literal.chars().any(char::is_alphabetic);
                }
                Segment::Token { kind, .. } => hash_input.push_str(kind.hash_marker()),
            }
        }

        TokenizedText {
            segments,
            hash_input,
            contains_translatable,
        }
    }
}

fn split_literal(
    pass: &dyn TokenPass,
    literal: &str,
    ctx: &TokenizeContext,
    localizer: &dyn Localizer,
) -> Vec<Segment> {
    let ranges = pass.find(literal, ctx);
    if ranges.is_empty() {
        return vec![Segment::Text(literal.to_string())];
    }

    let mut out = Vec::with_capacity(ranges.len() * 2 + 1);
    let mut cursor = 0;
    for range in ranges {
        if range.start < cursor {
            continue;
        }
        if range.start > cursor {
            out.push(Segment::Text(literal[cursor..range.start].to_string()));
        }
        let source = &literal[range.clone()];
        out.push(Segment::Token {
            kind: pass.kind(),
            source: source.to_string(),
            replacement: pass.replacement(source, localizer),
        });
        cursor = range.end;
    }
    if cursor < literal.len() {
        out.push(Segment::Text(literal[cursor..].to_string()));
    }
    out
}

fn is_collapsible(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\u{000B}' | '\u{000C}')
}

/// 文本是否只有空白
pub fn is_whitespace_only(text: &str) -> bool {
    text.chars().all(is_collapsible)
}

/// 按 `white-space` 规范化空白
pub fn normalize_whitespace(text: &str, white_space: WhiteSpace) -> String {
    if white_space.preserves_all() {
        return text.to_string();
    }

    let keep_newlines = white_space == WhiteSpace::PreLine;
    let mut out = String::with_capacity(text.len());
    let mut run = String::new();

    let flush = |run: &mut String, out: &mut String| {
        if run.is_empty() {
            return;
        }
        let newlines = run.matches('\n').count();
        if keep_newlines && newlines > 0 {
            out.extend(std::iter::repeat('\n').take(newlines));
        } else {
            out.push(' ');
        }
        run.clear();
    };

    for c in text.chars() {
        if is_collapsible(c) {
            run.push(c);
        } else {
            flush(&mut run, &mut out);
            out.push(c);
        }
    }
    flush(&mut run, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(text: &str) -> TokenizedText {
        Tokenizer::new(None).tokenize(text, &TokenizeContext::default(), &IdentityLocalizer)
    }

    fn tokens(result: &TokenizedText) -> Vec<(TokenKind, String)> {
        result
            .segments
            .iter()
            .filter_map(|s| match s {
                Segment::Token { kind, source, .. } => Some((*kind, source.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_lone_one_is_not_a_number() {
        let result = tokenize("Buy 1 get 1 free");
        assert!(tokens(&result).is_empty());
        assert_eq!(result.segments, vec![Segment::Text("Buy 1 get 1 free".to_string())]);
        assert_eq!(result.hash_input, "Buy 1 get 1 free");
    }

    #[test]
    fn test_grouped_numbers() {
        let result = tokenize("Buy 12 for $1,234.56");
        assert_eq!(
            tokens(&result),
            vec![
                (TokenKind::Number, "12".to_string()),
                (TokenKind::Number, "1,234.56".to_string())
            ]
        );
        assert_eq!(result.hash_input, "Buy {{n}} for ${{n}}");
    }

    #[test]
    fn test_numbers_equalize_hash_input() {
        assert_eq!(tokenize("Order 42 shipped").hash_input, tokenize("Order 99 shipped").hash_input);
        assert_ne!(tokenize("Order 42 shipped").hash_input, tokenize("Order 42 lost").hash_input);
    }

    #[test]
    fn test_date_time_grammars() {
        for text in [
            "Due 2024-03-05 today",
            "Due 5th of March, 2024 today",
            "Due March 5, 2024 at 5:30 PM today",
            "Due Sept. 15 2023 today",
        ] {
            let result = tokenize(text);
            let found = tokens(&result);
            assert_eq!(found.len(), 1, "{}", text);
            assert_eq!(found[0].0, TokenKind::DateTime, "{}", text);
            assert_eq!(result.hash_input, "Due {{dt}} today");
        }
    }

    #[test]
    fn test_time_and_timezone() {
        let result = tokenize("Opens 9:30am EST, closes 17:00 UTC+5:30");
        assert_eq!(
            tokens(&result),
            vec![
                (TokenKind::Time, "9:30am".to_string()),
                (TokenKind::Timezone, "EST".to_string()),
                (TokenKind::Time, "17:00".to_string()),
                (TokenKind::Timezone, "UTC+5:30".to_string()),
            ]
        );
        assert_eq!(result.hash_input, "Opens {{t}} {{tz}}, closes {{t}} {{tz}}");
    }

    #[test]
    fn test_disabled_categories() {
        let mut ctx = TokenizeContext::default();
        ctx.disabled.insert(TokenCategory::Numbers);
        let result = Tokenizer::new(None).tokenize("Only 12 left", &ctx, &IdentityLocalizer);
        assert!(tokens(&result).is_empty());
    }

    #[test]
    fn test_custom_patterns_earliest_match_wins() {
        let ctx = TokenizeContext {
            disabled: HashSet::new(),
            patterns: vec![Regex::new(r"AB-\d+").unwrap(), Regex::new(r"X-AB").unwrap()],
        };
        let result = Tokenizer::new(None).tokenize("Part X-AB-77 ships", &ctx, &IdentityLocalizer);
        assert_eq!(
            tokens(&result),
            vec![
                (TokenKind::Custom, "X-AB".to_string()),
                (TokenKind::Number, "77".to_string()),
            ]
        );
        // 剩余的 "-77" 仍交给数字步骤
        assert_eq!(result.hash_input, "Part {{ct}}-{{n}} ships");
    }

    #[test]
    fn test_cookie_substitution() {
        let cookie = CookieTokenConfig {
            from: "Springfield".to_string(),
            to: "Shelbyville".to_string(),
        };
        let result = Tokenizer::new(Some(&cookie)).tokenize(
            "Stores in Springfield",
            &TokenizeContext::default(),
            &IdentityLocalizer,
        );
        assert_eq!(
            result.segments.last(),
            Some(&Segment::Token {
                kind: TokenKind::Cookie,
                source: "Springfield".to_string(),
                replacement: "Shelbyville".to_string(),
            })
        );
    }

    #[test]
    fn test_localizer_is_applied() {
        struct Comma;
        impl Localizer for Comma {
            fn localize_number(&self, value: &str) -> String {
                value.replace('.', ",")
            }
        }
        let result = Tokenizer::new(None).tokenize("Pay 3.50 now", &TokenizeContext::default(), &Comma);
        assert!(result.segments.contains(&Segment::Token {
            kind: TokenKind::Number,
            source: "3.50".to_string(),
            replacement: "3,50".to_string(),
        }));
    }

    #[test]
    fn test_normalize_whitespace_modes() {
        assert_eq!(normalize_whitespace("a \n\t b", WhiteSpace::Normal), "a b");
        assert_eq!(normalize_whitespace("a \n\t b", WhiteSpace::Pre), "a \n\t b");
        assert_eq!(normalize_whitespace("a  \n  b   c", WhiteSpace::PreLine), "a\nb c");
        assert!(is_whitespace_only("\n\t  \n"));
        assert!(!is_whitespace_only(" x "));
    }
}
