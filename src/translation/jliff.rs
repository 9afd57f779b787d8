//! JLIFF 数据模型
//!
//! 一个块的内联内容被表示为有序的 `JliffItem` 序列：文本、起始码、结束码与占位符。
//! 起始码/结束码必须像括号一样成对嵌套，对应 DOM 中元素的嵌套关系。

use std::collections::HashMap;

use markup5ever_rcdom::{Handle, WeakHandle};
use serde::{Deserialize, Serialize};

use crate::parsers::css::PseudoKind;
use crate::parsers::html::dom::downgrade;
use crate::translation::error::{MoxieError, TranslationResult};

/// 占位符的显示类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayKind {
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "time")]
    Time,
    #[serde(rename = "date-time")]
    DateTime,
    #[serde(rename = "custom-token")]
    CustomToken,
    #[serde(rename = "timezone")]
    Timezone,
}

/// JLIFF 条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum JliffItem {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "sc")]
    StartCode { id: String },
    #[serde(rename = "ec")]
    EndCode {
        #[serde(rename = "startRef")]
        start_ref: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    #[serde(rename = "ph")]
    Placeholder {
        id: String,
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        display_kind: Option<DisplayKind>,
        #[serde(rename = "equiv", default, skip_serializing_if = "Option::is_none")]
        equivalent_text: Option<String>,
    },
}

impl JliffItem {
    pub fn text(value: impl Into<String>) -> Self {
        JliffItem::Text { text: value.into() }
    }

    pub fn start(id: u32) -> Self {
        JliffItem::StartCode { id: id.to_string() }
    }

    pub fn end(id: u32) -> Self {
        JliffItem::EndCode {
            start_ref: id.to_string(),
            id: None,
        }
    }

    pub fn placeholder(id: u32) -> Self {
        JliffItem::Placeholder {
            id: id.to_string(),
            display_kind: None,
            equivalent_text: None,
        }
    }

    pub fn token(id: u32, kind: DisplayKind, equivalent: &str) -> Self {
        JliffItem::Placeholder {
            id: id.to_string(),
            display_kind: Some(kind),
            equivalent_text: Some(equivalent.to_string()),
        }
    }
}

/// 起始码在对象表中的键
pub fn start_key(id: &str) -> String {
    format!("sc:{}", id)
}

/// 占位符在对象表中的键
pub fn placeholder_key(id: &str) -> String {
    format!("ph:{}", id)
}

/// 检查起始码/结束码的括号结构
pub fn validate_brackets(items: &[JliffItem]) -> TranslationResult<()> {
    let mut open: Vec<&str> = Vec::new();
    for item in items {
        match item {
            JliffItem::StartCode { id } => {
                if open.contains(&id.as_str()) {
                    return Err(MoxieError::Structure(format!("起始码 {} 重复打开", id)));
                }
                open.push(id);
            }
            JliffItem::EndCode { start_ref, .. } => match open.pop() {
                Some(top) if top == start_ref => {}
                Some(top) => {
                    return Err(MoxieError::Structure(format!(
                        "结束码 {} 与当前打开的起始码 {} 交叉",
                        start_ref, top
                    )))
                }
                None => {
                    return Err(MoxieError::Structure(format!(
                        "结束码 {} 没有对应的起始码",
                        start_ref
                    )))
                }
            },
            _ => {}
        }
    }
    match open.last() {
        Some(id) => Err(MoxieError::Structure(format!("起始码 {} 未闭合", id))),
        None => Ok(()),
    }
}

/// DOM 对象表中的值
///
/// 节点引用都是弱引用：对象表不拥有节点，节点可能在响应返回前被移除。
#[derive(Debug, Clone)]
pub enum DomObject {
    /// 起始码或自闭合占位符对应的元素
    Element(WeakHandle),
    /// 原样放回的节点（注释、不翻译的文本、块边界等）
    Node(WeakHandle),
    /// 需要以文本写回的字面值（本地化后的数字/日期，或透传的已翻译文本）
    Literal(String),
}

impl DomObject {
    pub fn element(node: &Handle) -> Self {
        DomObject::Element(downgrade(node))
    }

    pub fn node(node: &Handle) -> Self {
        DomObject::Node(downgrade(node))
    }
}

/// 占位符/代码键到 DOM 对象的映射
pub type DomObjectMap = HashMap<String, DomObject>;

/// 块的根：译文写回的目标
#[derive(Debug, Clone)]
pub enum BlockRoot {
    /// 子节点会被重建的元素或片段
    Node(WeakHandle),
    /// 直接改写值的文本节点
    Text(WeakHandle),
    /// 元素属性
    Attribute { element: WeakHandle, name: String },
    /// 伪元素 `content`
    Pseudo { element: WeakHandle, kind: PseudoKind },
}

impl BlockRoot {
    /// 根对应的宿主节点
    pub fn node(&self) -> Option<Handle> {
        match self {
            BlockRoot::Node(weak) | BlockRoot::Text(weak) => weak.upgrade(),
            BlockRoot::Attribute { element, .. } | BlockRoot::Pseudo { element, .. } => {
                element.upgrade()
            }
        }
    }
}

/// 祖先路径字符串，仅用于规则匹配
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stacks {
    pub tag: String,
    pub id: String,
    pub class: String,
}

/// 翻译单元
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub source: Vec<JliffItem>,
    pub block_hash: String,
    pub suppress_mt: bool,
    pub auto_detect: bool,
    pub no_ami: bool,
    /// 是否至少含有一段可翻译文本
    pub contains_translatable: bool,
    pub stacks: Stacks,
}

/// 序列化结果：翻译单元、写回位置与对象表
#[derive(Debug, Clone)]
pub struct SerializedBlock {
    pub block: TextBlock,
    pub root: BlockRoot,
    pub objects: DomObjectMap,
}
