//! # 解析器模块
//!
//! - `html` - HTML文档解析、实时DOM操作、序列化
//! - `css` - 内联样式、伪元素 `content` 规则与计算样式查询
//! - `selector` - 规则使用的 CSS 选择器

pub mod css;
pub mod html;
pub mod selector;

pub use css::{PseudoKind, StyleResolver, WhiteSpace};
pub use html::{html_to_dom, serialize_document, serialize_node, Dom, FrameContent};
pub use selector::Selector;
