//! HTML解析和处理模块
//!
//! - `dom`: 实时DOM适配层（shadow root、slot、iframe）
//! - `serializer`: 序列化功能

pub mod dom;
pub mod serializer;

pub use dom::{
    get_child_node_by_name, get_node_attr, get_node_name, get_parent_node, html_to_dom,
    set_node_attr, Dom, FrameContent, NodeKey,
};
pub use serializer::{serialize_document, serialize_node};
