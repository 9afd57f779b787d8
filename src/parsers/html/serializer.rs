use encoding_rs::Encoding;
use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use markup5ever_rcdom::{Handle, SerializableHandle};

use crate::translation::error::{MoxieError, TranslationResult};

use super::dom::Dom;

/// 序列化文档，按 `document_encoding` 重新编码（为空时保持 UTF-8）
pub fn serialize_document(dom: &Dom, document_encoding: &str) -> TranslationResult<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();

    let serializable: SerializableHandle = dom.document().into();
    serialize(&mut buf, &serializable, SerializeOpts::default())
        .map_err(|e| MoxieError::Io(format!("DOM序列化失败: {}", e)))?;

    if !document_encoding.is_empty() {
        if let Some(encoding) = Encoding::for_label(document_encoding.as_bytes()) {
            let s: &str = &String::from_utf8_lossy(&buf);
            let (data, _, _) = encoding.encode(s);
            buf = data.to_vec();
        }
    }

    Ok(buf)
}

/// 序列化单个节点（包含节点自身）
pub fn serialize_node(node: &Handle) -> String {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = node.clone().into();
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::IncludeNode,
        ..Default::default()
    };
    if let Err(e) = serialize(&mut buf, &serializable, opts) {
        tracing::warn!("节点序列化失败: {}", e);
    }
    String::from_utf8_lossy(&buf).into_owned()
}
