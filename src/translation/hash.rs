//! 内容哈希
//!
//! 块哈希与页面路径哈希都使用 64 位 FNV-1a（按 UTF-8 字节），并以十进制字符串表示。
//! 预翻译表和目标缓存都以此为键，因此算法与输入拼接方式必须逐字节保持一致。

use url::Url;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64 位 FNV-1a
pub fn fnv1a64(input: &str) -> u64 {
    input.as_bytes().iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// 块哈希（十进制字符串）
pub fn block_hash(hash_input: &str) -> String {
    fnv1a64(hash_input).to_string()
}

/// 页面内容哈希：对 URL 路径求哈希，无法解析时退回整个字符串
pub fn content_url_hash(page_url: &str) -> String {
    let path = Url::parse(page_url)
        .map(|url| url.path().to_string())
        .unwrap_or_else(|_| page_url.to_string());
    block_hash(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a64_reference_vectors() {
        assert_eq!(fnv1a64(""), 0xcbf29ce484222325);
        assert_eq!(fnv1a64("a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a64("foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn test_block_hash_is_decimal() {
        assert_eq!(block_hash("a"), 0xaf63dc4c8601ec8c_u64.to_string());
        assert!(block_hash("Click <x>here</x> for more!").chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_content_url_hash_ignores_query_and_host() {
        assert_eq!(
            content_url_hash("https://a.example.com/shop/cart?x=1"),
            content_url_hash("http://b.example.org/shop/cart#top")
        );
        assert_ne!(
            content_url_hash("https://a.example.com/shop/cart"),
            content_url_hash("https://a.example.com/shop/checkout")
        );
    }
}
