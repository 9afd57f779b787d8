//! 译文缓存模块
//!
//! 以块哈希为键保存译文 JLIFF，进程内共享，跨页面导航保留。

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::translation::jliff::JliffItem;

/// 缓存配置
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_size: 10_000 }
    }
}

/// 缓存统计信息
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_entries: usize,
    pub evictions: u64,
}

impl CacheStats {
    /// 计算缓存命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_requests as f64
        }
    }
}

/// 块哈希到译文的 LRU 缓存
#[derive(Debug)]
pub struct TargetCache {
    entries: LruCache<String, Vec<JliffItem>>,
    stats: CacheStats,
}

impl TargetCache {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    /// 查找译文，命中时刷新最近使用顺序
    pub fn get(&mut self, block_hash: &str) -> Option<Vec<JliffItem>> {
        self.stats.total_requests += 1;
        match self.entries.get(block_hash) {
            Some(target) => {
                self.stats.cache_hits += 1;
                Some(target.clone())
            }
            None => {
                self.stats.cache_misses += 1;
                None
            }
        }
    }

    /// 写入译文，已存在的条目被覆盖；满时淘汰最久未使用的条目
    pub fn insert(&mut self, block_hash: String, target: Vec<JliffItem>) {
        if let Some((evicted, _)) = self.entries.push(block_hash.clone(), target) {
            if evicted != block_hash {
                tracing::debug!("译文缓存淘汰: {}", evicted);
                self.stats.evictions += 1;
            }
        }
        self.stats.total_entries = self.entries.len();
    }

    pub fn contains_key(&self, block_hash: &str) -> bool {
        self.entries.contains(block_hash)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats.total_entries = 0;
    }

    pub fn get_stats(&self) -> CacheStats {
        let mut result = self.stats.clone();
        result.total_entries = self.entries.len();
        result
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }
}

impl Default for TargetCache {
    fn default() -> Self {
        Self::new()
    }
}
