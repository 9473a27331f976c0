use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::debug;

use crate::block::TranslationBlock;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

/// Translated blocks keyed by start PC (word address).
pub struct BlockCache {
    lru: LruCache<u32, TranslationBlock>,
    stats: BlockCacheStats,
}

impl BlockCache {
    /// A zero capacity is treated as one block.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            lru: LruCache::new(capacity),
            stats: BlockCacheStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }

    pub fn stats(&self) -> BlockCacheStats {
        self.stats
    }

    pub fn contains(&self, pc: u32) -> bool {
        self.lru.contains(&pc)
    }

    /// Looks a block up without touching recency or counters.
    pub fn peek(&self, pc: u32) -> Option<&TranslationBlock> {
        self.lru.peek(&pc)
    }

    pub fn get(&mut self, pc: u32) -> Option<&TranslationBlock> {
        match self.lru.get(&pc) {
            Some(block) => {
                self.stats.hits += 1;
                Some(block)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, block: TranslationBlock) {
        let pc = block.start;
        if let Some((old_pc, _)) = self.lru.push(pc, block) {
            if old_pc != pc {
                self.stats.evictions += 1;
                debug!(pc = old_pc, "evicted block");
            }
        }
    }

    /// Drops every block sharing a word with `[start, end)`. Returns how many
    /// were dropped.
    pub fn invalidate_range(&mut self, start: u32, end: u32) -> usize {
        let stale: Vec<u32> = self
            .lru
            .iter()
            .filter(|(_, block)| block.overlaps(start, end))
            .map(|(pc, _)| *pc)
            .collect();
        for pc in &stale {
            self.lru.pop(pc);
        }
        if !stale.is_empty() {
            self.stats.invalidations += stale.len() as u64;
            debug!(start, end, count = stale.len(), "invalidated blocks");
        }
        stale.len()
    }

    pub fn flush(&mut self) {
        if !self.lru.is_empty() {
            debug!(count = self.lru.len(), "flushed block cache");
        }
        self.stats.invalidations += self.lru.len() as u64;
        self.lru.clear();
    }
}

#[cfg(test)]
mod tests {
    use avr_cpu_core::Features;

    use super::*;
    use crate::ir::{IrBlock, IrTerminator};

    fn block(start: u32, end: u32) -> TranslationBlock {
        TranslationBlock {
            start,
            end,
            icount: end - start,
            features: Features::empty(),
            ir: IrBlock {
                entry_pc: start,
                insts: Vec::new(),
                terminator: IrTerminator::Jump { target: end },
                value_count: 0,
            },
        }
    }

    #[test]
    fn least_recently_used_block_is_evicted() {
        let mut cache = BlockCache::new(2);
        cache.insert(block(0, 4));
        cache.insert(block(4, 8));
        assert!(cache.get(0).is_some());
        cache.insert(block(8, 12));

        assert!(cache.contains(0));
        assert!(!cache.contains(4));
        assert!(cache.contains(8));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn reinserting_a_pc_replaces_without_evicting() {
        let mut cache = BlockCache::new(2);
        cache.insert(block(0, 4));
        cache.insert(block(0, 2));
        assert_eq!(cache.get(0).map(|b| b.end), Some(2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn invalidation_drops_only_overlapping_blocks() {
        let mut cache = BlockCache::new(8);
        cache.insert(block(0, 4));
        cache.insert(block(4, 8));
        cache.insert(block(6, 10));
        cache.insert(block(10, 12));

        assert_eq!(cache.invalidate_range(7, 8), 2);
        assert!(cache.contains(0));
        assert!(!cache.contains(4));
        assert!(!cache.contains(6));
        assert!(cache.contains(10));
        assert_eq!(cache.invalidate_range(100, 200), 0);
    }

    #[test]
    fn hits_and_misses_are_counted() {
        let mut cache = BlockCache::new(0);
        assert!(cache.get(0).is_none());
        cache.insert(block(0, 1));
        assert!(cache.get(0).is_some());
        cache.flush();
        assert!(cache.is_empty());
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.invalidations), (1, 1, 1));
    }
}
