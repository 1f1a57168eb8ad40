use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use anyhow::anyhow;
use log::trace;
use lru::LruCache;
use pos_common::{
    crypto::Hash,
    kernel::{compute_stake_modifier, StakeModifier, GENESIS_STAKE_MODIFIER},
    tokio::sync::RwLock,
};

use crate::{
    chain::{BlockHeader, ChainSource},
    config::STAKE_MODIFIER_CACHE_SIZE,
    error::StakingError,
};

/// Cache of stake modifiers by block hash.
///
/// A modifier depends on its whole ancestry, so a miss walks back through the
/// parents until a cached block (or genesis) and fills the cache forward.
#[derive(Clone)]
pub struct StakeModifierCache {
    cache: Arc<RwLock<LruCache<Hash, StakeModifier>>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl StakeModifierCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(RwLock::new(LruCache::new(capacity))),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    async fn cached(&self, hash: &Hash) -> Option<StakeModifier> {
        let mut cache = self.cache.write().await;
        cache.get(hash).copied()
    }

    pub async fn get_modifier<C: ChainSource + ?Sized>(
        &self,
        chain: &C,
        block: &Hash,
    ) -> Result<StakeModifier, StakingError> {
        if let Some(modifier) = self.cached(block).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(modifier);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // Collect the uncached ancestry, newest first
        let mut path: Vec<BlockHeader> = Vec::new();
        let mut current = *block;
        let mut modifier = loop {
            if let Some(modifier) = self.cached(&current).await {
                break modifier;
            }

            let header = chain
                .block_header(&current)
                .await?
                .ok_or_else(|| anyhow!("Block {} not found", current))?;

            match header.parent {
                Some(parent) => {
                    current = parent;
                    path.push(header);
                }
                None => {
                    self.put(header.hash, GENESIS_STAKE_MODIFIER).await;
                    break GENESIS_STAKE_MODIFIER;
                }
            }
        };

        if log::log_enabled!(log::Level::Trace) {
            trace!("computing {} stake modifiers up to {}", path.len(), block);
        }

        for header in path.iter().rev() {
            modifier = compute_stake_modifier(modifier, &header.entropy);
            self.put(header.hash, modifier).await;
        }

        Ok(modifier)
    }

    pub async fn put(&self, hash: Hash, modifier: StakeModifier) {
        let mut cache = self.cache.write().await;
        cache.put(hash, modifier);
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    pub fn get_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn get_misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Default for StakeModifierCache {
    fn default() -> Self {
        Self::new(STAKE_MODIFIER_CACHE_SIZE)
    }
}
