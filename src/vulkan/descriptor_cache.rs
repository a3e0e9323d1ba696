use ash::vk;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::DEFAULT_POOL_RATIOS;
use crate::vulkan::descriptor_builder::DescriptorBuilder;
use crate::vulkan::descriptor_layout::DescriptorLayoutCache;
use crate::vulkan::descriptor_pool::{DescriptorPoolDynamic, PoolRatio};
use crate::vulkan::DeviceBackend;
use crate::Result;

/// Generation counter for every descriptor set that references a dynamic shader buffer.
///
/// Shader buffers bump it when they reallocate; set caches compare it on every lookup.
#[derive(Debug, Clone, Default)]
pub struct CacheEpoch(Arc<AtomicU64>);

impl CacheEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Content hash -> descriptor set, valid for a single epoch.
pub struct DescriptorSetCache {
    sets: HashMap<u64, vk::DescriptorSet>,
    epoch: CacheEpoch,
    seen_epoch: u64,
}

impl DescriptorSetCache {
    pub fn new(epoch: CacheEpoch) -> Self {
        let seen_epoch = epoch.current();
        Self {
            sets: HashMap::new(),
            epoch,
            seen_epoch,
        }
    }

    /// Drops every cached set if the epoch moved since the last call. The pools behind them
    /// are retired under `frame` rather than reset, since earlier commands may still read them.
    pub fn sync_epoch(&mut self, pool: &mut DescriptorPoolDynamic, frame: usize) -> bool {
        let current = self.epoch.current();
        if current == self.seen_epoch {
            return false;
        }

        log::debug!(
            "Descriptor epoch {} -> {current}, dropping {} cached sets",
            self.seen_epoch,
            self.sets.len()
        );
        self.sets.clear();
        pool.retire(frame);
        self.seen_epoch = current;
        true
    }

    /// Returns the cached set for `hash`, or allocates one from `pool` and hands it to `init`
    /// before caching it. The flag is `true` when the set came from the cache.
    pub fn create_set<F>(
        &mut self,
        pool: &mut DescriptorPoolDynamic,
        frame: usize,
        layout: vk::DescriptorSetLayout,
        hash: u64,
        init: F,
    ) -> Result<(vk::DescriptorSet, bool)>
    where
        F: FnOnce(vk::DescriptorSet),
    {
        self.sync_epoch(pool, frame);

        if let Some(&set) = self.sets.get(&hash) {
            return Ok((set, true));
        }

        let set = pool.allocate(layout)?;
        init(set);
        self.sets.insert(hash, set);
        Ok((set, false))
    }

    pub fn clear(&mut self) {
        self.sets.clear();
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// A built set together with the layout it was allocated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltSet {
    pub set: vk::DescriptorSet,
    pub layout: vk::DescriptorSetLayout,
    pub cached: bool,
}

/// Layout cache, set cache and dynamic pool behind one entry point.
pub struct DescriptorCache {
    backend: Arc<dyn DeviceBackend>,
    layouts: DescriptorLayoutCache,
    sets: DescriptorSetCache,
    pool: DescriptorPoolDynamic,
    frame: usize,
}

impl DescriptorCache {
    pub fn new(
        backend: Arc<dyn DeviceBackend>,
        epoch: CacheEpoch,
        initial_sets: u32,
    ) -> Result<Self> {
        let mut pool = DescriptorPoolDynamic::new(Arc::clone(&backend));
        pool.set_sizes(initial_sets, &PoolRatio::from_table(&DEFAULT_POOL_RATIOS))?;

        Ok(Self {
            layouts: DescriptorLayoutCache::new(Arc::clone(&backend)),
            sets: DescriptorSetCache::new(epoch),
            pool,
            backend,
            frame: 0,
        })
    }

    /// Starts `frame`: pools retired the last time this slot was in use are reset.
    /// The slot's fence must already have been waited on.
    pub fn begin_frame(&mut self, frame: usize) -> Result<()> {
        self.frame = frame;
        self.pool.recycle(frame)?;
        Ok(())
    }

    pub fn layouts(&mut self) -> &mut DescriptorLayoutCache {
        &mut self.layouts
    }

    /// Layout + set for the resources collected in `builder`.
    pub fn build(&mut self, builder: &DescriptorBuilder) -> Result<BuiltSet> {
        let layout = self.layouts.create_layout(&builder.layout_key())?;
        let backend = Arc::clone(&self.backend);

        let (set, cached) = self.sets.create_set(
            &mut self.pool,
            self.frame,
            layout,
            builder.content_hash(),
            |set| builder.write_set(backend.as_ref(), set),
        )?;

        Ok(BuiltSet {
            set,
            layout,
            cached,
        })
    }

    pub fn cached_set_count(&self) -> usize {
        self.sets.len()
    }

    pub fn pool(&self) -> &DescriptorPoolDynamic {
        &self.pool
    }
}
