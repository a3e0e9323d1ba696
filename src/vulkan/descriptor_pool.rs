use ash::vk;
use std::sync::Arc;

use crate::config::{DESCRIPTOR_POOL_GROWTH_FACTOR, DESCRIPTOR_POOL_MAX_SETS, FRAMES_IN_FLIGHT};
use crate::vulkan::DeviceBackend;
use crate::{AshError, Result};

/// Descriptors of one type to reserve per set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolRatio {
    pub descriptor_type: vk::DescriptorType,
    pub ratio: f32,
}

impl PoolRatio {
    pub fn from_table(table: &[(vk::DescriptorType, f32)]) -> Vec<PoolRatio> {
        table
            .iter()
            .map(|&(descriptor_type, ratio)| PoolRatio {
                descriptor_type,
                ratio,
            })
            .collect()
    }
}

/// Pool sizes for `set_count` sets: each type gets `ratio * set_count` descriptors (at least one).
pub fn pool_sizes(ratios: &[PoolRatio], set_count: u32) -> Vec<vk::DescriptorPoolSize> {
    ratios
        .iter()
        .map(|ratio| vk::DescriptorPoolSize {
            ty: ratio.descriptor_type,
            descriptor_count: ((ratio.ratio * set_count as f32) as u32).max(1),
        })
        .collect()
}

fn create_pool(
    backend: &dyn DeviceBackend,
    ratios: &[PoolRatio],
    set_count: u32,
    flags: vk::DescriptorPoolCreateFlags,
) -> Result<vk::DescriptorPool> {
    let sizes = pool_sizes(ratios, set_count);
    let create_info = vk::DescriptorPoolCreateInfo::default()
        .flags(flags)
        .max_sets(set_count)
        .pool_sizes(&sizes);

    backend.create_descriptor_pool(&create_info).map_err(|e| {
        log::error!("Failed to create descriptor pool ({set_count} sets): {e:?}");
        AshError::vk("vkCreateDescriptorPool", e)
    })
}

fn is_pool_exhausted(result: vk::Result) -> bool {
    matches!(
        result,
        vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL
    )
}

/// Single fixed-size pool for long-lived sets. Never grows.
pub struct DescriptorPoolStatic {
    backend: Arc<dyn DeviceBackend>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPoolStatic {
    pub fn new(
        backend: Arc<dyn DeviceBackend>,
        max_sets: u32,
        ratios: &[PoolRatio],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> Result<Self> {
        let pool = create_pool(backend.as_ref(), ratios, max_sets, flags)?;
        log::info!("Static descriptor pool created ({max_sets} sets)");
        Ok(Self {
            backend,
            pool,
            max_sets,
        })
    }

    pub fn allocate(&self, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        allocate_from(self.backend.as_ref(), self.pool, layout).map_err(|e| {
            log::error!("Static descriptor pool allocation failed: {e:?}");
            AshError::vk("vkAllocateDescriptorSets", e)
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.backend
            .reset_descriptor_pool(self.pool)
            .map_err(|e| AshError::vk("vkResetDescriptorPool", e))
    }

    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPoolStatic {
    fn drop(&mut self) {
        self.backend.destroy_descriptor_pool(self.pool);
    }
}

fn allocate_from(
    backend: &dyn DeviceBackend,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
) -> std::result::Result<vk::DescriptorSet, vk::Result> {
    let layouts = [layout];
    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(&layouts);

    backend
        .allocate_descriptor_sets(&alloc_info)?
        .into_iter()
        .next()
        .ok_or(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
}

/// Growable list of pools for transient sets.
///
/// Exhausted pools are parked in `used_pools`. [`DescriptorPoolDynamic::retire`] hands every
/// pool to a frame slot; [`DescriptorPoolDynamic::recycle`] resets them once that slot's fence
/// has been waited on. Each newly created pool is larger than the last, up to
/// [`DESCRIPTOR_POOL_MAX_SETS`].
pub struct DescriptorPoolDynamic {
    backend: Arc<dyn DeviceBackend>,
    ratios: Vec<PoolRatio>,
    free_pools: Vec<vk::DescriptorPool>,
    used_pools: Vec<vk::DescriptorPool>,
    retired: [Vec<vk::DescriptorPool>; FRAMES_IN_FLIGHT],
    sets_per_pool: u32,
}

impl DescriptorPoolDynamic {
    pub fn new(backend: Arc<dyn DeviceBackend>) -> Self {
        Self {
            backend,
            ratios: Vec::new(),
            free_pools: Vec::new(),
            used_pools: Vec::new(),
            retired: Default::default(),
            sets_per_pool: 0,
        }
    }

    /// Creates the first pool with room for `initial_sets` sets.
    pub fn set_sizes(&mut self, initial_sets: u32, ratios: &[PoolRatio]) -> Result<()> {
        self.ratios = ratios.to_vec();
        let pool = create_pool(
            self.backend.as_ref(),
            &self.ratios,
            initial_sets.max(1),
            vk::DescriptorPoolCreateFlags::empty(),
        )?;
        self.free_pools.push(pool);
        self.sets_per_pool = (initial_sets.max(1) * DESCRIPTOR_POOL_GROWTH_FACTOR)
            .min(DESCRIPTOR_POOL_MAX_SETS);
        log::info!("Dynamic descriptor pool initialised ({initial_sets} sets)");
        Ok(())
    }

    pub fn allocate(&mut self, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        let mut pool = self.fetch_pool()?;

        let set = match allocate_from(self.backend.as_ref(), pool, layout) {
            Ok(set) => set,
            Err(result) if is_pool_exhausted(result) => {
                log::warn!("Descriptor pool exhausted ({result:?}), rotating to a fresh pool");
                self.used_pools.push(pool);
                pool = self.fetch_pool()?;

                allocate_from(self.backend.as_ref(), pool, layout).map_err(|e| {
                    log::error!("Descriptor set allocation failed after pool rotation: {e:?}");
                    self.used_pools.push(pool);
                    AshError::vk("vkAllocateDescriptorSets", e)
                })?
            }
            Err(e) => {
                log::error!("Descriptor set allocation failed: {e:?}");
                self.free_pools.push(pool);
                return Err(AshError::vk("vkAllocateDescriptorSets", e));
            }
        };

        self.free_pools.push(pool);
        Ok(set)
    }

    /// Resets every pool, retired ones included, and makes all of them available again.
    /// Nothing is destroyed. Only valid while the device is idle.
    pub fn clear(&mut self) -> Result<()> {
        for slot in &mut self.retired {
            self.used_pools.append(slot);
        }
        for &pool in self.free_pools.iter().chain(self.used_pools.iter()) {
            self.backend
                .reset_descriptor_pool(pool)
                .map_err(|e| AshError::vk("vkResetDescriptorPool", e))?;
        }

        self.free_pools.append(&mut self.used_pools);
        log::debug!("Dynamic descriptor pools reset ({} pools)", self.free_pools.len());
        Ok(())
    }

    /// Parks every live pool under `frame`'s slot. Sets allocated so far stay valid until
    /// [`DescriptorPoolDynamic::recycle`] runs for the same slot; new allocations come from
    /// fresh pools.
    pub fn retire(&mut self, frame: usize) {
        let slot = &mut self.retired[frame % FRAMES_IN_FLIGHT];
        slot.append(&mut self.free_pools);
        slot.append(&mut self.used_pools);
        log::debug!(
            "Retired {} descriptor pools to frame slot {}",
            slot.len(),
            frame % FRAMES_IN_FLIGHT
        );
    }

    /// Resets the pools retired under `frame`'s slot. Call only after that slot's fence wait.
    pub fn recycle(&mut self, frame: usize) -> Result<usize> {
        let index = frame % FRAMES_IN_FLIGHT;
        let count = self.retired[index].len();
        while let Some(pool) = self.retired[index].pop() {
            if let Err(e) = self.backend.reset_descriptor_pool(pool) {
                self.retired[index].push(pool);
                return Err(AshError::vk("vkResetDescriptorPool", e));
            }
            self.free_pools.push(pool);
        }

        if count > 0 {
            log::debug!("Recycled {count} descriptor pools from frame slot {index}");
        }
        Ok(count)
    }

    pub fn retired_pool_count(&self, frame: usize) -> usize {
        self.retired[frame % FRAMES_IN_FLIGHT].len()
    }

    pub fn sets_per_pool(&self) -> u32 {
        self.sets_per_pool
    }

    pub fn free_pool_count(&self) -> usize {
        self.free_pools.len()
    }

    pub fn used_pool_count(&self) -> usize {
        self.used_pools.len()
    }

    fn fetch_pool(&mut self) -> Result<vk::DescriptorPool> {
        if let Some(pool) = self.free_pools.pop() {
            return Ok(pool);
        }

        let pool = create_pool(
            self.backend.as_ref(),
            &self.ratios,
            self.sets_per_pool.max(1),
            vk::DescriptorPoolCreateFlags::empty(),
        )?;
        log::info!("Created descriptor pool with {} sets", self.sets_per_pool);

        self.sets_per_pool = (self.sets_per_pool * DESCRIPTOR_POOL_GROWTH_FACTOR)
            .clamp(1, DESCRIPTOR_POOL_MAX_SETS);
        Ok(pool)
    }
}

impl Drop for DescriptorPoolDynamic {
    fn drop(&mut self) {
        let retired = self.retired.iter_mut().flat_map(|slot| slot.drain(..));
        for pool in self
            .free_pools
            .drain(..)
            .chain(self.used_pools.drain(..))
            .chain(retired)
        {
            self.backend.destroy_descriptor_pool(pool);
        }
    }
}
