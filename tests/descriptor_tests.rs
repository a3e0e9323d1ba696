mod common;

use ash::vk::{self, Handle};
use ash_forward::config::{DEFAULT_POOL_RATIOS, DESCRIPTOR_POOL_MAX_SETS};
use ash_forward::vulkan::render_target::colour_exit_layout;
use ash_forward::vulkan::texture::sampled_layout;
use ash_forward::vulkan::{
    BoundTexture, CacheEpoch, DescriptorBuilder, DescriptorCache, DescriptorLayoutCache,
    DescriptorLayoutKey, DescriptorPoolDynamic, DescriptorPoolStatic, ImageLayout, LayoutBinding,
    LayoutTracker, PoolRatio,
};
use ash_forward::AshError;
use common::MockDevice;

fn uniform_key(binding: u32) -> DescriptorLayoutKey {
    DescriptorLayoutKey::new(vec![LayoutBinding::new(
        binding,
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        vk::ShaderStageFlags::VERTEX,
    )])
}

fn buffer_info(raw: u64) -> vk::DescriptorBufferInfo {
    vk::DescriptorBufferInfo {
        buffer: vk::Buffer::from_raw(raw),
        offset: 0,
        range: 256,
    }
}

#[test]
fn test_layout_cache_is_idempotent() {
    let device = MockDevice::new();
    let mut cache = DescriptorLayoutCache::new(device.backend());

    let first = cache.create_layout(&uniform_key(0)).unwrap();
    let second = cache.create_layout(&uniform_key(0)).unwrap();
    assert_eq!(first, second);
    assert_eq!(device.state.lock().layouts_created, 1);

    let other = cache.create_layout(&uniform_key(1)).unwrap();
    assert_ne!(first, other);
    assert_eq!(cache.len(), 2);

    drop(cache);
    assert_eq!(device.state.lock().layouts_destroyed, 2);
}

#[test]
fn test_stage_flags_are_part_of_the_layout_key() {
    let device = MockDevice::new();
    let mut cache = DescriptorLayoutCache::new(device.backend());

    let vertex = cache.create_layout(&uniform_key(0)).unwrap();
    let fragment = cache
        .create_layout(&DescriptorLayoutKey::new(vec![LayoutBinding::new(
            0,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            vk::ShaderStageFlags::FRAGMENT,
        )]))
        .unwrap();
    assert_ne!(vertex, fragment);
}

#[test]
fn test_pool_rotates_when_exhausted() {
    let device = MockDevice::new();
    let mut pool = DescriptorPoolDynamic::new(device.backend());
    pool.set_sizes(4, &PoolRatio::from_table(&DEFAULT_POOL_RATIOS)).unwrap();
    let layout = vk::DescriptorSetLayout::from_raw(7);

    for _ in 0..4 {
        pool.allocate(layout).unwrap();
    }
    assert_eq!(device.state.lock().pool_sizes, vec![4]);

    // The fifth set no longer fits and lands in a fresh, larger pool.
    pool.allocate(layout).unwrap();
    let state = device.state.lock();
    assert_eq!(state.pool_sizes, vec![4, 8]);
    assert_eq!(state.sets_allocated, 5);
    drop(state);

    assert_eq!(pool.used_pool_count(), 1);
    assert_eq!(pool.free_pool_count(), 1);
    assert_eq!(pool.sets_per_pool(), 16);
}

#[test]
fn test_clear_recycles_every_pool() {
    let device = MockDevice::new();
    let mut pool = DescriptorPoolDynamic::new(device.backend());
    pool.set_sizes(2, &PoolRatio::from_table(&DEFAULT_POOL_RATIOS)).unwrap();
    let layout = vk::DescriptorSetLayout::from_raw(7);

    for _ in 0..3 {
        pool.allocate(layout).unwrap();
    }
    pool.clear().unwrap();

    assert_eq!(pool.used_pool_count(), 0);
    assert_eq!(pool.free_pool_count(), 2);
    assert_eq!(device.state.lock().pool_resets, 2);

    // Both pools are empty again, so no new pool is created.
    for _ in 0..3 {
        pool.allocate(layout).unwrap();
    }
    assert_eq!(device.state.lock().pool_sizes.len(), 2);

    drop(pool);
    assert_eq!(device.state.lock().pools_destroyed, 2);
}

#[test]
fn test_retired_pools_wait_for_their_frame_slot() {
    let device = MockDevice::new();
    let mut pool = DescriptorPoolDynamic::new(device.backend());
    pool.set_sizes(4, &PoolRatio::from_table(&DEFAULT_POOL_RATIOS)).unwrap();
    let layout = vk::DescriptorSetLayout::from_raw(7);

    pool.allocate(layout).unwrap();
    pool.retire(4);
    assert_eq!(pool.free_pool_count(), 0);
    assert_eq!(pool.retired_pool_count(1), 1);

    // Allocation after retirement never touches the retired pool.
    pool.allocate(layout).unwrap();
    assert_eq!(device.state.lock().pool_sizes.len(), 2);
    assert_eq!(pool.recycle(0).unwrap(), 0);
    assert_eq!(device.state.lock().pool_resets, 0);

    assert_eq!(pool.recycle(7).unwrap(), 1);
    assert_eq!(device.state.lock().pool_resets, 1);
    assert_eq!(pool.free_pool_count(), 2);

    pool.retire(2);
    drop(pool);
    assert_eq!(device.state.lock().pools_destroyed, 2);
}

#[test]
fn test_pool_growth_is_capped() {
    let device = MockDevice::new();
    let mut pool = DescriptorPoolDynamic::new(device.backend());
    pool.set_sizes(3000, &PoolRatio::from_table(&DEFAULT_POOL_RATIOS)).unwrap();
    assert_eq!(pool.sets_per_pool(), DESCRIPTOR_POOL_MAX_SETS);
}

#[test]
fn test_static_pool_never_grows() {
    let device = MockDevice::new();
    let pool = DescriptorPoolStatic::new(
        device.backend(),
        2,
        &PoolRatio::from_table(&DEFAULT_POOL_RATIOS),
        vk::DescriptorPoolCreateFlags::empty(),
    )
    .unwrap();
    let layout = vk::DescriptorSetLayout::from_raw(7);

    pool.allocate(layout).unwrap();
    pool.allocate(layout).unwrap();
    let err = pool.allocate(layout).unwrap_err();
    assert!(matches!(err, AshError::VulkanError(_)));
    assert_eq!(device.state.lock().pool_sizes, vec![2]);

    pool.clear().unwrap();
    pool.allocate(layout).unwrap();

    drop(pool);
    assert_eq!(device.state.lock().pools_destroyed, 1);
}

#[test]
fn test_set_cache_reuses_within_epoch() {
    let device = MockDevice::new();
    let epoch = CacheEpoch::new();
    let mut cache = DescriptorCache::new(device.backend(), epoch.clone(), 16).unwrap();

    let mut builder = DescriptorBuilder::new();
    builder.bind_buffer(
        0,
        buffer_info(0x55),
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        vk::ShaderStageFlags::VERTEX,
    );

    let first = cache.build(&builder).unwrap();
    let second = cache.build(&builder).unwrap();
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.set, second.set);
    assert_eq!(first.layout, second.layout);

    let state = device.state.lock();
    assert_eq!(state.sets_allocated, 1);
    assert_eq!(state.descriptor_writes, 1);
}

#[test]
fn test_different_resources_get_different_sets() {
    let device = MockDevice::new();
    let mut cache = DescriptorCache::new(device.backend(), CacheEpoch::new(), 16).unwrap();

    let mut a = DescriptorBuilder::new();
    a.bind_buffer(
        0,
        buffer_info(0x55),
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        vk::ShaderStageFlags::VERTEX,
    );
    let mut b = DescriptorBuilder::new();
    b.bind_buffer(
        0,
        buffer_info(0x66),
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        vk::ShaderStageFlags::VERTEX,
    );

    let set_a = cache.build(&a).unwrap();
    let set_b = cache.build(&b).unwrap();
    assert_ne!(set_a.set, set_b.set);
    assert_eq!(set_a.layout, set_b.layout);
    assert_eq!(cache.cached_set_count(), 2);
}

#[test]
fn test_epoch_bump_invalidates_cached_sets() {
    let device = MockDevice::new();
    let epoch = CacheEpoch::new();
    let mut cache = DescriptorCache::new(device.backend(), epoch.clone(), 16).unwrap();
    cache.begin_frame(0).unwrap();

    let mut builder = DescriptorBuilder::new();
    builder.bind_buffer(
        0,
        buffer_info(0x55),
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        vk::ShaderStageFlags::VERTEX,
    );
    cache.build(&builder).unwrap();
    assert_eq!(cache.cached_set_count(), 1);

    // A shader buffer reallocation bumps the shared epoch.
    epoch.bump();

    let rebuilt = cache.build(&builder).unwrap();
    assert!(!rebuilt.cached);
    assert_eq!(cache.cached_set_count(), 1);

    let state = device.state.lock();
    assert_eq!(state.sets_allocated, 2);
    // Layouts survive invalidation.
    assert_eq!(state.layouts_created, 1);
}

#[test]
fn test_epoch_bump_mid_frame_keeps_recorded_sets_alive() {
    let device = MockDevice::new();
    let epoch = CacheEpoch::new();
    let mut cache = DescriptorCache::new(device.backend(), epoch.clone(), 16).unwrap();
    cache.begin_frame(0).unwrap();

    let mut first = DescriptorBuilder::new();
    first.bind_buffer(
        0,
        buffer_info(0xA0),
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        vk::ShaderStageFlags::VERTEX,
    );
    let set_a = cache.build(&first).unwrap();

    epoch.bump();

    let mut second = DescriptorBuilder::new();
    second.bind_buffer(
        0,
        buffer_info(0xB0),
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        vk::ShaderStageFlags::VERTEX,
    );
    let set_b = cache.build(&second).unwrap();
    assert_ne!(set_a.set, set_b.set);

    {
        let state = device.state.lock();
        // Set A is already in this frame's command buffer: its pool must not be reset.
        assert_eq!(state.pool_resets, 0);
        // B came from a fresh, larger pool.
        assert_eq!(state.pool_sizes, vec![16, 32]);
    }
    assert_eq!(cache.pool().retired_pool_count(0), 1);

    // The other slots never saw the retired pool.
    cache.begin_frame(1).unwrap();
    cache.begin_frame(2).unwrap();
    assert_eq!(device.state.lock().pool_resets, 0);

    // Back on slot 0 the fence for the frame that used set A has been waited on.
    cache.begin_frame(0).unwrap();
    assert_eq!(device.state.lock().pool_resets, 1);
    assert_eq!(cache.pool().retired_pool_count(0), 0);
    assert_eq!(cache.pool().free_pool_count(), 2);
}

#[test]
fn test_offscreen_attachment_binds_once_its_pass_ends() {
    let device = MockDevice::new();
    let mut cache = DescriptorCache::new(device.backend(), CacheEpoch::new(), 16).unwrap();
    cache.begin_frame(0).unwrap();

    let mut colour = LayoutTracker::default();
    colour.transition(ImageLayout::ColourAttachment).unwrap();
    // Mid-pass the attachment cannot be sampled.
    assert!(sampled_layout(colour.layout(), false).is_err());

    colour.transition(colour_exit_layout(1)).unwrap();
    let mut depth = LayoutTracker::default();
    depth.transition(ImageLayout::DepthStencilAttachment).unwrap();
    depth.transition(ImageLayout::DepthStencilReadOnly).unwrap();

    let colour_bound = BoundTexture {
        view: vk::ImageView::from_raw(0x70),
        sampler: vk::Sampler::from_raw(0x71),
        layout: sampled_layout(colour.layout(), false).unwrap(),
    };
    let depth_bound = BoundTexture {
        view: vk::ImageView::from_raw(0x72),
        sampler: vk::Sampler::from_raw(0x71),
        layout: sampled_layout(depth.layout(), true).unwrap(),
    };
    assert_eq!(colour_bound.image_info().image_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(
        depth_bound.image_info().image_layout,
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
    );

    let mut builder = DescriptorBuilder::new();
    builder
        .bind_image(
            2,
            colour_bound.image_info(),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
        )
        .bind_image(
            3,
            depth_bound.image_info(),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
        );
    let built = cache.build(&builder).unwrap();
    assert!(!built.cached);
    assert_eq!(device.state.lock().descriptor_writes, 2);
}
