use ash::vk::{self, Handle};
use ash_forward::vulkan::{DescriptorBuilder, ShaderBufferRing};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

fn bench_ring_reserve(c: &mut Criterion) {
    let mut group = c.benchmark_group("shader_buffer_ring");

    for &pushes in &[64usize, 512, 4096] {
        group.bench_with_input(BenchmarkId::new("reserve_frame", pushes), &pushes, |b, &pushes| {
            let mut ring = ShaderBufferRing::new(16 * 1024 * 1024, 256);
            let mut frame = 0;

            b.iter(|| {
                ring.reset_frame(frame);
                for _ in 0..pushes {
                    black_box(ring.reserve(frame, 128));
                }
                frame = (frame + 1) % 3;
            })
        });
    }

    group.finish();
}

fn bench_descriptor_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("descriptor_builder");

    for &bindings in &[2u32, 8, 16] {
        let mut builder = DescriptorBuilder::new();
        for binding in 0..bindings {
            if binding < 2 {
                builder.bind_buffer(
                    binding,
                    vk::DescriptorBufferInfo {
                        buffer: vk::Buffer::from_raw(0x100 + binding as u64),
                        offset: 0,
                        range: 256,
                    },
                    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                    vk::ShaderStageFlags::ALL_GRAPHICS,
                );
            } else {
                builder.bind_image(
                    binding,
                    vk::DescriptorImageInfo {
                        sampler: vk::Sampler::from_raw(0x200),
                        image_view: vk::ImageView::from_raw(0x300 + binding as u64),
                        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    },
                    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    vk::ShaderStageFlags::FRAGMENT,
                );
            }
        }

        group.bench_with_input(BenchmarkId::new("content_hash", bindings), &builder, |b, builder| {
            b.iter(|| black_box(builder.content_hash()))
        });
        group.bench_with_input(BenchmarkId::new("layout_key", bindings), &builder, |b, builder| {
            b.iter(|| black_box(builder.layout_key()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ring_reserve, bench_descriptor_hash);
criterion_main!(benches);
