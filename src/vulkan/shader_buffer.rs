//! Auto-growing uniform/storage buffers for per-draw shader parameters.
//!
//! Each push lands at a fresh offset that is returned as the dynamic offset for the draw. The
//! buffer is shared by every frame in flight; each slot's usage is tracked separately and reset
//! once that slot's fence has been waited.

use ash::vk;
use std::sync::Arc;

use crate::config::FRAMES_IN_FLIGHT;
use crate::vulkan::{Allocator, CacheEpoch, FrameDeletionQueues, GpuBuffer, Residency, Uploader};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderBufferKind {
    Uniform,
    Storage,
}

impl ShaderBufferKind {
    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            ShaderBufferKind::Uniform => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            ShaderBufferKind::Storage => vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
        }
    }

    pub fn residency(self) -> Residency {
        match self {
            ShaderBufferKind::Uniform => Residency::HostVisible,
            ShaderBufferKind::Storage => Residency::DeviceLocal,
        }
    }

    fn usage(self) -> vk::BufferUsageFlags {
        let base = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;
        match self {
            ShaderBufferKind::Uniform => base | vk::BufferUsageFlags::UNIFORM_BUFFER,
            ShaderBufferKind::Storage => base | vk::BufferUsageFlags::STORAGE_BUFFER,
        }
    }

    fn label(self) -> &'static str {
        match self {
            ShaderBufferKind::Uniform => "ubo",
            ShaderBufferKind::Storage => "ssbo",
        }
    }
}

/// Where a push landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub offset: u64,
    pub len: u64,
    /// New capacity when the push forced the buffer to grow.
    pub grown_to: Option<u64>,
}

pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Offset bookkeeping for a dynamic shader buffer, independent of any GPU memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBufferRing {
    capacity: u64,
    cursor: u64,
    dynamic_offset: u64,
    alignment: u64,
    usage: [u64; FRAMES_IN_FLIGHT],
}

impl ShaderBufferRing {
    pub fn new(capacity: u64, alignment: u64) -> Self {
        Self {
            capacity: capacity.max(1),
            cursor: 0,
            dynamic_offset: 0,
            alignment: alignment.max(1),
            usage: [0; FRAMES_IN_FLIGHT],
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn dynamic_offset(&self) -> u64 {
        self.dynamic_offset
    }

    pub fn usage(&self, frame: usize) -> u64 {
        self.usage[frame % FRAMES_IN_FLIGHT]
    }

    pub fn claimed_total(&self) -> u64 {
        self.usage.iter().sum()
    }

    fn needs_growth(&self, frame: usize, len: u64) -> bool {
        let frame_share = self.capacity / FRAMES_IN_FLIGHT as u64;
        self.claimed_total() + len > self.capacity || self.usage[frame] + len > frame_share
    }

    /// Claims `len` bytes for `frame`. Empty pushes claim nothing and return `None`.
    /// A wrap charges the skipped tail to `frame`, so the claimed total covers every byte
    /// between the oldest live frame and the cursor.
    pub fn reserve(&mut self, frame: usize, len: u64) -> Option<Reservation> {
        if len == 0 {
            return None;
        }

        let frame = frame % FRAMES_IN_FLIGHT;
        let advance = align_up(len, self.alignment);
        let mut grown_to = None;

        loop {
            if self.needs_growth(frame, advance) {
                self.capacity *= 2;
                self.cursor = 0;
                grown_to = Some(self.capacity);
                continue;
            }
            if self.cursor + len < self.capacity {
                break;
            }

            // Wrapping gives up the tail of the buffer, so it counts against this frame.
            let tail = self.capacity.saturating_sub(self.cursor);
            if self.needs_growth(frame, tail + advance) {
                self.capacity *= 2;
                self.cursor = 0;
                grown_to = Some(self.capacity);
                continue;
            }
            self.usage[frame] += tail;
            self.cursor = 0;
            break;
        }

        let offset = self.cursor;
        self.dynamic_offset = offset;
        self.cursor += advance;
        self.usage[frame] += advance;

        Some(Reservation {
            offset,
            len,
            grown_to,
        })
    }

    pub fn reset_frame(&mut self, frame: usize) {
        self.usage[frame % FRAMES_IN_FLIGHT] = 0;
    }
}

/// GPU side of a dynamic shader buffer.
pub struct DynamicShaderBuffer {
    kind: ShaderBufferKind,
    ring: ShaderBufferRing,
    buffer: GpuBuffer,
    last_range: u64,
    allocator: Arc<Allocator>,
    uploader: Arc<Uploader>,
    epoch: CacheEpoch,
    deletions: Arc<FrameDeletionQueues>,
}

impl DynamicShaderBuffer {
    pub fn new(
        kind: ShaderBufferKind,
        initial_size: u64,
        alignment: u64,
        allocator: Arc<Allocator>,
        uploader: Arc<Uploader>,
        epoch: CacheEpoch,
        deletions: Arc<FrameDeletionQueues>,
    ) -> Result<Self> {
        let ring = ShaderBufferRing::new(initial_size, alignment);
        let buffer = Self::allocate(kind, &allocator, ring.capacity())?;
        log::info!("Allocated {} with size {}", kind.label(), ring.capacity());

        Ok(Self {
            kind,
            ring,
            buffer,
            last_range: 0,
            allocator,
            uploader,
            epoch,
            deletions,
        })
    }

    fn allocate(kind: ShaderBufferKind, allocator: &Arc<Allocator>, size: u64) -> Result<GpuBuffer> {
        GpuBuffer::new(
            Arc::clone(allocator),
            size,
            kind.usage(),
            kind.residency(),
            Some(kind.label()),
        )
    }

    /// Writes `data` for `frame` and returns the dynamic offset it landed at.
    ///
    /// If the push grew the buffer, every cached descriptor set is invalidated and callers must
    /// rebuild their sets before binding.
    pub fn push_data(&mut self, frame: usize, data: &[u8]) -> Result<Option<u32>> {
        let Some(reservation) = self.ring.reserve(frame, data.len() as u64) else {
            return Ok(None);
        };

        if let Some(capacity) = reservation.grown_to {
            self.reallocate(frame, capacity)?;
        }

        self.buffer
            .upload(&self.uploader, data, reservation.offset)?;
        self.last_range = reservation.len;

        Ok(Some(reservation.offset as u32))
    }

    fn reallocate(&mut self, frame: usize, capacity: u64) -> Result<()> {
        let replacement = Self::allocate(self.kind, &self.allocator, capacity)?;
        let old = std::mem::replace(&mut self.buffer, replacement);
        old.copy_to(&self.uploader, &self.buffer, old.size(), 0)?;

        self.deletions.defer(frame, move || drop(old));
        let epoch = self.epoch.bump();
        log::info!(
            "Reallocated {} with size {capacity} (descriptor epoch {epoch})",
            self.kind.label()
        );
        Ok(())
    }

    pub fn reset_frame(&mut self, frame: usize) {
        self.ring.reset_frame(frame);
    }

    pub fn kind(&self) -> ShaderBufferKind {
        self.kind
    }

    pub fn descriptor_type(&self) -> vk::DescriptorType {
        self.kind.descriptor_type()
    }

    /// Buffer info covering the most recent push.
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        self.buffer.descriptor_info(self.last_range.max(1))
    }

    pub fn dynamic_offset(&self) -> u32 {
        self.ring.dynamic_offset() as u32
    }

    pub fn capacity(&self) -> u64 {
        self.ring.capacity()
    }

    pub fn ring(&self) -> &ShaderBufferRing {
        &self.ring
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(300, 1), 300);
    }

    #[test]
    fn test_empty_push_is_noop() {
        let mut ring = ShaderBufferRing::new(1024, 16);
        assert!(ring.reserve(0, 0).is_none());
        assert_eq!(ring.cursor(), 0);
        assert_eq!(ring.claimed_total(), 0);
    }

    #[test]
    fn test_kind_descriptor_types() {
        assert_eq!(
            ShaderBufferKind::Uniform.descriptor_type(),
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        );
        assert_eq!(ShaderBufferKind::Storage.residency(), Residency::DeviceLocal);
    }
}
