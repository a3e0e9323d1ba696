//! Deferred destruction of GPU objects that may still be referenced by in-flight frames.
//!
//! A resource retired while recording frame slot `n` is pushed onto slot `n`'s queue. The queue
//! is flushed right after that slot's fence is waited, i.e. once the GPU can no longer touch it.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::config::FRAMES_IN_FLIGHT;

type Deletor = Box<dyn FnOnce() + Send>;

/// LIFO queue of cleanup closures.
pub struct DeletionQueue {
    deletors: Mutex<VecDeque<Deletor>>,
    name: &'static str,
}

impl std::fmt::Debug for DeletionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionQueue")
            .field("name", &self.name)
            .field("count", &self.len())
            .finish()
    }
}

impl DeletionQueue {
    pub fn new(name: &'static str) -> Self {
        Self {
            deletors: Mutex::new(VecDeque::new()),
            name,
        }
    }

    pub fn push<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut deletors = self.deletors.lock();
        deletors.push_back(Box::new(f));
        log::trace!("Deferred deletion queued on '{}' ({} pending)", self.name, deletors.len());
    }

    /// Runs every pending deletor, newest first.
    pub fn flush(&self) {
        let pending: Vec<Deletor> = self.deletors.lock().drain(..).rev().collect();
        if pending.is_empty() {
            return;
        }

        log::debug!("Flushing {} deferred deletions from '{}'", pending.len(), self.name);
        for deletor in pending {
            deletor();
        }
    }

    pub fn len(&self) -> usize {
        self.deletors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.deletors.lock().is_empty()
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        let count = self.len();
        if count > 0 {
            log::warn!(
                "Dropping deletion queue '{}' with {count} pending operations, flushing",
                self.name
            );
            self.flush();
        }
    }
}

/// One [`DeletionQueue`] per frame slot.
#[derive(Debug)]
pub struct FrameDeletionQueues {
    slots: [DeletionQueue; FRAMES_IN_FLIGHT],
}

impl Default for FrameDeletionQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDeletionQueues {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| DeletionQueue::new("frame_slot")),
        }
    }

    pub fn defer<F>(&self, frame: usize, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.slots[frame % FRAMES_IN_FLIGHT].push(f);
    }

    /// Call after waiting `frame`'s fence.
    pub fn flush(&self, frame: usize) {
        self.slots[frame % FRAMES_IN_FLIGHT].flush();
    }

    /// Call after the device is idle.
    pub fn flush_all(&self) {
        for slot in &self.slots {
            slot.flush();
        }
    }

    pub fn pending(&self) -> usize {
        self.slots.iter().map(DeletionQueue::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_deletion_queue_lifo() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let queue = DeletionQueue::new("test_lifo");

        for i in 1..=3 {
            let order = Arc::clone(&order);
            queue.push(move || order.lock().push(i));
        }

        queue.flush();
        assert_eq!(*order.lock(), vec![3, 2, 1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_frame_slots_flush_independently() {
        let counter = Arc::new(AtomicU32::new(0));
        let queues = FrameDeletionQueues::new();

        for frame in 0..FRAMES_IN_FLIGHT {
            let c = Arc::clone(&counter);
            queues.defer(frame, move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }

        queues.flush(1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(queues.pending(), FRAMES_IN_FLIGHT - 1);

        queues.flush_all();
        assert_eq!(counter.load(Ordering::SeqCst), FRAMES_IN_FLIGHT as u32);
    }

    #[test]
    fn test_drop_flushes() {
        let counter = Arc::new(AtomicU32::new(0));
        {
            let queue = DeletionQueue::new("test_drop");
            let c = Arc::clone(&counter);
            queue.push(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
