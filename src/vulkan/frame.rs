use crate::config::FRAMES_IN_FLIGHT;

/// Monotonic frame number and the slot it maps to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounter {
    frame_number: u64,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for per-frame resources: `frame_number % FRAMES_IN_FLIGHT`.
    pub fn index(&self) -> usize {
        (self.frame_number % FRAMES_IN_FLIGHT as u64) as usize
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn advance(&mut self) -> usize {
        self.frame_number += 1;
        self.index()
    }
}
