use std::collections::VecDeque;

use ash_forward::vulkan::swapchain::{
    acquire_with_rebuild, present_with_rebuild, AcquireOutcome, PresentOutcome, PresentationOps,
    MAX_ACQUIRE_ATTEMPTS,
};
use ash_forward::vulkan::FrameCounter;
use ash_forward::AshError;

/// Scripted surface: each acquire/present pops the next outcome.
#[derive(Default)]
struct ScriptedSurface {
    acquires: VecDeque<AcquireOutcome>,
    presents: VecDeque<PresentOutcome>,
    rebuilds: usize,
    acquire_calls: usize,
    fail_rebuild: bool,
}

impl ScriptedSurface {
    fn acquiring(outcomes: &[AcquireOutcome]) -> Self {
        Self {
            acquires: outcomes.iter().copied().collect(),
            ..Default::default()
        }
    }
}

impl PresentationOps for ScriptedSurface {
    fn acquire(&mut self, _frame: usize) -> ash_forward::Result<AcquireOutcome> {
        self.acquire_calls += 1;
        Ok(self.acquires.pop_front().unwrap_or(AcquireOutcome::OutOfDate))
    }

    fn present(&mut self, _frame: usize, _image_index: u32) -> ash_forward::Result<PresentOutcome> {
        Ok(self.presents.pop_front().unwrap_or(PresentOutcome::Presented))
    }

    fn rebuild(&mut self) -> ash_forward::Result<()> {
        if self.fail_rebuild {
            return Err(AshError::SwapchainCreationFailed("surface lost".into()));
        }
        self.rebuilds += 1;
        Ok(())
    }
}

#[test]
fn test_out_of_date_acquire_rebuilds_then_succeeds() {
    let mut surface = ScriptedSurface::acquiring(&[AcquireOutcome::OutOfDate, AcquireOutcome::Image(2)]);

    let image = acquire_with_rebuild(&mut surface, 0).unwrap();

    assert_eq!(image, Some(2));
    assert_eq!(surface.rebuilds, 1);
    assert_eq!(surface.acquire_calls, 2);
}

#[test]
fn test_first_try_does_not_rebuild() {
    let mut surface = ScriptedSurface::acquiring(&[AcquireOutcome::Image(0)]);
    assert_eq!(acquire_with_rebuild(&mut surface, 1).unwrap(), Some(0));
    assert_eq!(surface.rebuilds, 0);
}

#[test]
fn test_acquire_gives_up_and_skips_the_frame() {
    let mut surface = ScriptedSurface::default();

    let image = acquire_with_rebuild(&mut surface, 0).unwrap();

    assert_eq!(image, None);
    assert_eq!(surface.acquire_calls, MAX_ACQUIRE_ATTEMPTS);
    assert_eq!(surface.rebuilds, MAX_ACQUIRE_ATTEMPTS);
}

#[test]
fn test_failed_rebuild_is_an_error() {
    let mut surface = ScriptedSurface::acquiring(&[AcquireOutcome::OutOfDate]);
    surface.fail_rebuild = true;

    let err = acquire_with_rebuild(&mut surface, 0).unwrap_err();
    assert!(matches!(err, AshError::SwapchainCreationFailed(_)));
}

#[test]
fn test_stale_present_rebuilds() {
    let mut surface = ScriptedSurface {
        presents: [PresentOutcome::Stale, PresentOutcome::Presented].into_iter().collect(),
        ..Default::default()
    };

    assert!(present_with_rebuild(&mut surface, 0, 1).unwrap());
    assert_eq!(surface.rebuilds, 1);
    assert!(!present_with_rebuild(&mut surface, 1, 0).unwrap());
    assert_eq!(surface.rebuilds, 1);
}

#[test]
fn test_rebuild_keeps_the_frame_counter() {
    let mut counter = FrameCounter::new();
    counter.advance();
    counter.advance();
    let before = (counter.frame_number(), counter.index());

    let mut surface = ScriptedSurface::acquiring(&[AcquireOutcome::OutOfDate, AcquireOutcome::Image(1)]);
    acquire_with_rebuild(&mut surface, counter.index()).unwrap();

    assert_eq!((counter.frame_number(), counter.index()), before);
}
