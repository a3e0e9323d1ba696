use ash_forward::config::{FRAMES_IN_FLIGHT, SHADER_BUFFER_FRAME_SIZE};
use ash_forward::vulkan::ShaderBufferRing;

const ALIGN: u64 = 256;

#[test]
fn test_oversized_push_doubles_exactly_once() {
    let mut ring = ShaderBufferRing::new(SHADER_BUFFER_FRAME_SIZE * FRAMES_IN_FLIGHT as u64, ALIGN);
    assert_eq!(ring.capacity(), 16 * 1024 * 3);

    let reservation = ring.reserve(0, 20 * 1024).unwrap();

    assert_eq!(reservation.grown_to, Some(32 * 1024 * 3));
    assert_eq!(ring.capacity(), 32 * 1024 * 3);
    assert!(reservation.offset + reservation.len <= ring.capacity());
    assert_eq!(ring.dynamic_offset(), reservation.offset);
}

#[test]
fn test_push_that_fits_does_not_grow() {
    let mut ring = ShaderBufferRing::new(48 * 1024, ALIGN);

    let first = ring.reserve(0, 100).unwrap();
    let second = ring.reserve(0, 100).unwrap();

    assert_eq!(first.grown_to, None);
    assert_eq!(first.offset, 0);
    assert_eq!(second.offset, ALIGN);
    assert_eq!(ring.usage(0), 2 * ALIGN);
}

#[test]
fn test_huge_push_grows_until_it_fits() {
    let mut ring = ShaderBufferRing::new(3 * 1024, ALIGN);

    let reservation = ring.reserve(1, 5 * 1024).unwrap();

    // Each frame may use a third of the buffer: 1K -> 2K -> 4K -> 8K per frame.
    assert_eq!(reservation.grown_to, Some(24 * 1024));
    assert!(ring.usage(1) <= ring.capacity() / FRAMES_IN_FLIGHT as u64);
}

#[test]
fn test_cursor_wraps_onto_released_space() {
    let mut ring = ShaderBufferRing::new(3 * 1024, ALIGN);

    for frame in 0..FRAMES_IN_FLIGHT {
        for _ in 0..3 {
            ring.reserve(frame, ALIGN).unwrap();
        }
    }
    assert_eq!(ring.cursor(), 2304);

    ring.reset_frame(0);
    let offsets: Vec<_> = (0..3)
        .map(|_| ring.reserve(0, ALIGN).unwrap())
        .map(|r| {
            assert_eq!(r.grown_to, None);
            r.offset
        })
        .collect();

    // 2816 + 256 reaches the end of the buffer, so the third push starts over at 0.
    assert_eq!(offsets, vec![2304, 2560, 0]);
    assert_eq!(ring.capacity(), 3 * 1024);
}

#[test]
fn test_wrap_counts_the_skipped_tail() {
    let mut ring = ShaderBufferRing::new(300, 1);
    assert_eq!(ring.reserve(0, 60).unwrap().offset, 0);
    assert_eq!(ring.reserve(1, 100).unwrap().offset, 60);
    assert_eq!(ring.reserve(2, 100).unwrap().offset, 160);

    ring.reset_frame(0);

    // 260 + 50 runs off the end: the push wraps and the 40 byte tail is charged to frame 0.
    let first = ring.reserve(0, 50).unwrap();
    assert_eq!(first.offset, 0);
    assert_eq!(first.grown_to, None);
    assert_eq!(ring.usage(0), 90);

    // Another 50 bytes at offset 50 would land inside frame 1's [60, 160).
    let second = ring.reserve(0, 50).unwrap();
    assert_eq!(second.grown_to, Some(600));
    assert!(ring.claimed_total() <= ring.capacity());
}

#[test]
fn test_claims_never_exceed_capacity() {
    let mut ring = ShaderBufferRing::new(4 * 1024, 64);
    let sizes = [48, 300, 1000, 64, 2048, 17, 700, 4096, 90];

    for (i, &len) in sizes.iter().cycle().take(60).enumerate() {
        let frame = (i / 4) % FRAMES_IN_FLIGHT;
        if i % 4 == 0 {
            ring.reset_frame(frame);
        }

        let reservation = ring.reserve(frame, len).unwrap();
        assert!(reservation.offset + len <= ring.capacity());
        assert!(ring.claimed_total() <= ring.capacity());
        assert!(ring.usage(frame) <= ring.capacity() / FRAMES_IN_FLIGHT as u64);
    }
}

#[test]
fn test_reset_releases_only_that_frame() {
    let mut ring = ShaderBufferRing::new(48 * 1024, ALIGN);
    ring.reserve(0, 512).unwrap();
    ring.reserve(1, 1024).unwrap();

    ring.reset_frame(0);

    assert_eq!(ring.usage(0), 0);
    assert_eq!(ring.usage(1), 1024);
    assert_eq!(ring.claimed_total(), 1024);
}
