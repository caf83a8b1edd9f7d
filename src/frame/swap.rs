use bytemuck::{Pod, Zeroable};
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::ops::{Deref, DerefMut};

/// One interleaved RGB pixel, layout-compatible with 3 bytes of a frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Zero,
    One,
}

impl Slot {
    fn index(self) -> usize {
        match self {
            Self::Zero => 0,
            Self::One => 1,
        }
    }

    fn other(self) -> Self {
        match self {
            Self::Zero => Self::One,
            Self::One => Self::Zero,
        }
    }
}

/// Storage for one of the two RGB frames.
#[derive(Default)]
struct FrameSlot {
    data: Vec<u8>,
    width: u32,
    height: u32,
    sequence: u64,
}

struct SwapState {
    front: Slot,
    /// Set by `publish`, cleared by `poll_once`.
    frame_arrived: bool,
    /// Result of the last `poll_once`.
    is_new: bool,
    /// Wrapping count of published frames.
    sequence: u64,
    /// Dimensions both slots are allocated for.
    width: u32,
    height: u32,
}

/// Outcome of a `publish` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Published {
    pub sequence: u64,
    /// The previously published frame was never polled and is now lost.
    pub overwrote_unpolled: bool,
}

/// Double-buffered RGB frame handoff between one producer and any number of
/// polling readers.
///
/// The producer fills the back slot through [`FrameSwap::back_buffer`] and
/// hands it over with [`FrameSwap::publish`], which only flips the front index
/// under the state lock. Readers hold a shared lock on the front slot for as
/// long as they keep a [`FrontFrame`], so a slot is never rewritten while it
/// is being read. The producer never waits for a reader: if the back slot is
/// still being read, `back_buffer` returns `None` and the frame is skipped.
///
/// Lock order is writer, state, slot. Slot write locks are never awaited
/// while the state lock or the other slot is held. A reader must not keep a
/// `FrontFrame` alive across a `reallocate` on the same thread.
pub struct FrameSwap {
    slots: [RwLock<FrameSlot>; 2],
    state: Mutex<SwapState>,
    writer: Mutex<()>,
}

impl FrameSwap {
    /// Create a swap with both slots empty (0x0).
    pub fn new() -> Self {
        Self {
            slots: [
                RwLock::new(FrameSlot::default()),
                RwLock::new(FrameSlot::default()),
            ],
            state: Mutex::new(SwapState {
                front: Slot::Zero,
                frame_arrived: false,
                is_new: false,
                sequence: 0,
                width: 0,
                height: 0,
            }),
            writer: Mutex::new(()),
        }
    }

    /// Create a swap with both slots allocated for `width` x `height`.
    pub fn with_size(width: u32, height: u32) -> Self {
        let swap = Self::new();
        swap.reallocate(width, height);
        swap
    }

    /// Resize both slots to `width * height * 3` zeroed bytes and clear the
    /// new-frame flags. Waits for an in-flight producer and for open readers.
    pub fn reallocate(&self, width: u32, height: u32) {
        let len = width as usize * height as usize * 3;
        let _writer = self.writer.lock();
        {
            let mut state = self.state.lock();
            state.frame_arrived = false;
            state.is_new = false;
            state.width = width;
            state.height = height;
        }
        let [mut first, mut second] = self.write_both();
        for slot in [&mut *first, &mut *second] {
            slot.data.clear();
            slot.data.resize(len, 0);
            slot.width = width;
            slot.height = height;
            slot.sequence = 0;
        }
    }

    /// Free both slots' memory.
    pub fn release(&self) {
        let _writer = self.writer.lock();
        {
            let mut state = self.state.lock();
            state.front = Slot::Zero;
            state.frame_arrived = false;
            state.is_new = false;
            state.sequence = 0;
            state.width = 0;
            state.height = 0;
        }
        let [mut first, mut second] = self.write_both();
        *first = FrameSlot::default();
        *second = FrameSlot::default();
    }

    /// Write-lock both slots without ever blocking while holding one of them.
    fn write_both(&self) -> [RwLockWriteGuard<'_, FrameSlot>; 2] {
        let [zero, one] = &self.slots;
        loop {
            let first = zero.write();
            if let Some(second) = one.try_write() {
                return [first, second];
            }
            drop(first);
            // Wait for the reader of slot one to finish, then retry from the top
            drop(one.write());
        }
    }

    /// Lock the back slot for writing, or `None` while a reader still holds
    /// it. Producers are serialised.
    pub fn back_buffer(&self) -> Option<BackBuffer<'_>> {
        let writer = self.writer.lock();
        // front only changes in publish, which needs the writer lock we hold
        let (back, next_sequence) = {
            let state = self.state.lock();
            (state.front.other(), state.sequence.wrapping_add(1))
        };
        let slot = self.slots[back.index()].try_write()?;
        Some(BackBuffer {
            slot,
            next_sequence,
            writer,
        })
    }

    /// Make the filled back slot the new front and raise the new-frame flag.
    pub fn publish(&self, back: BackBuffer<'_>) -> Published {
        let BackBuffer {
            mut slot,
            next_sequence,
            writer,
        } = back;
        slot.sequence = next_sequence;
        drop(slot);

        let published = {
            let mut state = self.state.lock();
            state.front = state.front.other();
            let overwrote_unpolled = state.frame_arrived;
            state.frame_arrived = true;
            state.sequence = next_sequence;
            Published {
                sequence: next_sequence,
                overwrote_unpolled,
            }
        };
        drop(writer);
        published
    }

    /// Consume the new-frame flag. Call exactly once per consumer cycle.
    pub fn poll_once(&self) -> bool {
        let mut state = self.state.lock();
        state.is_new = std::mem::take(&mut state.frame_arrived);
        state.is_new
    }

    /// Whether the last `poll_once` saw a newly published frame.
    pub fn is_frame_new(&self) -> bool {
        self.state.lock().is_new
    }

    /// Read access to the current front frame.
    pub fn front(&self) -> FrontFrame<'_> {
        let state = self.state.lock();
        let slot = self.slots[state.front.index()].read_recursive();
        FrontFrame { slot }
    }

    /// `poll_once` and `front` under a single acquisition of the state lock.
    pub fn poll_and_acquire(&self) -> (bool, FrontFrame<'_>) {
        let mut state = self.state.lock();
        state.is_new = std::mem::take(&mut state.frame_arrived);
        let slot = self.slots[state.front.index()].read_recursive();
        (state.is_new, FrontFrame { slot })
    }

    /// Number of frames published so far (wrapping).
    pub fn sequence(&self) -> u64 {
        self.state.lock().sequence
    }

    /// Width both slots are allocated for. Does not touch the slot locks.
    pub fn width(&self) -> u32 {
        self.state.lock().width
    }

    pub fn height(&self) -> u32 {
        self.state.lock().height
    }
}

impl Default for FrameSwap {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to the back slot. Hand back with [`FrameSwap::publish`];
/// dropping it instead discards the frame.
pub struct BackBuffer<'a> {
    slot: RwLockWriteGuard<'a, FrameSlot>,
    next_sequence: u64,
    writer: MutexGuard<'a, ()>,
}

impl BackBuffer<'_> {
    pub fn width(&self) -> u32 {
        self.slot.width
    }

    pub fn height(&self) -> u32 {
        self.slot.height
    }
}

impl Deref for BackBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.slot.data
    }
}

impl DerefMut for BackBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.slot.data
    }
}

/// Shared access to a completed frame.
///
/// Holding it keeps the slot from being reused by the producer, which skips
/// frames that would land in it; drop it once the pixels have been consumed.
pub struct FrontFrame<'a> {
    slot: RwLockReadGuard<'a, FrameSlot>,
}

impl FrontFrame<'_> {
    pub fn width(&self) -> u32 {
        self.slot.width
    }

    pub fn height(&self) -> u32 {
        self.slot.height
    }

    /// Publish sequence of this frame; 0 if nothing was published into it.
    pub fn sequence(&self) -> u64 {
        self.slot.sequence
    }

    /// The frame viewed as pixels.
    pub fn pixels(&self) -> &[Rgb8] {
        bytemuck::cast_slice(&self.slot.data)
    }
}

impl Deref for FrontFrame<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.slot.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn publish_filled(swap: &FrameSwap, value: u8) -> Published {
        let mut back = swap.back_buffer().expect("back slot free");
        back.fill(value);
        swap.publish(back)
    }

    #[test]
    fn new_swap_has_no_frame() {
        let swap = FrameSwap::with_size(4, 2);
        assert!(!swap.poll_once());
        assert!(!swap.is_frame_new());
        let front = swap.front();
        assert_eq!(front.len(), 4 * 2 * 3);
        assert!(front.iter().all(|&b| b == 0));
        assert_eq!(front.sequence(), 0);
    }

    #[test]
    fn poll_is_idempotent_without_publish() {
        let swap = FrameSwap::with_size(2, 2);
        publish_filled(&swap, 9);

        let (is_new, first) = swap.poll_and_acquire();
        assert!(is_new);
        let first = first.to_vec();

        let (is_new, second) = swap.poll_and_acquire();
        assert!(!is_new);
        assert!(!swap.is_frame_new());
        assert_eq!(first, second.to_vec());
    }

    #[test]
    fn latest_frame_wins() {
        let swap = FrameSwap::with_size(3, 3);
        let first = publish_filled(&swap, 1);
        let second = publish_filled(&swap, 2);
        assert!(!first.overwrote_unpolled);
        assert!(second.overwrote_unpolled);

        assert!(swap.poll_once());
        let front = swap.front();
        assert!(front.iter().all(|&b| b == 2));
        assert_eq!(front.sequence(), 2);
        drop(front);

        // Frame 1 is gone: nothing new to see
        assert!(!swap.poll_once());
    }

    #[test]
    fn poll_between_publishes_prevents_overwrite_report() {
        let swap = FrameSwap::with_size(1, 1);
        publish_filled(&swap, 1);
        assert!(swap.poll_once());
        let published = publish_filled(&swap, 2);
        assert!(!published.overwrote_unpolled);
    }

    #[test]
    fn writing_back_does_not_touch_front() {
        let swap = FrameSwap::with_size(2, 1);
        publish_filled(&swap, 7);

        let mut back = swap.back_buffer().expect("back slot free");
        back.fill(200);
        {
            let front = swap.front();
            assert!(front.iter().all(|&b| b == 7));
        }
        drop(back);

        // Discarded back buffer never became visible
        assert!(swap.front().iter().all(|&b| b == 7));
        assert_eq!(swap.sequence(), 1);
    }

    #[test]
    fn reading_front_repeatedly_returns_same_frame() {
        let swap = FrameSwap::with_size(2, 2);
        publish_filled(&swap, 33);
        swap.poll_once();
        let a = swap.front();
        let b = swap.front();
        assert_eq!(&*a, &*b);
        assert_eq!(a.sequence(), b.sequence());
    }

    #[test]
    fn reallocate_resizes_and_clears_flags() {
        let swap = FrameSwap::with_size(2, 2);
        publish_filled(&swap, 5);
        swap.reallocate(4, 3);
        assert!(!swap.poll_once());

        let front = swap.front();
        assert_eq!((front.width(), front.height()), (4, 3));
        assert_eq!(front.len(), 36);
        assert!(front.iter().all(|&b| b == 0));
        drop(front);

        let back = swap.back_buffer().expect("back slot free");
        assert_eq!((back.width(), back.height()), (4, 3));
        assert_eq!(back.len(), 36);
    }

    #[test]
    fn release_frees_slots() {
        let swap = FrameSwap::with_size(8, 8);
        publish_filled(&swap, 1);
        swap.release();
        assert_eq!(swap.front().len(), 0);
        assert_eq!(swap.sequence(), 0);
        assert!(!swap.poll_once());
    }

    #[test]
    fn pixels_view_matches_bytes() {
        let swap = FrameSwap::with_size(2, 1);
        let mut back = swap.back_buffer().expect("back slot free");
        back.copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        swap.publish(back);

        let front = swap.front();
        assert_eq!(
            front.pixels(),
            &[Rgb8 { r: 1, g: 2, b: 3 }, Rgb8 { r: 4, g: 5, b: 6 }]
        );
    }

    #[test]
    fn sequence_wraps_without_panicking() {
        let swap = FrameSwap::with_size(1, 1);
        swap.state.lock().sequence = u64::MAX;
        let published = publish_filled(&swap, 1);
        assert_eq!(published.sequence, 0);
    }

    #[test]
    fn dimensions_follow_allocation() {
        let swap = FrameSwap::new();
        assert_eq!((swap.width(), swap.height()), (0, 0));
        swap.reallocate(6, 4);
        assert_eq!((swap.width(), swap.height()), (6, 4));
        swap.release();
        assert_eq!((swap.width(), swap.height()), (0, 0));
    }

    #[test]
    fn producer_skips_slot_held_by_reader() {
        let swap = FrameSwap::with_size(2, 2);
        publish_filled(&swap, 1);
        assert!(swap.poll_once());
        let held = swap.front();
        assert_eq!(held.sequence(), 1);

        let (tx, rx) = mpsc::channel();
        std::thread::scope(|s| {
            s.spawn(|| {
                let first = swap.back_buffer().map(|mut back| {
                    back.fill(2);
                    swap.publish(back)
                });
                // Second frame would land in the slot the reader still holds
                let second = swap.back_buffer().is_some();
                let _ = tx.send((first, second));
            });

            let result = rx.recv_timeout(TIMEOUT);
            let (first, second) = result.expect("producer blocked on a reader");
            assert_eq!(first.map(|p| p.sequence), Some(2));
            assert!(!second);

            assert!(held.iter().all(|&b| b == 1));
            drop(held);
        });

        assert!(swap.poll_once());
        assert!(swap.front().iter().all(|&b| b == 2));
        assert!(swap.back_buffer().is_some());
    }

    #[test]
    fn reallocate_while_reader_polls_does_not_deadlock() {
        let swap = FrameSwap::with_size(2, 2);
        publish_filled(&swap, 3);

        let (held_tx, held_rx) = mpsc::channel();
        let (consumer_tx, consumer_rx) = mpsc::channel();
        let (realloc_tx, realloc_rx) = mpsc::channel();

        std::thread::scope(|s| {
            s.spawn(|| {
                let frame = swap.front();
                let _ = held_tx.send(());
                // Give reallocate time to start waiting on the held slot
                std::thread::sleep(Duration::from_millis(50));
                swap.poll_once();
                swap.is_frame_new();
                swap.width();
                let again = swap.front();
                let same = again.sequence() == frame.sequence();
                drop(again);
                drop(frame);
                let _ = consumer_tx.send(same);
            });

            s.spawn(|| {
                let held_rx = held_rx;
                let _ = held_rx.recv();
                swap.reallocate(8, 8);
                let _ = realloc_tx.send(());
            });

            let same = consumer_rx
                .recv_timeout(TIMEOUT)
                .expect("consumer deadlocked against reallocate");
            assert!(same);
            realloc_rx
                .recv_timeout(TIMEOUT)
                .expect("reallocate never finished");
        });

        let front = swap.front();
        assert_eq!((front.width(), front.height()), (8, 8));
        assert!(front.iter().all(|&b| b == 0));
    }

    #[test]
    fn swap_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FrameSwap>();
    }

    /// Producer fills every byte of a frame with its sequence; readers must
    /// never see two different values inside one frame.
    #[test]
    fn concurrent_publish_and_poll_never_tears() {
        const WIDTH: u32 = 64;
        const HEIGHT: u32 = 48;
        const FRAMES: u64 = 2_000;

        let swap = FrameSwap::with_size(WIDTH, HEIGHT);
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            s.spawn(|| {
                for seq in 1..=FRAMES {
                    // A reader may still hold the back slot; retry until free
                    let mut back = loop {
                        match swap.back_buffer() {
                            Some(back) => break back,
                            None => std::thread::yield_now(),
                        }
                    };
                    let value = (seq % 251) as u8;
                    for chunk in back.chunks_mut(WIDTH as usize * 3) {
                        chunk.fill(value);
                    }
                    swap.publish(back);
                }
                done.store(true, Ordering::Release);
            });

            for _ in 0..2 {
                s.spawn(|| {
                    let mut last_seq = 0;
                    let mut polls = 0u64;
                    while !done.load(Ordering::Acquire) || polls < 100 {
                        let (_, front) = swap.poll_and_acquire();
                        let seq = front.sequence();
                        assert!(seq >= last_seq, "sequence went backwards");
                        last_seq = seq;
                        if seq > 0 {
                            let expected = (seq % 251) as u8;
                            assert!(
                                front.iter().all(|&b| b == expected),
                                "torn frame at sequence {seq}"
                            );
                        }
                        drop(front);
                        polls += 1;
                    }
                });
            }
        });

        assert_eq!(swap.sequence(), FRAMES);
        assert_eq!(swap.front().sequence(), FRAMES);
    }
}
