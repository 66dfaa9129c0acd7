/*!
    Bounded ring of decoded frames with reader/writer cursors (C3).

    Generic over the frame payload (`VideoFrame` or `AudioFrame`) so one
    implementation serves both the video and audio pipelines, the way the
    teacher's `playback/frame_queue.rs` served video frames specifically;
    `Queued<F>` adds the epoch/duration/position bookkeeping the original's
    `Frame` struct carried inline.
*/

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::packet_queue::PacketQueue;

/// A decoded frame plus the presentation bookkeeping the queue needs but
/// the frame type itself does not carry.
#[derive(Clone, Debug)]
pub struct Queued<F> {
    pub frame: F,
    pub epoch: u64,
    pub duration: Duration,
    pub pos: Option<u64>,
}

struct Inner<F> {
    slots: Vec<Option<Queued<F>>>,
    rindex: usize,
    windex: usize,
    size: usize,
    rindex_shown: usize,
}

pub struct FrameQueue<F> {
    inner: Mutex<Inner<F>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    keep_last: bool,
    packets: Arc<PacketQueue>,
}

impl<F: Clone> FrameQueue<F> {
    pub fn new(capacity: usize, keep_last: bool, packets: Arc<PacketQueue>) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            inner: Mutex::new(Inner {
                slots,
                rindex: 0,
                windex: 0,
                size: 0,
                rindex_shown: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            keep_last,
            packets,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames available to a consumer that has already called `next` past
    /// the "shown" slot once.
    pub fn frames_remaining(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.size - inner.rindex_shown
    }

    /// The current readable frame (respecting `keep_last`), if any.
    pub fn peek(&self) -> Option<Queued<F>> {
        let inner = self.inner.lock().unwrap();
        let idx = (inner.rindex + inner.rindex_shown) % self.capacity;
        inner.slots[idx].clone()
    }

    pub fn peek_next(&self) -> Option<Queued<F>> {
        let inner = self.inner.lock().unwrap();
        let idx = (inner.rindex + inner.rindex_shown + 1) % self.capacity;
        inner.slots[idx].clone()
    }

    /// The most recently shown frame, regardless of `rindex_shown`.
    pub fn peek_last(&self) -> Option<Queued<F>> {
        let inner = self.inner.lock().unwrap();
        inner.slots[inner.rindex].clone()
    }

    /// Blocks until a readable frame exists or the companion packet queue
    /// aborts, in which case it returns `None`.
    pub fn peek_readable(&self) -> Option<Queued<F>> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.size - inner.rindex_shown > 0 {
                let idx = (inner.rindex + inner.rindex_shown) % self.capacity;
                return inner.slots[idx].clone();
            }
            if self.packets.is_aborted() {
                return None;
            }
            inner = self
                .not_empty
                .wait_timeout(inner, Duration::from_millis(10))
                .unwrap()
                .0;
        }
    }

    /// Advances the read cursor. With `keep_last`, the first call after a
    /// show only flips `rindex_shown`; the slot stays peekable via
    /// `peek_last` until the *next* `next()` actually frees it.
    pub fn next(&self) {
        let mut inner = self.inner.lock().unwrap();
        if self.keep_last && inner.rindex_shown == 0 {
            inner.rindex_shown = 1;
            return;
        }
        inner.slots[inner.rindex] = None;
        inner.rindex = (inner.rindex + 1) % self.capacity;
        inner.size -= 1;
        self.not_full.notify_one();
    }

    /// Byte position of the last shown frame, `None` unless it is actually
    /// shown and its epoch still matches the live packet queue epoch (a
    /// flush invalidates it the same way it invalidates frames).
    pub fn last_pos(&self) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        if inner.rindex_shown == 0 {
            return None;
        }
        let slot = inner.slots[inner.rindex].as_ref()?;
        if slot.epoch != self.packets.epoch() {
            return None;
        }
        slot.pos
    }

    /// Blocks until a free slot exists or the companion packet queue
    /// aborts, in which case it returns `false`.
    pub fn peek_writable(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.size < self.capacity {
                return true;
            }
            if self.packets.is_aborted() {
                return false;
            }
            inner = self
                .not_full
                .wait_timeout(inner, Duration::from_millis(10))
                .unwrap()
                .0;
        }
    }

    /// Writes into the slot at `windex` and advances it. Callers must have
    /// confirmed a free slot via `peek_writable` first.
    pub fn push(&self, queued: Queued<F>) {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner.windex;
        inner.slots[idx] = Some(queued);
        inner.windex = (inner.windex + 1) % self.capacity;
        inner.size += 1;
        self.not_empty.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(capacity: usize, keep_last: bool) -> FrameQueue<i32> {
        let packets = Arc::new(PacketQueue::new());
        packets.start();
        FrameQueue::new(capacity, keep_last, packets)
    }

    fn frame(value: i32, epoch: u64) -> Queued<i32> {
        Queued {
            frame: value,
            epoch,
            duration: Duration::ZERO,
            pos: Some(value as u64),
        }
    }

    #[test]
    fn push_then_peek_returns_same_frame() {
        let q = queue(3, false);
        q.push(frame(1, 0));
        assert_eq!(q.peek().unwrap().frame, 1);
    }

    #[test]
    fn frames_remaining_never_exceeds_size() {
        let q = queue(3, false);
        q.push(frame(1, 0));
        q.push(frame(2, 0));
        assert!(q.frames_remaining() <= 2);
        assert_eq!(q.frames_remaining(), 2);
    }

    #[test]
    fn keep_last_first_next_only_flips_shown_flag() {
        let q = queue(3, true);
        q.push(frame(1, 0));
        q.push(frame(2, 0));
        q.next();
        // rindex hasn't advanced yet, so peek_last still sees frame 1
        assert_eq!(q.peek_last().unwrap().frame, 1);
        assert_eq!(q.peek().unwrap().frame, 2);
    }

    #[test]
    fn without_keep_last_next_frees_slot_immediately() {
        let q = queue(3, false);
        q.push(frame(1, 0));
        q.push(frame(2, 0));
        q.next();
        assert_eq!(q.peek().unwrap().frame, 2);
    }

    #[test]
    fn last_pos_none_until_shown() {
        let q = queue(3, true);
        q.push(frame(1, 0));
        assert!(q.last_pos().is_none());
        q.next();
        assert_eq!(q.last_pos(), Some(1));
    }

    #[test]
    fn last_pos_none_after_epoch_mismatch() {
        let packets = Arc::new(PacketQueue::new());
        packets.start();
        let q = FrameQueue::new(3, true, Arc::clone(&packets));
        q.push(frame(1, packets.epoch()));
        q.next();
        packets.flush();
        assert!(q.last_pos().is_none());
    }

    #[test]
    fn peek_writable_false_after_abort_when_full() {
        let packets = Arc::new(PacketQueue::new());
        packets.start();
        let q = FrameQueue::new(1, false, Arc::clone(&packets));
        q.push(frame(1, 0));
        packets.abort();
        assert!(!q.peek_writable());
    }

    #[test]
    fn peek_readable_none_after_abort_when_empty() {
        let packets = Arc::new(PacketQueue::new());
        packets.start();
        let q: FrameQueue<i32> = FrameQueue::new(1, false, Arc::clone(&packets));
        packets.abort();
        assert!(q.peek_readable().is_none());
    }
}
