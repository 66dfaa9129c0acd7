/*!
    Bounded FIFO of compressed packets with an epoch (C2).

    The producer/consumer shape (mutex plus a condvar pair) is the teacher's
    own `decode/packet_queue.rs` idiom; the epoch stamping, backpressure
    predicate and null-packet sentinel are new, grounded on
    `stream_has_enough_packets` in `original_source/src/ff_player.c`.
*/

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use ffmpeg_types::{Packet, Rational, StreamType};

use crate::epoch::EpochHandle;

/// Matches `original_source`'s `MIN_FRAMES`: a queue is never considered
/// "enough" below this many packets, regardless of duration.
pub const MIN_FRAMES: usize = 10;

struct Inner {
    packets: VecDeque<Packet>,
    size_bytes: usize,
    duration_ticks: i64,
    aborted: bool,
}

pub struct PacketQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    epoch: EpochHandle,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                packets: VecDeque::new(),
                size_bytes: 0,
                duration_ticks: 0,
                aborted: true,
            }),
            not_empty: Condvar::new(),
            epoch: EpochHandle::new(),
        }
    }

    pub fn epoch_handle(&self) -> EpochHandle {
        self.epoch.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.get()
    }

    /// Clears `aborted` and bumps the epoch; called once before the reader
    /// starts feeding this queue.
    pub fn start(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.aborted = false;
        drop(inner);
        self.epoch.bump();
    }

    pub fn abort(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.aborted = true;
        self.not_empty.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.lock().unwrap().aborted
    }

    /// Drains all queued packets and bumps the epoch, invalidating every
    /// frame downstream decoders are still holding for the old generation.
    pub fn flush(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.packets.clear();
            inner.size_bytes = 0;
            inner.duration_ticks = 0;
        }
        self.epoch.bump();
    }

    pub fn put(&self, packet: Packet) {
        let mut inner = self.inner.lock().unwrap();
        inner.size_bytes += packet.data.len() + std::mem::size_of::<Packet>();
        inner.duration_ticks += packet.duration.0;
        inner.packets.push_back(packet);
        self.not_empty.notify_one();
    }

    pub fn put_null(&self, stream_type: StreamType, time_base: Rational) {
        self.put(Packet::null(stream_type, time_base));
    }

    /// Pops the next packet, stamped with the epoch it was enqueued under.
    /// `None` means the queue is empty (non-blocking) or was aborted while
    /// waiting (blocking); use [`PacketQueue::is_aborted`] to tell them
    /// apart.
    pub fn get(&self, block: bool) -> Option<(Packet, u64)> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(packet) = inner.packets.pop_front() {
                inner.size_bytes = inner
                    .size_bytes
                    .saturating_sub(packet.data.len() + std::mem::size_of::<Packet>());
                inner.duration_ticks -= packet.duration.0;
                return Some((packet, self.epoch.get()));
            }
            if inner.aborted || !block {
                return None;
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().packets.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.inner.lock().unwrap().size_bytes
    }

    pub fn duration_seconds(&self, time_base: Rational) -> f64 {
        self.inner.lock().unwrap().duration_ticks as f64 * time_base.to_f64()
    }

    /// Mirrors `stream_has_enough_packets`: an attached-picture stream or a
    /// negative stream id is always "enough"; otherwise enough once past
    /// [`MIN_FRAMES`] packets and either duration is unknown or exceeds one
    /// second.
    pub fn has_enough_packets(
        &self,
        time_base: Rational,
        is_attached_picture: bool,
        stream_negative: bool,
    ) -> bool {
        if is_attached_picture || stream_negative {
            return true;
        }
        let inner = self.inner.lock().unwrap();
        if inner.aborted {
            return true;
        }
        inner.packets.len() > MIN_FRAMES
            && (inner.duration_ticks == 0 || inner.duration_ticks as f64 * time_base.to_f64() > 1.0)
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffmpeg_types::{MediaDuration, Pts};

    fn packet(bytes: usize, duration: i64) -> Packet {
        Packet::new(
            vec![0; bytes],
            Some(Pts(0)),
            None,
            MediaDuration(duration),
            Rational::new(1, 1),
            true,
            StreamType::Video,
        )
    }

    #[test]
    fn get_stamps_packet_with_live_epoch() {
        let queue = PacketQueue::new();
        queue.start();
        queue.put(packet(10, 0));
        let (_, epoch) = queue.get(false).unwrap();
        assert_eq!(epoch, queue.epoch());
    }

    #[test]
    fn flush_clears_counters_and_bumps_epoch() {
        let queue = PacketQueue::new();
        queue.start();
        let epoch_before = queue.epoch();
        queue.put(packet(10, 0));
        queue.flush();
        assert_eq!(queue.count(), 0);
        assert_eq!(queue.size_bytes(), 0);
        assert!(queue.epoch() > epoch_before);
    }

    #[test]
    fn size_bytes_counts_payload_plus_overhead() {
        let queue = PacketQueue::new();
        queue.start();
        queue.put(packet(10, 0));
        assert!(queue.size_bytes() >= 10);
        assert!(queue.size_bytes() > 10, "overhead constant must be nonzero");
    }

    #[test]
    fn empty_non_blocking_get_returns_none_without_waiting() {
        let queue = PacketQueue::new();
        queue.start();
        assert!(queue.get(false).is_none());
    }

    #[test]
    fn abort_wakes_blocking_get() {
        use std::sync::Arc;
        use std::thread;

        let queue = Arc::new(PacketQueue::new());
        queue.start();
        let reader = Arc::clone(&queue);
        let handle = thread::spawn(move || reader.get(true));

        thread::sleep(std::time::Duration::from_millis(20));
        queue.abort();
        let result = handle.join().unwrap();
        assert!(result.is_none());
        assert!(queue.is_aborted());
    }

    #[test]
    fn has_enough_packets_true_for_attached_picture_regardless_of_count() {
        let queue = PacketQueue::new();
        queue.start();
        assert!(queue.has_enough_packets(Rational::new(1, 1), true, false));
    }

    #[test]
    fn has_enough_packets_requires_min_frames_and_duration() {
        let queue = PacketQueue::new();
        queue.start();
        for _ in 0..=MIN_FRAMES {
            queue.put(packet(1, 0));
        }
        // duration_ticks stays 0 -> "duration unknown" branch is true
        assert!(queue.has_enough_packets(Rational::new(1, 1), false, false));
    }

    #[test]
    fn has_enough_packets_false_below_min_frames() {
        let queue = PacketQueue::new();
        queue.start();
        queue.put(packet(1, 0));
        assert!(!queue.has_enough_packets(Rational::new(1, 1), false, false));
    }
}
