/*!
    Picks the frame to show and schedules the next refresh tick (C7).

    Ported from `video_refresh` in `original_source/src/ff_player.c`; the
    mutable `frame_timer`/`force_refresh` state that function keeps in
    `VideoState` lives on [`VideoRefresh`] here instead.
*/

use std::sync::Arc;
use std::time::{Duration, Instant};

use ffmpeg_types::VideoFrame;

use crate::clock::Clock;
use crate::frame_queue::{FrameQueue, Queued};
use crate::sync::{self, AvSyncMode};

pub struct VideoRefresh {
    frames: Arc<FrameQueue<VideoFrame>>,
    frame_timer: Instant,
    max_frame_duration: f64,
    force_refresh: bool,
    step: bool,
}

impl VideoRefresh {
    pub fn new(frames: Arc<FrameQueue<VideoFrame>>, max_frame_duration: f64) -> Self {
        Self {
            frames,
            frame_timer: Instant::now(),
            max_frame_duration,
            force_refresh: false,
            step: false,
        }
    }

    pub fn request_force_refresh(&mut self) {
        self.force_refresh = true;
    }

    pub fn request_step(&mut self) {
        self.step = true;
    }

    /// PTS gap between two same-epoch frames, falling back to `last`'s own
    /// stored duration when the gap is unusable (unset, non-positive, or
    /// past `max_frame_duration`).
    fn frame_duration(&self, last: &Queued<VideoFrame>, current: &Queued<VideoFrame>) -> f64 {
        if last.epoch != current.epoch {
            return 0.0;
        }
        let pts_secs = |q: &Queued<VideoFrame>| {
            q.frame
                .pts
                .map(|p| p.0 as f64 * q.frame.time_base.to_f64())
                .unwrap_or(f64::NAN)
        };
        let duration = pts_secs(current) - pts_secs(last);
        if duration.is_nan() || duration <= 0.0 || duration > self.max_frame_duration {
            last.duration.as_secs_f64()
        } else {
            duration
        }
    }

    /// Returns the frame to present right now, if any, and tightens
    /// `remaining_time` to the suggested next wakeup.
    ///
    /// `video_queue_epoch` is the video packet queue's live epoch: a frame
    /// already sitting in the queue can go stale after a seek/flush, so
    /// every iteration re-checks it and drops the frame rather than display
    /// it (Invariant 2).
    #[allow(clippy::too_many_arguments)]
    pub fn acquire_video_frame(
        &mut self,
        paused: bool,
        mode: AvSyncMode,
        video_clock: &mut Clock,
        external_clock: &mut Clock,
        master_clock_value: f64,
        video_queue_epoch: u64,
        remaining_time: &mut Duration,
    ) -> Option<Queued<VideoFrame>> {
        if paused && !self.force_refresh {
            return None;
        }

        loop {
            let last = self.frames.peek_last();
            let current = self.frames.peek()?;

            if current.epoch != video_queue_epoch {
                self.frames.next();
                continue;
            }

            let last = last.unwrap_or_else(|| current.clone());
            if last.epoch != current.epoch {
                self.frame_timer = Instant::now();
            }

            if paused {
                break;
            }

            let nominal_delay = self.frame_duration(&last, &current);
            let delay = sync::target_delay(
                nominal_delay,
                mode,
                video_clock.get(),
                master_clock_value,
                self.max_frame_duration,
            );

            let now = Instant::now();
            let due_at = self.frame_timer + Duration::from_secs_f64(delay.max(0.0));
            if now < due_at {
                *remaining_time = (*remaining_time).min(due_at - now);
                break;
            }

            self.frame_timer += Duration::from_secs_f64(delay.max(0.0));
            let slippage = now.saturating_duration_since(self.frame_timer).as_secs_f64();
            if slippage > sync::AV_SYNC_THRESHOLD_MAX {
                self.frame_timer = now;
            }

            video_clock.set(
                current.frame.pts.map(|p| p.0 as f64 * current.frame.time_base.to_f64())
                    .unwrap_or(f64::NAN),
                current.epoch,
            );
            external_clock.sync_to_slave(video_clock, crate::clock::AV_NOSYNC_THRESHOLD);

            if let Some(next) = self.frames.peek_next() {
                let dup_window = self.frame_duration(&current, &next);
                if mode != AvSyncMode::VideoMaster
                    && !self.step
                    && now.saturating_duration_since(self.frame_timer).as_secs_f64()
                        > dup_window
                {
                    self.frames.next();
                    continue;
                }
            }

            self.frames.next();
            self.force_refresh = true;
            break;
        }

        if self.step {
            self.step = false;
        }

        if self.force_refresh {
            self.force_refresh = false;
            return self.frames.peek_last();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet_queue::PacketQueue;
    use std::time::Duration as StdDuration;

    fn frame(pts: i64, epoch: u64) -> Queued<VideoFrame> {
        Queued {
            frame: VideoFrame::new(
                vec![0; 4],
                2,
                2,
                ffmpeg_types::PixelFormat::Rgba,
                Some(ffmpeg_types::Pts(pts)),
                ffmpeg_types::Rational::new(1, 1),
            ),
            epoch,
            duration: StdDuration::from_millis(33),
            pos: None,
        }
    }

    #[test]
    fn paused_without_force_refresh_returns_none() {
        let packets = Arc::new(PacketQueue::new());
        packets.start();
        let frames = Arc::new(FrameQueue::new(3, true, packets));
        frames.push(frame(0, 0));
        let mut refresh = VideoRefresh::new(frames, 10.0);
        let mut video_clock = Clock::new(crate::epoch::EpochHandle::new());
        let mut external = Clock::free_standing();
        let mut remaining = StdDuration::from_secs(1);
        let result = refresh.acquire_video_frame(
            true,
            AvSyncMode::AudioMaster,
            &mut video_clock,
            &mut external,
            0.0,
            0,
            &mut remaining,
        );
        assert!(result.is_none());
    }

    #[test]
    fn stale_frame_is_dropped_without_display() {
        let packets = Arc::new(PacketQueue::new());
        packets.start();
        let frames = Arc::new(FrameQueue::new(3, true, Arc::clone(&packets)));
        // Queued at epoch 0, but the live packet queue has since moved to
        // epoch 1 via a seek/flush; acquire_video_frame must drop it rather
        // than present it.
        frames.push(frame(0, 0));
        let mut refresh = VideoRefresh::new(frames, 10.0);
        let mut video_clock = Clock::new(crate::epoch::EpochHandle::new());
        let mut external = Clock::free_standing();
        let mut remaining = StdDuration::from_secs(1);
        let result = refresh.acquire_video_frame(
            false,
            AvSyncMode::AudioMaster,
            &mut video_clock,
            &mut external,
            0.0,
            1,
            &mut remaining,
        );
        assert!(result.is_none());
    }

    #[test]
    fn frame_duration_uses_pts_gap_not_stored_duration() {
        let packets = Arc::new(PacketQueue::new());
        packets.start();
        let frames = Arc::new(FrameQueue::new(3, true, packets));
        let refresh = VideoRefresh::new(frames, 10.0);
        // pts 0 -> pts 10 at time_base 1/1 is a 10s gap, not either frame's
        // own stored 33ms duration field.
        let last = frame(0, 0);
        let current = frame(10, 0);
        assert!((refresh.frame_duration(&last, &current) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn frame_duration_falls_back_to_last_duration_on_non_positive_gap() {
        let packets = Arc::new(PacketQueue::new());
        packets.start();
        let frames = Arc::new(FrameQueue::new(3, true, packets));
        let refresh = VideoRefresh::new(frames, 10.0);
        let last = frame(10, 0);
        let current = frame(10, 0);
        assert_eq!(refresh.frame_duration(&last, &current), 0.033);
    }
}
