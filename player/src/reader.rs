/*!
    Demuxer/reader thread: opens the container, routes packets into the two
    [`PacketQueue`]s, and owns seek planning, backpressure, loop/EOF policy
    and attached-picture requeueing (C5).

    Ported from `read_thread` in `original_source/src/ff_player.c`. The
    per-stream decode pumps are separate worker loops (owned by
    `crate::player::Player`), not this module; the reader only produces
    packets.
*/

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use ffmpeg_source::Source;
use ffmpeg_types::{AudioFrame, Packet, Rational, StreamType, VideoFrame};

use crate::clock::Clock;
use crate::config::PlayerOpts;
use crate::error::PlayerError;
use crate::frame_queue::FrameQueue;
use crate::packet_queue::PacketQueue;

/// Aggregate byte ceiling across both packet queues before the reader backs
/// off. Matches `MAX_QUEUE_SIZE` in the original.
const MAX_QUEUE_SIZE: usize = 15 * 1024 * 1024;
const BACKPRESSURE_TICK: Duration = Duration::from_millis(10);
const EOF_RETRY_TICK: Duration = Duration::from_millis(10);
/// Slack (in container-timebase ticks) widening the forward/backward seek
/// bound to tolerate keyframe rounding.
const SEEK_SLACK_TICKS: i64 = 2;

/// A pending seek request. `pos` is in `AV_TIME_BASE` microseconds unless
/// `by_bytes` is set, in which case it is a byte offset. `rel` carries the
/// signed delta that produced `pos`, used only to pick which side of the
/// target the slack widens.
#[derive(Clone, Copy, Debug)]
pub struct SeekRequest {
    pub pos: i64,
    pub rel: i64,
    pub by_bytes: bool,
}

/// A decoder's `finished` epoch, published by its owning worker thread so
/// the reader can evaluate the EOF policy without touching decoder
/// internals. `None` is encoded as `-1`.
pub struct DecoderFinishedFlag(AtomicI64);

impl DecoderFinishedFlag {
    pub fn new() -> Self {
        Self(AtomicI64::new(-1))
    }

    pub fn set(&self, epoch: Option<u64>) {
        self.0
            .store(epoch.map(|e| e as i64).unwrap_or(-1), Ordering::Release);
    }

    pub fn matches(&self, live_epoch: u64) -> bool {
        self.0.load(Ordering::Acquire) == live_epoch as i64
    }
}

impl Default for DecoderFinishedFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared between the reader thread and its controller (`Player`).
pub struct ReaderControl {
    pub abort_request: AtomicBool,
    pub paused_request: AtomicBool,
    pub queue_attachments_req: AtomicBool,
    /// Set by the reader after a seek that lands while paused; the
    /// presentation pull clears it by calling `VideoRefresh::request_force_refresh`.
    pub force_refresh_request: AtomicBool,
    seek: Mutex<Option<SeekRequest>>,
    continue_lock: Mutex<()>,
    continue_cv: Condvar,
}

impl ReaderControl {
    pub fn new() -> Self {
        Self {
            abort_request: AtomicBool::new(false),
            paused_request: AtomicBool::new(false),
            queue_attachments_req: AtomicBool::new(true),
            force_refresh_request: AtomicBool::new(false),
            seek: Mutex::new(None),
            continue_lock: Mutex::new(()),
            continue_cv: Condvar::new(),
        }
    }

    pub fn request_seek(&self, pos: i64, rel: i64, by_bytes: bool) {
        *self.seek.lock().unwrap() = Some(SeekRequest { pos, rel, by_bytes });
        self.wake();
    }

    pub fn request_abort(&self) {
        self.abort_request.store(true, Ordering::SeqCst);
        self.wake();
    }

    pub fn wake(&self) {
        self.continue_cv.notify_all();
    }

    fn wait_tick(&self, timeout: Duration) {
        let guard = self.continue_lock.lock().unwrap();
        let _ = self.continue_cv.wait_timeout(guard, timeout).unwrap();
    }

    fn take_seek(&self) -> Option<SeekRequest> {
        self.seek.lock().unwrap().take()
    }
}

impl Default for ReaderControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Handles the reader needs to do its job; bundled so `Player` can hand
/// them to the spawned thread (and to `run_reader_sync_for_test`) in one
/// shot.
pub struct ReaderHandles {
    pub video_packets: Arc<PacketQueue>,
    pub audio_packets: Arc<PacketQueue>,
    pub video_frames: Arc<FrameQueue<VideoFrame>>,
    pub audio_frames: Arc<FrameQueue<AudioFrame>>,
    pub video_finished: Arc<DecoderFinishedFlag>,
    pub audio_finished: Arc<DecoderFinishedFlag>,
    pub external_clock: Arc<Mutex<Clock>>,
    pub control: Arc<ReaderControl>,
}

/// A packet survives the play-range filter only when its timestamp falls
/// inside `[start_time, start_time + duration]` (both optional).
fn in_play_range(packet: &Packet, opts: &PlayerOpts) -> bool {
    let Some(pts) = packet.pts else {
        return true;
    };
    let Some(start) = opts.start_time else {
        return true;
    };
    let secs = pts.0 as f64 * packet.time_base.to_f64();
    if secs < start.as_secs_f64() {
        return false;
    }
    if let Some(duration) = opts.duration {
        if secs > start.as_secs_f64() + duration.as_secs_f64() {
            return false;
        }
    }
    true
}

/// Runs the reader to completion (EOF with `loop_playback = false`,
/// permanent I/O error, or `abort_request`). Called on a dedicated thread
/// by `Player::open`, and directly by `Player::run_reader_sync_for_test`.
pub fn reader_loop(
    mut source: Source,
    handles: ReaderHandles,
    opts: PlayerOpts,
    mut on_error: impl FnMut(PlayerError),
) {
    let control = Arc::clone(&handles.control);

    handles.video_packets.start();
    handles.audio_packets.start();

    if source.is_realtime() {
        log::debug!("reader: realtime source, external clock drift compensation enabled");
    }

    if let Some(start) = opts.start_time {
        if source.is_seekable() {
            if let Err(e) = source.seek(start) {
                log::warn!("reader: start-time seek failed: {e}");
            }
        }
    }

    let has_video = source.has_video() && !opts.video_disabled;
    let has_audio = source.has_audio() && !opts.audio_disabled;
    let video_tb = source.video_time_base().unwrap_or(Rational::new(1, 1));
    let audio_tb = source.audio_time_base().unwrap_or(Rational::new(1, 1));

    let mut eof = false;

    loop {
        if control.abort_request.load(Ordering::SeqCst) {
            break;
        }

        let paused = control.paused_request.load(Ordering::SeqCst);

        // b. seek planning
        if let Some(req) = control.take_seek() {
            let by_bytes = req.by_bytes && source.allows_byte_seek() && source.format_name() != "ogg";
            let seek_result: ffmpeg_types::Result<Option<Duration>> = if by_bytes {
                let slack = SEEK_SLACK_TICKS;
                let (min, max) = match req.rel.signum() {
                    1 => (req.pos - slack, i64::MAX),
                    -1 => (i64::MIN, req.pos + slack),
                    _ => (req.pos - slack, req.pos + slack),
                };
                source.seek_bytes(min, req.pos, max).map(|()| None)
            } else {
                let target_secs = req.pos as f64 / ffmpeg_next::ffi::AV_TIME_BASE as f64;
                source
                    .seek(Duration::from_secs_f64(target_secs.max(0.0)))
                    .map(Some)
            };

            match seek_result {
                Ok(landed) => {
                    handles.video_packets.flush();
                    handles.audio_packets.flush();
                    let mut ext = handles.external_clock.lock().unwrap();
                    let epoch = ext.epoch_handle().get();
                    match landed {
                        Some(actual) => ext.set(actual.as_secs_f64(), epoch),
                        None => ext.set(f64::NAN, epoch),
                    }
                    drop(ext);
                    control.queue_attachments_req.store(true, Ordering::SeqCst);
                    if paused {
                        control.force_refresh_request.store(true, Ordering::SeqCst);
                    }
                    eof = false;
                }
                Err(e) => log::warn!("reader: seek failed: {e}"),
            }
        }

        // c. attached-picture requeue
        if control.queue_attachments_req.swap(false, Ordering::SeqCst)
            && has_video
            && source.has_attached_picture()
        {
            if let Some(pic) = source.attached_picture_packet() {
                handles.video_packets.put(pic);
                handles.video_packets.put_null(StreamType::Video, video_tb);
            }
        }

        // d. backpressure
        let total_bytes = handles.video_packets.size_bytes() + handles.audio_packets.size_bytes();
        let video_enough = !has_video
            || handles
                .video_packets
                .has_enough_packets(video_tb, source.has_attached_picture(), false);
        let audio_enough =
            !has_audio || handles.audio_packets.has_enough_packets(audio_tb, false, false);
        if total_bytes > MAX_QUEUE_SIZE || (video_enough && audio_enough) {
            control.wait_tick(BACKPRESSURE_TICK);
            continue;
        }

        // e. EOF policy
        if !paused {
            let video_done = !has_video
                || (handles
                    .video_finished
                    .matches(handles.video_packets.epoch())
                    && handles.video_frames.frames_remaining() == 0);
            let audio_done = !has_audio
                || (handles
                    .audio_finished
                    .matches(handles.audio_packets.epoch())
                    && handles.audio_frames.frames_remaining() == 0);
            if video_done && audio_done {
                if opts.loop_playback && source.is_seekable() {
                    let target = opts.start_time.unwrap_or(Duration::ZERO);
                    if source.seek(target).is_ok() {
                        handles.video_packets.flush();
                        handles.audio_packets.flush();
                        control.queue_attachments_req.store(true, Ordering::SeqCst);
                        eof = false;
                        continue;
                    }
                }
                log::debug!("reader: playback complete");
                break;
            }
        }

        // f. read one packet
        match source.next_packet() {
            Ok(Some(packet)) => {
                eof = false;
                // g. play-range filter, h. route
                if in_play_range(&packet, &opts) {
                    match packet.stream_type {
                        StreamType::Video if has_video => handles.video_packets.put(packet),
                        StreamType::Audio if has_audio => handles.audio_packets.put(packet),
                        _ => {}
                    }
                }
            }
            Ok(None) => {
                if !eof {
                    if has_video {
                        handles.video_packets.put_null(StreamType::Video, video_tb);
                    }
                    if has_audio {
                        handles.audio_packets.put_null(StreamType::Audio, audio_tb);
                    }
                    eof = true;
                }
                control.wait_tick(EOF_RETRY_TICK);
            }
            Err(e) => {
                log::error!("reader: permanent I/O error: {e}");
                on_error(PlayerError::from(e));
                break;
            }
        }
    }

    handles.video_packets.abort();
    handles.audio_packets.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffmpeg_types::{MediaDuration, Pts};
    use std::thread;

    fn packet_at(secs: f64) -> Packet {
        let time_base = Rational::new(1, 1000);
        let pts = Pts((secs * 1000.0) as i64);
        Packet::new(
            vec![0; 4],
            Some(pts),
            None,
            MediaDuration(0),
            time_base,
            true,
            StreamType::Video,
        )
    }

    #[test]
    fn play_range_accepts_everything_without_start_time() {
        let opts = PlayerOpts::default();
        assert!(in_play_range(&packet_at(100.0), &opts));
    }

    #[test]
    fn play_range_rejects_before_start() {
        let mut opts = PlayerOpts::default();
        opts.start_time = Some(Duration::from_secs(10));
        assert!(!in_play_range(&packet_at(5.0), &opts));
        assert!(in_play_range(&packet_at(10.5), &opts));
    }

    #[test]
    fn play_range_rejects_past_end() {
        let mut opts = PlayerOpts::default();
        opts.start_time = Some(Duration::from_secs(10));
        opts.duration = Some(Duration::from_secs(5));
        assert!(in_play_range(&packet_at(14.0), &opts));
        assert!(!in_play_range(&packet_at(16.0), &opts));
    }

    #[test]
    fn decoder_finished_flag_round_trips_epoch() {
        let flag = DecoderFinishedFlag::new();
        assert!(!flag.matches(0));
        flag.set(Some(3));
        assert!(flag.matches(3));
        assert!(!flag.matches(4));
        flag.set(None);
        assert!(!flag.matches(0));
    }

    #[test]
    fn request_seek_wakes_a_waiting_tick() {
        let control = Arc::new(ReaderControl::new());
        let waiter = Arc::clone(&control);
        let handle = thread::spawn(move || waiter.wait_tick(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        control.request_seek(0, 0, false);
        handle.join().unwrap();
    }

    #[test]
    fn request_abort_sets_the_flag() {
        let control = ReaderControl::new();
        assert!(!control.abort_request.load(Ordering::SeqCst));
        control.request_abort();
        assert!(control.abort_request.load(Ordering::SeqCst));
    }
}
