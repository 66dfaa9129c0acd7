/*!
    Owns the pipeline and exposes the control surface.

    Grounded on `VideoState` and the `stream_*` control functions in
    `original_source/src/ff_player.c` for field layout and semantics, and on
    the teacher's `playback/player.rs` for the "owns queues, clocks and
    worker threads behind a small control surface" shape.
*/

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use ffmpeg_source::{Source, SourceConfig, StreamFilter};
use ffmpeg_types::{AudioFrame, MediaInfo, Rational, VideoFrame};

use crate::clock::Clock;
use crate::collab::{AudioParams, PlayerCallbacks};
use crate::config::PlayerOpts;
use crate::decoder::{AudioDecoder, Decoded, DecoderState, VideoDecoder};
use crate::error::{PlayerError, Result};
use crate::frame_queue::{FrameQueue, Queued};
use crate::packet_queue::PacketQueue;
use crate::reader::{DecoderFinishedFlag, ReaderControl, ReaderHandles, reader_loop};
use crate::sync::{self, AvSyncMode};
use crate::video_refresh::VideoRefresh;
use crate::audio_pull::AudioPull;

/// Matches the original's picture queue capacity (`VIDEO_PICTURE_QUEUE_SIZE`).
const VIDEO_QUEUE_CAPACITY: usize = 3;
/// Matches the original's sample queue capacity (`SAMPLE_QUEUE_SIZE`).
const AUDIO_QUEUE_CAPACITY: usize = 9;
/// Fallback byte rate for byte-offset seek deltas when the container does
/// not report a bit rate.
const FALLBACK_BYTES_PER_SEC: i64 = 180_000;
const VOLUME_MIN_DB: f32 = -60.0;
const VOLUME_MAX_DB: f32 = 0.0;

fn run_video_decoder_thread(
    mut decoder: VideoDecoder,
    packets: Arc<PacketQueue>,
    frames: Arc<FrameQueue<VideoFrame>>,
    finished: Arc<DecoderFinishedFlag>,
    on_error: impl Fn(PlayerError),
) {
    loop {
        if packets.is_aborted() && decoder.state() == DecoderState::WantInput {
            break;
        }
        match decoder.decode_one(|| packets.get(true)) {
            Ok(Decoded::Frame(queued)) => {
                if decoder.is_stale(packets.epoch()) {
                    continue;
                }
                if !frames.peek_writable() {
                    break;
                }
                frames.push(queued);
            }
            Ok(Decoded::NeedsInput) => continue,
            Ok(Decoded::Eof(epoch)) => finished.set(Some(epoch)),
            Err(e) => {
                on_error(e);
                break;
            }
        }
    }
}

fn run_audio_decoder_thread(
    mut decoder: AudioDecoder,
    packets: Arc<PacketQueue>,
    frames: Arc<FrameQueue<AudioFrame>>,
    finished: Arc<DecoderFinishedFlag>,
    on_error: impl Fn(PlayerError),
) {
    loop {
        if packets.is_aborted() && decoder.state() == DecoderState::WantInput {
            break;
        }
        match decoder.decode_one(|| packets.get(true)) {
            Ok(Decoded::Frame(queued)) => {
                if decoder.is_stale(packets.epoch()) {
                    continue;
                }
                if !frames.peek_writable() {
                    break;
                }
                frames.push(queued);
            }
            Ok(Decoded::NeedsInput) => continue,
            Ok(Decoded::Eof(epoch)) => finished.set(Some(epoch)),
            Err(e) => {
                on_error(e);
                break;
            }
        }
    }
}

/// `volume` and `step` are linear gains in `[0.0, 1.0]`; the step is applied
/// in decibels (`20 * log10`) and converted back, per the control surface's
/// "logarithmic, 20 log10 decibels" contract.
fn apply_volume_step(volume: f32, sign: f32, step_db: f32) -> f32 {
    let db = 20.0 * volume.max(1e-6).log10();
    let next_db = (db + sign * step_db).clamp(VOLUME_MIN_DB, VOLUME_MAX_DB);
    10f32.powf(next_db / 20.0)
}

/// Synchronized audio/video playback core. Owns the demuxer, decoder and
/// presentation-side pipeline described in the crate's design notes; the
/// embedder drives it through [`PlayerCallbacks`] and the methods here.
pub struct Player {
    callbacks: Arc<Mutex<Box<dyn PlayerCallbacks>>>,
    audio_clock: Mutex<Clock>,
    video_clock: Mutex<Clock>,
    external_clock: Arc<Mutex<Clock>>,
    video_packets: Arc<PacketQueue>,
    audio_packets: Arc<PacketQueue>,
    video_frames: Arc<FrameQueue<VideoFrame>>,
    audio_frames: Arc<FrameQueue<AudioFrame>>,
    reader_control: Arc<ReaderControl>,
    reader_thread: Option<JoinHandle<()>>,
    video_thread: Option<JoinHandle<()>>,
    audio_thread: Option<JoinHandle<()>>,
    video_refresh: Mutex<VideoRefresh>,
    audio_pull: Mutex<AudioPull>,
    has_video: bool,
    has_audio: bool,
    requested_sync_mode: AvSyncMode,
    audio_params: AudioParams,
    audio_volume: Mutex<f32>,
    seek_by_bytes: bool,
    bit_rate: Option<u64>,
    media_info: MediaInfo,
    paused: AtomicBool,
    closed: AtomicBool,
}

impl Player {
    /// Opens `location`, negotiates audio/video with `callbacks`, and spawns
    /// the reader and decoder worker threads.
    pub fn open<P: AsRef<Path>>(
        location: P,
        opts: PlayerOpts,
        callbacks: Box<dyn PlayerCallbacks>,
    ) -> Result<Self> {
        let stream_filter = match (opts.video_disabled, opts.audio_disabled) {
            (true, true) => return Err(PlayerError::unsupported("both streams disabled")),
            (true, false) => StreamFilter::AudioOnly,
            (false, true) => StreamFilter::VideoOnly,
            (false, false) => StreamFilter::Both,
        };
        let source_config = SourceConfig {
            stream_filter: Some(stream_filter),
            network_options: None,
        };
        let mut source = Source::open(location, source_config)?;

        let has_video = source.has_video();
        let has_audio = source.has_audio();
        let media_info = source.media_info().clone();
        let bit_rate = source.bit_rate();
        let max_frame_duration = if source.has_discontinuous_timestamps() {
            10.0
        } else {
            3600.0
        };

        let callbacks = Arc::new(Mutex::new(callbacks));

        if has_video {
            if let Some(info) = &media_info.video {
                callbacks
                    .lock()
                    .unwrap()
                    .on_video_meta(info.width, info.height, Rational::new(1, 1));
            }
        }

        let negotiated_audio = if has_audio {
            media_info.audio.as_ref().and_then(|info| {
                callbacks
                    .lock()
                    .unwrap()
                    .on_audio_meta(info.channels, info.sample_rate)
            })
        } else {
            None
        };
        let audio_params = match (has_audio, negotiated_audio) {
            (true, Some(params)) => params,
            (true, None) => {
                return Err(PlayerError::unsupported(
                    "embedder rejected audio negotiation",
                ));
            }
            (false, _) => AudioParams {
                sample_format: ffmpeg_types::SampleFormat::F32,
                channel_layout: ffmpeg_types::ChannelLayout::Stereo,
                sample_rate: 48_000,
                frame_size: 1024,
                bytes_per_sec: 48_000 * 4 * 2,
            },
        };

        let video_codec_config = source.take_video_codec_config();
        let audio_codec_config = source.take_audio_codec_config();
        let video_time_base = source.video_time_base().unwrap_or(Rational::new(1, 1));
        let audio_time_base = source.audio_time_base().unwrap_or(Rational::new(1, 1));

        let video_packets = Arc::new(PacketQueue::new());
        let audio_packets = Arc::new(PacketQueue::new());
        // Queues start live before the decoder threads below ever poll them;
        // `reader_loop` calls `start` again once it begins producing, which
        // only costs a harmless extra epoch bump.
        video_packets.start();
        audio_packets.start();
        let video_frames = Arc::new(FrameQueue::new(
            VIDEO_QUEUE_CAPACITY,
            true,
            Arc::clone(&video_packets),
        ));
        let audio_frames = Arc::new(FrameQueue::new(
            AUDIO_QUEUE_CAPACITY,
            true,
            Arc::clone(&audio_packets),
        ));

        let video_clock = Mutex::new(Clock::new(video_packets.epoch_handle()));
        let audio_clock = Mutex::new(Clock::new(audio_packets.epoch_handle()));
        let external_clock = Arc::new(Mutex::new(Clock::free_standing()));

        let video_finished = Arc::new(DecoderFinishedFlag::new());
        let audio_finished = Arc::new(DecoderFinishedFlag::new());

        let mut video_thread = None;
        if has_video {
            let config = video_codec_config.ok_or(PlayerError::NoSuchStream)?;
            let decoder = VideoDecoder::new(config, video_time_base)?;
            let packets = Arc::clone(&video_packets);
            let frames = Arc::clone(&video_frames);
            let finished = Arc::clone(&video_finished);
            let cb = Arc::clone(&callbacks);
            video_thread = Some(std::thread::spawn(move || {
                run_video_decoder_thread(decoder, packets, frames, finished, move |e| {
                    cb.lock().unwrap().on_error(&e)
                });
            }));
        }

        let mut audio_thread = None;
        if has_audio {
            let config = audio_codec_config.ok_or(PlayerError::NoSuchStream)?;
            let decoder = AudioDecoder::new(config, audio_time_base)?;
            let packets = Arc::clone(&audio_packets);
            let frames = Arc::clone(&audio_frames);
            let finished = Arc::clone(&audio_finished);
            let cb = Arc::clone(&callbacks);
            audio_thread = Some(std::thread::spawn(move || {
                run_audio_decoder_thread(decoder, packets, frames, finished, move |e| {
                    cb.lock().unwrap().on_error(&e)
                });
            }));
        }

        let reader_control = Arc::new(ReaderControl::new());
        let handles = ReaderHandles {
            video_packets: Arc::clone(&video_packets),
            audio_packets: Arc::clone(&audio_packets),
            video_frames: Arc::clone(&video_frames),
            audio_frames: Arc::clone(&audio_frames),
            video_finished,
            audio_finished,
            external_clock: Arc::clone(&external_clock),
            control: Arc::clone(&reader_control),
        };
        let reader_opts = opts.clone();
        let cb = Arc::clone(&callbacks);
        let reader_thread = Some(std::thread::spawn(move || {
            reader_loop(source, handles, reader_opts, move |e| {
                cb.lock().unwrap().on_error(&e)
            });
        }));

        let video_refresh = Mutex::new(VideoRefresh::new(
            Arc::clone(&video_frames),
            max_frame_duration,
        ));
        let audio_pull = Mutex::new(AudioPull::new(Arc::clone(&audio_frames), audio_params));

        Ok(Self {
            callbacks,
            audio_clock,
            video_clock,
            external_clock,
            video_packets,
            audio_packets,
            video_frames,
            audio_frames,
            reader_control,
            reader_thread,
            video_thread,
            audio_thread,
            video_refresh,
            audio_pull,
            has_video,
            has_audio,
            requested_sync_mode: opts.av_sync_mode,
            audio_params,
            audio_volume: Mutex::new(opts.audio_volume),
            seek_by_bytes: opts.seek_by_bytes,
            bit_rate,
            media_info,
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    fn effective_sync_mode(&self) -> AvSyncMode {
        sync::effective_mode(self.requested_sync_mode, self.has_video, self.has_audio)
    }

    /// The effective master clock's raw reading; `NaN` when unset or stale.
    fn raw_master_time(&self) -> f64 {
        match self.effective_sync_mode() {
            AvSyncMode::AudioMaster => self.audio_clock.lock().unwrap().get(),
            AvSyncMode::VideoMaster => self.video_clock.lock().unwrap().get(),
            AvSyncMode::ExternalClock => self.external_clock.lock().unwrap().get(),
        }
    }

    fn current_master_time(&self) -> f64 {
        let value = self.raw_master_time();
        if value.is_nan() { 0.0 } else { value }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PlayerError::AlreadyClosed);
        }
        Ok(())
    }

    pub fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn audio_params(&self) -> AudioParams {
        self.audio_params
    }

    pub fn audio_volume(&self) -> f32 {
        *self.audio_volume.lock().unwrap()
    }

    pub fn format_context(&self) -> &MediaInfo {
        &self.media_info
    }

    pub fn toggle_pause(&self) {
        let now_paused = !self.paused.load(Ordering::SeqCst);
        self.paused.store(now_paused, Ordering::SeqCst);
        self.reader_control
            .paused_request
            .store(now_paused, Ordering::SeqCst);
        self.audio_clock.lock().unwrap().toggle_pause();
        self.video_clock.lock().unwrap().toggle_pause();
        self.external_clock.lock().unwrap().toggle_pause();
        self.reader_control.wake();
    }

    pub fn step_to_next_frame(&self) {
        if self.paused() {
            self.toggle_pause();
        }
        self.video_refresh.lock().unwrap().request_step();
    }

    /// Seeks by `delta_seconds` relative to the current master clock
    /// (negative rewinds). Encoded as a byte-offset request when
    /// `PlayerOpts::seek_by_bytes` was set at open.
    pub fn seek(&self, delta_seconds: f64) -> Result<()> {
        self.ensure_open()?;
        if self.seek_by_bytes {
            let bytes_per_sec = self.bit_rate.map(|b| (b / 8) as i64).unwrap_or(FALLBACK_BYTES_PER_SEC);
            let delta_bytes = (delta_seconds * bytes_per_sec as f64) as i64;
            let known_pos = self.video_frames.last_pos().map(|p| p as i64).unwrap_or(0);
            let pos = (known_pos + delta_bytes).max(0);
            self.reader_control.request_seek(pos, delta_bytes, true);
        } else {
            let base = self.current_master_time();
            let target = (base + delta_seconds).max(0.0);
            let av_time_base = ffmpeg_next::ffi::AV_TIME_BASE as f64;
            let pos = (target * av_time_base) as i64;
            let rel = (delta_seconds * av_time_base) as i64;
            self.reader_control.request_seek(pos, rel, false);
        }
        Ok(())
    }

    /// Chapter seeking has no counterpart in this crate's demuxer layer
    /// (`ffmpeg-source::Source` does not expose `AVChapter` metadata), so
    /// this always reports "no such chapter" rather than faking a seek.
    pub fn seek_chapter(&self, _direction: i32) -> Result<()> {
        self.ensure_open()?;
        Err(PlayerError::unsupported(
            "chapter metadata is not exposed by the source layer",
        ))
    }

    /// Switches to another stream of `media_type` inside the same program.
    /// This crate's demuxer selects a single best stream per media type at
    /// open time and exposes no sibling-stream enumeration, so there is
    /// never an alternate to switch to; per the wrap-around resolution this
    /// always returns `Ok(false)` rather than looping or fabricating one.
    pub fn cycle_channel(&self, _media_type: ffmpeg_types::StreamType) -> Result<bool> {
        self.ensure_open()?;
        Ok(false)
    }

    pub fn update_volume(&self, sign: f32, step_db: f32) {
        let mut volume = self.audio_volume.lock().unwrap();
        *volume = apply_volume_step(*volume, sign, step_db);
    }

    /// Presentation pull: returns the frame to display now, if any, and
    /// tightens `remaining_time` to the next suggested wakeup.
    pub fn acquire_video_frame(&self, remaining_time: &mut Duration) -> Option<Queued<VideoFrame>> {
        if self.reader_control.force_refresh_request.swap(false, Ordering::SeqCst) {
            self.video_refresh.lock().unwrap().request_force_refresh();
        }
        let mode = self.effective_sync_mode();
        let master = self.current_master_time();
        let video_queue_epoch = self.video_packets.epoch();
        let mut video_clock = self.video_clock.lock().unwrap();
        let mut external_clock = self.external_clock.lock().unwrap();
        self.video_refresh.lock().unwrap().acquire_video_frame(
            self.paused(),
            mode,
            &mut *video_clock,
            &mut *external_clock,
            master,
            video_queue_epoch,
            remaining_time,
        )
    }

    /// Audio device pull: returns the next block of bytes to mix, if any.
    pub fn acquire_audio_buf(&self) -> Option<Vec<u8>> {
        if self.paused() {
            return None;
        }
        let live_epoch = self.audio_packets.epoch();
        let mode = self.effective_sync_mode();
        let master = self.raw_master_time();
        match self
            .audio_pull
            .lock()
            .unwrap()
            .acquire_audio_buf(live_epoch, mode, master)
        {
            Ok(buf) => buf,
            Err(e) => {
                self.callbacks.lock().unwrap().on_error(&e);
                None
            }
        }
    }

    /// Called by the audio device callback after mixing the buffer
    /// `acquire_audio_buf` returned, so the audio clock reflects what the
    /// user hears now rather than what was just decoded.
    pub fn sync_audio(&self, write_start_time: Instant, hw_buf_size: usize, remaining_bytes: usize) {
        let mut clock = self.audio_clock.lock().unwrap();
        self.audio_pull.lock().unwrap().sync_audio(
            &mut *clock,
            write_start_time,
            hw_buf_size,
            remaining_bytes,
        );
    }

    /// Signals shutdown; worker threads are joined on drop.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.reader_control.request_abort();
        self.video_packets.abort();
        self.audio_packets.abort();
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.close();
        if let Some(handle) = self.reader_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.video_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.audio_thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
impl Player {
    /// Drives `reader_loop` synchronously on the calling thread instead of
    /// spawning it, so demuxer/queue integration tests can run it to
    /// completion deterministically without a real presentation loop.
    pub(crate) fn run_reader_sync_for_test(
        source: Source,
        handles: ReaderHandles,
        opts: PlayerOpts,
    ) {
        reader_loop(source, handles, opts, |_| {});
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_step_down_then_up_round_trips() {
        let v = apply_volume_step(1.0, -1.0, 6.0);
        assert!(v < 1.0);
        let back = apply_volume_step(v, 1.0, 6.0);
        assert!((back - 1.0).abs() < 0.01);
    }

    #[test]
    fn volume_step_never_exceeds_unity_gain() {
        let v = apply_volume_step(1.0, 1.0, 6.0);
        assert!(v <= 1.0 + 1e-6);
    }

    #[test]
    fn volume_step_floors_out_instead_of_going_negative() {
        let mut v = 1.0;
        for _ in 0..50 {
            v = apply_volume_step(v, -1.0, 6.0);
        }
        assert!(v >= 0.0);
    }
}
