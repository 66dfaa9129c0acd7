/*!
    Resamples and timestamps audio for the device (C8).

    Ported from `audio_decode_frame` / `synchronize_audio` /
    `sdl_audio_callback` in `original_source/src/ff_player.c`. Resampling
    itself follows the lazy-rebuild-on-format-change shape of the teacher's
    `ffmpeg-transform` crate (`AudioTransform` in
    `ffmpeg/transform/src/audio.rs`); this module additionally folds in the
    drift-correction step the teacher's transform never needed.
*/

use std::sync::Arc;

use ffmpeg_next::software::resampling::context::Context as ResamplerContext;
use ffmpeg_next::util::frame::audio::Audio as FfAudioFrame;
use ffmpeg_source::{channel_layout_to_ffmpeg, sample_format_to_ffmpeg};
use ffmpeg_types::AudioFrame;

use crate::clock::Clock;
use crate::collab::AudioParams;
use crate::error::{PlayerError, Result};
use crate::frame_queue::FrameQueue;
use crate::sync::AvSyncMode;

/// Matches `AUDIO_DIFF_AVG_NB` in the original: the EMA needs this many
/// samples before its average is trusted.
pub const AUDIO_DIFF_AVG_NB: u32 = 20;

/// A resampler context plus the input shape (and the compensated output
/// rate) it was built for; rebuilt whenever either changes.
struct ResamplerState {
    context: ResamplerContext,
    src_sample_format: ffmpeg_types::SampleFormat,
    src_channel_layout: ffmpeg_types::ChannelLayout,
    src_sample_rate: u32,
    effective_dst_rate: u32,
}

pub struct AudioPull {
    frames: Arc<FrameQueue<AudioFrame>>,
    params: AudioParams,
    resampler: Option<ResamplerState>,
    audio_diff_avg_coef: f64,
    audio_diff_threshold: f64,
    audio_diff_avg_count: u32,
    audio_diff_cum: f64,
    audio_clock_value: f64,
    audio_clock_serial: u64,
}

impl AudioPull {
    pub fn new(frames: Arc<FrameQueue<AudioFrame>>, params: AudioParams) -> Self {
        let audio_diff_avg_coef = (0.01_f64.ln() / AUDIO_DIFF_AVG_NB as f64).exp();
        let audio_diff_threshold = params.frame_size as f64 / params.bytes_per_sec as f64;
        Self {
            frames,
            params,
            resampler: None,
            audio_diff_avg_coef,
            audio_diff_threshold,
            audio_diff_avg_count: 0,
            audio_diff_cum: 0.0,
            audio_clock_value: f64::NAN,
            audio_clock_serial: 0,
        }
    }

    pub fn audio_clock_value(&self) -> f64 {
        self.audio_clock_value
    }

    pub fn audio_clock_serial(&self) -> u64 {
        self.audio_clock_serial
    }

    /// Computes the adjusted sample count for a frame whose nominal sample
    /// count is `nb_samples`, given the running `diff = audio_clock -
    /// master_clock`. Returns the nominal count unchanged when the sync
    /// mode is audio-mastered (there is nothing to correct against) or the
    /// EMA has not yet stabilized.
    pub fn wanted_nb_samples(&mut self, mode: AvSyncMode, nb_samples: usize, diff: f64) -> usize {
        if mode == AvSyncMode::AudioMaster || diff.is_nan() {
            self.audio_diff_avg_count = 0;
            self.audio_diff_cum = 0.0;
            return nb_samples;
        }

        self.audio_diff_cum = diff + self.audio_diff_avg_coef * self.audio_diff_cum;
        self.audio_diff_avg_count += 1;

        if self.audio_diff_avg_count < AUDIO_DIFF_AVG_NB {
            return nb_samples;
        }

        let avg_diff = self.audio_diff_cum * (1.0 - self.audio_diff_avg_coef);
        if avg_diff.abs() < self.audio_diff_threshold {
            return nb_samples;
        }

        let wanted = nb_samples as f64 + diff * self.params.sample_rate as f64;
        let min = nb_samples as f64 * 0.9;
        let max = nb_samples as f64 * 1.1;
        wanted.clamp(min, max).round() as usize
    }

    /// Rebuilds the resampler when the source shape changes or the
    /// compensated target rate moves, then runs one frame through it.
    ///
    /// The device rate stays fixed at `self.params.sample_rate`; drift
    /// compensation is applied by asking the resampler for a slightly
    /// different *effective* destination rate (`wanted`/`nb_samples` off
    /// the nominal device rate) instead of the original's
    /// `swr_set_compensation`, which `ffmpeg-next`'s safe wrapper does not
    /// expose. Over many frames this nudges playback speed by the same
    /// small fraction `swr_set_compensation` would.
    fn resample(&mut self, frame: &AudioFrame, wanted: usize) -> Result<Vec<u8>> {
        let nb_samples = frame.nb_samples.max(1);
        let effective_dst_rate = ((self.params.sample_rate as u64 * wanted as u64)
            / nb_samples as u64)
            .max(1) as u32;

        let needs_rebuild = match &self.resampler {
            None => true,
            Some(state) => {
                state.src_sample_format != frame.sample_format
                    || state.src_channel_layout != frame.channel_layout
                    || state.src_sample_rate != frame.sample_rate
                    || state.effective_dst_rate != effective_dst_rate
            }
        };

        if needs_rebuild {
            let src_sample = sample_format_to_ffmpeg(frame.sample_format)
                .ok_or_else(|| PlayerError::unsupported("unsupported source sample format"))?;
            let src_layout = channel_layout_to_ffmpeg(frame.channel_layout);
            let dst_sample = sample_format_to_ffmpeg(self.params.sample_format)
                .ok_or_else(|| PlayerError::unsupported("unsupported device sample format"))?;
            let dst_layout = channel_layout_to_ffmpeg(self.params.channel_layout);

            let context = ResamplerContext::get(
                src_sample,
                src_layout,
                frame.sample_rate,
                dst_sample,
                dst_layout,
                effective_dst_rate,
            )
            .map_err(|e| PlayerError::from(ffmpeg_types::Error::codec(e.to_string())))?;

            self.resampler = Some(ResamplerState {
                context,
                src_sample_format: frame.sample_format,
                src_channel_layout: frame.channel_layout,
                src_sample_rate: frame.sample_rate,
                effective_dst_rate,
            });
        }

        let state = self.resampler.as_mut().expect("resampler just ensured");

        let src_sample = sample_format_to_ffmpeg(frame.sample_format)
            .ok_or_else(|| PlayerError::unsupported("unsupported source sample format"))?;
        let src_layout = channel_layout_to_ffmpeg(frame.channel_layout);
        let mut src_frame = FfAudioFrame::new(src_sample, nb_samples, src_layout);
        src_frame.set_rate(frame.sample_rate);
        let src_bytes = nb_samples * frame.channel_layout.channels() as usize
            * frame.sample_format.bytes_per_sample();
        src_frame.data_mut(0)[..src_bytes].copy_from_slice(&frame.data[..src_bytes]);

        let dst_sample = sample_format_to_ffmpeg(self.params.sample_format)
            .ok_or_else(|| PlayerError::unsupported("unsupported device sample format"))?;
        let dst_layout = channel_layout_to_ffmpeg(self.params.channel_layout);
        let estimate = (nb_samples as u64 * self.params.sample_rate as u64
            / frame.sample_rate.max(1) as u64
            + 64) as usize;
        let mut dst_frame = FfAudioFrame::new(dst_sample, estimate, dst_layout);
        dst_frame.set_rate(self.params.sample_rate);

        state
            .context
            .run(&src_frame, &mut dst_frame)
            .map_err(|e| PlayerError::from(ffmpeg_types::Error::codec(e.to_string())))?;

        let out_bytes = dst_frame.samples()
            * self.params.channel_layout.channels() as usize
            * self.params.sample_format.bytes_per_sample();
        Ok(dst_frame.data(0)[..out_bytes].to_vec())
    }

    /// Drains stale frames (those whose epoch no longer matches the live
    /// packet queue epoch), resamples the next live frame to the device's
    /// negotiated format applying drift compensation, and returns the
    /// converted bytes.
    ///
    /// `live_epoch` is the audio packet queue's current epoch; `mode` and
    /// `master_clock` drive the §4.6 drift-correction EMA the same way the
    /// original's `synchronize_audio` does.
    pub fn acquire_audio_buf(
        &mut self,
        live_epoch: u64,
        mode: AvSyncMode,
        master_clock: f64,
    ) -> Result<Option<Vec<u8>>> {
        loop {
            let Some(queued) = self.frames.peek_readable() else {
                return Ok(None);
            };
            self.frames.next();
            if queued.epoch != live_epoch {
                continue;
            }

            let raw_clock = match queued.frame.pts {
                Some(pts) => {
                    pts.0 as f64 / queued.frame.sample_rate as f64
                        + queued.frame.nb_samples as f64 / queued.frame.sample_rate as f64
                }
                None => f64::NAN,
            };
            let diff = if raw_clock.is_nan() || master_clock.is_nan() {
                f64::NAN
            } else {
                raw_clock - master_clock
            };
            let wanted = self.wanted_nb_samples(mode, queued.frame.nb_samples, diff);

            let out = self.resample(&queued.frame, wanted)?;

            self.audio_clock_value = raw_clock;
            self.audio_clock_serial = queued.epoch;

            return Ok(Some(out));
        }
    }

    /// Called by the embedder after the device has mixed the buffer this
    /// pull produced: sets the audio clock to the PTS of the audio the user
    /// is hearing *now*, not what was just decoded.
    pub fn sync_audio(
        &self,
        clock: &mut Clock,
        write_start_time: std::time::Instant,
        hw_buf_size: usize,
        remaining_bytes: usize,
    ) {
        if self.audio_clock_value.is_nan() {
            return;
        }
        let pending = (2 * hw_buf_size + remaining_bytes) as f64 / self.params.bytes_per_sec as f64;
        clock.set_at(
            self.audio_clock_value - pending,
            self.audio_clock_serial,
            write_start_time,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffmpeg_types::{ChannelLayout, Pts, Rational, SampleFormat};

    fn params() -> AudioParams {
        AudioParams {
            sample_format: SampleFormat::F32,
            channel_layout: ChannelLayout::Stereo,
            sample_rate: 48000,
            frame_size: 1024,
            bytes_per_sec: 48000 * 4 * 2,
        }
    }

    #[test]
    fn audio_master_mode_never_adjusts_sample_count() {
        let packets = Arc::new(crate::packet_queue::PacketQueue::new());
        packets.start();
        let frames = Arc::new(FrameQueue::new(9, true, packets));
        let mut pull = AudioPull::new(frames, params());
        let wanted = pull.wanted_nb_samples(AvSyncMode::AudioMaster, 1024, 0.5);
        assert_eq!(wanted, 1024);
    }

    #[test]
    fn ema_does_not_correct_before_stabilizing() {
        let packets = Arc::new(crate::packet_queue::PacketQueue::new());
        packets.start();
        let frames = Arc::new(FrameQueue::new(9, true, packets));
        let mut pull = AudioPull::new(frames, params());
        let wanted = pull.wanted_nb_samples(AvSyncMode::VideoMaster, 1024, 0.5);
        assert_eq!(wanted, 1024);
    }

    #[test]
    fn wanted_samples_are_clamped_to_plus_minus_ten_percent() {
        let packets = Arc::new(crate::packet_queue::PacketQueue::new());
        packets.start();
        let frames = Arc::new(FrameQueue::new(9, true, packets));
        let mut pull = AudioPull::new(frames, params());
        for _ in 0..AUDIO_DIFF_AVG_NB {
            pull.wanted_nb_samples(AvSyncMode::VideoMaster, 1024, 10.0);
        }
        let wanted = pull.wanted_nb_samples(AvSyncMode::VideoMaster, 1024, 10.0);
        assert!(wanted as f64 <= 1024.0 * 1.1 + 1.0);
        assert!(wanted as f64 >= 1024.0 * 0.9 - 1.0);
    }

    #[test]
    fn resample_same_format_passthrough_preserves_sample_count() {
        let packets = Arc::new(crate::packet_queue::PacketQueue::new());
        packets.start();
        let frames = Arc::new(FrameQueue::new(9, true, packets));
        let mut pull = AudioPull::new(frames, params());
        let frame = AudioFrame::new(
            vec![0u8; 1024 * 2 * 4],
            SampleFormat::F32,
            ChannelLayout::Stereo,
            48000,
            1024,
            Some(Pts(0)),
            Rational::new(1, 48000),
        );
        let out = pull.resample(&frame, 1024).expect("resample should succeed");
        assert_eq!(out.len(), 1024 * 2 * 4);
    }
}
