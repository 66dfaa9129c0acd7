/*!
    The collaborator surface: everything explicitly out of scope (windowing,
    audio device negotiation, error reporting) is handed to the embedder
    through this trait instead of being implemented here.

    Grounded on the original's three C function-pointer typedefs
    (`ff_video_meta_callback`, `ff_audio_meta_callback`, `ff_on_error_
    callback`) and, more loosely, on the callback-shaped fields the
    teacher's `VideoPipeline`/`AudioPipeline` expose to their GUI layer.
*/

use ffmpeg_types::{ChannelLayout, Rational, SampleFormat};

use crate::error::PlayerError;

/// The audio device's negotiated format, returned by
/// [`PlayerCallbacks::on_audio_meta`].
#[derive(Clone, Copy, Debug)]
pub struct AudioParams {
    pub sample_format: SampleFormat,
    pub channel_layout: ChannelLayout,
    pub sample_rate: u32,
    /// Device callback frame size, in samples per channel.
    pub frame_size: usize,
    pub bytes_per_sec: usize,
}

impl AudioParams {
    pub fn bytes_per_sample(&self) -> usize {
        self.sample_format.bytes_per_sample() * self.channel_layout.channels() as usize
    }
}

/// Callbacks the core invokes for anything it cannot decide on its own.
/// Every method has a no-op default so an embedder only overrides what it
/// needs.
pub trait PlayerCallbacks: Send {
    /// Called once the video stream's dimensions and sample aspect ratio
    /// are known (at open, and again after a stream switch).
    fn on_video_meta(&mut self, _width: u32, _height: u32, _sample_aspect_ratio: Rational) {}

    /// Called when opening the audio stream; the embedder opens (or
    /// reconfigures) the audio device and reports back what it actually
    /// accepted.
    fn on_audio_meta(
        &mut self,
        _channel_layout: ChannelLayout,
        _sample_rate: u32,
    ) -> Option<AudioParams> {
        None
    }

    /// Called for reader/decoder-open errors that have no other channel
    /// back to the embedder.
    fn on_error(&mut self, _err: &PlayerError) {}
}

/// A [`PlayerCallbacks`] that does nothing, for headless use or tests.
#[derive(Default)]
pub struct NoopCallbacks;

impl PlayerCallbacks for NoopCallbacks {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_per_sample_multiplies_format_and_channels() {
        let params = AudioParams {
            sample_format: SampleFormat::F32,
            channel_layout: ChannelLayout::Stereo,
            sample_rate: 48000,
            frame_size: 1024,
            bytes_per_sec: 48000 * 4 * 2,
        };
        assert_eq!(params.bytes_per_sample(), 4 * 2);
    }

    #[test]
    fn noop_callbacks_accepts_everything_silently() {
        let mut cb = NoopCallbacks;
        cb.on_video_meta(1920, 1080, Rational::new(1, 1));
        assert!(cb.on_audio_meta(ChannelLayout::Stereo, 48000).is_none());
    }
}
