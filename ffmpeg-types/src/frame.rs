/*!
    Decoded frame types produced by the decode crate and consumed by the
    player's frame queues.
*/

use std::time::Duration;

use crate::{ChannelLayout, PixelFormat, Pts, Rational, SampleFormat};

/// A decoded video picture in a single contiguous buffer (packed formats) or
/// plane-concatenated buffer (planar formats); see `PixelFormat::is_planar`.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pts: Option<Pts>,
    pub time_base: Rational,
    /// Sample aspect ratio; `1/1` when unknown or square pixels.
    pub sample_aspect_ratio: Rational,
}

impl VideoFrame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        pts: Option<Pts>,
        time_base: Rational,
    ) -> Self {
        Self {
            data,
            width,
            height,
            format,
            pts,
            time_base,
            sample_aspect_ratio: Rational::new(1, 1),
        }
    }

    /// The frame's presentation timestamp converted to a [`Duration`], if known.
    pub fn presentation_time(&self) -> Option<Duration> {
        let pts = self.pts?;
        let secs = pts.0 as f64 * self.time_base.to_f64();
        secs.is_finite().then(|| Duration::from_secs_f64(secs.max(0.0)))
    }
}

/// A decoded block of audio samples, interleaved in the device's sample format.
#[derive(Clone, Debug)]
pub struct AudioFrame {
    pub data: Vec<u8>,
    pub sample_format: SampleFormat,
    pub channel_layout: ChannelLayout,
    pub sample_rate: u32,
    pub nb_samples: usize,
    pub pts: Option<Pts>,
    pub time_base: Rational,
}

impl AudioFrame {
    pub fn new(
        data: Vec<u8>,
        sample_format: SampleFormat,
        channel_layout: ChannelLayout,
        sample_rate: u32,
        nb_samples: usize,
        pts: Option<Pts>,
        time_base: Rational,
    ) -> Self {
        Self {
            data,
            sample_format,
            channel_layout,
            sample_rate,
            nb_samples,
            pts,
            time_base,
        }
    }

    /// The frame's presentation timestamp converted to a [`Duration`], if known.
    pub fn presentation_time(&self) -> Option<Duration> {
        let pts = self.pts?;
        let secs = pts.0 as f64 * self.time_base.to_f64();
        secs.is_finite().then(|| Duration::from_secs_f64(secs.max(0.0)))
    }

    /// Presentation timestamp in seconds as an `f64`, `NaN` if unknown.
    pub fn pts_seconds(&self) -> f64 {
        match self.pts {
            Some(pts) => pts.0 as f64 * self.time_base.to_f64(),
            None => f64::NAN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_frame_presentation_time() {
        let frame = VideoFrame::new(
            vec![0; 4],
            2,
            2,
            PixelFormat::Rgba,
            Some(Pts(48000)),
            Rational::new(1, 48000),
        );
        assert_eq!(frame.presentation_time(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn audio_frame_pts_seconds_nan_when_unset() {
        let frame = AudioFrame::new(
            vec![0; 4],
            SampleFormat::F32,
            ChannelLayout::Stereo,
            48000,
            1024,
            None,
            Rational::new(1, 48000),
        );
        assert!(frame.pts_seconds().is_nan());
    }

    #[test]
    fn audio_frame_pts_seconds_converts() {
        let frame = AudioFrame::new(
            vec![0; 4],
            SampleFormat::F32,
            ChannelLayout::Stereo,
            48000,
            1024,
            Some(Pts(24000)),
            Rational::new(1, 48000),
        );
        assert_eq!(frame.pts_seconds(), 0.5);
    }
}
