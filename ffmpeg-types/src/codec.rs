/*!
    Codec identifiers.
*/

/// Identifies the compression format of a stream.
///
/// This is a subset of codecs commonly encountered in media pipelines, not
/// an exhaustive mirror of FFmpeg's `AVCodecID`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    H264,
    H265,
    Vp8,
    Vp9,
    Av1,
    Mpeg4,
    Mpeg2Video,
    Aac,
    Opus,
    Mp3,
    Vorbis,
    Flac,
    PcmS16Le,
    PcmS16Be,
    PcmF32Le,
    Ac3,
}

impl CodecId {
    /// True for the video codecs in this enum.
    pub const fn is_video(self) -> bool {
        matches!(
            self,
            Self::H264
                | Self::H265
                | Self::Vp8
                | Self::Vp9
                | Self::Av1
                | Self::Mpeg4
                | Self::Mpeg2Video
        )
    }

    /// True for the audio codecs in this enum.
    pub const fn is_audio(self) -> bool {
        !self.is_video()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_id_is_video() {
        assert!(CodecId::H264.is_video());
        assert!(!CodecId::Aac.is_video());
    }

    #[test]
    fn codec_id_is_audio() {
        assert!(CodecId::Opus.is_audio());
        assert!(!CodecId::Vp9.is_audio());
    }
}
