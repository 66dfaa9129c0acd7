/*!
    Compressed packet type and the media-type sum type that replaces the
    stream-index/codec-type pair used by the original implementation.
*/

use std::time::Duration;

use crate::Rational;

/// A raw presentation or decode timestamp, in the stream's time base.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pts(pub i64);

/// A raw duration, in the stream's time base.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MediaDuration(pub i64);

/// Which elementary stream a packet or frame belongs to.
///
/// A tagged sum type in place of a `(stream_index, AVMediaType)` pair: code
/// that used to switch on media type now matches exhaustively on this enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamType {
    Audio,
    Video,
}

/// A compressed access unit read from a container.
///
/// The queue epoch is deliberately not a field here: it is a property of the
/// queue slot a packet occupies, stamped by `PacketQueue::put`, not of the
/// packet's own identity.
#[derive(Clone, Debug)]
pub struct Packet {
    pub data: Vec<u8>,
    pub pts: Option<Pts>,
    pub dts: Option<Pts>,
    pub duration: MediaDuration,
    pub time_base: Rational,
    pub is_keyframe: bool,
    pub stream_type: StreamType,
    /// Byte offset of this packet in the container, if known.
    pub pos: Option<u64>,
}

impl Packet {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        data: Vec<u8>,
        pts: Option<Pts>,
        dts: Option<Pts>,
        duration: MediaDuration,
        time_base: Rational,
        is_keyframe: bool,
        stream_type: StreamType,
    ) -> Self {
        Self {
            data,
            pts,
            dts,
            duration,
            time_base,
            is_keyframe,
            stream_type,
            pos: None,
        }
    }

    /// A sentinel packet with no payload, used to signal end-of-stream to a decoder.
    pub fn null(stream_type: StreamType, time_base: Rational) -> Self {
        Self {
            data: Vec::new(),
            pts: None,
            dts: None,
            duration: MediaDuration(0),
            time_base,
            is_keyframe: false,
            stream_type,
            pos: None,
        }
    }

    /// True for a [`Packet::null`] sentinel.
    pub fn is_null(&self) -> bool {
        self.data.is_empty() && self.pts.is_none() && self.dts.is_none()
    }

    /// The packet's presentation timestamp converted to a [`Duration`], if known.
    pub fn presentation_time(&self) -> Option<Duration> {
        let pts = self.pts?;
        let secs = pts.0 as f64 * self.time_base.to_f64();
        if secs.is_finite() && secs >= 0.0 {
            Some(Duration::from_secs_f64(secs))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_presentation_time_converts_time_base() {
        let packet = Packet::new(
            vec![1, 2, 3],
            Some(Pts(90000)),
            None,
            MediaDuration(3000),
            Rational::new(1, 90000),
            true,
            StreamType::Video,
        );
        assert_eq!(packet.presentation_time(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn null_packet_has_no_presentation_time() {
        let packet = Packet::null(StreamType::Audio, Rational::new(1, 48000));
        assert!(packet.is_null());
        assert_eq!(packet.presentation_time(), None);
    }

    #[test]
    fn non_null_packet_is_not_null() {
        let packet = Packet::new(
            vec![1],
            Some(Pts(0)),
            None,
            MediaDuration(0),
            Rational::new(1, 1),
            false,
            StreamType::Video,
        );
        assert!(!packet.is_null());
    }
}
