/*!
    Shared types for the ffmpeg crate ecosystem.

    This crate defines the vocabulary of the ecosystem — the types that cross crate
    boundaries. It has no dependency on FFmpeg, making it lightweight and enabling
    consumers to depend on it without pulling in FFmpeg bindings.
*/

mod codec;
mod error;
mod format;
mod frame;
mod packet;
mod rational;
mod stream;

pub use codec::CodecId;
pub use error::{Error, Result};
pub use format::{ChannelLayout, PixelFormat, SampleFormat};
pub use frame::{AudioFrame, VideoFrame};
pub use packet::{MediaDuration, Packet, Pts, StreamType};
pub use rational::Rational;
pub use stream::{AudioStreamInfo, MediaInfo, VideoStreamInfo};
