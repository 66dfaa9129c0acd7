/*!
    Synchronized audio/video playback core.

    This crate owns demuxing, decode pumping, and audio/video
    synchronization for a single open media source; it has no window, no
    audio device, and no CLI of its own. An embedder drives it through
    [`Player`] and supplies a [`PlayerCallbacks`] implementation for the
    things only it can decide: opening a window and an audio device,
    negotiating the audio format, and reporting errors.

    Ported from `original_source/src/ff_player.c`'s `VideoState` and its
    `read_thread`/decode/`video_refresh` functions, restructured around
    explicit queues and worker threads instead of one monolithic state
    struct and a handful of SDL callbacks.
*/

mod audio_pull;
mod clock;
mod collab;
mod config;
mod decoder;
mod epoch;
mod error;
mod frame_queue;
mod packet_queue;
mod player;
mod reader;
mod sync;
mod video_refresh;

pub use collab::{AudioParams, NoopCallbacks, PlayerCallbacks};
pub use config::PlayerOpts;
pub use error::{PlayerError, Result};
pub use frame_queue::Queued;
pub use player::Player;
pub use sync::AvSyncMode;

pub use ffmpeg_types::{
    AudioFrame, ChannelLayout, MediaInfo, PixelFormat, Rational, SampleFormat, StreamType,
    VideoFrame,
};
