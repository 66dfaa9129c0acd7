/*!
    Embedder-supplied configuration, constructed directly by the
    application rather than parsed from a CLI (CLI parsing is explicitly
    out of scope). Grounded on `ff_player_opts_t` in
    `original_source/src/ff_player.c`.
*/

use std::time::Duration;

use crate::sync::AvSyncMode;

#[derive(Clone, Debug)]
pub struct PlayerOpts {
    /// Start position, applied once at open.
    pub start_time: Option<Duration>,
    /// Play-range end, relative to `start_time` when both are set.
    pub duration: Option<Duration>,
    /// Restart from `start_time` on EOF instead of signalling completion.
    pub loop_playback: bool,
    /// Skip opening an audio stream even if one is present.
    pub audio_disabled: bool,
    /// Skip opening a video stream even if one is present.
    pub video_disabled: bool,
    pub av_sync_mode: AvSyncMode,
    /// Linear volume in `[0.0, 1.0]`; `update_volume` adjusts this
    /// logarithmically.
    pub audio_volume: f32,
    /// Prefer byte-offset seeking when the container supports it.
    pub seek_by_bytes: bool,
}

impl Default for PlayerOpts {
    fn default() -> Self {
        Self {
            start_time: None,
            duration: None,
            loop_playback: false,
            audio_disabled: false,
            video_disabled: false,
            av_sync_mode: AvSyncMode::AudioMaster,
            audio_volume: 1.0,
            seek_by_bytes: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_opts_play_from_start_unmuted() {
        let opts = PlayerOpts::default();
        assert!(opts.start_time.is_none());
        assert_eq!(opts.audio_volume, 1.0);
        assert_eq!(opts.av_sync_mode, AvSyncMode::AudioMaster);
    }
}
