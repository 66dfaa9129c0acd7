/*!
    Master clock selection and delay policy (C6).

    Constants and thresholds are carried over verbatim from
    `original_source/src/ff_player.c`; the per-stream "starved"/"not holding
    back" split in [`external_clock_speed_step`] is the resolution of the
    operator-precedence open question recorded in `DESIGN.md`.
*/

use crate::clock::Clock;

pub const AV_SYNC_THRESHOLD_MIN: f64 = 0.04;
pub const AV_SYNC_THRESHOLD_MAX: f64 = 0.10;
pub const AV_SYNC_FRAMEDUP_THRESHOLD: f64 = 0.10;

pub const EXTERNAL_CLOCK_MIN_FRAMES: usize = 2;
pub const EXTERNAL_CLOCK_MAX_FRAMES: usize = 10;
pub const EXTERNAL_CLOCK_SPEED_STEP: f64 = 0.001;
pub const EXTERNAL_CLOCK_SPEED_MIN: f64 = 0.900;
pub const EXTERNAL_CLOCK_SPEED_MAX: f64 = 1.010;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AvSyncMode {
    AudioMaster,
    VideoMaster,
    ExternalClock,
}

impl Default for AvSyncMode {
    fn default() -> Self {
        Self::AudioMaster
    }
}

/// Per-stream presence/progress used by [`external_clock_speed_step`]; one
/// instance each for the audio and video stream.
#[derive(Clone, Copy, Debug)]
pub struct StreamProgress {
    pub present: bool,
    pub packet_count: usize,
}

impl StreamProgress {
    pub const ABSENT: Self = Self {
        present: false,
        packet_count: 0,
    };

    /// Present and under the minimum packet count: this stream is holding
    /// the external clock back from speeding up.
    fn starved(&self) -> bool {
        self.present && self.packet_count <= EXTERNAL_CLOCK_MIN_FRAMES
    }

    fn above_max_frames(&self) -> bool {
        !self.present || self.packet_count > EXTERNAL_CLOCK_MAX_FRAMES
    }
}

/// Given the nominal frame duration and the master/video clock reading,
/// returns the delay to actually wait before presenting the next frame.
pub fn target_delay(
    nominal_delay: f64,
    mode: AvSyncMode,
    video_clock: f64,
    master_clock: f64,
    max_frame_duration: f64,
) -> f64 {
    if mode == AvSyncMode::VideoMaster {
        return nominal_delay;
    }

    let diff = video_clock - master_clock;
    if diff.is_nan() || diff.abs() >= max_frame_duration {
        return nominal_delay;
    }

    let sync_threshold = nominal_delay.clamp(AV_SYNC_THRESHOLD_MIN, AV_SYNC_THRESHOLD_MAX);

    if diff <= -sync_threshold {
        (nominal_delay + diff).max(0.0)
    } else if diff >= sync_threshold && nominal_delay > AV_SYNC_FRAMEDUP_THRESHOLD {
        nominal_delay + diff
    } else if diff >= sync_threshold {
        2.0 * nominal_delay
    } else {
        nominal_delay
    }
}

/// One adjustment step for the external clock's speed, called periodically
/// while the external clock is the master and the source is realtime.
///
/// Ported as an if/else-if chain straight from `check_external_clock_speed`
/// in `original_source/src/ff_player.c`: a stream counts as "starved" when
/// it is present and at or below [`EXTERNAL_CLOCK_MIN_FRAMES`], which takes
/// precedence over the speed-up branch below it.
pub fn external_clock_speed_step(audio: StreamProgress, video: StreamProgress, speed: f64) -> f64 {
    if video.starved() || audio.starved() {
        (speed - EXTERNAL_CLOCK_SPEED_STEP).max(EXTERNAL_CLOCK_SPEED_MIN)
    } else if video.above_max_frames() && audio.above_max_frames() {
        (speed + EXTERNAL_CLOCK_SPEED_STEP).min(EXTERNAL_CLOCK_SPEED_MAX)
    } else if speed != 1.0 {
        speed + EXTERNAL_CLOCK_SPEED_STEP * (1.0 - speed).signum()
    } else {
        speed
    }
}

/// Selects the effective mode, degrading `VideoMaster`/`AudioMaster` when
/// the corresponding stream is absent.
pub fn effective_mode(requested: AvSyncMode, has_video: bool, has_audio: bool) -> AvSyncMode {
    match requested {
        AvSyncMode::VideoMaster if !has_video => {
            effective_mode(AvSyncMode::AudioMaster, has_video, has_audio)
        }
        AvSyncMode::AudioMaster if !has_audio => AvSyncMode::ExternalClock,
        mode => mode,
    }
}

pub fn master_clock<'a>(
    mode: AvSyncMode,
    audio: &'a Clock,
    video: &'a Clock,
    external: &'a Clock,
) -> &'a Clock {
    match mode {
        AvSyncMode::AudioMaster => audio,
        AvSyncMode::VideoMaster => video,
        AvSyncMode::ExternalClock => external,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_mode_degrades_video_master_without_video_to_audio() {
        assert_eq!(
            effective_mode(AvSyncMode::VideoMaster, false, true),
            AvSyncMode::AudioMaster
        );
    }

    #[test]
    fn effective_mode_degrades_all_the_way_to_external() {
        assert_eq!(
            effective_mode(AvSyncMode::VideoMaster, false, false),
            AvSyncMode::ExternalClock
        );
    }

    #[test]
    fn target_delay_returns_nominal_when_video_is_master() {
        let d = target_delay(0.033, AvSyncMode::VideoMaster, 1.0, 5.0, 10.0);
        assert_eq!(d, 0.033);
    }

    #[test]
    fn target_delay_returns_nominal_on_large_diff() {
        let d = target_delay(0.033, AvSyncMode::AudioMaster, 100.0, 0.0, 10.0);
        assert_eq!(d, 0.033);
    }

    #[test]
    fn target_delay_shrinks_when_video_is_behind() {
        // video lagging master by 0.2s should shrink (clamped at 0) the wait
        let d = target_delay(0.033, AvSyncMode::AudioMaster, 0.0, 0.2, 10.0);
        assert_eq!(d, 0.0);
    }

    #[test]
    fn target_delay_doubles_on_small_positive_diff() {
        // video ahead of master by a small amount under the framedup threshold
        let d = target_delay(0.033, AvSyncMode::AudioMaster, 0.2, 0.0, 10.0);
        assert!((d - 0.066).abs() < 1e-9);
    }

    #[test]
    fn external_speed_slows_down_when_a_present_stream_is_starved() {
        let audio = StreamProgress {
            present: true,
            packet_count: 1,
        };
        let video = StreamProgress::ABSENT;
        let speed = external_clock_speed_step(audio, video, 1.0);
        assert!((speed - (1.0 - EXTERNAL_CLOCK_SPEED_STEP)).abs() < 1e-9);
    }

    #[test]
    fn external_speed_does_not_slow_below_minimum() {
        let audio = StreamProgress {
            present: true,
            packet_count: 0,
        };
        let video = StreamProgress::ABSENT;
        let speed = external_clock_speed_step(audio, video, EXTERNAL_CLOCK_SPEED_MIN);
        assert_eq!(speed, EXTERNAL_CLOCK_SPEED_MIN);
    }

    #[test]
    fn external_speed_speeds_up_when_both_streams_well_fed() {
        let audio = StreamProgress {
            present: true,
            packet_count: 20,
        };
        let video = StreamProgress {
            present: true,
            packet_count: 20,
        };
        let speed = external_clock_speed_step(audio, video, 1.0);
        assert!((speed - (1.0 + EXTERNAL_CLOCK_SPEED_STEP)).abs() < 1e-9);
    }

    #[test]
    fn absent_stream_cannot_hold_back_the_speed_up() {
        let audio = StreamProgress {
            present: true,
            packet_count: 20,
        };
        let video = StreamProgress::ABSENT;
        let speed = external_clock_speed_step(audio, video, 1.0);
        assert!((speed - (1.0 + EXTERNAL_CLOCK_SPEED_STEP)).abs() < 1e-9);
    }
}
