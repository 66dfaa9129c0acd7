/*!
    Monotonic virtual clock tied to a queue epoch (C1).

    Grounded on `ffmpeg_types::{AudioClock, WallClock}` in the teacher's own
    `playback/player.rs` (the `PlaybackClock` enum), generalized here to the
    three named clocks (audio/video/external) the synchronizer needs, each
    anchored to an [`EpochHandle`] instead of to a fixed sample rate.
*/

use std::time::Instant;

use crate::epoch::EpochHandle;

/// A no-sync threshold past which the synchronizer gives up correcting and
/// accepts the slave clock's value outright.
pub const AV_NOSYNC_THRESHOLD: f64 = 10.0;

#[derive(Clone)]
pub struct Clock {
    pts: f64,
    pts_drift: f64,
    last_updated: Instant,
    speed: f64,
    paused: bool,
    epoch: EpochHandle,
    stored_epoch: u64,
}

impl Clock {
    /// A clock anchored to `epoch`; unset until the first [`Clock::set`].
    pub fn new(epoch: EpochHandle) -> Self {
        let now = Instant::now();
        Self {
            pts: f64::NAN,
            pts_drift: f64::NAN,
            last_updated: now,
            speed: 1.0,
            paused: false,
            epoch,
            stored_epoch: u64::MAX,
        }
    }

    /// A clock with no owning queue: its epoch handle is never bumped by a
    /// flush, so [`Clock::get`] never reads as stale on that account.
    pub fn free_standing() -> Self {
        Self::new(EpochHandle::free_standing())
    }

    pub fn epoch_handle(&self) -> &EpochHandle {
        &self.epoch
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    /// The clock's projected value right now, or `NaN` if the clock is
    /// unset or stale (its stored epoch no longer matches the live one).
    pub fn get(&self) -> f64 {
        if self.epoch.get() != self.stored_epoch {
            return f64::NAN;
        }
        if self.paused {
            return self.pts;
        }
        let elapsed = self.last_updated.elapsed().as_secs_f64();
        self.pts_drift + elapsed * self.speed
    }

    pub fn set_at(&mut self, pts: f64, epoch: u64, wall_time: Instant) {
        self.pts = pts;
        self.last_updated = wall_time;
        self.pts_drift = pts;
        self.stored_epoch = epoch;
    }

    pub fn set(&mut self, pts: f64, epoch: u64) {
        self.set_at(pts, epoch, Instant::now());
    }

    /// Re-anchors at the current projected value before changing speed, so
    /// the instant the caller reads just after does not jump.
    pub fn set_speed(&mut self, speed: f64) {
        let now = self.get();
        let epoch = self.stored_epoch;
        self.set(now, epoch);
        self.speed = speed;
    }

    /// Pulls this clock to `slave`'s value if this clock is unset or the two
    /// diverge by more than `no_sync_threshold` seconds.
    pub fn sync_to_slave(&mut self, slave: &Clock, no_sync_threshold: f64) {
        let own = self.get();
        let slave_value = slave.get();
        if !slave_value.is_nan() && (own.is_nan() || (own - slave_value).abs() > no_sync_threshold)
        {
            self.set(slave_value, slave.stored_epoch);
        }
    }

    /// Re-anchors at the current instant before freezing; a paused clock's
    /// `get()` then returns this same value until `resume`.
    pub fn pause(&mut self) {
        if self.paused {
            return;
        }
        let now = self.get();
        let epoch = self.stored_epoch;
        self.set(now, epoch);
        self.paused = true;
    }

    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        let epoch = self.stored_epoch;
        self.set(self.pts, epoch);
        self.paused = false;
    }

    pub fn toggle_pause(&mut self) {
        if self.paused {
            self.resume();
        } else {
            self.pause();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn unset_clock_reads_nan() {
        let clock = Clock::new(EpochHandle::new());
        assert!(clock.get().is_nan());
    }

    #[test]
    fn stale_epoch_reads_nan() {
        let epoch = EpochHandle::new();
        let mut clock = Clock::new(epoch.clone());
        clock.set(1.0, epoch.get());
        epoch.bump();
        assert!(clock.get().is_nan());
    }

    #[test]
    fn paused_clock_holds_stored_pts() {
        let epoch = EpochHandle::new();
        let mut clock = Clock::new(epoch.clone());
        clock.set(5.0, epoch.get());
        clock.pause();
        sleep(Duration::from_millis(20));
        assert_eq!(clock.get(), 5.0);
    }

    #[test]
    fn toggle_pause_round_trip_preserves_value() {
        let epoch = EpochHandle::new();
        let mut clock = Clock::new(epoch.clone());
        clock.set(2.0, epoch.get());
        let before = clock.get();
        clock.toggle_pause();
        clock.toggle_pause();
        let after = clock.get();
        assert!((after - before).abs() < 0.05);
    }

    #[test]
    fn set_speed_does_not_jump_current_value() {
        let epoch = EpochHandle::new();
        let mut clock = Clock::new(epoch.clone());
        clock.set(3.0, epoch.get());
        let before = clock.get();
        clock.set_speed(2.0);
        let after = clock.get();
        assert!((after - before).abs() < 0.01);
        assert_eq!(clock.speed(), 2.0);
    }

    #[test]
    fn sync_to_slave_pulls_when_unset() {
        let epoch = EpochHandle::new();
        let mut master = Clock::new(epoch.clone());
        let mut slave = Clock::new(epoch.clone());
        slave.set(7.0, epoch.get());
        master.sync_to_slave(&slave, AV_NOSYNC_THRESHOLD);
        assert!((master.get() - 7.0).abs() < 0.01);
    }

    #[test]
    fn sync_to_slave_leaves_close_values_alone() {
        let epoch = EpochHandle::new();
        let mut master = Clock::new(epoch.clone());
        let mut slave = Clock::new(epoch.clone());
        master.set(1.0, epoch.get());
        slave.set(1.02, epoch.get());
        master.sync_to_slave(&slave, AV_NOSYNC_THRESHOLD);
        assert!((master.get() - 1.0).abs() < 0.05);
    }

    #[test]
    fn free_standing_clock_never_goes_stale() {
        let mut clock = Clock::free_standing();
        clock.set(4.0, clock.epoch_handle().get());
        assert!(!clock.get().is_nan());
    }
}
