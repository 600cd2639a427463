//! Playback scheduling: binds a beat schedule to an absolute start time on
//! the clock and releases notes as their spawn times come due.

use serde::{Deserialize, Serialize};

use crate::BeatSchedule;

/// A beat whose spawn time has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnEvent {
    pub beat_index: usize,
    /// Absolute clock time at which the note should be struck.
    pub hit_time: f64,
    /// `hit_time - approach_time`. May lie before the tick that emitted it.
    pub spawn_time: f64,
}

/// Output of one scheduling tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerTick {
    pub spawns: Vec<SpawnEvent>,
    /// Set on the single tick that detects end of track.
    pub finished: bool,
}

/// Cursor over a [`BeatSchedule`] anchored at `start_time`.
#[derive(Debug, Clone)]
pub struct PlaybackScheduler {
    schedule: BeatSchedule,
    start_time: f64,
    next_beat: usize,
    approach_time: f64,
    track_duration: f64,
    end_grace: f64,
    finished: bool,
}

impl PlaybackScheduler {
    pub fn new(
        schedule: BeatSchedule,
        start_time: f64,
        approach_time: f64,
        track_duration: f64,
        end_grace: f64,
    ) -> Self {
        Self {
            schedule,
            start_time,
            next_beat: 0,
            approach_time,
            track_duration,
            end_grace,
            finished: false,
        }
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn next_beat_index(&self) -> usize {
        self.next_beat
    }

    pub fn schedule(&self) -> &BeatSchedule {
        &self.schedule
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn remaining(&self) -> usize {
        self.schedule.len() - self.next_beat
    }

    /// Absolute hit time for beat `index` under the given offset.
    pub fn hit_time(&self, index: usize, offset_sec: f64) -> Option<f64> {
        self.schedule
            .get(index)
            .map(|beat| self.start_time + beat + offset_sec)
    }

    pub fn spawn_time(&self, index: usize, offset_sec: f64) -> Option<f64> {
        self.hit_time(index, offset_sec)
            .map(|hit| hit - self.approach_time)
    }

    /// Clock time after which the track counts as complete.
    pub fn end_time(&self) -> f64 {
        self.start_time + self.track_duration + self.end_grace
    }

    /// Emits every due beat in index order, then checks for end of track.
    ///
    /// `offset_sec` is read fresh each tick so an offset change only affects
    /// beats that have not spawned yet.
    pub fn tick(&mut self, now: f64, offset_sec: f64) -> SchedulerTick {
        let mut tick = SchedulerTick::default();

        while let Some(hit_time) = self.hit_time(self.next_beat, offset_sec) {
            let spawn_time = hit_time - self.approach_time;
            if now < spawn_time {
                break;
            }
            tick.spawns.push(SpawnEvent {
                beat_index: self.next_beat,
                hit_time,
                spawn_time,
            });
            self.next_beat += 1;
        }

        if !self.finished && self.remaining() == 0 && now > self.end_time() {
            self.finished = true;
            tick.finished = true;
        }

        tick
    }

    /// Moves the anchor forward after a pause so later beats keep their
    /// position relative to the audio.
    pub fn shift_start(&mut self, delta: f64) {
        self.start_time += delta;
    }
}
