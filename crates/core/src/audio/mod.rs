use serde::{Deserialize, Serialize};

use crate::{AudioClip, Result, RhythmError};

/// What the playback device is doing, as far as the engine knows.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Idle,
    /// Clip will start (or started) at this clock time.
    Scheduled { start_time: f64 },
    Paused,
    Stopped,
}

/// Playback device interface. Implementations schedule against the same
/// clock the engine reads.
pub trait AudioOutput {
    /// Loads or validates `clip` so it can be scheduled.
    fn prepare(&mut self, clip: &AudioClip) -> Result<()>;
    fn play_scheduled(&mut self, start_time: f64);
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    fn state(&self) -> PlaybackState;
    /// Length of the prepared clip in seconds.
    fn clip_duration(&self) -> Option<f64>;
}

/// Backend that tracks playback state without producing sound. Used when no
/// audio device is attached and in tests.
#[derive(Debug, Default, Clone)]
pub struct SilentOutput {
    clip: Option<AudioClip>,
    state: PlaybackState,
    resume_state: Option<PlaybackState>,
}

impl SilentOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clip(&self) -> Option<&AudioClip> {
        self.clip.as_ref()
    }
}

impl AudioOutput for SilentOutput {
    fn prepare(&mut self, clip: &AudioClip) -> Result<()> {
        if !clip.duration.is_finite() || clip.duration < 0.0 {
            return Err(RhythmError::InvalidInput(format!(
                "clip `{}` has an invalid duration",
                clip.path.display()
            )));
        }
        self.clip = Some(clip.clone());
        self.state = PlaybackState::Idle;
        Ok(())
    }

    fn play_scheduled(&mut self, start_time: f64) {
        if self.clip.is_some() {
            self.state = PlaybackState::Scheduled { start_time };
        }
    }

    fn pause(&mut self) {
        if let PlaybackState::Scheduled { .. } = self.state {
            self.resume_state = Some(self.state);
            self.state = PlaybackState::Paused;
        }
    }

    fn resume(&mut self) {
        if self.state == PlaybackState::Paused {
            self.state = self.resume_state.take().unwrap_or_default();
        }
    }

    fn stop(&mut self) {
        if self.state != PlaybackState::Idle {
            self.state = PlaybackState::Stopped;
        }
        self.resume_state = None;
    }

    fn state(&self) -> PlaybackState {
        self.state
    }

    fn clip_duration(&self) -> Option<f64> {
        self.clip.as_ref().map(|clip| clip.duration)
    }
}
