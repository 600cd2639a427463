use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Playing/paused bookkeeping for the active session.
///
/// The clock keeps running while paused. `resume` reports how long the pause
/// lasted so the caller can shift every pending deadline by that amount.
#[derive(Debug, Clone, Default)]
pub struct Transport {
    state: TransportState,
    paused_at: Option<f64>,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state != TransportState::Stopped
    }

    pub fn is_paused(&self) -> bool {
        self.state == TransportState::Paused
    }

    pub fn paused_at(&self) -> Option<f64> {
        self.paused_at
    }

    /// Game-visible time rate: zero while paused.
    pub fn time_scale(&self) -> f64 {
        match self.state {
            TransportState::Paused => 0.0,
            _ => 1.0,
        }
    }

    pub fn start(&mut self) {
        self.state = TransportState::Playing;
        self.paused_at = None;
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.paused_at = None;
    }

    /// Returns `false` when not playing or already paused.
    pub fn pause(&mut self, now: f64) -> bool {
        if self.state != TransportState::Playing {
            return false;
        }
        self.state = TransportState::Paused;
        self.paused_at = Some(now);
        true
    }

    /// Returns the pause duration, or `None` when not paused. A clock that
    /// reads earlier than the pause point yields a zero shift.
    pub fn resume(&mut self, now: f64) -> Option<f64> {
        if self.state != TransportState::Paused {
            return None;
        }
        let paused_at = self.paused_at.take()?;
        self.state = TransportState::Playing;
        Some((now - paused_at).max(0.0))
    }
}
