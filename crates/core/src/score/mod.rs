use serde::{Deserialize, Serialize};

use crate::{config::ScoringConfig, Judgment};

/// Running totals for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreState {
    pub score: u64,
    pub combo: u32,
    pub max_combo: u32,
    pub perfect: u32,
    pub good: u32,
    pub ok: u32,
    pub miss: u32,
}

impl ScoreState {
    pub fn judged(&self) -> u32 {
        self.perfect + self.good + self.ok + self.miss
    }

    pub fn count(&self, judgment: Judgment) -> u32 {
        match judgment {
            Judgment::Perfect => self.perfect,
            Judgment::Good => self.good,
            Judgment::Ok => self.ok,
            Judgment::Miss => self.miss,
        }
    }
}

/// End-of-track results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub score: u64,
    pub max_combo: u32,
    pub perfect: u32,
    pub good: u32,
    pub ok: u32,
    pub miss: u32,
    /// Share of judged notes that were hit, in `[0, 1]`.
    pub accuracy: f64,
}

/// Accumulates judgments into score and combo.
#[derive(Debug, Clone, Default)]
pub struct ScoreAggregator {
    config: ScoringConfig,
    state: ScoreState,
}

impl ScoreAggregator {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config,
            state: ScoreState::default(),
        }
    }

    pub fn state(&self) -> &ScoreState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = ScoreState::default();
    }

    /// Current multiplier, derived from the combo before the next hit.
    pub fn multiplier(&self) -> u64 {
        1 + u64::from(self.state.combo / self.config.combo_step.max(1))
    }

    /// Routes any judgment to the hit or miss path. Returns the points
    /// awarded, zero for a miss.
    pub fn record(&mut self, judgment: Judgment) -> u64 {
        match judgment {
            Judgment::Miss => {
                self.register_miss();
                0
            }
            hit => self.register_hit(hit),
        }
    }

    /// Adds points for a hit. Returns the points awarded.
    pub fn register_hit(&mut self, judgment: Judgment) -> u64 {
        let base = match judgment {
            Judgment::Perfect => self.config.perfect_points,
            Judgment::Good => self.config.good_points,
            Judgment::Ok => self.config.ok_points,
            Judgment::Miss => {
                self.register_miss();
                return 0;
            }
        };
        let points = base * self.multiplier();

        let state = &mut self.state;
        state.score += points;
        state.combo += 1;
        state.max_combo = state.max_combo.max(state.combo);
        match judgment {
            Judgment::Perfect => state.perfect += 1,
            Judgment::Good => state.good += 1,
            _ => state.ok += 1,
        }
        points
    }

    pub fn register_miss(&mut self) {
        self.state.combo = 0;
        self.state.miss += 1;
    }

    pub fn summary(&self) -> ScoreSummary {
        let state = &self.state;
        let judged = state.judged();
        let accuracy = if judged == 0 {
            0.0
        } else {
            f64::from(judged - state.miss) / f64::from(judged)
        };
        ScoreSummary {
            score: state.score,
            max_combo: state.max_combo,
            perfect: state.perfect,
            good: state.good,
            ok: state.ok,
            miss: state.miss,
            accuracy,
        }
    }
}
