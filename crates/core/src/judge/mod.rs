//! Hit judgment: match an input time to the nearest live note and classify
//! the timing error.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{config::JudgeWindows, NoteId, NoteRegistry};

/// Slack added to every window comparison so a delta computed as
/// `0.08000000000000007` from `2.08 - 2.0` still lands in the 0.08 band.
const WINDOW_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Judgment {
    Perfect,
    Good,
    Ok,
    Miss,
}

impl Judgment {
    pub fn is_hit(self) -> bool {
        !matches!(self, Judgment::Miss)
    }
}

impl fmt::Display for Judgment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Judgment::Perfect => "Perfect",
            Judgment::Good => "Good",
            Judgment::Ok => "OK",
            Judgment::Miss => "Miss",
        };
        f.write_str(label)
    }
}

/// Direction of a noticeable timing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timing {
    Early,
    Late,
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timing::Early => f.write_str("Early"),
            Timing::Late => f.write_str("Late"),
        }
    }
}

/// A successful match between an input and a note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub note: NoteId,
    pub judgment: Judgment,
    /// `input_time - hit_time`; negative means the input was early.
    pub delta: f64,
    pub timing: Option<Timing>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JudgeOutcome {
    Hit(Hit),
    /// No approaching note within the widest window. Costs nothing.
    Ignored,
}

impl JudgeWindows {
    /// First band containing `abs_delta`, or `None` past the OK window.
    pub fn classify(&self, abs_delta: f64) -> Option<Judgment> {
        if abs_delta <= self.perfect + WINDOW_EPSILON {
            Some(Judgment::Perfect)
        } else if abs_delta <= self.good + WINDOW_EPSILON {
            Some(Judgment::Good)
        } else if abs_delta <= self.ok + WINDOW_EPSILON {
            Some(Judgment::Ok)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct Judge {
    windows: JudgeWindows,
    label_threshold: f64,
}

impl Judge {
    pub fn new(windows: JudgeWindows, label_threshold: f64) -> Self {
        Self {
            windows,
            label_threshold,
        }
    }

    pub fn windows(&self) -> &JudgeWindows {
        &self.windows
    }

    /// Early/Late label for a signed delta; `None` inside the threshold.
    pub fn timing(&self, delta: f64) -> Option<Timing> {
        if delta < -self.label_threshold {
            Some(Timing::Early)
        } else if delta > self.label_threshold {
            Some(Timing::Late)
        } else {
            None
        }
    }

    /// Finds the approaching note nearest to `input_time` without touching
    /// the registry. Equal distances keep the earlier-spawned note.
    pub fn nearest(&self, notes: &NoteRegistry, input_time: f64) -> Option<(NoteId, f64)> {
        let mut best: Option<(NoteId, f64)> = None;
        for note in notes.approaching() {
            let delta = input_time - note.hit_time();
            let closer = best.map_or(true, |(_, current)| delta.abs() < current.abs());
            if closer {
                best = Some((note.id(), delta));
            }
        }
        best
    }

    /// Judges one input and resolves the matched note.
    pub fn judge(&self, notes: &mut NoteRegistry, input_time: f64) -> JudgeOutcome {
        let Some((note, delta)) = self.nearest(notes, input_time) else {
            return JudgeOutcome::Ignored;
        };
        let Some(judgment) = self.windows.classify(delta.abs()) else {
            return JudgeOutcome::Ignored;
        };

        // `nearest` only returns approaching notes, so this cannot fail.
        if let Err(err) = notes.resolve(note, judgment, input_time) {
            tracing::warn!(%err, "judged note could not be resolved");
            return JudgeOutcome::Ignored;
        }

        tracing::debug!(%note, %judgment, delta, "note judged");
        JudgeOutcome::Hit(Hit {
            note,
            judgment,
            delta,
            timing: self.timing(delta),
        })
    }
}

impl Default for Judge {
    fn default() -> Self {
        Self::new(JudgeWindows::default(), 0.03)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(hit_times: &[f64]) -> NoteRegistry {
        let mut notes = NoteRegistry::new(1.5, 0.08, 0.2);
        for (index, hit_time) in hit_times.iter().enumerate() {
            notes.spawn(index, *hit_time, 0.0);
        }
        notes
    }

    fn hit(outcome: JudgeOutcome) -> Hit {
        match outcome {
            JudgeOutcome::Hit(hit) => hit,
            JudgeOutcome::Ignored => panic!("expected a hit"),
        }
    }

    #[test]
    fn classification_boundaries() {
        let windows = JudgeWindows::default();
        assert_eq!(windows.classify(0.0), Some(Judgment::Perfect));
        assert_eq!(windows.classify(0.08), Some(Judgment::Perfect));
        assert_eq!(windows.classify(0.080001), Some(Judgment::Good));
        assert_eq!(windows.classify(0.15), Some(Judgment::Good));
        assert_eq!(windows.classify(0.20), Some(Judgment::Ok));
        assert_eq!(windows.classify(0.2001), None);
    }

    #[test]
    fn window_edges_survive_float_subtraction() {
        let judge = Judge::default();
        let mut notes = registry_with(&[2.0]);
        let outcome = hit(judge.judge(&mut notes, 2.08));
        assert_eq!(outcome.judgment, Judgment::Perfect);
    }

    #[test]
    fn picks_nearest_note() {
        let judge = Judge::default();
        let mut notes = registry_with(&[1.0, 1.25, 1.5]);
        let outcome = hit(judge.judge(&mut notes, 1.3));

        assert_eq!(notes.get(outcome.note).unwrap().beat_index(), 1);
        assert_eq!(outcome.judgment, Judgment::Perfect);
        assert_eq!(outcome.timing, Some(Timing::Late));
    }

    #[test]
    fn whiff_is_ignored_without_side_effects() {
        let judge = Judge::default();
        let mut notes = registry_with(&[5.0]);

        assert_eq!(judge.judge(&mut notes, 4.7), JudgeOutcome::Ignored);
        assert_eq!(notes.approaching().count(), 1);

        let mut empty = registry_with(&[]);
        assert_eq!(judge.judge(&mut empty, 4.7), JudgeOutcome::Ignored);
    }

    #[test]
    fn never_resolves_the_same_note_twice() {
        let judge = Judge::default();
        let mut notes = registry_with(&[1.0, 1.15]);

        let first = hit(judge.judge(&mut notes, 1.0));
        let second = hit(judge.judge(&mut notes, 1.0));
        assert_ne!(first.note, second.note);
        assert_eq!(second.judgment, Judgment::Good);

        assert_eq!(judge.judge(&mut notes, 1.0), JudgeOutcome::Ignored);
    }

    #[test]
    fn equal_distance_prefers_earlier_note() {
        let judge = Judge::default();
        let mut notes = registry_with(&[1.0, 1.25]);
        let outcome = hit(judge.judge(&mut notes, 1.125));
        assert_eq!(notes.get(outcome.note).unwrap().beat_index(), 0);
        assert_eq!(outcome.judgment, Judgment::Good);
    }

    #[test]
    fn labels_only_beyond_threshold() {
        let judge = Judge::default();
        assert_eq!(judge.timing(-0.05), Some(Timing::Early));
        assert_eq!(judge.timing(0.05), Some(Timing::Late));
        assert_eq!(judge.timing(0.03), None);
        assert_eq!(judge.timing(-0.03), None);
    }
}
