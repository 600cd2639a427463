//! Live notes: spawn, approach interpolation, resolution and expiry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{config::NoteVisualConfig, Judgment, Result, RhythmError};

/// Stable handle for a note inside a [`NoteRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(u64);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NoteState {
    Approaching,
    Resolved {
        judgment: Judgment,
        resolved_at: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    id: NoteId,
    beat_index: usize,
    hit_time: f64,
    approach_time: f64,
    created_time: f64,
    state: NoteState,
    /// Removal deadline once resolved.
    despawn_at: Option<f64>,
}

impl Note {
    pub fn id(&self) -> NoteId {
        self.id
    }

    pub fn beat_index(&self) -> usize {
        self.beat_index
    }

    pub fn hit_time(&self) -> f64 {
        self.hit_time
    }

    /// Always `approach_time` before the hit time, including after pause
    /// shifts.
    pub fn spawn_time(&self) -> f64 {
        self.hit_time - self.approach_time
    }

    /// Clock reading of the tick that created the note.
    pub fn created_time(&self) -> f64 {
        self.created_time
    }

    pub fn state(&self) -> NoteState {
        self.state
    }

    pub fn is_approaching(&self) -> bool {
        matches!(self.state, NoteState::Approaching)
    }

    pub fn judgment(&self) -> Option<Judgment> {
        match self.state {
            NoteState::Approaching => None,
            NoteState::Resolved { judgment, .. } => Some(judgment),
        }
    }

    /// Approach progress in `[0, 1]`; reaches 1 exactly at the hit time.
    pub fn progress(&self, now: f64) -> f64 {
        ((now - self.spawn_time()) / self.approach_time).clamp(0.0, 1.0)
    }

    pub fn visual(&self, now: f64, config: &NoteVisualConfig) -> NoteVisual {
        NoteVisual::at(self.progress(now) as f32, config)
    }
}

/// Presentation values for an approaching note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteVisual {
    pub progress: f32,
    pub scale: f32,
    pub alpha: f32,
}

impl NoteVisual {
    pub fn at(progress: f32, config: &NoteVisualConfig) -> Self {
        let t = progress.clamp(0.0, 1.0);
        // Weighted form lands on `end_scale` bit-for-bit at t = 1.
        let scale = config.start_scale * (1.0 - t) + config.end_scale * t;
        let alpha = if config.fade_in > 0.0 && t < config.fade_in {
            let ramp = t / config.fade_in;
            config.start_alpha + (1.0 - config.start_alpha) * ramp
        } else {
            1.0
        };
        Self {
            progress: t,
            scale,
            alpha,
        }
    }
}

/// Insertion-ordered container of live notes.
///
/// Spawn order equals beat order, so iteration is deterministic and earlier
/// notes come first.
#[derive(Debug, Clone)]
pub struct NoteRegistry {
    notes: Vec<Note>,
    next_id: u64,
    approach_time: f64,
    hit_linger: f64,
    miss_linger: f64,
}

impl NoteRegistry {
    pub fn new(approach_time: f64, hit_linger: f64, miss_linger: f64) -> Self {
        Self {
            notes: Vec::new(),
            next_id: 0,
            approach_time,
            hit_linger,
            miss_linger,
        }
    }

    pub fn approach_time(&self) -> f64 {
        self.approach_time
    }

    pub fn spawn(&mut self, beat_index: usize, hit_time: f64, now: f64) -> NoteId {
        let id = NoteId(self.next_id);
        self.next_id += 1;
        self.notes.push(Note {
            id,
            beat_index,
            hit_time,
            approach_time: self.approach_time,
            created_time: now,
            state: NoteState::Approaching,
            despawn_at: None,
        });
        id
    }

    pub fn get(&self, id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter()
    }

    pub fn approaching(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(|note| note.is_approaching())
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Moves an approaching note to its terminal state. A second call for
    /// the same note fails and changes nothing.
    pub fn resolve(&mut self, id: NoteId, judgment: Judgment, now: f64) -> Result<&Note> {
        let linger = match judgment {
            Judgment::Miss => self.miss_linger,
            _ => self.hit_linger,
        };
        let note = self
            .notes
            .iter_mut()
            .find(|note| note.id == id)
            .ok_or(RhythmError::UnknownNote(id))?;

        if !note.is_approaching() {
            return Err(RhythmError::NoteAlreadyResolved(id));
        }

        note.state = NoteState::Resolved {
            judgment,
            resolved_at: now,
        };
        note.despawn_at = Some(now + linger);
        Ok(note)
    }

    /// Turns every approaching note more than `miss_after` past its hit time
    /// into a miss. Returns the expired ids in registry order.
    pub fn expire(&mut self, now: f64, miss_after: f64) -> Vec<NoteId> {
        let mut expired = Vec::new();
        for note in &mut self.notes {
            if note.is_approaching() && now > note.hit_time + miss_after {
                note.state = NoteState::Resolved {
                    judgment: Judgment::Miss,
                    resolved_at: now,
                };
                note.despawn_at = Some(now + self.miss_linger);
                expired.push(note.id);
            }
        }
        expired
    }

    /// Drops resolved notes whose linger time has passed.
    pub fn sweep(&mut self, now: f64) -> usize {
        let before = self.notes.len();
        self.notes
            .retain(|note| note.despawn_at.map_or(true, |deadline| now < deadline));
        before - self.notes.len()
    }

    /// Applies a pause duration to every pending deadline. Approaching notes
    /// move their hit time; resolved notes move their removal deadline.
    pub fn shift_pending(&mut self, delta: f64) {
        for note in &mut self.notes {
            match note.despawn_at.as_mut() {
                Some(deadline) => *deadline += delta,
                None => note.hit_time += delta,
            }
        }
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> NoteRegistry {
        NoteRegistry::new(1.5, 0.08, 0.2)
    }

    #[test]
    fn spawn_fixes_spawn_time() {
        let mut notes = registry();
        let id = notes.spawn(0, 3.0, 1.5);
        let note = notes.get(id).unwrap();

        assert_eq!(note.spawn_time(), 1.5);
        assert_eq!(note.created_time(), 1.5);
        assert!(note.is_approaching());
    }

    #[test]
    fn progress_clamps_and_reaches_end_scale() {
        let mut notes = registry();
        let id = notes.spawn(0, 3.0, 1.5);
        let note = notes.get(id).unwrap();
        let config = NoteVisualConfig::default();

        assert_eq!(note.progress(0.0), 0.0);
        assert_eq!(note.progress(2.25), 0.5);
        assert_eq!(note.progress(9.0), 1.0);
        assert_eq!(note.visual(3.0, &config).scale, config.end_scale);
        assert_eq!(note.visual(1.5, &config).scale, config.start_scale);
    }

    #[test]
    fn visual_fades_in_then_holds() {
        let config = NoteVisualConfig::default();
        assert!((NoteVisual::at(0.0, &config).alpha - 0.3).abs() < 1e-6);
        assert!(NoteVisual::at(0.1, &config).alpha < 1.0);
        assert_eq!(NoteVisual::at(0.5, &config).alpha, 1.0);
    }

    #[test]
    fn resolving_twice_is_rejected() {
        let mut notes = registry();
        let id = notes.spawn(0, 1.0, 0.0);

        notes.resolve(id, Judgment::Perfect, 1.0).unwrap();
        let err = notes.resolve(id, Judgment::Good, 1.01).unwrap_err();

        assert!(matches!(err, RhythmError::NoteAlreadyResolved(_)));
        assert_eq!(notes.get(id).unwrap().judgment(), Some(Judgment::Perfect));
    }

    #[test]
    fn expires_late_notes_once() {
        let mut notes = registry();
        let early = notes.spawn(0, 1.0, 0.0);
        notes.spawn(1, 2.0, 0.5);

        assert!(notes.expire(1.19, 0.2).is_empty());
        assert_eq!(notes.expire(1.21, 0.2), vec![early]);
        assert!(notes.expire(1.3, 0.2).is_empty());
        assert_eq!(notes.approaching().count(), 1);
    }

    #[test]
    fn sweep_waits_for_linger() {
        let mut notes = registry();
        let id = notes.spawn(0, 1.0, 0.0);
        notes.resolve(id, Judgment::Good, 1.0).unwrap();

        assert_eq!(notes.sweep(1.05), 0);
        assert_eq!(notes.sweep(1.1), 1);
        assert!(notes.is_empty());
    }

    #[test]
    fn shift_moves_only_pending_hit_times() {
        let mut notes = registry();
        let hit = notes.spawn(0, 1.0, 0.0);
        let pending = notes.spawn(1, 2.0, 0.5);
        notes.resolve(hit, Judgment::Ok, 1.0).unwrap();

        notes.shift_pending(4.0);

        assert_eq!(notes.get(hit).unwrap().hit_time(), 1.0);
        assert_eq!(notes.get(pending).unwrap().hit_time(), 6.0);
        assert_eq!(notes.get(pending).unwrap().spawn_time(), 4.5);
        assert_eq!(notes.sweep(4.5), 0);
    }

    #[test]
    fn unknown_note_is_an_error() {
        let mut notes = registry();
        let id = notes.spawn(0, 1.0, 0.0);
        notes.clear();
        assert!(matches!(
            notes.resolve(id, Judgment::Perfect, 1.0),
            Err(RhythmError::UnknownNote(_))
        ));
    }
}
