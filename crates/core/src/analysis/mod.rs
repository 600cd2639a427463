use std::{ops::Index, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Result, RhythmError};

/// Offline analysis record produced by the external analyzer.
///
/// Field names follow the analyzer's JSON keys. Only `beats` drives note
/// spawning; the other timestamp arrays are carried so the file round-trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongAnalysis {
    #[serde(rename = "sr")]
    pub sample_rate: u32,
    /// Track length in seconds.
    pub duration: f64,
    #[serde(default)]
    pub tempo_bpm: f64,
    #[serde(rename = "beats_sec")]
    pub beats: Vec<f64>,
    #[serde(rename = "downbeats_sec", default)]
    pub downbeats: Vec<f64>,
    #[serde(rename = "onsets_sec", default)]
    pub onsets: Vec<f64>,
    #[serde(rename = "strong_onsets_sec", default)]
    pub strong_onsets: Vec<f64>,
}

impl SongAnalysis {
    /// Parses and validates an analysis record.
    pub fn from_json(text: &str) -> Result<Self> {
        let analysis: Self = serde_json::from_str(text)?;
        analysis.validate()?;
        Ok(analysis)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(RhythmError::InvalidAnalysis(format!(
                "duration must be a non-negative number of seconds, got {}",
                self.duration
            )));
        }
        let arrays = [
            ("beats_sec", &self.beats),
            ("downbeats_sec", &self.downbeats),
            ("onsets_sec", &self.onsets),
            ("strong_onsets_sec", &self.strong_onsets),
        ];
        for (name, values) in arrays {
            check_ascending(name, values)?;
        }
        Ok(())
    }

    /// Declared tempo, or an estimate from the beat spacing when the analyzer
    /// left it at zero.
    pub fn tempo(&self) -> Option<f64> {
        if self.tempo_bpm.is_finite() && self.tempo_bpm > 0.0 {
            Some(self.tempo_bpm)
        } else {
            estimate_tempo(&self.beats)
        }
    }

    pub fn beat_schedule(&self) -> BeatSchedule {
        BeatSchedule {
            beats: self.beats.clone(),
        }
    }
}

fn check_ascending(name: &str, values: &[f64]) -> Result<()> {
    if let Some(bad) = values.iter().position(|value| !value.is_finite()) {
        return Err(RhythmError::InvalidAnalysis(format!(
            "{name}[{bad}] is not a finite number"
        )));
    }
    if let Some(bad) = values.windows(2).position(|pair| pair[1] < pair[0]) {
        return Err(RhythmError::InvalidAnalysis(format!(
            "{name} must be non-decreasing, but entry {} is earlier than entry {bad}",
            bad + 1
        )));
    }
    Ok(())
}

fn estimate_tempo(beats: &[f64]) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0;
    for window in beats.windows(2) {
        let interval = window[1] - window[0];
        if interval > f64::EPSILON {
            sum += interval;
            count += 1;
        }
    }

    if count == 0 {
        return None;
    }
    let average_interval = sum / count as f64;
    Some(60.0 / average_interval)
}

/// Ordered beat offsets in seconds from track start. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeatSchedule {
    beats: Vec<f64>,
}

impl BeatSchedule {
    pub fn new(beats: Vec<f64>) -> Result<Self> {
        check_ascending("beats", &beats)?;
        Ok(Self { beats })
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.beats.get(index).copied()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.beats
    }
}

impl Index<usize> for BeatSchedule {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.beats[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "sr": 22050,
        "duration": 4.0,
        "tempo_bpm": 120.0,
        "beats_sec": [0.5, 1.0, 1.5],
        "downbeats_sec": [0.5],
        "onsets_sec": [0.49, 1.01],
        "strong_onsets_sec": []
    }"#;

    #[test]
    fn parses_analyzer_output() {
        let analysis = SongAnalysis::from_json(SAMPLE).unwrap();
        assert_eq!(analysis.sample_rate, 22050);
        assert_eq!(analysis.beats, vec![0.5, 1.0, 1.5]);
        assert_eq!(analysis.onsets.len(), 2);
        assert_eq!(analysis.beat_schedule().len(), 3);
    }

    #[test]
    fn preserves_secondary_arrays_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.json");
        let analysis = SongAnalysis::from_json(SAMPLE).unwrap();

        analysis.save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("strong_onsets_sec"));
        assert_eq!(SongAnalysis::load(&path).unwrap(), analysis);
    }

    #[test]
    fn missing_optional_arrays_default_to_empty() {
        let analysis =
            SongAnalysis::from_json(r#"{ "sr": 44100, "duration": 1.0, "beats_sec": [] }"#)
                .unwrap();
        assert!(analysis.downbeats.is_empty());
        assert!(analysis.tempo().is_none());
    }

    #[test]
    fn rejects_unordered_beats() {
        let err = SongAnalysis::from_json(
            r#"{ "sr": 44100, "duration": 3.0, "beats_sec": [1.0, 0.5] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, RhythmError::InvalidAnalysis(_)));
    }

    #[test]
    fn estimates_tempo_when_missing() {
        let analysis = SongAnalysis {
            beats: vec![0.0, 0.5, 1.0, 1.5],
            ..Default::default()
        };
        let tempo = analysis.tempo().expect("tempo should be estimated");
        assert!((tempo - 120.0).abs() < 1e-9);
    }

    #[test]
    fn schedule_allows_duplicate_beats() {
        let schedule = BeatSchedule::new(vec![1.0, 1.0, 2.0]).unwrap();
        assert_eq!(schedule[1], 1.0);
        assert!(BeatSchedule::new(vec![f64::NAN]).is_err());
    }
}
