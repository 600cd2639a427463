use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Result, RhythmError};

/// Top-level configuration structure for the game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub timing: TimingConfig,
    pub judge: JudgeWindows,
    pub scoring: ScoringConfig,
    pub visuals: NoteVisualConfig,
    pub paths: PathsConfig,
}

impl GameConfig {
    /// Reads a JSON config file. Missing fields fall back to their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.timing.validate()?;
        self.judge.validate()?;
        if self.scoring.combo_step == 0 {
            return Err(RhythmError::InvalidInput(
                "scoring.combo_step must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Durations (seconds) that drive scheduling and note expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Seconds a note travels from spawn to the hit zone.
    pub approach_time: f64,
    /// Gap between load completion and the scheduled audio start.
    pub start_delay: f64,
    /// Extra time after the track ends before the session reports completion.
    pub end_grace: f64,
    /// An unresolved note becomes a miss this long after its hit time.
    pub miss_after: f64,
    /// Deltas beyond this get an Early/Late label.
    pub label_threshold: f64,
    /// How long a struck note stays visible before removal.
    pub hit_linger: f64,
    /// How long a missed note stays visible before removal.
    pub miss_linger: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            approach_time: 1.5,
            start_delay: 2.0,
            end_grace: 1.0,
            miss_after: 0.2,
            label_threshold: 0.03,
            hit_linger: 0.08,
            miss_linger: 0.2,
        }
    }
}

impl TimingConfig {
    fn validate(&self) -> Result<()> {
        let fields = [
            ("approach_time", self.approach_time),
            ("start_delay", self.start_delay),
            ("end_grace", self.end_grace),
            ("miss_after", self.miss_after),
            ("label_threshold", self.label_threshold),
            ("hit_linger", self.hit_linger),
            ("miss_linger", self.miss_linger),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(RhythmError::InvalidInput(format!(
                    "timing.{name} must be a finite, non-negative number of seconds"
                )));
            }
        }
        if self.approach_time <= 0.0 {
            return Err(RhythmError::InvalidInput(
                "timing.approach_time must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Nested absolute-delta bands, in seconds. A delta is classified by the
/// first band it fits in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeWindows {
    pub perfect: f64,
    pub good: f64,
    pub ok: f64,
}

impl Default for JudgeWindows {
    fn default() -> Self {
        Self {
            perfect: 0.08,
            good: 0.15,
            ok: 0.20,
        }
    }
}

impl JudgeWindows {
    pub fn validate(&self) -> Result<()> {
        let ascending = 0.0 <= self.perfect && self.perfect <= self.good && self.good <= self.ok;
        if !ascending || !self.ok.is_finite() {
            return Err(RhythmError::InvalidInput(format!(
                "judge windows must be ascending: perfect {} <= good {} <= ok {}",
                self.perfect, self.good, self.ok
            )));
        }
        Ok(())
    }
}

/// Base points per tier and the combo multiplier step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub perfect_points: u64,
    pub good_points: u64,
    pub ok_points: u64,
    /// Every `combo_step` consecutive hits raise the multiplier by one.
    pub combo_step: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            perfect_points: 300,
            good_points: 100,
            ok_points: 50,
            combo_step: 10,
        }
    }
}

/// Approach animation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteVisualConfig {
    pub start_scale: f32,
    /// Must equal the hit-zone ring size so a note lines up exactly on time.
    pub end_scale: f32,
    /// Fraction of the approach over which a note fades in.
    pub fade_in: f32,
    pub start_alpha: f32,
}

impl Default for NoteVisualConfig {
    fn default() -> Self {
        Self {
            start_scale: 2.5,
            end_scale: 1.5,
            fade_in: 0.15,
            start_alpha: 0.3,
        }
    }
}

/// Filesystem locations used by the loader, analyzer and preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the active track's analysis and audio.
    pub track_dir: PathBuf,
    pub analysis_file: String,
    pub audio_file: String,
    pub preferences: PathBuf,
    /// Program used to run the external analyzer.
    pub analyzer_program: PathBuf,
    /// Arguments placed before `<input> <output>`, e.g. a script path.
    pub analyzer_args: Vec<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            track_dir: PathBuf::from("assets"),
            analysis_file: "analysis.json".to_string(),
            audio_file: "song.mp3".to_string(),
            preferences: PathBuf::from("preferences.json"),
            analyzer_program: PathBuf::from("python3"),
            analyzer_args: vec!["analyze_song.py".to_string()],
        }
    }
}

impl PathsConfig {
    pub fn analysis_path(&self) -> PathBuf {
        self.track_dir.join(&self.analysis_file)
    }

    pub fn audio_path(&self) -> PathBuf {
        self.track_dir.join(&self.audio_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: GameConfig =
            serde_json::from_str(r#"{ "timing": { "approach_time": 2.0 } }"#).unwrap();

        assert_eq!(config.timing.approach_time, 2.0);
        assert_eq!(config.timing.end_grace, 1.0);
        assert_eq!(config.judge, JudgeWindows::default());
        assert_eq!(config.paths.analysis_file, "analysis.json");
    }

    #[test]
    fn rejects_unordered_windows() {
        let windows = JudgeWindows {
            perfect: 0.1,
            good: 0.05,
            ok: 0.2,
        };
        assert!(windows.validate().is_err());
    }

    #[test]
    fn rejects_zero_approach_time() {
        let mut config = GameConfig::default();
        config.timing.approach_time = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "scoring": { "combo_step": 5 } }"#).unwrap();

        let config = GameConfig::load(&path).unwrap();
        assert_eq!(config.scoring.combo_step, 5);
        assert_eq!(config.scoring.perfect_points, 300);
    }
}
