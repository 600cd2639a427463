//! Latency compensation offset and the preference file that persists it.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::Result;

pub const MIN_OFFSET_MS: f64 = -200.0;
pub const MAX_OFFSET_MS: f64 = 200.0;
/// Key under which the offset is stored.
pub const OFFSET_KEY: &str = "AudioOffsetMs";

/// Discrete adjustments available from the pause menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffsetStep {
    Minus5,
    Minus1,
    Plus1,
    Plus5,
}

impl OffsetStep {
    pub fn millis(self) -> f64 {
        match self {
            OffsetStep::Minus5 => -5.0,
            OffsetStep::Minus1 => -1.0,
            OffsetStep::Plus1 => 1.0,
            OffsetStep::Plus5 => 5.0,
        }
    }
}

/// Key/value persistence for numeric preferences.
pub trait PreferenceStore {
    fn get(&self, key: &str) -> Option<f64>;
    /// Writes synchronously; the last write wins.
    fn set(&mut self, key: &str, value: f64) -> Result<()>;
}

/// In-memory store, used when no preference file is configured.
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    values: BTreeMap<String, f64>,
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    fn set(&mut self, key: &str, value: f64) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PreferenceFile {
    #[serde(flatten)]
    values: BTreeMap<String, f64>,
}

/// JSON object on disk, rewritten in full on every `set`.
#[derive(Debug, Clone)]
pub struct JsonPreferences {
    path: PathBuf,
    file: PreferenceFile,
}

impl JsonPreferences {
    /// Opens the file at `path`. A missing file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => PreferenceFile::default(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonPreferences {
    fn get(&self, key: &str) -> Option<f64> {
        self.file.values.get(key).copied()
    }

    fn set(&mut self, key: &str, value: f64) -> Result<()> {
        self.file.values.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&self.file)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

/// Bounded, persisted latency compensation in milliseconds.
///
/// Positive values make notes arrive later; negative values earlier. The
/// value is only read when a beat is spawned, so changing it never moves a
/// note that already exists.
pub struct OffsetController {
    offset_ms: f64,
    store: Box<dyn PreferenceStore>,
}

impl OffsetController {
    /// Reads the stored offset, defaulting to 0 and clamping out-of-range
    /// values.
    pub fn load(store: Box<dyn PreferenceStore>) -> Self {
        let stored = store
            .get(OFFSET_KEY)
            .filter(|value| value.is_finite())
            .unwrap_or(0.0);
        Self {
            offset_ms: stored.clamp(MIN_OFFSET_MS, MAX_OFFSET_MS),
            store,
        }
    }

    pub fn in_memory() -> Self {
        Self::load(Box::new(MemoryPreferences::default()))
    }

    pub fn offset_ms(&self) -> f64 {
        self.offset_ms
    }

    pub fn offset_sec(&self) -> f64 {
        self.offset_ms / 1000.0
    }

    /// Clamps to `[-200, 200]`, persists and returns the stored value.
    /// Non-finite input leaves the offset unchanged.
    pub fn set_offset(&mut self, ms: f64) -> f64 {
        if !ms.is_finite() {
            tracing::warn!(ms, "ignoring non-finite offset");
            return self.offset_ms;
        }
        self.offset_ms = ms.clamp(MIN_OFFSET_MS, MAX_OFFSET_MS);
        if let Err(err) = self.store.set(OFFSET_KEY, self.offset_ms) {
            tracing::warn!(%err, offset_ms = self.offset_ms, "failed to persist offset");
        }
        self.offset_ms
    }

    pub fn adjust(&mut self, delta_ms: f64) -> f64 {
        self.set_offset(self.offset_ms + delta_ms)
    }

    pub fn step(&mut self, step: OffsetStep) -> f64 {
        self.adjust(step.millis())
    }
}

impl std::fmt::Debug for OffsetController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffsetController")
            .field("offset_ms", &self.offset_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_clamps_at_both_ends() {
        let mut offset = OffsetController::in_memory();
        assert_eq!(offset.adjust(10_000.0), 200.0);

        let mut offset = OffsetController::in_memory();
        assert_eq!(offset.adjust(-10_000.0), -200.0);
    }

    #[test]
    fn steps_accumulate() {
        let mut offset = OffsetController::in_memory();
        offset.step(OffsetStep::Plus5);
        offset.step(OffsetStep::Plus1);
        offset.step(OffsetStep::Minus1);
        assert_eq!(offset.offset_ms(), 5.0);
        assert_eq!(offset.offset_sec(), 0.005);
    }

    #[test]
    fn rejects_nan() {
        let mut offset = OffsetController::in_memory();
        offset.set_offset(12.0);
        assert_eq!(offset.set_offset(f64::NAN), 12.0);
    }

    #[test]
    fn persists_across_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs").join("preferences.json");

        let store = JsonPreferences::open(&path).unwrap();
        let mut offset = OffsetController::load(Box::new(store));
        assert_eq!(offset.offset_ms(), 0.0);
        offset.set_offset(-42.0);

        let reopened = JsonPreferences::open(&path).unwrap();
        assert_eq!(reopened.get(OFFSET_KEY), Some(-42.0));
        assert_eq!(OffsetController::load(Box::new(reopened)).offset_ms(), -42.0);
    }

    #[test]
    fn clamps_stored_out_of_range_value() {
        let mut store = MemoryPreferences::default();
        store.set(OFFSET_KEY, 900.0).unwrap();
        assert_eq!(OffsetController::load(Box::new(store)).offset_ms(), 200.0);
    }

    #[test]
    fn keeps_unrelated_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, r#"{ "Volume": 0.5 }"#).unwrap();

        let mut store = JsonPreferences::open(&path).unwrap();
        store.set(OFFSET_KEY, 3.0).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Volume"));
        assert!(text.contains(OFFSET_KEY));
    }
}
