//! Track assets and the one-shot background loader that fetches them.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, TryRecvError},
    thread,
};

use serde::{Deserialize, Serialize};

use crate::{config::PathsConfig, Result, RhythmError, SongAnalysis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    Analysis,
    Audio,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Analysis => f.write_str("analysis data"),
            AssetKind::Audio => f.write_str("audio"),
        }
    }
}

/// Locations of the two files that make up a playable track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackPaths {
    pub analysis: PathBuf,
    pub audio: PathBuf,
}

impl TrackPaths {
    pub fn new(analysis: impl Into<PathBuf>, audio: impl Into<PathBuf>) -> Self {
        Self {
            analysis: analysis.into(),
            audio: audio.into(),
        }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(paths.analysis_path(), paths.audio_path())
    }
}

/// Audio file metadata handed to the playback backend. Decoding is the
/// backend's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioClip {
    pub path: PathBuf,
    pub byte_len: u64,
    /// Playback length in seconds.
    pub duration: f64,
}

/// Fully validated track, ready to schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTrack {
    pub analysis: SongAnalysis,
    pub clip: AudioClip,
}

impl LoadedTrack {
    /// Loads the analysis, then the audio metadata. Any failure discards
    /// what was read so far.
    pub fn load(paths: &TrackPaths) -> Result<Self> {
        let analysis = SongAnalysis::load(&paths.analysis)
            .map_err(|err| asset_error(AssetKind::Analysis, &paths.analysis, err))?;
        let byte_len = audio_len(&paths.audio)
            .map_err(|err| asset_error(AssetKind::Audio, &paths.audio, err))?;

        Ok(Self {
            clip: AudioClip {
                path: paths.audio.clone(),
                byte_len,
                duration: analysis.duration,
            },
            analysis,
        })
    }
}

fn audio_len(path: &Path) -> Result<u64> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() || metadata.len() == 0 {
        return Err(RhythmError::msg("not a non-empty file"));
    }
    Ok(metadata.len())
}

fn asset_error(kind: AssetKind, path: &Path, err: RhythmError) -> RhythmError {
    RhythmError::AssetLoad {
        kind,
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Starts background loads.
#[derive(Debug, Default)]
pub struct TrackLoader;

impl TrackLoader {
    pub fn spawn(paths: TrackPaths) -> Result<LoadJob> {
        let (sender, receiver) = mpsc::channel();
        let worker_paths = paths.clone();
        thread::Builder::new()
            .name("track-loader".to_string())
            .spawn(move || {
                let result = LoadedTrack::load(&worker_paths);
                // The receiver may already be gone after a restart.
                let _ = sender.send(result);
            })?;
        Ok(LoadJob {
            paths,
            receiver: Some(receiver),
        })
    }
}

/// Handle to an in-flight load. Poll once per tick.
#[derive(Debug)]
pub struct LoadJob {
    paths: TrackPaths,
    receiver: Option<Receiver<Result<LoadedTrack>>>,
}

impl LoadJob {
    pub fn paths(&self) -> &TrackPaths {
        &self.paths
    }

    /// `None` while the worker is still running. Yields the result exactly
    /// once; later polls return `None`.
    pub fn poll(&mut self) -> Option<Result<LoadedTrack>> {
        let receiver = self.receiver.as_ref()?;
        let outcome = match receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(RhythmError::msg("track loader exited early")),
        };
        self.receiver = None;
        Some(outcome)
    }

    pub fn is_done(&self) -> bool {
        self.receiver.is_none()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn write_track(dir: &Path, analysis: &str, audio: &[u8]) -> TrackPaths {
        let paths = TrackPaths::new(dir.join("analysis.json"), dir.join("song.mp3"));
        std::fs::write(&paths.analysis, analysis).unwrap();
        std::fs::write(&paths.audio, audio).unwrap();
        paths
    }

    fn wait(job: &mut LoadJob) -> Result<LoadedTrack> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(result) = job.poll() {
                return result;
            }
            assert!(Instant::now() < deadline, "loader did not finish");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn loads_track_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_track(
            dir.path(),
            r#"{ "sr": 44100, "duration": 12.5, "tempo_bpm": 100.0, "beats_sec": [0.6, 1.2] }"#,
            b"ID3",
        );

        let mut job = TrackLoader::spawn(paths).unwrap();
        let track = wait(&mut job).unwrap();

        assert_eq!(track.clip.duration, 12.5);
        assert_eq!(track.clip.byte_len, 3);
        assert_eq!(track.analysis.beats.len(), 2);
        assert!(job.is_done());
        assert!(job.poll().is_none());
    }

    #[test]
    fn reports_missing_audio() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_track(
            dir.path(),
            r#"{ "sr": 1, "duration": 1.0, "beats_sec": [] }"#,
            b"x",
        );
        std::fs::remove_file(&paths.audio).unwrap();

        let err = LoadedTrack::load(&paths).unwrap_err();
        assert!(matches!(
            err,
            RhythmError::AssetLoad {
                kind: AssetKind::Audio,
                ..
            }
        ));
    }

    #[test]
    fn reports_corrupt_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_track(dir.path(), "{ not json", b"x");

        let err = LoadedTrack::load(&paths).unwrap_err();
        assert!(matches!(
            err,
            RhythmError::AssetLoad {
                kind: AssetKind::Analysis,
                ..
            }
        ));
    }
}
