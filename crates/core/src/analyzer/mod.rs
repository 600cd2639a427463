//! Runs the external beat analyzer and installs its output as the active
//! track.
//!
//! The analyzer is invoked as `program [args..] <input audio> <output json>`
//! and must exit with status 0 after writing the output file. Output goes to
//! a staging path first, so a failed run leaves the current track intact.

use std::{
    ffi::OsString,
    io::Read,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
};

use serde::{Deserialize, Serialize};

use crate::{config::PathsConfig, Result, RhythmError, SongAnalysis, TrackPaths};

const STAGING_SUFFIX: &str = "partial";
const BACKUP_SUFFIX: &str = "previous";

/// A validated request to analyze an audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    input: PathBuf,
}

impl AnalysisRequest {
    /// Cleans up a user-typed path (whitespace, surrounding quotes) and
    /// checks the file exists.
    pub fn from_user_input(raw: &str) -> Result<Self> {
        let cleaned = raw.trim().trim_matches('"').trim();
        if cleaned.is_empty() {
            return Err(RhythmError::InvalidInput(
                "Please enter a file path first.".to_string(),
            ));
        }
        let input = PathBuf::from(cleaned);
        if !input.is_file() {
            return Err(RhythmError::InvalidInput(format!(
                "File not found: {cleaned}"
            )));
        }
        Ok(Self { input })
    }

    pub fn input(&self) -> &Path {
        &self.input
    }
}

/// Outcome of a successful analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub input: PathBuf,
    pub analysis_path: PathBuf,
    pub audio_path: PathBuf,
    pub beats: usize,
    pub tempo_bpm: Option<f64>,
}

/// External analyzer command bound to a track location.
#[derive(Debug, Clone)]
pub struct Analyzer {
    program: PathBuf,
    args: Vec<String>,
    target: TrackPaths,
}

impl Analyzer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, target: TrackPaths) -> Self {
        Self {
            program: program.into(),
            args,
            target,
        }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(
            paths.analyzer_program.clone(),
            paths.analyzer_args.clone(),
            TrackPaths::from_config(paths),
        )
    }

    pub fn target(&self) -> &TrackPaths {
        &self.target
    }

    /// Starts the analyzer process and returns without waiting for it.
    pub fn spawn(&self, request: AnalysisRequest) -> Result<AnalysisJob> {
        let input = request.input;
        let staging = staging_path(&self.target.analysis);
        if let Some(parent) = staging.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        remove_if_present(&staging);

        tracing::info!(
            program = %self.program.display(),
            input = %input.display(),
            output = %staging.display(),
            "starting analyzer"
        );
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&input)
            .arg(&staging)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| RhythmError::analyzer(&input, format!("could not start: {err}")))?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        Ok(AnalysisJob {
            input,
            staging,
            target: self.target.clone(),
            child,
            stdout,
            stderr,
            finished: false,
        })
    }
}

/// Running analyzer process. Poll once per tick; never blocks.
#[derive(Debug)]
pub struct AnalysisJob {
    input: PathBuf,
    staging: PathBuf,
    target: TrackPaths,
    child: Child,
    stdout: Option<JoinHandle<String>>,
    stderr: Option<JoinHandle<String>>,
    finished: bool,
}

impl AnalysisJob {
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// `None` while the process runs. Yields the outcome exactly once.
    pub fn poll(&mut self) -> Option<Result<AnalysisReport>> {
        if self.finished {
            return None;
        }
        let status = match self.child.try_wait() {
            Ok(Some(status)) => status,
            Ok(None) => return None,
            Err(err) => {
                self.finished = true;
                return Some(Err(RhythmError::analyzer(
                    &self.input,
                    format!("could not query process: {err}"),
                )));
            }
        };
        self.finished = true;
        Some(self.finish(status, false))
    }

    /// Blocks until the analyzer exits.
    pub fn wait(mut self) -> Result<AnalysisReport> {
        let status = self
            .child
            .wait()
            .map_err(|err| RhythmError::analyzer(&self.input, format!("wait failed: {err}")))?;
        self.finished = true;
        self.finish(status, true)
    }

    fn finish(&mut self, status: ExitStatus, block: bool) -> Result<AnalysisReport> {
        self.log_output(block);

        let result = self.install(status);
        if let Err(err) = &result {
            tracing::warn!(%err, "analysis failed");
            remove_if_present(&self.staging);
            remove_if_present(&staging_path(&self.target.audio));
        }
        result
    }

    fn install(&self, status: ExitStatus) -> Result<AnalysisReport> {
        if !status.success() {
            let reason = match status.code() {
                Some(code) => format!("exited with code {code}"),
                None => "terminated by a signal".to_string(),
            };
            return Err(RhythmError::analyzer(&self.input, reason));
        }
        if !self.staging.is_file() {
            return Err(RhythmError::analyzer(
                &self.input,
                format!("no output written to `{}`", self.staging.display()),
            ));
        }
        let analysis = SongAnalysis::load(&self.staging)
            .map_err(|err| RhythmError::analyzer(&self.input, format!("bad output: {err}")))?;

        let audio_staging = staging_path(&self.target.audio);
        if let Some(parent) = audio_staging.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        if let Err(err) = std::fs::copy(&self.input, &audio_staging) {
            remove_if_present(&audio_staging);
            return Err(RhythmError::analyzer(
                &self.input,
                format!("could not copy audio: {err}"),
            ));
        }
        self.swap_in(&audio_staging)?;

        tracing::info!(
            beats = analysis.beats.len(),
            audio = %self.target.audio.display(),
            "analysis installed"
        );
        Ok(AnalysisReport {
            input: self.input.clone(),
            analysis_path: self.target.analysis.clone(),
            audio_path: self.target.audio.clone(),
            beats: analysis.beats.len(),
            tempo_bpm: analysis.tempo(),
        })
    }

    /// Replaces the audio, then the analysis. The previous audio is kept
    /// aside until both renames succeed and restored otherwise, so the
    /// installed pair always belongs to the same track.
    fn swap_in(&self, audio_staging: &Path) -> Result<()> {
        let audio = &self.target.audio;
        let backup = backup_path(audio);
        let had_audio = audio.is_file();
        if had_audio {
            std::fs::rename(audio, &backup).map_err(|err| {
                RhythmError::analyzer(&self.input, format!("could not set aside audio: {err}"))
            })?;
        }

        if let Err(err) = std::fs::rename(audio_staging, audio) {
            restore(&backup, audio, had_audio);
            return Err(RhythmError::analyzer(
                &self.input,
                format!("could not install audio: {err}"),
            ));
        }
        if let Err(err) = std::fs::rename(&self.staging, &self.target.analysis) {
            remove_if_present(audio);
            restore(&backup, audio, had_audio);
            return Err(RhythmError::analyzer(
                &self.input,
                format!("could not install analysis: {err}"),
            ));
        }

        if had_audio {
            remove_if_present(&backup);
        }
        Ok(())
    }

    /// With `block` unset, output from drain threads that are still running
    /// is skipped: a detached grandchild can hold the pipes open long after
    /// the analyzer itself exited.
    fn log_output(&mut self, block: bool) {
        let stdout = self
            .stdout
            .take()
            .and_then(|handle| collect_output(handle, block))
            .unwrap_or_default();
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| collect_output(handle, block))
            .unwrap_or_default();
        if !stdout.trim().is_empty() {
            tracing::info!(output = stdout.trim(), "analyzer stdout");
        }
        if !stderr.trim().is_empty() {
            tracing::warn!(output = stderr.trim(), "analyzer stderr");
        }
    }
}

impl Drop for AnalysisJob {
    fn drop(&mut self) {
        if !self.finished {
            // Dropping mid-run keeps the process alive; its staged output is
            // never installed.
            tracing::debug!(input = %self.input.display(), "analysis job dropped while running");
        }
    }
}

fn drain<R: Read + Send + 'static>(mut source: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        let _ = source.read_to_string(&mut text);
        text
    })
}

fn collect_output(handle: JoinHandle<String>, block: bool) -> Option<String> {
    if !block && !handle.is_finished() {
        tracing::debug!("analyzer output still open, not waiting for it");
        return None;
    }
    handle.join().ok()
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".");
    name.push(STAGING_SUFFIX);
    path.with_file_name(name)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".");
    name.push(BACKUP_SUFFIX);
    path.with_file_name(name)
}

fn restore(backup: &Path, target: &Path, had_target: bool) {
    if !had_target {
        return;
    }
    if let Err(err) = std::fs::rename(backup, target) {
        tracing::error!(%err, path = %target.display(), "could not restore previous audio");
    }
}

fn remove_if_present(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(%err, path = %path.display(), "could not remove staged file");
        }
    }
}
