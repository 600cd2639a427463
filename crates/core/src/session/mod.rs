//! The top-level game object. Owns every component and advances them once
//! per frame from [`Game::tick`].

use serde::{Deserialize, Serialize};

use crate::{
    hud, AnalysisJob, AnalysisReport, AnalysisRequest, Analyzer, AudioOutput, ClockSource,
    GameConfig, Hit, Judge, JudgeOutcome, LoadJob, LoadedTrack, NoteId, NoteRegistry,
    NoteVisual, OffsetController, OffsetStep, PlaybackScheduler, Result, RhythmError,
    ScoreAggregator, ScoreState, ScoreSummary, SongAnalysis, TrackLoader, TrackPaths, Transport,
    TransportState,
};

/// Discrete inputs collected during one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInput {
    /// At most one hit is judged per tick.
    pub hit: bool,
    pub toggle_pause: bool,
    /// Only honoured while paused.
    pub adjust_offset: Option<OffsetStep>,
}

impl FrameInput {
    pub fn hit() -> Self {
        Self {
            hit: true,
            ..Self::default()
        }
    }

    pub fn toggle_pause() -> Self {
        Self {
            toggle_pause: true,
            ..Self::default()
        }
    }

    pub fn adjust(step: OffsetStep) -> Self {
        Self {
            adjust_offset: Some(step),
            ..Self::default()
        }
    }
}

/// Everything observable that happened since the previous tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    StatusChanged(String),
    TrackStarted { start_time: f64, beats: usize },
    NoteSpawned { note: NoteId, beat_index: usize, hit_time: f64 },
    Judged { hit: Hit, feedback: String },
    Missed(NoteId),
    Paused,
    Resumed { pause_duration: f64 },
    OffsetChanged(f64),
    TrackFinished(ScoreSummary),
    AnalysisFinished(AnalysisReport),
}

/// The track currently bound to the clock.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    analysis: SongAnalysis,
    scheduler: PlaybackScheduler,
}

impl PlaybackSession {
    pub fn analysis(&self) -> &SongAnalysis {
        &self.analysis
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    pub fn start_time(&self) -> f64 {
        self.scheduler.start_time()
    }

    pub fn next_beat_index(&self) -> usize {
        self.scheduler.next_beat_index()
    }
}

pub struct Game {
    config: GameConfig,
    clock: Box<dyn ClockSource>,
    audio: Box<dyn AudioOutput>,
    offset: OffsetController,
    judge: Judge,
    notes: NoteRegistry,
    score: ScoreAggregator,
    transport: Transport,
    session: Option<PlaybackSession>,
    track: TrackPaths,
    analyzer: Analyzer,
    load_job: Option<LoadJob>,
    analysis_job: Option<AnalysisJob>,
    /// End of track was reached while notes were still approaching.
    finish_pending: bool,
    status: String,
    events: Vec<GameEvent>,
}

impl Game {
    pub fn new(
        config: GameConfig,
        clock: Box<dyn ClockSource>,
        audio: Box<dyn AudioOutput>,
        offset: OffsetController,
    ) -> Result<Self> {
        config.validate()?;
        let timing = &config.timing;
        Ok(Self {
            judge: Judge::new(config.judge, timing.label_threshold),
            notes: NoteRegistry::new(timing.approach_time, timing.hit_linger, timing.miss_linger),
            score: ScoreAggregator::new(config.scoring.clone()),
            track: TrackPaths::from_config(&config.paths),
            analyzer: Analyzer::from_config(&config.paths),
            transport: Transport::new(),
            session: None,
            load_job: None,
            analysis_job: None,
            finish_pending: false,
            status: String::new(),
            events: Vec::new(),
            config,
            clock,
            audio,
            offset,
        })
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn notes(&self) -> &NoteRegistry {
        &self.notes
    }

    pub fn score(&self) -> &ScoreState {
        self.score.state()
    }

    pub fn summary(&self) -> ScoreSummary {
        self.score.summary()
    }

    pub fn offset(&self) -> &OffsetController {
        &self.offset
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.transport.is_paused()
    }

    pub fn is_loading(&self) -> bool {
        self.load_job.is_some()
    }

    pub fn is_analyzing(&self) -> bool {
        self.analysis_job.is_some()
    }

    pub fn audio(&self) -> &dyn AudioOutput {
        self.audio.as_ref()
    }

    pub fn track_paths(&self) -> &TrackPaths {
        &self.track
    }

    pub fn song_tempo(&self) -> Option<f64> {
        self.session.as_ref().and_then(|session| session.analysis.tempo())
    }

    /// Visual state of every approaching note at the current clock reading.
    pub fn note_visuals(&self) -> Vec<(NoteId, NoteVisual)> {
        let now = self.now();
        self.notes
            .approaching()
            .map(|note| (note.id(), note.visual(now, &self.config.visuals)))
            .collect()
    }

    /// Begins loading the configured track in the background.
    pub fn start_loading(&mut self) -> Result<()> {
        if self.load_job.is_some() {
            return Err(RhythmError::LoadInProgress);
        }
        self.set_status("Loading...");
        let job = TrackLoader::spawn(self.track.clone())?;
        self.load_job = Some(job);
        Ok(())
    }

    /// Discards the session, notes and score, then reloads the track.
    pub fn restart(&mut self) -> Result<()> {
        self.notes.clear();
        self.transport.stop();
        self.audio.stop();
        self.score.reset();
        self.session = None;
        self.finish_pending = false;
        // A superseded load is abandoned; its worker result is dropped.
        self.load_job = None;
        tracing::info!("restarting session");
        self.start_loading()
    }

    /// Binds a loaded track to the clock and schedules playback
    /// `start_delay` seconds from now.
    pub fn start_track(&mut self, track: LoadedTrack) -> Result<()> {
        self.audio.prepare(&track.clip)?;

        let timing = &self.config.timing;
        let duration = self.audio.clip_duration().unwrap_or(track.analysis.duration);
        let start_time = self.clock.now() + timing.start_delay;
        let scheduler = PlaybackScheduler::new(
            track.analysis.beat_schedule(),
            start_time,
            timing.approach_time,
            duration,
            timing.end_grace,
        );
        let beats = scheduler.schedule().len();

        self.notes.clear();
        self.finish_pending = false;
        self.audio.play_scheduled(start_time);
        self.transport.start();
        self.session = Some(PlaybackSession {
            analysis: track.analysis,
            scheduler,
        });

        tracing::info!(
            start_time,
            beats,
            offset_ms = self.offset.offset_ms(),
            "playback scheduled"
        );
        self.set_status("");
        self.events.push(GameEvent::TrackStarted { start_time, beats });
        Ok(())
    }

    /// Freezes the session. No-op unless playing.
    pub fn pause(&mut self) -> bool {
        if !self.transport.pause(self.clock.now()) {
            return false;
        }
        self.audio.pause();
        tracing::info!("paused");
        self.events.push(GameEvent::Paused);
        true
    }

    /// Unfreezes the session and shifts every pending deadline by the pause
    /// length. No-op unless paused.
    pub fn resume(&mut self) -> Option<f64> {
        let pause_duration = self.transport.resume(self.clock.now())?;
        if let Some(session) = self.session.as_mut() {
            session.scheduler.shift_start(pause_duration);
        }
        self.notes.shift_pending(pause_duration);
        self.audio.resume();

        tracing::info!(pause_duration, "resumed");
        self.events.push(GameEvent::Resumed { pause_duration });
        Some(pause_duration)
    }

    pub fn toggle_pause(&mut self) {
        if self.transport.is_paused() {
            self.resume();
        } else {
            self.pause();
        }
    }

    pub fn set_offset(&mut self, ms: f64) -> f64 {
        let value = self.offset.set_offset(ms);
        self.events.push(GameEvent::OffsetChanged(value));
        value
    }

    pub fn adjust_offset(&mut self, delta_ms: f64) -> f64 {
        self.set_offset(self.offset.offset_ms() + delta_ms)
    }

    /// Validates `raw_path` and starts the external analyzer. Rejected while
    /// another analysis is running.
    pub fn request_analysis(&mut self, raw_path: &str) -> Result<()> {
        if self.analysis_job.is_some() {
            tracing::warn!("analysis already in progress");
            return Err(RhythmError::AnalysisInProgress);
        }
        let request = match AnalysisRequest::from_user_input(raw_path) {
            Ok(request) => request,
            Err(err) => {
                if let RhythmError::InvalidInput(message) = &err {
                    self.set_status(message.clone());
                }
                return Err(err);
            }
        };
        match self.analyzer.spawn(request) {
            Ok(job) => {
                self.analysis_job = Some(job);
                self.set_status("Analyzing song...");
                Ok(())
            }
            Err(err) => {
                tracing::error!(%err, "could not start analyzer");
                self.set_status("Error: Could not start analyzer");
                Err(err)
            }
        }
    }

    /// Advances the game by one frame and returns what happened.
    pub fn tick(&mut self, input: &FrameInput) -> Vec<GameEvent> {
        self.poll_load();
        self.poll_analysis();

        if input.toggle_pause {
            self.toggle_pause();
        }
        if let Some(step) = input.adjust_offset {
            if self.transport.is_paused() {
                let value = self.offset.step(step);
                self.events.push(GameEvent::OffsetChanged(value));
            }
        }

        if self.transport.state() == TransportState::Playing {
            self.advance(self.clock.now(), input.hit);
        }

        std::mem::take(&mut self.events)
    }

    fn advance(&mut self, now: f64, hit: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let tick = session.scheduler.tick(now, self.offset.offset_sec());

        for spawn in &tick.spawns {
            let note = self.notes.spawn(spawn.beat_index, spawn.hit_time, now);
            tracing::debug!(
                %note,
                beat = spawn.beat_index,
                hit_time = spawn.hit_time,
                "note spawned"
            );
            self.events.push(GameEvent::NoteSpawned {
                note,
                beat_index: spawn.beat_index,
                hit_time: spawn.hit_time,
            });
        }

        if hit {
            if let JudgeOutcome::Hit(hit) = self.judge.judge(&mut self.notes, now) {
                self.score.register_hit(hit.judgment);
                self.events.push(GameEvent::Judged {
                    hit,
                    feedback: hud::hit_feedback(&hit),
                });
            }
        }

        for note in self.notes.expire(now, self.config.timing.miss_after) {
            tracing::debug!(%note, "note missed");
            self.score.register_miss();
            self.events.push(GameEvent::Missed(note));
        }
        self.notes.sweep(now);

        self.finish_pending |= tick.finished;
        if self.finish_pending && self.notes.approaching().next().is_none() {
            self.finish_pending = false;
            self.transport.stop();
            let summary = self.score.summary();
            tracing::info!(score = summary.score, max_combo = summary.max_combo, "song complete");
            self.events.push(GameEvent::TrackFinished(summary));
        }
    }

    fn poll_load(&mut self) {
        let Some(job) = self.load_job.as_mut() else {
            return;
        };
        let Some(result) = job.poll() else {
            return;
        };
        self.load_job = None;

        if let Err(err) = result.and_then(|track| self.start_track(track)) {
            tracing::error!(%err, "failed to load track");
            let message = match &err {
                RhythmError::AssetLoad { kind, .. } => format!("Error loading {kind}"),
                _ => "Error loading audio".to_string(),
            };
            self.set_status(message);
        }
    }

    fn poll_analysis(&mut self) {
        let Some(job) = self.analysis_job.as_mut() else {
            return;
        };
        let Some(result) = job.poll() else {
            return;
        };
        self.analysis_job = None;

        match result {
            Ok(report) => {
                self.set_status("Analysis complete! Starting game...");
                self.events.push(GameEvent::AnalysisFinished(report));
                if let Err(err) = self.restart() {
                    tracing::error!(%err, "could not restart after analysis");
                    self.set_status("Error loading analysis data");
                }
            }
            Err(err) => {
                tracing::error!(%err, "analysis failed");
                self.set_status("Analysis failed, check the log");
            }
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        let message = message.into();
        if message != self.status {
            self.status = message.clone();
            self.events.push(GameEvent::StatusChanged(message));
        }
    }
}

impl std::fmt::Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("transport", &self.transport.state())
            .field("session", &self.session)
            .field("notes", &self.notes.len())
            .field("score", self.score.state())
            .field("offset", &self.offset)
            .field("status", &self.status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::{AudioClip, ManualClock, PlaybackState, SilentOutput};

    fn game(clock: &ManualClock) -> Game {
        Game::new(
            GameConfig::default(),
            Box::new(clock.clone()),
            Box::new(SilentOutput::new()),
            OffsetController::in_memory(),
        )
        .unwrap()
    }

    fn track(beats: Vec<f64>, duration: f64) -> LoadedTrack {
        LoadedTrack {
            analysis: SongAnalysis {
                sample_rate: 44_100,
                duration,
                tempo_bpm: 120.0,
                beats,
                ..Default::default()
            },
            clip: AudioClip {
                path: PathBuf::from("song.mp3"),
                byte_len: 1,
                duration,
            },
        }
    }

    #[test]
    fn start_track_schedules_after_delay() {
        let clock = ManualClock::starting_at(10.0);
        let mut game = game(&clock);
        game.start_track(track(vec![1.0], 5.0)).unwrap();

        assert_eq!(game.session().unwrap().start_time(), 12.0);
        assert_eq!(
            game.audio().state(),
            PlaybackState::Scheduled { start_time: 12.0 }
        );
        assert_eq!(game.transport_state(), TransportState::Playing);
    }

    #[test]
    fn pause_requires_active_session() {
        let clock = ManualClock::new();
        let mut game = game(&clock);
        assert!(!game.pause());
        assert_eq!(game.resume(), None);
    }

    #[test]
    fn pause_shift_preserves_hit_timing() {
        let clock = ManualClock::new();
        let mut game = game(&clock);
        game.start_track(track(vec![2.0, 6.0], 10.0)).unwrap();

        // Start at 2.0, first beat hits at 4.0 and spawns at 2.5.
        clock.set(3.0);
        game.tick(&FrameInput::default());
        let note = game.notes().approaching().next().unwrap().id();
        assert_eq!(game.notes().get(note).unwrap().hit_time(), 4.0);

        game.tick(&FrameInput::toggle_pause());
        clock.advance(7.0);
        let events = game.tick(&FrameInput::toggle_pause());
        assert!(events.contains(&GameEvent::Resumed {
            pause_duration: 7.0
        }));

        let shifted = game.notes().get(note).unwrap();
        assert_eq!(shifted.hit_time(), 11.0);
        assert_eq!(shifted.spawn_time(), 9.5);
        assert_eq!(game.session().unwrap().start_time(), 9.0);

        clock.set(11.0);
        let events = game.tick(&FrameInput::hit());
        let judged = events.iter().find_map(|event| match event {
            GameEvent::Judged { hit, .. } => Some(*hit),
            _ => None,
        });
        assert_eq!(judged.unwrap().delta, 0.0);
    }

    #[test]
    fn paused_game_ignores_hits_and_expiry() {
        let clock = ManualClock::new();
        let mut game = game(&clock);
        game.start_track(track(vec![1.0], 10.0)).unwrap();
        clock.set(2.0);
        game.tick(&FrameInput::default());
        game.pause();

        clock.set(50.0);
        let events = game.tick(&FrameInput::hit());
        assert_eq!(events, vec![GameEvent::Paused]);
        assert_eq!(game.notes().approaching().count(), 1);
        assert_eq!(game.score().miss, 0);
    }

    #[test]
    fn offset_steps_only_apply_while_paused() {
        let clock = ManualClock::new();
        let mut game = game(&clock);
        game.start_track(track(vec![1.0], 10.0)).unwrap();

        game.tick(&FrameInput::adjust(OffsetStep::Plus5));
        assert_eq!(game.offset().offset_ms(), 0.0);

        game.pause();
        let events = game.tick(&FrameInput::adjust(OffsetStep::Plus5));
        assert_eq!(game.offset().offset_ms(), 5.0);
        assert!(events.contains(&GameEvent::OffsetChanged(5.0)));
    }

    #[test]
    fn analysis_request_validates_path() {
        let clock = ManualClock::new();
        let mut game = game(&clock);

        assert!(game.request_analysis("  ").is_err());
        assert_eq!(game.status(), "Please enter a file path first.");
        assert!(!game.is_analyzing());
    }

    #[test]
    fn second_load_request_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GameConfig::default();
        config.paths.track_dir = dir.path().to_path_buf();
        let clock = ManualClock::new();
        let mut game = Game::new(
            config,
            Box::new(clock),
            Box::new(SilentOutput::new()),
            OffsetController::in_memory(),
        )
        .unwrap();

        game.start_loading().unwrap();
        assert!(matches!(
            game.start_loading(),
            Err(RhythmError::LoadInProgress)
        ));
    }
}
