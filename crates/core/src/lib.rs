//! Core library for the Rhythm Game.
//!
//! Beat timestamps come from an offline analysis file. The crate binds them
//! to a monotonic clock, spawns notes ahead of their hit times, judges player
//! input against tiered timing windows, and keeps everything consistent
//! across pause/resume and latency-offset changes. All time values are
//! absolute clock readings in `f64` seconds.
//!
//! [`Game`] owns every component and is advanced once per frame with
//! [`Game::tick`]. Loading and analysis run in the background and are polled
//! from the tick, so no core operation ever blocks.

pub mod analysis;
pub mod analyzer;
pub mod assets;
pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod hud;
pub mod judge;
pub mod notes;
pub mod offset;
pub mod score;
pub mod session;
pub mod timeline;
pub mod transport;

pub use analysis::{BeatSchedule, SongAnalysis};
pub use analyzer::{AnalysisJob, AnalysisReport, AnalysisRequest, Analyzer};
pub use assets::{AssetKind, AudioClip, LoadJob, LoadedTrack, TrackLoader, TrackPaths};
pub use audio::{AudioOutput, PlaybackState, SilentOutput};
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use config::{GameConfig, JudgeWindows, NoteVisualConfig, ScoringConfig, TimingConfig};
pub use error::{Result, RhythmError};
pub use judge::{Hit, Judge, JudgeOutcome, Judgment, Timing};
pub use notes::{Note, NoteId, NoteRegistry, NoteState, NoteVisual};
pub use offset::{
    JsonPreferences, MemoryPreferences, OffsetController, OffsetStep, PreferenceStore,
};
pub use score::{ScoreAggregator, ScoreState, ScoreSummary};
pub use session::{FrameInput, Game, GameEvent, PlaybackSession};
pub use timeline::{PlaybackScheduler, SchedulerTick, SpawnEvent};
pub use transport::{Transport, TransportState};
