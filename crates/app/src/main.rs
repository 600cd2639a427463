use std::{
    io::BufRead,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, TryRecvError},
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand};
use rhythm_game_core::{
    hud, AnalysisRequest, Analyzer, FrameInput, Game, GameConfig, GameEvent, JsonPreferences,
    OffsetController, OffsetStep, SilentOutput, SystemClock,
};
use tracing_subscriber::EnvFilter;

const FRAME: Duration = Duration::from_millis(16);

fn main() -> rhythm_game_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            config,
            track_dir,
            autoplay,
        } => run_play(load_config(config.as_deref(), track_dir)?, autoplay),
        Commands::Analyze {
            input,
            config,
            track_dir,
        } => run_analyze(&input, &load_config(config.as_deref(), track_dir)?),
        Commands::Offset { config, action } => {
            run_offset(&load_config(config.as_deref(), None)?, action)
        }
    }
}

fn load_config(
    path: Option<&Path>,
    track_dir: Option<PathBuf>,
) -> rhythm_game_core::Result<GameConfig> {
    let mut config = match path {
        Some(path) => GameConfig::load(path)?,
        None => GameConfig::default(),
    };
    if let Some(dir) = track_dir {
        config.paths.track_dir = dir;
    }
    Ok(config)
}

fn open_offset(config: &GameConfig) -> rhythm_game_core::Result<OffsetController> {
    let store = JsonPreferences::open(&config.paths.preferences)?;
    Ok(OffsetController::load(Box::new(store)))
}

fn run_play(config: GameConfig, autoplay: bool) -> rhythm_game_core::Result<()> {
    tracing::info!(track = ?config.paths.track_dir, autoplay, "starting play mode");

    let offset = open_offset(&config)?;
    let mut game = Game::new(
        config,
        Box::new(SystemClock::new()),
        Box::new(SilentOutput::new()),
        offset,
    )?;
    let commands = spawn_input_reader();
    println!("{}", hud::offset_label(game.offset().offset_ms()));
    game.start_loading()?;

    let mut pending_hits = 0usize;
    let mut input_open = true;
    loop {
        let mut frame = FrameInput::default();
        let mut quit = false;

        while input_open {
            match commands.try_recv() {
                Ok(PlayCommand::Hit) => pending_hits += 1,
                Ok(PlayCommand::TogglePause) => frame.toggle_pause = true,
                Ok(PlayCommand::Adjust(step)) => frame.adjust_offset = Some(step),
                Ok(PlayCommand::Restart) => {
                    if let Err(err) = game.restart() {
                        tracing::warn!(%err, "restart rejected");
                    }
                }
                Ok(PlayCommand::Analyze(path)) => {
                    if let Err(err) = game.request_analysis(&path) {
                        tracing::warn!(%err, "analysis rejected");
                    }
                }
                Ok(PlayCommand::Quit) => quit = true,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    input_open = false;
                    quit = !autoplay;
                }
            }
        }
        if quit {
            break;
        }

        if pending_hits > 0 {
            pending_hits -= 1;
            frame.hit = true;
        }
        if autoplay && !game.is_paused() {
            let now = game.now();
            frame.hit |= game.notes().approaching().any(|note| note.hit_time() <= now);
        }

        let mut finished = false;
        for event in game.tick(&frame) {
            finished |= matches!(event, GameEvent::TrackFinished(_));
            report(&game, &event);
        }
        if finished && autoplay {
            break;
        }

        thread::sleep(FRAME);
    }
    Ok(())
}

fn report(game: &Game, event: &GameEvent) {
    match event {
        GameEvent::StatusChanged(status) if !status.is_empty() => println!("{status}"),
        GameEvent::TrackStarted { beats, .. } => {
            println!("{} | {beats} notes", hud::song_info(game.song_tempo()));
        }
        GameEvent::Judged { feedback, .. } => {
            let state = game.score();
            println!("{feedback:<14} {:>8} {}", state.score, hud::combo_text(state.combo));
        }
        GameEvent::Missed(_) => println!("{:<14} {:>8}", "Miss", game.score().score),
        GameEvent::Paused => println!("Paused ({})", hud::offset_label(game.offset().offset_ms())),
        GameEvent::Resumed { .. } => println!("Resumed"),
        GameEvent::OffsetChanged(ms) => println!("{}", hud::offset_value(*ms)),
        GameEvent::TrackFinished(summary) => println!("{}", hud::results(summary)),
        GameEvent::AnalysisFinished(report) => {
            tracing::info!(beats = report.beats, tempo = ?report.tempo_bpm, "analysis finished");
        }
        other => tracing::debug!(?other, "game event"),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PlayCommand {
    Hit,
    TogglePause,
    Adjust(OffsetStep),
    Restart,
    Analyze(String),
    Quit,
}

impl PlayCommand {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Some(path) = line.strip_prefix("a ") {
            return Some(PlayCommand::Analyze(path.to_string()));
        }
        let command = match line {
            "" | "h" => PlayCommand::Hit,
            "p" => PlayCommand::TogglePause,
            "[" => PlayCommand::Adjust(OffsetStep::Minus1),
            "]" => PlayCommand::Adjust(OffsetStep::Plus1),
            "{" => PlayCommand::Adjust(OffsetStep::Minus5),
            "}" => PlayCommand::Adjust(OffsetStep::Plus5),
            "r" => PlayCommand::Restart,
            "q" => PlayCommand::Quit,
            _ => return None,
        };
        Some(command)
    }
}

/// Reads line commands from stdin on a worker thread so the frame loop never
/// blocks on input.
fn spawn_input_reader() -> Receiver<PlayCommand> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match PlayCommand::parse(&line) {
                Some(command) => {
                    if sender.send(command).is_err() {
                        break;
                    }
                }
                None => tracing::warn!(line = %line, "unknown command"),
            }
        }
    });
    receiver
}

fn run_analyze(input: &str, config: &GameConfig) -> rhythm_game_core::Result<()> {
    let request = AnalysisRequest::from_user_input(input)?;
    let analyzer = Analyzer::from_config(&config.paths);
    tracing::info!(input = ?request.input(), "running analyzer");

    let report = analyzer.spawn(request)?.wait()?;
    println!(
        "Analysis complete: {} beats, {} -> {}",
        report.beats,
        hud::song_info(report.tempo_bpm),
        report.analysis_path.display()
    );
    Ok(())
}

fn run_offset(config: &GameConfig, action: Option<OffsetAction>) -> rhythm_game_core::Result<()> {
    let mut offset = open_offset(config)?;
    match action.unwrap_or(OffsetAction::Show) {
        OffsetAction::Show => {}
        OffsetAction::Set { ms } => {
            offset.set_offset(ms);
        }
        OffsetAction::Adjust { ms } => {
            offset.adjust(ms);
        }
    }
    println!("{}", hud::offset_label(offset.offset_ms()));
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Beat-synced rhythm game", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play the current track. Type commands followed by enter:
    /// `h` or empty line to hit, `p` pause, `[`/`]` offset -1/+1 ms,
    /// `{`/`}` offset -5/+5 ms, `r` restart, `a <path>` analyze, `q` quit.
    Play {
        /// JSON config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Directory holding `analysis.json` and the track audio.
        #[arg(short, long)]
        track_dir: Option<PathBuf>,
        /// Strike every note at its hit time and exit at the end of the track.
        #[arg(long)]
        autoplay: bool,
    },
    /// Run the external analyzer on an audio file and install the result as
    /// the current track.
    Analyze {
        /// Audio file to analyse.
        input: String,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        track_dir: Option<PathBuf>,
    },
    /// Show or change the persisted latency offset.
    Offset {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[command(subcommand)]
        action: Option<OffsetAction>,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum OffsetAction {
    /// Print the current offset.
    Show,
    /// Set the offset in milliseconds (clamped to -200..=200).
    Set {
        #[arg(allow_negative_numbers = true)]
        ms: f64,
    },
    /// Add a delta in milliseconds to the current offset.
    Adjust {
        #[arg(allow_negative_numbers = true)]
        ms: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_play_commands() {
        assert_eq!(PlayCommand::parse(""), Some(PlayCommand::Hit));
        assert_eq!(PlayCommand::parse(" p "), Some(PlayCommand::TogglePause));
        assert_eq!(
            PlayCommand::parse("}"),
            Some(PlayCommand::Adjust(OffsetStep::Plus5))
        );
        assert_eq!(
            PlayCommand::parse("a /music/song.mp3"),
            Some(PlayCommand::Analyze("/music/song.mp3".to_string()))
        );
        assert_eq!(PlayCommand::parse("x"), None);
    }

    #[test]
    fn parses_negative_offset() {
        let cli = Cli::try_parse_from(["rhythm-game", "offset", "set", "-15"]).unwrap();
        match cli.command {
            Commands::Offset {
                action: Some(OffsetAction::Set { ms }),
                ..
            } => assert_eq!(ms, -15.0),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
