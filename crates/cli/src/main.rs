//! Headless subtitle player with clip, screenshot and flashcard capture.

mod commands;
mod playback;
mod sinks;
mod subtitles;
mod worker;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use directories::ProjectDirs;
use subclip_engine::EngineConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "subclip")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine config file (JSON); defaults to the user config directory
    #[arg(long, global = true, env = "SUBCLIP_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding captured clips and the note deck
    #[arg(long, global = true, env = "SUBCLIP_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the streams and recordable formats of a media file
    Probe { media: PathBuf },
    /// List subtitle lines, or the line showing at a given time
    Cues {
        subtitles: PathBuf,

        /// Media time in seconds
        #[arg(long)]
        at: Option<f64>,

        /// Subtitle offset in seconds; positive shows lines later
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        offset: f64,
    },
    /// Play a media file headlessly, printing subtitle changes
    Play(PlayArgs),
    /// Record a span of a media file into the clip library
    Clip(ClipArgs),
    /// Save the frame at a media time as PNG
    Shot {
        media: PathBuf,

        #[arg(long)]
        at: f64,

        #[arg(short, long)]
        output: PathBuf,
    },
    /// Create a flashcard from the subtitle line at a media time
    Card(CardArgs),
    /// List captured clips
    Clips {
        /// Only clips recorded from this media id
        #[arg(long)]
        owner: Option<String>,
    },
    /// Delete a captured clip
    Delete { id: Uuid },
}

#[derive(Args, Debug, Clone, Default)]
pub struct SubtitleArgs {
    /// Target-language subtitles (SRT or WebVTT)
    #[arg(long)]
    pub subs: Option<PathBuf>,

    /// Native-language subtitles (SRT or WebVTT)
    #[arg(long)]
    pub secondary: Option<PathBuf>,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub offset: f64,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub secondary_offset: f64,
}

#[derive(Args, Debug, Clone)]
pub struct PlayArgs {
    pub media: PathBuf,

    #[command(flatten)]
    pub subtitles: SubtitleArgs,

    /// Start position in seconds
    #[arg(long, default_value_t = 0.0)]
    pub from: f64,

    /// Loop between two media times
    #[arg(long = "loop", num_args = 2, value_names = ["START", "END"])]
    pub loop_range: Option<Vec<f64>>,

    /// Stop after this many wall-clock seconds
    #[arg(long)]
    pub seconds: Option<f64>,

    /// Playback rate
    #[arg(long, default_value_t = 1.0)]
    pub rate: f64,
}

#[derive(Args, Debug, Clone)]
pub struct ClipArgs {
    pub media: PathBuf,

    #[arg(long)]
    pub start: f64,

    #[arg(long)]
    pub end: f64,

    /// Record audio only
    #[arg(long)]
    pub audio: bool,

    /// Clip title; defaults to the media name and span
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, default_value_t = 1.0)]
    pub rate: f64,
}

#[derive(Args, Debug, Clone)]
pub struct CardArgs {
    pub media: PathBuf,

    #[command(flatten)]
    pub subtitles: SubtitleArgs,

    /// Media time of the line to study
    #[arg(long)]
    pub at: f64,

    #[arg(long)]
    pub term: Option<String>,

    #[arg(long)]
    pub definition: Option<String>,

    /// Sentence to use instead of the subtitle line
    #[arg(long)]
    pub sentence: Option<String>,

    /// Translation to use instead of the secondary subtitle line
    #[arg(long)]
    pub translation: Option<String>,

    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Skip recording the line's audio
    #[arg(long)]
    pub no_audio: bool,

    /// Note deck (JSON lines); defaults to the data directory
    #[arg(long)]
    pub deck: Option<PathBuf>,

    #[arg(long, default_value_t = 1.0)]
    pub rate: f64,
}

/// Resolved configuration and data locations.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: EngineConfig,
    pub data_dir: PathBuf,
}

impl Settings {
    fn resolve(config: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "subclip");

        let config_path = config.or_else(|| {
            dirs.as_ref()
                .map(|dirs| dirs.config_dir().join("config.json"))
                .filter(|path| path.is_file())
        });
        let config = match &config_path {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };

        let data_dir = data_dir
            .or_else(|| dirs.as_ref().map(|dirs| dirs.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from(".subclip"));

        debug!(config = ?config_path, data_dir = %data_dir.display(), "settings resolved");
        Ok(Self { config, data_dir })
    }

    pub fn clips_dir(&self) -> PathBuf {
        self.data_dir.join("clips")
    }

    pub fn deck_path(&self) -> PathBuf {
        self.data_dir.join("deck").join("notes.jsonl")
    }

    pub fn deck_media_dir(&self) -> PathBuf {
        self.data_dir.join("deck").join("media")
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = Settings::resolve(cli.config, cli.data_dir)?;

    match cli.command {
        Commands::Probe { media } => commands::probe(&media),
        Commands::Cues {
            subtitles,
            at,
            offset,
        } => commands::cues(&subtitles, at, offset),
        Commands::Play(args) => commands::play(&settings, &args),
        Commands::Clip(args) => commands::clip(&settings, &args),
        Commands::Shot { media, at, output } => commands::shot(&settings, &media, at, &output),
        Commands::Card(args) => commands::card(&settings, &args),
        Commands::Clips { owner } => commands::list_clips(&settings, owner.as_deref()),
        Commands::Delete { id } => commands::delete_clip(&settings, id),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands};

    #[test]
    fn parses_play_with_loop_and_negative_offset() {
        let cli = Cli::try_parse_from([
            "subclip", "play", "ep01.mkv", "--subs", "ep01.es.srt", "--offset", "-0.5", "--loop",
            "5", "10",
        ])
        .expect("parse play");

        let Commands::Play(args) = cli.command else {
            panic!("expected play");
        };
        assert_eq!(args.loop_range, Some(vec![5.0, 10.0]));
        assert_eq!(args.subtitles.offset, -0.5);
        assert_eq!(args.rate, 1.0);
    }

    #[test]
    fn parses_card_tags_and_global_data_dir() {
        let cli = Cli::try_parse_from([
            "subclip", "card", "ep01.mkv", "--at", "12.5", "--term", "casa", "--tag", "a",
            "--tag", "b", "--no-audio", "--data-dir", "/tmp/subclip",
        ])
        .expect("parse card");

        assert_eq!(cli.data_dir.as_deref(), Some(std::path::Path::new("/tmp/subclip")));
        let Commands::Card(args) = cli.command else {
            panic!("expected card");
        };
        assert_eq!(args.tags, vec!["a".to_string(), "b".to_string()]);
        assert!(args.no_audio);
        assert_eq!(args.term.as_deref(), Some("casa"));
    }

    #[test]
    fn delete_requires_a_uuid() {
        assert!(Cli::try_parse_from(["subclip", "delete", "not-a-uuid"]).is_err());
    }
}
