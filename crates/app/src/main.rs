use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use sound_duel_core::{
    BattleDecisionEngine, CaptureSource, CpalSource, EngineConfig, EngineService, NullSink,
    NullSource, Posture, SongRatingIndex,
};
use tracing_subscriber::EnvFilter;

fn main() -> sound_duel_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Battle {
            posture,
            ratings,
            duration_secs,
            suggestions,
        } => run_battle(posture, ratings.as_deref(), duration_secs, suggestions),
        Commands::Simulate { posture, cycles } => run_simulate(posture, cycles),
    }
}

/// Live mode: capture the room, fight until the clock runs out.
fn run_battle(
    posture: PostureArg,
    ratings_path: Option<&std::path::Path>,
    duration_secs: u64,
    suggestions: bool,
) -> sound_duel_core::Result<()> {
    let mut config = EngineConfig::default();
    config.song_suggestions = suggestions;

    let ratings = match ratings_path {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            let index = SongRatingIndex::from_json_str(&json)?;
            tracing::info!(tracks = index.len(), "rating index loaded");
            index
        }
        None => SongRatingIndex::new(),
    };

    // A missing input device degrades to silence instead of refusing to run.
    let capture: Box<dyn CaptureSource> = match CpalSource::open(&config.capture) {
        Ok(source) => Box::new(source),
        Err(err) => {
            tracing::warn!(error = %err, "no capture device, running on silence");
            Box::new(NullSource::new(config.capture.sample_rate))
        }
    };

    let service = EngineService::spawn(config, Box::new(NullSink), ratings, capture)?;
    let observables = service.observables();

    service.start_battle(posture.into())?;
    tracing::info!(duration_secs, "battle running");

    let deadline = std::time::Instant::now() + Duration::from_secs(duration_secs);
    while std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_secs(1));
        let session = observables.session.get();
        let analysis = observables.analysis.get();
        tracing::info!(
            momentum = session.momentum,
            opponent_level = analysis.overall_level,
            "status"
        );
        if let Some(suggestion) = observables.suggestion.get().as_ref() {
            tracing::info!(
                track = %suggestion.track_id,
                reason = suggestion.reason.label(),
                "suggested counter"
            );
        }
    }

    service.end()?;
    let session = observables.session.get();

    println!("battle over: final momentum {}", session.momentum);
    for entry in session.events() {
        println!("  [{:>6} ms] {:?}", entry.at_ms, entry.event);
    }
    Ok(())
}

/// Offline mode: feed the engine a synthetic opponent and print what it did.
/// Useful for eyeballing the decision rules without an input device.
fn run_simulate(posture: PostureArg, cycles: u64) -> sound_duel_core::Result<()> {
    let mut engine = BattleDecisionEngine::new(
        EngineConfig::default(),
        Box::new(NullSink),
        SongRatingIndex::new(),
    );
    engine.start_battle(posture.into());

    for cycle in 0..cycles {
        let block = synthetic_block(cycle, cycles);
        engine.process_block(&block);
    }

    let session = engine.session();
    println!("simulated {cycles} cycles: final momentum {}", session.momentum);
    println!("final effect state: {:?}", engine.effects());
    for entry in session.events() {
        println!("  [{:>6} ms] {:?}", entry.at_ms, entry.event);
    }
    Ok(())
}

/// Synthetic opponent: quiet intro, a loud bass-heavy middle, then a sudden
/// cut to silence to exercise the opportunity rules.
fn synthetic_block(cycle: u64, total: u64) -> Vec<f32> {
    let phase = cycle as f32 / total.max(1) as f32;
    if phase > 0.9 {
        return Vec::new();
    }

    let amplitude = if phase < 0.3 { 0.05 } else { 0.6 };
    let mut block = vec![0.0_f32; 4_800];
    let segment = block.len() / 6;
    for (index, sample) in block.iter_mut().enumerate() {
        // Front-load the block so the low "bands" read hot.
        let weight = if index < segment * 2 { 1.0 } else { 0.4 };
        *sample = amplitude * weight;
    }
    block
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PostureArg {
    Aggressive,
    Balanced,
    Defensive,
}

impl From<PostureArg> for Posture {
    fn from(arg: PostureArg) -> Self {
        match arg {
            PostureArg::Aggressive => Posture::Aggressive,
            PostureArg::Balanced => Posture::Balanced,
            PostureArg::Defensive => Posture::Defensive,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time sound duel battle engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a live battle against whatever the microphone hears.
    Battle {
        /// Strategic posture for the session.
        #[arg(short, long, value_enum, default_value_t = PostureArg::Balanced)]
        posture: PostureArg,
        /// Optional JSON rating index for counter-song suggestions.
        #[arg(short, long)]
        ratings: Option<PathBuf>,
        /// How long to fight before ending the session.
        #[arg(short, long, default_value_t = 60)]
        duration_secs: u64,
        /// Enable counter-song suggestions.
        #[arg(long)]
        suggestions: bool,
    },
    /// Run the decision engine against a synthetic opponent and print the log.
    Simulate {
        /// Strategic posture for the session.
        #[arg(short, long, value_enum, default_value_t = PostureArg::Aggressive)]
        posture: PostureArg,
        /// Number of 100 ms cycles to simulate.
        #[arg(short, long, default_value_t = 100)]
        cycles: u64,
    },
}
