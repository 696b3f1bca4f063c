use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use preview_player_core::{
    event_channel, AppConfig, FrameOutcome, Mood, PlaybackController, Surface, SyntheticBackend,
    Theme, VisualizerRenderer,
};
use tracing_subscriber::EnvFilter;

fn main() -> preview_player_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            address,
            seconds,
            mood,
            config,
        } => run_play(&address, seconds, mood.as_deref(), config.as_deref()),
        Commands::Moods => run_moods(),
    }
}

fn run_play(
    address: &str,
    seconds: u32,
    mood: Option<&str>,
    config: Option<&Path>,
) -> preview_player_core::Result<()> {
    let config = match config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let mood: Mood = match mood {
        Some(name) => name.parse()?,
        None => Mood::default(),
    };

    tracing::info!(address, %mood, "starting preview playback");

    let (events_tx, events_rx) = event_channel();
    let backend = SyntheticBackend::new(events_tx);
    let mut controller =
        PlaybackController::new(config.player.clone(), Box::new(backend), events_rx);

    controller.play(address);
    controller.pump_events();

    let analyser = match controller.analyser() {
        Some(analyser) => analyser,
        None => {
            tracing::warn!("no audible session; nothing to visualize");
            return Ok(());
        }
    };

    let surface = Surface::with_pixel_ratio(64.0, 16.0, 1.0);
    let mut renderer = VisualizerRenderer::new(analyser, surface, Theme::for_mood(mood))?
        .with_bar_gap(config.visualizer.bar_gap as usize);
    renderer.mount();

    let fps = config.visualizer.target_fps.max(1);
    let frame_interval = Duration::from_secs(1) / fps;
    let block_len = (config.player.sample_rate / fps).max(1) as usize;
    let mut phase = 0.0_f32;

    for frame in 0..seconds.saturating_mul(fps) {
        let block = tone_block(&mut phase, block_len, 220.0, config.player.sample_rate);
        controller.push_samples(&block)?;
        controller.pump_events();

        if renderer.render_frame() == FrameOutcome::Cancelled {
            break;
        }

        if frame % fps == 0 {
            let snapshot = controller.snapshot();
            tracing::info!(
                track = ?snapshot.currently_playing,
                playing = snapshot.is_playing,
                frames = renderer.frames_drawn(),
                "preview status"
            );
        }

        std::thread::sleep(frame_interval);
    }

    renderer.unmount();
    controller.stop();
    controller.shutdown();
    tracing::info!(frames = renderer.frames_drawn(), "preview finished");
    Ok(())
}

fn run_moods() -> preview_player_core::Result<()> {
    for mood in Mood::ALL {
        let theme = Theme::for_mood(mood);
        println!(
            "{mood:<9} light #{:02x}{:02x}{:02x}  dark #{:02x}{:02x}{:02x}",
            theme.light.r, theme.light.g, theme.light.b, theme.dark.r, theme.dark.g, theme.dark.b,
        );
    }
    Ok(())
}

/// Synthesizes one block of a sine tone, standing in for decoded preview
/// audio in this demo binary.
fn tone_block(phase: &mut f32, len: usize, freq: f32, sample_rate: u32) -> Vec<f32> {
    let step = 2.0 * PI * freq / sample_rate as f32;
    (0..len)
        .map(|_| {
            let sample = phase.sin() * 0.5;
            *phase = (*phase + step) % (2.0 * PI);
            sample
        })
        .collect()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Track preview player with a live spectrum view", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a preview address against the synthetic backend and drive the
    /// visualizer frame loop.
    Play {
        /// Preview address to play.
        address: String,
        /// How long to run the preview for.
        #[arg(short, long, default_value_t = 5)]
        seconds: u32,
        /// Mood selecting the bar gradient (see `moods`).
        #[arg(short, long)]
        mood: Option<String>,
        /// Optional JSON configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List the available visualizer mood themes.
    Moods,
}
