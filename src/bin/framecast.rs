use std::path::PathBuf;

use clap::Parser;

use framecast::pipeline::{self, RenderConfig, Stage};
use framecast::supervise::force_release_port;

#[derive(Parser, Debug)]
#[command(name = "framecast", version, about = "Render the web scene to an MP4")]
struct Cli {
    /// Audio track to mux into the video; skipped when the file is missing.
    #[arg(long, default_value = "src/assets/sound.mp3")]
    audio: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let cfg = RenderConfig {
        audio: cli.audio,
        ..RenderConfig::default()
    };
    let port = cfg.server_port;

    // Ctrl-C wins the race by dropping the pipeline future, which tears
    // down every supervised child via kill_on_drop.
    let outcome = tokio::select! {
        result = pipeline::run(&cfg) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let code = match outcome {
        Some(Ok(summary)) => {
            eprintln!("wrote {}", summary.out_path.display());
            0
        }
        Some(Err(err)) => {
            tracing::error!(error = %err, "render failed");
            force_release_port(port).await;
            1
        }
        None => {
            tracing::warn!(stage = Stage::AbortedCleanup.label(), "interrupted");
            force_release_port(port).await;
            130
        }
    };
    std::process::exit(code);
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
