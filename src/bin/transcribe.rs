use std::path::PathBuf;

use clap::Parser;

use framecast::transcribe::{TranscribeConfig, transcribe};

#[derive(Parser, Debug)]
#[command(
    name = "framecast-transcribe",
    version,
    about = "Generate per-word caption JSON from an audio track"
)]
struct Cli {
    /// Audio file to transcribe.
    #[arg(long, default_value = "src/assets/sound.mp3")]
    input: PathBuf,

    /// ggml whisper model file.
    #[arg(long, default_value = "models/ggml-medium.bin")]
    model: PathBuf,

    /// Caption JSON output path.
    #[arg(long, default_value = "src/assets/subtitles.json")]
    output: PathBuf,

    /// whisper.cpp binary to invoke.
    #[arg(long, default_value = "whisper-cli")]
    whisper_bin: String,

    /// Spoken language hint.
    #[arg(long, default_value = "en")]
    language: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let cfg = TranscribeConfig {
        input: cli.input,
        model: cli.model,
        output: cli.output,
        whisper_bin: cli.whisper_bin,
        language: cli.language,
    };
    let captions = transcribe(&cfg).await?;

    eprintln!("wrote {} captions to {}", captions.len(), cfg.output.display());
    Ok(())
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
