use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::encode::ensure_parent_dir;
use crate::error::{FramecastError, FramecastResult};

/// One caption word with millisecond timestamps, as consumed by the scene.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Caption {
    #[serde(rename = "start")]
    pub start_ms: u64,
    #[serde(rename = "stop")]
    pub stop_ms: u64,
    pub text: String,
}

/// Configuration for one transcription run.
#[derive(Clone, Debug)]
pub struct TranscribeConfig {
    /// Audio file to transcribe, any format ffmpeg can read.
    pub input: PathBuf,
    /// Path to a ggml whisper model.
    pub model: PathBuf,
    /// Where the caption JSON is written.
    pub output: PathBuf,
    /// whisper.cpp binary name or path.
    pub whisper_bin: String,
    /// Spoken language hint passed to whisper.
    pub language: String,
}

impl TranscribeConfig {
    pub fn validate(&self) -> FramecastResult<()> {
        if !self.input.is_file() {
            return Err(FramecastError::validation(format!(
                "audio input '{}' not found",
                self.input.display()
            )));
        }
        if !self.model.is_file() {
            return Err(FramecastError::validation(format!(
                "whisper model '{}' not found",
                self.model.display()
            )));
        }
        Ok(())
    }
}

/// Transcribe `cfg.input` into per-word captions and write them as JSON.
///
/// The input is first normalized to the 16 kHz mono PCM wav whisper.cpp
/// expects, then run through the model with one word per segment.
pub async fn transcribe(cfg: &TranscribeConfig) -> FramecastResult<Vec<Caption>> {
    cfg.validate()?;

    let wav_path = temp_wav_path();
    let _wav = TempFileGuard(Some(wav_path.clone()));
    normalize_to_wav(&cfg.input, &wav_path).await?;

    let stdout = run_whisper(cfg, &wav_path).await?;
    let captions = parse_timed_lines(&stdout);
    if captions.is_empty() {
        tracing::warn!(input = %cfg.input.display(), "transcription produced no captions");
    }

    write_captions(&cfg.output, &captions)?;
    Ok(captions)
}

/// Resample `input` to the PCM format whisper.cpp accepts.
async fn normalize_to_wav(input: &Path, wav: &Path) -> FramecastResult<()> {
    let status = Command::new("ffmpeg")
        .args(["-nostats", "-loglevel", "error", "-y", "-i"])
        .arg(input)
        .args(["-ar", "16000", "-ac", "1", "-c:a", "pcm_s16le"])
        .arg(wav)
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|e| {
            FramecastError::process_startup(
                format!("failed to spawn ffmpeg (is it installed and on PATH?): {e}"),
                None,
            )
        })?;
    if !status.success() {
        return Err(FramecastError::process_startup(
            format!("ffmpeg audio normalization exited with status {status}"),
            status.code(),
        ));
    }
    Ok(())
}

/// Run whisper.cpp over the normalized wav, returning its stdout.
///
/// `-ml 1` with `-sow` splits the output into one word per timed segment,
/// which is what the caption overlay keys on.
async fn run_whisper(cfg: &TranscribeConfig, wav: &Path) -> FramecastResult<String> {
    tracing::info!(
        model = %cfg.model.display(),
        language = %cfg.language,
        "transcribing"
    );
    let output = Command::new(&cfg.whisper_bin)
        .arg("-m")
        .arg(&cfg.model)
        .arg("-f")
        .arg(wav)
        .args(["-ml", "1", "-sow", "-l"])
        .arg(&cfg.language)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            FramecastError::process_startup(
                format!(
                    "failed to spawn '{}' (is whisper.cpp installed?): {e}",
                    cfg.whisper_bin
                ),
                None,
            )
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FramecastError::process_startup(
            format!(
                "{} exited with status {}: {}",
                cfg.whisper_bin,
                output.status,
                stderr.trim()
            ),
            output.status.code(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse whisper.cpp timed output lines into captions.
///
/// Expected shape per line: `[00:00:01.230 --> 00:00:01.560]   word`.
/// Anything else (progress output, blank lines) is skipped.
pub fn parse_timed_lines(stdout: &str) -> Vec<Caption> {
    static TIMED_LINE_RE: OnceLock<Regex> = OnceLock::new();
    let re = TIMED_LINE_RE.get_or_init(|| {
        Regex::new(r"^\[(\d{2}:\d{2}:\d{2}\.\d{3})\s*-->\s*(\d{2}:\d{2}:\d{2}\.\d{3})\]\s*(.*)$")
            .expect("timed line regex compiles")
    });
    stdout
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line.trim())?;
            let start_ms = timestamp_to_ms(&caps[1])?;
            let stop_ms = timestamp_to_ms(&caps[2])?;
            let text = caps[3].split_whitespace().collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                return None;
            }
            Some(Caption {
                start_ms,
                stop_ms,
                text,
            })
        })
        .collect()
}

/// Convert `HH:MM:SS.mmm` to milliseconds.
fn timestamp_to_ms(ts: &str) -> Option<u64> {
    let (hms, millis) = ts.split_once('.')?;
    let mut parts = hms.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    let millis: u64 = millis.parse().ok()?;
    Some(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
}

fn write_captions(path: &Path, captions: &[Caption]) -> FramecastResult<()> {
    use anyhow::Context as _;
    ensure_parent_dir(path)?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create caption file '{}'", path.display()))?;
    serde_json::to_writer(file, captions)
        .with_context(|| format!("failed to write caption file '{}'", path.display()))?;
    Ok(())
}

fn temp_wav_path() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!(
        "framecast_whisper_{}_{}.wav",
        std::process::id(),
        nanos
    ))
}

struct TempFileGuard(Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(p) = self.0.take() {
            let _ = std::fs::remove_file(p);
        }
    }
}
