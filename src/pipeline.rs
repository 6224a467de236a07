use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;

use crate::capture::{CaptureOpts, CaptureReport, capture_frames};
use crate::encode::{EncodeConfig, encode_video, resolve_audio};
use crate::error::{FramecastError, FramecastResult};
use crate::meta::{FRAME_INDEX_PAD, SceneMeta, parse_frame_file_name};
use crate::supervise::{CommandSpec, spawn_supervised};

/// Pipeline stages, in the order a successful run passes through them.
///
/// `AbortedCleanup` is reachable from every stage after `Idle`; the others
/// advance strictly forward.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Idle,
    PreparingOutputDirs,
    Building,
    AwaitingBuildReady,
    StartingServer,
    AwaitingServerReady,
    Capturing,
    Encoding,
    Done,
    AbortedCleanup,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::PreparingOutputDirs => "preparing-output-dirs",
            Stage::Building => "building",
            Stage::AwaitingBuildReady => "awaiting-build-ready",
            Stage::StartingServer => "starting-server",
            Stage::AwaitingServerReady => "awaiting-server-ready",
            Stage::Capturing => "capturing",
            Stage::Encoding => "encoding",
            Stage::Done => "done",
            Stage::AbortedCleanup => "aborted-cleanup",
        }
    }
}

/// Full configuration for one render run.
#[derive(Clone, Debug)]
pub struct RenderConfig {
    /// Command that produces the production bundle.
    pub build_command: CommandSpec,
    /// Substring of a build stdout line that signals the bundle is written.
    pub build_ready_marker: String,
    /// Command that serves the built bundle.
    pub serve_command: CommandSpec,
    /// Substrings that must all appear on one server stdout line before
    /// the scene URL is considered reachable.
    pub server_ready_markers: Vec<String>,
    /// Port the preview server listens on, used for forced release.
    pub server_port: u16,
    /// URL the headless browser navigates to.
    pub scene_url: String,
    /// Root output directory, preserved across runs.
    pub out_dir: PathBuf,
    /// Frame directory under `out_dir`, reset on every run.
    pub frames_dir: PathBuf,
    /// Final MP4 path.
    pub out_path: PathBuf,
    /// Audio track candidate; a missing file downgrades to video-only.
    pub audio: PathBuf,
    /// Pause between the build-ready marker and starting the server.
    pub post_build_settle: Duration,
    /// Pause after `__startMedia` before the first frame is captured.
    pub media_settle: Duration,
    /// How long to wait for the scene to expose its page hooks.
    pub ready_timeout: Duration,
    /// Log a progress line every N frames.
    pub progress_every: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            build_command: CommandSpec::new("build", "npm", &["run", "build"]),
            build_ready_marker: "built in".to_owned(),
            serve_command: CommandSpec::new("preview server", "npm", &["run", "preview"]),
            server_ready_markers: vec!["localhost:".to_owned(), "4175".to_owned()],
            server_port: 4175,
            scene_url: "http://localhost:4175/?render=1".to_owned(),
            out_dir: PathBuf::from("out"),
            frames_dir: PathBuf::from("out/frames"),
            out_path: PathBuf::from("out/video.mp4"),
            audio: PathBuf::from("src/assets/sound.mp3"),
            post_build_settle: Duration::from_secs(3),
            media_settle: Duration::from_millis(500),
            ready_timeout: Duration::from_secs(20),
            progress_every: 10,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> FramecastResult<()> {
        if self.build_ready_marker.is_empty() {
            return Err(FramecastError::validation(
                "build ready marker must not be empty",
            ));
        }
        if self.server_ready_markers.is_empty()
            || self.server_ready_markers.iter().any(String::is_empty)
        {
            return Err(FramecastError::validation(
                "server ready markers must be non-empty strings",
            ));
        }
        if self.scene_url.is_empty() {
            return Err(FramecastError::validation("scene url must not be empty"));
        }
        Ok(())
    }

    fn capture_opts(&self) -> CaptureOpts {
        CaptureOpts {
            scene_url: self.scene_url.clone(),
            frames_dir: self.frames_dir.clone(),
            ready_timeout: self.ready_timeout,
            media_settle: self.media_settle,
            progress_every: self.progress_every,
            ..CaptureOpts::default()
        }
    }
}

/// What a completed run produced.
#[derive(Clone, Debug)]
pub struct RenderSummary {
    pub meta: SceneMeta,
    pub frames_captured: u64,
    pub out_path: PathBuf,
}

/// Run the whole pipeline: build, serve, capture, encode.
///
/// The build and server processes are terminated exactly once each, on both
/// the success and the error path.
pub async fn run(cfg: &RenderConfig) -> FramecastResult<RenderSummary> {
    cfg.validate()?;

    stage(Stage::PreparingOutputDirs);
    prepare_output_dirs(&cfg.out_dir, &cfg.frames_dir)?;

    stage(Stage::Building);
    let build = spawn_supervised(&cfg.build_command)?;
    stage(Stage::AwaitingBuildReady);
    let marker = cfg.build_ready_marker.clone();
    let mut build = build.await_ready(move |line| line.contains(&marker)).await?;
    // The bundler can report success slightly before output is fully
    // flushed to disk.
    tokio::time::sleep(cfg.post_build_settle).await;
    build.terminate().await;

    let summary = serve_and_render(cfg).await?;

    stage(Stage::Done);
    Ok(summary)
}

/// Start the preview server, render against it, and always shut it down.
async fn serve_and_render(cfg: &RenderConfig) -> FramecastResult<RenderSummary> {
    stage(Stage::StartingServer);
    let server = spawn_supervised(&cfg.serve_command)?;
    stage(Stage::AwaitingServerReady);
    let markers = cfg.server_ready_markers.clone();
    let mut server = server
        .await_ready(move |line| markers.iter().all(|m| line.contains(m.as_str())))
        .await?;

    let result = capture_and_encode(cfg).await;
    server.terminate().await;
    result
}

async fn capture_and_encode(cfg: &RenderConfig) -> FramecastResult<RenderSummary> {
    stage(Stage::Capturing);
    let report: CaptureReport = capture_frames(&cfg.capture_opts()).await?;
    verify_frame_set(&cfg.frames_dir, report.meta.total_frames)?;

    stage(Stage::Encoding);
    let encode = EncodeConfig {
        frames_dir: cfg.frames_dir.clone(),
        out_path: cfg.out_path.clone(),
        fps: report.meta.fps,
        audio: resolve_audio(&cfg.audio),
    };
    let out_path = encode_video(&encode).await?;

    Ok(RenderSummary {
        meta: report.meta,
        frames_captured: report.frames_captured,
        out_path,
    })
}

/// Create the output tree, resetting the frame directory but leaving the
/// rest of `out_dir` alone.
pub fn prepare_output_dirs(out_dir: &Path, frames_dir: &Path) -> FramecastResult<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory '{}'", out_dir.display()))?;
    if frames_dir.exists() {
        std::fs::remove_dir_all(frames_dir).with_context(|| {
            format!(
                "failed to clear stale frame directory '{}'",
                frames_dir.display()
            )
        })?;
    }
    std::fs::create_dir_all(frames_dir)
        .with_context(|| format!("failed to create frame directory '{}'", frames_dir.display()))?;
    Ok(())
}

/// Check that the frame directory holds exactly `expected` canonically named
/// frames covering indices `0..expected` with no gaps and no strays.
pub fn verify_frame_set(frames_dir: &Path, expected: u64) -> FramecastResult<()> {
    let entries = std::fs::read_dir(frames_dir)
        .with_context(|| format!("failed to read frame directory '{}'", frames_dir.display()))?;

    let mut found = BTreeSet::new();
    for entry in entries {
        let entry = entry.with_context(|| {
            format!("failed to read frame directory '{}'", frames_dir.display())
        })?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Some(idx) = parse_frame_file_name(&name) else {
            return Err(FramecastError::validation(format!(
                "unexpected file '{name}' in frames directory"
            )));
        };
        if idx.0 >= expected {
            return Err(FramecastError::validation(format!(
                "frame index {} out of range (expected 0..{}, pad {})",
                idx.0, expected, FRAME_INDEX_PAD
            )));
        }
        found.insert(idx.0);
    }

    if found.len() as u64 != expected {
        let missing = (0..expected)
            .find(|i| !found.contains(i))
            .unwrap_or(expected);
        return Err(FramecastError::validation(format!(
            "frames directory holds {} of {} expected frames (first missing index {})",
            found.len(),
            expected,
            missing
        )));
    }
    Ok(())
}

fn stage(s: Stage) {
    tracing::info!(stage = s.label(), "pipeline stage");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_frame(dir: &Path, idx: u64) {
        let name = crate::meta::frame_file_name(crate::meta::FrameIndex(idx));
        std::fs::write(dir.join(name), b"png bytes").unwrap();
    }

    #[test]
    fn complete_frame_set_passes() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..4 {
            write_frame(dir.path(), i);
        }
        verify_frame_set(dir.path(), 4).unwrap();
    }

    #[test]
    fn gap_in_frame_set_is_reported_with_first_missing_index() {
        let dir = tempfile::tempdir().unwrap();
        for i in [0u64, 1, 3] {
            write_frame(dir.path(), i);
        }
        let err = verify_frame_set(dir.path(), 4).unwrap_err();
        assert!(err.to_string().contains("first missing index 2"), "{err}");
    }

    #[test]
    fn foreign_file_in_frame_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), 0);
        std::fs::write(dir.path().join("thumbs.db"), b"").unwrap();
        let err = verify_frame_set(dir.path(), 1).unwrap_err();
        assert!(err.to_string().contains("thumbs.db"), "{err}");
    }

    #[test]
    fn non_canonical_padding_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("000001.png"), b"").unwrap();
        let err = verify_frame_set(dir.path(), 2).unwrap_err();
        assert!(err.to_string().contains("unexpected file"), "{err}");
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), 7);
        let err = verify_frame_set(dir.path(), 4).unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
    }

    #[test]
    fn prepare_resets_frames_but_preserves_out_root() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("out");
        let frames = out.join("frames");

        prepare_output_dirs(&out, &frames).unwrap();
        std::fs::write(out.join("video.mp4"), b"old encode").unwrap();
        std::fs::write(frames.join("00000.png"), b"stale frame").unwrap();

        prepare_output_dirs(&out, &frames).unwrap();
        assert!(out.join("video.mp4").exists());
        assert!(!frames.join("00000.png").exists());
        assert!(frames.is_dir());
    }

    #[test]
    fn stage_labels_are_kebab_case() {
        assert_eq!(Stage::PreparingOutputDirs.label(), "preparing-output-dirs");
        assert_eq!(Stage::AwaitingServerReady.label(), "awaiting-server-ready");
        assert_eq!(Stage::AbortedCleanup.label(), "aborted-cleanup");
        assert_eq!(Stage::Done.label(), "done");
    }

    #[test]
    fn default_config_validates() {
        RenderConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_markers_fail_validation() {
        let mut cfg = RenderConfig::default();
        cfg.server_ready_markers = vec![String::new()];
        assert!(cfg.validate().is_err());
        cfg.server_ready_markers.clear();
        assert!(cfg.validate().is_err());
    }
}
