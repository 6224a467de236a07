use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{FramecastError, FramecastResult};
use crate::meta::FRAME_FILE_PATTERN;

/// Configuration for muxing a numbered PNG sequence into an MP4.
#[derive(Clone, Debug)]
pub struct EncodeConfig {
    /// Directory holding the numbered frames (`00000.png` onward).
    pub frames_dir: PathBuf,
    /// Output MP4 file path.
    pub out_path: PathBuf,
    /// Frame rate reported by the scene, applied to input and output.
    pub fps: f64,
    /// Optional audio track muxed alongside the video.
    pub audio: Option<PathBuf>,
}

impl EncodeConfig {
    pub fn validate(&self) -> FramecastResult<()> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(FramecastError::validation(
                "encode fps must be a positive finite number",
            ));
        }
        Ok(())
    }
}

/// Build the ffmpeg argument vector for `cfg`.
///
/// With audio the output stops at the shorter stream (`-shortest`); without
/// audio no audio stream is mapped at all. Output pixel format is always
/// `yuv420p` so the MP4 plays everywhere.
pub fn ffmpeg_args(cfg: &EncodeConfig) -> Vec<String> {
    let fps = cfg.fps.to_string();
    let pattern = cfg
        .frames_dir
        .join(FRAME_FILE_PATTERN)
        .to_string_lossy()
        .into_owned();

    let mut args = vec![
        "-y".to_owned(),
        "-framerate".to_owned(),
        fps.clone(),
        "-i".to_owned(),
        pattern,
    ];

    match cfg.audio.as_deref() {
        Some(audio) => {
            args.push("-i".to_owned());
            args.push(audio.to_string_lossy().into_owned());
            args.extend([
                "-c:v".to_owned(),
                "libx264".to_owned(),
                "-c:a".to_owned(),
                "aac".to_owned(),
                "-pix_fmt".to_owned(),
                "yuv420p".to_owned(),
                "-r".to_owned(),
                fps,
                "-shortest".to_owned(),
            ]);
        }
        None => {
            args.extend([
                "-c:v".to_owned(),
                "libx264".to_owned(),
                "-pix_fmt".to_owned(),
                "yuv420p".to_owned(),
                "-r".to_owned(),
                fps,
            ]);
        }
    }

    args.push(cfg.out_path.to_string_lossy().into_owned());
    args
}

/// Resolve the audio track for the final mux.
///
/// A missing file downgrades to a video-only encode rather than failing;
/// scenes may legitimately ship without sound.
pub fn resolve_audio(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        Some(path.to_path_buf())
    } else {
        tracing::warn!(path = %path.display(), "audio file not found; encoding without audio");
        None
    }
}

/// Run ffmpeg over the captured frames and return the path of the written
/// video.
///
/// stdio is inherited so encode progress lands in the terminal alongside the
/// rest of the pipeline output.
pub async fn encode_video(cfg: &EncodeConfig) -> FramecastResult<PathBuf> {
    cfg.validate()?;
    ensure_parent_dir(&cfg.out_path)?;

    if !is_ffmpeg_on_path() {
        return Err(FramecastError::encode(
            "ffmpeg is required for MP4 encoding, but was not found on PATH",
            None,
        ));
    }

    let args = ffmpeg_args(cfg);
    tracing::info!(
        out = %cfg.out_path.display(),
        audio = cfg.audio.is_some(),
        "encoding"
    );
    tracing::debug!(args = %args.join(" "), "ffmpeg");

    let status = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|e| {
            FramecastError::encode(
                format!("failed to spawn ffmpeg (is it installed and on PATH?): {e}"),
                None,
            )
        })?;

    if !status.success() {
        return Err(FramecastError::encode(
            format!("ffmpeg exited with status {status}"),
            status.code(),
        ));
    }
    Ok(cfg.out_path.clone())
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> FramecastResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(audio: Option<&str>) -> EncodeConfig {
        EncodeConfig {
            frames_dir: PathBuf::from("out/frames"),
            out_path: PathBuf::from("out/video.mp4"),
            fps: 30.0,
            audio: audio.map(PathBuf::from),
        }
    }

    #[test]
    fn args_with_audio_mux_and_stop_at_shortest() {
        let args = ffmpeg_args(&cfg(Some("src/assets/sound.mp3")));
        assert_eq!(
            args,
            vec![
                "-y",
                "-framerate",
                "30",
                "-i",
                "out/frames/%05d.png",
                "-i",
                "src/assets/sound.mp3",
                "-c:v",
                "libx264",
                "-c:a",
                "aac",
                "-pix_fmt",
                "yuv420p",
                "-r",
                "30",
                "-shortest",
                "out/video.mp4",
            ]
        );
    }

    #[test]
    fn args_without_audio_skip_the_audio_chain() {
        let args = ffmpeg_args(&cfg(None));
        assert_eq!(
            args,
            vec![
                "-y",
                "-framerate",
                "30",
                "-i",
                "out/frames/%05d.png",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-r",
                "30",
                "out/video.mp4",
            ]
        );
        assert!(!args.iter().any(|a| a == "-c:a" || a == "-shortest"));
    }

    #[test]
    fn fractional_fps_is_passed_through() {
        let mut c = cfg(None);
        c.fps = 29.97;
        let args = ffmpeg_args(&c);
        assert_eq!(args[2], "29.97");
    }

    #[test]
    fn config_validation_catches_bad_fps() {
        let mut c = cfg(None);
        c.fps = 0.0;
        assert!(c.validate().is_err());
        c.fps = f64::INFINITY;
        assert!(c.validate().is_err());
        c.fps = 60.0;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn missing_audio_resolves_to_none() {
        assert_eq!(resolve_audio(Path::new("does/not/exist.mp3")), None);
    }

    #[test]
    fn present_audio_resolves_to_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("sound.mp3");
        std::fs::write(&audio, b"not really mp3").unwrap();
        assert_eq!(resolve_audio(&audio), Some(audio));
    }
}
