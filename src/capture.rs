use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;

use crate::error::{FramecastError, FramecastResult};
use crate::meta::{FrameIndex, SceneMeta, frame_file_name};
use crate::scene::SceneSession;

/// Options controlling browser launch and the capture loop.
#[derive(Clone, Debug)]
pub struct CaptureOpts {
    /// Scene page URL, including the render query flag.
    pub scene_url: String,
    /// Directory receiving the numbered PNG frames.
    pub frames_dir: PathBuf,
    /// Upper bound on waiting for the scene readiness contract.
    pub ready_timeout: Duration,
    /// Poll interval for the readiness probe.
    pub ready_poll: Duration,
    /// Settle delay between starting media and the first seek.
    pub media_settle: Duration,
    /// Log progress every n-th frame (the final frame is always logged).
    pub progress_every: u64,
}

impl Default for CaptureOpts {
    fn default() -> Self {
        Self {
            scene_url: "http://localhost:4175/?render=1".to_owned(),
            frames_dir: PathBuf::from("out/frames"),
            ready_timeout: Duration::from_secs(20),
            ready_poll: Duration::from_millis(100),
            media_settle: Duration::from_millis(500),
            progress_every: 10,
        }
    }
}

/// Outcome of a completed capture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureReport {
    /// Metadata the scene reported before the first frame.
    pub meta: SceneMeta,
    /// Number of PNG frames written to the frames directory.
    pub frames_captured: u64,
}

/// Launch headless Chromium, drive the scene frame-by-frame, and write one
/// PNG per frame into `opts.frames_dir`.
///
/// Frames are strictly sequential: the next seek is only issued once the
/// previous screenshot is fully on disk. The browser is closed on every
/// outcome, including mid-loop failures.
pub async fn capture_frames(opts: &CaptureOpts) -> FramecastResult<CaptureReport> {
    let config = browser_config()?;
    let (mut browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| FramecastError::capture(format!("failed to launch chromium: {e}")))?;

    // The handler stream is the CDP event pump; every page command stalls
    // unless it is polled continuously.
    let cdp_pump = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    });

    let result = drive_scene(&browser, opts).await;

    if let Err(e) = browser.close().await {
        tracing::warn!(error = %e, "browser close failed; relying on process teardown");
    }
    let _ = browser.wait().await;
    let _ = cdp_pump.await;

    result
}

/// Chromium flags for unattended capture: no sandbox inside containers,
/// media autoplay without a user gesture, and relaxed cross-origin rules so
/// locally served assets load from the preview origin.
fn browser_config() -> FramecastResult<BrowserConfig> {
    BrowserConfig::builder()
        .no_sandbox()
        .args(vec![
            "--autoplay-policy=no-user-gesture-required",
            "--disable-web-security",
            "--allow-running-insecure-content",
        ])
        .build()
        .map_err(|e| FramecastError::capture(format!("browser configuration failed: {e}")))
}

async fn drive_scene(browser: &Browser, opts: &CaptureOpts) -> FramecastResult<CaptureReport> {
    let page = browser.new_page(opts.scene_url.as_str()).await.map_err(|e| {
        FramecastError::capture(format!(
            "failed to open scene page '{}': {e}",
            opts.scene_url
        ))
    })?;
    page.wait_for_navigation().await.map_err(|e| {
        FramecastError::scene_not_ready(format!("scene page navigation failed: {e}"))
    })?;

    let scene = SceneSession::new(page);
    scene.await_ready(opts.ready_timeout, opts.ready_poll).await?;

    let meta = scene.meta().await?;
    tracing::info!(
        width = meta.width,
        height = meta.height,
        fps = meta.fps,
        total_frames = meta.total_frames,
        duration_secs = meta.duration_secs(),
        "scene ready"
    );

    scene.set_viewport(meta.width, meta.height).await?;

    scene.start_media().await?;
    tokio::time::sleep(opts.media_settle).await;

    let mut frames_captured = 0u64;
    for i in 0..meta.total_frames {
        let idx = FrameIndex(i);
        scene.set_frame(idx).await?;

        let path = opts.frames_dir.join(frame_file_name(idx));
        scene.screenshot_to(&path, meta.width, meta.height).await?;

        if i == 0 {
            verify_frame_dimensions(&path, meta.width, meta.height)?;
        }
        frames_captured += 1;

        if should_log_progress(i, meta.total_frames, opts.progress_every) {
            tracing::info!(frame = i + 1, total = meta.total_frames, "captured");
        }
    }

    scene.pause_media().await?;

    Ok(CaptureReport {
        meta,
        frames_captured,
    })
}

/// Progress cadence: every `every`-th frame plus the final one.
fn should_log_progress(idx: u64, total: u64, every: u64) -> bool {
    if total == 0 {
        return false;
    }
    idx + 1 == total || (every != 0 && idx % every == 0)
}

/// Decode the PNG header of a captured frame and check it against the scene
/// dimensions. Run on frame 0 so a viewport mismatch fails the run
/// immediately instead of after the full sequence.
fn verify_frame_dimensions(path: &Path, width: u32, height: u32) -> FramecastResult<()> {
    let (w, h) = image::image_dimensions(path).map_err(|e| {
        FramecastError::capture(format!(
            "failed to read captured frame '{}': {e}",
            path.display()
        ))
    })?;
    if (w, h) != (width, height) {
        return Err(FramecastError::capture(format!(
            "captured frame size mismatch: got {w}x{h}, expected {width}x{height}"
        )));
    }
    Ok(())
}
