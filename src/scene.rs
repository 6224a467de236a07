use std::path::Path;
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport};
use chromiumoxide::page::ScreenshotParams;

use crate::error::{FramecastError, FramecastResult};
use crate::meta::{FrameIndex, SceneMeta};

/// The readiness contract a scene page must expose before capture starts.
const READY_EXPR: &str = "window.__appReady === true \
    && typeof window.__getMeta === \"function\" \
    && typeof window.__startMedia === \"function\"";

/// Seek expression for one frame. `__setFrame` may return a plain value or a
/// promise; wrapping in `Promise.resolve` makes both settle before the
/// evaluation completes.
fn seek_expression(idx: FrameIndex) -> String {
    format!("Promise.resolve(window.__setFrame({}))", idx.0)
}

/// Driver for a scene page exposing the readiness/meta/media/seek API.
pub struct SceneSession {
    page: Page,
}

impl SceneSession {
    /// Wrap an attached page. Call [`SceneSession::await_ready`] before any
    /// other operation.
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// Poll until the page flags readiness and exposes its API, or fail once
    /// `timeout` elapses.
    ///
    /// Probe errors inside the window are treated as "not ready yet"; pages
    /// re-create their script context during late navigation and a transient
    /// evaluation failure does not mean the scene is broken.
    pub async fn await_ready(&self, timeout: Duration, poll: Duration) -> FramecastResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.page.evaluate(READY_EXPR).await {
                Ok(result) => {
                    if result.into_value::<bool>().unwrap_or(false) {
                        return Ok(());
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "scene readiness probe failed; retrying");
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FramecastError::scene_not_ready(format!(
                    "scene did not become ready within {:.0?} \
                     (__appReady/__getMeta/__startMedia missing)",
                    timeout
                )));
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Fetch and validate the scene metadata.
    pub async fn meta(&self) -> FramecastResult<SceneMeta> {
        let meta: SceneMeta = self
            .page
            .evaluate("window.__getMeta()")
            .await
            .map_err(|e| FramecastError::scene_not_ready(format!("__getMeta() failed: {e}")))?
            .into_value()
            .map_err(|e| {
                FramecastError::scene_not_ready(format!(
                    "__getMeta() returned an unexpected shape: {e}"
                ))
            })?;
        meta.validate()?;
        Ok(meta)
    }

    /// Match the emulated viewport to the scene's pixel dimensions exactly,
    /// at device scale factor 1.
    pub async fn set_viewport(&self, width: u32, height: u32) -> FramecastResult<()> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(width))
            .height(i64::from(height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(FramecastError::capture)?;
        self.page.execute(params).await.map_err(|e| {
            FramecastError::capture(format!("failed to apply device metrics override: {e}"))
        })?;
        Ok(())
    }

    /// Start media playback for elements participating in the scene.
    pub async fn start_media(&self) -> FramecastResult<()> {
        self.page
            .evaluate("window.__startMedia()")
            .await
            .map_err(|e| FramecastError::capture(format!("__startMedia() failed: {e}")))?;
        Ok(())
    }

    /// Pause media playback once the last frame is on disk.
    pub async fn pause_media(&self) -> FramecastResult<()> {
        self.page
            .evaluate("window.__pauseMedia && window.__pauseMedia()")
            .await
            .map_err(|e| FramecastError::capture(format!("__pauseMedia() failed: {e}")))?;
        Ok(())
    }

    /// Seek the scene to `idx` and wait until the page reports the seek done.
    pub async fn set_frame(&self, idx: FrameIndex) -> FramecastResult<()> {
        self.page
            .evaluate(seek_expression(idx))
            .await
            .map_err(|e| FramecastError::capture(format!("__setFrame({}) failed: {e}", idx.0)))?;
        Ok(())
    }

    /// Capture the current viewport as a PNG at `path`.
    ///
    /// The clip is pinned to the scene dimensions so window chrome or
    /// viewport drift can never change the output size mid-sequence.
    pub async fn screenshot_to(
        &self,
        path: &Path,
        width: u32,
        height: u32,
    ) -> FramecastResult<()> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .clip(Viewport {
                x: 0.0,
                y: 0.0,
                width: f64::from(width),
                height: f64::from(height),
                scale: 1.0,
            })
            .build();
        self.page.save_screenshot(params, path).await.map_err(|e| {
            FramecastError::capture(format!(
                "failed to capture frame to '{}': {e}",
                path.display()
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_expression_covers_flag_and_startup_hooks_only() {
        assert!(READY_EXPR.contains("window.__appReady === true"));
        assert!(READY_EXPR.contains("__getMeta"));
        assert!(READY_EXPR.contains("__startMedia"));
        // Seek and pause are resolved at call time, not during the poll.
        assert!(!READY_EXPR.contains("__setFrame"));
        assert!(!READY_EXPR.contains("__pauseMedia"));
    }

    #[test]
    fn seek_expression_awaits_plain_and_promise_returns() {
        assert_eq!(
            seek_expression(FrameIndex(57)),
            "Promise.resolve(window.__setFrame(57))"
        );
    }
}
