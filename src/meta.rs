use crate::error::{FramecastError, FramecastResult};

/// Absolute 0-based frame index in scene timeline space.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Scene metadata reported by the page once it signals readiness.
///
/// Field names mirror the page API payload exactly, so this deserializes
/// straight out of `__getMeta()`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneMeta {
    /// Frame rate the scene is authored at.
    pub fps: f64,
    /// Total number of frames in the timeline.
    pub total_frames: u64,
    /// Canvas width in CSS pixels.
    pub width: u32,
    /// Canvas height in CSS pixels.
    pub height: u32,
}

impl SceneMeta {
    /// Reject metadata the capture and encode stages cannot work with.
    pub fn validate(&self) -> FramecastResult<()> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(FramecastError::validation(
                "scene meta fps must be a positive finite number",
            ));
        }
        if self.total_frames == 0 {
            return Err(FramecastError::validation(
                "scene meta totalFrames must be >= 1",
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err(FramecastError::validation(
                "scene meta width/height must be non-zero",
            ));
        }
        Ok(())
    }

    /// Timeline duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.total_frames as f64 / self.fps
    }
}

/// Minimum digit count in frame filenames.
pub const FRAME_INDEX_PAD: usize = 5;

/// printf-style pattern ffmpeg uses to read the sequence written by
/// [`frame_file_name`].
pub const FRAME_FILE_PATTERN: &str = "%05d.png";

/// Zero-padded PNG filename for a frame index (`00000.png`, `00001.png`, ...).
///
/// Padding keeps lexicographic and numeric order identical for sequences up
/// to 100000 frames; larger indices simply grow wider.
pub fn frame_file_name(idx: FrameIndex) -> String {
    format!("{:0width$}.png", idx.0, width = FRAME_INDEX_PAD)
}

/// Parse a canonical frame filename back to its index.
///
/// Returns `None` for anything [`frame_file_name`] would not produce,
/// including non-canonical padding of an otherwise valid index.
pub fn parse_frame_file_name(name: &str) -> Option<FrameIndex> {
    let stem = name.strip_suffix(".png")?;
    if stem.len() < FRAME_INDEX_PAD || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let idx = FrameIndex(stem.parse().ok()?);
    if frame_file_name(idx) != name {
        return None;
    }
    Some(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> SceneMeta {
        SceneMeta {
            fps: 30.0,
            total_frames: 90,
            width: 1280,
            height: 720,
        }
    }

    #[test]
    fn meta_deserializes_page_payload() {
        let json = r#"{"fps":30,"totalFrames":90,"width":1280,"height":720}"#;
        let parsed: SceneMeta = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, meta());
    }

    #[test]
    fn meta_validation_catches_bad_values() {
        assert!(meta().validate().is_ok());
        assert!(SceneMeta { fps: 0.0, ..meta() }.validate().is_err());
        assert!(
            SceneMeta {
                fps: f64::NAN,
                ..meta()
            }
            .validate()
            .is_err()
        );
        assert!(
            SceneMeta {
                total_frames: 0,
                ..meta()
            }
            .validate()
            .is_err()
        );
        assert!(
            SceneMeta {
                width: 0,
                ..meta()
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn duration_follows_fps_and_frame_count() {
        assert_eq!(meta().duration_secs(), 3.0);
    }

    #[test]
    fn frame_file_names_are_padded_and_ordered() {
        assert_eq!(frame_file_name(FrameIndex(0)), "00000.png");
        assert_eq!(frame_file_name(FrameIndex(42)), "00042.png");
        assert_eq!(frame_file_name(FrameIndex(99999)), "99999.png");
        assert_eq!(frame_file_name(FrameIndex(123456)), "123456.png");

        let mut names: Vec<String> = (0..300)
            .map(|i| frame_file_name(FrameIndex(i)))
            .collect();
        let numeric = names.clone();
        names.sort();
        assert_eq!(names, numeric);
    }

    #[test]
    fn frame_file_names_round_trip() {
        for i in [0u64, 1, 9, 10, 99999, 100000, 123456] {
            let name = frame_file_name(FrameIndex(i));
            assert_eq!(parse_frame_file_name(&name), Some(FrameIndex(i)));
        }
    }

    #[test]
    fn parse_rejects_foreign_names() {
        assert_eq!(parse_frame_file_name("frame.png"), None);
        assert_eq!(parse_frame_file_name("0000.png"), None);
        assert_eq!(parse_frame_file_name("00001.jpg"), None);
        assert_eq!(parse_frame_file_name("00001.png.tmp"), None);
        // Numerically valid but not what frame_file_name produces.
        assert_eq!(parse_frame_file_name("000001.png"), None);
    }
}
