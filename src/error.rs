pub type FramecastResult<T> = Result<T, FramecastError>;

#[derive(thiserror::Error, Debug)]
pub enum FramecastError {
    #[error("process startup error: {msg}")]
    ProcessStartup { msg: String, exit: Option<i32> },

    #[error("scene readiness error: {0}")]
    SceneNotReady(String),

    #[error("capture error: {0}")]
    Capture(String),

    #[error("encode error: {msg}")]
    Encode { msg: String, exit: Option<i32> },

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FramecastError {
    pub fn process_startup(msg: impl Into<String>, exit: Option<i32>) -> Self {
        Self::ProcessStartup {
            msg: msg.into(),
            exit,
        }
    }

    pub fn scene_not_ready(msg: impl Into<String>) -> Self {
        Self::SceneNotReady(msg.into())
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    pub fn encode(msg: impl Into<String>, exit: Option<i32>) -> Self {
        Self::Encode {
            msg: msg.into(),
            exit,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Exit status carried by process-shaped failures, when one was observed.
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            Self::ProcessStartup { exit, .. } | Self::Encode { exit, .. } => *exit,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            FramecastError::process_startup("x", None)
                .to_string()
                .contains("process startup error:")
        );
        assert!(
            FramecastError::scene_not_ready("x")
                .to_string()
                .contains("scene readiness error:")
        );
        assert!(
            FramecastError::capture("x")
                .to_string()
                .contains("capture error:")
        );
        assert!(
            FramecastError::encode("x", None)
                .to_string()
                .contains("encode error:")
        );
        assert!(
            FramecastError::validation("x")
                .to_string()
                .contains("validation error:")
        );
    }

    #[test]
    fn exit_status_is_exposed_for_process_failures() {
        assert_eq!(
            FramecastError::process_startup("died", Some(3)).exit_status(),
            Some(3)
        );
        assert_eq!(
            FramecastError::encode("ffmpeg failed", Some(1)).exit_status(),
            Some(1)
        );
        assert_eq!(FramecastError::capture("boom").exit_status(), None);
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = FramecastError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
