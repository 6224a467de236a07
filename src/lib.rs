#![forbid(unsafe_code)]

pub mod capture;
pub mod encode;
pub mod error;
pub mod meta;
pub mod pipeline;
pub mod scene;
pub mod supervise;
pub mod transcribe;

pub use capture::{CaptureOpts, CaptureReport};
pub use encode::EncodeConfig;
pub use error::{FramecastError, FramecastResult};
pub use meta::{FrameIndex, SceneMeta};
pub use pipeline::{RenderConfig, RenderSummary, Stage};
