//! # Capture Provider
//!
//! Contract for the opaque capability that opens a recorded stereo capture,
//! advances it one frame at a time and hands out decoded per-view images.
//!
//! The playback core never decodes anything itself. It only calls into a
//! [`CaptureProvider`] and reacts to the [`GrabResult`] codes it returns.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::{DepthMode, Resolution};

/// Provider refused to open the capture source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct ProviderError {
    pub code: i32,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes shared by the bundled providers.
pub mod codes {
    pub const INVALID_PATH: i32 = 1;
    pub const UNSUPPORTED_FORMAT: i32 = 2;
    pub const EMPTY_SOURCE: i32 = 3;
    pub const DECODE_FAILED: i32 = 4;
    pub const NOT_OPEN: i32 = 5;
}

/// Outcome of advancing the capture by one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabResult {
    Success,
    EndOfStream,
    Failure(i32),
}

/// Logical view of a stereo capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewId {
    Left,
    Right,
}

impl ViewId {
    pub const ALL: [ViewId; 2] = [ViewId::Left, ViewId::Right];

    pub fn name(&self) -> &'static str {
        match self {
            ViewId::Left => "left",
            ViewId::Right => "right",
        }
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded image for one view.
///
/// Pixel data is tightly packed RGBA8. The payload is reference counted, so
/// cloning a buffer to hand it to a display sink never copies pixels and the
/// sink may keep reading a previous buffer after the publisher replaced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewBuffer {
    pub view: ViewId,
    pub width: u32,
    pub height: u32,
    /// Capture frame index this image was decoded from
    pub frame: u64,
    pub data: Bytes,
}

impl ViewBuffer {
    pub const BYTES_PER_PIXEL: usize = 4;

    pub fn new(view: ViewId, width: u32, height: u32, frame: u64, data: impl Into<Bytes>) -> Self {
        Self {
            view,
            width,
            height,
            frame,
            data: data.into(),
        }
    }

    /// Opaque black image, used for freshly created decode targets
    pub fn blank(view: ViewId, width: u32, height: u32) -> Self {
        let mut data = vec![0u8; width as usize * height as usize * Self::BYTES_PER_PIXEL];
        for px in data.chunks_exact_mut(Self::BYTES_PER_PIXEL) {
            px[3] = 0xFF;
        }
        Self::new(view, width, height, 0, data)
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * Self::BYTES_PER_PIXEL
    }

    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.expected_len()
    }
}

/// Parameters handed to [`CaptureProvider::open`]
#[derive(Debug, Clone, PartialEq)]
pub struct OpenParams {
    pub source: PathBuf,
    pub resolution: Resolution,
    pub depth_mode: DepthMode,
    /// When set the provider drops frames to keep up with wall-clock time.
    /// Playback always disables it and lets the pacer decide cadence.
    pub real_time: bool,
}

/// Capability provider trait - implemented by every capture backend
pub trait CaptureProvider: Send {
    /// Open the capture source
    fn open(&mut self, params: &OpenParams) -> Result<(), ProviderError>;

    /// Advance to the next frame
    fn grab(&mut self) -> GrabResult;

    /// Index of the most recently grabbed frame
    fn position(&self) -> u64;

    /// Number of frames in the capture
    fn frame_count(&self) -> u64;

    /// Reposition so the next grab returns `frame`
    fn set_position(&mut self, frame: u64);

    /// Decoded image for a view, if one is available
    fn retrieve_view(&mut self, view: ViewId) -> Option<ViewBuffer>;

    /// Rebuild the decode target for a view
    fn create_view_target(&mut self, view: ViewId) -> Option<ViewBuffer>;

    fn is_open(&self) -> bool;

    fn close(&mut self);

    /// Backend name for logging
    fn name(&self) -> &str;
}
