//! Side-by-side image sequence provider
//!
//! Plays a directory of stereo frames where each file holds the left eye in
//! its left half and the right eye in its right half, the layout written
//! when a capture is exported frame by frame. Files are played in name
//! order; PNG, JPEG and BMP are accepted.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::provider::{codes, CaptureProvider, GrabResult, OpenParams, ProviderError, ViewBuffer, ViewId};

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

#[derive(Debug, Default)]
pub struct ImageSequenceProvider {
    frames: Vec<PathBuf>,
    /// Next frame to grab
    cursor: u64,
    position: u64,
    open: bool,
    /// Per-eye output size, `None` keeps the recorded size
    target: Option<(u32, u32)>,
    current: Option<RgbaImage>,
    views: BTreeMap<ViewId, ViewBuffer>,
}

impl ImageSequenceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, ProviderError> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            ProviderError::new(
                codes::INVALID_PATH,
                format!("Cannot read {}: {}", dir.display(), e),
            )
        })?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_frame_file(path))
            .collect();
        frames.sort();
        Ok(frames)
    }

    /// Cut one eye out of the side-by-side frame
    fn split(&self, view: ViewId) -> Option<ViewBuffer> {
        let frame = self.current.as_ref()?;
        let eye_width = frame.width() / 2;
        if eye_width == 0 || frame.height() == 0 {
            return None;
        }

        let x = match view {
            ViewId::Left => 0,
            ViewId::Right => eye_width,
        };
        let mut eye = imageops::crop_imm(frame, x, 0, eye_width, frame.height()).to_image();
        if let Some((w, h)) = self.target {
            if eye.dimensions() != (w, h) {
                eye = imageops::resize(&eye, w, h, FilterType::Triangle);
            }
        }

        let (width, height) = eye.dimensions();
        Some(ViewBuffer::new(view, width, height, self.position, eye.into_raw()))
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| FRAME_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

impl CaptureProvider for ImageSequenceProvider {
    fn open(&mut self, params: &OpenParams) -> Result<(), ProviderError> {
        if self.open {
            self.close();
        }

        let source = &params.source;
        if !source.exists() {
            return Err(ProviderError::new(
                codes::INVALID_PATH,
                format!("{} does not exist", source.display()),
            ));
        }
        if !source.is_dir() {
            return Err(ProviderError::new(
                codes::UNSUPPORTED_FORMAT,
                format!(
                    "{} is not a frame directory; export the capture to side-by-side images first",
                    source.display()
                ),
            ));
        }

        let frames = Self::list_frames(source)?;
        if frames.is_empty() {
            return Err(ProviderError::new(
                codes::EMPTY_SOURCE,
                format!("No frames found in {}", source.display()),
            ));
        }

        tracing::debug!(
            "Image sequence opened: {} frames, resolution {:?}, depth mode {:?} ignored",
            frames.len(),
            params.resolution,
            params.depth_mode
        );
        self.frames = frames;
        self.target = params.resolution.dimensions();
        self.cursor = 0;
        self.position = 0;
        self.open = true;
        Ok(())
    }

    fn grab(&mut self) -> GrabResult {
        if !self.open {
            return GrabResult::Failure(codes::NOT_OPEN);
        }
        let Some(path) = self.frames.get(self.cursor as usize) else {
            return GrabResult::EndOfStream;
        };

        let index = self.cursor;
        // A broken file is skipped rather than retried forever
        self.cursor += 1;
        match image::open(path) {
            Ok(img) => {
                self.current = Some(img.to_rgba8());
                self.position = index;
                self.views.clear();
                GrabResult::Success
            }
            Err(e) => {
                tracing::warn!("Failed to decode {}: {}", path.display(), e);
                GrabResult::Failure(codes::DECODE_FAILED)
            }
        }
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn frame_count(&self) -> u64 {
        self.frames.len() as u64
    }

    fn set_position(&mut self, frame: u64) {
        self.cursor = frame.min(self.frame_count());
        self.position = self.cursor;
    }

    fn retrieve_view(&mut self, view: ViewId) -> Option<ViewBuffer> {
        if let Some(buffer) = self.views.get(&view) {
            return Some(buffer.clone());
        }
        let buffer = self.split(view)?;
        self.views.insert(view, buffer.clone());
        Some(buffer)
    }

    fn create_view_target(&mut self, view: ViewId) -> Option<ViewBuffer> {
        let buffer = match self.split(view) {
            Some(buffer) => buffer,
            None => {
                let (w, h) = self.target?;
                ViewBuffer::blank(view, w, h)
            }
        };
        self.views.insert(view, buffer.clone());
        Some(buffer)
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.frames.clear();
        self.current = None;
        self.views.clear();
        self.cursor = 0;
        self.position = 0;
        self.open = false;
    }

    fn name(&self) -> &str {
        "image-sequence"
    }
}
