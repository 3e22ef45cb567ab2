//! Generated stereo test pattern
//!
//! A gradient with a vertical bar that sweeps across the frame, shifted a
//! few pixels between the eyes. Handy for exercising playback without a
//! recording on disk.

use crate::provider::{codes, CaptureProvider, GrabResult, OpenParams, ProviderError, ViewBuffer, ViewId};

/// Horizontal bar offset between left and right eye, in pixels
const DISPARITY: u32 = 6;
const BAR_WIDTH: u32 = 8;

#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    frames: u64,
    width: u32,
    height: u32,
    /// Every Nth grab fails, 0 never
    fail_every: u64,
    grabs: u64,
    cursor: u64,
    position: u64,
    open: bool,
}

impl SyntheticProvider {
    pub fn new(frames: u64, width: u32, height: u32) -> Self {
        Self {
            frames,
            width: width.max(1),
            height: height.max(1),
            fail_every: 0,
            grabs: 0,
            cursor: 0,
            position: 0,
            open: false,
        }
    }

    /// Make every `n`th grab report a decode failure
    pub fn with_failure_every(mut self, n: u64) -> Self {
        self.fail_every = n;
        self
    }

    fn render(&self, view: ViewId, frame: u64) -> ViewBuffer {
        let (w, h) = (self.width, self.height);
        let shift = match view {
            ViewId::Left => 0,
            ViewId::Right => DISPARITY,
        };
        let bar_x = (frame as u32).wrapping_mul(4).wrapping_add(shift) % w;
        let blue = (frame % 256) as u8;

        let mut data = Vec::with_capacity(w as usize * h as usize * ViewBuffer::BYTES_PER_PIXEL);
        for y in 0..h {
            for x in 0..w {
                let on_bar = x >= bar_x && x < bar_x + BAR_WIDTH;
                if on_bar {
                    data.extend_from_slice(&[255, 255, 255, 255]);
                } else {
                    let r = (x * 255 / w) as u8;
                    let g = (y * 255 / h) as u8;
                    data.extend_from_slice(&[r, g, blue, 255]);
                }
            }
        }
        ViewBuffer::new(view, w, h, frame, data)
    }
}

impl CaptureProvider for SyntheticProvider {
    fn open(&mut self, params: &OpenParams) -> Result<(), ProviderError> {
        if self.frames == 0 {
            return Err(ProviderError::new(codes::EMPTY_SOURCE, "synthetic capture has no frames"));
        }
        if let Some((w, h)) = params.resolution.dimensions() {
            self.width = w;
            self.height = h;
        }
        tracing::debug!(
            "Synthetic capture: {} frames at {}x{} (source {} ignored)",
            self.frames,
            self.width,
            self.height,
            params.source.display()
        );
        self.cursor = 0;
        self.position = 0;
        self.grabs = 0;
        self.open = true;
        Ok(())
    }

    fn grab(&mut self) -> GrabResult {
        if !self.open {
            return GrabResult::Failure(codes::NOT_OPEN);
        }
        self.grabs += 1;
        if self.fail_every > 0 && self.grabs % self.fail_every == 0 {
            return GrabResult::Failure(codes::DECODE_FAILED);
        }
        if self.cursor >= self.frames {
            return GrabResult::EndOfStream;
        }
        self.position = self.cursor;
        self.cursor += 1;
        GrabResult::Success
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn frame_count(&self) -> u64 {
        self.frames
    }

    fn set_position(&mut self, frame: u64) {
        self.cursor = frame.min(self.frames);
        self.position = self.cursor;
    }

    fn retrieve_view(&mut self, view: ViewId) -> Option<ViewBuffer> {
        self.open.then(|| self.render(view, self.position))
    }

    fn create_view_target(&mut self, view: ViewId) -> Option<ViewBuffer> {
        self.open.then(|| ViewBuffer::blank(view, self.width, self.height))
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
