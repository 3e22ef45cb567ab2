//! # Display Sinks
//!
//! Surfaces that accept a decoded view for presentation: a texture slot
//! read by a UI thread, a PNG snapshot writer, or anything else that
//! implements [`DisplaySink`]. Binding a sink is optional per view, so a
//! single-eye setup simply leaves the other view unbound.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::provider::{ViewBuffer, ViewId};

/// Sink trait - anything that can show a decoded view
pub trait DisplaySink: Send {
    /// Replace the presented content with `buffer`
    fn present(&mut self, buffer: ViewBuffer);
}

// ============================================================================
// Shared Surface
// ============================================================================

#[derive(Debug, Default)]
struct SurfaceSlot {
    latest: Option<ViewBuffer>,
    generation: u64,
}

/// Latest-frame slot shared between the playback tick and a renderer.
///
/// The generation counter lets the renderer skip re-uploading a texture
/// when nothing new was presented since it last looked.
#[derive(Debug, Clone, Default)]
pub struct SharedSurface {
    slot: Arc<Mutex<SurfaceSlot>>,
}

impl SharedSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<ViewBuffer> {
        self.slot.lock().latest.clone()
    }

    /// Number of buffers presented so far
    pub fn generation(&self) -> u64 {
        self.slot.lock().generation
    }

    /// Latest buffer if it is newer than `seen`, with its generation
    pub fn newer_than(&self, seen: u64) -> Option<(u64, ViewBuffer)> {
        let slot = self.slot.lock();
        if slot.generation > seen {
            slot.latest.clone().map(|buf| (slot.generation, buf))
        } else {
            None
        }
    }
}

impl DisplaySink for SharedSurface {
    fn present(&mut self, buffer: ViewBuffer) {
        let mut slot = self.slot.lock();
        slot.latest = Some(buffer);
        slot.generation += 1;
    }
}

// ============================================================================
// Snapshot Sink
// ============================================================================

/// Writes every Nth presented buffer to `<dir>/<view>_<frame>.png`
pub struct SnapshotSink {
    dir: PathBuf,
    every: u64,
    presented: u64,
    written: u64,
}

impl SnapshotSink {
    pub fn new(dir: impl Into<PathBuf>, every: u64) -> Self {
        Self {
            dir: dir.into(),
            every: every.max(1),
            presented: 0,
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn path_for(&self, buffer: &ViewBuffer) -> PathBuf {
        self.dir
            .join(format!("{}_{:06}.png", buffer.view, buffer.frame))
    }

    fn write(&self, buffer: &ViewBuffer, path: &Path) -> Result<(), String> {
        let image = image::RgbaImage::from_raw(buffer.width, buffer.height, buffer.data.to_vec())
            .ok_or_else(|| {
                format!(
                    "buffer is {} bytes, expected {}",
                    buffer.data.len(),
                    buffer.expected_len()
                )
            })?;
        image
            .save(path)
            .map_err(|e| format!("Failed to save {}: {}", path.display(), e))
    }
}

impl DisplaySink for SnapshotSink {
    fn present(&mut self, buffer: ViewBuffer) {
        let index = self.presented;
        self.presented += 1;
        if index % self.every != 0 {
            return;
        }

        let path = self.path_for(&buffer);
        match self.write(&buffer, &path) {
            Ok(()) => {
                self.written += 1;
                tracing::debug!("Snapshot written: {}", path.display());
            }
            Err(e) => tracing::warn!("Snapshot for {} view dropped: {}", buffer.view, e),
        }
    }
}

// ============================================================================
// Sink Bindings
// ============================================================================

/// Zero or one sink per logical view
#[derive(Default)]
pub struct SinkSet {
    sinks: BTreeMap<ViewId, Box<dyn DisplaySink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a sink, replacing any previous binding for the view
    pub fn bind(&mut self, view: ViewId, sink: Box<dyn DisplaySink>) {
        self.sinks.insert(view, sink);
    }

    pub fn with(mut self, view: ViewId, sink: impl DisplaySink + 'static) -> Self {
        self.bind(view, Box::new(sink));
        self
    }

    pub fn unbind(&mut self, view: ViewId) -> Option<Box<dyn DisplaySink>> {
        self.sinks.remove(&view)
    }

    pub fn is_bound(&self, view: ViewId) -> bool {
        self.sinks.contains_key(&view)
    }

    pub fn get_mut(&mut self, view: ViewId) -> Option<&mut (dyn DisplaySink + 'static)> {
        self.sinks.get_mut(&view).map(|sink| sink.as_mut())
    }

    pub fn views(&self) -> impl Iterator<Item = ViewId> + '_ {
        self.sinks.keys().copied()
    }
}

impl std::fmt::Debug for SinkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkSet")
            .field("views", &self.sinks.keys().collect::<Vec<_>>())
            .finish()
    }
}
