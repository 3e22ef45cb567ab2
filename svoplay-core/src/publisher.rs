//! # Frame Publisher
//!
//! Pulls the decoded image for every requested view out of the provider and
//! hands it to that view's display sink.
//!
//! ## Per-view recovery
//!
//! ```text
//! retrieve_view ──Some──────────────────────────► correct ─► present
//!       │
//!      None
//!       ▼
//! create_view_target ──Some─────────────────────► correct ─► present
//!       │
//!      None ─► skip this view until the next tick
//! ```
//!
//! Views never affect each other: a failure on one leaves every other
//! view's buffer, sink and retry count alone.

use std::collections::BTreeMap;

use crate::color::ColorCorrection;
use crate::config::ViewBinding;
use crate::provider::{CaptureProvider, ViewBuffer, ViewId};
use crate::sink::SinkSet;

/// What happened to one view during a publish pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewOutcome {
    /// Retrieved and presented
    Presented,
    /// Retrieval failed, the recreated target was presented instead
    Recreated,
    /// Retrieval and recreation both failed; the sink keeps its old content
    Skipped,
    /// No sink bound for this view
    Unbound,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    outcomes: Vec<(ViewId, ViewOutcome)>,
}

impl PublishReport {
    pub fn outcome(&self, view: ViewId) -> Option<ViewOutcome> {
        self.outcomes
            .iter()
            .find(|(v, _)| *v == view)
            .map(|(_, outcome)| *outcome)
    }

    pub fn outcomes(&self) -> &[(ViewId, ViewOutcome)] {
        &self.outcomes
    }

    pub fn count(&self, outcome: ViewOutcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }

    /// Views whose sink received new content this pass
    pub fn presented(&self) -> usize {
        self.count(ViewOutcome::Presented) + self.count(ViewOutcome::Recreated)
    }
}

pub struct FramePublisher {
    sinks: SinkSet,
    corrections: BTreeMap<ViewId, ColorCorrection>,
    /// Most recent buffer retrieved per view, created on first success
    buffers: BTreeMap<ViewId, ViewBuffer>,
}

impl FramePublisher {
    pub fn new(sinks: SinkSet) -> Self {
        Self {
            sinks,
            corrections: BTreeMap::new(),
            buffers: BTreeMap::new(),
        }
    }

    /// Publisher whose corrections come from the configured bindings
    pub fn with_bindings(sinks: SinkSet, bindings: &[ViewBinding]) -> Self {
        let mut publisher = Self::new(sinks);
        for binding in bindings {
            publisher.set_correction(binding.view, binding.color_correction);
        }
        publisher
    }

    pub fn set_correction(&mut self, view: ViewId, correction: ColorCorrection) {
        if correction.is_identity() {
            self.corrections.remove(&view);
        } else {
            self.corrections.insert(view, correction);
        }
    }

    pub fn correction(&self, view: ViewId) -> ColorCorrection {
        self.corrections.get(&view).copied().unwrap_or_default()
    }

    pub fn buffer(&self, view: ViewId) -> Option<&ViewBuffer> {
        self.buffers.get(&view)
    }

    /// Push the current frame of every requested view to its sink
    pub fn publish(
        &mut self,
        provider: &mut dyn CaptureProvider,
        views: &[ViewId],
    ) -> PublishReport {
        let mut report = PublishReport::default();
        for &view in views {
            let outcome = self.publish_view(provider, view);
            report.outcomes.push((view, outcome));
        }
        report
    }

    fn publish_view(&mut self, provider: &mut dyn CaptureProvider, view: ViewId) -> ViewOutcome {
        let Some(sink) = self.sinks.get_mut(view) else {
            return ViewOutcome::Unbound;
        };

        let (buffer, outcome) = match provider.retrieve_view(view) {
            Some(buffer) => (buffer, ViewOutcome::Presented),
            None => {
                tracing::warn!("Failed to retrieve {} view, recreating decode target", view);
                match provider.create_view_target(view) {
                    Some(buffer) => {
                        tracing::info!(
                            "{} view target recreated: {}x{}",
                            view,
                            buffer.width,
                            buffer.height
                        );
                        (buffer, ViewOutcome::Recreated)
                    }
                    None => {
                        tracing::warn!("Recreating {} view target failed, skipping", view);
                        return ViewOutcome::Skipped;
                    }
                }
            }
        };

        let corrected = self
            .corrections
            .get(&view)
            .map(|c| c.apply(&buffer))
            .unwrap_or_else(|| buffer.clone());
        self.buffers.insert(view, buffer);
        sink.present(corrected);
        outcome
    }
}

impl std::fmt::Debug for FramePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePublisher")
            .field("sinks", &self.sinks)
            .field("corrections", &self.corrections)
            .field("buffers", &self.buffers.keys().collect::<Vec<_>>())
            .finish()
    }
}
