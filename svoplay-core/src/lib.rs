//! # SVOPlay Core
//!
//! Paced playback of recorded stereo captures: a fixed-rate frame pacer,
//! the open → play → loop/stop state machine, and the per-view publish
//! pipeline that feeds display sinks.

// ============================================================================
// Capture Providers
// ============================================================================
pub mod provider;
pub mod providers;

// ============================================================================
// Configuration
// ============================================================================
pub mod config;
pub mod color;

// ============================================================================
// Playback
// ============================================================================
pub mod pacer;
pub mod publisher;
pub mod session;
pub mod sink;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{PlaybackConfig, ViewBinding};
pub use provider::{CaptureProvider, GrabResult, ViewBuffer, ViewId};
pub use session::{PlaybackSession, PlaybackState, SessionError, TickOutcome};
pub use sink::{DisplaySink, SharedSurface, SinkSet};

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
