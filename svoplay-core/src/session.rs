//! # Playback Session
//!
//! Binds one capture provider to a set of display sinks and drives it one
//! host tick at a time.
//!
//! ## State Machine
//!
//! ```text
//! new()                      → Idle
//! open() ok                  → Playing
//! open() fails or 0 frames   → Idle (unusable, provider closed)
//! tick(): end of stream, no loop → Stopped
//! stop() / close()           → Stopped
//! ```
//!
//! `Stopped` is terminal; playing the capture again takes a new session.
//!
//! ## Tick
//!
//! Strictly sequential within one call: pace check → grab → publish →
//! loop decision. Nothing blocks, and a stop requested between ticks is
//! seen at the start of the next one.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::{ConfigError, PlaybackConfig};
use crate::pacer::FramePacer;
use crate::provider::{codes, CaptureProvider, GrabResult, ProviderError, ViewId};
use crate::publisher::{FramePublisher, PublishReport, ViewOutcome};
use crate::sink::SinkSet;

/// Frames before the end at which a looping session rewinds
const LOOP_GUARD_FRAMES: u64 = 2;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to open capture {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: ProviderError,
    },
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: PlaybackState,
    },
    #[error("Seek target {frame} is outside 0..{total}")]
    SeekOutOfRange { frame: u64, total: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Not opened yet, or the open failed
    Idle,
    Playing,
    /// Terminal
    Stopped,
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Session is not playing; nothing was called
    Inactive,
    /// Provider reports it is no longer open
    ProviderClosed,
    /// Frame interval has not elapsed yet
    Waiting,
    /// A frame was grabbed and published
    Advanced {
        /// Provider position of the grabbed frame
        position: u64,
        /// Session rewound to frame 0 right after this frame
        looped: bool,
        report: PublishReport,
    },
    /// Provider hit the end of the stream and the session rewound
    Looped,
    /// Provider hit the end of the stream and the session stopped
    Stopped,
    /// Grab failed; nothing published, retried on the next open gate
    GrabFailed(i32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_grabbed: u64,
    pub views_presented: u64,
    pub view_recreations: u64,
    pub view_skips: u64,
    pub grab_failures: u64,
    /// Rewinds taken ahead of the end-of-stream marker
    pub early_loops: u64,
    /// Rewinds taken after the provider reported end of stream
    pub end_of_stream_loops: u64,
}

impl SessionStats {
    fn record(&mut self, report: &PublishReport) {
        self.views_presented += report.presented() as u64;
        self.view_recreations += report.count(ViewOutcome::Recreated) as u64;
        self.view_skips += report.count(ViewOutcome::Skipped) as u64;
    }
}

pub struct PlaybackSession {
    provider: Box<dyn CaptureProvider>,
    config: PlaybackConfig,
    views: Vec<ViewId>,
    speed: f64,
    state: PlaybackState,
    open_attempted: bool,
    /// Provider needs a close call on teardown
    provider_open: bool,
    total_frames: u64,
    current_position: u64,
    pacer: FramePacer,
    publisher: FramePublisher,
    stats: SessionStats,
}

impl PlaybackSession {
    /// Create an idle session. Sinks are optional per view.
    pub fn new(
        provider: Box<dyn CaptureProvider>,
        config: PlaybackConfig,
        sinks: SinkSet,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        if config.playback_speed < crate::config::MIN_PLAYBACK_SPEED {
            tracing::warn!(
                "Playback speed {} clamped to {}",
                config.playback_speed,
                config.effective_speed()
            );
        }

        let views = config.views.iter().map(|b| b.view).collect();
        let publisher = FramePublisher::with_bindings(sinks, &config.views);
        Ok(Self {
            provider,
            speed: config.effective_speed(),
            views,
            config,
            state: PlaybackState::Idle,
            open_attempted: false,
            provider_open: false,
            total_frames: 0,
            current_position: 0,
            pacer: FramePacer::default(),
            publisher,
            stats: SessionStats::default(),
        })
    }

    /// Create and open in one step
    pub fn start(
        provider: Box<dyn CaptureProvider>,
        config: PlaybackConfig,
        sinks: SinkSet,
    ) -> Result<Self, SessionError> {
        let mut session = Self::new(provider, config, sinks)?;
        session.open()?;
        Ok(session)
    }

    /// Open the capture and start playing. Only one attempt per session.
    pub fn open(&mut self) -> Result<(), SessionError> {
        if self.open_attempted {
            return Err(SessionError::InvalidState {
                action: "open",
                state: self.state,
            });
        }
        self.open_attempted = true;

        let params = self.config.open_params();
        if let Err(source) = self.provider.open(&params) {
            tracing::error!(
                "Failed to open {} with {}: {}",
                params.source.display(),
                self.provider.name(),
                source
            );
            self.provider.close();
            return Err(SessionError::Open {
                path: params.source,
                source,
            });
        }
        self.provider_open = true;

        let total_frames = self.provider.frame_count();
        if total_frames == 0 {
            tracing::error!("{} has no frames, closing", params.source.display());
            self.provider.close();
            self.provider_open = false;
            return Err(SessionError::Open {
                path: params.source,
                source: ProviderError::new(codes::EMPTY_SOURCE, "capture has no frames"),
            });
        }
        self.total_frames = total_frames;
        self.current_position = 0;
        tracing::info!(
            "Capture loaded with {} frames via {} ({} views, {}x speed, loop={})",
            self.total_frames,
            self.provider.name(),
            self.views.len(),
            self.speed,
            self.config.loop_enabled
        );

        for &view in &self.views {
            match self.provider.create_view_target(view) {
                Some(target) => {
                    tracing::debug!("{} view target created: {}x{}", view, target.width, target.height)
                }
                None => tracing::warn!("Failed to create {} view target", view),
            }
        }

        self.state = PlaybackState::Playing;
        Ok(())
    }

    /// Advance playback for one host tick. `now` is a monotonic reading in seconds.
    pub fn tick(&mut self, now: f64) -> TickOutcome {
        if self.state != PlaybackState::Playing {
            return TickOutcome::Inactive;
        }
        if !self.provider.is_open() {
            return TickOutcome::ProviderClosed;
        }
        if !self.pacer.should_advance(now, self.speed) {
            return TickOutcome::Waiting;
        }

        match self.provider.grab() {
            GrabResult::Success => {
                self.stats.frames_grabbed += 1;
                let position = self.provider.position();
                self.current_position = position;

                let report = self.publisher.publish(self.provider.as_mut(), &self.views);
                self.stats.record(&report);

                let looped = self.config.loop_enabled
                    && position >= self.total_frames.saturating_sub(LOOP_GUARD_FRAMES);
                if looped {
                    tracing::debug!("Frame {} of {}, rewinding", position, self.total_frames);
                    self.rewind();
                    self.stats.early_loops += 1;
                }

                self.pacer.mark_frame(now);
                TickOutcome::Advanced {
                    position,
                    looped,
                    report,
                }
            }
            GrabResult::EndOfStream => {
                if self.config.loop_enabled {
                    tracing::debug!("End of stream reached, rewinding");
                    self.rewind();
                    self.stats.end_of_stream_loops += 1;
                    TickOutcome::Looped
                } else {
                    tracing::info!("End of stream reached after frame {}, stopping", self.current_position);
                    self.state = PlaybackState::Stopped;
                    TickOutcome::Stopped
                }
            }
            GrabResult::Failure(code) => {
                tracing::warn!("Grab failed with code {}, retrying next frame", code);
                self.stats.grab_failures += 1;
                TickOutcome::GrabFailed(code)
            }
        }
    }

    fn rewind(&mut self) {
        self.provider.set_position(0);
        self.current_position = 0;
    }

    /// Jump to `frame`; the next grab returns it
    pub fn seek(&mut self, frame: u64) -> Result<(), SessionError> {
        if self.state != PlaybackState::Playing {
            return Err(SessionError::InvalidState {
                action: "seek",
                state: self.state,
            });
        }
        if frame >= self.total_frames {
            return Err(SessionError::SeekOutOfRange {
                frame,
                total: self.total_frames,
            });
        }
        self.provider.set_position(frame);
        self.current_position = frame;
        Ok(())
    }

    /// Stop playing; takes effect on the next tick
    pub fn stop(&mut self) {
        if self.state == PlaybackState::Playing {
            tracing::info!("Playback stopped at frame {}", self.current_position);
            self.state = PlaybackState::Stopped;
        }
    }

    /// Release the provider. Safe to call any number of times.
    pub fn close(&mut self) {
        self.stop();
        if self.provider_open {
            self.provider.close();
            self.provider_open = false;
            tracing::info!("{} provider closed", self.provider.name());
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn current_position(&self) -> u64 {
        self.current_position
    }

    pub fn playback_speed(&self) -> f64 {
        self.speed
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn publisher(&self) -> &FramePublisher {
        &self.publisher
    }

    /// Seconds until the pacer would let the next frame through
    pub fn time_until_next(&self, now: f64) -> f64 {
        self.pacer.time_until_next(now, self.speed)
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("provider", &self.provider.name())
            .field("state", &self.state)
            .field("position", &self.current_position)
            .field("total_frames", &self.total_frames)
            .field("speed", &self.speed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewBinding;
    use crate::sink::SharedSurface;
    use crate::test_support::{ScriptedProvider, ViewScript};

    const FRAME: f64 = 1.0 / 30.0;

    fn config(loop_enabled: bool) -> PlaybackConfig {
        PlaybackConfig {
            loop_enabled,
            ..PlaybackConfig::new("scripted.svo")
        }
    }

    fn session(total: u64, loop_enabled: bool) -> (ScriptedProvider, SharedSurface, PlaybackSession) {
        let provider = ScriptedProvider::new(total);
        let surface = SharedSurface::new();
        let sinks = SinkSet::new().with(ViewId::Left, surface.clone());
        let session =
            PlaybackSession::start(Box::new(provider.clone()), config(loop_enabled), sinks).unwrap();
        (provider, surface, session)
    }

    #[test]
    fn test_open_reads_frame_count_and_primes_views() {
        let (provider, _surface, session) = session(100, true);
        assert_eq!(session.state(), PlaybackState::Playing);
        assert_eq!(session.total_frames(), 100);
        assert_eq!(provider.log().recreations(ViewId::Left), 1);
        assert_eq!(provider.log().grabs, 0);
    }

    #[test]
    fn test_gate_closed_skips_grab() {
        let (provider, _surface, mut session) = session(100, true);
        assert_eq!(session.tick(FRAME / 2.0), TickOutcome::Waiting);
        assert_eq!(provider.log().grabs, 0);
    }

    #[test]
    fn test_loops_two_frames_early() {
        let (provider, _surface, mut session) = session(100, true);
        let mut max_position = 0;
        let mut loops = 0;
        for tick in 1..=250u32 {
            match session.tick(tick as f64 * FRAME) {
                TickOutcome::Advanced { position, looped, .. } => {
                    max_position = max_position.max(position);
                    if looped {
                        assert_eq!(position, 98);
                        assert_eq!(session.current_position(), 0);
                        loops += 1;
                    }
                }
                other => panic!("tick {} returned {:?}", tick, other),
            }
            assert!(session.current_position() < session.total_frames());
        }

        assert_eq!(max_position, 98);
        assert_eq!(loops, 2);
        let log = provider.log();
        assert_eq!(log.seeks, vec![0, 0]);
        assert_eq!(&log.positions_after_grab[..3], &[0, 1, 2]);
        assert_eq!(log.positions_after_grab[99], 0);
        assert_eq!(session.stats().end_of_stream_loops, 0);
        assert_eq!(session.stats().early_loops, 2);
    }

    #[test]
    fn test_end_of_stream_without_loop_stops() {
        let (provider, _surface, mut session) = session(10, false);
        for tick in 1..=10u32 {
            assert!(matches!(
                session.tick(tick as f64 * FRAME),
                TickOutcome::Advanced { looped: false, .. }
            ));
        }
        assert_eq!(session.current_position(), 9);

        assert_eq!(session.tick(11.0 * FRAME), TickOutcome::Stopped);
        assert_eq!(session.state(), PlaybackState::Stopped);

        let grabs = provider.log().grabs;
        for tick in 12..20u32 {
            assert_eq!(session.tick(tick as f64 * FRAME), TickOutcome::Inactive);
        }
        assert_eq!(provider.log().grabs, grabs);
        assert!(provider.log().seeks.is_empty());
    }

    #[test]
    fn test_end_of_stream_with_loop_rewinds() {
        let (provider, _surface, mut session) = session(50, true);
        provider.push_grab(GrabResult::EndOfStream);

        assert_eq!(session.tick(FRAME), TickOutcome::Looped);
        assert_eq!(session.state(), PlaybackState::Playing);
        assert_eq!(provider.log().seeks, vec![0]);
        assert_eq!(session.stats().end_of_stream_loops, 1);

        // Clock untouched, so the same reading grabs again
        assert!(matches!(
            session.tick(FRAME),
            TickOutcome::Advanced { position: 0, .. }
        ));
    }

    #[test]
    fn test_grab_failure_is_retried_without_publishing() {
        let (provider, surface, mut session) = session(50, true);
        provider.push_grab(GrabResult::Failure(-3));

        assert_eq!(session.tick(FRAME), TickOutcome::GrabFailed(-3));
        assert_eq!(session.state(), PlaybackState::Playing);
        assert_eq!(surface.generation(), 0);
        assert_eq!(provider.log().retrievals(ViewId::Left), 0);

        assert!(matches!(session.tick(FRAME), TickOutcome::Advanced { .. }));
        assert_eq!(surface.generation(), 1);
        assert_eq!(session.stats().grab_failures, 1);
    }

    #[test]
    fn test_recreated_view_shown_same_tick() {
        let (provider, surface, mut session) = session(50, true);
        provider.script_view(ViewId::Left, ViewScript::FailRetrieveOnce);

        let TickOutcome::Advanced { report, .. } = session.tick(FRAME) else {
            panic!("expected a frame");
        };
        assert_eq!(report.outcome(ViewId::Left), Some(ViewOutcome::Recreated));
        assert_eq!(surface.generation(), 1);

        let TickOutcome::Advanced { report, .. } = session.tick(2.0 * FRAME) else {
            panic!("expected a frame");
        };
        assert_eq!(report.outcome(ViewId::Left), Some(ViewOutcome::Presented));
        assert_eq!(surface.generation(), 2);
        assert_eq!(session.stats().view_recreations, 1);
    }

    #[test]
    fn test_open_failure_stays_idle() {
        let provider = ScriptedProvider::failing_open();
        let mut session =
            PlaybackSession::new(Box::new(provider.clone()), config(true), SinkSet::new()).unwrap();

        let err = session.open().unwrap_err();
        assert!(matches!(err, SessionError::Open { .. }));
        assert_eq!(session.state(), PlaybackState::Idle);
        assert_eq!(provider.log().closes, 1);

        assert!(matches!(
            session.open(),
            Err(SessionError::InvalidState { action: "open", .. })
        ));
        assert_eq!(provider.log().opens, 1);

        let calls = provider.log().calls;
        assert_eq!(session.tick(1.0), TickOutcome::Inactive);
        session.close();
        session.close();
        assert_eq!(provider.log().calls, calls);
    }

    #[test]
    fn test_empty_capture_fails_open() {
        let provider = ScriptedProvider::new(0);
        let mut session =
            PlaybackSession::new(Box::new(provider.clone()), config(true), SinkSet::new()).unwrap();

        let Err(SessionError::Open { source, .. }) = session.open() else {
            panic!("empty capture opened");
        };
        assert_eq!(source.code, codes::EMPTY_SOURCE);
        assert_eq!(session.state(), PlaybackState::Idle);
        assert_eq!(provider.log().closes, 1);

        let calls = provider.log().calls;
        assert_eq!(session.tick(FRAME), TickOutcome::Inactive);
        drop(session);
        assert_eq!(provider.log().calls, calls);
        assert_eq!(provider.log().grabs, 0);
    }

    #[test]
    fn test_empty_synthetic_capture_rejected() {
        let result = PlaybackSession::start(
            Box::new(crate::providers::SyntheticProvider::new(0, 8, 8)),
            config(true),
            SinkSet::new(),
        );
        assert!(matches!(result, Err(SessionError::Open { .. })));
    }

    #[test]
    fn test_time_until_next_follows_last_frame() {
        let (_provider, _surface, mut session) = session(10, true);
        assert!((session.time_until_next(0.0) - FRAME).abs() < 1e-12);
        assert!(matches!(session.tick(FRAME), TickOutcome::Advanced { .. }));
        assert!((session.time_until_next(1.5 * FRAME) - FRAME / 2.0).abs() < 1e-12);
        assert_eq!(session.time_until_next(5.0), 0.0);
    }

    #[test]
    fn test_publisher_holds_last_retrieved_frame() {
        let (_provider, surface, mut session) = session(10, true);
        assert!(session.publisher().buffer(ViewId::Left).is_none());
        session.tick(FRAME);
        session.tick(2.0 * FRAME);
        let held = session.publisher().buffer(ViewId::Left).unwrap();
        assert_eq!(held.frame, 1);
        assert_eq!(surface.latest().unwrap().frame, 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (provider, _surface, mut session) = session(10, true);
        session.close();
        let calls = provider.log().calls;
        session.close();
        drop(session);
        assert_eq!(provider.log().closes, 1);
        assert_eq!(provider.log().calls, calls);
    }

    #[test]
    fn test_never_opened_close_makes_no_calls() {
        let provider = ScriptedProvider::new(10);
        let mut session =
            PlaybackSession::new(Box::new(provider.clone()), config(true), SinkSet::new()).unwrap();
        session.close();
        session.close();
        drop(session);
        assert_eq!(provider.log().calls, 0);
    }

    #[test]
    fn test_drop_closes_provider() {
        let (provider, _surface, session) = session(10, true);
        drop(session);
        assert_eq!(provider.log().closes, 1);
    }

    #[test]
    fn test_stop_takes_effect_next_tick() {
        let (provider, _surface, mut session) = session(10, true);
        assert!(matches!(session.tick(FRAME), TickOutcome::Advanced { .. }));
        session.stop();
        assert_eq!(session.tick(2.0 * FRAME), TickOutcome::Inactive);
        assert_eq!(provider.log().grabs, 1);
        assert!(matches!(
            session.seek(0),
            Err(SessionError::InvalidState { action: "seek", .. })
        ));
    }

    #[test]
    fn test_seek() {
        let (provider, _surface, mut session) = session(10, true);
        session.seek(5).unwrap();
        assert_eq!(session.current_position(), 5);
        assert!(matches!(
            session.tick(FRAME),
            TickOutcome::Advanced { position: 5, .. }
        ));
        assert!(matches!(
            session.seek(10),
            Err(SessionError::SeekOutOfRange { frame: 10, total: 10 })
        ));
        assert_eq!(provider.log().seeks, vec![5]);
    }

    #[test]
    fn test_provider_closed_underneath() {
        let (provider, _surface, mut session) = session(10, true);
        provider.force_closed();
        assert_eq!(session.tick(FRAME), TickOutcome::ProviderClosed);
        assert_eq!(provider.log().grabs, 0);
        assert!(session.is_playing());
    }

    #[test]
    fn test_speed_scales_cadence() {
        let provider = ScriptedProvider::new(1000);
        let mut cfg = config(true);
        cfg.playback_speed = 2.0;
        let mut session =
            PlaybackSession::start(Box::new(provider.clone()), cfg, SinkSet::new()).unwrap();

        // 120 Hz host for one second at 60 fps effective
        let advanced = (1..=120u32)
            .filter(|tick| {
                matches!(
                    session.tick(*tick as f64 / 120.0),
                    TickOutcome::Advanced { .. }
                )
            })
            .count();
        assert_eq!(advanced, 60);
    }

    #[test]
    fn test_unbound_right_view_skipped() {
        let provider = ScriptedProvider::new(10);
        let surface = SharedSurface::new();
        let mut cfg = config(true);
        cfg.views = vec![ViewBinding::new(ViewId::Left), ViewBinding::new(ViewId::Right)];
        let sinks = SinkSet::new().with(ViewId::Left, surface.clone());
        let mut session = PlaybackSession::start(Box::new(provider.clone()), cfg, sinks).unwrap();

        let TickOutcome::Advanced { report, .. } = session.tick(FRAME) else {
            panic!("expected a frame");
        };
        assert_eq!(report.outcome(ViewId::Right), Some(ViewOutcome::Unbound));
        assert_eq!(surface.generation(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = PlaybackSession::new(
            Box::new(ScriptedProvider::new(1)),
            PlaybackConfig::default(),
            SinkSet::new(),
        );
        assert!(matches!(result, Err(SessionError::Config(ConfigError::MissingSource))));
    }
}
