//! Scripted in-memory provider for unit tests.
//!
//! State lives behind `Arc<Mutex<_>>` so a test can keep a clone after the
//! provider has been boxed into a session, then script failures and read
//! back the call log.

use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::provider::{codes, CaptureProvider, GrabResult, OpenParams, ProviderError, ViewBuffer, ViewId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ViewScript {
    #[default]
    Normal,
    FailRetrieveOnce,
    /// Retrieval and recreation both fail
    AlwaysFail,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog {
    pub calls: u64,
    pub opens: u64,
    pub grabs: u64,
    pub closes: u64,
    pub seeks: Vec<u64>,
    pub positions_after_grab: Vec<u64>,
    retrievals: BTreeMap<ViewId, u64>,
    recreations: BTreeMap<ViewId, u64>,
}

impl CallLog {
    pub fn retrievals(&self, view: ViewId) -> u64 {
        self.retrievals.get(&view).copied().unwrap_or(0)
    }

    pub fn recreations(&self, view: ViewId) -> u64 {
        self.recreations.get(&view).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct Inner {
    log: CallLog,
    total: u64,
    cursor: u64,
    position: u64,
    open: bool,
    fail_open: bool,
    grab_script: VecDeque<GrabResult>,
    views: BTreeMap<ViewId, ViewScript>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedProvider {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedProvider {
    pub fn new(total: u64) -> Self {
        let provider = Self::default();
        provider.inner.lock().total = total;
        provider
    }

    pub fn failing_open() -> Self {
        let provider = Self::new(0);
        provider.inner.lock().fail_open = true;
        provider
    }

    /// Mark as open without going through `open`
    pub fn open_now(&mut self) {
        self.inner.lock().open = true;
    }

    /// Queue results returned by the next grabs ahead of normal playback
    pub fn push_grab(&self, result: GrabResult) {
        self.inner.lock().grab_script.push_back(result);
    }

    pub fn script_view(&self, view: ViewId, script: ViewScript) {
        self.inner.lock().views.insert(view, script);
    }

    pub fn force_closed(&self) {
        self.inner.lock().open = false;
    }

    pub fn log(&self) -> CallLog {
        self.inner.lock().log.clone()
    }

    fn frame_buffer(view: ViewId, frame: u64) -> ViewBuffer {
        let tag = match view {
            ViewId::Left => 20,
            ViewId::Right => 40,
        };
        let px = [10 + (frame % 100) as u8, tag, 200, 255];
        ViewBuffer::new(view, 2, 2, frame, px.repeat(4))
    }
}

impl CaptureProvider for ScriptedProvider {
    fn open(&mut self, _params: &OpenParams) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock();
        inner.log.calls += 1;
        inner.log.opens += 1;
        if inner.fail_open {
            return Err(ProviderError::new(codes::INVALID_PATH, "scripted open failure"));
        }
        inner.open = true;
        inner.cursor = 0;
        inner.position = 0;
        Ok(())
    }

    fn grab(&mut self) -> GrabResult {
        let mut inner = self.inner.lock();
        inner.log.calls += 1;
        inner.log.grabs += 1;

        let scripted = inner.grab_script.pop_front();
        let result = match scripted {
            Some(GrabResult::Success) | None => {
                if inner.cursor >= inner.total {
                    GrabResult::EndOfStream
                } else {
                    inner.position = inner.cursor;
                    inner.cursor += 1;
                    GrabResult::Success
                }
            }
            Some(other) => other,
        };
        if result == GrabResult::Success {
            let position = inner.position;
            inner.log.positions_after_grab.push(position);
        }
        result
    }

    fn position(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.log.calls += 1;
        inner.position
    }

    fn frame_count(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.log.calls += 1;
        inner.total
    }

    fn set_position(&mut self, frame: u64) {
        let mut inner = self.inner.lock();
        inner.log.calls += 1;
        inner.log.seeks.push(frame);
        inner.cursor = frame;
        inner.position = frame;
    }

    fn retrieve_view(&mut self, view: ViewId) -> Option<ViewBuffer> {
        let mut inner = self.inner.lock();
        inner.log.calls += 1;
        *inner.log.retrievals.entry(view).or_insert(0) += 1;
        match inner.views.get(&view).copied().unwrap_or_default() {
            ViewScript::Normal => Some(Self::frame_buffer(view, inner.position)),
            ViewScript::FailRetrieveOnce => {
                inner.views.insert(view, ViewScript::Normal);
                None
            }
            ViewScript::AlwaysFail => None,
        }
    }

    fn create_view_target(&mut self, view: ViewId) -> Option<ViewBuffer> {
        let mut inner = self.inner.lock();
        inner.log.calls += 1;
        *inner.log.recreations.entry(view).or_insert(0) += 1;
        match inner.views.get(&view).copied().unwrap_or_default() {
            ViewScript::AlwaysFail => None,
            _ => Some(Self::frame_buffer(view, inner.position)),
        }
    }

    fn is_open(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.log.calls += 1;
        inner.open
    }

    fn close(&mut self) {
        let mut inner = self.inner.lock();
        inner.log.calls += 1;
        inner.log.closes += 1;
        inner.open = false;
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
