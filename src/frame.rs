//! Frame lifecycle bookkeeping shared by backends.

use crate::runtime::{VrError, VrResult};
use std::time::Instant;

/// Enforces the begin-frame / locate / end-frame protocol.
///
/// Invariant: `synced` implies `began`; finishing a frame clears both.
#[derive(Debug, Default)]
pub struct FrameSynchronizer {
    began: bool,
    synced: bool,
    predicted_display_time: i64,
    should_render: bool,
}

impl FrameSynchronizer {
    /// Opens a frame at the given predicted display time. Fails if a frame
    /// is already open.
    pub fn begin(&mut self, predicted_display_time: i64, should_render: bool) -> VrResult<()> {
        if self.began {
            return Err(VrError::FrameAlreadyBegun);
        }
        self.began = true;
        self.synced = false;
        self.predicted_display_time = predicted_display_time;
        self.should_render = should_render;
        Ok(())
    }

    /// Records that poses were located for the open frame.
    pub fn mark_synced(&mut self) -> VrResult<()> {
        if !self.began {
            return Err(VrError::FrameNotBegun);
        }
        self.synced = true;
        Ok(())
    }

    /// Closes the open frame, returning its display time for submission.
    /// Fails if no frame is open.
    pub fn finish(&mut self) -> VrResult<i64> {
        if !self.began {
            return Err(VrError::FrameNotBegun);
        }
        self.began = false;
        self.synced = false;
        Ok(self.predicted_display_time)
    }

    /// Drops any open frame without submission, used on session teardown.
    pub fn abandon(&mut self) {
        self.began = false;
        self.synced = false;
    }

    pub fn began(&self) -> bool {
        self.began
    }

    pub fn synced(&self) -> bool {
        self.synced
    }

    pub fn should_render(&self) -> bool {
        self.should_render
    }

    pub fn predicted_display_time(&self) -> i64 {
        self.predicted_display_time
    }
}

/// Opt-in wall-clock timing around frame calls, for diagnostics only.
/// Emits "<label> took <ms> ms" lines and never alters control flow.
#[derive(Debug, Default)]
pub struct FrameProfiler {
    enabled: bool,
    start: Option<Instant>,
}

impl FrameProfiler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            start: None,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn begin(&mut self) {
        if self.enabled {
            self.start = Some(Instant::now());
        }
    }

    pub fn end(&mut self, label: &str) {
        if !self.enabled {
            return;
        }
        if let Some(start) = self.start.take() {
            let ms = start.elapsed().as_secs_f32() * 1000.0;
            log::info!("[vr] {label} took {ms} ms");
        }
    }
}
