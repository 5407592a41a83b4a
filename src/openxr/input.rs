//! Action-set and hand-tracking state owned by the backend.

use super::driver::{ActionHandle, HandSample};
use crate::manifest::{translate_action_name, ActionKind, ActionManifest};
use crate::runtime::HandState;
use std::collections::HashMap;

/// Runtime action handles created from the manifest, partitioned by value
/// class. An action belongs to exactly one set for its lifetime.
#[derive(Debug, Default)]
pub(crate) struct ActionSet {
    by_name: HashMap<String, (ActionHandle, ActionKind)>,
}

impl ActionSet {
    pub fn new(created: Vec<(String, ActionHandle)>, manifest: &ActionManifest) -> Self {
        let mut by_name = HashMap::with_capacity(created.len());
        for (name, handle) in created {
            if let Some(descriptor) = manifest.get(&name) {
                by_name.insert(name, (handle, descriptor.kind));
            }
        }
        Self { by_name }
    }

    /// Accepts short or manifest-authored names.
    pub fn lookup(&self, name: &str) -> Option<(ActionHandle, ActionKind)> {
        self.by_name.get(&translate_action_name(name)).copied()
    }

    /// Handle for `name` only when the action has the expected value class.
    pub fn handle_of_kind(&self, name: &str, kind: ActionKind) -> Option<ActionHandle> {
        self.lookup(name)
            .filter(|(_, actual)| *actual == kind)
            .map(|(handle, _)| handle)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }
}

/// Per-hand resolved tracking state plus the concrete paths this hand was
/// bound with, recomputed every frame and never persisted across sessions.
#[derive(Debug, Default)]
pub(crate) struct HandTracker {
    pub state: HandState,
    pub active: bool,
    pub bound_paths: Vec<String>,
}

impl HandTracker {
    pub fn reset(&mut self) {
        self.state = HandState::default();
        self.active = false;
    }

    pub fn apply_sample(&mut self, sample: &HandSample) {
        self.state.pose = sample.pose;
        self.state.linear_velocity = sample.linear_velocity;
        self.state.angular_velocity = sample.angular_velocity;
        self.state.valid = sample.tracked;
    }
}

// Output ranges the compositor supports; out-of-range requests are clamped,
// never rejected.
pub const MAX_HAPTIC_DURATION_SECONDS: f32 = 5.0;
pub const MAX_HAPTIC_FREQUENCY_HZ: f32 = 320.0;
pub const MAX_HAPTIC_AMPLITUDE: f32 = 1.0;

/// Clamps a haptic request to the supported ranges and converts the
/// duration to nanoseconds.
pub(crate) fn clamp_haptic(duration: f32, frequency: f32, amplitude: f32) -> (i64, f32, f32) {
    let duration = duration.clamp(0.0, MAX_HAPTIC_DURATION_SECONDS);
    let frequency = frequency.clamp(0.0, MAX_HAPTIC_FREQUENCY_HZ);
    let amplitude = amplitude.clamp(0.0, MAX_HAPTIC_AMPLITUDE);
    ((duration * 1_000_000_000.0) as i64, frequency, amplitude)
}
