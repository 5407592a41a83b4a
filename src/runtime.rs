use thiserror::Error;

/// Which physical hand an action, pose or haptic channel refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const BOTH: [Hand; 2] = [Hand::Left, Hand::Right];

    pub fn index(self) -> usize {
        match self {
            Hand::Left => 0,
            Hand::Right => 1,
        }
    }

    /// The OpenXR top-level user path for this hand.
    pub fn user_path(self) -> &'static str {
        match self {
            Hand::Left => "/user/hand/left",
            Hand::Right => "/user/hand/right",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Hand::Left => "left",
            Hand::Right => "right",
        }
    }
}

/// A position plus orientation quaternion (x, y, z, w), relative to the
/// backend's reference space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: [f32; 3],
    pub orientation: [f32; 4],
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            orientation: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Asymmetric field of view, half angles in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Fov {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

/// Resolved per-hand tracking state, refreshed once per frame.
///
/// `valid` is false until the first successful locate of a session; hosts
/// must treat pose and velocities as meaningless while it is false.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandState {
    pub pose: Pose,
    pub linear_velocity: [f32; 3],
    pub angular_velocity: [f32; 3],
    pub valid: bool,
}

/// Session lifecycle states, driven exclusively by compositor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unknown,
    Idle,
    Ready,
    Synchronized,
    Visible,
    Focused,
    Stopping,
    LossPending,
    Exiting,
}

impl SessionState {
    pub fn label(self) -> &'static str {
        match self {
            SessionState::Unknown => "unknown",
            SessionState::Idle => "idle",
            SessionState::Ready => "ready",
            SessionState::Synchronized => "synchronized",
            SessionState::Visible => "visible",
            SessionState::Focused => "focused",
            SessionState::Stopping => "stopping",
            SessionState::LossPending => "loss-pending",
            SessionState::Exiting => "exiting",
        }
    }

    /// True for states in which the compositor may ask us to submit frames.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            SessionState::Ready
                | SessionState::Synchronized
                | SessionState::Visible
                | SessionState::Focused
        )
    }

    /// Whether a compositor-announced transition to `next` is legal.
    ///
    /// Transitions are monotonic through the active states, with the
    /// stopping branch reachable from any of them. After `LossPending` the
    /// only way forward is recreation, which re-enters the machine at
    /// `Unknown`/`Idle`; anything else is rejected.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Unknown, Idle) => true,
            (Idle, Ready | Exiting | LossPending) => true,
            (Ready, Synchronized | Stopping | LossPending) => true,
            (Synchronized, Visible | Stopping | LossPending) => true,
            (Visible, Focused | Synchronized | Stopping | LossPending) => true,
            (Focused, Visible | Stopping | LossPending) => true,
            (Stopping, Idle | Exiting | LossPending) => true,
            (LossPending, Idle) => true,
            (Exiting, _) => false,
            _ => false,
        }
    }
}

/// When a backend performs its frame handshake relative to the host's own
/// per-frame synchronization point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynchronizeStage {
    Early,
    Late,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Null,
    OpenXr,
}

/// Backend events surfaced to the host through [`VrRuntime::consume_events`].
///
/// A discriminated enum rather than an opaque pointer, so hosts get
/// exhaustive, type-checked handling.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    SessionStateChanged {
        previous: SessionState,
        current: SessionState,
    },
    InteractionProfileChanged,
    RenderTargetSizeChanged {
        width: u32,
        height: u32,
    },
    InstanceLossPending,
}

#[derive(Debug, Error)]
pub enum VrError {
    // Recoverable: callers are expected to tolerate these every frame.
    #[error("session is not ready")]
    NotReady,
    #[error("session loss pending, recreation scheduled")]
    SessionLossPending,
    #[error("device not currently tracked")]
    NotTracked,

    // Protocol violations: programmer error, never silently ignored.
    #[error("begin_frame called while a frame is already open")]
    FrameAlreadyBegun,
    #[error("end_frame called with no open frame")]
    FrameNotBegun,
    #[error("pose data requested before any successful locate this frame")]
    PosesNotLocated,
    #[error("actions used before an action manifest was installed")]
    ActionsNotInitialized,

    // Fatal: surfaced once, after which ready() reports false for good.
    #[error("VR runtime instance lost beyond recreation")]
    InstanceLost,

    #[error("invalid action manifest: {0}")]
    InvalidManifest(String),
    #[error("compositor error: {0}")]
    Compositor(String),
}

impl VrError {
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VrError::NotReady | VrError::SessionLossPending | VrError::NotTracked
        )
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            VrError::FrameAlreadyBegun
                | VrError::FrameNotBegun
                | VrError::PosesNotLocated
                | VrError::ActionsNotInitialized
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, VrError::InstanceLost)
    }
}

pub type VrResult<T> = Result<T, VrError>;

/// The uniform contract the host drives every frame, regardless of which
/// underlying VR runtime is active.
///
/// Implementations are driven from at least two threads (render thread for
/// frame/pose/matrix calls, input thread for `update_input` and action
/// queries) and serialize internally; no method panics across this boundary.
pub trait VrRuntime: Send + Sync {
    fn kind(&self) -> RuntimeKind;
    fn name(&self) -> &str;

    /// Where this backend performs its frame handshake. `Early` backends run
    /// it inside `synchronize_frame`, before the host's own sync point.
    fn synchronize_stage(&self) -> SynchronizeStage {
        SynchronizeStage::Late
    }

    /// True iff a session exists, is in an active state, and the backend's
    /// session-ready signal has fired. No frame or pose operation may be
    /// called while this is false.
    fn ready(&self) -> bool;

    /// Drains pending session events and advances the session state machine.
    /// Errors only when the session is unrecoverably lost.
    fn synchronize_frame(&self) -> VrResult<()>;

    /// Locates head and hand spaces for the currently open frame. Requires a
    /// frame to be open; devices that are not tracked yet are skipped rather
    /// than reported as errors.
    fn update_poses(&self) -> VrResult<()>;

    fn update_render_target_size(&self) -> VrResult<()>;
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Drains queued backend events, invoking `callback` once per event.
    fn consume_events(&self, callback: &mut dyn FnMut(&RuntimeEvent)) -> VrResult<()>;

    /// Recomputes projection and view matrices for the given clip planes
    /// from the most recently located poses.
    fn update_matrices(&self, nearz: f32, farz: f32) -> VrResult<()>;

    /// Polls action states. Independent of the frame lifecycle and safe to
    /// call concurrently with frame and pose operations.
    fn update_input(&self) -> VrResult<()>;
}

/// Inert backend for hosts running without VR support.
#[derive(Debug, Default)]
pub struct NullRuntime;

impl VrRuntime for NullRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Null
    }

    fn name(&self) -> &str {
        "Null"
    }

    fn ready(&self) -> bool {
        false
    }

    fn synchronize_frame(&self) -> VrResult<()> {
        Ok(())
    }

    fn update_poses(&self) -> VrResult<()> {
        Ok(())
    }

    fn update_render_target_size(&self) -> VrResult<()> {
        Ok(())
    }

    fn width(&self) -> u32 {
        0
    }

    fn height(&self) -> u32 {
        0
    }

    fn consume_events(&self, _callback: &mut dyn FnMut(&RuntimeEvent)) -> VrResult<()> {
        Ok(())
    }

    fn update_matrices(&self, _nearz: f32, _farz: f32) -> VrResult<()> {
        Ok(())
    }

    fn update_input(&self) -> VrResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_states_are_running() {
        for state in [
            SessionState::Ready,
            SessionState::Synchronized,
            SessionState::Visible,
            SessionState::Focused,
        ] {
            assert!(state.is_running(), "{:?} should be running", state);
        }
        for state in [
            SessionState::Unknown,
            SessionState::Idle,
            SessionState::Stopping,
            SessionState::LossPending,
            SessionState::Exiting,
        ] {
            assert!(!state.is_running(), "{:?} should not be running", state);
        }
    }

    #[test]
    fn lifecycle_sequence_is_accepted() {
        let sequence = [
            SessionState::Unknown,
            SessionState::Idle,
            SessionState::Ready,
            SessionState::Stopping,
            SessionState::LossPending,
            SessionState::Idle,
        ];
        for pair in sequence.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{:?} -> {:?} should be accepted",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn loss_pending_only_recovers_through_idle() {
        for next in [
            SessionState::Ready,
            SessionState::Synchronized,
            SessionState::Visible,
            SessionState::Focused,
            SessionState::Stopping,
        ] {
            assert!(
                !SessionState::LossPending.can_transition_to(next),
                "loss-pending -> {:?} must be rejected",
                next
            );
        }
        assert!(SessionState::LossPending.can_transition_to(SessionState::Idle));
    }

    #[test]
    fn error_taxonomy_is_disjoint() {
        let errors = [
            VrError::NotReady,
            VrError::FrameAlreadyBegun,
            VrError::InstanceLost,
        ];
        for err in &errors {
            let classes = [
                err.is_recoverable(),
                err.is_protocol_violation(),
                err.is_fatal(),
            ];
            assert_eq!(classes.iter().filter(|&&c| c).count(), 1);
        }
    }

    #[test]
    fn null_runtime_never_reports_ready() {
        let runtime = NullRuntime;
        assert!(!runtime.ready());
        assert!(runtime.synchronize_frame().is_ok());
        assert_eq!(runtime.width(), 0);
    }
}
