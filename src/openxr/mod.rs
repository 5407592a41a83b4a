//! OpenXR backend: multi-stage session state machine, strict frame
//! lifecycle shared across threads, and the action-binding translator.
//!
//! The vendor API sits behind the [`Compositor`] seam so the session and
//! frame logic here is driven identically by the real runtime link
//! (`vr-openxr` feature) and by [`SimulatedCompositor`].

mod driver;
mod input;
#[cfg(feature = "vr-openxr")]
mod loader;

pub use driver::{
    ActionHandle, Compositor, DriverEvent, FrameWait, HandSample, HapticRecord,
    SimulatedCompositor, SwapchainDescriptor, ViewSample,
};
pub use input::{MAX_HAPTIC_AMPLITUDE, MAX_HAPTIC_DURATION_SECONDS, MAX_HAPTIC_FREQUENCY_HZ};
#[cfg(feature = "vr-openxr")]
pub use loader::OpenXrCompositor;

use crate::bindings::BindingTable;
use crate::frame::{FrameProfiler, FrameSynchronizer};
use crate::manifest::{ActionKind, ActionManifest};
use crate::math::{self, Mat4};
use crate::runtime::{
    Hand, HandState, Pose, RuntimeEvent, RuntimeKind, SessionState, SynchronizeStage, VrError,
    VrResult, VrRuntime,
};
use input::{clamp_haptic, ActionSet, HandTracker};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

const MAX_RECREATE_ATTEMPTS: u32 = 3;

/// The OpenXR-shaped [`VrRuntime`] backend.
///
/// All session, frame and pose state lives behind one non-reentrant mutex;
/// the render thread (frame/pose/matrix calls) and the input thread
/// (`update_input`, action queries) block on it rather than failing. No
/// public method is called while the lock is held, so the lock is never
/// re-acquired on the same thread.
pub struct OpenXrRuntime {
    core: Mutex<Core>,
}

impl OpenXrRuntime {
    /// Creates the backend and its session. The driver is injected; the
    /// backend owns it exclusively from here on.
    pub fn new(driver: Box<dyn Compositor>) -> VrResult<Self> {
        Self::with_binding_table(driver, BindingTable::default())
    }

    pub fn with_binding_table(
        mut driver: Box<dyn Compositor>,
        binding_table: BindingTable,
    ) -> VrResult<Self> {
        driver.create_session()?;
        Ok(Self {
            core: Mutex::new(Core {
                driver,
                binding_table,
                session_state: SessionState::Unknown,
                session_ready: false,
                instance_lost: false,
                recreate_pending: false,
                recreate_attempts: 0,
                frame: FrameSynchronizer::default(),
                profiler: FrameProfiler::default(),
                prediction_scale: 0.0,
                last_display_period: 0,
                render_width: 0,
                render_height: 0,
                swapchains: Vec::new(),
                head: Pose::default(),
                head_valid: false,
                views: [ViewSample::default(); 2],
                views_valid: false,
                projections: [math::identity(); 2],
                view_matrices: [math::identity(); 2],
                hands: [HandTracker::default(), HandTracker::default()],
                actions: None,
                manifest: None,
                events: VecDeque::new(),
            }),
        })
    }

    fn core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().expect("vr core mutex should not poison")
    }

    /// Parses and stores the action manifest; actions are created against
    /// the session immediately when it is ready, otherwise on the next
    /// `READY` transition (and again after every session recreation).
    pub fn initialize_actions(&self, manifest_json: &str) -> VrResult<()> {
        let manifest = ActionManifest::from_json(manifest_json)?;
        let mut core = self.core();
        core.manifest = Some(manifest.clone());
        if core.session_ready {
            core.install_actions(&manifest)?;
        }
        Ok(())
    }

    /// Opens the next frame: waits for the compositor's predicted frame
    /// slot, then begins it. Fails with a protocol error if a frame is
    /// already open.
    pub fn begin_frame(&self) -> VrResult<()> {
        let mut core = self.core();
        if core.instance_lost {
            return Err(VrError::InstanceLost);
        }
        if !core.is_ready() {
            return Err(VrError::NotReady);
        }
        core.begin_frame_internal()
    }

    /// Submits the open frame at its predicted display time and closes it.
    pub fn end_frame(&self) -> VrResult<()> {
        let mut core = self.core();
        let display_time = core.frame.finish()?;
        core.profiler.begin();
        let result = core.driver.end_frame(display_time);
        core.profiler.end("end_frame");
        result
    }

    /// False for unbound or inactive actions; never an error — absence of a
    /// binding models "this controller doesn't have that control".
    pub fn is_action_active(&self, name: &str, hand: Hand) -> bool {
        let core = self.core();
        let Some(actions) = &core.actions else {
            return false;
        };
        match actions.lookup(name) {
            Some((handle, _)) => core.driver.action_active(handle, hand),
            None => false,
        }
    }

    /// 2-axis joystick value, zeroed when the action is inactive or unbound.
    pub fn stick_axis(&self, hand: Hand) -> [f32; 2] {
        let core = self.core();
        let Some(actions) = &core.actions else {
            return [0.0, 0.0];
        };
        actions
            .handle_of_kind("joystick", ActionKind::Axis2)
            .and_then(|handle| core.driver.action_axis2(handle, hand))
            .unwrap_or([0.0, 0.0])
    }

    pub fn action_scalar(&self, name: &str, hand: Hand) -> f32 {
        let core = self.core();
        let Some(actions) = &core.actions else {
            return 0.0;
        };
        actions
            .handle_of_kind(name, ActionKind::Scalar)
            .and_then(|handle| core.driver.action_scalar(handle, hand))
            .unwrap_or(0.0)
    }

    pub fn action_boolean(&self, name: &str, hand: Hand) -> bool {
        let core = self.core();
        let Some(actions) = &core.actions else {
            return false;
        };
        actions
            .handle_of_kind(name, ActionKind::Boolean)
            .and_then(|handle| core.driver.action_boolean(handle, hand))
            .unwrap_or(false)
    }

    /// Issues a vibration on `hand`, clamping duration (seconds), frequency
    /// and amplitude to the supported ranges. A no-op on an inactive hand.
    pub fn trigger_haptic_vibration(
        &self,
        duration: f32,
        frequency: f32,
        amplitude: f32,
        hand: Hand,
    ) -> VrResult<()> {
        let mut core = self.core();
        let Some(actions) = &core.actions else {
            return Err(VrError::ActionsNotInitialized);
        };
        let Some(handle) = actions.handle_of_kind("haptic", ActionKind::Haptic) else {
            return Ok(());
        };
        if !core.driver.action_active(handle, hand) {
            return Ok(());
        }
        let (duration_ns, frequency, amplitude) = clamp_haptic(duration, frequency, amplitude);
        core.driver
            .apply_haptic(handle, hand, duration_ns, frequency, amplitude)
    }

    pub fn session_state(&self) -> SessionState {
        self.core().session_state
    }

    pub fn frame_open(&self) -> bool {
        self.core().frame.began()
    }

    /// Compositor hint for the open frame: when false the host should skip
    /// its rendering work, though the frame must still be ended.
    pub fn should_render(&self) -> bool {
        self.core().frame.should_render()
    }

    /// Concrete component paths this hand was bound with across all
    /// suggested profiles; empty until actions are installed.
    pub fn bound_paths(&self, hand: Hand) -> Vec<String> {
        self.core().hands[hand.index()].bound_paths.clone()
    }

    /// Head pose located for the current frame, `None` until the first
    /// successful locate.
    pub fn head_pose(&self) -> Option<Pose> {
        let core = self.core();
        core.head_valid.then_some(core.head)
    }

    pub fn hand_state(&self, hand: Hand) -> HandState {
        self.core().hands[hand.index()].state
    }

    pub fn projection_matrices(&self) -> [Mat4; 2] {
        self.core().projections
    }

    pub fn view_matrices(&self) -> [Mat4; 2] {
        self.core().view_matrices
    }

    pub fn swapchains(&self) -> Vec<SwapchainDescriptor> {
        self.core().swapchains.clone()
    }

    /// Enables wall-clock profiling lines around frame calls. Diagnostics
    /// only; control flow is unaffected.
    pub fn set_profiling(&self, enabled: bool) {
        self.core().profiler.set_enabled(enabled);
    }

    /// Scales how far past the compositor's predicted display time spaces
    /// are located, in display periods.
    pub fn set_prediction_scale(&self, scale: f32) {
        self.core().prediction_scale = scale;
    }
}

impl VrRuntime for OpenXrRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::OpenXr
    }

    fn name(&self) -> &str {
        "OpenXR"
    }

    fn synchronize_stage(&self) -> SynchronizeStage {
        SynchronizeStage::Early
    }

    fn ready(&self) -> bool {
        self.core().is_ready()
    }

    fn synchronize_frame(&self) -> VrResult<()> {
        let mut core = self.core();
        if core.instance_lost {
            return Err(VrError::InstanceLost);
        }
        if core.recreate_pending {
            core.attempt_recreate()?;
        }
        while let Some(event) = core.driver.poll_event()? {
            core.handle_driver_event(event);
        }
        // Early-stage backend: the frame handshake happens here, before the
        // host's own sync point.
        if core.is_ready() && !core.frame.began() {
            match core.begin_frame_internal() {
                Ok(()) => {}
                Err(err) if err.is_recoverable() => {
                    log::debug!("[vr] frame handshake skipped: {err}");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn update_poses(&self) -> VrResult<()> {
        let mut core = self.core();
        if !core.is_ready() {
            return Err(VrError::NotReady);
        }
        if !core.frame.began() {
            return Err(VrError::FrameNotBegun);
        }
        core.locate_spaces()
    }

    fn update_render_target_size(&self) -> VrResult<()> {
        let mut core = self.core();
        let create_swapchains = core.session_ready;
        core.negotiate_render_target(create_swapchains)
    }

    fn width(&self) -> u32 {
        self.core().render_width
    }

    fn height(&self) -> u32 {
        self.core().render_height
    }

    fn consume_events(&self, callback: &mut dyn FnMut(&RuntimeEvent)) -> VrResult<()> {
        // Drained outside the lock so callbacks may call back into the
        // runtime without deadlocking.
        let drained: Vec<RuntimeEvent> = {
            let mut core = self.core();
            core.events.drain(..).collect()
        };
        for event in &drained {
            callback(event);
        }
        Ok(())
    }

    fn update_matrices(&self, nearz: f32, farz: f32) -> VrResult<()> {
        let mut core = self.core();
        if !core.frame.synced() {
            return Err(VrError::PosesNotLocated);
        }
        if !core.views_valid {
            // Tracking dropped out this frame; keep the previous matrices.
            return Ok(());
        }
        for eye in 0..2 {
            let view = core.views[eye];
            core.projections[eye] = math::projection_from_fov(&view.fov, nearz, farz);
            core.view_matrices[eye] = math::view_from_pose(&view.pose);
        }
        Ok(())
    }

    fn update_input(&self) -> VrResult<()> {
        let mut core = self.core();
        if core.instance_lost {
            return Err(VrError::InstanceLost);
        }
        if !core.is_ready() || core.actions.is_none() {
            return Ok(());
        }
        match core.driver.sync_actions() {
            Ok(()) => {}
            Err(err) if err.is_recoverable() => return Ok(()),
            Err(err) => return Err(err),
        }
        let pose_handle = core
            .actions
            .as_ref()
            .and_then(|actions| actions.handle_of_kind("pose", ActionKind::Pose));
        if let Some(pose_handle) = pose_handle {
            for hand in Hand::BOTH {
                let active = core.driver.action_active(pose_handle, hand);
                core.hands[hand.index()].active = active;
            }
        }
        Ok(())
    }
}

struct Core {
    driver: Box<dyn Compositor>,
    binding_table: BindingTable,
    session_state: SessionState,
    session_ready: bool,
    instance_lost: bool,
    recreate_pending: bool,
    recreate_attempts: u32,
    frame: FrameSynchronizer,
    profiler: FrameProfiler,
    prediction_scale: f32,
    last_display_period: i64,
    render_width: u32,
    render_height: u32,
    swapchains: Vec<SwapchainDescriptor>,
    head: Pose,
    head_valid: bool,
    views: [ViewSample; 2],
    views_valid: bool,
    projections: [Mat4; 2],
    view_matrices: [Mat4; 2],
    hands: [HandTracker; 2],
    actions: Option<ActionSet>,
    manifest: Option<ActionManifest>,
    events: VecDeque<RuntimeEvent>,
}

impl Core {
    fn is_ready(&self) -> bool {
        !self.instance_lost && self.session_ready && self.session_state.is_running()
    }

    fn handle_driver_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::SessionStateChanged(next) => self.handle_session_transition(next),
            DriverEvent::InteractionProfileChanged => {
                log::info!("[vr] interaction profile changed");
                self.events.push_back(RuntimeEvent::InteractionProfileChanged);
            }
            DriverEvent::InstanceLossPending => {
                log::error!("[vr] runtime instance loss pending, disabling VR");
                self.instance_lost = true;
                self.session_ready = false;
                self.frame.abandon();
                self.events.push_back(RuntimeEvent::InstanceLossPending);
            }
        }
    }

    fn handle_session_transition(&mut self, next: SessionState) {
        let previous = self.session_state;
        if !previous.can_transition_to(next) {
            log::warn!(
                "[vr] rejected session transition {} -> {}",
                previous.label(),
                next.label()
            );
            return;
        }
        self.session_state = next;
        log::info!(
            "[vr] session state {} -> {}",
            previous.label(),
            next.label()
        );
        self.events.push_back(RuntimeEvent::SessionStateChanged {
            previous,
            current: next,
        });

        match next {
            SessionState::Ready => {
                if let Err(err) = self.on_session_ready() {
                    log::warn!("[vr] session ready handling failed: {err}");
                    self.session_ready = false;
                }
            }
            SessionState::Stopping => self.on_session_stopping(),
            SessionState::LossPending => {
                log::warn!("[vr] session loss pending, scheduling recreation");
                self.session_ready = false;
                self.recreate_pending = true;
                self.frame.abandon();
            }
            SessionState::Exiting => {
                log::info!("[vr] session exiting");
                self.session_ready = false;
                self.frame.abandon();
            }
            _ => {}
        }
    }

    fn on_session_ready(&mut self) -> VrResult<()> {
        self.driver.begin_session()?;
        self.session_ready = true;
        self.negotiate_render_target(true)?;
        if let Some(manifest) = self.manifest.clone() {
            self.install_actions(&manifest)?;
        }
        Ok(())
    }

    fn on_session_stopping(&mut self) {
        if self.frame.began() {
            let display_time = self.frame.predicted_display_time();
            self.frame.abandon();
            if let Err(err) = self.driver.end_frame(display_time) {
                log::debug!("[vr] discarding open frame on stop: {err}");
            }
        }
        if let Err(err) = self.driver.end_session() {
            log::warn!("[vr] session end failed: {err}");
        }
        self.session_ready = false;
        self.head_valid = false;
        self.views_valid = false;
        for hand in &mut self.hands {
            hand.reset();
        }
    }

    fn attempt_recreate(&mut self) -> VrResult<()> {
        self.frame.abandon();
        self.driver.destroy_session();
        match self.driver.create_session() {
            Ok(()) => {
                log::info!("[vr] session recreated after loss");
                self.recreate_pending = false;
                self.recreate_attempts = 0;
                self.session_state = SessionState::Unknown;
                self.session_ready = false;
                self.head_valid = false;
                self.views_valid = false;
                self.actions = None;
                self.swapchains.clear();
                for hand in &mut self.hands {
                    hand.reset();
                }
                Ok(())
            }
            Err(err) => {
                self.recreate_attempts += 1;
                log::warn!(
                    "[vr] session recreation attempt {}/{} failed: {err}",
                    self.recreate_attempts,
                    MAX_RECREATE_ATTEMPTS
                );
                if self.recreate_attempts >= MAX_RECREATE_ATTEMPTS {
                    log::error!("[vr] giving up on session recreation");
                    self.instance_lost = true;
                    self.events.push_back(RuntimeEvent::InstanceLossPending);
                    return Err(VrError::InstanceLost);
                }
                Ok(())
            }
        }
    }

    fn begin_frame_internal(&mut self) -> VrResult<()> {
        if self.frame.began() {
            return Err(VrError::FrameAlreadyBegun);
        }
        self.profiler.begin();
        let wait = self.driver.wait_frame()?;
        self.profiler.end("wait_frame");
        // The wait may have been aborted by a session transition.
        if !self.session_state.is_running() {
            return Err(VrError::NotReady);
        }
        self.driver.begin_frame()?;
        self.last_display_period = wait.predicted_display_period;
        let display_time = wait.predicted_display_time
            + (wait.predicted_display_period as f32 * self.prediction_scale) as i64;
        self.frame.begin(display_time, wait.should_render)
    }

    fn locate_spaces(&mut self) -> VrResult<()> {
        let display_time = self.frame.predicted_display_time();
        self.profiler.begin();

        match self.driver.locate_head(display_time)? {
            Some(pose) => {
                self.head = pose;
                self.head_valid = true;
            }
            None => self.head_valid = false,
        }

        match self.driver.locate_views(display_time)? {
            Some(views) => {
                self.views = views;
                self.views_valid = true;
            }
            None => self.views_valid = false,
        }

        for hand in Hand::BOTH {
            match self.driver.locate_hand(hand, display_time)? {
                Some(sample) => self.hands[hand.index()].apply_sample(&sample),
                None => self.hands[hand.index()].state.valid = false,
            }
        }

        self.profiler.end("update_poses");
        self.frame.mark_synced()
    }

    fn negotiate_render_target(&mut self, create_swapchains: bool) -> VrResult<()> {
        let (width, height) = self.driver.recommended_render_target_size()?;
        let changed = width != self.render_width || height != self.render_height;
        if changed {
            log::info!("[vr] render target size {width}x{height}");
            self.render_width = width;
            self.render_height = height;
            self.events
                .push_back(RuntimeEvent::RenderTargetSizeChanged { width, height });
        }
        if create_swapchains && (changed || self.swapchains.is_empty()) {
            self.swapchains.clear();
            for _eye in 0..2 {
                let descriptor = self.driver.create_swapchain(width, height)?;
                self.swapchains.push(descriptor);
            }
        }
        Ok(())
    }

    fn install_actions(&mut self, manifest: &ActionManifest) -> VrResult<()> {
        let created = self.driver.create_actions(manifest)?;
        let actions = ActionSet::new(created, manifest);

        for hand in &mut self.hands {
            hand.bound_paths.clear();
        }
        for profile_set in self.binding_table.suggestions(manifest) {
            let pairs: Vec<(ActionHandle, String)> = profile_set
                .bindings
                .iter()
                .filter_map(|suggestion| {
                    actions
                        .lookup(&suggestion.action)
                        .map(|(handle, _)| (handle, suggestion.path.clone()))
                })
                .collect();
            if pairs.is_empty() {
                continue;
            }
            if let Err(err) = self.driver.suggest_bindings(&profile_set.profile, &pairs) {
                log::warn!(
                    "[vr] binding suggestion rejected for {}: {err}",
                    profile_set.profile
                );
            }
            for suggestion in &profile_set.bindings {
                let tracker = &mut self.hands[suggestion.hand.index()];
                if !tracker.bound_paths.contains(&suggestion.path) {
                    tracker.bound_paths.push(suggestion.path.clone());
                }
            }
        }

        self.driver.attach_actions()?;
        log::info!("[vr] installed {} actions", actions.len());
        self.actions = Some(actions);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const MANIFEST: &str = r#"{ "actions": [
        { "name": "/actions/default/in/Pose", "type": "pose" },
        { "name": "/actions/default/in/Trigger", "type": "vector1" },
        { "name": "/actions/default/in/Grip", "type": "vector1" },
        { "name": "/actions/default/in/Joystick", "type": "vector2" },
        { "name": "/actions/default/in/JoystickClick", "type": "boolean" },
        { "name": "/actions/default/out/Haptic", "type": "vibration" }
    ] }"#;

    type SharedSim = Arc<Mutex<SimulatedCompositor>>;

    fn harness() -> (OpenXrRuntime, SharedSim) {
        let sim: SharedSim = Arc::new(Mutex::new(SimulatedCompositor::new()));
        let runtime =
            OpenXrRuntime::new(Box::new(Arc::clone(&sim))).expect("session should create");
        (runtime, sim)
    }

    fn push_states(sim: &SharedSim, states: &[SessionState]) {
        let mut sim = sim.lock().expect("sim lock");
        for state in states {
            sim.push_session_state(*state);
        }
    }

    fn make_ready(runtime: &OpenXrRuntime, sim: &SharedSim) {
        runtime.initialize_actions(MANIFEST).expect("manifest ok");
        push_states(
            sim,
            &[
                SessionState::Idle,
                SessionState::Ready,
                SessionState::Synchronized,
                SessionState::Visible,
                SessionState::Focused,
            ],
        );
        runtime.synchronize_frame().expect("synchronize ok");
    }

    #[test]
    fn not_ready_until_session_ready_signal() {
        let (runtime, sim) = harness();
        assert!(!runtime.ready());

        push_states(&sim, &[SessionState::Idle]);
        runtime.synchronize_frame().expect("synchronize ok");
        assert!(!runtime.ready());

        push_states(&sim, &[SessionState::Ready]);
        runtime.synchronize_frame().expect("synchronize ok");
        assert!(runtime.ready());
        assert!(sim.lock().expect("sim lock").session_begun());
    }

    #[test]
    fn early_stage_handshake_opens_the_frame() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        assert_eq!(runtime.synchronize_stage(), SynchronizeStage::Early);
        assert!(runtime.frame_open());

        runtime.update_poses().expect("poses locate");
        runtime.end_frame().expect("frame ends");
        assert!(!runtime.frame_open());
    }

    #[test]
    fn double_begin_frame_is_a_protocol_error() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        assert!(runtime.frame_open());
        let err = runtime.begin_frame().unwrap_err();
        assert!(matches!(err, VrError::FrameAlreadyBegun));
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn end_frame_without_begin_is_a_protocol_error() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        runtime.end_frame().expect("first end ok");
        let err = runtime.end_frame().unwrap_err();
        assert!(matches!(err, VrError::FrameNotBegun));
    }

    #[test]
    fn poses_invalid_before_any_successful_locate() {
        let (runtime, _sim) = harness();
        let err = runtime.update_poses().unwrap_err();
        assert!(err.is_recoverable());

        assert!(runtime.head_pose().is_none());
        assert!(!runtime.hand_state(Hand::Left).valid);
        assert!(!runtime.hand_state(Hand::Right).valid);
    }

    #[test]
    fn update_poses_locates_head_and_hands() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        {
            let mut sim = sim.lock().expect("sim lock");
            sim.set_head_pose(Some(Pose {
                position: [0.0, 1.7, 0.0],
                ..Pose::default()
            }));
            sim.set_views(Some([ViewSample::default(); 2]));
            sim.set_hand_sample(
                Hand::Left,
                Some(HandSample {
                    tracked: true,
                    ..HandSample::default()
                }),
            );
        }

        runtime.update_poses().expect("poses locate");
        let head = runtime.head_pose().expect("head pose valid");
        assert_eq!(head.position[1], 1.7);
        assert!(runtime.hand_state(Hand::Left).valid);
        assert!(!runtime.hand_state(Hand::Right).valid);
    }

    #[test]
    fn untracked_devices_are_not_an_error() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        // Nothing tracked at all: locate succeeds, validity stays false.
        runtime.update_poses().expect("locate without devices");
        assert!(runtime.head_pose().is_none());
        assert!(!runtime.hand_state(Hand::Left).valid);
    }

    #[test]
    fn matrices_require_a_located_frame() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        let err = runtime.update_matrices(0.1, 1000.0).unwrap_err();
        assert!(matches!(err, VrError::PosesNotLocated));

        let quarter = std::f32::consts::FRAC_PI_4;
        {
            let mut sim = sim.lock().expect("sim lock");
            sim.set_views(Some([
                ViewSample {
                    fov: crate::runtime::Fov {
                        angle_left: -quarter,
                        angle_right: quarter,
                        angle_up: quarter,
                        angle_down: -quarter,
                    },
                    ..ViewSample::default()
                };
                2
            ]));
        }
        runtime.update_poses().expect("poses locate");
        runtime.update_matrices(0.1, 1000.0).expect("matrices ok");
        let projections = runtime.projection_matrices();
        assert!((projections[0][0][0] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn render_target_negotiation_reports_and_recreates() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        assert_eq!(runtime.width(), 1440);
        assert_eq!(runtime.height(), 1600);
        assert_eq!(runtime.swapchains().len(), 2);

        sim.lock().expect("sim lock").set_recommended_size(2016, 2240);
        runtime.update_render_target_size().expect("renegotiate");
        assert_eq!(runtime.width(), 2016);
        let swapchains = runtime.swapchains();
        assert_eq!(swapchains.len(), 2);
        assert!(swapchains.iter().all(|s| s.width == 2016 && s.height == 2240));

        let mut saw_resize = false;
        runtime
            .consume_events(&mut |event| {
                if let RuntimeEvent::RenderTargetSizeChanged { width, .. } = event {
                    saw_resize = *width == 2016;
                }
            })
            .expect("consume ok");
        assert!(saw_resize);
    }

    #[test]
    fn consume_events_drains_tagged_events_once() {
        let (runtime, sim) = harness();
        push_states(&sim, &[SessionState::Idle, SessionState::Ready]);
        runtime.synchronize_frame().expect("synchronize ok");

        let mut seen = Vec::new();
        runtime
            .consume_events(&mut |event| seen.push(event.clone()))
            .expect("consume ok");
        assert!(seen.contains(&RuntimeEvent::SessionStateChanged {
            previous: SessionState::Unknown,
            current: SessionState::Idle,
        }));
        assert!(seen.contains(&RuntimeEvent::SessionStateChanged {
            previous: SessionState::Idle,
            current: SessionState::Ready,
        }));

        let mut second = Vec::new();
        runtime
            .consume_events(&mut |event| second.push(event.clone()))
            .expect("consume ok");
        assert!(second.is_empty());
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        assert_eq!(runtime.session_state(), SessionState::Focused);

        push_states(&sim, &[SessionState::Idle]);
        runtime.synchronize_frame().expect("synchronize ok");
        assert_eq!(runtime.session_state(), SessionState::Focused);
    }

    #[test]
    fn loss_pending_rejects_everything_but_recreation() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        push_states(&sim, &[SessionState::LossPending, SessionState::Ready]);
        runtime.synchronize_frame().expect("synchronize ok");
        // The Ready event arrived without an intervening recreation and must
        // have been dropped.
        assert_eq!(runtime.session_state(), SessionState::LossPending);
        assert!(!runtime.ready());
    }

    #[test]
    fn session_loss_recovers_through_recreation() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        push_states(&sim, &[SessionState::LossPending]);
        runtime.synchronize_frame().expect("loss drained");
        assert!(!runtime.ready());

        // Next synchronize performs the recreation and resets the machine.
        runtime.synchronize_frame().expect("recreation ok");
        assert_eq!(runtime.session_state(), SessionState::Unknown);
        assert!(sim.lock().expect("sim lock").session_created());

        push_states(&sim, &[SessionState::Idle, SessionState::Ready]);
        runtime.synchronize_frame().expect("synchronize ok");
        assert!(runtime.ready());
        // The stored manifest was replayed against the new session.
        assert!(sim.lock().expect("sim lock").actions_attached());
    }

    #[test]
    fn repeated_recreation_failure_is_fatal() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        {
            let mut sim = sim.lock().expect("sim lock");
            sim.push_session_state(SessionState::LossPending);
            sim.fail_next_session_creations(MAX_RECREATE_ATTEMPTS);
        }
        runtime.synchronize_frame().expect("loss drained");

        runtime.synchronize_frame().expect("retry 1 tolerated");
        runtime.synchronize_frame().expect("retry 2 tolerated");
        let err = runtime.synchronize_frame().unwrap_err();
        assert!(matches!(err, VrError::InstanceLost));
        assert!(!runtime.ready());

        // Fatal is sticky: every subsequent call fails fast.
        let err = runtime.synchronize_frame().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn stopping_ends_open_frame_and_session() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        assert!(runtime.frame_open());

        push_states(&sim, &[SessionState::Stopping]);
        runtime.synchronize_frame().expect("synchronize ok");
        assert!(!runtime.frame_open());
        assert!(!runtime.ready());
        assert!(!sim.lock().expect("sim lock").session_begun());
    }

    #[test]
    fn render_hint_reaches_the_host() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        assert!(runtime.should_render());
        runtime.end_frame().expect("frame ends");

        sim.lock().expect("sim lock").set_should_render(false);
        runtime.synchronize_frame().expect("synchronize ok");
        assert!(runtime.frame_open());
        assert!(!runtime.should_render());
    }

    #[test]
    fn bound_paths_reflect_installed_bindings() {
        let (runtime, sim) = harness();
        assert!(runtime.bound_paths(Hand::Left).is_empty());
        make_ready(&runtime, &sim);

        let left = runtime.bound_paths(Hand::Left);
        assert!(left.contains(&"/user/hand/left/input/trigger".to_string()));
        assert!(left.contains(&"/user/hand/left/output/haptic".to_string()));
        assert!(left.iter().all(|path| path.starts_with("/user/hand/left/")));

        let right = runtime.bound_paths(Hand::Right);
        assert!(right.contains(&"/user/hand/right/input/trigger".to_string()));
        assert!(right.iter().all(|path| path.starts_with("/user/hand/right/")));
    }

    #[test]
    fn unknown_actions_are_inactive_not_errors() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        assert!(!runtime.is_action_active("nonexistent_action", Hand::Left));
        assert!(!runtime.is_action_active("nonexistent_action", Hand::Right));
    }

    #[test]
    fn action_queries_accept_both_name_forms() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        sim.lock()
            .expect("sim lock")
            .set_scalar("trigger", Hand::Right, 0.75);

        assert!(runtime.is_action_active("trigger", Hand::Right));
        assert!(runtime.is_action_active("/actions/default/in/Trigger", Hand::Right));
        assert!(!runtime.is_action_active("trigger", Hand::Left));
        assert_eq!(runtime.action_scalar("trigger", Hand::Right), 0.75);
    }

    #[test]
    fn stick_axis_zeroed_when_inactive() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        assert_eq!(runtime.stick_axis(Hand::Left), [0.0, 0.0]);

        sim.lock()
            .expect("sim lock")
            .set_axis2("joystick", Hand::Left, [0.25, -0.5]);
        assert_eq!(runtime.stick_axis(Hand::Left), [0.25, -0.5]);
        assert_eq!(runtime.stick_axis(Hand::Right), [0.0, 0.0]);
    }

    #[test]
    fn haptic_parameters_are_clamped_not_rejected() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        sim.lock()
            .expect("sim lock")
            .set_active("haptic", Hand::Left, true);

        runtime
            .trigger_haptic_vibration(0.1, 200.0, 5.0, Hand::Left)
            .expect("haptic ok");
        let sim = sim.lock().expect("sim lock");
        let records = sim.haptics();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amplitude, MAX_HAPTIC_AMPLITUDE);
        assert_eq!(records[0].frequency, 200.0);
        assert_eq!(records[0].duration_ns, 100_000_000);
    }

    #[test]
    fn haptics_on_inactive_hand_are_a_no_op() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        runtime
            .trigger_haptic_vibration(0.1, 100.0, 0.5, Hand::Right)
            .expect("no-op ok");
        assert!(sim.lock().expect("sim lock").haptics().is_empty());
    }

    #[test]
    fn update_input_tolerates_not_ready_and_polls_when_ready() {
        let (runtime, sim) = harness();
        runtime.update_input().expect("quiet before ready");
        assert_eq!(sim.lock().expect("sim lock").sync_count(), 0);

        make_ready(&runtime, &sim);
        runtime.update_input().expect("polls ok");
        assert_eq!(sim.lock().expect("sim lock").sync_count(), 1);
    }

    #[test]
    fn binding_suggestions_skip_profiles_without_matches() {
        let (runtime, sim) = harness();
        make_ready(&runtime, &sim);
        let sim = sim.lock().expect("sim lock");
        // Every supported profile with at least one exposed path got a set.
        let touch = sim
            .suggested_bindings("/interaction_profiles/oculus/touch_controller")
            .expect("touch suggestions present");
        assert!(!touch.is_empty());
        let go = sim
            .suggested_bindings("/interaction_profiles/oculus/go_controller")
            .expect("go suggestions present");
        // The Go exposes no squeeze input and no haptic output.
        assert!(go.len() < touch.len());
    }
}
