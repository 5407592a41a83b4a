//! The thin seam between the backend's session/frame logic and a concrete
//! compositor. Everything above this trait is vendor-independent and fully
//! testable; implementations translate these calls into one runtime's API.
//!
//! Drivers are injected at construction; there is no process-wide lookup.

use crate::manifest::ActionManifest;
use crate::runtime::{Fov, Hand, Pose, SessionState, VrError, VrResult};
use std::collections::{HashMap, HashSet, VecDeque};

pub type ActionHandle = u64;

/// Raw compositor event, converted by the backend into session transitions
/// and host-visible [`crate::runtime::RuntimeEvent`]s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriverEvent {
    SessionStateChanged(SessionState),
    InteractionProfileChanged,
    InstanceLossPending,
}

/// Result of the compositor's frame wait: the predicted display slot.
#[derive(Debug, Clone, Copy)]
pub struct FrameWait {
    pub predicted_display_time: i64,
    pub predicted_display_period: i64,
    pub should_render: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ViewSample {
    pub pose: Pose,
    pub fov: Fov,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HandSample {
    pub pose: Pose,
    pub linear_velocity: [f32; 3],
    pub angular_velocity: [f32; 3],
    pub tracked: bool,
}

/// Render-target negotiation result; created once per session, destroyed
/// with it. Texture submission stays host-owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDescriptor {
    pub handle: u64,
    pub width: u32,
    pub height: u32,
}

/// Object-safe driver contract for one vendor compositor.
///
/// The frame wait is the only call allowed to block for more than a bounded
/// bookkeeping interval; it is bounded by the compositor's frame cadence and
/// must abort with a recoverable error once the session leaves the running
/// states.
pub trait Compositor: Send {
    fn create_session(&mut self) -> VrResult<()>;
    fn destroy_session(&mut self);
    fn begin_session(&mut self) -> VrResult<()>;
    fn end_session(&mut self) -> VrResult<()>;

    fn poll_event(&mut self) -> VrResult<Option<DriverEvent>>;

    fn recommended_render_target_size(&mut self) -> VrResult<(u32, u32)>;
    fn create_swapchain(&mut self, width: u32, height: u32) -> VrResult<SwapchainDescriptor>;

    fn wait_frame(&mut self) -> VrResult<FrameWait>;
    fn begin_frame(&mut self) -> VrResult<()>;
    fn end_frame(&mut self, display_time: i64) -> VrResult<()>;

    fn locate_head(&mut self, display_time: i64) -> VrResult<Option<Pose>>;
    fn locate_views(&mut self, display_time: i64) -> VrResult<Option<[ViewSample; 2]>>;
    fn locate_hand(&mut self, hand: Hand, display_time: i64) -> VrResult<Option<HandSample>>;

    /// Creates one runtime action per manifest entry, returning short action
    /// names with their handles.
    fn create_actions(&mut self, manifest: &ActionManifest)
        -> VrResult<Vec<(String, ActionHandle)>>;
    fn suggest_bindings(
        &mut self,
        profile: &str,
        bindings: &[(ActionHandle, String)],
    ) -> VrResult<()>;
    fn attach_actions(&mut self) -> VrResult<()>;
    fn sync_actions(&mut self) -> VrResult<()>;

    fn action_active(&self, handle: ActionHandle, hand: Hand) -> bool;
    fn action_boolean(&self, handle: ActionHandle, hand: Hand) -> Option<bool>;
    fn action_scalar(&self, handle: ActionHandle, hand: Hand) -> Option<f32>;
    fn action_axis2(&self, handle: ActionHandle, hand: Hand) -> Option<[f32; 2]>;

    fn apply_haptic(
        &mut self,
        handle: ActionHandle,
        hand: Hand,
        duration_ns: i64,
        frequency: f32,
        amplitude: f32,
    ) -> VrResult<()>;
}

/// Shared-handle driver: lets the constructing host (or a test) keep a
/// handle to the compositor after the backend takes ownership.
impl<C: Compositor> Compositor for std::sync::Arc<std::sync::Mutex<C>> {
    fn create_session(&mut self) -> VrResult<()> {
        self.lock().expect("compositor mutex should not poison").create_session()
    }

    fn destroy_session(&mut self) {
        self.lock().expect("compositor mutex should not poison").destroy_session()
    }

    fn begin_session(&mut self) -> VrResult<()> {
        self.lock().expect("compositor mutex should not poison").begin_session()
    }

    fn end_session(&mut self) -> VrResult<()> {
        self.lock().expect("compositor mutex should not poison").end_session()
    }

    fn poll_event(&mut self) -> VrResult<Option<DriverEvent>> {
        self.lock().expect("compositor mutex should not poison").poll_event()
    }

    fn recommended_render_target_size(&mut self) -> VrResult<(u32, u32)> {
        self.lock()
            .expect("compositor mutex should not poison")
            .recommended_render_target_size()
    }

    fn create_swapchain(&mut self, width: u32, height: u32) -> VrResult<SwapchainDescriptor> {
        self.lock()
            .expect("compositor mutex should not poison")
            .create_swapchain(width, height)
    }

    fn wait_frame(&mut self) -> VrResult<FrameWait> {
        self.lock().expect("compositor mutex should not poison").wait_frame()
    }

    fn begin_frame(&mut self) -> VrResult<()> {
        self.lock().expect("compositor mutex should not poison").begin_frame()
    }

    fn end_frame(&mut self, display_time: i64) -> VrResult<()> {
        self.lock()
            .expect("compositor mutex should not poison")
            .end_frame(display_time)
    }

    fn locate_head(&mut self, display_time: i64) -> VrResult<Option<Pose>> {
        self.lock()
            .expect("compositor mutex should not poison")
            .locate_head(display_time)
    }

    fn locate_views(&mut self, display_time: i64) -> VrResult<Option<[ViewSample; 2]>> {
        self.lock()
            .expect("compositor mutex should not poison")
            .locate_views(display_time)
    }

    fn locate_hand(&mut self, hand: Hand, display_time: i64) -> VrResult<Option<HandSample>> {
        self.lock()
            .expect("compositor mutex should not poison")
            .locate_hand(hand, display_time)
    }

    fn create_actions(
        &mut self,
        manifest: &ActionManifest,
    ) -> VrResult<Vec<(String, ActionHandle)>> {
        self.lock()
            .expect("compositor mutex should not poison")
            .create_actions(manifest)
    }

    fn suggest_bindings(
        &mut self,
        profile: &str,
        bindings: &[(ActionHandle, String)],
    ) -> VrResult<()> {
        self.lock()
            .expect("compositor mutex should not poison")
            .suggest_bindings(profile, bindings)
    }

    fn attach_actions(&mut self) -> VrResult<()> {
        self.lock().expect("compositor mutex should not poison").attach_actions()
    }

    fn sync_actions(&mut self) -> VrResult<()> {
        self.lock().expect("compositor mutex should not poison").sync_actions()
    }

    fn action_active(&self, handle: ActionHandle, hand: Hand) -> bool {
        self.lock()
            .expect("compositor mutex should not poison")
            .action_active(handle, hand)
    }

    fn action_boolean(&self, handle: ActionHandle, hand: Hand) -> Option<bool> {
        self.lock()
            .expect("compositor mutex should not poison")
            .action_boolean(handle, hand)
    }

    fn action_scalar(&self, handle: ActionHandle, hand: Hand) -> Option<f32> {
        self.lock()
            .expect("compositor mutex should not poison")
            .action_scalar(handle, hand)
    }

    fn action_axis2(&self, handle: ActionHandle, hand: Hand) -> Option<[f32; 2]> {
        self.lock()
            .expect("compositor mutex should not poison")
            .action_axis2(handle, hand)
    }

    fn apply_haptic(
        &mut self,
        handle: ActionHandle,
        hand: Hand,
        duration_ns: i64,
        frequency: f32,
        amplitude: f32,
    ) -> VrResult<()> {
        self.lock()
            .expect("compositor mutex should not poison")
            .apply_haptic(handle, hand, duration_ns, frequency, amplitude)
    }
}

/// A haptic command as received by the simulated compositor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HapticRecord {
    pub handle: ActionHandle,
    pub hand: Hand,
    pub duration_ns: i64,
    pub frequency: f32,
    pub amplitude: f32,
}

const SIM_DISPLAY_PERIOD_NS: i64 = 11_111_111; // ~90 Hz

/// In-process compositor with scriptable events and input, for hosts
/// running without a headset and for the test suite.
pub struct SimulatedCompositor {
    session_created: bool,
    session_begun: bool,
    create_failures_remaining: u32,
    events: VecDeque<DriverEvent>,
    should_render: bool,
    next_display_time: i64,
    recommended_size: (u32, u32),
    next_swapchain_handle: u64,
    head: Option<Pose>,
    views: Option<[ViewSample; 2]>,
    hands: [Option<HandSample>; 2],
    actions: HashMap<ActionHandle, String>,
    next_action_handle: ActionHandle,
    scalars: HashMap<(ActionHandle, usize), f32>,
    booleans: HashMap<(ActionHandle, usize), bool>,
    axes: HashMap<(ActionHandle, usize), [f32; 2]>,
    active: HashSet<(ActionHandle, usize)>,
    suggested: HashMap<String, Vec<(ActionHandle, String)>>,
    attached: bool,
    sync_count: u64,
    haptics: Vec<HapticRecord>,
}

impl Default for SimulatedCompositor {
    fn default() -> Self {
        Self {
            session_created: false,
            session_begun: false,
            create_failures_remaining: 0,
            events: VecDeque::new(),
            should_render: true,
            next_display_time: 0,
            recommended_size: (1440, 1600),
            next_swapchain_handle: 1,
            head: None,
            views: None,
            hands: [None, None],
            actions: HashMap::new(),
            next_action_handle: 1,
            scalars: HashMap::new(),
            booleans: HashMap::new(),
            axes: HashMap::new(),
            active: HashSet::new(),
            suggested: HashMap::new(),
            attached: false,
            sync_count: 0,
            haptics: Vec::new(),
        }
    }
}

impl SimulatedCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&mut self, event: DriverEvent) {
        self.events.push_back(event);
    }

    pub fn push_session_state(&mut self, state: SessionState) {
        self.push_event(DriverEvent::SessionStateChanged(state));
    }

    /// Makes the next `count` session creations fail, to script loss
    /// recovery.
    pub fn fail_next_session_creations(&mut self, count: u32) {
        self.create_failures_remaining = count;
    }

    pub fn set_should_render(&mut self, should_render: bool) {
        self.should_render = should_render;
    }

    pub fn set_recommended_size(&mut self, width: u32, height: u32) {
        self.recommended_size = (width, height);
    }

    pub fn set_head_pose(&mut self, pose: Option<Pose>) {
        self.head = pose;
    }

    pub fn set_views(&mut self, views: Option<[ViewSample; 2]>) {
        self.views = views;
    }

    pub fn set_hand_sample(&mut self, hand: Hand, sample: Option<HandSample>) {
        self.hands[hand.index()] = sample;
    }

    pub fn handle_of(&self, name: &str) -> Option<ActionHandle> {
        self.actions
            .iter()
            .find(|(_, action)| action.as_str() == name)
            .map(|(handle, _)| *handle)
    }

    pub fn set_active(&mut self, name: &str, hand: Hand, active: bool) {
        if let Some(handle) = self.handle_of(name) {
            if active {
                self.active.insert((handle, hand.index()));
            } else {
                self.active.remove(&(handle, hand.index()));
            }
        }
    }

    pub fn set_scalar(&mut self, name: &str, hand: Hand, value: f32) {
        if let Some(handle) = self.handle_of(name) {
            self.scalars.insert((handle, hand.index()), value);
            self.active.insert((handle, hand.index()));
        }
    }

    pub fn set_boolean(&mut self, name: &str, hand: Hand, value: bool) {
        if let Some(handle) = self.handle_of(name) {
            self.booleans.insert((handle, hand.index()), value);
            self.active.insert((handle, hand.index()));
        }
    }

    pub fn set_axis2(&mut self, name: &str, hand: Hand, value: [f32; 2]) {
        if let Some(handle) = self.handle_of(name) {
            self.axes.insert((handle, hand.index()), value);
            self.active.insert((handle, hand.index()));
        }
    }

    pub fn session_created(&self) -> bool {
        self.session_created
    }

    pub fn session_begun(&self) -> bool {
        self.session_begun
    }

    pub fn sync_count(&self) -> u64 {
        self.sync_count
    }

    pub fn haptics(&self) -> &[HapticRecord] {
        &self.haptics
    }

    pub fn suggested_bindings(&self, profile: &str) -> Option<&[(ActionHandle, String)]> {
        self.suggested.get(profile).map(Vec::as_slice)
    }

    pub fn actions_attached(&self) -> bool {
        self.attached
    }
}

impl Compositor for SimulatedCompositor {
    fn create_session(&mut self) -> VrResult<()> {
        if self.create_failures_remaining > 0 {
            self.create_failures_remaining -= 1;
            return Err(VrError::Compositor(
                "simulated session creation failure".into(),
            ));
        }
        self.session_created = true;
        Ok(())
    }

    fn destroy_session(&mut self) {
        self.session_created = false;
        self.session_begun = false;
        self.attached = false;
        self.actions.clear();
        self.suggested.clear();
    }

    fn begin_session(&mut self) -> VrResult<()> {
        if !self.session_created {
            return Err(VrError::NotReady);
        }
        self.session_begun = true;
        Ok(())
    }

    fn end_session(&mut self) -> VrResult<()> {
        self.session_begun = false;
        Ok(())
    }

    fn poll_event(&mut self) -> VrResult<Option<DriverEvent>> {
        Ok(self.events.pop_front())
    }

    fn recommended_render_target_size(&mut self) -> VrResult<(u32, u32)> {
        Ok(self.recommended_size)
    }

    fn create_swapchain(&mut self, width: u32, height: u32) -> VrResult<SwapchainDescriptor> {
        if !self.session_created {
            return Err(VrError::NotReady);
        }
        let handle = self.next_swapchain_handle;
        self.next_swapchain_handle += 1;
        Ok(SwapchainDescriptor {
            handle,
            width,
            height,
        })
    }

    fn wait_frame(&mut self) -> VrResult<FrameWait> {
        if !self.session_begun {
            // A real compositor aborts the wait once the session stops.
            return Err(VrError::NotReady);
        }
        self.next_display_time += SIM_DISPLAY_PERIOD_NS;
        Ok(FrameWait {
            predicted_display_time: self.next_display_time,
            predicted_display_period: SIM_DISPLAY_PERIOD_NS,
            should_render: self.should_render,
        })
    }

    fn begin_frame(&mut self) -> VrResult<()> {
        if !self.session_begun {
            return Err(VrError::NotReady);
        }
        Ok(())
    }

    fn end_frame(&mut self, _display_time: i64) -> VrResult<()> {
        if !self.session_begun {
            return Err(VrError::NotReady);
        }
        Ok(())
    }

    fn locate_head(&mut self, _display_time: i64) -> VrResult<Option<Pose>> {
        Ok(self.head)
    }

    fn locate_views(&mut self, _display_time: i64) -> VrResult<Option<[ViewSample; 2]>> {
        Ok(self.views)
    }

    fn locate_hand(&mut self, hand: Hand, _display_time: i64) -> VrResult<Option<HandSample>> {
        Ok(self.hands[hand.index()])
    }

    fn create_actions(
        &mut self,
        manifest: &ActionManifest,
    ) -> VrResult<Vec<(String, ActionHandle)>> {
        let mut created = Vec::with_capacity(manifest.len());
        for descriptor in manifest.actions() {
            let handle = self.next_action_handle;
            self.next_action_handle += 1;
            self.actions.insert(handle, descriptor.name.clone());
            created.push((descriptor.name.clone(), handle));
        }
        Ok(created)
    }

    fn suggest_bindings(
        &mut self,
        profile: &str,
        bindings: &[(ActionHandle, String)],
    ) -> VrResult<()> {
        self.suggested.insert(profile.to_string(), bindings.to_vec());
        Ok(())
    }

    fn attach_actions(&mut self) -> VrResult<()> {
        self.attached = true;
        Ok(())
    }

    fn sync_actions(&mut self) -> VrResult<()> {
        if !self.session_begun {
            return Err(VrError::NotReady);
        }
        self.sync_count += 1;
        Ok(())
    }

    fn action_active(&self, handle: ActionHandle, hand: Hand) -> bool {
        self.active.contains(&(handle, hand.index()))
    }

    fn action_boolean(&self, handle: ActionHandle, hand: Hand) -> Option<bool> {
        if !self.action_active(handle, hand) {
            return None;
        }
        self.booleans.get(&(handle, hand.index())).copied()
    }

    fn action_scalar(&self, handle: ActionHandle, hand: Hand) -> Option<f32> {
        if !self.action_active(handle, hand) {
            return None;
        }
        self.scalars.get(&(handle, hand.index())).copied()
    }

    fn action_axis2(&self, handle: ActionHandle, hand: Hand) -> Option<[f32; 2]> {
        if !self.action_active(handle, hand) {
            return None;
        }
        self.axes.get(&(handle, hand.index())).copied()
    }

    fn apply_haptic(
        &mut self,
        handle: ActionHandle,
        hand: Hand,
        duration_ns: i64,
        frequency: f32,
        amplitude: f32,
    ) -> VrResult<()> {
        if !self.session_begun {
            return Err(VrError::NotReady);
        }
        self.haptics.push(HapticRecord {
            handle,
            hand,
            duration_ns,
            frequency,
            amplitude,
        });
        Ok(())
    }
}
