//! The real OpenXR driver behind [`Compositor`], enabled by the
//! `vr-openxr` feature.
//!
//! Graphics stay host-owned: the host creates the instance with its
//! graphics extension enabled and hands over a session factory built
//! around its own binding, so session recreation after loss works without
//! this module knowing anything about the renderer.

use super::driver::{
    ActionHandle, Compositor, DriverEvent, FrameWait, HandSample, SwapchainDescriptor, ViewSample,
};
use crate::manifest::{ActionKind, ActionManifest};
use crate::runtime::{Fov, Hand, Pose, SessionState, VrError, VrResult};
use openxr as xr;
use std::collections::HashMap;

/// Everything the host's session factory must produce for one session.
pub struct SessionBundle<G: xr::Graphics> {
    pub session: xr::Session<G>,
    pub frame_waiter: xr::FrameWaiter,
    pub frame_stream: xr::FrameStream<G>,
}

pub type SessionFactory<G> =
    Box<dyn FnMut(&xr::Instance, xr::SystemId) -> VrResult<SessionBundle<G>> + Send>;

/// Creates an instance and resolves the HMD system. The caller supplies the
/// entry point and the extension set (with its graphics extension enabled).
pub fn create_instance(
    entry: &xr::Entry,
    app_name: &str,
    extensions: &xr::ExtensionSet,
) -> VrResult<(xr::Instance, xr::SystemId)> {
    let app_info = xr::ApplicationInfo {
        application_name: app_name,
        ..Default::default()
    };
    let instance = entry
        .create_instance(&app_info, extensions, &[])
        .map_err(map_xr_error)?;
    let system = instance
        .system(xr::FormFactor::HEAD_MOUNTED_DISPLAY)
        .map_err(map_xr_error)?;
    Ok((instance, system))
}

enum TypedAction {
    Boolean(xr::Action<bool>),
    Scalar(xr::Action<f32>),
    Axis2(xr::Action<xr::Vector2f>),
    Pose(xr::Action<xr::Posef>),
    Haptic(xr::Action<xr::Haptic>),
}

struct ActiveSession<G: xr::Graphics> {
    session: xr::Session<G>,
    frame_waiter: xr::FrameWaiter,
    frame_stream: xr::FrameStream<G>,
    stage_space: xr::Space,
    view_space: xr::Space,
    // Kept alive for the compositor; images are acquired by the host.
    swapchains: Vec<xr::Swapchain<G>>,
    next_swapchain_handle: u64,
    action_set: Option<xr::ActionSet>,
    actions: HashMap<ActionHandle, TypedAction>,
    next_action_handle: ActionHandle,
    hand_spaces: [Option<xr::Space>; 2],
    pose_handle: Option<ActionHandle>,
    attached: bool,
}

pub struct OpenXrCompositor<G: xr::Graphics>
where
    G::Format: Copy + Send,
{
    instance: xr::Instance,
    system: xr::SystemId,
    factory: SessionFactory<G>,
    swapchain_format: G::Format,
    hand_paths: [xr::Path; 2],
    event_buffer: xr::EventDataBuffer,
    active: Option<ActiveSession<G>>,
}

impl<G: xr::Graphics> OpenXrCompositor<G>
where
    G::Format: Copy + Send,
{
    pub fn new(
        instance: xr::Instance,
        system: xr::SystemId,
        swapchain_format: G::Format,
        factory: SessionFactory<G>,
    ) -> VrResult<Self> {
        let hand_paths = [
            instance
                .string_to_path(Hand::Left.user_path())
                .map_err(map_xr_error)?,
            instance
                .string_to_path(Hand::Right.user_path())
                .map_err(map_xr_error)?,
        ];
        Ok(Self {
            instance,
            system,
            factory,
            swapchain_format,
            hand_paths,
            event_buffer: xr::EventDataBuffer::new(),
            active: None,
        })
    }

    fn active(&self) -> VrResult<&ActiveSession<G>> {
        self.active.as_ref().ok_or(VrError::NotReady)
    }

    fn active_mut(&mut self) -> VrResult<&mut ActiveSession<G>> {
        self.active.as_mut().ok_or(VrError::NotReady)
    }

    fn action(&self, handle: ActionHandle) -> Option<&TypedAction> {
        self.active.as_ref()?.actions.get(&handle)
    }
}

impl<G: xr::Graphics> Compositor for OpenXrCompositor<G>
where
    G: 'static + Send,
    G::Format: Copy + Send,
{
    fn create_session(&mut self) -> VrResult<()> {
        let bundle = (self.factory)(&self.instance, self.system)?;
        let stage_space = bundle
            .session
            .create_reference_space(xr::ReferenceSpaceType::STAGE, identity_posef())
            .map_err(map_xr_error)?;
        let view_space = bundle
            .session
            .create_reference_space(xr::ReferenceSpaceType::VIEW, identity_posef())
            .map_err(map_xr_error)?;
        self.active = Some(ActiveSession {
            session: bundle.session,
            frame_waiter: bundle.frame_waiter,
            frame_stream: bundle.frame_stream,
            stage_space,
            view_space,
            swapchains: Vec::new(),
            next_swapchain_handle: 1,
            action_set: None,
            actions: HashMap::new(),
            next_action_handle: 1,
            hand_spaces: [None, None],
            pose_handle: None,
            attached: false,
        });
        Ok(())
    }

    fn destroy_session(&mut self) {
        // Handles destroy themselves on drop.
        self.active = None;
    }

    fn begin_session(&mut self) -> VrResult<()> {
        self.active()?
            .session
            .begin(xr::ViewConfigurationType::PRIMARY_STEREO)
            .map(|_| ())
            .map_err(map_xr_error)
    }

    fn end_session(&mut self) -> VrResult<()> {
        self.active()?.session.end().map(|_| ()).map_err(map_xr_error)
    }

    fn poll_event(&mut self) -> VrResult<Option<DriverEvent>> {
        loop {
            let Some(event) = self
                .instance
                .poll_event(&mut self.event_buffer)
                .map_err(map_xr_error)?
            else {
                return Ok(None);
            };
            match event {
                xr::Event::SessionStateChanged(changed) => {
                    return Ok(Some(DriverEvent::SessionStateChanged(map_session_state(
                        changed.state(),
                    ))));
                }
                xr::Event::InteractionProfileChanged(_) => {
                    return Ok(Some(DriverEvent::InteractionProfileChanged));
                }
                xr::Event::InstanceLossPending(_) => {
                    return Ok(Some(DriverEvent::InstanceLossPending));
                }
                xr::Event::EventsLost(lost) => {
                    log::warn!("[vr] compositor dropped {} events", lost.lost_event_count());
                }
                _ => {}
            }
        }
    }

    fn recommended_render_target_size(&mut self) -> VrResult<(u32, u32)> {
        let views = self
            .instance
            .enumerate_view_configuration_views(
                self.system,
                xr::ViewConfigurationType::PRIMARY_STEREO,
            )
            .map_err(map_xr_error)?;
        let view = views.first().ok_or(VrError::NotReady)?;
        Ok((
            view.recommended_image_rect_width,
            view.recommended_image_rect_height,
        ))
    }

    fn create_swapchain(&mut self, width: u32, height: u32) -> VrResult<SwapchainDescriptor> {
        let format = self.swapchain_format;
        let active = self.active_mut()?;
        let swapchain = active
            .session
            .create_swapchain(&xr::SwapchainCreateInfo {
                create_flags: xr::SwapchainCreateFlags::EMPTY,
                usage_flags: xr::SwapchainUsageFlags::COLOR_ATTACHMENT
                    | xr::SwapchainUsageFlags::SAMPLED,
                format,
                sample_count: 1,
                width,
                height,
                face_count: 1,
                array_size: 1,
                mip_count: 1,
            })
            .map_err(map_xr_error)?;
        active.swapchains.push(swapchain);
        let handle = active.next_swapchain_handle;
        active.next_swapchain_handle += 1;
        Ok(SwapchainDescriptor {
            handle,
            width,
            height,
        })
    }

    fn wait_frame(&mut self) -> VrResult<FrameWait> {
        let active = self.active_mut()?;
        let state = active.frame_waiter.wait().map_err(map_xr_error)?;
        Ok(FrameWait {
            predicted_display_time: state.predicted_display_time.as_nanos(),
            predicted_display_period: state.predicted_display_period.as_nanos(),
            should_render: state.should_render,
        })
    }

    fn begin_frame(&mut self) -> VrResult<()> {
        self.active_mut()?
            .frame_stream
            .begin()
            .map_err(map_xr_error)
    }

    fn end_frame(&mut self, display_time: i64) -> VrResult<()> {
        // Layer composition is host-owned; an empty submission keeps the
        // frame loop valid until the host wires its layers in.
        self.active_mut()?
            .frame_stream
            .end(
                xr::Time::from_nanos(display_time),
                xr::EnvironmentBlendMode::OPAQUE,
                &[],
            )
            .map_err(map_xr_error)
    }

    fn locate_head(&mut self, display_time: i64) -> VrResult<Option<Pose>> {
        let active = self.active()?;
        let location = active
            .view_space
            .locate(&active.stage_space, xr::Time::from_nanos(display_time))
            .map_err(map_xr_error)?;
        Ok(located_pose(&location))
    }

    fn locate_views(&mut self, display_time: i64) -> VrResult<Option<[ViewSample; 2]>> {
        let active = self.active()?;
        let (flags, views) = active
            .session
            .locate_views(
                xr::ViewConfigurationType::PRIMARY_STEREO,
                xr::Time::from_nanos(display_time),
                &active.stage_space,
            )
            .map_err(map_xr_error)?;
        if !flags.contains(xr::ViewStateFlags::ORIENTATION_VALID) || views.len() < 2 {
            return Ok(None);
        }
        let mut samples = [ViewSample::default(); 2];
        for (sample, view) in samples.iter_mut().zip(views.iter()) {
            sample.pose = convert_pose(&view.pose);
            sample.fov = convert_fov(&view.fov);
        }
        Ok(Some(samples))
    }

    fn locate_hand(&mut self, hand: Hand, display_time: i64) -> VrResult<Option<HandSample>> {
        let active = self.active()?;
        let Some(space) = &active.hand_spaces[hand.index()] else {
            return Ok(None);
        };
        let (location, velocity) = space
            .relate(&active.stage_space, xr::Time::from_nanos(display_time))
            .map_err(map_xr_error)?;
        let Some(pose) = located_pose(&location) else {
            return Ok(None);
        };
        let linear_valid = velocity
            .velocity_flags
            .contains(xr::SpaceVelocityFlags::LINEAR_VALID);
        let angular_valid = velocity
            .velocity_flags
            .contains(xr::SpaceVelocityFlags::ANGULAR_VALID);
        Ok(Some(HandSample {
            pose,
            linear_velocity: if linear_valid {
                convert_vec3(&velocity.linear_velocity)
            } else {
                [0.0; 3]
            },
            angular_velocity: if angular_valid {
                convert_vec3(&velocity.angular_velocity)
            } else {
                [0.0; 3]
            },
            tracked: true,
        }))
    }

    fn create_actions(
        &mut self,
        manifest: &ActionManifest,
    ) -> VrResult<Vec<(String, ActionHandle)>> {
        let set = self
            .instance
            .create_action_set("default", "Default", 0)
            .map_err(map_xr_error)?;
        let hand_paths = self.hand_paths;
        let active = self.active_mut()?;

        let mut created = Vec::with_capacity(manifest.len());
        for descriptor in manifest.actions() {
            let name = descriptor.name.as_str();
            let typed = match descriptor.kind {
                ActionKind::Boolean => TypedAction::Boolean(
                    set.create_action(name, name, &hand_paths)
                        .map_err(map_xr_error)?,
                ),
                ActionKind::Scalar => TypedAction::Scalar(
                    set.create_action(name, name, &hand_paths)
                        .map_err(map_xr_error)?,
                ),
                ActionKind::Axis2 => TypedAction::Axis2(
                    set.create_action(name, name, &hand_paths)
                        .map_err(map_xr_error)?,
                ),
                ActionKind::Pose => TypedAction::Pose(
                    set.create_action(name, name, &hand_paths)
                        .map_err(map_xr_error)?,
                ),
                ActionKind::Haptic => TypedAction::Haptic(
                    set.create_action(name, name, &hand_paths)
                        .map_err(map_xr_error)?,
                ),
            };
            let handle = active.next_action_handle;
            active.next_action_handle += 1;
            if matches!(descriptor.kind, ActionKind::Pose) {
                active.pose_handle = Some(handle);
            }
            active.actions.insert(handle, typed);
            created.push((descriptor.name.clone(), handle));
        }
        active.action_set = Some(set);
        Ok(created)
    }

    fn suggest_bindings(
        &mut self,
        profile: &str,
        bindings: &[(ActionHandle, String)],
    ) -> VrResult<()> {
        let profile_path = self.instance.string_to_path(profile).map_err(map_xr_error)?;
        let mut paths = Vec::with_capacity(bindings.len());
        for (_, path) in bindings {
            paths.push(self.instance.string_to_path(path).map_err(map_xr_error)?);
        }

        let active = self.active()?;
        let mut suggested = Vec::with_capacity(bindings.len());
        for ((handle, _), path) in bindings.iter().zip(paths) {
            let Some(typed) = active.actions.get(handle) else {
                continue;
            };
            match typed {
                TypedAction::Boolean(action) => suggested.push(xr::Binding::new(action, path)),
                TypedAction::Scalar(action) => suggested.push(xr::Binding::new(action, path)),
                TypedAction::Axis2(action) => suggested.push(xr::Binding::new(action, path)),
                TypedAction::Pose(action) => suggested.push(xr::Binding::new(action, path)),
                TypedAction::Haptic(action) => suggested.push(xr::Binding::new(action, path)),
            }
        }
        self.instance
            .suggest_interaction_profile_bindings(profile_path, &suggested)
            .map_err(map_xr_error)
    }

    fn attach_actions(&mut self) -> VrResult<()> {
        let hand_paths = self.hand_paths;
        let active = self.active_mut()?;
        let set = active.action_set.as_ref().ok_or(VrError::ActionsNotInitialized)?;
        active
            .session
            .attach_action_sets(&[set])
            .map_err(map_xr_error)?;
        if let Some(pose_handle) = active.pose_handle {
            if let Some(TypedAction::Pose(action)) = active.actions.get(&pose_handle) {
                for (slot, path) in active.hand_spaces.iter_mut().zip(hand_paths) {
                    let space = action
                        .create_space(active.session.clone(), path, identity_posef())
                        .map_err(map_xr_error)?;
                    *slot = Some(space);
                }
            }
        }
        active.attached = true;
        Ok(())
    }

    fn sync_actions(&mut self) -> VrResult<()> {
        let active = self.active()?;
        let set = active.action_set.as_ref().ok_or(VrError::ActionsNotInitialized)?;
        active
            .session
            .sync_actions(&[xr::ActiveActionSet::new(set)])
            .map_err(map_xr_error)
    }

    fn action_active(&self, handle: ActionHandle, hand: Hand) -> bool {
        let Some(active) = &self.active else {
            return false;
        };
        let path = self.hand_paths[hand.index()];
        match active.actions.get(&handle) {
            Some(TypedAction::Boolean(action)) => action
                .state(&active.session, path)
                .map(|s| s.is_active)
                .unwrap_or(false),
            Some(TypedAction::Scalar(action)) => action
                .state(&active.session, path)
                .map(|s| s.is_active)
                .unwrap_or(false),
            Some(TypedAction::Axis2(action)) => action
                .state(&active.session, path)
                .map(|s| s.is_active)
                .unwrap_or(false),
            Some(TypedAction::Pose(action)) => action
                .is_active(&active.session, path)
                .unwrap_or(false),
            // Output actions have no state; usable once attached.
            Some(TypedAction::Haptic(_)) => active.attached,
            None => false,
        }
    }

    fn action_boolean(&self, handle: ActionHandle, hand: Hand) -> Option<bool> {
        let active = self.active.as_ref()?;
        let path = self.hand_paths[hand.index()];
        match self.action(handle)? {
            TypedAction::Boolean(action) => {
                let state = action.state(&active.session, path).ok()?;
                state.is_active.then_some(state.current_state)
            }
            _ => None,
        }
    }

    fn action_scalar(&self, handle: ActionHandle, hand: Hand) -> Option<f32> {
        let active = self.active.as_ref()?;
        let path = self.hand_paths[hand.index()];
        match self.action(handle)? {
            TypedAction::Scalar(action) => {
                let state = action.state(&active.session, path).ok()?;
                state.is_active.then_some(state.current_state)
            }
            _ => None,
        }
    }

    fn action_axis2(&self, handle: ActionHandle, hand: Hand) -> Option<[f32; 2]> {
        let active = self.active.as_ref()?;
        let path = self.hand_paths[hand.index()];
        match self.action(handle)? {
            TypedAction::Axis2(action) => {
                let state = action.state(&active.session, path).ok()?;
                state
                    .is_active
                    .then_some([state.current_state.x, state.current_state.y])
            }
            _ => None,
        }
    }

    fn apply_haptic(
        &mut self,
        handle: ActionHandle,
        hand: Hand,
        duration_ns: i64,
        frequency: f32,
        amplitude: f32,
    ) -> VrResult<()> {
        let path = self.hand_paths[hand.index()];
        let active = self.active()?;
        let Some(TypedAction::Haptic(action)) = active.actions.get(&handle) else {
            return Ok(());
        };
        let vibration = xr::HapticVibration::new()
            .amplitude(amplitude)
            .frequency(frequency)
            .duration(xr::Duration::from_nanos(duration_ns));
        action
            .apply_feedback(&active.session, path, &vibration)
            .map_err(map_xr_error)
    }
}

fn identity_posef() -> xr::Posef {
    xr::Posef {
        orientation: xr::Quaternionf {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        },
        position: xr::Vector3f {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        },
    }
}

fn located_pose(location: &xr::SpaceLocation) -> Option<Pose> {
    let flags = location.location_flags;
    if !flags.contains(xr::SpaceLocationFlags::POSITION_VALID)
        || !flags.contains(xr::SpaceLocationFlags::ORIENTATION_VALID)
    {
        return None;
    }
    Some(convert_pose(&location.pose))
}

fn convert_pose(pose: &xr::Posef) -> Pose {
    Pose {
        position: [pose.position.x, pose.position.y, pose.position.z],
        orientation: [
            pose.orientation.x,
            pose.orientation.y,
            pose.orientation.z,
            pose.orientation.w,
        ],
    }
}

fn convert_fov(fov: &xr::Fovf) -> Fov {
    Fov {
        angle_left: fov.angle_left,
        angle_right: fov.angle_right,
        angle_up: fov.angle_up,
        angle_down: fov.angle_down,
    }
}

fn convert_vec3(v: &xr::Vector3f) -> [f32; 3] {
    [v.x, v.y, v.z]
}

fn map_session_state(state: xr::SessionState) -> SessionState {
    match state {
        xr::SessionState::IDLE => SessionState::Idle,
        xr::SessionState::READY => SessionState::Ready,
        xr::SessionState::SYNCHRONIZED => SessionState::Synchronized,
        xr::SessionState::VISIBLE => SessionState::Visible,
        xr::SessionState::FOCUSED => SessionState::Focused,
        xr::SessionState::STOPPING => SessionState::Stopping,
        xr::SessionState::LOSS_PENDING => SessionState::LossPending,
        xr::SessionState::EXITING => SessionState::Exiting,
        _ => SessionState::Unknown,
    }
}

fn map_xr_error(err: xr::sys::Result) -> VrError {
    match err {
        xr::sys::Result::SESSION_LOSS_PENDING => VrError::SessionLossPending,
        xr::sys::Result::ERROR_SESSION_NOT_RUNNING | xr::sys::Result::ERROR_SESSION_NOT_READY => {
            VrError::NotReady
        }
        xr::sys::Result::ERROR_INSTANCE_LOST => VrError::InstanceLost,
        other => VrError::Compositor(other.to_string()),
    }
}
