use std::sync::{Arc, Mutex};
use vr_host::openxr::{HandSample, SimulatedCompositor, ViewSample};
use vr_host::{
    create_runtime, Hand, OpenXrRuntime, Pose, RuntimeEvent, RuntimeKind, SessionState,
    SynchronizeStage, VrError, VrRuntime,
};

const MANIFEST: &str = r#"{ "actions": [
    { "name": "/actions/default/in/Pose", "type": "pose" },
    { "name": "/actions/default/in/Trigger", "type": "vector1" },
    { "name": "/actions/default/in/Joystick", "type": "vector2" },
    { "name": "/actions/default/out/Haptic", "type": "vibration" }
] }"#;

type SharedSim = Arc<Mutex<SimulatedCompositor>>;

fn boot() -> (OpenXrRuntime, SharedSim) {
    let _ = env_logger::builder().is_test(true).try_init();
    let sim: SharedSim = Arc::new(Mutex::new(SimulatedCompositor::new()));
    let runtime = OpenXrRuntime::new(Box::new(Arc::clone(&sim))).expect("session creates");
    runtime.initialize_actions(MANIFEST).expect("manifest ok");
    {
        let mut sim = sim.lock().expect("sim lock");
        for state in [
            SessionState::Idle,
            SessionState::Ready,
            SessionState::Synchronized,
            SessionState::Visible,
            SessionState::Focused,
        ] {
            sim.push_session_state(state);
        }
        sim.set_head_pose(Some(Pose::default()));
        sim.set_views(Some([ViewSample::default(); 2]));
        sim.set_hand_sample(
            Hand::Left,
            Some(HandSample {
                tracked: true,
                ..HandSample::default()
            }),
        );
        sim.set_hand_sample(
            Hand::Right,
            Some(HandSample {
                tracked: true,
                ..HandSample::default()
            }),
        );
    }
    (runtime, sim)
}

#[test]
fn host_frame_loop_runs_for_many_frames() {
    let (runtime, sim) = boot();
    assert_eq!(runtime.synchronize_stage(), SynchronizeStage::Early);

    for _ in 0..120 {
        runtime.synchronize_frame().expect("synchronize");
        assert!(runtime.ready());
        assert!(runtime.frame_open());
        assert!(runtime.should_render());
        runtime.update_poses().expect("poses");
        runtime.update_matrices(0.1, 1000.0).expect("matrices");
        runtime.update_input().expect("input");
        runtime.end_frame().expect("end frame");
        assert!(!runtime.frame_open());
    }
    assert_eq!(sim.lock().expect("sim lock").sync_count(), 120);
}

#[test]
fn frame_protocol_is_enforced_across_the_public_surface() {
    let (runtime, _sim) = boot();
    runtime.synchronize_frame().expect("synchronize");

    // A frame is open: opening another one is refused, poses then matrices
    // must happen in order, and a second end is refused.
    assert!(matches!(
        runtime.begin_frame().unwrap_err(),
        VrError::FrameAlreadyBegun
    ));
    assert!(matches!(
        runtime.update_matrices(0.1, 1000.0).unwrap_err(),
        VrError::PosesNotLocated
    ));
    runtime.update_poses().expect("poses");
    runtime.update_matrices(0.1, 1000.0).expect("matrices");
    runtime.end_frame().expect("end frame");
    assert!(matches!(
        runtime.end_frame().unwrap_err(),
        VrError::FrameNotBegun
    ));
}

#[test]
fn session_events_reach_the_host_exactly_once() {
    let (runtime, sim) = boot();
    runtime.synchronize_frame().expect("synchronize");

    let mut transitions = Vec::new();
    runtime
        .consume_events(&mut |event| {
            if let RuntimeEvent::SessionStateChanged { current, .. } = event {
                transitions.push(*current);
            }
        })
        .expect("consume");
    assert_eq!(
        transitions,
        vec![
            SessionState::Idle,
            SessionState::Ready,
            SessionState::Synchronized,
            SessionState::Visible,
            SessionState::Focused,
        ]
    );

    let mut again = 0;
    runtime.consume_events(&mut |_| again += 1).expect("consume");
    assert_eq!(again, 0);

    // The stop branch tears the frame down and stops reporting ready.
    sim.lock()
        .expect("sim lock")
        .push_session_state(SessionState::Stopping);
    runtime.synchronize_frame().expect("synchronize");
    assert!(!runtime.ready());
    assert!(!runtime.frame_open());
}

#[test]
fn runtime_factory_builds_both_backends() {
    let null = create_runtime(RuntimeKind::Null, None).expect("null runtime");
    assert_eq!(null.kind(), RuntimeKind::Null);
    assert!(!null.ready());

    let sim = SimulatedCompositor::new();
    let openxr = create_runtime(RuntimeKind::OpenXr, Some(Box::new(sim))).expect("openxr runtime");
    assert_eq!(openxr.kind(), RuntimeKind::OpenXr);
    assert_eq!(openxr.name(), "OpenXR");

    assert!(create_runtime(RuntimeKind::OpenXr, None).is_err());
}
