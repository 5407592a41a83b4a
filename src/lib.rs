pub mod bindings;
pub mod frame;
pub mod manifest;
pub mod math;
pub mod openxr;
pub mod runtime;

pub use runtime::{
    Fov, Hand, HandState, Pose, RuntimeEvent, RuntimeKind, SessionState, SynchronizeStage,
    VrError, VrResult, VrRuntime,
};

pub use openxr::OpenXrRuntime;

use std::sync::Arc;

/// Builds the backend for `kind`, falling back to the inert runtime for
/// hosts running without VR support.
pub fn create_runtime(
    kind: RuntimeKind,
    driver: Option<Box<dyn openxr::Compositor>>,
) -> VrResult<Arc<dyn VrRuntime>> {
    match kind {
        RuntimeKind::Null => Ok(Arc::new(runtime::NullRuntime)),
        RuntimeKind::OpenXr => {
            let driver = driver
                .ok_or_else(|| VrError::Compositor("no compositor driver supplied".into()))?;
            Ok(Arc::new(OpenXrRuntime::new(driver)?))
        }
    }
}
