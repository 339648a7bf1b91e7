//! Process-wide [`TracingSystem`] slot.
//!
//! Multiple first-requests may race to initialize tracing; the slot is
//! installed at most once, with an uncontended read fast path and a
//! re-check under the write lock. The installed system stays in place for
//! the life of the process unless [`reset_tracing_system`] is called from
//! test code.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::system::{TracerSource, TracingSystem};

type Slot = RwLock<Option<Arc<TracingSystem>>>;

static GLOBAL_TRACING_SYSTEM: OnceLock<Slot> = OnceLock::new();

fn global_slot() -> &'static Slot {
    GLOBAL_TRACING_SYSTEM.get_or_init(|| RwLock::new(None))
}

/// Returns the installed system, if any.
pub fn installed_tracing_system() -> Option<Arc<TracingSystem>> {
    global_slot()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Install `system` as the process-wide default.
///
/// The first install wins: if a system is already in place it is returned
/// unchanged and `system` is dropped.
pub fn install_tracing_system(system: Arc<TracingSystem>) -> Arc<TracingSystem> {
    if let Some(installed) = installed_tracing_system() {
        return installed;
    }
    let mut slot = global_slot()
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(installed) = slot.as_ref() {
        return installed.clone();
    }
    *slot = Some(system.clone());
    system
}

/// Build a [`TracingSystem`] from `source` and install it, at most once.
///
/// The source is only consulted if no system is installed yet, so a
/// [`TracerSource::Factory`] constructor runs at most once per process no
/// matter how many callers race here.
pub fn init_tracing(source: TracerSource) -> Arc<TracingSystem> {
    if let Some(installed) = installed_tracing_system() {
        return installed;
    }
    let mut slot = global_slot()
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(installed) = slot.as_ref() {
        return installed.clone();
    }
    let system = Arc::new(TracingSystem::new(source));
    *slot = Some(system.clone());
    system
}

/// Clear the installed system.
///
/// Test support only: production code must never reset the slot.
pub fn reset_tracing_system() {
    global_slot()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
}
