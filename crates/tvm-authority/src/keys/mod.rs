//! Key lifecycle: per-service key locks and rotation

mod locks;
mod rotation;

pub use locks::{ExclusiveLockGuard, ServiceLockGuard, ServiceLocks, SharedLockGuard};
pub use rotation::KeyRotationManager;
