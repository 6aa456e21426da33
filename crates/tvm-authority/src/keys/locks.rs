//! Per-service key locks
//!
//! Issue and validate hold a service's lock shared; rotation holds it
//! exclusively, so no ticket is signed or checked with a key that is being
//! retired mid-operation. Different services never contend.
//!
//! Entries live only while someone holds or waits on them. The last guard
//! to drop removes its entry, so ids taken from unverified tickets do not
//! accumulate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::warn;
use tvm_core::ServiceId;

use crate::error::{AuthorityError, Result};

type LockTable = Arc<Mutex<HashMap<ServiceId, Arc<RwLock<()>>>>>;

/// Lock table keyed by service id
#[derive(Debug, Default)]
pub struct ServiceLocks {
    table: LockTable,
}

/// Held service lock; releases its table entry when it is the last user
pub struct ServiceLockGuard<G> {
    guard: Option<G>,
    id: ServiceId,
    table: LockTable,
}

pub type SharedLockGuard = ServiceLockGuard<OwnedRwLockReadGuard<()>>;
pub type ExclusiveLockGuard = ServiceLockGuard<OwnedRwLockWriteGuard<()>>;

impl<G> Drop for ServiceLockGuard<G> {
    fn drop(&mut self) {
        // Release the RwLock's Arc before checking who else still holds it
        self.guard.take();
        prune(&self.table, self.id);
    }
}

/// Remove `id` if the table holds the only reference to its lock
fn prune(table: &LockTable, id: ServiceId) {
    let mut locks = table.lock().unwrap_or_else(PoisonError::into_inner);
    if locks.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
        locks.remove(&id);
    }
}

impl ServiceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of services with a held or awaited lock
    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_for(&self, id: ServiceId) -> Arc<RwLock<()>> {
        let mut locks = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(id).or_default().clone()
    }

    fn hold<G>(&self, id: ServiceId, guard: G) -> ServiceLockGuard<G> {
        ServiceLockGuard {
            guard: Some(guard),
            id,
            table: self.table.clone(),
        }
    }

    /// Acquire the service's lock for signing or verifying
    pub async fn shared(&self, id: ServiceId, timeout: Duration) -> Result<SharedLockGuard> {
        let acquired = tokio::time::timeout(timeout, self.lock_for(id).read_owned()).await;
        match acquired {
            Ok(guard) => Ok(self.hold(id, guard)),
            Err(_) => {
                prune(&self.table, id);
                warn!(service_id = %id, "Timed out waiting for service key lock");
                Err(AuthorityError::Transient(format!("service {} key lock busy", id)))
            }
        }
    }

    /// Acquire the service's lock for replacing its key
    pub async fn exclusive(&self, id: ServiceId, timeout: Duration) -> Result<ExclusiveLockGuard> {
        let acquired = tokio::time::timeout(timeout, self.lock_for(id).write_owned()).await;
        match acquired {
            Ok(guard) => Ok(self.hold(id, guard)),
            Err(_) => {
                prune(&self.table, id);
                warn!(service_id = %id, "Timed out waiting for exclusive service key lock");
                Err(AuthorityError::Transient(format!("service {} key lock busy", id)))
            }
        }
    }
}
