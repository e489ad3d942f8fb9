//! Per-user busy gate.
//!
//! One turn (live or proactive) per user inside the dispatch critical path.
//! Waiters queue in arrival order; the scheduler uses `try_acquire` and
//! defers instead of waiting. The guard releases on drop, on every exit
//! path. No reentrancy and no global lock: users are independent.

use std::collections::HashMap;
use std::sync::Arc;

use taskwren_schema::UserId;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

#[derive(Clone, Default)]
pub struct SessionGate {
    slots: Arc<Mutex<HashMap<UserId, Arc<Semaphore>>>>,
}

/// Held for the duration of one turn; dropping it reopens the gate.
pub struct GateGuard {
    _permit: OwnedSemaphorePermit,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, user: UserId) -> Arc<Semaphore> {
        let mut slots = self.slots.lock().await;
        slots
            .entry(user)
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    /// Wait for exclusive access to the user's session. Queued waiters are
    /// admitted in FIFO order.
    pub async fn acquire(&self, user: UserId) -> GateGuard {
        let slot = self.slot(user).await;
        let permit = slot
            .acquire_owned()
            .await
            .expect("session gate semaphore closed");
        GateGuard { _permit: permit }
    }

    /// Non-blocking acquire; `None` means a turn is in flight for this user.
    pub async fn try_acquire(&self, user: UserId) -> Option<GateGuard> {
        let slot = self.slot(user).await;
        slot.try_acquire_owned()
            .ok()
            .map(|permit| GateGuard { _permit: permit })
    }

    /// Drop slots nobody currently holds. Periodic housekeeping.
    pub async fn prune(&self) {
        let mut slots = self.slots.lock().await;
        slots.retain(|_, slot| slot.available_permits() < 1);
    }
}
