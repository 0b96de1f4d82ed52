use crate::domain::order::OrderId;
use crate::error::EngineError;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;

type LockTable = DashMap<OrderId, Arc<Mutex<()>>>;

/// Per-order exclusive locks. Distinct orders never contend.
///
/// An entry only lives while someone holds or waits for it, so the table
/// stays as small as the set of orders currently being worked on.
#[derive(Default)]
pub struct OrderLocks {
    locks: Arc<LockTable>,
}

/// Exclusive access to one order; dropping it releases the lock.
pub struct OrderGuard {
    order_id: OrderId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockTable>,
}

impl Drop for OrderGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the table's own handle left: nobody is waiting.
        self.locks
            .remove_if(&self.order_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits at most `budget` for exclusive access to `order_id`.
    pub async fn acquire(
        &self,
        order_id: OrderId,
        budget: Duration,
    ) -> Result<OrderGuard, EngineError> {
        let lock = self.locks.entry(order_id).or_default().clone();
        let acquired = timeout(budget, lock.lock_owned()).await;
        match acquired {
            Ok(guard) => Ok(OrderGuard {
                order_id,
                guard: Some(guard),
                locks: Arc::clone(&self.locks),
            }),
            Err(_) => {
                self.locks
                    .remove_if(&order_id, |_, lock| Arc::strong_count(lock) == 1);
                Err(EngineError::TimeoutExceeded { order_id, budget })
            }
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
