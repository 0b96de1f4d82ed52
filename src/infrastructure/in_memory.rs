use crate::domain::event::OrderEvent;
use crate::domain::inventory::{PartId, PartReservation, ReservationState};
use crate::domain::order::{Order, OrderId};
use crate::domain::ports::{ChangeSet, OrderRecord, OrderStore, OrderWrite};
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// One immutable version of the whole store.
///
/// Built from `im` persistent collections, so cloning it for the next commit
/// shares structure with the previous version instead of copying it.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    orders: im::HashMap<OrderId, Order>,
    events: im::HashMap<OrderId, im::Vector<OrderEvent>>,
    reservations: im::OrdMap<(OrderId, PartId), PartReservation>,
}

impl Snapshot {
    fn version_of(&self, order_id: &OrderId) -> u64 {
        self.orders.get(order_id).map_or(0, |order| order.version)
    }

    fn reservations_of(&self, order_id: OrderId) -> Vec<PartReservation> {
        self.reservations
            .range((order_id, PartId::new(""))..)
            .take_while(|((owner, _), _)| *owner == order_id)
            .map(|(_, reservation)| reservation.clone())
            .collect()
    }
}

/// A thread-safe in-memory order store.
///
/// Readers grab the current `Arc<Snapshot>` and work on it without holding
/// any lock; a commit builds the next snapshot and swaps it in. Ideal for
/// tests and the batch CLI where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    current: Arc<RwLock<Arc<Snapshot>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn load(&self, order_id: OrderId) -> Result<Option<OrderRecord>, StoreError> {
        let snapshot = self.snapshot();
        Ok(snapshot.orders.get(&order_id).map(|order| OrderRecord {
            order: order.clone(),
            events: snapshot
                .events
                .get(&order_id)
                .map(|events| events.iter().cloned().collect())
                .unwrap_or_default(),
            reservations: snapshot.reservations_of(order_id),
        }))
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.snapshot().orders.values().cloned().collect())
    }

    async fn events(&self, order_id: OrderId) -> Result<Vec<OrderEvent>, StoreError> {
        Ok(self
            .snapshot()
            .events
            .get(&order_id)
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn pending_releases(&self) -> Result<Vec<PartReservation>, StoreError> {
        Ok(self
            .snapshot()
            .reservations
            .values()
            .filter(|r| r.state == ReservationState::ReleasePending)
            .cloned()
            .collect())
    }

    async fn commit(&self, change: &ChangeSet) -> Result<(), StoreError> {
        let mut current = self.current.write();
        let found = current.version_of(&change.order_id);
        if found != change.expected_version {
            return Err(StoreError::Conflict {
                order_id: change.order_id,
                expected: change.expected_version,
                found,
            });
        }

        let mut next: Snapshot = (**current).clone();
        match &change.order {
            OrderWrite::Put(order) => {
                next.orders.insert(change.order_id, order.clone());
            }
            OrderWrite::Remove => {
                next.orders.remove(&change.order_id);
            }
            OrderWrite::Keep => {}
        }
        if !change.events.is_empty() {
            let log = next.events.entry(change.order_id).or_default();
            log.extend(change.events.iter().cloned());
        }
        for reservation in &change.reservations {
            next.reservations.insert(
                (reservation.order_id, reservation.part_id.clone()),
                reservation.clone(),
            );
        }

        *current = Arc::new(next);
        Ok(())
    }
}
