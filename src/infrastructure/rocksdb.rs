use crate::domain::event::OrderEvent;
use crate::domain::inventory::{PartReservation, ReservationState};
use crate::domain::order::{Order, OrderId};
use crate::domain::ports::{ChangeSet, OrderRecord, OrderStore, OrderWrite};
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options,
    SnapshotWithThreadMode, WriteBatch,
};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Column Family for the current state of each order.
pub const CF_ORDERS: &str = "orders";
/// Column Family for the event logs, keyed by `(order_id, sequence)`.
pub const CF_ORDER_EVENTS: &str = "order_events";
/// Column Family for part reservations, keyed by `(order_id, part_id)`.
pub const CF_PART_RESERVATIONS: &str = "part_reservations";

/// A persistent order store using RocksDB.
///
/// Each table lives in its own Column Family with JSON values. A commit is
/// one `WriteBatch`, so order, events and reservations land atomically.
/// Reads go through a DB snapshot and never observe half of a commit.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    /// Serializes the version check with the batch write.
    commit_lock: Arc<Mutex<()>>,
}

type DbSnapshot<'a> = SnapshotWithThreadMode<'a, DB>;

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path`, creating the missing
    /// column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_ORDERS, CF_ORDER_EVENTS, CF_PART_RESERVATIONS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Corrupt(format!("column family '{name}' not found")))
    }

    fn read_order(
        &self,
        snapshot: &DbSnapshot<'_>,
        order_id: OrderId,
    ) -> Result<Option<Order>, StoreError> {
        let cf = self.cf(CF_ORDERS)?;
        snapshot
            .get_cf(cf, order_id.as_bytes())?
            .map(|bytes| serde_json::from_slice(&bytes))
            .transpose()
            .map_err(StoreError::from)
    }

    /// Every value of `family` whose key starts with the order's id.
    fn read_prefixed<T: DeserializeOwned>(
        &self,
        snapshot: &DbSnapshot<'_>,
        family: &'static str,
        order_id: OrderId,
    ) -> Result<Vec<T>, StoreError> {
        let cf = self.cf(family)?;
        let prefix: &[u8] = order_id.as_bytes();
        let mut values = Vec::new();
        for item in snapshot.iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn read_all<T: DeserializeOwned>(&self, family: &'static str) -> Result<Vec<T>, StoreError> {
        let cf = self.cf(family)?;
        let snapshot = self.db.snapshot();
        let mut values = Vec::new();
        for item in snapshot.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }
}

fn event_key(event: &OrderEvent) -> Vec<u8> {
    let mut key = event.order_id.as_bytes().to_vec();
    key.extend_from_slice(&event.sequence.to_be_bytes());
    key
}

fn reservation_key(reservation: &PartReservation) -> Vec<u8> {
    let mut key = reservation.order_id.as_bytes().to_vec();
    key.extend_from_slice(reservation.part_id.as_str().as_bytes());
    key
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn load(&self, order_id: OrderId) -> Result<Option<OrderRecord>, StoreError> {
        let snapshot = self.db.snapshot();
        let Some(order) = self.read_order(&snapshot, order_id)? else {
            return Ok(None);
        };
        Ok(Some(OrderRecord {
            order,
            events: self.read_prefixed(&snapshot, CF_ORDER_EVENTS, order_id)?,
            reservations: self.read_prefixed(&snapshot, CF_PART_RESERVATIONS, order_id)?,
        }))
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        self.read_all(CF_ORDERS)
    }

    async fn events(&self, order_id: OrderId) -> Result<Vec<OrderEvent>, StoreError> {
        let snapshot = self.db.snapshot();
        self.read_prefixed(&snapshot, CF_ORDER_EVENTS, order_id)
    }

    async fn pending_releases(&self) -> Result<Vec<PartReservation>, StoreError> {
        let reservations: Vec<PartReservation> = self.read_all(CF_PART_RESERVATIONS)?;
        Ok(reservations
            .into_iter()
            .filter(|r| r.state == ReservationState::ReleasePending)
            .collect())
    }

    async fn commit(&self, change: &ChangeSet) -> Result<(), StoreError> {
        let orders = self.cf(CF_ORDERS)?;
        let events = self.cf(CF_ORDER_EVENTS)?;
        let reservations = self.cf(CF_PART_RESERVATIONS)?;

        let _guard = self.commit_lock.lock();
        let found = self
            .read_order(&self.db.snapshot(), change.order_id)?
            .map_or(0, |order| order.version);
        if found != change.expected_version {
            return Err(StoreError::Conflict {
                order_id: change.order_id,
                expected: change.expected_version,
                found,
            });
        }

        let mut batch = WriteBatch::default();
        match &change.order {
            OrderWrite::Put(order) => {
                batch.put_cf(orders, change.order_id.as_bytes(), serde_json::to_vec(order)?)
            }
            OrderWrite::Remove => batch.delete_cf(orders, change.order_id.as_bytes()),
            OrderWrite::Keep => {}
        }
        for event in &change.events {
            batch.put_cf(events, event_key(event), serde_json::to_vec(event)?);
        }
        for reservation in &change.reservations {
            batch.put_cf(
                reservations,
                reservation_key(reservation),
                serde_json::to_vec(reservation)?,
            );
        }
        self.db.write(batch)?;
        Ok(())
    }
}
