use super::billing::{Amount, ChargeId};
use super::event::OrderEvent;
use super::inventory::{PartId, PartReservation};
use super::order::{Order, OrderId};
use crate::error::{CollaboratorError, StoreError};
use async_trait::async_trait;
use std::sync::Arc;

/// Everything the store knows about one order, read from a single snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub order: Order,
    pub events: Vec<OrderEvent>,
    pub reservations: Vec<PartReservation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderWrite {
    Put(Order),
    Remove,
    Keep,
}

/// One atomic write against the store.
///
/// The store applies it only if the order's current version equals
/// `expected_version` (0 for an order that does not exist yet).
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub order_id: OrderId,
    pub expected_version: u64,
    pub order: OrderWrite,
    pub events: Vec<OrderEvent>,
    /// Reservations to insert or overwrite, keyed by `(order_id, part_id)`.
    pub reservations: Vec<PartReservation>,
}

impl ChangeSet {
    pub fn new(order_id: OrderId, expected_version: u64) -> Self {
        Self {
            order_id,
            expected_version,
            order: OrderWrite::Keep,
            events: Vec::new(),
            reservations: Vec::new(),
        }
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn load(&self, order_id: OrderId) -> Result<Option<OrderRecord>, StoreError>;
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError>;
    /// The full event log, kept even after the order record is deleted.
    async fn events(&self, order_id: OrderId) -> Result<Vec<OrderEvent>, StoreError>;
    async fn pending_releases(&self) -> Result<Vec<PartReservation>, StoreError>;
    async fn commit(&self, change: &ChangeSet) -> Result<(), StoreError>;
}

#[async_trait]
pub trait InventoryLedger: Send + Sync {
    async fn reserve(
        &self,
        order_id: OrderId,
        part_id: &PartId,
        quantity: u32,
    ) -> Result<(), CollaboratorError>;

    /// Consumes every listed reservation, all or nothing.
    async fn finalize(
        &self,
        order_id: OrderId,
        reservations: &[PartReservation],
    ) -> Result<(), CollaboratorError>;

    async fn release(
        &self,
        order_id: OrderId,
        part_id: &PartId,
        quantity: u32,
    ) -> Result<(), CollaboratorError>;

    /// Compensation for a `finalize` whose transition was later rolled back:
    /// the consumed units are held for the order again.
    async fn restore(
        &self,
        order_id: OrderId,
        reservations: &[PartReservation],
    ) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait BillingCollaborator: Send + Sync {
    async fn create_charge(
        &self,
        order_id: OrderId,
        amount: Amount,
    ) -> Result<ChargeId, CollaboratorError>;
    async fn mark_paid(&self, charge_id: &ChargeId) -> Result<(), CollaboratorError>;
    /// Compensation for a charge created by a transition that was later rolled back.
    async fn void_charge(&self, charge_id: &ChargeId) -> Result<(), CollaboratorError>;
    /// Compensation for a `mark_paid` whose transition was later rolled back;
    /// the charge goes back to pending.
    async fn refund_charge(&self, charge_id: &ChargeId) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn publish(&self, event: OrderEvent) -> Result<(), CollaboratorError>;
}

pub type OrderStoreBox = Box<dyn OrderStore>;
pub type InventoryLedgerBox = Box<dyn InventoryLedger>;
pub type BillingCollaboratorBox = Box<dyn BillingCollaborator>;
pub type NotificationDispatcherRef = Arc<dyn NotificationDispatcher>;
