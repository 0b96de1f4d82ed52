//! In-process implementations of the inventory, billing and notification
//! collaborators, used by the batch CLI and the test suites.

use crate::domain::billing::{Amount, Charge, ChargeId, ChargeStatus};
use crate::domain::event::OrderEvent;
use crate::domain::inventory::{PartId, PartReservation};
use crate::domain::order::OrderId;
use crate::domain::ports::{BillingCollaborator, InventoryLedger, NotificationDispatcher};
use crate::error::CollaboratorError;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::info;

const BILLING: &str = "billing";
const NOTIFICATIONS: &str = "notifications";

#[derive(Debug, Default)]
struct Stock {
    on_hand: HashMap<PartId, u32>,
    held: HashMap<(OrderId, PartId), u32>,
}

/// Stock ledger that moves units between "on hand" and "held for an order".
#[derive(Debug, Default, Clone)]
pub struct InMemoryInventory {
    stock: Arc<Mutex<Stock>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stock(self, part_id: PartId, quantity: u32) -> Self {
        self.add_stock(part_id, quantity);
        self
    }

    pub fn add_stock(&self, part_id: PartId, quantity: u32) {
        *self.stock.lock().on_hand.entry(part_id).or_default() += quantity;
    }

    /// Units on hand and not held by any order.
    pub fn stock_level(&self, part_id: &PartId) -> u32 {
        self.stock.lock().on_hand.get(part_id).copied().unwrap_or(0)
    }

    pub fn held(&self, order_id: OrderId, part_id: &PartId) -> u32 {
        self.stock
            .lock()
            .held
            .get(&(order_id, part_id.clone()))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl InventoryLedger for InMemoryInventory {
    async fn reserve(
        &self,
        order_id: OrderId,
        part_id: &PartId,
        quantity: u32,
    ) -> Result<(), CollaboratorError> {
        let mut stock = self.stock.lock();
        let available = stock.on_hand.get(part_id).copied().unwrap_or(0);
        if available < quantity {
            return Err(CollaboratorError::InsufficientStock {
                part_id: part_id.clone(),
                requested: quantity,
                available,
            });
        }
        stock.on_hand.insert(part_id.clone(), available - quantity);
        *stock.held.entry((order_id, part_id.clone())).or_default() += quantity;
        Ok(())
    }

    async fn finalize(
        &self,
        order_id: OrderId,
        reservations: &[PartReservation],
    ) -> Result<(), CollaboratorError> {
        let mut stock = self.stock.lock();
        // All or nothing: check every line before consuming any.
        for reservation in reservations {
            let held = stock
                .held
                .get(&(order_id, reservation.part_id.clone()))
                .copied()
                .unwrap_or(0);
            if held < reservation.quantity {
                return Err(CollaboratorError::InsufficientStock {
                    part_id: reservation.part_id.clone(),
                    requested: reservation.quantity,
                    available: held,
                });
            }
        }
        for reservation in reservations {
            let key = (order_id, reservation.part_id.clone());
            if let Some(held) = stock.held.get_mut(&key) {
                *held -= reservation.quantity;
                if *held == 0 {
                    stock.held.remove(&key);
                }
            }
        }
        Ok(())
    }

    /// Returns held units to stock. Releasing more than is held only returns
    /// what is held, so a repeated release is harmless.
    async fn release(
        &self,
        order_id: OrderId,
        part_id: &PartId,
        quantity: u32,
    ) -> Result<(), CollaboratorError> {
        let mut stock = self.stock.lock();
        let key = (order_id, part_id.clone());
        let held = stock.held.get(&key).copied().unwrap_or(0);
        let returned = held.min(quantity);
        if held == returned {
            stock.held.remove(&key);
        } else {
            stock.held.insert(key, held - returned);
        }
        *stock.on_hand.entry(part_id.clone()).or_default() += returned;
        Ok(())
    }

    async fn restore(
        &self,
        order_id: OrderId,
        reservations: &[PartReservation],
    ) -> Result<(), CollaboratorError> {
        let mut stock = self.stock.lock();
        for reservation in reservations {
            let held = stock
                .held
                .entry((order_id, reservation.part_id.clone()))
                .or_default();
            *held = held.saturating_add(reservation.quantity);
        }
        Ok(())
    }
}

/// Billing backend keeping charges in a `DashMap`.
///
/// Creating a charge is idempotent per order: while an order has a charge
/// that was not voided, the existing charge is returned.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBilling {
    charges: Arc<DashMap<ChargeId, Charge>>,
    sequence: Arc<AtomicU64>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryBilling {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a billing outage; every call fails with a transient error.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn charge(&self, charge_id: &ChargeId) -> Option<Charge> {
        self.charges.get(charge_id).map(|entry| entry.value().clone())
    }

    pub fn charges_for(&self, order_id: OrderId) -> Vec<Charge> {
        let mut charges: Vec<Charge> = self
            .charges
            .iter()
            .filter(|entry| entry.order_id == order_id)
            .map(|entry| entry.value().clone())
            .collect();
        charges.sort_by(|a, b| a.charge_id.as_str().cmp(b.charge_id.as_str()));
        charges
    }

    fn ensure_available(&self) -> Result<(), CollaboratorError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CollaboratorError::Unavailable {
                service: BILLING,
                detail: "billing backend offline".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn update(&self, charge_id: &ChargeId, status: ChargeStatus) -> Result<(), CollaboratorError> {
        self.ensure_available()?;
        let mut charge = self
            .charges
            .get_mut(charge_id)
            .ok_or_else(|| CollaboratorError::Rejected {
                service: BILLING,
                detail: format!("unknown charge {charge_id}"),
            })?;
        match (charge.status, status) {
            (current, wanted) if current == wanted => Ok(()),
            (ChargeStatus::Pending, _) => {
                charge.status = status;
                Ok(())
            }
            (current, wanted) => Err(CollaboratorError::Rejected {
                service: BILLING,
                detail: format!(
                    "charge {charge_id} is {} and cannot become {}",
                    current.as_str(),
                    wanted.as_str()
                ),
            }),
        }
    }
}

#[async_trait]
impl BillingCollaborator for InMemoryBilling {
    async fn create_charge(
        &self,
        order_id: OrderId,
        amount: Amount,
    ) -> Result<ChargeId, CollaboratorError> {
        self.ensure_available()?;
        if let Some(existing) = self
            .charges
            .iter()
            .find(|entry| entry.order_id == order_id && entry.status != ChargeStatus::Voided)
        {
            return Ok(existing.charge_id.clone());
        }

        let number = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let charge_id = ChargeId::new(format!("ch-{number:06}"));
        self.charges.insert(
            charge_id.clone(),
            Charge {
                charge_id: charge_id.clone(),
                order_id,
                amount,
                status: ChargeStatus::Pending,
            },
        );
        Ok(charge_id)
    }

    async fn mark_paid(&self, charge_id: &ChargeId) -> Result<(), CollaboratorError> {
        self.update(charge_id, ChargeStatus::Completed)
    }

    async fn void_charge(&self, charge_id: &ChargeId) -> Result<(), CollaboratorError> {
        self.update(charge_id, ChargeStatus::Voided)
    }

    async fn refund_charge(&self, charge_id: &ChargeId) -> Result<(), CollaboratorError> {
        self.ensure_available()?;
        let mut charge = self
            .charges
            .get_mut(charge_id)
            .ok_or_else(|| CollaboratorError::Rejected {
                service: BILLING,
                detail: format!("unknown charge {charge_id}"),
            })?;
        match charge.status {
            ChargeStatus::Completed => {
                charge.status = ChargeStatus::Pending;
                Ok(())
            }
            ChargeStatus::Pending => Ok(()),
            ChargeStatus::Voided => Err(CollaboratorError::Rejected {
                service: BILLING,
                detail: format!("charge {charge_id} is voided and cannot be refunded"),
            }),
        }
    }
}

/// Dispatcher that only writes each event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn publish(&self, event: OrderEvent) -> Result<(), CollaboratorError> {
        info!(
            order_id = %event.order_id,
            sequence = event.sequence,
            actor = %event.actor_id,
            to_status = %event.to_status,
            "order event"
        );
        Ok(())
    }
}

/// Dispatcher forwarding every event to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: UnboundedSender<OrderEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, UnboundedReceiver<OrderEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl NotificationDispatcher for ChannelNotifier {
    async fn publish(&self, event: OrderEvent) -> Result<(), CollaboratorError> {
        self.sender
            .send(event)
            .map_err(|_| CollaboratorError::Unavailable {
                service: NOTIFICATIONS,
                detail: "subscriber dropped".to_string(),
            })
    }
}
