use super::billing::Amount;
use super::order::OrderId;
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartId(String);

impl PartId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A part used on a repair, as requested by staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartLine {
    pub part_id: PartId,
    pub quantity: u32,
    pub unit_price: Amount,
}

impl PartLine {
    pub fn new(part_id: PartId, quantity: u32, unit_price: Amount) -> Result<Self, EngineError> {
        if quantity == 0 {
            return Err(EngineError::Validation(format!(
                "Quantity for part {part_id} must be positive"
            )));
        }
        Ok(Self {
            part_id,
            quantity,
            unit_price,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    /// Stock is held by the ledger for this order.
    Active,
    /// Stock was consumed when the order completed.
    Finalized,
    Released,
    /// The order was cancelled but the ledger has not yet confirmed the release.
    ReleasePending,
}

/// Stock held for an order, keyed by `(order_id, part_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartReservation {
    pub order_id: OrderId,
    pub part_id: PartId,
    pub quantity: u32,
    pub unit_price: Amount,
    pub reserved_at: DateTime<Utc>,
    pub state: ReservationState,
}

impl PartReservation {
    pub fn new(order_id: OrderId, line: &PartLine, reserved_at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            part_id: line.part_id.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            reserved_at,
            state: ReservationState::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == ReservationState::Active
    }

    /// Value billed for this reservation; released stock is not billed.
    pub fn cost(&self) -> Result<Amount, EngineError> {
        match self.state {
            ReservationState::Released | ReservationState::ReleasePending => Ok(Amount::ZERO),
            ReservationState::Active | ReservationState::Finalized => {
                self.unit_price.checked_mul(self.quantity)
            }
        }
    }

    /// Adds another use of the same part; the latest unit price wins.
    pub fn merge(&mut self, line: &PartLine) -> Result<(), EngineError> {
        self.quantity = self.quantity.checked_add(line.quantity).ok_or_else(|| {
            EngineError::Validation(format!("Quantity overflow for part {}", self.part_id))
        })?;
        self.unit_price = line.unit_price;
        Ok(())
    }
}
