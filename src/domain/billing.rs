use super::order::OrderId;
use crate::error::EngineError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A non-negative monetary value (labor quotes, part prices, charge totals).
///
/// Wraps `rust_decimal::Decimal` so that negative amounts can never reach billing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, EngineError> {
        if value >= Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(EngineError::Validation(
                "Amount must not be negative".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = EngineError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl Amount {
    /// Sum of two amounts; `Validation` when it does not fit a `Decimal`.
    pub fn checked_add(self, rhs: Self) -> Result<Self, EngineError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or_else(|| EngineError::Validation(format!("Amount overflow adding {rhs} to {self}")))
    }

    /// Price of `quantity` units; `Validation` when it does not fit a `Decimal`.
    pub fn checked_mul(self, quantity: u32) -> Result<Self, EngineError> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Self)
            .ok_or_else(|| {
                EngineError::Validation(format!("Amount overflow pricing {quantity} x {self}"))
            })
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// Identifier assigned by the billing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChargeId(String);

impl ChargeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChargeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeStatus {
    Pending,
    Completed,
    Voided,
}

impl ChargeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Pending => "pending",
            ChargeStatus::Completed => "completed",
            ChargeStatus::Voided => "voided",
        }
    }
}

/// The order's copy of a charge owned by the billing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRef {
    pub charge_id: ChargeId,
    pub amount: Amount,
    pub status: ChargeStatus,
}

impl ChargeRef {
    pub fn pending(charge_id: ChargeId, amount: Amount) -> Self {
        Self {
            charge_id,
            amount,
            status: ChargeStatus::Pending,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == ChargeStatus::Completed
    }
}

/// A charge as held by the billing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub charge_id: ChargeId,
    pub order_id: OrderId,
    pub amount: Amount,
    pub status: ChargeStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(Amount::new(dec!(0.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(-0.01)),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_amount_arithmetic() {
        let price = Amount::new(dec!(12.50)).unwrap();
        let total = Amount::new(dec!(40))
            .unwrap()
            .checked_add(price.checked_mul(2).unwrap())
            .unwrap();
        assert_eq!(total, Amount::new(dec!(65.00)).unwrap());
        assert_eq!(total.to_string(), "65");
    }

    #[test]
    fn test_amount_overflow_is_a_validation_error() {
        let max = Amount::new(rust_decimal::Decimal::MAX).unwrap();
        assert!(matches!(max.checked_mul(2), Err(EngineError::Validation(_))));
        assert!(matches!(max.checked_add(max), Err(EngineError::Validation(_))));
        assert_eq!(max.checked_mul(1).unwrap(), max);
    }

    #[test]
    fn test_negative_amount_rejected_on_deserialize() {
        let parsed: Result<Amount, _> = serde_json::from_str("\"-3\"");
        assert!(parsed.is_err());
    }
}
