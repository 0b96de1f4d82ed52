//! The service order state machine and its authorization rules.
//!
//! Everything here is pure: given an order, an actor and a requested change,
//! decide whether it is allowed and where it leads. The engine owns the side
//! effects.

use super::event::Transition;
use super::inventory::{PartReservation, ReservationState};
use super::order::{Order, Status};
use super::principal::Actor;
use crate::error::EngineError;

/// Who may request a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Staff,
    OwningClient,
    StaffOrOwningClient,
}

impl Permission {
    pub fn allows(&self, actor: &Actor, order: &Order) -> bool {
        match self {
            Permission::Staff => actor.is_staff(),
            Permission::OwningClient => actor.owns(&order.client_id),
            Permission::StaffOrOwningClient => actor.is_staff() || actor.owns(&order.client_id),
        }
    }
}

pub fn permission(transition: Transition) -> Permission {
    match transition {
        Transition::Start | Transition::RequestApproval | Transition::Complete => {
            Permission::Staff
        }
        Transition::Approve | Transition::Reject => Permission::OwningClient,
        Transition::Cancel => Permission::StaffOrOwningClient,
    }
}

/// The transition table. `None` means there is no such edge.
pub fn target(from: Status, transition: Transition) -> Option<Status> {
    use Status::*;
    use Transition::*;

    match (from, transition) {
        (Pending, Start) => Some(InProgress),
        (InProgress, RequestApproval) => Some(PendingApproval),
        (PendingApproval, Approve) => Some(Approved),
        (PendingApproval, Reject) => Some(InProgress),
        (Approved, Complete) => Some(Completed),
        (Pending | InProgress, Cancel) => Some(Cancelled),
        _ => None,
    }
}

/// Authorizes `actor` for `transition` on `order`, then resolves the target status.
///
/// Authorization is checked first so that a caller without rights learns
/// nothing about the order's current state.
pub fn plan(order: &Order, actor: &Actor, transition: Transition) -> Result<Status, EngineError> {
    if !permission(transition).allows(actor, order) {
        return Err(EngineError::Forbidden(format!(
            "{actor} may not {transition} order {}",
            order.order_id
        )));
    }
    target(order.status, transition).ok_or_else(|| {
        EngineError::InvalidTransition(format!(
            "cannot {transition} order {} in status {}",
            order.order_id, order.status
        ))
    })
}

/// Guard for staff-only operations that do not move the order between states.
pub fn authorize_staff(actor: &Actor, action: &str) -> Result<(), EngineError> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!("{actor} may not {action}")))
    }
}

/// Priority, parts and prepayment can only change while the order is open.
pub fn ensure_open(order: &Order, action: &str) -> Result<(), EngineError> {
    if order.is_terminal() {
        Err(EngineError::InvalidTransition(format!(
            "cannot {action} on order {} in terminal status {}",
            order.order_id, order.status
        )))
    } else {
        Ok(())
    }
}

/// Deletion is only allowed for cancelled orders that were never billed and
/// whose parts are all back in stock.
pub fn ensure_deletable(
    order: &Order,
    reservations: &[PartReservation],
) -> Result<(), EngineError> {
    if order.status != Status::Cancelled {
        return Err(EngineError::InvalidTransition(format!(
            "order {} must be cancelled before deletion (status {})",
            order.order_id, order.status
        )));
    }
    if order.charge.is_some() {
        return Err(EngineError::InvalidTransition(format!(
            "order {} has a billing charge and cannot be deleted",
            order.order_id
        )));
    }
    if reservations
        .iter()
        .any(|r| r.state == ReservationState::ReleasePending)
    {
        return Err(EngineError::InvalidTransition(format!(
            "order {} still has part releases awaiting reconciliation",
            order.order_id
        )));
    }
    Ok(())
}
