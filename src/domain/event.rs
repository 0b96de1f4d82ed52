use super::billing::ChargeRef;
use super::inventory::PartLine;
use super::order::{NewOrder, OrderId, Priority, Status};
use super::principal::{Actor, Role, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A lifecycle transition requested by an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Start,
    RequestApproval,
    Approve,
    Reject,
    Complete,
    Cancel,
}

impl Transition {
    pub const ALL: [Transition; 6] = [
        Transition::Start,
        Transition::RequestApproval,
        Transition::Approve,
        Transition::Reject,
        Transition::Complete,
        Transition::Cancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Start => "start",
            Transition::RequestApproval => "request_approval",
            Transition::Approve => "approve",
            Transition::Reject => "reject",
            Transition::Complete => "complete",
            Transition::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" | "assign" => Ok(Transition::Start),
            "request_approval" => Ok(Transition::RequestApproval),
            "approve" => Ok(Transition::Approve),
            "reject" => Ok(Transition::Reject),
            "complete" => Ok(Transition::Complete),
            "cancel" => Ok(Transition::Cancel),
            other => Err(format!("unknown transition '{other}'")),
        }
    }
}

/// Payload of an [`OrderEvent`]; carries everything needed to rebuild the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Created {
        order: NewOrder,
    },
    Transitioned {
        transition: Transition,
        /// The order's charge reference after the transition, when it changed.
        charge: Option<ChargeRef>,
    },
    PriorityChanged {
        from: Priority,
        to: Priority,
    },
    PartRecorded {
        line: PartLine,
    },
    PrepaymentRecorded,
    Deleted,
}

/// Immutable audit record of one change to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub event_id: Uuid,
    pub order_id: OrderId,
    /// 1-based, contiguous per order.
    pub sequence: u64,
    pub actor_id: UserId,
    pub actor_role: Role,
    /// `None` only for the creation event.
    pub from_status: Option<Status>,
    pub to_status: Status,
    pub timestamp: DateTime<Utc>,
    pub comment: Option<String>,
    pub kind: EventKind,
}

impl OrderEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: OrderId,
        sequence: u64,
        actor: &Actor,
        from_status: Option<Status>,
        to_status: Status,
        timestamp: DateTime<Utc>,
        comment: Option<String>,
        kind: EventKind,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            order_id,
            sequence,
            actor_id: actor.id().clone(),
            actor_role: actor.role(),
            from_status,
            to_status,
            timestamp,
            comment,
            kind,
        }
    }

    /// True for events that moved the order to a different status.
    pub fn changes_status(&self) -> bool {
        self.from_status != Some(self.to_status)
    }
}
