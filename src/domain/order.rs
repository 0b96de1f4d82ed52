use super::billing::{Amount, ChargeRef};
use super::event::{EventKind, OrderEvent, Transition};
use super::inventory::PartReservation;
use super::principal::{Actor, UserId};
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OrderId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    PendingApproval,
    Approved,
    Completed,
    Cancelled,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Pending,
        Status::InProgress,
        Status::PendingApproval,
        Status::Approved,
        Status::Completed,
        Status::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::PendingApproval => "pending_approval",
            Status::Approved => "approved",
            Status::Completed => "completed",
            Status::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown status '{}'", s.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "" | "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    #[default]
    Repair,
    Maintenance,
    Upgrade,
    Diagnostic,
    Installation,
    DataRecovery,
    Cleaning,
    Configuration,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Repair => "repair",
            ServiceType::Maintenance => "maintenance",
            ServiceType::Upgrade => "upgrade",
            ServiceType::Diagnostic => "diagnostic",
            ServiceType::Installation => "installation",
            ServiceType::DataRecovery => "data_recovery",
            ServiceType::Cleaning => "cleaning",
            ServiceType::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "repair" => Ok(ServiceType::Repair),
            "maintenance" => Ok(ServiceType::Maintenance),
            "upgrade" => Ok(ServiceType::Upgrade),
            "diagnostic" => Ok(ServiceType::Diagnostic),
            "installation" => Ok(ServiceType::Installation),
            "data_recovery" => Ok(ServiceType::DataRecovery),
            "cleaning" => Ok(ServiceType::Cleaning),
            "configuration" => Ok(ServiceType::Configuration),
            other => Err(format!("unknown service type '{other}'")),
        }
    }
}

/// Input for opening a new service order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub client_id: UserId,
    pub equipment_id: String,
    pub description: String,
    pub service_type: ServiceType,
    pub priority: Priority,
    /// Labor quote, when already known at intake.
    pub labor_cost: Option<Amount>,
}

impl NewOrder {
    pub fn new(
        client_id: UserId,
        equipment_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            client_id,
            equipment_id: equipment_id.into(),
            description: description.into(),
            service_type: ServiceType::default(),
            priority: Priority::default(),
            labor_cost: None,
        }
    }

    pub fn service_type(mut self, service_type: ServiceType) -> Self {
        self.service_type = service_type;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn labor_cost(mut self, labor_cost: Amount) -> Self {
        self.labor_cost = Some(labor_cost);
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.client_id.as_str().trim().is_empty() {
            return Err(EngineError::Validation("Client id is required".to_string()));
        }
        if self.equipment_id.trim().is_empty() {
            return Err(EngineError::Validation(
                "Equipment id is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// A service order for a client's equipment.
///
/// `status` and `approved` only ever change by folding an [`OrderEvent`] into
/// the order, which keeps the event log the single source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub client_id: UserId,
    pub equipment_id: String,
    pub description: String,
    pub service_type: ServiceType,
    pub status: Status,
    pub priority: Priority,
    pub approved: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub labor_cost: Option<Amount>,
    pub prepaid: bool,
    pub charge: Option<ChargeRef>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of events recorded for this order.
    pub version: u64,
}

impl Order {
    /// Opens a new order and returns it together with its creation event.
    pub fn open(
        order_id: OrderId,
        new_order: NewOrder,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> (Self, OrderEvent) {
        let event = OrderEvent::new(
            order_id,
            1,
            actor,
            None,
            Status::Pending,
            at,
            None,
            EventKind::Created {
                order: new_order.clone(),
            },
        );
        (Self::initial(&event, new_order), event)
    }

    /// Builds the initial order from its creation event.
    pub fn from_created(event: &OrderEvent) -> Option<Self> {
        match &event.kind {
            EventKind::Created { order } => Some(Self::initial(event, order.clone())),
            _ => None,
        }
    }

    fn initial(event: &OrderEvent, new_order: NewOrder) -> Self {
        Self {
            order_id: event.order_id,
            client_id: new_order.client_id,
            equipment_id: new_order.equipment_id,
            description: new_order.description,
            service_type: new_order.service_type,
            status: event.to_status,
            priority: new_order.priority,
            approved: false,
            approved_at: None,
            labor_cost: new_order.labor_cost,
            prepaid: false,
            charge: None,
            created_by: event.actor_id.clone(),
            created_at: event.timestamp,
            updated_at: event.timestamp,
            version: event.sequence,
        }
    }

    /// Folds a subsequent event into the order.
    pub fn apply(&mut self, event: &OrderEvent) {
        match &event.kind {
            EventKind::Created { .. } | EventKind::Deleted => {}
            EventKind::Transitioned { transition, charge } => {
                if *transition == Transition::Approve {
                    self.approved = true;
                    self.approved_at = Some(event.timestamp);
                }
                if let Some(charge) = charge {
                    self.charge = Some(charge.clone());
                }
            }
            EventKind::PriorityChanged { to, .. } => self.priority = *to,
            EventKind::PartRecorded { .. } => {}
            EventKind::PrepaymentRecorded => self.prepaid = true,
        }
        self.status = event.to_status;
        self.updated_at = event.timestamp;
        self.version = event.sequence;
    }

    /// Rebuilds an order from its full event log.
    ///
    /// Returns `None` for an empty log, a log not starting with a creation
    /// event, or a deleted order.
    pub fn replay(events: &[OrderEvent]) -> Option<Self> {
        let (first, rest) = events.split_first()?;
        let mut order = Self::from_created(first)?;
        for event in rest {
            if event.kind == EventKind::Deleted {
                return None;
            }
            order.apply(event);
        }
        Some(order)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Labor plus every part still billed to the order.
    pub fn cost(&self, reservations: &[PartReservation]) -> Result<Amount, EngineError> {
        reservations
            .iter()
            .try_fold(self.labor_cost.unwrap_or_default(), |total, r| {
                total.checked_add(r.cost()?)
            })
    }

    /// A quote can be issued once labor is priced or a part has been used.
    pub fn cost_known(&self, reservations: &[PartReservation]) -> bool {
        self.labor_cost.is_some() || reservations.iter().any(|r| r.is_active())
    }
}

/// Dashboard filter for [`list_orders`](crate::application::engine::OrderEngine::list_orders).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub client_id: Option<UserId>,
    pub service_type: Option<ServiceType>,
    /// Case-insensitive match on description or equipment.
    pub search: Option<String>,
    /// 1-based page; only used together with `limit`.
    pub page: usize,
    pub limit: Option<usize>,
}

impl OrderFilter {
    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn client(mut self, client_id: UserId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn service_type(mut self, service_type: ServiceType) -> Self {
        self.service_type = Some(service_type);
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn page(mut self, page: usize, limit: usize) -> Self {
        self.page = page;
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        if self.status.is_some_and(|s| s != order.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != order.priority) {
            return false;
        }
        if self.service_type.is_some_and(|t| t != order.service_type) {
            return false;
        }
        if let Some(client_id) = &self.client_id
            && client_id != &order.client_id
        {
            return false;
        }
        if let Some(text) = &self.search {
            let needle = text.to_lowercase();
            return order.description.to_lowercase().contains(&needle)
                || order.equipment_id.to_lowercase().contains(&needle);
        }
        true
    }

    /// Filters, sorts newest first and paginates.
    pub fn apply(&self, orders: Vec<Order>) -> Vec<Order> {
        let mut selected: Vec<Order> = orders.into_iter().filter(|o| self.matches(o)).collect();
        selected.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        match self.limit {
            Some(limit) => {
                let skip = self.page.saturating_sub(1).saturating_mul(limit);
                selected.into_iter().skip(skip).take(limit).collect()
            }
            None => selected,
        }
    }
}

/// Client portal / dashboard projection of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    pub order: Order,
    pub events: Vec<OrderEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn created(actor: &Actor, at: DateTime<Utc>) -> OrderEvent {
        let new_order = NewOrder::new(UserId::new("c-1"), "macbook-air", "Cracked screen")
            .priority(Priority::High)
            .labor_cost(Amount::new(dec!(80)).unwrap());
        Order::open(OrderId::new(), new_order, actor, at).1
    }

    #[test]
    fn test_replay_applies_transitions_in_order() {
        let staff = Actor::employee("e-1");
        let client = Actor::client("c-1");
        let t0 = Utc::now();
        let first = created(&staff, t0);
        let id = first.order_id;
        let events = vec![
            first,
            OrderEvent::new(
                id,
                2,
                &staff,
                Some(Status::Pending),
                Status::InProgress,
                t0 + Duration::seconds(1),
                None,
                EventKind::Transitioned {
                    transition: Transition::Start,
                    charge: None,
                },
            ),
            OrderEvent::new(
                id,
                3,
                &staff,
                Some(Status::InProgress),
                Status::PendingApproval,
                t0 + Duration::seconds(2),
                None,
                EventKind::Transitioned {
                    transition: Transition::RequestApproval,
                    charge: None,
                },
            ),
            OrderEvent::new(
                id,
                4,
                &client,
                Some(Status::PendingApproval),
                Status::Approved,
                t0 + Duration::seconds(3),
                Some("go ahead".to_string()),
                EventKind::Transitioned {
                    transition: Transition::Approve,
                    charge: None,
                },
            ),
        ];

        let order = Order::replay(&events).unwrap();
        assert_eq!(order.status, Status::Approved);
        assert!(order.approved);
        assert_eq!(order.approved_at, Some(t0 + Duration::seconds(3)));
        assert_eq!(order.version, 4);
        assert_eq!(order.created_by, UserId::new("e-1"));
    }

    #[test]
    fn test_replay_requires_creation_event() {
        assert!(Order::replay(&[]).is_none());

        let staff = Actor::employee("e-1");
        let first = created(&staff, Utc::now());
        let deleted = OrderEvent::new(
            first.order_id,
            2,
            &staff,
            Some(Status::Pending),
            Status::Pending,
            Utc::now(),
            None,
            EventKind::Deleted,
        );
        assert!(Order::replay(&[first, deleted]).is_none());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("pending_approval".parse::<Status>(), Ok(Status::PendingApproval));
        assert!("aberta".parse::<Status>().is_err());
        assert!(Status::Cancelled.is_terminal());
        assert!(!Status::Approved.is_terminal());
    }

    #[test]
    fn test_filter_pagination_newest_first() {
        let staff = Actor::employee("e-1");
        let t0 = Utc::now();
        let orders: Vec<Order> = (0..5)
            .map(|i| Order::from_created(&created(&staff, t0 + Duration::seconds(i))).unwrap())
            .collect();

        let page = OrderFilter::default().page(2, 2).apply(orders.clone());
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].created_at, t0 + Duration::seconds(2));
        assert_eq!(page[1].created_at, t0 + Duration::seconds(1));

        let none = OrderFilter::default().search("iphone").apply(orders.clone());
        assert!(none.is_empty());
        let all = OrderFilter::default().search("SCREEN").apply(orders);
        assert_eq!(all.len(), 5);
    }
}
