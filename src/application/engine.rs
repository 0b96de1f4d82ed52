use super::config::EngineConfig;
use super::locks::OrderLocks;
use super::policy::CallPolicy;
use crate::domain::billing::{ChargeId, ChargeRef, ChargeStatus};
use crate::domain::event::{EventKind, OrderEvent, Transition};
use crate::domain::inventory::{PartId, PartLine, PartReservation, ReservationState};
use crate::domain::lifecycle;
use crate::domain::order::{NewOrder, Order, OrderFilter, OrderId, OrderView, Priority, Status};
use crate::domain::ports::{
    BillingCollaboratorBox, ChangeSet, InventoryLedgerBox, NotificationDispatcherRef,
    OrderRecord, OrderStoreBox, OrderWrite,
};
use crate::domain::principal::Actor;
use crate::error::{EngineError, Result};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

const INVENTORY: &str = "inventory";
const BILLING: &str = "billing";

/// External services the engine coordinates with during a transition.
pub struct Collaborators {
    pub inventory: InventoryLedgerBox,
    pub billing: BillingCollaboratorBox,
    pub notifier: NotificationDispatcherRef,
}

/// Undo step for a collaborator side effect taken while staging.
#[derive(Debug)]
enum Compensation {
    VoidCharge(ChargeId),
    RefundCharge(ChargeId),
    ReleasePart { part_id: PartId, quantity: u32 },
    ReservePart { part_id: PartId, quantity: u32 },
    RestoreParts(Vec<PartReservation>),
}

/// A change being prepared against one order. Nothing is visible to readers
/// until [`OrderEngine::commit_stage`] writes it.
struct Stage {
    expected_version: u64,
    order: Order,
    reservations: Vec<PartReservation>,
    events: Vec<OrderEvent>,
    compensations: Vec<Compensation>,
    remove: bool,
}

impl Stage {
    fn new(record: OrderRecord) -> Self {
        Self {
            expected_version: record.order.version,
            order: record.order,
            reservations: record.reservations,
            events: Vec::new(),
            compensations: Vec::new(),
            remove: false,
        }
    }

    /// Appends the next event of the order's log and folds it into the staged order.
    fn record(&mut self, actor: &Actor, to_status: Status, comment: Option<String>, kind: EventKind) {
        let event = OrderEvent::new(
            self.order.order_id,
            self.order.version + 1,
            actor,
            Some(self.order.status),
            to_status,
            Utc::now(),
            comment,
            kind,
        );
        self.order.apply(&event);
        self.events.push(event);
    }

    fn change_set(&self) -> ChangeSet {
        ChangeSet {
            order_id: self.order.order_id,
            expected_version: self.expected_version,
            order: if self.remove {
                OrderWrite::Remove
            } else {
                OrderWrite::Put(self.order.clone())
            },
            events: self.events.clone(),
            reservations: self.reservations.clone(),
        }
    }
}

/// Coordinates the service order lifecycle.
///
/// Every mutating operation holds the order's lock for its whole duration,
/// stages the new state and the collaborator side effects, and commits
/// order, events and reservations in one atomic store write. If anything
/// fails before the commit lands, the side effects already taken are
/// compensated and the order stays exactly as it was.
pub struct OrderEngine {
    store: OrderStoreBox,
    inventory: InventoryLedgerBox,
    billing: BillingCollaboratorBox,
    notifier: NotificationDispatcherRef,
    locks: OrderLocks,
    config: EngineConfig,
    store_policy: CallPolicy,
    collaborator_policy: CallPolicy,
}

impl OrderEngine {
    pub fn new(store: OrderStoreBox, collaborators: Collaborators, config: EngineConfig) -> Self {
        Self {
            store,
            inventory: collaborators.inventory,
            billing: collaborators.billing,
            notifier: collaborators.notifier,
            locks: OrderLocks::new(),
            store_policy: CallPolicy::new(config.store_timeout, config.retry_backoff),
            collaborator_policy: CallPolicy::new(config.collaborator_timeout, config.retry_backoff),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Opens a new order in `pending`. Staff only.
    #[instrument(skip(self, new_order, actor), fields(actor = %actor))]
    pub async fn create_order(&self, new_order: NewOrder, actor: &Actor) -> Result<Order> {
        lifecycle::authorize_staff(actor, "create orders")?;
        new_order.validate()?;

        let order_id = OrderId::new();
        let (order, event) = Order::open(order_id, new_order, actor, Utc::now());
        let change = ChangeSet {
            order: OrderWrite::Put(order.clone()),
            events: vec![event.clone()],
            ..ChangeSet::new(order_id, 0)
        };
        self.store_policy
            .store(|| self.store.commit(&change))
            .await?;

        info!(%order_id, client_id = %order.client_id, "order created");
        self.publish(vec![event]);
        Ok(order)
    }

    /// Moves an order along the lifecycle.
    ///
    /// Requesting approval issues the charge when the cost is already known.
    /// Completing bills the order if that has not happened yet, settles a
    /// prepaid charge and consumes the reserved parts. Cancelling hands the
    /// reserved parts back to the ledger.
    #[instrument(skip(self, actor, comment), fields(actor = %actor))]
    pub async fn apply_transition(
        &self,
        order_id: OrderId,
        transition: Transition,
        actor: &Actor,
        comment: Option<String>,
    ) -> Result<Order> {
        let _guard = self.locks.acquire(order_id, self.config.lock_timeout).await?;
        let record = self.load_record(order_id).await?;
        let to_status = lifecycle::plan(&record.order, actor, transition)?;
        let mut stage = Stage::new(record);

        let charge = match transition {
            Transition::RequestApproval => self.stage_quote(&mut stage).await?,
            Transition::Complete => self.stage_completion(&mut stage).await?,
            Transition::Cancel => {
                self.stage_release(&mut stage).await;
                None
            }
            Transition::Start | Transition::Approve | Transition::Reject => None,
        };
        stage.record(actor, to_status, comment, EventKind::Transitioned { transition, charge });

        let order = self.commit_stage(stage).await?;
        info!(%order_id, %transition, status = %order.status, "transition applied");
        Ok(order)
    }

    /// Changes the priority of an open order. Staff only.
    #[instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn set_priority(
        &self,
        order_id: OrderId,
        priority: Priority,
        actor: &Actor,
    ) -> Result<Order> {
        lifecycle::authorize_staff(actor, "change priority")?;
        let _guard = self.locks.acquire(order_id, self.config.lock_timeout).await?;
        let record = self.load_record(order_id).await?;
        lifecycle::ensure_open(&record.order, "change priority")?;

        let mut stage = Stage::new(record);
        let (from, status) = (stage.order.priority, stage.order.status);
        stage.record(actor, status, None, EventKind::PriorityChanged { from, to: priority });
        self.commit_stage(stage).await
    }

    /// Reserves stock for a part used on an open order. Staff only.
    ///
    /// Recording the same part twice adds to the existing reservation.
    #[instrument(skip(self, line, actor), fields(actor = %actor, part_id = %line.part_id, quantity = line.quantity))]
    pub async fn record_part(
        &self,
        order_id: OrderId,
        line: PartLine,
        actor: &Actor,
    ) -> Result<Order> {
        lifecycle::authorize_staff(actor, "record parts")?;
        let _guard = self.locks.acquire(order_id, self.config.lock_timeout).await?;
        let record = self.load_record(order_id).await?;
        lifecycle::ensure_open(&record.order, "record parts")?;

        let mut stage = Stage::new(record);
        if let Some(existing) = stage
            .reservations
            .iter_mut()
            .find(|r| r.part_id == line.part_id && r.is_active())
        {
            existing.merge(&line)?;
        } else {
            stage.reservations.retain(|r| r.part_id != line.part_id);
            stage
                .reservations
                .push(PartReservation::new(order_id, &line, Utc::now()));
        }
        // The order must stay billable with the new line.
        stage.order.cost(&stage.reservations)?;

        self.collaborator_policy
            .collaborator(INVENTORY, || {
                self.inventory.reserve(order_id, &line.part_id, line.quantity)
            })
            .await?;
        stage.compensations.push(Compensation::ReleasePart {
            part_id: line.part_id.clone(),
            quantity: line.quantity,
        });

        let status = stage.order.status;
        stage.record(actor, status, None, EventKind::PartRecorded { line });
        self.commit_stage(stage).await
    }

    /// Marks an open order as paid in advance; its charge is settled on completion.
    #[instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn record_prepayment(&self, order_id: OrderId, actor: &Actor) -> Result<Order> {
        lifecycle::authorize_staff(actor, "record prepayments")?;
        let _guard = self.locks.acquire(order_id, self.config.lock_timeout).await?;
        let record = self.load_record(order_id).await?;
        lifecycle::ensure_open(&record.order, "record a prepayment")?;
        if record.order.prepaid {
            return Err(EngineError::InvalidTransition(format!(
                "order {order_id} is already prepaid"
            )));
        }

        let mut stage = Stage::new(record);
        let status = stage.order.status;
        stage.record(actor, status, None, EventKind::PrepaymentRecorded);
        self.commit_stage(stage).await
    }

    /// Removes a cancelled, never billed order. Its event log is kept.
    #[instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn delete_order(&self, order_id: OrderId, actor: &Actor) -> Result<()> {
        lifecycle::authorize_staff(actor, "delete orders")?;
        let _guard = self.locks.acquire(order_id, self.config.lock_timeout).await?;
        let record = self.load_record(order_id).await?;
        lifecycle::ensure_deletable(&record.order, &record.reservations)?;

        let mut stage = Stage::new(record);
        stage.remove = true;
        stage.record(actor, Status::Cancelled, None, EventKind::Deleted);
        self.commit_stage(stage).await?;
        info!(%order_id, "order deleted");
        Ok(())
    }

    /// Client portal and dashboard read of one order and its history.
    ///
    /// Clients only see their own orders; any other order is reported as
    /// missing so that its existence is not disclosed.
    #[instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn track_order(&self, order_id: OrderId, actor: &Actor) -> Result<OrderView> {
        let record = self
            .store_policy
            .store(|| self.store.load(order_id))
            .await?;
        match record {
            Some(record) if actor.is_staff() || actor.owns(&record.order.client_id) => {
                Ok(OrderView {
                    order: record.order,
                    events: record.events,
                })
            }
            _ => Err(EngineError::NotFound(order_id)),
        }
    }

    /// Staff dashboard listing.
    #[instrument(skip(self, filter, actor), fields(actor = %actor))]
    pub async fn list_orders(&self, filter: &OrderFilter, actor: &Actor) -> Result<Vec<Order>> {
        lifecycle::authorize_staff(actor, "list orders")?;
        let orders = self.store_policy.store(|| self.store.list_orders()).await?;
        Ok(filter.apply(orders))
    }

    #[instrument(skip(self, actor), fields(actor = %actor))]
    pub async fn reservations(
        &self,
        order_id: OrderId,
        actor: &Actor,
    ) -> Result<Vec<PartReservation>> {
        lifecycle::authorize_staff(actor, "view reservations")?;
        Ok(self.load_record(order_id).await?.reservations)
    }

    /// Rebuilds the order purely from its event log.
    #[instrument(skip(self))]
    pub async fn rebuild_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let events = self
            .store_policy
            .store(|| self.store.events(order_id))
            .await?;
        Ok(Order::replay(&events))
    }

    /// Retries ledger releases that failed while cancelling orders.
    ///
    /// Returns how many reservations were released.
    #[instrument(skip(self))]
    pub async fn reconcile_releases(&self) -> Result<usize> {
        let pending = self
            .store_policy
            .store(|| self.store.pending_releases())
            .await?;
        let order_ids: BTreeSet<OrderId> = pending.iter().map(|r| r.order_id).collect();

        let mut released = 0;
        for order_id in order_ids {
            let _guard = self.locks.acquire(order_id, self.config.lock_timeout).await?;
            let Some(record) = self
                .store_policy
                .store(|| self.store.load(order_id))
                .await?
            else {
                continue;
            };

            let mut settled = Vec::new();
            for mut reservation in record
                .reservations
                .into_iter()
                .filter(|r| r.state == ReservationState::ReleasePending)
            {
                let result = self
                    .collaborator_policy
                    .collaborator(INVENTORY, || {
                        self.inventory
                            .release(order_id, &reservation.part_id, reservation.quantity)
                    })
                    .await;
                match result {
                    Ok(()) => {
                        reservation.state = ReservationState::Released;
                        settled.push(reservation);
                    }
                    Err(err) => {
                        warn!(%order_id, part_id = %reservation.part_id, error = %err, "release still failing")
                    }
                }
            }
            if settled.is_empty() {
                continue;
            }

            released += settled.len();
            let change = ChangeSet {
                reservations: settled,
                ..ChangeSet::new(order_id, record.order.version)
            };
            self.store_policy
                .store(|| self.store.commit(&change))
                .await?;
        }

        info!(released, "pending releases reconciled");
        Ok(released)
    }

    async fn load_record(&self, order_id: OrderId) -> Result<OrderRecord> {
        self.store_policy
            .store(|| self.store.load(order_id))
            .await?
            .ok_or(EngineError::NotFound(order_id))
    }

    /// Issues the charge when the quote can be priced; otherwise billing
    /// waits until completion.
    async fn stage_quote(&self, stage: &mut Stage) -> Result<Option<ChargeRef>> {
        if stage.order.charge.is_some() || !stage.order.cost_known(&stage.reservations) {
            return Ok(None);
        }
        let charge = self.create_charge(stage).await?;
        Ok(Some(charge))
    }

    /// Bills the order if needed, consumes its active reservations and then
    /// settles a prepaid charge. Any failure undoes the steps already taken.
    async fn stage_completion(&self, stage: &mut Stage) -> Result<Option<ChargeRef>> {
        match self.complete_steps(stage).await {
            Ok(charge) => Ok(charge),
            Err(err) => Err(self.abort(stage, err).await),
        }
    }

    async fn complete_steps(&self, stage: &mut Stage) -> Result<Option<ChargeRef>> {
        let order_id = stage.order.order_id;
        let mut changed = false;
        let mut charge = match stage.order.charge.clone() {
            Some(charge) => charge,
            None => {
                changed = true;
                self.create_charge(stage).await?
            }
        };

        let active: Vec<PartReservation> = stage
            .reservations
            .iter()
            .filter(|r| r.is_active())
            .cloned()
            .collect();
        if !active.is_empty() {
            self.collaborator_policy
                .collaborator(INVENTORY, || self.inventory.finalize(order_id, &active))
                .await?;
            stage.compensations.push(Compensation::RestoreParts(active));
            for reservation in stage.reservations.iter_mut().filter(|r| r.is_active()) {
                reservation.state = ReservationState::Finalized;
            }
        }

        if stage.order.prepaid && !charge.is_paid() {
            let charge_id = charge.charge_id.clone();
            self.collaborator_policy
                .collaborator(BILLING, || self.billing.mark_paid(&charge_id))
                .await?;
            stage.compensations.push(Compensation::RefundCharge(charge_id));
            charge.status = ChargeStatus::Completed;
            changed = true;
        }

        Ok(changed.then_some(charge))
    }

    async fn create_charge(&self, stage: &mut Stage) -> Result<ChargeRef> {
        let order_id = stage.order.order_id;
        let amount = stage.order.cost(&stage.reservations)?;
        let charge_id = self
            .collaborator_policy
            .collaborator(BILLING, || self.billing.create_charge(order_id, amount))
            .await?;
        debug!(%order_id, %charge_id, %amount, "charge created");
        stage
            .compensations
            .push(Compensation::VoidCharge(charge_id.clone()));
        Ok(ChargeRef::pending(charge_id, amount))
    }

    /// Hands every active reservation back to the ledger. A failed release
    /// does not block the cancellation; it is parked for reconciliation.
    async fn stage_release(&self, stage: &mut Stage) {
        let order_id = stage.order.order_id;
        for reservation in stage.reservations.iter_mut().filter(|r| r.is_active()) {
            let (part_id, quantity) = (reservation.part_id.clone(), reservation.quantity);
            let released = self
                .collaborator_policy
                .collaborator(INVENTORY, || self.inventory.release(order_id, &part_id, quantity))
                .await;
            reservation.state = match released {
                Ok(()) => {
                    stage
                        .compensations
                        .push(Compensation::ReservePart { part_id, quantity });
                    ReservationState::Released
                }
                Err(err) => {
                    warn!(%order_id, %part_id, quantity, error = %err, "release failed, parked for reconciliation");
                    ReservationState::ReleasePending
                }
            };
        }
    }

    async fn abort(&self, stage: &mut Stage, err: EngineError) -> EngineError {
        let compensations = std::mem::take(&mut stage.compensations);
        self.compensate(stage.order.order_id, compensations).await;
        err
    }

    async fn commit_stage(&self, mut stage: Stage) -> Result<Order> {
        let change = stage.change_set();
        if let Err(err) = self.store_policy.store(|| self.store.commit(&change)).await {
            error!(order_id = %change.order_id, error = %err, "commit failed, compensating staged side effects");
            return Err(self.abort(&mut stage, err.into()).await);
        }
        self.publish(stage.events);
        Ok(stage.order)
    }

    async fn compensate(&self, order_id: OrderId, compensations: Vec<Compensation>) {
        for compensation in compensations.into_iter().rev() {
            let result = match &compensation {
                Compensation::VoidCharge(charge_id) => {
                    self.collaborator_policy
                        .collaborator(BILLING, || self.billing.void_charge(charge_id))
                        .await
                }
                Compensation::RefundCharge(charge_id) => {
                    self.collaborator_policy
                        .collaborator(BILLING, || self.billing.refund_charge(charge_id))
                        .await
                }
                Compensation::ReleasePart { part_id, quantity } => {
                    self.collaborator_policy
                        .collaborator(INVENTORY, || {
                            self.inventory.release(order_id, part_id, *quantity)
                        })
                        .await
                }
                Compensation::ReservePart { part_id, quantity } => {
                    self.collaborator_policy
                        .collaborator(INVENTORY, || {
                            self.inventory.reserve(order_id, part_id, *quantity)
                        })
                        .await
                }
                Compensation::RestoreParts(reservations) => {
                    self.collaborator_policy
                        .collaborator(INVENTORY, || self.inventory.restore(order_id, reservations))
                        .await
                }
            };
            match result {
                Ok(()) => debug!(%order_id, ?compensation, "compensated"),
                Err(err) => {
                    error!(%order_id, ?compensation, error = %err, "compensation failed, manual reconciliation required")
                }
            }
        }
    }

    /// Fire-and-forget delivery of committed events.
    fn publish(&self, events: Vec<OrderEvent>) {
        let budget = self.config.collaborator_timeout;
        for event in events {
            let notifier = Arc::clone(&self.notifier);
            tokio::spawn(async move {
                let (order_id, sequence) = (event.order_id, event.sequence);
                match timeout(budget, notifier.publish(event)).await {
                    Ok(Ok(())) => debug!(%order_id, sequence, "event published"),
                    Ok(Err(err)) => warn!(%order_id, sequence, error = %err, "event notification failed"),
                    Err(_) => warn!(%order_id, sequence, ?budget, "event notification timed out"),
                }
            });
        }
    }
}
