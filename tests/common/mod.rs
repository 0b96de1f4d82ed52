#![allow(dead_code)]

use async_trait::async_trait;
use repair_orders::application::config::EngineConfig;
use repair_orders::application::engine::{Collaborators, OrderEngine};
use repair_orders::domain::billing::Amount;
use repair_orders::domain::event::{OrderEvent, Transition};
use repair_orders::domain::inventory::{PartId, PartReservation};
use repair_orders::domain::order::{NewOrder, Order, OrderId};
use repair_orders::domain::ports::{ChangeSet, InventoryLedger, OrderRecord, OrderStore};
use repair_orders::domain::principal::{Actor, UserId};
use repair_orders::error::{CollaboratorError, StoreError};
use repair_orders::infrastructure::collaborators::{InMemoryBilling, InMemoryInventory, LogNotifier};
use repair_orders::infrastructure::in_memory::InMemoryOrderStore;
use rust_decimal::Decimal;
use std::io::{Error, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tempfile::NamedTempFile;

pub const HEADER: &str =
    "command,order,actor,role,client,equipment,service,priority,part,quantity,amount,comment";

pub fn staff() -> Actor {
    Actor::employee("e-1")
}

pub fn owner() -> Actor {
    Actor::client("c-1")
}

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

pub fn intake() -> NewOrder {
    NewOrder::new(UserId::new("c-1"), "galaxy-s23", "Charging port loose")
}

/// Short budgets so that failure paths finish quickly.
pub fn fast_config() -> EngineConfig {
    EngineConfig::default()
        .with_lock_timeout(Duration::from_millis(500))
        .with_collaborator_timeout(Duration::from_millis(200))
        .with_store_timeout(Duration::from_millis(200))
        .with_retry_backoff(Duration::from_millis(1))
}

pub fn engine_with(inventory: impl InventoryLedger + 'static, billing: InMemoryBilling) -> OrderEngine {
    OrderEngine::new(
        Box::new(InMemoryOrderStore::new()),
        Collaborators {
            inventory: Box::new(inventory),
            billing: Box::new(billing),
            notifier: Arc::new(LogNotifier),
        },
        fast_config(),
    )
}

pub fn engine() -> OrderEngine {
    engine_with(
        InMemoryInventory::new().with_stock(PartId::new("port"), 10),
        InMemoryBilling::new(),
    )
}

/// Runs `transitions` in order, panicking on the first failure.
pub async fn drive(engine: &OrderEngine, order_id: OrderId, transitions: &[(Transition, &Actor)]) -> Order {
    let mut last = None;
    for (transition, actor) in transitions {
        last = Some(
            engine
                .apply_transition(order_id, *transition, actor, None)
                .await
                .unwrap(),
        );
    }
    last.unwrap()
}

/// Inventory ledger with switchable faults, backed by a real in-memory ledger.
#[derive(Clone, Default)]
pub struct FaultyInventory {
    pub inner: InMemoryInventory,
    fail_release: Arc<AtomicBool>,
    short_on_finalize: Arc<AtomicBool>,
    pub release_calls: Arc<AtomicU32>,
}

impl FaultyInventory {
    pub fn new(inner: InMemoryInventory) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn fail_release(&self, fail: bool) {
        self.fail_release.store(fail, Ordering::SeqCst);
    }

    pub fn short_on_finalize(&self, short: bool) {
        self.short_on_finalize.store(short, Ordering::SeqCst);
    }
}

#[async_trait]
impl InventoryLedger for FaultyInventory {
    async fn reserve(&self, order_id: OrderId, part_id: &PartId, quantity: u32) -> Result<(), CollaboratorError> {
        self.inner.reserve(order_id, part_id, quantity).await
    }

    async fn finalize(&self, order_id: OrderId, reservations: &[PartReservation]) -> Result<(), CollaboratorError> {
        if self.short_on_finalize.load(Ordering::SeqCst)
            && let Some(first) = reservations.first()
        {
            return Err(CollaboratorError::InsufficientStock {
                part_id: first.part_id.clone(),
                requested: first.quantity,
                available: 0,
            });
        }
        self.inner.finalize(order_id, reservations).await
    }

    async fn release(&self, order_id: OrderId, part_id: &PartId, quantity: u32) -> Result<(), CollaboratorError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable {
                service: "inventory",
                detail: "ledger offline".to_string(),
            });
        }
        self.inner.release(order_id, part_id, quantity).await
    }

    async fn restore(&self, order_id: OrderId, reservations: &[PartReservation]) -> Result<(), CollaboratorError> {
        self.inner.restore(order_id, reservations).await
    }
}

pub fn engine_over(
    store: impl OrderStore + 'static,
    inventory: impl InventoryLedger + 'static,
    billing: InMemoryBilling,
) -> OrderEngine {
    OrderEngine::new(
        Box::new(store),
        Collaborators {
            inventory: Box::new(inventory),
            billing: Box::new(billing),
            notifier: Arc::new(LogNotifier),
        },
        fast_config(),
    )
}

/// Order store whose commits can be made to fail; reads always succeed.
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: InMemoryOrderStore,
    fail_commits: Arc<AtomicBool>,
    pub commit_calls: Arc<AtomicU32>,
}

impl FlakyStore {
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderStore for FlakyStore {
    async fn load(&self, order_id: OrderId) -> Result<Option<OrderRecord>, StoreError> {
        self.inner.load(order_id).await
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        self.inner.list_orders().await
    }

    async fn events(&self, order_id: OrderId) -> Result<Vec<OrderEvent>, StoreError> {
        self.inner.events(order_id).await
    }

    async fn pending_releases(&self) -> Result<Vec<PartReservation>, StoreError> {
        self.inner.pending_releases().await
    }

    async fn commit(&self, change: &ChangeSet) -> Result<(), StoreError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inner.commit(change).await
    }
}

/// Writes a commands CSV with the standard header followed by `rows`.
pub fn commands_csv(rows: &[&str]) -> Result<NamedTempFile, Error> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "{HEADER}")?;
    for row in rows {
        writeln!(file, "{row}")?;
    }
    file.flush()?;
    Ok(file)
}
