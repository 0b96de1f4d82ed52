use super::command_reader::{Command, OrderRef};
use crate::application::engine::OrderEngine;
use crate::domain::order::{Order, OrderFilter, OrderId, OrderView};
use crate::domain::principal::Actor;
use crate::error::{EngineError, Result};
use std::collections::HashMap;
use tracing::info;

/// Applies batch commands to an engine, resolving per-file order aliases.
pub struct BatchRunner {
    engine: OrderEngine,
    aliases: HashMap<String, OrderId>,
}

impl BatchRunner {
    pub fn new(engine: OrderEngine) -> Self {
        Self {
            engine,
            aliases: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &OrderEngine {
        &self.engine
    }

    pub async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Create {
                alias,
                actor,
                new_order,
            } => {
                if let Some(alias) = &alias
                    && self.aliases.contains_key(alias)
                {
                    return Err(EngineError::Validation(format!(
                        "Order alias '{alias}' is already in use"
                    )));
                }
                let order = self.engine.create_order(new_order, &actor).await?;
                if let Some(alias) = alias {
                    self.aliases.insert(alias, order.order_id);
                }
            }
            Command::Transition {
                order,
                transition,
                actor,
                comment,
            } => {
                let order_id = self.resolve(&order)?;
                self.engine
                    .apply_transition(order_id, transition, &actor, comment)
                    .await?;
            }
            Command::SetPriority {
                order,
                priority,
                actor,
            } => {
                let order_id = self.resolve(&order)?;
                self.engine.set_priority(order_id, priority, &actor).await?;
            }
            Command::RecordPart { order, line, actor } => {
                let order_id = self.resolve(&order)?;
                self.engine.record_part(order_id, line, &actor).await?;
            }
            Command::RecordPrepayment { order, actor } => {
                let order_id = self.resolve(&order)?;
                self.engine.record_prepayment(order_id, &actor).await?;
            }
            Command::Delete { order, actor } => {
                let order_id = self.resolve(&order)?;
                self.engine.delete_order(order_id, &actor).await?;
            }
            Command::Track { order, actor } => {
                let order_id = self.resolve(&order)?;
                let view = self.engine.track_order(order_id, &actor).await?;
                info!(%order_id, status = %view.order.status, events = view.events.len(), "tracked");
            }
            Command::Reconcile => {
                self.engine.reconcile_releases().await?;
            }
        }
        Ok(())
    }

    fn resolve(&self, order: &OrderRef) -> Result<OrderId> {
        match order {
            OrderRef::Id(order_id) => Ok(*order_id),
            OrderRef::Alias(alias) => self.aliases.get(alias).copied().ok_or_else(|| {
                EngineError::Validation(format!("Unknown order alias '{alias}'"))
            }),
        }
    }

    /// Every stored order with its history, oldest first.
    pub async fn report(&self, actor: &Actor) -> Result<Vec<OrderView>> {
        let mut orders = self.engine.list_orders(&OrderFilter::default(), actor).await?;
        oldest_first(&mut orders);
        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            views.push(self.engine.track_order(order.order_id, actor).await?);
        }
        Ok(views)
    }
}

/// Creation order; orders opened in the same instant fall back to id order.
fn oldest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.order_id.cmp(&b.order_id))
    });
}
