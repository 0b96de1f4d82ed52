use crate::domain::billing::Amount;
use crate::domain::event::Transition;
use crate::domain::inventory::{PartId, PartLine};
use crate::domain::order::{NewOrder, OrderId, Priority, ServiceType};
use crate::domain::principal::{Actor, Role, UserId};
use crate::error::{EngineError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One raw CSV row. Columns that a command does not use may be left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CommandRecord {
    pub command: String,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub equipment: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub part: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// How a row refers to an order: a per-file alias given at creation, or a
/// literal order id from an earlier run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderRef {
    Alias(String),
    Id(OrderId),
}

impl OrderRef {
    fn parse(value: &str) -> Self {
        match value.parse::<OrderId>() {
            Ok(order_id) => OrderRef::Id(order_id),
            Err(_) => OrderRef::Alias(value.to_string()),
        }
    }
}

/// A validated batch command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create {
        alias: Option<String>,
        actor: Actor,
        new_order: NewOrder,
    },
    Transition {
        order: OrderRef,
        transition: Transition,
        actor: Actor,
        comment: Option<String>,
    },
    SetPriority {
        order: OrderRef,
        priority: Priority,
        actor: Actor,
    },
    RecordPart {
        order: OrderRef,
        line: PartLine,
        actor: Actor,
    },
    RecordPrepayment {
        order: OrderRef,
        actor: Actor,
    },
    Delete {
        order: OrderRef,
        actor: Actor,
    },
    Track {
        order: OrderRef,
        actor: Actor,
    },
    Reconcile,
}

fn required<'a>(value: &'a Option<String>, column: &str, command: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EngineError::Validation(format!("'{command}' requires column '{column}'")))
}

impl CommandRecord {
    fn actor(&self) -> Result<Actor> {
        let id = required(&self.actor, "actor", &self.command)?;
        let role: Role = required(&self.role, "role", &self.command)?
            .parse()
            .map_err(EngineError::Validation)?;
        Ok(Actor::new(role, UserId::new(id)))
    }

    fn order_ref(&self) -> Result<OrderRef> {
        required(&self.order, "order", &self.command).map(OrderRef::parse)
    }

    fn amount(&self) -> Result<Option<Amount>> {
        self.amount.map(Amount::new).transpose()
    }
}

impl TryFrom<CommandRecord> for Command {
    type Error = EngineError;

    fn try_from(record: CommandRecord) -> Result<Self> {
        let name = record.command.to_ascii_lowercase();
        match name.as_str() {
            "create" => {
                let client = required(&record.client, "client", &name)?;
                let equipment = required(&record.equipment, "equipment", &name)?;
                let mut new_order = NewOrder::new(
                    UserId::new(client),
                    equipment,
                    record.comment.clone().unwrap_or_default(),
                )
                .service_type(
                    record
                        .service
                        .as_deref()
                        .unwrap_or_default()
                        .parse::<ServiceType>()
                        .map_err(EngineError::Validation)?,
                )
                .priority(
                    record
                        .priority
                        .as_deref()
                        .unwrap_or_default()
                        .parse::<Priority>()
                        .map_err(EngineError::Validation)?,
                );
                if let Some(labor) = record.amount()? {
                    new_order = new_order.labor_cost(labor);
                }
                Ok(Command::Create {
                    alias: record.order.clone().filter(|alias| !alias.is_empty()),
                    actor: record.actor()?,
                    new_order,
                })
            }
            "priority" => Ok(Command::SetPriority {
                order: record.order_ref()?,
                priority: required(&record.priority, "priority", &name)?
                    .parse()
                    .map_err(EngineError::Validation)?,
                actor: record.actor()?,
            }),
            "part" => {
                let part = required(&record.part, "part", &name)?;
                let quantity = record.quantity.ok_or_else(|| {
                    EngineError::Validation("'part' requires column 'quantity'".to_string())
                })?;
                let unit_price = record.amount()?.unwrap_or(Amount::ZERO);
                Ok(Command::RecordPart {
                    order: record.order_ref()?,
                    line: PartLine::new(PartId::new(part), quantity, unit_price)?,
                    actor: record.actor()?,
                })
            }
            "prepay" => Ok(Command::RecordPrepayment {
                order: record.order_ref()?,
                actor: record.actor()?,
            }),
            "delete" => Ok(Command::Delete {
                order: record.order_ref()?,
                actor: record.actor()?,
            }),
            "track" => Ok(Command::Track {
                order: record.order_ref()?,
                actor: record.actor()?,
            }),
            "reconcile" => Ok(Command::Reconcile),
            other => {
                let transition: Transition = other.parse().map_err(EngineError::Validation)?;
                Ok(Command::Transition {
                    order: record.order_ref()?,
                    transition,
                    actor: record.actor()?,
                    comment: record.comment.clone().filter(|c| !c.is_empty()),
                })
            }
        }
    }
}

/// Reads batch commands from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths,
/// and yields each row already validated into a [`Command`].
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and validates rows; a bad row does not end the stream.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize::<CommandRecord>()
            .map(|row| {
                row.map_err(|e| EngineError::Validation(format!("Malformed row: {e}")))
                    .and_then(Command::try_from)
            })
    }
}
