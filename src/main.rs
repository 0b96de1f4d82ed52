use clap::Parser;
use miette::{IntoDiagnostic, Result};
use repair_orders::application::config::EngineConfig;
use repair_orders::application::engine::{Collaborators, OrderEngine};
use repair_orders::domain::inventory::PartId;
use repair_orders::domain::ports::OrderStoreBox;
use repair_orders::domain::principal::Actor;
use repair_orders::infrastructure::collaborators::{InMemoryBilling, InMemoryInventory, LogNotifier};
use repair_orders::infrastructure::in_memory::InMemoryOrderStore;
#[cfg(feature = "storage-rocksdb")]
use repair_orders::infrastructure::rocksdb::RocksDBStore;
use repair_orders::interfaces::csv::batch::BatchRunner;
use repair_orders::interfaces::csv::command_reader::CommandReader;
use repair_orders::interfaces::csv::order_writer::OrderWriter;
use repair_orders::telemetry::{self, LogFormat};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "REPAIR_ORDERS_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Initial stock for the in-memory inventory ledger, as PART=QUANTITY.
    #[arg(long = "stock", value_parser = parse_stock)]
    stock: Vec<(PartId, u32)>,

    /// How long a command waits for another command on the same order.
    #[arg(long, env = "REPAIR_ORDERS_LOCK_TIMEOUT_MS", default_value_t = 5_000)]
    lock_timeout_ms: u64,

    /// Budget for each inventory, billing and notification call.
    #[arg(long, env = "REPAIR_ORDERS_COLLABORATOR_TIMEOUT_MS", default_value_t = 3_000)]
    collaborator_timeout_ms: u64,

    /// Budget for each store read or commit.
    #[arg(long, env = "REPAIR_ORDERS_STORE_TIMEOUT_MS", default_value_t = 3_000)]
    store_timeout_ms: u64,

    /// Pause before retrying a transient failure.
    #[arg(long, env = "REPAIR_ORDERS_RETRY_BACKOFF_MS", default_value_t = 50)]
    retry_backoff_ms: u64,

    /// Default log level; RUST_LOG overrides it.
    #[arg(long, env = "REPAIR_ORDERS_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[arg(long, env = "REPAIR_ORDERS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_lock_timeout(Duration::from_millis(self.lock_timeout_ms))
            .with_collaborator_timeout(Duration::from_millis(self.collaborator_timeout_ms))
            .with_store_timeout(Duration::from_millis(self.store_timeout_ms))
            .with_retry_backoff(Duration::from_millis(self.retry_backoff_ms))
    }
}

fn parse_stock(value: &str) -> Result<(PartId, u32), String> {
    let (part, quantity) = value
        .split_once('=')
        .ok_or_else(|| format!("expected PART=QUANTITY, got '{value}'"))?;
    let quantity = quantity
        .trim()
        .parse()
        .map_err(|e| format!("invalid quantity for '{part}': {e}"))?;
    Ok((PartId::new(part.trim()), quantity))
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<PathBuf>) -> Result<OrderStoreBox> {
    match db_path {
        Some(path) => Ok(Box::new(RocksDBStore::open(path).into_diagnostic()?)),
        None => Ok(Box::new(InMemoryOrderStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<PathBuf>) -> Result<OrderStoreBox> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Box::new(InMemoryOrderStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_logger(&cli.log_level, cli.log_format).into_diagnostic()?;

    let inventory = cli
        .stock
        .iter()
        .fold(InMemoryInventory::new(), |ledger, (part_id, quantity)| {
            ledger.with_stock(part_id.clone(), *quantity)
        });
    let collaborators = Collaborators {
        inventory: Box::new(inventory),
        billing: Box::new(InMemoryBilling::new()),
        notifier: Arc::new(LogNotifier),
    };
    let config = cli.engine_config();
    let store = open_store(cli.db_path)?;
    let mut runner = BatchRunner::new(OrderEngine::new(store, collaborators, config));

    // Process commands
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for (row, command) in reader.commands().enumerate() {
        let line = row + 2;
        match command {
            Ok(command) => {
                if let Err(e) = runner.execute(command).await {
                    eprintln!("Error processing command on line {line}: {e}");
                }
            }
            Err(e) => {
                eprintln!("Error reading command on line {line}: {e}");
            }
        }
    }

    let views = runner
        .report(&Actor::admin("batch"))
        .await
        .into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = OrderWriter::new(stdout.lock());
    writer.write_orders(&views).into_diagnostic()?;

    Ok(())
}
