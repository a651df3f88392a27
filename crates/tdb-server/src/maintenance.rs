//! Periodic table dumps
//!
//! Every table is written back to `<data folder>/<table>.csv` on a fixed
//! interval so the next start reloads it. The file is assembled as
//! `<table>.partial` and renamed once complete.

use csv_async::AsyncWriter;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::DumpConfig;
use crate::db::{RawRows, SqlGateway};

/// How often due tables are checked
pub const MAINTENANCE_TICK: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv_async::Error),

    #[error("Query on {table} failed: {message}")]
    Query { table: String, message: String },
}

/// Write `table` to `<folder>/<table>.csv`, `page_size` rows per query.
///
/// Values are written as SQLite stores them, null as the empty field.
/// Empty tables are skipped and leave no file. On failure the `.partial`
/// file is removed. Returns the rows written.
pub async fn dump_table(
    gateway: &SqlGateway,
    table: &str,
    folder: &Path,
    page_size: usize,
) -> Result<usize, DumpError> {
    let page_size = page_size.max(1);
    let first = fetch_page(gateway, table, 0, 1).await?;
    if first.rows.is_empty() {
        info!(table = %table, "Table is empty, not dumping");
        return Ok(0);
    }

    info!(table = %table, "Dumping table");
    let partial = folder.join(format!("{table}.partial"));
    let target = folder.join(format!("{table}.csv"));

    let dumped = match write_dump(gateway, table, &first.columns, &partial, page_size).await {
        Ok(dumped) => dumped,
        Err(e) => {
            discard(&partial).await;
            return Err(e);
        },
    };

    if let Err(e) = tokio::fs::rename(&partial, &target).await {
        discard(&partial).await;
        return Err(e.into());
    }
    info!(table = %table, records = dumped, "Dump completed");

    Ok(dumped)
}

async fn write_dump(
    gateway: &SqlGateway,
    table: &str,
    columns: &[String],
    partial: &Path,
    page_size: usize,
) -> Result<usize, DumpError> {
    let file = tokio::fs::File::create(partial).await?;
    let mut writer = AsyncWriter::from_writer(file);
    writer.write_record(columns).await?;

    let mut dumped = 0;
    let mut offset = 0;
    loop {
        let page = fetch_page(gateway, table, offset, page_size).await?;
        if page.rows.is_empty() {
            break;
        }

        for row in &page.rows {
            writer
                .write_record(row.iter().map(csv_field))
                .await?;
        }

        dumped += page.rows.len();
        offset += page_size;
    }

    // Flushes through to the file before it is closed
    writer.flush().await?;

    Ok(dumped)
}

// A named fn rather than a closure: its signature is higher-ranked, which
// the spawned maintenance task needs to be `Send`.
fn csv_field(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or_default()
}

async fn fetch_page(
    gateway: &SqlGateway,
    table: &str,
    offset: usize,
    count: usize,
) -> Result<RawRows, DumpError> {
    let sql = format!("SELECT * FROM {table} LIMIT {offset},{count}");

    gateway
        .query_raw(&sql)
        .await
        .map_err(|message| DumpError::Query {
            table: table.to_string(),
            message,
        })
}

async fn discard(partial: &Path) {
    if let Err(e) = tokio::fs::remove_file(partial).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(file = %partial.display(), error = %e, "Failed to remove partial dump");
        }
    }
}

/// Background task dumping every table on an interval
pub struct Maintenance {
    gateway: Arc<SqlGateway>,
    data_folder: PathBuf,
    interval: Duration,
    page_size: usize,
    schedule: HashMap<String, Instant>,
}

impl Maintenance {
    pub fn new(gateway: Arc<SqlGateway>, data_folder: PathBuf, config: &DumpConfig) -> Self {
        Self {
            gateway,
            data_folder,
            interval: Duration::from_secs(config.interval_minutes.saturating_mul(60)),
            page_size: config.record_count,
            schedule: HashMap::new(),
        }
    }

    /// Run forever on [`MAINTENANCE_TICK`]. Abort the handle to stop.
    pub fn start(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.interval.as_secs(),
                "Maintenance routine started"
            );
            let mut ticker = tokio::time::interval(MAINTENANCE_TICK);

            loop {
                ticker.tick().await;
                self.run_due(Instant::now()).await;
            }
        })
    }

    pub fn is_scheduled(&self, table: &str) -> bool {
        self.schedule.contains_key(table)
    }

    /// Dump every table whose deadline has passed.
    ///
    /// A table seen for the first time is only scheduled, one interval out.
    /// Tables that no longer exist are forgotten. Returns the tables dumped.
    pub async fn run_due(&mut self, now: Instant) -> Vec<String> {
        let tables = self.gateway.list_tables().await;
        self.schedule.retain(|table, _| tables.contains(table));

        let mut dumped = Vec::new();

        for table in tables {
            let Some(due) = self.schedule.get(&table).copied() else {
                self.schedule.insert(table, now + self.interval);
                continue;
            };
            if due > now {
                continue;
            }

            match dump_table(&self.gateway, &table, &self.data_folder, self.page_size).await {
                Ok(_) => dumped.push(table.clone()),
                Err(e) => error!(table = %table, error = %e, "Dump failed"),
            }
            self.schedule.insert(table, now + self.interval);
        }

        dumped
    }
}
