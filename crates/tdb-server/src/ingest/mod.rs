//! Bulk loading of delimited files
//!
//! One [`BatchIngestor`] task runs per file. The first record of a file names
//! the columns, the file stem names the table, and the remaining records are
//! copied into a fixed-capacity [`BatchRequest`] that is flushed through
//! [`SqlGateway::execute_batch`] whenever it fills up and once more at end of
//! input if rows are pending. Ingestors share nothing but the gateway.

use csv_async::{AsyncReaderBuilder, StringRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tdb_common::BatchRequest;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::db::SqlGateway;

/// Rows per flush
pub const BATCH_SIZE: usize = 500;

/// Extension of the files picked up from a data folder
pub const DATA_FILE_EXTENSION: &str = "csv";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot derive a table name from {0}")]
    TableName(PathBuf),

    #[error("Read failed in {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv_async::Error,
    },
}

/// Outcome of one file
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub path: PathBuf,
    pub table: String,
    /// Sum of the affected counts returned by every flush
    pub records: u64,
    /// Data records read (header excluded, unreadable records excluded)
    pub rows_read: usize,
    /// Records skipped because they could not be read
    pub skipped: usize,
    /// Active row count of each flush, in order
    pub batch_sizes: Vec<usize>,
    pub elapsed: Duration,
}

/// Table name for a data file: its base name without extension
pub fn table_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}

/// `INSERT INTO <table> (<c1,c2,...>) VALUES (?,?,...)`
pub fn insert_statement(table: &str, columns: &[&str]) -> String {
    let placeholders = vec!["?"; columns.len()].join(",");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(","),
        placeholders
    )
}

/// Loads one file into the database
pub struct BatchIngestor {
    gateway: Arc<SqlGateway>,
    path: PathBuf,
}

impl BatchIngestor {
    pub fn new(gateway: Arc<SqlGateway>, path: impl Into<PathBuf>) -> Self {
        Self {
            gateway,
            path: path.into(),
        }
    }

    /// Stream the file into its table.
    ///
    /// Only a file that cannot be opened (or an I/O failure mid-read) fails
    /// the whole file; unreadable records are logged and skipped.
    pub async fn ingest(&self) -> Result<IngestReport, IngestError> {
        let started = Instant::now();
        let path = self.path.clone();
        let table = table_name(&path).ok_or_else(|| IngestError::TableName(path.clone()))?;

        info!(file = %path.display(), table = %table, "Loading data");

        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|source| IngestError::Open {
                path: path.clone(),
                source,
            })?;

        let mut reader = AsyncReaderBuilder::new()
            .has_headers(false)
            .create_reader(file);

        let mut report = IngestReport {
            path: path.clone(),
            table: table.clone(),
            records: 0,
            rows_read: 0,
            skipped: 0,
            batch_sizes: Vec::new(),
            elapsed: Duration::ZERO,
        };

        let mut batch: Option<BatchRequest> = None;
        let mut record = StringRecord::new();

        loop {
            match reader.read_record(&mut record).await {
                Ok(true) => {},
                Ok(false) => break,
                Err(e) if matches!(e.kind(), csv_async::ErrorKind::Io(_)) => {
                    return Err(IngestError::Read { path, source: e });
                },
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping unreadable record");
                    report.skipped += 1;
                    continue;
                },
            }

            if batch.is_none() {
                let columns: Vec<&str> = record.iter().collect();
                debug!(file = %path.display(), headers = ?columns, "Header read");
                batch = Some(BatchRequest::with_capacity(
                    insert_statement(&table, &columns),
                    BATCH_SIZE,
                    columns.len(),
                ));
                continue;
            }
            let Some(pending) = batch.as_mut() else {
                continue;
            };

            pending.push_row(record.iter());
            report.rows_read += 1;

            if pending.is_full() {
                self.flush(pending, &mut report).await;
            }
        }

        if let Some(pending) = batch.as_mut() {
            if !pending.is_empty() {
                self.flush(pending, &mut report).await;
            }
        }

        report.elapsed = started.elapsed();
        info!(
            file = %path.display(),
            table = %table,
            records = report.records,
            skipped = report.skipped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Loading completed"
        );

        Ok(report)
    }

    async fn flush(&self, batch: &mut BatchRequest, report: &mut IngestReport) {
        let result = self.gateway.execute_batch(batch).await;
        report.batch_sizes.push(batch.active_count());

        match result.affected_count() {
            Some(count) => report.records += count,
            None => error!(
                file = %self.path.display(),
                rows = batch.active_count(),
                error = result.error_message().unwrap_or_default(),
                "Batch insert failed"
            ),
        }

        batch.reset();
    }
}

/// Ingestion tasks of one data folder
#[derive(Default)]
pub struct IngestHandle {
    tasks: JoinSet<Result<IngestReport, IngestError>>,
}

impl IngestHandle {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every file. Failed or aborted files are logged and left out.
    pub async fn join(mut self) -> Vec<IngestReport> {
        let mut reports = Vec::new();

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => error!(error = %e, "Ingestion failed"),
                Err(e) if e.is_cancelled() => warn!("Ingestion task cancelled"),
                Err(e) => error!(error = %e, "Ingestion task panicked"),
            }
        }

        reports
    }

    /// Wait up to `timeout` for the files still loading, then abort the rest.
    pub async fn shutdown(mut self, timeout: Duration) -> Vec<IngestReport> {
        if self.tasks.is_empty() {
            return Vec::new();
        }

        info!(pending = self.tasks.len(), "Waiting for ingestion to finish");
        let mut reports = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let next = tokio::time::timeout_at(deadline, self.tasks.join_next()).await;
            match next {
                Ok(Some(Ok(Ok(report)))) => reports.push(report),
                Ok(Some(Ok(Err(e)))) => error!(error = %e, "Ingestion failed"),
                Ok(Some(Err(e))) => error!(error = %e, "Ingestion task ended abnormally"),
                Ok(None) => break,
                Err(_) => {
                    warn!(pending = self.tasks.len(), "Ingestion timed out, aborting");
                    self.tasks.abort_all();
                    reports.extend(self.join().await);
                    break;
                },
            }
        }

        reports
    }
}

/// Start one ingestor per data file of `folder`.
///
/// Files without the `.csv` extension are ignored. A folder that cannot be
/// listed yields an empty handle.
pub async fn spawn_folder(gateway: Arc<SqlGateway>, folder: &Path) -> IngestHandle {
    let mut tasks = JoinSet::new();

    let files = match crate::db::schema::list_files(folder).await {
        Ok(files) => files,
        Err(e) => {
            error!(folder = %folder.display(), error = %e, "Cannot read data folder");
            return IngestHandle { tasks };
        },
    };

    for path in files {
        let is_data = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(DATA_FILE_EXTENSION));

        if !is_data {
            info!(file = %path.display(), "Ignoring file, will not load");
            continue;
        }

        let ingestor = BatchIngestor::new(gateway.clone(), path);
        tasks.spawn(async move { ingestor.ingest().await });
    }

    IngestHandle { tasks }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_strips_extension() {
        assert_eq!(table_name(Path::new("/data/people.csv")), Some("people".to_string()));
        assert_eq!(table_name(Path::new("orders.2024.csv")), Some("orders.2024".to_string()));
        assert_eq!(table_name(Path::new("plain")), Some("plain".to_string()));
        assert_eq!(table_name(Path::new("/")), None);
    }

    #[test]
    fn test_insert_statement() {
        assert_eq!(
            insert_statement("people", &["id", "name", "active"]),
            "INSERT INTO people (id,name,active) VALUES (?,?,?)"
        );
        assert_eq!(
            insert_statement("one", &["x"]),
            "INSERT INTO one (x) VALUES (?)"
        );
    }
}
