use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

/// Reservation snapshot mirrored to the external ledger after
/// create/cancel/confirm. Timestamps are RFC 3339 with explicit offsets,
/// prices are decimal text — the shape the spreadsheet side expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub reservation_id: String,
    pub unit_id: String,
    pub unit_name: String,
    pub guest_id: String,
    pub check_in: String,
    pub check_out: String,
    pub total_price: String,
    pub status: String,
    pub recorded_at: String,
}

/// Where mirrored entries land. Implementations must not block for long;
/// the pipeline runs them off the commit path.
pub trait LedgerSink: Send + Sync {
    fn record(&self, entry: &LedgerEntry) -> io::Result<()>;
}

/// Append-only JSON-lines mirror file — the local stand-in for a
/// spreadsheet/CRM export.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl LedgerSink for JsonlSink {
    fn record(&self, entry: &LedgerEntry) -> io::Result<()> {
        let line = serde_json::to_string(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}

/// In-memory sink for tests and embedding.
#[derive(Default)]
pub struct MemorySink {
    entries: std::sync::Mutex<Vec<LedgerEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl LedgerSink for MemorySink {
    fn record(&self, entry: &LedgerEntry) -> io::Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

const QUEUE_CAPACITY: usize = 1024;

/// Fire-and-forget mirror pipeline: entries are queued to a background
/// task that feeds the sink. Sink failures are logged and counted, never
/// surfaced to the booking path — a dead spreadsheet must not fail or
/// delay a commit.
pub struct Ledger {
    tx: mpsc::Sender<LedgerEntry>,
}

impl Ledger {
    pub fn spawn(sink: Arc<dyn LedgerSink>) -> Arc<Self> {
        let (tx, mut rx) = mpsc::channel::<LedgerEntry>(QUEUE_CAPACITY);
        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                if let Err(e) = sink.record(&entry) {
                    metrics::counter!(crate::observability::LEDGER_FAILURES_TOTAL).increment(1);
                    warn!("ledger mirror failed for {}: {e}", entry.reservation_id);
                }
            }
        });
        Arc::new(Self { tx })
    }

    /// Queue an entry. Never blocks; a full queue drops the entry with a warning.
    pub fn record(&self, entry: LedgerEntry) {
        if let Err(e) = self.tx.try_send(entry) {
            metrics::counter!(crate::observability::LEDGER_DROPPED_TOTAL).increment(1);
            warn!("ledger queue full, dropping entry: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(id: &str) -> LedgerEntry {
        LedgerEntry {
            reservation_id: id.into(),
            unit_id: "u".into(),
            unit_name: "Studio 1A".into(),
            guest_id: "g".into(),
            check_in: "2026-09-01T14:00:00+00:00".into(),
            check_out: "2026-09-03T14:00:00+00:00".into(),
            total_price: "2000".into(),
            status: "pending".into(),
            recorded_at: "2026-08-07T10:00:00+00:00".into(),
        }
    }

    #[tokio::test]
    async fn entries_reach_the_sink() {
        let sink = Arc::new(MemorySink::new());
        let ledger = Ledger::spawn(sink.clone());

        ledger.record(entry("a"));
        ledger.record(entry("b"));

        // Background task drains asynchronously
        tokio::time::sleep(Duration::from_millis(50)).await;
        let seen = sink.entries();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].reservation_id, "a");
        assert_eq!(seen[1].reservation_id, "b");
    }

    #[tokio::test]
    async fn sink_failure_does_not_propagate() {
        struct FailingSink;
        impl LedgerSink for FailingSink {
            fn record(&self, _entry: &LedgerEntry) -> io::Result<()> {
                Err(io::Error::other("sheet is gone"))
            }
        }

        let ledger = Ledger::spawn(Arc::new(FailingSink));
        // Must not panic or error back
        ledger.record(entry("doomed"));
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn jsonl_sink_appends_lines() {
        let dir = std::env::temp_dir().join("stayd_test_ledger");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("mirror_{}.jsonl", ulid::Ulid::new()));

        let sink = JsonlSink::new(path.clone());
        sink.record(&entry("a")).unwrap();
        sink.record(&entry("b")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["reservation_id"], "a");

        let _ = std::fs::remove_file(&path);
    }
}
