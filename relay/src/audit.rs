use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::Mutex;

/// One call to the relay. Everything but the timestamp and state is JSON, with tokens already
/// removed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuditRow {
    pub timestamp: String,
    pub state: String,
    pub params: String,
    pub result: String,
    pub identity: String,
    pub internal_errors: String,
}

pub trait AuditSink: Send {
    fn append(&mut self, row: &AuditRow) -> Result<()>;
}

/// Appends rows to a CSV file, writing the header when the file is new.
pub struct CsvSink {
    path: String,
}

impl CsvSink {
    pub fn new(path: String) -> Self {
        Self { path }
    }
}

impl AuditSink for CsvSink {
    fn append(&mut self, row: &AuditRow) -> Result<()> {
        let file = fs_err::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let is_new = file.metadata()?.len() == 0;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        writer.serialize(row)?;
        writer.flush()?;
        Ok(())
    }
}

/// Only one request writes at a time. A request that can't get its turn in time skips its row.
pub struct Audit {
    sink: Mutex<Box<dyn AuditSink>>,
    lock_timeout: Duration,
}

impl Audit {
    pub fn new(sink: Box<dyn AuditSink>, lock_timeout: Duration) -> Self {
        Self {
            sink: Mutex::new(sink),
            lock_timeout,
        }
    }

    /// Failures are only logged; the caller gets their tokens regardless.
    pub async fn record(&self, row: AuditRow) {
        match tokio::time::timeout(self.lock_timeout, self.sink.lock()).await {
            Ok(mut sink) => {
                if let Err(err) = sink.append(&row) {
                    error!("Couldn't write the audit row: {}", err);
                }
            }
            Err(_) => {
                error!(
                    "Gave up waiting {:?} for the audit log; dropping the row for state {}",
                    self.lock_timeout, row.state
                );
            }
        }
    }

    #[cfg(test)]
    pub async fn hold(&self) -> tokio::sync::MutexGuard<'_, Box<dyn AuditSink>> {
        self.sink.lock().await
    }
}


#[cfg(test)]
mod tests {
    use super::memory::MemorySink;
    use super::*;

    fn row(state: &str) -> AuditRow {
        AuditRow {
            timestamp: "2021-03-01T10:00:00+00:00".to_string(),
            state: state.to_string(),
            params: "{}".to_string(),
            result: "{}".to_string(),
            identity: "{}".to_string(),
            internal_errors: "[]".to_string(),
        }
    }

    #[test]
    fn csv_appends() {
        let path = std::env::temp_dir().join(format!("relay_audit_{}.csv", std::process::id()));
        let _ = fs_err::remove_file(&path);
        let mut sink = CsvSink::new(path.display().to_string());
        sink.append(&row("first")).unwrap();
        sink.append(&row("second")).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let states: Vec<String> = reader
            .records()
            .map(|rec| rec.unwrap()[1].to_string())
            .collect();
        assert_eq!(states, vec!["first", "second"]);
        assert_eq!(
            reader.headers().unwrap().iter().collect::<Vec<_>>(),
            vec![
                "timestamp",
                "state",
                "params",
                "result",
                "identity",
                "internal_errors"
            ]
        );
        fs_err::remove_file(&path).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn busy_lock_drops_the_row() {
        let sink = MemorySink::default();
        let audit = Audit::new(Box::new(sink.clone()), Duration::from_secs(30));

        let guard = audit.hold().await;
        audit.record(row("skipped")).await;
        drop(guard);
        audit.record(row("written")).await;

        let rows = sink.0.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, "written");
    }
}
