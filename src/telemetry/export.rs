//! Per-completion records and the sinks they are delivered to.

use crate::error::Result;
use crate::model::Prediction;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Predicted and observed duration of one finished task, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub task_id: u64,
    pub configuration: String,
    pub kernel: String,
    pub flop: f64,
    /// `None` while the kernel has too few samples to fit.
    pub online: Option<f64>,
    pub offline: f64,
    pub hybrid: f64,
    pub actual: f64,
}

impl CompletionRecord {
    pub fn new(
        task_id: u64,
        configuration: &str,
        kernel: &str,
        prediction: &Prediction,
        actual: f64,
    ) -> Self {
        Self {
            task_id,
            configuration: configuration.to_string(),
            kernel: kernel.to_string(),
            flop: prediction.flop,
            online: prediction.online,
            offline: prediction.offline,
            hybrid: prediction.hybrid,
            actual,
        }
    }
}

/// Receives one record per completed task, on the completing queue's
/// worker thread.
pub trait CompletionObserver: Send + Sync {
    fn on_completion(&self, record: &CompletionRecord);
}

/// Logs each record at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CompletionObserver for TracingObserver {
    fn on_completion(&self, record: &CompletionRecord) {
        tracing::info!(
            task = record.task_id,
            configuration = %record.configuration,
            kernel = %record.kernel,
            flop = record.flop,
            online = ?record.online,
            offline = record.offline,
            hybrid = record.hybrid,
            actual = record.actual,
            "task completed"
        );
    }
}

/// Appends records to a file, one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesObserver {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesObserver {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, record: &CompletionRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = self.file.lock();
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Read back every record in a measurement log.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Vec<CompletionRecord>> {
        let contents = std::fs::read_to_string(path)?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }
}

impl CompletionObserver for JsonLinesObserver {
    fn on_completion(&self, record: &CompletionRecord) {
        if let Err(err) = self.write(record) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to append measurement");
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    records: Mutex<Vec<CompletionRecord>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CompletionRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl CompletionObserver for CollectingObserver {
    fn on_completion(&self, record: &CompletionRecord) {
        self.records.lock().push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(task_id: u64, online: Option<f64>) -> CompletionRecord {
        CompletionRecord {
            task_id,
            configuration: "mmult_f_d".into(),
            kernel: "matrixMult".into(),
            flop: 2.0e9,
            online,
            offline: 0.04,
            hybrid: 0.045,
            actual: 0.05,
        }
    }

    #[test]
    fn test_json_lines_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("measurements.jsonl");

        let observer = JsonLinesObserver::create(&path).unwrap();
        observer.on_completion(&sample(0, None));
        observer.on_completion(&sample(1, Some(0.06)));

        let records = JsonLinesObserver::read(&path).unwrap();
        assert_eq!(records, vec![sample(0, None), sample(1, Some(0.06))]);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.lines().next().unwrap().contains("\"online\":null"));
    }

    #[test]
    fn test_json_lines_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");

        JsonLinesObserver::create(&path)
            .unwrap()
            .on_completion(&sample(0, None));
        JsonLinesObserver::create(&path)
            .unwrap()
            .on_completion(&sample(1, None));

        assert_eq!(JsonLinesObserver::read(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_collecting_observer() {
        let observer = CollectingObserver::new();
        assert!(observer.is_empty());
        observer.on_completion(&sample(3, None));
        assert_eq!(observer.records()[0].task_id, 3);
        observer.clear();
        assert_eq!(observer.len(), 0);
    }

    #[test]
    fn test_record_from_prediction() {
        let prediction = Prediction {
            flop: 8.0,
            online: Some(1.0),
            offline: 2.0,
            hybrid: 1.5,
        };
        let record = CompletionRecord::new(9, "cfg", "k", &prediction, 1.25);
        assert_eq!(record.flop, 8.0);
        assert_eq!(record.online, Some(1.0));
        assert_eq!(record.actual, 1.25);
    }
}
