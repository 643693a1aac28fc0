//! Append-only record of completed client operations, one JSON object per
//! line. Logging is best effort: callers never wait on the disk.

use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    fs::File,
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    FileSystemError(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("History writer failed: {0}")]
    Writer(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    Get,
    Put,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub client_id: usize,
    pub op_type: OpType,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_value: Option<String>,
    pub start_nanos: i64,
    pub end_nanos: i64,
}

impl HistoryEntry {
    pub fn get(client_id: usize, key: &[u8], output: &[u8], start_nanos: i64, end_nanos: i64) -> Self {
        Self {
            client_id,
            op_type: OpType::Get,
            key: String::from_utf8_lossy(key).into_owned(),
            input_value: None,
            output_value: Some(String::from_utf8_lossy(output).into_owned()),
            start_nanos,
            end_nanos,
        }
    }

    pub fn put(client_id: usize, key: &[u8], input: &[u8], start_nanos: i64, end_nanos: i64) -> Self {
        Self {
            client_id,
            op_type: OpType::Put,
            key: String::from_utf8_lossy(key).into_owned(),
            input_value: Some(String::from_utf8_lossy(input).into_owned()),
            output_value: None,
            start_nanos,
            end_nanos,
        }
    }
}

/// Wall-clock nanoseconds since the Unix epoch.
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

/// Cheap, cloneable sending side. Entries are queued without backpressure.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    sender: UnboundedSender<HistoryEntry>,
}

/// Owns the background task that drains the queue into the file.
#[derive(Debug)]
pub struct HistoryWriter {
    task: JoinHandle<Result<u64, HistoryError>>,
}

impl HistoryLog {
    /// Truncates `path` and starts the writer task.
    pub async fn create(path: impl AsRef<Path>) -> Result<(HistoryLog, HistoryWriter), HistoryError> {
        let file = File::create(path.as_ref()).await?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_entries(BufWriter::new(file), receiver));
        Ok((HistoryLog { sender }, HistoryWriter { task }))
    }

    pub fn log(&self, entry: HistoryEntry) {
        // a closed writer only loses history, never the run
        let _ = self.sender.send(entry);
    }
}

impl HistoryWriter {
    /// Waits for every [`HistoryLog`] clone to be dropped, then flushes.
    /// Returns the number of entries written.
    pub async fn finish(self) -> Result<u64, HistoryError> {
        self.task.await?
    }
}

async fn write_entries(
    mut out: BufWriter<File>,
    mut receiver: UnboundedReceiver<HistoryEntry>,
) -> Result<u64, HistoryError> {
    let mut written = 0;
    while let Some(entry) = receiver.recv().await {
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        if let Err(e) = out.write_all(&line).await {
            tracing::warn!("failed to write history entry: {}", e);
            continue;
        }
        written += 1;
    }
    out.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_optional_values_are_omitted() -> Result<(), HistoryError> {
        let get = serde_json::to_string(&HistoryEntry::get(3, b"10", b"v", 1, 2))?;
        assert_eq!(
            get,
            r#"{"client_id":3,"op_type":"get","key":"10","output_value":"v","start_nanos":1,"end_nanos":2}"#
        );
        let put = serde_json::to_string(&HistoryEntry::put(0, b"7", b"xx", 5, 9))?;
        assert!(put.contains(r#""input_value":"xx""#));
        assert!(!put.contains("output_value"));
        Ok(())
    }

    #[tokio::test]
    async fn test_writes_one_line_per_entry() -> Result<(), HistoryError> {
        let dir = tempdir()?;
        let path = dir.path().join("history.jsonl");
        let (log, writer) = HistoryLog::create(&path).await?;

        let clone = log.clone();
        log.log(HistoryEntry::put(1, b"1", b"a", 10, 20));
        clone.log(HistoryEntry::get(1, b"1", b"a", 30, 40));
        drop(log);
        drop(clone);
        assert_eq!(writer.finish().await?, 2);

        let contents = tokio::fs::read_to_string(&path).await?;
        let entries: Vec<HistoryEntry> = contents
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].op_type, OpType::Put);
        assert_eq!(entries[1].output_value.as_deref(), Some("a"));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_fails_for_missing_directory() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("history.jsonl");
        assert!(matches!(
            HistoryLog::create(&path).await,
            Err(HistoryError::FileSystemError(_))
        ));
    }

    #[test]
    fn test_now_nanos_moves_forward() {
        let a = now_nanos();
        let b = now_nanos();
        assert!(a > 0 && b >= a);
    }
}
