//! Event sinks: where the runner streams events as they happen.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::domain::{MatchEvent, Result};

#[async_trait]
pub trait EventSink: Send {
    async fn append(&mut self, event: &MatchEvent) -> Result<()>;
}

/// Keeps events in memory. Used by tests and replay tooling.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Vec<MatchEvent>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[MatchEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<MatchEvent> {
        self.events
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn append(&mut self, event: &MatchEvent) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }
}

/// Appends one JSON line per event and flushes after every line so a
/// viewer tailing the file never sees a partial record.
#[derive(Debug)]
pub struct JsonlEventSink {
    path: PathBuf,
    file: File,
}

impl JsonlEventSink {
    /// Create the log file. Fails if it already exists.
    pub async fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventSink for JsonlEventSink {
    async fn append(&mut self, event: &MatchEvent) -> Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        self.file.write_all(&line).await?;
        self.file.flush().await?;
        Ok(())
    }
}
