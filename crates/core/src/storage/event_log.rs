use crate::events::{Event, EventLog};
use crate::types::WorkflowId;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// Number of buffered events that triggers a flush to disk
const FLUSH_THRESHOLD: usize = 100;

/// Event log that appends events to a JSONL (JSON Lines) file
pub struct JsonlEventLog {
    path: PathBuf,
    // Events not yet written to disk
    buffer: RwLock<Vec<Event>>,
}

impl JsonlEventLog {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create event log directory")?;
        }
        Ok(Self {
            path,
            buffer: RwLock::new(Vec::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write buffered events to disk
    pub async fn flush(&self) -> Result<()> {
        let mut buffer = self.buffer.write().await;
        if buffer.is_empty() {
            return Ok(());
        }

        let mut lines = String::new();
        for event in buffer.iter() {
            let json = serde_json::to_string(event).context("Failed to serialize event")?;
            lines.push_str(&json);
            lines.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context("Failed to open event log file")?;
        file.write_all(lines.as_bytes())
            .await
            .context("Failed to write event log file")?;
        file.flush().await.context("Failed to flush event log file")?;

        buffer.clear();
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Event>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .context("Failed to read event log file")?;

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context("Failed to parse event"))
            .collect()
    }
}

#[async_trait::async_trait]
impl EventLog for JsonlEventLog {
    async fn append(&self, event: Event) -> Result<()> {
        let mut buffer = self.buffer.write().await;
        buffer.push(event);

        if buffer.len() >= FLUSH_THRESHOLD {
            drop(buffer);
            self.flush().await?;
        }

        Ok(())
    }

    async fn get_workflow_events(&self, workflow_id: WorkflowId) -> Result<Vec<Event>> {
        // Flush any buffered events first
        self.flush().await?;

        let mut events: Vec<Event> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|e| e.workflow_id == workflow_id)
            .collect();
        events.sort_by_key(|e| e.timestamp);

        Ok(events)
    }
}

/// In-process event log, mainly for observers living in the same process
#[derive(Default)]
pub struct MemoryEventLog {
    events: RwLock<Vec<Event>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded event
    pub async fn events(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }
}

#[async_trait::async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, event: Event) -> Result<()> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn get_workflow_events(&self, workflow_id: WorkflowId) -> Result<Vec<Event>> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect())
    }
}

/// Event log that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventLog;

#[async_trait::async_trait]
impl EventLog for NullEventLog {
    async fn append(&self, _event: Event) -> Result<()> {
        Ok(())
    }

    async fn get_workflow_events(&self, _workflow_id: WorkflowId) -> Result<Vec<Event>> {
        Ok(Vec::new())
    }
}
