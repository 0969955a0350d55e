use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::errors::ScreenFlowResult;

/// What happened to one edge of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Verified,
    Optimistic,
    DispatchFailed,
    ValidationFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub run_id: Uuid,
    pub ts: i64,
    pub step: usize,
    pub from: String,
    pub to: String,
    pub operation: String,
    pub outcome: StepOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_node: Option<String>,
}

/// Append-only JSONL log of the steps of one run.
pub struct RunJournal {
    pub run_id: Uuid,
    file_path: PathBuf,
}

impl RunJournal {
    pub async fn new(run_id: Uuid, directory: &Path) -> Self {
        if let Err(e) = tokio::fs::create_dir_all(directory).await {
            tracing::warn!(path = %directory.display(), error = %e, "journal directory unavailable");
        }
        let file_path = directory.join(format!("run_{run_id}.jsonl"));
        Self { run_id, file_path }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub async fn append(&self, entry: &JournalEntry) -> ScreenFlowResult<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        tracing::debug!(path = %self.file_path.display(), step = entry.step, "journal entry written");
        Ok(())
    }

    /// Journal failures are logged and otherwise ignored.
    pub async fn record(&self, entry: JournalEntry) {
        if let Err(e) = self.append(&entry).await {
            tracing::warn!(run = %self.run_id, error = %e, "failed to write journal entry");
        }
    }
}

/// `<data dir>/screenflow/runs`, falling back to the current directory.
pub fn default_journal_dir() -> PathBuf {
    match dirs::data_local_dir() {
        Some(base) => base.join("screenflow").join("runs"),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
