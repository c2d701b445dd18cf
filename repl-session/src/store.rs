//! The append-only session store.

use std::path::Path;

use chrono::{DateTime, Utc};
use repl_types::StoreError;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::entry::{EntryDraft, SessionEntry};
use crate::layout::Layout;

/// How to address the session to open.
#[derive(Debug, Clone)]
pub enum SessionTarget {
    /// Start a fresh session with a new UUID.
    New,
    /// Resume an existing session by id.
    Id(Uuid),
    /// Open by short name: resume if the name is known, otherwise create a
    /// session and record the mapping.
    Name(String),
}

/// A session's identity plus listing detail.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Session id.
    pub id: Uuid,
    /// Short name, when one was recorded.
    pub name: Option<String>,
    /// Last-modified time of the journal.
    pub modified: DateTime<Utc>,
    /// Number of readable entries.
    pub entries: usize,
}

/// One line of the `names` file.
#[derive(Debug, Serialize, Deserialize)]
struct NameRecord {
    name: String,
    id: Uuid,
}

/// Journals session entries to an append-only JSONL file.
///
/// Each append serializes one JSON object, writes line + newline, and
/// flushes, so readers observe every completed append and a crash loses at
/// most the final partial line.
#[derive(Debug)]
pub struct SessionStore {
    layout: Layout,
    session_id: Uuid,
    file: tokio::fs::File,
    last_uuid: Option<Uuid>,
    loaded: Vec<SessionEntry>,
}

impl SessionStore {
    /// Create or resume a session.
    ///
    /// Resuming reads every entry (tolerating a truncated final line, which
    /// is discarded) so the caller can replay the conversation. Resuming an
    /// unknown id fails with [`StoreError::NotFound`].
    pub async fn open(layout: Layout, target: SessionTarget) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(layout.sessions_dir()).await?;

        let session_id = match target {
            SessionTarget::New => Uuid::new_v4(),
            SessionTarget::Id(id) => {
                if !tokio::fs::try_exists(layout.session_file(id)).await? {
                    return Err(StoreError::NotFound(id.to_string()));
                }
                id
            }
            SessionTarget::Name(name) => match lookup_name(&layout, &name).await? {
                Some(id) => id,
                None => {
                    let id = Uuid::new_v4();
                    record_name(&layout, &name, id).await?;
                    id
                }
            },
        };

        let path = layout.session_file(session_id);
        let loaded = if tokio::fs::try_exists(&path).await? {
            let (entries, valid_bytes) = read_entries(&path).await?;
            let file_len = tokio::fs::metadata(&path).await?.len();
            if valid_bytes < file_len {
                tracing::warn!(
                    session = %session_id,
                    lost = file_len - valid_bytes,
                    "discarding truncated trailing journal line"
                );
                let file = tokio::fs::OpenOptions::new().write(true).open(&path).await?;
                file.set_len(valid_bytes).await?;
            }
            entries
        } else {
            Vec::new()
        };

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let last_uuid = loaded.last().map(|entry| entry.uuid);

        tracing::debug!(session = %session_id, resumed_entries = loaded.len(), "session open");
        Ok(Self {
            layout,
            session_id,
            file,
            last_uuid,
            loaded,
        })
    }

    /// The session's id.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// The store's layout.
    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Entries read back when the session was resumed.
    #[must_use]
    pub fn loaded_entries(&self) -> &[SessionEntry] {
        &self.loaded
    }

    /// Thread a draft into the session and journal it. Returns the new
    /// entry's uuid.
    pub async fn append(&mut self, draft: EntryDraft) -> Result<Uuid, StoreError> {
        let entry = SessionEntry {
            session_id: self.session_id,
            uuid: Uuid::new_v4(),
            parent_uuid: self.last_uuid,
            timestamp: Utc::now(),
            entry_type: draft.entry_type,
            message: draft.message,
            metadata: draft.metadata,
        };
        // one buffered write per entry keeps lines atomic under cancellation
        let mut line =
            serde_json::to_string(&entry).map_err(|e| StoreError::Serialization(e.to_string()))?;
        line.push('\n');
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        self.last_uuid = Some(entry.uuid);
        Ok(entry.uuid)
    }

    /// Enumerate known sessions, newest first.
    pub async fn list(layout: &Layout) -> Result<Vec<SessionSummary>, StoreError> {
        let names = read_names(layout).await?;
        let mut summaries = Vec::new();
        let mut dir = match tokio::fs::read_dir(layout.sessions_dir()).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(summaries),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "jsonl") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_string_lossy().parse::<Uuid>().ok())
            else {
                continue;
            };
            let modified = entry.metadata().await?.modified()?;
            let (entries, _) = read_entries(&path).await?;
            summaries.push(SessionSummary {
                id,
                name: names
                    .iter()
                    .rev()
                    .find(|record| record.id == id)
                    .map(|record| record.name.clone()),
                modified: modified.into(),
                entries: entries.len(),
            });
        }
        summaries.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(summaries)
    }
}

/// Read entries up to the first malformed or unterminated line.
///
/// Returns the entries plus the byte length of the valid prefix.
async fn read_entries(path: &Path) -> Result<(Vec<SessionEntry>, u64), StoreError> {
    let data = tokio::fs::read_to_string(path).await?;
    let mut entries = Vec::new();
    let mut valid_bytes = 0u64;
    for line in data.split_inclusive('\n') {
        if !line.ends_with('\n') {
            // partial final line from an interrupted write
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            valid_bytes += line.len() as u64;
            continue;
        }
        match serde_json::from_str::<SessionEntry>(trimmed) {
            Ok(entry) => {
                entries.push(entry);
                valid_bytes += line.len() as u64;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed journal line, truncating");
                break;
            }
        }
    }
    Ok((entries, valid_bytes))
}

/// Resolve a short name to a session id; the last recorded mapping wins.
async fn lookup_name(layout: &Layout, name: &str) -> Result<Option<Uuid>, StoreError> {
    Ok(read_names(layout)
        .await?
        .iter()
        .rev()
        .find(|record| record.name == name)
        .map(|record| record.id))
}

async fn read_names(layout: &Layout) -> Result<Vec<NameRecord>, StoreError> {
    let data = match tokio::fs::read_to_string(layout.names_file()).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut records = Vec::new();
    for line in data.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<NameRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed names line");
            }
        }
    }
    Ok(records)
}

/// Append a name → id mapping.
async fn record_name(layout: &Layout, name: &str, id: Uuid) -> Result<(), StoreError> {
    let record = NameRecord {
        name: name.to_string(),
        id,
    };
    let mut line =
        serde_json::to_string(&record).map_err(|e| StoreError::Serialization(e.to_string()))?;
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(layout.names_file())
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
