//! Directory spool for the inbound queue.
//!
//! Each entry is a JSON file named `<unix-time>+<sha256-hex>.json`. Entries
//! are written under a `.tmp` name and renamed into place, so a reader
//! scanning the directory never sees a partial file.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::info;

use super::types::{InboundEntry, INBOUND_QUEUE};
use crate::engine::EngineError;

const ENTRY_EXTENSION: &str = "json";

/// Writer for a queue directory.
#[derive(Debug, Clone)]
pub struct Spool {
    dir: PathBuf,
}

impl Spool {
    /// Create a spool rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Queue a raw message for `listname`, returning the entry path.
    pub async fn enqueue(&self, listname: &str, message: &[u8]) -> Result<PathBuf, EngineError> {
        fs::create_dir_all(&self.dir).await?;

        let entry = InboundEntry::new(listname, String::from_utf8_lossy(message));
        let body = serde_json::to_vec(&entry)?;

        let filebase = entry_filebase(listname, message);
        let final_path = self.dir.join(format!("{}.{}", filebase, ENTRY_EXTENSION));
        let tmp_path = self.dir.join(format!("{}.tmp", filebase));

        fs::write(&tmp_path, &body).await?;
        fs::rename(&tmp_path, &final_path).await?;

        info!(
            queue = INBOUND_QUEUE,
            listname = %listname,
            entry = %final_path.display(),
            body_length = body.len(),
            "spool_entry_written"
        );

        Ok(final_path)
    }

    /// Entries currently waiting in the spool, oldest first.
    pub async fn pending(&self) -> Result<Vec<InboundEntry>, EngineError> {
        let mut paths = Vec::new();

        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = fs::read(&path).await?;
            let entry: InboundEntry = serde_json::from_slice(&raw)?;
            entries.push(entry);
        }

        Ok(entries)
    }
}

/// Build a unique, time-ordered file stem for an entry.
fn entry_filebase(listname: &str, message: &[u8]) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(message);
    hasher.update(listname.as_bytes());
    hasher.update(now.as_nanos().to_le_bytes());

    format!(
        "{}.{:09}+{}",
        now.as_secs(),
        now.subsec_nanos(),
        hex::encode(hasher.finalize())
    )
}
