//! Load/save hooks for agent memories, keyed by conversation id and agent kind.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sb_core::{AgentKind, Memory, Result, SbError};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Everything except ASCII alphanumerics and `-`, so `%` is always escaped.
const CID_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-');

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn load(&self, cid: &str, kind: AgentKind) -> Result<Option<Memory>>;
    async fn save(&self, cid: &str, kind: AgentKind, memory: &Memory) -> Result<()>;
}

/// JSONL files laid out as `<root>/<cid>/<kind>.jsonl`.
#[derive(Debug, Clone)]
pub struct FileMemoryStore {
    root: PathBuf,
}

impl FileMemoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of one memory file. The conversation id is percent-encoded, so
    /// distinct ids never share a directory.
    pub fn path_for(&self, cid: &str, kind: AgentKind) -> PathBuf {
        let dir = match utf8_percent_encode(cid, CID_ESCAPE).to_string() {
            dir if dir.is_empty() => "%".to_string(),
            dir => dir,
        };
        self.root.join(dir).join(format!("{kind}.jsonl"))
    }
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    async fn load(&self, cid: &str, kind: AgentKind) -> Result<Option<Memory>> {
        let path = self.path_for(cid, kind);
        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SbError::Persistence(format!("{}: {e}", path.display()))),
        };
        let memory = Memory::from_jsonl(&content)
            .map_err(|e| SbError::Persistence(format!("{}: {e}", path.display())))?;
        Ok(Some(memory))
    }

    async fn save(&self, cid: &str, kind: AgentKind, memory: &Memory) -> Result<()> {
        let path = self.path_for(cid, kind);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SbError::Persistence(format!("{}: {e}", parent.display())))?;
        }
        fs::write(&path, memory.to_jsonl())
            .await
            .map_err(|e| SbError::Persistence(format!("{}: {e}", path.display())))
    }
}
