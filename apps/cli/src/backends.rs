//! Runtime selection of the tab host and session store.

use std::path::Path;

use tabcontext_collector::{BrowserTab, DevToolsHost, SnapshotHost, TabHost};
use tabcontext_shared::{AppConfig, Result, SessionKey, SessionRecord, expand_home};
use tabcontext_storage::{MemoryStore, SessionStore, Storage};

/// Where tabs come from: a live browser or a captured snapshot file.
pub(crate) enum Host {
    DevTools(DevToolsHost),
    Snapshot(SnapshotHost),
}

impl Host {
    pub(crate) fn from_args(config: &AppConfig, tabs_file: Option<&Path>) -> Result<Self> {
        match tabs_file {
            Some(path) => Ok(Self::Snapshot(SnapshotHost::from_path(path)?)),
            None => Ok(Self::DevTools(DevToolsHost::new(&config.collector)?)),
        }
    }
}

impl TabHost for Host {
    async fn list_tabs(&self) -> Result<Vec<BrowserTab>> {
        match self {
            Self::DevTools(host) => host.list_tabs().await,
            Self::Snapshot(host) => host.list_tabs().await,
        }
    }

    async fn document(&self, tab: &BrowserTab) -> Result<String> {
        match self {
            Self::DevTools(host) => host.document(tab).await,
            Self::Snapshot(host) => host.document(tab).await,
        }
    }
}

/// Session persistence: the session database, or process memory.
pub(crate) enum Store {
    Database(Storage),
    Memory(MemoryStore),
}

impl Store {
    /// Read-write store for commands that run pipeline stages.
    pub(crate) async fn open(config: &AppConfig, ephemeral: bool) -> Result<Self> {
        if ephemeral {
            return Ok(Self::Memory(MemoryStore::new()));
        }
        let path = expand_home(&config.storage.db_path)?;
        Ok(Self::Database(Storage::open(&path).await?))
    }

    /// Read-only store for inspection commands. A missing database reads as empty.
    pub(crate) async fn open_for_reading(config: &AppConfig) -> Result<Self> {
        let path = expand_home(&config.storage.db_path)?;
        if !path.exists() {
            tracing::debug!(?path, "no session database yet");
            return Ok(Self::Memory(MemoryStore::new()));
        }
        Ok(Self::Database(Storage::open_readonly(&path).await?))
    }
}

impl SessionStore for Store {
    async fn get(&self, keys: &[SessionKey]) -> Result<SessionRecord> {
        match self {
            Self::Database(store) => store.get(keys).await,
            Self::Memory(store) => store.get(keys).await,
        }
    }

    async fn set(&self, record: SessionRecord) -> Result<()> {
        match self {
            Self::Database(store) => store.set(record).await,
            Self::Memory(store) => store.set(record).await,
        }
    }
}
