use tokio::sync::Mutex;

use tabcontext_shared::{Result, SessionKey, SessionRecord};

use crate::SessionStore;

/// In-process session store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<SessionRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    async fn get(&self, keys: &[SessionKey]) -> Result<SessionRecord> {
        let current = self.record.lock().await;
        let mut record = SessionRecord::default();
        for key in keys {
            match key {
                SessionKey::Clusters => record.clusters = current.clusters.clone(),
                SessionKey::LastClusterTime => record.last_cluster_time = current.last_cluster_time,
                SessionKey::DomainResult => record.domain_result = current.domain_result.clone(),
            }
        }
        Ok(record)
    }

    async fn set(&self, record: SessionRecord) -> Result<()> {
        let mut current = self.record.lock().await;
        if let Some(clusters) = record.clusters {
            current.clusters = Some(clusters);
        }
        if let Some(time) = record.last_cluster_time {
            current.last_cluster_time = Some(time);
        }
        if let Some(result) = record.domain_result {
            current.domain_result = Some(result);
        }
        Ok(())
    }
}
