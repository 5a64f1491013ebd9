//! Session store: the only persisted state of the pipeline.
//!
//! The [`SessionStore`] trait is a key/value interface over the fixed key set
//! in [`SessionKey`]. Every key is written whole, so a reader observes either
//! the previous complete value or the new one. Writers are not coordinated:
//! the last `set` wins.
//!
//! Implementations:
//! - [`Storage`]: libSQL local database, read-write via [`Storage::open`],
//!   read-only via [`Storage::open_readonly`]
//! - [`MemoryStore`]: in-process, for tests and ephemeral runs

mod memory;
mod migrations;

use std::future::Future;
use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use tabcontext_shared::{Result, SessionKey, SessionRecord, TabContextError};

pub use memory::MemoryStore;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Key/value access to the session.
pub trait SessionStore: Send + Sync + 'static {
    /// Read the requested keys. Absent keys stay `None`.
    fn get(&self, keys: &[SessionKey]) -> impl Future<Output = Result<SessionRecord>> + Send;

    /// Overwrite every key that is `Some` in `record`. Other keys are untouched.
    fn set(&self, record: SessionRecord) -> impl Future<Output = Result<()>> + Send;
}

// ---------------------------------------------------------------------------
// libSQL implementation
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TabContextError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| TabContextError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| TabContextError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TabContextError::not_found(format!(
                "no session database at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| TabContextError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| TabContextError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    TabContextError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(TabContextError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    async fn read_value(&self, key: SessionKey) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT value_json FROM session WHERE key = ?1",
                params![key.as_str()],
            )
            .await
            .map_err(|e| TabContextError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| TabContextError::Storage(e.to_string()))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(TabContextError::Storage(e.to_string())),
        }
    }

    async fn write_value(&self, key: SessionKey, value_json: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO session (key, value_json, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value_json = excluded.value_json,
                   updated_at = excluded.updated_at",
                params![key.as_str(), value_json, now.as_str()],
            )
            .await
            .map_err(|e| TabContextError::Storage(e.to_string()))?;
        Ok(())
    }
}

impl SessionStore for Storage {
    async fn get(&self, keys: &[SessionKey]) -> Result<SessionRecord> {
        let mut record = SessionRecord::default();
        for &key in keys {
            if let Some(json) = self.read_value(key).await? {
                decode_into(&mut record, key, &json)?;
            }
        }
        Ok(record)
    }

    async fn set(&self, record: SessionRecord) -> Result<()> {
        self.check_writable()?;
        for (key, json) in encode(&record)? {
            self.write_value(key, &json).await?;
        }
        tracing::debug!(
            clusters = record.clusters.is_some(),
            domain_result = record.domain_result.is_some(),
            "session updated"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Value codec
// ---------------------------------------------------------------------------

/// Serialize every present field of `record` to its key's JSON value.
fn encode(record: &SessionRecord) -> Result<Vec<(SessionKey, String)>> {
    let mut values = Vec::new();
    if let Some(clusters) = &record.clusters {
        values.push((SessionKey::Clusters, to_json(clusters)?));
    }
    if let Some(time) = &record.last_cluster_time {
        values.push((SessionKey::LastClusterTime, to_json(time)?));
    }
    if let Some(result) = &record.domain_result {
        values.push((SessionKey::DomainResult, to_json(result)?));
    }
    Ok(values)
}

fn decode_into(record: &mut SessionRecord, key: SessionKey, json: &str) -> Result<()> {
    match key {
        SessionKey::Clusters => record.clusters = Some(from_json(key, json)?),
        SessionKey::LastClusterTime => record.last_cluster_time = Some(from_json(key, json)?),
        SessionKey::DomainResult => record.domain_result = Some(from_json(key, json)?),
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| TabContextError::Storage(e.to_string()))
}

fn from_json<T: DeserializeOwned>(key: SessionKey, json: &str) -> Result<T> {
    serde_json::from_str(json)
        .map_err(|e| TabContextError::parse(format!("corrupt session value '{}': {e}", key.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tabcontext_shared::{Cluster, Domain, DomainResult, TabRecord};
    use uuid::Uuid;

    fn temp_db() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("tc_test_{}.db", Uuid::now_v7()))
    }

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        Storage::open(&temp_db()).await.expect("open test db")
    }

    fn cluster(id: i64) -> Cluster {
        Cluster {
            cluster_id: id,
            tabs: vec![TabRecord {
                id: 7,
                title: "Attention".into(),
                url: "https://arxiv.org/abs/1706.03762".into(),
                content: "We propose the Transformer".into(),
                page: None,
            }],
            domain: Domain::Study,
            summary: "ML papers".into(),
            cluster_name: "Research".into(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = temp_db();
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn empty_store_reads_as_none() {
        let storage = test_storage().await;
        let record = storage.get(&SessionKey::ALL).await.expect("get");
        assert_eq!(record, SessionRecord::default());
    }

    #[tokio::test]
    async fn set_then_get_all_keys() {
        let storage = test_storage().await;
        let now = Utc::now();
        storage
            .set(SessionRecord {
                clusters: Some(vec![cluster(0)]),
                last_cluster_time: Some(now),
                domain_result: None,
            })
            .await
            .expect("set");

        let record = storage.get(&SessionKey::ALL).await.expect("get");
        assert_eq!(record.clusters, Some(vec![cluster(0)]));
        assert_eq!(record.last_cluster_time, Some(now));
        assert!(record.domain_result.is_none());
    }

    #[tokio::test]
    async fn get_only_returns_requested_keys() {
        let storage = test_storage().await;
        storage
            .set(SessionRecord {
                clusters: Some(vec![cluster(1)]),
                last_cluster_time: Some(Utc::now()),
                domain_result: None,
            })
            .await
            .expect("set");

        let record = storage.get(&[SessionKey::Clusters]).await.expect("get");
        assert!(record.clusters.is_some());
        assert!(record.last_cluster_time.is_none());
    }

    #[tokio::test]
    async fn set_overwrites_whole_value_and_leaves_other_keys() {
        let storage = test_storage().await;
        storage
            .set(SessionRecord {
                clusters: Some(vec![cluster(0), cluster(1)]),
                ..Default::default()
            })
            .await
            .expect("first set");

        let result = DomainResult {
            domain: Domain::Shopping,
            tabs: vec![],
            summary: "Comparing laptops".into(),
            user_prompt: "buy a laptop".into(),
            timestamp: Utc::now(),
        };
        storage
            .set(SessionRecord {
                domain_result: Some(result.clone()),
                ..Default::default()
            })
            .await
            .expect("second set");
        storage
            .set(SessionRecord {
                clusters: Some(vec![cluster(5)]),
                ..Default::default()
            })
            .await
            .expect("third set");

        let record = storage.get(&SessionKey::ALL).await.expect("get");
        assert_eq!(record.clusters, Some(vec![cluster(5)]));
        assert_eq!(record.domain_result, Some(result));
    }

    #[tokio::test]
    async fn repeated_reads_are_identical() {
        let storage = test_storage().await;
        storage
            .set(SessionRecord {
                clusters: Some(vec![cluster(3)]),
                last_cluster_time: Some(Utc::now()),
                domain_result: None,
            })
            .await
            .expect("set");

        let first = storage.get(&SessionKey::ALL).await.expect("first get");
        let second = storage.get(&SessionKey::ALL).await.expect("second get");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let tmp = temp_db();
        {
            let storage = Storage::open(&tmp).await.expect("open");
            storage
                .set(SessionRecord {
                    clusters: Some(vec![cluster(2)]),
                    ..Default::default()
                })
                .await
                .expect("set");
        }

        let ro = Storage::open_readonly(&tmp).await.expect("open readonly");
        let record = ro.get(&[SessionKey::Clusters]).await.expect("get");
        assert_eq!(record.clusters, Some(vec![cluster(2)]));
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = temp_db();
        drop(Storage::open(&tmp).await.unwrap());

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        let result = ro
            .set(SessionRecord {
                clusters: Some(vec![]),
                ..Default::default()
            })
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_requires_existing_database() {
        let err = Storage::open_readonly(&temp_db()).await.err().expect("missing db");
        assert!(matches!(err, TabContextError::NotFound { .. }));
    }

    #[tokio::test]
    async fn corrupt_value_is_a_parse_error() {
        let storage = test_storage().await;
        storage
            .write_value(SessionKey::Clusters, "{not json")
            .await
            .expect("raw write");

        let err = storage.get(&[SessionKey::Clusters]).await.unwrap_err();
        assert!(matches!(err, TabContextError::Parse { .. }));
    }
}
