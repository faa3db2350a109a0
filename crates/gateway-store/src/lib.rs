use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tokio::sync::RwLock;

/// §3 "Persisted-state layout" collection names, kept as constants so callers
/// don't respell the keyed-document paths.
pub mod collections {
    pub const JOBS: &str = "jobs";
    pub const JOB_SUGGESTIONS: &str = "jobSuggestions";
    pub const JOB_REFINEMENTS: &str = "jobRefinements";
    pub const JOB_CHANNEL_RECOMMENDATIONS: &str = "jobChannelRecommendations";
    pub const JOB_ASSETS: &str = "jobAssets";
    pub const WIZARD_COPILOT_CHATS: &str = "wizardCopilotChats";
    pub const VIDEOS: &str = "videos";
    pub const USERS: &str = "users";
    pub const COMPANIES: &str = "companies";
    pub const CREDIT_BALANCES: &str = "creditBalances";
    pub const USAGE_LOG: &str = "usageLog";
}

/// Every persisted document carries `schema_version`/`updated_at` (§6). Asserting
/// this at the store boundary makes the §8 "updatedAt monotone" invariant
/// structurally checkable rather than merely tested by convention.
pub trait Document {
    fn updated_at(&self) -> chrono::DateTime<chrono::Utc>;
}

/// C1 Document Store Interface — typed `get`/`save`/`list`/`delete` over keyed
/// collections (§4). Object-safe methods operate on raw JSON; typed sugar lives
/// in the `TypedStore` extension trait below so the trait itself stays
/// dyn-compatible (needed because the orchestrator holds an `Arc<dyn DocumentStore>`).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_raw(&self, collection: &str, id: &str) -> anyhow::Result<Option<Value>>;
    async fn save_raw(&self, collection: &str, id: &str, value: Value) -> anyhow::Result<()>;
    async fn list_raw(&self, collection: &str) -> anyhow::Result<Vec<Value>>;
    async fn delete_raw(&self, collection: &str, id: &str) -> anyhow::Result<()>;
    /// Append-only write, used only for `usageLog` (§3). No id: rows are never
    /// looked up by key, only listed.
    async fn append_raw(&self, collection: &str, value: Value) -> anyhow::Result<()>;
}

#[async_trait]
pub trait TypedStore: DocumentStore {
    async fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> anyhow::Result<Option<T>> {
        match self.get_raw(collection, id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn save<T: Serialize + Document + Sync>(
        &self,
        collection: &str,
        id: &str,
        doc: &T,
    ) -> anyhow::Result<()> {
        if let Some(existing) = self.get_raw(collection, id).await? {
            if let Ok(prev_updated_at) = serde_json::from_value::<PartialUpdatedAt>(existing)
                .map(|p| p.updated_at)
            {
                anyhow::ensure!(
                    doc.updated_at() >= prev_updated_at,
                    "updated_at must be monotone non-decreasing for {collection}/{id}"
                );
            }
        }
        let value = serde_json::to_value(doc)?;
        self.save_raw(collection, id, value).await
    }

    async fn list<T: DeserializeOwned>(&self, collection: &str) -> anyhow::Result<Vec<T>> {
        let raw = self.list_raw(collection).await?;
        raw.into_iter()
            .map(|v| serde_json::from_value(v).map_err(anyhow::Error::from))
            .collect()
    }

    async fn append<T: Serialize + Sync>(&self, collection: &str, row: &T) -> anyhow::Result<()> {
        let value = serde_json::to_value(row)?;
        self.append_raw(collection, value).await
    }
}

impl<S: DocumentStore + ?Sized> TypedStore for S {}

#[derive(serde::Deserialize)]
struct PartialUpdatedAt {
    updated_at: chrono::DateTime<chrono::Utc>,
}

/// In-process, lock-based store. One JSON file per collection under `base`,
/// loaded eagerly and rewritten in full on every mutation: whole-collection
/// JSON files guarded by a `RwLock<HashMap<..>>`, keyed generically by
/// collection name instead of a hardcoded set of tables.
pub struct JsonFileStore {
    base: PathBuf,
    collections: RwLock<HashMap<String, HashMap<String, Value>>>,
    append_logs: RwLock<HashMap<String, Vec<Value>>>,
}

impl JsonFileStore {
    pub async fn open(base: impl AsRef<Path>) -> anyhow::Result<Self> {
        let base = base.as_ref().to_path_buf();
        fs::create_dir_all(&base).await?;
        Ok(Self {
            base,
            collections: RwLock::new(HashMap::new()),
            append_logs: RwLock::new(HashMap::new()),
        })
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.base.join(format!("{collection}.json"))
    }

    fn append_log_path(&self, collection: &str) -> PathBuf {
        self.base.join(format!("{collection}.ndjson"))
    }

    async fn ensure_loaded(&self, collection: &str) -> anyhow::Result<()> {
        if self.collections.read().await.contains_key(collection) {
            return Ok(());
        }
        let path = self.collection_path(collection);
        let map: HashMap<String, Value> = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => HashMap::new(),
        };
        self.collections
            .write()
            .await
            .insert(collection.to_string(), map);
        Ok(())
    }

    async fn flush_collection(&self, collection: &str) -> anyhow::Result<()> {
        let collections = self.collections.read().await;
        let Some(map) = collections.get(collection) else {
            return Ok(());
        };
        let payload = serde_json::to_vec_pretty(map)?;
        fs::write(self.collection_path(collection), payload).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn get_raw(&self, collection: &str, id: &str) -> anyhow::Result<Option<Value>> {
        self.ensure_loaded(collection).await?;
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|m| m.get(id))
            .cloned())
    }

    async fn save_raw(&self, collection: &str, id: &str, value: Value) -> anyhow::Result<()> {
        self.ensure_loaded(collection).await?;
        {
            let mut collections = self.collections.write().await;
            collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), value);
        }
        self.flush_collection(collection).await
    }

    async fn list_raw(&self, collection: &str) -> anyhow::Result<Vec<Value>> {
        self.ensure_loaded(collection).await?;
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_raw(&self, collection: &str, id: &str) -> anyhow::Result<()> {
        self.ensure_loaded(collection).await?;
        {
            let mut collections = self.collections.write().await;
            if let Some(map) = collections.get_mut(collection) {
                map.remove(id);
            }
        }
        self.flush_collection(collection).await
    }

    async fn append_raw(&self, collection: &str, value: Value) -> anyhow::Result<()> {
        let mut logs = self.append_logs.write().await;
        let entry = logs.entry(collection.to_string()).or_default();
        entry.push(value.clone());
        let mut line = serde_json::to_vec(&value)?;
        line.push(b'\n');
        use tokio::io::AsyncWriteExt;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.append_log_path(collection))
            .await?;
        file.write_all(&line).await?;
        Ok(())
    }
}

/// Pure in-memory store for unit tests — no filesystem I/O.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, Value>>>,
    append_logs: RwLock<HashMap<String, Vec<Value>>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_raw(&self, collection: &str, id: &str) -> anyhow::Result<Option<Value>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|m| m.get(id))
            .cloned())
    }

    async fn save_raw(&self, collection: &str, id: &str, value: Value) -> anyhow::Result<()> {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), value);
        Ok(())
    }

    async fn list_raw(&self, collection: &str) -> anyhow::Result<Vec<Value>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_raw(&self, collection: &str, id: &str) -> anyhow::Result<()> {
        if let Some(map) = self.collections.write().await.get_mut(collection) {
            map.remove(id);
        }
        Ok(())
    }

    async fn append_raw(&self, collection: &str, value: Value) -> anyhow::Result<()> {
        self.append_logs
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Widget {
        id: String,
        updated_at: chrono::DateTime<chrono::Utc>,
    }

    impl Document for Widget {
        fn updated_at(&self) -> chrono::DateTime<chrono::Utc> {
            self.updated_at
        }
    }

    #[tokio::test]
    async fn in_memory_roundtrips_typed_documents() {
        let store = InMemoryStore::new();
        let now: chrono::DateTime<chrono::Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let widget = Widget {
            id: "w1".to_string(),
            updated_at: now,
        };
        store.save("widgets", "w1", &widget).await.unwrap();
        let fetched: Option<Widget> = store.get("widgets", "w1").await.unwrap();
        assert_eq!(fetched, Some(widget));
    }

    #[tokio::test]
    async fn save_rejects_updated_at_going_backwards() {
        let store = InMemoryStore::new();
        let now: chrono::DateTime<chrono::Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let earlier = now - chrono::Duration::hours(1);
        store
            .save(
                "widgets",
                "w1",
                &Widget {
                    id: "w1".to_string(),
                    updated_at: now,
                },
            )
            .await
            .unwrap();
        let result = store
            .save(
                "widgets",
                "w1",
                &Widget {
                    id: "w1".to_string(),
                    updated_at: earlier,
                },
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn json_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let now: chrono::DateTime<chrono::Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        {
            let store = JsonFileStore::open(dir.path()).await.unwrap();
            store
                .save(
                    "widgets",
                    "w1",
                    &Widget {
                        id: "w1".to_string(),
                        updated_at: now,
                    },
                )
                .await
                .unwrap();
        }
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let fetched: Option<Widget> = store.get("widgets", "w1").await.unwrap();
        assert_eq!(fetched.unwrap().id, "w1");
    }

    #[tokio::test]
    async fn append_raw_is_ordering_tolerant_log_only() {
        let store = InMemoryStore::new();
        store
            .append_raw("usageLog", serde_json::json!({"n": 1}))
            .await
            .unwrap();
        store
            .append_raw("usageLog", serde_json::json!({"n": 2}))
            .await
            .unwrap();
        let rows = store.list_raw("usageLog").await.unwrap();
        assert_eq!(rows.len(), 0, "append rows are not exposed via list_raw");
    }
}
