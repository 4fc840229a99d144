use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;

use crate::error::Result;

/// Key holding the last repository locator that loaded successfully
pub const LOCATOR_KEY: &str = "repo-assistant.locator";
/// Key holding the access credential used with that locator
pub const CREDENTIAL_KEY: &str = "repo-assistant.credential";

/// The part of a session that survives a restart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSession {
    pub locator: String,
    pub credential: Option<String>,
}

/// Small persistent key-value store for resuming a session
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Get a stored value by key
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key
    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove every stored value
    async fn clear(&self) -> Result<()>;

    /// The last session that loaded, if one was saved
    async fn saved_session(&self) -> Result<Option<SavedSession>> {
        let Some(locator) = self.get(LOCATOR_KEY).await? else {
            return Ok(None);
        };
        let credential = self.get(CREDENTIAL_KEY).await?;
        Ok(Some(SavedSession { locator, credential }))
    }

    /// Replace the saved session
    ///
    /// A session without a credential removes any credential saved earlier
    async fn save_session(&self, session: &SavedSession) -> Result<()> {
        match &session.credential {
            Some(credential) => self.set(CREDENTIAL_KEY, credential).await?,
            None => self.remove(CREDENTIAL_KEY).await?,
        }
        self.set(LOCATOR_KEY, &session.locator).await
    }
}

/// In-process store, forgotten when the process exits
///
/// Can be seeded with a session so the controller resumes it on startup.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `session`
    ///
    /// # Arguments
    /// * `session` - Locator and credential to hand back from [`SessionStore::saved_session`]
    pub fn with_session(session: SavedSession) -> Self {
        let mut values = HashMap::from([(LOCATOR_KEY.to_string(), session.locator)]);
        if let Some(credential) = session.credential {
            values.insert(CREDENTIAL_KEY.to_string(), credential);
        }
        Self {
            values: RwLock::new(values),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.values.write().await.clear();
        Ok(())
    }
}

/// Store backed by a single JSON file
///
/// The whole map is rewritten on every change; writers are serialized by
/// an in-process lock.
pub struct FileStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    /// Open a store, creating parent directories as needed
    ///
    /// # Arguments
    /// * `path` - JSON file holding the values; it need not exist yet
    pub async fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(Self {
            path,
            lock: RwLock::new(()),
        })
    }

    async fn load(&self) -> Result<HashMap<String, String>> {
        match fs::read(&self.path).await {
            Ok(data) if data.is_empty() => Ok(HashMap::new()),
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, values: &HashMap<String, String>) -> Result<()> {
        let data = serde_json::to_vec_pretty(values)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &data).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.read().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.write().await;
        let mut values = self.load().await?;
        values.insert(key.to_string(), value.to_string());
        self.save(&values).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.write().await;
        let mut values = self.load().await?;
        if values.remove(key).is_some() {
            self.save(&values).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.lock.write().await;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Store that remembers nothing
pub struct NullStore;

#[async_trait]
impl SessionStore for NullStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();

        assert!(store.get(LOCATOR_KEY).await.unwrap().is_none());
        assert!(store.saved_session().await.unwrap().is_none());

        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();
        store.remove("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("2"));

        store.clear().await.unwrap();
        assert!(store.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_saved_session_round_trip() {
        let store = MemoryStore::with_session(SavedSession {
            locator: "https://github.com/acme/widgets".to_string(),
            credential: Some("ghp_old".to_string()),
        });
        assert_eq!(
            store.saved_session().await.unwrap().unwrap().credential.as_deref(),
            Some("ghp_old")
        );

        // a public repository loaded later drops the old token
        let public = SavedSession {
            locator: "https://github.com/acme/public".to_string(),
            credential: None,
        };
        store.save_session(&public).await.unwrap();
        assert_eq!(store.saved_session().await.unwrap(), Some(public));
        assert!(store.get(CREDENTIAL_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileStore::new(path.clone()).await.unwrap();
        store.set(LOCATOR_KEY, "https://github.com/acme/widgets").await.unwrap();
        store.set(CREDENTIAL_KEY, "ghp_secret").await.unwrap();

        let reopened = FileStore::new(path.clone()).await.unwrap();
        assert_eq!(
            reopened.get(CREDENTIAL_KEY).await.unwrap().as_deref(),
            Some("ghp_secret")
        );

        reopened.remove(CREDENTIAL_KEY).await.unwrap();
        assert!(store.get(CREDENTIAL_KEY).await.unwrap().is_none());
        assert!(store.get(LOCATOR_KEY).await.unwrap().is_some());

        reopened.clear().await.unwrap();
        assert!(!path.exists());
        assert!(store.get(LOCATOR_KEY).await.unwrap().is_none());
        // clearing twice is fine
        reopened.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_null_store() {
        let store = NullStore;
        store.set(LOCATOR_KEY, "x").await.unwrap();
        assert!(store.get(LOCATOR_KEY).await.unwrap().is_none());
    }
}
