//! Provider registry
//!
//! Builds adapters from connection details or stored sessions, keeps the set
//! of connected providers and persists their sessions. Adapters push refreshed
//! sessions back through the store's `SessionSink`.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

use crate::config::CoreConfig;
use crate::providers::session::{self, SessionSink};
use crate::providers::{
    ActionSet, DavFlavor, Entity, FileProvider, LocalProvider, OneDriveProvider, OnlyofficeProvider, ProviderError,
    ProviderType, WebDavProvider,
};

/// A connected provider shared between callers
pub type SharedProvider = Arc<Mutex<Box<dyn FileProvider>>>;

/// What a caller supplies to connect a new provider
#[derive(Debug, Clone)]
pub enum ConnectInfo {
    Onlyoffice {
        base_url: String,
        token: String,
        expires: Option<DateTime<Utc>>,
    },
    WebDav {
        flavor: DavFlavor,
        url: String,
        username: String,
        password: SecretString,
    },
    /// Tokens obtained by an external OAuth2 login flow
    OneDrive {
        access_token: String,
        refresh_token: Option<String>,
        expires_in: Option<u64>,
    },
    Local,
}

impl ConnectInfo {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ConnectInfo::Onlyoffice { .. } => ProviderType::Onlyoffice,
            ConnectInfo::WebDav { flavor, .. } => flavor.provider_type(),
            ConnectInfo::OneDrive { .. } => ProviderType::OneDrive,
            ConnectInfo::Local => ProviderType::Local,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    providers: Vec<String>,
}

/// Session list persisted as `{"providers": ["<session>", ...]}`
pub struct ProviderStore {
    path: PathBuf,
    sessions: StdMutex<Vec<(String, String)>>,
}

impl ProviderStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ProviderError> {
        let path = path.into();
        let mut sessions = Vec::new();

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let file: StoreFile = serde_json::from_str(&content)
                .map_err(|e| ProviderError::ParseError(format!("{}: {}", path.display(), e)))?;
            for raw in file.providers {
                match session::peek_id(&raw) {
                    Ok(Some(id)) => sessions.push((id, raw)),
                    Ok(None) => tracing::warn!("[Registry] Dropping stored session without id"),
                    Err(e) => tracing::warn!("[Registry] Dropping unreadable session: {}", e),
                }
            }
        }

        Ok(Self {
            path,
            sessions: StdMutex::new(sessions),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, String)>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sessions(&self) -> Vec<(String, String)> {
        self.lock().clone()
    }

    pub fn upsert(&self, id: &str, raw: &str) {
        let mut sessions = self.lock();
        match sessions.iter_mut().find(|(existing, _)| existing == id) {
            Some(slot) => slot.1 = raw.to_string(),
            None => sessions.push((id.to_string(), raw.to_string())),
        }
    }

    pub fn remove(&self, id: &str) {
        self.lock().retain(|(existing, _)| existing != id);
    }

    pub fn save(&self) -> Result<(), ProviderError> {
        let file = StoreFile {
            providers: self.lock().iter().map(|(_, raw)| raw.clone()).collect(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| ProviderError::ParseError(format!("Failed to encode provider list: {}", e)))?;
        std::fs::write(&self.path, content)?;
        tracing::debug!("[Registry] Saved {} session(s) to {:?}", file.providers.len(), self.path);
        Ok(())
    }
}

impl SessionSink for ProviderStore {
    fn session_updated(&self, id: &str, raw: &str) {
        self.upsert(id, raw);
        if let Err(e) = self.save() {
            tracing::error!("[Registry] Failed to persist refreshed session {}: {}", id, e);
        }
    }
}

struct Entry {
    id: String,
    provider_type: ProviderType,
    provider: SharedProvider,
}

/// Connected providers
pub struct ProviderRegistry {
    config: Arc<CoreConfig>,
    store: Arc<ProviderStore>,
    entries: Vec<Entry>,
}

impl ProviderRegistry {
    /// Registry persisting to `config.store_path`. Stored sessions are not
    /// loaded until `load` is called.
    pub fn new(config: Arc<CoreConfig>) -> Result<Self, ProviderError> {
        let store = Arc::new(ProviderStore::open(&config.store_path)?);
        Ok(Self {
            config,
            store,
            entries: Vec::new(),
        })
    }

    pub fn config(&self) -> &Arc<CoreConfig> {
        &self.config
    }

    /// Build an adapter without contacting the backend
    pub fn create(&self, info: ConnectInfo) -> Result<Box<dyn FileProvider>, ProviderError> {
        let config = self.config.clone();
        Ok(match info {
            ConnectInfo::Onlyoffice {
                base_url,
                token,
                expires,
            } => Box::new(OnlyofficeProvider::new(&base_url, &token, expires, config)?),
            ConnectInfo::WebDav {
                flavor,
                url,
                username,
                password,
            } => Box::new(WebDavProvider::new(flavor, &url, &username, password, config)?),
            ConnectInfo::OneDrive {
                access_token,
                refresh_token,
                expires_in,
            } => Box::new(OneDriveProvider::new(access_token, refresh_token, expires_in, config)?),
            ConnectInfo::Local => Box::new(LocalProvider::new(config)),
        })
    }

    /// Rebuild an adapter from a stored session, dispatching on its `type`
    pub fn deserialize(&self, raw: &str) -> Result<Box<dyn FileProvider>, ProviderError> {
        let config = self.config.clone();
        Ok(match session::peek_type(raw)? {
            ProviderType::Onlyoffice => Box::new(OnlyofficeProvider::deserialize(raw, config)?),
            ProviderType::WebDav | ProviderType::Nextcloud | ProviderType::OwnCloud | ProviderType::KDrive => {
                Box::new(WebDavProvider::deserialize(raw, config)?)
            }
            ProviderType::OneDrive => Box::new(OneDriveProvider::deserialize(raw, config)?),
            ProviderType::Local => Box::new(LocalProvider::deserialize(raw, config)?),
        })
    }

    /// Build an adapter and probe the backend. The returned adapter is ready
    /// to use; callers never authenticate twice.
    pub async fn connect(&self, info: ConnectInfo) -> Result<Box<dyn FileProvider>, ProviderError> {
        let kind = info.provider_type();
        let mut provider = self.create(info)?;
        tracing::info!("[Registry] Probing {} backend", kind);
        provider.is_reachable().await?;
        Ok(provider)
    }

    /// Register a provider and persist its session. A provider whose session
    /// id is already registered is rejected with `NameConflict`.
    pub fn add(&mut self, mut provider: Box<dyn FileProvider>) -> Result<SharedProvider, ProviderError> {
        let id = provider
            .id()
            .ok_or_else(|| ProviderError::InvalidConfig("Provider has no session id".to_string()))?;
        if self.entries.iter().any(|e| e.id == id) {
            return Err(ProviderError::NameConflict(format!("{} is already connected", provider.provider_type())));
        }

        provider.set_session_sink(self.store.clone());
        let raw = provider.serialize()?;
        self.store.upsert(&id, &raw);
        self.store.save()?;

        let provider_type = provider.provider_type();
        let shared: SharedProvider = Arc::new(Mutex::new(provider));
        tracing::info!("[Registry] Added {} provider {}", provider_type, id);
        self.entries.push(Entry {
            id,
            provider_type,
            provider: shared.clone(),
        });
        Ok(shared)
    }

    /// Disconnect a provider and forget its session
    pub fn remove(&mut self, id: &str) -> Result<Option<SharedProvider>, ProviderError> {
        let Some(index) = self.entries.iter().position(|e| e.id == id) else {
            return Ok(None);
        };
        let entry = self.entries.remove(index);
        self.store.remove(id);
        self.store.save()?;
        tracing::info!("[Registry] Removed {} provider {}", entry.provider_type, id);
        Ok(Some(entry.provider))
    }

    pub fn get(&self, id: &str) -> Option<SharedProvider> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.provider.clone())
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-serialize every connected provider and write the store
    pub async fn persist(&self) -> Result<(), ProviderError> {
        for entry in &self.entries {
            let raw = entry.provider.lock().await.serialize()?;
            self.store.upsert(&entry.id, &raw);
        }
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.save())
            .await
            .map_err(|e| ProviderError::ServerError(format!("Saving providers failed: {}", e)))?
    }

    /// Restore stored sessions. Unreadable or unsupported sessions are
    /// skipped with a warning; expired credentials still load and fail later
    /// with `AuthExpired`. Returns the number of providers restored.
    pub fn load(&mut self) -> usize {
        let mut restored = 0;
        for (id, raw) in self.store.sessions() {
            if self.entries.iter().any(|e| e.id == id) {
                continue;
            }
            match self.deserialize(&raw) {
                Ok(mut provider) => {
                    provider.set_session_sink(self.store.clone());
                    let provider_type = provider.provider_type();
                    self.entries.push(Entry {
                        id,
                        provider_type,
                        provider: Arc::new(Mutex::new(provider)),
                    });
                    restored += 1;
                }
                Err(e) => tracing::warn!("[Registry] Skipping stored session {}: {}", id, e),
            }
        }
        tracing::info!("[Registry] Restored {} provider(s)", restored);
        restored
    }

    /// Actions for `entity` listed by provider `id`. Local documents can be
    /// uploaded once a document server is connected.
    pub async fn actions_for(&self, id: &str, entity: &Entity) -> Option<ActionSet> {
        let entry = self.entries.iter().find(|e| e.id == id)?;
        let mut actions = entry.provider.lock().await.actions(entity);

        let portal_connected = self.entries.iter().any(|e| e.provider_type == ProviderType::Onlyoffice);
        if entry.provider_type == ProviderType::Local && portal_connected && !entity.is_folder() && !actions.is_empty()
        {
            actions.insert(ActionSet::UPLOAD);
        }
        Some(actions)
    }
}
