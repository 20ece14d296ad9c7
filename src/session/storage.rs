//! 会话存储后端
//!
//! 定义统一的读写接口，提供内存、JSON 文件两种实现；SQLite 实现见 sqlite.rs。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use super::session::Session;
use crate::config::SessionBackend;
use crate::error::StorageError;

/// 会话存储接口（键为 `bridge:chat:sender`）
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Session>, StorageError>;

    async fn save(&self, key: &str, session: &Session) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// 内存存储
#[derive(Default)]
pub struct MemorySessionStorage {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn load(&self, key: &str) -> Result<Option<Session>, StorageError> {
        Ok(self.sessions.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, session: &Session) -> Result<(), StorageError> {
        self.sessions.write().await.insert(key.to_string(), session.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.sessions.write().await.remove(key);
        Ok(())
    }
}

/// JSON 文件存储：整个会话表保存在一个文件里，每次写入后整体落盘
pub struct JsonFileSessionStorage {
    path: PathBuf,
    sessions: Mutex<HashMap<String, Session>>,
}

impl JsonFileSessionStorage {
    /// 打开（文件不存在时视为空表）
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let sessions = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => HashMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            sessions: Mutex::new(sessions),
        })
    }

    async fn persist(&self, sessions: &HashMap<String, Session>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(sessions)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStorage for JsonFileSessionStorage {
    async fn load(&self, key: &str) -> Result<Option<Session>, StorageError> {
        Ok(self.sessions.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, session: &Session) -> Result<(), StorageError> {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(key.to_string(), session.clone());
        self.persist(&sessions).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.remove(key).is_some() {
            self.persist(&sessions).await?;
        }
        Ok(())
    }
}

/// 创建会话存储
///
/// 按配置选择后端；文件 / SQLite 打开失败或 SQLite 未启用时回退到内存存储
pub async fn create_session_storage(backend: SessionBackend, path: &Path) -> Arc<dyn SessionStorage> {
    match backend {
        SessionBackend::Memory => {}
        SessionBackend::File => match JsonFileSessionStorage::open(path).await {
            Ok(storage) => {
                tracing::info!("Using JSON file session storage: {:?}", path);
                return Arc::new(storage);
            }
            Err(e) => {
                tracing::warn!("Failed to open session file, falling back to memory: {}", e);
            }
        },
        SessionBackend::Sqlite => {
            #[cfg(feature = "async-sqlite")]
            match super::sqlite::SqliteSessionStorage::open(path).await {
                Ok(storage) => {
                    tracing::info!("Using SQLite session storage: {:?}", path);
                    return Arc::new(storage);
                }
                Err(e) => {
                    tracing::warn!("Failed to open SQLite storage, falling back to memory: {}", e);
                }
            }

            #[cfg(not(feature = "async-sqlite"))]
            tracing::warn!("SQLite session storage requested but async-sqlite feature not enabled, using memory storage");
        }
    }

    tracing::info!("Using in-memory session storage");
    Arc::new(MemorySessionStorage::new())
}
