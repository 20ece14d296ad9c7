//! 会话管理器：一轮开始时加载，结束时按需写回或删除

use std::sync::Arc;

use super::key::StorageKey;
use super::session::{Session, SessionHandle};
use super::storage::{MemorySessionStorage, SessionStorage};
use crate::error::StorageError;

#[derive(Clone)]
pub struct SessionManager {
    storage: Arc<dyn SessionStorage>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(Arc::new(MemorySessionStorage::new()))
    }
}

impl SessionManager {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> Arc<dyn SessionStorage> {
        Arc::clone(&self.storage)
    }

    /// 加载会话；不存在时返回空会话
    pub async fn load(&self, key: StorageKey) -> Result<SessionHandle, StorageError> {
        let data = self.storage.load(&key.to_string()).await?.unwrap_or_default();
        Ok(SessionHandle::new(key, data))
    }

    /// 写回：未修改或无存储键则跳过，空会话直接删除
    pub async fn flush(&self, handle: SessionHandle) -> Result<(), StorageError> {
        let (key, data, touched) = handle.into_parts();
        let Some(key) = key.filter(|_| touched) else {
            return Ok(());
        };
        let key = key.to_string();
        if data.is_trivially_empty() {
            tracing::debug!(key = %key, "Deleting empty session");
            self.storage.delete(&key).await
        } else {
            tracing::debug!(key = %key, "Saving session");
            self.storage.save(&key, &data).await
        }
    }

    /// 直接读取持久化内容（不经过 handle）
    pub async fn peek(&self, key: &StorageKey) -> Result<Option<Session>, StorageError> {
        self.storage.load(&key.to_string()).await
    }
}
