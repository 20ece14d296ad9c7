//! 会话层
//!
//! - key：`bridge:chat:sender` 存储键
//! - session：持久化形状与一轮内的可变视图
//! - storage：存储后端（内存 / JSON 文件 / SQLite）
//! - manager：加载与写回

pub mod key;
pub mod manager;
#[allow(clippy::module_inception)]
pub mod session;
pub mod storage;

#[cfg(feature = "async-sqlite")]
pub mod sqlite;

pub use key::StorageKey;
pub use manager::SessionManager;
pub use session::{callback_hash, AnswerEntry, Session, SessionHandle, StepRef};
pub use storage::{create_session_storage, JsonFileSessionStorage, MemorySessionStorage, SessionStorage};

#[cfg(feature = "async-sqlite")]
pub use sqlite::SqliteSessionStorage;
