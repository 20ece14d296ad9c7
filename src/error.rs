//! 错误类型
//!
//! - CompileError：脚本输入有误，出错节点的子树不可用
//! - StorageError：会话后端读写失败
//! - DeliveryError：出站消息发送失败
//! - DialogError：route 向调用方返回的错误（仅投递与持久化两类会冒泡）
//!
//! 路径查找失败不是错误（返回 None）；校验失败是预期结果，走 failure 分支；
//! 自定义触发器 / 校验器 / 方法的错误在边界处记录日志后吞掉。

use thiserror::Error;

/// 脚本编译错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Script root must be an object")]
    RootNotObject,

    #[error("Node {path} must be an object")]
    NodeNotObject { path: String },

    #[error("Invalid {field} in node {path}: {reason}")]
    InvalidField {
        path: String,
        field: &'static str,
        reason: String,
    },

    #[error("Invalid regexp '{pattern}' in node {path}: {reason}")]
    InvalidRegex {
        path: String,
        pattern: String,
        reason: String,
    },
}

/// 会话存储错误
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "async-sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// 出站投递错误（由适配器返回）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Delivery via {adapter} to {peer_id} failed: {reason}")]
pub struct DeliveryError {
    pub adapter: String,
    pub peer_id: String,
    pub reason: String,
}

impl DeliveryError {
    pub fn new(adapter: impl Into<String>, peer_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            peer_id: peer_id.into(),
            reason: reason.into(),
        }
    }
}

/// 路由层错误
#[derive(Error, Debug)]
pub enum DialogError {
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Session persistence failed: {0}")]
    Persistence(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(String),
}
