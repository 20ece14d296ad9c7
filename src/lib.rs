//! Chatflow - 数据驱动的多轮对话脚本引擎
//!
//! 模块划分：
//! - **script**: 脚本加载、宏展开、编译为按路径索引的节点表
//! - **matcher**: 触发器匹配与内置 / 自定义校验
//! - **router**: 步骤路由、goto 解析、节点执行
//! - **session**: 会话数据与存储后端（内存 / JSON 文件 / SQLite）
//! - **adapter**: 消息平台端点抽象（控制台、Mock）
//! - **hooks**: 宿主注册的触发器、校验器与方法
//! - **lexicon**: 多语言词条
//! - **config**: 应用配置加载（TOML + 环境变量）

pub mod adapter;
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod lexicon;
pub mod matcher;
pub mod message;
pub mod observability;
pub mod router;
pub mod script;
pub mod session;

pub use context::Context;
pub use error::{CompileError, DeliveryError, DialogError, StorageError};
pub use message::{DeliveryId, InboundMessage, Parcel};
pub use router::{DialogRouter, RouteOutcome, RouteStatus, RouterBuilder};
pub use script::{compile, CompiledScript, ScriptLoader};
