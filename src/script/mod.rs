//! 对话脚本
//!
//! ```text
//! 原始片段 (JSON/TOML) ──merge──▶ Value ──compile──▶ CompiledScript
//!                                                     ├── nodes:    path -> Arc<Node>
//!                                                     ├── groups:   容器路径 -> 成员
//!                                                     └── commands: 命令节点（声明顺序）
//! ```

pub mod compiler;
pub mod loader;
pub mod node;
pub mod parse;

pub use compiler::{compile, CompiledScript, Entry, MacroTable};
pub use loader::{merge_raw, ScriptLoader};
pub use node::{
    ActionBundle, ActionSpec, KeyboardSpec, Node, StoreSpec, StoreStage, TriggerKind, TriggerSpec,
    ValidateSpec, CHILDREN,
};
