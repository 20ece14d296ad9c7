//! 宿主扩展点

pub mod registry;

pub use registry::{CustomValidator, Registry, ScriptMethod, TriggerPredicate};
