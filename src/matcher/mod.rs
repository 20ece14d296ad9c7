//! 触发器与校验器

pub mod trigger;
pub mod validator;

pub use trigger::{match_trigger, match_triggers};
pub use validator::{truthy, validate, ValidationOutcome};
