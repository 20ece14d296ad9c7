//! 扩展点注册表
//!
//! 脚本通过名字引用宿主代码：method 触发器、自定义校验器、方法动作。
//! 三类扩展各自实现对应 trait，由 Registry 按名注册与查找；
//! 出错时返回 Err(String)，调用方记录日志后按不匹配 / 无操作处理。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::Context;
use crate::script::ValidateSpec;

/// 自定义触发器（`{type: "method", value: name}`）
#[async_trait]
pub trait TriggerPredicate: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, ctx: &Context, params: &Value) -> Result<bool, String>;
}

/// 自定义校验器；返回值按真假判定成败，也作为 switch 的分支键
#[async_trait]
pub trait CustomValidator: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(&self, ctx: &Context, spec: &ValidateSpec) -> Result<Value, String>;
}

/// 脚本方法（action 或结果分支中的 methods）
#[async_trait]
pub trait ScriptMethod: Send + Sync {
    fn name(&self) -> &str;

    async fn call(&self, ctx: &mut Context, params: &Value) -> Result<(), String>;
}

#[derive(Default, Clone)]
pub struct Registry {
    triggers: HashMap<String, Arc<dyn TriggerPredicate>>,
    validators: HashMap<String, Arc<dyn CustomValidator>>,
    methods: HashMap<String, Arc<dyn ScriptMethod>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_trigger(&mut self, trigger: impl TriggerPredicate + 'static) -> &mut Self {
        let name = trigger.name().to_string();
        self.triggers.insert(name, Arc::new(trigger));
        self
    }

    pub fn register_validator(&mut self, validator: impl CustomValidator + 'static) -> &mut Self {
        let name = validator.name().to_string();
        self.validators.insert(name, Arc::new(validator));
        self
    }

    pub fn register_method(&mut self, method: impl ScriptMethod + 'static) -> &mut Self {
        let name = method.name().to_string();
        self.methods.insert(name, Arc::new(method));
        self
    }

    pub fn trigger(&self, name: &str) -> Option<Arc<dyn TriggerPredicate>> {
        self.triggers.get(name).cloned()
    }

    pub fn validator(&self, name: &str) -> Option<Arc<dyn CustomValidator>> {
        self.validators.get(name).cloned()
    }

    pub fn method(&self, name: &str) -> Option<Arc<dyn ScriptMethod>> {
        self.methods.get(name).cloned()
    }

    /// 调用方法；未注册或出错都只记录日志
    pub async fn call_method(&self, name: &str, ctx: &mut Context, params: &Value) -> bool {
        let Some(method) = self.method(name) else {
            tracing::error!("Unknown script method: {}", name);
            return false;
        };
        match method.call(ctx, params).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Script method {} failed: {}", name, e);
                false
            }
        }
    }

    pub fn method_names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }
}
