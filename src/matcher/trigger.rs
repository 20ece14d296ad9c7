//! 触发器匹配
//!
//! 节点的触发器列表之间为 AND，单个触发器的 values 之间为 OR；空列表总是匹配。
//! 自定义触发器出错按不匹配处理。

use serde_json::Value;

use crate::context::Context;
use crate::hooks::Registry;
use crate::script::{TriggerKind, TriggerSpec};

/// 所有触发器都匹配时返回 true
pub async fn match_triggers(ctx: &Context, registry: &Registry, triggers: &[TriggerSpec]) -> bool {
    for spec in triggers {
        if !match_trigger(ctx, registry, spec).await {
            return false;
        }
    }
    true
}

pub async fn match_trigger(ctx: &Context, registry: &Registry, spec: &TriggerSpec) -> bool {
    let message = ctx.message();
    match spec.kind {
        TriggerKind::Bridge => spec.values.iter().any(|v| v == ctx.bridge_name()),
        TriggerKind::Driver => spec.values.iter().any(|v| v == ctx.adapter().driver_name()),
        TriggerKind::Event => spec.values.iter().any(|v| v == message.event.as_str()),
        TriggerKind::Regexp => {
            !message.text.is_empty() && spec.patterns.iter().any(|re| re.is_match(&message.text))
        }
        TriggerKind::Callback => {
            let data = message.query.data.as_str();
            !data.is_empty()
                && spec.values.iter().any(|v| match v.strip_suffix('*') {
                    Some(prefix) => data.starts_with(prefix),
                    None => data == v,
                })
        }
        TriggerKind::Text => {
            !message.text.is_empty()
                && spec
                    .values
                    .iter()
                    .any(|v| ctx.lexicon(v, &Value::Null) == message.text)
        }
        TriggerKind::Method => {
            for name in &spec.values {
                let Some(predicate) = registry.trigger(name) else {
                    tracing::warn!("Unknown trigger method: {}", name);
                    continue;
                };
                match predicate.check(ctx, &spec.params).await {
                    Ok(true) => return true,
                    Ok(false) => {}
                    Err(e) => tracing::error!("Trigger method {} failed: {}", name, e),
                }
            }
            false
        }
    }
}
