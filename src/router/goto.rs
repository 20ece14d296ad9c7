//! Goto 解析
//!
//! 校验结果 -> 动作集合（failure / switch / success），动作集合 -> 下一个节点。

use std::sync::Arc;

use serde_json::Value;

use crate::context::Context;
use crate::hooks::Registry;
use crate::matcher::{match_triggers, validate, ValidationOutcome};
use crate::script::{ActionBundle, CompiledScript, Entry, Node, ValidateSpec};

/// 按校验结果选择分支
///
/// 失败走 failure；成功时先查 switch（原始键、本地化键、逐个比较键与回复文本），
/// 再回退到 success，最后是 failure。
pub fn build_action_bundle(ctx: &Context, outcome: &ValidationOutcome, spec: &ValidateSpec) -> ActionBundle {
    let non_empty = |bundle: &Option<ActionBundle>| bundle.clone().filter(|b| !b.is_empty());

    if !outcome.is_success() {
        return non_empty(&spec.failure).unwrap_or_default();
    }

    if !spec.switch.is_empty() {
        if let Some(bundle) = select_switch(ctx, outcome, spec) {
            return bundle;
        }
    }

    non_empty(&spec.success)
        .or_else(|| non_empty(&spec.failure))
        .unwrap_or_default()
}

fn select_switch(ctx: &Context, outcome: &ValidationOutcome, spec: &ValidateSpec) -> Option<ActionBundle> {
    let key = outcome.switch_key();
    let localized_key = ctx.lexicon(&key, &Value::Null);
    let text = ctx.message().text.as_str();

    let by_key = |wanted: &str| spec.switch.iter().find(|(k, _)| k == wanted);
    by_key(&key)
        .or_else(|| by_key(&localized_key))
        .or_else(|| {
            spec.switch.iter().find(|(k, _)| {
                let localized = ctx.lexicon(k, &Value::Null);
                k == &key || localized == key || (!text.is_empty() && (k == text || localized == text))
            })
        })
        .map(|(_, bundle)| bundle.clone())
        .filter(|bundle| !bundle.is_empty())
}

/// 校验后直接给出动作集合
pub async fn process_gotos(ctx: &Context, registry: &Registry, spec: &ValidateSpec) -> ActionBundle {
    let outcome = validate(ctx, registry, spec).await;
    build_action_bundle(ctx, &outcome, spec)
}

/// 解析动作集合中的 goto
///
/// 目标是兄弟组时按声明顺序返回第一个触发器匹配、且不在 exclude 中的成员。
pub async fn find_next_node(
    ctx: &Context,
    registry: &Registry,
    script: &CompiledScript,
    bundle: &ActionBundle,
    exclude: &[String],
) -> Option<Arc<Node>> {
    let target = bundle.goto.as_deref()?;
    match script.extract(target) {
        None => {
            tracing::warn!("Goto target {} not found", target);
            None
        }
        Some(Entry::Node(node)) => {
            if exclude.contains(&node.path) {
                tracing::debug!("Goto target {} excluded", node.path);
                None
            } else {
                Some(node)
            }
        }
        Some(Entry::Group(members)) => {
            for member in members {
                if exclude.contains(&member.path) {
                    continue;
                }
                if match_triggers(ctx, registry, &member.trigger).await {
                    return Some(member);
                }
            }
            tracing::debug!("No member of {} matched", target);
            None
        }
    }
}
