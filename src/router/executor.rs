//! 步骤执行器
//!
//! 进入节点：记录当前步骤 -> storePre(before) -> 副作用 -> 发送消息 -> storePre(after)，
//! 然后解析节点的 goto 并沿链继续执行。链内每一跳把上一跳路径放入 exclude。
//! 一个执行器只服务一轮：链上节点与嵌套执行的帮助节点共用 max_chain_hops 预算。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::Value;

use super::goto::{find_next_node, process_gotos};
use crate::adapter::Adapter;
use crate::context::Context;
use crate::error::DialogError;
use crate::hooks::Registry;
use crate::message::{DeliveryId, Parcel, SELF_SEND};
use crate::script::{ActionBundle, ActionSpec, CompiledScript, KeyboardSpec, Node, StoreSpec, StoreStage};

/// 本轮执行选项
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    /// 移除上一步的一次性键盘
    pub remove_keyboard: bool,
}

pub struct StepExecutor<'a> {
    script: &'a CompiledScript,
    registry: &'a Registry,
    bridges: &'a HashMap<String, Arc<dyn Adapter>>,
    max_chain_hops: usize,
    /// 本轮已进入的节点数
    hops: AtomicUsize,
}

impl<'a> StepExecutor<'a> {
    pub fn new(
        script: &'a CompiledScript,
        registry: &'a Registry,
        bridges: &'a HashMap<String, Arc<dyn Adapter>>,
        max_chain_hops: usize,
    ) -> Self {
        Self {
            script,
            registry,
            bridges,
            max_chain_hops,
            hops: AtomicUsize::new(0),
        }
    }

    /// 本轮已进入的节点数
    pub fn hops(&self) -> usize {
        self.hops.load(Ordering::SeqCst)
    }

    /// 执行节点及其 goto 链，返回链中最后一次投递的 ID
    pub async fn execute(
        &self,
        node: Option<Arc<Node>>,
        ctx: &mut Context,
        update_session: bool,
        opts: &ExecOptions,
    ) -> Result<Option<DeliveryId>, DialogError> {
        let mut current = node;
        let mut update_session = update_session;
        let mut last_delivery = None;

        while let Some(node) = current.take() {
            if self.hops.fetch_add(1, Ordering::SeqCst) >= self.max_chain_hops {
                tracing::error!(
                    "Goto chain exceeded {} hops at {}, stopping",
                    self.max_chain_hops,
                    node.path
                );
                break;
            }

            if let Some(id) = self.enter(&node, ctx, update_session, opts).await? {
                last_delivery = Some(id);
            }

            let Some(goto) = node.goto.as_ref() else {
                break;
            };
            let bundle = process_gotos(ctx, self.registry, goto).await;
            self.run_methods(&bundle, ctx).await;
            if let Some(id) = self.run_help(&bundle, ctx, opts).await? {
                last_delivery = Some(id);
            }
            current = find_next_node(ctx, self.registry, self.script, &bundle, &[node.path.clone()]).await;
            update_session = true;
        }

        Ok(last_delivery)
    }

    /// 动作集合中的方法（出错只记录日志）
    pub async fn run_methods(&self, bundle: &ActionBundle, ctx: &mut Context) {
        for name in &bundle.methods {
            self.registry.call_method(name, ctx, &Value::Null).await;
        }
    }

    /// 以不更新会话的方式执行帮助节点
    pub async fn run_help(
        &self,
        bundle: &ActionBundle,
        ctx: &mut Context,
        opts: &ExecOptions,
    ) -> Result<Option<DeliveryId>, DialogError> {
        let Some(path) = bundle.help.as_deref() else {
            return Ok(None);
        };
        match self.script.node(path) {
            Some(help) => Box::pin(self.execute(Some(help), ctx, false, opts)).await,
            None => {
                tracing::warn!("Help path {} not found", path);
                Ok(None)
            }
        }
    }

    async fn enter(
        &self,
        node: &Arc<Node>,
        ctx: &mut Context,
        update_session: bool,
        opts: &ExecOptions,
    ) -> Result<Option<DeliveryId>, DialogError> {
        tracing::debug!(path = %node.path, update_session, "Executing step");
        ctx.set_step(Arc::clone(node));
        if update_session {
            ctx.session_mut().set_step(&node.path);
        }

        let store_pre = node.store_pre.as_ref();
        if let Some(spec) = store_pre.filter(|s| s.stage == StoreStage::Before) {
            store_answer(ctx, node, spec);
        }

        self.run_action(node, ctx).await;

        let mut delivered = None;
        if let Some(message) = node.message.as_deref() {
            let parcel = build_parcel(ctx, node, message, opts);
            match ctx.reply(parcel).await {
                Ok(id) => delivered = Some(id),
                Err(e) => {
                    tracing::error!("Failed to deliver message of {}: {}", node.path, e);
                    return Err(e.into());
                }
            }
        }

        if let Some(spec) = store_pre.filter(|s| s.stage == StoreStage::After) {
            store_answer(ctx, node, spec);
        }
        Ok(delivered)
    }

    async fn run_action(&self, node: &Node, ctx: &mut Context) {
        match &node.action {
            None => {}
            Some(ActionSpec::Method { name, params }) => {
                self.registry.call_method(name, ctx, params).await;
            }
            Some(ActionSpec::Send {
                targets,
                message,
                from_thread,
                keyboard,
            }) => {
                let text = compose_send_text(ctx, node, message.as_deref(), from_thread.as_deref());
                let keyboard = keyboard.as_ref().or(node.keyboard.as_ref()).map(|kb| localize_keyboard(ctx, kb));

                let mut sends = Vec::new();
                for (bridge_name, peers) in targets {
                    let Some(bridge) = self.bridges.get(bridge_name) else {
                        tracing::error!("Unknown bridge {} in send action of {}", bridge_name, node.path);
                        continue;
                    };
                    let platform_keyboard = keyboard.as_ref().and_then(|kb| bridge.build_keyboard(kb));
                    for peer in peers {
                        let peer_id = if peer == SELF_SEND {
                            ctx.message().sender.id.clone()
                        } else {
                            peer.clone()
                        };
                        let mut parcel = Parcel::new(peer_id, text.clone());
                        parcel.keyboard = platform_keyboard.clone();
                        let bridge = Arc::clone(bridge);
                        sends.push(async move { bridge.send(parcel).await });
                    }
                }

                for result in join_all(sends).await {
                    if let Err(e) = result {
                        tracing::error!("Send action of {} failed: {}", node.path, e);
                    }
                }
            }
        }
    }
}

/// 按 StoreSpec 记录答案；缺省值为用户回复文本
pub fn store_answer(ctx: &mut Context, node: &Node, spec: &StoreSpec) {
    let thread = spec.thread.clone().unwrap_or_else(|| node.thread.clone());
    let answer = spec
        .value
        .clone()
        .unwrap_or_else(|| Value::String(ctx.message().text.clone()));
    let message = node.message.clone().unwrap_or_default();
    tracing::debug!(thread = %thread, path = %node.path, "Storing answer");
    ctx.session_mut()
        .store_answer(&thread, spec.key.as_deref(), &message, answer, spec.clean);
}

fn localize_keyboard(ctx: &Context, keyboard: &KeyboardSpec) -> KeyboardSpec {
    KeyboardSpec {
        buttons: keyboard
            .buttons
            .iter()
            .map(|row| row.iter().map(|caption| ctx.lexicon(caption, &Value::Null)).collect())
            .collect(),
        options: keyboard.options.clone(),
    }
}

fn build_parcel(ctx: &Context, node: &Node, message: &str, opts: &ExecOptions) -> Parcel {
    let inbound = ctx.message();
    let mut parcel = Parcel::new(&inbound.chat.id, ctx.lexicon(message, &Value::Null));
    parcel.keyboard = node
        .keyboard
        .as_ref()
        .and_then(|kb| ctx.adapter().build_keyboard(&localize_keyboard(ctx, kb)));
    parcel.remove_keyboard = opts.remove_keyboard;
    parcel.attachments = node.attachments.clone();
    if node.replace && inbound.author().id == SELF_SEND {
        parcel.edit_target_id = Some(inbound.id.clone());
    }
    if node.reply {
        parcel.reply_target_id = Some(inbound.id.clone());
    }
    parcel
}

/// send 动作的文本；from_thread 有答案时附上答案列表
fn compose_send_text(ctx: &Context, node: &Node, message: Option<&str>, from_thread: Option<&str>) -> String {
    let key = message.or(node.message.as_deref()).unwrap_or_default();
    let mut text = ctx.lexicon(key, &Value::Null);

    let answers = from_thread.map(|t| ctx.session().answers(t)).unwrap_or_default();
    if !answers.is_empty() {
        text.push_str("\n\n");
        for entry in answers {
            let answer = match &entry.answer {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            text.push_str(&format!("{}>> {}\n\n", ctx.lexicon(&entry.message, &Value::Null), answer));
        }
    }
    text
}
