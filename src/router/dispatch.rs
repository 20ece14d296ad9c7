//! 对话路由
//!
//! 一次入站事件的处理流程：
//! 1. 回声 / 已处理保护
//! 2. 活动路径：深链 query.path > 会话 step > 根容器 `c`
//! 3. 命令优先：按声明顺序扫描命令索引
//! 4. 否则对活动节点做校验 -> 方法 -> 帮助 -> 存答案 -> 解析下一步
//! 5. 都没有结果且配置了默认帮助时执行帮助节点
//! 6. 执行选中的节点（含 goto 链）

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::Adapter;
use crate::config::{AppConfig, DefaultAction, DialogSection};
use crate::context::Context;
use crate::error::DialogError;
use crate::hooks::Registry;
use crate::lexicon::{Lexicons, Localizer};
use crate::matcher::match_triggers;
use crate::message::{DeliveryId, InboundMessage};
use crate::script::{ActionBundle, CompiledScript, Entry, Node, CHILDREN};
use crate::session::{SessionHandle, SessionManager, StorageKey};

use super::executor::{store_answer, ExecOptions, StepExecutor};
use super::goto::{find_next_node, process_gotos};

/// 存储键函数：(适配器名, 入站消息) -> 键；None 表示不持久化
pub type KeyFn = Arc<dyn Fn(&str, &InboundMessage) -> Option<StorageKey> + Send + Sync>;

/// 路由结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStatus {
    Handled,
    /// 本系统自己发出的消息，忽略
    SelfEcho,
    AlreadyProcessed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOutcome {
    pub status: RouteStatus,
    /// 本轮执行的第一个节点
    pub executed: Option<String>,
    /// 最后一次投递 ID
    pub delivery: Option<DeliveryId>,
}

impl RouteOutcome {
    fn skipped(status: RouteStatus) -> Self {
        Self {
            status,
            executed: None,
            delivery: None,
        }
    }
}

/// 不可变的路由器；可放进 Arc 在多个任务间共享
pub struct DialogRouter {
    script: Arc<CompiledScript>,
    registry: Registry,
    bridges: HashMap<String, Arc<dyn Adapter>>,
    localizer: Arc<dyn Localizer>,
    sessions: SessionManager,
    key_fn: KeyFn,
    dialog: DialogSection,
    language: String,
}

impl DialogRouter {
    pub fn builder(script: CompiledScript) -> RouterBuilder {
        RouterBuilder::new(script)
    }

    pub fn script(&self) -> &CompiledScript {
        &self.script
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn bridge(&self, name: &str) -> Option<Arc<dyn Adapter>> {
        self.bridges.get(name).cloned()
    }

    /// 宿主入口：加载会话、路由、成功后写回会话
    pub async fn handle(&self, bridge: &str, message: InboundMessage) -> Result<RouteOutcome, DialogError> {
        if message.is_self_sent() {
            tracing::debug!("Ignoring self-sent message {}", message.id);
            return Ok(RouteOutcome::skipped(RouteStatus::SelfEcho));
        }
        let adapter = self
            .bridge(bridge)
            .ok_or_else(|| DialogError::Config(format!("Unknown bridge: {bridge}")))?;

        let session = match (self.key_fn)(bridge, &message) {
            Some(key) => self.sessions.load(key).await?,
            None => SessionHandle::detached(),
        };
        let mut ctx = self.context(adapter, message, session);
        let outcome = self.route(&mut ctx).await?;
        self.sessions.flush(ctx.into_session()).await?;
        Ok(outcome)
    }

    /// 为入站消息构造上下文（会话由调用方提供）
    pub fn context(&self, adapter: Arc<dyn Adapter>, message: InboundMessage, session: SessionHandle) -> Context {
        Context::new(message, adapter, session, Arc::clone(&self.localizer), &self.language)
    }

    /// 路由一次入站事件；会话修改留在 ctx 中，由调用方决定是否写回
    pub async fn route(&self, ctx: &mut Context) -> Result<RouteOutcome, DialogError> {
        if ctx.message().is_self_sent() {
            tracing::debug!("Ignoring self-sent message {}", ctx.message().id);
            return Ok(RouteOutcome::skipped(RouteStatus::SelfEcho));
        }
        if ctx.is_processed() {
            tracing::debug!("Message {} already processed", ctx.message().id);
            return Ok(RouteOutcome::skipped(RouteStatus::AlreadyProcessed));
        }

        let mut update_session = true;
        let path = match ctx.message().query.path.clone().filter(|p| !p.is_empty()) {
            Some(deep_link) => {
                update_session = false;
                deep_link
            }
            None => ctx
                .session()
                .step_path()
                .map(str::to_string)
                .unwrap_or_else(|| CHILDREN.to_string()),
        };
        tracing::debug!(path = %path, text = %ctx.message().text, "Routing message");

        let opts = ExecOptions {
            remove_keyboard: self
                .script
                .node(&path)
                .and_then(|n| n.keyboard.clone())
                .is_some_and(|kb| kb.has_option("oneTime")),
        };
        // 每轮一个执行器：帮助与 goto 链共享跳数预算
        let executor = self.executor();
        let mut help_delivery = None;

        let mut next = self.find_command(ctx).await;
        if next.is_some() {
            update_session = true;
        } else {
            match self.script.extract(&path) {
                Some(Entry::Node(node)) => {
                    let bundle = match node.validate.as_ref() {
                        Some(spec) => process_gotos(ctx, &self.registry, spec).await,
                        None => ActionBundle::default(),
                    };
                    executor.run_methods(&bundle, ctx).await;
                    help_delivery = executor.run_help(&bundle, ctx, &opts).await?;
                    if let Some(spec) = node.store.as_ref() {
                        store_answer(ctx, &node, spec);
                    }
                    next = find_next_node(ctx, &self.registry, &self.script, &bundle, &[]).await;
                }
                Some(Entry::Group(_)) => {
                    let bundle = ActionBundle::goto(path.clone());
                    next = find_next_node(ctx, &self.registry, &self.script, &bundle, &[]).await;
                }
                None => tracing::warn!("Active path {} not found", path),
            }
        }

        if next.is_none() && self.dialog.default_action == DefaultAction::Help {
            next = self.script.node(&self.dialog.help_path);
            if next.is_none() {
                tracing::warn!("Default help path {} not found", self.dialog.help_path);
            }
            update_session = false;
        }

        let executed = next.as_ref().map(|n| n.path.clone());
        let delivery = executor.execute(next, ctx, update_session, &opts).await?;
        ctx.set_processed(true);

        Ok(RouteOutcome {
            status: RouteStatus::Handled,
            executed,
            delivery: delivery.or(help_delivery),
        })
    }

    /// 按声明顺序返回第一个触发器匹配的命令节点
    async fn find_command(&self, ctx: &Context) -> Option<Arc<Node>> {
        for node in self.script.commands() {
            if !node.trigger.is_empty() && match_triggers(ctx, &self.registry, &node.trigger).await {
                tracing::debug!("Command {} matched", node.path);
                return Some(node);
            }
        }
        None
    }

    fn executor(&self) -> StepExecutor<'_> {
        StepExecutor::new(&self.script, &self.registry, &self.bridges, self.dialog.max_chain_hops)
    }
}

/// 路由器构建器：构造期注册所有适配器与扩展点，build() 之后不可变
pub struct RouterBuilder {
    script: Arc<CompiledScript>,
    registry: Registry,
    bridges: HashMap<String, Arc<dyn Adapter>>,
    localizer: Option<Arc<dyn Localizer>>,
    sessions: Option<SessionManager>,
    key_fn: Option<KeyFn>,
    dialog: DialogSection,
    language: String,
}

impl RouterBuilder {
    pub fn new(script: CompiledScript) -> Self {
        Self {
            script: Arc::new(script),
            registry: Registry::new(),
            bridges: HashMap::new(),
            localizer: None,
            sessions: None,
            key_fn: None,
            dialog: DialogSection::default(),
            language: "en".to_string(),
        }
    }

    /// 从应用配置读取路由行为与默认语言
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        self.dialog = config.dialog.clone();
        self.language = config.app.language.clone();
        self
    }

    pub fn with_dialog(mut self, dialog: DialogSection) -> Self {
        self.dialog = dialog;
        self
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// 注册适配器（按 name() 索引）
    pub fn with_bridge(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.bridges.insert(adapter.name().to_string(), adapter);
        self
    }

    pub fn with_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = Some(localizer);
        self
    }

    pub fn with_sessions(mut self, sessions: SessionManager) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_key_fn<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&str, &InboundMessage) -> Option<StorageKey> + Send + Sync + 'static,
    {
        self.key_fn = Some(Arc::new(key_fn));
        self
    }

    pub fn build(self) -> DialogRouter {
        let language = self.language;
        DialogRouter {
            script: self.script,
            registry: self.registry,
            bridges: self.bridges,
            localizer: self
                .localizer
                .unwrap_or_else(|| Arc::new(Lexicons::new(language.clone())) as Arc<dyn Localizer>),
            sessions: self.sessions.unwrap_or_default(),
            key_fn: self.key_fn.unwrap_or_else(|| Arc::new(StorageKey::for_message) as KeyFn),
            dialog: self.dialog,
            language,
        }
    }
}
