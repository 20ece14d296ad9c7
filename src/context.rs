//! 单次入站事件的处理上下文
//!
//! 持有入站消息、来源适配器、会话视图与本轮状态（当前步骤、是否已处理）。
//! 本轮状态不持久化；只有 session 会在轮末写回。

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::adapter::Adapter;
use crate::error::DeliveryError;
use crate::lexicon::Localizer;
use crate::message::{DeliveryId, InboundMessage, Parcel};
use crate::script::Node;
use crate::session::SessionHandle;

pub struct Context {
    message: InboundMessage,
    adapter: Arc<dyn Adapter>,
    session: SessionHandle,
    localizer: Arc<dyn Localizer>,
    language: String,
    processed: bool,
    step: Option<Arc<Node>>,
    /// 自定义方法之间传递数据的本轮草稿区
    pub state: Map<String, Value>,
}

impl Context {
    pub fn new(
        message: InboundMessage,
        adapter: Arc<dyn Adapter>,
        session: SessionHandle,
        localizer: Arc<dyn Localizer>,
        default_language: &str,
    ) -> Self {
        let language = session
            .data()
            .language
            .clone()
            .unwrap_or_else(|| default_language.to_string());
        Self {
            message,
            adapter,
            session,
            localizer,
            language,
            processed: false,
            step: None,
            state: Map::new(),
        }
    }

    pub fn message(&self) -> &InboundMessage {
        &self.message
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    pub fn bridge_name(&self) -> &str {
        self.adapter.name()
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionHandle {
        &mut self.session
    }

    pub fn into_session(self) -> SessionHandle {
        self.session
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// 切换语言并记入会话
    pub fn set_language(&mut self, language: impl Into<String>) {
        let language = language.into();
        self.session.data_mut().language = Some(language.clone());
        self.language = language;
    }

    pub fn localizer(&self) -> &Arc<dyn Localizer> {
        &self.localizer
    }

    /// 按当前语言本地化
    pub fn lexicon(&self, key: &str, params: &Value) -> String {
        self.localizer.localize(key, params, &self.language)
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn set_processed(&mut self, processed: bool) {
        self.processed = processed;
    }

    /// 本轮当前步骤
    pub fn step(&self) -> Option<&Arc<Node>> {
        self.step.as_ref()
    }

    pub fn set_step(&mut self, node: Arc<Node>) {
        self.step = Some(node);
    }

    /// 通过来源适配器回复
    pub async fn reply(&self, parcel: Parcel) -> Result<DeliveryId, DeliveryError> {
        self.adapter.reply(parcel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MockAdapter;
    use crate::lexicon::Lexicons;
    use crate::session::{Session, StorageKey};
    use serde_json::json;

    fn context(session: Session) -> Context {
        let mut lex = Lexicons::new("en");
        lex.load(json!({"en": {"hi": "Hi"}, "ru": {"hi": "Привет"}}));
        Context::new(
            InboundMessage::text("1", "2", "hello"),
            Arc::new(MockAdapter::new("tg")),
            SessionHandle::new(StorageKey::new("tg", "1", "2"), session),
            Arc::new(lex),
            "en",
        )
    }

    #[test]
    fn test_language_from_session_then_default() {
        let ctx = context(Session::default());
        assert_eq!(ctx.lexicon("hi", &Value::Null), "Hi");

        let ctx = context(Session {
            language: Some("ru".to_string()),
            ..Session::default()
        });
        assert_eq!(ctx.lexicon("hi", &Value::Null), "Привет");
        assert!(!ctx.session().is_touched());
    }

    #[test]
    fn test_set_language_touches_session() {
        let mut ctx = context(Session::default());
        ctx.set_language("ru");
        assert_eq!(ctx.language(), "ru");
        assert!(ctx.session().is_touched());
        assert_eq!(ctx.bridge_name(), "tg");
    }
}
