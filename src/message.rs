//! 消息协议定义
//!
//! 适配器把各平台的入站事件归一化为 InboundMessage，引擎产出 Parcel 交给适配器投递。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 回声身份：由本系统自己发出的消息以此作为发送者 ID
pub const SELF_SEND: &str = "__self__";

/// 入站事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    #[default]
    MessageNew,
    MessageEdit,
    MessageRemove,
    ChatNew,
    ChatMemberNew,
    ChatMemberLeft,
    ChatMessageNew,
    ChatMessageEdit,
    ChatMessagePin,
    ChatMessageRemove,
    ChatPhotoNew,
    ChatPhotoRemove,
    ChatTitleNew,
    ResultInlineChosen,
    QueryInline,
    QueryCallback,
    QueryShipping,
    QueryPreCheckout,
    PaymentNew,
    PaymentSuccess,
    PollNew,
    PollAnswer,
}

impl EventKind {
    /// 脚本中 event 触发器使用的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MessageNew => "messageNew",
            EventKind::MessageEdit => "messageEdit",
            EventKind::MessageRemove => "messageRemove",
            EventKind::ChatNew => "chatNew",
            EventKind::ChatMemberNew => "chatMemberNew",
            EventKind::ChatMemberLeft => "chatMemberLeft",
            EventKind::ChatMessageNew => "chatMessageNew",
            EventKind::ChatMessageEdit => "chatMessageEdit",
            EventKind::ChatMessagePin => "chatMessagePin",
            EventKind::ChatMessageRemove => "chatMessageRemove",
            EventKind::ChatPhotoNew => "chatPhotoNew",
            EventKind::ChatPhotoRemove => "chatPhotoRemove",
            EventKind::ChatTitleNew => "chatTitleNew",
            EventKind::ResultInlineChosen => "resultInlineChosen",
            EventKind::QueryInline => "queryInline",
            EventKind::QueryCallback => "queryCallback",
            EventKind::QueryShipping => "queryShipping",
            EventKind::QueryPreCheckout => "queryPreCheckout",
            EventKind::PaymentNew => "paymentNew",
            EventKind::PaymentSuccess => "paymentSuccess",
            EventKind::PollNew => "pollNew",
            EventKind::PollAnswer => "pollAnswer",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 附件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Photo,
    Video,
    Audio,
    File,
    Link,
    Post,
    Poll,
    Sticker,
    Forward,
}

/// 附件元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub width: u32,
    pub height: u32,
    pub length: u64,
    pub file_size: u64,
}

/// 入站附件（下载与解析由适配器负责）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub id: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub meta: AttachmentMeta,
}

impl Attachment {
    pub fn new(kind: AttachmentKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            link: String::new(),
            name: String::new(),
            owner: String::new(),
            meta: AttachmentMeta::default(),
        }
    }
}

/// 会话 / 群组
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    /// user / chat / channel
    #[serde(rename = "type", default = "default_chat_type")]
    pub kind: String,
}

fn default_chat_type() -> String {
    "user".to_string()
}

/// 消息发送者
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub full_name: String,
}

/// 回调查询（内联按钮、深链）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub id: String,
    /// 按钮携带的负载
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub msg_id: String,
    /// 深链：直接指定要处理的脚本路径
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub params: Value,
}

/// 归一化的入站消息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub chat: Chat,
    #[serde(default)]
    pub sender: Sender,
    /// 原消息作者（回调事件中通常是机器人自己发出的那条消息）
    #[serde(default)]
    pub author: Option<Sender>,
    #[serde(default)]
    pub attachments: HashMap<AttachmentKind, Vec<Attachment>>,
    #[serde(default)]
    pub event: EventKind,
    #[serde(default)]
    pub query: CallbackQuery,
    #[serde(default)]
    pub edited: bool,
}

impl InboundMessage {
    /// 普通文本消息
    pub fn text(chat_id: impl Into<String>, sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        let sender_id = sender_id.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            chat: Chat {
                id: chat_id.into(),
                kind: default_chat_type(),
            },
            sender: Sender {
                id: sender_id,
                ..Sender::default()
            },
            ..Self::default()
        }
    }

    /// 回调消息（按钮点击）
    pub fn callback(chat_id: impl Into<String>, sender_id: impl Into<String>, data: impl Into<String>) -> Self {
        let mut msg = Self::text(chat_id, sender_id, "");
        msg.event = EventKind::QueryCallback;
        msg.query.data = data.into();
        msg
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.entry(attachment.kind).or_default().push(attachment);
        self
    }

    /// 某类附件列表，没有时为空切片
    pub fn attachments_of(&self, kind: AttachmentKind) -> &[Attachment] {
        self.attachments.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 发送者是否为本系统的回声身份
    pub fn is_self_sent(&self) -> bool {
        self.sender.id == SELF_SEND
    }

    /// 原消息作者；未设置时即发送者
    pub fn author(&self) -> &Sender {
        self.author.as_ref().unwrap_or(&self.sender)
    }
}

/// 出站消息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub message: String,
    pub peer_id: String,
    /// 适配器构建好的平台键盘
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<Value>,
    /// 移除上一条消息附带的一次性键盘
    #[serde(default)]
    pub remove_keyboard: bool,
    #[serde(default)]
    pub attachments: HashMap<String, Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_target_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_target_id: Option<String>,
}

impl Parcel {
    pub fn new(peer_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            peer_id: peer_id.into(),
            ..Self::default()
        }
    }
}

/// 适配器返回的投递 ID
pub type DeliveryId = String;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_serde_matches_trigger_names() {
        let json = serde_json::to_string(&EventKind::QueryCallback).unwrap();
        assert_eq!(json, "\"queryCallback\"");
        assert_eq!(EventKind::ChatMemberNew.as_str(), "chatMemberNew");
    }

    #[test]
    fn test_author_defaults_to_sender() {
        let mut msg = InboundMessage::text("1", "42", "hi");
        assert_eq!(msg.author().id, "42");
        msg.author = Some(Sender {
            id: SELF_SEND.to_string(),
            ..Sender::default()
        });
        assert_eq!(msg.author().id, SELF_SEND);
        assert!(!msg.is_self_sent());
    }

    #[test]
    fn test_attachments_of_missing_kind_is_empty() {
        let msg = InboundMessage::text("1", "42", "")
            .with_attachment(Attachment::new(AttachmentKind::Photo, "p1"));
        assert_eq!(msg.attachments_of(AttachmentKind::Photo).len(), 1);
        assert!(msg.attachments_of(AttachmentKind::Video).is_empty());
    }
}
