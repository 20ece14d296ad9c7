//! 会话存储键：`适配器名:会话ID:发送者ID`

use std::fmt;

use crate::message::InboundMessage;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    pub bridge: String,
    pub chat_id: String,
    pub sender_id: String,
}

impl StorageKey {
    pub fn new(bridge: impl Into<String>, chat_id: impl Into<String>, sender_id: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            chat_id: chat_id.into(),
            sender_id: sender_id.into(),
        }
    }

    /// 由入站消息与适配器名派生；回声身份发出的消息没有会话
    pub fn for_message(bridge: &str, message: &InboundMessage) -> Option<Self> {
        if message.is_self_sent() {
            return None;
        }
        Some(Self::new(bridge, &message.chat.id, &message.sender.id))
    }

    /// 解析 `bridge:chat:sender`；会话 ID 中可能含 `:`，发送者取最后一段
    pub fn parse(raw: &str) -> Option<Self> {
        let (bridge, rest) = raw.split_once(':')?;
        let (chat_id, sender_id) = rest.rsplit_once(':')?;
        Some(Self::new(bridge, chat_id, sender_id))
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.bridge, self.chat_id, self.sender_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format_and_parse() {
        let msg = InboundMessage::text("chat-1", "user-7", "hi");
        let key = StorageKey::for_message("tg", &msg).unwrap();
        assert_eq!(key.to_string(), "tg:chat-1:user-7");
        assert_eq!(StorageKey::parse("tg:chat-1:user-7"), Some(key));
        assert_eq!(StorageKey::parse("vk:a:b:c").unwrap().chat_id, "a:b");
        assert!(StorageKey::parse("nocolon").is_none());

        let echo = InboundMessage::text("chat-1", crate::message::SELF_SEND, "hi");
        assert!(StorageKey::for_message("tg", &echo).is_none());
    }
}
