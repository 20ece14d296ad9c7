//! 适配器（消息平台端点）
//!
//! 适配器负责把平台事件归一化为 InboundMessage，并投递引擎产出的 Parcel。
//! 具体平台驱动不在本 crate 内；这里提供控制台实现与测试用的 Mock。

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::DeliveryError;
use crate::message::{DeliveryId, Parcel};
use crate::script::KeyboardSpec;

pub mod console;
pub mod mock;

pub use console::ConsoleAdapter;
pub use mock::MockAdapter;

/// 适配器 trait
#[async_trait]
pub trait Adapter: Send + Sync {
    /// 实例名（bridge 触发器、send 目标、存储键使用）
    fn name(&self) -> &str;

    /// 驱动名（driver 触发器使用）
    fn driver_name(&self) -> &str;

    /// 把已本地化的键盘转成平台格式；None 表示平台不支持键盘
    fn build_keyboard(&self, keyboard: &KeyboardSpec) -> Option<Value> {
        if keyboard.buttons.is_empty() {
            return None;
        }
        Some(json!({
            "buttons": keyboard.buttons,
            "options": keyboard.options,
        }))
    }

    /// 发送消息
    async fn send(&self, parcel: Parcel) -> Result<DeliveryId, DeliveryError>;

    /// 回复当前会话
    async fn reply(&self, parcel: Parcel) -> Result<DeliveryId, DeliveryError> {
        self.send(parcel).await
    }
}
