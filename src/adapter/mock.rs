//! Mock 适配器（用于测试）
//!
//! 记录所有投递的 Parcel；可配置为总是失败，用于验证投递错误的传播。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::Adapter;
use crate::error::DeliveryError;
use crate::message::{DeliveryId, Parcel};

#[derive(Debug, Default)]
pub struct MockAdapter {
    name: String,
    driver: String,
    fail: bool,
    sent: Mutex<Vec<Parcel>>,
    counter: AtomicUsize,
}

impl MockAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: "mock".to_string(),
            ..Self::default()
        }
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    /// 所有投递都失败
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// 已投递的 Parcel（按投递顺序）
    pub fn sent(&self) -> Vec<Parcel> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// 已投递的消息文本
    pub fn messages(&self) -> Vec<String> {
        self.sent().into_iter().map(|p| p.message).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn driver_name(&self) -> &str {
        &self.driver
    }

    async fn send(&self, parcel: Parcel) -> Result<DeliveryId, DeliveryError> {
        if self.fail {
            return Err(DeliveryError::new(&self.name, &parcel.peer_id, "mock delivery failure"));
        }
        let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(parcel);
        }
        Ok(format!("{}-{}", self.name, id))
    }
}
