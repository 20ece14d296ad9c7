//! 控制台适配器：把出站消息打印到 stdout

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::Adapter;
use crate::error::DeliveryError;
use crate::message::{DeliveryId, Parcel};

pub struct ConsoleAdapter {
    name: String,
}

impl ConsoleAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for ConsoleAdapter {
    fn default() -> Self {
        Self::new("console")
    }
}

/// 控制台上的一条出站消息
pub fn render(parcel: &Parcel) -> String {
    let mut out = format!("[{}] {}", parcel.peer_id, parcel.message);
    if let Some(rows) = parcel
        .keyboard
        .as_ref()
        .and_then(|k| k.get("buttons"))
        .and_then(|b| b.as_array())
    {
        for row in rows {
            let captions: Vec<&str> = row
                .as_array()
                .map(|r| r.iter().filter_map(|c| c.as_str()).collect())
                .unwrap_or_default();
            out.push_str(&format!("\n  [ {} ]", captions.join(" | ")));
        }
    }
    out
}

#[async_trait]
impl Adapter for ConsoleAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn driver_name(&self) -> &str {
        "console"
    }

    async fn send(&self, parcel: Parcel) -> Result<DeliveryId, DeliveryError> {
        let line = format!("{}\n", render(&parcel));
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|e| DeliveryError::new(&self.name, &parcel.peer_id, e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| DeliveryError::new(&self.name, &parcel.peer_id, e.to_string()))?;
        Ok(uuid::Uuid::new_v4().to_string())
    }
}
