//! Chatflow 控制台宿主
//!
//! 入口：加载配置与日志、编译脚本、打开会话存储，然后逐行读取标准输入并路由。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chatflow::adapter::ConsoleAdapter;
use chatflow::config::load_config;
use chatflow::lexicon::Lexicons;
use chatflow::session::{create_session_storage, SessionManager};
use chatflow::{observability, DialogRouter, InboundMessage, ScriptLoader};
use tokio::io::{AsyncBufReadExt, BufReader};

const BRIDGE: &str = "console";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    observability::init();

    // 可选参数：额外配置文件路径
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load config")?;

    let mut loader = ScriptLoader::new();
    for path in &config.dialog.scripts {
        loader.add_path(path)?;
    }
    let script = loader.compile().context("Failed to compile script")?;
    tracing::info!("Loaded {} script sources", loader.sources().len());

    let mut lexicons = Lexicons::new(config.app.language.clone());
    for path in &config.dialog.lexicons {
        lexicons.load_file(path)?;
    }

    let storage = create_session_storage(config.session.backend, &config.session.path).await;
    let router = DialogRouter::builder(script)
        .with_config(&config)
        .with_bridge(Arc::new(ConsoleAdapter::new(BRIDGE)))
        .with_localizer(Arc::new(lexicons))
        .with_sessions(SessionManager::new(storage))
        .build();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let message = InboundMessage::text(BRIDGE, "console-user", line.trim());
        match router.handle(BRIDGE, message).await {
            Ok(outcome) => tracing::debug!(?outcome, "Message routed"),
            Err(e) => tracing::error!("Routing failed: {}", e),
        }
    }

    Ok(())
}
