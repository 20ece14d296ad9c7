//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CHATFLOW__*` 覆盖（双下划线表示嵌套，如 `CHATFLOW__SESSION__BACKEND=file`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub dialog: DialogSection,
    pub session: SessionSection,
}

/// [app] 段：应用名、默认语言
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 会话未记录语言时使用
    pub language: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            language: "en".to_string(),
        }
    }
}

/// 找不到下一步时的默认行为
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DefaultAction {
    #[default]
    None,
    /// 执行帮助节点（不更新会话）
    Help,
}

/// [dialog] 段：路由行为与脚本位置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DialogSection {
    pub default_action: DefaultAction,
    pub help_path: String,
    /// 单轮 goto 链的最大跳数
    pub max_chain_hops: usize,
    /// 脚本文件或目录（宿主程序按顺序加载）
    pub scripts: Vec<PathBuf>,
    /// 词条文件（JSON / TOML）
    pub lexicons: Vec<PathBuf>,
}

impl Default for DialogSection {
    fn default() -> Self {
        Self {
            default_action: DefaultAction::None,
            help_path: "help".to_string(),
            max_chain_hops: 32,
            scripts: Vec::new(),
            lexicons: Vec::new(),
        }
    }
}

/// 会话存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    #[default]
    Memory,
    File,
    Sqlite,
}

/// [session] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub backend: SessionBackend,
    /// file 后端的 JSON 文件，或 sqlite 后端的数据库文件
    pub path: PathBuf,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            backend: SessionBackend::Memory,
            path: PathBuf::from("sessions.json"),
        }
    }
}

/// 从 config 目录加载配置，环境变量 CHATFLOW__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CHATFLOW__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CHATFLOW")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
