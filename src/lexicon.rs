//! 本地化
//!
//! 脚本里的 message、按钮文字、text 触发器值都是词条键或模板，
//! 运行期按用户语言查表并替换 `((name))` 参数。

use std::path::Path;

use anyhow::Context as _;
use serde_json::{Map, Value};

use crate::script::merge_raw;

const LEFT: &str = "((";
const RIGHT: &str = "))";

/// 本地化接口
pub trait Localizer: Send + Sync {
    /// 找不到词条时返回替换参数后的 key 本身
    fn localize(&self, key: &str, params: &Value, language: &str) -> String;
}

/// 默认实现：`语言 -> 嵌套词条表`，点分键查找
#[derive(Debug, Clone, Default)]
pub struct Lexicons {
    tables: Map<String, Value>,
    default_language: String,
}

impl Lexicons {
    pub fn new(default_language: impl Into<String>) -> Self {
        Self {
            tables: Map::new(),
            default_language: default_language.into(),
        }
    }

    /// 合并词条（`{"en": {...}, "ru": {...}}`），后加载的覆盖同名键
    pub fn load(&mut self, lexicons: Value) -> &mut Self {
        let mut tables = Value::Object(std::mem::take(&mut self.tables));
        merge_raw(&mut tables, lexicons);
        if let Value::Object(map) = tables {
            self.tables = map;
        }
        self
    }

    /// 按扩展名（.json / .toml）加载词条文件
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> anyhow::Result<&mut Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lexicon {}", path.display()))?;
        let value: Value = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("Invalid TOML lexicon {}", path.display()))?,
            _ => serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON lexicon {}", path.display()))?,
        };
        tracing::debug!("Loaded lexicon {}", path.display());
        Ok(self.load(value))
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    fn lookup(&self, language: &str, key: &str) -> Option<&str> {
        let mut current = self.tables.get(language)?;
        for segment in key.split('.') {
            current = current.get(segment)?;
        }
        current.as_str().filter(|s| !s.is_empty())
    }
}

impl Localizer for Lexicons {
    fn localize(&self, key: &str, params: &Value, language: &str) -> String {
        let language = if language.is_empty() {
            self.default_language.as_str()
        } else {
            language
        };
        let entry = self.lookup(language, key).unwrap_or(key);
        substitute(entry, params)
    }
}

/// 用 params 中的值替换 `((name))`
pub fn substitute(template: &str, params: &Value) -> String {
    let Some(params) = params.as_object() else {
        return template.to_string();
    };
    if !template.contains(LEFT) {
        return template.to_string();
    }
    let mut result = template.to_string();
    for (name, value) in params {
        let placeholder = format!("{LEFT}{name}{RIGHT}");
        let replacement = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        result = result.replace(&placeholder, &replacement);
    }
    result
}
