//! 脚本加载
//!
//! 多个脚本片段（JSON / TOML）按加载顺序深度合并后再编译：
//! 对象递归合并，数组拼接，标量后者覆盖前者。

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde_json::Value;

use super::compiler::{compile, CompiledScript};
use crate::error::CompileError;

/// 把 `incoming` 深度合并进 `base`
pub fn merge_raw(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Object(base), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match base.get_mut(&key) {
                    Some(existing) => merge_raw(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(incoming)) => base.extend(incoming),
        (base, incoming) => *base = incoming,
    }
}

/// 脚本片段累加器
#[derive(Debug, Clone)]
pub struct ScriptLoader {
    raw: Value,
    sources: Vec<String>,
}

impl Default for ScriptLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptLoader {
    pub fn new() -> Self {
        Self {
            raw: Value::Object(Default::default()),
            sources: Vec::new(),
        }
    }

    pub fn add_value(&mut self, value: Value) -> &mut Self {
        merge_raw(&mut self.raw, value);
        self
    }

    pub fn add_json(&mut self, content: &str) -> anyhow::Result<&mut Self> {
        let value: Value = serde_json::from_str(content).context("Invalid JSON script")?;
        Ok(self.add_value(value))
    }

    pub fn add_toml(&mut self, content: &str) -> anyhow::Result<&mut Self> {
        let value: Value = toml::from_str(content).context("Invalid TOML script")?;
        Ok(self.add_value(value))
    }

    /// 按扩展名（.json / .toml）加载单个文件
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> anyhow::Result<&mut Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        let loaded = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => self.add_toml(&content).map(|_| ()),
            _ => self.add_json(&content).map(|_| ()),
        };
        loaded.with_context(|| format!("Failed to load script {}", path.display()))?;
        self.sources.push(path.display().to_string());
        tracing::debug!("Loaded script fragment {}", path.display());
        Ok(self)
    }

    /// 加载路径：目录内的 .json / .toml 按文件名排序依次加载
    pub fn add_path(&mut self, path: impl AsRef<Path>) -> anyhow::Result<&mut Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return self.add_file(path);
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| {
                p.is_file()
                    && matches!(p.extension().and_then(|e| e.to_str()), Some("json" | "toml"))
            })
            .collect();
        files.sort();
        for file in files {
            self.add_file(&file)?;
        }
        Ok(self)
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn compile(&self) -> Result<CompiledScript, CompileError> {
        compile(&self.raw)
    }
}
