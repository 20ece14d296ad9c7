//! 会话数据
//!
//! Session 是持久化的形状；SessionHandle 是一轮处理期间的可变视图，
//! 记录是否被修改过，决定轮末是否需要写回。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::key::StorageKey;

/// 当前步骤引用（只存路径，节点本身每次从脚本重新解析）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRef {
    pub path: String,
}

/// 记录的一条答案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub key: String,
    /// 提问时展示的消息
    #[serde(default)]
    pub message: String,
    pub answer: Value,
}

/// 持久化的会话
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<StepRef>,
    /// 线程 -> 答案列表
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub answers: BTreeMap<String, Vec<AnswerEntry>>,
    /// 用户选择的语言；缺省使用配置中的默认语言
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// 短哈希 -> 按钮负载
    #[serde(default, rename = "callbackData", skip_serializing_if = "BTreeMap::is_empty")]
    pub callback_data: BTreeMap<String, Value>,
    /// 宿主方法写入的其它字段
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl Session {
    /// 没有任何内容时应从存储中删除
    pub fn is_trivially_empty(&self) -> bool {
        self.step.is_none()
            && self.language.is_none()
            && self.answers.values().all(Vec::is_empty)
            && self.callback_data.is_empty()
            && self.extra.is_empty()
    }
}

/// 一轮处理中的会话视图
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// None 表示不持久化（回声事件）
    key: Option<StorageKey>,
    data: Session,
    touched: bool,
}

impl SessionHandle {
    pub fn new(key: StorageKey, data: Session) -> Self {
        Self {
            key: Some(key),
            data,
            touched: false,
        }
    }

    /// 不落盘的临时会话
    pub fn detached() -> Self {
        Self {
            key: None,
            data: Session::default(),
            touched: false,
        }
    }

    pub fn key(&self) -> Option<&StorageKey> {
        self.key.as_ref()
    }

    pub fn data(&self) -> &Session {
        &self.data
    }

    /// 可变访问会把会话标记为已修改
    pub fn data_mut(&mut self) -> &mut Session {
        self.touched = true;
        &mut self.data
    }

    pub fn is_touched(&self) -> bool {
        self.touched
    }

    pub fn into_parts(self) -> (Option<StorageKey>, Session, bool) {
        (self.key, self.data, self.touched)
    }

    pub fn step_path(&self) -> Option<&str> {
        self.data.step.as_ref().map(|s| s.path.as_str())
    }

    pub fn set_step(&mut self, path: impl Into<String>) {
        let path = path.into();
        if self.step_path() != Some(path.as_str()) {
            self.data_mut().step = Some(StepRef { path });
        }
    }

    pub fn clear_step(&mut self) {
        if self.data.step.is_some() {
            self.data_mut().step = None;
        }
    }

    pub fn answers(&self, thread: &str) -> &[AnswerEntry] {
        self.data.answers.get(thread).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 记录答案：clean 先清空线程；key 缺省为序号；同 key 原位替换
    pub fn store_answer(
        &mut self,
        thread: &str,
        key: Option<&str>,
        message: &str,
        answer: Value,
        clean: bool,
    ) {
        let entries = self.data_mut().answers.entry(thread.to_string()).or_default();
        if clean {
            entries.clear();
        }
        let key = key
            .map(str::to_string)
            .unwrap_or_else(|| (entries.len() + 1).to_string());
        let entry = AnswerEntry {
            key,
            message: message.to_string(),
            answer,
        };
        match entries.iter_mut().find(|e| e.key == entry.key) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    pub fn clear_answers(&mut self, thread: &str) {
        if self.data.answers.contains_key(thread) {
            self.data_mut().answers.remove(thread);
        }
    }

    /// 保存按钮负载，返回可放进回调数据的短哈希
    pub fn put_callback_data(&mut self, payload: Value) -> String {
        let hash = callback_hash(&payload);
        self.data_mut().callback_data.insert(hash.clone(), payload);
        hash
    }

    pub fn callback_data(&self, hash: &str) -> Option<&Value> {
        self.data.callback_data.get(hash)
    }
}

/// 负载的 16 位十六进制短哈希
pub fn callback_hash(payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}
