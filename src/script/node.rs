//! 编译后的脚本节点与各类规格
//!
//! 节点在加载时构建一次，之后只读；运行期通过 Arc<Node> 在路由与执行之间共享。

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 子节点容器的保留路径段；隐式根容器同名
pub const CHILDREN: &str = "c";

/// 触发器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    /// 与本地化后的候选文本完全相等
    Text,
    /// 不区分大小写、多行的正则搜索
    Regexp,
    /// 入站事件类型
    Event,
    /// 适配器实例名
    Bridge,
    /// 适配器驱动名
    Driver,
    /// 回调负载相等，或以 `*` 结尾时前缀匹配
    Callback,
    /// 注册表中的自定义触发器
    Method,
}

impl TriggerKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "text" => Some(TriggerKind::Text),
            "regexp" | "regex" => Some(TriggerKind::Regexp),
            "event" => Some(TriggerKind::Event),
            "bridge" => Some(TriggerKind::Bridge),
            "driver" => Some(TriggerKind::Driver),
            "callback" => Some(TriggerKind::Callback),
            "method" => Some(TriggerKind::Method),
            _ => None,
        }
    }
}

/// 单个触发器：values 之间为 OR
#[derive(Debug, Clone)]
pub struct TriggerSpec {
    pub kind: TriggerKind,
    pub values: Vec<String>,
    pub params: Value,
    /// 仅 Regexp：编译期预编译，与 values 一一对应
    pub patterns: Vec<Regex>,
}

impl TriggerSpec {
    pub fn new(kind: TriggerKind, values: Vec<String>) -> Self {
        Self {
            kind,
            values,
            params: Value::Null,
            patterns: Vec::new(),
        }
    }
}

/// 校验结果后的动作集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionBundle {
    /// 以不更新会话的方式执行的帮助节点
    #[serde(default)]
    pub help: Option<String>,
    /// 注册表中的方法名
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub goto: Option<String>,
}

impl ActionBundle {
    pub fn goto(path: impl Into<String>) -> Self {
        Self {
            goto: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.help.is_none() && self.methods.is_empty() && self.goto.is_none()
    }
}

/// 校验规格；节点的 goto 也按同一形状解析
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidateSpec {
    pub validator: Option<String>,
    pub params: Value,
    pub success: Option<ActionBundle>,
    pub failure: Option<ActionBundle>,
    /// 保持声明顺序
    pub switch: Vec<(String, ActionBundle)>,
}

impl ValidateSpec {
    /// 裸路径 goto 等价于 `{success: {goto: path}}`
    pub fn goto(path: impl Into<String>) -> Self {
        Self {
            success: Some(ActionBundle::goto(path)),
            ..Self::default()
        }
    }
}

/// storePre 的记录时机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStage {
    /// 进入节点后、副作用之前
    #[default]
    Before,
    /// 消息投递之后
    After,
}

/// 答案存储规格
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSpec {
    #[serde(default, deserialize_with = "scalar_key")]
    pub thread: Option<String>,
    /// 字符串或数字；数字按十进制写法作为键
    #[serde(default, deserialize_with = "scalar_key")]
    pub key: Option<String>,
    #[serde(default, alias = "clear")]
    pub clean: bool,
    /// 固定值；缺省时记录用户回复文本
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub stage: StoreStage,
}

/// 标量转为键；null 与空串视为未设置
fn scalar_key<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s).filter(|s| !s.is_empty())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(serde::de::Error::custom(format!("expected a string or number, got {other}"))),
    }
}

/// 节点副作用
#[derive(Debug, Clone, PartialEq)]
pub enum ActionSpec {
    /// 向若干适配器上的若干对端发送节点消息
    Send {
        /// 适配器名 -> 对端 ID 列表；`__self__` 表示当前发送者
        targets: Vec<(String, Vec<String>)>,
        /// 覆盖节点 message 的文本
        message: Option<String>,
        /// 附加该线程已记录的答案
        from_thread: Option<String>,
        keyboard: Option<KeyboardSpec>,
    },
    /// 调用注册表中的方法
    Method { name: String, params: Value },
}

/// 脚本中声明的键盘
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardSpec {
    #[serde(default)]
    pub buttons: Vec<Vec<String>>,
    #[serde(default)]
    pub options: Vec<String>,
}

impl KeyboardSpec {
    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }
}

/// 对话树中的一个节点
#[derive(Debug, Clone)]
pub struct Node {
    /// 点分唯一地址
    pub path: String,
    pub name: String,
    /// 所在容器路径；根节点为空串
    pub parent_path: String,
    /// 自身子节点容器路径
    pub children_path: String,
    pub has_children: bool,
    /// 列表之间为 AND；空表示总是匹配
    pub trigger: Vec<TriggerSpec>,
    pub is_command: bool,
    pub message: Option<String>,
    pub attachments: HashMap<String, Vec<Value>>,
    pub keyboard: Option<KeyboardSpec>,
    pub action: Option<ActionSpec>,
    pub validate: Option<ValidateSpec>,
    pub goto: Option<ValidateSpec>,
    pub store: Option<StoreSpec>,
    pub store_pre: Option<StoreSpec>,
    /// 回调事件时编辑机器人原消息，而不是发新消息（向下继承）
    pub replace: bool,
    /// 以回复形式发送
    pub reply: bool,
    /// 答案线程（向下继承）
    pub thread: String,
}

impl Node {
    /// 仅有路径的空节点，供测试与宿主手工构造
    pub fn bare(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = path.rsplit('.').next().unwrap_or_default().to_string();
        let parent_path = if path.contains('.') {
            container_of(&path)
        } else {
            String::new()
        };
        let thread = path.split('.').next().unwrap_or_default().to_string();
        Self {
            children_path: children_of(&path),
            name,
            parent_path,
            path,
            has_children: false,
            trigger: Vec::new(),
            is_command: false,
            message: None,
            attachments: HashMap::new(),
            keyboard: None,
            action: None,
            validate: None,
            goto: None,
            store: None,
            store_pre: None,
            replace: false,
            reply: false,
            thread,
        }
    }
}

/// 路径是否指向子节点容器（`c` 或以 `.c` 结尾）
pub fn is_children_path(path: &str) -> bool {
    path == CHILDREN || path.ends_with(".c")
}

/// 节点所在容器：根节点为 `c`，其余去掉最后一段
pub fn container_of(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    match path.rfind('.') {
        Some(idx) => path[..idx].to_string(),
        None => CHILDREN.to_string(),
    }
}

/// 容器的所属节点：`a.c` -> `a`，根容器 `c` -> 空串
pub fn owner_of(container: &str) -> String {
    match container.strip_suffix(".c") {
        Some(owner) => owner.to_string(),
        None => String::new(),
    }
}

/// 节点的子容器路径
pub fn children_of(path: &str) -> String {
    format!("{path}.{CHILDREN}")
}
