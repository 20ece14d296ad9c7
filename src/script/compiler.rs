//! 脚本编译器
//!
//! 把嵌套的原始对话定义（JSON 值）展开为可按路径寻址的节点表：
//! 1. 递归遍历，计算每个节点的 path / parent_path / children_path
//! 2. 按首次声明顺序登记命令节点
//! 3. 向所有后代传递继承字段（答案线程、replace）
//! 4. 在 trigger / validate / goto 中替换路径宏（可嵌套在数组、对象里）
//!
//! 单个节点形状错误只会丢弃该节点子树，错误记录在 diagnostics 中。

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::node::{children_of, container_of, is_children_path, owner_of, Node, CHILDREN};
use super::parse::{
    parse_action, parse_attachments, parse_keyboard, parse_store, parse_triggers, parse_validate,
};
use crate::error::CompileError;

/// 路径查找结果：单个节点，或一个子节点容器（兄弟组）
#[derive(Debug, Clone)]
pub enum Entry {
    Node(Arc<Node>),
    /// 按声明顺序排列的组成员
    Group(Vec<Arc<Node>>),
}

/// 编译后的只读脚本
#[derive(Debug, Default)]
pub struct CompiledScript {
    nodes: HashMap<String, Arc<Node>>,
    groups: HashMap<String, Vec<String>>,
    commands: Vec<String>,
    diagnostics: Vec<CompileError>,
}

impl CompiledScript {
    /// 按路径查找；任何一段缺失都返回 None
    pub fn extract(&self, path: &str) -> Option<Entry> {
        if let Some(node) = self.nodes.get(path) {
            return Some(Entry::Node(Arc::clone(node)));
        }
        if is_children_path(path) {
            return self.group(path).map(Entry::Group);
        }
        None
    }

    pub fn node(&self, path: &str) -> Option<Arc<Node>> {
        self.nodes.get(path).cloned()
    }

    pub fn group(&self, path: &str) -> Option<Vec<Arc<Node>>> {
        self.groups
            .get(path)
            .map(|paths| paths.iter().filter_map(|p| self.node(p)).collect())
    }

    /// 命令节点（首次声明顺序）
    pub fn commands(&self) -> impl Iterator<Item = Arc<Node>> + '_ {
        self.commands.iter().filter_map(|p| self.node(p))
    }

    pub fn diagnostics(&self) -> &[CompileError] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }
}

/// 路径宏替换表
#[derive(Debug, Clone)]
pub struct MacroTable {
    entries: Vec<(&'static str, String)>,
}

impl MacroTable {
    /// 以节点路径为基准计算各级祖先
    pub fn for_path(path: &str) -> Self {
        let parent = container_of(path);
        let grandpa = owner_of(&parent);
        let grandpa2 = container_of(&grandpa);
        let grandpa3 = owner_of(&grandpa2);
        let children = children_of(path);
        Self {
            entries: vec![
                ("((self))", path.to_string()),
                ("((path))", path.to_string()),
                ("((p))", parent.clone()),
                ("((parent))", parent),
                ("((grandpa))", grandpa),
                ("((grandpa2))", grandpa2),
                ("((grandpa3))", grandpa3),
                ("((c))", children.clone()),
                ("((children))", children),
            ],
        }
    }

    /// 递归替换所有字符串值中的宏
    pub fn expand(&self, value: &mut Value) {
        match value {
            Value::String(s) if s.contains("((") => {
                for (placeholder, replacement) in &self.entries {
                    if s.contains(placeholder) {
                        *s = s.replace(placeholder, replacement);
                    }
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|item| self.expand(item)),
            Value::Object(map) => map.values_mut().for_each(|item| self.expand(item)),
            _ => {}
        }
    }

    fn expanded(&self, value: &Value) -> Value {
        let mut value = value.clone();
        self.expand(&mut value);
        value
    }
}

/// 向后代传递的字段
#[derive(Debug, Clone, Default)]
struct Inherited {
    thread: Option<String>,
    replace: bool,
}

#[derive(Default)]
struct Compiler {
    script: CompiledScript,
}

/// 编译原始脚本。根不是对象时整体失败；节点级错误见 `diagnostics()`。
pub fn compile(raw: &Value) -> Result<CompiledScript, CompileError> {
    let Value::Object(root) = raw else {
        return Err(CompileError::RootNotObject);
    };
    // 旧布局：整个脚本包在根容器 `c` 里
    let root = match root.get(CHILDREN) {
        Some(Value::Object(inner)) if root.len() == 1 => inner,
        _ => root,
    };

    let mut compiler = Compiler::default();
    compiler.script.groups.insert(CHILDREN.to_string(), Vec::new());
    compiler.walk_group(CHILDREN, root, &Inherited::default());

    let script = compiler.script;
    tracing::info!(
        nodes = script.len(),
        commands = script.commands.len(),
        errors = script.diagnostics.len(),
        "Script compiled"
    );
    Ok(script)
}

impl Compiler {
    fn walk_group(&mut self, container: &str, entries: &Map<String, Value>, inherited: &Inherited) {
        for (name, raw) in entries {
            if name == CHILDREN {
                if let Value::Object(nested) = raw {
                    self.walk_group(container, nested, inherited);
                }
                continue;
            }

            let path = if container == CHILDREN {
                name.clone()
            } else {
                format!("{container}.{name}")
            };
            let node = match self.compile_node(&path, container, name, raw, inherited) {
                Ok(node) => node,
                Err(e) => {
                    tracing::error!("Skipping script subtree {}: {}", path, e);
                    self.script.diagnostics.push(e);
                    continue;
                }
            };

            if node.is_command {
                self.script.commands.push(path.clone());
            }
            self.script
                .groups
                .entry(container.to_string())
                .or_default()
                .push(path.clone());

            let child_inherited = Inherited {
                thread: Some(node.thread.clone()),
                replace: node.replace,
            };
            let children_path = node.children_path.clone();
            let has_children = node.has_children;
            self.script.nodes.insert(path, Arc::new(node));

            if has_children {
                if let Some(Value::Object(children)) = raw.get(CHILDREN) {
                    self.walk_group(&children_path, children, &child_inherited);
                }
            }
        }
    }

    fn compile_node(
        &self,
        path: &str,
        container: &str,
        name: &str,
        raw: &Value,
        inherited: &Inherited,
    ) -> Result<Node, CompileError> {
        if name.is_empty() || name.contains('.') {
            return Err(CompileError::InvalidField {
                path: path.to_string(),
                field: "name",
                reason: "node names must be non-empty and must not contain '.'".to_string(),
            });
        }
        let Value::Object(map) = raw else {
            return Err(CompileError::NodeNotObject {
                path: path.to_string(),
            });
        };

        let macros = MacroTable::for_path(path);
        let field = |key: &str| map.get(key).filter(|v| !v.is_null());

        let trigger = match field("trigger") {
            Some(v) => parse_triggers(path, &macros.expanded(v))?,
            None => Vec::new(),
        };
        let validate = field("validate")
            .map(|v| parse_validate(path, "validate", &macros.expanded(v)))
            .transpose()?;
        let goto = field("goto")
            .map(|v| parse_validate(path, "goto", &macros.expanded(v)))
            .transpose()?;

        let store = field("store")
            .map(|v| parse_store(path, "store", v))
            .transpose()?
            .flatten();
        let store_pre = field("storePre")
            .or_else(|| field("store_pre"))
            .map(|v| parse_store(path, "storePre", v))
            .transpose()?
            .flatten();

        let action = field("action").map(|v| parse_action(path, v)).transpose()?.flatten();
        let keyboard = field("keyboard").map(|v| parse_keyboard(path, v)).transpose()?;
        let attachments = field("attachments")
            .map(|v| parse_attachments(path, v))
            .transpose()?
            .unwrap_or_default();

        let message = match field("message") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Object(m)) => m.get("text").and_then(Value::as_str).map(str::to_string),
            _ => None,
        };
        let is_command = match field("command") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.is_empty(),
            _ => false,
        };
        let thread = field("thread")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| inherited.thread.clone())
            .unwrap_or_else(|| name.to_string());
        let replace = field("replace").and_then(Value::as_bool).unwrap_or(inherited.replace);
        let has_children = field(CHILDREN)
            .and_then(Value::as_object)
            .is_some_and(|c| !c.is_empty());

        Ok(Node {
            path: path.to_string(),
            name: name.to_string(),
            parent_path: if container == CHILDREN {
                String::new()
            } else {
                container.to_string()
            },
            children_path: children_of(path),
            has_children,
            trigger,
            is_command,
            message,
            attachments,
            keyboard,
            action,
            validate,
            goto,
            store,
            store_pre,
            replace,
            reply: field("reply").and_then(Value::as_bool).unwrap_or(false),
            thread,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::node::ActionBundle;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "start": {
                "trigger": "/start",
                "command": true,
                "message": "welcome",
                "goto": "menu"
            },
            "menu": {
                "message": "choose",
                "goto": "((c))",
                "c": {
                    "settings": {
                        "trigger": "settings",
                        "message": "settings",
                        "validate": {"validator": "text", "success": "((p))", "failure": "((grandpa))"},
                        "c": {
                            "language": {
                                "trigger": "language",
                                "command": true,
                                "goto": {"success": {"goto": "((grandpa2))"}, "switch": {"back": "((grandpa3))"}}
                            }
                        }
                    },
                    "about": {"trigger": "about", "message": "about", "thread": "info"}
                }
            }
        })
    }

    #[test]
    fn test_paths_unique_and_derived_from_parent() {
        let script = compile(&sample()).unwrap();
        assert_eq!(script.len(), 5);
        for path in script.paths() {
            let node = script.node(path).unwrap();
            if node.parent_path.is_empty() {
                assert_eq!(node.path, node.name);
            } else {
                assert_eq!(node.path, format!("{}.{}", node.parent_path, node.name));
                assert!(node.path.starts_with(&node.parent_path));
                assert_ne!(node.path, node.parent_path);
            }
        }
        assert!(script.node("menu.c.settings.c.language").is_some());
    }

    #[test]
    fn test_macros_expanded_in_goto_and_validate() {
        let script = compile(&sample()).unwrap();
        let menu = script.node("menu").unwrap();
        assert_eq!(menu.goto.as_ref().unwrap().success, Some(ActionBundle::goto("menu.c")));

        let settings = script.node("menu.c.settings").unwrap();
        let validate = settings.validate.as_ref().unwrap();
        assert_eq!(validate.success, Some(ActionBundle::goto("menu.c")));
        assert_eq!(validate.failure, Some(ActionBundle::goto("menu")));

        let language = script.node("menu.c.settings.c.language").unwrap();
        let goto = language.goto.as_ref().unwrap();
        // grandpa2 of a.c.b.c.d is a.c, the container that holds b
        assert_eq!(goto.success, Some(ActionBundle::goto("menu.c")));
        assert_eq!(goto.switch[0].1, ActionBundle::goto("menu"));
    }

    #[test]
    fn test_macro_expansion_is_idempotent() {
        let table = MacroTable::for_path("menu.c.settings");
        let mut value = json!({"goto": ["((p))", {"x": "((self)).c"}]});
        table.expand(&mut value);
        let once = value.clone();
        table.expand(&mut value);
        assert_eq!(once, value);
        assert_eq!(value, json!({"goto": ["menu.c", {"x": "menu.c.settings.c"}]}));
    }

    #[test]
    fn test_command_index_keeps_declaration_order() {
        let script = compile(&sample()).unwrap();
        let commands: Vec<String> = script.commands().map(|n| n.path.clone()).collect();
        assert_eq!(commands, vec!["start", "menu.c.settings.c.language"]);
    }

    #[test]
    fn test_extract_degrades_gracefully() {
        let script = compile(&sample()).unwrap();
        assert!(script.extract("menu.c.nope").is_none());
        assert!(script.extract("nope.c.deeper.c.still").is_none());
        assert!(script.extract("").is_none());
        match script.extract("menu.c") {
            Some(Entry::Group(members)) => {
                let names: Vec<_> = members.iter().map(|n| n.name.as_str()).collect();
                assert_eq!(names, vec!["settings", "about"]);
            }
            other => panic!("Expected group, got {other:?}"),
        }
        assert!(matches!(script.extract("c"), Some(Entry::Group(_))));
    }

    #[test]
    fn test_inherited_thread() {
        let script = compile(&sample()).unwrap();
        assert_eq!(script.node("menu.c.settings.c.language").unwrap().thread, "menu");
        assert_eq!(script.node("menu.c.about").unwrap().thread, "info");
        assert_eq!(script.node("start").unwrap().thread, "start");
    }

    #[test]
    fn test_malformed_node_drops_only_its_subtree() {
        let raw = json!({
            "good": {"message": "ok"},
            "bad": {"trigger": {"type": "regexp", "value": "("}, "c": {"child": {"message": "x"}}},
            "scalar": 5
        });
        let script = compile(&raw).unwrap();
        assert!(script.node("good").is_some());
        assert!(script.node("bad").is_none());
        assert!(script.node("bad.c.child").is_none());
        assert_eq!(script.diagnostics().len(), 2);
    }

    #[test]
    fn test_numeric_store_key_keeps_subtree() {
        let raw = json!({
            "order": {"message": "q", "store": {"key": 1}, "c": {"child": {"message": "x"}}}
        });
        let script = compile(&raw).unwrap();
        assert!(script.diagnostics().is_empty());
        let order = script.node("order").unwrap();
        assert_eq!(order.store.as_ref().unwrap().key.as_deref(), Some("1"));
        assert!(script.node("order.c.child").is_some());
    }

    #[test]
    fn test_legacy_root_container_unwrapped() {
        let script = compile(&json!({"c": {"hello": {"message": "hi"}}})).unwrap();
        assert!(script.node("hello").is_some());
        assert!(compile(&json!("nope")).is_err());
    }
}
