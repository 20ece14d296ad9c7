//! 原始脚本字段 -> 类型化规格
//!
//! 脚本字段允许多种写法（字符串 / 数组 / 对象），这里统一归一化，
//! 形状不合法时返回 CompileError，由编译器丢弃该节点子树。

use std::collections::HashMap;

use regex::RegexBuilder;
use serde_json::{Map, Value};

use super::node::{
    ActionBundle, ActionSpec, KeyboardSpec, StoreSpec, TriggerKind, TriggerSpec, ValidateSpec,
};
use crate::error::CompileError;

fn invalid(path: &str, field: &'static str, reason: impl Into<String>) -> CompileError {
    CompileError::InvalidField {
        path: path.to_string(),
        field,
        reason: reason.into(),
    }
}

/// 标量或标量数组 -> 字符串列表
fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Null => Some(Vec::new()),
        Value::String(s) => Some(vec![s.clone()]),
        Value::Number(n) => Some(vec![n.to_string()]),
        Value::Bool(b) => Some(vec![b.to_string()]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect(),
        Value::Object(_) => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// trigger 字段：字符串、字符串数组（OR）、对象，或对象数组（AND）
pub fn parse_triggers(path: &str, raw: &Value) -> Result<Vec<TriggerSpec>, CompileError> {
    match raw {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) if items.is_empty() => Ok(Vec::new()),
        Value::Array(items) if items.iter().all(Value::is_string) => {
            parse_trigger(path, raw).map(|spec| vec![spec])
        }
        Value::Array(items) => items.iter().map(|item| parse_trigger(path, item)).collect(),
        _ => parse_trigger(path, raw).map(|spec| vec![spec]),
    }
}

fn parse_trigger(path: &str, raw: &Value) -> Result<TriggerSpec, CompileError> {
    let Value::Object(map) = raw else {
        let values = string_list(raw)
            .ok_or_else(|| invalid(path, "trigger", format!("unsupported value {raw}")))?;
        return Ok(TriggerSpec::new(TriggerKind::Text, values));
    };

    let kind_name = map
        .get("kind")
        .or_else(|| map.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("text");
    let kind = TriggerKind::parse(kind_name)
        .ok_or_else(|| invalid(path, "trigger", format!("unknown trigger type '{kind_name}'")))?;
    let raw_values = map.get("values").or_else(|| map.get("value")).unwrap_or(&Value::Null);
    let values = string_list(raw_values)
        .ok_or_else(|| invalid(path, "trigger", format!("unsupported values {raw_values}")))?;

    let mut spec = TriggerSpec::new(kind, values);
    spec.params = map.get("params").cloned().unwrap_or(Value::Null);
    if kind == TriggerKind::Regexp {
        spec.patterns = spec
            .values
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .multi_line(true)
                    .build()
                    .map_err(|e| CompileError::InvalidRegex {
                        path: path.to_string(),
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<_, _>>()?;
    }
    Ok(spec)
}

/// 分支：裸字符串即 `{goto: value}`
pub fn parse_bundle(path: &str, raw: &Value) -> Result<ActionBundle, CompileError> {
    match raw {
        Value::Null => Ok(ActionBundle::default()),
        Value::String(s) if s.is_empty() => Ok(ActionBundle::default()),
        Value::String(s) => Ok(ActionBundle::goto(s.clone())),
        Value::Object(map) => {
            let methods = map
                .get("methods")
                .map(|m| string_list(m).ok_or_else(|| invalid(path, "methods", format!("unsupported value {m}"))))
                .transpose()?
                .unwrap_or_default();
            Ok(ActionBundle {
                help: non_empty_str(map.get("help")),
                methods,
                goto: non_empty_str(map.get("goto")),
            })
        }
        other => Err(invalid(path, "branch", format!("unsupported value {other}"))),
    }
}

/// validate / goto 字段
pub fn parse_validate(path: &str, field: &'static str, raw: &Value) -> Result<ValidateSpec, CompileError> {
    let map = match raw {
        Value::String(s) => return Ok(ValidateSpec::goto(s.clone())),
        Value::Object(map) => map,
        other => return Err(invalid(path, field, format!("unsupported value {other}"))),
    };

    let params = map
        .get("params")
        .or_else(|| map.get("validator-params"))
        .cloned()
        .unwrap_or(Value::Null);
    let branch = |key: &str| -> Result<Option<ActionBundle>, CompileError> {
        match map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => parse_bundle(path, v).map(Some),
        }
    };

    let mut switch = Vec::new();
    match map.get("switch") {
        None | Some(Value::Null) => {}
        Some(Value::Object(cases)) => {
            for (key, value) in cases {
                switch.push((key.clone(), parse_bundle(path, value)?));
            }
        }
        Some(other) => return Err(invalid(path, field, format!("switch must be an object, got {other}"))),
    }

    Ok(ValidateSpec {
        validator: non_empty_str(map.get("validator")),
        params,
        success: branch("success")?,
        failure: branch("failure")?,
        switch,
    })
}

/// store / storePre：true 表示全部默认值
pub fn parse_store(path: &str, field: &'static str, raw: &Value) -> Result<Option<StoreSpec>, CompileError> {
    match raw {
        Value::Null | Value::Bool(false) => Ok(None),
        Value::Bool(true) => Ok(Some(StoreSpec::default())),
        Value::Object(_) => serde_json::from_value(raw.clone())
            .map(Some)
            .map_err(|e| invalid(path, field, e.to_string())),
        other => Err(invalid(path, field, format!("unsupported value {other}"))),
    }
}

/// action：字符串为方法名；对象为 `{type: send|method, name, params}`
pub fn parse_action(path: &str, raw: &Value) -> Result<Option<ActionSpec>, CompileError> {
    let map = match raw {
        Value::Null => return Ok(None),
        Value::String(s) if s.is_empty() => return Ok(None),
        Value::String(s) => {
            return Ok(Some(ActionSpec::Method {
                name: s.clone(),
                params: Value::Null,
            }))
        }
        Value::Object(map) => map,
        other => return Err(invalid(path, "action", format!("unsupported value {other}"))),
    };

    let params = map
        .get("params")
        .or_else(|| map.get("options"))
        .cloned()
        .unwrap_or(Value::Null);
    match map.get("type").and_then(Value::as_str).unwrap_or("method") {
        "send" => {
            let targets = match params.get("target") {
                Some(Value::Object(targets)) => parse_targets(path, targets)?,
                Some(other) => return Err(invalid(path, "action", format!("target must be an object, got {other}"))),
                None => Vec::new(),
            };
            let keyboard = params.get("keyboard").map(|kb| parse_keyboard(path, kb)).transpose()?;
            Ok(Some(ActionSpec::Send {
                targets,
                message: non_empty_str(params.get("message")),
                from_thread: non_empty_str(params.get("from_thread").or_else(|| params.get("from_scope"))),
                keyboard,
            }))
        }
        "method" => {
            let name = non_empty_str(map.get("name").or_else(|| map.get("value")))
                .ok_or_else(|| invalid(path, "action", "method action without name"))?;
            Ok(Some(ActionSpec::Method { name, params }))
        }
        other => Err(invalid(path, "action", format!("unknown action type '{other}'"))),
    }
}

fn parse_targets(path: &str, targets: &Map<String, Value>) -> Result<Vec<(String, Vec<String>)>, CompileError> {
    targets
        .iter()
        .map(|(bridge, peers)| {
            string_list(peers)
                .map(|peers| (bridge.clone(), peers))
                .ok_or_else(|| invalid(path, "action", format!("unsupported peers {peers}")))
        })
        .collect()
}

/// keyboard：按钮行数组，或 `{buttons, options}`
pub fn parse_keyboard(path: &str, raw: &Value) -> Result<KeyboardSpec, CompileError> {
    let (rows, options) = match raw {
        Value::Array(_) => (raw, &Value::Null),
        Value::Object(map) => (
            map.get("buttons").unwrap_or(&Value::Null),
            map.get("options").unwrap_or(&Value::Null),
        ),
        other => return Err(invalid(path, "keyboard", format!("unsupported value {other}"))),
    };

    let buttons = match rows {
        Value::Null => Vec::new(),
        Value::Array(rows) => rows
            .iter()
            .map(|row| string_list(row).ok_or_else(|| invalid(path, "keyboard", format!("unsupported row {row}"))))
            .collect::<Result<_, _>>()?,
        other => return Err(invalid(path, "keyboard", format!("buttons must be an array, got {other}"))),
    };
    let options = string_list(options)
        .ok_or_else(|| invalid(path, "keyboard", format!("unsupported options {options}")))?;
    Ok(KeyboardSpec { buttons, options })
}

/// attachments：类型 -> 单个或多个附件描述
pub fn parse_attachments(path: &str, raw: &Value) -> Result<HashMap<String, Vec<Value>>, CompileError> {
    match raw {
        Value::Null => Ok(HashMap::new()),
        Value::Object(map) => Ok(map
            .iter()
            .map(|(kind, items)| {
                let items = match items {
                    Value::Array(items) => items.clone(),
                    single => vec![single.clone()],
                };
                (kind.clone(), items)
            })
            .collect()),
        other => Err(invalid(path, "attachments", format!("unsupported value {other}"))),
    }
}
