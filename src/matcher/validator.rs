//! 回复校验
//!
//! 内置校验器：text / email / number / photo / values / date / datetime；
//! 其它名字在注册表中查找。结果是一个 JSON 值：按真假决定成败，
//! 字符串化后作为 switch 分支键。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::context::Context;
use crate::hooks::Registry;
use crate::message::AttachmentKind;
use crate::script::ValidateSpec;

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
static DATE_RE: OnceLock<[Regex; 2]> = OnceLock::new();
static DATETIME_RE: OnceLock<[Regex; 2]> = OnceLock::new();

fn is_email(text: &str) -> bool {
    EMAIL_RE
        .get_or_init(|| Regex::new(r"(?i)^[\w\-.]+@[\w-]+\.[a-z]{2,4}$").unwrap())
        .is_match(text)
}

/// YYYY-MM-DD 或 DD.MM.YYYY
fn is_date(text: &str) -> bool {
    DATE_RE
        .get_or_init(|| {
            [
                Regex::new(r"^[0-9]{4}-[0-9]{2}[-./][0-9]{2}$").unwrap(),
                Regex::new(r"^[0-9]{2}[-./][0-9]{2}[-./][0-9]{4}$").unwrap(),
            ]
        })
        .iter()
        .any(|re| re.is_match(text))
}

/// 日期后跟 HH:MM[:SS]
fn is_datetime(text: &str) -> bool {
    DATETIME_RE
        .get_or_init(|| {
            [
                Regex::new(r"^[0-9]{4}-[0-9]{2}[-./][0-9]{2}\s[0-9]{2}:[0-9]{2}(:[0-9]{2})?$").unwrap(),
                Regex::new(r"^[0-9]{2}[-./][0-9]{2}[-./][0-9]{4}\s[0-9]{2}:[0-9]{2}(:[0-9]{2})?$").unwrap(),
            ]
        })
        .iter()
        .any(|re| re.is_match(text))
}

/// 校验结果
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome(pub Value);

impl ValidationOutcome {
    pub fn from_bool(ok: bool) -> Self {
        Self(Value::Bool(ok))
    }

    pub fn is_success(&self) -> bool {
        truthy(&self.0)
    }

    /// switch 分支键
    pub fn switch_key(&self) -> String {
        match &self.0 {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// null、false、0、空串、空数组、空对象为假
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

pub async fn validate(ctx: &Context, registry: &Registry, spec: &ValidateSpec) -> ValidationOutcome {
    let text = ctx.message().text.as_str();
    let Some(name) = spec.validator.as_deref() else {
        return ValidationOutcome::from_bool(true);
    };
    let ok = match name {
        "none" => true,
        "text" => !text.is_empty(),
        "email" => is_email(text),
        "number" => check_number(text, &spec.params),
        "photo" => !ctx.message().attachments_of(AttachmentKind::Photo).is_empty(),
        "values" => allowed_values(&spec.params)
            .iter()
            .any(|v| ctx.lexicon(v, &Value::Null) == text),
        "date" => is_date(text),
        "datetime" => is_datetime(text),
        custom => {
            let Some(validator) = registry.validator(custom) else {
                tracing::warn!("Unknown validator {}, treating as success", custom);
                return ValidationOutcome::from_bool(true);
            };
            return match validator.validate(ctx, spec).await {
                Ok(value) => ValidationOutcome(value),
                Err(e) => {
                    tracing::error!("Validator {} failed: {}", custom, e);
                    ValidationOutcome::from_bool(false)
                }
            };
        }
    };
    ValidationOutcome::from_bool(ok)
}

/// 规范整数写法，含可选的闭区间 min / max（数字或数字字符串）
fn check_number(text: &str, params: &Value) -> bool {
    let Ok(number) = text.parse::<i64>() else {
        return false;
    };
    if number.to_string() != text {
        return false;
    }
    let (Some(min), Some(max)) = (number_bound(params, "min"), number_bound(params, "max")) else {
        return false;
    };
    let value = number as f64;
    min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
}

/// 外层 None 表示边界写法无效
fn number_bound(params: &Value, key: &str) -> Option<Option<f64>> {
    let parsed = match params.get(key) {
        None | Some(Value::Null) => return Some(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    if parsed.is_none() {
        tracing::warn!("Invalid number bound {}: {}", key, params[key]);
    }
    parsed.map(Some)
}

fn allowed_values(params: &Value) -> Vec<String> {
    match params {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::Object(map) => allowed_values(map.get("values").unwrap_or(&Value::Null)),
        _ => Vec::new(),
    }
}
