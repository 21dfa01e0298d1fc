use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::assertion::extractor::{JsonPath, display_value};
use crate::assertion::types::{AssertError, AssertionSpec, CompareOp};

/// 断言的原始形式：表达式字符串或表格行对象
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawAssertion {
    Expr(String),
    Row(Map<String, Value>),
    Other(Value),
}

impl From<RawAssertion> for AssertionSpec {
    fn from(raw: RawAssertion) -> Self {
        match raw {
            RawAssertion::Expr(expr) => parse_assertion(&expr).unwrap_or_else(|e| {
                AssertionSpec::Invalid {
                    raw: expr.trim().to_string(),
                    reason: e.to_string(),
                }
            }),
            RawAssertion::Row(row) => parse_assertion_row(&row),
            RawAssertion::Other(value) => AssertionSpec::Invalid {
                raw: value.to_string(),
                reason: "assertion must be a string expression or an object".to_string(),
            },
        }
    }
}

/// 解析断言表达式
///
/// 支持的格式：
/// - `status == 200`
/// - `body.user.id == 123`、`$.user.name == "test"`
/// - `body contains "total"`
/// - `response.time < 1000`
/// - `header.X-Token == "abc"`
pub fn parse_assertion(input: &str) -> Result<AssertionSpec, AssertError> {
    let input = input.trim();

    if let Some(rest) = input.strip_prefix("body contains") {
        let fragment = unquote(rest.trim());
        if fragment.is_empty() {
            return Err(AssertError::InvalidSyntax(
                "Right side of assertion is empty".to_string(),
            ));
        }
        return Ok(AssertionSpec::Contains(vec![fragment.to_string()]));
    }

    // 查找运算符
    let operators = [">=", "<=", "==", "!=", ">", "<"];
    let (op_pos, op_str) = operators
        .iter()
        .filter_map(|op| input.find(op).map(|pos| (pos, *op)))
        .min_by_key(|(pos, _)| *pos)
        .ok_or_else(|| {
            AssertError::InvalidSyntax(format!("No valid operator found in assertion: {}", input))
        })?;

    let op = CompareOp::parse(op_str)
        .ok_or_else(|| AssertError::InvalidOperator(format!("Invalid operator: {}", op_str)))?;

    // 分割左值和右值
    let left = input[..op_pos].trim();
    let right = input[op_pos + op_str.len()..].trim();

    if left.is_empty() {
        return Err(AssertError::InvalidSyntax(
            "Left side of assertion is empty".to_string(),
        ));
    }
    if right.is_empty() {
        return Err(AssertError::InvalidSyntax(
            "Right side of assertion is empty".to_string(),
        ));
    }

    match left {
        "status" => {
            require_equality(op, left)?;
            let code = right
                .parse::<u16>()
                .map_err(|_| AssertError::InvalidValue(format!("Invalid status code: {}", right)))?;
            Ok(AssertionSpec::StatusCode(code))
        }
        "response.time" => {
            let threshold_ms = right.parse::<u64>().map_err(|_| {
                AssertError::InvalidValue(format!("Invalid response time threshold: {}", right))
            })?;
            Ok(AssertionSpec::ResponseTime { op, threshold_ms })
        }
        name if name.starts_with("header.") || name.starts_with("headers.") => {
            require_equality(op, left)?;
            let header = name.split_once('.').map(|(_, h)| h.trim()).unwrap_or_default();
            if header.is_empty() {
                return Err(AssertError::InvalidSyntax(
                    "Header name is empty".to_string(),
                ));
            }
            Ok(AssertionSpec::header(header, unquote(right)))
        }
        path if path.starts_with('$') || path.starts_with("body") => {
            require_equality(op, left)?;
            JsonPath::parse(path)?;
            Ok(AssertionSpec::JsonPath {
                expr: path.to_string(),
                expected: parse_expected_value(right),
            })
        }
        other => Err(AssertError::InvalidSyntax(format!(
            "Invalid value path: {}. Must be 'status', 'response.time', 'header.<name>', 'body.<path>' or '$.<path>'",
            other
        ))),
    }
}

/// 解析表格行形式的断言
///
/// `type` 字段决定变体：
/// - `status_code`：`value`
/// - `json_path`：`expr`、`value`
/// - `text_contains`：`value`（字符串或字符串数组）
/// - `response_time`：`value`，可选 `op`（默认 `<=`）
/// - `json_schema`：`schema`
/// - `headers`：`value` 为 `{名称: 值}`；或 `name` + `value` 单个响应头
pub fn parse_assertion_row(row: &Map<String, Value>) -> AssertionSpec {
    let raw = Value::Object(row.clone()).to_string();
    let Some(kind) = row.get("type").and_then(Value::as_str) else {
        return AssertionSpec::Invalid {
            raw,
            reason: "missing 'type' field".to_string(),
        };
    };

    let invalid = |reason: &str| AssertionSpec::Invalid {
        raw: raw.clone(),
        reason: reason.to_string(),
    };

    match kind.trim().to_lowercase().as_str() {
        "status_code" | "status" => match row.get("value").and_then(as_u64) {
            Some(code) if (100..600).contains(&code) => AssertionSpec::StatusCode(code as u16),
            _ => invalid("status_code requires an integer 'value' between 100 and 599"),
        },
        "json_path" | "jsonpath" => {
            let Some(expr) = row
                .get("expr")
                .or_else(|| row.get("path"))
                .and_then(Value::as_str)
            else {
                return invalid("json_path requires an 'expr' field");
            };
            if let Err(e) = JsonPath::parse(expr) {
                return invalid(&e.to_string());
            }
            match row.get("value") {
                Some(expected) => AssertionSpec::JsonPath {
                    expr: expr.to_string(),
                    expected: expected.clone(),
                },
                None => invalid("json_path requires an expected 'value'"),
            }
        }
        "text_contains" | "contains" => match row.get("value") {
            Some(Value::String(s)) => AssertionSpec::Contains(vec![s.clone()]),
            Some(Value::Array(items)) if !items.is_empty() => {
                let fragments: Option<Vec<String>> = items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect();
                match fragments {
                    Some(fragments) => AssertionSpec::Contains(fragments),
                    None => invalid("text_contains values must be strings"),
                }
            }
            _ => invalid("text_contains requires a string or a list of strings"),
        },
        "response_time" => {
            let op = match row.get("op").and_then(Value::as_str) {
                Some(op) => match CompareOp::parse(op) {
                    Some(op) => op,
                    None => return invalid(&format!("unsupported operator '{}'", op)),
                },
                None => CompareOp::LessOrEqual,
            };
            match row.get("value").and_then(as_u64) {
                Some(threshold_ms) => AssertionSpec::ResponseTime { op, threshold_ms },
                None => invalid("response_time requires a non-negative integer 'value' (ms)"),
            }
        }
        "json_schema" | "schema" => match row.get("schema").or_else(|| row.get("value")) {
            Some(schema @ (Value::Object(_) | Value::Bool(_))) => {
                AssertionSpec::Schema(schema.clone())
            }
            _ => invalid("json_schema requires a 'schema' object"),
        },
        "headers" | "header" => {
            let expected: BTreeMap<String, String> = match (row.get("name"), row.get("value")) {
                (Some(Value::String(name)), Some(value)) => {
                    BTreeMap::from([(name.trim().to_string(), display_value(value))])
                }
                (None, Some(Value::Object(map))) => map
                    .iter()
                    .map(|(name, value)| (name.trim().to_string(), display_value(value)))
                    .collect(),
                _ => return invalid("headers requires a 'value' object or 'name' and 'value'"),
            };
            if expected.is_empty() || expected.keys().any(String::is_empty) {
                return invalid("headers requires at least one non-empty header name");
            }
            AssertionSpec::Headers(expected)
        }
        _ => AssertionSpec::Unknown {
            kind: kind.to_string(),
        },
    }
}

fn require_equality(op: CompareOp, left: &str) -> Result<(), AssertError> {
    if op == CompareOp::Equal {
        Ok(())
    } else {
        Err(AssertError::InvalidOperator(format!(
            "Operator {} not supported for {}",
            op, left
        )))
    }
}

/// 数字也接受字符串形式（表格单元格常见）
fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn unquote(input: &str) -> &str {
    let quoted = (input.starts_with('"') && input.ends_with('"'))
        || (input.starts_with('\'') && input.ends_with('\''));
    if quoted && input.len() >= 2 {
        &input[1..input.len() - 1]
    } else {
        input
    }
}

/// 解析期望值：优先按 JSON 解析，单引号字符串去引号，否则按原文字符串
fn parse_expected_value(input: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(input) {
        return value;
    }
    Value::String(unquote(input).to_string())
}
