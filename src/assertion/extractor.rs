use std::fmt;

use serde_json::Value;

use crate::assertion::types::AssertError;

/// 路径片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    /// 数组下标，负数从末尾计数
    Index(i64),
}

/// 响应体上的路径表达式
///
/// 支持的格式：
/// - `$`（根）
/// - `$.data.id`、`data.id`、`body.data.id`
/// - `$.items[0].name`、`items[-1]`、`items.0.name`
/// - `$['odd key']`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl JsonPath {
    pub fn parse(expr: &str) -> Result<Self, AssertError> {
        let raw = expr.trim();
        if raw.is_empty() {
            return Err(AssertError::InvalidSyntax("Path cannot be empty".to_string()));
        }

        let mut rest = strip_root(raw);
        let mut segments = Vec::new();
        let mut first = true;

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('[') {
                let end = after.find(']').ok_or_else(|| {
                    AssertError::InvalidSyntax(format!("Unclosed '[' in path: {}", raw))
                })?;
                segments.push(parse_bracket(after[..end].trim(), raw)?);
                rest = &after[end + 1..];
            } else {
                let body = match rest.strip_prefix('.') {
                    Some(after) => after,
                    None if first => rest,
                    None => {
                        return Err(AssertError::InvalidSyntax(format!(
                            "Unexpected '{}' in path: {}",
                            rest, raw
                        )));
                    }
                };
                let end = body.find(['.', '[']).unwrap_or(body.len());
                let key = &body[..end];
                if key.is_empty() {
                    return Err(AssertError::InvalidSyntax(format!(
                        "Empty path segment in: {}",
                        raw
                    )));
                }
                segments.push(PathSegment::Key(key.to_string()));
                rest = &body[end..];
            }
            first = false;
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// 在 JSON 值上求值，路径不存在返回 None
    pub fn query<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match (segment, current) {
                (PathSegment::Key(key), Value::Object(map)) => map.get(key)?,
                (PathSegment::Key(key), Value::Array(items)) => {
                    items.get(key.parse::<usize>().ok()?)?
                }
                (PathSegment::Index(index), Value::Array(items)) => {
                    let position = if *index < 0 {
                        items.len().checked_sub(index.unsigned_abs() as usize)?
                    } else {
                        *index as usize
                    };
                    items.get(position)?
                }
                _ => return None,
            };
        }
        Some(current)
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn strip_root(raw: &str) -> &str {
    if let Some(rest) = raw.strip_prefix('$') {
        return rest;
    }
    if let Some(rest) = raw.strip_prefix("body")
        && (rest.is_empty() || rest.starts_with('.') || rest.starts_with('['))
    {
        return rest;
    }
    raw
}

fn parse_bracket(inner: &str, raw: &str) -> Result<PathSegment, AssertError> {
    if let Ok(index) = inner.parse::<i64>() {
        return Ok(PathSegment::Index(index));
    }
    let quoted = (inner.starts_with('\'') && inner.ends_with('\''))
        || (inner.starts_with('"') && inner.ends_with('"'));
    if quoted && inner.len() >= 2 {
        return Ok(PathSegment::Key(inner[1..inner.len() - 1].to_string()));
    }
    Err(AssertError::InvalidSyntax(format!(
        "Unsupported bracket selector '[{}]' in path: {}",
        inner, raw
    )))
}

/// 解析并求值，路径不存在时返回 PathNotFound
pub fn query_json<'a>(root: &'a Value, expr: &str) -> Result<&'a Value, AssertError> {
    let path = JsonPath::parse(expr)?;
    path.query(root)
        .ok_or_else(|| AssertError::PathNotFound(format!("Path '{}' not found", path)))
}

/// 用于报告的值字符串：字符串不加引号，其余为 JSON
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
