use std::collections::BTreeMap;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::assertion::AssertionSpec;
use crate::http::Method;

/// 测试用例记录
///
/// 一条记录描述一次 HTTP 调用、对响应的断言、需要提取的变量，
/// 以及至多一个前置用例。加载后在一次运行内不可变。
///
/// 字段同时接受表格导出常用的列名（`test_case_id`、`pre_condition_tc`、
/// `is_run`、`extract_vars`、`asserts`）。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TestCaseRecord {
    /// 用例 ID，同一运行内唯一
    #[serde(alias = "test_case_id", alias = "case_id", deserialize_with = "id_field")]
    pub id: String,

    #[serde(default)]
    pub module: Option<String>,

    #[serde(default, alias = "case_name", alias = "title")]
    pub name: Option<String>,

    #[serde(default)]
    pub method: Method,

    /// 请求路径或绝对 URL，可包含 `${name}` 占位符
    #[serde(default, alias = "url")]
    pub path: String,

    #[serde(default, deserialize_with = "object_field")]
    pub headers: Map<String, Value>,

    /// 查询参数
    #[serde(default, alias = "query", deserialize_with = "object_field")]
    pub params: Map<String, Value>,

    /// 请求体；`null` 表示不发送
    #[serde(default, deserialize_with = "body_field")]
    pub body: Value,

    /// 提取规则：变量名 -> 提取表达式
    #[serde(default, alias = "extract_vars", deserialize_with = "extract_field")]
    pub extract: BTreeMap<String, String>,

    #[serde(default, alias = "asserts", deserialize_with = "assertion_list")]
    pub assertions: Vec<AssertionSpec>,

    /// 前置用例 ID（空字符串视为无）
    #[serde(
        default,
        alias = "pre_condition_tc",
        alias = "depends_on",
        deserialize_with = "optional_id"
    )]
    pub prerequisite: Option<String>,

    #[serde(default = "default_enabled", alias = "is_run", deserialize_with = "flag")]
    pub enabled: bool,

    #[serde(default, deserialize_with = "optional_id")]
    pub priority: Option<String>,

    #[serde(default, deserialize_with = "tag_list")]
    pub tags: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// 单条用例的超时覆盖
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl TestCaseRecord {
    pub fn new(id: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            module: None,
            name: None,
            method,
            path: path.into(),
            headers: Map::new(),
            params: Map::new(),
            body: Value::Null,
            extract: BTreeMap::new(),
            assertions: Vec::new(),
            prerequisite: None,
            enabled: true,
            priority: None,
            tags: Vec::new(),
            description: None,
            timeout_ms: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_prerequisite(mut self, id: impl Into<String>) -> Self {
        self.prerequisite = Some(id.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_extract(mut self, variable: impl Into<String>, expr: impl Into<String>) -> Self {
        self.extract.insert(variable.into(), expr.into());
        self
    }

    pub fn with_assertion(mut self, assertion: AssertionSpec) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn prerequisite(&self) -> Option<&str> {
        self.prerequisite.as_deref()
    }
}

/// 表格单元格里的 JSON 常以字符串形式出现
fn parse_embedded<T, E>(raw: &str) -> Result<T, E>
where
    T: DeserializeOwned,
    E: de::Error,
{
    serde_json::from_str(raw).map_err(|e| E::custom(format!("invalid embedded JSON: {}", e)))
}

fn id_field<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "test case id must be a non-empty string or number, got {}",
            other
        ))),
    }
}

fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

fn object_field<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        Value::String(s) if s.trim().is_empty() => Ok(Map::new()),
        Value::String(s) => parse_embedded(&s),
        other => Err(de::Error::custom(format!("expected an object, got {}", other))),
    }
}

fn extract_field<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    object_field(deserializer)?
        .into_iter()
        .map(|(name, expr)| match expr {
            Value::String(expr) => Ok((name, expr)),
            other => Err(de::Error::custom(format!(
                "extraction rule for '{}' must be a string, got {}",
                name, other
            ))),
        })
        .collect()
}

/// 字符串形式的 JSON 对象或数组会被展开，其他字符串按文本请求体发送
fn body_field<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
        Value::String(s) => {
            let trimmed = s.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                parse_embedded(&s)
            } else {
                Ok(Value::String(s))
            }
        }
        other => Ok(other),
    }
}

/// 断言列表：数组、单条表达式、单个对象或 JSON 字符串
fn assertion_list<'de, D>(deserializer: D) -> Result<Vec<AssertionSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        Value::String(s) if s.trim().is_empty() => return Ok(Vec::new()),
        Value::String(s) if s.trim_start().starts_with('[') => {
            parse_embedded::<_, D::Error>(&s)?
        }
        Value::String(s) if s.trim_start().starts_with('{') => {
            vec![parse_embedded::<Value, D::Error>(&s)?]
        }
        single => vec![single],
    };
    serde_json::from_value(Value::Array(items)).map_err(de::Error::custom)
}

/// 标签：数组，或以逗号/分号分隔的单元格文本
fn tag_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let split = |s: &str| -> Vec<String> {
        s.split([',', ';', '，', '；'])
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    };

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(split(&s)),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(tag) => Ok(tag.trim().to_string()),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(de::Error::custom(format!("tag must be a string, got {}", other))),
            })
            .filter(|tag| !matches!(tag, Ok(t) if t.is_empty()))
            .collect(),
        other => Err(de::Error::custom(format!(
            "tags must be a list or a comma-separated string, got {}",
            other
        ))),
    }
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(true),
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|n| n != 0.0)),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "" | "y" | "yes" | "true" | "1" | "是" => Ok(true),
            "n" | "no" | "false" | "0" | "否" => Ok(false),
            other => Err(de::Error::custom(format!("invalid flag value: {}", other))),
        },
        other => Err(de::Error::custom(format!("invalid flag value: {}", other))),
    }
}
