use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assertion::parser::RawAssertion;

/// 断言错误类型
#[derive(Debug, thiserror::Error)]
pub enum AssertError {
    #[error("Invalid assertion syntax: {0}")]
    InvalidSyntax(String),

    #[error("Invalid operator: {0}")]
    InvalidOperator(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Unknown assertion kind: {0}")]
    UnknownKind(String),

    #[error("Response body is not valid JSON: {0}")]
    NotJson(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

/// 声明式断言，每种断言一个变体
///
/// 可从两种形式反序列化：
/// - 行形式：`{"type": "status_code", "value": 200}`
/// - 表达式：`"status == 200"`、`"body.user.id == 1"`、`"body contains \"total\""`
///
/// 无法识别的断言不会导致反序列化失败，而是落入 `Unknown` / `Invalid`，
/// 在求值时仅该条断言报错。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawAssertion")]
pub enum AssertionSpec {
    /// 状态码相等
    StatusCode(u16),
    /// JSON 路径取值后严格相等
    JsonPath { expr: String, expected: Value },
    /// 响应体文本包含所有片段
    Contains(Vec<String>),
    /// 响应头逐个相等，名称不区分大小写
    Headers(BTreeMap<String, String>),
    /// 响应耗时阈值（毫秒）
    ResponseTime { op: CompareOp, threshold_ms: u64 },
    /// JSON Schema 校验
    Schema(Value),
    /// 未知的断言类型
    Unknown { kind: String },
    /// 已知类型但参数不合法
    Invalid { raw: String, reason: String },
}

impl AssertionSpec {
    pub fn status(code: u16) -> Self {
        Self::StatusCode(code)
    }

    pub fn json_path(expr: impl Into<String>, expected: impl Into<Value>) -> Self {
        Self::JsonPath {
            expr: expr.into(),
            expected: expected.into(),
        }
    }

    pub fn contains<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Contains(fragments.into_iter().map(Into::into).collect())
    }

    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Headers(BTreeMap::from([(name.into(), value.into())]))
    }

    pub fn response_time(op: CompareOp, threshold_ms: u64) -> Self {
        Self::ResponseTime { op, threshold_ms }
    }

    pub fn schema(schema: Value) -> Self {
        Self::Schema(schema)
    }
}

impl fmt::Display for AssertionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertionSpec::StatusCode(code) => write!(f, "status == {}", code),
            AssertionSpec::JsonPath { expr, expected } => write!(f, "{} == {}", expr, expected),
            AssertionSpec::Contains(fragments) => {
                let quoted: Vec<String> = fragments.iter().map(|s| format!("\"{}\"", s)).collect();
                write!(f, "body contains {}", quoted.join(", "))
            }
            AssertionSpec::Headers(expected) => {
                let pairs: Vec<String> = expected
                    .iter()
                    .map(|(name, value)| format!("header.{} == \"{}\"", name, value))
                    .collect();
                write!(f, "{}", pairs.join(", "))
            }
            AssertionSpec::ResponseTime { op, threshold_ms } => {
                write!(f, "response.time {} {}", op, threshold_ms)
            }
            AssertionSpec::Schema(_) => write!(f, "body matches schema"),
            AssertionSpec::Unknown { kind } => write!(f, "<unknown assertion '{}'>", kind),
            AssertionSpec::Invalid { raw, .. } => write!(f, "{}", raw),
        }
    }
}

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,          // ==
    NotEqual,       // !=
    Greater,        // >
    Less,           // <
    GreaterOrEqual, // >=
    LessOrEqual,    // <=
}

impl CompareOp {
    /// 从字符串解析运算符
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "==" | "eq" => Some(Self::Equal),
            "!=" | "ne" => Some(Self::NotEqual),
            ">" | "gt" => Some(Self::Greater),
            "<" | "lt" => Some(Self::Less),
            ">=" | "ge" => Some(Self::GreaterOrEqual),
            "<=" | "le" => Some(Self::LessOrEqual),
            _ => None,
        }
    }

    /// 转换为字符串表示
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Greater => ">",
            Self::Less => "<",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
        }
    }

    pub fn holds(&self, actual: u64, expected: u64) -> bool {
        match self {
            Self::Equal => actual == expected,
            Self::NotEqual => actual != expected,
            Self::Greater => actual > expected,
            Self::Less => actual < expected,
            Self::GreaterOrEqual => actual >= expected,
            Self::LessOrEqual => actual <= expected,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 断言结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssertionResult {
    /// 断言描述
    pub raw: String,

    /// 是否通过
    pub passed: bool,

    /// 实际值（字符串表示）
    pub actual: Option<String>,

    /// 期望描述
    pub expected: String,

    /// 失败消息
    pub message: Option<String>,
}

impl AssertionResult {
    /// 创建成功的断言结果
    pub fn success(raw: String, actual: String, expected: String) -> Self {
        Self {
            raw,
            passed: true,
            actual: Some(actual),
            expected,
            message: None,
        }
    }

    /// 创建失败的断言结果
    pub fn failure(raw: String, actual: String, expected: String, message: String) -> Self {
        Self {
            raw,
            passed: false,
            actual: Some(actual),
            expected,
            message: Some(message),
        }
    }

    /// 创建错误的断言结果（解析或执行错误）
    pub fn error(raw: String, error: AssertError) -> Self {
        Self {
            raw,
            passed: false,
            actual: None,
            expected: String::new(),
            message: Some(error.to_string()),
        }
    }
}
