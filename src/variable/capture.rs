use std::cell::OnceCell;
use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::assertion::JsonPath;
use crate::http::Response;

/// 变量提取失败，不影响用例的通过状态
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("failed to extract '{variable}' from '{expression}': {reason}")]
pub struct ExtractionError {
    pub variable: String,
    pub expression: String,
    pub reason: String,
}

/// 变量捕获来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    /// 从响应 Body 提取（与断言共用同一路径语法）
    /// 示例: $.token, body.user.id, data.items[0].id
    Body(JsonPath),

    /// 从响应 Header 提取
    /// 示例: header.X-Token, headers.Location
    Header(String),

    /// 响应状态码
    Status,
}

/// 变量捕获配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableCapture {
    /// 变量名称
    pub name: String,

    /// 原始表达式
    pub expression: String,

    /// 捕获来源
    pub source: CaptureSource,
}

impl VariableCapture {
    /// 解析捕获源字符串
    ///
    /// 语法:
    /// - `status` → CaptureSource::Status
    /// - `header.X-Token` → CaptureSource::Header("X-Token")
    /// - 其他一律视为响应体路径；响应体里名为 `status` 的字段需写成 `$.status`
    pub fn parse(name: &str, expression: &str) -> Result<Self, ExtractionError> {
        let expr = expression.trim();
        let source = if expr == "status" {
            CaptureSource::Status
        } else if let Some(header) = expr
            .strip_prefix("header.")
            .or_else(|| expr.strip_prefix("headers."))
        {
            CaptureSource::Header(header.to_string())
        } else {
            let path = JsonPath::parse(expr).map_err(|e| ExtractionError {
                variable: name.to_string(),
                expression: expr.to_string(),
                reason: e.to_string(),
            })?;
            CaptureSource::Body(path)
        };

        Ok(Self {
            name: name.to_string(),
            expression: expr.to_string(),
            source,
        })
    }

    fn error(&self, reason: impl Into<String>) -> ExtractionError {
        ExtractionError {
            variable: self.name.clone(),
            expression: self.expression.clone(),
            reason: reason.into(),
        }
    }

    fn extract_with(
        &self,
        response: &Response,
        body: &OnceCell<Result<Value, String>>,
    ) -> Result<Value, ExtractionError> {
        match &self.source {
            CaptureSource::Status => Ok(Value::from(response.status.code())),
            CaptureSource::Header(header) => response
                .header(header)
                .map(|v| Value::String(v.to_string()))
                .ok_or_else(|| self.error(format!("header '{}' not present", header))),
            CaptureSource::Body(path) => {
                let json = body
                    .get_or_init(|| response.json().map_err(|e| e.to_string()))
                    .as_ref()
                    .map_err(|e| self.error(format!("response body is not valid JSON: {}", e)))?;
                path.query(json)
                    .cloned()
                    .ok_or_else(|| self.error("path not found in response body"))
            }
        }
    }

    /// 从响应中提取变量值
    pub fn extract(&self, response: &Response) -> Result<Value, ExtractionError> {
        self.extract_with(response, &OnceCell::new())
    }
}

/// 提取结果：成功的变量与失败原因分开返回
#[derive(Debug, Default)]
pub struct Extraction {
    pub values: BTreeMap<String, Value>,
    pub errors: Vec<ExtractionError>,
}

/// 按规则逐条提取，单条失败不影响其余规则
pub fn extract_all(rules: &BTreeMap<String, String>, response: &Response) -> Extraction {
    let body = OnceCell::new();
    let mut extraction = Extraction::default();

    for (name, expression) in rules {
        let result = VariableCapture::parse(name, expression)
            .and_then(|capture| capture.extract_with(response, &body));
        match result {
            Ok(value) => {
                extraction.values.insert(name.clone(), value);
            }
            Err(e) => extraction.errors.push(e),
        }
    }

    extraction
}
