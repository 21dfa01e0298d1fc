use std::time::Duration;

use serde_json::Value;

use crate::Result;
use crate::http::types::Method;

/// 默认请求超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// 请求体
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Text(String),
}

/// 已完成占位符替换、可直接发送的请求
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: url::Url,
    pub headers: Vec<(String, String)>,
    pub query_params: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub timeout: Duration,
}

impl Request {
    pub fn new(method: Method, url: &str) -> Result<Self> {
        Ok(Self {
            method,
            url: url::Url::parse(url)?,
            headers: Vec::new(),
            query_params: Vec::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// 设置 header，同名（大小写不敏感）覆盖
    pub fn insert_header(&mut self, key: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        self.headers.push((key.to_string(), value.to_string()));
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.insert_header(key, value);
        self
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query_params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_json(mut self, data: Value) -> Self {
        self.body = Some(RequestBody::Json(data));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.body = Some(RequestBody::Text(text.to_owned()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// 含 query 参数的完整 URL
    pub fn full_url(&self) -> url::Url {
        let mut url = self.url.clone();
        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
        }
        url
    }
}
