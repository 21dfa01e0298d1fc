use crate::Result;
use crate::http::types::Status;
use reqwest::header::HeaderMap as Headers;
use std::time::Duration;

/// 收到的 HTTP 响应
#[derive(Debug, Clone)]
pub struct Response {
    pub status: Status,
    pub headers: Headers,
    pub body: String,
    pub duration: Duration,
}

impl Response {
    pub fn new(status: u16, headers: Headers, body: String, duration: Duration) -> Result<Self> {
        Ok(Self {
            status: Status::new(status)?,
            headers,
            body,
            duration,
        })
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// 将响应体解析为 JSON
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.body)
    }

    /// 按名称读取响应头（大小写不敏感）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_json_and_header() {
        let mut headers = Headers::new();
        headers.insert("x-request-id", "abc".parse().unwrap());
        let response = Response::new(
            201,
            headers,
            r#"{"id": 7}"#.to_string(),
            Duration::from_millis(12),
        )
        .unwrap();

        assert!(response.is_success());
        assert_eq!(response.json().unwrap()["id"], 7);
        assert_eq!(response.header("X-Request-Id"), Some("abc"));
        assert_eq!(response.header("missing"), None);
    }

    #[test]
    fn test_response_invalid_status() {
        assert!(Response::new(42, Headers::new(), String::new(), Duration::ZERO).is_err());
    }
}
