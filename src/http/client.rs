use std::error::Error as StdError;
use std::io;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use crate::Result;
use crate::http::request::{Request, RequestBody};
use crate::http::response::Response;
use crate::http::types::Method;

/// 传输层错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// 连接失败/重置与超时属于可重试的瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Connect(_) | TransportError::Timeout(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() || is_connection_reset(&err) {
            TransportError::Connect(err.to_string())
        } else if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// 沿 source 链查找连接被重置/中断的 IO 错误
fn is_connection_reset(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>()
            && matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            )
        {
            return true;
        }
        source = cause.source();
    }
    false
}

/// 执行 HTTP 请求的抽象，执行器只依赖该 trait
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &Request) -> std::result::Result<Response, TransportError>;
}

/// 基于 reqwest 的默认实现
#[derive(Clone)]
pub struct Client {
    inner: reqwest::Client,
}

impl Client {
    pub fn new() -> Result<Self> {
        Ok(Self {
            inner: reqwest::Client::builder().build()?,
        })
    }

    pub fn with_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }

    fn build_headers(request: &Request) -> std::result::Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        for (key, value) in &request.headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                TransportError::InvalidRequest(format!("invalid header name '{}': {}", key, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                TransportError::InvalidRequest(format!("invalid value for header '{}': {}", key, e))
            })?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl HttpTransport for Client {
    async fn execute(&self, request: &Request) -> std::result::Result<Response, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
        };
        let mut headers = Self::build_headers(request)?;

        let mut req = self.inner.request(method, request.full_url());
        match &request.body {
            Some(RequestBody::Json(value)) => {
                let json = serde_json::to_string(value)
                    .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                req = req.body(json);
            }
            Some(RequestBody::Text(text)) => {
                req = req.body(text.clone());
            }
            None => {}
        }
        let req = req.headers(headers).timeout(request.timeout);

        let start = Instant::now();
        let response = req.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;
        let duration = start.elapsed();

        Response::new(status, headers, body, duration)
            .map_err(|e| TransportError::Other(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Connect("refused".into()).is_transient());
        assert!(TransportError::Timeout("30s".into()).is_transient());
        assert!(!TransportError::InvalidRequest("bad header".into()).is_transient());
        assert!(!TransportError::Other("tls".into()).is_transient());
    }

    #[test]
    fn test_build_headers_rejects_invalid_name() {
        let request = Request::new(Method::Get, "http://localhost/")
            .unwrap()
            .with_header("bad header", "x");
        let err = Client::build_headers(&request).unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        // 端口 9 (discard) 在测试环境中通常无人监听
        let client = Client::new().unwrap();
        let request = Request::new(Method::Get, "http://127.0.0.1:9/")
            .unwrap()
            .with_timeout(std::time::Duration::from_secs(2));
        let err = client.execute(&request).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {:?}", err);
    }
}
