use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// `rucase.toml` 配置文件
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RucaseConfig {
    #[serde(default)]
    pub run: RunConfig,

    /// 环境配置映射：环境名 -> 环境变量
    #[serde(default)]
    pub environments: HashMap<String, Environment>,
}

impl RucaseConfig {
    /// 获取指定环境的配置
    pub fn get_environment(&self, name: &str) -> Option<&Environment> {
        self.environments.get(name)
    }
}

/// 单个环境的变量集合
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Environment {
    #[serde(flatten)]
    pub variables: HashMap<String, Value>,
}

/// `[run]` 段：执行参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub base_url: Option<String>,
    /// 并发 worker 数，1 表示严格串行
    pub workers: usize,
    pub timeout_ms: u64,
    /// 默认请求头，用例自身的同名请求头优先
    pub headers: HashMap<String, String>,
    pub retry: RetryConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            workers: 4,
            timeout_ms: 30_000,
            headers: HashMap::new(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// `[run.retry]` 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 首次请求之外的最大重试次数
    pub max_retries: u32,
    pub delay_ms: u64,
    pub backoff: BackoffKind,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 1_000,
            backoff: BackoffKind::Fixed,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter: false,
            retry_on_status: vec![502, 503, 504],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config: RucaseConfig = toml::from_str("").unwrap();
        assert_eq!(config.run.workers, 4);
        assert_eq!(config.run.timeout_ms, 30_000);
        assert_eq!(config.run.retry.max_retries, 3);
        assert_eq!(config.run.retry.retry_on_status, vec![502, 503, 504]);
        assert!(config.environments.is_empty());
    }

    #[test]
    fn test_full_config() {
        let content = r#"
[run]
base_url = "http://localhost:8080"
workers = 1

[run.headers]
Accept = "application/json"

[run.retry]
max_retries = 2
backoff = "exponential"
jitter = true

[environments.dev]
base_url = "http://localhost:3000"
page_size = 20
"#;
        let config: RucaseConfig = toml::from_str(content).unwrap();
        assert_eq!(config.run.base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.run.workers, 1);
        assert_eq!(config.run.headers["Accept"], "application/json");
        assert_eq!(config.run.retry.max_retries, 2);
        assert_eq!(config.run.retry.backoff, BackoffKind::Exponential);
        assert_eq!(config.run.retry.delay_ms, 1_000);

        let dev = config.get_environment("dev").unwrap();
        assert_eq!(dev.variables["page_size"], serde_json::json!(20));
    }
}
