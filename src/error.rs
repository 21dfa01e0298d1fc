use thiserror::Error;

use crate::runner::planner::ResolveError;

#[derive(Error, Debug)]
pub enum RucaseError {
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("用例加载错误: {0}")]
    CaseLoadError(String),

    #[error("依赖解析失败: {0}")]
    ResolveError(#[from] ResolveError),

    #[error("HTTP 客户端错误: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML 解析错误: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("URL 解析错误: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("{0}")]
    Other(String),
}

// Add conversion from anyhow::Error
impl From<anyhow::Error> for RucaseError {
    fn from(err: anyhow::Error) -> Self {
        RucaseError::Other(err.to_string())
    }
}

impl RucaseError {
    /// 是否为运行前的依赖解析错误（依赖环、重复 ID）
    pub fn is_fatal_resolution(&self) -> bool {
        matches!(self, RucaseError::ResolveError(_))
    }
}

/// Result type for rucase crate
pub type Result<T> = std::result::Result<T, RucaseError>;
