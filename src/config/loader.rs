use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::config::types::RucaseConfig;
use crate::error::{Result, RucaseError};
use crate::variable::{VariableContext, VariableResolver};

/// 配置文件加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 配置文件名
    pub const CONFIG_FILE: &'static str = "rucase.toml";

    /// 从指定路径加载配置文件
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<RucaseConfig> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RucaseError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;

        let config: RucaseConfig = toml::from_str(&content)?;
        if config.run.workers == 0 {
            return Err(RucaseError::ConfigError(
                "run.workers must be at least 1".to_string(),
            ));
        }
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// 查找并加载配置文件
    /// 查找顺序：
    /// 1. 当前目录
    /// 2. 父目录递归查找
    /// 3. 用户配置目录 ~/.config/rucase/
    pub fn find_and_load() -> Result<Option<RucaseConfig>> {
        // 1. 当前目录及父目录
        if let Some(config) = Self::try_load_from_current_dir()? {
            return Ok(Some(config));
        }

        // 2. 用户配置目录
        Self::try_load_from_user_dir()
    }

    /// 尝试从当前目录及其父目录加载
    fn try_load_from_current_dir() -> Result<Option<RucaseConfig>> {
        let Ok(mut current) = std::env::current_dir() else {
            return Ok(None);
        };

        loop {
            let config_path = current.join(Self::CONFIG_FILE);
            if config_path.exists() {
                return Self::load_from_path(&config_path).map(Some);
            }

            // 尝试父目录
            if !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// 尝试从用户配置目录加载
    fn try_load_from_user_dir() -> Result<Option<RucaseConfig>> {
        let Some(home) = dirs::home_dir() else {
            return Ok(None);
        };
        let config_path = home.join(".config").join("rucase").join(Self::CONFIG_FILE);

        if config_path.exists() {
            Self::load_from_path(&config_path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// 构建初始变量上下文
    /// env_name: 环境名称（如 "dev", "prod"）
    /// cli_vars: CLI 传入的变量覆盖（--var key=value）
    pub fn build_context(
        config: &RucaseConfig,
        env_name: Option<&str>,
        cli_vars: &[(String, String)],
    ) -> Result<VariableContext> {
        let mut context = VariableContext::new();

        // 1. 从配置文件加载环境变量
        if let Some(name) = env_name {
            let env = config.get_environment(name).ok_or_else(|| {
                RucaseError::ConfigError(format!("environment '{}' not found", name))
            })?;
            for (key, value) in &env.variables {
                context.insert(key.clone(), Self::resolve_env_value(value));
            }
        }

        // 2. 应用 CLI 覆盖（优先级最高）
        for (key, value) in cli_vars {
            context.insert(key.clone(), value.clone());
        }

        Ok(context)
    }

    /// 解析 CLI 变量参数 "key=value"
    pub fn parse_cli_var(s: &str) -> Option<(String, String)> {
        s.split_once('=')
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, _)| !k.is_empty())
    }

    /// 确定 base URL：CLI > 环境变量 base_url > [run].base_url
    pub fn resolve_base_url(
        config: &RucaseConfig,
        context: &VariableContext,
        cli_base_url: Option<&str>,
    ) -> Option<String> {
        cli_base_url
            .map(str::to_string)
            .or_else(|| context.get_str("base_url").map(str::to_string))
            .or_else(|| {
                config
                    .run
                    .base_url
                    .as_deref()
                    .map(VariableResolver::resolve_env_vars)
            })
    }

    // 只有字符串会引用系统环境变量 ${VAR}
    fn resolve_env_value(value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(VariableResolver::resolve_env_vars(s)),
            other => other.clone(),
        }
    }
}
