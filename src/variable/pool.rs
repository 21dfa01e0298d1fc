use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::debug;

use crate::variable::types::VariableContext;

/// 单次运行内共享的变量池
///
/// 由提取规则写入，对之后执行的所有用例可见（包括并发运行的无关用例）。
/// 没有过期和淘汰，随运行结束销毁。克隆得到的是同一个池的句柄。
#[derive(Debug, Clone, Default)]
pub struct VariablePool {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl VariablePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以初始变量（环境配置、CLI 覆盖）创建
    pub fn from_context(context: VariableContext) -> Self {
        Self {
            inner: Arc::new(RwLock::new(context.into())),
        }
    }

    /// 无条件覆盖写入，last-writer-wins
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let mut vars = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        debug!(variable = %name, "variable set");
        vars.insert(name, value.into());
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let vars = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        vars.get(name).cloned()
    }

    /// 一致性快照，用于占位符替换
    pub fn snapshot(&self) -> VariableContext {
        let vars = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        VariableContext::from(vars.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    #[test]
    fn test_set_get_overwrite() {
        let pool = VariablePool::new();
        assert_eq!(pool.get("token"), None);

        pool.set("token", "a");
        pool.set("token", "b");
        assert_eq!(pool.get("token"), Some(json!("b")));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_snapshot_is_point_in_time() {
        let pool = VariablePool::new();
        pool.set("user", json!({"id": 1, "roles": ["admin"]}));

        let snapshot = pool.snapshot();
        pool.set("user", json!({"id": 2}));

        assert_eq!(snapshot.get("user"), Some(&json!({"id": 1, "roles": ["admin"]})));
        assert_eq!(pool.get("user"), Some(json!({"id": 2})));
    }

    #[test]
    fn test_clone_shares_storage() {
        let pool = VariablePool::new();
        let handle = pool.clone();
        handle.set("shared", true);
        assert_eq!(pool.get("shared"), Some(json!(true)));
    }

    #[test]
    fn test_from_context() {
        let mut ctx = VariableContext::new();
        ctx.insert("base_url", "http://localhost");
        let pool = VariablePool::from_context(ctx);
        assert_eq!(pool.get("base_url"), Some(json!("http://localhost")));
    }

    #[test]
    fn test_concurrent_writers_distinct_keys() {
        let pool = VariablePool::new();
        let thread_count = 8;
        let per_thread = 100;

        let handles: Vec<_> = (0..thread_count)
            .map(|t| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for i in 0..per_thread {
                        pool.set(format!("var_{}_{}", t, i), json!({"t": t, "i": i}));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.len(), thread_count * per_thread);
        assert_eq!(pool.get("var_3_42"), Some(json!({"t": 3, "i": 42})));
    }
}
