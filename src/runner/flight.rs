use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

/// 按 key 去重的单次执行注册表
///
/// 同一个 key 的第一次 `run` 执行闭包，并发或之后的调用者等待并共享同一结果，
/// 闭包在整个运行中至多执行一次。
pub struct SingleFlight<T> {
    cells: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    fn cell(&self, key: &str) -> Arc<OnceCell<T>> {
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.entry(key.to_string()).or_default().clone()
    }

    pub async fn run<F, Fut>(&self, key: &str, init: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        // 锁只保护注册表本身，不跨 await 持有
        let cell = self.cell(key);
        cell.get_or_init(init).await.clone()
    }

    /// 已完成的结果
    pub fn get(&self, key: &str) -> Option<T> {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.get(key).and_then(|cell| cell.get().cloned())
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}
