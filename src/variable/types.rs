use serde_json::Value;
use std::collections::HashMap;

/// 变量上下文，`VariablePool` 的某一时刻快照，也用于从配置构建初始变量
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableContext {
    /// 变量映射表
    variables: HashMap<String, Value>,
}

impl VariableContext {
    /// 创建新的空变量上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入变量
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(key.into(), value.into());
    }

    /// 获取变量值
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// 获取字符串形式的变量值
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.variables.get(key).and_then(Value::as_str)
    }

    /// 批量插入变量
    pub fn extend(&mut self, vars: HashMap<String, Value>) {
        self.variables.extend(vars);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.variables.iter()
    }

    /// 变量数量
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

impl From<HashMap<String, Value>> for VariableContext {
    fn from(variables: HashMap<String, Value>) -> Self {
        Self { variables }
    }
}

impl From<VariableContext> for HashMap<String, Value> {
    fn from(context: VariableContext) -> Self {
        context.variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_variable_context_basic() {
        let mut ctx = VariableContext::new();
        assert!(ctx.is_empty());

        ctx.insert("key", "value");
        ctx.insert("count", 3);
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get_str("key"), Some("value"));
        assert_eq!(ctx.get("count"), Some(&json!(3)));
        assert_eq!(ctx.get_str("count"), None);
        assert_eq!(ctx.get("missing"), None);
    }

    #[test]
    fn test_variable_context_extend() {
        let mut ctx = VariableContext::new();
        let mut vars = HashMap::new();
        vars.insert("key1".to_string(), json!("value1"));
        vars.insert("key2".to_string(), json!({"nested": true}));

        ctx.extend(vars);
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get("key2"), Some(&json!({"nested": true})));
    }
}
