use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::assertion::display_value;
use crate::case::TestCaseRecord;
use crate::variable::types::VariableContext;

/// 占位符引用了未定义的变量，请求不会被发送
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("case '{case_id}': variable '{variable}' referenced in {field} is not defined")]
pub struct SubstitutionError {
    pub case_id: String,
    /// 出错位置，如 `path`、`headers.Authorization`、`body.items[0].id`
    pub field: String,
    pub variable: String,
}

/// 替换完成后的请求部件
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// 变量替换器
pub struct VariableResolver;

fn placeholder_regex() -> &'static Regex {
    static VAR_REGEX: OnceLock<Regex> = OnceLock::new();
    VAR_REGEX.get_or_init(|| {
        Regex::new(r"\$\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}").unwrap()
    })
}

impl VariableResolver {
    /// 对用例的 path / headers / params / body 做占位符替换
    ///
    /// 任一引用的变量不存在即失败，不做部分替换。
    pub fn resolve_request(
        record: &TestCaseRecord,
        context: &VariableContext,
    ) -> Result<ResolvedRequest, SubstitutionError> {
        let scope = Scope {
            case_id: &record.id,
            context,
        };

        let path = display_value(&scope.string(&record.path, "path")?);
        let headers = scope.pairs(&record.headers, "headers")?;
        let params = scope.pairs(&record.params, "params")?;
        let body = match &record.body {
            Value::Null => None,
            body => Some(scope.value(body, "body".to_string())?),
        };

        Ok(ResolvedRequest {
            path,
            headers,
            params,
            body,
        })
    }

    /// 替换单个 JSON 值中的占位符（递归处理对象和数组）
    pub fn substitute_value(
        value: &Value,
        context: &VariableContext,
        case_id: &str,
        field: &str,
    ) -> Result<Value, SubstitutionError> {
        Scope { case_id, context }.value(value, field.to_string())
    }

    /// 解析并替换系统环境变量 ${VAR}，未定义的保持原样
    pub fn resolve_env_vars(text: &str) -> String {
        placeholder_regex()
            .replace_all(text, |caps: &Captures| {
                std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
            })
            .to_string()
    }
}

struct Scope<'a> {
    case_id: &'a str,
    context: &'a VariableContext,
}

impl Scope<'_> {
    fn missing(&self, field: &str, variable: &str) -> SubstitutionError {
        SubstitutionError {
            case_id: self.case_id.to_string(),
            field: field.to_string(),
            variable: variable.to_string(),
        }
    }

    fn value(&self, value: &Value, field: String) -> Result<Value, SubstitutionError> {
        match value {
            Value::String(text) => self.string(text, &field),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.value(item, format!("{}[{}]", field, i)))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => map
                .iter()
                .map(|(key, item)| {
                    let resolved = self.value(item, format!("{}.{}", field, key))?;
                    Ok((key.clone(), resolved))
                })
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object),
            other => Ok(other.clone()),
        }
    }

    /// 整个字符串恰好是一个占位符时保留变量的原始类型，否则拼接为字符串
    fn string(&self, text: &str, field: &str) -> Result<Value, SubstitutionError> {
        let re = placeholder_regex();

        if let Some(caps) = re.captures(text)
            && let Some(whole) = caps.get(0)
            && whole.start() == 0
            && whole.end() == text.len()
        {
            let name = &caps[1];
            return self
                .context
                .get(name)
                .cloned()
                .ok_or_else(|| self.missing(field, name));
        }

        let mut output = String::with_capacity(text.len());
        let mut last = 0;
        for caps in re.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let name = &caps[1];
            let value = self
                .context
                .get(name)
                .ok_or_else(|| self.missing(field, name))?;
            output.push_str(&text[last..whole.start()]);
            output.push_str(&display_value(value));
            last = whole.end();
        }
        output.push_str(&text[last..]);

        Ok(Value::String(output))
    }

    fn pairs(
        &self,
        map: &Map<String, Value>,
        section: &str,
    ) -> Result<Vec<(String, String)>, SubstitutionError> {
        map.iter()
            .map(|(key, value)| {
                let resolved = self.value(value, format!("{}.{}", section, key))?;
                Ok((key.clone(), display_value(&resolved)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use serde_json::json;

    fn context() -> VariableContext {
        let mut ctx = VariableContext::new();
        ctx.insert("token", "abc");
        ctx.insert("user_id", 42);
        ctx.insert("user", json!({"id": 42, "roles": ["admin"]}));
        ctx
    }

    fn substitute(value: Value) -> Result<Value, SubstitutionError> {
        VariableResolver::substitute_value(&value, &context(), "TC", "body")
    }

    #[test]
    fn test_embedded_placeholder_becomes_string() {
        assert_eq!(
            substitute(json!("Bearer ${token}")).unwrap(),
            json!("Bearer abc")
        );
        assert_eq!(
            substitute(json!("/users/${user_id}/orders")).unwrap(),
            json!("/users/42/orders")
        );
    }

    #[test]
    fn test_whole_placeholder_preserves_type() {
        assert_eq!(substitute(json!("${user_id}")).unwrap(), json!(42));
        assert_eq!(
            substitute(json!("${user}")).unwrap(),
            json!({"id": 42, "roles": ["admin"]})
        );
        assert_eq!(substitute(json!("${ token }")).unwrap(), json!("abc"));
    }

    #[test]
    fn test_nested_structures() {
        let body = json!({
            "owner": "${user_id}",
            "items": [{"ref": "item-${token}"}, 3, null],
            "flag": true
        });
        assert_eq!(
            substitute(body).unwrap(),
            json!({
                "owner": 42,
                "items": [{"ref": "item-abc"}, 3, null],
                "flag": true
            })
        );
    }

    #[test]
    fn test_no_placeholders_is_identity() {
        let body = json!({"a": [1, "two", {"three": 3.5}], "price": "$100", "brace": "${"});
        assert_eq!(substitute(body.clone()).unwrap(), body);
    }

    #[test]
    fn test_missing_variable_reports_field() {
        let err = substitute(json!({"items": [{"id": "${order_id}"}]})).unwrap_err();
        assert_eq!(
            err,
            SubstitutionError {
                case_id: "TC".to_string(),
                field: "body.items[0].id".to_string(),
                variable: "order_id".to_string(),
            }
        );
    }

    #[test]
    fn test_resolve_request() {
        let record = TestCaseRecord::new("TC_GET", Method::Get, "/users/${user_id}")
            .with_header("Authorization", "Bearer ${token}")
            .with_param("limit", 10)
            .with_param("owner", "${user_id}");

        let resolved = VariableResolver::resolve_request(&record, &context()).unwrap();
        assert_eq!(resolved.path, "/users/42");
        assert_eq!(
            resolved.headers,
            vec![("Authorization".to_string(), "Bearer abc".to_string())]
        );
        assert!(resolved.params.contains(&("limit".to_string(), "10".to_string())));
        assert!(resolved.params.contains(&("owner".to_string(), "42".to_string())));
        assert!(resolved.body.is_none());
    }

    #[test]
    fn test_resolve_request_missing_header_variable() {
        let record = TestCaseRecord::new("TC_AUTH", Method::Get, "/me")
            .with_header("Authorization", "Bearer ${session}");

        let err = VariableResolver::resolve_request(&record, &context()).unwrap_err();
        assert_eq!(err.case_id, "TC_AUTH");
        assert_eq!(err.field, "headers.Authorization");
        assert_eq!(err.variable, "session");
    }

    #[test]
    fn test_resolve_env_vars() {
        unsafe {
            std::env::set_var("RUCASE_TEST_VAR", "test_value");
        }

        let output = VariableResolver::resolve_env_vars("Value: ${RUCASE_TEST_VAR}");
        assert_eq!(output, "Value: test_value");

        unsafe {
            std::env::remove_var("RUCASE_TEST_VAR");
        }
    }

    #[test]
    fn test_resolve_env_vars_missing() {
        let output = VariableResolver::resolve_env_vars("Value: ${RUCASE_NONEXISTENT_VAR}");
        // 未找到的环境变量保持原样
        assert_eq!(output, "Value: ${RUCASE_NONEXISTENT_VAR}");
    }
}
