use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::case::types::TestCaseRecord;
use crate::error::{Result, RucaseError};

/// 用例文件加载器
///
/// 支持的格式：
/// - `.json`：用例数组，或 `{"cases": [...]}`
/// - `.toml`：`[[cases]]` 表数组
pub struct CaseLoader;

#[derive(Deserialize)]
struct CaseFile {
    #[serde(default)]
    cases: Vec<Value>,
}

impl CaseLoader {
    /// 从文件加载用例，按扩展名选择格式（默认 JSON）
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<TestCaseRecord>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RucaseError::CaseLoadError(format!("failed to read {}: {}", path.display(), e))
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);

        let records = match extension.as_deref() {
            Some("toml") => Self::parse_toml(&content)?,
            _ => Self::parse_json(&content)?,
        };

        info!(path = %path.display(), count = records.len(), "test cases loaded");
        Ok(records)
    }

    pub fn parse_json(content: &str) -> Result<Vec<TestCaseRecord>> {
        let items = match serde_json::from_str::<Value>(content)? {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("cases") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(RucaseError::CaseLoadError(
                        "expected a 'cases' array at the top level".to_string(),
                    ));
                }
            },
            _ => {
                return Err(RucaseError::CaseLoadError(
                    "expected an array of test cases".to_string(),
                ));
            }
        };
        Self::convert(items)
    }

    pub fn parse_toml(content: &str) -> Result<Vec<TestCaseRecord>> {
        let file: CaseFile = toml::from_str(content)?;
        Self::convert(file.cases)
    }

    fn convert(items: Vec<Value>) -> Result<Vec<TestCaseRecord>> {
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let record: TestCaseRecord = serde_json::from_value(item).map_err(|e| {
                    RucaseError::CaseLoadError(format!("case #{}: {}", index + 1, e))
                })?;
                debug!(case_id = %record.id, enabled = record.enabled, "parsed test case");
                Ok(record)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_parse_json_array() {
        let content = r#"[
            {"id": "login", "method": "POST", "path": "/login",
             "body": {"user": "a"}, "extract": {"token": "$.token"}},
            {"id": "profile", "path": "/me", "prerequisite": "login",
             "headers": {"Authorization": "Bearer ${token}"},
             "assertions": ["status == 200"]}
        ]"#;

        let records = CaseLoader::parse_json(content).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].method, Method::Post);
        assert_eq!(records[1].prerequisite(), Some("login"));
        assert_eq!(records[1].assertions.len(), 1);
    }

    #[test]
    fn test_parse_json_tags_cell() {
        let records = CaseLoader::parse_json(r#"[{"id": "TC1", "tags": "smoke,auth"}]"#).unwrap();
        assert_eq!(records[0].tags, vec!["smoke", "auth"]);
    }

    #[test]
    fn test_parse_json_cases_object() {
        let content = r#"{"cases": [{"id": "a"}, {"id": "b"}]}"#;
        let records = CaseLoader::parse_json(content).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_parse_json_reports_case_index() {
        let content = r#"[{"id": "a"}, {"path": "/no-id"}]"#;
        let err = CaseLoader::parse_json(content).unwrap_err();
        assert!(err.to_string().contains("case #2"));
    }

    #[test]
    fn test_parse_json_rejects_scalar() {
        assert!(CaseLoader::parse_json("42").is_err());
        assert!(CaseLoader::parse_json(r#"{"items": []}"#).is_err());
    }

    #[test]
    fn test_parse_toml() {
        let content = r#"
[[cases]]
id = "create"
method = "POST"
path = "/users"
body = { name = "alice" }
extract = { user_id = "$.id" }
assertions = [{ type = "status_code", value = 201 }]

[[cases]]
id = "get"
path = "/users/${user_id}"
prerequisite = "create"
tags = ["smoke"]
"#;

        let records = CaseLoader::parse_toml(content).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].body["name"], "alice");
        assert_eq!(records[1].tags, vec!["smoke".to_string()]);
    }

    #[test]
    fn test_load_from_path_by_extension() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[[cases]]\nid = \"a\"\npath = \"/ping\"").unwrap();
        file.flush().unwrap();

        let records = CaseLoader::load_from_path(file.path()).unwrap();
        assert_eq!(records[0].id, "a");

        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"[{{"id": "b"}}]"#).unwrap();
        file.flush().unwrap();

        let records = CaseLoader::load_from_path(file.path()).unwrap();
        assert_eq!(records[0].id, "b");
    }

    #[test]
    fn test_load_missing_file() {
        let err = CaseLoader::load_from_path("/nonexistent/cases.json").unwrap_err();
        assert!(matches!(err, RucaseError::CaseLoadError(_)));
    }
}
