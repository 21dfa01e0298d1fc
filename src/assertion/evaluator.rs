use std::cell::OnceCell;

use serde_json::Value;

use crate::assertion::extractor::{JsonPath, display_value};
use crate::assertion::types::{AssertError, AssertionResult, AssertionSpec};
use crate::http::Response;

/// 响应体 JSON 只解析一次，供多条断言共用
struct ResponseView<'a> {
    response: &'a Response,
    json: OnceCell<Result<Value, String>>,
}

impl<'a> ResponseView<'a> {
    fn new(response: &'a Response) -> Self {
        Self {
            response,
            json: OnceCell::new(),
        }
    }

    fn json(&self) -> Result<&Value, AssertError> {
        self.json
            .get_or_init(|| self.response.json().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| AssertError::NotJson(e.clone()))
    }
}

/// 依次求值所有断言，不短路：某条失败后其余断言仍然求值并报告
pub fn evaluate_all(specs: &[AssertionSpec], response: &Response) -> Vec<AssertionResult> {
    let view = ResponseView::new(response);
    specs.iter().map(|spec| evaluate_with(spec, &view)).collect()
}

/// 所有断言都通过（空列表视为通过）
pub fn all_passed(results: &[AssertionResult]) -> bool {
    results.iter().all(|r| r.passed)
}

/// 执行单条断言求值
pub fn evaluate_assertion(spec: &AssertionSpec, response: &Response) -> AssertionResult {
    evaluate_with(spec, &ResponseView::new(response))
}

fn evaluate_with(spec: &AssertionSpec, view: &ResponseView<'_>) -> AssertionResult {
    let raw = spec.to_string();
    let response = view.response;

    match spec {
        AssertionSpec::StatusCode(expected) => {
            let actual = response.status.code();
            let expected_str = format!("== {}", expected);
            if actual == *expected {
                AssertionResult::success(raw, actual.to_string(), expected_str)
            } else {
                let message = format!("Expected status code {}, but got {}", expected, actual);
                AssertionResult::failure(raw, actual.to_string(), expected_str, message)
            }
        }

        AssertionSpec::JsonPath { expr, expected } => {
            let path = match JsonPath::parse(expr) {
                Ok(path) => path,
                Err(e) => return AssertionResult::error(raw, e),
            };
            let body = match view.json() {
                Ok(body) => body,
                Err(e) => return AssertionResult::error(raw, e),
            };
            let expected_str = format!("== {}", expected);
            match path.query(body) {
                Some(actual) if actual == expected => {
                    AssertionResult::success(raw, display_value(actual), expected_str)
                }
                Some(actual) => {
                    let message = format!(
                        "Expected {} to be {}, but got {}",
                        expr, expected, actual
                    );
                    AssertionResult::failure(raw, display_value(actual), expected_str, message)
                }
                None => {
                    let message = format!("Path '{}' not found in response body", expr);
                    AssertionResult::failure(raw, "not found".to_string(), expected_str, message)
                }
            }
        }

        AssertionSpec::Contains(fragments) => {
            let missing: Vec<&str> = fragments
                .iter()
                .filter(|fragment| !response.body.contains(fragment.as_str()))
                .map(String::as_str)
                .collect();
            let expected_str = format!("contains {}", fragments.join(", "));
            if missing.is_empty() {
                AssertionResult::success(raw, "all fragments present".to_string(), expected_str)
            } else {
                let message = format!("Response body does not contain: {}", missing.join(", "));
                AssertionResult::failure(
                    raw,
                    format!("missing {}", missing.join(", ")),
                    expected_str,
                    message,
                )
            }
        }

        AssertionSpec::Headers(expected) => {
            let mut actual = Vec::with_capacity(expected.len());
            let mut mismatches = Vec::new();
            for (name, value) in expected {
                match response.header(name) {
                    Some(found) if found == value => actual.push(format!("{}: {}", name, found)),
                    Some(found) => {
                        actual.push(format!("{}: {}", name, found));
                        mismatches.push(format!("{} expected '{}', got '{}'", name, value, found));
                    }
                    None => {
                        actual.push(format!("{}: <missing>", name));
                        mismatches.push(format!("{} is missing", name));
                    }
                }
            }
            let expected_str = expected
                .iter()
                .map(|(name, value)| format!("{}: {}", name, value))
                .collect::<Vec<_>>()
                .join(", ");
            if mismatches.is_empty() {
                AssertionResult::success(raw, actual.join(", "), expected_str)
            } else {
                let message = format!("Response header mismatch: {}", mismatches.join("; "));
                AssertionResult::failure(raw, actual.join(", "), expected_str, message)
            }
        }

        AssertionSpec::ResponseTime { op, threshold_ms } => {
            let actual = response.duration.as_millis() as u64;
            let expected_str = format!("{} {}ms", op, threshold_ms);
            if op.holds(actual, *threshold_ms) {
                AssertionResult::success(raw, format!("{}ms", actual), expected_str)
            } else {
                let message = format!(
                    "Expected response time {} {}ms, but took {}ms",
                    op, threshold_ms, actual
                );
                AssertionResult::failure(raw, format!("{}ms", actual), expected_str, message)
            }
        }

        AssertionSpec::Schema(schema) => {
            let validator = match jsonschema::validator_for(schema) {
                Ok(validator) => validator,
                Err(e) => {
                    return AssertionResult::error(raw, AssertError::InvalidSchema(e.to_string()));
                }
            };
            let body = match view.json() {
                Ok(body) => body,
                Err(e) => return AssertionResult::error(raw, e),
            };
            let errors: Vec<String> = validator
                .iter_errors(body)
                .map(|e| e.to_string())
                .collect();
            if errors.is_empty() {
                AssertionResult::success(raw, "valid".to_string(), "matches schema".to_string())
            } else {
                let message = format!("Schema validation failed: {}", errors.join("; "));
                AssertionResult::failure(
                    raw,
                    format!("{} violation(s)", errors.len()),
                    "matches schema".to_string(),
                    message,
                )
            }
        }

        AssertionSpec::Unknown { kind } => {
            AssertionResult::error(raw, AssertError::UnknownKind(kind.clone()))
        }

        AssertionSpec::Invalid { reason, .. } => {
            AssertionResult::error(raw, AssertError::InvalidSyntax(reason.clone()))
        }
    }
}
