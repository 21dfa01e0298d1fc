mod evaluator;
mod extractor;
mod parser;
/// 断言模块 - 提供 API 响应断言能力
mod types;

pub use evaluator::{all_passed, evaluate_all, evaluate_assertion};
pub use extractor::{JsonPath, PathSegment, display_value, query_json};
pub use parser::{parse_assertion, parse_assertion_row};
pub use types::{AssertError, AssertionResult, AssertionSpec, CompareOp};
