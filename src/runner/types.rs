use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use crate::assertion::AssertionResult;
use crate::case::TestCaseRecord;
use crate::runner::planner::UnresolvedReason;
use crate::variable::ExtractionError;

/// 用例状态机：
/// `pending → waiting_on_dependency → running → (passed | failed | error | skipped)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    WaitingOnDependency,
    Running,
    Passed,
    Failed,
    Error,
    Skipped,
}

impl CaseStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CaseStatus::Passed | CaseStatus::Failed | CaseStatus::Error | CaseStatus::Skipped
        )
    }

    /// 合法的状态迁移
    pub fn can_transition_to(self, next: CaseStatus) -> bool {
        use CaseStatus::*;
        match (self, next) {
            // 运行前即可终止：前置未通过，或运行被中止
            (Pending, WaitingOnDependency | Running | Skipped | Error) => true,
            (WaitingOnDependency, Running | Skipped | Error) => true,
            // 在执行前即可确定的结果（变量缺失）也经由 running 落定
            (Running, Passed | Failed | Error | Skipped) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CaseStatus::Pending => "pending",
            CaseStatus::WaitingOnDependency => "waiting_on_dependency",
            CaseStatus::Running => "running",
            CaseStatus::Passed => "passed",
            CaseStatus::Failed => "failed",
            CaseStatus::Error => "error",
            CaseStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 用例未通过的原因
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// 前置用例不存在或已禁用
    UnresolvedPrerequisite {
        prerequisite: String,
        reason: UnresolvedReason,
    },
    /// 前置链中的用例未通过
    PrerequisiteNotPassed {
        prerequisite: String,
        status: CaseStatus,
    },
    /// 占位符引用了未定义的变量，请求未发送
    VariableResolution { field: String, variable: String },
    /// 瞬时故障重试耗尽
    TransientNetwork { last: String, attempts: u32 },
    /// 不可重试的传输错误
    Transport { message: String },
    InvalidRequest { message: String },
    AssertionFailure { failed: usize, total: usize },
    /// 执行任务异常退出
    Aborted { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::UnresolvedPrerequisite {
                prerequisite,
                reason,
            } => {
                let detail = match reason {
                    UnresolvedReason::Missing => "does not exist",
                    UnresolvedReason::Disabled => "is disabled",
                };
                write!(f, "unresolved prerequisite: '{}' {}", prerequisite, detail)
            }
            FailureReason::PrerequisiteNotPassed {
                prerequisite,
                status,
            } => write!(f, "prerequisite '{}' did not pass ({})", prerequisite, status),
            FailureReason::VariableResolution { field, variable } => write!(
                f,
                "variable '{}' referenced in {} is not defined",
                variable, field
            ),
            FailureReason::TransientNetwork { last, attempts } => write!(
                f,
                "transient failure after {} attempt(s): {}",
                attempts, last
            ),
            FailureReason::Transport { message } => write!(f, "transport error: {}", message),
            FailureReason::InvalidRequest { message } => write!(f, "invalid request: {}", message),
            FailureReason::AssertionFailure { failed, total } => {
                write!(f, "{} of {} assertion(s) failed", failed, total)
            }
            FailureReason::Aborted { message } => write!(f, "aborted: {}", message),
        }
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// 单条用例的执行结果，用例落定后不再修改
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub case_id: String,
    pub name: Option<String>,
    pub module: Option<String>,
    pub method: String,
    /// 实际请求的 URL（未构建请求时为空）
    pub url: Option<String>,
    pub status: CaseStatus,
    pub http_status: Option<u16>,
    pub assertions: Vec<AssertionResult>,
    /// 写入变量池的变量
    pub extracted: BTreeMap<String, Value>,
    pub extraction_errors: Vec<ExtractionError>,
    pub retries: u32,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub failure: Option<FailureReason>,
}

impl ExecutionResult {
    pub fn new(record: &TestCaseRecord) -> Self {
        Self {
            case_id: record.id.clone(),
            name: record.name.clone(),
            module: record.module.clone(),
            method: record.method.to_string(),
            url: None,
            status: CaseStatus::Pending,
            http_status: None,
            assertions: Vec::new(),
            extracted: BTreeMap::new(),
            extraction_errors: Vec::new(),
            retries: 0,
            duration: Duration::ZERO,
            started_at: Utc::now(),
            failure: None,
        }
    }

    pub fn skipped(record: &TestCaseRecord, reason: FailureReason) -> Self {
        Self::new(record).finish(CaseStatus::Skipped, Some(reason))
    }

    pub fn finish(mut self, status: CaseStatus, failure: Option<FailureReason>) -> Self {
        self.status = status;
        self.failure = failure;
        self
    }
}

/// 运行摘要
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    pub total_assertions: usize,
    pub passed_assertions: usize,
    pub failed_assertions: usize,
}

impl RunSummary {
    /// `duration` 为整个运行的墙钟耗时，并发时小于各用例耗时之和
    pub fn from_results(results: &[ExecutionResult], duration: Duration) -> Self {
        let count = |status: CaseStatus| results.iter().filter(|r| r.status == status).count();

        // 统计断言
        let total_assertions = results.iter().map(|r| r.assertions.len()).sum();
        let passed_assertions = results
            .iter()
            .flat_map(|r| &r.assertions)
            .filter(|a| a.passed)
            .count();

        Self {
            total: results.len(),
            passed: count(CaseStatus::Passed),
            failed: count(CaseStatus::Failed),
            errors: count(CaseStatus::Error),
            skipped: count(CaseStatus::Skipped),
            duration,
            total_assertions,
            passed_assertions,
            failed_assertions: total_assertions - passed_assertions,
        }
    }

    /// 没有失败或出错的用例（跳过不计入失败）
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }
}

/// 一次运行的完整报告
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// 按输入顺序排列
    pub results: Vec<ExecutionResult>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn result(&self, case_id: &str) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.case_id == case_id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
