use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::Result;
use crate::assertion::{all_passed, evaluate_all};
use crate::case::TestCaseRecord;
use crate::config::RunConfig;
use crate::http::{Client, HttpTransport, Request, TransportError};
use crate::runner::flight::SingleFlight;
use crate::runner::planner::{DependencyResolver, ExecutionPlan};
use crate::runner::retry::{RetryFailure, RetryPolicy};
use crate::runner::types::{CaseStatus, ExecutionResult, FailureReason, RunReport, RunSummary};
use crate::variable::{VariablePool, VariableResolver, extract_all};

/// 执行参数
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub base_url: Option<String>,
    /// 并发 worker 数，1 表示严格串行
    pub workers: usize,
    pub timeout: Duration,
    /// 默认请求头，用例自身的同名请求头优先
    pub default_headers: Vec<(String, String)>,
    pub retry: RetryPolicy,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

impl From<&RunConfig> for RunSettings {
    fn from(config: &RunConfig) -> Self {
        let mut default_headers: Vec<(String, String)> = config
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        default_headers.sort();

        Self {
            base_url: config.base_url.clone(),
            workers: config.workers.max(1),
            timeout: Duration::from_millis(config.timeout_ms),
            default_headers,
            retry: RetryPolicy::from(&config.retry),
        }
    }
}

impl RunSettings {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((key.into(), value.into()));
        self
    }
}

/// 用例执行器
///
/// 按执行计划驱动所有用例：每条用例先等待前置链全部落定，再在 worker
/// 许可内完成替换、发送（含重试）、断言和变量提取。被多条用例依赖的前置
/// 用例按 ID 单次执行，依赖方共享同一结果。
pub struct Executor {
    transport: Arc<dyn HttpTransport>,
    settings: RunSettings,
}

impl Executor {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: RunSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// 使用默认 reqwest 客户端
    pub fn with_http_client(settings: RunSettings) -> Result<Self> {
        Ok(Self::new(Arc::new(Client::new()?), settings))
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// 执行一次完整运行
    ///
    /// 依赖环或重复 ID 在执行前返回错误，此时不会发出任何请求。
    /// 结果按输入顺序排列，禁用的记录不出现在结果中。
    pub async fn run(&self, records: Vec<TestCaseRecord>, pool: VariablePool) -> Result<RunReport> {
        self.run_with_id(Uuid::new_v4(), records, pool).await
    }

    #[instrument(
        name = "run",
        skip(self, records, pool),
        fields(run_id = %run_id, records = records.len())
    )]
    async fn run_with_id(
        &self,
        run_id: Uuid,
        records: Vec<TestCaseRecord>,
        pool: VariablePool,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let plan = DependencyResolver::resolve(&records)?;

        let input_order: Vec<String> = records
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.id.clone())
            .collect();
        let disabled = records.len() - input_order.len();
        if disabled > 0 {
            debug!(disabled, "disabled records excluded from run");
        }

        let ctx = Arc::new(RunContext::new(
            records,
            plan,
            pool,
            self.transport.clone(),
            self.settings.clone(),
        ));
        info!(
            cases = input_order.len(),
            workers = ctx.settings.workers,
            "starting run"
        );

        let mut tasks = JoinSet::new();
        for id in ctx.plan.order().to_vec() {
            let ctx = ctx.clone();
            tasks.spawn(async move { run_case(&ctx, &id).await });
        }

        let mut finished: HashMap<String, ExecutionResult> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(result)) => {
                    finished.insert(result.case_id.clone(), result);
                }
                Ok(None) => {}
                Err(e) => error!("case task aborted: {}", e),
            }
        }

        let results: Vec<ExecutionResult> = input_order
            .iter()
            .filter_map(|id| {
                finished
                    .remove(id)
                    .or_else(|| ctx.flights.get(id))
                    .or_else(|| {
                        ctx.records.get(id).map(|record| {
                            let message =
                                format!("case did not complete (last state: {})", ctx.status(id));
                            ExecutionResult::new(record)
                                .finish(CaseStatus::Error, Some(FailureReason::Aborted { message }))
                        })
                    })
            })
            .collect();

        let summary = RunSummary::from_results(&results, clock.elapsed());
        info!(
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            errors = summary.errors,
            skipped = summary.skipped,
            duration_ms = summary.duration.as_millis() as u64,
            "run finished"
        );

        Ok(RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            results,
            summary,
        })
    }
}

/// 一次运行内所有任务共享的状态
struct RunContext {
    records: HashMap<String, TestCaseRecord>,
    plan: ExecutionPlan,
    pool: VariablePool,
    flights: SingleFlight<ExecutionResult>,
    states: Mutex<HashMap<String, CaseStatus>>,
    permits: Semaphore,
    transport: Arc<dyn HttpTransport>,
    settings: RunSettings,
}

impl RunContext {
    fn new(
        records: Vec<TestCaseRecord>,
        plan: ExecutionPlan,
        pool: VariablePool,
        transport: Arc<dyn HttpTransport>,
        settings: RunSettings,
    ) -> Self {
        let records: HashMap<String, TestCaseRecord> = records
            .into_iter()
            .filter(|r| r.enabled)
            .map(|r| (r.id.clone(), r))
            .collect();
        let states = records
            .keys()
            .map(|id| (id.clone(), CaseStatus::Pending))
            .collect();

        Self {
            records,
            plan,
            pool,
            flights: SingleFlight::new(),
            states: Mutex::new(states),
            permits: Semaphore::new(settings.workers.max(1)),
            transport,
            settings,
        }
    }

    /// 当前状态；前置用例是否可依赖以此为准
    fn status(&self, id: &str) -> CaseStatus {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.get(id).copied().unwrap_or(CaseStatus::Pending)
    }

    /// 状态迁移；非法迁移（例如已被其他任务推进）直接忽略
    fn transition(&self, id: &str, next: CaseStatus) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let current = states.entry(id.to_string()).or_insert(CaseStatus::Pending);
        if current.can_transition_to(next) {
            debug!(case_id = %id, from = %current, to = %next, "state transition");
            *current = next;
        }
    }
}

/// 依次落定前置链，再执行用例本身；每一步都经过单次执行注册表
async fn run_case(ctx: &RunContext, id: &str) -> Option<ExecutionResult> {
    let chain = ctx.plan.chain(id);
    if !chain.is_empty() {
        ctx.transition(id, CaseStatus::WaitingOnDependency);
    }

    // 前置链按完成顺序排列：执行 chain[i] 时 chain[..i] 已全部落定
    for prerequisite in &chain {
        if let Some(record) = ctx.records.get(prerequisite) {
            ctx.flights
                .run(prerequisite, || execute_case(ctx, record))
                .await;
        }
    }

    let record = ctx.records.get(id)?;
    Some(ctx.flights.run(id, || execute_case(ctx, record)).await)
}

#[instrument(name = "case", skip(ctx, record), fields(case_id = %record.id))]
async fn execute_case(ctx: &RunContext, record: &TestCaseRecord) -> ExecutionResult {
    let id = record.id.as_str();

    if let Some(unresolved) = ctx.plan.unresolved(id) {
        ctx.transition(id, CaseStatus::Skipped);
        let reason = FailureReason::UnresolvedPrerequisite {
            prerequisite: unresolved.prerequisite.clone(),
            reason: unresolved.reason,
        };
        warn!("skipped: {}", reason);
        return ExecutionResult::skipped(record, reason);
    }

    for prerequisite in ctx.plan.chain(id) {
        let status = ctx.status(&prerequisite);
        if status != CaseStatus::Passed {
            ctx.transition(id, CaseStatus::Skipped);
            let reason = FailureReason::PrerequisiteNotPassed {
                prerequisite,
                status,
            };
            warn!("skipped: {}", reason);
            return ExecutionResult::skipped(record, reason);
        }
    }

    let _permit = match ctx.permits.acquire().await {
        Ok(permit) => permit,
        Err(e) => {
            ctx.transition(id, CaseStatus::Error);
            return ExecutionResult::new(record).finish(
                CaseStatus::Error,
                Some(FailureReason::Aborted {
                    message: e.to_string(),
                }),
            );
        }
    };

    ctx.transition(id, CaseStatus::Running);
    let started = Instant::now();
    let mut result = ExecutionResult::new(record);
    let (status, failure) = attempt_case(ctx, record, &mut result).await;
    result.duration = started.elapsed();
    ctx.transition(id, status);

    match &failure {
        None => info!(
            duration_ms = result.duration.as_millis() as u64,
            retries = result.retries,
            "passed"
        ),
        Some(reason) => info!(
            status = %status,
            duration_ms = result.duration.as_millis() as u64,
            "{}",
            reason
        ),
    }

    result.finish(status, failure)
}

/// 替换 → 发送（重试）→ 断言 → 提取
async fn attempt_case(
    ctx: &RunContext,
    record: &TestCaseRecord,
    result: &mut ExecutionResult,
) -> (CaseStatus, Option<FailureReason>) {
    let snapshot = ctx.pool.snapshot();
    let resolved = match VariableResolver::resolve_request(record, &snapshot) {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!("{}", e);
            return (
                CaseStatus::Error,
                Some(FailureReason::VariableResolution {
                    field: e.field,
                    variable: e.variable,
                }),
            );
        }
    };
    debug!(path = %resolved.path, "placeholders substituted");

    let url = match build_url(ctx.settings.base_url.as_deref(), &resolved.path) {
        Ok(url) => url,
        Err(message) => {
            return (CaseStatus::Error, Some(FailureReason::InvalidRequest { message }));
        }
    };
    let mut request = match Request::new(record.method, &url) {
        Ok(request) => request,
        Err(e) => {
            return (
                CaseStatus::Error,
                Some(FailureReason::InvalidRequest {
                    message: e.to_string(),
                }),
            );
        }
    };

    for (key, value) in ctx.settings.default_headers.iter().chain(&resolved.headers) {
        request.insert_header(key, value);
    }
    for (key, value) in &resolved.params {
        request = request.with_query(key, value);
    }
    request = match resolved.body {
        Some(_) if !record.method.allows_body() => {
            debug!(method = %record.method, "body ignored for method without a request body");
            request
        }
        Some(Value::String(text)) => request.with_text(&text),
        Some(body) => request.with_json(body),
        None => request,
    };
    let timeout = record
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(ctx.settings.timeout);
    request = request.with_timeout(timeout);
    result.url = Some(request.full_url().to_string());

    let outcome = ctx
        .settings
        .retry
        .execute(|| ctx.transport.execute(&request))
        .await;
    result.retries = outcome.retries;

    let response = match outcome.result {
        Ok(response) => response,
        Err(RetryFailure::Exhausted { last, response }) => {
            result.http_status = response.map(|r| r.status.code());
            return (
                CaseStatus::Failed,
                Some(FailureReason::TransientNetwork {
                    last,
                    attempts: outcome.retries + 1,
                }),
            );
        }
        Err(RetryFailure::Fatal(TransportError::InvalidRequest(message))) => {
            return (CaseStatus::Error, Some(FailureReason::InvalidRequest { message }));
        }
        Err(RetryFailure::Fatal(e)) => {
            return (
                CaseStatus::Error,
                Some(FailureReason::Transport {
                    message: e.to_string(),
                }),
            );
        }
    };
    result.http_status = Some(response.status.code());
    debug!(
        status = %response.status,
        success = response.is_success(),
        "response received"
    );

    result.assertions = evaluate_all(&record.assertions, &response);
    if !all_passed(&result.assertions) {
        let failed = result.assertions.iter().filter(|a| !a.passed).count();
        return (
            CaseStatus::Failed,
            Some(FailureReason::AssertionFailure {
                failed,
                total: result.assertions.len(),
            }),
        );
    }

    // 提取结果在本用例落定之前写入变量池，依赖方替换时一定可见
    let extraction = extract_all(&record.extract, &response);
    for (name, value) in &extraction.values {
        ctx.pool.set(name.clone(), value.clone());
    }
    for e in &extraction.errors {
        warn!("{}", e);
    }
    result.extracted = extraction.values;
    result.extraction_errors = extraction.errors;

    (CaseStatus::Passed, None)
}

/// 绝对 URL 原样使用，否则拼接到 base URL 之后
fn build_url(base_url: Option<&str>, path: &str) -> std::result::Result<String, String> {
    let path = path.trim();
    if path.starts_with("http://") || path.starts_with("https://") {
        return Ok(path.to_string());
    }

    let base = base_url
        .map(|b| b.trim().trim_end_matches('/'))
        .filter(|b| !b.is_empty())
        .ok_or_else(|| format!("relative path '{}' requires a base URL", path))?;

    if path.is_empty() {
        Ok(base.to_string())
    } else {
        Ok(format!("{}/{}", base, path.trim_start_matches('/')))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::AssertionSpec;
    use crate::http::{Method, Response};
    use async_trait::async_trait;
    use reqwest::header::HeaderMap;

    /// 所有请求都返回 200 空对象
    struct EmptyOk;

    #[async_trait]
    impl HttpTransport for EmptyOk {
        async fn execute(
            &self,
            _request: &Request,
        ) -> std::result::Result<Response, TransportError> {
            Ok(Response::new(200, HeaderMap::new(), "{}".to_string(), Duration::ZERO).unwrap())
        }
    }

    #[tokio::test]
    async fn test_final_states_match_results() {
        let records = vec![
            TestCaseRecord::new("ok", Method::Get, "/ok"),
            TestCaseRecord::new("bad", Method::Get, "/bad").with_assertion(AssertionSpec::status(201)),
            TestCaseRecord::new("after_bad", Method::Get, "/after").with_prerequisite("bad"),
            TestCaseRecord::new("orphan", Method::Get, "/orphan").with_prerequisite("missing"),
            TestCaseRecord::new("after_ok", Method::Get, "/after-ok").with_prerequisite("ok"),
        ];
        let plan = DependencyResolver::resolve(&records).unwrap();
        let settings = RunSettings::default()
            .with_base_url("http://mock.local")
            .with_retry(RetryPolicy::none());
        let ctx = RunContext::new(records, plan, VariablePool::new(), Arc::new(EmptyOk), settings);

        assert_eq!(ctx.status("ok"), CaseStatus::Pending);

        for id in ctx.plan.order().to_vec() {
            let result = run_case(&ctx, &id).await.unwrap();
            assert_eq!(ctx.status(&id), result.status, "{}", id);
        }

        assert_eq!(ctx.status("ok"), CaseStatus::Passed);
        assert_eq!(ctx.status("bad"), CaseStatus::Failed);
        assert_eq!(ctx.status("after_bad"), CaseStatus::Skipped);
        assert_eq!(ctx.status("orphan"), CaseStatus::Skipped);
        assert_eq!(ctx.status("after_ok"), CaseStatus::Passed);
    }

    #[test]
    fn test_build_url() {
        assert_eq!(
            build_url(Some("http://localhost:8080/"), "/users/1").unwrap(),
            "http://localhost:8080/users/1"
        );
        assert_eq!(
            build_url(Some("http://localhost:8080/api"), "users").unwrap(),
            "http://localhost:8080/api/users"
        );
        assert_eq!(
            build_url(None, "https://example.com/health").unwrap(),
            "https://example.com/health"
        );
        assert_eq!(
            build_url(Some("http://localhost"), "").unwrap(),
            "http://localhost"
        );
        assert!(build_url(None, "/users").is_err());
        assert!(build_url(Some("  "), "/users").is_err());
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = RunConfig::default();
        config.workers = 0;
        config.headers.insert("b".to_string(), "2".to_string());
        config.headers.insert("a".to_string(), "1".to_string());

        let settings = RunSettings::from(&config);
        assert_eq!(settings.workers, 1);
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert_eq!(settings.retry.max_retries, 3);
        assert_eq!(
            settings.default_headers,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
    }
}
