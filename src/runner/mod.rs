pub mod executor;
pub mod flight;
pub mod planner;
pub mod reporter;
pub mod retry;
pub mod types;

pub use executor::{Executor, RunSettings};
pub use flight::SingleFlight;
pub use planner::{
    DependencyResolver, ExecutionPlan, ResolveError, UnresolvedPrerequisite, UnresolvedReason,
};
pub use reporter::TestReporter;
pub use retry::{Backoff, RetryFailure, RetryOutcome, RetryPolicy};
pub use types::{CaseStatus, ExecutionResult, FailureReason, RunReport, RunSummary};
