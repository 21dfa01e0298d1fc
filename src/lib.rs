pub mod assertion;
pub mod case;
pub mod config;
pub mod error;
pub mod http;
pub mod logger;
pub mod runner;
pub mod variable;

// Re-export commonly used types
pub use case::{CaseFilter, CaseLoader, TestCaseRecord};
pub use error::{Result, RucaseError};
pub use runner::{Executor, RunReport, RunSettings};
pub use variable::VariablePool;
