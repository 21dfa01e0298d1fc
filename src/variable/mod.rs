pub mod capture;
pub mod pool;
pub mod resolver;
pub mod types;

pub use capture::{CaptureSource, Extraction, ExtractionError, VariableCapture, extract_all};
pub use pool::VariablePool;
pub use resolver::{ResolvedRequest, SubstitutionError, VariableResolver};
pub use types::VariableContext;
