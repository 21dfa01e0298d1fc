/// 用例模块 - 用例记录、文件加载与筛选
pub mod filter;
pub mod loader;
pub mod types;

pub use filter::CaseFilter;
pub use loader::CaseLoader;
pub use types::TestCaseRecord;
