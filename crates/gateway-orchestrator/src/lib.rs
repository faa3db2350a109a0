pub mod company_intel;
pub mod context;
pub mod invoker;
pub mod orchestrator;

pub use company_intel::{CompanyIntelLoader, CompanyIntelLookup, Freshness};
pub use invoker::{CallOutcome, ProviderInvoker};
pub use orchestrator::Orchestrator;
