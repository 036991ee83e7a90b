pub mod loader;
pub mod types;

pub use loader::{load_config, ServiceEndpoint};
pub use types::OrchestratorConfig;
