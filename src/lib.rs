pub mod config;
pub mod contract;
pub mod errors;
pub mod graph;
pub mod key;
pub mod logging;
pub mod manifest;

// Re-export commonly used items for convenience
pub use config::ResolverConfig;
pub use contract::{CompatibilityIssue, Contract, ContractBuilder};
pub use errors::{ConfigError, ContractError, ManifestError, WireError};
pub use graph::{Application, BuildContext, Precedence, BindingLevel};
pub use key::Key;
pub use manifest::Manifest;
