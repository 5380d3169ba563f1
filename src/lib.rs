pub mod agent;
pub mod cache;
pub mod cli;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod logging;
pub mod network;
pub mod provenance;
pub mod reference;
pub mod runner;

// Re-export commonly used types
pub use config::Config;
pub use error::HierarchyEvalError;
pub use runner::Runner;
