pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod llm;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use discovery::{
    DiscoveryContext, DiscoveryEvent, DiscoveryOrchestrator, DiscoveryReport, DiscoveryRequest,
    DiscoveryStatus, DiscoverySummary, launch,
};
pub use error::{DiscoveryError, GenerationError};
pub use store::{MemoryResultStore, ResultStore};
