//! 人物发现：从一段自我描述出发，检索并调研身份相近的历史人物

pub mod agents;
pub mod claims;
pub mod context;
pub mod orchestrator;
pub mod sampler;
pub mod step_forward_agent;
pub mod stream;
pub mod types;
pub mod workflow;

pub use context::DiscoveryContext;
pub use orchestrator::DiscoveryOrchestrator;
pub use stream::{DiscoveryRun, FigureStream};
pub use types::{
    DiscoveryEvent, DiscoveryReport, DiscoveryRequest, DiscoveryStatus, DiscoverySummary,
    EmptyReason, FigureSource, FigureUpdate,
};
pub use workflow::launch;
