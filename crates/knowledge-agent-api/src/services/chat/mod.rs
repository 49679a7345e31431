pub mod agent;
pub mod permission;
pub mod prompt;
pub mod service;
pub mod tools;

pub use agent::ChatAgent;
pub use permission::PermissionFilter;
pub use service::ChatService;
pub use tools::{AgentTool, ToolRegistry};
