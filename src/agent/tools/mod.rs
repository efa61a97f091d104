//! Tool registry for agent capabilities.

mod registry;

pub use registry::{
    AgentTool, CheckpointMode, ToolContext, ToolDefinition, ToolError, ToolRegistry,
};
