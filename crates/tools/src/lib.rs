//! Built-in tools for Tollgate.
//!
//! Thin leaf capabilities the orchestration loop can call: the clock, the
//! caller's identity, a sandboxed scratch directory, and URL fetching.
//! Destructive scratch operations require human confirmation.

pub mod scratch;
pub mod utility;
pub mod web;

use std::path::PathBuf;

use tollgate_core::error::ToolError;
use tollgate_core::tool::{ToolDefinition, ToolRegistry};

pub use scratch::ScratchSpace;

/// Create a registry with every built-in tool, file tools rooted at `scratch_dir`.
pub fn default_registry(scratch_dir: impl Into<PathBuf>) -> Result<ToolRegistry, ToolError> {
    let space = ScratchSpace::new(scratch_dir);
    let mut registry = ToolRegistry::new();

    registry.register(utility::current_datetime())?;
    registry.register(utility::conversation_info())?;

    registry.register_tool(scratch::WriteFileTool::new(space.clone()))?;
    registry.register_tool(scratch::ReadFileTool::new(space.clone()))?;
    registry.register_tool(scratch::ListFilesTool::new(space.clone()))?;
    registry.register_tool(scratch::DeleteFileTool::new(space.clone()))?;
    registry.register_tool(scratch::WipeScratchTool::new(space))?;

    registry.register(ToolDefinition::from_tool(web::FetchUrlTool::new()?))?;

    Ok(registry)
}
