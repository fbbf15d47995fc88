//! # Tollgate Core
//!
//! Domain types, traits, and error definitions for the Tollgate agent.
//! This crate has **no framework dependencies**: it defines the contracts
//! that the orchestration loop, the model gateways, and the tools are
//! written against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the loop is a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping the model backend without touching the loop
//! - Easy testing with scripted gateways and stub tools
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod gateway;
pub mod message;
pub mod schema;
pub mod summary;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, GatewayError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use gateway::{GatewayRequest, ModelGateway, Segment, ToolInvocationRequest, ToolSchema, Usage};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use schema::{ParamSchema, SchemaViolation};
pub use tool::{Tool, ToolContext, ToolDefinition, ToolHandler, ToolRegistry, ToolResult};
