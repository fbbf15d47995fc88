//! Model gateway implementations for Tollgate.
//!
//! All gateways implement the `tollgate_core::ModelGateway` trait.

pub mod anthropic;

pub use anthropic::AnthropicGateway;
