//! Tools: definitions, the handler contract, and the registry.
//!
//! A tool is a name, a description for the model, a parameter schema, and an
//! async handler. The registry is built once at startup and handed to the
//! orchestration loop by reference; it is the only place tool names resolve.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ToolError;
use crate::gateway::ToolSchema;
use crate::schema::ParamSchema;
use crate::summary::generic_summary;

/// Category used when a registrant does not pick one.
pub const DEFAULT_CATEGORY: &str = "general";

/// Who and where an invocation came from.
///
/// Only handed to handlers registered with `wants_context`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolContext {
    pub user_id: Option<String>,
    pub source_channel: Option<String>,
    pub reply_channel: Option<String>,
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

/// Handler output, success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,

    /// Tool-specific payload
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,

    /// Present iff `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error_message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error_message: Some(message.into()),
        }
    }

    pub fn from_error(err: &ToolError) -> Self {
        Self::failure(err.to_string())
    }

    /// Serialized form placed in the tool-result message the model reads.
    pub fn to_content(&self) -> String {
        if let Some(err) = &self.error_message {
            return serde_json::json!({ "error": err }).to_string();
        }
        match &self.data {
            Value::Null => "{}".to_string(),
            data => data.to_string(),
        }
    }
}

impl From<ToolError> for ToolResult {
    fn from(err: ToolError) -> Self {
        Self::from_error(&err)
    }
}

pub type HandlerResult = std::result::Result<ToolResult, ToolError>;

/// The executable half of a tool.
///
/// Receives validated arguments and, if the tool asked for it, the caller's
/// context. Any async closure `Fn(Value, Option<ToolContext>) -> impl Future`
/// is a handler.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, arguments: Value, context: Option<ToolContext>) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Value, Option<ToolContext>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn invoke(&self, arguments: Value, context: Option<ToolContext>) -> HandlerResult {
        (self)(arguments, context).await
    }
}

/// A stateful tool implemented as a type.
///
/// Tools that hold a client or a sandbox root implement this and register
/// through [`ToolRegistry::register_tool`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value {
        ParamSchema::empty().as_value().clone()
    }

    fn category(&self) -> &str {
        DEFAULT_CATEGORY
    }

    fn requires_confirmation(&self) -> bool {
        false
    }

    fn wants_context(&self) -> bool {
        false
    }

    /// Confirmation prompt text for these arguments; `None` uses the generic one.
    fn summarize(&self, _arguments: &Value) -> Option<String> {
        None
    }

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, arguments: Value, context: Option<ToolContext>) -> HandlerResult;
}

struct ToolAdapter<T>(Arc<T>);

#[async_trait]
impl<T: Tool + 'static> ToolHandler for ToolAdapter<T> {
    async fn invoke(&self, arguments: Value, context: Option<ToolContext>) -> HandlerResult {
        self.0.execute(arguments, context).await
    }
}

pub type SummaryFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Everything the registry knows about one tool. Immutable once registered.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ParamSchema,
    pub category: String,
    pub requires_confirmation: bool,
    pub wants_context: bool,
    pub handler: Arc<dyn ToolHandler>,
    summary: Option<SummaryFn>,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ParamSchema::empty(),
            category: DEFAULT_CATEGORY.to_string(),
            requires_confirmation: false,
            wants_context: false,
            handler: Arc::new(handler),
            summary: None,
        }
    }

    /// Build a definition from a [`Tool`] implementation.
    pub fn from_tool<T: Tool + 'static>(tool: T) -> Self {
        let tool = Arc::new(tool);
        let for_summary = Arc::clone(&tool);
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: ParamSchema::new(tool.parameters_schema()),
            category: tool.category().to_string(),
            requires_confirmation: tool.requires_confirmation(),
            wants_context: tool.wants_context(),
            handler: Arc::new(ToolAdapter(tool)),
            summary: Some(Arc::new(move |args: &Value| {
                for_summary.summarize(args).unwrap_or_else(|| {
                    generic_summary(for_summary.name(), for_summary.description(), args)
                })
            })),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_parameters(mut self, schema: impl Into<ParamSchema>) -> Self {
        self.parameters = schema.into();
        self
    }

    pub fn requiring_confirmation(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    pub fn with_context(mut self) -> Self {
        self.wants_context = true;
        self
    }

    pub fn with_summary(mut self, summary: impl Fn(&Value) -> String + Send + Sync + 'static) -> Self {
        self.summary = Some(Arc::new(summary));
        self
    }

    /// Text shown to whoever approves an invocation with these arguments.
    pub fn summarize(&self, arguments: &Value) -> String {
        match &self.summary {
            Some(f) => f(arguments),
            None => generic_summary(&self.name, &self.description, arguments),
        }
    }

    /// Check raw arguments against the parameter schema.
    pub fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        self.parameters.validate(arguments).map_err(|violations| {
            let reason = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            ToolError::InvalidArguments {
                tool_name: self.name.clone(),
                reason,
            }
        })
    }

    pub fn to_schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.as_value().clone(),
        }
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("requires_confirmation", &self.requires_confirmation)
            .field("wants_context", &self.wants_context)
            .finish_non_exhaustive()
    }
}

/// Name-keyed catalog of tools.
///
/// Iteration order is registration order, so the schema list sent to the
/// model is identical on every call.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<ToolDefinition>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Re-registering a name replaces the old definition in place.
    pub fn register(&mut self, definition: ToolDefinition) -> Result<(), ToolError> {
        if definition.name.trim().is_empty() {
            return Err(ToolError::InvalidArguments {
                tool_name: definition.name,
                reason: "tool name must not be empty".into(),
            });
        }
        if !definition.parameters.is_object_schema() {
            return Err(ToolError::InvalidArguments {
                tool_name: definition.name,
                reason: "parameter schema must describe an object".into(),
            });
        }

        let name = definition.name.clone();
        let definition = Arc::new(definition);
        match self.index.get(&name) {
            Some(&slot) => {
                warn!(tool = %name, "Tool re-registered, replacing previous definition");
                self.tools[slot] = definition;
            }
            None => {
                debug!(tool = %name, "Registered tool");
                self.index.insert(name, self.tools.len());
                self.tools.push(definition);
            }
        }
        Ok(())
    }

    /// Register a [`Tool`] implementation.
    pub fn register_tool<T: Tool + 'static>(&mut self, tool: T) -> Result<(), ToolError> {
        self.register(ToolDefinition::from_tool(tool))
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolDefinition>> {
        self.index.get(name).map(|&slot| Arc::clone(&self.tools[slot]))
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<ToolDefinition>, ToolError> {
        self.get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// Schemas sent with every model call, in registration order.
    pub fn schemas_for_model(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.to_schema()).collect()
    }

    /// Look up, validate, and run in one step.
    ///
    /// Lookup and validation failures come back as `Err`; anything the
    /// handler does wrong comes back as a failed [`ToolResult`].
    pub async fn execute(
        &self,
        name: &str,
        arguments: Value,
        context: Option<ToolContext>,
    ) -> Result<ToolResult, ToolError> {
        let definition = self.lookup(name)?;
        definition.validate(&arguments)?;
        Ok(Self::run(&definition, arguments, context).await)
    }

    /// Run a definition's handler on arguments that were already validated.
    ///
    /// The handler runs in its own task so a panic becomes a failed result.
    /// Dropping the returned future aborts that task. No timeout is applied.
    pub async fn run(
        definition: &ToolDefinition,
        arguments: Value,
        context: Option<ToolContext>,
    ) -> ToolResult {
        let handler = Arc::clone(&definition.handler);
        let context = if definition.wants_context { context } else { None };
        let name = definition.name.clone();

        info!(tool = %name, "Executing tool");
        let started = Instant::now();

        let task = tokio::spawn(async move { handler.invoke(arguments, context).await });
        let _abort = AbortOnDrop(task.abort_handle());
        let outcome = task.await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => ToolResult::from_error(&as_handler_failure(&name, err)),
            Err(join_err) => {
                let reason = if join_err.is_panic() {
                    format!("handler panicked: {}", panic_message(join_err.into_panic()))
                } else {
                    "handler task was cancelled".to_string()
                };
                ToolResult::from_error(&ToolError::ExecutionFailed {
                    tool_name: name.clone(),
                    reason,
                })
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if result.success {
            info!(tool = %name, elapsed_ms, "Tool completed");
        } else {
            warn!(
                tool = %name,
                elapsed_ms,
                error = result.error_message.as_deref().unwrap_or_default(),
                "Tool failed"
            );
        }
        result
    }

    /// All registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Tools grouped by category. Categories and tools keep registration order.
    pub fn by_category(&self) -> Vec<(String, Vec<Arc<ToolDefinition>>)> {
        let mut groups: Vec<(String, Vec<Arc<ToolDefinition>>)> = Vec::new();
        for tool in &self.tools {
            match groups.iter_mut().find(|(category, _)| *category == tool.category) {
                Some((_, members)) => members.push(Arc::clone(tool)),
                None => groups.push((tool.category.clone(), vec![Arc::clone(tool)])),
            }
        }
        groups
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ToolDefinition>> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

struct AbortOnDrop(tokio::task::AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn as_handler_failure(tool_name: &str, err: ToolError) -> ToolError {
    match err {
        ToolError::ExecutionFailed { .. } => err,
        other => ToolError::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason: other.to_string(),
        },
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: Value, _context: Option<ToolContext>) -> HandlerResult {
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            Ok(ToolResult::ok(json!({ "echo": text })))
        }
    }

    fn noop(name: &str) -> ToolDefinition {
        ToolDefinition::new(name, format!("{name} tool"), |_args: Value, _ctx: Option<ToolContext>| async {
            Ok(ToolResult::ok(Value::Null))
        })
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(EchoTool).unwrap();
        assert!(registry.get("echo").is_some());
        assert!(matches!(registry.lookup("nonexistent"), Err(ToolError::NotFound(n)) if n == "nonexistent"));
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut registry = ToolRegistry::new();
        let err = registry.register(noop("  ")).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn non_object_schema_is_rejected() {
        let mut registry = ToolRegistry::new();
        let def = noop("bad").with_parameters(json!({"type": "string"}));
        assert!(registry.register(def).is_err());
    }

    #[test]
    fn schemas_are_stable_and_ordered() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(noop(name)).unwrap();
        }
        let first: Vec<_> = registry.schemas_for_model().into_iter().map(|s| s.name).collect();
        let second: Vec<_> = registry.schemas_for_model().into_iter().map(|s| s.name).collect();
        assert_eq!(first, vec!["zeta", "alpha", "mid"]);
        assert_eq!(first, second);
    }

    #[test]
    fn overwrite_keeps_original_slot() {
        let mut registry = ToolRegistry::new();
        registry.register(noop("a")).unwrap();
        registry.register(noop("b")).unwrap();
        registry
            .register(noop("a").with_category("replaced"))
            .unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("a").unwrap().category, "replaced");
    }

    #[test]
    fn by_category_groups_in_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(noop("read").with_category("files")).unwrap();
        registry.register(noop("now").with_category("utility")).unwrap();
        registry.register(noop("write").with_category("files")).unwrap();
        let groups = registry.by_category();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "files");
        let files: Vec<_> = groups[0].1.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(files, vec!["read", "write"]);
    }

    #[tokio::test]
    async fn execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(EchoTool).unwrap();
        let result = registry
            .execute("echo", json!({"text": "hello world"}), None)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.data["echo"], "hello world");
    }

    #[tokio::test]
    async fn execute_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry.execute("nonexistent", json!({}), None).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let def = ToolDefinition::new("count", "counts", move |_args: Value, _ctx: Option<ToolContext>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(ToolResult::ok(Value::Null)) }
        })
        .with_parameters(json!({
            "type": "object",
            "properties": { "n": { "type": "integer" } },
            "required": ["n"]
        }));
        let mut registry = ToolRegistry::new();
        registry.register(def).unwrap();

        let err = registry.execute("count", json!({"n": "three"}), None).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { ref tool_name, .. } if tool_name == "count"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handler_errors_become_failed_results() {
        let def = ToolDefinition::new("flaky", "fails", |_args: Value, _ctx: Option<ToolContext>| async {
            Err(ToolError::InvalidArguments {
                tool_name: "flaky".into(),
                reason: "upstream said no".into(),
            })
        });
        let result = ToolRegistry::run(&def, json!({}), None).await;
        assert!(!result.success);
        let msg = result.error_message.unwrap();
        assert!(msg.starts_with("Tool 'flaky' failed"));
        assert!(msg.contains("upstream said no"));
    }

    #[tokio::test]
    async fn handler_panics_become_failed_results() {
        let def = ToolDefinition::new("boom", "panics", |_args: Value, _ctx: Option<ToolContext>| async {
            if true {
                panic!("kaboom");
            }
            Ok(ToolResult::ok(Value::Null))
        });
        let result = ToolRegistry::run(&def, json!({}), None).await;
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("kaboom"));
    }

    #[tokio::test]
    async fn context_only_reaches_tools_that_want_it() {
        let seen = |_args: Value, ctx: Option<ToolContext>| async move {
            Ok(ToolResult::ok(json!({ "has_context": ctx.is_some() })))
        };
        let ctx = ToolContext {
            user_id: Some("u1".into()),
            ..Default::default()
        };

        let plain = ToolDefinition::new("plain", "no context", seen);
        let result = ToolRegistry::run(&plain, json!({}), Some(ctx.clone())).await;
        assert_eq!(result.data["has_context"], false);

        let wants = ToolDefinition::new("wants", "context", seen).with_context();
        let result = ToolRegistry::run(&wants, json!({}), Some(ctx)).await;
        assert_eq!(result.data["has_context"], true);
    }

    #[test]
    fn summaries_fall_back_to_generic() {
        let def = noop("delete_file");
        let summary = def.summarize(&json!({"path": "notes.txt"}));
        assert!(summary.starts_with("delete_file\n"));
        assert!(summary.contains("notes.txt"));

        let custom = noop("delete_file").with_summary(|args| format!("Delete {}", args["path"]));
        assert_eq!(custom.summarize(&json!({"path": "a"})), "Delete \"a\"");
    }

    #[test]
    fn result_content_shapes() {
        assert_eq!(ToolResult::failure("denied").to_content(), r#"{"error":"denied"}"#);
        assert_eq!(ToolResult::ok(Value::Null).to_content(), "{}");
        assert_eq!(ToolResult::ok(json!({"n": 1})).to_content(), r#"{"n":1}"#);
    }
}
