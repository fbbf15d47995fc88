//! Small utility tools that need no state: the clock and the caller's identity.

use chrono::{DateTime, Datelike, Utc};
use serde_json::{Value, json};
use tollgate_core::tool::{ToolContext, ToolDefinition, ToolResult};

const CATEGORY: &str = "utility";

/// `get_current_datetime`: the current UTC date and time.
pub fn current_datetime() -> ToolDefinition {
    ToolDefinition::new(
        "get_current_datetime",
        "Get the current date, time, and day of the week (UTC).",
        |_args: Value, _ctx: Option<ToolContext>| async move {
            Ok(ToolResult::ok(describe_instant(Utc::now())))
        },
    )
    .with_category(CATEGORY)
}

fn describe_instant(now: DateTime<Utc>) -> Value {
    json!({
        "iso": now.to_rfc3339(),
        "date": now.format("%Y-%m-%d").to_string(),
        "time": now.format("%H:%M:%S").to_string(),
        "day_of_week": now.weekday().to_string(),
        "timezone": "UTC",
        "unix": now.timestamp(),
    })
}

/// `get_conversation_info`: who is asking, and from where.
pub fn conversation_info() -> ToolDefinition {
    ToolDefinition::new(
        "get_conversation_info",
        "Get information about the current conversation: the user, the channel the \
         message came from, and the conversation id.",
        |_args: Value, ctx: Option<ToolContext>| async move {
            let ctx = ctx.unwrap_or_default();
            Ok(ToolResult::ok(json!({
                "user_id": ctx.user_id,
                "source_channel": ctx.source_channel,
                "reply_channel": ctx.reply_channel,
                "conversation_id": ctx.conversation_id,
            })))
        },
    )
    .with_category(CATEGORY)
    .with_context()
}
