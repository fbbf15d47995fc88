//! Human-readable summaries of pending tool invocations.
//!
//! A confirmation prompt shows the person approving the action what is about
//! to happen. Tools may register their own formatter; these helpers cover the
//! fallback and the formatting bits tool formatters share.

use chrono::DateTime;
use serde_json::Value;

/// Truncation limit for large text fields in summaries.
pub const MAX_FIELD_CHARS: usize = 200;

/// Truncate `text` to `limit` characters, appending `…` when cut.
pub fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// Summary used when a tool has no formatter of its own.
pub fn generic_summary(tool_name: &str, description: &str, args: &Value) -> String {
    let params = serde_json::to_string(args).unwrap_or_else(|_| args.to_string());
    format!(
        "{tool_name}\n{description}\nParams: {}",
        truncate(&params, MAX_FIELD_CHARS)
    )
}

/// Convert common five-field cron expressions to plain English.
///
/// Anything not recognized is returned unchanged.
pub fn humanize_cron(expr: &str) -> String {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    let [minute, hour, dom, month, dow] = parts.as_slice() else {
        return expr.to_string();
    };
    let every_day = *dom == "*" && *month == "*";
    let fixed_time = minute.parse::<u32>().ok().zip(hour.parse::<u32>().ok());

    if every_day {
        if let Some((m, h)) = fixed_time {
            match *dow {
                "*" => return format!("Daily at {}", format_time(h, m)),
                "1-5" => return format!("Weekdays at {}", format_time(h, m)),
                "0,6" | "6,0" => return format!("Weekends at {}", format_time(h, m)),
                _ => {}
            }
        }
    }

    if every_day && *dow == "*" {
        if let Some(n) = step(minute) {
            if *hour == "*" {
                return format!("Every {n} minute{}", plural(n));
            }
        }
        if let Some(n) = step(hour) {
            if *minute == "0" {
                return format!("Every {n} hour{}", plural(n));
            }
        }
    }

    expr.to_string()
}

/// Render an RFC 3339 timestamp as e.g. `Feb 13, 2026 at 2:00 PM +00:00`.
///
/// Unparseable input is returned unchanged.
pub fn humanize_datetime(iso: &str) -> String {
    match DateTime::parse_from_rfc3339(iso) {
        Ok(dt) => format!("{} {}", dt.format("%b %-d, %Y at %-I:%M %p"), dt.format("%:z")),
        Err(_) => iso.to_string(),
    }
}

fn step(field: &str) -> Option<u32> {
    field.strip_prefix("*/")?.parse().ok()
}

fn plural(n: u32) -> &'static str {
    if n == 1 { "" } else { "s" }
}

fn format_time(hour: u32, minute: u32) -> String {
    let period = if hour < 12 { "AM" } else { "PM" };
    let display_hour = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{display_hour}:{minute:02} {period}")
}
