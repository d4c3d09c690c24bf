//! Event rendering
//!
//! Five formats: `console` and `file` are human-readable, `json_rpc` is one
//! JSON object per line, `structured` is key=value pairs, and `mcp_debug` is
//! indented JSON with direction arrows for eyeballing MCP traffic.

use super::event::{CallEvent, EventKind};
use crate::config::LogFormat;
use serde_json::Value;

/// Render one event in the given format
pub fn render(event: &CallEvent, format: LogFormat) -> String {
    match format {
        LogFormat::Console | LogFormat::File => render_human(event),
        LogFormat::JsonRpc => render_json_line(event),
        LogFormat::Structured => render_structured(event),
        LogFormat::McpDebug => render_mcp_debug(event),
    }
}

fn render_human(event: &CallEvent) -> String {
    let ts = event.ts.format("%Y-%m-%dT%H:%M:%S%.3fZ");
    match event.kind {
        EventKind::Call => format!(
            "[{ts}] CALL {}({}) [{}]",
            event.subject(),
            render_arg_list(event),
            event.correlation_id,
        ),
        EventKind::Return => format!(
            "[{ts}] RETURN {} -> {}{} [{}]",
            event.subject(),
            compact(event.result.as_ref()),
            render_duration(event),
            event.correlation_id,
        ),
        EventKind::Error => format!(
            "[{ts}] ERROR {} !! {}{} [{}]",
            event.subject(),
            event.error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
            render_duration(event),
            event.correlation_id,
        ),
        EventKind::McpRequest => format!(
            "[{ts}] MCP> {} params={} [{}]",
            event.metadata.get("method").and_then(Value::as_str).unwrap_or("?"),
            compact(event.args.as_ref().and_then(|a| a.first())),
            event.correlation_id,
        ),
        EventKind::McpResponse => format!(
            "[{ts}] MCP< {}{} [{}]",
            compact(event.result.as_ref()),
            event
                .error
                .as_ref()
                .map(|e| format!(" error={e}"))
                .unwrap_or_default(),
            event.correlation_id,
        ),
    }
}

fn render_json_line(event: &CallEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string())
}

fn render_structured(event: &CallEvent) -> String {
    let mut parts = vec![
        format!("ts={}", event.ts.to_rfc3339()),
        format!("kind={}", event.kind.as_str()),
        format!("correlation_id={}", event.correlation_id),
    ];
    if let Some(identity) = &event.identity {
        parts.push(format!("function={identity}"));
    }
    if let Some(args) = &event.args {
        parts.push(format!("args={}", Value::from(args.clone())));
    }
    if let Some(kwargs) = &event.kwargs {
        parts.push(format!("kwargs={}", Value::Object(kwargs.clone())));
    }
    if let Some(result) = &event.result {
        parts.push(format!("result={result}"));
    }
    if let Some(error) = &event.error {
        parts.push(format!("error_kind={} error_message={:?}", error.kind, error.message));
    }
    if let Some(duration) = event.duration_s {
        parts.push(format!("duration_s={duration:.6}"));
    }
    if let Some(delta) = event.memory_delta {
        parts.push(format!("memory_delta={delta}"));
    }
    for (key, value) in &event.metadata {
        parts.push(format!("{key}={value}"));
    }
    parts.join(" ")
}

fn render_mcp_debug(event: &CallEvent) -> String {
    let arrow = match event.kind {
        EventKind::Call | EventKind::McpRequest => "-->",
        EventKind::Return | EventKind::McpResponse => "<--",
        EventKind::Error => "!!-",
    };
    let body = serde_json::to_string_pretty(event).unwrap_or_else(|_| "{}".to_string());
    format!("{arrow} {}\n{body}", event.subject())
}

fn render_arg_list(event: &CallEvent) -> String {
    let mut parts = Vec::new();
    if let Some(args) = &event.args {
        parts.extend(args.iter().map(|v| v.to_string()));
    }
    if let Some(kwargs) = &event.kwargs {
        parts.extend(kwargs.iter().map(|(k, v)| format!("{k}={v}")));
    }
    parts.join(", ")
}

fn render_duration(event: &CallEvent) -> String {
    event.duration_s.map(|d| format!(" ({d:.6}s)")).unwrap_or_default()
}

fn compact(value: Option<&Value>) -> String {
    value.map(Value::to_string).unwrap_or_else(|| "null".to_string())
}
