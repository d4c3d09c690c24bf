//! MCP-style JSON-RPC surface
//!
//! Exposes the control plane to an external AI client over stdio. The
//! canonical tool set covers discovery, inspection, hijacking, metrics,
//! snapshots and log queries. Each request's id becomes the correlation id
//! for the handler duration, and request/response pairs are logged through
//! the call logger.

use crate::config::Environment;
use crate::correlation;
use crate::error::{ErrorRecord, MysticError};
use crate::function::CallArgs;
use crate::hijack::{
    registry::HijackRegistry, AnalysisStrategy, BlockStrategy, CacheStrategy, MockStrategy,
    RedirectStrategy, Strategy,
};
use crate::inspect;
use crate::logger::CallLogger;
use crate::state::{SnapshotKind, StateManager};
use crate::tracker::PerformanceTracker;
use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;
use std::time::Duration;

const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC error codes used by the surface
mod code {
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL: i64 = -32603;
    pub const MYSTIC: i64 = -32000;
}

/// JSON-RPC server over the control plane
pub struct MysticMcpServer {
    registry: &'static HijackRegistry,
    logger: Arc<CallLogger>,
    tracker: Arc<PerformanceTracker>,
    state: Arc<StateManager>,
}

impl MysticMcpServer {
    /// Server over the process-wide registry, logger and tracker
    pub fn new(state: Arc<StateManager>) -> Self {
        Self {
            registry: crate::hijack::registry::global(),
            logger: crate::logger::global(),
            tracker: crate::tracker::global(),
            state,
        }
    }

    /// Server with explicit collaborators (for tests)
    pub fn with_parts(
        registry: &'static HijackRegistry,
        logger: Arc<CallLogger>,
        tracker: Arc<PerformanceTracker>,
        state: Arc<StateManager>,
    ) -> Self {
        Self { registry, logger, tracker, state }
    }

    /// Serve newline-delimited JSON-RPC over stdio until EOF
    pub fn serve_stdio(&self) -> Result<()> {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        let reader = BufReader::new(stdin);

        for line in reader.lines() {
            let line = line.context("Failed to read line from stdin")?;
            if line.trim().is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<Value>(&line) {
                Ok(request) => self.handle_request(&request),
                Err(e) => {
                    error_response(&Value::Null, code::INVALID_REQUEST, &e.to_string())
                }
            };
            writeln!(stdout, "{}", serde_json::to_string(&response)?)
                .context("Failed to write response")?;
            stdout.flush().context("Failed to flush stdout")?;
        }
        Ok(())
    }

    /// Handle one JSON-RPC request, producing the full response envelope
    pub fn handle_request(&self, request: &Value) -> Value {
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let Some(method) = request.get("method").and_then(Value::as_str) else {
            return error_response(&id, code::INVALID_REQUEST, "Missing method field");
        };
        let params = request.get("params").cloned().unwrap_or_else(|| json!({}));

        // The request id is the correlation id for the handler duration.
        let _frame = correlation::enter(match &id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        self.logger.log_mcp_request(method, &params, &id);

        let outcome = match method {
            "initialize" => Ok(self.initialize()),
            "tools/list" => Ok(self.list_tools()),
            "tools/call" => self.call_tool(&params),
            _ => Err(rpc_error(code::METHOD_NOT_FOUND, format!("Unknown method: {method}"))),
        };

        match outcome {
            Ok(result) => {
                self.logger.log_mcp_response(Some(&result), &id, None);
                json!({"jsonrpc": "2.0", "id": id, "result": result})
            }
            Err(err) => {
                self.logger.log_mcp_response(
                    None,
                    &id,
                    Some(ErrorRecord::new(err.code.to_string(), err.message.clone())),
                );
                error_response(&id, err.code, &err.message)
            }
        }
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {}},
            "serverInfo": {
                "name": "mystic",
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    fn list_tools(&self) -> Value {
        json!({
            "tools": [
                {
                    "name": "discover_functions",
                    "description": "List registered functions",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "module_filter": {"type": "string"},
                            "include_private": {"type": "boolean"}
                        }
                    }
                },
                {
                    "name": "inspect_function",
                    "description": "Full analysis of one function",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"full_name": {"type": "string"}},
                        "required": ["full_name"]
                    }
                },
                {
                    "name": "hijack_function",
                    "description": "Install an interception strategy",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "full_name": {"type": "string"},
                            "strategy": {
                                "type": "string",
                                "enum": ["cache", "mock", "block", "redirect", "analyze"]
                            },
                            "options": {"type": "object"}
                        },
                        "required": ["full_name", "strategy"]
                    }
                },
                {
                    "name": "unhijack_function",
                    "description": "Restore original dispatch",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"full_name": {"type": "string"}},
                        "required": ["full_name"]
                    }
                },
                {
                    "name": "list_hijacked",
                    "description": "Identities with active strategies",
                    "inputSchema": {"type": "object", "properties": {}}
                },
                {
                    "name": "get_function_metrics",
                    "description": "Rolling call statistics",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"full_name": {"type": "string"}}
                    }
                },
                {
                    "name": "state_snapshots",
                    "description": "Snapshots from the state timeline",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "filter": {"type": "string"},
                            "limit": {"type": "integer"}
                        }
                    }
                },
                {
                    "name": "state_timeline",
                    "description": "Timeline cursor and bookmarks",
                    "inputSchema": {"type": "object", "properties": {}}
                },
                {
                    "name": "logs_query",
                    "description": "Recent call events",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "identity": {"type": "string"},
                            "since": {"type": "string"},
                            "limit": {"type": "integer"}
                        }
                    }
                }
            ]
        })
    }

    fn call_tool(&self, params: &Value) -> std::result::Result<Value, RpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| rpc_error(code::INVALID_PARAMS, "Missing tool name"))?;
        let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        let dispatch = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| match name {
            "discover_functions" => self.discover_functions(&args),
            "inspect_function" => self.inspect_function(&args),
            "hijack_function" => self.hijack_function(&args),
            "unhijack_function" => self.unhijack_function(&args),
            "list_hijacked" => Ok(self.list_hijacked()),
            "get_function_metrics" => Ok(self.get_function_metrics(&args)),
            "state_snapshots" => self.state_snapshots(&args),
            "state_timeline" => Ok(self.state.timeline_info()),
            "logs_query" => self.logs_query(&args),
            other => Err(rpc_error(code::METHOD_NOT_FOUND, format!("Unknown tool: {other}"))),
        }));
        let body = dispatch
            .unwrap_or_else(|_| Err(rpc_error(code::INTERNAL, format!("Tool '{name}' panicked"))))?;

        Ok(json!({
            "content": [{"type": "text", "text": body.to_string()}],
            "structuredContent": body,
        }))
    }

    fn discover_functions(&self, args: &Value) -> std::result::Result<Value, RpcError> {
        let module_filter = args.get("module_filter").and_then(Value::as_str);
        let include_private = args.get("include_private").and_then(Value::as_bool).unwrap_or(false);
        let entries: Vec<Value> = self
            .registry
            .list(module_filter, include_private)
            .iter()
            .map(|spec| {
                json!({
                    "name": spec.identity.qualified_name,
                    "module": spec.identity.module,
                    "full_name": spec.identity.full_name(),
                    "signature": render_signature(spec),
                    "docstring": spec.doc.clone().unwrap_or_default(),
                    "file": spec.source_path.as_ref().map(|p| p.display().to_string()),
                    "line": Value::Null,
                    "is_async": spec.flags.is_async,
                })
            })
            .collect();
        let count = entries.len();
        Ok(json!({"functions": entries, "count": count}))
    }

    fn inspect_function(&self, args: &Value) -> std::result::Result<Value, RpcError> {
        let full_name = require_str(args, "full_name")?;
        let spec = self
            .registry
            .get(full_name)
            .ok_or_else(|| mystic_rpc_error(&MysticError::not_found(full_name)))?;
        Ok(inspect::inspect(&spec).to_value())
    }

    fn hijack_function(&self, args: &Value) -> std::result::Result<Value, RpcError> {
        let full_name = require_str(args, "full_name")?;
        let strategy_name = require_str(args, "strategy")?;
        let options = args.get("options").cloned().unwrap_or_else(|| json!({}));

        let strategy = self.build_strategy(strategy_name, &options)?;
        let wrapper = self
            .registry
            .hijack(full_name, vec![strategy])
            .map_err(|e| mystic_rpc_error(&e))?;
        Ok(json!({
            "ok": true,
            "identity": wrapper.identity().full_name(),
            "strategies": wrapper.strategy_names(),
        }))
    }

    fn build_strategy(
        &self,
        name: &str,
        options: &Value,
    ) -> std::result::Result<Strategy, RpcError> {
        match name {
            "cache" => {
                let ttl = parse_ttl(options.get("ttl"))?;
                let mut cache = match options.get("max_entries").and_then(Value::as_u64) {
                    Some(max) => CacheStrategy::with_capacity(ttl, max as usize),
                    None => CacheStrategy::new(ttl),
                };
                if let Some(dir) = options.get("cache_dir").and_then(Value::as_str) {
                    cache = cache.with_dir(dir);
                }
                Ok(Strategy::Cache(cache))
            }
            "mock" => {
                let data = options.get("data").cloned().ok_or_else(|| {
                    rpc_error(code::INVALID_PARAMS, "mock requires options.data")
                })?;
                let mut mock = MockStrategy::new(data);
                if let Some(envs) = options.get("environments").and_then(Value::as_array) {
                    let parsed: std::result::Result<Vec<Environment>, _> = envs
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::parse::<Environment>)
                        .collect();
                    mock = mock.environments(parsed.map_err(|e| mystic_rpc_error(&e))?);
                }
                Ok(Strategy::Mock(mock))
            }
            "block" => {
                let reason = options
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("blocked via MCP");
                let mut block = BlockStrategy::new(reason);
                if options.get("raise_error").and_then(Value::as_bool).unwrap_or(false) {
                    block = block.raising();
                }
                if let Some(sentinel) = options.get("sentinel") {
                    block = block.with_sentinel(sentinel.clone());
                }
                Ok(Strategy::Block(block))
            }
            "redirect" => {
                let target_name = options
                    .get("target")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        rpc_error(code::INVALID_PARAMS, "redirect requires options.target")
                    })?;
                let target = self
                    .registry
                    .get(target_name)
                    .ok_or_else(|| mystic_rpc_error(&MysticError::not_found(target_name)))?;
                let handler = target.handler();
                Ok(Strategy::Redirect(RedirectStrategy::new(move |args: &CallArgs| {
                    handler(args)
                })))
            }
            "analyze" => {
                let mut analysis = AnalysisStrategy::new();
                if let Some(on) = options.get("track_arguments").and_then(Value::as_bool) {
                    analysis = analysis.track_arguments(on);
                }
                if let Some(on) = options.get("track_memory").and_then(Value::as_bool) {
                    analysis = analysis.track_memory(on);
                }
                Ok(Strategy::Analysis(analysis))
            }
            other => Err(rpc_error(
                code::INVALID_PARAMS,
                format!("Unknown strategy: {other}"),
            )),
        }
    }

    fn unhijack_function(&self, args: &Value) -> std::result::Result<Value, RpcError> {
        let full_name = require_str(args, "full_name")?;
        self.registry.unhijack(full_name).map_err(|e| mystic_rpc_error(&e))?;
        Ok(json!({"ok": true}))
    }

    fn list_hijacked(&self) -> Value {
        let entries: Vec<Value> = self
            .registry
            .list_hijacked()
            .iter()
            .map(|(identity, strategies)| {
                json!({"identity": identity.full_name(), "strategies": strategies})
            })
            .collect();
        let count = entries.len();
        json!({"hijacked": entries, "count": count})
    }

    fn get_function_metrics(&self, args: &Value) -> Value {
        match args.get("full_name").and_then(Value::as_str) {
            Some(full_name) => {
                let entry = crate::identity::FunctionIdentity::parse(full_name)
                    .and_then(|id| self.tracker.get(&id));
                match entry {
                    Some(entry) => json!({"identity": full_name, "metrics": entry}),
                    None => json!({"identity": full_name, "metrics": Value::Null}),
                }
            }
            None => {
                let mut all = Map::new();
                for (identity, entry) in self.tracker.snapshot() {
                    all.insert(identity.full_name(), json!(entry));
                }
                json!({"metrics": all})
            }
        }
    }

    fn state_snapshots(&self, args: &Value) -> std::result::Result<Value, RpcError> {
        let kind = match args.get("filter").and_then(Value::as_str) {
            Some(text) => Some(parse_kind(text)?),
            None => None,
        };
        let limit = args.get("limit").and_then(Value::as_u64).map(|n| n as usize);
        let snapshots = self.state.list(kind, None, limit, 0);
        let count = snapshots.len();
        Ok(json!({"snapshots": snapshots, "count": count}))
    }

    fn logs_query(&self, args: &Value) -> std::result::Result<Value, RpcError> {
        let identity = match args.get("identity").and_then(Value::as_str) {
            Some(name) => Some(
                crate::identity::FunctionIdentity::parse(name)
                    .ok_or_else(|| mystic_rpc_error(&MysticError::not_found(name)))?,
            ),
            None => None,
        };
        let since = args
            .get("since")
            .and_then(Value::as_str)
            .map(|text| {
                text.parse::<chrono::DateTime<chrono::Utc>>()
                    .map_err(|e| rpc_error(code::INVALID_PARAMS, format!("Bad since: {e}")))
            })
            .transpose()?;
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(100) as usize;
        let events = self.logger.query(identity.as_ref(), since, limit);
        let count = events.len();
        Ok(json!({"events": events, "count": count}))
    }
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

fn rpc_error(code: i64, message: impl Into<String>) -> RpcError {
    RpcError { code, message: message.into() }
}

fn mystic_rpc_error(error: &MysticError) -> RpcError {
    rpc_error(code::MYSTIC, error.to_string())
}

fn error_response(id: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message},
    })
}

fn require_str<'a>(args: &'a Value, key: &str) -> std::result::Result<&'a str, RpcError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| rpc_error(code::INVALID_PARAMS, format!("Missing {key}")))
}

fn render_signature(spec: &crate::function::FunctionSpec) -> String {
    let params: Vec<String> = spec
        .params
        .iter()
        .map(|p| match &p.default {
            Some(default) => format!("{}={default}", p.name),
            None => p.name.clone(),
        })
        .collect();
    format!("{}({})", spec.identity.qualified_name, params.join(", "))
}

/// Accepts seconds as a number, or a string with an `s`/`m`/`h`/`d` suffix
/// (`"1h"`, `"30m"`).
fn parse_ttl(value: Option<&Value>) -> std::result::Result<Duration, RpcError> {
    match value {
        None => Ok(Duration::from_secs(3600)),
        Some(Value::Number(n)) => {
            let secs = n.as_f64().filter(|s| *s >= 0.0).ok_or_else(|| {
                rpc_error(code::INVALID_PARAMS, "ttl must be non-negative")
            })?;
            Ok(Duration::from_secs_f64(secs))
        }
        Some(Value::String(text)) => parse_ttl_text(text)
            .ok_or_else(|| rpc_error(code::INVALID_PARAMS, format!("Bad ttl: {text}"))),
        Some(other) => Err(rpc_error(code::INVALID_PARAMS, format!("Bad ttl: {other}"))),
    }
}

fn parse_ttl_text(text: &str) -> Option<Duration> {
    let text = text.trim();
    let (digits, unit) = match text.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((split, _)) => text.split_at(split),
        None => (text, "s"),
    };
    let count: u64 = digits.parse().ok()?;
    let seconds = match unit.trim() {
        "s" | "" => count,
        "m" => count * 60,
        "h" => count * 3600,
        "d" => count * 86_400,
        _ => return None,
    };
    Some(Duration::from_secs(seconds))
}

fn parse_kind(text: &str) -> std::result::Result<SnapshotKind, RpcError> {
    match text {
        "variable" => Ok(SnapshotKind::Variable),
        "fn_args" => Ok(SnapshotKind::FnArgs),
        "fn_return" => Ok(SnapshotKind::FnReturn),
        "exception" => Ok(SnapshotKind::Exception),
        "global" => Ok(SnapshotKind::Global),
        "local" => Ok(SnapshotKind::Local),
        other => Err(rpc_error(code::INVALID_PARAMS, format!("Unknown snapshot kind: {other}"))),
    }
}
