//! Static + dynamic introspection
//!
//! [`inspect`] builds a [`FunctionAnalysis`] for a registered callable:
//! declared signature, parsed doc sections, source-derived dependencies and
//! hints, and JSON schemas. Analyses are cached by identity; the cheap
//! invalidation checks (source hash, file mtime) run on every call and the
//! expensive analysis only on a miss.

pub mod docstring;
pub mod schema;
pub mod source;

pub use docstring::DocInfo;
pub use source::{DependencyInfo, PerformanceHints, SecurityHints};

use crate::function::{FunctionSpec, ParamSpec, SignatureFlags, TypeHint};
use crate::identity::FunctionIdentity;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

/// Declared signature projection
#[derive(Debug, Clone, Serialize)]
pub struct SignatureInfo {
    /// Qualified name
    pub name: String,
    /// Module
    pub module: String,
    /// Dotted full name
    pub full_name: String,
    /// Declared parameters
    pub params: Vec<ParamSpec>,
    /// Declared return hint
    pub returns: TypeHint,
    /// Surface flags
    pub flags: SignatureFlags,
}

impl SignatureInfo {
    fn from_spec(spec: &FunctionSpec) -> Self {
        Self {
            name: spec.identity.qualified_name.clone(),
            module: spec.identity.module.clone(),
            full_name: spec.identity.full_name(),
            params: spec.params.clone(),
            returns: spec.returns.clone(),
            flags: spec.flags,
        }
    }
}

/// Complete analysis of one callable
#[derive(Debug, Clone, Serialize)]
pub struct FunctionAnalysis {
    /// Signature projection
    pub signature: SignatureInfo,
    /// Parsed doc sections
    pub doc: DocInfo,
    /// Imports, calls, approximate globals
    pub dependencies: DependencyInfo,
    /// Structural cost signals
    pub performance: PerformanceHints,
    /// Security flags
    pub security: SecurityHints,
    /// Parameter object schema
    pub schema: Value,
    /// Return schema
    pub return_schema: Value,
    /// Source content hash; empty when no source is attached
    pub source_hash: String,
}

impl FunctionAnalysis {
    /// JSON projection, as served over MCP
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

struct CachedAnalysis {
    analysis: Arc<FunctionAnalysis>,
    source_hash: String,
    mtime: Option<SystemTime>,
}

/// Analysis cache keyed by identity
#[derive(Default)]
pub struct Inspector {
    cache: Mutex<HashMap<FunctionIdentity, CachedAnalysis>>,
}

impl Inspector {
    /// Create an empty inspector
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze a callable, reusing the cached analysis while its source is
    /// unchanged.
    pub fn inspect(&self, spec: &FunctionSpec) -> Arc<FunctionAnalysis> {
        let current_hash = spec.source.as_deref().map(source::source_hash).unwrap_or_default();
        let current_mtime = spec
            .source_path
            .as_deref()
            .and_then(|p| std::fs::metadata(p).ok())
            .and_then(|m| m.modified().ok());

        {
            let cache = self.cache.lock();
            if let Some(cached) = cache.get(&spec.identity) {
                if cached.source_hash == current_hash && cached.mtime == current_mtime {
                    return Arc::clone(&cached.analysis);
                }
            }
        }

        let analysis = Arc::new(build_analysis(spec, &current_hash));
        self.cache.lock().insert(
            spec.identity.clone(),
            CachedAnalysis {
                analysis: Arc::clone(&analysis),
                source_hash: current_hash,
                mtime: current_mtime,
            },
        );
        analysis
    }

    /// Drop one cached analysis, or everything when `identity` is None
    pub fn invalidate(&self, identity: Option<&FunctionIdentity>) {
        let mut cache = self.cache.lock();
        match identity {
            Some(id) => {
                cache.remove(id);
            }
            None => cache.clear(),
        }
    }
}

fn build_analysis(spec: &FunctionSpec, source_hash: &str) -> FunctionAnalysis {
    let doc = spec.doc.as_deref().map(docstring::parse).unwrap_or_default();
    let (dependencies, performance, security) = match spec.source.as_deref() {
        Some(text) => source::analyze(&spec.identity.qualified_name, text),
        None => Default::default(),
    };
    FunctionAnalysis {
        signature: SignatureInfo::from_spec(spec),
        doc,
        dependencies,
        performance,
        security,
        schema: schema::object_schema(spec),
        return_schema: schema::return_schema(spec),
        source_hash: source_hash.to_string(),
    }
}

static GLOBAL: Lazy<Inspector> = Lazy::new(Inspector::new);

/// Analyze through the process-wide inspector cache
pub fn inspect(spec: &FunctionSpec) -> Arc<FunctionAnalysis> {
    GLOBAL.inspect(spec)
}

/// Parameter object schema for a callable
pub fn schema(spec: &FunctionSpec) -> Value {
    schema::object_schema(spec)
}

/// MCP tool definition for a callable
pub fn mcp_tool(spec: &FunctionSpec) -> Value {
    schema::mcp_tool(spec)
}
