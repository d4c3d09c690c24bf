//! Registered callables and their declared signatures
//!
//! The control plane interposes on functions registered as [`FunctionSpec`]s:
//! a handler plus the declared parameter list, doc text, and (optionally) the
//! source text the inspector analyzes. Arguments and results travel as
//! `serde_json::Value`, which is also the MCP wire form.

use crate::error::ErrorRecord;
use crate::identity::FunctionIdentity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Uniform invocation payload: positional arguments plus keyword arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    /// Positional arguments, in call order
    pub positional: Vec<Value>,
    /// Keyword arguments
    pub keyword: Map<String, Value>,
}

impl CallArgs {
    /// Empty argument set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from positional values only
    pub fn positional(values: Vec<Value>) -> Self {
        Self { positional: values, keyword: Map::new() }
    }

    /// Append a positional argument
    pub fn with_arg(mut self, value: Value) -> Self {
        self.positional.push(value);
        self
    }

    /// Set a keyword argument
    pub fn with_kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.keyword.insert(name.into(), value);
        self
    }

    /// Look up an argument by declared position or keyword name
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.positional.get(index).or_else(|| self.keyword.get(name))
    }
}

/// The underlying callable. Handlers are synchronous; failures are reported
/// as [`ErrorRecord`]s so they can travel through events and results.
pub type NativeHandler = Arc<dyn Fn(&CallArgs) -> std::result::Result<Value, ErrorRecord> + Send + Sync>;

/// Type hint for a declared parameter or return value.
///
/// Hints drive JSON-schema generation; `Optional` adds a null branch,
/// `Union` becomes `anyOf`, and `Literal` becomes `enum`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "of")]
pub enum TypeHint {
    Any,
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array(Box<TypeHint>),
    Object(Box<TypeHint>),
    Optional(Box<TypeHint>),
    Union(Vec<TypeHint>),
    Literal(Vec<Value>),
}

impl TypeHint {
    /// Shorthand for `Array(inner)`
    pub fn array(inner: TypeHint) -> Self {
        Self::Array(Box::new(inner))
    }

    /// Shorthand for `Optional(inner)`
    pub fn optional(inner: TypeHint) -> Self {
        Self::Optional(Box::new(inner))
    }
}

/// A declared parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name
    pub name: String,
    /// Type hint
    pub hint: TypeHint,
    /// Default value; parameters without one are required
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// One-line description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl ParamSpec {
    /// Create a new required parameter
    pub fn new(name: impl Into<String>, hint: TypeHint) -> Self {
        Self { name: name.into(), hint, default: None, doc: None }
    }

    /// Attach a default value (making the parameter optional)
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Attach a description
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// A parameter is required when it has no default
    pub fn required(&self) -> bool {
        self.default.is_none()
    }
}

/// Surface flags mirrored from the registered function
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureFlags {
    /// Declared async (carried as metadata; v1 handlers are synchronous)
    pub is_async: bool,
    /// Method on a type rather than a free function
    pub is_method: bool,
    /// Accepts extra positional arguments beyond the declared list
    pub has_varargs: bool,
    /// Accepts extra keyword arguments beyond the declared list
    pub has_kwargs: bool,
}

/// A registered callable: handler + declared surface metadata.
///
/// The spec is what the wrapper preserves and what the inspector analyzes;
/// the handler is what the interception chain ultimately invokes.
#[derive(Clone)]
pub struct FunctionSpec {
    /// Stable identity
    pub identity: FunctionIdentity,
    /// Declared parameters, in positional order
    pub params: Vec<ParamSpec>,
    /// Declared return hint
    pub returns: TypeHint,
    /// Surface flags
    pub flags: SignatureFlags,
    /// Doc text (Google/NumPy sections recognized by the inspector)
    pub doc: Option<String>,
    /// Source text, when the registrant attaches it for analysis
    pub source: Option<String>,
    /// Path of the source file, for mtime-based invalidation
    pub source_path: Option<PathBuf>,
    handler: NativeHandler,
}

impl std::fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("identity", &self.identity)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("flags", &self.flags)
            .finish()
    }
}

impl FunctionSpec {
    /// Register a callable under `module.name`
    pub fn new<F>(module: impl Into<String>, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&CallArgs) -> std::result::Result<Value, ErrorRecord> + Send + Sync + 'static,
    {
        Self {
            identity: FunctionIdentity::new(module, name),
            params: Vec::new(),
            returns: TypeHint::Any,
            flags: SignatureFlags::default(),
            doc: None,
            source: None,
            source_path: None,
            handler: Arc::new(handler),
        }
    }

    /// Declare a parameter
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Declare the return hint
    pub fn returns(mut self, hint: TypeHint) -> Self {
        self.returns = hint;
        self
    }

    /// Attach doc text
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Attach source text for the inspector
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach the source file path for mtime invalidation
    pub fn source_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Set surface flags
    pub fn flags(mut self, flags: SignatureFlags) -> Self {
        self.flags = flags;
        self
    }

    /// The underlying handler
    pub fn handler(&self) -> NativeHandler {
        Arc::clone(&self.handler)
    }

    /// Replace the handler with a wrapped form of itself, keeping the
    /// declared surface unchanged. Used by the logging combinators.
    pub fn map_handler<F>(mut self, wrap: F) -> Self
    where
        F: FnOnce(NativeHandler) -> NativeHandler,
    {
        self.handler = wrap(Arc::clone(&self.handler));
        self
    }

    /// Names of declared parameters, in order
    pub fn param_names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    /// First line of the doc text
    pub fn summary(&self) -> Option<&str> {
        self.doc.as_deref().and_then(|d| d.lines().find(|l| !l.trim().is_empty())).map(str::trim)
    }
}
