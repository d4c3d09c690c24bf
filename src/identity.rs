//! Stable function identity
//!
//! Every registry in the control plane is keyed by `FunctionIdentity`, a
//! `(module, qualified_name)` pair that stays stable for the lifetime of the
//! registered target. Callers must never key by handler object identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable `(module, qualified_name)` key for a registered callable
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionIdentity {
    /// Module the function belongs to (e.g. "billing.invoices")
    pub module: String,
    /// Qualified name within the module (e.g. "Invoice.total")
    pub qualified_name: String,
}

impl FunctionIdentity {
    /// Create a new identity
    pub fn new(module: impl Into<String>, qualified_name: impl Into<String>) -> Self {
        Self { module: module.into(), qualified_name: qualified_name.into() }
    }

    /// The dotted full name, `module.qualified_name`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.module, self.qualified_name)
    }

    /// Parse a dotted full name back into an identity.
    ///
    /// The final dot-separated segment becomes the qualified name; everything
    /// before it is the module. Returns `None` when there is no module part.
    pub fn parse(full_name: &str) -> Option<Self> {
        let (module, name) = full_name.rsplit_once('.')?;
        if module.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(module, name))
    }
}

impl fmt::Display for FunctionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.qualified_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_round_trip() {
        let id = FunctionIdentity::new("billing.invoices", "total");
        assert_eq!(id.full_name(), "billing.invoices.total");
        assert_eq!(FunctionIdentity::parse(&id.full_name()), Some(id));
    }

    #[test]
    fn test_parse_rejects_bare_name() {
        assert_eq!(FunctionIdentity::parse("total"), None);
        assert_eq!(FunctionIdentity::parse(".total"), None);
        assert_eq!(FunctionIdentity::parse("module."), None);
    }

    #[test]
    fn test_identity_is_map_key() {
        let mut map = std::collections::HashMap::new();
        map.insert(FunctionIdentity::new("m", "f"), 1);
        assert_eq!(map.get(&FunctionIdentity::new("m", "f")), Some(&1));
    }
}
