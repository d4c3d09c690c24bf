//! Process-wide function registry
//!
//! Maps every [`FunctionIdentity`] to its registered spec and, when
//! hijacked, to its wrapper. Registration never silently replaces an
//! existing entry (`replace = true` is explicit); hijacking an
//! already-hijacked identity appends strategies to the existing wrapper so
//! callers holding the wrapper reference stay valid. Unhijacking restores
//! dispatch to the original handler; the wrapper object stays alive for
//! in-flight references.

use super::strategy::Strategy;
use super::wrapper::CallHijacker;
use crate::error::{MysticError, Result};
use crate::function::{CallArgs, FunctionSpec};
use crate::identity::FunctionIdentity;
use crate::logger;
use crate::tracker;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Identity-keyed registry of specs and wrappers
#[derive(Default)]
pub struct HijackRegistry {
    specs: RwLock<HashMap<FunctionIdentity, Arc<FunctionSpec>>>,
    wrappers: RwLock<HashMap<FunctionIdentity, Arc<CallHijacker>>>,
}

impl HijackRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callable. Fails with `RegistryConflict` when the identity
    /// is already taken and `replace` is false.
    pub fn register(&self, spec: FunctionSpec, replace: bool) -> Result<FunctionIdentity> {
        let identity = spec.identity.clone();
        let mut specs = self.specs.write();
        if specs.contains_key(&identity) && !replace {
            return Err(MysticError::registry_conflict(identity.full_name()));
        }
        specs.insert(identity.clone(), Arc::new(spec));
        Ok(identity)
    }

    /// Remove a registration (and any wrapper) entirely
    pub fn unregister(&self, full_name: &str) -> Result<()> {
        let identity = parse_name(full_name)?;
        let removed = self.specs.write().remove(&identity);
        self.wrappers.write().remove(&identity);
        match removed {
            Some(_) => Ok(()),
            None => Err(MysticError::not_found(full_name)),
        }
    }

    /// Look up a registered spec
    pub fn get(&self, full_name: &str) -> Option<Arc<FunctionSpec>> {
        let identity = FunctionIdentity::parse(full_name)?;
        self.specs.read().get(&identity).cloned()
    }

    /// Registered specs, optionally filtered by module prefix. Names
    /// starting with `_` are private and hidden unless requested.
    pub fn list(&self, module_filter: Option<&str>, include_private: bool) -> Vec<Arc<FunctionSpec>> {
        let specs = self.specs.read();
        let mut entries: Vec<Arc<FunctionSpec>> = specs
            .values()
            .filter(|spec| {
                module_filter.map_or(true, |prefix| spec.identity.module.starts_with(prefix))
            })
            .filter(|spec| include_private || !spec.identity.qualified_name.starts_with('_'))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.identity.cmp(&b.identity));
        entries
    }

    /// Install (or extend) a wrapper for a registered callable.
    ///
    /// Idempotent: when the identity is already hijacked, the new
    /// strategies are appended to the existing wrapper, which is returned.
    pub fn hijack(&self, full_name: &str, strategies: Vec<Strategy>) -> Result<Arc<CallHijacker>> {
        let identity = parse_name(full_name)?;
        let spec = self
            .specs
            .read()
            .get(&identity)
            .cloned()
            .ok_or_else(|| MysticError::not_found(full_name))?;

        // Creation checks the wrapper map under the write lock, so two
        // threads hijacking the same target converge on one wrapper.
        let mut wrappers = self.wrappers.write();
        if let Some(existing) = wrappers.get(&identity) {
            for strategy in strategies {
                existing.add_strategy(strategy);
            }
            return Ok(Arc::clone(existing));
        }
        let wrapper = Arc::new(CallHijacker::new(
            spec,
            strategies,
            logger::global(),
            tracker::global(),
        ));
        wrappers.insert(identity, Arc::clone(&wrapper));
        Ok(wrapper)
    }

    /// Restore original dispatch for one identity
    pub fn unhijack(&self, full_name: &str) -> Result<()> {
        let identity = parse_name(full_name)?;
        match self.wrappers.write().remove(&identity) {
            Some(_) => Ok(()),
            None => Err(MysticError::not_found(full_name)),
        }
    }

    /// Restore original dispatch everywhere; returns how many wrappers were
    /// removed.
    pub fn unhijack_all(&self) -> usize {
        let mut wrappers = self.wrappers.write();
        let count = wrappers.len();
        wrappers.clear();
        count
    }

    /// The active wrapper for an identity, if any
    pub fn wrapper(&self, full_name: &str) -> Option<Arc<CallHijacker>> {
        let identity = FunctionIdentity::parse(full_name)?;
        self.wrappers.read().get(&identity).cloned()
    }

    /// Identities with active wrappers and their strategy names
    pub fn list_hijacked(&self) -> Vec<(FunctionIdentity, Vec<&'static str>)> {
        let wrappers = self.wrappers.read();
        let mut entries: Vec<_> = wrappers
            .iter()
            .map(|(identity, wrapper)| (identity.clone(), wrapper.strategy_names()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Invoke a registered callable, through its wrapper when hijacked
    pub fn call(&self, full_name: &str, args: CallArgs) -> Result<Value> {
        let identity = parse_name(full_name)?;
        if let Some(wrapper) = self.wrappers.read().get(&identity).cloned() {
            return wrapper.call(args);
        }
        let spec = self
            .specs
            .read()
            .get(&identity)
            .cloned()
            .ok_or_else(|| MysticError::not_found(full_name))?;
        spec.handler()(&args).map_err(MysticError::Original)
    }
}

fn parse_name(full_name: &str) -> Result<FunctionIdentity> {
    FunctionIdentity::parse(full_name).ok_or_else(|| MysticError::not_found(full_name))
}

static GLOBAL: Lazy<HijackRegistry> = Lazy::new(HijackRegistry::new);

/// The process-wide registry
pub fn global() -> &'static HijackRegistry {
    &GLOBAL
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hijack::strategy::{AnalysisStrategy, BlockStrategy};
    use serde_json::json;

    fn spec(module: &str, name: &str) -> FunctionSpec {
        FunctionSpec::new(module, name, |args| {
            Ok(json!(args.positional.first().cloned().unwrap_or(Value::Null)))
        })
    }

    #[test]
    fn test_register_conflict_without_replace() {
        let registry = HijackRegistry::new();
        registry.register(spec("m", "f"), false).unwrap();
        let err = registry.register(spec("m", "f"), false).unwrap_err();
        assert!(matches!(err, MysticError::RegistryConflict { .. }));
        assert!(registry.register(spec("m", "f"), true).is_ok());
    }

    #[test]
    fn test_hijack_unknown_is_not_found() {
        let registry = HijackRegistry::new();
        let err = registry.hijack("m.missing", vec![]).unwrap_err();
        assert!(matches!(err, MysticError::NotFound { .. }));
    }

    #[test]
    fn test_idempotent_hijack_appends() {
        let registry = HijackRegistry::new();
        registry.register(spec("m", "f"), false).unwrap();

        let first = registry
            .hijack("m.f", vec![Strategy::Analysis(AnalysisStrategy::new())])
            .unwrap();
        let second = registry
            .hijack("m.f", vec![Strategy::Block(BlockStrategy::new("off"))])
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.strategy_names(), vec!["block", "analyze"]);
    }

    #[test]
    fn test_unhijack_restores_original_dispatch() {
        let registry = HijackRegistry::new();
        registry.register(spec("m", "f"), false).unwrap();
        registry
            .hijack("m.f", vec![Strategy::Block(BlockStrategy::new("off").with_sentinel(json!("x")))])
            .unwrap();

        assert_eq!(registry.call("m.f", CallArgs::positional(vec![json!(1)])).unwrap(), json!("x"));
        registry.unhijack("m.f").unwrap();
        assert_eq!(registry.call("m.f", CallArgs::positional(vec![json!(1)])).unwrap(), json!(1));
        assert!(registry.unhijack("m.f").is_err());
    }

    #[test]
    fn test_list_filters_modules_and_private() {
        let registry = HijackRegistry::new();
        registry.register(spec("billing", "total"), false).unwrap();
        registry.register(spec("billing", "_internal"), false).unwrap();
        registry.register(spec("auth", "login"), false).unwrap();

        let billing = registry.list(Some("billing"), false);
        assert_eq!(billing.len(), 1);
        assert_eq!(billing[0].identity.qualified_name, "total");

        let with_private = registry.list(Some("billing"), true);
        assert_eq!(with_private.len(), 2);

        let all = registry.list(None, false);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_list_hijacked_reports_strategies() {
        let registry = HijackRegistry::new();
        registry.register(spec("m", "f"), false).unwrap();
        registry.hijack("m.f", vec![Strategy::Analysis(AnalysisStrategy::new())]).unwrap();

        let hijacked = registry.list_hijacked();
        assert_eq!(hijacked.len(), 1);
        assert_eq!(hijacked[0].0.full_name(), "m.f");
        assert_eq!(hijacked[0].1, vec!["analyze"]);

        assert_eq!(registry.unhijack_all(), 1);
        assert!(registry.list_hijacked().is_empty());
    }

    #[test]
    fn test_call_unregistered_is_not_found() {
        let registry = HijackRegistry::new();
        let err = registry.call("nope.missing", CallArgs::new()).unwrap_err();
        assert!(matches!(err, MysticError::NotFound { .. }));
    }
}
