//! Scope-keyed configuration property cache
//!
//! Properties that drive discovery (which implementation serves which
//! interface) are cached per scope. The scope key is optional:
//! `None` is the bootstrap scope and a perfectly valid key, not a
//! missing one.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Identifier of a property scope (a deployment unit, a module).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeId(pub String);

impl ScopeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Mutex-guarded map of scope → property table.
#[derive(Debug, Default)]
pub struct ScopedPropertyCache {
    entries: Mutex<HashMap<Option<ScopeId>, HashMap<String, String>>>,
}

impl ScopedPropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property in the given scope. `None` targets the
    /// bootstrap scope.
    pub fn set(&self, scope: Option<ScopeId>, name: impl Into<String>, value: impl Into<String>) {
        self.entries
            .lock()
            .entry(scope)
            .or_default()
            .insert(name.into(), value.into());
    }

    /// Look up a property: the named scope first, falling back to the
    /// bootstrap scope.
    pub fn get(&self, scope: Option<&ScopeId>, name: &str) -> Option<String> {
        let entries = self.entries.lock();
        if let Some(scope) = scope {
            if let Some(value) = entries
                .get(&Some(scope.clone()))
                .and_then(|table| table.get(name))
            {
                return Some(value.clone());
            }
        }
        entries.get(&None).and_then(|table| table.get(name)).cloned()
    }

    /// Drop every property of one scope.
    pub fn clear_scope(&self, scope: Option<&ScopeId>) {
        self.entries.lock().remove(&scope.cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_scope_is_a_valid_key() {
        let cache = ScopedPropertyCache::new();
        cache.set(None, "state.manager", "pooled");
        assert_eq!(cache.get(None, "state.manager"), Some("pooled".to_string()));
    }

    #[test]
    fn test_scoped_lookup_falls_back_to_bootstrap() {
        let cache = ScopedPropertyCache::new();
        let app = ScopeId::new("app");
        cache.set(None, "render.kit", "basic");
        cache.set(Some(app.clone()), "state.manager", "pooled");

        assert_eq!(
            cache.get(Some(&app), "state.manager"),
            Some("pooled".to_string())
        );
        assert_eq!(
            cache.get(Some(&app), "render.kit"),
            Some("basic".to_string())
        );
        assert_eq!(cache.get(Some(&app), "absent"), None);
    }

    #[test]
    fn test_clear_scope() {
        let cache = ScopedPropertyCache::new();
        let app = ScopeId::new("app");
        cache.set(Some(app.clone()), "k", "v");
        cache.clear_scope(Some(&app));
        assert_eq!(cache.get(Some(&app), "k"), None);
    }
}
