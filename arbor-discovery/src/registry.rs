//! Typed service registry with a fixed resolution precedence.

use crate::properties::{ScopeId, ScopedPropertyCache};
use parking_lot::RwLock;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

type BoxedService = Box<dyn Any + Send + Sync>;
type ServiceFactory = Arc<dyn Fn() -> Result<BoxedService, String> + Send + Sync>;

/// Why discovery could not produce an implementation.
///
/// `NotFound`, `WrongType` and `Instantiation` describe individual
/// candidates; `Exhausted` is what [`DiscoveryRegistry::find`] returns
/// when every candidate in the chain failed, carrying the causes.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("no implementation registered for `{interface}`")]
    NotFound { interface: &'static str },

    #[error("implementation `{implementation}` does not implement `{interface}`")]
    WrongType {
        interface: &'static str,
        implementation: String,
    },

    #[error("implementation `{implementation}` could not be instantiated: {reason}")]
    Instantiation {
        implementation: String,
        reason: String,
    },

    #[error("all {} candidate(s) for `{interface}` failed", .causes.len())]
    Exhausted {
        interface: &'static str,
        causes: Vec<DiscoveryError>,
    },
}

struct Candidate {
    name: String,
    factory: ServiceFactory,
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate").field("name", &self.name).finish()
    }
}

/// Registry of service factories, resolved in precedence order:
/// configured overrides, then the implementation named by a scoped
/// configuration property, then declared defaults.
///
/// Explicitly constructed at application start and dropped at stop;
/// nothing here is static.
#[derive(Debug, Default)]
pub struct DiscoveryRegistry {
    overrides: RwLock<HashMap<TypeId, Vec<Candidate>>>,
    defaults: RwLock<HashMap<TypeId, Vec<Candidate>>>,

    /// Named implementations addressable from configuration properties
    named: RwLock<HashMap<(TypeId, String), Candidate>>,

    properties: ScopedPropertyCache,
}

impl DiscoveryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn properties(&self) -> &ScopedPropertyCache {
        &self.properties
    }

    /// Register a declared-default implementation for `T`. Defaults
    /// are tried last, in registration order.
    pub fn register_default<T, F>(&self, name: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn() -> Result<T, String> + Send + Sync + 'static,
    {
        self.defaults
            .write()
            .entry(TypeId::of::<T>())
            .or_default()
            .push(candidate(name, factory));
    }

    /// Register a configured override for `T`. Overrides win over
    /// everything else, in registration order.
    pub fn register_override<T, F>(&self, name: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn() -> Result<T, String> + Send + Sync + 'static,
    {
        self.overrides
            .write()
            .entry(TypeId::of::<T>())
            .or_default()
            .push(candidate(name, factory));
    }

    /// Register a type-erased default candidate for `T`, for wiring
    /// paths where the concrete type is only known behind `dyn Any`
    /// (e.g. assembled from configuration). A candidate producing a
    /// value that is not a `T` fails resolution with `WrongType`.
    pub fn register_default_erased<T, F>(&self, name: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn() -> Result<BoxedService, String> + Send + Sync + 'static,
    {
        self.defaults
            .write()
            .entry(TypeId::of::<T>())
            .or_default()
            .push(Candidate {
                name: name.into(),
                factory: Arc::new(factory),
            });
    }

    /// Register a named implementation for `T`, selectable by setting
    /// the configuration property `type_name::<T>()` to `name`.
    pub fn register_named<T, F>(&self, name: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn() -> Result<T, String> + Send + Sync + 'static,
    {
        let entry = candidate(name, factory);
        self.named
            .write()
            .insert((TypeId::of::<T>(), entry.name.clone()), entry);
    }

    /// Resolve an implementation of `T` for the given scope.
    ///
    /// Candidates are tried in precedence order; a failing candidate
    /// is skipped in favor of the next one. The error is returned only
    /// when no candidate succeeded.
    pub fn find<T: Any + Send + Sync>(
        &self,
        scope: Option<&ScopeId>,
    ) -> Result<Box<T>, DiscoveryError> {
        let interface = type_name::<T>();
        let type_id = TypeId::of::<T>();
        let mut causes = Vec::new();
        let mut tried = 0usize;

        let overrides = self.overrides.read();
        let named = self.named.read();
        let defaults = self.defaults.read();

        let configured = self
            .properties
            .get(scope, interface)
            .and_then(|name| named.get(&(type_id, name)));

        let chain = overrides
            .get(&type_id)
            .into_iter()
            .flatten()
            .chain(configured)
            .chain(defaults.get(&type_id).into_iter().flatten());

        for entry in chain {
            tried += 1;
            trace!(interface, implementation = %entry.name, "trying candidate");
            match (entry.factory)() {
                Ok(boxed) => match boxed.downcast::<T>() {
                    Ok(service) => {
                        debug!(interface, implementation = %entry.name, "resolved service");
                        return Ok(service);
                    }
                    Err(_) => causes.push(DiscoveryError::WrongType {
                        interface,
                        implementation: entry.name.clone(),
                    }),
                },
                Err(reason) => causes.push(DiscoveryError::Instantiation {
                    implementation: entry.name.clone(),
                    reason,
                }),
            }
        }

        if tried == 0 {
            Err(DiscoveryError::NotFound { interface })
        } else {
            Err(DiscoveryError::Exhausted { interface, causes })
        }
    }
}

fn candidate<T, F>(name: impl Into<String>, factory: F) -> Candidate
where
    T: Any + Send + Sync,
    F: Fn() -> Result<T, String> + Send + Sync + 'static,
{
    Candidate {
        name: name.into(),
        factory: Arc::new(move || factory().map(|service| Box::new(service) as BoxedService)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct StateManager {
        name: &'static str,
    }

    #[test]
    fn test_default_resolution() {
        let registry = DiscoveryRegistry::new();
        registry.register_default("server-side", || Ok(StateManager { name: "server" }));

        let found = registry.find::<StateManager>(None).unwrap();
        assert_eq!(found.name, "server");
    }

    #[test]
    fn test_override_wins_over_default() {
        let registry = DiscoveryRegistry::new();
        registry.register_default("server-side", || Ok(StateManager { name: "server" }));
        registry.register_override("test-double", || Ok(StateManager { name: "double" }));

        let found = registry.find::<StateManager>(None).unwrap();
        assert_eq!(found.name, "double");
    }

    #[test]
    fn test_configured_property_wins_over_default() {
        let registry = DiscoveryRegistry::new();
        registry.register_default("server-side", || Ok(StateManager { name: "server" }));
        registry.register_named("pooled", || Ok(StateManager { name: "pooled" }));
        registry
            .properties()
            .set(None, type_name::<StateManager>(), "pooled");

        let found = registry.find::<StateManager>(None).unwrap();
        assert_eq!(found.name, "pooled");
    }

    #[test]
    fn test_not_found_when_nothing_registered() {
        let registry = DiscoveryRegistry::new();
        let err = registry.find::<StateManager>(None).unwrap_err();
        assert!(matches!(err, DiscoveryError::NotFound { .. }));
    }

    #[test]
    fn test_failing_candidate_falls_through() {
        let registry = DiscoveryRegistry::new();
        registry.register_override::<StateManager, _>("broken", || {
            Err("missing configuration".to_string())
        });
        registry.register_default("server-side", || Ok(StateManager { name: "server" }));

        let found = registry.find::<StateManager>(None).unwrap();
        assert_eq!(found.name, "server");
    }

    #[test]
    fn test_exhausted_carries_causes() {
        let registry = DiscoveryRegistry::new();
        registry.register_override::<StateManager, _>("a", || Err("boom".to_string()));
        registry.register_default::<StateManager, _>("b", || Err("also boom".to_string()));

        let err = registry.find::<StateManager>(None).unwrap_err();
        match err {
            DiscoveryError::Exhausted { causes, .. } => {
                assert_eq!(causes.len(), 2);
                assert!(causes
                    .iter()
                    .all(|c| matches!(c, DiscoveryError::Instantiation { .. })));
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_erased_candidate_with_wrong_type_falls_through() {
        let registry = DiscoveryRegistry::new();
        registry.register_default_erased::<StateManager, _>("mislabeled", || {
            Ok(Box::new("not a state manager".to_string()) as BoxedService)
        });
        registry.register_default("server-side", || Ok(StateManager { name: "server" }));

        let found = registry.find::<StateManager>(None).unwrap();
        assert_eq!(found.name, "server");

        // With only the mislabeled candidate, resolution exhausts with
        // a WrongType cause.
        let lone = DiscoveryRegistry::new();
        lone.register_default_erased::<StateManager, _>("mislabeled", || {
            Ok(Box::new(42u32) as BoxedService)
        });
        let err = lone.find::<StateManager>(None).unwrap_err();
        match err {
            DiscoveryError::Exhausted { causes, .. } => {
                assert!(matches!(causes[0], DiscoveryError::WrongType { .. }));
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_scoped_property_selects_per_scope() {
        let registry = DiscoveryRegistry::new();
        registry.register_default("server-side", || Ok(StateManager { name: "server" }));
        registry.register_named("pooled", || Ok(StateManager { name: "pooled" }));

        let app = ScopeId::new("tenant-a");
        registry
            .properties()
            .set(Some(app.clone()), type_name::<StateManager>(), "pooled");

        let scoped = registry.find::<StateManager>(Some(&app)).unwrap();
        assert_eq!(scoped.name, "pooled");

        // Other scopes still get the declared default.
        let unscoped = registry.find::<StateManager>(None).unwrap();
        assert_eq!(unscoped.name, "server");
    }
}
