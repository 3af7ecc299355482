//! Service discovery for arbor
//!
//! An explicit registry mapping a service interface type to an ordered
//! chain of factories, resolved with a fixed precedence: configured
//! override, then the implementation named by a scoped configuration
//! property, then declared defaults. Factories are registered at
//! startup/configuration time; there is no runtime reflection.
//!
//! Candidate failures are recoverable — resolution moves on to the
//! next candidate — and only when every candidate has failed does
//! [`find`](DiscoveryRegistry::find) return an error, carrying the
//! per-candidate causes.
//!
//! The scoped property cache mirrors the classloader-keyed cache of
//! the original discovery utility: the scope key is optional, and the
//! absent key is a valid key of its own (bootstrap scope).

#![warn(missing_debug_implementations)]

pub mod properties;
pub mod registry;

pub use properties::{ScopeId, ScopedPropertyCache};
pub use registry::{DiscoveryError, DiscoveryRegistry};
