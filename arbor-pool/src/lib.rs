//! Arbor view pooling
//!
//! This crate decides when a server-side component tree built for one
//! request may be recycled for a later request:
//!
//! - [`metadata`] — structural snapshots of a view (ids, types,
//!   child/facet topology) and their lockstep comparison
//! - [`pool`] — the per-view-id keyed cache of detached trees, with
//!   tiers, capacity bounds, FIFO eviction and soft/hard retention
//! - [`processor`] — the render-lifecycle glue: classify and store on
//!   render completion, pop and reconcile on view restore
//! - [`config`] — recognized pool options, loadable from YAML
//!
//! Pooling failures are invisible to callers: the worst case is a
//! cache miss and a normal full build.

#![warn(missing_debug_implementations)]

pub mod config;
pub mod metadata;
pub mod pool;
pub mod processor;

pub use config::{EntryMode, PoolConfig, PoolConfigError, RefreshStrategy};
pub use metadata::{NodeStructure, RenderEnvironment, ViewStructureMetadata};
pub use pool::{PoolStatsSnapshot, PoppedView, RestoreResult, ViewPoolRegistry};
pub use processor::{
    PooledRestore, RefreshReason, RequestContext, ViewBuilder, ViewPoolProcessor,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{EntryMode, PoolConfig, RefreshStrategy};
    pub use crate::metadata::{RenderEnvironment, ViewStructureMetadata};
    pub use crate::pool::{PoppedView, RestoreResult, ViewPoolRegistry};
    pub use crate::processor::{
        PooledRestore, RefreshReason, RequestContext, ViewBuilder, ViewPoolProcessor,
    };
    pub use arbor_types::{FaceletStateToken, Locale, RenderKitId, ViewId};
}
