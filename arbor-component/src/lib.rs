//! Arbor component model
//!
//! This crate provides the server-side component tree and its state
//! saving machinery:
//!
//! - [`state`] — the delta state helper: full values before the
//!   baseline marker, recorded operations after it
//! - [`capability`] — the closed set of state-holding capabilities for
//!   attached objects (listeners, converters)
//! - [`tree`] — the arena-backed component tree with ordered children,
//!   named facets and structural-perturbation bookkeeping
//! - [`protocol`] — tree-wide save/restore/mark/clear built on the
//!   helper
//!
//! The expression-language and view-build collaborators are consumed
//! through traits ([`state::ExpressionResolver`]); this crate never
//! renders markup or touches a request lifecycle.

#![warn(missing_debug_implementations)]

pub mod capability;
pub mod protocol;
pub mod state;
pub mod tree;

pub use capability::{Attachment, PartialStateHolder, StateHolder};
pub use protocol::{
    clear_initial_state, mark_initial_state, restore_view_state, save_view_state, TreeState,
};
pub use state::{DeltaOp, DeltaStateHelper, ExpressionResolver, SavedState};
pub use tree::{ComponentNode, ComponentTree, NodeKey};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::capability::{Attachment, PartialStateHolder, StateHolder};
    pub use crate::protocol::{
        clear_initial_state, mark_initial_state, restore_view_state, save_view_state, TreeState,
    };
    pub use crate::state::{DeltaOp, DeltaStateHelper, ExpressionResolver, SavedState};
    pub use crate::tree::{ComponentNode, ComponentTree, NodeKey};
    pub use arbor_types::{ComponentId, PropertyKey, StateValue};
}
