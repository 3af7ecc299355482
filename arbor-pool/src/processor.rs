//! View pool processor
//!
//! Glue between the render lifecycle and the view pool. On render
//! completion it classifies the finished tree and offers it to the
//! pool; on the next request for the same view it pops a pooled tree
//! and reconciles it — verbatim for `Complete`, after clearing
//! transient and dynamically-added content (and optionally re-running
//! the view build) for `RefreshRequired`.
//!
//! View-scope data is never carried by pooled trees: the processor
//! empties the request's view scope at splice time, and the
//! integration tests enforce the invariant.

use crate::metadata::{RenderEnvironment, ViewStructureMetadata};
use crate::pool::{RestoreResult, ViewPoolRegistry};
use arbor_component::tree::ComponentTree;
use arbor_types::{FaceletStateToken, StateValue, ViewId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Per-request state the processor works against: the render
/// environment key, the facelet-state token of the view variant being
/// requested, and the view-scope map.
#[derive(Debug)]
pub struct RequestContext {
    pub environment: RenderEnvironment,
    pub facelet_token: Option<FaceletStateToken>,

    /// Per-view key/value data, unrelated to component structure.
    /// Never pooled; emptied whenever a pooled tree is spliced in.
    pub view_scope: HashMap<String, StateValue>,
}

impl RequestContext {
    pub fn new(environment: RenderEnvironment) -> Self {
        RequestContext {
            environment,
            facelet_token: None,
            view_scope: HashMap::new(),
        }
    }

    pub fn with_facelet_token(mut self, token: FaceletStateToken) -> Self {
        self.facelet_token = Some(token);
        self
    }
}

/// The view-build collaborator: (re)populates a component tree from
/// the view description. Called after splicing in a tree that needs a
/// refresh. Black box to this crate.
pub trait ViewBuilder {
    fn build_view(
        &self,
        ctx: &mut RequestContext,
        tree: &mut ComponentTree,
        view_id: &ViewId,
    ) -> anyhow::Result<()>;
}

/// Why a stored tree cannot be reused verbatim. The pool result stays
/// binary; the reasons are recorded for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// A non-transient child/facet was added or removed after the
    /// template build (sticky, regardless of net effect)
    StructurePerturbed,

    /// Resource components were added outside the template
    DynamicResources,

    /// An attached object holds state but cannot be reset to a
    /// baseline (full StateHolder without the partial capability)
    NonResettableState,
}

/// A pooled tree spliced in as the live view root.
#[derive(Debug)]
pub struct PooledRestore {
    pub tree: ComponentTree,
    pub result: RestoreResult,
}

/// Orchestrates pool stores and pops around the render lifecycle.
#[derive(Debug)]
pub struct ViewPoolProcessor {
    registry: Arc<ViewPoolRegistry>,
}

impl ViewPoolProcessor {
    pub fn new(registry: Arc<ViewPoolRegistry>) -> Self {
        ViewPoolProcessor { registry }
    }

    pub fn registry(&self) -> &ViewPoolRegistry {
        &self.registry
    }

    /// Reasons the given tree cannot be handed out verbatim.
    pub fn classify(tree: &ComponentTree) -> Vec<RefreshReason> {
        let mut reasons = Vec::new();
        if tree.is_structure_perturbed() {
            reasons.push(RefreshReason::StructurePerturbed);
        }
        if tree.has_dynamic_resources() {
            reasons.push(RefreshReason::DynamicResources);
        }
        let non_resettable = tree.walk().any(|key| {
            let node = tree.node(key);
            node.attachments().iter().any(|a| !a.is_reset_capable())
                || node.converter().is_some_and(|c| !c.is_reset_capable())
        });
        if non_resettable {
            reasons.push(RefreshReason::NonResettableState);
        }
        reasons
    }

    /// Offer a fully rendered tree to the pool at end of request.
    /// Returns whether the tree was stored.
    pub fn store_rendered_view(&self, ctx: &RequestContext, tree: ComponentTree) -> bool {
        if !self.registry.config().enabled {
            return false;
        }
        let reasons = Self::classify(&tree);
        let result = if reasons.is_empty() {
            RestoreResult::Complete
        } else {
            RestoreResult::RefreshRequired
        };
        debug!(
            view_id = %ctx.environment.view_id,
            ?result,
            ?reasons,
            "storing rendered view"
        );

        let metadata = Arc::new(ViewStructureMetadata::capture(&tree, ctx.environment.clone()));
        self.registry
            .store(tree, metadata, result, ctx.facelet_token.clone());
        true
    }

    /// Try to serve the request's view from the pool.
    ///
    /// `Ok(None)` is a miss — the caller performs a normal full build.
    /// On a hit the popped tree is returned ready to splice in; a
    /// `RefreshRequired` tree has already had its transient and
    /// non-facelet content cleared and, when the configured refresh
    /// strategy allows, the view build re-run over it.
    pub fn restore_from_pool(
        &self,
        ctx: &mut RequestContext,
        builder: &dyn ViewBuilder,
    ) -> anyhow::Result<Option<PooledRestore>> {
        if !self.registry.config().enabled {
            return Ok(None);
        }

        let popped = match &ctx.facelet_token {
            Some(token) => self
                .registry
                .pop_dynamic_structure_view(&ctx.environment, token)
                .or_else(|| {
                    self.registry
                        .pop_static_or_partial_structure_view(&ctx.environment)
                }),
            None => self
                .registry
                .pop_static_or_partial_structure_view(&ctx.environment),
        };
        let Some(popped) = popped else {
            return Ok(None);
        };

        // Pooled trees never carry view-scope data.
        ctx.view_scope.clear();

        let mut tree = popped.tree;
        match popped.result {
            RestoreResult::Complete => {
                debug!(view_id = %ctx.environment.view_id, "reusing pooled view verbatim");
            }
            RestoreResult::RefreshRequired => {
                debug!(view_id = %ctx.environment.view_id, "refreshing pooled view");
                tree.prune_transient_and_non_facelet();
                if self
                    .registry
                    .config()
                    .refresh_transient_build
                    .should_rebuild()
                {
                    let view_id = ctx.environment.view_id.clone();
                    builder.build_view(ctx, &mut tree, &view_id)?;
                }
            }
        }

        Ok(Some(PooledRestore {
            tree,
            result: popped.result,
        }))
    }
}
