//! End-to-end pool lifecycle scenarios: build a view, render, store,
//! then drive a second request against the pool.

use arbor_component::capability::{Attachment, StateHolder};
use arbor_component::prelude::*;
use arbor_pool::prelude::*;
use arbor_types::{PropertyKey, StateValue};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn environment(view_id: &str, locale: &str) -> RenderEnvironment {
    RenderEnvironment {
        view_id: ViewId::new(view_id),
        locale: Locale::new(locale),
        render_kit_id: RenderKitId::new("HTML_BASIC"),
        contracts: vec!["siteTheme".to_string()],
    }
}

/// Builds the same static page every time, the way a view description
/// would.
#[derive(Default)]
struct StaticPageBuilder {
    calls: AtomicU32,
}

impl StaticPageBuilder {
    fn fresh_tree(&self) -> ComponentTree {
        let mut tree = ComponentTree::new(ComponentNode::new("page", "panel", "group"));
        let root = tree.root();
        let title = tree.create_node(ComponentNode::new("title", "output", "text"));
        let body = tree.create_node(ComponentNode::new("body", "output", "text"));
        tree.attach_child(root, title);
        tree.attach_child(root, body);
        tree.seal_structure();
        tree
    }
}

impl ViewBuilder for StaticPageBuilder {
    fn build_view(
        &self,
        _ctx: &mut RequestContext,
        tree: &mut ComponentTree,
        _view_id: &ViewId,
    ) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tree.seal_structure();
        Ok(())
    }
}

fn enabled_processor() -> ViewPoolProcessor {
    ViewPoolProcessor::new(Arc::new(ViewPoolRegistry::new(PoolConfig::enabled())))
}

#[test]
fn static_page_is_reused_verbatim() {
    init_tracing();
    let processor = enabled_processor();
    let builder = StaticPageBuilder::default();

    // First request: full build, render, store at end of request.
    let ctx = RequestContext::new(environment("/staticPage.xhtml", "en"));
    let tree = builder.fresh_tree();
    assert!(processor.store_rendered_view(&ctx, tree));

    // Second request for the same view id / locale / render kit.
    let mut next = RequestContext::new(environment("/staticPage.xhtml", "en"));
    let restored = processor
        .restore_from_pool(&mut next, &builder)
        .unwrap()
        .expect("expected a pool hit");
    assert_eq!(restored.result, RestoreResult::Complete);
    assert_eq!(builder.calls.load(Ordering::SeqCst), 0);

    // The popped entry is gone: a third request misses.
    let mut third = RequestContext::new(environment("/staticPage.xhtml", "en"));
    assert!(processor
        .restore_from_pool(&mut third, &builder)
        .unwrap()
        .is_none());
}

#[test]
fn programmatic_child_change_forces_refresh() {
    let processor = enabled_processor();
    let builder = StaticPageBuilder::default();

    let ctx = RequestContext::new(environment("/staticPage.xhtml", "en"));
    let mut tree = builder.fresh_tree();
    let root = tree.root();
    let added = tree.create_node(ComponentNode::new("banner", "output", "text"));
    tree.attach_child(root, added);
    processor.store_rendered_view(&ctx, tree);

    let mut next = RequestContext::new(environment("/staticPage.xhtml", "en"));
    let restored = processor
        .restore_from_pool(&mut next, &builder)
        .unwrap()
        .unwrap();
    assert_eq!(restored.result, RestoreResult::RefreshRequired);
    assert_eq!(builder.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn readding_removed_child_is_still_a_refresh() {
    let processor = enabled_processor();
    let builder = StaticPageBuilder::default();

    let ctx = RequestContext::new(environment("/staticPage.xhtml", "en"));
    let mut tree = builder.fresh_tree();
    let root = tree.root();
    let title = tree
        .walk()
        .find(|&k| tree.node(k).id.as_str() == "title")
        .unwrap();

    // Remove and re-add the exact same child: net effect is zero, but
    // the perturbation is sticky for this save.
    tree.detach(title);
    tree.insert_child(root, 0, title);
    processor.store_rendered_view(&ctx, tree);

    let mut next = RequestContext::new(environment("/staticPage.xhtml", "en"));
    let restored = processor
        .restore_from_pool(&mut next, &builder)
        .unwrap()
        .unwrap();
    assert_eq!(restored.result, RestoreResult::RefreshRequired);
}

#[test]
fn locale_change_between_store_and_pop_misses() {
    let processor = enabled_processor();
    let builder = StaticPageBuilder::default();

    let ctx = RequestContext::new(environment("/staticPage.xhtml", "en"));
    processor.store_rendered_view(&ctx, builder.fresh_tree());

    let mut german = RequestContext::new(environment("/staticPage.xhtml", "de"));
    assert!(processor
        .restore_from_pool(&mut german, &builder)
        .unwrap()
        .is_none());
}

#[derive(Debug)]
struct LegacyConverter;

impl StateHolder for LegacyConverter {
    fn save_state(&self) -> Option<StateValue> {
        Some(StateValue::from("legacy"))
    }

    fn restore_state(&mut self, _state: StateValue) {}
}

#[test]
fn non_resettable_converter_is_never_complete() {
    let processor = enabled_processor();
    let builder = StaticPageBuilder::default();

    let ctx = RequestContext::new(environment("/staticPage.xhtml", "en"));
    let mut tree = builder.fresh_tree();
    let title = tree
        .walk()
        .find(|&k| tree.node(k).id.as_str() == "title")
        .unwrap();
    // No value ever changes on this converter; its capability alone
    // disqualifies verbatim reuse.
    tree.node_mut(title)
        .set_converter(Attachment::Full(Box::new(LegacyConverter)));
    processor.store_rendered_view(&ctx, tree);

    let mut next = RequestContext::new(environment("/staticPage.xhtml", "en"));
    let restored = processor
        .restore_from_pool(&mut next, &builder)
        .unwrap()
        .unwrap();
    assert_eq!(restored.result, RestoreResult::RefreshRequired);
}

#[test]
fn view_scope_never_crosses_requests() {
    let processor = enabled_processor();
    let builder = StaticPageBuilder::default();

    let mut ctx = RequestContext::new(environment("/staticPage.xhtml", "en"));
    ctx.view_scope
        .insert("wizardStep".to_string(), StateValue::Int(3));
    processor.store_rendered_view(&ctx, builder.fresh_tree());

    // Unrelated later request for the same view id.
    let mut next = RequestContext::new(environment("/staticPage.xhtml", "en"));
    next.view_scope
        .insert("stale".to_string(), StateValue::from("junk"));
    let restored = processor
        .restore_from_pool(&mut next, &builder)
        .unwrap()
        .unwrap();
    assert_eq!(restored.result, RestoreResult::Complete);
    assert!(next.view_scope.is_empty());
}

#[test]
fn pooled_tree_serves_as_fresh_state_template() {
    let processor = enabled_processor();
    let builder = StaticPageBuilder::default();
    let label = PropertyKey::from("value");

    // First request: build, mark the baseline, mutate during the
    // request, then reset to template state before pooling.
    let ctx = RequestContext::new(environment("/staticPage.xhtml", "en"));
    let mut tree = builder.fresh_tree();
    let root = tree.root();
    mark_initial_state(&mut tree, root);
    let title = tree
        .walk()
        .find(|&k| tree.node(k).id.as_str() == "title")
        .unwrap();
    tree.node_mut(title)
        .state_mut()
        .put(label.clone(), StateValue::from("Hello"));

    clear_initial_state(&mut tree, root);
    processor.store_rendered_view(&ctx, tree);

    // Second request: the pooled tree is the new template; marking it
    // again starts a clean delta baseline.
    let mut next = RequestContext::new(environment("/staticPage.xhtml", "en"));
    let mut restored = processor
        .restore_from_pool(&mut next, &builder)
        .unwrap()
        .unwrap();
    let root = restored.tree.root();
    mark_initial_state(&mut restored.tree, root);

    let saved = save_view_state(&restored.tree, root, false).unwrap();
    assert!(saved.is_noop());
}
