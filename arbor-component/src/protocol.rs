//! Component state protocol
//!
//! Tree-wide save and restore built on the delta state helper. Saving
//! composes, per node: its own helper payload, the payloads of its
//! attached objects, and the payloads of its non-transient children
//! and facets in order. Restoring is the structural inverse: values
//! are restored by position into a tree that already has the matching
//! structure — this protocol never reconstructs structure.

use crate::capability::Attachment;
use crate::state::SavedState;
use crate::tree::{ComponentTree, NodeKey};
use arbor_types::StateValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Saved state of one node and its subtree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TreeState {
    /// Whether this payload came from a full (non-delta) save, which
    /// includes transient children; restore walks the same child set
    /// the save did
    #[serde(default)]
    pub full: bool,

    /// The node's own helper payload, if any
    pub own: Option<SavedState>,

    /// Attached-object payloads, positional
    pub attachments: Vec<Option<StateValue>>,

    /// Converter payload, if a converter is attached and stateful
    pub converter: Option<StateValue>,

    /// Subtree payloads for non-transient children, in child order
    pub children: Vec<TreeState>,

    /// Subtree payloads for non-transient facets, by facet name
    pub facets: BTreeMap<String, TreeState>,
}

impl TreeState {
    /// Whether this payload (including every subtree) carries nothing.
    pub fn is_noop(&self) -> bool {
        self.own.is_none()
            && self.converter.is_none()
            && self.attachments.iter().all(Option::is_none)
            && self.children.iter().all(TreeState::is_noop)
            && self.facets.values().all(TreeState::is_noop)
    }
}

/// Save the state of the subtree rooted at `key`.
///
/// Returns `None` for a transient node: transient state is never
/// carried. With `full_save` set, transient children are included
/// anyway (a full, non-delta save of the whole tree).
pub fn save_view_state(tree: &ComponentTree, key: NodeKey, full_save: bool) -> Option<TreeState> {
    let node = tree.node(key);
    if node.transient && !full_save {
        return None;
    }

    let mut state = TreeState {
        full: full_save,
        own: node.state().save_state(),
        attachments: node
            .attachments()
            .iter()
            .map(Attachment::save_state)
            .collect(),
        converter: node.converter().and_then(Attachment::save_state),
        children: Vec::new(),
        facets: BTreeMap::new(),
    };

    for &child in node.children() {
        if let Some(child_state) = save_view_state(tree, child, full_save) {
            state.children.push(child_state);
        }
    }
    for (name, &facet) in node.facets() {
        if let Some(facet_state) = save_view_state(tree, facet, full_save) {
            state.facets.insert(name.clone(), facet_state);
        }
    }

    Some(state)
}

/// Restore saved state into the subtree rooted at `key`.
///
/// Children are matched by position among the same child set the save
/// walked (non-transient children, or all children for a full-save
/// payload), facets by name. The target tree must be structurally
/// equivalent to the tree the state was saved from.
///
/// # Panics
///
/// Panics when payload positions and tree structure disagree; that is
/// a contract violation (restoring into a structurally different
/// tree), never silently skipped.
pub fn restore_view_state(tree: &mut ComponentTree, key: NodeKey, state: &TreeState) {
    {
        let node = tree.node_mut(key);
        if let Some(own) = &state.own {
            node.state_mut().restore_state(own.clone());
        }
        assert_eq!(
            state.attachments.len(),
            node.attachments().len(),
            "attachment payload count disagrees with tree structure at `{}`",
            node.id.as_str()
        );
        for (attachment, payload) in node.attachments_mut().iter_mut().zip(&state.attachments) {
            if let Some(payload) = payload {
                attachment.restore_state(payload.clone());
            }
        }
        if let Some(payload) = &state.converter {
            let id = node.id.clone();
            let converter = node
                .converter_mut()
                .unwrap_or_else(|| panic!("converter payload but no converter at `{}`", id.as_str()));
            converter.restore_state(payload.clone());
        }
    }

    let children: Vec<NodeKey> = tree
        .node(key)
        .children()
        .iter()
        .copied()
        .filter(|&c| state.full || !tree.node(c).transient)
        .collect();
    assert_eq!(
        state.children.len(),
        children.len(),
        "child payload count disagrees with tree structure at `{}`",
        tree.node(key).id.as_str()
    );
    for (child, child_state) in children.into_iter().zip(&state.children) {
        restore_view_state(tree, child, child_state);
    }

    let facets: Vec<(String, NodeKey)> = tree
        .node(key)
        .facets()
        .iter()
        .filter(|(_, &f)| state.full || !tree.node(f).transient)
        .map(|(name, &f)| (name.clone(), f))
        .collect();
    assert_eq!(
        state.facets.len(),
        facets.len(),
        "facet payload count disagrees with tree structure at `{}`",
        tree.node(key).id.as_str()
    );
    for (name, facet) in facets {
        let facet_state = state
            .facets
            .get(&name)
            .unwrap_or_else(|| panic!("missing facet payload `{}`", name));
        restore_view_state(tree, facet, facet_state);
    }
}

/// Establish the delta baseline for the subtree rooted at `key`:
/// marks the node's helper and partial-capable attachments, then
/// recurses over non-transient children and facets.
pub fn mark_initial_state(tree: &mut ComponentTree, key: NodeKey) {
    {
        let node = tree.node_mut(key);
        node.state_mut().mark_initial_state();
        for attachment in node.attachments_mut() {
            attachment.mark_initial_state();
        }
        if let Some(converter) = node.converter_mut() {
            converter.mark_initial_state();
        }
    }
    for slot in subtree_slots(tree, key) {
        mark_initial_state(tree, slot);
    }
}

/// Return the subtree rooted at `key` to full-value mode, the inverse
/// of [`mark_initial_state`]. Used when a tree is about to serve as a
/// fresh template again.
pub fn clear_initial_state(tree: &mut ComponentTree, key: NodeKey) {
    {
        let node = tree.node_mut(key);
        node.state_mut().clear_initial_state();
        for attachment in node.attachments_mut() {
            attachment.clear_initial_state();
        }
        if let Some(converter) = node.converter_mut() {
            converter.clear_initial_state();
        }
    }
    for slot in subtree_slots(tree, key) {
        clear_initial_state(tree, slot);
    }
}

/// Non-transient children and facets of a node, in protocol order.
fn subtree_slots(tree: &ComponentTree, key: NodeKey) -> Vec<NodeKey> {
    let node = tree.node(key);
    node.children()
        .iter()
        .chain(node.facets().values())
        .copied()
        .filter(|&slot| !tree.node(slot).transient)
        .collect()
}
