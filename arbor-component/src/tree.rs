//! Arena-backed component tree
//!
//! Nodes live in a slotmap; children are ordered key sequences and
//! facets are named single-child slots. The parent link is a
//! non-owning back reference used to enforce the single-parent
//! invariant: attaching a node anywhere first detaches it from its
//! previous slot.
//!
//! The tree also carries the structural bookkeeping the view pool
//! decides reuse on: `seal_structure` marks the end of the template
//! build, and any later attach/detach of a non-transient node sets a
//! sticky perturbation flag that re-adding the same node does not
//! clear.

use crate::capability::Attachment;
use crate::state::{DeltaStateHelper, ExpressionResolver};
use arbor_types::{ComponentId, PropertyKey, StateValue};
use hashbrown::HashMap;
use slotmap::SlotMap;
use std::collections::BTreeMap;
use tracing::trace;

slotmap::new_key_type! {
    /// Arena key of a component node
    pub struct NodeKey;
}

/// A node in the component tree.
#[derive(Debug)]
pub struct ComponentNode {
    /// Identifier, unique among siblings
    pub id: ComponentId,

    /// Component family (e.g. `output`, `input`, `panel`)
    pub family: String,

    /// Concrete component type within the family
    pub component_type: String,

    /// Declared resource dependencies (scripts, stylesheets)
    pub resource_dependencies: Vec<String>,

    /// Transient nodes are never saved and never pooled
    pub transient: bool,

    /// Whether the node renders itself and its children
    pub rendered: bool,

    state: DeltaStateHelper,
    bindings: HashMap<PropertyKey, String>,
    attachments: Vec<Attachment>,
    converter: Option<Attachment>,

    children: Vec<NodeKey>,
    facets: BTreeMap<String, NodeKey>,
    parent: Option<NodeKey>,

    /// Part of the sealed, facelet-authored structure (as opposed to
    /// content added programmatically afterwards)
    facelet_created: bool,
}

impl ComponentNode {
    pub fn new(id: impl Into<ComponentId>, family: impl Into<String>, component_type: impl Into<String>) -> Self {
        ComponentNode {
            id: id.into(),
            family: family.into(),
            component_type: component_type.into(),
            resource_dependencies: Vec::new(),
            transient: false,
            rendered: true,
            state: DeltaStateHelper::new(),
            bindings: HashMap::new(),
            attachments: Vec::new(),
            converter: None,
            children: Vec::new(),
            facets: BTreeMap::new(),
            parent: None,
            facelet_created: false,
        }
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    pub fn with_resource_dependency(mut self, resource: impl Into<String>) -> Self {
        self.resource_dependencies.push(resource.into());
        self
    }

    pub fn state(&self) -> &DeltaStateHelper {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut DeltaStateHelper {
        &mut self.state
    }

    /// Bind a property to a value expression, evaluated by
    /// [`eval_property`](ComponentTree::eval_property) when no local
    /// value is set.
    pub fn bind(&mut self, key: PropertyKey, expression: impl Into<String>) {
        self.bindings.insert(key, expression.into());
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn attachments_mut(&mut self) -> &mut [Attachment] {
        &mut self.attachments
    }

    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }

    pub fn converter(&self) -> Option<&Attachment> {
        self.converter.as_ref()
    }

    pub fn converter_mut(&mut self) -> Option<&mut Attachment> {
        self.converter.as_mut()
    }

    pub fn set_converter(&mut self, converter: Attachment) {
        self.converter = Some(converter);
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    pub fn facets(&self) -> &BTreeMap<String, NodeKey> {
        &self.facets
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn is_facelet_created(&self) -> bool {
        self.facelet_created
    }
}

/// An owned component tree.
///
/// Ownership flows strictly root→children through the arena; parent
/// links are plain keys. Trees move in and out of the view pool as
/// whole values.
#[derive(Debug)]
pub struct ComponentTree {
    nodes: SlotMap<NodeKey, ComponentNode>,
    root: NodeKey,
    sealed: bool,
    structure_perturbed: bool,
    dynamic_resources_added: bool,
}

impl ComponentTree {
    /// Create a tree from its root node.
    pub fn new(root: ComponentNode) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(root);
        ComponentTree {
            nodes,
            root,
            sealed: false,
            structure_perturbed: false,
            dynamic_resources_added: false,
        }
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    pub fn node(&self, key: NodeKey) -> &ComponentNode {
        &self.nodes[key]
    }

    pub fn node_mut(&mut self, key: NodeKey) -> &mut ComponentNode {
        &mut self.nodes[key]
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert a detached node into the arena. It is not part of the
    /// tree until attached to a parent or facet slot.
    pub fn create_node(&mut self, node: ComponentNode) -> NodeKey {
        self.nodes.insert(node)
    }

    /// Append `child` to `parent`'s ordered children, detaching it
    /// from any previous slot first.
    pub fn attach_child(&mut self, parent: NodeKey, child: NodeKey) {
        self.detach(child);
        self.note_structure_change(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    /// Insert `child` at `index` in `parent`'s ordered children.
    pub fn insert_child(&mut self, parent: NodeKey, index: usize, child: NodeKey) {
        self.detach(child);
        self.note_structure_change(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.insert(index, child);
    }

    /// Put `child` into `parent`'s named facet slot, detaching any
    /// previous occupant of the slot (it stays in the arena, detached).
    pub fn set_facet(&mut self, parent: NodeKey, name: impl Into<String>, child: NodeKey) {
        let name = name.into();
        self.detach(child);
        self.note_structure_change(child);
        if let Some(previous) = self.nodes[parent].facets.remove(&name) {
            self.nodes[previous].parent = None;
        }
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].facets.insert(name, child);
    }

    /// Detach a node from its parent/facet slot. The node and its
    /// subtree stay in the arena and can be re-attached.
    pub fn detach(&mut self, key: NodeKey) {
        let Some(parent) = self.nodes[key].parent else {
            return;
        };
        self.note_structure_change(key);
        self.nodes[key].parent = None;
        let parent_node = &mut self.nodes[parent];
        if let Some(pos) = parent_node.children.iter().position(|&c| c == key) {
            parent_node.children.remove(pos);
        } else {
            parent_node.facets.retain(|_, &mut c| c != key);
        }
    }

    /// Detach a node and drop its whole subtree from the arena.
    ///
    /// # Panics
    ///
    /// Panics when `key` is the root: a tree without a root is not
    /// representable, so removing it is a contract violation.
    pub fn remove_subtree(&mut self, key: NodeKey) {
        assert!(
            key != self.root,
            "cannot remove the root node `{}`",
            self.nodes[key].id.as_str()
        );
        self.detach(key);
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.children);
                stack.extend(node.facets.into_values());
            }
        }
    }

    /// Mark the end of the template build. Every node present now is
    /// considered facelet-authored; structural changes from here on
    /// perturb the tree. Sealing again after a refresh build resets
    /// the perturbation bookkeeping for the next store decision.
    pub fn seal_structure(&mut self) {
        self.sealed = true;
        self.structure_perturbed = false;
        self.dynamic_resources_added = false;
        for (_, node) in self.nodes.iter_mut() {
            node.facelet_created = true;
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Whether a non-transient structural change happened after the
    /// seal. Sticky for the lifetime of this build: re-adding a
    /// removed child does not clear it.
    pub fn is_structure_perturbed(&self) -> bool {
        self.structure_perturbed
    }

    /// Record that a resource component was added outside the sealed
    /// template (e.g. by a dynamic include).
    pub fn note_dynamic_resource_added(&mut self) {
        self.dynamic_resources_added = true;
    }

    pub fn has_dynamic_resources(&self) -> bool {
        self.dynamic_resources_added
    }

    fn note_structure_change(&mut self, key: NodeKey) {
        if self.sealed && !self.nodes[key].transient && !self.structure_perturbed {
            trace!(id = %self.nodes[key].id.as_str(), "structure perturbed after seal");
            self.structure_perturbed = true;
        }
    }

    /// Evaluate a property on a node, falling back to its value
    /// expression binding through the given resolver.
    pub fn eval_property(
        &self,
        key: NodeKey,
        property: &PropertyKey,
        resolver: &dyn ExpressionResolver,
    ) -> Option<StateValue> {
        let node = &self.nodes[key];
        node.state.eval_with(property, || {
            node.bindings
                .get(property)
                .and_then(|expression| resolver.eval(expression))
        })
    }

    /// Depth-first walk over the attached tree (children before
    /// facets at each node), root first.
    pub fn walk(&self) -> TreeWalk<'_> {
        TreeWalk {
            tree: self,
            stack: vec![self.root],
        }
    }

    /// Remove every transient node and every node added outside the
    /// sealed facelet structure. Used to reconcile a pooled tree that
    /// needs a refresh before reuse.
    pub fn prune_transient_and_non_facelet(&mut self) {
        let doomed: Vec<NodeKey> = self
            .walk()
            .filter(|&key| key != self.root)
            .filter(|&key| {
                let node = &self.nodes[key];
                node.transient || !node.facelet_created
            })
            .collect();
        for key in doomed {
            // A doomed ancestor may have removed this node already.
            if self.nodes.contains_key(key) {
                self.remove_subtree(key);
            }
        }
    }
}

/// Iterator over a tree's attached nodes, depth first.
#[derive(Debug)]
pub struct TreeWalk<'a> {
    tree: &'a ComponentTree,
    stack: Vec<NodeKey>,
}

impl Iterator for TreeWalk<'_> {
    type Item = NodeKey;

    fn next(&mut self) -> Option<NodeKey> {
        let key = self.stack.pop()?;
        let node = &self.tree.nodes[key];
        // Reverse so children come off the stack in order.
        for &facet in node.facets.values().rev() {
            self.stack.push(facet);
        }
        for &child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(key)
    }
}
