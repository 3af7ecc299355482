//! View structure metadata
//!
//! An immutable structural snapshot of a component tree: per node its
//! id, family, type, a fingerprint of its declared resource
//! dependencies, and the ordered child/facet topology — never property
//! values. Captured at the end of a first full build, it is compared
//! by structural equality against a live tree to decide whether a
//! pooled tree still has the shape the view description would produce.

use arbor_component::tree::{ComponentTree, NodeKey};
use arbor_types::{ComponentId, Locale, RenderKitId, ViewId};
use serde::{Deserialize, Serialize};

/// The environment a view was rendered under. Two views are only ever
/// comparable when every part of this key matches exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderEnvironment {
    pub view_id: ViewId,
    pub locale: Locale,
    pub render_kit_id: RenderKitId,
    /// Active resource-library contracts, in application order
    pub contracts: Vec<String>,
}

/// Structural snapshot of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStructure {
    pub id: ComponentId,
    pub family: String,
    pub component_type: String,

    /// Fingerprint of the declared resource dependencies
    pub resource_fingerprint: [u8; 32],

    pub children: Vec<NodeStructure>,

    /// Facet name → structure, in facet iteration order
    pub facets: Vec<(String, NodeStructure)>,
}

/// Structural snapshot of a whole view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewStructureMetadata {
    pub environment: RenderEnvironment,
    pub root: NodeStructure,

    /// Digest over the full structural walk; equal digests mean equal
    /// structure for pool keying purposes
    pub digest: [u8; 32],
}

impl ViewStructureMetadata {
    /// Capture the structure of a tree's non-transient nodes.
    pub fn capture(tree: &ComponentTree, environment: RenderEnvironment) -> Self {
        let root = capture_node(tree, tree.root());
        let digest = structural_digest(&environment, &root);
        ViewStructureMetadata {
            environment,
            root,
            digest,
        }
    }

    /// Whether the environment key matches. A mismatch here always
    /// rejects an entry outright — never "refresh required".
    pub fn environment_matches(&self, environment: &RenderEnvironment) -> bool {
        self.environment == *environment
    }

    /// Lockstep structural comparison against a live tree. Any shape,
    /// id or type mismatch at a corresponding position is a mismatch;
    /// there is no partial credit.
    pub fn matches(&self, tree: &ComponentTree) -> bool {
        node_matches(tree, tree.root(), &self.root)
    }
}

fn capture_node(tree: &ComponentTree, key: NodeKey) -> NodeStructure {
    let node = tree.node(key);
    NodeStructure {
        id: node.id.clone(),
        family: node.family.clone(),
        component_type: node.component_type.clone(),
        resource_fingerprint: fingerprint_resources(&node.resource_dependencies),
        children: node
            .children()
            .iter()
            .filter(|&&c| !tree.node(c).transient)
            .map(|&c| capture_node(tree, c))
            .collect(),
        facets: node
            .facets()
            .iter()
            .filter(|(_, &f)| !tree.node(f).transient)
            .map(|(name, &f)| (name.clone(), capture_node(tree, f)))
            .collect(),
    }
}

fn node_matches(tree: &ComponentTree, key: NodeKey, expected: &NodeStructure) -> bool {
    let node = tree.node(key);
    if node.id != expected.id
        || node.family != expected.family
        || node.component_type != expected.component_type
        || fingerprint_resources(&node.resource_dependencies) != expected.resource_fingerprint
    {
        return false;
    }

    let children: Vec<NodeKey> = node
        .children()
        .iter()
        .copied()
        .filter(|&c| !tree.node(c).transient)
        .collect();
    if children.len() != expected.children.len() {
        return false;
    }
    if !children
        .iter()
        .zip(&expected.children)
        .all(|(&c, e)| node_matches(tree, c, e))
    {
        return false;
    }

    let facets: Vec<(&String, NodeKey)> = node
        .facets()
        .iter()
        .filter(|(_, &f)| !tree.node(f).transient)
        .map(|(name, &f)| (name, f))
        .collect();
    if facets.len() != expected.facets.len() {
        return false;
    }
    facets
        .iter()
        .zip(&expected.facets)
        .all(|((name, f), (expected_name, e))| {
            *name == expected_name && node_matches(tree, *f, e)
        })
}

fn fingerprint_resources(resources: &[String]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for resource in resources {
        hasher.update(resource.as_bytes());
        hasher.update(&[0]);
    }
    *hasher.finalize().as_bytes()
}

fn structural_digest(environment: &RenderEnvironment, root: &NodeStructure) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(environment.view_id.as_str().as_bytes());
    hasher.update(&[0]);
    hasher.update(environment.locale.as_str().as_bytes());
    hasher.update(&[0]);
    hasher.update(environment.render_kit_id.as_str().as_bytes());
    hasher.update(&[0]);
    for contract in &environment.contracts {
        hasher.update(contract.as_bytes());
        hasher.update(&[0]);
    }
    digest_node(&mut hasher, root);
    *hasher.finalize().as_bytes()
}

fn digest_node(hasher: &mut blake3::Hasher, node: &NodeStructure) {
    hasher.update(node.id.as_str().as_bytes());
    hasher.update(&[1]);
    hasher.update(node.family.as_bytes());
    hasher.update(&[1]);
    hasher.update(node.component_type.as_bytes());
    hasher.update(&[1]);
    hasher.update(&node.resource_fingerprint);
    hasher.update(&(node.children.len() as u64).to_le_bytes());
    for child in &node.children {
        digest_node(hasher, child);
    }
    hasher.update(&(node.facets.len() as u64).to_le_bytes());
    for (name, facet) in &node.facets {
        hasher.update(name.as_bytes());
        hasher.update(&[2]);
        digest_node(hasher, facet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_component::tree::ComponentNode;

    fn environment() -> RenderEnvironment {
        RenderEnvironment {
            view_id: ViewId::new("/staticPage.xhtml"),
            locale: Locale::new("en"),
            render_kit_id: RenderKitId::new("HTML_BASIC"),
            contracts: vec!["default".to_string()],
        }
    }

    fn sample_tree() -> ComponentTree {
        let mut tree = ComponentTree::new(ComponentNode::new("root", "panel", "group"));
        let root = tree.root();
        let a = tree.create_node(
            ComponentNode::new("a", "output", "text").with_resource_dependency("site.css"),
        );
        let b = tree.create_node(ComponentNode::new("b", "input", "text"));
        tree.attach_child(root, a);
        tree.attach_child(root, b);
        let header = tree.create_node(ComponentNode::new("h", "output", "text"));
        tree.set_facet(root, "header", header);
        tree
    }

    #[test]
    fn test_capture_matches_itself() {
        let tree = sample_tree();
        let metadata = ViewStructureMetadata::capture(&tree, environment());
        assert!(metadata.matches(&tree));
        assert!(metadata.environment_matches(&environment()));
    }

    #[test]
    fn test_removed_child_is_a_mismatch() {
        let mut tree = sample_tree();
        let metadata = ViewStructureMetadata::capture(&tree, environment());

        let b = tree
            .walk()
            .find(|&k| tree.node(k).id.as_str() == "b")
            .unwrap();
        tree.remove_subtree(b);
        assert!(!metadata.matches(&tree));
    }

    #[test]
    fn test_changed_type_is_a_mismatch() {
        let tree = sample_tree();
        let metadata = ViewStructureMetadata::capture(&tree, environment());

        let mut other = sample_tree();
        let a = other
            .walk()
            .find(|&k| other.node(k).id.as_str() == "a")
            .unwrap();
        other.node_mut(a).component_type = "label".to_string();
        assert!(!metadata.matches(&other));
    }

    #[test]
    fn test_transient_nodes_are_invisible_to_structure() {
        let mut tree = sample_tree();
        let metadata = ViewStructureMetadata::capture(&tree, environment());

        let root = tree.root();
        let transient = tree.create_node(ComponentNode::new("tmp", "output", "text").transient());
        tree.attach_child(root, transient);
        assert!(metadata.matches(&tree));
    }

    #[test]
    fn test_digest_depends_on_environment() {
        let tree = sample_tree();
        let metadata = ViewStructureMetadata::capture(&tree, environment());

        let mut german = environment();
        german.locale = Locale::new("de");
        let other = ViewStructureMetadata::capture(&tree, german);

        assert_ne!(metadata.digest, other.digest);
        assert!(!other.environment_matches(&environment()));
    }

    #[test]
    fn test_metadata_serde_round_trip() {
        let tree = sample_tree();
        let metadata = ViewStructureMetadata::capture(&tree, environment());

        let json = serde_json::to_string(&metadata).unwrap();
        let back: ViewStructureMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(metadata, back);
        assert!(back.matches(&tree));
    }

    #[test]
    fn test_resource_dependency_changes_digest() {
        let tree = sample_tree();
        let metadata = ViewStructureMetadata::capture(&tree, environment());

        let mut other_tree = sample_tree();
        let a = other_tree
            .walk()
            .find(|&k| other_tree.node(k).id.as_str() == "a")
            .unwrap();
        other_tree
            .node_mut(a)
            .resource_dependencies
            .push("extra.js".to_string());
        let other = ViewStructureMetadata::capture(&other_tree, environment());

        assert_ne!(metadata.digest, other.digest);
        assert!(!metadata.matches(&other_tree));
    }
}
