//! Integration tests for tree-wide delta state saving: a simulated
//! request cycle of build → mark → mutate → save → restore into a
//! freshly built tree.

use arbor_component::prelude::*;

fn build_login_form() -> ComponentTree {
    let mut tree = ComponentTree::new(ComponentNode::new("login", "panel", "form"));
    let root = tree.root();
    let user = tree.create_node(ComponentNode::new("user", "input", "text"));
    let password = tree.create_node(ComponentNode::new("password", "input", "secret"));
    let submit = tree.create_node(ComponentNode::new("submit", "command", "button"));
    tree.attach_child(root, user);
    tree.attach_child(root, password);
    tree.attach_child(root, submit);
    let messages = tree.create_node(ComponentNode::new("messages", "output", "messages"));
    tree.set_facet(root, "messages", messages);
    tree.seal_structure();
    tree
}

fn find(tree: &ComponentTree, id: &str) -> NodeKey {
    tree.walk()
        .find(|&k| tree.node(k).id.as_str() == id)
        .unwrap_or_else(|| panic!("no node `{}`", id))
}

#[test]
fn request_cycle_round_trip() {
    let value = PropertyKey::from("value");
    let disabled = PropertyKey::from("disabled");

    // Request 1: build, establish the baseline, then apply the
    // request's mutations.
    let mut tree = build_login_form();
    let root = tree.root();
    mark_initial_state(&mut tree, root);

    let user = find(&tree, "user");
    let submit = find(&tree, "submit");
    tree.node_mut(user)
        .state_mut()
        .put(value.clone(), StateValue::from("alice"));
    tree.node_mut(submit)
        .state_mut()
        .put(disabled.clone(), StateValue::Bool(true));

    let saved = save_view_state(&tree, root, false).expect("state payload");
    assert!(!saved.is_noop());

    // Request 2: the framework rebuilds the same structure from the
    // view description and marks it, then restores the delta payload.
    let mut rebuilt = build_login_form();
    let rebuilt_root = rebuilt.root();
    mark_initial_state(&mut rebuilt, rebuilt_root);
    restore_view_state(&mut rebuilt, rebuilt_root, &saved);

    let user = find(&rebuilt, "user");
    let submit = find(&rebuilt, "submit");
    assert_eq!(
        rebuilt.node(user).state().get(&value),
        Some(StateValue::from("alice"))
    );
    assert_eq!(
        rebuilt.node(submit).state().get(&disabled),
        Some(StateValue::Bool(true))
    );

    // Untouched components saved nothing and restored to baseline.
    let password = find(&rebuilt, "password");
    assert_eq!(rebuilt.node(password).state().get(&value), None);
}

#[test]
fn unchanged_view_saves_a_noop_payload() {
    let mut tree = build_login_form();
    let root = tree.root();
    mark_initial_state(&mut tree, root);

    let saved = save_view_state(&tree, root, false).expect("payload");
    assert!(saved.is_noop());
}

#[test]
fn facet_state_round_trips() {
    let severity = PropertyKey::from("severity");

    let mut tree = build_login_form();
    let root = tree.root();
    mark_initial_state(&mut tree, root);

    let messages = find(&tree, "messages");
    tree.node_mut(messages)
        .state_mut()
        .put(severity.clone(), StateValue::from("warn"));

    let saved = save_view_state(&tree, root, false).unwrap();

    let mut rebuilt = build_login_form();
    let rebuilt_root = rebuilt.root();
    mark_initial_state(&mut rebuilt, rebuilt_root);
    restore_view_state(&mut rebuilt, rebuilt_root, &saved);

    let messages = find(&rebuilt, "messages");
    assert_eq!(
        rebuilt.node(messages).state().get(&severity),
        Some(StateValue::from("warn"))
    );
}

#[test]
fn expression_fallback_resolves_unset_properties() {
    struct FixedResolver;

    impl ExpressionResolver for FixedResolver {
        fn eval(&self, expression: &str) -> Option<StateValue> {
            (expression == "#{user.name}").then(|| StateValue::from("from-el"))
        }
    }

    let value = PropertyKey::from("value");
    let mut tree = build_login_form();
    let user = find(&tree, "user");
    tree.node_mut(user).bind(value.clone(), "#{user.name}");

    assert_eq!(
        tree.eval_property(user, &value, &FixedResolver),
        Some(StateValue::from("from-el"))
    );

    // A local value wins over the binding.
    tree.node_mut(user)
        .state_mut()
        .put(value.clone(), StateValue::from("local"));
    assert_eq!(
        tree.eval_property(user, &value, &FixedResolver),
        Some(StateValue::from("local"))
    );
}
