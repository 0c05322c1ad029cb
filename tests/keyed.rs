use template_parts::{
	directives::{element_ref, repeat, ElementRef},
	html, Document, Error, Listener, Node, RenderOptions, Renderer, TemplateResult, Value,
};

fn item(key: i64) -> TemplateResult {
	html!(["<li>", "</li>"]; key)
}

fn list(keys: &[i64]) -> TemplateResult {
	html!(["<ul>", "</ul>"]; repeat(keys.iter().copied(), |key| *key, item))
}

fn items(container: &Node) -> Vec<Node> {
	let ul = container.child_nodes().into_iter().find(|node| node.tag_name() == Some("ul")).unwrap();
	ul.child_nodes().into_iter().filter(|node| node.tag_name() == Some("li")).collect()
}

fn labels(items: &[Node]) -> Vec<String> {
	items.iter().map(Node::text_content).collect()
}

fn test_keyed(before: &[i64], after: &[i64]) -> (Vec<Node>, Vec<Node>, u64) {
	let document = Document::new();
	let container = document.create_element("div");
	let renderer = Renderer::new();

	renderer.render(list(before), &container, RenderOptions::default()).unwrap();
	let old = items(&container);
	assert_eq!(labels(&old), before.iter().map(ToString::to_string).collect::<Vec<_>>());

	let mutations = document.mutation_count();
	renderer.render(list(after), &container, RenderOptions::default()).unwrap();
	let new = items(&container);
	assert_eq!(labels(&new), after.iter().map(ToString::to_string).collect::<Vec<_>>());
	(old, new, document.mutation_count() - mutations)
}

fn same_node(nodes: &[Node], label: &str) -> Node {
	nodes.iter().find(|node| node.text_content() == label).cloned().unwrap()
}

#[test]
fn reorder_keeps_nodes() {
	let (old, new, _) = test_keyed(&[1, 2, 3, 4, 5], &[5, 3, 1, 4, 2]);
	for key in ["1", "2", "3", "4", "5"] {
		assert!(same_node(&old, key).ptr_eq(&same_node(&new, key)));
	}
}

#[test]
fn identical_is_silent() {
	let (old, new, mutations) = test_keyed(&[1, 2, 3], &[1, 2, 3]);
	assert_eq!(mutations, 0);
	assert!(old.iter().zip(&new).all(|(a, b)| a.ptr_eq(b)));
}

#[test]
fn insert_and_remove() {
	let (old, new, _) = test_keyed(&[1, 2, 3], &[3, 4]);
	assert!(same_node(&old, "3").ptr_eq(&same_node(&new, "3")));
	assert!(old.iter().all(|node| !node.ptr_eq(&same_node(&new, "4"))));
	assert!(same_node(&old, "1").parent_node().is_none());
}

#[test]
fn swap_moves_little() {
	let (_, _, swapped) = test_keyed(&[1, 2, 3, 4, 5, 6], &[1, 5, 3, 4, 2, 6]);
	let (_, _, rotated) = test_keyed(&[1, 2, 3, 4, 5, 6], &[2, 3, 4, 5, 6, 1]);
	// Moving an item removes and reinserts its two markers and its <li>.
	assert_eq!(swapped, 3 * 6);
	assert_eq!(rotated, 6);
}

#[test]
fn duplicate_keys_fail_untouched() {
	let document = Document::new();
	let container = document.create_element("div");
	let renderer = Renderer::new();
	renderer.render(list(&[1, 2]), &container, RenderOptions::default()).unwrap();

	let mutations = document.mutation_count();
	assert!(matches!(
		renderer.render(list(&[2, 2]), &container, RenderOptions::default()),
		Err(Error::DuplicateKey(key)) if key == "2"
	));
	assert_eq!(document.mutation_count(), mutations);
	assert_eq!(labels(&items(&container)), ["1", "2"]);

	// Still usable afterwards.
	renderer.render(list(&[2, 1]), &container, RenderOptions::default()).unwrap();
	assert_eq!(labels(&items(&container)), ["2", "1"]);
}

fn entries(entries: Vec<(i64, Value)>) -> TemplateResult {
	html!(["<ul>", "</ul>"]; repeat(entries, |entry| entry.0, |entry| entry.1))
}

#[test]
fn failed_reconciliation_tears_down_leftovers() {
	let document = Document::new();
	let container = document.create_element("div");
	let renderer = Renderer::new();
	let target = ElementRef::default();
	let referenced = || -> Value { html!(["<li ", ">2</li>"]; element_ref(&target)).into() };
	renderer
		.render(entries(vec![(1, item(1).into()), (2, referenced())]), &container, RenderOptions::default())
		.unwrap();
	assert!(target.borrow().is_some());

	let result = renderer.render(
		entries(vec![(9, Listener::new(|_| ()).into()), (2, referenced())]),
		&container,
		RenderOptions::default(),
	);
	assert!(matches!(result, Err(Error::InvalidValue { value: "listener", .. })));
	assert!(target.borrow().is_none());
	assert!(items(&container).is_empty());

	renderer
		.render(entries(vec![(2, referenced())]), &container, RenderOptions::default())
		.unwrap();
	assert!(target.borrow().is_some());
	assert_eq!(labels(&items(&container)), ["2"]);
}
