use std::{any::Any, cell::Cell, rc::Rc};
use template_parts::{dom::Namespace, html, svg, Document, Error, Listener, Node, RenderOptions, Renderer, TemplateResult, TemplateStrings, Value};

fn setup() -> (Document, Node, Renderer) {
	let document = Document::new();
	let container = document.create_element("div");
	(document, container, Renderer::new())
}

fn find(node: &Node, tag: &str) -> Option<Node> {
	node.child_nodes()
		.into_iter()
		.find_map(|child| if child.tag_name() == Some(tag) { Some(child) } else { find(&child, tag) })
}

fn card(title: &str, highlighted: bool) -> TemplateResult {
	html!(["<section class=\"card ", "\"><h1>", "</h1></section>"]; if highlighted { "on" } else { "off" }, title)
}

#[test]
fn call_site_is_parsed_once() {
	let (document, container, renderer) = setup();
	for title in ["a", "b", "c"] {
		renderer.render(card(title, false), &container, RenderOptions::default()).unwrap();
	}
	assert_eq!(renderer.template_count(), 1);

	// Equal content, but separate identities.
	let first = TemplateStrings::new(vec!["<p>", "</p>"]);
	let second = TemplateStrings::new(vec!["<p>", "</p>"]);
	let other = document.create_element("div");
	renderer.render(TemplateResult::html(first.clone(), vec!["x".into()]), &other, RenderOptions::default()).unwrap();
	renderer.render(TemplateResult::html(second.clone(), vec!["x".into()]), &other, RenderOptions::default()).unwrap();
	assert_eq!(renderer.template_count(), 3);

	drop((first, second));
	assert_eq!(renderer.purge_templates(), 2);
	assert_eq!(renderer.template_count(), 1);
}

#[test]
fn same_values_commit_nothing() {
	let (document, container, renderer) = setup();
	renderer.render(card("title", true), &container, RenderOptions::default()).unwrap();
	let before = document.mutation_count();
	renderer.render(card("title", true), &container, RenderOptions::default()).unwrap();
	assert_eq!(document.mutation_count(), before);
}

#[test]
fn text_node_is_reused() {
	let (document, container, renderer) = setup();
	renderer.render(card("a", false), &container, RenderOptions::default()).unwrap();
	let h1 = find(&container, "h1").unwrap();
	let text = h1.child_nodes().into_iter().find(Node::is_text).unwrap();

	let before = document.mutation_count();
	renderer.render(card("b", false), &container, RenderOptions::default()).unwrap();
	assert_eq!(document.mutation_count(), before + 1);
	assert_eq!(text.data(), "b");
	assert!(find(&container, "h1").unwrap().ptr_eq(&h1));
}

#[test]
fn interpolated_attribute_updates_in_place() {
	let (document, container, renderer) = setup();
	let view = |middle: &str| html!(["<p id=\"p\" class=\"x ", "\" title=\"t\"></p>"]; middle);

	renderer.render(view("y"), &container, RenderOptions::default()).unwrap();
	let p = find(&container, "p").unwrap();
	assert_eq!(p.get_attribute("class").as_deref(), Some("x y"));

	let before = document.mutation_count();
	renderer.render(view("z"), &container, RenderOptions::default()).unwrap();
	assert_eq!(document.mutation_count(), before + 1);
	assert!(find(&container, "p").unwrap().ptr_eq(&p));
	assert_eq!(p.get_attribute("class").as_deref(), Some("x z"));
	assert_eq!(p.get_attribute("id").as_deref(), Some("p"));
}

#[test]
fn sentinels() {
	let (document, container, renderer) = setup();
	let view = |value: Value| html!(["<p title=", ">", "</p>"]; value.clone(), value);

	renderer.render(view("a".into()), &container, RenderOptions::default()).unwrap();
	let p = find(&container, "p").unwrap();
	assert_eq!(p.get_attribute("title").as_deref(), Some("a"));
	assert_eq!(p.text_content(), "a");

	let before = document.mutation_count();
	renderer.render(view(Value::NoChange), &container, RenderOptions::default()).unwrap();
	assert_eq!(document.mutation_count(), before);
	assert_eq!(p.text_content(), "a");

	renderer.render(view(Value::Nothing), &container, RenderOptions::default()).unwrap();
	assert!(!p.has_attribute("title"));
	assert_eq!(p.text_content(), "");

	renderer.render(view(None::<&str>.into()), &container, RenderOptions::default()).unwrap();
	assert!(!p.has_attribute("title"));
}

#[test]
fn no_change_after_nothing_stays_empty() {
	let (document, container, renderer) = setup();
	let view = |value: Value| html!(["<p>", "</p>"]; value);
	renderer.render(view("a".into()), &container, RenderOptions::default()).unwrap();
	let p = find(&container, "p").unwrap();

	renderer.render(view(Value::Nothing), &container, RenderOptions::default()).unwrap();
	assert_eq!(p.text_content(), "");
	let before = document.mutation_count();
	renderer.render(view(Value::NoChange), &container, RenderOptions::default()).unwrap();
	assert_eq!(p.text_content(), "");
	assert_eq!(document.mutation_count(), before);

	renderer.render(view("b".into()), &container, RenderOptions::default()).unwrap();
	assert_eq!(p.text_content(), "b");
}

#[test]
fn unmount_forgets_the_container() {
	let (document, container, renderer) = setup();
	let other = document.create_element("div");
	renderer.render(card("a", true), &container, RenderOptions::default()).unwrap();
	renderer.render("b", &other, RenderOptions::default()).unwrap();
	assert_eq!(renderer.root_count(), 2);

	assert!(renderer.unmount(&container));
	assert!(container.child_nodes().is_empty());
	assert_eq!(renderer.root_count(), 1);
	assert!(!renderer.unmount(&container));
	assert!(renderer.unmount(&other));
	assert_eq!(renderer.root_count(), 0);

	renderer.render(card("c", false), &container, RenderOptions::default()).unwrap();
	assert_eq!(container.text_content(), "c");
	assert_eq!(renderer.root_count(), 1);
}

#[test]
fn boolean_and_property_bindings() {
	let (_, container, renderer) = setup();
	let view = |disabled: bool, value: &str| html!(["<input ?disabled=", " .value=", ">"]; disabled, value);

	renderer.render(view(true, "hi"), &container, RenderOptions::default()).unwrap();
	let input = find(&container, "input").unwrap();
	assert!(input.has_attribute("disabled"));
	assert!(matches!(input.property("value"), Some(Value::Str(value)) if &*value == "hi"));
	assert!(!input.has_attribute("value"));

	renderer.render(view(false, "ho"), &container, RenderOptions::default()).unwrap();
	assert!(!input.has_attribute("disabled"));
	assert!(matches!(input.property("value"), Some(Value::Str(value)) if &*value == "ho"));
}

#[test]
fn events_see_the_host() {
	let (_, container, renderer) = setup();
	let clicks = Rc::new(Cell::new(0));
	let listener = {
		let clicks = Rc::clone(&clicks);
		Listener::new(move |event| {
			if event.host().and_then(|host| host.downcast_ref::<u32>()) == Some(&42) {
				clicks.set(clicks.get() + 1);
			}
		})
	};
	let host: Rc<dyn Any> = Rc::new(42_u32);
	let options = || RenderOptions {
		host: Some(Rc::clone(&host)),
		..RenderOptions::default()
	};
	let view = |listener: Value| html!(["<button @click=", ">Go</button>"]; listener);

	renderer.render(view(listener.clone().into()), &container, options()).unwrap();
	let button = find(&container, "button").unwrap();
	assert_eq!(button.dispatch_event("click"), 1);
	assert_eq!(clicks.get(), 1);

	renderer.render(view(listener.into()), &container, options()).unwrap();
	assert_eq!(button.listener_count(), 1);

	renderer.render(view(Value::Nothing), &container, options()).unwrap();
	assert_eq!(button.listener_count(), 0);
	assert_eq!(button.dispatch_event("click"), 0);
	assert_eq!(clicks.get(), 1);
}

#[test]
fn positional_lists_reuse_by_index() {
	let (_, container, renderer) = setup();
	let item = |label: &str| html!(["<li>", "</li>"]; label);
	let view = |labels: &[&str]| html!(["<ul>", "</ul>"]; labels.iter().map(|label| item(*label)).collect::<Vec<_>>());

	renderer.render(view(&["a", "b"]), &container, RenderOptions::default()).unwrap();
	let ul = find(&container, "ul").unwrap();
	let first = find(&ul, "li").unwrap();

	renderer.render(view(&["b", "a", "c"]), &container, RenderOptions::default()).unwrap();
	assert!(find(&ul, "li").unwrap().ptr_eq(&first));
	assert_eq!(first.text_content(), "b");
	assert_eq!(ul.text_content(), "bac");

	renderer.render(view(&[]), &container, RenderOptions::default()).unwrap();
	assert!(find(&ul, "li").is_none());
}

#[test]
fn template_switch_replaces_content() {
	let (_, container, renderer) = setup();
	renderer.render(card("a", false), &container, RenderOptions::default()).unwrap();
	renderer.render(html!(["<em>", "</em>"]; 1), &container, RenderOptions::default()).unwrap();
	assert!(find(&container, "section").is_none());
	assert_eq!(find(&container, "em").unwrap().text_content(), "1");

	renderer.render("plain", &container, RenderOptions::default()).unwrap();
	assert_eq!(container.text_content(), "plain");
}

#[test]
fn render_before_keeps_surrounding_nodes() {
	let (document, container, renderer) = setup();
	let footer = document.create_element("footer");
	container.append_child(&footer).unwrap();
	renderer
		.render(
			card("a", false),
			&container,
			RenderOptions {
				render_before: Some(footer.clone()),
				..RenderOptions::default()
			},
		)
		.unwrap();
	assert!(container.last_child().unwrap().ptr_eq(&footer));
	assert!(find(&container, "section").is_some());
}

#[test]
fn svg_fragments_get_the_svg_namespace() {
	let document = Document::new();
	let container = document.create_element_ns("svg", Namespace::Svg);
	Renderer::new()
		.render(svg!(["<circle r=", "></circle>"]; 5), &container, RenderOptions::default())
		.unwrap();
	let circle = find(&container, "circle").unwrap();
	assert_eq!(circle.namespace(), Some(Namespace::Svg));
	assert_eq!(circle.get_attribute("r").as_deref(), Some("5"));
}

#[test]
fn value_count_is_checked() {
	let (_, container, renderer) = setup();
	let result = TemplateResult::html(TemplateStrings::from_static(&["<p>", "</p>"]), Vec::new());
	assert!(matches!(
		renderer.render(result, &container, RenderOptions::default()),
		Err(Error::ValueCountMismatch { expected: 1, received: 0 })
	));
}

#[test]
fn raw_text_bindings_are_rejected() {
	let (_, container, renderer) = setup();
	let result = html!(["<style>p { color: ", "; }</style>"]; "red");
	assert!(matches!(
		renderer.render(result, &container, RenderOptions::default()),
		Err(Error::UnsupportedBindingPosition { index: 0, .. })
	));
}

#[test]
fn listeners_are_not_text() {
	let (_, container, renderer) = setup();
	let result = html!(["<p>", "</p>"]; Listener::new(|_| ()));
	assert!(matches!(
		renderer.render(result, &container, RenderOptions::default()),
		Err(Error::InvalidValue { value: "listener", .. })
	));
}
