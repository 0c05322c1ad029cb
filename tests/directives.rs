use futures::{
	channel::oneshot,
	executor::LocalPool,
	task::LocalSpawn,
};
use std::{
	cell::{Cell, RefCell},
	rc::Rc,
};
use template_parts::{
	directive,
	directives::{class_map, element_ref, guard, repeat, until, ElementRef},
	html, Directive, DirectiveHandle, DirectivePart, Document, Error, Listener, Node, PartInfo, PartKind, PendingValue, RenderOptions, Renderer, TemplateResult,
	Value,
};

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

fn pending() -> (oneshot::Sender<&'static str>, PendingValue) {
	let (sender, receiver) = oneshot::channel();
	(sender, PendingValue::new(async move { receiver.await.map_or(Value::Nothing, Value::from) }))
}

#[test]
fn affinity_is_checked() {
	let (_, container, renderer) = setup();
	let misplaced = html!(["<p title=", "></p>"]; repeat([1_i64, 2], |key| *key, |key| key));
	assert!(matches!(
		renderer.render(misplaced, &container, RenderOptions::default()),
		Err(Error::DirectivePartMismatch {
			directive: "repeat",
			kind: PartKind::Attribute,
			..
		})
	));

	let wrong_attribute = html!(["<p title=", "></p>"]; class_map([("a", true)]));
	assert!(matches!(
		renderer.render(wrong_attribute, &container, RenderOptions::default()),
		Err(Error::DirectivePartMismatch { directive: "class_map", .. })
	));

	let interpolated = html!(["<p class=\"x ", "\"></p>"]; class_map([("a", true)]));
	assert!(matches!(
		renderer.render(interpolated, &container, RenderOptions::default()),
		Err(Error::DirectivePartMismatch { directive: "class_map", .. })
	));
}

#[test]
fn class_map_toggles() {
	let (_, container, renderer) = setup();
	let view = |b: bool| html!(["<p class=", "></p>"]; class_map([("a", true), ("b", b), ("c", true)]));
	renderer.render(view(false), &container, RenderOptions::default()).unwrap();
	let p = find(&container, "p").unwrap();
	assert_eq!(p.get_attribute("class").as_deref(), Some("a c"));
	renderer.render(view(true), &container, RenderOptions::default()).unwrap();
	assert_eq!(p.get_attribute("class").as_deref(), Some("a b c"));
}

#[test]
fn guard_skips_unchanged_dependencies() {
	let (_, container, renderer) = setup();
	let calls = Rc::new(Cell::new(0));
	let view = |dependency: i32| {
		let calls = Rc::clone(&calls);
		html!(["<p>", "</p>"]; guard([Value::from(dependency)], move || {
			calls.set(calls.get() + 1);
			calls.get()
		}))
	};

	renderer.render(view(1), &container, RenderOptions::default()).unwrap();
	renderer.render(view(1), &container, RenderOptions::default()).unwrap();
	assert_eq!(calls.get(), 1);
	assert_eq!(container.text_content(), "1");

	renderer.render(view(2), &container, RenderOptions::default()).unwrap();
	assert_eq!(calls.get(), 2);
	assert_eq!(container.text_content(), "2");
}

#[test]
fn element_ref_follows_connection() {
	let (_, container, renderer) = setup();
	let target = ElementRef::default();
	renderer
		.render(html!(["<input ", ">"]; element_ref(&target)), &container, RenderOptions::default())
		.unwrap();
	let input = find(&container, "input").unwrap();
	assert!(target.borrow().as_ref().unwrap().ptr_eq(&input));

	renderer.set_connected(&container, false);
	assert!(target.borrow().is_none());
	renderer.set_connected(&container, true);
	assert!(target.borrow().as_ref().unwrap().ptr_eq(&input));

	renderer.render("gone", &container, RenderOptions::default()).unwrap();
	assert!(target.borrow().is_none());
}

struct Async {
	pool: LocalPool,
	spawner: Rc<dyn LocalSpawn>,
}

impl Async {
	fn new() -> Self {
		let pool = LocalPool::new();
		let spawner = Rc::new(pool.spawner());
		Self { pool, spawner }
	}

	fn options(&self) -> RenderOptions {
		RenderOptions {
			spawner: Some(Rc::clone(&self.spawner)),
			..RenderOptions::default()
		}
	}
}

fn loading(value: PendingValue) -> Value {
	html!(["<p>", "</p>"]; until(value, "loading")).into()
}

#[test]
fn until_commits_on_flush() {
	let (_, container, renderer) = setup();
	let mut tasks = Async::new();
	let requests = Rc::new(Cell::new(0));
	renderer.on_update_requested({
		let requests = Rc::clone(&requests);
		move || requests.set(requests.get() + 1)
	});

	let (sender, value) = pending();
	renderer.render(loading(value), &container, tasks.options()).unwrap();
	assert_eq!(container.text_content(), "loading");

	sender.send("done").unwrap();
	tasks.pool.run_until_stalled();
	assert_eq!(requests.get(), 1);
	assert!(renderer.needs_flush());
	assert_eq!(container.text_content(), "loading");

	assert_eq!(renderer.flush().unwrap(), 1);
	assert_eq!(container.text_content(), "done");
	assert!(!renderer.needs_flush());
}

#[test]
fn until_waits_for_reconnection() {
	let (document, container, renderer) = setup();
	let mut tasks = Async::new();
	let (sender, value) = pending();
	renderer.render(loading(value), &container, tasks.options()).unwrap();

	renderer.set_connected(&container, false);
	let mutations = document.mutation_count();
	sender.send("done").unwrap();
	tasks.pool.run_until_stalled();
	assert!(!renderer.needs_flush());
	assert_eq!(renderer.flush().unwrap(), 0);
	assert_eq!(document.mutation_count(), mutations);

	renderer.set_connected(&container, true);
	assert!(renderer.needs_flush());
	assert_eq!(renderer.flush().unwrap(), 1);
	assert_eq!(container.text_content(), "done");
}

#[test]
fn superseded_until_is_dropped() {
	let (_, container, renderer) = setup();
	let mut tasks = Async::new();
	let (first_sender, first) = pending();
	let (_second_sender, second) = pending();
	renderer.render(loading(first), &container, tasks.options()).unwrap();
	renderer.render(loading(second), &container, tasks.options()).unwrap();

	first_sender.send("stale").unwrap();
	tasks.pool.run_until_stalled();
	assert!(!renderer.needs_flush());
	assert_eq!(container.text_content(), "loading");
}

#[test]
fn removed_until_is_inert() {
	let (_, container, renderer) = setup();
	let mut tasks = Async::new();
	let (sender, value) = pending();
	renderer.render(loading(value), &container, tasks.options()).unwrap();
	renderer.render("replaced", &container, tasks.options()).unwrap();

	sender.send("late").unwrap();
	tasks.pool.run_until_stalled();
	assert!(!renderer.needs_flush());
	assert_eq!(container.text_content(), "replaced");
}

/// Renders 0 and hands out a handle for pushing more.
struct Ticker;

impl Directive for Ticker {
	type Args = Rc<Cell<Option<DirectiveHandle>>>;

	fn new(info: &PartInfo) -> template_parts::Result<Self> {
		info.expect_kind("ticker", &[PartKind::Child, PartKind::Attribute], "it pushes text")?;
		Ok(Self)
	}

	fn render(&mut self, _: &Self::Args) -> Value {
		0.into()
	}

	fn update(&mut self, part: &mut DirectivePart<'_, '_>, slot: &Self::Args) -> template_parts::Result<Value> {
		slot.set(Some(part.handle()));
		Ok(self.render(slot))
	}
}

fn ticking(title: &Rc<Cell<Option<DirectiveHandle>>>, text: &Rc<Cell<Option<DirectiveHandle>>>) -> TemplateResult {
	html!(["<p title=", ">", "</p>"]; directive::<Ticker>(Rc::clone(title)), directive::<Ticker>(Rc::clone(text)))
}

fn push(slot: &Rc<Cell<Option<DirectiveHandle>>>, value: impl Into<Value>) -> bool {
	let handle = slot.take().unwrap();
	let accepted = handle.set_value(value);
	slot.set(Some(handle));
	accepted
}

#[test]
fn handles_push_in_document_order() {
	let (_, container, renderer) = setup();
	let title = Rc::new(Cell::new(None));
	let text = Rc::new(Cell::new(None));
	renderer.render(ticking(&title, &text), &container, RenderOptions::default()).unwrap();
	let p = find(&container, "p").unwrap();
	assert_eq!(p.get_attribute("title").as_deref(), Some("0"));

	assert!(push(&text, 2));
	assert!(push(&title, 1));
	assert_eq!(renderer.flush().unwrap(), 2);
	assert_eq!(p.get_attribute("title").as_deref(), Some("1"));
	assert_eq!(p.text_content(), "2");

	// Same template and directive, but new arguments: the old handle is stale.
	let stale = text.take().unwrap();
	renderer.render(ticking(&title, &text), &container, RenderOptions::default()).unwrap();
	assert!(find(&container, "p").unwrap().ptr_eq(&p));
	assert!(!stale.is_live());
	assert!(!stale.set_value(3));
	assert!(push(&text, 4));
	assert_eq!(renderer.flush().unwrap(), 1);
	assert_eq!(p.text_content(), "4");
}

#[test]
fn hook_may_flush_during_reconnection() {
	let (_, container, renderer) = setup();
	let renderer = Rc::new(renderer);
	let flushed = Rc::new(RefCell::new(Vec::new()));
	renderer.on_update_requested({
		let renderer = Rc::downgrade(&renderer);
		let flushed = Rc::clone(&flushed);
		move || {
			if let Some(renderer) = renderer.upgrade() {
				let count = renderer.flush().unwrap();
				flushed.borrow_mut().push(count);
			}
		}
	});
	let mut tasks = Async::new();
	let (sender, value) = pending();
	renderer.render(loading(value), &container, tasks.options()).unwrap();

	renderer.set_connected(&container, false);
	sender.send("done").unwrap();
	tasks.pool.run_until_stalled();
	assert!(flushed.borrow().is_empty());

	renderer.set_connected(&container, true);
	assert_eq!(container.text_content(), "done");
	assert_eq!(flushed.borrow().iter().sum::<usize>(), 1);
	assert!(!renderer.needs_flush());
}

#[test]
fn failed_flush_still_flushes_other_roots() {
	let document = Document::new();
	let renderer = Renderer::new();
	let (broken, working) = (document.create_element("div"), document.create_element("div"));
	let (broken_slot, working_slot) = (Rc::new(Cell::new(None)), Rc::new(Cell::new(None)));
	for (container, slot) in [(&broken, &broken_slot), (&working, &working_slot)] {
		renderer
			.render(html!(["<p>", "</p>"]; directive::<Ticker>(Rc::clone(slot))), container, RenderOptions::default())
			.unwrap();
	}

	assert!(push(&broken_slot, Listener::new(|_| ())));
	assert!(push(&working_slot, 5));
	assert!(matches!(renderer.flush(), Err(Error::InvalidValue { value: "listener", .. })));
	assert_eq!(working.text_content(), "5");
	assert!(!renderer.needs_flush());
	assert_eq!(renderer.flush().unwrap(), 0);
}

#[test]
fn unmount_clears_element_refs() {
	let (_, container, renderer) = setup();
	let target = ElementRef::default();
	renderer
		.render(html!(["<input ", ">"]; element_ref(&target)), &container, RenderOptions::default())
		.unwrap();
	assert!(target.borrow().is_some());
	assert!(renderer.unmount(&container));
	assert!(target.borrow().is_none());
	assert!(container.child_nodes().is_empty());
}
