//! Built-in directives.

use crate::{
	diff,
	directive::{directive, Directive, DirectiveHandle, DirectivePart, PartInfo},
	dom::Node,
	error::{Error, Result},
	part::PartKind,
	value::{PendingValue, Value},
};
use core::cell::RefCell;
use std::rc::Rc;
use tracing::{error, trace};

pub use crate::diff::Key;

/// Keyed list state for [`repeat`].
#[derive(Debug)]
pub struct Repeat {
	keys: Option<Vec<Key>>,
}

impl Directive for Repeat {
	type Args = Vec<(Key, Value)>;

	fn new(info: &PartInfo) -> Result<Self> {
		info.expect_kind("repeat", &[PartKind::Child], "it manages a list of child ranges")?;
		Ok(Self { keys: None })
	}

	fn render(&mut self, args: &Self::Args) -> Value {
		Value::List(args.iter().map(|(_, value)| value.clone()).collect())
	}

	fn update(&mut self, part: &mut DirectivePart<'_, '_>, args: &Self::Args) -> Result<Value> {
		diff::check_unique(args.iter().map(|(key, _)| key))?;
		let keys: Vec<Key> = args.iter().map(|(key, _)| key.clone()).collect();
		match (self.keys.take(), part.child_part()) {
			(Some(old_keys), Some((child, scope))) => {
				diff::commit_keyed(child, &old_keys, args.clone(), scope)?;
				self.keys = Some(keys);
				Ok(Value::NoChange)
			}
			_ => {
				trace!("First keyed commit; items are created in order.");
				self.keys = Some(keys);
				Ok(self.render(args))
			}
		}
	}
}

/// Renders `items` so that each item's nodes follow its key across renders, instead of its index.
///
/// Fails the render with [`Error::DuplicateKey`](`crate::Error::DuplicateKey`) if two items share a key.
pub fn repeat<T, K: Into<Key>, V: Into<Value>>(items: impl IntoIterator<Item = T>, key: impl Fn(&T) -> K, template: impl Fn(T) -> V) -> Value {
	directive::<Repeat>(items.into_iter().map(|item| (key(&item).into(), template(item).into())).collect())
}

pub struct Guard {
	deps: Option<Vec<Value>>,
}

impl Directive for Guard {
	type Args = (Vec<Value>, Rc<dyn Fn() -> Value>);

	fn new(_: &PartInfo) -> Result<Self> {
		Ok(Self { deps: None })
	}

	fn render(&mut self, (_, f): &Self::Args) -> Value {
		f()
	}

	fn update(&mut self, _: &mut DirectivePart<'_, '_>, (deps, f): &Self::Args) -> Result<Value> {
		let unchanged = self
			.deps
			.as_ref()
			.map_or(false, |old| old.len() == deps.len() && old.iter().zip(deps).all(|(a, b)| a.same(b)));
		if unchanged {
			trace!("Guard dependencies unchanged.");
			return Ok(Value::NoChange);
		}
		self.deps = Some(deps.clone());
		Ok(f())
	}
}

/// Only calls `f` when one of `deps` changed according to [`Value::same`].
///
/// Templates and lists never compare equal, so use their inputs as dependencies instead.
pub fn guard<V: Into<Value>>(deps: impl IntoIterator<Item = Value>, f: impl Fn() -> V + 'static) -> Value {
	let f: Rc<dyn Fn() -> Value> = Rc::new(move || f().into());
	directive::<Guard>((deps.into_iter().collect(), f))
}

#[derive(Debug)]
pub struct ClassMap;

impl Directive for ClassMap {
	type Args = Vec<(Rc<str>, bool)>;

	fn new(info: &PartInfo) -> Result<Self> {
		info.expect_kind("class_map", &[PartKind::Attribute], "it renders a class list")?;
		if info.name() != Some("class") || !info.is_single_expression() {
			error!("`class_map` bound to attribute {:?} or next to static text.", info.name());
			return Err(Error::DirectivePartMismatch {
				directive: "class_map",
				kind: info.kind(),
				reason: "it must be the only expression in the `class` attribute",
			});
		}
		Ok(Self)
	}

	fn render(&mut self, classes: &Self::Args) -> Value {
		let mut list = String::new();
		for (name, _) in classes.iter().filter(|(_, enabled)| *enabled) {
			if !list.is_empty() {
				list.push(' ');
			}
			list.push_str(name);
		}
		list.into()
	}
}

/// `class=${class_map([("a", true), ("b", false)])}` renders `class="a"`.
pub fn class_map<N: Into<Rc<str>>>(classes: impl IntoIterator<Item = (N, bool)>) -> Value {
	directive::<ClassMap>(classes.into_iter().map(|(name, enabled)| (name.into(), enabled)).collect())
}

/// Filled by [`element_ref`] while the element is rendered and connected.
pub type ElementRef = Rc<RefCell<Option<Node>>>;

#[derive(Debug)]
pub struct RefDirective {
	target: Option<ElementRef>,
	element: Option<Node>,
}

impl RefDirective {
	fn clear(&self) {
		if let Some(target) = &self.target {
			let mut target = target.borrow_mut();
			if target.as_ref() == self.element.as_ref() {
				*target = None;
			}
		}
	}
}

impl Directive for RefDirective {
	type Args = ElementRef;

	fn new(info: &PartInfo) -> Result<Self> {
		info.expect_kind("element_ref", &[PartKind::Element], "it needs the element itself")?;
		Ok(Self { target: None, element: None })
	}

	fn render(&mut self, _: &Self::Args) -> Value {
		Value::NoChange
	}

	fn update(&mut self, part: &mut DirectivePart<'_, '_>, target: &Self::Args) -> Result<Value> {
		if self.target.as_ref().map_or(false, |old| !Rc::ptr_eq(old, target)) {
			self.clear();
		}
		self.element = part.element().cloned();
		*target.borrow_mut() = self.element.clone();
		self.target = Some(Rc::clone(target));
		Ok(Value::NoChange)
	}

	fn disconnected(&mut self) {
		self.clear();
	}

	fn reconnected(&mut self) {
		if let Some(target) = &self.target {
			*target.borrow_mut() = self.element.clone();
		}
	}
}

/// `<input ${element_ref(&input)}>`
pub fn element_ref(target: &ElementRef) -> Value {
	directive::<RefDirective>(Rc::clone(target))
}

#[derive(Default)]
struct UntilState {
	handle: Option<DirectiveHandle>,
	current: Option<PendingValue>,
	/// Resolved while disconnected.
	undelivered: Option<Value>,
}

pub struct Until {
	kind: PartKind,
	state: Rc<RefCell<UntilState>>,
}

impl Until {
	fn deliver(state: &RefCell<UntilState>, value: Value) {
		let handle = state.borrow().handle.clone();
		let delivered = handle.map_or(false, |handle| handle.set_value(value.clone()));
		state.borrow_mut().undelivered = (!delivered).then(|| value);
	}
}

impl Directive for Until {
	type Args = (PendingValue, Value);

	fn new(info: &PartInfo) -> Result<Self> {
		info.expect_kind(
			"until",
			&[PartKind::Child, PartKind::Attribute, PartKind::Property],
			"it commits values later, which only value bindings accept",
		)?;
		Ok(Self {
			kind: info.kind(),
			state: Rc::default(),
		})
	}

	/// Server output waits for child values, but uses the placeholder elsewhere.
	fn render(&mut self, (pending, placeholder): &Self::Args) -> Value {
		match (self.kind, pending.now_or_never()) {
			(_, Some(value)) => value,
			(PartKind::Child, None) => Value::Future(pending.clone()),
			(_, None) => placeholder.clone(),
		}
	}

	fn update(&mut self, part: &mut DirectivePart<'_, '_>, (pending, placeholder): &Self::Args) -> Result<Value> {
		let mut state = self.state.borrow_mut();
		state.handle = Some(part.handle());
		if state.current.as_ref().map_or(false, |current| current.ptr_eq(pending)) {
			// A push for the previous call was dropped with its generation.
			return Ok(pending.now_or_never().unwrap_or(Value::NoChange));
		}
		state.current = Some(pending.clone());
		state.undelivered = None;
		if let Some(value) = pending.now_or_never() {
			return Ok(value);
		}
		drop(state);

		let shared = Rc::clone(&self.state);
		let awaited = pending.clone();
		part.spawn_local(async move {
			let value = awaited.resolve().await;
			let current = shared.borrow().current.as_ref().map_or(false, |current| current.ptr_eq(&awaited));
			if current {
				Until::deliver(&shared, value);
			} else {
				trace!("Dropping superseded `until` value.");
			}
		});
		Ok(placeholder.clone())
	}

	fn reconnected(&mut self) {
		let undelivered = self.state.borrow_mut().undelivered.take();
		if let Some(value) = undelivered {
			trace!("Delivering value that resolved while disconnected.");
			Until::deliver(&self.state, value);
		}
	}
}

/// Shows `placeholder` until `pending` resolves, then its value.
///
/// Needs a [`RenderOptions::spawner`](`crate::RenderOptions::spawner`). The server renderer awaits `pending` instead.
pub fn until(pending: PendingValue, placeholder: impl Into<Value>) -> Value {
	directive::<Until>((pending, placeholder.into()))
}
