//! Stateful bindings.
//!
//! A [`Directive`] is constructed once per part position and directive type, then receives every later value
//! of the same type at that position through [`Directive::update`]. Directives that do work outside of a render
//! (timers, futures, subscriptions) push values back through a [`DirectiveHandle`], which is checked for liveness
//! on every push instead of being cancelled.

use crate::{
	dom::Node,
	error::{Error, Result},
	part::{ChildPart, PartKind},
	render::{Scope, UpdateQueue},
	value::Value,
};
use core::{
	any::{type_name, Any, TypeId},
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
	future::Future,
};
use futures::task::LocalSpawnExt;
use std::rc::{Rc, Weak};
use tracing::{error, trace, warn};

/// What a directive can know about its position at construction time.
#[derive(Debug, Clone)]
pub struct PartInfo {
	kind: PartKind,
	name: Option<Rc<str>>,
	strings: Option<Rc<[Rc<str>]>>,
	tag_name: Option<Rc<str>>,
}

impl PartInfo {
	pub(crate) fn new(kind: PartKind, name: Option<Rc<str>>, strings: Option<Rc<[Rc<str>]>>, tag_name: Option<Rc<str>>) -> Self {
		Self {
			kind,
			name,
			strings,
			tag_name,
		}
	}

	pub(crate) fn child() -> Self {
		Self::new(PartKind::Child, None, None, None)
	}

	#[must_use]
	pub fn kind(&self) -> PartKind {
		self.kind
	}

	/// The attribute, property or event name.
	#[must_use]
	pub fn name(&self) -> Option<&str> {
		self.name.as_deref()
	}

	/// The static strings around the expressions of an attribute binding.
	#[must_use]
	pub fn strings(&self) -> Option<&[Rc<str>]> {
		self.strings.as_deref()
	}

	/// The bound element's tag name, where known. Server rendering doesn't track it.
	#[must_use]
	pub fn tag_name(&self) -> Option<&str> {
		self.tag_name.as_deref()
	}

	/// Whether the binding is exactly one expression with no static text around it.
	#[must_use]
	pub fn is_single_expression(&self) -> bool {
		self.strings.as_ref().map_or(true, |strings| strings.len() == 2 && strings.iter().all(|s| s.is_empty()))
	}

	/// Shorthand for affinity checks in [`Directive::new`].
	pub fn expect_kind(&self, directive: &'static str, kinds: &[PartKind], reason: &'static str) -> Result<()> {
		if kinds.contains(&self.kind) {
			Ok(())
		} else {
			error!("Directive `{}` bound to a {} part.", directive, self.kind);
			Err(Error::DirectivePartMismatch {
				directive,
				kind: self.kind,
				reason,
			})
		}
	}
}

/// A stateful binding.
///
/// `render` must not have side effects: the server renderer calls it for its return value only.
/// In the browser-side engine, `update` runs instead and may reach into the part.
pub trait Directive: Sized + 'static {
	type Args: 'static;

	/// Validates the part kind (see [`PartInfo::expect_kind`]) and sets up initial state.
	fn new(info: &PartInfo) -> Result<Self>;

	fn render(&mut self, args: &Self::Args) -> Value;

	fn update(&mut self, part: &mut DirectivePart<'_, '_>, args: &Self::Args) -> Result<Value> {
		let _ = part;
		Ok(self.render(args))
	}

	/// The part's content was removed or its host disconnected. Pushes are discarded until [`Directive::reconnected`].
	fn disconnected(&mut self) {}

	fn reconnected(&mut self) {}
}

pub(crate) trait ErasedDirective {
	fn render(&mut self, args: &dyn Any) -> Value;
	fn update(&mut self, part: &mut DirectivePart<'_, '_>, args: &dyn Any) -> Result<Value>;
	fn disconnected(&mut self);
	fn reconnected(&mut self);
}

impl<D: Directive> ErasedDirective for D {
	fn render(&mut self, args: &dyn Any) -> Value {
		match args.downcast_ref::<D::Args>() {
			Some(args) => Directive::render(self, args),
			None => {
				error!("Argument type mismatch for directive `{}`.", type_name::<D>());
				Value::NoChange
			}
		}
	}

	fn update(&mut self, part: &mut DirectivePart<'_, '_>, args: &dyn Any) -> Result<Value> {
		match args.downcast_ref::<D::Args>() {
			Some(args) => Directive::update(self, part, args),
			None => {
				error!("Argument type mismatch for directive `{}`.", type_name::<D>());
				Ok(Value::NoChange)
			}
		}
	}

	fn disconnected(&mut self) {
		Directive::disconnected(self);
	}

	fn reconnected(&mut self) {
		Directive::reconnected(self);
	}
}

fn construct<D: Directive>(info: &PartInfo) -> Result<Box<dyn ErasedDirective>> {
	Ok(Box::new(D::new(info)?))
}

/// One call of a directive: its type and arguments. Compared by identity.
#[derive(Clone)]
pub struct DirectiveResult {
	class: TypeId,
	name: &'static str,
	construct: fn(&PartInfo) -> Result<Box<dyn ErasedDirective>>,
	args: Rc<dyn Any>,
}

impl Debug for DirectiveResult {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "DirectiveResult({}, {:p})", self.name, Rc::as_ptr(&self.args).cast::<()>())
	}
}

impl DirectiveResult {
	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.args, &other.args)
	}

	#[must_use]
	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Constructs a throwaway instance and renders it, for server output.
	pub(crate) fn render_detached(&self, info: &PartInfo) -> Result<Value> {
		let mut directive = (self.construct)(info)?;
		Ok(directive.render(&*self.args))
	}
}

/// Binds `D` with `args` to wherever the returned value is placed.
pub fn directive<D: Directive>(args: D::Args) -> Value {
	Value::Directive(DirectiveResult {
		class: TypeId::of::<D>(),
		name: type_name::<D>(),
		construct: construct::<D>,
		args: Rc::new(args),
	})
}

#[derive(Debug)]
pub(crate) struct SlotState {
	generation: Cell<u64>,
	connected: Cell<bool>,
	alive: Cell<bool>,
	pending: RefCell<Option<Value>>,
}

/// The directive instance living at one part position, plus the one its output resolved into, if any.
pub(crate) struct DirectiveSlot {
	class: TypeId,
	name: &'static str,
	directive: Box<dyn ErasedDirective>,
	state: Rc<SlotState>,
	last_args: Rc<dyn Any>,
	child: Option<Box<DirectiveSlot>>,
}

impl Debug for DirectiveSlot {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("DirectiveSlot")
			.field("name", &self.name)
			.field("state", &self.state)
			.field("child", &self.child)
			.finish_non_exhaustive()
	}
}

impl DirectiveSlot {
	fn new(result: &DirectiveResult, info: &PartInfo, connected: bool) -> Result<Self> {
		trace!("Constructing directive `{}`.", result.name);
		Ok(Self {
			class: result.class,
			name: result.name,
			directive: (result.construct)(info)?,
			state: Rc::new(SlotState {
				generation: Cell::new(0),
				connected: Cell::new(connected),
				alive: Cell::new(true),
				pending: RefCell::new(None),
			}),
			last_args: Rc::clone(&result.args),
			child: None,
		})
	}

	fn accept(&mut self, result: &DirectiveResult) {
		if !Rc::ptr_eq(&self.last_args, &result.args) {
			self.state.generation.set(self.state.generation.get() + 1);
			self.last_args = Rc::clone(&result.args);
			self.state.pending.borrow_mut().take();
		}
	}

	/// Ends this slot for good. Outstanding handles become inert.
	pub fn teardown(mut self: Box<Self>) {
		trace!("Tearing down directive `{}`.", self.name);
		if let Some(child) = self.child.take() {
			child.teardown();
		}
		let state = &self.state;
		state.alive.set(false);
		state.generation.set(state.generation.get() + 1);
		state.pending.borrow_mut().take();
		if state.connected.replace(false) {
			self.directive.disconnected();
		}
	}

	pub fn set_connected(&mut self, connected: bool) {
		if self.state.connected.replace(connected) != connected {
			if connected {
				self.directive.reconnected();
			} else {
				self.state.pending.borrow_mut().take();
				self.directive.disconnected();
			}
		}
		if let Some(child) = &mut self.child {
			child.set_connected(connected);
		}
	}
}

/// Runs `value` through the directive chain at one part position and returns what the part should commit.
///
/// Non-directive values tear down whatever directive was there.
pub(crate) fn resolve(slot: &mut Option<Box<DirectiveSlot>>, value: Value, target: &mut PartTarget<'_>, info: &PartInfo, scope: &Scope<'_>) -> Result<Value> {
	let result = match value {
		Value::Directive(result) => result,
		value => {
			if let Some(old) = slot.take() {
				old.teardown();
			}
			return Ok(value);
		}
	};

	let mut current = match slot.take() {
		Some(current) if current.class == result.class => current,
		old => {
			if let Some(old) = old {
				old.teardown();
			}
			Box::new(DirectiveSlot::new(&result, info, scope.connected)?)
		}
	};
	current.accept(&result);

	let value = {
		let mut part = DirectivePart {
			target: target.reborrow(),
			info,
			state: &current.state,
			scope,
		};
		current.directive.update(&mut part, &*result.args)
	};
	let resolved = value.and_then(|value| resolve(&mut current.child, value, target, info, scope));
	*slot = Some(current);
	resolved
}

/// Takes the outermost pending push in the chain and resolves it like a fresh value from that directive.
pub(crate) fn take_pending(slot: &mut Option<Box<DirectiveSlot>>, target: &mut PartTarget<'_>, info: &PartInfo, scope: &Scope<'_>) -> Result<Option<Value>> {
	let Some(current) = slot else { return Ok(None) };
	if !current.state.alive.get() {
		return Ok(None);
	}
	let pending = current.state.pending.borrow_mut().take();
	match pending {
		Some(value) => {
			trace!("Flushing pushed value of directive `{}`.", current.name);
			resolve(&mut current.child, value, target, info, scope).map(Some)
		}
		None => take_pending(&mut current.child, target, info, scope),
	}
}

pub(crate) fn teardown(slot: &mut Option<Box<DirectiveSlot>>) {
	if let Some(slot) = slot.take() {
		slot.teardown();
	}
}

pub(crate) fn set_connected(slot: &mut Option<Box<DirectiveSlot>>, connected: bool) {
	if let Some(slot) = slot {
		slot.set_connected(connected);
	}
}

/// What a directive's part is attached to.
pub(crate) enum PartTarget<'p> {
	Child(&'p mut ChildPart),
	Element(&'p Node),
}

impl PartTarget<'_> {
	fn reborrow(&mut self) -> PartTarget<'_> {
		match self {
			PartTarget::Child(part) => PartTarget::Child(&mut **part),
			PartTarget::Element(element) => PartTarget::Element(*element),
		}
	}
}

/// The part a directive is updating, as seen from [`Directive::update`].
pub struct DirectivePart<'p, 's> {
	target: PartTarget<'p>,
	info: &'p PartInfo,
	state: &'p Rc<SlotState>,
	scope: &'p Scope<'s>,
}

impl Debug for DirectivePart<'_, '_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("DirectivePart").field("info", &self.info).field("state", &self.state).finish_non_exhaustive()
	}
}

impl<'p, 's> DirectivePart<'p, 's> {
	#[must_use]
	pub fn info(&self) -> &PartInfo {
		self.info
	}

	/// The bound element of attribute-position and element parts.
	#[must_use]
	pub fn element(&self) -> Option<&Node> {
		match &self.target {
			PartTarget::Element(element) => Some(element),
			PartTarget::Child(_) => None,
		}
	}

	/// The element (or fragment) that holds a child part's content.
	#[must_use]
	pub fn parent_node(&self) -> Option<Node> {
		match &self.target {
			PartTarget::Element(element) => element.parent_node(),
			PartTarget::Child(part) => part.parent_node(),
		}
	}

	#[must_use]
	pub fn is_connected(&self) -> bool {
		self.state.connected.get()
	}

	/// A handle for pushing values later. It stops working once this directive call is superseded or torn down.
	#[must_use]
	pub fn handle(&self) -> DirectiveHandle {
		DirectiveHandle {
			state: Rc::downgrade(self.state),
			generation: self.state.generation.get(),
			queue: Rc::downgrade(self.scope.queue),
		}
	}

	/// Runs `future` on the spawner from the [`RenderOptions`](`crate::RenderOptions`).
	///
	/// Returns `false` if there is no spawner or it refused the task.
	pub fn spawn_local(&self, future: impl Future<Output = ()> + 'static) -> bool {
		match &self.scope.options.spawner {
			Some(spawner) => match spawner.spawn_local(future) {
				Ok(()) => true,
				Err(spawn_error) => {
					warn!("Could not spawn directive task: {}", spawn_error);
					false
				}
			},
			None => {
				warn!("No spawner configured in `RenderOptions`; dropping directive task.");
				false
			}
		}
	}

	pub(crate) fn child_part(&mut self) -> Option<(&mut ChildPart, &Scope<'s>)> {
		match &mut self.target {
			PartTarget::Child(part) => Some((&mut **part, self.scope)),
			PartTarget::Element(_) => None,
		}
	}
}

/// Pushes values into a directive's part from outside a render.
#[derive(Clone)]
pub struct DirectiveHandle {
	state: Weak<SlotState>,
	generation: u64,
	queue: Weak<UpdateQueue>,
}

impl Debug for DirectiveHandle {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("DirectiveHandle")
			.field("generation", &self.generation)
			.field("live", &self.is_live())
			.finish_non_exhaustive()
	}
}

impl DirectiveHandle {
	fn live_state(&self) -> Option<Rc<SlotState>> {
		let state = self.state.upgrade()?;
		(state.alive.get() && state.generation.get() == self.generation).then(|| state)
	}

	/// Whether a push would currently be accepted.
	#[must_use]
	pub fn is_live(&self) -> bool {
		self.live_state().map_or(false, |state| state.connected.get())
	}

	/// Queues `value` for the part and asks the host to flush.
	///
	/// Returns `false` and does nothing if the directive was torn down, called again with new arguments or is disconnected.
	pub fn set_value(&self, value: impl Into<Value>) -> bool {
		let Some(state) = self.live_state() else {
			trace!("Discarding push from a stale directive handle.");
			return false;
		};
		if !state.connected.get() {
			warn!("Discarding push to a disconnected directive.");
			return false;
		}
		*state.pending.borrow_mut() = Some(value.into());
		if let Some(queue) = self.queue.upgrade() {
			queue.request_update();
		}
		true
	}
}
