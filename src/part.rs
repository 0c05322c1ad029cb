//! The live bindings of a template instance.
//!
//! A part's kind and location are fixed at construction. Only its committed value changes,
//! and each kind decides for itself whether a new value warrants a DOM write.

use crate::{
	diff,
	directive::{self, DirectiveSlot, PartInfo, PartTarget},
	dom::{DomListener, Event, ListenerOptions, Node},
	error::{Error, Result},
	hydrate,
	instance::TemplateInstance,
	render::Scope,
	template::PartMetadata,
	value::{Listener, TemplateResult, Value},
};
use core::fmt::{self, Display, Formatter};
use std::rc::Rc;
use tracing::{error, level_filters::STATIC_MAX_LEVEL, trace, trace_span, warn, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
	Child,
	Attribute,
	BooleanAttribute,
	Property,
	Event,
	Element,
}

impl Display for PartKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			PartKind::Child => "child",
			PartKind::Attribute => "attribute",
			PartKind::BooleanAttribute => "boolean attribute",
			PartKind::Property => "property",
			PartKind::Event => "event",
			PartKind::Element => "element",
		})
	}
}

fn value_at(values: &[Value], index: usize) -> Value {
	values.get(index).cloned().unwrap_or(Value::NoChange)
}

/// What a [`ChildPart`] currently shows.
#[derive(Debug)]
pub(crate) enum Committed {
	Nothing,
	Text { node: Node, value: Value },
	Node(Node),
	Instance(TemplateInstance),
	List(Vec<ChildPart>),
}

impl Committed {
	fn teardown(&mut self) {
		match self {
			Committed::Instance(instance) => instance.teardown(),
			Committed::List(items) => items.iter_mut().for_each(ChildPart::teardown),
			Committed::Nothing | Committed::Text { .. } | Committed::Node(_) => (),
		}
	}
}

/// A range of sibling nodes strictly between two marker comments.
#[derive(Debug)]
pub(crate) struct ChildPart {
	pub(crate) start: Node,
	pub(crate) end: Node,
	pub(crate) committed: Committed,
	pub(crate) directive: Option<Box<DirectiveSlot>>,
}

impl ChildPart {
	pub fn new(start: Node, end: Node) -> Self {
		Self {
			start,
			end,
			committed: Committed::Nothing,
			directive: None,
		}
	}

	/// Creates an empty part with fresh markers right before `reference`.
	pub fn insert_before(reference: &Node) -> Result<Self> {
		let parent = reference.parent_node().ok_or(Error::NoParent)?;
		let document = reference.document();
		let (start, end) = (document.create_comment(""), document.create_comment(""));
		parent.insert_before(&start, Some(reference))?;
		parent.insert_before(&end, Some(reference))?;
		Ok(Self::new(start, end))
	}

	/// Creates an empty part with fresh markers at the end of `parent`.
	pub fn append_to(parent: &Node) -> Result<Self> {
		let document = parent.document();
		let (start, end) = (document.create_comment(""), document.create_comment(""));
		parent.append_child(&start)?;
		parent.append_child(&end)?;
		Ok(Self::new(start, end))
	}

	pub fn parent_node(&self) -> Option<Node> {
		self.start.parent_node()
	}

	fn insert(&self, node: &Node) -> Result<()> {
		let parent = self.end.parent_node().ok_or(Error::NoParent)?;
		parent.insert_before(node, Some(&self.end))
	}

	/// The nodes between the markers.
	pub fn content(&self) -> Vec<Node> {
		let mut nodes = Vec::new();
		let mut current = self.start.next_sibling();
		while let Some(node) = current {
			if node.ptr_eq(&self.end) {
				break;
			}
			current = node.next_sibling();
			nodes.push(node);
		}
		nodes
	}

	pub fn list_len(&self) -> Option<usize> {
		match &self.committed {
			Committed::List(items) => Some(items.len()),
			_ => None,
		}
	}

	/// Tears down everything committed and removes the nodes between the markers.
	pub fn clear(&mut self) {
		self.committed.teardown();
		self.committed = Committed::Nothing;
		for node in self.content() {
			node.remove();
		}
	}

	/// Tears down this part's directives and content, without touching the DOM.
	pub fn teardown(&mut self) {
		directive::teardown(&mut self.directive);
		self.committed.teardown();
	}

	/// Tears down and removes the part including its markers.
	pub fn remove(mut self) {
		self.teardown();
		for node in self.content() {
			node.remove();
		}
		self.start.remove();
		self.end.remove();
	}

	/// Moves the whole range, markers included, before `reference`.
	pub fn move_before(&self, reference: &Node) -> Result<()> {
		let parent = reference.parent_node().ok_or(Error::NoParent)?;
		let mut nodes = vec![self.start.clone()];
		nodes.extend(self.content());
		nodes.push(self.end.clone());
		for node in &nodes {
			parent.insert_before(node, Some(reference))?;
		}
		Ok(())
	}

	pub fn commit(&mut self, value: Value, scope: &Scope<'_>) -> Result<()> {
		let span = trace_span!("ChildPart::commit", value = value.type_name());
		let _enter = span.enter();

		if matches!(value, Value::NoChange) {
			trace!("Skipping noChange.");
			return Ok(());
		}
		let mut slot = self.directive.take();
		let resolved = directive::resolve(&mut slot, value, &mut PartTarget::Child(self), &PartInfo::child(), scope);
		self.directive = slot;
		self.commit_resolved(resolved?, scope)
	}

	/// Commits a value that already went through the directive chain.
	pub fn commit_resolved(&mut self, value: Value, scope: &Scope<'_>) -> Result<()> {
		match value {
			Value::NoChange => Ok(()),
			value if value.is_empty_child() => {
				if !matches!(self.committed, Committed::Nothing) {
					self.clear();
				}
				Ok(())
			}
			Value::Template(result) => self.commit_template(&result, scope),
			Value::List(items) => diff::commit_positional(self, &items, scope),
			Value::Node(node) => {
				if let Committed::Node(committed) = &self.committed {
					if committed.ptr_eq(&node) {
						return Ok(());
					}
				}
				self.clear();
				self.insert(&node)?;
				self.committed = Committed::Node(node);
				Ok(())
			}
			Value::Future(pending) => match pending.now_or_never() {
				Some(value) => self.commit_resolved(value, scope),
				None => {
					error!("Unresolved future bound to a child part. Use the `until` directive.");
					Err(Error::InvalidValue {
						value: "future",
						kind: PartKind::Child,
					})
				}
			},
			value if value.is_primitive() => self.commit_text(value),
			value => {
				error!("Can't commit a {} value to a child part.", value.type_name());
				Err(Error::InvalidValue {
					value: value.type_name(),
					kind: PartKind::Child,
				})
			}
		}
	}

	fn commit_text(&mut self, value: Value) -> Result<()> {
		let text = value.to_text().unwrap_or_default().into_owned();
		if let Committed::Text { node, value: committed } = &mut self.committed {
			if committed.same(&value) {
				if STATIC_MAX_LEVEL >= Level::WARN && committed.to_text().map_or(false, |old| node.data() != old) {
					warn!("Text node {:?} was changed outside of the renderer; leaving it as is.", node);
				}
				trace!("Text unchanged.");
			} else {
				node.set_data(&text);
				*committed = value;
			}
			return Ok(());
		}

		self.clear();
		let node = self.start.document().create_text_node(&text);
		self.insert(&node)?;
		self.committed = Committed::Text { node, value };
		Ok(())
	}

	fn commit_template(&mut self, result: &TemplateResult, scope: &Scope<'_>) -> Result<()> {
		let template = scope.template(result)?;
		if let Committed::Instance(instance) = &mut self.committed {
			if Rc::ptr_eq(instance.template(), &template) {
				trace!("Same template; updating in place.");
				return instance.update(result.values(), scope);
			}
		}

		trace!("Instantiating template.");
		let (mut instance, fragment) = TemplateInstance::create(template, &scope.document)?;
		// Committed while still detached, then inserted in one go.
		instance.update(result.values(), scope)?;
		self.clear();
		self.insert(&fragment)?;
		self.committed = Committed::Instance(instance);
		Ok(())
	}

	pub fn set_connected(&mut self, connected: bool) {
		directive::set_connected(&mut self.directive, connected);
		match &mut self.committed {
			Committed::Instance(instance) => instance.set_connected(connected),
			Committed::List(items) => {
				for item in items {
					item.set_connected(connected);
				}
			}
			Committed::Nothing | Committed::Text { .. } | Committed::Node(_) => (),
		}
	}

	/// Commits pushed directive values in document order. Returns how many were committed.
	pub fn flush(&mut self, scope: &Scope<'_>) -> Result<usize> {
		let mut count = 0;
		let mut slot = self.directive.take();
		let pending = directive::take_pending(&mut slot, &mut PartTarget::Child(self), &PartInfo::child(), scope);
		self.directive = slot;
		if let Some(value) = pending? {
			self.commit_resolved(value, scope)?;
			count += 1;
		}
		count += match &mut self.committed {
			Committed::Instance(instance) => instance.flush(scope)?,
			Committed::List(items) => {
				let mut sum = 0;
				for item in items {
					sum += item.flush(scope)?;
				}
				sum
			}
			Committed::Nothing | Committed::Text { .. } | Committed::Node(_) => 0,
		};
		Ok(count)
	}
}

/// One attribute, interpolated from one or more expressions and its static strings.
#[derive(Debug)]
pub(crate) struct AttributePart {
	element: Node,
	name: Rc<str>,
	strings: Rc<[Rc<str>]>,
	value_index: usize,
	committed: Vec<Value>,
	directives: Vec<Option<Box<DirectiveSlot>>>,
	info: PartInfo,
}

impl AttributePart {
	fn new(element: Node, metadata: &PartMetadata) -> Self {
		let strings = metadata.strings.clone().unwrap_or_else(|| Rc::from(vec![Rc::from(""), Rc::from("")]));
		let count = strings.len() - 1;
		Self {
			info: metadata.info(Some(&element)),
			name: metadata.name.clone().unwrap_or_else(|| Rc::from("")),
			element,
			strings,
			value_index: metadata.value_index,
			committed: vec![Value::NoChange; count],
			directives: (0..count).map(|_| None).collect(),
		}
	}

	/// Resolves and stores the values. Returns whether any slot changed.
	fn accept(&mut self, values: &[Value], scope: &Scope<'_>) -> Result<bool> {
		let mut changed = false;
		for i in 0..self.committed.len() {
			let value = value_at(values, self.value_index + i);
			if matches!(value, Value::NoChange) {
				continue;
			}
			let value = directive::resolve(&mut self.directives[i], value, &mut PartTarget::Element(&self.element), &self.info, scope)?;
			changed |= self.accept_slot(i, value);
		}
		Ok(changed)
	}

	fn accept_slot(&mut self, i: usize, value: Value) -> bool {
		if matches!(value, Value::NoChange) || self.committed[i].same(&value) {
			false
		} else {
			self.committed[i] = value;
			true
		}
	}

	/// The attribute value to write, or `None` to remove the attribute.
	fn rendered(&self) -> Result<Option<String>> {
		if self.committed.iter().any(|value| matches!(value, Value::Nothing)) {
			return Ok(None);
		}
		let mut text = String::from(&*self.strings[0]);
		for (value, string) in self.committed.iter().zip(self.strings.iter().skip(1)) {
			match value {
				Value::NoChange => (),
				value => match value.to_text() {
					Some(value_text) => text.push_str(&value_text),
					None => {
						error!("Can't commit a {} value to attribute {:?}.", value.type_name(), self.name);
						return Err(Error::InvalidValue {
							value: value.type_name(),
							kind: PartKind::Attribute,
						});
					}
				},
			}
			text.push_str(string);
		}
		Ok(Some(text))
	}

	fn write(&self) -> Result<()> {
		match self.rendered()? {
			Some(text) => self.element.set_attribute(&self.name, &text),
			None => {
				self.element.remove_attribute(&self.name);
			}
		}
		Ok(())
	}

	fn commit(&mut self, values: &[Value], scope: &Scope<'_>) -> Result<()> {
		if self.accept(values, scope)? {
			self.write()?;
		} else {
			trace!("Attribute {:?} unchanged.", self.name);
		}
		Ok(())
	}

	/// Like [`AttributePart::commit`], but leaves a matching server-rendered attribute alone.
	pub fn hydrate(&mut self, values: &[Value], scope: &Scope<'_>) -> Result<()> {
		self.accept(values, scope)?;
		let rendered = self.rendered()?;
		if rendered == self.element.get_attribute(&self.name) {
			trace!("Attribute {:?} matches server output.", self.name);
			Ok(())
		} else {
			warn!("Attribute {:?} differs from server output; rewriting.", self.name);
			self.write()
		}
	}

	fn flush(&mut self, scope: &Scope<'_>) -> Result<usize> {
		let mut count = 0;
		let mut changed = false;
		for i in 0..self.committed.len() {
			if let Some(value) = directive::take_pending(&mut self.directives[i], &mut PartTarget::Element(&self.element), &self.info, scope)? {
				changed |= self.accept_slot(i, value);
				count += 1;
			}
		}
		if changed {
			self.write()?;
		}
		Ok(count)
	}

	fn teardown(&mut self) {
		self.directives.iter_mut().for_each(directive::teardown);
	}

	fn set_connected(&mut self, connected: bool) {
		for slot in &mut self.directives {
			directive::set_connected(slot, connected);
		}
	}
}

/// Single-expression binding state shared by the non-interpolating attribute-position parts.
#[derive(Debug)]
struct SingleBinding {
	element: Node,
	name: Rc<str>,
	value_index: usize,
	directive: Option<Box<DirectiveSlot>>,
	info: PartInfo,
}

impl SingleBinding {
	fn new(element: Node, metadata: &PartMetadata) -> Self {
		Self {
			info: metadata.info(Some(&element)),
			name: metadata.name.clone().unwrap_or_else(|| Rc::from("")),
			element,
			value_index: metadata.value_index,
			directive: None,
		}
	}

	/// `None` for `noChange`.
	fn resolve(&mut self, values: &[Value], scope: &Scope<'_>) -> Result<Option<Value>> {
		let value = value_at(values, self.value_index);
		if matches!(value, Value::NoChange) {
			return Ok(None);
		}
		let value = directive::resolve(&mut self.directive, value, &mut PartTarget::Element(&self.element), &self.info, scope)?;
		Ok((!matches!(value, Value::NoChange)).then(|| value))
	}

	fn take_pending(&mut self, scope: &Scope<'_>) -> Result<Option<Value>> {
		let value = directive::take_pending(&mut self.directive, &mut PartTarget::Element(&self.element), &self.info, scope)?;
		Ok(value.filter(|value| !matches!(value, Value::NoChange)))
	}
}

/// `?name=${…}`: present while the value is truthy.
#[derive(Debug)]
pub(crate) struct BooleanAttributePart {
	binding: SingleBinding,
	committed: Option<bool>,
}

impl BooleanAttributePart {
	fn apply(&mut self, value: &Value) {
		let present = value.is_truthy();
		if self.committed == Some(present) {
			trace!("Boolean attribute {:?} unchanged.", self.binding.name);
			return;
		}
		if present {
			self.binding.element.set_attribute(&self.binding.name, "");
		} else {
			self.binding.element.remove_attribute(&self.binding.name);
		}
		self.committed = Some(present);
	}

	fn commit(&mut self, values: &[Value], scope: &Scope<'_>) -> Result<()> {
		if let Some(value) = self.binding.resolve(values, scope)? {
			self.apply(&value);
		}
		Ok(())
	}

	pub fn hydrate(&mut self, values: &[Value], scope: &Scope<'_>) -> Result<()> {
		if let Some(value) = self.binding.resolve(values, scope)? {
			self.committed = Some(self.binding.element.has_attribute(&self.binding.name));
			self.apply(&value);
		}
		Ok(())
	}
}

/// `.name=${…}`: assigned as-is, without string conversion.
#[derive(Debug)]
pub(crate) struct PropertyPart {
	binding: SingleBinding,
	committed: Value,
}

impl PropertyPart {
	fn apply(&mut self, value: Value) {
		if self.committed.same(&value) {
			trace!("Property {:?} unchanged.", self.binding.name);
			return;
		}
		match &value {
			Value::Nothing => {
				self.binding.element.remove_property(&self.binding.name);
			}
			value => self.binding.element.set_property(&self.binding.name, value.clone()),
		}
		self.committed = value;
	}

	fn commit(&mut self, values: &[Value], scope: &Scope<'_>) -> Result<()> {
		if let Some(value) = self.binding.resolve(values, scope)? {
			self.apply(value);
		}
		Ok(())
	}
}

/// `@name=${…}`: one registered wrapper per listener identity.
pub(crate) struct EventPart {
	binding: SingleBinding,
	options: ListenerOptions,
	committed: Option<(Listener, DomListener)>,
}

impl core::fmt::Debug for EventPart {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventPart")
			.field("binding", &self.binding)
			.field("options", &self.options)
			.field("committed", &self.committed.as_ref().map(|(listener, _)| listener))
			.finish()
	}
}

impl EventPart {
	fn apply(&mut self, value: Value, scope: &Scope<'_>) -> Result<()> {
		let listener = match value {
			Value::Listener(listener) => Some(listener),
			Value::Nothing => None,
			value => {
				error!("Can't bind a {} value as event listener for {:?}.", value.type_name(), self.binding.name);
				return Err(Error::InvalidValue {
					value: value.type_name(),
					kind: PartKind::Event,
				});
			}
		};

		match (&self.committed, &listener) {
			(Some((committed, _)), Some(listener)) if committed.ptr_eq(listener) => {
				trace!("Listener for {:?} unchanged.", self.binding.name);
				return Ok(());
			}
			(None, None) => return Ok(()),
			_ => (),
		}

		if let Some((_, wrapper)) = self.committed.take() {
			self.binding.element.remove_event_listener(&self.binding.name, &wrapper, self.options.capture);
		}
		if let Some(listener) = listener {
			let host = scope.options.host.clone();
			let inner = listener.clone();
			let wrapper: DomListener = Rc::new(move |event: &Event| inner.call(&event.with_host(host.clone())));
			self.binding.element.add_event_listener(&self.binding.name, Rc::clone(&wrapper), self.options);
			self.committed = Some((listener, wrapper));
		}
		Ok(())
	}

	fn commit(&mut self, values: &[Value], scope: &Scope<'_>) -> Result<()> {
		match self.binding.resolve(values, scope)? {
			Some(value) => self.apply(value, scope),
			None => Ok(()),
		}
	}
}

/// `<div ${…}>`: only directives do anything with this.
#[derive(Debug)]
pub(crate) struct ElementPart {
	binding: SingleBinding,
}

impl ElementPart {
	fn commit(&mut self, values: &[Value], scope: &Scope<'_>) -> Result<()> {
		if let Some(value) = self.binding.resolve(values, scope)? {
			if !matches!(value, Value::Nothing) {
				trace!("Ignoring {} value committed to an element part.", value.type_name());
			}
		}
		Ok(())
	}
}

#[derive(Debug)]
pub(crate) enum Part {
	Child { value_index: usize, part: ChildPart },
	Attribute(AttributePart),
	BooleanAttribute(BooleanAttributePart),
	Property(PropertyPart),
	Event(EventPart),
	Element(ElementPart),
}

impl Part {
	/// `node` is the element, or the opening marker comment for child parts.
	pub fn new(metadata: &PartMetadata, node: Node) -> Result<Self> {
		Ok(match metadata.kind {
			PartKind::Child => {
				let end = node.next_sibling().ok_or(Error::LostMarker { index: metadata.value_index })?;
				Part::Child {
					value_index: metadata.value_index,
					part: ChildPart::new(node, end),
				}
			}
			PartKind::Attribute => Part::Attribute(AttributePart::new(node, metadata)),
			PartKind::BooleanAttribute => Part::BooleanAttribute(BooleanAttributePart {
				binding: SingleBinding::new(node, metadata),
				committed: None,
			}),
			PartKind::Property => Part::Property(PropertyPart {
				binding: SingleBinding::new(node, metadata),
				committed: Value::NoChange,
			}),
			PartKind::Event => Part::Event(EventPart {
				binding: SingleBinding::new(node, metadata),
				options: metadata.options,
				committed: None,
			}),
			PartKind::Element => Part::Element(ElementPart {
				binding: SingleBinding::new(node, metadata),
			}),
		})
	}

	pub fn commit(&mut self, values: &[Value], scope: &Scope<'_>) -> Result<()> {
		match self {
			Part::Child { value_index, part } => part.commit(value_at(values, *value_index), scope),
			Part::Attribute(part) => part.commit(values, scope),
			Part::BooleanAttribute(part) => part.commit(values, scope),
			Part::Property(part) => part.commit(values, scope),
			Part::Event(part) => part.commit(values, scope),
			Part::Element(part) => part.commit(values, scope),
		}
	}

	/// Like [`Part::commit`], against server-rendered nodes.
	pub fn hydrate(&mut self, values: &[Value], scope: &Scope<'_>) -> Result<()> {
		match self {
			Part::Child { value_index, part } => hydrate::hydrate_child(part, value_at(values, *value_index), scope),
			Part::Attribute(part) => part.hydrate(values, scope),
			Part::BooleanAttribute(part) => part.hydrate(values, scope),
			Part::Property(_) | Part::Event(_) | Part::Element(_) => self.commit(values, scope),
		}
	}

	pub fn flush(&mut self, scope: &Scope<'_>) -> Result<usize> {
		match self {
			Part::Child { part, .. } => part.flush(scope),
			Part::Attribute(part) => part.flush(scope),
			Part::BooleanAttribute(part) => Ok(part.binding.take_pending(scope)?.map_or(0, |value| {
				part.apply(&value);
				1
			})),
			Part::Property(part) => Ok(part.binding.take_pending(scope)?.map_or(0, |value| {
				part.apply(value);
				1
			})),
			Part::Event(part) => match part.binding.take_pending(scope)? {
				Some(value) => part.apply(value, scope).map(|()| 1),
				None => Ok(0),
			},
			Part::Element(part) => Ok(part.binding.take_pending(scope)?.map_or(0, |_| 1)),
		}
	}

	pub fn teardown(&mut self) {
		match self {
			Part::Child { part, .. } => part.teardown(),
			Part::Attribute(part) => part.teardown(),
			Part::BooleanAttribute(BooleanAttributePart { binding, .. })
			| Part::Property(PropertyPart { binding, .. })
			| Part::Event(EventPart { binding, .. })
			| Part::Element(ElementPart { binding }) => directive::teardown(&mut binding.directive),
		}
	}

	pub fn set_connected(&mut self, connected: bool) {
		match self {
			Part::Child { part, .. } => part.set_connected(connected),
			Part::Attribute(part) => part.set_connected(connected),
			Part::BooleanAttribute(BooleanAttributePart { binding, .. })
			| Part::Property(PropertyPart { binding, .. })
			| Part::Event(EventPart { binding, .. })
			| Part::Element(ElementPart { binding }) => directive::set_connected(&mut binding.directive, connected),
		}
	}
}
