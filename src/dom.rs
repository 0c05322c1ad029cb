//! A small in-memory DOM that parts are committed into.
//!
//! It mirrors the subset of the browser DOM the engine needs (tree edits, attributes, properties, listeners)
//! and counts every child-list, attribute and character-data mutation per [`Document`], the way a
//! [***MutationObserver***](https://developer.mozilla.org/en-US/docs/Web/API/MutationObserver) would see them.
//! Listener and property changes are not counted.

use crate::{
	error::{Error, Result},
	value::Value,
};
use core::{
	any::Any,
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use html5ever::{tendril::TendrilSink, LocalName, Namespace as ParserNamespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData as ParsedData, RcDom};
use std::{
	borrow::Cow,
	rc::{Rc, Weak},
};
use tracing::{instrument, trace};

pub const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";
pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";
pub const MATHML_NAMESPACE: &str = "http://www.w3.org/1998/Math/MathML";

const VOID_ELEMENTS: &[&str] = &[
	"area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr",
];

/// Elements whose text content is serialized without escaping.
pub(crate) const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title", "xmp", "iframe", "noembed", "noframes"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
	Html,
	Svg,
	MathMl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
	Element { name: String, namespace: Namespace },
	Text,
	Comment,
	Fragment,
}

#[derive(Debug, Default)]
struct DocumentState {
	mutations: Cell<u64>,
}

/// Owner of a set of [`Node`]s. Cloning shares the document.
#[derive(Clone, Default)]
pub struct Document(Rc<DocumentState>);

impl Debug for Document {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Document").field("mutations", &self.0.mutations.get()).finish()
	}
}

impl Document {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Total child-list, attribute and character-data mutations on this document's nodes so far.
	#[must_use]
	pub fn mutation_count(&self) -> u64 {
		self.0.mutations.get()
	}

	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	fn create(&self, kind: NodeKind, data: String) -> Node {
		Node(Rc::new(NodeData {
			document: Rc::clone(&self.0),
			kind,
			data: RefCell::new(data),
			attributes: RefCell::default(),
			properties: RefCell::default(),
			listeners: RefCell::default(),
			parent: RefCell::new(Weak::new()),
			children: RefCell::default(),
			index_hint: Cell::new(0),
		}))
	}

	#[must_use]
	pub fn create_element(&self, name: &str) -> Node {
		self.create_element_ns(name, Namespace::Html)
	}

	#[must_use]
	pub fn create_element_ns(&self, name: &str, namespace: Namespace) -> Node {
		let name = match namespace {
			Namespace::Html => name.to_ascii_lowercase(),
			Namespace::Svg | Namespace::MathMl => name.to_owned(),
		};
		self.create(NodeKind::Element { name, namespace }, String::new())
	}

	#[must_use]
	pub fn create_text_node(&self, data: &str) -> Node {
		self.create(NodeKind::Text, data.to_owned())
	}

	#[must_use]
	pub fn create_comment(&self, data: &str) -> Node {
		self.create(NodeKind::Comment, data.to_owned())
	}

	#[must_use]
	pub fn create_document_fragment(&self) -> Node {
		self.create(NodeKind::Fragment, String::new())
	}

	/// Copies `node` (and with `deep` its descendants) into this document.
	///
	/// Attributes are copied, properties and listeners are not. Building the copy is not counted as mutation.
	#[must_use]
	pub fn import_node(&self, node: &Node, deep: bool) -> Node {
		let copy = self.create(node.0.kind.clone(), node.0.data.borrow().clone());
		copy.0.attributes.borrow_mut().clone_from(&node.0.attributes.borrow());
		if deep {
			for child in node.0.children.borrow().iter() {
				copy.push_child(self.import_node(child, true));
			}
		}
		copy
	}

	/// Parses `html` like the content of a `<template>` element and returns the result as fragment.
	#[instrument(skip(html), fields(len = html.len()))]
	#[must_use]
	pub fn parse_fragment(&self, html: &str) -> Node {
		let context = QualName::new(None, ParserNamespace::from(HTML_NAMESPACE), LocalName::from("template"));
		let parsed = html5ever::parse_fragment(RcDom::default(), ParseOpts::default(), context, Vec::new()).one(html);

		let fragment = self.create_document_fragment();
		let document_children = parsed.document.children.borrow();
		// Fragment parsing places the content below a synthetic root element.
		if let Some(root) = document_children.first() {
			for child in root.children.borrow().iter() {
				if let Some(node) = self.convert_parsed(child) {
					fragment.push_child(node);
				}
			}
		}
		trace!("Parsed {} top-level node(s).", fragment.0.children.borrow().len());
		fragment
	}

	fn convert_parsed(&self, handle: &Handle) -> Option<Node> {
		match &handle.data {
			ParsedData::Text { contents } => Some(self.create_text_node(&contents.borrow())),
			ParsedData::Comment { contents } => Some(self.create_comment(contents)),
			ParsedData::Element {
				name, attrs, template_contents, ..
			} => {
				let namespace = match &*name.ns {
					SVG_NAMESPACE => Namespace::Svg,
					MATHML_NAMESPACE => Namespace::MathMl,
					_ => Namespace::Html,
				};
				let element = self.create(
					NodeKind::Element {
						name: name.local.to_string(),
						namespace,
					},
					String::new(),
				);
				*element.0.attributes.borrow_mut() = attrs
					.borrow()
					.iter()
					.map(|attribute| {
						let name = match &attribute.name.prefix {
							Some(prefix) => format!("{}:{}", prefix, attribute.name.local),
							None => attribute.name.local.to_string(),
						};
						(name, attribute.value.to_string())
					})
					.collect();

				let template_contents = template_contents.borrow();
				let children = match &*template_contents {
					Some(contents) => contents.children.borrow().clone(),
					None => handle.children.borrow().clone(),
				};
				for child in &children {
					if let Some(node) = self.convert_parsed(child) {
						element.push_child(node);
					}
				}
				Some(element)
			}
			ParsedData::Document | ParsedData::Doctype { .. } | ParsedData::ProcessingInstruction { .. } => None,
		}
	}
}

/// Options of an event listener registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ListenerOptions {
	pub capture: bool,
	pub once: bool,
	pub passive: bool,
}

pub type DomListener = Rc<dyn Fn(&Event)>;

struct Registration {
	name: String,
	listener: DomListener,
	options: ListenerOptions,
}

/// An event as seen by listeners.
#[derive(Clone)]
pub struct Event {
	name: Rc<str>,
	target: Node,
	current_target: Node,
	host: Option<Rc<dyn Any>>,
}

impl Debug for Event {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Event")
			.field("name", &self.name)
			.field("target", &self.target)
			.field("current_target", &self.current_target)
			.field("host", &self.host.is_some())
			.finish()
	}
}

impl Event {
	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub fn target(&self) -> &Node {
		&self.target
	}

	#[must_use]
	pub fn current_target(&self) -> &Node {
		&self.current_target
	}

	/// The `host` from the [`RenderOptions`](`crate::RenderOptions`) of the binding that registered the listener, if any.
	#[must_use]
	pub fn host(&self) -> Option<&Rc<dyn Any>> {
		self.host.as_ref()
	}

	#[must_use]
	pub(crate) fn with_host(&self, host: Option<Rc<dyn Any>>) -> Self {
		Self { host, ..self.clone() }
	}
}

struct NodeData {
	document: Rc<DocumentState>,
	kind: NodeKind,
	data: RefCell<String>,
	attributes: RefCell<Vec<(String, String)>>,
	properties: RefCell<HashMap<String, Value>>,
	listeners: RefCell<Vec<Registration>>,
	parent: RefCell<Weak<NodeData>>,
	children: RefCell<Vec<Node>>,
	/// Last known position among the parent's children. Only a hint; verified on use.
	index_hint: Cell<usize>,
}

/// A shared handle to a DOM node. Equality of handles is node identity, see [`Node::ptr_eq`].
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

impl Debug for Node {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match &self.0.kind {
			NodeKind::Element { name, .. } => write!(f, "<{}>#{:x}", name, self.id()),
			NodeKind::Text => {
				if cfg!(feature = "dangerous-logging") {
					write!(f, "Text({:?})#{:x}", self.0.data.borrow(), self.id())
				} else {
					write!(f, "Text#{:x}", self.id())
				}
			}
			NodeKind::Comment => write!(f, "<!--{}-->#{:x}", self.0.data.borrow(), self.id()),
			NodeKind::Fragment => write!(f, "#fragment#{:x}", self.id()),
		}
	}
}

impl PartialEq for Node {
	fn eq(&self, other: &Self) -> bool {
		self.ptr_eq(other)
	}
}
impl Eq for Node {}

impl Node {
	fn record_mutation(&self) {
		let mutations = &self.0.document.mutations;
		mutations.set(mutations.get() + 1);
	}

	/// Appends without recording a mutation. Only for nodes under construction.
	pub(crate) fn push_child(&self, child: Node) {
		*child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
		let mut children = self.0.children.borrow_mut();
		child.0.index_hint.set(children.len());
		children.push(child);
	}

	/// Adds an attribute without recording a mutation. Only for nodes under construction.
	#[cfg(feature = "web")]
	pub(crate) fn load_attribute(&self, name: String, value: String) {
		self.0.attributes.borrow_mut().push((name, value));
	}

	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	/// A process-unique identifier for as long as the node is alive.
	#[must_use]
	pub fn id(&self) -> usize {
		Rc::as_ptr(&self.0) as usize
	}

	#[must_use]
	pub fn kind(&self) -> &NodeKind {
		&self.0.kind
	}

	#[must_use]
	pub fn is_element(&self) -> bool {
		matches!(self.0.kind, NodeKind::Element { .. })
	}

	#[must_use]
	pub fn is_text(&self) -> bool {
		self.0.kind == NodeKind::Text
	}

	#[must_use]
	pub fn is_comment(&self) -> bool {
		self.0.kind == NodeKind::Comment
	}

	#[must_use]
	pub fn is_fragment(&self) -> bool {
		self.0.kind == NodeKind::Fragment
	}

	/// The local name of an element.
	#[must_use]
	pub fn tag_name(&self) -> Option<&str> {
		match &self.0.kind {
			NodeKind::Element { name, .. } => Some(name),
			_ => None,
		}
	}

	#[must_use]
	pub fn namespace(&self) -> Option<Namespace> {
		match &self.0.kind {
			NodeKind::Element { namespace, .. } => Some(*namespace),
			_ => None,
		}
	}

	#[must_use]
	pub fn document(&self) -> Document {
		Document(Rc::clone(&self.0.document))
	}

	#[must_use]
	pub fn parent_node(&self) -> Option<Node> {
		self.0.parent.borrow().upgrade().map(Node)
	}

	#[must_use]
	pub fn child_nodes(&self) -> Vec<Node> {
		self.0.children.borrow().clone()
	}

	#[must_use]
	pub fn child_count(&self) -> usize {
		self.0.children.borrow().len()
	}

	#[must_use]
	pub fn child(&self, index: usize) -> Option<Node> {
		self.0.children.borrow().get(index).cloned()
	}

	#[must_use]
	pub fn first_child(&self) -> Option<Node> {
		self.0.children.borrow().first().cloned()
	}

	#[must_use]
	pub fn last_child(&self) -> Option<Node> {
		self.0.children.borrow().last().cloned()
	}

	/// Constant time while the hint is current. A miss refreshes the hints of all siblings.
	fn index_in(&self, parent: &Node) -> Option<usize> {
		let children = parent.0.children.borrow();
		let hint = self.0.index_hint.get();
		if children.get(hint).map_or(false, |child| child.ptr_eq(self)) {
			return Some(hint);
		}
		let mut found = None;
		for (index, child) in children.iter().enumerate() {
			child.0.index_hint.set(index);
			if child.ptr_eq(self) {
				found = Some(index);
			}
		}
		found
	}

	#[must_use]
	pub fn next_sibling(&self) -> Option<Node> {
		let parent = self.parent_node()?;
		let index = self.index_in(&parent)?;
		parent.child(index + 1)
	}

	#[must_use]
	pub fn previous_sibling(&self) -> Option<Node> {
		let parent = self.parent_node()?;
		let index = self.index_in(&parent)?;
		index.checked_sub(1).and_then(|index| parent.child(index))
	}

	/// Whether `other` is this node or one of its descendants.
	#[must_use]
	pub fn contains(&self, other: &Node) -> bool {
		let mut current = Some(other.clone());
		while let Some(node) = current {
			if node.ptr_eq(self) {
				return true;
			}
			current = node.parent_node();
		}
		false
	}

	/// Detaches this node from its parent, if it has one.
	pub fn remove(&self) {
		if let Some(parent) = self.parent_node() {
			if let Some(index) = self.index_in(&parent) {
				parent.0.children.borrow_mut().remove(index);
				*self.0.parent.borrow_mut() = Weak::new();
				parent.record_mutation();
			}
		}
	}

	pub fn remove_child(&self, child: &Node) -> Result<()> {
		match child.index_in(self) {
			Some(index) => {
				self.0.children.borrow_mut().remove(index);
				*child.0.parent.borrow_mut() = Weak::new();
				self.record_mutation();
				Ok(())
			}
			None => Err(Error::Dom("the node to remove is not a child of this node")),
		}
	}

	pub fn append_child(&self, child: &Node) -> Result<()> {
		self.insert_before(child, None)
	}

	/// Inserts `new` before `reference`, or at the end without one.
	///
	/// `new` is moved if it is already attached somewhere. Fragments are emptied into this node.
	pub fn insert_before(&self, new: &Node, reference: Option<&Node>) -> Result<()> {
		if new.is_fragment() {
			let children = core::mem::take(&mut *new.0.children.borrow_mut());
			if !children.is_empty() {
				new.record_mutation();
			}
			for child in &children {
				*child.0.parent.borrow_mut() = Weak::new();
			}
			for child in &children {
				self.insert_before(child, reference)?;
			}
			return Ok(());
		}

		if new.contains(self) {
			return Err(Error::Dom("can't insert a node into itself or its descendants"));
		}
		let reference = match reference {
			Some(reference) if reference.ptr_eq(new) => new.next_sibling(),
			Some(reference) => {
				if reference.index_in(self).is_none() {
					return Err(Error::Dom("the reference node is not a child of this node"));
				}
				Some(reference.clone())
			}
			None => None,
		};

		new.remove();
		let index = match &reference {
			Some(reference) => reference.index_in(self).ok_or(Error::Dom("the reference node is not a child of this node"))?,
			None => self.child_count(),
		};
		*new.0.parent.borrow_mut() = Rc::downgrade(&self.0);
		self.0.children.borrow_mut().insert(index, new.clone());
		new.0.index_hint.set(index);
		if let Some(reference) = &reference {
			reference.0.index_hint.set(index + 1);
		}
		self.record_mutation();
		Ok(())
	}

	/// Character data of a text or comment node.
	#[must_use]
	pub fn data(&self) -> String {
		self.0.data.borrow().clone()
	}

	pub fn set_data(&self, data: &str) {
		*self.0.data.borrow_mut() = data.to_owned();
		self.record_mutation();
	}

	#[must_use]
	pub fn text_content(&self) -> String {
		match self.0.kind {
			NodeKind::Text => self.data(),
			NodeKind::Comment => String::new(),
			NodeKind::Element { .. } | NodeKind::Fragment => self.0.children.borrow().iter().map(Node::text_content).collect(),
		}
	}

	/// HTML elements match attribute names ASCII-case-insensitively, like the HTML parser stores them.
	fn attribute_name<'a>(&self, name: &'a str) -> Cow<'a, str> {
		match &self.0.kind {
			NodeKind::Element { namespace: Namespace::Html, .. } if name.bytes().any(|b| b.is_ascii_uppercase()) => Cow::Owned(name.to_ascii_lowercase()),
			_ => Cow::Borrowed(name),
		}
	}

	#[must_use]
	pub fn get_attribute(&self, name: &str) -> Option<String> {
		let name = self.attribute_name(name);
		self.0.attributes.borrow().iter().find(|(n, _)| *n == name).map(|(_, value)| value.clone())
	}

	#[must_use]
	pub fn has_attribute(&self, name: &str) -> bool {
		let name = self.attribute_name(name);
		self.0.attributes.borrow().iter().any(|(n, _)| *n == name)
	}

	#[must_use]
	pub fn attribute_names(&self) -> Vec<String> {
		self.0.attributes.borrow().iter().map(|(name, _)| name.clone()).collect()
	}

	/// Sets an attribute's value in place, or appends the attribute.
	pub fn set_attribute(&self, name: &str, value: &str) {
		let name = self.attribute_name(name);
		{
			let mut attributes = self.0.attributes.borrow_mut();
			match attributes.iter_mut().find(|(n, _)| *n == name) {
				Some((_, existing)) => value.clone_into(existing),
				None => attributes.push((name.into_owned(), value.to_owned())),
			}
		}
		self.record_mutation();
	}

	/// Returns whether there was an attribute to remove.
	pub fn remove_attribute(&self, name: &str) -> bool {
		let name = self.attribute_name(name);
		let removed = {
			let mut attributes = self.0.attributes.borrow_mut();
			let before = attributes.len();
			attributes.retain(|(n, _)| *n != name);
			attributes.len() != before
		};
		if removed {
			self.record_mutation();
		}
		removed
	}

	/// Removes an attribute of a node that is not part of a live tree yet.
	pub(crate) fn strip_attribute(&self, name: &str) {
		let name = self.attribute_name(name);
		self.0.attributes.borrow_mut().retain(|(n, _)| *n != name);
	}

	#[must_use]
	pub fn property(&self, name: &str) -> Option<Value> {
		self.0.properties.borrow().get(name).cloned()
	}

	pub fn set_property(&self, name: &str, value: Value) {
		self.0.properties.borrow_mut().insert(name.to_owned(), value);
	}

	pub fn remove_property(&self, name: &str) -> Option<Value> {
		self.0.properties.borrow_mut().remove(name)
	}

	pub fn add_event_listener(&self, name: &str, listener: DomListener, options: ListenerOptions) {
		let mut listeners = self.0.listeners.borrow_mut();
		let duplicate = listeners
			.iter()
			.any(|r| r.name == name && r.options.capture == options.capture && same_listener(&r.listener, &listener));
		if !duplicate {
			listeners.push(Registration {
				name: name.to_owned(),
				listener,
				options,
			});
		}
	}

	pub fn remove_event_listener(&self, name: &str, listener: &DomListener, capture: bool) {
		self.0
			.listeners
			.borrow_mut()
			.retain(|r| !(r.name == name && r.options.capture == capture && same_listener(&r.listener, listener)));
	}

	#[must_use]
	pub fn listener_count(&self) -> usize {
		self.0.listeners.borrow().len()
	}

	fn take_listeners(&self, name: &str, capture: bool) -> Vec<DomListener> {
		let mut listeners = self.0.listeners.borrow_mut();
		let matching = listeners
			.iter()
			.filter(|r| r.name == name && r.options.capture == capture)
			.map(|r| Rc::clone(&r.listener))
			.collect();
		listeners.retain(|r| !(r.name == name && r.options.capture == capture && r.options.once));
		matching
	}

	/// Dispatches a bubbling event at this node. Returns the number of listeners that ran.
	pub fn dispatch_event(&self, name: &str) -> usize {
		let mut path = vec![self.clone()];
		while let Some(parent) = path.last().and_then(Node::parent_node) {
			path.push(parent);
		}

		let name: Rc<str> = Rc::from(name);
		let mut count = 0;
		let mut invoke = |node: &Node, capture: bool| {
			let event = Event {
				name: Rc::clone(&name),
				target: self.clone(),
				current_target: node.clone(),
				host: None,
			};
			for listener in node.take_listeners(&name, capture) {
				listener(&event);
				count += 1;
			}
		};
		for node in path.iter().rev() {
			invoke(node, true);
		}
		for node in &path {
			invoke(node, false);
		}
		count
	}

	#[must_use]
	pub fn inner_html(&self) -> String {
		let mut html = String::new();
		for child in self.0.children.borrow().iter() {
			child.write_html(&mut html, self.is_raw_text_element());
		}
		html
	}

	#[must_use]
	pub fn outer_html(&self) -> String {
		let mut html = String::new();
		let raw = self.parent_node().map_or(false, |parent| parent.is_raw_text_element());
		self.write_html(&mut html, raw);
		html
	}

	fn is_raw_text_element(&self) -> bool {
		matches!(&self.0.kind, NodeKind::Element { name, namespace: Namespace::Html } if RAW_TEXT_ELEMENTS.contains(&name.as_str()))
	}

	fn write_html(&self, html: &mut String, raw_text: bool) {
		match &self.0.kind {
			NodeKind::Text => {
				if raw_text {
					html.push_str(&self.0.data.borrow());
				} else {
					escape_text_into(&self.0.data.borrow(), html);
				}
			}
			NodeKind::Comment => {
				html.push_str("<!--");
				html.push_str(&self.0.data.borrow());
				html.push_str("-->");
			}
			NodeKind::Fragment => {
				for child in self.0.children.borrow().iter() {
					child.write_html(html, raw_text);
				}
			}
			NodeKind::Element { name, namespace } => {
				html.push('<');
				html.push_str(name);
				for (attribute, value) in self.0.attributes.borrow().iter() {
					html.push(' ');
					html.push_str(attribute);
					html.push_str("=\"");
					escape_attribute_into(value, html);
					html.push('"');
				}
				html.push('>');
				if *namespace == Namespace::Html && VOID_ELEMENTS.contains(&name.as_str()) {
					return;
				}
				let raw = self.is_raw_text_element();
				for child in self.0.children.borrow().iter() {
					child.write_html(html, raw);
				}
				html.push_str("</");
				html.push_str(name);
				html.push('>');
			}
		}
	}
}

fn same_listener(a: &DomListener, b: &DomListener) -> bool {
	Rc::as_ptr(a).cast::<()>() == Rc::as_ptr(b).cast::<()>()
}

pub(crate) fn escape_text_into(text: &str, out: &mut String) {
	for c in text.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'\u{a0}' => out.push_str("&nbsp;"),
			c => out.push(c),
		}
	}
}

pub(crate) fn escape_attribute_into(value: &str, out: &mut String) {
	for c in value.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'"' => out.push_str("&quot;"),
			'\u{a0}' => out.push_str("&nbsp;"),
			c => out.push(c),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn siblings(parent: &Node) -> Vec<Node> {
		let mut nodes = Vec::new();
		let mut current = parent.first_child();
		while let Some(node) = current {
			current = node.next_sibling();
			nodes.push(node);
		}
		nodes
	}

	#[test]
	fn sibling_walk_survives_reshuffles() {
		let document = Document::new();
		let parent = document.create_element("ul");
		let end = document.create_comment("");
		parent.append_child(&end).unwrap();
		for i in 0..50 {
			parent.insert_before(&document.create_text_node(&i.to_string()), Some(&end)).unwrap();
		}
		let first = parent.first_child().unwrap();
		parent.insert_before(&document.create_comment("front"), Some(&first)).unwrap();
		parent.child(20).unwrap().remove();
		parent.insert_before(&first, Some(&end)).unwrap();

		let walked = siblings(&parent);
		let listed = parent.child_nodes();
		assert_eq!(walked.len(), listed.len());
		assert!(walked.iter().zip(&listed).all(|(a, b)| a.ptr_eq(b)));
		assert!(end.previous_sibling().unwrap().ptr_eq(&first));
	}

	#[test]
	fn html_attribute_names_ignore_case() {
		let document = Document::new();
		let p = document.create_element("p");
		p.set_attribute("Title", "a");
		assert_eq!(p.attribute_names(), ["title"]);
		assert_eq!(p.get_attribute("TITLE").as_deref(), Some("a"));
		p.set_attribute("title", "b");
		assert_eq!(p.attribute_names(), ["title"]);
		assert!(p.remove_attribute("tItLe"));

		let svg = document.create_element_ns("svg", Namespace::Svg);
		svg.set_attribute("viewBox", "0 0 1 1");
		assert_eq!(svg.attribute_names(), ["viewBox"]);
		assert!(!svg.has_attribute("viewbox"));
	}
}
