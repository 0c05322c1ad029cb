//! Copies a live browser DOM into a [`Document`], for example to hydrate server output that a browser already parsed.
//!
//! Loading builds the copy without recording mutations. Only elements, text and comments are copied.

use crate::dom::{Document, Namespace, Node, MATHML_NAMESPACE, SVG_NAMESPACE};
use tracing::{instrument, trace};
use wasm_bindgen::JsCast;
use web_sys::{Attr, Comment, Element, NamedNodeMap, Node as WebNode, NodeList, Text};

/// Loads `child_nodes` into a new document fragment.
#[instrument(skip(child_nodes, document), fields(len = child_nodes.length()))]
#[must_use]
pub fn load_child_nodes(child_nodes: &NodeList, document: &Document) -> Node {
	let fragment = document.create_document_fragment();
	push_children(&fragment, child_nodes, document);
	fragment
}

fn push_children(parent: &Node, child_nodes: &NodeList, document: &Document) {
	for i in 0..child_nodes.length() {
		if let Some(node) = child_nodes.item(i).and_then(|child| load_node(&child, document)) {
			parent.push_child(node);
		}
	}
}

/// `None` for node types the in-memory DOM doesn't model.
#[must_use]
pub fn load_node(node: &WebNode, document: &Document) -> Option<Node> {
	if let Some(element) = node.dyn_ref::<Element>() {
		Some(load_element(element, document))
	} else if let Some(text) = node.dyn_ref::<Text>() {
		Some(document.create_text_node(&text.data()))
	} else if let Some(comment) = node.dyn_ref::<Comment>() {
		Some(document.create_comment(&comment.data()))
	} else {
		trace!("Skipping node of type {}.", node.node_type());
		None
	}
}

#[must_use]
pub fn load_element(element: &Element, document: &Document) -> Node {
	let namespace = match element.namespace_uri().as_deref() {
		Some(SVG_NAMESPACE) => Namespace::Svg,
		Some(MATHML_NAMESPACE) => Namespace::MathMl,
		_ => Namespace::Html,
	};
	let loaded = document.create_element_ns(&element.local_name(), namespace);
	load_attributes(&element.attributes(), &loaded);
	let node: &WebNode = element.as_ref();
	push_children(&loaded, &node.child_nodes(), document);
	loaded
}

fn load_attributes(attributes: &NamedNodeMap, element: &Node) {
	for i in 0..attributes.length() {
		if let Some(attribute) = attributes.item(i) {
			load_attribute(&attribute, element);
		}
	}
}

fn load_attribute(attribute: &Attr, element: &Node) {
	element.load_attribute(attribute.name(), attribute.value());
}
