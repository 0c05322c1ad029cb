//! Binding parts to server-rendered markup.
//!
//! The server brackets every child binding with `<!--tp-part-->`/`<!--/tp-part-->` comments
//! (the opening one carries the template digest when the child is a template) and marks bound elements
//! with a `tp-bound` attribute. Hydration walks a template's cold fragment and the server nodes in lockstep,
//! maps each fragment node to its server counterpart and then creates the parts on the server nodes.

use crate::{
	directive::{self, PartInfo, PartTarget},
	dom::Node,
	error::{Error, Result},
	instance::TemplateInstance,
	markup::{BOUND_ATTRIBUTE, MARKER_PREFIX, PART_CLOSE, PART_OPEN},
	part::{ChildPart, Committed, Part, PartKind},
	render::Scope,
	template::Template,
	value::{TemplateResult, Value},
};
use std::rc::Rc;
use tracing::{error, instrument, trace, warn};

fn mismatch(message: impl Into<String>) -> Error {
	let message = message.into();
	error!("Hydration mismatch: {}", message);
	Error::HydrationMismatch(message)
}

fn is_open_marker(node: &Node) -> bool {
	node.is_comment() && {
		let data = node.data();
		data == PART_OPEN || data.strip_prefix(PART_OPEN).map_or(false, |rest| rest.starts_with(' '))
	}
}

fn is_close_marker(node: &Node) -> bool {
	node.is_comment() && node.data() == PART_CLOSE
}

/// Index of the close marker matching the open marker at `open`.
fn matching_close(nodes: &[Node], open: usize) -> Result<usize> {
	let mut depth = 0_usize;
	for (i, node) in nodes.iter().enumerate().skip(open) {
		if is_open_marker(node) {
			depth += 1;
		} else if is_close_marker(node) {
			depth -= 1;
			if depth == 0 {
				return Ok(i);
			}
		}
	}
	Err(mismatch(format!("unclosed part marker {:?}", nodes[open])))
}

/// Locates the outermost part markers among `container`'s children.
pub(crate) fn find_root_markers(container: &Node) -> Result<(Node, Node)> {
	let children = container.child_nodes();
	let open = children
		.iter()
		.position(is_open_marker)
		.ok_or_else(|| mismatch(format!("{:?} contains no server-rendered part", container)))?;
	let close = matching_close(&children, open)?;
	trace!("Root markers at {} and {}.", open, close);
	Ok((children[open].clone(), children[close].clone()))
}

/// Adopts the server-rendered content between `part`'s markers as the committed state for `value`.
///
/// Text that differs is corrected in place. Structural differences fail with [`Error::HydrationMismatch`].
pub(crate) fn hydrate_child(part: &mut ChildPart, value: Value, scope: &Scope<'_>) -> Result<()> {
	if matches!(value, Value::NoChange) {
		trace!("noChange; leaving the server content unclaimed.");
		return Ok(());
	}
	let mut slot = part.directive.take();
	let resolved = directive::resolve(&mut slot, value, &mut PartTarget::Child(part), &PartInfo::child(), scope);
	part.directive = slot;

	let content = part.content();
	match resolved? {
		Value::NoChange => Ok(()),
		value if value.is_empty_child() => {
			if content.is_empty() {
				Ok(())
			} else {
				Err(mismatch(format!("expected no content after {:?}, found {} node(s)", part.start, content.len())))
			}
		}
		Value::Template(result) => hydrate_template(part, &result, &content, scope),
		Value::List(items) => hydrate_list(part, &items, &content, scope),
		value if value.is_primitive() => {
			let text = value.to_text().unwrap_or_default().into_owned();
			match content.as_slice() {
				[node] if node.is_text() => {
					if node.data() != text {
						warn!("Text after {:?} differs from server output; rewriting.", part.start);
						node.set_data(&text);
					}
					part.committed = Committed::Text { node: node.clone(), value };
					Ok(())
				}
				_ => Err(mismatch(format!("expected a single text node after {:?}", part.start))),
			}
		}
		value => {
			trace!("Committing {} value over server content.", value.type_name());
			part.commit_resolved(value, scope)
		}
	}
}

fn hydrate_template(part: &mut ChildPart, result: &TemplateResult, content: &[Node], scope: &Scope<'_>) -> Result<()> {
	let template = scope.template(result)?;
	let expected = format!("{} {}", PART_OPEN, template.digest());
	let found = part.start.data();
	if found != expected {
		return Err(mismatch(format!("expected template marker {:?}, found {:?}", expected, found)));
	}
	let instance = hydrate_instance(template, result.values(), content, scope)?;
	part.committed = Committed::Instance(instance);
	Ok(())
}

fn hydrate_list(part: &mut ChildPart, values: &[Value], content: &[Node], scope: &Scope<'_>) -> Result<()> {
	let mut items = Vec::with_capacity(values.len());
	let mut i = 0;
	let mut result = Ok(());
	for value in values {
		let open = match content.get(i) {
			Some(node) if is_open_marker(node) => i,
			found => {
				result = Err(mismatch(format!("expected list item {} after {:?}, found {:?}", items.len(), part.start, found)));
				break;
			}
		};
		let close = match matching_close(content, open) {
			Ok(close) => close,
			Err(error) => {
				result = Err(error);
				break;
			}
		};
		let mut item = ChildPart::new(content[open].clone(), content[close].clone());
		let hydrated = hydrate_child(&mut item, value.clone(), scope);
		items.push(item);
		if let Err(error) = hydrated {
			result = Err(error);
			break;
		}
		i = close + 1;
	}
	if result.is_ok() && i != content.len() {
		result = Err(mismatch(format!("{} surplus node(s) after the last list item", content.len() - i)));
	}
	// Items hydrated so far stay owned, so that their directives are torn down with the part.
	part.committed = Committed::List(items);
	result
}

/// Maps each node of `template`'s fragment (in document order) to its server counterpart and binds the parts there.
#[instrument(skip(template, values, server_nodes, scope), fields(digest = template.digest()))]
fn hydrate_instance(template: Rc<Template>, values: &[Value], server_nodes: &[Node], scope: &Scope<'_>) -> Result<TemplateInstance> {
	TemplateInstance::check_value_count(&template, values)?;
	let mut nodes = Vec::new();
	match_nodes(&template.fragment().child_nodes(), server_nodes, &mut nodes)?;

	let node_at = |index: usize| nodes.get(index).cloned().ok_or(Error::Dom("template node index out of range during hydration"));
	for metadata in template.parts().iter().filter(|metadata| metadata.kind != PartKind::Child) {
		let element = node_at(metadata.node_index)?;
		if !element.has_attribute(BOUND_ATTRIBUTE) {
			return Err(mismatch(format!("{:?} lacks the {} attribute", element, BOUND_ATTRIBUTE)));
		}
	}

	let mut parts = Vec::with_capacity(template.parts().len());
	for metadata in template.parts() {
		let node = node_at(metadata.node_index)?;
		let mut part = if metadata.kind == PartKind::Child {
			Part::Child {
				value_index: metadata.value_index,
				part: ChildPart::new(node, node_at(metadata.node_index + 1)?),
			}
		} else {
			Part::new(metadata, node)?
		};
		let hydrated = part.hydrate(values, scope);
		parts.push(part);
		if let Err(error) = hydrated {
			parts.iter_mut().for_each(Part::teardown);
			return Err(error);
		}
	}
	trace!("Hydrated {} part(s).", parts.len());
	Ok(TemplateInstance::from_parts(template, parts))
}

/// Pushes the server node for each template node in preorder, two for each child binding's marker pair.
fn match_nodes(template_nodes: &[Node], server_nodes: &[Node], nodes: &mut Vec<Node>) -> Result<()> {
	let (mut t, mut s) = (0, 0);
	while let Some(template_node) = template_nodes.get(t) {
		let server_node = server_nodes
			.get(s)
			.ok_or_else(|| mismatch(format!("server output ends before the counterpart of {:?}", template_node)))?;

		if template_node.is_comment() && template_node.data().starts_with(MARKER_PREFIX) {
			if !is_open_marker(server_node) {
				return Err(mismatch(format!("expected a part marker, found {:?}", server_node)));
			}
			let close = matching_close(server_nodes, s)?;
			nodes.push(server_node.clone());
			nodes.push(server_nodes[close].clone());
			t += 2;
			s = close + 1;
			continue;
		}

		match (template_node.tag_name(), server_node.tag_name()) {
			(Some(expected), Some(found)) => {
				if !expected.eq_ignore_ascii_case(found) {
					return Err(mismatch(format!("expected <{}>, found <{}>", expected, found)));
				}
				nodes.push(server_node.clone());
				match_nodes(&template_node.child_nodes(), &server_node.child_nodes(), nodes)?;
			}
			(None, None) if template_node.kind() == server_node.kind() => nodes.push(server_node.clone()),
			_ => return Err(mismatch(format!("expected {:?}, found {:?}", template_node, server_node))),
		}
		t += 1;
		s += 1;
	}
	if let Some(extra) = server_nodes.get(s) {
		return Err(mismatch(format!("unexpected {:?} in server output", extra)));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dom::Document;

	#[test]
	fn root_markers_nest() {
		let document = Document::new();
		let container = document.create_element("div");
		let fragment = document.parse_fragment("<p>x</p><!--tp-part 00--><!--tp-part--><!--/tp-part--><!--/tp-part--><p>y</p>");
		container.append_child(&fragment).unwrap();
		let (start, end) = find_root_markers(&container).unwrap();
		assert_eq!(start.data(), "tp-part 00");
		assert!(end.next_sibling().unwrap().is_element());
	}

	#[test]
	fn missing_root_is_a_mismatch() {
		let document = Document::new();
		let container = document.create_element("div");
		container.append_child(&document.create_comment("tp-particle")).unwrap();
		assert!(matches!(find_root_markers(&container), Err(Error::HydrationMismatch(_))));
	}
}
