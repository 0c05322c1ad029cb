use crate::{
	directive::PartInfo,
	dom::{Document, ListenerOptions, Node},
	error::{Error, Result},
	markup::{self, Binding, MARKER_PREFIX},
	part::PartKind,
	value::{TemplateKind, TemplateStrings},
};
use std::rc::Rc;
use tracing::{error, instrument, trace};

/// Where one part of a [`Template`] lives and what it binds.
#[derive(Debug, Clone)]
pub(crate) struct PartMetadata {
	pub kind: PartKind,
	/// Child indices from the fragment down to the part's node (the opening marker comment for child parts).
	pub path: Vec<usize>,
	/// Document-order position of that node among all nodes of the fragment.
	pub node_index: usize,
	pub value_index: usize,
	pub name: Option<Rc<str>>,
	pub strings: Option<Rc<[Rc<str>]>>,
	pub options: ListenerOptions,
}

impl PartMetadata {
	fn new(binding: &Binding, path: Vec<usize>, node_index: usize) -> Self {
		Self {
			kind: binding.kind,
			path,
			node_index,
			value_index: binding.value_index,
			name: binding.name.clone(),
			strings: binding.strings.clone(),
			options: binding.options,
		}
	}

	pub fn value_count(&self) -> usize {
		self.strings.as_ref().map_or(1, |strings| strings.len() - 1)
	}

	pub fn info(&self, element: Option<&Node>) -> PartInfo {
		PartInfo::new(self.kind, self.name.clone(), self.strings.clone(), element.and_then(Node::tag_name).map(Rc::from))
	}
}

/// One parsed static-fragment sequence: a cold fragment that is only ever cloned, and its part metadata in binding order.
#[derive(Debug)]
pub struct Template {
	kind: TemplateKind,
	digest: Rc<str>,
	fragment: Node,
	parts: Vec<PartMetadata>,
	value_count: usize,
}

impl Template {
	#[instrument(skip(strings))]
	pub(crate) fn parse(strings: &TemplateStrings, kind: TemplateKind) -> Result<Self> {
		let markup = markup::scan(strings, kind)?;
		let document = Document::new();
		let fragment = match kind {
			TemplateKind::Html => document.parse_fragment(&markup.html),
			TemplateKind::Svg => {
				let wrapped = document.parse_fragment(&format!("<svg>{}</svg>", markup.html));
				let fragment = document.create_document_fragment();
				if let Some(svg) = wrapped.first_child() {
					for child in svg.child_nodes() {
						fragment.append_child(&child)?;
					}
				}
				fragment
			}
		};

		let mut found = vec![None; markup.bindings.len()];
		let mut node_index = 0;
		walk(&fragment, &mut Vec::new(), &mut node_index, &markup.bindings, &mut found)?;

		let parts = found
			.into_iter()
			.zip(&markup.bindings)
			.map(|(metadata, binding)| {
				metadata.ok_or_else(|| {
					error!("The HTML parser dropped the marker of expression {}.", binding.value_index);
					Error::LostMarker { index: binding.value_index }
				})
			})
			.collect::<Result<Vec<_>>>()?;

		trace!("Parsed template with {} part(s) over {} node(s).", parts.len(), node_index);
		Ok(Self {
			kind,
			digest: markup.digest.into(),
			fragment,
			parts,
			value_count: markup.value_count,
		})
	}

	#[must_use]
	pub fn kind(&self) -> TemplateKind {
		self.kind
	}

	#[must_use]
	pub fn digest(&self) -> &str {
		&self.digest
	}

	#[must_use]
	pub fn value_count(&self) -> usize {
		self.value_count
	}

	/// The cold fragment. Never inserted anywhere.
	pub(crate) fn fragment(&self) -> &Node {
		&self.fragment
	}

	pub(crate) fn parts(&self) -> &[PartMetadata] {
		&self.parts
	}

	/// Clones the fragment into `document` and locates each part's node in the clone.
	///
	/// Paths are resolved before anything is committed, since commits shift child indices.
	pub(crate) fn stamp(&self, document: &Document) -> Result<(Node, Vec<Node>)> {
		let fragment = document.import_node(&self.fragment, true);
		let nodes = self
			.parts
			.iter()
			.map(|metadata| {
				metadata
					.path
					.iter()
					.try_fold(fragment.clone(), |node, &i| node.child(i).ok_or(Error::Dom("template part path doesn't resolve in the clone")))
			})
			.collect::<Result<Vec<_>>>()?;
		Ok((fragment, nodes))
	}
}

fn marker_index(name: &str) -> Option<usize> {
	name.strip_prefix(MARKER_PREFIX)?.parse().ok()
}

fn walk(parent: &Node, path: &mut Vec<usize>, node_index: &mut usize, bindings: &[Binding], found: &mut [Option<PartMetadata>]) -> Result<()> {
	for (i, node) in parent.child_nodes().into_iter().enumerate() {
		path.push(i);
		let index = *node_index;
		*node_index += 1;

		if node.is_comment() {
			if let Some(n) = marker_index(&node.data()) {
				let closed = node.next_sibling().map_or(false, |next| next.is_comment() && next.data() == format!("/{}{}", MARKER_PREFIX, n));
				match (bindings.get(n), closed) {
					(Some(binding), true) => found[n] = Some(PartMetadata::new(binding, path.clone(), index)),
					(Some(binding), false) => {
						error!("The closing marker of expression {} was moved by the HTML parser.", binding.value_index);
						return Err(Error::LostMarker { index: binding.value_index });
					}
					(None, _) => trace!("Ignoring marker-like comment without binding."),
				}
			}
		} else if node.is_element() {
			for name in node.attribute_names() {
				if let Some((n, binding)) = marker_index(&name).and_then(|n| Some((n, bindings.get(n)?))) {
					found[n] = Some(PartMetadata::new(binding, path.clone(), index));
					node.strip_attribute(&name);
				}
			}
			walk(&node, path, node_index, bindings, found)?;
		}

		path.pop();
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn metadata_in_binding_order() {
		let strings = TemplateStrings::from_static(&["<ul><li class=", ">", "</li></ul>", ""]);
		let template = Template::parse(&strings, TemplateKind::Html).unwrap();
		let kinds: Vec<PartKind> = template.parts().iter().map(|p| p.kind).collect();
		assert_eq!(kinds, [PartKind::Attribute, PartKind::Child, PartKind::Child]);
		assert_eq!(template.parts()[0].path, [0, 0]);
		assert_eq!(template.parts()[1].path, [0, 0, 0]);
		assert_eq!(template.parts()[2].path, [1]);
		assert_eq!(template.fragment().inner_html(), "<ul><li><!--tp$1--><!--/tp$1--></li></ul><!--tp$2--><!--/tp$2-->");
	}

	#[test]
	fn node_indices_are_preorder() {
		let strings = TemplateStrings::from_static(&["<p>a<b ?x=", "></b></p>", ""]);
		let template = Template::parse(&strings, TemplateKind::Html).unwrap();
		// p, "a", b, then the marker pair after p.
		assert_eq!(template.parts()[0].node_index, 2);
		assert_eq!(template.parts()[1].node_index, 3);
	}

	#[test]
	fn svg_fragments_are_unwrapped() {
		let strings = TemplateStrings::from_static(&["<circle r=", "></circle>"]);
		let template = Template::parse(&strings, TemplateKind::Svg).unwrap();
		let circle = template.fragment().first_child().unwrap();
		assert_eq!(circle.tag_name(), Some("circle"));
		assert_eq!(circle.namespace(), Some(crate::dom::Namespace::Svg));
	}
}
