//! Turns a template's static fragments into marker-annotated markup.
//!
//! This is a small HTML tokenizer that only tracks as much state as is needed to know *where* each expression sits:
//! in text (a child binding), inside a tag (an element binding) or inside an attribute value (an attribute-like binding).
//! Child positions become a `<!--tp$N--><!--/tp$N-->` comment pair that brackets the committed content. Bound attributes are cut out of the markup entirely and replaced with a
//! boolean `tp$N` attribute; their name, prefix and static strings are kept in the [`Binding`].

use crate::{
	dom::{ListenerOptions, RAW_TEXT_ELEMENTS},
	error::{Error, Result},
	part::PartKind,
	value::{TemplateKind, TemplateStrings},
};
use core::ops::Range;
use std::rc::Rc;
use tracing::{error, instrument, trace};

/// Prefix of template-internal markers, both comment data and attribute names.
pub(crate) const MARKER_PREFIX: &str = "tp$";

/// Opening comment data of a server-rendered child range. Followed by a space and digest for template results.
pub const PART_OPEN: &str = "tp-part";
/// Closing comment data of a server-rendered child range.
pub const PART_CLOSE: &str = "/tp-part";
/// Boolean attribute on server-rendered elements that carry attribute-position or element bindings.
pub const BOUND_ATTRIBUTE: &str = "tp-bound";

/// One binding site of a template.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
	pub kind: PartKind,
	/// Index of the first expression this binding consumes.
	pub value_index: usize,
	/// Attribute, property or event name, case preserved.
	pub name: Option<Rc<str>>,
	/// Static strings around the expressions of an attribute-like binding.
	pub strings: Option<Rc<[Rc<str>]>>,
	pub options: ListenerOptions,
}

impl Binding {
	pub fn value_count(&self) -> usize {
		self.strings.as_ref().map_or(1, |strings| strings.len() - 1)
	}
}

#[derive(Debug, Clone)]
pub(crate) enum ServerOp {
	Static(Rc<str>),
	Child(usize),
	/// The [`BOUND_ATTRIBUTE`] marker, once per element with bindings.
	ElementMarker,
	Attribute(usize),
}

/// Scanner output for one template.
#[derive(Debug)]
pub(crate) struct Markup {
	pub kind: TemplateKind,
	/// Marker-annotated markup, ready for the HTML parser.
	pub html: String,
	/// Indexed by the `N` in `tp$N`.
	pub bindings: Vec<Binding>,
	pub server_ops: Vec<ServerOp>,
	pub value_count: usize,
	pub digest: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
	Double,
	Single,
	Unquoted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
	Text,
	TagName,
	BeforeAttributeName,
	AttributeName,
	AfterAttributeName,
	BeforeAttributeValue,
	AttributeValue(Quote),
	Comment,
	RawText,
	EndTag,
}

struct Marker {
	range: Range<usize>,
	binding: usize,
	first_in_tag: bool,
}

struct PendingBinding {
	index: usize,
	strings: Vec<String>,
}

struct Scanner {
	html: String,
	state: State,
	tag_name: String,
	raw_text_end: Option<String>,
	attribute_start: usize,
	attribute_name: String,
	value_start: usize,
	bound: Option<PendingBinding>,
	tag_has_binding: bool,
	bindings: Vec<Binding>,
	binding_strings: Vec<Option<Vec<String>>>,
	markers: Vec<Marker>,
}

impl Scanner {
	fn new() -> Self {
		Self {
			html: String::new(),
			state: State::Text,
			tag_name: String::new(),
			raw_text_end: None,
			attribute_start: 0,
			attribute_name: String::new(),
			value_start: 0,
			bound: None,
			tag_has_binding: false,
			bindings: Vec::new(),
			binding_strings: Vec::new(),
			markers: Vec::new(),
		}
	}

	fn enter_content(&mut self) {
		let tag_name = self.tag_name.to_ascii_lowercase();
		if RAW_TEXT_ELEMENTS.contains(&tag_name.as_str()) {
			self.raw_text_end = Some(format!("</{}", tag_name));
			self.state = State::RawText;
		} else {
			self.state = State::Text;
		}
	}

	fn scan(&mut self, string: &str) {
		let mut rest = string;
		while let Some(c) = rest.chars().next() {
			let len = c.len_utf8();
			let next = &rest[len..];
			match self.state {
				State::Text => {
					if c == '<' {
						if next.starts_with("!--") {
							self.html.push_str("<!--");
							rest = &next[3..];
							self.state = State::Comment;
							continue;
						} else if next.starts_with('/') {
							self.state = State::EndTag;
						} else if next.starts_with(|c: char| c.is_ascii_alphabetic()) {
							self.state = State::TagName;
							self.tag_name.clear();
							self.tag_has_binding = false;
						}
					}
					self.html.push(c);
				}
				State::Comment => {
					if c == '-' && next.starts_with("->") {
						self.html.push_str("-->");
						rest = &next[2..];
						self.state = State::Text;
						continue;
					}
					self.html.push(c);
				}
				State::RawText => {
					let end = self.raw_text_end.as_deref().unwrap_or("</");
					if rest.len() >= end.len() && rest.is_char_boundary(end.len()) && rest[..end.len()].eq_ignore_ascii_case(end) {
						self.html.push_str(&rest[..end.len()]);
						rest = &rest[end.len()..];
						self.raw_text_end = None;
						self.state = State::EndTag;
						continue;
					}
					self.html.push(c);
				}
				State::EndTag => {
					if c == '>' {
						self.state = State::Text;
					}
					self.html.push(c);
				}
				State::TagName => {
					if c.is_whitespace() || c == '/' {
						self.state = State::BeforeAttributeName;
					} else if c == '>' {
						self.enter_content();
					} else {
						self.tag_name.push(c);
					}
					self.html.push(c);
				}
				State::BeforeAttributeName | State::AfterAttributeName => {
					if c == '>' {
						self.enter_content();
					} else if c == '=' && self.state == State::AfterAttributeName {
						self.state = State::BeforeAttributeValue;
					} else if c == '/' {
						self.state = State::BeforeAttributeName;
					} else if !c.is_whitespace() {
						self.attribute_start = self.html.len();
						self.attribute_name.clear();
						self.attribute_name.push(c);
						self.state = State::AttributeName;
					}
					self.html.push(c);
				}
				State::AttributeName => {
					if c == '=' {
						self.state = State::BeforeAttributeValue;
					} else if c.is_whitespace() {
						self.state = State::AfterAttributeName;
					} else if c == '>' {
						self.enter_content();
					} else if c == '/' {
						self.state = State::BeforeAttributeName;
					} else {
						self.attribute_name.push(c);
					}
					self.html.push(c);
				}
				State::BeforeAttributeValue => {
					match c {
						'"' => {
							self.state = State::AttributeValue(Quote::Double);
							self.value_start = self.html.len() + 1;
						}
						'\'' => {
							self.state = State::AttributeValue(Quote::Single);
							self.value_start = self.html.len() + 1;
						}
						'>' => self.enter_content(),
						c if c.is_whitespace() => (),
						_ => {
							self.state = State::AttributeValue(Quote::Unquoted);
							self.value_start = self.html.len();
						}
					}
					self.html.push(c);
				}
				State::AttributeValue(quote) => {
					let closes = match quote {
						Quote::Double => c == '"',
						Quote::Single => c == '\'',
						Quote::Unquoted => c.is_whitespace() || c == '>',
					};
					if closes {
						let was_bound = self.bound.is_some();
						self.finish_bound_attribute();
						match (quote, c) {
							(Quote::Unquoted, '>') => {
								self.html.push(c);
								self.enter_content();
							}
							(Quote::Unquoted, _) => {
								self.html.push(c);
								self.state = State::BeforeAttributeName;
							}
							_ => {
								if !was_bound {
									self.html.push(c);
								}
								self.state = State::BeforeAttributeName;
							}
						}
					} else {
						match self.bound.as_mut().and_then(|pending| pending.strings.last_mut()) {
							Some(current) => current.push(c),
							None => self.html.push(c),
						}
					}
				}
			}
			rest = next;
		}
	}

	fn push_marker(&mut self, text: &str, binding: usize) {
		let start = self.html.len();
		self.html.push_str(text);
		let first_in_tag = self.bindings[binding].kind != PartKind::Child && !self.tag_has_binding;
		if self.bindings[binding].kind != PartKind::Child {
			self.tag_has_binding = true;
		}
		self.markers.push(Marker {
			range: start..self.html.len(),
			binding,
			first_in_tag,
		});
	}

	fn expression(&mut self, index: usize) -> Result<()> {
		let unsupported = |reason| {
			error!("Unsupported binding position for expression {}: {}", index, reason);
			Err(Error::UnsupportedBindingPosition { index, reason })
		};
		match self.state {
			State::Text => {
				let binding = self.bindings.len();
				self.bindings.push(Binding {
					kind: PartKind::Child,
					value_index: index,
					name: None,
					strings: None,
					options: ListenerOptions::default(),
				});
				self.binding_strings.push(None);
				self.push_marker(&format!("<!--{0}{1}--><!--/{0}{1}-->", MARKER_PREFIX, binding), binding);
			}
			State::BeforeAttributeName | State::AfterAttributeName => {
				let binding = self.bindings.len();
				self.bindings.push(Binding {
					kind: PartKind::Element,
					value_index: index,
					name: None,
					strings: None,
					options: ListenerOptions::default(),
				});
				self.binding_strings.push(None);
				if !self.html.ends_with(char::is_whitespace) {
					self.html.push(' ');
				}
				self.push_marker(&format!("{}{}", MARKER_PREFIX, binding), binding);
				self.state = State::BeforeAttributeName;
			}
			State::BeforeAttributeValue | State::AttributeValue(_) => {
				if let Some(pending) = &mut self.bound {
					pending.strings.push(String::new());
					return Ok(());
				}

				let prefix = if self.state == State::BeforeAttributeValue {
					self.state = State::AttributeValue(Quote::Unquoted);
					String::new()
				} else {
					self.html[self.value_start.min(self.html.len())..].to_owned()
				};
				self.html.truncate(self.attribute_start);

				let (kind, name, options) = classify_attribute(&self.attribute_name);
				let binding = self.bindings.len();
				self.bindings.push(Binding {
					kind,
					value_index: index,
					name: Some(name.into()),
					strings: None,
					options,
				});
				self.binding_strings.push(None);
				self.bound = Some(PendingBinding {
					index: binding,
					strings: vec![prefix, String::new()],
				});
				self.push_marker(&format!("{}{}", MARKER_PREFIX, binding), binding);
			}
			State::TagName => return unsupported("inside a tag name"),
			State::AttributeName => return unsupported("inside an attribute name"),
			State::Comment => return unsupported("inside a comment"),
			State::RawText => return unsupported("inside a raw text element"),
			State::EndTag => return unsupported("inside an end tag"),
		}
		Ok(())
	}

	fn finish_bound_attribute(&mut self) {
		if let Some(PendingBinding { index, strings }) = self.bound.take() {
			self.binding_strings[index] = Some(strings);
		}
	}
}

fn classify_attribute(raw_name: &str) -> (PartKind, String, ListenerOptions) {
	match raw_name.chars().next() {
		Some('.') => (PartKind::Property, raw_name[1..].to_owned(), ListenerOptions::default()),
		Some('?') => (PartKind::BooleanAttribute, raw_name[1..].to_owned(), ListenerOptions::default()),
		Some('@') => {
			let mut segments = raw_name[1..].split('.');
			let name = segments.next().unwrap_or_default().to_owned();
			let mut options = ListenerOptions::default();
			for modifier in segments {
				match modifier {
					"capture" => options.capture = true,
					"once" => options.once = true,
					"passive" => options.passive = true,
					_ => trace!("Ignoring unknown listener modifier {:?}.", modifier),
				}
			}
			(PartKind::Event, name, options)
		}
		_ => (PartKind::Attribute, raw_name.to_owned(), ListenerOptions::default()),
	}
}

/// 64-bit FNV-1a over the fragments, used to check that server output and client template match.
pub(crate) fn digest(strings: &TemplateStrings, kind: TemplateKind) -> String {
	const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
	const PRIME: u64 = 0x0100_0000_01b3;
	let mut hash = OFFSET;
	let mut feed = |byte: u8| {
		hash ^= u64::from(byte);
		hash = hash.wrapping_mul(PRIME);
	};
	feed(match kind {
		TemplateKind::Html => b'h',
		TemplateKind::Svg => b's',
	});
	for string in strings.iter() {
		string.bytes().for_each(&mut feed);
		feed(0xff);
	}
	format!("{:016x}", hash)
}

/// Scans `strings` once. Errors are programming errors in the template.
#[instrument(skip(strings), fields(strings = strings.len()))]
pub(crate) fn scan(strings: &TemplateStrings, kind: TemplateKind) -> Result<Markup> {
	let mut scanner = Scanner::new();
	let last = strings.len().saturating_sub(1);
	for (i, string) in strings.iter().enumerate() {
		scanner.scan(string);
		if i < last {
			scanner.expression(i)?;
		}
	}
	scanner.finish_bound_attribute();

	let Scanner {
		html,
		mut bindings,
		binding_strings,
		markers,
		..
	} = scanner;

	for (index, (binding, strings)) in bindings.iter_mut().zip(binding_strings).enumerate() {
		if let Some(strings) = strings {
			let single = strings.len() == 2 && strings.iter().all(String::is_empty);
			if matches!(binding.kind, PartKind::BooleanAttribute | PartKind::Event) && !single {
				error!("Binding {} ({}) must be a single expression without static text.", index, binding.kind);
				return Err(Error::UnsupportedBindingPosition {
					index: binding.value_index,
					reason: "boolean attribute and event bindings must consist of exactly one expression",
				});
			}
			binding.strings = Some(strings.into_iter().map(Rc::from).collect());
		}
	}

	let mut server_ops = Vec::with_capacity(markers.len() * 2 + 1);
	let mut position = 0;
	for Marker { range, binding, first_in_tag } in markers {
		if range.start > position {
			server_ops.push(ServerOp::Static(html[position..range.start].into()));
		}
		if bindings[binding].kind == PartKind::Child {
			server_ops.push(ServerOp::Child(binding));
		} else {
			if first_in_tag {
				server_ops.push(ServerOp::ElementMarker);
			}
			server_ops.push(ServerOp::Attribute(binding));
		}
		position = range.end;
	}
	if position < html.len() {
		server_ops.push(ServerOp::Static(html[position..].into()));
	}

	trace!("Scanned {} binding(s).", bindings.len());
	Ok(Markup {
		kind,
		html,
		bindings,
		server_ops,
		value_count: last,
		digest: digest(strings, kind),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn scan_static(strings: &'static [&'static str]) -> Result<Markup> {
		scan(&TemplateStrings::from_static(strings), TemplateKind::Html)
	}

	#[test]
	fn child_markers() {
		let markup = scan_static(&["<p>", " and ", "</p>"]).unwrap();
		assert_eq!(markup.html, "<p><!--tp$0--><!--/tp$0--> and <!--tp$1--><!--/tp$1--></p>");
		assert_eq!(markup.bindings.len(), 2);
		assert_eq!(markup.value_count, 2);
	}

	#[test]
	fn multi_expression_attribute() {
		let markup = scan_static(&["<div class=\"", " ", "\" id=x>", "</div>"]).unwrap();
		assert_eq!(markup.html, "<div tp$0 id=x><!--tp$1--><!--/tp$1--></div>");
		let binding = &markup.bindings[0];
		assert_eq!(binding.kind, PartKind::Attribute);
		assert_eq!(binding.name.as_deref(), Some("class"));
		let strings: Vec<&str> = binding.strings.as_ref().unwrap().iter().map(|s| &**s).collect();
		assert_eq!(strings, ["", " ", ""]);
		assert_eq!(binding.value_count(), 2);
		assert_eq!(markup.bindings[1].value_index, 2);
	}

	#[test]
	fn prefixed_bindings() {
		let markup = scan_static(&["<input .valueAsNumber=", " ?disabled=", " @input.capture=", " ", ">"]).unwrap();
		let kinds: Vec<PartKind> = markup.bindings.iter().map(|b| b.kind).collect();
		assert_eq!(kinds, [PartKind::Property, PartKind::BooleanAttribute, PartKind::Event, PartKind::Element]);
		assert_eq!(markup.bindings[0].name.as_deref(), Some("valueAsNumber"));
		assert!(markup.bindings[2].options.capture);
	}

	#[test]
	fn server_ops_mark_elements_once() {
		let markup = scan_static(&["<a href=\"", "\" title=", ">", "</a>"]).unwrap();
		let element_markers = markup.server_ops.iter().filter(|op| matches!(op, ServerOp::ElementMarker)).count();
		assert_eq!(element_markers, 1);
	}

	#[test]
	fn raw_text_is_rejected() {
		assert!(matches!(
			scan_static(&["<script>let x = ", ";</script>"]),
			Err(Error::UnsupportedBindingPosition { index: 0, .. })
		));
		assert!(matches!(scan_static(&["<!-- ", " -->"]), Err(Error::UnsupportedBindingPosition { .. })));
	}

	#[test]
	fn interpolated_boolean_is_rejected() {
		assert!(scan_static(&["<p ?hidden=\"x", "\"></p>"]).is_err());
	}

	#[test]
	fn digest_depends_on_content_and_kind() {
		let a = TemplateStrings::from_static(&["<p>", "</p>"]);
		let b = TemplateStrings::from_static(&["<p>", "</p>"]);
		assert_eq!(digest(&a, TemplateKind::Html), digest(&b, TemplateKind::Html));
		assert_ne!(digest(&a, TemplateKind::Html), digest(&a, TemplateKind::Svg));
	}
}
