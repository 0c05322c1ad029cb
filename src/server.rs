//! Server rendering: template results to a lazily collected sequence of HTML chunks.
//!
//! No DOM is built. Static markup is copied from the scanned template, bound values are serialized in place,
//! and every child binding's output is bracketed with `<!--tp-part-->`/`<!--/tp-part-->` so that
//! [`Renderer::hydrate`](`crate::Renderer::hydrate`) can find it again.
//! Unresolved futures become [`Thunk`]s, which the collectors run in document order.

use crate::{
	cache::TemplateCache,
	directive::PartInfo,
	dom::{escape_attribute_into, escape_text_into},
	error::{Error, Result},
	markup::{self, Binding, Markup, ServerOp, BOUND_ATTRIBUTE, PART_CLOSE, PART_OPEN},
	part::PartKind,
	value::{PendingValue, TemplateResult, Value},
};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use futures::{
	future::{FutureExt, LocalBoxFuture},
	stream::{self, Stream},
};
use std::rc::Rc;
use tracing::{error, instrument, trace};

/// One piece of a [`RenderResult`].
pub enum Chunk {
	Text(String),
	Thunk(Thunk),
}

impl Debug for Chunk {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Chunk::Text(text) => {
				if cfg!(feature = "dangerous-logging") {
					f.debug_tuple("Text").field(text).finish()
				} else {
					write!(f, "Text({} bytes)", text.len())
				}
			}
			Chunk::Thunk(_) => f.write_str("Thunk"),
		}
	}
}

/// What running a [`Thunk`] produced.
pub enum ThunkOutput {
	Result(RenderResult),
	Future(LocalBoxFuture<'static, Result<RenderResult>>),
}

/// Deferred output. Runs at most once.
pub struct Thunk(Box<dyn FnOnce() -> Result<ThunkOutput>>);

impl Thunk {
	pub fn new(f: impl FnOnce() -> Result<ThunkOutput> + 'static) -> Self {
		Self(Box::new(f))
	}

	pub fn run(self) -> Result<ThunkOutput> {
		(self.0)()
	}

	async fn resolve(self) -> Result<RenderResult> {
		match self.run()? {
			ThunkOutput::Result(result) => Ok(result),
			ThunkOutput::Future(future) => future.await,
		}
	}
}

/// The ordered output of one server render. Nested results are produced by thunks.
#[derive(Debug, Default)]
pub struct RenderResult(Vec<Chunk>);

impl RenderResult {
	#[must_use]
	pub fn chunks(&self) -> &[Chunk] {
		&self.0
	}

	#[must_use]
	pub fn into_chunks(self) -> Vec<Chunk> {
		self.0
	}

	/// Yields each text chunk as soon as everything before it is known.
	///
	/// The stream ends after the first error.
	pub fn into_stream(self) -> impl Stream<Item = Result<String>> {
		stream::unfold(Some(vec![self.0.into_iter()]), |stack| async move {
			let mut stack = stack?;
			loop {
				let top = stack.last_mut()?;
				match top.next() {
					None => {
						stack.pop();
					}
					Some(Chunk::Text(text)) => return Some((Ok(text), Some(stack))),
					Some(Chunk::Thunk(thunk)) => match thunk.resolve().await {
						Ok(nested) => stack.push(nested.0.into_iter()),
						Err(error) => return Some((Err(error), None)),
					},
				}
			}
		})
	}
}

/// Concatenates `result`, awaiting thunks in document order.
pub async fn collect_result(result: RenderResult) -> Result<String> {
	let mut html = String::new();
	let mut stack = vec![result.0.into_iter()];
	while let Some(top) = stack.last_mut() {
		match top.next() {
			None => {
				stack.pop();
			}
			Some(Chunk::Text(text)) => html.push_str(&text),
			Some(Chunk::Thunk(thunk)) => stack.push(thunk.resolve().await?.0.into_iter()),
		}
	}
	Ok(html)
}

/// Concatenates `result` without awaiting anything.
///
/// # Errors
///
/// [`Error::AsyncThunk`] as soon as a thunk returns a future.
pub fn collect_result_sync(result: RenderResult) -> Result<String> {
	let mut html = String::new();
	let mut stack = vec![result.0.into_iter()];
	while let Some(top) = stack.last_mut() {
		match top.next() {
			None => {
				stack.pop();
			}
			Some(Chunk::Text(text)) => html.push_str(&text),
			Some(Chunk::Thunk(thunk)) => match thunk.run()? {
				ThunkOutput::Result(nested) => stack.push(nested.0.into_iter()),
				ThunkOutput::Future(_) => {
					error!("Thunk returned a future during synchronous collection.");
					return Err(Error::AsyncThunk);
				}
			},
		}
	}
	Ok(html)
}

#[derive(Default)]
struct Builder {
	chunks: Vec<Chunk>,
	text: String,
}

impl Builder {
	fn push_str(&mut self, text: &str) {
		self.text.push_str(text);
	}

	fn push_comment(&mut self, data: &str) {
		self.text.push_str("<!--");
		self.text.push_str(data);
		self.text.push_str("-->");
	}

	fn push_thunk(&mut self, thunk: Thunk) {
		if !self.text.is_empty() {
			self.chunks.push(Chunk::Text(core::mem::take(&mut self.text)));
		}
		self.chunks.push(Chunk::Thunk(thunk));
	}

	fn finish(mut self) -> RenderResult {
		if !self.text.is_empty() {
			self.chunks.push(Chunk::Text(self.text));
		}
		RenderResult(self.chunks)
	}
}

/// Runs directives through their [`Directive::render`](`crate::Directive::render`) until a plain value remains.
fn resolve_detached(mut value: Value, info: &PartInfo) -> Result<Value> {
	while let Value::Directive(directive) = &value {
		trace!("Rendering directive {} detached.", directive.name());
		let rendered = directive.render_detached(info)?;
		value = rendered;
	}
	Ok(value)
}

fn invalid(value: &Value, kind: PartKind) -> Error {
	error!("Can't render a {} value into a {} binding.", value.type_name(), kind);
	Error::InvalidValue {
		value: value.type_name(),
		kind,
	}
}

/// Renders values to HTML. Cloning shares the scanned-template cache.
#[derive(Clone, Default)]
pub struct ServerRenderer {
	cache: Rc<RefCell<TemplateCache<Markup>>>,
}

impl Debug for ServerRenderer {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServerRenderer").field("templates", &self.cache.borrow().len()).finish()
	}
}

impl ServerRenderer {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Renders `value` as a root child range, the counterpart of [`Renderer::render`](`crate::Renderer::render`).
	#[instrument(skip(self, value))]
	pub fn render(&self, value: impl Into<Value>) -> Result<RenderResult> {
		let mut out = Builder::default();
		self.render_child(value.into(), &mut out)?;
		Ok(out.finish())
	}

	/// Drops scanned templates whose static fragments no longer exist. Returns how many were dropped.
	pub fn purge_templates(&self) -> usize {
		self.cache.borrow_mut().drain_orphaned().count()
	}

	#[must_use]
	pub fn template_count(&self) -> usize {
		self.cache.borrow().len()
	}

	fn markup(&self, result: &TemplateResult) -> Result<Rc<Markup>> {
		self.cache
			.borrow_mut()
			.get_or_try_insert_with(result.strings(), result.kind(), || markup::scan(result.strings(), result.kind()))
	}

	fn render_child(&self, value: Value, out: &mut Builder) -> Result<()> {
		let value = resolve_detached(value, &PartInfo::child())?;
		if let Value::Future(pending) = &value {
			if let Some(resolved) = pending.now_or_never() {
				return self.render_child(resolved, out);
			}
			trace!("Deferring unresolved future.");
			out.push_thunk(self.future_thunk(pending.clone()));
			return Ok(());
		}

		let template = match &value {
			Value::Template(result) => Some(self.markup(result)?),
			_ => None,
		};
		match &template {
			Some(markup) => out.push_comment(&format!("{} {}", PART_OPEN, markup.digest)),
			None => out.push_comment(PART_OPEN),
		}
		match value {
			Value::NoChange | Value::Nothing => (),
			Value::Template(result) => {
				if let Some(markup) = template {
					self.render_template(&markup, result.values(), out)?;
				}
			}
			Value::List(items) => {
				for item in items.iter() {
					self.render_child(item.clone(), out)?;
				}
			}
			Value::Node(node) => out.push_str(&node.outer_html()),
			value if value.is_primitive() => {
				if let Some(text) = value.to_text() {
					escape_text_into(&text, &mut out.text);
				}
			}
			value => return Err(invalid(&value, PartKind::Child)),
		}
		out.push_comment(PART_CLOSE);
		Ok(())
	}

	/// Renders the whole child range once `pending` resolves, or right away if it already has by then.
	fn future_thunk(&self, pending: PendingValue) -> Thunk {
		let renderer = self.clone();
		Thunk::new(move || match pending.now_or_never() {
			Some(value) => renderer.render(value).map(ThunkOutput::Result),
			None => Ok(ThunkOutput::Future(async move { renderer.render(pending.resolve().await) }.boxed_local())),
		})
	}

	fn render_template(&self, markup: &Markup, values: &[Value], out: &mut Builder) -> Result<()> {
		if values.len() != markup.value_count {
			error!("Template expects {} value(s), got {}.", markup.value_count, values.len());
			return Err(Error::ValueCountMismatch {
				expected: markup.value_count,
				received: values.len(),
			});
		}
		for op in &markup.server_ops {
			match op {
				ServerOp::Static(html) => out.push_str(html),
				ServerOp::Child(binding) => {
					let value_index = markup.bindings[*binding].value_index;
					self.render_child(values[value_index].clone(), out)?;
				}
				ServerOp::ElementMarker => out.push_str(BOUND_ATTRIBUTE),
				ServerOp::Attribute(binding) => render_attribute(&markup.bindings[*binding], values, out)?,
			}
		}
		Ok(())
	}
}

fn render_attribute(binding: &Binding, values: &[Value], out: &mut Builder) -> Result<()> {
	let info = PartInfo::new(binding.kind, binding.name.clone(), binding.strings.clone(), None);
	let name = binding.name.as_deref().unwrap_or_default();
	let slots = values
		.get(binding.value_index..binding.value_index + binding.value_count())
		.ok_or(Error::Dom("binding values out of range"))?;

	match binding.kind {
		PartKind::Attribute => {
			let mut text = String::new();
			let strings = binding.strings.as_deref().unwrap_or_default();
			if let Some(first) = strings.first() {
				text.push_str(first);
			}
			for (i, slot) in slots.iter().enumerate() {
				match resolve_detached(slot.clone(), &info)? {
					Value::Nothing => {
						trace!("Omitting attribute {:?}.", name);
						return Ok(());
					}
					Value::NoChange => (),
					value => match value.to_text() {
						Some(value_text) => text.push_str(&value_text),
						None => return Err(invalid(&value, PartKind::Attribute)),
					},
				}
				if let Some(string) = strings.get(i + 1) {
					text.push_str(string);
				}
			}
			out.push_str(" ");
			out.push_str(name);
			out.push_str("=\"");
			escape_attribute_into(&text, &mut out.text);
			out.push_str("\"");
		}
		PartKind::BooleanAttribute => {
			if let Some(slot) = slots.first() {
				if resolve_detached(slot.clone(), &info)?.is_truthy() {
					out.push_str(" ");
					out.push_str(name);
				}
			}
		}
		PartKind::Property | PartKind::Event | PartKind::Element => {
			// Nothing to serialize, but directives still get to reject the binding.
			for slot in slots {
				resolve_detached(slot.clone(), &info)?;
			}
		}
		PartKind::Child => return Err(Error::Dom("child binding in attribute position")),
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{html, value::TemplateKind};
	use futures::{channel::oneshot, executor::block_on, StreamExt};

	#[test]
	fn text_is_escaped_inside_markers() {
		let result = ServerRenderer::new().render("<b> & co").unwrap();
		assert_eq!(collect_result_sync(result).unwrap(), "<!--tp-part-->&lt;b&gt; &amp; co<!--/tp-part-->");
	}

	#[test]
	fn templates_carry_their_digest() {
		let renderer = ServerRenderer::new();
		let template = html!(["<p class=\"a ", "\" ?hidden=", " @click=", ">", "</p>"]; "b", false, Value::Nothing, 1);
		let digest = markup::digest(template.strings(), TemplateKind::Html);
		let html = collect_result_sync(renderer.render(template).unwrap()).unwrap();
		assert_eq!(
			html,
			format!("<!--tp-part {}--><p tp-bound class=\"a b\"  ><!--tp-part-->1<!--/tp-part--></p><!--/tp-part-->", digest)
		);
		assert_eq!(renderer.template_count(), 1);
	}

	#[test]
	fn nothing_omits_the_attribute() {
		let template = html!(["<a href=", ">x</a>"]; Value::Nothing);
		let html = collect_result_sync(ServerRenderer::new().render(template).unwrap()).unwrap();
		assert!(html.contains("<a tp-bound>x</a>"));
	}

	#[test]
	fn value_count_is_checked() {
		let template = TemplateResult::html(crate::value::TemplateStrings::from_static(&["<p>", "</p>"]), Vec::new());
		assert!(matches!(
			ServerRenderer::new().render(template),
			Err(Error::ValueCountMismatch { expected: 1, received: 0 })
		));
	}

	#[test]
	fn pending_futures_defer() {
		let (sender, receiver) = oneshot::channel::<&'static str>();
		let pending = PendingValue::new(async move { receiver.await.map_or(Value::Nothing, Value::from) });
		let renderer = ServerRenderer::new();
		let render = || renderer.render(Value::List(Rc::from(vec![Value::from("a"), Value::Future(pending.clone())]))).unwrap();

		assert!(matches!(collect_result_sync(render()), Err(Error::AsyncThunk)));

		let result = render();
		sender.send("b").unwrap();
		let html = block_on(collect_result(result)).unwrap();
		assert_eq!(
			html,
			"<!--tp-part--><!--tp-part-->a<!--/tp-part--><!--tp-part-->b<!--/tp-part--><!--/tp-part-->"
		);
	}

	#[test]
	fn stream_preserves_order() {
		let (sender, receiver) = oneshot::channel::<i32>();
		let pending = PendingValue::new(async move { receiver.await.map_or(Value::Nothing, Value::from) });
		let template = html!(["<i>", "</i><b>", "</b>"]; Value::Future(pending), "after");
		let result = ServerRenderer::new().render(template).unwrap();
		assert!(result.chunks().len() >= 3);
		sender.send(7).unwrap();

		let chunks: Vec<String> = block_on(result.into_stream().map(|chunk| chunk.unwrap()).collect());
		let html = chunks.concat();
		assert!(html.contains("<i><!--tp-part-->7<!--/tp-part--></i><b><!--tp-part-->after<!--/tp-part--></b>"));
		assert!(chunks.len() >= 3);
	}
}
