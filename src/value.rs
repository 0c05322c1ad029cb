//! Everything a binding can receive.

use crate::{
	directive::DirectiveResult,
	dom::{Event, Node},
};
use core::{
	any::Any,
	fmt::{self, Debug, Formatter},
	future::Future,
};
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use std::{borrow::Cow, rc::Rc};

/// The static text fragments of one template occurrence.
///
/// Identity, not content, is what the template cache keys on: [`html!`](`crate::html!`) gives each macro invocation site its own
/// instance (per thread), so evaluating the same site repeatedly yields the same `TemplateStrings`,
/// while two textually equal sites don't share one.
#[derive(Clone)]
pub struct TemplateStrings(Rc<[Cow<'static, str>]>);

impl TemplateStrings {
	/// Creates a new, distinct fragment sequence.
	#[must_use]
	pub fn new<S: Into<Cow<'static, str>>>(strings: impl IntoIterator<Item = S>) -> Self {
		Self(strings.into_iter().map(Into::into).collect())
	}

	#[must_use]
	pub fn from_static(strings: &'static [&'static str]) -> Self {
		Self::new(strings.iter().copied())
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
		self.0.iter().map(|string| &**string)
	}

	#[must_use]
	pub fn get(&self, index: usize) -> Option<&str> {
		self.0.get(index).map(|string| &**string)
	}

	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	pub(crate) fn identity(&self) -> usize {
		Rc::as_ptr(&self.0).cast::<()>() as usize
	}

	pub(crate) fn downgrade(&self) -> std::rc::Weak<[Cow<'static, str>]> {
		Rc::downgrade(&self.0)
	}
}

impl Debug for TemplateStrings {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("TemplateStrings").field(&self.identity()).field(&self.0.len()).finish()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
	Html,
	/// Parsed inside an `<svg>` element, for fragments that belong below one.
	Svg,
}

/// One evaluation of a template: its static fragments plus the current expression values.
#[derive(Clone)]
pub struct TemplateResult {
	pub(crate) strings: TemplateStrings,
	pub(crate) values: Rc<[Value]>,
	pub(crate) kind: TemplateKind,
}

impl Debug for TemplateResult {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("TemplateResult")
			.field("strings", &self.strings)
			.field("values", &self.values)
			.field("kind", &self.kind)
			.finish()
	}
}

impl TemplateResult {
	#[must_use]
	pub fn html(strings: TemplateStrings, values: Vec<Value>) -> Self {
		Self {
			strings,
			values: values.into(),
			kind: TemplateKind::Html,
		}
	}

	#[must_use]
	pub fn svg(strings: TemplateStrings, values: Vec<Value>) -> Self {
		Self {
			strings,
			values: values.into(),
			kind: TemplateKind::Svg,
		}
	}

	#[must_use]
	pub fn strings(&self) -> &TemplateStrings {
		&self.strings
	}

	#[must_use]
	pub fn values(&self) -> &[Value] {
		&self.values
	}

	#[must_use]
	pub fn kind(&self) -> TemplateKind {
		self.kind
	}
}

/// An event handler for `@event` bindings. Compared by identity.
#[derive(Clone)]
pub struct Listener(pub(crate) Rc<dyn Fn(&Event)>);

impl Listener {
	pub fn new(listener: impl Fn(&Event) + 'static) -> Self {
		Self(Rc::new(listener))
	}

	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::as_ptr(&self.0).cast::<()>() == Rc::as_ptr(&other.0).cast::<()>()
	}

	pub fn call(&self, event: &Event) {
		(self.0)(event);
	}
}

impl Debug for Listener {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "Listener({:p})", Rc::as_ptr(&self.0).cast::<()>())
	}
}

/// A value that becomes available later, such as the result of a data fetch.
///
/// The server renderer awaits these in place; in the browser, bind them through [`until`](`crate::directives::until`).
#[derive(Clone)]
pub struct PendingValue {
	id: Rc<()>,
	future: Shared<LocalBoxFuture<'static, Value>>,
}

impl PendingValue {
	pub fn new(future: impl Future<Output = Value> + 'static) -> Self {
		Self {
			id: Rc::new(()),
			future: future.boxed_local().shared(),
		}
	}

	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.id, &other.id)
	}

	/// The resolved value, if the future already completed.
	#[must_use]
	pub fn peek(&self) -> Option<Value> {
		self.future.peek().cloned()
	}

	/// Polls the future once without a waker, which resolves futures that are already ready.
	#[must_use]
	pub fn now_or_never(&self) -> Option<Value> {
		self.future.clone().now_or_never()
	}

	pub fn resolve(&self) -> impl Future<Output = Value> + 'static {
		self.future.clone()
	}
}

impl Debug for PendingValue {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "PendingValue({:p})", Rc::as_ptr(&self.id))
	}
}

/// A binding value.
///
/// [`NoChange`](`Value::NoChange`) and [`Nothing`](`Value::Nothing`) are sentinels that no ordinary value compares equal to.
#[derive(Clone)]
pub enum Value {
	/// Skip this commit and keep whatever is committed.
	NoChange,
	/// Commit an explicit absence: empties a child position, removes an attribute, detaches a listener.
	Nothing,
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(Rc<str>),
	Template(TemplateResult),
	List(Rc<[Value]>),
	Directive(DirectiveResult),
	Listener(Listener),
	Node(Node),
	Future(PendingValue),
	/// An arbitrary object, only meaningful to property bindings and directives.
	Opaque(Rc<dyn Any>),
}

impl Debug for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Value::NoChange => f.write_str("NoChange"),
			Value::Nothing => f.write_str("Nothing"),
			Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
			Value::Int(i) => f.debug_tuple("Int").field(i).finish(),
			Value::Float(x) => f.debug_tuple("Float").field(x).finish(),
			Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
			Value::Template(t) => t.fmt(f),
			Value::List(items) => f.debug_tuple("List").field(items).finish(),
			Value::Directive(d) => d.fmt(f),
			Value::Listener(l) => l.fmt(f),
			Value::Node(n) => f.debug_tuple("Node").field(n).finish(),
			Value::Future(p) => p.fmt(f),
			Value::Opaque(o) => write!(f, "Opaque({:p})", Rc::as_ptr(o).cast::<()>()),
		}
	}
}

impl Value {
	#[must_use]
	pub fn str(s: &str) -> Self {
		Value::Str(s.into())
	}

	pub fn opaque<T: Any>(value: T) -> Self {
		Value::Opaque(Rc::new(value))
	}

	/// A short name of the variant, for diagnostics.
	#[must_use]
	pub fn type_name(&self) -> &'static str {
		match self {
			Value::NoChange => "noChange",
			Value::Nothing => "nothing",
			Value::Bool(_) => "boolean",
			Value::Int(_) => "integer",
			Value::Float(_) => "float",
			Value::Str(_) => "string",
			Value::Template(_) => "template",
			Value::List(_) => "list",
			Value::Directive(_) => "directive",
			Value::Listener(_) => "listener",
			Value::Node(_) => "node",
			Value::Future(_) => "future",
			Value::Opaque(_) => "opaque",
		}
	}

	#[must_use]
	pub fn is_primitive(&self) -> bool {
		matches!(self, Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_))
	}

	/// Whether two values would commit identically to the same part.
	///
	/// Primitives compare by value, handles by identity. Templates and lists are never the same:
	/// the part that receives them diffs their content instead.
	#[must_use]
	pub fn same(&self, other: &Value) -> bool {
		match (self, other) {
			(Value::NoChange, Value::NoChange) | (Value::Nothing, Value::Nothing) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			(Value::Int(a), Value::Int(b)) => a == b,
			#[allow(clippy::float_cmp)]
			(Value::Float(a), Value::Float(b)) => a == b,
			(Value::Str(a), Value::Str(b)) => a == b,
			(Value::Directive(a), Value::Directive(b)) => a.ptr_eq(b),
			(Value::Listener(a), Value::Listener(b)) => a.ptr_eq(b),
			(Value::Node(a), Value::Node(b)) => a.ptr_eq(b),
			(Value::Future(a), Value::Future(b)) => a.ptr_eq(b),
			(Value::Opaque(a), Value::Opaque(b)) => Rc::as_ptr(a).cast::<()>() == Rc::as_ptr(b).cast::<()>(),
			_ => false,
		}
	}

	#[must_use]
	pub fn is_truthy(&self) -> bool {
		match self {
			Value::NoChange | Value::Nothing => false,
			Value::Bool(b) => *b,
			Value::Int(i) => *i != 0,
			Value::Float(x) => *x != 0.0 && !x.is_nan(),
			Value::Str(s) => !s.is_empty(),
			_ => true,
		}
	}

	/// The text a primitive commits as.
	#[must_use]
	pub fn to_text(&self) -> Option<Cow<'_, str>> {
		match self {
			Value::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
			Value::Int(i) => Some(Cow::Owned(i.to_string())),
			Value::Float(x) => Some(Cow::Owned(x.to_string())),
			Value::Str(s) => Some(Cow::Borrowed(s)),
			_ => None,
		}
	}

	/// Whether this value empties a child position.
	#[must_use]
	pub(crate) fn is_empty_child(&self) -> bool {
		match self {
			Value::Nothing => true,
			Value::Str(s) => s.is_empty(),
			_ => false,
		}
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Value::Str(s.into())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Value::Str(s.into())
	}
}

impl From<Rc<str>> for Value {
	fn from(s: Rc<str>) -> Self {
		Value::Str(s)
	}
}

impl From<&String> for Value {
	fn from(s: &String) -> Self {
		Value::Str(s.as_str().into())
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Value::Bool(b)
	}
}

macro_rules! from_integer {
	($($t:ty),*) => {$(
		impl From<$t> for Value {
			fn from(i: $t) -> Self {
				Value::Int(i.into())
			}
		}
	)*};
}
from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<usize> for Value {
	fn from(i: usize) -> Self {
		i64::try_from(i).map_or(Value::Float(i as f64), Value::Int)
	}
}

impl From<f64> for Value {
	fn from(x: f64) -> Self {
		Value::Float(x)
	}
}

impl From<f32> for Value {
	fn from(x: f32) -> Self {
		Value::Float(x.into())
	}
}

impl From<TemplateResult> for Value {
	fn from(result: TemplateResult) -> Self {
		Value::Template(result)
	}
}

impl From<DirectiveResult> for Value {
	fn from(result: DirectiveResult) -> Self {
		Value::Directive(result)
	}
}

impl From<Listener> for Value {
	fn from(listener: Listener) -> Self {
		Value::Listener(listener)
	}
}

impl From<Node> for Value {
	fn from(node: Node) -> Self {
		Value::Node(node)
	}
}

impl From<PendingValue> for Value {
	fn from(pending: PendingValue) -> Self {
		Value::Future(pending)
	}
}

impl<T: Into<Value>> From<Vec<T>> for Value {
	fn from(items: Vec<T>) -> Self {
		Value::List(items.into_iter().map(Into::into).collect())
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(value: Option<T>) -> Self {
		value.map_or(Value::Nothing, Into::into)
	}
}

/// Creates a [`TemplateResult`] for HTML markup.
///
/// The static fragments come first, in brackets, followed by the interleaved values:
///
/// ```
/// use template_parts::{html, Value};
///
/// fn greeting(name: &str) -> Value {
/// 	html!(["<p class=\"greeting\">Hello ", "!</p>"]; name).into()
/// }
/// # let _ = greeting("World");
/// ```
///
/// Each invocation site owns its fragment sequence, so re-evaluating it reuses the parsed template.
#[macro_export]
macro_rules! html {
	([$($string:literal),+ $(,)?] $(; $($value:expr),* $(,)?)?) => {{
		::std::thread_local! {
			static STRINGS: $crate::TemplateStrings = $crate::TemplateStrings::from_static(&[$($string),+]);
		}
		$crate::TemplateResult::html(
			STRINGS.with(::std::clone::Clone::clone),
			::std::vec![$($($crate::Value::from($value)),*)?],
		)
	}};
}

/// Like [`html!`], but for fragments that belong inside an `<svg>` element.
#[macro_export]
macro_rules! svg {
	([$($string:literal),+ $(,)?] $(; $($value:expr),* $(,)?)?) => {{
		::std::thread_local! {
			static STRINGS: $crate::TemplateStrings = $crate::TemplateStrings::from_static(&[$($string),+]);
		}
		$crate::TemplateResult::svg(
			STRINGS.with(::std::clone::Clone::clone),
			::std::vec![$($($crate::Value::from($value)),*)?],
		)
	}};
}
