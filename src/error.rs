use crate::part::PartKind;
use thiserror::Error;

/// Caller (programming) errors. None of these are retried: they leave already-committed parts committed
/// and propagate out of [`Renderer::render`](`crate::Renderer::render`), [`Renderer::hydrate`](`crate::Renderer::hydrate`)
/// or the server renderer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
	#[error("expression {index} is in a position that can't hold a binding: {reason}")]
	UnsupportedBindingPosition { index: usize, reason: &'static str },

	#[error("the HTML parser dropped the marker for expression {index}; move it out of the surrounding element")]
	LostMarker { index: usize },

	#[error("template has {expected} expression slot(s) but {received} value(s) were supplied")]
	ValueCountMismatch { expected: usize, received: usize },

	#[error("directive `{directive}` can't be used in a {kind} binding: {reason}")]
	DirectivePartMismatch {
		directive: &'static str,
		kind: PartKind,
		reason: &'static str,
	},

	#[error("a {value} value can't be committed to a {kind} binding")]
	InvalidValue { value: &'static str, kind: PartKind },

	#[error("duplicate key {0} in keyed list")]
	DuplicateKey(String),

	#[error("hydration mismatch: {0}")]
	HydrationMismatch(String),

	#[error("a thunk resolved to a future during synchronous collection; use `collect_result` instead")]
	AsyncThunk,

	#[error("the part's marker node has no parent")]
	NoParent,

	#[error("DOM operation failed: {0}")]
	Dom(&'static str),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
