#![doc(html_root_url = "https://docs.rs/template-parts/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Template-literal style DOM rendering.
//!
//! A template's static strings are parsed once per call site into a cold fragment. Rendering clones it and
//! binds each expression to a part, and re-rendering commits only the parts whose values changed.
//! The same templates render to HTML on a server ([`ServerRenderer`]) and can be hydrated in place ([`Renderer::hydrate`]).

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

mod cache;
mod diff;
mod directive;
pub mod directives;
pub mod dom;
mod error;
mod hydrate;
mod instance;
mod markup;
mod part;
mod render;
pub mod server;
mod template;
mod value;

#[cfg(feature = "web")]
pub mod load;

pub use cache::{DrainOrphaned, TemplateCache};
pub use directive::{directive, Directive, DirectiveHandle, DirectivePart, DirectiveResult, PartInfo};
pub use directives::Key;
pub use dom::{Document, Node};
pub use error::{Error, Result};
pub use markup::{BOUND_ATTRIBUTE, PART_CLOSE, PART_OPEN};
pub use part::PartKind;
pub use render::{RenderOptions, Renderer};
pub use server::{collect_result, collect_result_sync, RenderResult, ServerRenderer};
pub use template::Template;
pub use value::{Listener, PendingValue, TemplateKind, TemplateResult, TemplateStrings, Value};
