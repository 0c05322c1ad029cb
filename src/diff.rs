//! Child-list reconciliation for [`ChildPart`]s that hold a list.
//!
//! Each list item is its own [`ChildPart`] bracketed by two empty comments, so moving or removing an item
//! is a matter of moving or removing one contiguous node range.

use crate::{
	dom::Node,
	error::{Error, Result},
	part::{ChildPart, Committed},
	render::Scope,
	value::Value,
};
use core::fmt::{self, Display, Formatter};
use hashbrown::{HashMap, HashSet};
use std::rc::Rc;
use tracing::{error, instrument, trace, trace_span};

/// Identifies a list item across renders in keyed reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
	Int(i64),
	Str(Rc<str>),
}

impl Display for Key {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Key::Int(i) => write!(f, "{}", i),
			Key::Str(s) => write!(f, "{:?}", s),
		}
	}
}

impl From<i64> for Key {
	fn from(i: i64) -> Self {
		Key::Int(i)
	}
}

impl From<i32> for Key {
	fn from(i: i32) -> Self {
		Key::Int(i.into())
	}
}

impl From<u32> for Key {
	fn from(i: u32) -> Self {
		Key::Int(i.into())
	}
}

impl From<usize> for Key {
	fn from(i: usize) -> Self {
		i64::try_from(i).map_or_else(|_| Key::Str(i.to_string().into()), Key::Int)
	}
}

impl From<&str> for Key {
	fn from(s: &str) -> Self {
		Key::Str(s.into())
	}
}

impl From<String> for Key {
	fn from(s: String) -> Self {
		Key::Str(s.into())
	}
}

impl From<Rc<str>> for Key {
	fn from(s: Rc<str>) -> Self {
		Key::Str(s)
	}
}

/// Takes `part`'s item list out for reconciliation, clearing any other content. The caller must put it back.
fn take_items(part: &mut ChildPart) -> Vec<ChildPart> {
	match core::mem::replace(&mut part.committed, Committed::Nothing) {
		Committed::List(items) => items,
		other => {
			part.committed = other;
			part.clear();
			Vec::new()
		}
	}
}

/// Index `i` of the old list is updated with index `i` of the new one. Surplus items are removed, missing ones appended.
#[instrument(skip(part, values, scope), fields(values = values.len()))]
pub(crate) fn commit_positional(part: &mut ChildPart, values: &[Value], scope: &Scope<'_>) -> Result<()> {
	let mut items = take_items(part);
	let result = reconcile_positional(&mut items, &part.end, values, scope);
	part.committed = Committed::List(items);
	result
}

fn reconcile_positional(items: &mut Vec<ChildPart>, end: &Node, values: &[Value], scope: &Scope<'_>) -> Result<()> {
	for (i, value) in values.iter().enumerate() {
		if let Some(item) = items.get_mut(i) {
			item.commit(value.clone(), scope)?;
		} else {
			let mut item = ChildPart::insert_before(end)?;
			let committed = item.commit(value.clone(), scope);
			items.push(item);
			committed?;
		}
	}

	if items.len() > values.len() {
		trace!("Removing {} surplus item(s).", items.len() - values.len());
		for item in items.drain(values.len()..) {
			item.remove();
		}
	}
	Ok(())
}

/// Fails with [`Error::DuplicateKey`] before anything is touched.
pub(crate) fn check_unique<'a>(keys: impl IntoIterator<Item = &'a Key>) -> Result<()> {
	let mut seen = HashSet::new();
	for key in keys {
		if !seen.insert(key) {
			error!("Duplicate key {} in keyed list.", key);
			return Err(Error::DuplicateKey(key.to_string()));
		}
	}
	Ok(())
}

/// Reorders, updates, creates and removes items so that item `i` is the one keyed `entries[i].0`.
///
/// `old_keys` must describe the items currently committed to `part`, in order. If they don't,
/// the list is rebuilt positionally.
/// Items that keep their key keep their nodes; a range is only moved if it isn't already right before its successor.
#[instrument(skip(part, old_keys, entries, scope), fields(old = old_keys.len(), new = entries.len()))]
pub(crate) fn commit_keyed(part: &mut ChildPart, old_keys: &[Key], entries: Vec<(Key, Value)>, scope: &Scope<'_>) -> Result<()> {
	check_unique(entries.iter().map(|(key, _)| key))?;
	if part.list_len() != Some(old_keys.len()) {
		trace!("Committed content doesn't match the recorded keys; reconciling positionally.");
		let values: Vec<Value> = entries.into_iter().map(|(_, value)| value).collect();
		return commit_positional(part, &values, scope);
	}

	let mut items = take_items(part);
	let result = reconcile_keyed(&mut items, &part.end, old_keys, entries, scope);
	part.committed = Committed::List(items);
	if result.is_err() {
		// Leaves the part empty but consistent.
		part.clear();
	}
	result
}

fn reconcile_keyed(items: &mut Vec<ChildPart>, end: &Node, old_keys: &[Key], entries: Vec<(Key, Value)>, scope: &Scope<'_>) -> Result<()> {
	let old_items = core::mem::take(items);
	let mut old_items = old_keys.iter().cloned().zip(old_items);
	let mut by_key = HashMap::new();
	let result = place_keyed(items, end, &mut old_items, &mut by_key, entries, scope);
	if result.is_err() {
		// Items that weren't reached yet still own directives.
		for (_, item) in old_items.chain(by_key.drain()) {
			item.remove();
		}
	}
	result
}

fn place_keyed(
	items: &mut Vec<ChildPart>,
	end: &Node,
	old_items: &mut impl Iterator<Item = (Key, ChildPart)>,
	by_key: &mut HashMap<Key, ChildPart>,
	entries: Vec<(Key, Value)>,
	scope: &Scope<'_>,
) -> Result<()> {
	// Unchanged prefix: update in place.
	let mut entries = entries.into_iter().peekable();
	let mut pending_old = None;
	for (old_key, mut item) in old_items.by_ref() {
		match entries.peek() {
			Some((key, _)) if *key == old_key => {
				let (_, value) = entries.next().ok_or(Error::Dom("peeked entry vanished"))?;
				let committed = item.commit(value, scope);
				items.push(item);
				committed?;
			}
			_ => {
				pending_old = Some((old_key, item));
				break;
			}
		}
	}
	trace!("{} item(s) in common prefix.", items.len());

	for (key, item) in pending_old.into_iter().chain(old_items) {
		by_key.insert(key, item);
	}

	let document = end.document();
	let staging = document.create_document_fragment();
	let prefix_len = items.len();
	for (key, value) in entries {
		let span = trace_span!("Keyed item", %key);
		let _enter = span.enter();
		let mut item = match by_key.remove(&key) {
			Some(item) => item,
			None => {
				trace!("Creating.");
				ChildPart::append_to(&staging)?
			}
		};
		let committed = item.commit(value, scope);
		items.push(item);
		committed?;
	}

	if !by_key.is_empty() {
		trace!("Removing {} stale item(s).", by_key.len());
	}
	for (_, item) in by_key.drain() {
		item.remove();
	}

	let mut reference = end.clone();
	let mut moved = 0_usize;
	for item in items[prefix_len..].iter().rev() {
		if item.end.next_sibling().as_ref() != Some(&reference) {
			item.move_before(&reference)?;
			moved += 1;
		}
		reference = item.start.clone();
	}
	trace!("Moved {} item range(s).", moved);
	Ok(())
}
