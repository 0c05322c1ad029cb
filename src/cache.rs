use crate::{
	error::Result,
	value::{TemplateKind, TemplateStrings},
};
use core::fmt::{self, Debug, Formatter};
use hashbrown::{
	hash_map::{Entry, ExtractIf},
	HashMap,
};
use std::{
	borrow::Cow,
	rc::{Rc, Weak},
};
use tracing::{instrument, trace};

type Key = (usize, TemplateKind);
type Slot<V> = (Weak<[Cow<'static, str>]>, Rc<V>);

/// A [`TemplateStrings`]-identity-keyed memo table.
///
/// Entries hold their fragment sequence only weakly, so once every [`TemplateStrings`] clone is gone
/// the entry becomes orphaned and is dropped by [`TemplateCache::drain_orphaned`].
/// A pointer is only reused after its allocation is freed, so a live entry can't be confused with a newer sequence
/// as long as orphaned entries are rechecked on lookup.
pub struct TemplateCache<V>(HashMap<Key, Slot<V>>);

impl<V> Default for TemplateCache<V> {
	fn default() -> Self {
		Self::new()
	}
}

impl<V> Debug for TemplateCache<V> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("TemplateCache").field("len", &self.0.len()).finish()
	}
}

impl<V> TemplateCache<V> {
	#[must_use]
	pub fn new() -> Self {
		Self(HashMap::new())
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns the memoized value for `strings`, creating it with `create` if there is none.
	///
	/// `create` is not called for sequences that were seen before, which is what keeps each call site from being parsed twice.
	#[instrument(skip(self, create))]
	pub fn get_or_try_insert_with(&mut self, strings: &TemplateStrings, kind: TemplateKind, create: impl FnOnce() -> Result<V>) -> Result<Rc<V>> {
		match self.0.entry((strings.identity(), kind)) {
			Entry::Occupied(mut occupied) => {
				if occupied.get().0.strong_count() > 0 {
					trace!("Cache hit.");
					return Ok(Rc::clone(&occupied.get().1));
				}
				trace!("Replacing orphaned entry at a reused address.");
				let value = Rc::new(create()?);
				occupied.insert((strings.downgrade(), Rc::clone(&value)));
				Ok(value)
			}
			Entry::Vacant(vacant) => {
				trace!("Cache miss.");
				let value = Rc::new(create()?);
				vacant.insert((strings.downgrade(), Rc::clone(&value)));
				Ok(value)
			}
		}
	}

	/// Removes and yields the entries whose fragment sequence was dropped.
	pub fn drain_orphaned(&mut self) -> DrainOrphaned<'_, V> {
		DrainOrphaned(self.0.extract_if(DrainOrphaned::<V>::orphan_filter as fn(&Key, &mut Slot<V>) -> bool))
	}
}

pub struct DrainOrphaned<'a, V>(ExtractIf<'a, Key, Slot<V>, fn(&Key, &mut Slot<V>) -> bool>);

impl<'a, V> DrainOrphaned<'a, V> {
	fn orphan_filter(_: &Key, (strings, _): &mut Slot<V>) -> bool {
		strings.strong_count() == 0
	}
}

impl<'a, V> Iterator for DrainOrphaned<'a, V> {
	type Item = Rc<V>;

	fn next(&mut self) -> Option<Self::Item> {
		self.0.next().map(|(_, (_, value))| value)
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		self.0.size_hint()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identity_not_content() {
		let mut cache = TemplateCache::new();
		let a = TemplateStrings::from_static(&["<p>", "</p>"]);
		let b = TemplateStrings::from_static(&["<p>", "</p>"]);
		let mut created = 0;
		for strings in [&a, &a, &b] {
			cache
				.get_or_try_insert_with(strings, TemplateKind::Html, || {
					created += 1;
					Ok(created)
				})
				.unwrap();
		}
		assert_eq!(created, 2);
		assert_eq!(cache.len(), 2);
	}

	#[test]
	fn orphans_are_drained() {
		let mut cache = TemplateCache::new();
		let kept = TemplateStrings::from_static(&["a"]);
		cache.get_or_try_insert_with(&kept, TemplateKind::Html, || Ok(())).unwrap();
		{
			let dropped = TemplateStrings::new(vec!["b".to_owned()]);
			cache.get_or_try_insert_with(&dropped, TemplateKind::Html, || Ok(())).unwrap();
		}
		assert_eq!(cache.drain_orphaned().count(), 1);
		assert_eq!(cache.len(), 1);
	}
}
