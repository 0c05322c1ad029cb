use crate::{
	cache::TemplateCache,
	dom::{Document, Node},
	error::Result,
	hydrate,
	part::ChildPart,
	template::Template,
	value::{TemplateResult, Value},
};
use core::{
	any::Any,
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use futures::task::LocalSpawn;
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{debug, error, instrument, trace, warn};

/// Per-root settings, given on each [`Renderer::render`] or [`Renderer::hydrate`] call.
#[derive(Clone, Default)]
pub struct RenderOptions {
	/// Exposed to event listeners as [`Event::host`](`crate::dom::Event::host`).
	pub host: Option<Rc<dyn Any>>,
	/// Where in the container the first render inserts its content. Defaults to the end.
	pub render_before: Option<Node>,
	/// Runs the tasks of asynchronous directives such as [`until`](`crate::directives::until`).
	pub spawner: Option<Rc<dyn LocalSpawn>>,
}

impl Debug for RenderOptions {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("RenderOptions")
			.field("host", &self.host.is_some())
			.field("render_before", &self.render_before)
			.field("spawner", &self.spawner.is_some())
			.finish()
	}
}

/// Collects "please flush" requests from directive handles.
#[derive(Default)]
pub(crate) struct UpdateQueue {
	dirty: Cell<bool>,
	callback: RefCell<Option<Rc<dyn Fn()>>>,
	/// Roots are taken out of the map while they are worked on. Flushes during that time are deferred.
	busy: Cell<usize>,
	deferred: Cell<bool>,
}

impl Debug for UpdateQueue {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("UpdateQueue")
			.field("dirty", &self.dirty.get())
			.field("busy", &self.busy.get())
			.field("deferred", &self.deferred.get())
			.finish_non_exhaustive()
	}
}

impl UpdateQueue {
	pub fn request_update(&self) {
		self.dirty.set(true);
		let callback = self.callback.borrow().clone();
		if let Some(callback) = callback {
			callback();
		}
	}
}

/// Everything a commit needs besides the part itself.
pub(crate) struct Scope<'a> {
	pub document: Document,
	pub cache: &'a RefCell<TemplateCache<Template>>,
	pub options: &'a RenderOptions,
	pub queue: &'a Rc<UpdateQueue>,
	pub connected: bool,
}

impl Scope<'_> {
	pub fn template(&self, result: &TemplateResult) -> Result<Rc<Template>> {
		self.cache
			.borrow_mut()
			.get_or_try_insert_with(result.strings(), result.kind(), || Template::parse(result.strings(), result.kind()))
	}
}

#[derive(Debug)]
pub(crate) struct Root {
	pub container: Node,
	pub part: ChildPart,
	pub options: RenderOptions,
	pub connected: bool,
}

/// Owns the template cache and the root parts of every container rendered into.
///
/// Rendering into the same container again diffs against what is there.
/// A container must not be rendered into by two renderers.
#[derive(Default)]
pub struct Renderer {
	pub(crate) cache: RefCell<TemplateCache<Template>>,
	pub(crate) roots: RefCell<HashMap<usize, Root>>,
	pub(crate) queue: Rc<UpdateQueue>,
}

impl Debug for Renderer {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Renderer")
			.field("cache", &self.cache.borrow())
			.field("roots", &self.roots.borrow().len())
			.field("queue", &self.queue)
			.finish()
	}
}

impl Renderer {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Renders `value` into `container`.
	///
	/// The first call appends (or inserts before [`RenderOptions::render_before`]) two marker comments and renders between them.
	/// Later calls update that content in place.
	#[instrument(skip(self, value, options))]
	pub fn render(&self, value: impl Into<Value>, container: &Node, options: RenderOptions) -> Result<()> {
		let value = value.into();
		let key = container.id();
		self.busy(|| {
			let existing = self.roots.borrow_mut().remove(&key);
			let mut root = match existing {
				Some(root) => root,
				None => {
					debug!("First render into {:?}.", container);
					let document = container.document();
					let (start, end) = (document.create_comment(""), document.create_comment(""));
					container.insert_before(&start, options.render_before.as_ref())?;
					container.insert_before(&end, options.render_before.as_ref())?;
					Root {
						container: container.clone(),
						part: ChildPart::new(start, end),
						options: RenderOptions::default(),
						connected: true,
					}
				}
			};
			root.options = options;
			let result = self.commit_root(&mut root, |part, scope| part.commit(value, scope));
			self.roots.borrow_mut().insert(key, root);
			result
		})
	}

	/// Binds to server-rendered markup in `container` instead of replacing it.
	///
	/// Only nodes whose server-rendered state doesn't match `value` are written to. Afterwards, [`Renderer::render`] diffs as usual.
	#[instrument(skip(self, value, options))]
	pub fn hydrate(&self, value: impl Into<Value>, container: &Node, options: RenderOptions) -> Result<()> {
		let value = value.into();
		let key = container.id();
		self.busy(|| {
			let previous = self.roots.borrow_mut().remove(&key);
			if let Some(mut previous) = previous {
				warn!("Hydrating {:?}, which was already rendered into. Discarding the previous root.", container);
				previous.part.teardown();
			}
			let (start, end) = hydrate::find_root_markers(container)?;
			let mut root = Root {
				container: container.clone(),
				part: ChildPart::new(start, end),
				options,
				connected: true,
			};
			let result = self.commit_root(&mut root, |part, scope| hydrate::hydrate_child(part, value, scope));
			self.roots.borrow_mut().insert(key, root);
			result
		})
	}

	/// Runs `f` while roots may be checked out of the map. A flush requested meanwhile is requested again afterwards.
	fn busy<T>(&self, f: impl FnOnce() -> T) -> T {
		let queue = &self.queue;
		queue.busy.set(queue.busy.get() + 1);
		let result = f();
		queue.busy.set(queue.busy.get() - 1);
		if queue.busy.get() == 0 && queue.deferred.replace(false) {
			trace!("Re-requesting deferred flush.");
			queue.request_update();
		}
		result
	}

	fn commit_root<T>(&self, root: &mut Root, f: impl FnOnce(&mut ChildPart, &Scope<'_>) -> T) -> T {
		let scope = Scope {
			document: root.container.document(),
			cache: &self.cache,
			options: &root.options,
			queue: &self.queue,
			connected: root.connected,
		};
		f(&mut root.part, &scope)
	}

	/// Tells the directives below `container` that it was (dis)connected from whatever displays it.
	///
	/// While disconnected, pushes from asynchronous directives are discarded.
	#[instrument(skip(self))]
	pub fn set_connected(&self, container: &Node, connected: bool) {
		let key = container.id();
		self.busy(|| {
			let root = self.roots.borrow_mut().remove(&key);
			match root {
				Some(mut root) => {
					if root.connected != connected {
						root.connected = connected;
						root.part.set_connected(connected);
					}
					self.roots.borrow_mut().insert(key, root);
				}
				None => trace!("Nothing rendered into {:?}.", container),
			}
		});
	}

	/// Tears down what was rendered into `container`, removes it together with its markers and forgets the container.
	///
	/// Returns `false` if nothing was rendered there. A later [`Renderer::render`] starts over.
	#[instrument(skip(self))]
	pub fn unmount(&self, container: &Node) -> bool {
		let root = self.roots.borrow_mut().remove(&container.id());
		match root {
			Some(root) => {
				self.busy(|| root.part.remove());
				true
			}
			None => {
				trace!("Nothing rendered into {:?}.", container);
				false
			}
		}
	}

	/// How many containers are currently rendered into.
	#[must_use]
	pub fn root_count(&self) -> usize {
		self.roots.borrow().len()
	}

	/// Whether directive pushes are waiting for [`Renderer::flush`].
	#[must_use]
	pub fn needs_flush(&self) -> bool {
		self.queue.dirty.get()
	}

	/// Commits values pushed by directives since the last flush, in document order within each root.
	///
	/// Returns the number of committed pushes. Every root is flushed even if one fails; the first error is returned.
	///
	/// Called while the renderer is busy (from the update hook during a render or [`Renderer::set_connected`]),
	/// this returns `Ok(0)` and the hook is called again once the renderer is idle.
	#[instrument(skip(self))]
	pub fn flush(&self) -> Result<usize> {
		if self.queue.busy.get() > 0 {
			trace!("Deferring re-entrant flush.");
			self.queue.deferred.set(true);
			return Ok(0);
		}
		if !self.queue.dirty.replace(false) {
			return Ok(0);
		}
		self.busy(|| {
			let keys: Vec<usize> = self.roots.borrow().keys().copied().collect();
			let mut count = 0;
			let mut first_error = None;
			for key in keys {
				let root = self.roots.borrow_mut().remove(&key);
				if let Some(mut root) = root {
					let flushed = self.commit_root(&mut root, |part, scope| part.flush(scope));
					self.roots.borrow_mut().insert(key, root);
					match flushed {
						Ok(flushed) => count += flushed,
						Err(error) => {
							error!("Flushing {:?} failed: {}", key, error);
							first_error.get_or_insert(error);
						}
					}
				}
			}
			debug!("Flushed {} pushed value(s).", count);
			first_error.map_or(Ok(count), Err)
		})
	}

	/// Sets the host's "please flush" hook, called on every accepted directive push.
	///
	/// The hook may call [`Renderer::flush`] directly, but usually schedules it.
	pub fn on_update_requested(&self, callback: impl Fn() + 'static) {
		*self.queue.callback.borrow_mut() = Some(Rc::new(callback));
	}

	/// Drops cached templates whose static fragments no longer exist. Returns how many were dropped.
	pub fn purge_templates(&self) -> usize {
		let purged = self.cache.borrow_mut().drain_orphaned().count();
		trace!("Purged {} template(s).", purged);
		purged
	}

	#[must_use]
	pub fn template_count(&self) -> usize {
		self.cache.borrow().len()
	}
}
