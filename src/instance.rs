use crate::{
	dom::{Document, Node},
	error::{Error, Result},
	part::Part,
	render::Scope,
	template::Template,
	value::Value,
};
use std::rc::Rc;
use tracing::{error, instrument, trace};

/// A live copy of a [`Template`] and its parts, 1:1 with the template's part metadata.
#[derive(Debug)]
pub(crate) struct TemplateInstance {
	template: Rc<Template>,
	parts: Vec<Part>,
}

impl TemplateInstance {
	/// Clones the template's fragment into `document` and creates the parts on the (still detached) clone.
	#[instrument(skip(template, document))]
	pub fn create(template: Rc<Template>, document: &Document) -> Result<(Self, Node)> {
		let (fragment, nodes) = template.stamp(document)?;
		let parts = template
			.parts()
			.iter()
			.zip(nodes)
			.map(|(metadata, node)| Part::new(metadata, node))
			.collect::<Result<Vec<_>>>()?;
		trace!("Created {} part(s).", parts.len());
		Ok((Self { template, parts }, fragment))
	}

	/// Wraps parts that were bound to existing nodes.
	pub fn from_parts(template: Rc<Template>, parts: Vec<Part>) -> Self {
		Self { template, parts }
	}

	pub fn template(&self) -> &Rc<Template> {
		&self.template
	}

	pub fn check_value_count(template: &Template, values: &[Value]) -> Result<()> {
		if values.len() == template.value_count() {
			Ok(())
		} else {
			error!("Template expects {} value(s), got {}.", template.value_count(), values.len());
			Err(Error::ValueCountMismatch {
				expected: template.value_count(),
				received: values.len(),
			})
		}
	}

	/// Commits `values` part by part, in document order.
	pub fn update(&mut self, values: &[Value], scope: &Scope<'_>) -> Result<()> {
		Self::check_value_count(&self.template, values)?;
		for part in &mut self.parts {
			part.commit(values, scope)?;
		}
		Ok(())
	}

	pub fn flush(&mut self, scope: &Scope<'_>) -> Result<usize> {
		let mut count = 0;
		for part in &mut self.parts {
			count += part.flush(scope)?;
		}
		Ok(count)
	}

	pub fn teardown(&mut self) {
		self.parts.iter_mut().for_each(Part::teardown);
	}

	pub fn set_connected(&mut self, connected: bool) {
		for part in &mut self.parts {
			part.set_connected(connected);
		}
	}
}
