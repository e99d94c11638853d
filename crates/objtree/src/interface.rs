use crate::descriptor::Descriptor;
use crate::error::Result;
use crate::implementation::View;
use crate::introspect;
use crate::method::Method;
use crate::property::Property;

/// A named binding of a typed view on an object.
///
/// Bindings are immutable; rebinding the name on an object replaces the
/// whole binding.
#[derive(Debug, Clone)]
pub struct Interface {
	name: String,
	view: View,
}

impl Interface {
	pub(crate) fn new(name: impl Into<String>, view: View) -> Self {
		Self { name: name.into(), view }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// The typed view the binding was created with.
	pub fn view(&self) -> &View {
		&self.view
	}

	pub fn descriptor(&self) -> &Descriptor {
		self.view.descriptor()
	}

	/// Fresh method handle, without invocation context.
	pub fn lookup_method(&self, name: &str) -> Option<Method> {
		self.view.lookup_method(name)
	}

	pub fn lookup_property(&self, name: &str) -> Option<Property> {
		self.view.lookup_property(name)
	}

	/// Method names reachable through the binding.
	pub fn methods(&self) -> impl Iterator<Item = &str> {
		self.view.methods().map(|(name, _)| name)
	}

	/// Property names reachable through the binding.
	pub fn properties(&self) -> impl Iterator<Item = &str> {
		self.view.properties().map(|(name, _)| name)
	}

	/// A binding of the same implementation under another name and a
	/// narrower type.
	pub fn narrow(&self, name: impl Into<String>, required: &Descriptor) -> Result<Interface> {
		Ok(Self::new(name, self.view.as_interface(required)?))
	}

	/// Renders the binding's methods and properties, sorted by name.
	pub fn introspect(&self) -> introspect::Interface {
		let mut methods: Vec<_> = self
			.view
			.methods()
			.map(|(name, m)| introspect::Method::from_signature(name, m.signature()))
			.collect();
		methods.sort_by(|a, b| a.name.cmp(&b.name));
		let mut properties: Vec<_> = self
			.view
			.properties()
			.map(|(name, p)| introspect::Property::new(name, p.value_type()))
			.collect();
		properties.sort_by(|a, b| a.name.cmp(&b.name));
		introspect::Interface {
			name: self.name.clone(),
			methods,
			properties,
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::error::CallError;
	use crate::implementation::{Implementation, Table};
	use crate::value::{Type, Value};

	fn binding() -> Interface {
		let table = Table::new()
			.method("Echo", |s: String| s)
			.method("Fail", || -> std::result::Result<(), CallError> { Err("no".into()) })
			.field("Count", Property::new(0u32));
		let imp = Arc::new(Implementation::from_table(&table));
		let required = imp.descriptor().clone();
		Interface::new("com.example.Echo", imp.as_interface(&required).unwrap())
	}

	#[test]
	fn lookups_follow_the_view() {
		let iface = binding();
		assert_eq!(iface.methods().collect::<Vec<_>>(), ["Echo", "Fail"]);
		assert_eq!(iface.properties().collect::<Vec<_>>(), ["Count"]);
		let echo = iface.lookup_method("Echo").unwrap();
		assert_eq!(echo.call(vec![Value::Str("x".into())]).unwrap(), [Value::Str("x".into())]);
		assert!(iface.lookup_method("Missing").is_none());
	}

	#[test]
	fn narrowing_hides_members() {
		let iface = binding();
		let narrow = iface
			.narrow("com.example.Echo1", &Descriptor::new().with_method("Echo", &[Type::Str], &[Type::Str]))
			.unwrap();
		assert_eq!(narrow.name(), "com.example.Echo1");
		assert!(narrow.lookup_method("Fail").is_none());
		assert!(narrow.lookup_property("Count").is_none());
	}

	#[test]
	fn introspect_sorts_and_hides_error_slot() {
		let doc = binding().introspect();
		assert_eq!(doc.name, "com.example.Echo");
		assert_eq!(doc.methods.len(), 2);
		assert_eq!(doc.methods[1].name, "Fail");
		assert!(doc.methods[1].args.is_empty());
		assert_eq!(doc.properties[0].access, "readwrite");
	}
}
