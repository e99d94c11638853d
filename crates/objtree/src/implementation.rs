//! Implementation sources and the typed views bindings are made of.
//!
//! An [`Implementation`] is built either from a [`Table`] of named entries or
//! from a [`Receiver`] that registers its exported members. Either way the
//! result owns method handles, property handles and the [`Descriptor`]
//! derived from them.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::descriptor::{Descriptor, satisfies};
use crate::error::{Error, Result};
use crate::method::{IntoMethod, Method};
use crate::property::Property;
use crate::value::Value;

/// One named entry of a [`Table`].
#[derive(Debug, Clone)]
pub enum Entry {
	/// Callable; exported as a method.
	Method(Method),
	/// Mutable storage; exported as a property.
	Field(Property),
	/// Plain value; neither callable nor mutable, so never exported.
	Value(Value),
}

/// Name to entry table.
#[derive(Debug, Clone, Default)]
pub struct Table {
	entries: BTreeMap<String, Entry>,
}

impl Table {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a callable entry.
	pub fn method<M>(mut self, name: impl Into<String>, f: impl IntoMethod<M>) -> Self {
		self.entries.insert(name.into(), Entry::Method(f.into_method()));
		self
	}

	/// Adds a mutable field.
	pub fn field(mut self, name: impl Into<String>, property: Property) -> Self {
		self.entries.insert(name.into(), Entry::Field(property));
		self
	}

	/// Adds a plain value.
	pub fn value(mut self, name: impl Into<String>, value: Value) -> Self {
		self.entries.insert(name.into(), Entry::Value(value));
		self
	}

	/// Inserts an entry, returning the one it replaced.
	pub fn insert(&mut self, name: impl Into<String>, entry: Entry) -> Option<Entry> {
		self.entries.insert(name.into(), entry)
	}

	pub fn get(&self, name: &str) -> Option<&Entry> {
		self.entries.get(name)
	}

	/// Entries in name order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
		self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// A typed value that exports a chosen set of members.
///
/// Only what `export` registers is visible; everything else on the type
/// stays private to Rust callers.
///
/// ```
/// use std::sync::Arc;
/// use objtree::{Members, Receiver};
///
/// struct Counter(std::sync::atomic::AtomicU32);
///
/// impl Receiver for Counter {
/// 	fn export(self: Arc<Self>, members: &mut Members) {
/// 		members.method("Next", move || {
/// 			self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1
/// 		});
/// 	}
/// }
/// ```
pub trait Receiver: Send + Sync + 'static {
	/// Registers exported methods and properties.
	fn export(self: Arc<Self>, members: &mut Members);
}

/// Collector passed to [`Receiver::export`].
#[derive(Debug, Default)]
pub struct Members {
	methods: BTreeMap<String, Method>,
	properties: BTreeMap<String, Property>,
}

impl Members {
	/// Exports a method.
	pub fn method<M>(&mut self, name: impl Into<String>, f: impl IntoMethod<M>) -> &mut Self {
		self.methods.insert(name.into(), f.into_method());
		self
	}

	/// Exports a property.
	pub fn property(&mut self, name: impl Into<String>, property: Property) -> &mut Self {
		self.properties.insert(name.into(), property);
		self
	}
}

/// Methods, properties and the descriptor derived from them.
#[derive(Debug, Default)]
pub struct Implementation {
	methods: BTreeMap<String, Method>,
	properties: BTreeMap<String, Property>,
	descriptor: Descriptor,
}

impl Implementation {
	/// An implementation with no members. Satisfies only empty requirements.
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn from_table(table: &Table) -> Self {
		Self::from_table_map(table, str::to_string)
	}

	/// Builds from a table, rewriting every member name.
	pub fn from_table_map(table: &Table, rename: impl Fn(&str) -> String) -> Self {
		let mut methods = BTreeMap::new();
		let mut properties = BTreeMap::new();
		for (name, entry) in table.iter() {
			match entry {
				Entry::Method(method) => {
					methods.insert(rename(name), method.detached());
				}
				Entry::Field(property) => {
					properties.insert(rename(name), property.clone());
				}
				Entry::Value(_) => {}
			}
		}
		Self::build(methods, properties)
	}

	pub fn from_receiver<R: Receiver>(receiver: Arc<R>) -> Self {
		Self::from_receiver_map(receiver, str::to_string)
	}

	/// Builds from a receiver, rewriting every member name.
	pub fn from_receiver_map<R: Receiver>(receiver: Arc<R>, rename: impl Fn(&str) -> String) -> Self {
		let mut members = Members::default();
		receiver.export(&mut members);
		let methods = members.methods.into_iter().map(|(name, m)| (rename(&name), m)).collect();
		let properties = members.properties.into_iter().map(|(name, p)| (rename(&name), p)).collect();
		Self::build(methods, properties)
	}

	fn build(methods: BTreeMap<String, Method>, properties: BTreeMap<String, Property>) -> Self {
		let descriptor = methods
			.iter()
			.fold(Descriptor::new(), |d, (name, m)| d.with_signature(name.clone(), m.signature().clone()));
		let descriptor = properties
			.iter()
			.fold(descriptor, |d, (name, p)| d.with_property(name.clone(), p.value_type().clone()));
		Self {
			methods,
			properties,
			descriptor,
		}
	}

	pub fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	/// `Satisfies(required, self)`.
	pub fn implements(&self, required: Option<&Descriptor>) -> bool {
		satisfies(required, &self.descriptor)
	}

	/// Fresh handle on a method.
	pub fn lookup_method(&self, name: &str) -> Option<Method> {
		self.methods.get(name).map(Method::detached)
	}

	pub fn lookup_property(&self, name: &str) -> Option<Property> {
		self.properties.get(name).cloned()
	}

	pub fn methods(&self) -> impl Iterator<Item = (&str, &Method)> {
		self.methods.iter().map(|(n, m)| (n.as_str(), m))
	}

	pub fn properties(&self) -> impl Iterator<Item = (&str, &Property)> {
		self.properties.iter().map(|(n, p)| (n.as_str(), p))
	}

	/// Typed view restricted to `required`.
	pub fn as_interface(self: &Arc<Self>, required: &Descriptor) -> Result<View> {
		if !required.satisfied_by(&self.descriptor) {
			return Err(Error::NotImplemented(format!("{required:?}")));
		}
		Ok(View {
			implementation: Arc::clone(self),
			ty: Arc::new(required.clone()),
		})
	}
}

/// An implementation seen through a required descriptor.
///
/// Only members named by the descriptor are reachable. Handles still come
/// from the implementation, so signatures reflect what actually runs.
#[derive(Debug, Clone)]
pub struct View {
	implementation: Arc<Implementation>,
	ty: Arc<Descriptor>,
}

impl View {
	/// A view exposing every member of `implementation`.
	pub(crate) fn full(implementation: Arc<Implementation>) -> Self {
		let ty = Arc::new(implementation.descriptor.clone());
		Self { implementation, ty }
	}

	/// The narrowing descriptor.
	pub fn descriptor(&self) -> &Descriptor {
		&self.ty
	}

	pub fn implementation(&self) -> &Arc<Implementation> {
		&self.implementation
	}

	/// `Satisfies(required, view type)`.
	pub fn implements(&self, required: Option<&Descriptor>) -> bool {
		satisfies(required, &self.ty)
	}

	/// Narrows further. The new requirement is checked against this view's
	/// type, not the whole implementation.
	pub fn as_interface(&self, required: &Descriptor) -> Result<View> {
		if !required.satisfied_by(&self.ty) {
			return Err(Error::NotImplemented(format!("{required:?}")));
		}
		Ok(View {
			implementation: Arc::clone(&self.implementation),
			ty: Arc::new(required.clone()),
		})
	}

	pub fn lookup_method(&self, name: &str) -> Option<Method> {
		self.ty.method(name)?;
		self.implementation.lookup_method(name)
	}

	pub fn lookup_property(&self, name: &str) -> Option<Property> {
		self.ty.property(name)?;
		self.implementation.lookup_property(name)
	}

	/// Methods named by the view type, in name order.
	pub fn methods(&self) -> impl Iterator<Item = (&str, &Method)> {
		self.implementation.methods().filter(|(name, _)| self.ty.method(name).is_some())
	}

	/// Properties named by the view type, in name order.
	pub fn properties(&self) -> impl Iterator<Item = (&str, &Property)> {
		self.implementation
			.properties()
			.filter(|(name, _)| self.ty.property(name).is_some())
	}
}
