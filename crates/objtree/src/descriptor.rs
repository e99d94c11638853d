//! Capability descriptors and structural matching.
//!
//! A [`Descriptor`] maps member names to their [`Signature`]s (methods) or
//! [`Type`]s (properties). Implementations derive one when they are built;
//! interfaces are described by one. Binding an implementation under an
//! interface name is a subset test between the two.

use std::collections::BTreeMap;

use crate::implementation::{Entry, Table};
use crate::value::Type;

/// Ordered argument and return types of one method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Signature {
	/// Declared argument types, including any injected [`Type::Sender`].
	pub args: Vec<Type>,
	/// Declared return types, including a trailing [`Type::Error`] slot if present.
	pub returns: Vec<Type>,
}

impl Signature {
	/// Creates a signature.
	pub fn new(args: impl Into<Vec<Type>>, returns: impl Into<Vec<Type>>) -> Self {
		Self {
			args: args.into(),
			returns: returns.into(),
		}
	}

	/// Returns true when the last declared return is the conventional error slot.
	pub fn can_fail(&self) -> bool {
		self.returns.last() == Some(&Type::Error)
	}

	/// Arguments a remote caller supplies; injected caller identities are hidden.
	pub fn visible_args(&self) -> impl Iterator<Item = &Type> {
		self.args.iter().filter(|ty| **ty != Type::Sender)
	}

	/// Returns without the trailing error slot.
	pub fn visible_returns(&self) -> &[Type] {
		if self.can_fail() {
			&self.returns[..self.returns.len() - 1]
		} else {
			&self.returns
		}
	}

	/// Returns true when `candidate` can stand in for `self`.
	///
	/// Arguments must be identical; returns are compared after dropping the
	/// trailing error slot on both sides.
	pub fn accepts(&self, candidate: &Signature) -> bool {
		self.args == candidate.args && self.visible_returns() == candidate.visible_returns()
	}
}

/// Name to signature mapping of an implementation or a required interface.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Descriptor {
	methods: BTreeMap<String, Signature>,
	properties: BTreeMap<String, Type>,
}

impl Descriptor {
	/// Creates an empty descriptor.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a method, replacing any previous one of that name.
	pub fn with_method(mut self, name: impl Into<String>, args: &[Type], returns: &[Type]) -> Self {
		self.methods.insert(name.into(), Signature::new(args, returns));
		self
	}

	/// Adds a method by signature.
	pub fn with_signature(mut self, name: impl Into<String>, signature: Signature) -> Self {
		self.methods.insert(name.into(), signature);
		self
	}

	/// Adds a property.
	pub fn with_property(mut self, name: impl Into<String>, ty: Type) -> Self {
		self.properties.insert(name.into(), ty);
		self
	}

	/// Derives a descriptor from a table of entries.
	///
	/// Callables become methods, fields become properties and plain values
	/// are dropped.
	pub fn from_table(table: &Table) -> Self {
		let mut out = Self::new();
		for (name, entry) in table.iter() {
			match entry {
				Entry::Method(method) => {
					out.methods.insert(name.to_string(), method.signature().clone());
				}
				Entry::Field(property) => {
					out.properties.insert(name.to_string(), property.value_type().clone());
				}
				Entry::Value(_) => {}
			}
		}
		out
	}

	/// Derives a descriptor from a table, rewriting every member name.
	pub fn from_table_map(table: &Table, rename: impl Fn(&str) -> String) -> Self {
		Self::from_table(table).rename(rename)
	}

	/// Returns a copy with every member name rewritten.
	pub fn rename(&self, rename: impl Fn(&str) -> String) -> Self {
		Self {
			methods: self.methods.iter().map(|(k, v)| (rename(k), v.clone())).collect(),
			properties: self.properties.iter().map(|(k, v)| (rename(k), v.clone())).collect(),
		}
	}

	/// Method signatures by name.
	pub fn methods(&self) -> &BTreeMap<String, Signature> {
		&self.methods
	}

	/// Property types by name.
	pub fn properties(&self) -> &BTreeMap<String, Type> {
		&self.properties
	}

	/// Looks up one method signature.
	pub fn method(&self, name: &str) -> Option<&Signature> {
		self.methods.get(name)
	}

	/// Looks up one property type.
	pub fn property(&self, name: &str) -> Option<&Type> {
		self.properties.get(name)
	}

	/// Returns true when no members are described.
	pub fn is_empty(&self) -> bool {
		self.methods.is_empty() && self.properties.is_empty()
	}

	/// Structural subset test: every member of `self` exists in `candidate`
	/// with a compatible signature. Extra candidate members are ignored.
	pub fn satisfied_by(&self, candidate: &Descriptor) -> bool {
		if self.methods.len() > candidate.methods.len()
			|| self.properties.len() > candidate.properties.len()
		{
			return false;
		}
		let methods = self.methods.iter().all(|(name, required)| {
			candidate
				.methods
				.get(name)
				.is_some_and(|sig| required.accepts(sig))
		});
		methods
			&& self
				.properties
				.iter()
				.all(|(name, ty)| candidate.properties.get(name) == Some(ty))
	}
}

/// `Satisfies(required, candidate)`; an absent requirement never matches.
pub fn satisfies(required: Option<&Descriptor>, candidate: &Descriptor) -> bool {
	required.is_some_and(|required| required.satisfied_by(candidate))
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	fn call_me() -> Descriptor {
		Descriptor::new().with_method("CallMe", &[], &[Type::Str])
	}

	#[test]
	fn absent_requirement_never_matches() {
		assert!(!satisfies(None, &call_me()));
		assert!(!satisfies(None, &Descriptor::new()));
	}

	#[test]
	fn empty_requirement_matches_anything() {
		assert!(Descriptor::new().satisfied_by(&Descriptor::new()));
		assert!(Descriptor::new().satisfied_by(&call_me()));
	}

	#[test]
	fn extra_candidate_methods_are_ignored() {
		let candidate = call_me().with_method("CallMe2", &[], &[Type::Str]);
		assert!(call_me().satisfied_by(&candidate));
		assert!(!candidate.satisfied_by(&call_me()));
	}

	#[test]
	fn mismatched_arguments_fail() {
		let required = Descriptor::new().with_method("CallMe", &[Type::Str], &[Type::Str]);
		assert!(!required.satisfied_by(&call_me()));
	}

	#[test]
	fn mismatched_returns_fail() {
		let bool_ret = Descriptor::new().with_method("CallMe", &[], &[Type::Bool]);
		assert!(!bool_ret.satisfied_by(&call_me()));
		let two_rets = Descriptor::new().with_method("CallMe", &[], &[Type::Str, Type::Bool]);
		assert!(!two_rets.satisfied_by(&call_me()));
	}

	#[test]
	fn wrong_name_fails() {
		let candidate = Descriptor::new().with_method("Call", &[Type::Str], &[Type::Str]);
		let required = Descriptor::new().with_method("CallMe", &[Type::Str], &[Type::Str]);
		assert!(!required.satisfied_by(&candidate));
	}

	#[test]
	fn trailing_error_is_ignored_on_both_sides() {
		let fallible = Descriptor::new().with_method("CallMe", &[], &[Type::Str, Type::Error]);
		assert!(fallible.satisfied_by(&call_me()));
		assert!(call_me().satisfied_by(&fallible));
	}

	#[test]
	fn properties_match_by_exact_type() {
		let candidate = Descriptor::new().with_property("Name", Type::Str);
		assert!(Descriptor::new().with_property("Name", Type::Str).satisfied_by(&candidate));
		assert!(!Descriptor::new().with_property("Name", Type::Int32).satisfied_by(&candidate));
		assert!(!Descriptor::new().with_property("Other", Type::Str).satisfied_by(&candidate));
	}

	#[test]
	fn rename_rewrites_every_member() {
		let renamed = call_me()
			.with_property("Name", Type::Str)
			.rename(|name| name.to_lowercase());
		assert!(renamed.method("callme").is_some());
		assert!(renamed.property("name").is_some());
		assert!(renamed.method("CallMe").is_none());
	}

	fn arb_type() -> impl Strategy<Value = Type> {
		prop_oneof![
			Just(Type::Bool),
			Just(Type::Int32),
			Just(Type::Str),
			Just(Type::Double),
			Just(Type::Array(Box::new(Type::Str))),
		]
	}

	fn arb_signature() -> impl Strategy<Value = Signature> {
		(
			prop::collection::vec(arb_type(), 0..3),
			prop::collection::vec(arb_type(), 0..3),
			any::<bool>(),
		)
			.prop_map(|(args, mut returns, fallible)| {
				if fallible {
					returns.push(Type::Error);
				}
				Signature::new(args, returns)
			})
	}

	fn arb_descriptor() -> impl Strategy<Value = Descriptor> {
		prop::collection::btree_map("[A-D]", arb_signature(), 0..4).prop_map(|methods| {
			methods
				.into_iter()
				.fold(Descriptor::new(), |d, (name, sig)| d.with_signature(name, sig))
		})
	}

	proptest! {
		#[test]
		fn satisfies_iff_every_required_member_matches(
			required in arb_descriptor(),
			candidate in arb_descriptor(),
		) {
			let expected = required.methods().iter().all(|(name, sig)| {
				candidate.method(name).is_some_and(|c| {
					c.args == sig.args && c.visible_returns() == sig.visible_returns()
				})
			});
			prop_assert_eq!(satisfies(Some(&required), &candidate), expected);
		}

		#[test]
		fn descriptor_satisfies_itself(d in arb_descriptor()) {
			prop_assert!(d.satisfied_by(&d));
		}
	}
}
