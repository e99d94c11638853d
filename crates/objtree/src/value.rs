//! Explicit type schema and dynamic values exchanged with exported objects.
//!
//! Every operation and field carries a [`Type`]; matching and introspection
//! compare these descriptions as plain data. [`Value`] is the dynamically
//! typed payload carried by calls, replies and notifications.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::CallError;

/// Structural type of an argument, return value or field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
	Bool,
	Byte,
	Int16,
	UInt16,
	Int32,
	UInt32,
	Int64,
	UInt64,
	Double,
	Str,
	ObjectPath,
	Signature,
	Variant,
	Array(Box<Type>),
	Dict(Box<Type>, Box<Type>),
	Struct(Vec<Type>),
	/// Caller identity, injected by the dispatcher and never decoded from a payload.
	Sender,
	/// Conventional error-signaling return slot.
	Error,
}

impl Type {
	/// Returns true for the two calling-convention types that have no wire encoding.
	pub const fn is_reserved(&self) -> bool {
		matches!(self, Self::Sender | Self::Error)
	}

	/// Renders the bus signature code for this type.
	///
	/// Reserved types render as the empty string.
	pub fn signature(&self) -> String {
		let mut out = String::new();
		self.write_signature(&mut out);
		out
	}

	fn write_signature(&self, out: &mut String) {
		match self {
			Self::Bool => out.push('b'),
			Self::Byte => out.push('y'),
			Self::Int16 => out.push('n'),
			Self::UInt16 => out.push('q'),
			Self::Int32 => out.push('i'),
			Self::UInt32 => out.push('u'),
			Self::Int64 => out.push('x'),
			Self::UInt64 => out.push('t'),
			Self::Double => out.push('d'),
			Self::Str => out.push('s'),
			Self::ObjectPath => out.push('o'),
			Self::Signature => out.push('g'),
			Self::Variant => out.push('v'),
			Self::Array(elem) => {
				out.push('a');
				elem.write_signature(out);
			}
			Self::Dict(key, value) => {
				out.push_str("a{");
				key.write_signature(out);
				value.write_signature(out);
				out.push('}');
			}
			Self::Struct(fields) => {
				out.push('(');
				for field in fields {
					field.write_signature(out);
				}
				out.push(')');
			}
			Self::Sender | Self::Error => {}
		}
	}

	/// Zero value of this type.
	pub fn zero(&self) -> Value {
		match self {
			Self::Bool => Value::Bool(false),
			Self::Byte => Value::Byte(0),
			Self::Int16 => Value::Int16(0),
			Self::UInt16 => Value::UInt16(0),
			Self::Int32 => Value::Int32(0),
			Self::UInt32 => Value::UInt32(0),
			Self::Int64 => Value::Int64(0),
			Self::UInt64 => Value::UInt64(0),
			Self::Double => Value::Double(0.0),
			Self::Str => Value::Str(String::new()),
			Self::ObjectPath => Value::ObjectPath(ObjectPath::root()),
			Self::Signature => Value::Signature(String::new()),
			Self::Variant => Value::Variant(Box::new(Value::Str(String::new()))),
			Self::Array(elem) => Value::Array((**elem).clone(), Vec::new()),
			Self::Dict(key, value) => Value::Dict((**key).clone(), (**value).clone(), Vec::new()),
			Self::Struct(fields) => Value::Struct(fields.iter().map(Type::zero).collect()),
			Self::Sender => Value::Sender(String::new()),
			Self::Error => Value::Error(None),
		}
	}
}

impl fmt::Display for Type {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Sender => f.write_str("<sender>"),
			Self::Error => f.write_str("<error>"),
			other => f.write_str(&other.signature()),
		}
	}
}

/// Slash-delimited object path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectPath(String);

impl ObjectPath {
	/// Creates a path from its textual form.
	pub fn new(path: impl Into<String>) -> Self {
		Self(path.into())
	}

	/// The root path `/`.
	pub fn root() -> Self {
		Self("/".to_string())
	}

	/// Returns the textual form.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Returns true when the path addresses the root node.
	pub fn is_root(&self) -> bool {
		self.segments().next().is_none()
	}

	/// Iterates the non-empty path segments. The root yields nothing.
	pub fn segments(&self) -> impl Iterator<Item = &str> {
		self.0.split('/').filter(|s| !s.is_empty())
	}

	/// Appends one segment.
	pub fn join(&self, segment: &str) -> Self {
		if self.is_root() {
			Self(format!("/{segment}"))
		} else {
			Self(format!("{}/{segment}", self.0.trim_end_matches('/')))
		}
	}
}

impl fmt::Display for ObjectPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ObjectPath {
	fn from(path: &str) -> Self {
		Self::new(path)
	}
}

impl From<String> for ObjectPath {
	fn from(path: String) -> Self {
		Self(path)
	}
}

/// Caller identity injected into operations that declare a [`Type::Sender`] argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Sender(pub String);

/// Dynamically typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Bool(bool),
	Byte(u8),
	Int16(i16),
	UInt16(u16),
	Int32(i32),
	UInt32(u32),
	Int64(i64),
	UInt64(u64),
	Double(f64),
	Str(String),
	ObjectPath(ObjectPath),
	Signature(String),
	Variant(Box<Value>),
	/// Element type plus items, so empty arrays stay typed.
	Array(Type, Vec<Value>),
	/// Key type, value type and entries.
	Dict(Type, Type, Vec<(Value, Value)>),
	Struct(Vec<Value>),
	Sender(String),
	/// Trailing error slot; `None` means the call succeeded.
	Error(Option<CallError>),
}

impl Value {
	/// Exact type of this value.
	pub fn type_of(&self) -> Type {
		match self {
			Self::Bool(_) => Type::Bool,
			Self::Byte(_) => Type::Byte,
			Self::Int16(_) => Type::Int16,
			Self::UInt16(_) => Type::UInt16,
			Self::Int32(_) => Type::Int32,
			Self::UInt32(_) => Type::UInt32,
			Self::Int64(_) => Type::Int64,
			Self::UInt64(_) => Type::UInt64,
			Self::Double(_) => Type::Double,
			Self::Str(_) => Type::Str,
			Self::ObjectPath(_) => Type::ObjectPath,
			Self::Signature(_) => Type::Signature,
			Self::Variant(_) => Type::Variant,
			Self::Array(elem, _) => Type::Array(Box::new(elem.clone())),
			Self::Dict(key, value, _) => Type::Dict(Box::new(key.clone()), Box::new(value.clone())),
			Self::Struct(fields) => Type::Struct(fields.iter().map(Value::type_of).collect()),
			Self::Sender(_) => Type::Sender,
			Self::Error(_) => Type::Error,
		}
	}

	/// Structurally converts this value to `ty`, or returns `None`.
	///
	/// Identical types pass through, a declared variant wraps, an inbound
	/// variant unwraps, strings become caller identities and containers
	/// convert element-wise. Numeric widening is not performed.
	pub fn conform(self, ty: &Type) -> Option<Value> {
		if self.type_of() == *ty {
			return Some(self);
		}
		match (self, ty) {
			(Self::Variant(inner), _) => inner.conform(ty),
			(value, Type::Variant) => Some(Self::Variant(Box::new(value))),
			(Self::Str(s), Type::Sender) => Some(Self::Sender(s)),
			(Self::Sender(s), Type::Str) => Some(Self::Str(s)),
			(Self::Array(_, items), Type::Array(elem)) => items
				.into_iter()
				.map(|item| item.conform(elem))
				.collect::<Option<Vec<_>>>()
				.map(|items| Self::Array((**elem).clone(), items)),
			(Self::Dict(_, _, entries), Type::Dict(key_ty, value_ty)) => entries
				.into_iter()
				.map(|(k, v)| Some((k.conform(key_ty)?, v.conform(value_ty)?)))
				.collect::<Option<Vec<_>>>()
				.map(|entries| Self::Dict((**key_ty).clone(), (**value_ty).clone(), entries)),
			(Self::Struct(fields), Type::Struct(types)) if fields.len() == types.len() => fields
				.into_iter()
				.zip(types)
				.map(|(field, ty)| field.conform(ty))
				.collect::<Option<Vec<_>>>()
				.map(Self::Struct),
			_ => None,
		}
	}

	/// Returns the string payload of `Str`, `ObjectPath`, `Signature` and `Sender` values.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(s) | Self::Signature(s) | Self::Sender(s) => Some(s),
			Self::ObjectPath(p) => Some(p.as_str()),
			_ => None,
		}
	}

	/// Converts into a typed Rust value.
	pub fn get<T: FromValue>(self) -> Option<T> {
		T::from_value(self)
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Bool(v) => write!(f, "{v}"),
			Self::Byte(v) => write!(f, "{v}"),
			Self::Int16(v) => write!(f, "{v}"),
			Self::UInt16(v) => write!(f, "{v}"),
			Self::Int32(v) => write!(f, "{v}"),
			Self::UInt32(v) => write!(f, "{v}"),
			Self::Int64(v) => write!(f, "{v}"),
			Self::UInt64(v) => write!(f, "{v}"),
			Self::Double(v) => write!(f, "{v}"),
			Self::Str(s) | Self::Signature(s) | Self::Sender(s) => write!(f, "{s:?}"),
			Self::ObjectPath(p) => write!(f, "{p}"),
			Self::Variant(inner) => write!(f, "<{inner}>"),
			Self::Array(_, items) => {
				f.write_str("[")?;
				for (i, item) in items.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{item}")?;
				}
				f.write_str("]")
			}
			Self::Dict(_, _, entries) => {
				f.write_str("{")?;
				for (i, (k, v)) in entries.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{k}: {v}")?;
				}
				f.write_str("}")
			}
			Self::Struct(fields) => {
				f.write_str("(")?;
				for (i, field) in fields.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{field}")?;
				}
				f.write_str(")")
			}
			Self::Error(None) => f.write_str("<ok>"),
			Self::Error(Some(e)) => write!(f, "<{e}>"),
		}
	}
}

/// Rust types with a fixed [`Type`].
pub trait Typed {
	/// The declared type.
	fn value_type() -> Type;
}

/// Conversion from a Rust value into a [`Value`].
pub trait IntoValue: Typed {
	/// Performs the conversion.
	fn into_value(self) -> Value;
}

/// Conversion from a [`Value`] of the declared type.
pub trait FromValue: Typed + Sized {
	/// Performs the conversion, returning `None` on a type mismatch.
	fn from_value(value: Value) -> Option<Self>;
}

macro_rules! scalar_value {
	($($ty:ty => $variant:ident),* $(,)?) => {
		$(
			impl Typed for $ty {
				fn value_type() -> Type {
					Type::$variant
				}
			}

			impl IntoValue for $ty {
				fn into_value(self) -> Value {
					Value::$variant(self)
				}
			}

			impl FromValue for $ty {
				fn from_value(value: Value) -> Option<Self> {
					match value {
						Value::$variant(v) => Some(v),
						_ => None,
					}
				}
			}
		)*
	};
}

scalar_value! {
	bool => Bool,
	u8 => Byte,
	i16 => Int16,
	u16 => UInt16,
	i32 => Int32,
	u32 => UInt32,
	i64 => Int64,
	u64 => UInt64,
	f64 => Double,
	String => Str,
	ObjectPath => ObjectPath,
}

impl Typed for &str {
	fn value_type() -> Type {
		Type::Str
	}
}

impl IntoValue for &str {
	fn into_value(self) -> Value {
		Value::Str(self.to_string())
	}
}

impl Typed for Sender {
	fn value_type() -> Type {
		Type::Sender
	}
}

impl IntoValue for Sender {
	fn into_value(self) -> Value {
		Value::Sender(self.0)
	}
}

impl FromValue for Sender {
	fn from_value(value: Value) -> Option<Self> {
		match value {
			Value::Sender(s) | Value::Str(s) => Some(Self(s)),
			_ => None,
		}
	}
}

impl Typed for Value {
	fn value_type() -> Type {
		Type::Variant
	}
}

impl IntoValue for Value {
	fn into_value(self) -> Value {
		match self {
			variant @ Value::Variant(_) => variant,
			other => Value::Variant(Box::new(other)),
		}
	}
}

impl FromValue for Value {
	fn from_value(value: Value) -> Option<Self> {
		match value {
			Value::Variant(inner) => Some(*inner),
			other => Some(other),
		}
	}
}

impl<T: Typed> Typed for Vec<T> {
	fn value_type() -> Type {
		Type::Array(Box::new(T::value_type()))
	}
}

impl<T: IntoValue> IntoValue for Vec<T> {
	fn into_value(self) -> Value {
		Value::Array(T::value_type(), self.into_iter().map(IntoValue::into_value).collect())
	}
}

impl<T: FromValue> FromValue for Vec<T> {
	fn from_value(value: Value) -> Option<Self> {
		match value {
			Value::Array(_, items) => items.into_iter().map(T::from_value).collect(),
			_ => None,
		}
	}
}

impl<K: Typed, V: Typed> Typed for BTreeMap<K, V> {
	fn value_type() -> Type {
		Type::Dict(Box::new(K::value_type()), Box::new(V::value_type()))
	}
}

impl<K: IntoValue, V: IntoValue> IntoValue for BTreeMap<K, V> {
	fn into_value(self) -> Value {
		Value::Dict(
			K::value_type(),
			V::value_type(),
			self.into_iter().map(|(k, v)| (k.into_value(), v.into_value())).collect(),
		)
	}
}

impl<K: FromValue + Ord, V: FromValue> FromValue for BTreeMap<K, V> {
	fn from_value(value: Value) -> Option<Self> {
		match value {
			Value::Dict(_, _, entries) => entries
				.into_iter()
				.map(|(k, v)| Some((K::from_value(k)?, V::from_value(v)?)))
				.collect(),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn signatures_render_bus_codes() {
		assert_eq!(Type::Str.signature(), "s");
		assert_eq!(Vec::<String>::value_type().signature(), "as");
		assert_eq!(BTreeMap::<String, Value>::value_type().signature(), "a{sv}");
		assert_eq!(Type::Struct(vec![Type::Int32, Type::Str]).signature(), "(is)");
		assert_eq!(Type::Sender.signature(), "");
		assert_eq!(Type::Error.signature(), "");
	}

	#[test]
	fn conform_wraps_and_unwraps_variants() {
		let wrapped = Value::Int32(7).conform(&Type::Variant).unwrap();
		assert_eq!(wrapped, Value::Variant(Box::new(Value::Int32(7))));
		assert_eq!(wrapped.conform(&Type::Int32), Some(Value::Int32(7)));
	}

	#[test]
	fn conform_rejects_numeric_widening() {
		assert_eq!(Value::Int32(1).conform(&Type::Int64), None);
	}

	#[test]
	fn conform_converts_arrays_elementwise() {
		let items = Value::Array(Type::Variant, vec![Value::Variant(Box::new(Value::Str("a".into())))]);
		let conformed = items.conform(&Type::Array(Box::new(Type::Str))).unwrap();
		assert_eq!(conformed, Value::Array(Type::Str, vec![Value::Str("a".into())]));
	}

	#[test]
	fn conform_turns_strings_into_senders() {
		assert_eq!(
			Value::Str(":1.42".into()).conform(&Type::Sender),
			Some(Value::Sender(":1.42".into()))
		);
	}

	#[test]
	fn object_path_segments_skip_empty_tokens() {
		let path = ObjectPath::from("/a//b/c/");
		assert_eq!(path.segments().collect::<Vec<_>>(), ["a", "b", "c"]);
		assert!(ObjectPath::root().is_root());
		assert_eq!(ObjectPath::root().join("x").as_str(), "/x");
		assert_eq!(ObjectPath::from("/x").join("y").as_str(), "/x/y");
	}

	#[test]
	fn typed_round_trip_through_containers() {
		let value = vec![1u32, 2, 3].into_value();
		assert_eq!(value.type_of().signature(), "au");
		assert_eq!(value.get::<Vec<u32>>(), Some(vec![1, 2, 3]));
	}
}
