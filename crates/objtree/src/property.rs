//! Typed, shared, mutable fields exported as properties.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::value::{FromValue, IntoValue, Type, Value};

/// Handle on one mutable field.
///
/// Clones share the same storage. Reads take a shared lock and writes an
/// exclusive one; the lock is private to the field.
#[derive(Clone)]
pub struct Property {
	ty: Type,
	value: Arc<RwLock<Value>>,
}

impl Property {
	/// Creates a field holding `value`, typed after the Rust type.
	pub fn new<T: IntoValue>(value: T) -> Self {
		Self {
			ty: T::value_type(),
			value: Arc::new(RwLock::new(value.into_value())),
		}
	}

	/// Creates a field typed after a dynamic value.
	pub fn from_value(value: Value) -> Self {
		Self {
			ty: value.type_of(),
			value: Arc::new(RwLock::new(value)),
		}
	}

	/// Creates a field with an explicit declared type.
	pub fn with_type(ty: Type, value: Value) -> Result<Self> {
		let actual = value.type_of();
		if actual != ty {
			return Err(Error::TypeMismatch { expected: ty, actual });
		}
		Ok(Self {
			ty,
			value: Arc::new(RwLock::new(value)),
		})
	}

	/// Declared type.
	pub fn value_type(&self) -> &Type {
		&self.ty
	}

	/// Current value.
	pub fn get(&self) -> Value {
		self.value.read().clone()
	}

	/// Current value converted to a Rust type.
	pub fn get_as<T: FromValue>(&self) -> Option<T> {
		T::from_value(self.get())
	}

	/// Replaces the value. The type must equal the declared type exactly;
	/// on mismatch the previous value is kept.
	pub fn set(&self, value: Value) -> Result<()> {
		let actual = value.type_of();
		if actual != self.ty {
			return Err(Error::TypeMismatch {
				expected: self.ty.clone(),
				actual,
			});
		}
		*self.value.write() = value;
		Ok(())
	}

	/// Returns true when both handles share the same storage.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.value, &other.value)
	}
}

impl fmt::Debug for Property {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Property")
			.field("type", &self.ty)
			.field("value", &*self.value.read())
			.finish()
	}
}
