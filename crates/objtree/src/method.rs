//! Invocable method handles and the calling conventions they enforce.
//!
//! Two conventions are applied here rather than in the method bodies:
//!
//! * A [`Type::Sender`] argument is filled from the caller identity when a
//!   call is decoded from a bus message; it is not part of the payload.
//! * A trailing [`Type::Error`] return carries the failure of the call. A
//!   set slot becomes [`Error::Failed`]; the slot itself is never returned.

use std::fmt;
use std::sync::Arc;

use crate::bus::{Connection, Message};
use crate::descriptor::Signature;
use crate::error::{CallError, Error, Result};
use crate::value::{FromValue, IntoValue, ObjectPath, Type, Typed, Value};

type Body = dyn Fn(Vec<Value>) -> Result<Vec<Value>> + Send + Sync;

/// A handle on one operation of one implementation.
///
/// Handles are cheap to clone. The caller identity and inbound message are
/// per-invocation context, set by [`Method::decode_arguments`] on the handle
/// produced for that invocation.
#[derive(Clone)]
pub struct Method {
	signature: Arc<Signature>,
	body: Arc<Body>,
	sender: Option<String>,
	message: Option<Arc<Message>>,
}

impl Method {
	/// Creates a method from a raw body operating on dynamic values.
	///
	/// The body receives arguments already conformed to `signature.args` and
	/// must return one value per declared return, including the error slot.
	pub fn from_fn<F>(signature: Signature, body: F) -> Self
	where
		F: Fn(Vec<Value>) -> Result<Vec<Value>> + Send + Sync + 'static,
	{
		Self {
			signature: Arc::new(signature),
			body: Arc::new(body),
			sender: None,
			message: None,
		}
	}

	/// Creates a method from a typed closure.
	pub fn new<M>(f: impl IntoMethod<M>) -> Self {
		f.into_method()
	}

	/// Declared signature.
	pub fn signature(&self) -> &Signature {
		&self.signature
	}

	/// A fresh handle sharing the body, with no invocation context.
	pub(crate) fn detached(&self) -> Self {
		Self {
			signature: Arc::clone(&self.signature),
			body: Arc::clone(&self.body),
			sender: None,
			message: None,
		}
	}

	/// Caller identity of the decoded invocation, if any.
	pub fn sender(&self) -> Option<&str> {
		self.sender.as_deref()
	}

	/// Raw inbound message of the decoded invocation, if any.
	pub fn message(&self) -> Option<&Message> {
		self.message.as_deref()
	}

	/// Invokes the method.
	///
	/// Arguments are conformed to the declared types first; any count or
	/// structure mismatch is [`Error::InvalidArgs`] and the body does not run.
	pub fn call(&self, args: Vec<Value>) -> Result<Vec<Value>> {
		let declared = &self.signature.args;
		if args.len() != declared.len() {
			return Err(Error::InvalidArgs(format!(
				"expected {} arguments, got {}",
				declared.len(),
				args.len()
			)));
		}
		let args = args
			.into_iter()
			.zip(declared)
			.enumerate()
			.map(|(i, (value, ty))| {
				let actual = value.type_of();
				value
					.conform(ty)
					.ok_or_else(|| Error::InvalidArgs(format!("argument {i}: expected {ty}, got {actual}")))
			})
			.collect::<Result<Vec<_>>>()?;

		let mut values = (self.body)(args)?;
		if self.signature.can_fail()
			&& values.len() == self.signature.returns.len()
			&& let Some(Value::Error(Some(error))) = values.pop()
		{
			return Err(Error::Failed { error, values });
		}
		Ok(values)
	}

	/// Decodes the arguments of an inbound message for this method.
	///
	/// Records `sender` and `msg` as the invocation context. Injected
	/// caller-identity arguments are synthesized from `sender`; every other
	/// argument is decoded from the message body, whose length must match
	/// the visible argument count exactly.
	pub fn decode_arguments(
		&mut self,
		conn: Option<&dyn Connection>,
		sender: &str,
		msg: Arc<Message>,
	) -> Result<Vec<Value>> {
		self.sender = Some(sender.to_string());
		self.message = Some(Arc::clone(&msg));

		let decodable: Vec<Type> = self.signature.visible_args().cloned().collect();
		if decodable.len() != msg.body.len() {
			return Err(Error::InvalidArgs(format!(
				"expected {} arguments, got {}",
				decodable.len(),
				msg.body.len()
			)));
		}
		let decoded = match conn {
			Some(conn) => conn.store(&msg.body, &decodable),
			None => crate::bus::store(&msg.body, &decodable),
		}
		.map_err(|e| match e {
			invalid @ Error::InvalidArgs(_) => invalid,
			other => Error::InvalidArgs(other.to_string()),
		})?;

		let mut decoded = decoded.into_iter();
		self.signature
			.args
			.iter()
			.map(|ty| match ty {
				Type::Sender => Ok(Value::Sender(sender.to_string())),
				_ => decoded
					.next()
					.ok_or_else(|| Error::InvalidArgs("decoder returned too few values".into())),
			})
			.collect()
	}

	/// Number of declared arguments, including injected caller identities.
	pub fn num_arguments(&self) -> usize {
		self.signature.args.len()
	}

	/// Number of returns, not counting a trailing error slot.
	pub fn num_returns(&self) -> usize {
		self.signature.visible_returns().len()
	}

	/// Declared type of argument `position`.
	pub fn argument_type(&self, position: usize) -> Option<&Type> {
		self.signature.args.get(position)
	}

	/// Declared type of return `position`, not counting a trailing error slot.
	pub fn return_type(&self, position: usize) -> Option<&Type> {
		self.signature.visible_returns().get(position)
	}

	/// Zero value of argument `position`.
	pub fn argument_value(&self, position: usize) -> Option<Value> {
		self.argument_type(position).map(Type::zero)
	}

	/// Zero value of return `position`.
	pub fn return_value(&self, position: usize) -> Option<Value> {
		self.return_type(position).map(Type::zero)
	}
}

impl fmt::Debug for Method {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Method")
			.field("signature", &self.signature)
			.field("sender", &self.sender)
			.finish_non_exhaustive()
	}
}

/// Return values of a typed method body.
pub trait IntoReturns {
	/// Declared return types.
	fn return_types() -> Vec<Type>;
	/// Converts into one value per declared return.
	fn into_returns(self) -> Vec<Value>;
}

impl IntoReturns for () {
	fn return_types() -> Vec<Type> {
		Vec::new()
	}

	fn into_returns(self) -> Vec<Value> {
		Vec::new()
	}
}

macro_rules! single_return {
	($($ty:ty),* $(,)?) => {
		$(
			impl IntoReturns for $ty {
				fn return_types() -> Vec<Type> {
					vec![<$ty as Typed>::value_type()]
				}

				fn into_returns(self) -> Vec<Value> {
					vec![self.into_value()]
				}
			}
		)*
	};
}

single_return!(bool, u8, i16, u16, i32, u32, i64, u64, f64, String, &str, ObjectPath, Value);

impl<T: IntoValue> IntoReturns for Vec<T> {
	fn return_types() -> Vec<Type> {
		vec![Self::value_type()]
	}

	fn into_returns(self) -> Vec<Value> {
		vec![self.into_value()]
	}
}

impl<K: IntoValue, V: IntoValue> IntoReturns for std::collections::BTreeMap<K, V> {
	fn return_types() -> Vec<Type> {
		vec![Self::value_type()]
	}

	fn into_returns(self) -> Vec<Value> {
		vec![self.into_value()]
	}
}

impl<A: IntoValue, B: IntoValue> IntoReturns for (A, B) {
	fn return_types() -> Vec<Type> {
		vec![A::value_type(), B::value_type()]
	}

	fn into_returns(self) -> Vec<Value> {
		vec![self.0.into_value(), self.1.into_value()]
	}
}

impl<A: IntoValue, B: IntoValue, C: IntoValue> IntoReturns for (A, B, C) {
	fn return_types() -> Vec<Type> {
		vec![A::value_type(), B::value_type(), C::value_type()]
	}

	fn into_returns(self) -> Vec<Value> {
		vec![self.0.into_value(), self.1.into_value(), self.2.into_value()]
	}
}

impl<R: IntoReturns, E: Into<CallError>> IntoReturns for std::result::Result<R, E> {
	fn return_types() -> Vec<Type> {
		let mut types = R::return_types();
		types.push(Type::Error);
		types
	}

	fn into_returns(self) -> Vec<Value> {
		match self {
			Ok(r) => {
				let mut values = r.into_returns();
				values.push(Value::Error(None));
				values
			}
			Err(e) => {
				let mut values: Vec<Value> = R::return_types().iter().map(Type::zero).collect();
				values.push(Value::Error(Some(e.into())));
				values
			}
		}
	}
}

/// Closures usable as method bodies.
///
/// Implemented for `Fn` closures of up to six [`FromValue`] arguments whose
/// output implements [`IntoReturns`]. `Marker` only disambiguates arities.
pub trait IntoMethod<Marker>: Send + Sync + 'static {
	/// Wraps the closure with its derived signature.
	fn into_method(self) -> Method;
}

impl IntoMethod<Method> for Method {
	fn into_method(self) -> Method {
		self
	}
}

macro_rules! closure_method {
	($($arg:ident),*) => {
		impl<F, R, $($arg,)*> IntoMethod<fn($($arg,)*) -> R> for F
		where
			F: Fn($($arg),*) -> R + Send + Sync + 'static,
			R: IntoReturns,
			$($arg: FromValue + 'static,)*
		{
			#[allow(non_snake_case, unused_mut)]
			fn into_method(self) -> Method {
				let args: Vec<Type> = vec![$(<$arg as Typed>::value_type()),*];
				let signature = Signature::new(args, R::return_types());
				Method::from_fn(signature, move |args: Vec<Value>| {
					let mut args = args.into_iter();
					$(
						let Some($arg) = args.next().and_then(<$arg as FromValue>::from_value) else {
							return Err(Error::InvalidArgs(format!(
								"argument of type {} could not be converted",
								<$arg as Typed>::value_type()
							)));
						};
					)*
					Ok(self($($arg),*).into_returns())
				})
			}
		}
	};
}

closure_method!();
closure_method!(A1);
closure_method!(A1, A2);
closure_method!(A1, A2, A3);
closure_method!(A1, A2, A3, A4);
closure_method!(A1, A2, A3, A4, A5);
closure_method!(A1, A2, A3, A4, A5, A6);
