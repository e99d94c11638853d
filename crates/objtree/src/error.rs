//! Error taxonomy for tree dispatch, binding and field access.

use std::fmt;

use crate::value::{Type, Value};

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure payload returned by an operation through its trailing error slot.
///
/// `name` follows the bus error-name convention (`org.example.Error.Thing`);
/// `message` is the human readable body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallError {
	/// Error name.
	pub name: String,
	/// Error message body.
	pub message: String,
}

impl CallError {
	/// Generic error name used when an operation does not supply one.
	pub const FAILED: &'static str = "org.freedesktop.DBus.Error.Failed";

	/// Creates a call error with an explicit name.
	pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			message: message.into(),
		}
	}

	/// Creates a call error with the generic failure name.
	pub fn failed(message: impl Into<String>) -> Self {
		Self::new(Self::FAILED, message)
	}
}

impl fmt::Display for CallError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.message.is_empty() {
			f.write_str(&self.name)
		} else {
			write!(f, "{}: {}", self.name, self.message)
		}
	}
}

impl From<String> for CallError {
	fn from(message: String) -> Self {
		Self::failed(message)
	}
}

impl From<&str> for CallError {
	fn from(message: &str) -> Self {
		Self::failed(message)
	}
}

/// Possible errors.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// No object is registered at the requested path.
	#[error("no such object: {0}")]
	UnknownObject(String),
	/// The object exports no interface of that name.
	#[error("unknown interface: {0}")]
	UnknownInterface(String),
	/// The interface has no method of that name.
	#[error("unknown method: {interface}.{method}")]
	UnknownMethod {
		/// Interface that was searched.
		interface: String,
		/// Missing method name.
		method: String,
	},
	/// The implementation does not structurally satisfy the requested interface.
	#[error("object does not implement interface {0}")]
	NotImplemented(String),
	/// Argument count or structure did not match the method signature.
	#[error("invalid arguments: {0}")]
	InvalidArgs(String),
	/// A property was assigned a value of a different type.
	#[error("type mismatch: expected {expected}, got {actual}")]
	TypeMismatch {
		/// Declared property type.
		expected: Type,
		/// Type of the rejected value.
		actual: Type,
	},
	/// The method ran and reported failure through its trailing error return.
	#[error("{error}")]
	Failed {
		/// The failure payload.
		error: CallError,
		/// Remaining return values, delivered alongside the failure.
		values: Vec<Value>,
	},
	/// The transport collaborator rejected a request.
	#[error("transport error: {0}")]
	Transport(String),
	/// Configuration could not be loaded.
	#[error("config error: {0}")]
	Config(String),
}

impl Error {
	/// Returns true for errors raised before the method body ran.
	///
	/// [`Error::Failed`] is the only variant produced by a completed call.
	pub fn is_dispatch_error(&self) -> bool {
		!matches!(self, Self::Failed { .. })
	}

	/// Bus error name for replying to a remote caller.
	pub fn bus_name(&self) -> &str {
		match self {
			Self::UnknownObject(_) => "org.freedesktop.DBus.Error.UnknownObject",
			Self::UnknownInterface(_) => "org.freedesktop.DBus.Error.UnknownInterface",
			Self::UnknownMethod { .. } => "org.freedesktop.DBus.Error.UnknownMethod",
			Self::InvalidArgs(_) | Self::TypeMismatch { .. } => {
				"org.freedesktop.DBus.Error.InvalidArgs"
			}
			Self::Failed { error, .. } => &error.name,
			Self::NotImplemented(_) | Self::Transport(_) | Self::Config(_) => CallError::FAILED,
		}
	}
}
