//! Introspection documents.
//!
//! The document types are plain data. [`xml`] provides the default framing
//! used by the built-in `Introspect` method; transports may render
//! [`Node`] any other way through [`crate::bus::Connection::render_document`].

pub mod xml;

use serde::Serialize;

use crate::descriptor::Signature;
use crate::value::Type;

/// Argument direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
	In,
	Out,
}

impl Direction {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::In => "in",
			Self::Out => "out",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Arg {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Bus signature code.
	#[serde(rename = "type")]
	pub ty: String,
	pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Method {
	pub name: String,
	pub args: Vec<Arg>,
}

impl Method {
	/// Renders a method. Injected caller identities and the trailing error
	/// slot are omitted.
	pub fn from_signature(name: impl Into<String>, signature: &Signature) -> Self {
		let arg = |ty: &Type, direction| Arg {
			name: None,
			ty: ty.signature(),
			direction,
		};
		let args = signature
			.visible_args()
			.map(|ty| arg(ty, Direction::In))
			.chain(signature.visible_returns().iter().map(|ty| arg(ty, Direction::Out)))
			.collect();
		Self { name: name.into(), args }
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Property {
	pub name: String,
	#[serde(rename = "type")]
	pub ty: String,
	pub access: String,
}

impl Property {
	/// Renders a property. Exported fields are always writable.
	pub fn new(name: impl Into<String>, ty: &Type) -> Self {
		Self {
			name: name.into(),
			ty: ty.signature(),
			access: "readwrite".to_string(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interface {
	pub name: String,
	pub methods: Vec<Method>,
	pub properties: Vec<Property>,
}

/// One node of the document tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Node {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	pub interfaces: Vec<Interface>,
	pub children: Vec<Node>,
}

impl Node {
	/// Looks up a direct child by name.
	pub fn child(&self, name: &str) -> Option<&Node> {
		self.children.iter().find(|c| c.name.as_deref() == Some(name))
	}

	/// Looks up an interface by name.
	pub fn interface(&self, name: &str) -> Option<&Interface> {
		self.interfaces.iter().find(|i| i.name == name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn method_hides_sender_and_error_slot() {
		let signature = Signature::new(
			[Type::Sender, Type::Str],
			[Type::Array(Box::new(Type::Str)), Type::Error],
		);
		let method = Method::from_signature("List", &signature);
		let rendered: Vec<_> = method.args.iter().map(|a| (a.ty.as_str(), a.direction)).collect();
		assert_eq!(rendered, [("s", Direction::In), ("as", Direction::Out)]);
	}

	#[test]
	fn property_is_readwrite() {
		let property = Property::new("Count", &Type::UInt32);
		assert_eq!(property.ty, "u");
		assert_eq!(property.access, "readwrite");
	}
}
