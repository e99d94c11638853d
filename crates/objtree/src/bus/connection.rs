//! Transport collaborator traits and message types.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::introspect::{self, Node};
use crate::object::Object;
use crate::value::{ObjectPath, Type, Value};

/// Kind of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
	MethodCall,
	Signal,
}

/// An inbound message, as handed over by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
	pub kind: MessageKind,
	pub sender: Option<String>,
	pub path: ObjectPath,
	pub interface: Option<String>,
	pub member: String,
	pub body: Vec<Value>,
}

impl Message {
	pub fn method_call(path: impl Into<ObjectPath>, interface: impl Into<String>, member: impl Into<String>) -> Self {
		Self {
			kind: MessageKind::MethodCall,
			sender: None,
			path: path.into(),
			interface: Some(interface.into()),
			member: member.into(),
			body: Vec::new(),
		}
	}

	pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
		self.sender = Some(sender.into());
		self
	}

	pub fn with_body(mut self, body: Vec<Value>) -> Self {
		self.body = body;
		self
	}
}

/// An inbound notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
	pub sender: String,
	pub path: ObjectPath,
	/// Fully qualified member name, `interface.member`.
	pub name: String,
	pub body: Vec<Value>,
}

impl Signal {
	pub fn new(sender: impl Into<String>, path: impl Into<ObjectPath>, name: impl Into<String>, body: Vec<Value>) -> Self {
		Self {
			sender: sender.into(),
			path: path.into(),
			name: name.into(),
			body,
		}
	}

	/// Splits `name` into interface and member at the last dot.
	pub fn interface_and_member(&self) -> Option<(&str, &str)> {
		self.name.rsplit_once('.')
	}

	pub(crate) fn to_message(&self, interface: &str, member: &str) -> Message {
		Message {
			kind: MessageKind::Signal,
			sender: Some(self.sender.clone()),
			path: self.path.clone(),
			interface: Some(interface.to_string()),
			member: member.to_string(),
			body: self.body.clone(),
		}
	}
}

/// Subscription filter for one notification member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchRule {
	pub interface: String,
	pub member: String,
}

impl MatchRule {
	pub fn signal(interface: impl Into<String>, member: impl Into<String>) -> Self {
		Self {
			interface: interface.into(),
			member: member.into(),
		}
	}
}

impl fmt::Display for MatchRule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "type='signal',interface='{}',member='{}'", self.interface, self.member)
	}
}

/// Name request flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NameFlags {
	pub allow_replacement: bool,
	pub replace_existing: bool,
	pub do_not_queue: bool,
}

/// Outcome of a name request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestNameReply {
	PrimaryOwner,
	InQueue,
	Exists,
	AlreadyOwner,
}

/// The bus connection consumed by the tree.
///
/// Implementations own authentication, framing and name registration.
/// Every method is called synchronously from the thread mutating the tree.
pub trait Connection: Send + Sync + 'static {
	fn auth(&self) -> Result<()> {
		Ok(())
	}

	fn hello(&self) -> Result<()> {
		Ok(())
	}

	fn request_name(&self, name: &str, flags: NameFlags) -> Result<RequestNameReply>;

	/// Starts delivery of notifications matching `rule`.
	fn add_match(&self, rule: &MatchRule) -> Result<()>;

	/// Stops delivery of notifications matching `rule`.
	fn remove_match(&self, rule: &MatchRule) -> Result<()>;

	fn close(&self) -> Result<()> {
		Ok(())
	}

	/// Decodes message values into the declared types.
	///
	/// Any failure must be reported as [`Error::InvalidArgs`].
	fn store(&self, body: &[Value], types: &[Type]) -> Result<Vec<Value>> {
		store(body, types)
	}

	/// Frames an introspection document.
	fn render_document(&self, node: &Node) -> String {
		introspect::xml::render(node)
	}
}

/// Structural decode used when the transport has no decoder of its own.
pub fn store(body: &[Value], types: &[Type]) -> Result<Vec<Value>> {
	if body.len() != types.len() {
		return Err(Error::InvalidArgs(format!("expected {} values, got {}", types.len(), body.len())));
	}
	body.iter()
		.zip(types)
		.map(|(value, ty)| {
			value
				.clone()
				.conform(ty)
				.ok_or_else(|| Error::InvalidArgs(format!("cannot store {} as {ty}", value.type_of())))
		})
		.collect()
}

/// The entry points exposed to the transport.
pub trait Handler: Send + Sync + 'static {
	/// Resolves a path to a dispatchable object.
	fn lookup_object(&self, path: &ObjectPath) -> Option<Arc<Object>>;

	/// Delivers one inbound notification into the tree.
	fn deliver_signal(&self, interface: &str, member: &str, signal: &Signal);

	/// Resolves and dispatches an inbound method call.
	fn call(&self, msg: Arc<Message>) -> Result<Vec<Value>> {
		let object = self
			.lookup_object(&msg.path)
			.ok_or_else(|| Error::UnknownObject(msg.path.to_string()))?;
		object.dispatch(msg)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn match_rule_renders_signal_filter() {
		let rule = MatchRule::signal("com.example.Events", "Changed");
		assert_eq!(rule.to_string(), "type='signal',interface='com.example.Events',member='Changed'");
	}

	#[test]
	fn store_conforms_each_value() {
		let out = store(
			&[Value::Variant(Box::new(Value::UInt32(3))), Value::Str("x".into())],
			&[Type::UInt32, Type::Variant],
		)
		.unwrap();
		assert_eq!(out, [Value::UInt32(3), Value::Variant(Box::new(Value::Str("x".into())))]);
	}

	#[test]
	fn store_reports_invalid_args() {
		assert!(matches!(store(&[Value::Bool(true)], &[Type::Str]), Err(Error::InvalidArgs(_))));
		assert!(matches!(store(&[], &[Type::Str]), Err(Error::InvalidArgs(_))));
	}

	#[test]
	fn signal_splits_qualified_name() {
		let signal = Signal::new(":1.1", "/", "com.example.Events.Changed", vec![]);
		assert_eq!(signal.interface_and_member(), Some(("com.example.Events", "Changed")));
	}
}
