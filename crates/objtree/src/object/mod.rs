//! Tree nodes.
//!
//! Every [`Object`] keeps three name-keyed maps: exported interfaces,
//! listener interfaces and children. Each map is published as an immutable
//! snapshot and replaced whole by its writer, so lookups never lock and
//! never see a half-applied change.
//!
//! A node created only to anchor a deeper path has no implementation and is
//! called a placeholder. Placeholders export nothing, render no interfaces
//! and are pruned once they lose their last child.
//!
//! A node that is replaced, deleted or pruned is marked detached under its
//! own children lock. Registrations refuse to insert below a detached node
//! and restart their walk, so a concurrent prune cannot swallow them.

mod cow;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::debug;

use self::cow::CowMap;
use crate::bus::{Connection, Message, Signal, Subscriptions};
use crate::descriptor::Descriptor;
use crate::dispatch::{self, TaskClass};
use crate::error::{Error, Result};
use crate::implementation::{Implementation, Receiver, Table, View};
use crate::interface::Interface;
use crate::introspect::{self, Node};
use crate::value::{ObjectPath, Value};

/// Name of the built-in introspection interface.
pub const INTROSPECTABLE: &str = "org.freedesktop.DBus.Introspectable";
/// Name of the built-in peer interface.
pub const PEER: &str = "org.freedesktop.DBus.Peer";

type Children = CowMap<Arc<Object>>;

/// A node of the object tree.
pub struct Object {
	name: String,
	implementation: Option<Arc<Implementation>>,
	interfaces: CowMap<Interface>,
	listeners: CowMap<Interface>,
	children: Arc<Children>,
	parent: RwLock<Weak<Object>>,
	bus: Option<Arc<Subscriptions>>,
	detached: AtomicBool,
}

impl Object {
	/// Creates a detached root. Listener bindings on this tree never reach a
	/// transport.
	pub fn new_root() -> Arc<Self> {
		Self::create(String::new(), Some(Arc::new(Implementation::empty())), Weak::new(), None, None)
	}

	pub(crate) fn new_root_on(bus: Arc<Subscriptions>) -> Arc<Self> {
		Self::create(String::new(), Some(Arc::new(Implementation::empty())), Weak::new(), Some(bus), None)
	}

	fn create(
		name: String,
		implementation: Option<Arc<Implementation>>,
		parent: Weak<Object>,
		bus: Option<Arc<Subscriptions>>,
		children: Option<Arc<Children>>,
	) -> Arc<Self> {
		Arc::new_cyclic(|this| {
			let object = Self {
				name,
				implementation,
				interfaces: CowMap::new(),
				listeners: CowMap::new(),
				children: children.unwrap_or_else(|| Arc::new(CowMap::new())),
				parent: RwLock::new(parent),
				bus,
				detached: AtomicBool::new(false),
			};
			object.interfaces.update(|map| {
				map.insert(INTROSPECTABLE.to_string(), introspectable(this.clone()));
				map.insert(PEER.to_string(), peer());
			});
			object
		})
	}

	/// Segment name; empty for the root.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Absolute path of this node in its tree.
	pub fn path(&self) -> ObjectPath {
		let mut segments = vec![self.name.clone()];
		let mut cursor = self.parent();
		while let Some(node) = cursor {
			segments.push(node.name.clone());
			cursor = node.parent();
		}
		segments
			.iter()
			.rev()
			.filter(|s| !s.is_empty())
			.fold(ObjectPath::root(), |path, s| path.join(s))
	}

	pub fn parent(&self) -> Option<Arc<Object>> {
		self.parent.read().upgrade()
	}

	pub fn implementation(&self) -> Option<&Arc<Implementation>> {
		self.implementation.as_ref()
	}

	/// Returns true for nodes that only anchor descendants.
	pub fn is_placeholder(&self) -> bool {
		self.implementation.is_none()
	}

	/// Returns true once this node has been replaced or removed from its tree.
	pub fn is_detached(&self) -> bool {
		self.detached.load(Ordering::Acquire)
	}

	/// Marks this node detached if it has no children.
	///
	/// Holds the children lock so no insert can land in between.
	fn detach_if_empty(&self) -> bool {
		self.children.locked(|children| {
			let empty = children.is_empty();
			if empty {
				self.detached.store(true, Ordering::Release);
			}
			empty
		})
	}

	/// Marks this node detached and reports whether it had children.
	fn detach(&self) -> bool {
		self.children.locked(|children| {
			self.detached.store(true, Ordering::Release);
			!children.is_empty()
		})
	}

	pub fn has_children(&self) -> bool {
		!self.children.is_empty()
	}

	/// Children in name order.
	pub fn children(&self) -> Vec<Arc<Object>> {
		let mut children: Vec<_> = self.children.load().values().cloned().collect();
		children.sort_by(|a, b| a.name.cmp(&b.name));
		children
	}

	/// Registers a receiver at `path`, relative to this node.
	pub fn new_object<R: Receiver>(self: &Arc<Self>, path: impl Into<ObjectPath>, receiver: Arc<R>) -> Arc<Object> {
		self.new_object_with(path, Implementation::from_receiver(receiver))
	}

	/// Registers a receiver at `path` with every member name rewritten.
	pub fn new_object_map<R: Receiver>(
		self: &Arc<Self>,
		path: impl Into<ObjectPath>,
		receiver: Arc<R>,
		rename: impl Fn(&str) -> String,
	) -> Arc<Object> {
		self.new_object_with(path, Implementation::from_receiver_map(receiver, rename))
	}

	/// Registers a table of entries at `path`.
	pub fn new_object_from_table(self: &Arc<Self>, path: impl Into<ObjectPath>, table: &Table) -> Arc<Object> {
		self.new_object_with(path, Implementation::from_table(table))
	}

	/// Registers an implementation at `path`.
	///
	/// Missing intermediate nodes are created as placeholders. A node
	/// already at `path` is replaced but its children are kept. The empty
	/// path returns this node unchanged.
	pub fn new_object_with(self: &Arc<Self>, path: impl Into<ObjectPath>, implementation: Implementation) -> Arc<Object> {
		let path = path.into();
		let segments: Vec<&str> = path.segments().collect();
		let implementation = Arc::new(implementation);
		loop {
			if let Some(object) = self.insert_path(&segments, &implementation, false) {
				return object;
			}
			debug!(path = %path, "object.retry");
		}
	}

	/// Walks `segments` and installs `implementation` at the last one.
	///
	/// With `strict`, a detached node refuses the insert and the walk yields
	/// `None`. The starting node is walked non-strict so a caller holding a
	/// detached subtree can still build inside it.
	fn insert_path(
		self: &Arc<Self>,
		segments: &[&str],
		implementation: &Arc<Implementation>,
		strict: bool,
	) -> Option<Arc<Object>> {
		match segments {
			[] => Some(Arc::clone(self)),
			[leaf] => self.replace_child(leaf, Arc::clone(implementation), strict),
			[head, rest @ ..] => self
				.child_or_placeholder(head, strict)?
				.insert_path(rest, implementation, true),
		}
	}

	fn child_or_placeholder(self: &Arc<Self>, name: &str, strict: bool) -> Option<Arc<Object>> {
		if let Some(child) = self.lookup_object(name) {
			return Some(child);
		}
		self.children.update(|children| {
			if strict && self.is_detached() {
				return None;
			}
			let child = children.entry(name.to_string()).or_insert_with(|| {
				debug!(parent = %self.path(), name, "object.placeholder");
				Object::create(name.to_string(), None, Arc::downgrade(self), self.bus.clone(), None)
			});
			Some(Arc::clone(child))
		})
	}

	fn replace_child(self: &Arc<Self>, name: &str, implementation: Arc<Implementation>, strict: bool) -> Option<Arc<Object>> {
		self.children.update(|children| {
			if strict && self.is_detached() {
				return None;
			}
			let previous = children.get(name).cloned();
			let inherited = previous.as_ref().map(|old| Arc::clone(&old.children));
			let child = Object::create(
				name.to_string(),
				Some(implementation),
				Arc::downgrade(self),
				self.bus.clone(),
				inherited,
			);
			if let Some(old) = previous {
				old.detach();
				old.release_listeners();
				child.adopt_children();
			}
			children.insert(name.to_string(), Arc::clone(&child));
			debug!(path = %child.path(), "object.new");
			Some(child)
		})
	}

	/// Points every child's parent link at this node.
	fn adopt_children(self: &Arc<Self>) {
		for child in self.children.load().values() {
			*child.parent.write() = Arc::downgrade(self);
		}
	}

	/// Removes the node at `path`, relative to this node.
	///
	/// A removed node that still has children is replaced by a placeholder
	/// holding them. Placeholders left without children are pruned upwards,
	/// stopping at the root. Unknown paths and the empty path are ignored.
	pub fn delete_object(self: &Arc<Self>, path: impl Into<ObjectPath>) {
		let path = path.into();
		let segments: Vec<&str> = path.segments().collect();
		let Some((leaf, ancestors)) = segments.split_last() else {
			return;
		};
		let Some(parent) = self.lookup_segments(ancestors) else {
			return;
		};
		if parent.lookup_object(leaf).is_some() {
			parent.remove_child(leaf);
		}
	}

	fn remove_child(self: &Arc<Self>, name: &str) {
		self.children.update(|children| {
			let Some(child) = children.get(name).cloned() else {
				return;
			};
			let populated = child.detach();
			child.release_listeners();
			if populated {
				let placeholder = Object::create(
					name.to_string(),
					None,
					Arc::downgrade(self),
					self.bus.clone(),
					Some(Arc::clone(&child.children)),
				);
				placeholder.adopt_children();
				children.insert(name.to_string(), placeholder);
			} else {
				children.remove(name);
			}
			debug!(parent = %self.path(), name, "object.delete");
		});
		self.prune();
	}

	/// Removes this node from its parent if it is a childless placeholder.
	fn prune(self: &Arc<Self>) {
		if !self.is_placeholder() || self.has_children() {
			return;
		}
		let Some(parent) = self.parent() else {
			return;
		};
		let removed = parent.children.update(|children| {
			let current = children.get(&self.name).is_some_and(|c| Arc::ptr_eq(c, self));
			let removed = current && self.detach_if_empty();
			if removed {
				children.remove(&self.name);
			}
			removed
		});
		if removed {
			debug!(parent = %parent.path(), name = %self.name, "object.prune");
			parent.prune();
		}
	}

	/// Looks up a direct child.
	pub fn lookup_object(&self, name: &str) -> Option<Arc<Object>> {
		self.children.get(name)
	}

	/// Looks up a descendant; the empty path resolves to this node.
	pub fn lookup_object_path(self: &Arc<Self>, path: impl Into<ObjectPath>) -> Option<Arc<Object>> {
		let path = path.into();
		let segments: Vec<&str> = path.segments().collect();
		self.lookup_segments(&segments)
	}

	fn lookup_segments(self: &Arc<Self>, segments: &[&str]) -> Option<Arc<Object>> {
		segments
			.iter()
			.try_fold(Arc::clone(self), |node, segment| node.lookup_object(segment))
	}

	/// Looks up an exported interface.
	pub fn lookup_interface(&self, name: &str) -> Option<Interface> {
		self.interfaces.get(name)
	}

	/// Looks up a listener binding.
	pub fn lookup_listener(&self, name: &str) -> Option<Interface> {
		self.listeners.get(name)
	}

	/// Exported interfaces in name order.
	pub fn interfaces(&self) -> Vec<Interface> {
		let mut out: Vec<_> = self.interfaces.load().values().cloned().collect();
		out.sort_by(|a, b| a.name().cmp(b.name()));
		out
	}

	fn bind(&self, name: &str, required: &Descriptor) -> Result<Interface> {
		let implementation = self
			.implementation
			.as_ref()
			.ok_or_else(|| Error::NotImplemented(name.to_string()))?;
		let view = implementation
			.as_interface(required)
			.map_err(|_| Error::NotImplemented(name.to_string()))?;
		Ok(Interface::new(name, view))
	}

	/// Exports this node's implementation as interface `name`.
	///
	/// Fails with [`Error::NotImplemented`] and changes nothing if the
	/// implementation does not satisfy `required`.
	pub fn implements(&self, name: &str, required: &Descriptor) -> Result<()> {
		let interface = self.bind(name, required)?;
		self.interfaces.update(|map| map.insert(name.to_string(), interface));
		debug!(path = %self.path(), interface = name, "object.implements");
		Ok(())
	}

	/// [`Object::implements`] with every required member name rewritten.
	pub fn implements_map(&self, name: &str, required: &Descriptor, rename: impl Fn(&str) -> String) -> Result<()> {
		self.implements(name, &required.rename(rename))
	}

	/// [`Object::implements`] with the requirement derived from a table.
	pub fn implements_table(&self, name: &str, table: &Table) -> Result<()> {
		self.implements(name, &Descriptor::from_table(table))
	}

	/// Registers this node as a listener for notifications of interface `name`.
	///
	/// Matching follows [`Object::implements`]. On a bus, each member of the
	/// binding takes one subscription reference; a binding it replaces gives
	/// its references back afterwards. A detached node takes no references
	/// and fails with [`Error::UnknownObject`].
	pub fn receives(&self, name: &str, required: &Descriptor) -> Result<()> {
		let interface = self.bind(name, required)?;
		self.listeners.update(|map| {
			if self.is_detached() {
				return Err(Error::UnknownObject(self.path().to_string()));
			}
			if let Some(bus) = &self.bus {
				for member in interface.methods() {
					bus.add_match_signal(name, member);
				}
			}
			let previous = map.insert(name.to_string(), interface);
			if let (Some(bus), Some(previous)) = (&self.bus, previous) {
				for member in previous.methods() {
					bus.remove_match_signal(name, member);
				}
			}
			Ok(())
		})?;
		debug!(path = %self.path(), interface = name, "object.receives");
		Ok(())
	}

	/// [`Object::receives`] with every required member name rewritten.
	pub fn receives_map(&self, name: &str, required: &Descriptor, rename: impl Fn(&str) -> String) -> Result<()> {
		self.receives(name, &required.rename(rename))
	}

	/// [`Object::receives`] with the requirement derived from a table.
	pub fn receives_table(&self, name: &str, table: &Table) -> Result<()> {
		self.receives(name, &Descriptor::from_table(table))
	}

	/// Drops every listener binding, giving back its subscriptions.
	///
	/// Callers detach the node first so no binding can follow.
	fn release_listeners(&self) {
		self.listeners.update(|map| {
			if let Some(bus) = &self.bus {
				for (name, interface) in map.iter() {
					for member in interface.methods() {
						bus.remove_match_signal(name, member);
					}
				}
			}
			map.clear();
		});
	}

	/// Calls `method` of exported interface `interface`.
	pub fn call(&self, interface: &str, method: &str, args: Vec<Value>) -> Result<Vec<Value>> {
		let iface = self
			.lookup_interface(interface)
			.ok_or_else(|| Error::UnknownInterface(interface.to_string()))?;
		let handle = iface.lookup_method(method).ok_or_else(|| Error::UnknownMethod {
			interface: interface.to_string(),
			method: method.to_string(),
		})?;
		handle.call(args)
	}

	/// Decodes and calls an inbound method call message.
	///
	/// Without an interface in the message, exported interfaces are searched
	/// in name order for the member.
	pub fn dispatch(&self, msg: Arc<Message>) -> Result<Vec<Value>> {
		let (interface, mut method) = match &msg.interface {
			Some(name) => {
				let iface = self
					.lookup_interface(name)
					.ok_or_else(|| Error::UnknownInterface(name.clone()))?;
				let method = iface.lookup_method(&msg.member).ok_or_else(|| Error::UnknownMethod {
					interface: name.clone(),
					method: msg.member.clone(),
				})?;
				(name.clone(), method)
			}
			None => self
				.interfaces()
				.into_iter()
				.find_map(|iface| Some((iface.name().to_string(), iface.lookup_method(&msg.member)?)))
				.ok_or_else(|| Error::UnknownMethod {
					interface: String::new(),
					method: msg.member.clone(),
				})?,
		};
		let sender = msg.sender.clone().unwrap_or_default();
		let args = method.decode_arguments(self.connection(), &sender, Arc::clone(&msg))?;
		debug!(path = %msg.path, %interface, member = %msg.member, "object.dispatch");
		method.call(args)
	}

	fn connection(&self) -> Option<&dyn Connection> {
		self.bus.as_ref()?.connection().map(|conn| &**conn)
	}

	/// Delivers a notification to this node and every descendant.
	///
	/// A listener bound under `interface` with a `member` method is invoked
	/// on the blocking pool; the walk does not wait for it and its outcome is
	/// only logged.
	pub fn deliver_signal(&self, interface: &str, member: &str, signal: &Signal) {
		if let Some(mut method) = self.lookup_listener(interface).and_then(|l| l.lookup_method(member)) {
			let msg = Arc::new(signal.to_message(interface, member));
			let conn = self.bus.as_ref().and_then(|bus| bus.connection().cloned());
			let path = self.path();
			let sender = signal.sender.clone();
			let interface = interface.to_string();
			let member = member.to_string();
			let _ = dispatch::spawn_blocking(TaskClass::Listener, move || {
				let result = method
					.decode_arguments(conn.as_deref(), &sender, msg)
					.and_then(|args| method.call(args));
				if let Err(error) = result {
					debug!(%path, %interface, %member, %error, "object.listener failed");
				}
			});
		}
		for child in self.children.load().values() {
			child.deliver_signal(interface, member, signal);
		}
	}

	/// Renders the introspection document of this subtree.
	///
	/// Placeholders render no interfaces. Interfaces and children are
	/// ordered by name.
	pub fn introspect(&self) -> Node {
		let interfaces = if self.is_placeholder() {
			Vec::new()
		} else {
			self.interfaces().iter().map(Interface::introspect).collect()
		};
		Node {
			name: (!self.name.is_empty()).then(|| self.name.clone()),
			interfaces,
			children: self.children().iter().map(|c| c.introspect()).collect(),
		}
	}

	/// Renders the document returned by the built-in `Introspect` method.
	/// The top node is unnamed.
	pub fn introspect_xml(&self) -> String {
		let mut node = self.introspect();
		node.name = None;
		match self.connection() {
			Some(conn) => conn.render_document(&node),
			None => introspect::xml::render(&node),
		}
	}
}

impl fmt::Debug for Object {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Object")
			.field("name", &self.name)
			.field("placeholder", &self.is_placeholder())
			.field("interfaces", &self.interfaces.load().len())
			.field("listeners", &self.listeners.load().len())
			.field("children", &self.children.load().len())
			.finish()
	}
}

fn builtin(name: &str, table: &Table) -> Interface {
	Interface::new(name, View::full(Arc::new(Implementation::from_table(table))))
}

fn introspectable(this: Weak<Object>) -> Interface {
	let table = Table::new().method("Introspect", move || {
		this.upgrade().map(|object| object.introspect_xml()).unwrap_or_default()
	});
	builtin(INTROSPECTABLE, &table)
}

fn peer() -> Interface {
	let table = Table::new().method("Ping", || {}).method("GetMachineId", String::new);
	builtin(PEER, &table)
}
