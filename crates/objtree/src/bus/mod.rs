//! Registry root attached to a bus connection.
//!
//! [`BusManager`] owns the root [`Object`] and the [`Subscriptions`] table
//! shared by every node of its tree. The transport sees the tree only
//! through the [`Handler`] it is given at connect time.

mod connection;
mod memory;
#[cfg(test)]
mod tests;

use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use self::connection::{
	Connection, Handler, MatchRule, Message, MessageKind, NameFlags, RequestNameReply, Signal, store,
};
pub use self::memory::{FailAt, MemoryConnection, Request, validate_bus_name};
use crate::config::BusConfig;
use crate::dispatch::{self, TaskClass};
use crate::error::Result;
use crate::object::Object;
use crate::value::{ObjectPath, Value};

/// Notification subscription reference counts, one per `(interface, member)`.
///
/// The transport is asked to start delivery on the first reference and to
/// stop on the last. Transport failures are logged; the counts change even
/// when the transport request fails.
pub struct Subscriptions {
	conn: OnceLock<Arc<dyn Connection>>,
	refs: Mutex<FxHashMap<(String, String), u64>>,
}

impl Subscriptions {
	pub(crate) fn new() -> Self {
		Self {
			conn: OnceLock::new(),
			refs: Mutex::new(FxHashMap::default()),
		}
	}

	fn attach(&self, conn: Arc<dyn Connection>) {
		let _ = self.conn.set(conn);
	}

	pub fn connection(&self) -> Option<&Arc<dyn Connection>> {
		self.conn.get()
	}

	/// Current reference count for `interface.member`.
	pub fn count(&self, interface: &str, member: &str) -> u64 {
		self.refs
			.lock()
			.get(&(interface.to_string(), member.to_string()))
			.copied()
			.unwrap_or(0)
	}

	pub fn add_match_signal(&self, interface: &str, member: &str) {
		let mut refs = self.refs.lock();
		let count = refs.entry((interface.to_string(), member.to_string())).or_insert(0);
		if *count == 0 {
			self.send(interface, member, true);
		}
		*count += 1;
	}

	/// Releases one reference. Releasing an unreferenced pair does nothing.
	pub fn remove_match_signal(&self, interface: &str, member: &str) {
		let mut refs = self.refs.lock();
		let key = (interface.to_string(), member.to_string());
		let Some(count) = refs.get_mut(&key) else {
			return;
		};
		*count -= 1;
		if *count == 0 {
			refs.remove(&key);
			self.send(interface, member, false);
		}
	}

	fn send(&self, interface: &str, member: &str, add: bool) {
		let Some(conn) = self.conn.get() else {
			return;
		};
		let rule = MatchRule::signal(interface, member);
		let result = if add {
			conn.add_match(&rule)
		} else {
			conn.remove_match(&rule)
		};
		match result {
			Ok(()) => debug!(%rule, add, "bus.match"),
			Err(error) => warn!(%rule, add, %error, "bus.match failed"),
		}
	}
}

/// Transport-facing entry points. Holds the root weakly so the connection
/// never keeps the tree alive.
struct BusHandler {
	root: Weak<Object>,
}

impl Handler for BusHandler {
	fn lookup_object(&self, path: &ObjectPath) -> Option<Arc<Object>> {
		self.root.upgrade()?.lookup_object_path(path.clone())
	}

	fn deliver_signal(&self, interface: &str, member: &str, signal: &Signal) {
		if let Some(root) = self.root.upgrade() {
			root.deliver_signal(interface, member, signal);
		}
	}
}

/// Dispatches an inbound call on the blocking pool.
pub fn spawn_call(handler: Arc<dyn Handler>, msg: Arc<Message>) -> JoinHandle<Result<Vec<Value>>> {
	dispatch::spawn_blocking(TaskClass::Call, move || handler.call(msg))
}

/// Root of an object tree exported on a bus connection.
pub struct BusManager {
	root: Arc<Object>,
	handler: Arc<dyn Handler>,
	subscriptions: Arc<Subscriptions>,
	conn: Arc<dyn Connection>,
}

impl BusManager {
	/// Connects without requesting a name.
	///
	/// `connect` receives the handler the transport must route inbound
	/// traffic to. The connection is authenticated and greeted; it is
	/// closed again if either step fails.
	pub fn anonymous<F>(connect: F) -> Result<Self>
	where
		F: FnOnce(Arc<dyn Handler>) -> Result<Arc<dyn Connection>>,
	{
		let subscriptions = Arc::new(Subscriptions::new());
		let root = Object::new_root_on(Arc::clone(&subscriptions));
		let handler: Arc<dyn Handler> = Arc::new(BusHandler {
			root: Arc::downgrade(&root),
		});
		let conn = connect(Arc::clone(&handler))?;
		if let Err(error) = conn.auth().and_then(|()| conn.hello()) {
			close_quietly(&*conn);
			return Err(error);
		}
		subscriptions.attach(Arc::clone(&conn));
		debug!("bus.connected");
		Ok(Self {
			root,
			handler,
			subscriptions,
			conn,
		})
	}

	/// Connects and requests `name`, closing the connection on failure.
	pub fn named<F>(connect: F, name: &str) -> Result<Self>
	where
		F: FnOnce(Arc<dyn Handler>) -> Result<Arc<dyn Connection>>,
	{
		let bus = Self::anonymous(connect)?;
		if let Err(error) = bus.request_name(name) {
			close_quietly(&*bus.conn);
			return Err(error);
		}
		Ok(bus)
	}

	/// Connects as configured and registers the configured objects.
	pub fn from_config<F>(config: &BusConfig, connect: F) -> Result<Self>
	where
		F: FnOnce(Arc<dyn Handler>) -> Result<Arc<dyn Connection>>,
	{
		dispatch::set_worker_threads(config.dispatch.worker_threads);
		let bus = match &config.name {
			Some(name) => Self::named(connect, name)?,
			None => Self::anonymous(connect)?,
		};
		for object in &config.objects {
			object.register(&bus.root)?;
		}
		Ok(bus)
	}

	pub fn request_name(&self, name: &str) -> Result<RequestNameReply> {
		let reply = self.conn.request_name(name, NameFlags::default())?;
		info!(name, ?reply, "bus.request_name");
		Ok(reply)
	}

	pub fn root(&self) -> &Arc<Object> {
		&self.root
	}

	pub fn handler(&self) -> Arc<dyn Handler> {
		Arc::clone(&self.handler)
	}

	pub fn connection(&self) -> &Arc<dyn Connection> {
		&self.conn
	}

	pub fn subscriptions(&self) -> &Arc<Subscriptions> {
		&self.subscriptions
	}

	/// Resolves a path; `/` resolves to the root.
	pub fn lookup_object(&self, path: impl Into<ObjectPath>) -> Option<Arc<Object>> {
		self.root.lookup_object_path(path)
	}

	pub fn call(&self, path: impl Into<ObjectPath>, interface: &str, method: &str, args: Vec<Value>) -> Result<Vec<Value>> {
		let path = path.into();
		let object = self
			.lookup_object(path.clone())
			.ok_or_else(|| crate::Error::UnknownObject(path.to_string()))?;
		object.call(interface, method, args)
	}

	/// Delivers a notification to every matching listener in the tree.
	pub fn deliver_signal(&self, interface: &str, member: &str, signal: &Signal) {
		self.root.deliver_signal(interface, member, signal);
	}

	pub fn close(&self) -> Result<()> {
		self.conn.close()
	}
}

fn close_quietly(conn: &dyn Connection) {
	if let Err(error) = conn.close() {
		warn!(%error, "bus.close failed");
	}
}
