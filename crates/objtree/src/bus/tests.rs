use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use super::*;
use crate::error::Error;
use crate::implementation::Table;

fn connect(conn: &Arc<MemoryConnection>) -> impl FnOnce(Arc<dyn Handler>) -> Result<Arc<dyn Connection>> {
	let conn = Arc::clone(conn);
	move |_handler| Ok(conn as Arc<dyn Connection>)
}

fn call_me() -> Table {
	Table::new().method("CallMe", || "hello, world")
}

fn listener() -> Table {
	Table::new().method("CallMe", |_: String| {})
}

#[test]
fn named_manager_serves_calls() {
	let conn = MemoryConnection::new();
	let bus = BusManager::named(connect(&conn), "com.example.objtree.Test").unwrap();
	let obj = bus.root().new_object_from_table("/foo/bar/call", &call_me());
	obj.implements_table("foo", &call_me()).unwrap();
	assert_eq!(
		bus.call("/foo/bar/call", "foo", "CallMe", vec![]).unwrap(),
		[Value::Str("hello, world".into())]
	);
	assert!(conn.owns_name("com.example.objtree.Test"));
	assert_eq!(
		conn.requests()[..3],
		[Request::Auth, Request::Hello, Request::RequestName("com.example.objtree.Test".into())]
	);
}

#[test]
fn bogus_name_closes_connection() {
	let conn = MemoryConnection::new();
	let err = BusManager::named(connect(&conn), "foo").err().unwrap();
	assert!(matches!(err, Error::Transport(_)));
	assert!(conn.is_closed());
}

#[test]
fn failed_handshake_closes_connection() {
	for stage in [FailAt::Auth, FailAt::Hello] {
		let conn = MemoryConnection::failing(stage);
		assert!(BusManager::anonymous(connect(&conn)).is_err());
		assert!(conn.is_closed());
	}
}

#[test]
fn anonymous_manager_can_request_name_later() {
	let conn = MemoryConnection::new();
	let bus = BusManager::anonymous(connect(&conn)).unwrap();
	assert!(!conn.owns_name("com.example.Late"));
	assert_eq!(bus.request_name("com.example.Late").unwrap(), RequestNameReply::PrimaryOwner);
	assert!(conn.owns_name("com.example.Late"));
}

#[test]
fn lookup_and_call_errors() {
	let conn = MemoryConnection::new();
	let bus = BusManager::anonymous(connect(&conn)).unwrap();
	assert!(Arc::ptr_eq(&bus.lookup_object("/").unwrap(), bus.root()));
	assert!(bus.lookup_object("/missing").is_none());
	assert!(matches!(
		bus.call("/missing", "foo", "CallMe", vec![]),
		Err(Error::UnknownObject(path)) if path == "/missing"
	));
}

#[test]
fn shared_subscription_is_counted_once() {
	let conn = MemoryConnection::new();
	let bus = BusManager::anonymous(connect(&conn)).unwrap();
	let table = listener();
	for path in ["/a", "/b", "/c/d"] {
		bus.root().new_object_from_table(path, &table).receives_table("foo", &table).unwrap();
	}
	assert_eq!(bus.subscriptions().count("foo", "CallMe"), 3);
	assert_eq!(conn.add_match_count("foo", "CallMe"), 1);

	bus.root().delete_object("/a");
	bus.root().delete_object("/c/d");
	assert_eq!(conn.remove_match_count("foo", "CallMe"), 0);
	bus.root().delete_object("/b");
	assert_eq!(bus.subscriptions().count("foo", "CallMe"), 0);
	assert_eq!(conn.add_match_count("foo", "CallMe"), 1);
	assert_eq!(conn.remove_match_count("foo", "CallMe"), 1);
}

#[test]
fn rebinding_listener_does_not_resubscribe() {
	let conn = MemoryConnection::new();
	let bus = BusManager::anonymous(connect(&conn)).unwrap();
	let table = listener();
	let obj = bus.root().new_object_from_table("/a", &table);
	obj.receives_table("foo", &table).unwrap();
	obj.receives_table("foo", &table).unwrap();
	assert_eq!(bus.subscriptions().count("foo", "CallMe"), 1);
	assert_eq!(conn.add_match_count("foo", "CallMe"), 1);
	assert_eq!(conn.remove_match_count("foo", "CallMe"), 0);
}

#[test]
fn replacing_a_node_releases_its_listeners() {
	let conn = MemoryConnection::new();
	let bus = BusManager::anonymous(connect(&conn)).unwrap();
	let table = listener();
	bus.root().new_object_from_table("/a", &table).receives_table("foo", &table).unwrap();
	bus.root().new_object_from_table("/a", &table);
	assert_eq!(bus.subscriptions().count("foo", "CallMe"), 0);
	assert_eq!(conn.remove_match_count("foo", "CallMe"), 1);
}

#[test]
fn replaced_node_takes_no_subscription() {
	let conn = MemoryConnection::new();
	let bus = BusManager::anonymous(connect(&conn)).unwrap();
	let table = listener();
	let old = bus.root().new_object_from_table("/a", &table);
	bus.root().new_object_from_table("/a", &table);
	assert!(matches!(old.receives_table("foo", &table), Err(Error::UnknownObject(_))));
	assert_eq!(bus.subscriptions().count("foo", "CallMe"), 0);
	assert_eq!(conn.add_match_count("foo", "CallMe"), 0);
}

#[test]
fn listener_racing_replacement_is_released() {
	let conn = MemoryConnection::new();
	let bus = BusManager::anonymous(connect(&conn)).unwrap();
	let table = listener();
	for _ in 0..500 {
		let old = bus.root().new_object_from_table("/a", &table);
		let start = Arc::new(Barrier::new(2));
		let listen = {
			let start = Arc::clone(&start);
			let table = table.clone();
			thread::spawn(move || {
				start.wait();
				let _ = old.receives_table("foo", &table);
			})
		};
		start.wait();
		bus.root().new_object_from_table("/a", &table);
		listen.join().unwrap();
		assert_eq!(bus.subscriptions().count("foo", "CallMe"), 0);
	}
	assert_eq!(conn.add_match_count("foo", "CallMe"), conn.remove_match_count("foo", "CallMe"));
}

#[test]
fn unbalanced_release_is_ignored() {
	let subscriptions = Subscriptions::new();
	subscriptions.remove_match_signal("foo", "CallMe");
	assert_eq!(subscriptions.count("foo", "CallMe"), 0);
}

#[test]
fn counts_change_when_transport_fails() {
	let conn = MemoryConnection::new();
	let bus = BusManager::anonymous(connect(&conn)).unwrap();
	bus.close().unwrap();
	let table = listener();
	bus.root().new_object_from_table("/a", &table).receives_table("foo", &table).unwrap();
	assert_eq!(bus.subscriptions().count("foo", "CallMe"), 1);
}

#[test]
fn handler_resolves_and_dispatches() {
	let conn = MemoryConnection::new();
	let bus = BusManager::anonymous(connect(&conn)).unwrap();
	let obj = bus.root().new_object_from_table("/svc", &call_me());
	obj.implements_table("foo", &call_me()).unwrap();
	let handler = bus.handler();
	assert!(handler.lookup_object(&ObjectPath::from("/svc")).is_some());
	let msg = Arc::new(Message::method_call("/svc", "foo", "CallMe"));
	assert_eq!(handler.call(msg).unwrap(), [Value::Str("hello, world".into())]);
	let missing = Arc::new(Message::method_call("/nope", "foo", "CallMe"));
	assert!(matches!(handler.call(missing), Err(Error::UnknownObject(_))));
}

#[test]
fn handler_does_not_keep_tree_alive() {
	let conn = MemoryConnection::new();
	let bus = BusManager::anonymous(connect(&conn)).unwrap();
	let handler = bus.handler();
	drop(bus);
	assert!(handler.lookup_object(&ObjectPath::root()).is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn manager_delivers_signals_through_handler() {
	let conn = MemoryConnection::new();
	let bus = BusManager::anonymous(connect(&conn)).unwrap();
	let (tx, mut rx) = mpsc::unbounded_channel();
	let table = Table::new().method("Changed", move |v: u32| {
		let _ = tx.send(v);
	});
	bus.root().new_object_from_table("/x/y", &table).receives_table("com.example.Events", &table).unwrap();

	let signal = Signal::new(":1.3", "/origin", "com.example.Events.Changed", vec![Value::UInt32(9)]);
	let (iface, member) = signal.interface_and_member().unwrap();
	bus.handler().deliver_signal(iface, member, &signal);
	let got = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
	assert_eq!(got, Some(9));
}

#[tokio::test(flavor = "multi_thread")]
async fn spawned_call_returns_result() {
	let conn = MemoryConnection::new();
	let bus = BusManager::anonymous(connect(&conn)).unwrap();
	bus.root().new_object_from_table("/svc", &call_me()).implements_table("foo", &call_me()).unwrap();
	let msg = Arc::new(Message::method_call("/svc", "foo", "CallMe"));
	let out = spawn_call(bus.handler(), msg).await.unwrap().unwrap();
	assert_eq!(out, [Value::Str("hello, world".into())]);
}

#[test]
fn from_config_registers_objects() {
	let config = BusConfig::from_toml_str(
		r#"
name = "com.example.Configured"

[[objects]]
path = "/settings"
interface = "com.example.Settings"
properties = { Level = 3 }
"#,
	)
	.unwrap();
	let conn = MemoryConnection::new();
	let bus = BusManager::from_config(&config, connect(&conn)).unwrap();
	assert!(conn.owns_name("com.example.Configured"));
	let obj = bus.lookup_object("/settings").unwrap();
	let level = obj.lookup_interface("com.example.Settings").unwrap().lookup_property("Level").unwrap();
	assert_eq!(level.get(), Value::Int64(3));
}
