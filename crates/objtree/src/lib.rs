//! In-process service object tree for message buses.
//!
//! Native values are registered at slash-delimited paths and exported under
//! named interfaces. A binding succeeds only when the implementation
//! structurally satisfies the interface's [`Descriptor`]. The tree answers
//! method calls, fans inbound notifications out to listener bindings at any
//! depth and renders introspection documents.
//!
//! ```
//! use objtree::{Descriptor, Object, Table, Type, Value};
//!
//! let root = Object::new_root();
//! let table = Table::new().method("Greet", |name: String| format!("hello, {name}"));
//! let object = root.new_object_from_table("/com/example/Greeter", &table);
//! object
//! 	.implements("com.example.Greeter", &Descriptor::new().with_method("Greet", &[Type::Str], &[Type::Str]))
//! 	.unwrap();
//!
//! let reply = object.call("com.example.Greeter", "Greet", vec![Value::Str("bus".into())]).unwrap();
//! assert_eq!(reply, [Value::Str("hello, bus".into())]);
//! ```
//!
//! Attaching a tree to a transport goes through [`BusManager`], which keeps
//! the reference counts of notification subscriptions.

pub mod bus;
pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod implementation;
pub mod interface;
pub mod introspect;
pub mod method;
pub mod object;
pub mod property;
pub mod value;

pub use bus::{BusManager, Connection, Handler, MemoryConnection, Message, Signal, Subscriptions};
pub use config::BusConfig;
pub use descriptor::{Descriptor, Signature, satisfies};
pub use error::{CallError, Error, Result};
pub use implementation::{Entry, Implementation, Members, Receiver, Table, View};
pub use interface::Interface;
pub use method::{IntoMethod, IntoReturns, Method};
pub use object::Object;
pub use property::Property;
pub use value::{FromValue, IntoValue, ObjectPath, Sender, Type, Typed, Value};
