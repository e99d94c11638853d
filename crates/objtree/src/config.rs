//! TOML configuration for a bus-attached tree.
//!
//! ```toml
//! name = "com.example.Service"
//! bus = "memory"
//!
//! [dispatch]
//! worker_threads = 4
//!
//! [[objects]]
//! path = "/com/example/Settings"
//! interface = "com.example.Settings"
//! properties = { Volume = 11, Muted = false }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::implementation::Table;
use crate::object::Object;
use crate::property::Property;
use crate::value::{ObjectPath, Type, Value};

/// Which bus to connect to. Connecting is up to the caller's transport.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
	/// In-process loopback.
	#[default]
	Memory,
	Session,
	System,
	/// Explicit transport address.
	Address(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
	/// Worker threads of the fallback runtime used outside tokio.
	pub worker_threads: usize,
}

impl Default for DispatchConfig {
	fn default() -> Self {
		Self { worker_threads: 2 }
	}
}

/// One object registered at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectConfig {
	pub path: String,
	/// Interface the properties are exported under.
	pub interface: String,
	#[serde(default)]
	pub properties: BTreeMap<String, toml::Value>,
}

impl ObjectConfig {
	/// Converts the configured properties into table fields.
	pub fn to_table(&self) -> Result<Table> {
		self.properties.iter().try_fold(Table::new(), |table, (name, raw)| {
			let value = toml_to_value(raw).ok_or_else(|| {
				Error::Config(format!("{}: unsupported value for property {name}", self.path))
			})?;
			Ok(table.field(name.clone(), Property::from_value(value)))
		})
	}

	/// Registers the object under `root` and exports its interface.
	///
	/// The root path is refused; the root always keeps its empty
	/// implementation.
	pub fn register(&self, root: &Arc<Object>) -> Result<Arc<Object>> {
		if ObjectPath::from(self.path.as_str()).is_root() {
			return Err(Error::Config(format!(
				"{}: objects cannot be registered at the root path",
				self.path
			)));
		}
		let table = self.to_table()?;
		let object = root.new_object_from_table(self.path.as_str(), &table);
		object.implements_table(&self.interface, &table)?;
		Ok(object)
	}
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
	pub bus: BusKind,
	/// Well-known name to request after connecting.
	pub name: Option<String>,
	pub dispatch: DispatchConfig,
	pub objects: Vec<ObjectConfig>,
}

impl BusConfig {
	pub fn from_toml_str(text: &str) -> Result<Self> {
		toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path)
			.map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
		Self::from_toml_str(&text)
	}
}

/// Maps TOML scalars, homogeneous arrays and tables onto bus values.
///
/// Tables become `a{sv}` dictionaries. Datetimes and mixed arrays have no
/// mapping.
fn toml_to_value(raw: &toml::Value) -> Option<Value> {
	Some(match raw {
		toml::Value::String(s) => Value::Str(s.clone()),
		toml::Value::Integer(i) => Value::Int64(*i),
		toml::Value::Float(f) => Value::Double(*f),
		toml::Value::Boolean(b) => Value::Bool(*b),
		toml::Value::Array(items) => {
			let items = items.iter().map(toml_to_value).collect::<Option<Vec<_>>>()?;
			let elem = match items.first() {
				Some(first) => first.type_of(),
				None => Type::Variant,
			};
			if items.iter().any(|item| item.type_of() != elem) {
				return None;
			}
			Value::Array(elem, items)
		}
		toml::Value::Table(table) => Value::Dict(
			Type::Str,
			Type::Variant,
			table
				.iter()
				.map(|(k, v)| Some((Value::Str(k.clone()), Value::Variant(Box::new(toml_to_value(v)?)))))
				.collect::<Option<Vec<_>>>()?,
		),
		toml::Value::Datetime(_) => return None,
	})
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use pretty_assertions::assert_eq;

	use super::*;

	const SAMPLE: &str = r#"
name = "com.example.Service"
bus = "session"

[dispatch]
worker_threads = 4

[[objects]]
path = "/com/example/Settings"
interface = "com.example.Settings"
properties = { Volume = 11, Muted = false, Tags = ["a", "b"] }
"#;

	#[test]
	fn parses_full_config() {
		let config = BusConfig::from_toml_str(SAMPLE).unwrap();
		assert_eq!(config.bus, BusKind::Session);
		assert_eq!(config.name.as_deref(), Some("com.example.Service"));
		assert_eq!(config.dispatch.worker_threads, 4);
		assert_eq!(config.objects.len(), 1);
		assert_eq!(config.objects[0].interface, "com.example.Settings");
	}

	#[test]
	fn defaults_apply_to_empty_config() {
		let config = BusConfig::from_toml_str("").unwrap();
		assert_eq!(config, BusConfig::default());
		assert_eq!(config.bus, BusKind::Memory);
		assert_eq!(config.dispatch.worker_threads, 2);
	}

	#[test]
	fn address_bus_kind() {
		let config = BusConfig::from_toml_str(r#"bus = { address = "unix:path=/tmp/bus" }"#).unwrap();
		assert_eq!(config.bus, BusKind::Address("unix:path=/tmp/bus".into()));
	}

	#[test]
	fn unknown_keys_are_rejected() {
		assert!(matches!(BusConfig::from_toml_str("colour = 1"), Err(Error::Config(_))));
	}

	#[test]
	fn properties_become_typed_fields() {
		let config = BusConfig::from_toml_str(SAMPLE).unwrap();
		let table = config.objects[0].to_table().unwrap();
		let types: Vec<_> = table
			.iter()
			.map(|(name, entry)| match entry {
				crate::implementation::Entry::Field(p) => (name.to_string(), p.value_type().signature()),
				_ => panic!("unexpected entry {name}"),
			})
			.collect();
		assert_eq!(
			types,
			[
				("Muted".to_string(), "b".to_string()),
				("Tags".to_string(), "as".to_string()),
				("Volume".to_string(), "x".to_string()),
			]
		);
	}

	#[test]
	fn mixed_arrays_are_rejected() {
		let config = BusConfig::from_toml_str(
			r#"
[[objects]]
path = "/x"
interface = "com.example.X"
properties = { Mixed = [1, "a"] }
"#,
		)
		.unwrap();
		assert!(matches!(config.objects[0].to_table(), Err(Error::Config(_))));
	}

	#[test]
	fn load_reads_from_disk() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(SAMPLE.as_bytes()).unwrap();
		let config = BusConfig::load(file.path()).unwrap();
		assert_eq!(config.objects[0].path, "/com/example/Settings");
		assert!(matches!(BusConfig::load("/nonexistent/objtree.toml"), Err(Error::Config(_))));
	}

	#[test]
	fn register_exports_properties() {
		let config = BusConfig::from_toml_str(SAMPLE).unwrap();
		let root = Object::new_root();
		let object = config.objects[0].register(&root).unwrap();
		let iface = object.lookup_interface("com.example.Settings").unwrap();
		let volume = iface.lookup_property("Volume").unwrap();
		assert_eq!(volume.get(), Value::Int64(11));
		assert!(root.lookup_object_path("/com/example/Settings").is_some());
	}

	#[test]
	fn register_refuses_root_path() {
		let config = BusConfig::from_toml_str(
			r#"
[[objects]]
path = "/"
interface = "com.example.Root"
properties = { Volume = 11 }
"#,
		)
		.unwrap();
		let root = Object::new_root();
		let err = config.objects[0].register(&root).unwrap_err();
		assert!(matches!(&err, Error::Config(msg) if msg.contains("root path")));
		assert!(root.lookup_interface("com.example.Root").is_none());
	}
}
