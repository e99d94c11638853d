//! Object tree inspector.
//!
//! Loads a bus configuration, builds its tree on the in-process loopback
//! transport and prints introspection documents, property values or call
//! replies.

mod parse;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use objtree::config::BusKind;
use objtree::{BusConfig, BusManager, Connection, Handler, MemoryConnection};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Inspector command line arguments.
#[derive(Parser, Debug)]
#[command(name = "objtree-inspect")]
#[command(about = "Inspect a configured service object tree")]
struct Args {
	/// Configuration file
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Print the introspection document of a path
	Introspect {
		#[arg(default_value = "/")]
		path: String,
		#[arg(short, long, value_enum, default_value_t = Format::Xml)]
		format: Format,
	},
	/// Read a property
	Get { path: String, interface: String, property: String },
	/// Call a method, parsing each argument against its declared type
	Call {
		path: String,
		interface: String,
		method: String,
		args: Vec<String>,
	},
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
	Xml,
	Toml,
}

#[derive(Debug, thiserror::Error)]
enum InspectError {
	#[error(transparent)]
	Tree(#[from] objtree::Error),
	#[error("only the memory bus is supported, got {0:?}")]
	UnsupportedBus(BusKind),
	#[error("no such object: {0}")]
	NoObject(String),
	#[error("{0}.{1} not found")]
	NoMember(String, String),
	#[error(transparent)]
	Parse(#[from] parse::ParseError),
	#[error(transparent)]
	Render(#[from] toml::ser::Error),
}

/// Filter used when `RUST_LOG` is unset or invalid.
fn default_filter(verbose: bool) -> EnvFilter {
	if verbose {
		EnvFilter::new("objtree=debug,objtree_inspect=debug,info")
	} else {
		EnvFilter::new("info")
	}
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(args.verbose));
	let subscriber = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.finish();
	tracing::subscriber::set_global_default(subscriber)?;

	let config = match &args.config {
		Some(path) => BusConfig::load(path)?,
		None => BusConfig::default(),
	};
	info!(objects = config.objects.len(), "objtree-inspect.config");

	let out = run(&config, args.command)?;
	println!("{out}");
	Ok(())
}

fn connect(config: &BusConfig) -> Result<BusManager, InspectError> {
	if config.bus != BusKind::Memory {
		return Err(InspectError::UnsupportedBus(config.bus.clone()));
	}
	let conn = MemoryConnection::new();
	let bus = BusManager::from_config(config, move |_: Arc<dyn Handler>| Ok(conn as Arc<dyn Connection>))?;
	debug!("objtree-inspect.connected");
	Ok(bus)
}

fn run(config: &BusConfig, command: Command) -> Result<String, InspectError> {
	let bus = connect(config)?;
	match command {
		Command::Introspect { path, format } => {
			let object = bus.lookup_object(path.as_str()).ok_or(InspectError::NoObject(path))?;
			Ok(match format {
				Format::Xml => object.introspect_xml(),
				Format::Toml => toml::to_string_pretty(&object.introspect())?,
			})
		}
		Command::Get {
			path,
			interface,
			property,
		} => {
			let object = bus.lookup_object(path.as_str()).ok_or(InspectError::NoObject(path))?;
			let value = object
				.lookup_interface(&interface)
				.and_then(|iface| iface.lookup_property(&property))
				.ok_or(InspectError::NoMember(interface, property))?;
			Ok(value.get().to_string())
		}
		Command::Call {
			path,
			interface,
			method,
			args,
		} => {
			let object = bus.lookup_object(path.as_str()).ok_or(InspectError::NoObject(path.clone()))?;
			let handle = object
				.lookup_interface(&interface)
				.and_then(|iface| iface.lookup_method(&method))
				.ok_or_else(|| InspectError::NoMember(interface.clone(), method.clone()))?;
			let values = parse::arguments(handle.signature().visible_args(), &args)?;
			let reply = bus.call(path.as_str(), &interface, &method, values)?;
			Ok(reply.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"))
		}
	}
}
