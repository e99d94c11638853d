//! Default D-Bus XML framing for introspection documents.

use std::fmt::Write as _;

use super::Node;

/// DOCTYPE declaration prefixed to every rendered document.
pub const DECLARATION: &str = r#"<!DOCTYPE node PUBLIC "-//freedesktop//DTD D-BUS Object Introspection 1.0//EN" "http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd">"#;

/// Renders `node` as an introspection document.
pub fn render(node: &Node) -> String {
	let mut out = String::from(DECLARATION);
	write_node(&mut out, node);
	out
}

fn write_node(out: &mut String, node: &Node) {
	out.push_str("<node");
	if let Some(name) = &node.name {
		let _ = write!(out, r#" name="{}""#, escape(name));
	}
	out.push('>');
	for iface in &node.interfaces {
		let _ = write!(out, r#"<interface name="{}">"#, escape(&iface.name));
		for method in &iface.methods {
			let _ = write!(out, r#"<method name="{}">"#, escape(&method.name));
			for arg in &method.args {
				out.push_str("<arg");
				if let Some(name) = &arg.name {
					let _ = write!(out, r#" name="{}""#, escape(name));
				}
				let _ = write!(
					out,
					r#" type="{}" direction="{}"></arg>"#,
					escape(&arg.ty),
					arg.direction.as_str()
				);
			}
			out.push_str("</method>");
		}
		for property in &iface.properties {
			let _ = write!(
				out,
				r#"<property name="{}" type="{}" access="{}"></property>"#,
				escape(&property.name),
				escape(&property.ty),
				escape(&property.access)
			);
		}
		out.push_str("</interface>");
	}
	for child in &node.children {
		write_node(out, child);
	}
	out.push_str("</node>");
}

fn escape(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&#34;"),
			'\'' => out.push_str("&#39;"),
			c => out.push(c),
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::introspect::{Arg, Direction, Interface, Method, Property};

	#[test]
	fn renders_nested_document() {
		let node = Node {
			name: None,
			interfaces: vec![Interface {
				name: "com.example.Echo".into(),
				methods: vec![Method {
					name: "Echo".into(),
					args: vec![
						Arg {
							name: None,
							ty: "s".into(),
							direction: Direction::In,
						},
						Arg {
							name: None,
							ty: "s".into(),
							direction: Direction::Out,
						},
					],
				}],
				properties: vec![Property {
					name: "Count".into(),
					ty: "u".into(),
					access: "readwrite".into(),
				}],
			}],
			children: vec![Node {
				name: Some("child".into()),
				..Node::default()
			}],
		};
		let expected = format!(
			"{DECLARATION}<node><interface name=\"com.example.Echo\"><method name=\"Echo\">\
			 <arg type=\"s\" direction=\"in\"></arg><arg type=\"s\" direction=\"out\"></arg></method>\
			 <property name=\"Count\" type=\"u\" access=\"readwrite\"></property></interface>\
			 <node name=\"child\"></node></node>"
		);
		assert_eq!(render(&node), expected);
	}

	#[test]
	fn escapes_attribute_text() {
		let node = Node {
			name: Some("a<b>&\"c\"".into()),
			..Node::default()
		};
		assert!(render(&node).contains(r#"name="a&lt;b&gt;&amp;&#34;c&#34;""#));
	}
}
