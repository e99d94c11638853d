//! Command line argument parsing against declared method types.

use objtree::{ObjectPath, Type, Value};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
	#[error("expected {expected} arguments, got {actual}")]
	Arity { expected: usize, actual: usize },
	#[error("cannot parse {text:?} as {ty}")]
	Invalid { text: String, ty: String },
}

/// Parses one string per declared type.
pub fn arguments<'a>(types: impl Iterator<Item = &'a Type>, args: &[String]) -> Result<Vec<Value>, ParseError> {
	let types: Vec<_> = types.collect();
	if types.len() != args.len() {
		return Err(ParseError::Arity {
			expected: types.len(),
			actual: args.len(),
		});
	}
	types.into_iter().zip(args).map(|(ty, text)| argument(ty, text)).collect()
}

fn argument(ty: &Type, text: &str) -> Result<Value, ParseError> {
	let invalid = || ParseError::Invalid {
		text: text.to_string(),
		ty: ty.signature(),
	};
	Ok(match ty {
		Type::Bool => Value::Bool(text.parse().map_err(|_| invalid())?),
		Type::Byte => Value::Byte(text.parse().map_err(|_| invalid())?),
		Type::Int16 => Value::Int16(text.parse().map_err(|_| invalid())?),
		Type::UInt16 => Value::UInt16(text.parse().map_err(|_| invalid())?),
		Type::Int32 => Value::Int32(text.parse().map_err(|_| invalid())?),
		Type::UInt32 => Value::UInt32(text.parse().map_err(|_| invalid())?),
		Type::Int64 => Value::Int64(text.parse().map_err(|_| invalid())?),
		Type::UInt64 => Value::UInt64(text.parse().map_err(|_| invalid())?),
		Type::Double => Value::Double(text.parse().map_err(|_| invalid())?),
		Type::Str => Value::Str(text.to_string()),
		Type::Signature => Value::Signature(text.to_string()),
		Type::ObjectPath if text.starts_with('/') => Value::ObjectPath(ObjectPath::new(text)),
		Type::Variant => Value::Variant(Box::new(Value::Str(text.to_string()))),
		_ => return Err(invalid()),
	})
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn parses_scalars_by_type() {
		let types = [Type::Int32, Type::Bool, Type::ObjectPath];
		let args = ["-4".to_string(), "true".to_string(), "/a/b".to_string()];
		assert_eq!(
			arguments(types.iter(), &args).unwrap(),
			[Value::Int32(-4), Value::Bool(true), Value::ObjectPath(ObjectPath::new("/a/b"))]
		);
	}

	#[test]
	fn rejects_bad_input() {
		assert!(matches!(
			arguments([Type::UInt32].iter(), &["-1".to_string()]),
			Err(ParseError::Invalid { .. })
		));
		assert!(matches!(
			arguments([Type::Str].iter(), &[]),
			Err(ParseError::Arity { expected: 1, actual: 0 })
		));
		assert!(matches!(
			arguments([Type::Array(Box::new(Type::Str))].iter(), &["x".to_string()]),
			Err(ParseError::Invalid { .. })
		));
	}
}
