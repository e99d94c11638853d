//! In-process loopback transport.
//!
//! Records every request it receives so callers can observe the
//! subscription traffic a tree generates. Used by the inspector binary and
//! by tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use super::connection::{Connection, MatchRule, NameFlags, RequestNameReply};
use crate::error::{Error, Result};

/// One request observed by a [`MemoryConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
	Auth,
	Hello,
	RequestName(String),
	AddMatch(MatchRule),
	RemoveMatch(MatchRule),
	Close,
}

/// Handshake stage a [`MemoryConnection`] can be told to reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
	Auth,
	Hello,
}

#[derive(Debug, Default)]
pub struct MemoryConnection {
	requests: Mutex<Vec<Request>>,
	names: Mutex<FxHashSet<String>>,
	fail_at: Option<FailAt>,
	closed: AtomicBool,
}

impl MemoryConnection {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// A connection whose handshake fails at `stage`.
	pub fn failing(stage: FailAt) -> Arc<Self> {
		Arc::new(Self {
			fail_at: Some(stage),
			..Self::default()
		})
	}

	/// Every request received so far, in order.
	pub fn requests(&self) -> Vec<Request> {
		self.requests.lock().clone()
	}

	/// Number of `add_match` requests for `interface.member`.
	pub fn add_match_count(&self, interface: &str, member: &str) -> usize {
		let rule = MatchRule::signal(interface, member);
		self.count(|r| matches!(r, Request::AddMatch(m) if *m == rule))
	}

	/// Number of `remove_match` requests for `interface.member`.
	pub fn remove_match_count(&self, interface: &str, member: &str) -> usize {
		let rule = MatchRule::signal(interface, member);
		self.count(|r| matches!(r, Request::RemoveMatch(m) if *m == rule))
	}

	pub fn owns_name(&self, name: &str) -> bool {
		self.names.lock().contains(name)
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	fn count(&self, pred: impl Fn(&Request) -> bool) -> usize {
		self.requests.lock().iter().filter(|r| pred(r)).count()
	}

	fn record(&self, request: Request) -> Result<()> {
		if self.is_closed() {
			return Err(Error::Transport("connection closed".into()));
		}
		self.requests.lock().push(request);
		Ok(())
	}
}

impl Connection for MemoryConnection {
	fn auth(&self) -> Result<()> {
		self.record(Request::Auth)?;
		match self.fail_at {
			Some(FailAt::Auth) => Err(Error::Transport("authentication rejected".into())),
			_ => Ok(()),
		}
	}

	fn hello(&self) -> Result<()> {
		self.record(Request::Hello)?;
		match self.fail_at {
			Some(FailAt::Hello) => Err(Error::Transport("hello rejected".into())),
			_ => Ok(()),
		}
	}

	fn request_name(&self, name: &str, _flags: NameFlags) -> Result<RequestNameReply> {
		self.record(Request::RequestName(name.to_string()))?;
		validate_bus_name(name)?;
		if self.names.lock().insert(name.to_string()) {
			Ok(RequestNameReply::PrimaryOwner)
		} else {
			Ok(RequestNameReply::AlreadyOwner)
		}
	}

	fn add_match(&self, rule: &MatchRule) -> Result<()> {
		self.record(Request::AddMatch(rule.clone()))
	}

	fn remove_match(&self, rule: &MatchRule) -> Result<()> {
		self.record(Request::RemoveMatch(rule.clone()))
	}

	fn close(&self) -> Result<()> {
		self.record(Request::Close)?;
		self.closed.store(true, Ordering::Release);
		Ok(())
	}
}

/// Checks the well-known bus name grammar: at least two dot-separated
/// elements of `[A-Za-z0-9_-]`, none empty or starting with a digit.
pub fn validate_bus_name(name: &str) -> Result<()> {
	let invalid = || Error::Transport(format!("invalid bus name: {name:?}"));
	if name.is_empty() || name.len() > 255 || name.starts_with(':') {
		return Err(invalid());
	}
	let mut elements = 0;
	for element in name.split('.') {
		let mut chars = element.chars();
		let first = chars.next().ok_or_else(invalid)?;
		if first.is_ascii_digit() {
			return Err(invalid());
		}
		if !element.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
			return Err(invalid());
		}
		elements += 1;
	}
	if elements < 2 {
		return Err(invalid());
	}
	Ok(())
}
