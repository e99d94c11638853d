//! Fire-and-forget task spawning for notification delivery.
//!
//! Work runs on the blocking pool of the ambient tokio runtime. Outside a
//! runtime a process-wide fallback runtime is started on first use.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::task::JoinHandle;

/// Execution classes, reported on every spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// A listener invoked for an inbound notification.
	Listener,
	/// Work forwarded from a transport on behalf of a remote caller.
	Call,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Listener => "listener",
			Self::Call => "call",
		}
	}
}

const DEFAULT_WORKER_THREADS: usize = 2;

static WORKER_THREADS: AtomicUsize = AtomicUsize::new(DEFAULT_WORKER_THREADS);

/// Sets the worker count of the fallback runtime.
///
/// Has no effect once the fallback runtime has started.
pub fn set_worker_threads(threads: usize) {
	WORKER_THREADS.store(threads.max(1), Ordering::Relaxed);
}

fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(WORKER_THREADS.load(Ordering::Relaxed))
			.thread_name("objtree-dispatch")
			.build()
			.expect("failed to build objtree dispatch runtime")
	});
	runtime.handle().clone()
}

/// Runs `f` on the blocking pool without waiting for it.
pub fn spawn_blocking<F, R>(class: TaskClass, f: F) -> JoinHandle<R>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(task_class = class.as_str(), "dispatch.spawn_blocking");
	runtime_handle().spawn_blocking(f)
}

#[cfg(test)]
mod tests {
	use std::sync::mpsc;
	use std::time::Duration;

	use super::*;

	#[test]
	fn spawns_outside_a_runtime() {
		let (tx, rx) = mpsc::channel();
		let _ = spawn_blocking(TaskClass::Listener, move || tx.send(7));
		assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(7));
	}

	#[tokio::test(flavor = "multi_thread")]
	async fn spawns_on_the_ambient_runtime() {
		let handle = spawn_blocking(TaskClass::Call, || 1 + 1);
		assert_eq!(handle.await.unwrap(), 2);
	}
}
