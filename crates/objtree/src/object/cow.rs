use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Name-keyed map published as immutable snapshots.
///
/// Readers load the current snapshot without locking. Writers serialize on
/// `write`, clone the snapshot, mutate the copy and publish it whole.
pub(crate) struct CowMap<V> {
	snap: ArcSwap<FxHashMap<String, V>>,
	write: Mutex<()>,
}

impl<V: Clone> CowMap<V> {
	pub(crate) fn new() -> Self {
		Self {
			snap: ArcSwap::from_pointee(FxHashMap::default()),
			write: Mutex::new(()),
		}
	}

	#[inline]
	pub(crate) fn load(&self) -> Arc<FxHashMap<String, V>> {
		self.snap.load_full()
	}

	pub(crate) fn get(&self, name: &str) -> Option<V> {
		self.snap.load().get(name).cloned()
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.snap.load().is_empty()
	}

	/// Applies `f` to a private copy and publishes the result.
	///
	/// `f` runs under this map's writer lock; it must not update the same map.
	pub(crate) fn update<R>(&self, f: impl FnOnce(&mut FxHashMap<String, V>) -> R) -> R {
		let _guard = self.write.lock();
		let mut next = (**self.snap.load()).clone();
		let out = f(&mut next);
		self.snap.store(Arc::new(next));
		out
	}

	/// Runs `f` on the current snapshot while holding the writer lock.
	///
	/// No writer can publish until `f` returns.
	pub(crate) fn locked<R>(&self, f: impl FnOnce(&FxHashMap<String, V>) -> R) -> R {
		let _guard = self.write.lock();
		f(&self.snap.load())
	}
}
