//! Keyed async locks.
//!
//! Mutations against the same key run one after another in arrival order;
//! mutations against different keys never wait on each other. Entries are
//! weak, so a key with no holder and no waiter costs nothing.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use agora_model::{EntityId, GroupId};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// What a mutation serializes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum LockKey {
	Entity(EntityId),
	Group(GroupId),
}

#[derive(Debug, Default)]
pub(crate) struct EntityLocks {
	table: Mutex<HashMap<LockKey, Weak<AsyncMutex<()>>>>,
}

impl EntityLocks {
	/// Waits for exclusive use of `key`. Waiters are served first come, first served.
	pub(crate) async fn acquire(&self, key: LockKey) -> OwnedMutexGuard<()> {
		let lock = {
			let mut table = self.table.lock();
			table.retain(|_, lock| lock.strong_count() > 0);
			match table.get(&key).and_then(Weak::upgrade) {
				Some(lock) => lock,
				None => {
					let lock = Arc::new(AsyncMutex::new(()));
					table.insert(key, Arc::downgrade(&lock));
					lock
				}
			}
		};
		lock.lock_owned().await
	}

	#[cfg(test)]
	pub(crate) fn live_keys(&self) -> usize {
		self.table.lock().values().filter(|lock| lock.strong_count() > 0).count()
	}
}
