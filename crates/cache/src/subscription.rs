//! View subscriptions and change delivery.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use agora_model::{FeedScope, UserId};

use crate::cache::Shared;
use crate::cursor::PageCursor;
use crate::projector::{Projection, project};
use crate::store::EntityStore;

/// Callback receiving a scope's recomputed projection.
pub(crate) type Callback = Arc<dyn Fn(&Projection) + Send + Sync>;

struct Entry {
	id: u64,
	scope: FeedScope,
	callback: Callback,
	last: Option<Projection>,
}

/// Registered subscribers with the projection each one saw last.
#[derive(Default)]
pub(crate) struct Subscribers {
	next_id: u64,
	entries: Vec<Entry>,
}

impl Subscribers {
	pub(crate) fn insert(&mut self, scope: FeedScope, callback: Callback) -> u64 {
		self.next_id += 1;
		self.entries.push(Entry {
			id: self.next_id,
			scope,
			callback,
			last: None,
		});
		self.next_id
	}

	/// Removes a subscriber, returning its scope.
	pub(crate) fn remove(&mut self, id: u64) -> Option<FeedScope> {
		let index = self.entries.iter().position(|e| e.id == id)?;
		Some(self.entries.swap_remove(index).scope)
	}

	/// Returns true if any subscriber watches `scope`.
	pub(crate) fn watches(&self, scope: &FeedScope) -> bool {
		self.entries.iter().any(|e| e.scope == *scope)
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.len()
	}

	/// Recomputes every watched projection and returns the deliveries for
	/// subscribers whose projection differs from the one they saw last.
	pub(crate) fn changed(&mut self, store: &EntityStore, feeds: &HashMap<FeedScope, PageCursor>, viewer: Option<UserId>) -> Vec<Delivery> {
		let mut computed: HashMap<FeedScope, Projection> = HashMap::new();
		let mut out = Vec::new();
		for entry in &mut self.entries {
			let projection = computed
				.entry(entry.scope.clone())
				.or_insert_with(|| project(store, feeds.get(&entry.scope), &entry.scope, viewer));
			if entry.last.as_ref() != Some(projection) {
				entry.last = Some(projection.clone());
				out.push(Delivery {
					callback: Arc::clone(&entry.callback),
					projection: projection.clone(),
				});
			}
		}
		out
	}
}

/// A projection waiting to be handed to its subscriber once the state lock is released.
pub(crate) struct Delivery {
	callback: Callback,
	projection: Projection,
}

impl Delivery {
	pub(crate) fn deliver(self) {
		(self.callback)(&self.projection);
	}
}

/// Keeps a view subscribed to a feed scope.
///
/// Dropping the last subscription of a scope discards that scope's cursor, as
/// happens when a view unmounts. Cached entities stay in the store.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
	id: u64,
	scope: FeedScope,
	shared: Weak<Shared>,
}

impl Subscription {
	pub(crate) fn new(id: u64, scope: FeedScope, shared: Weak<Shared>) -> Self {
		Self { id, scope, shared }
	}

	/// Scope this subscription watches.
	pub fn scope(&self) -> &FeedScope {
		&self.scope
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription").field("id", &self.id).field("scope", &self.scope).finish()
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(shared) = self.shared.upgrade() {
			shared.unsubscribe(self.id);
		}
	}
}
