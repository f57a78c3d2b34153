//! The view-facing cache handle.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use agora_model::{AuthContext, DataService, EntityId, FeedScope, GroupId, Mutation, PostId};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::cursor::{CursorPhase, PageCursor};
use crate::error::{CacheError, Result};
use crate::mutator::locks::EntityLocks;
use crate::mutator::{MutationOutcome, TempIds};
use crate::projector::{Projection, project};
use crate::refresh::{LoadOutcome, RefreshHandle};
use crate::store::{EntityPatch, EntityRef, EntityStore};
use crate::subscription::{Callback, Subscribers, Subscription};

/// Receives failures from background work that has no caller to return them to.
pub type ErrorSink = Arc<dyn Fn(&CacheError) + Send + Sync>;

/// Everything guarded by the state lock.
#[derive(Default)]
pub(crate) struct CacheState {
	pub(crate) store: EntityStore,
	pub(crate) feeds: HashMap<FeedScope, PageCursor>,
	pub(crate) subscribers: Subscribers,
}

impl CacheState {
	/// Cursor for `scope`, created empty on first use.
	pub(crate) fn cursor_mut(&mut self, scope: &FeedScope, page_size: u32) -> &mut PageCursor {
		self.feeds.entry(scope.clone()).or_insert_with(|| PageCursor::new(scope.clone(), page_size))
	}

	/// Removes an entity from the store and every cursor.
	pub(crate) fn remove_entity(&mut self, id: EntityId) -> bool {
		let removed = self.store.remove(id);
		if let EntityId::Post(post) = id {
			for cursor in self.feeds.values_mut() {
				cursor.remove(post);
			}
		}
		removed
	}

	/// Pins a locally created post into every cursor whose scope shows its group.
	pub(crate) fn pin_post(&mut self, group: GroupId, post: PostId) {
		for cursor in self.feeds.values_mut().filter(|c| c.scope().covers_group(group)) {
			cursor.pin(post);
		}
	}

	/// Drops cursor ids whose post is no longer cached.
	pub(crate) fn prune_cursors(&mut self) {
		let Self { store, feeds, .. } = self;
		for cursor in feeds.values_mut() {
			cursor.retain(|id| store.post(id).is_some());
		}
	}
}

/// State shared by every clone of a [`FeedCache`] and by its background tasks.
pub(crate) struct Shared {
	state: Mutex<CacheState>,
	pub(crate) service: Arc<dyn DataService>,
	pub(crate) auth: Arc<dyn AuthContext>,
	pub(crate) config: CacheConfig,
	pub(crate) locks: EntityLocks,
	pub(crate) temp_ids: TempIds,
	error_sink: Option<ErrorSink>,
}

impl Shared {
	/// Runs `f` under the state lock, then notifies subscribers whose
	/// projection changed. Callbacks run after the lock is released.
	pub(crate) fn update<R>(&self, f: impl FnOnce(&mut CacheState) -> R) -> R {
		let viewer = self.auth.current_user();
		let (result, deliveries) = {
			let mut state = self.state.lock();
			let result = f(&mut state);
			let CacheState { store, feeds, subscribers } = &mut *state;
			(result, subscribers.changed(store, feeds, viewer))
		};
		for delivery in deliveries {
			delivery.deliver();
		}
		result
	}

	/// Reads under the state lock without notifying anyone.
	pub(crate) fn read<R>(&self, f: impl FnOnce(&CacheState) -> R) -> R {
		f(&self.state.lock())
	}

	pub(crate) fn unsubscribe(&self, id: u64) {
		let mut state = self.state.lock();
		let Some(scope) = state.subscribers.remove(id) else {
			return;
		};
		if !state.subscribers.watches(&scope) && state.feeds.remove(&scope).is_some() {
			trace!(scope = %scope, "feed.discarded");
		}
	}

	/// Forwards a background failure to the error sink.
	pub(crate) fn report(&self, error: &CacheError) {
		if let Some(sink) = &self.error_sink {
			sink(error);
		}
	}
}

/// Builder for [`FeedCache`].
pub struct FeedCacheBuilder {
	service: Arc<dyn DataService>,
	auth: Arc<dyn AuthContext>,
	config: CacheConfig,
	error_sink: Option<ErrorSink>,
}

impl FeedCacheBuilder {
	/// Replaces the default configuration.
	#[must_use]
	pub fn config(mut self, config: CacheConfig) -> Self {
		self.config = config;
		self
	}

	/// Installs a sink for failures of background refreshes.
	#[must_use]
	pub fn on_error(mut self, sink: impl Fn(&CacheError) + Send + Sync + 'static) -> Self {
		self.error_sink = Some(Arc::new(sink));
		self
	}

	/// Builds the cache.
	pub fn build(self) -> FeedCache {
		FeedCache {
			inner: Arc::new(Shared {
				state: Mutex::new(CacheState::default()),
				service: self.service,
				auth: self.auth,
				config: self.config,
				locks: EntityLocks::default(),
				temp_ids: TempIds::new(),
				error_sink: self.error_sink,
			}),
		}
	}
}

/// Client-side entity cache shared by every feed view.
///
/// Cloning is cheap and every clone addresses the same cache. Views
/// [`subscribe`](Self::subscribe) to a [`FeedScope`], page through it with
/// [`load_more`](Self::load_more) and change it with
/// [`mutate`](Self::mutate). All network work runs on spawned Tokio tasks, so
/// async methods must be awaited inside a Tokio runtime, and dropping one of
/// their futures does not stop the store from being updated.
#[derive(Clone)]
pub struct FeedCache {
	pub(crate) inner: Arc<Shared>,
}

impl fmt::Debug for FeedCache {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.inner.state.lock();
		f.debug_struct("FeedCache")
			.field("posts", &state.store.post_count())
			.field("comments", &state.store.comment_count())
			.field("feeds", &state.feeds.len())
			.field("subscribers", &state.subscribers.len())
			.finish()
	}
}

impl FeedCache {
	/// Cache with the default configuration.
	pub fn new(service: Arc<dyn DataService>, auth: Arc<dyn AuthContext>) -> Self {
		Self::builder(service, auth).build()
	}

	/// Starts building a cache.
	pub fn builder(service: Arc<dyn DataService>, auth: Arc<dyn AuthContext>) -> FeedCacheBuilder {
		FeedCacheBuilder {
			service,
			auth,
			config: CacheConfig::default(),
			error_sink: None,
		}
	}

	/// Active configuration.
	pub fn config(&self) -> &CacheConfig {
		&self.inner.config
	}

	/// Subscribes `callback` to `scope`.
	///
	/// The callback runs once immediately with the current projection and
	/// again whenever the store or the scope's cursor changes what the scope
	/// displays. It must not block.
	pub fn subscribe(&self, scope: FeedScope, callback: impl Fn(&Projection) + Send + Sync + 'static) -> Subscription {
		let callback: Callback = Arc::new(callback);
		let page_size = self.inner.config.page_size;
		let id = self.inner.update(|state| {
			state.cursor_mut(&scope, page_size);
			state.subscribers.insert(scope.clone(), callback)
		});
		debug!(scope = %scope, id, "feed.subscribe");
		Subscription::new(id, scope, Arc::downgrade(&self.inner))
	}

	/// Current projection of `scope`.
	pub fn projection(&self, scope: &FeedScope) -> Projection {
		let viewer = self.inner.auth.current_user();
		self.inner.read(|state| project(&state.store, state.feeds.get(scope), scope, viewer))
	}

	/// Pagination phase of `scope`, if it has a cursor.
	pub fn phase(&self, scope: &FeedScope) -> Option<CursorPhase> {
		self.inner.read(|state| state.feeds.get(scope).map(PageCursor::phase))
	}

	/// Fetches the next page of `scope`.
	///
	/// A call made while a page of the same scope is in flight returns
	/// [`LoadOutcome::AlreadyLoading`] without a request.
	pub async fn load_more(&self, scope: &FeedScope) -> Result<LoadOutcome> {
		let shared = Arc::clone(&self.inner);
		let scope = scope.clone();
		detached(async move { shared.load_more(&scope).await }).await
	}

	/// Applies `mutation` optimistically and reconciles it with the server.
	pub async fn mutate(&self, mutation: Mutation) -> Result<MutationOutcome> {
		let shared = Arc::clone(&self.inner);
		detached(async move { shared.mutate(mutation).await }).await
	}

	/// Re-fetches page 1 of `scope` and merges it into the head of the feed.
	/// Returns how many ids were new to the feed.
	pub async fn refresh(&self, scope: &FeedScope) -> Result<usize> {
		let shared = Arc::clone(&self.inner);
		let scope = scope.clone();
		detached(async move { shared.refresh(&scope).await }).await
	}

	/// Re-fetches a single post with its comments.
	pub async fn refresh_post(&self, post: PostId) -> Result<()> {
		let shared = Arc::clone(&self.inner);
		detached(async move { shared.refresh_post(post).await }).await
	}

	/// Refreshes `scope` every `interval` until the handle is dropped. `None`
	/// uses [`CacheConfig::refresh_interval`].
	///
	/// Must be called inside a Tokio runtime.
	pub fn periodic_refresh(&self, scope: FeedScope, interval: Option<Duration>) -> RefreshHandle {
		let interval = interval.unwrap_or_else(|| self.inner.config.refresh_interval());
		RefreshHandle::spawn(Arc::downgrade(&self.inner), scope, interval)
	}

	/// Applies `patch` to every cached entity matched by `predicate` without a
	/// network round-trip. Returns how many entities changed.
	pub fn on_external_invalidate(&self, predicate: impl Fn(EntityRef<'_>) -> bool, patch: EntityPatch) -> usize {
		let affected = self.inner.update(|state| {
			let affected = state.store.apply_patch(predicate, &patch);
			if patch == EntityPatch::Evict {
				state.prune_cursors();
			}
			affected
		});
		debug!(?patch, affected, "cache.invalidate");
		affected
	}

	/// Returns `scope` to its first page. The store is untouched and loads in
	/// flight for the old pages are discarded.
	pub fn reset(&self, scope: &FeedScope) {
		self.inner.update(|state| {
			if let Some(cursor) = state.feeds.get_mut(scope) {
				cursor.reset();
			}
		});
		debug!(scope = %scope, "feed.reset");
	}

	/// Runs `f` against the store.
	pub fn read<R>(&self, f: impl FnOnce(&EntityStore) -> R) -> R {
		self.inner.read(|state| f(&state.store))
	}

	/// Copy of the store.
	pub fn store_snapshot(&self) -> EntityStore {
		self.read(EntityStore::clone)
	}
}

/// Runs `task` to completion on its own task and waits for it.
async fn detached<T: Send + 'static>(task: impl Future<Output = Result<T>> + Send + 'static) -> Result<T> {
	match tokio::spawn(task).await {
		Ok(result) => result,
		Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
		Err(_) => Err(CacheError::Aborted),
	}
}
