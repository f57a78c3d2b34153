//! Page loads, background refresh and single-post refetch.
//!
//! Fetched snapshots always go through [`EntityStore::upsert`](crate::store::EntityStore::upsert),
//! so pending reactions, temporary comments and delete marks survive a refresh.
//! A periodic refresh only ever touches page 1 of its feed: deeper pages keep
//! their ids and a scrolled view keeps its position.
//! A page that lands after its feed was reset or unmounted still reaches the
//! store; only the feed's cursor ignores it.

use std::sync::Weak;
use std::time::Duration;

use agora_model::{EntityId, FeedScope, PostId, ServiceError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::cache::{CacheState, Shared};
use crate::error::{CacheError, Result};

/// What a [`load_more`](crate::FeedCache::load_more) call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
	/// A page was fetched and recorded.
	Fetched {
		/// Page number.
		page: u32,
		/// Ids new to the feed.
		added: usize,
		/// Whether another page exists.
		has_more: bool,
	},
	/// Another load of the same feed is in flight; nothing was requested.
	AlreadyLoading,
	/// The feed has no more pages; nothing was requested.
	Exhausted,
	/// The feed was reset or discarded while the page was in flight. The
	/// fetched entities were still stored; the feed did not record them.
	Discarded,
}

fn load_error(scope: &FeedScope, error: ServiceError) -> CacheError {
	match error {
		ServiceError::NotFound => CacheError::FeedUnavailable(scope.clone()),
		ServiceError::PermissionDenied => CacheError::rejected("load_feed"),
		ServiceError::Unauthorized => CacheError::Unauthorized,
		other => CacheError::Transient(other),
	}
}

impl Shared {
	pub(crate) async fn load_more(&self, scope: &FeedScope) -> Result<LoadOutcome> {
		let page_size = self.config.page_size;
		let ticket = self.update(|state| {
			let cursor = state.cursor_mut(scope, page_size);
			match cursor.begin_load() {
				Some(ticket) => Ok(ticket),
				None if cursor.is_loading() => Err(LoadOutcome::AlreadyLoading),
				None => Err(LoadOutcome::Exhausted),
			}
		});
		let ticket = match ticket {
			Ok(ticket) => ticket,
			Err(outcome) => {
				trace!(scope = %scope, ?outcome, "feed.load.skipped");
				return Ok(outcome);
			}
		};

		debug!(scope = %scope, page = ticket.page, "feed.load");
		let page = match self.service.fetch_page(scope, ticket.page, ticket.page_size).await {
			Ok(page) => page,
			Err(error) => {
				warn!(scope = %scope, page = ticket.page, %error, "feed.load.failed");
				self.update(|state| {
					if let Some(cursor) = state.feeds.get_mut(scope) {
						cursor.fail_load(&ticket);
					}
				});
				return Err(load_error(scope, error));
			}
		};

		let has_more = page.has_more;
		let returned = page.posts.len();
		let added = self.update(|state| {
			let CacheState { store, feeds, .. } = state;
			let mut ids = Vec::with_capacity(page.posts.len());
			for record in page.posts {
				let id = record.id;
				store.upsert_post(record);
				if store.post(id).is_some() {
					ids.push(id);
				}
			}
			let cursor = feeds.get_mut(scope).filter(|cursor| cursor.accepts(&ticket))?;
			let before = cursor.len();
			cursor.complete_load(&ticket, ids, has_more);
			Some(cursor.len() - before)
		});

		match added {
			Some(added) => {
				debug!(scope = %scope, page = ticket.page, returned, added, has_more, "feed.loaded");
				Ok(LoadOutcome::Fetched {
					page: ticket.page,
					added,
					has_more,
				})
			}
			None => {
				debug!(scope = %scope, page = ticket.page, returned, "feed.load.discarded");
				Ok(LoadOutcome::Discarded)
			}
		}
	}

	/// Fetches page 1 of `scope` and folds it into the head of the feed.
	pub(crate) async fn refresh(&self, scope: &FeedScope) -> Result<usize> {
		let page_size = self.read(|state| state.feeds.get(scope).filter(|c| c.loaded_pages() > 0).map(|c| c.page_size()));
		let Some(page_size) = page_size else {
			trace!(scope = %scope, "feed.refresh.skipped");
			return Ok(0);
		};

		let page = self.service.fetch_page(scope, 1, page_size).await.map_err(|error| load_error(scope, error))?;
		let returned = page.posts.len();
		let added = self.update(|state| {
			let CacheState { store, feeds, .. } = state;
			let mut ids = Vec::with_capacity(page.posts.len());
			for record in page.posts {
				let id = record.id;
				store.upsert_post(record);
				if store.post(id).is_some() {
					ids.push(id);
				}
			}
			match feeds.get_mut(scope).filter(|c| c.loaded_pages() > 0) {
				Some(cursor) => cursor.merge_head(ids),
				None => 0,
			}
		});
		debug!(scope = %scope, returned, added, "feed.refreshed");
		Ok(added)
	}

	/// Re-fetches one post. A post the server no longer has is evicted.
	pub(crate) async fn refresh_post(&self, post: PostId) -> Result<()> {
		match self.service.fetch_post(post).await {
			Ok(record) => {
				self.update(|state| state.store.upsert_post(record));
				trace!(post = %post, "post.refreshed");
				Ok(())
			}
			Err(ServiceError::NotFound) => {
				let id = EntityId::Post(post);
				self.update(|state| state.remove_entity(id));
				debug!(post = %post, "post.evicted");
				Err(CacheError::NotFound(id))
			}
			Err(ServiceError::Unauthorized) => Err(CacheError::Unauthorized),
			Err(ServiceError::PermissionDenied) => Err(CacheError::rejected("fetch_post")),
			Err(error) => Err(CacheError::Transient(error)),
		}
	}
}

/// Keeps a periodic refresh running. Dropping it stops the refresh.
#[derive(Debug)]
#[must_use = "dropping a RefreshHandle stops the refresh"]
pub struct RefreshHandle {
	token: CancellationToken,
}

impl RefreshHandle {
	pub(crate) fn spawn(shared: Weak<Shared>, scope: FeedScope, interval: Duration) -> Self {
		let token = CancellationToken::new();
		let task_token = token.clone();
		let interval = interval.max(Duration::from_millis(1));

		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			ticker.tick().await;
			debug!(scope = %scope, ?interval, "refresh.started");

			loop {
				tokio::select! {
					biased;
					_ = task_token.cancelled() => break,
					_ = ticker.tick() => {}
				}
				let Some(shared) = shared.upgrade() else {
					break;
				};
				let result = tokio::select! {
					biased;
					_ = task_token.cancelled() => break,
					result = shared.refresh(&scope) => result,
				};
				if let Err(error) = result {
					warn!(scope = %scope, %error, "refresh.failed");
					shared.report(&error);
				}
			}
			debug!(scope = %scope, "refresh.stopped");
		});

		Self { token }
	}

	/// Stops the refresh.
	pub fn cancel(&self) {
		self.token.cancel();
	}

	/// Returns true once the refresh has been stopped.
	pub fn is_cancelled(&self) -> bool {
		self.token.is_cancelled()
	}
}

impl Drop for RefreshHandle {
	fn drop(&mut self) {
		self.token.cancel();
	}
}
