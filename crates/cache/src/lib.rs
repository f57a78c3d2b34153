//! Client-side entity cache and optimistic-mutation engine for social feeds.
//!
//! Posts and comments live once, in a normalized [`EntityStore`]. Feeds
//! ([`PageCursor`]) record ids only, and every view reads a [`Projection`]
//! computed from the store, so a change made through one feed is visible in
//! all of them. [`FeedCache`] ties the pieces together:
//!
//! - [`FeedCache::subscribe`] delivers a scope's projection whenever it changes,
//! - [`FeedCache::load_more`] pages through a scope,
//! - [`FeedCache::mutate`] applies a local edit immediately and reconciles it
//!   with the server, rolling back on failure,
//! - [`FeedCache::periodic_refresh`] and [`FeedCache::on_external_invalidate`]
//!   keep cached data fresh without clobbering edits still in flight.

mod cache;
pub mod config;
pub mod cursor;
mod error;
mod mutator;
pub mod projector;
mod refresh;
pub mod store;
mod subscription;

pub use cache::{ErrorSink, FeedCache, FeedCacheBuilder};
pub use config::{CacheConfig, ConfigError};
pub use cursor::{CursorPhase, PageCursor, PageTicket};
pub use error::{CacheError, Result};
pub use mutator::MutationOutcome;
pub use projector::{CommentView, PostView, Projection, ReactionSummary, project};
pub use refresh::{LoadOutcome, RefreshHandle};
pub use store::{EntityPatch, EntityRef, EntityStore};
pub use subscription::Subscription;
