use std::time::Duration;

use agora_cache::CacheError;
use agora_model::ReactionKind::Like;
use agora_model::{EntityId, FeedScope, Mutation, PostId, ServiceError};
use agora_testing::fixtures;
use pretty_assertions::assert_eq;

use crate::common::{BOOKS, GAMES, ME, world};

#[tokio::test]
async fn refresh_freshens_page_one_without_losing_scroll_or_edits() {
	let w = world();
	let dashboard = FeedScope::membership([BOOKS, GAMES]);
	w.cache.load_more(&dashboard).await.unwrap();
	w.cache.load_more(&dashboard).await.unwrap();

	w.service.hold_mutations();
	let pending = tokio::spawn({
		let cache = w.cache.clone();
		async move {
			cache
				.mutate(Mutation::ReactToPost {
					post: PostId(2),
					reaction: Some(Like),
				})
				.await
		}
	});
	w.service.mutations_started(1).await;
	w.service.seed_post(fixtures::post(11, 1, 2, 200));

	assert_eq!(w.cache.refresh(&dashboard).await, Ok(1));
	let projection = w.cache.projection(&dashboard);
	assert_eq!(projection.len(), 11);
	assert_eq!(projection.ids()[0], PostId(11));
	assert!(projection.post(PostId(10)).is_some());
	assert_eq!(projection.post(PostId(2)).unwrap().reactions.mine, Some(Like));
	assert!(w.cache.read(|s| s.is_reaction_pending(EntityId::Post(PostId(2)), ME)));

	w.service.release_mutations();
	pending.await.unwrap().unwrap();
	assert_eq!(w.cache.projection(&dashboard).post(PostId(2)).unwrap().reactions.mine, Some(Like));
}

#[tokio::test(start_paused = true)]
async fn periodic_refresh_follows_the_configured_interval_until_dropped() {
	let w = world();
	let dashboard = FeedScope::membership([BOOKS, GAMES]);
	w.cache.load_more(&dashboard).await.unwrap();

	let handle = w.cache.periodic_refresh(dashboard.clone(), None);
	w.service.seed_post(fixtures::post(11, 1, 2, 200));
	tokio::time::sleep(Duration::from_secs(19)).await;
	assert!(w.cache.projection(&dashboard).post(PostId(11)).is_none());

	tokio::time::sleep(Duration::from_secs(2)).await;
	assert_eq!(w.cache.projection(&dashboard).ids()[0], PostId(11));

	drop(handle);
	w.service.seed_post(fixtures::post(12, 2, 2, 300));
	tokio::time::sleep(Duration::from_secs(61)).await;
	assert!(w.cache.projection(&dashboard).post(PostId(12)).is_none());
}

#[tokio::test(start_paused = true)]
async fn background_failures_reach_the_error_sink() {
	let w = world();
	let books = FeedScope::group(BOOKS);
	w.cache.load_more(&books).await.unwrap();

	let handle = w.cache.periodic_refresh(books.clone(), Some(Duration::from_secs(10)));
	w.service.fail_next_fetch(ServiceError::Timeout);
	tokio::time::sleep(Duration::from_secs(11)).await;
	assert_eq!(*w.errors.lock(), vec![CacheError::Transient(ServiceError::Timeout)]);

	w.service.seed_post(fixtures::post(11, 1, 2, 200));
	tokio::time::sleep(Duration::from_secs(10)).await;
	assert_eq!(w.cache.projection(&books).ids()[0], PostId(11));

	handle.cancel();
	assert!(handle.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn feeds_that_never_loaded_are_not_refreshed() {
	let w = world();
	let books = FeedScope::group(BOOKS);
	let _sub = w.cache.subscribe(books.clone(), |_| {});

	let _handle = w.cache.periodic_refresh(books.clone(), Some(Duration::from_secs(10)));
	tokio::time::sleep(Duration::from_secs(65)).await;
	assert!(w.service.fetch_log().is_empty());
	assert_eq!(w.cache.refresh(&books).await, Ok(0));
}
