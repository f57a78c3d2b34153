use agora_cache::{CacheError, CursorPhase, EntityPatch, LoadOutcome};
use agora_model::ReactionKind::Like;
use agora_model::{ActivityKind, EntityId, FeedScope, GroupId, ImageRef, Mutation, PostId, ServiceError};
use pretty_assertions::assert_eq;

use crate::common::{BOOKS, FRIEND, GAMES, ME, Recorder, world};

fn like(post: i64) -> Mutation {
	Mutation::ReactToPost {
		post: PostId(post),
		reaction: Some(Like),
	}
}

fn ids(raw: &[i64]) -> Vec<PostId> {
	raw.iter().copied().map(PostId).collect()
}

#[tokio::test]
async fn dashboard_pages_keep_an_optimistic_like() {
	let w = world();
	let dashboard = FeedScope::membership([BOOKS, GAMES]);
	let recorder = Recorder::default();
	let _sub = w.cache.subscribe(dashboard.clone(), recorder.callback());

	let first = w.cache.load_more(&dashboard).await.unwrap();
	assert_eq!(
		first,
		LoadOutcome::Fetched {
			page: 1,
			added: 5,
			has_more: true
		}
	);
	assert_eq!(recorder.last().ids(), ids(&[1, 2, 3, 4, 5]));

	w.service.hold_mutations();
	let pending = tokio::spawn({
		let cache = w.cache.clone();
		async move { cache.mutate(like(3)).await }
	});
	w.service.mutations_started(1).await;
	let shown = recorder.last();
	let post = shown.post(PostId(3)).unwrap();
	assert_eq!(post.reactions.mine, Some(Like));
	assert_eq!(post.reactions.count(Like), 1);

	w.service.release_mutations();
	pending.await.unwrap().unwrap();

	let second = w.cache.load_more(&dashboard).await.unwrap();
	assert_eq!(
		second,
		LoadOutcome::Fetched {
			page: 2,
			added: 5,
			has_more: false
		}
	);
	let projection = w.cache.projection(&dashboard);
	assert_eq!(projection.len(), 10);
	assert_eq!(projection.phase, CursorPhase::Exhausted { page: 2 });
	assert!(!projection.has_more());
	assert_eq!(projection.post(PostId(3)).unwrap().reactions.mine, Some(Like));
	assert_eq!(w.cache.load_more(&dashboard).await, Ok(LoadOutcome::Exhausted));
}

#[tokio::test]
async fn a_reaction_shows_in_every_feed_holding_the_post() {
	let w = world();
	let dashboard = FeedScope::membership([BOOKS, GAMES]);
	let books = FeedScope::group(BOOKS);
	let my_likes = FeedScope::activity(ME, ActivityKind::Reacted(Like));
	w.cache.load_more(&dashboard).await.unwrap();
	w.cache.load_more(&books).await.unwrap();
	assert!(w.cache.projection(&my_likes).is_empty());

	w.cache.mutate(like(3)).await.unwrap();
	for scope in [&dashboard, &books] {
		let projection = w.cache.projection(scope);
		assert_eq!(projection.post(PostId(3)).unwrap().reactions.mine, Some(Like), "{scope}");
	}
	assert_eq!(w.cache.projection(&my_likes).ids(), ids(&[3]));

	w.cache
		.mutate(Mutation::ReactToPost {
			post: PostId(3),
			reaction: None,
		})
		.await
		.unwrap();
	assert!(w.cache.projection(&my_likes).is_empty());
	assert_eq!(w.cache.read(|s| s.reaction_count(EntityId::Post(PostId(3)), Like)), 0);
}

#[tokio::test]
async fn group_feed_shows_only_its_group() {
	let w = world();
	let games = FeedScope::group(GAMES);
	w.cache.load_more(&games).await.unwrap();
	assert_eq!(w.cache.projection(&games).ids(), ids(&[2, 4, 6, 8, 10]));
}

#[tokio::test]
async fn reset_returns_to_page_one_and_keeps_entities() {
	let w = world();
	let dashboard = FeedScope::membership([BOOKS, GAMES]);
	w.cache.load_more(&dashboard).await.unwrap();
	w.cache.load_more(&dashboard).await.unwrap();

	w.cache.reset(&dashboard);
	assert_eq!(w.cache.phase(&dashboard), Some(CursorPhase::Empty));
	assert!(w.cache.projection(&dashboard).is_empty());
	assert_eq!(w.cache.read(|s| s.post_count()), 10);

	w.cache.load_more(&dashboard).await.unwrap();
	assert_eq!(w.service.fetch_log().last(), Some(&(dashboard.clone(), 1)));
	assert_eq!(w.cache.projection(&dashboard).len(), 5);
}

#[tokio::test]
async fn failed_page_load_can_be_retried() {
	let w = world();
	let books = FeedScope::group(BOOKS);
	w.service.fail_next_fetch(ServiceError::Network("offline".into()));
	let err = w.cache.load_more(&books).await.unwrap_err();
	assert!(err.is_retryable());
	assert_eq!(w.cache.phase(&books), Some(CursorPhase::Empty));

	w.cache.load_more(&books).await.unwrap();
	assert_eq!(w.cache.projection(&books).len(), 5);
}

#[tokio::test]
async fn foreign_group_feed_is_refused() {
	let w = world();
	let hidden = FeedScope::group(GroupId(9));
	let err = w.cache.load_more(&hidden).await.unwrap_err();
	assert!(matches!(err, CacheError::PermissionDenied { action: "load_feed", .. }));
	assert_eq!(w.cache.phase(&hidden), Some(CursorPhase::Empty));
}

#[tokio::test]
async fn avatar_change_reaches_every_cached_post() {
	let w = world();
	let dashboard = FeedScope::membership([BOOKS, GAMES]);
	let recorder = Recorder::default();
	let _sub = w.cache.subscribe(dashboard.clone(), recorder.callback());
	w.cache.load_more(&dashboard).await.unwrap();
	let deliveries = recorder.count();

	let avatar = Some(ImageRef("avatars/friend-v2.png".into()));
	let changed = w.cache.on_external_invalidate(|e| e.author().id == FRIEND, EntityPatch::AuthorAvatar(avatar.clone()));
	assert_eq!(changed, 5);
	assert_eq!(recorder.count(), deliveries + 1);
	assert!(recorder.last().posts.iter().all(|p| p.post.author.avatar == avatar));
	assert_eq!(w.service.fetch_log().len(), 1);
}

#[tokio::test]
async fn evicted_posts_do_not_come_back() {
	let w = world();
	let dashboard = FeedScope::membership([BOOKS, GAMES]);
	w.cache.load_more(&dashboard).await.unwrap();

	let evicted = w.cache.on_external_invalidate(|e| e.id() == EntityId::Post(PostId(2)), EntityPatch::Evict);
	assert_eq!(evicted, 1);
	assert_eq!(w.cache.projection(&dashboard).ids(), ids(&[1, 3, 4, 5]));

	w.cache.refresh(&dashboard).await.unwrap();
	assert_eq!(w.cache.projection(&dashboard).ids(), ids(&[1, 3, 4, 5]));
}

#[tokio::test]
async fn refresh_post_picks_up_server_changes() {
	let w = world();
	let books = FeedScope::group(BOOKS);
	w.cache.load_more(&books).await.unwrap();

	w.service.set_reaction(PostId(1), FRIEND, Some(Like));
	w.cache.refresh_post(PostId(1)).await.unwrap();
	assert_eq!(w.cache.projection(&books).post(PostId(1)).unwrap().reactions.count(Like), 1);

	w.service.remove_post(PostId(1));
	assert_eq!(w.cache.refresh_post(PostId(1)).await, Err(CacheError::NotFound(EntityId::Post(PostId(1)))));
	assert!(w.cache.projection(&books).post(PostId(1)).is_none());
}

#[tokio::test]
async fn page_landing_after_a_reset_still_fills_the_store() {
	let w = world();
	let books = FeedScope::group(BOOKS);
	w.service.hold_fetches();
	let pending = tokio::spawn({
		let cache = w.cache.clone();
		let scope = books.clone();
		async move { cache.load_more(&scope).await }
	});
	w.service.fetches_started(1).await;
	w.cache.reset(&books);
	w.service.release_fetches();

	assert_eq!(pending.await.unwrap(), Ok(LoadOutcome::Discarded));
	assert!(w.cache.read(|s| s.post(PostId(1)).is_some()));
	assert_eq!(w.cache.read(|s| s.post_count()), 5);
	assert_eq!(w.cache.phase(&books), Some(CursorPhase::Empty));
	assert!(w.cache.projection(&books).is_empty());
}
