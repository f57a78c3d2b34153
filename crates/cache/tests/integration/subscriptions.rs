use agora_cache::{CursorPhase, LoadOutcome};
use agora_model::ReactionKind::Like;
use agora_model::{EntityId, FeedScope, Mutation, PostId};
use pretty_assertions::assert_eq;

use crate::common::{BOOKS, GAMES, ME, Recorder, eventually, world};

fn like(post: i64) -> Mutation {
	Mutation::ReactToPost {
		post: PostId(post),
		reaction: Some(Like),
	}
}

#[tokio::test]
async fn subscribing_delivers_the_current_projection() {
	let w = world();
	let books = FeedScope::group(BOOKS);
	let recorder = Recorder::default();
	let _sub = w.cache.subscribe(books.clone(), recorder.callback());

	assert_eq!(recorder.count(), 1);
	let first = recorder.last();
	assert_eq!(first.phase, CursorPhase::Empty);
	assert!(first.is_empty());
}

#[tokio::test]
async fn page_loads_deliver_loading_then_loaded() {
	let w = world();
	let books = FeedScope::group(BOOKS);
	let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
	let _sub = w.cache.subscribe(books.clone(), {
		let seen = seen.clone();
		move |projection| seen.lock().push(projection.phase)
	});

	w.cache.load_more(&books).await.unwrap();
	assert_eq!(
		*seen.lock(),
		vec![
			CursorPhase::Empty,
			CursorPhase::Loading { page: 1 },
			CursorPhase::Exhausted { page: 1 }
		]
	);
}

#[tokio::test]
async fn unrelated_changes_are_not_delivered() {
	let w = world();
	let games = FeedScope::group(GAMES);
	let recorder = Recorder::default();
	let _sub = w.cache.subscribe(games.clone(), recorder.callback());
	w.cache.load_more(&games).await.unwrap();
	w.cache.load_more(&FeedScope::group(BOOKS)).await.unwrap();
	let before = recorder.count();

	w.cache.mutate(like(3)).await.unwrap();
	assert_eq!(recorder.count(), before);

	w.cache.mutate(like(4)).await.unwrap();
	assert_eq!(recorder.count(), before + 1);
	assert_eq!(recorder.last().post(PostId(4)).unwrap().reactions.mine, Some(Like));
}

#[tokio::test]
async fn last_unsubscribe_discards_the_cursor() {
	let w = world();
	let books = FeedScope::group(BOOKS);
	let first = w.cache.subscribe(books.clone(), |_| {});
	let second = w.cache.subscribe(books.clone(), |_| {});
	w.cache.load_more(&books).await.unwrap();

	drop(first);
	assert_eq!(w.cache.phase(&books), Some(CursorPhase::Exhausted { page: 1 }));

	assert_eq!(second.scope(), &books);
	drop(second);
	assert_eq!(w.cache.phase(&books), None);
	assert_eq!(w.cache.read(|s| s.post_count()), 5);
}

#[tokio::test]
async fn mutation_finishes_after_its_view_is_gone() {
	let w = world();
	let books = FeedScope::group(BOOKS);
	let sub = w.cache.subscribe(books.clone(), |_| {});
	w.cache.load_more(&books).await.unwrap();

	w.service.hold_mutations();
	let pending = tokio::spawn({
		let cache = w.cache.clone();
		async move { cache.mutate(like(1)).await }
	});
	w.service.mutations_started(1).await;
	drop(sub);
	w.service.release_mutations();

	pending.await.unwrap().unwrap();
	let subject = EntityId::Post(PostId(1));
	assert!(eventually(|| !w.cache.read(|s| s.is_reaction_pending(subject, ME))).await);
	assert!(w.cache.read(|s| s.has_reacted(subject, ME, Like)));
	assert_eq!(w.cache.phase(&books), None);
}

#[tokio::test]
async fn projections_follow_the_signed_in_user() {
	let w = world();
	let books = FeedScope::group(BOOKS);
	w.cache.load_more(&books).await.unwrap();
	w.cache.mutate(like(1)).await.unwrap();
	assert_eq!(w.cache.projection(&books).post(PostId(1)).unwrap().reactions.mine, Some(Like));

	w.auth.sign_out();
	let summary = w.cache.projection(&books).post(PostId(1)).unwrap().reactions.clone();
	assert_eq!(summary.mine, None);
	assert_eq!(summary.count(Like), 1);
}

#[tokio::test]
async fn page_landing_after_unmount_still_fills_the_store() {
	let w = world();
	let games = FeedScope::group(GAMES);
	let sub = w.cache.subscribe(games.clone(), |_| {});
	w.service.hold_fetches();
	let pending = tokio::spawn({
		let cache = w.cache.clone();
		let scope = games.clone();
		async move { cache.load_more(&scope).await }
	});
	w.service.fetches_started(1).await;
	drop(sub);
	w.service.release_fetches();

	assert_eq!(pending.await.unwrap(), Ok(LoadOutcome::Discarded));
	assert_eq!(w.cache.phase(&games), None);
	assert_eq!(w.cache.read(|s| s.posts_in_group(GAMES).len()), 5);
}
