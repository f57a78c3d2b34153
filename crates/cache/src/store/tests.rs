use std::collections::BTreeSet;

use agora_model::ReactionKind::{Like, Love};
use agora_testing::fixtures;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;

fn post_with_comments(id: i64, comments: &[i64]) -> PostRecord {
	let mut post = fixtures::post(id, 1, 10, id);
	post.comments = comments.iter().map(|c| fixtures::comment(*c, id, 20, *c)).collect();
	post
}

fn temp_comment(id: i64, post: i64) -> CommentRecord {
	fixtures::comment(id, post, 10, 500)
}

fn comment_ids(store: &EntityStore, post: i64) -> Vec<i64> {
	store.comments_of(PostId(post)).map(|c| c.id.0).collect()
}

#[test]
fn upsert_reports_changes() {
	let mut store = EntityStore::new();
	assert!(store.upsert(post_with_comments(1, &[10, 11])));
	assert!(!store.upsert(post_with_comments(1, &[10, 11])));

	let mut edited = post_with_comments(1, &[10, 11]);
	edited.body = "edited".into();
	assert!(store.upsert(edited));
	assert_eq!(store.post(PostId(1)).map(|p| p.body.as_str()), Some("edited"));
}

#[test]
fn snapshot_keeps_temporary_comments() {
	let mut store = EntityStore::new();
	store.upsert(post_with_comments(1, &[10]));
	store.upsert(temp_comment(-1, 1));
	assert_eq!(comment_ids(&store, 1), vec![10, -1]);

	store.upsert(post_with_comments(1, &[10, 11]));
	assert_eq!(comment_ids(&store, 1), vec![10, -1, 11]);
}

#[test]
fn snapshot_prunes_comments_without_tombstone() {
	let mut store = EntityStore::new();
	store.upsert(post_with_comments(1, &[10, 11]));
	store.upsert(post_with_comments(1, &[11]));
	assert_eq!(comment_ids(&store, 1), vec![11]);
	assert_eq!(store.comment(CommentId(10)), None);
	assert!(!store.is_tombstoned(EntityId::Comment(CommentId(10))));

	store.upsert(post_with_comments(1, &[10, 11]));
	assert_eq!(comment_ids(&store, 1), vec![11, 10]);
}

#[test]
fn snapshot_keeps_pending_reaction() {
	let mut store = EntityStore::new();
	let mut record = fixtures::post(1, 1, 10, 1);
	record.reactions.push(fixtures::reaction(2, Like));
	store.upsert(record);

	let subject = EntityId::Post(PostId(1));
	assert_eq!(store.patch_reaction(subject, UserId(5), Some(Love)), Some(None));
	store.set_reaction_pending(subject, UserId(5), true);

	store.upsert(fixtures::post(1, 1, 10, 1));
	assert_eq!(store.reaction_of(subject, UserId(5)), Some(Love));
	assert_eq!(store.reaction_of(subject, UserId(2)), None);

	store.set_reaction_pending(subject, UserId(5), false);
	store.upsert(fixtures::post(1, 1, 10, 1));
	assert_eq!(store.reaction_of(subject, UserId(5)), None);
}

#[test]
fn snapshot_keeps_pending_delete() {
	let mut store = EntityStore::new();
	store.upsert(fixtures::post(1, 1, 10, 1));
	assert!(store.set_pending_delete(EntityId::Post(PostId(1)), true));
	store.upsert(fixtures::post(1, 1, 10, 1));
	assert!(store.post(PostId(1)).is_some_and(|p| p.pending_delete));
}

#[test]
fn orphan_comments_are_ignored() {
	let mut store = EntityStore::new();
	assert!(!store.upsert(fixtures::comment(10, 99, 20, 1)));
	assert_eq!(store.comment_count(), 0);
}

#[test]
fn removing_a_post_cascades_and_tombstones() {
	let mut store = EntityStore::new();
	store.upsert(post_with_comments(1, &[10, 11]));
	store.set_reaction_pending(EntityId::Comment(CommentId(10)), UserId(5), true);

	assert!(store.remove(EntityId::Post(PostId(1))));
	assert_eq!(store.post_count(), 0);
	assert_eq!(store.comment_count(), 0);
	assert!(!store.is_reaction_pending(EntityId::Comment(CommentId(10)), UserId(5)));

	assert!(!store.upsert(post_with_comments(1, &[10, 11])));
	assert_eq!(store.post(PostId(1)), None);
}

#[test]
fn removing_a_comment_cascades_to_replies() {
	let mut store = EntityStore::new();
	let mut record = post_with_comments(1, &[10, 11]);
	let mut reply = fixtures::comment(12, 1, 30, 12);
	reply.parent = Some(CommentId(10));
	record.comments.push(reply);
	store.upsert(record);

	assert!(store.remove(EntityId::Comment(CommentId(10))));
	assert_eq!(comment_ids(&store, 1), vec![11]);
	assert!(store.is_tombstoned(EntityId::Comment(CommentId(12))));

	store.upsert(post_with_comments(1, &[10, 11]));
	assert_eq!(comment_ids(&store, 1), vec![11]);
}

#[test]
fn removing_temporary_ids_leaves_no_tombstone() {
	let mut store = EntityStore::new();
	store.upsert(fixtures::post(1, 1, 10, 1));
	store.upsert(temp_comment(-3, 1));
	assert!(store.remove(EntityId::Comment(CommentId(-3))));
	assert!(!store.is_tombstoned(EntityId::Comment(CommentId(-3))));
}

#[test]
fn removing_an_uncached_id_still_tombstones() {
	let mut store = EntityStore::new();
	assert!(!store.remove(EntityId::Post(PostId(4))));
	assert!(!store.upsert(fixtures::post(4, 1, 10, 4)));
}

#[test]
fn rekey_comment_keeps_position_and_replies() {
	let mut store = EntityStore::new();
	store.upsert(post_with_comments(1, &[10]));
	store.upsert(temp_comment(-1, 1));
	let mut reply = temp_comment(-2, 1);
	reply.parent = Some(CommentId(-1));
	store.upsert(reply);
	store.set_reaction_pending(EntityId::Comment(CommentId(-1)), UserId(5), true);
	store.upsert(post_with_comments(1, &[10, 11]));

	assert!(store.rekey_comment(CommentId(-1), CommentId(50)));
	assert_eq!(comment_ids(&store, 1), vec![10, 50, -2, 11]);
	assert_eq!(store.comment(CommentId(-2)).and_then(|c| c.parent), Some(CommentId(50)));
	assert!(store.is_reaction_pending(EntityId::Comment(CommentId(50)), UserId(5)));
	assert!(!store.rekey_comment(CommentId(-1), CommentId(50)));
}

#[test]
fn rekey_post_carries_comments() {
	let mut store = EntityStore::new();
	store.upsert(fixtures::post(-1, 1, 10, 1));
	store.upsert(temp_comment(-2, -1));

	assert!(store.rekey_post(PostId(-1), PostId(77)));
	assert_eq!(store.post(PostId(-1)), None);
	assert_eq!(store.post(PostId(77)).map(|p| p.id), Some(PostId(77)));
	assert_eq!(store.comment(CommentId(-2)).map(|c| c.post), Some(PostId(77)));
	assert_eq!(comment_ids(&store, 77), vec![-2]);
}

#[test]
fn rekey_post_folds_into_cached_copy() {
	let mut store = EntityStore::new();
	store.upsert(fixtures::post(-1, 1, 10, 1));
	store.upsert(temp_comment(-2, -1));
	store.upsert(post_with_comments(77, &[10]));

	assert!(store.rekey_post(PostId(-1), PostId(77)));
	assert_eq!(store.post_count(), 1);
	assert_eq!(comment_ids(&store, 77), vec![10, -2]);
}

#[test]
fn patch_rewrites_matching_authors() {
	let mut store = EntityStore::new();
	store.upsert(post_with_comments(1, &[10]));
	store.upsert(fixtures::post(2, 1, 30, 2));

	let avatar = Some(ImageRef("avatars/20.png".into()));
	let patch = EntityPatch::AuthorAvatar(avatar.clone());
	assert_eq!(store.apply_patch(|e| e.author().id == UserId(20), &patch), 1);
	assert_eq!(store.comment(CommentId(10)).and_then(|c| c.author.avatar.clone()), avatar);
	assert_eq!(store.apply_patch(|e| e.author().id == UserId(20), &patch), 0);

	let renamed = EntityPatch::AuthorName("renamed".into());
	assert_eq!(store.apply_patch(|e| e.author().id == UserId(10), &renamed), 1);
	assert_eq!(store.post(PostId(1)).map(|p| p.author.username.as_str()), Some("renamed"));
}

#[test]
fn evict_patch_removes_matches() {
	let mut store = EntityStore::new();
	store.upsert(post_with_comments(1, &[10]));
	store.upsert(fixtures::post(2, 1, 30, 2));
	assert_eq!(store.apply_patch(|e| e.id() == EntityId::Post(PostId(1)), &EntityPatch::Evict), 1);
	assert_eq!(store.post_count(), 1);
	assert_eq!(store.comment_count(), 0);
}

fn arb_post() -> impl Strategy<Value = PostRecord> {
	(
		1i64..20,
		prop::collection::btree_set(1i64..50, 0..6),
		prop::collection::vec((1u64..5, prop::sample::select(ReactionKind::ALL.to_vec())), 0..6),
	)
		.prop_map(|(id, comments, reactions)| {
			let comments: Vec<i64> = comments.into_iter().collect();
			let mut post = post_with_comments(id, &comments);
			post.reactions = reactions.into_iter().map(|(author, kind)| fixtures::reaction(author, kind)).collect();
			post
		})
}

proptest! {
	#[test]
	fn upsert_is_idempotent(posts in prop::collection::vec(arb_post(), 1..6)) {
		let mut store = EntityStore::new();
		for post in &posts {
			store.upsert(post.clone());
		}
		let once = store.clone();
		let last = posts.last().cloned();
		if let Some(last) = last {
			prop_assert!(!store.upsert(last));
		}
		prop_assert_eq!(store, once);
	}

	#[test]
	fn one_reaction_per_author(ops in prop::collection::vec((1u64..4, prop::option::of(prop::sample::select(ReactionKind::ALL.to_vec()))), 0..30)) {
		let mut store = EntityStore::new();
		store.upsert(fixtures::post(1, 1, 10, 1));
		let subject = EntityId::Post(PostId(1));
		for (author, kind) in &ops {
			store.patch_reaction(subject, UserId(*author), *kind);
		}

		let reacted: BTreeSet<u64> = (1u64..4)
			.filter(|a| ops.iter().rev().find(|(author, _)| author == a).is_some_and(|(_, kind)| kind.is_some()))
			.collect();
		let total: usize = ReactionKind::ALL.iter().map(|kind| store.reaction_count(subject, *kind)).sum();
		prop_assert_eq!(total, reacted.len());
	}
}
