//! Read-only feed projections.
//!
//! [`project`] turns the store and a feed's cursor into the ordered list a view
//! renders. It never mutates either input, and every call reflects the store as
//! it is now: removing the last like from a post drops it from a "reacted"
//! activity feed on the next projection.

use std::collections::BTreeMap;

use agora_model::{ActivityKind, Comment, FeedScope, Post, PostId, ReactionKind, ReactionSet, UserId};

use crate::cursor::{CursorPhase, PageCursor};
use crate::store::EntityStore;

/// Per-kind counts plus the viewer's own reaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionSummary {
	/// Number of reactions of each kind present.
	pub counts: BTreeMap<ReactionKind, usize>,
	/// What the viewer reacted with.
	pub mine: Option<ReactionKind>,
}

impl ReactionSummary {
	fn of(reactions: &ReactionSet, viewer: Option<UserId>) -> Self {
		let mut counts = BTreeMap::new();
		for (_, kind) in reactions.iter() {
			*counts.entry(kind).or_insert(0) += 1;
		}
		Self {
			counts,
			mine: viewer.and_then(|v| reactions.get(v)),
		}
	}

	/// Count for one kind.
	pub fn count(&self, kind: ReactionKind) -> usize {
		self.counts.get(&kind).copied().unwrap_or(0)
	}
}

/// A comment ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentView {
	/// The comment.
	pub comment: Comment,
	/// Reactions on it.
	pub reactions: ReactionSummary,
	/// Direct replies, oldest first. Always empty for replies themselves.
	pub replies: Vec<CommentView>,
}

/// A post ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostView {
	/// The post.
	pub post: Post,
	/// Reactions on it.
	pub reactions: ReactionSummary,
	/// Top-level comments in display order, replies nested one level.
	pub comments: Vec<CommentView>,
}

impl PostView {
	/// Id of the post.
	pub fn id(&self) -> PostId {
		self.post.id
	}

	/// Number of visible comments including replies.
	pub fn comment_count(&self) -> usize {
		self.comments.iter().map(|c| 1 + c.replies.len()).sum()
	}
}

/// What a view displays for one feed scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
	/// Scope projected.
	pub scope: FeedScope,
	/// Pagination phase of the scope.
	pub phase: CursorPhase,
	/// Posts, newest first.
	pub posts: Vec<PostView>,
}

impl Projection {
	/// Number of posts.
	pub fn len(&self) -> usize {
		self.posts.len()
	}

	/// Returns true when there is nothing to show.
	pub fn is_empty(&self) -> bool {
		self.posts.is_empty()
	}

	/// Returns true unless the feed is exhausted.
	pub fn has_more(&self) -> bool {
		!matches!(self.phase, CursorPhase::Exhausted { .. })
	}

	/// Post ids in display order.
	pub fn ids(&self) -> Vec<PostId> {
		self.posts.iter().map(PostView::id).collect()
	}

	/// Looks up a post in the projection.
	pub fn post(&self, id: PostId) -> Option<&PostView> {
		self.posts.iter().find(|p| p.post.id == id)
	}
}

/// Returns true if `post` belongs to `scope` given the current store.
pub fn matches_scope(store: &EntityStore, scope: &FeedScope, post: &Post) -> bool {
	if post.pending_delete {
		return false;
	}
	match scope {
		FeedScope::Group { group } => post.group == *group,
		FeedScope::Membership { groups } => groups.contains(&post.group),
		FeedScope::AuthorActivity { user, kind } => match kind {
			ActivityKind::Authored => post.author.id == *user,
			ActivityKind::CommentedOn => store.comments_of(post.id).any(|c| c.author.id == *user && !c.pending_delete),
			ActivityKind::Reacted(kind) => post.reactions.get(*user) == Some(*kind),
		},
	}
}

/// Computes the projection of `scope`.
///
/// Paged scopes show the ids their cursor recorded; activity scopes show every
/// cached post that currently satisfies the activity filter. Either way posts
/// are resolved through the store, filtered by the scope predicate and ordered
/// newest first.
pub fn project(store: &EntityStore, cursor: Option<&PageCursor>, scope: &FeedScope, viewer: Option<UserId>) -> Projection {
	let mut posts: Vec<&Post> = if scope.is_paged() {
		cursor
			.into_iter()
			.flat_map(PageCursor::ids)
			.filter_map(|id| store.post(id))
			.filter(|post| matches_scope(store, scope, post))
			.collect()
	} else {
		store.posts().filter(|post| matches_scope(store, scope, post)).collect()
	};
	posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

	Projection {
		scope: scope.clone(),
		phase: cursor.map_or(CursorPhase::Empty, PageCursor::phase),
		posts: posts.into_iter().map(|post| post_view(store, post, viewer)).collect(),
	}
}

fn post_view(store: &EntityStore, post: &Post, viewer: Option<UserId>) -> PostView {
	let visible: Vec<&Comment> = store.comments_of(post.id).filter(|c| !c.pending_delete).collect();
	let comments = visible
		.iter()
		.filter(|c| c.parent.is_none_or(|parent| !visible.iter().any(|v| v.id == parent)))
		.map(|top| CommentView {
			comment: (*top).clone(),
			reactions: ReactionSummary::of(&top.reactions, viewer),
			replies: visible
				.iter()
				.filter(|reply| reply.parent == Some(top.id))
				.map(|reply| CommentView {
					comment: (*reply).clone(),
					reactions: ReactionSummary::of(&reply.reactions, viewer),
					replies: Vec::new(),
				})
				.collect(),
		})
		.collect();

	PostView {
		post: post.clone(),
		reactions: ReactionSummary::of(&post.reactions, viewer),
		comments,
	}
}
