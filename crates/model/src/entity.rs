//! Cached entities and the records the server sends for them.
//!
//! [`Post`] and [`Comment`] are the normalized shapes held by the cache: a post
//! refers to its comments by id only. [`PostRecord`] and [`CommentRecord`] are
//! the nested snapshots a server returns, carrying the full subtree.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::ids::{CommentId, GroupId, PostId, UserId};

/// Reference to an uploaded image. Upload mechanics live elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

/// Author summary embedded in every post and comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
	/// Account reference.
	pub id: UserId,
	/// Display name at the time the snapshot was taken.
	pub username: String,
	/// Avatar image, if the user uploaded one.
	#[serde(default)]
	pub avatar: Option<ImageRef>,
}

impl Author {
	/// Author summary without an avatar.
	pub fn new(id: UserId, username: impl Into<String>) -> Self {
		Self {
			id,
			username: username.into(),
			avatar: None,
		}
	}
}

/// Kind of reaction a user can leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
	/// Thumbs up.
	Like,
	/// Heart.
	Love,
	/// Laughing face.
	Haha,
	/// Surprised face.
	Wow,
	/// Sad face.
	Sad,
	/// Angry face.
	Angry,
}

impl ReactionKind {
	/// All kinds in display order.
	pub const ALL: [Self; 6] = [Self::Like, Self::Love, Self::Haha, Self::Wow, Self::Sad, Self::Angry];

	/// Wire name of the kind.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Like => "like",
			Self::Love => "love",
			Self::Haha => "haha",
			Self::Wow => "wow",
			Self::Sad => "sad",
			Self::Angry => "angry",
		}
	}
}

/// A single reaction as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
	/// Reacting user.
	pub author: UserId,
	/// Reaction kind.
	#[serde(rename = "type")]
	pub kind: ReactionKind,
}

/// Reactions on one subject, keyed by author.
///
/// Keying by author makes a second reaction from the same user an overwrite
/// rather than an append.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionSet {
	by_author: BTreeMap<UserId, ReactionKind>,
}

impl ReactionSet {
	/// Creates an empty set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds a set from wire reactions. Later entries win for a repeated author.
	pub fn from_reactions<'a>(reactions: impl IntoIterator<Item = &'a Reaction>) -> Self {
		let mut set = Self::new();
		for reaction in reactions {
			set.by_author.insert(reaction.author, reaction.kind);
		}
		set
	}

	/// Reaction left by `author`, if any.
	pub fn get(&self, author: UserId) -> Option<ReactionKind> {
		self.by_author.get(&author).copied()
	}

	/// Sets or clears the reaction of `author`, returning the previous value.
	pub fn set(&mut self, author: UserId, kind: Option<ReactionKind>) -> Option<ReactionKind> {
		match kind {
			Some(kind) => self.by_author.insert(author, kind),
			None => self.by_author.remove(&author),
		}
	}

	/// Number of reactions of `kind`.
	pub fn count(&self, kind: ReactionKind) -> usize {
		self.by_author.values().filter(|k| **k == kind).count()
	}

	/// Total number of reactions.
	pub fn len(&self) -> usize {
		self.by_author.len()
	}

	/// Returns true when nobody reacted.
	pub fn is_empty(&self) -> bool {
		self.by_author.is_empty()
	}

	/// Iterates `(author, kind)` pairs in author order.
	pub fn iter(&self) -> impl Iterator<Item = (UserId, ReactionKind)> + '_ {
		self.by_author.iter().map(|(author, kind)| (*author, *kind))
	}
}

/// Normalized post held by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
	/// Stable id.
	pub id: PostId,
	/// Who wrote it.
	pub author: Author,
	/// Owning group. A post belongs to exactly one group.
	pub group: GroupId,
	/// Text content.
	pub body: String,
	/// Attached image.
	pub image: Option<ImageRef>,
	/// Creation time.
	pub created_at: DateTime<Utc>,
	/// Comment ids in display order.
	pub comments: IndexSet<CommentId>,
	/// Reactions on the post itself.
	pub reactions: ReactionSet,
	/// Set while a local delete is waiting for the server.
	pub pending_delete: bool,
}

/// Normalized comment held by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
	/// Stable id.
	pub id: CommentId,
	/// Post the comment belongs to.
	pub post: PostId,
	/// Top-level comment this one replies to.
	pub parent: Option<CommentId>,
	/// Who wrote it.
	pub author: Author,
	/// Text content.
	pub body: String,
	/// Creation time.
	pub created_at: DateTime<Utc>,
	/// Reactions on the comment.
	pub reactions: ReactionSet,
	/// Set while a local delete is waiting for the server.
	pub pending_delete: bool,
}

/// Authoritative comment snapshot from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
	/// Stable id.
	pub id: CommentId,
	/// Post the comment belongs to.
	#[serde(rename = "post_id")]
	pub post: PostId,
	/// Parent comment for replies.
	#[serde(default, rename = "parent_id")]
	pub parent: Option<CommentId>,
	/// Who wrote it.
	#[serde(rename = "user")]
	pub author: Author,
	/// Text content.
	#[serde(rename = "text")]
	pub body: String,
	/// Creation time.
	pub created_at: DateTime<Utc>,
	/// Reactions on the comment.
	#[serde(default)]
	pub reactions: Vec<Reaction>,
}

/// Authoritative post snapshot from the server, including its subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
	/// Stable id.
	pub id: PostId,
	/// Who wrote it.
	#[serde(rename = "user")]
	pub author: Author,
	/// Owning group.
	#[serde(rename = "group_id")]
	pub group: GroupId,
	/// Text content.
	#[serde(rename = "content")]
	pub body: String,
	/// Attached image.
	#[serde(default)]
	pub image: Option<ImageRef>,
	/// Creation time.
	pub created_at: DateTime<Utc>,
	/// Comments in display order.
	#[serde(default)]
	pub comments: Vec<CommentRecord>,
	/// Reactions on the post.
	#[serde(default)]
	pub reactions: Vec<Reaction>,
}

/// Any authoritative snapshot the server can hand back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum EntityRecord {
	/// A post with its subtree.
	Post(PostRecord),
	/// A single comment.
	Comment(CommentRecord),
}

impl From<PostRecord> for EntityRecord {
	fn from(record: PostRecord) -> Self {
		Self::Post(record)
	}
}

impl From<CommentRecord> for EntityRecord {
	fn from(record: CommentRecord) -> Self {
		Self::Comment(record)
	}
}
