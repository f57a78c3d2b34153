//! Identifier newtypes.
//!
//! Server-assigned post and comment ids are strictly positive. Negative ids are
//! reserved for entities created locally before the server has confirmed them,
//! so a placeholder can never collide with a real id.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

/// Identifier of a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub i64);

/// Opaque reference to a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Opaque reference to a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

impl PostId {
	/// Returns true for locally allocated placeholder ids.
	pub const fn is_temporary(self) -> bool {
		self.0 < 0
	}
}

impl CommentId {
	/// Returns true for locally allocated placeholder ids.
	pub const fn is_temporary(self) -> bool {
		self.0 < 0
	}
}

impl fmt::Display for PostId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "post#{}", self.0)
	}
}

impl fmt::Display for CommentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "comment#{}", self.0)
	}
}

impl fmt::Display for UserId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "user#{}", self.0)
	}
}

impl fmt::Display for GroupId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "group#{}", self.0)
	}
}

/// Identity of anything that can be stored, reacted to, or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityId {
	/// A post.
	Post(PostId),
	/// A comment.
	Comment(CommentId),
}

impl EntityId {
	/// Returns true if the wrapped id is a local placeholder.
	pub const fn is_temporary(self) -> bool {
		match self {
			Self::Post(id) => id.is_temporary(),
			Self::Comment(id) => id.is_temporary(),
		}
	}
}

impl From<PostId> for EntityId {
	fn from(id: PostId) -> Self {
		Self::Post(id)
	}
}

impl From<CommentId> for EntityId {
	fn from(id: CommentId) -> Self {
		Self::Comment(id)
	}
}

impl fmt::Display for EntityId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Post(id) => fmt::Display::fmt(id, f),
			Self::Comment(id) => fmt::Display::fmt(id, f),
		}
	}
}
