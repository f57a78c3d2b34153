//! The remote data collaborator.
//!
//! [`DataService`] performs network calls and nothing more: it never touches
//! cached state. Any transport may implement it. Timeouts are the
//! implementation's responsibility and surface as [`ServiceError::Timeout`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{EntityRecord, ImageRef, PostRecord, ReactionKind};
use crate::ids::{CommentId, EntityId, GroupId, PostId};
use crate::scope::FeedScope;

/// Failure reported by a [`DataService`] call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
	/// Missing or expired credentials.
	#[error("unauthorized")]
	Unauthorized,
	/// The target no longer exists upstream.
	#[error("not found")]
	NotFound,
	/// The server refused the operation for this user.
	#[error("permission denied")]
	PermissionDenied,
	/// The server state changed underneath the request.
	#[error("conflict")]
	Conflict,
	/// Transport-level failure.
	#[error("network error: {0}")]
	Network(String),
	/// The request did not complete in time.
	#[error("request timed out")]
	Timeout,
}

impl ServiceError {
	/// Returns true for failures worth retrying unchanged.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Network(_) | Self::Timeout)
	}
}

/// One page of a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
	/// Posts in server order, newest first.
	pub posts: Vec<PostRecord>,
	/// Whether a further page exists.
	pub has_more: bool,
}

/// Discriminant of a [`Mutation`], used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
	/// See [`Mutation::ReactToPost`].
	ReactToPost,
	/// See [`Mutation::ReactToComment`].
	ReactToComment,
	/// See [`Mutation::AddComment`].
	AddComment,
	/// See [`Mutation::CreatePost`].
	CreatePost,
	/// See [`Mutation::DeletePost`].
	DeletePost,
	/// See [`Mutation::DeleteComment`].
	DeleteComment,
	/// See [`Mutation::DeleteGroup`].
	DeleteGroup,
}

impl MutationKind {
	/// Stable label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::ReactToPost => "react_to_post",
			Self::ReactToComment => "react_to_comment",
			Self::AddComment => "add_comment",
			Self::CreatePost => "create_post",
			Self::DeletePost => "delete_post",
			Self::DeleteComment => "delete_comment",
			Self::DeleteGroup => "delete_group",
		}
	}
}

/// A user-initiated change and its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
	/// Set or clear (`None`) the local user's reaction on a post.
	ReactToPost {
		/// Target post.
		post: PostId,
		/// New reaction, `None` to remove.
		reaction: Option<ReactionKind>,
	},
	/// Set or clear (`None`) the local user's reaction on a comment.
	ReactToComment {
		/// Target comment.
		comment: CommentId,
		/// New reaction, `None` to remove.
		reaction: Option<ReactionKind>,
	},
	/// Comment on a post, optionally as a reply.
	AddComment {
		/// Target post.
		post: PostId,
		/// Comment text.
		body: String,
		/// Comment being replied to.
		#[serde(default)]
		reply_to: Option<CommentId>,
	},
	/// Publish a new post in a group.
	CreatePost {
		/// Target group.
		group: GroupId,
		/// Post text.
		body: String,
		/// Already-uploaded image.
		#[serde(default)]
		image: Option<ImageRef>,
	},
	/// Delete a post and its comments.
	DeletePost {
		/// Target post.
		post: PostId,
	},
	/// Delete a comment.
	DeleteComment {
		/// Target comment.
		comment: CommentId,
	},
	/// Delete a group with all of its posts.
	DeleteGroup {
		/// Target group.
		group: GroupId,
	},
}

impl Mutation {
	/// Discriminant of this mutation.
	pub fn kind(&self) -> MutationKind {
		match self {
			Self::ReactToPost { .. } => MutationKind::ReactToPost,
			Self::ReactToComment { .. } => MutationKind::ReactToComment,
			Self::AddComment { .. } => MutationKind::AddComment,
			Self::CreatePost { .. } => MutationKind::CreatePost,
			Self::DeletePost { .. } => MutationKind::DeletePost,
			Self::DeleteComment { .. } => MutationKind::DeleteComment,
			Self::DeleteGroup { .. } => MutationKind::DeleteGroup,
		}
	}

	/// Entity the mutation targets, if it targets a single cached entity.
	pub fn target(&self) -> Option<EntityId> {
		match self {
			Self::ReactToPost { post, .. } | Self::AddComment { post, .. } | Self::DeletePost { post } => Some(EntityId::Post(*post)),
			Self::ReactToComment { comment, .. } | Self::DeleteComment { comment } => Some(EntityId::Comment(*comment)),
			Self::CreatePost { .. } | Self::DeleteGroup { .. } => None,
		}
	}
}

/// Server reply to a [`Mutation`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResponse {
	/// Authoritative snapshot of the affected entity, when the server sends one.
	#[serde(default)]
	pub entity: Option<EntityRecord>,
	/// Whether the server accepted the change.
	pub ack: bool,
}

impl MutationResponse {
	/// Bare acknowledgement.
	pub fn ack() -> Self {
		Self { entity: None, ack: true }
	}

	/// Acknowledgement carrying the authoritative entity.
	pub fn with_entity(entity: impl Into<EntityRecord>) -> Self {
		Self {
			entity: Some(entity.into()),
			ack: true,
		}
	}
}

/// Network collaborator consumed by the cache.
#[async_trait]
pub trait DataService: Send + Sync {
	/// Fetches page `page` (1-based) of `scope`.
	async fn fetch_page(&self, scope: &FeedScope, page: u32, page_size: u32) -> Result<Page, ServiceError>;

	/// Fetches a single post with its subtree.
	async fn fetch_post(&self, post: PostId) -> Result<PostRecord, ServiceError>;

	/// Applies a mutation on the server.
	async fn mutate(&self, mutation: &Mutation) -> Result<MutationResponse, ServiceError>;
}
