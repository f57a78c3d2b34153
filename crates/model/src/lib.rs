//! Shared vocabulary of the agora feed cache.
//!
//! Entities ([`Post`], [`Comment`], [`ReactionSet`]), the snapshots a server
//! returns for them ([`PostRecord`], [`CommentRecord`]), feed scopes, and the
//! two collaborators the cache consumes: [`DataService`] for network calls and
//! [`AuthContext`] for the local identity.

pub mod entity;
pub mod ids;
pub mod membership;
pub mod scope;
pub mod service;

pub use entity::{Author, Comment, CommentRecord, EntityRecord, ImageRef, Post, PostRecord, Reaction, ReactionKind, ReactionSet};
pub use ids::{CommentId, EntityId, GroupId, PostId, UserId};
pub use membership::{AuthContext, Membership, Role};
pub use scope::{ActivityKind, FeedScope};
pub use service::{DataService, Mutation, MutationKind, MutationResponse, Page, ServiceError};
