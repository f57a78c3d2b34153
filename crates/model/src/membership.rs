//! Group roles and the identity collaborator.

use serde::{Deserialize, Serialize};

use crate::entity::Author;
use crate::ids::{GroupId, UserId};

/// Role of a member within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	/// Owner. Exactly one per group.
	Admin,
	/// Moderator.
	Moderator,
	/// Regular member.
	User,
}

/// Membership of one user in one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
	/// Group.
	pub group: GroupId,
	/// Member.
	pub user: UserId,
	/// Role in the group.
	pub role: Role,
}

/// Read-only view of who the local user is.
///
/// Consulted for fail-fast permission checks before anything goes over the
/// network. The server remains the authority.
pub trait AuthContext: Send + Sync {
	/// Signed-in user, or `None` when anonymous.
	fn current_user(&self) -> Option<UserId>;

	/// Role of the signed-in user in `group`, or `None` when not a member.
	fn role_in(&self, group: GroupId) -> Option<Role>;

	/// Author summary stamped on locally created entities until the server
	/// returns the real one.
	fn current_author(&self) -> Option<Author> {
		self.current_user().map(|id| Author::new(id, ""))
	}
}
