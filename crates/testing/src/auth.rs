use std::collections::HashMap;

use agora_model::{AuthContext, GroupId, Membership, Role, UserId};
use parking_lot::RwLock;

/// [`AuthContext`] with a fixed identity and editable group roles.
#[derive(Debug, Default)]
pub struct StaticAuth {
	user: RwLock<Option<UserId>>,
	roles: RwLock<HashMap<GroupId, Role>>,
}

impl StaticAuth {
	/// Nobody signed in.
	pub fn anonymous() -> Self {
		Self::default()
	}

	/// Signed in as `user` with no memberships.
	pub fn signed_in(user: UserId) -> Self {
		Self {
			user: RwLock::new(Some(user)),
			roles: RwLock::default(),
		}
	}

	/// Signed in as `user` with the roles `memberships` grant that user.
	/// Memberships of other users are ignored.
	pub fn from_memberships(user: UserId, memberships: impl IntoIterator<Item = Membership>) -> Self {
		let auth = Self::signed_in(user);
		auth.roles.write().extend(memberships.into_iter().filter(|m| m.user == user).map(|m| (m.group, m.role)));
		auth
	}

	/// Adds a membership.
	pub fn with_role(self, group: GroupId, role: Role) -> Self {
		self.roles.write().insert(group, role);
		self
	}

	/// Changes or drops (`None`) a membership.
	pub fn set_role(&self, group: GroupId, role: Option<Role>) {
		let mut roles = self.roles.write();
		match role {
			Some(role) => roles.insert(group, role),
			None => roles.remove(&group),
		};
	}

	/// Signs the user out.
	pub fn sign_out(&self) {
		*self.user.write() = None;
	}
}

impl AuthContext for StaticAuth {
	fn current_user(&self) -> Option<UserId> {
		*self.user.read()
	}

	fn role_in(&self, group: GroupId) -> Option<Role> {
		self.roles.read().get(&group).copied()
	}
}
