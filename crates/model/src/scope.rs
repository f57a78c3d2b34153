//! Feed scopes: which subset of posts a view displays.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::ReactionKind;
use crate::ids::{GroupId, UserId};

/// How a user relates to the posts of an activity feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reaction", rename_all = "snake_case")]
pub enum ActivityKind {
	/// Posts the user wrote.
	Authored,
	/// Posts the user commented on.
	CommentedOn,
	/// Posts the user reacted to with the given kind.
	Reacted(ReactionKind),
}

/// Parameters identifying the posts a view displays.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum FeedScope {
	/// A single group's feed.
	Group {
		/// Group shown.
		group: GroupId,
	},
	/// Dashboard: union of several groups.
	Membership {
		/// Groups merged into the feed.
		groups: BTreeSet<GroupId>,
	},
	/// A profile tab filtered by the user's activity.
	AuthorActivity {
		/// Profile owner.
		user: UserId,
		/// Activity filter.
		kind: ActivityKind,
	},
}

impl FeedScope {
	/// Feed of a single group.
	pub fn group(group: GroupId) -> Self {
		Self::Group { group }
	}

	/// Dashboard feed across `groups`.
	pub fn membership(groups: impl IntoIterator<Item = GroupId>) -> Self {
		Self::Membership {
			groups: groups.into_iter().collect(),
		}
	}

	/// Profile activity feed.
	pub fn activity(user: UserId, kind: ActivityKind) -> Self {
		Self::AuthorActivity { user, kind }
	}

	/// Returns true when the projection follows the ids recorded by paging.
	///
	/// Activity scopes are computed over every cached post instead.
	pub fn is_paged(&self) -> bool {
		!matches!(self, Self::AuthorActivity { .. })
	}

	/// Returns true if posts of `group` can appear in this scope by group alone.
	pub fn covers_group(&self, group: GroupId) -> bool {
		match self {
			Self::Group { group: g } => *g == group,
			Self::Membership { groups } => groups.contains(&group),
			Self::AuthorActivity { .. } => false,
		}
	}
}

impl fmt::Display for FeedScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Group { group } => write!(f, "group({})", group.0),
			Self::Membership { groups } => {
				write!(f, "membership(")?;
				for (i, group) in groups.iter().enumerate() {
					if i > 0 {
						write!(f, ",")?;
					}
					write!(f, "{}", group.0)?;
				}
				write!(f, ")")
			}
			Self::AuthorActivity { user, kind } => match kind {
				ActivityKind::Authored => write!(f, "activity({}, authored)", user.0),
				ActivityKind::CommentedOn => write!(f, "activity({}, commented)", user.0),
				ActivityKind::Reacted(r) => write!(f, "activity({}, reacted:{})", user.0, r.as_str()),
			},
		}
	}
}
