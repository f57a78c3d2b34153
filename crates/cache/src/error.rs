use agora_model::{EntityId, FeedScope, GroupId, ServiceError};
use thiserror::Error;

/// Result alias for cache operations.
pub type Result<T, E = CacheError> = std::result::Result<T, E>;

/// Failure surfaced to views.
///
/// Local precondition failures never reach the network. Every other variant is
/// produced after the store has been rolled back or reconciled, so the cache is
/// consistent whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
	/// Nobody is signed in, or the server rejected the credentials.
	#[error("not signed in")]
	Unauthorized,
	/// The local user may not perform the action.
	#[error("{action} denied: {reason}")]
	PermissionDenied {
		/// Operation label.
		action: &'static str,
		/// Why it was refused.
		reason: &'static str,
	},
	/// The target is not in the cache, so no precondition can be checked.
	#[error("{0} is not cached")]
	UnknownEntity(EntityId),
	/// The target was created locally and the server has not confirmed it yet.
	#[error("{0} has not been confirmed by the server yet")]
	Unconfirmed(EntityId),
	/// The request is malformed.
	#[error("invalid input: {0}")]
	InvalidInput(&'static str),
	/// The server state changed underneath the mutation; the entity was re-fetched.
	#[error("{0} changed on the server")]
	Conflict(EntityId),
	/// The target no longer exists upstream and was evicted.
	#[error("{0} no longer exists")]
	NotFound(EntityId),
	/// The server state of a group changed underneath the mutation.
	#[error("{0} changed on the server")]
	GroupConflict(GroupId),
	/// The group no longer exists upstream.
	#[error("{0} no longer exists")]
	GroupNotFound(GroupId),
	/// The feed cannot be served.
	#[error("feed {0} is unavailable")]
	FeedUnavailable(FeedScope),
	/// Network failure or timeout; the local edit was rolled back.
	#[error("transient failure: {0}")]
	Transient(#[source] ServiceError),
	/// The task driving the operation was torn down with its runtime.
	#[error("operation aborted")]
	Aborted,
}

impl CacheError {
	/// Returns true when retrying the same call may succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transient(error) if error.is_transient())
	}

	/// Server-side refusal of `action`.
	pub(crate) fn rejected(action: &'static str) -> Self {
		Self::PermissionDenied {
			action,
			reason: "rejected by the server",
		}
	}
}
