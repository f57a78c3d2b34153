//! Optimistic mutations.
//!
//! Every mutation runs the same pipeline:
//!
//! 1. check local preconditions and fail fast without a request,
//! 2. apply a speculative delta to the store and remember its inverse,
//! 3. send the mutation to the [`DataService`](agora_model::DataService),
//! 4. on success replace the delta with the server's truth (rekeying
//!    temporary ids), on failure apply the inverse.
//!
//! Mutations on the same entity are serialized through [`locks::EntityLocks`]:
//! the second one waits until the first has been reconciled. Mutations on
//! different entities proceed independently.

pub(crate) mod locks;


use std::sync::atomic::{AtomicI64, Ordering};

use agora_model::{
	Author, Comment, CommentId, CommentRecord, EntityId, EntityRecord, FeedScope, GroupId, Mutation, MutationKind, MutationResponse, Post, PostId, PostRecord,
	ReactionKind, Role, ServiceError, UserId,
};
use chrono::Utc;
use tracing::{debug, warn};

use self::locks::LockKey;
use crate::cache::{CacheState, Shared};
use crate::error::{CacheError, Result};
use crate::store::EntityStore;

/// Result of a confirmed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOutcome {
	/// Mutation that completed.
	pub kind: MutationKind,
	/// Server id of the entity the mutation created, if any.
	pub created: Option<EntityId>,
}

/// Allocator of temporary ids. Hands out -1, -2, ... so placeholders never
/// collide with server ids.
#[derive(Debug)]
pub(crate) struct TempIds(AtomicI64);

impl TempIds {
	pub(crate) fn new() -> Self {
		Self(AtomicI64::new(-1))
	}

	fn next(&self) -> i64 {
		self.0.fetch_sub(1, Ordering::Relaxed)
	}

	pub(crate) fn post(&self) -> PostId {
		PostId(self.next())
	}

	pub(crate) fn comment(&self) -> CommentId {
		CommentId(self.next())
	}
}

/// Inverse of a speculative delta.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Undo {
	Reaction { subject: EntityId, previous: Option<ReactionKind> },
	Comment { temp: CommentId, post: PostId },
	Post { temp: PostId, group: GroupId },
	Delete { id: EntityId },
	Nothing,
}

/// A mutation that passed its preconditions and has been applied locally.
#[derive(Debug)]
struct Plan {
	request: Mutation,
	undo: Undo,
}

fn lock_key(mutation: &Mutation) -> Option<LockKey> {
	match mutation {
		Mutation::CreatePost { .. } => None,
		Mutation::DeleteGroup { group } => Some(LockKey::Group(*group)),
		other => other.target().map(LockKey::Entity),
	}
}

fn denied(action: &'static str, reason: &'static str) -> CacheError {
	CacheError::PermissionDenied { action, reason }
}

fn cached_post(store: &EntityStore, id: PostId) -> Result<&Post> {
	if id.is_temporary() {
		return Err(CacheError::Unconfirmed(EntityId::Post(id)));
	}
	store.post(id).ok_or(CacheError::UnknownEntity(EntityId::Post(id)))
}

fn cached_comment(store: &EntityStore, id: CommentId) -> Result<(&Comment, GroupId)> {
	if id.is_temporary() {
		return Err(CacheError::Unconfirmed(EntityId::Comment(id)));
	}
	let comment = store.comment(id).ok_or(CacheError::UnknownEntity(EntityId::Comment(id)))?;
	let post = store.post(comment.post).ok_or(CacheError::UnknownEntity(EntityId::Post(comment.post)))?;
	Ok((comment, post.group))
}

fn require_body(body: &str, what: &'static str) -> Result<()> {
	if body.trim().is_empty() { Err(CacheError::InvalidInput(what)) } else { Ok(()) }
}

impl Shared {
	pub(crate) async fn mutate(&self, mutation: Mutation) -> Result<MutationOutcome> {
		let kind = mutation.kind();
		let user = self.auth.current_user().ok_or(CacheError::Unauthorized)?;
		let _guard = match lock_key(&mutation) {
			Some(key) => Some(self.locks.acquire(key).await),
			None => None,
		};

		let plan = self.update(|state| self.speculate(state, user, mutation))?;
		debug!(kind = kind.as_str(), target = ?plan.request.target(), "mutation.issue");

		let response = self.service.mutate(&plan.request).await.and_then(|response| {
			if response.ack { Ok(response) } else { Err(ServiceError::Conflict) }
		});
		match response {
			Ok(response) => self.confirm(user, plan, response).await,
			Err(error) => self.recover(user, plan, error).await,
		}
	}

	fn require_member(&self, group: GroupId, action: &'static str) -> Result<()> {
		match self.auth.role_in(group) {
			Some(_) => Ok(()),
			None => Err(denied(action, "not a member of the group")),
		}
	}

	fn require_author_or_admin(&self, user: UserId, author: &Author, group: GroupId, action: &'static str) -> Result<()> {
		if author.id == user || self.auth.role_in(group) == Some(Role::Admin) {
			Ok(())
		} else {
			Err(denied(action, "only the author or a group admin may delete it"))
		}
	}

	/// Checks preconditions and applies the speculative delta.
	fn speculate(&self, state: &mut CacheState, user: UserId, mutation: Mutation) -> Result<Plan> {
		let action = mutation.kind().as_str();
		match mutation {
			Mutation::ReactToPost { post, reaction } => {
				let group = cached_post(&state.store, post)?.group;
				self.require_member(group, action)?;
				let subject = EntityId::Post(post);
				let previous = state.store.patch_reaction(subject, user, reaction).flatten();
				state.store.set_reaction_pending(subject, user, true);
				Ok(Plan {
					request: Mutation::ReactToPost { post, reaction },
					undo: Undo::Reaction { subject, previous },
				})
			}
			Mutation::ReactToComment { comment, reaction } => {
				let (_, group) = cached_comment(&state.store, comment)?;
				self.require_member(group, action)?;
				let subject = EntityId::Comment(comment);
				let previous = state.store.patch_reaction(subject, user, reaction).flatten();
				state.store.set_reaction_pending(subject, user, true);
				Ok(Plan {
					request: Mutation::ReactToComment { comment, reaction },
					undo: Undo::Reaction { subject, previous },
				})
			}
			Mutation::AddComment { post, body, reply_to } => {
				require_body(&body, "comment body is empty")?;
				let group = cached_post(&state.store, post)?.group;
				self.require_member(group, action)?;
				let reply_to = match reply_to {
					Some(parent) => {
						let (parent_comment, _) = cached_comment(&state.store, parent)?;
						if parent_comment.post != post {
							return Err(CacheError::InvalidInput("reply target belongs to another post"));
						}
						Some(parent_comment.parent.unwrap_or(parent))
					}
					None => None,
				};

				let temp = self.temp_ids.comment();
				state.store.upsert_comment(CommentRecord {
					id: temp,
					post,
					parent: reply_to,
					author: self.auth.current_author().unwrap_or_else(|| Author::new(user, "")),
					body: body.clone(),
					created_at: Utc::now(),
					reactions: Vec::new(),
				});
				Ok(Plan {
					request: Mutation::AddComment { post, body, reply_to },
					undo: Undo::Comment { temp, post },
				})
			}
			Mutation::CreatePost { group, body, image } => {
				require_body(&body, "post body is empty")?;
				self.require_member(group, action)?;

				let temp = self.temp_ids.post();
				state.store.upsert_post(PostRecord {
					id: temp,
					author: self.auth.current_author().unwrap_or_else(|| Author::new(user, "")),
					group,
					body: body.clone(),
					image: image.clone(),
					created_at: Utc::now(),
					comments: Vec::new(),
					reactions: Vec::new(),
				});
				state.pin_post(group, temp);
				Ok(Plan {
					request: Mutation::CreatePost { group, body, image },
					undo: Undo::Post { temp, group },
				})
			}
			Mutation::DeletePost { post } => {
				let target = cached_post(&state.store, post)?;
				self.require_author_or_admin(user, &target.author, target.group, action)?;
				let id = EntityId::Post(post);
				state.store.set_pending_delete(id, true);
				Ok(Plan {
					request: Mutation::DeletePost { post },
					undo: Undo::Delete { id },
				})
			}
			Mutation::DeleteComment { comment } => {
				let (target, group) = cached_comment(&state.store, comment)?;
				self.require_author_or_admin(user, &target.author, group, action)?;
				let id = EntityId::Comment(comment);
				state.store.set_pending_delete(id, true);
				Ok(Plan {
					request: Mutation::DeleteComment { comment },
					undo: Undo::Delete { id },
				})
			}
			Mutation::DeleteGroup { group } => {
				if self.auth.role_in(group) != Some(Role::Admin) {
					return Err(denied(action, "only the group admin may delete the group"));
				}
				Ok(Plan {
					request: Mutation::DeleteGroup { group },
					undo: Undo::Nothing,
				})
			}
		}
	}

	/// Replaces the speculative delta with the server's answer.
	async fn confirm(&self, user: UserId, plan: Plan, response: MutationResponse) -> Result<MutationOutcome> {
		let kind = plan.request.kind();
		let mut created = None;
		match plan.undo {
			Undo::Reaction { subject, .. } => self.update(|state| {
				state.store.set_reaction_pending(subject, user, false);
				if let Some(entity) = response.entity {
					state.store.upsert(entity);
				}
			}),
			Undo::Comment { temp, post } => match response.entity {
				Some(EntityRecord::Comment(record)) => {
					let real = record.id;
					created = Some(EntityId::Comment(real));
					self.update(|state| {
						state.store.rekey_comment(temp, real);
						state.store.upsert_comment(record);
					});
				}
				Some(EntityRecord::Post(record)) => self.update(|state| {
					state.store.remove(EntityId::Comment(temp));
					state.store.upsert_post(record);
				}),
				None => match self.service.fetch_post(post).await {
					Ok(record) => self.update(|state| {
						state.store.remove(EntityId::Comment(temp));
						state.store.upsert_post(record);
					}),
					Err(error) => warn!(comment = %temp, %error, "mutation.confirm.refetch_failed"),
				},
			},
			Undo::Post { temp, group } => match response.entity {
				Some(EntityRecord::Post(record)) => {
					let real = record.id;
					created = Some(EntityId::Post(real));
					self.update(|state| {
						state.store.rekey_post(temp, real);
						for cursor in state.feeds.values_mut() {
							cursor.rekey(temp, real);
						}
						state.store.upsert_post(record);
					});
				}
				_ => {
					self.update(|state| state.remove_entity(EntityId::Post(temp)));
					self.refresh_group_feeds(group).await;
				}
			},
			Undo::Delete { id } => self.update(|state| {
				state.remove_entity(id);
				if let Some(entity) = response.entity {
					state.store.upsert(entity);
				}
			}),
			Undo::Nothing => {
				if let Mutation::DeleteGroup { group } = plan.request {
					self.cascade_group(group);
				}
			}
		}
		debug!(kind = kind.as_str(), created = ?created, "mutation.confirmed");
		Ok(MutationOutcome { kind, created })
	}

	/// Rolls back and classifies a failed mutation.
	async fn recover(&self, user: UserId, plan: Plan, error: ServiceError) -> Result<MutationOutcome> {
		let kind = plan.request.kind();
		let target = plan.request.target();
		warn!(kind = kind.as_str(), target = ?target, %error, "mutation.rolled_back");

		let conflict_post = match target {
			Some(EntityId::Post(post)) => Some(post),
			Some(EntityId::Comment(comment)) => self.read(|state| state.store.comment(comment).map(|c| c.post)),
			None => None,
		};
		self.update(|state| undo(state, user, &plan.undo));

		match error {
			ServiceError::NotFound => match (&plan.request, target) {
				(Mutation::DeleteGroup { group }, _) => {
					self.cascade_group(*group);
					Ok(MutationOutcome { kind, created: None })
				}
				(Mutation::CreatePost { group, .. }, _) => Err(CacheError::GroupNotFound(*group)),
				(Mutation::AddComment { post, .. }, Some(target)) => {
					let _ = self.refresh_post(*post).await;
					Err(CacheError::NotFound(target))
				}
				(Mutation::DeletePost { .. } | Mutation::DeleteComment { .. }, Some(target)) => {
					self.update(|state| state.remove_entity(target));
					Ok(MutationOutcome { kind, created: None })
				}
				(_, Some(target)) => {
					self.update(|state| state.remove_entity(target));
					Err(CacheError::NotFound(target))
				}
				(_, None) => Err(CacheError::Transient(ServiceError::NotFound)),
			},
			ServiceError::Conflict => {
				if self.config.refetch_on_conflict
					&& let Some(post) = conflict_post
					&& let Err(error) = self.refresh_post(post).await
				{
					warn!(post = %post, %error, "mutation.conflict.refetch_failed");
				}
				Err(match (&plan.request, target) {
					(_, Some(target)) => CacheError::Conflict(target),
					(Mutation::CreatePost { group, .. } | Mutation::DeleteGroup { group }, None) => CacheError::GroupConflict(*group),
					(_, None) => CacheError::Transient(ServiceError::Conflict),
				})
			}
			ServiceError::Unauthorized => Err(CacheError::Unauthorized),
			ServiceError::PermissionDenied => Err(CacheError::rejected(kind.as_str())),
			error @ (ServiceError::Network(_) | ServiceError::Timeout) => Err(CacheError::Transient(error)),
		}
	}

	/// Removes every cached post of a deleted group.
	fn cascade_group(&self, group: GroupId) {
		let removed = self.update(|state| {
			let doomed = state.store.posts_in_group(group);
			for post in &doomed {
				state.store.remove(EntityId::Post(*post));
			}
			for cursor in state.feeds.values_mut() {
				if matches!(cursor.scope(), FeedScope::Group { group: g } if *g == group) {
					cursor.reset();
				}
			}
			state.prune_cursors();
			doomed.len()
		});
		debug!(group = %group, removed, "mutation.group_cascade");
	}

	/// Re-fetches the head of every loaded feed that shows `group`.
	async fn refresh_group_feeds(&self, group: GroupId) {
		let scopes: Vec<_> = self.read(|state| state.feeds.keys().filter(|s| s.covers_group(group)).cloned().collect());
		for scope in scopes {
			if let Err(error) = self.refresh(&scope).await {
				warn!(scope = %scope, %error, "mutation.refresh_failed");
			}
		}
	}
}

/// Applies the inverse of a speculative delta.
fn undo(state: &mut CacheState, user: UserId, undo: &Undo) {
	match undo {
		Undo::Reaction { subject, previous } => {
			state.store.patch_reaction(*subject, user, *previous);
			state.store.set_reaction_pending(*subject, user, false);
		}
		Undo::Comment { temp, .. } => {
			state.store.remove(EntityId::Comment(*temp));
		}
		Undo::Post { temp, .. } => {
			state.remove_entity(EntityId::Post(*temp));
		}
		Undo::Delete { id } => {
			state.store.set_pending_delete(*id, false);
		}
		Undo::Nothing => {}
	}
}
