//! Normalized entity table.
//!
//! [`EntityStore`] owns every cached post and comment, keyed by id. Feeds hold
//! ids only, so an update made through one feed is visible in all of them.
//!
//! Upserts follow one merge policy: scalar fields take the incoming
//! authoritative value, while comment and reaction sub-collections are
//! reconciled by id so that local state the server has not seen yet survives:
//!
//! - comments with temporary ids stay attached to their post,
//! - reactions with an in-flight mutation keep their local value,
//! - `pending_delete` marks are never cleared by a snapshot.
//!
//! Ids that were removed are remembered as tombstones so a late snapshot cannot
//! bring them back. Nothing in this module can fail.

use std::collections::{HashMap, HashSet};

use agora_model::{Author, Comment, CommentId, CommentRecord, EntityId, EntityRecord, GroupId, ImageRef, Post, PostId, PostRecord, Reaction, ReactionKind, ReactionSet, UserId};
use indexmap::IndexSet;
use tracing::trace;

#[cfg(test)]
mod tests;

/// Borrowed view of a cached entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef<'a> {
	/// A post.
	Post(&'a Post),
	/// A comment.
	Comment(&'a Comment),
}

impl EntityRef<'_> {
	/// Id of the entity.
	pub fn id(&self) -> EntityId {
		match self {
			Self::Post(post) => EntityId::Post(post.id),
			Self::Comment(comment) => EntityId::Comment(comment.id),
		}
	}

	/// Author summary of the entity.
	pub fn author(&self) -> &Author {
		match self {
			Self::Post(post) => &post.author,
			Self::Comment(comment) => &comment.author,
		}
	}

	/// Reactions on the entity.
	pub fn reactions(&self) -> &ReactionSet {
		match self {
			Self::Post(post) => &post.reactions,
			Self::Comment(comment) => &comment.reactions,
		}
	}
}

/// Narrow change applied to every entity matched by an external invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityPatch {
	/// Replace the embedded author avatar.
	AuthorAvatar(Option<ImageRef>),
	/// Replace the embedded author name.
	AuthorName(String),
	/// Remove the entity (with cascade).
	Evict,
}

/// Normalized, in-memory table of posts and comments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityStore {
	posts: HashMap<PostId, Post>,
	comments: HashMap<CommentId, Comment>,
	/// `(subject, author)` pairs whose reaction is being changed locally.
	pending_reactions: HashSet<(EntityId, UserId)>,
	/// Ids known to be deleted upstream.
	tombstones: HashSet<EntityId>,
}

impl EntityStore {
	/// Creates an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts or merges an authoritative snapshot. Returns true if anything changed.
	pub fn upsert(&mut self, record: impl Into<EntityRecord>) -> bool {
		match record.into() {
			EntityRecord::Post(post) => self.upsert_post(post),
			EntityRecord::Comment(comment) => self.upsert_comment(comment),
		}
	}

	/// Inserts or merges a post snapshot together with its comments.
	pub fn upsert_post(&mut self, record: PostRecord) -> bool {
		let PostRecord {
			id,
			author,
			group,
			body,
			image,
			created_at,
			comments: comment_records,
			reactions,
		} = record;

		if self.tombstones.contains(&EntityId::Post(id)) {
			trace!(post = %id, "store.upsert.tombstoned");
			return false;
		}

		let incoming: IndexSet<CommentId> = comment_records
			.iter()
			.map(|c| c.id)
			.filter(|c| !self.tombstones.contains(&EntityId::Comment(*c)))
			.collect();

		let existing = self.posts.get(&id);
		let mut pruned = Vec::new();
		let comments = match existing {
			Some(current) => {
				let mut merged = IndexSet::with_capacity(incoming.len());
				for cid in &current.comments {
					if incoming.contains(cid) || cid.is_temporary() {
						merged.insert(*cid);
					} else {
						pruned.push(*cid);
					}
				}
				merged.extend(incoming.iter().copied());
				merged
			}
			None => incoming,
		};
		let reactions = self.merge_reactions(EntityId::Post(id), &reactions, existing.map(|p| &p.reactions));
		let post = Post {
			id,
			author,
			group,
			body,
			image,
			created_at,
			comments,
			reactions,
			pending_delete: existing.is_some_and(|p| p.pending_delete),
		};

		let mut changed = existing != Some(&post);
		self.posts.insert(id, post);

		for cid in pruned {
			trace!(post = %id, comment = %cid, "store.upsert.prune_comment");
			self.comments.remove(&cid);
			self.pending_reactions.retain(|(subject, _)| *subject != EntityId::Comment(cid));
			changed = true;
		}
		for mut comment in comment_records {
			comment.post = id;
			changed |= self.upsert_comment(comment);
		}
		changed
	}

	/// Inserts or merges a single comment snapshot.
	///
	/// Comments whose post is not cached are ignored: no feed could show them.
	pub fn upsert_comment(&mut self, record: CommentRecord) -> bool {
		let CommentRecord {
			id,
			post,
			parent,
			author,
			body,
			created_at,
			reactions,
		} = record;

		if self.tombstones.contains(&EntityId::Comment(id)) {
			trace!(comment = %id, "store.upsert.tombstoned");
			return false;
		}
		if !self.posts.contains_key(&post) {
			trace!(comment = %id, post = %post, "store.upsert.orphan_comment");
			return false;
		}

		let existing = self.comments.get(&id);
		let reactions = self.merge_reactions(EntityId::Comment(id), &reactions, existing.map(|c| &c.reactions));
		let comment = Comment {
			id,
			post,
			parent,
			author,
			body,
			created_at,
			reactions,
			pending_delete: existing.is_some_and(|c| c.pending_delete),
		};

		let mut changed = existing != Some(&comment);
		self.comments.insert(id, comment);
		if let Some(post) = self.posts.get_mut(&post) {
			changed |= post.comments.insert(id);
		}
		changed
	}

	/// Server reactions overlaid with local values for pairs still in flight.
	fn merge_reactions(&self, subject: EntityId, wire: &[Reaction], local: Option<&ReactionSet>) -> ReactionSet {
		let mut merged = ReactionSet::from_reactions(wire);
		if let Some(local) = local {
			for (_, author) in self.pending_reactions.iter().filter(|(s, _)| *s == subject) {
				merged.set(*author, local.get(*author));
			}
		}
		merged
	}

	/// Looks up any entity.
	pub fn get(&self, id: EntityId) -> Option<EntityRef<'_>> {
		match id {
			EntityId::Post(id) => self.posts.get(&id).map(EntityRef::Post),
			EntityId::Comment(id) => self.comments.get(&id).map(EntityRef::Comment),
		}
	}

	/// Looks up a post.
	pub fn post(&self, id: PostId) -> Option<&Post> {
		self.posts.get(&id)
	}

	/// Looks up a comment.
	pub fn comment(&self, id: CommentId) -> Option<&Comment> {
		self.comments.get(&id)
	}

	/// Returns true if the entity is cached.
	pub fn contains(&self, id: EntityId) -> bool {
		self.get(id).is_some()
	}

	/// Iterates all cached posts in no particular order.
	pub fn posts(&self) -> impl Iterator<Item = &Post> {
		self.posts.values()
	}

	/// Comments of `post` in display order.
	pub fn comments_of(&self, post: PostId) -> impl Iterator<Item = &Comment> {
		self.posts
			.get(&post)
			.into_iter()
			.flat_map(|p| p.comments.iter())
			.filter_map(|cid| self.comments.get(cid))
	}

	/// Ids of cached posts belonging to `group`.
	pub fn posts_in_group(&self, group: GroupId) -> Vec<PostId> {
		self.posts.values().filter(|p| p.group == group).map(|p| p.id).collect()
	}

	/// Number of cached posts.
	pub fn post_count(&self) -> usize {
		self.posts.len()
	}

	/// Number of cached comments.
	pub fn comment_count(&self) -> usize {
		self.comments.len()
	}

	/// Returns true if the id was removed and must not come back.
	pub fn is_tombstoned(&self, id: EntityId) -> bool {
		self.tombstones.contains(&id)
	}

	/// Removes an entity. Removing a post also removes its comments; removing a
	/// comment also removes replies to it. Returns false if nothing was cached.
	///
	/// Server ids are tombstoned. Temporary ids are not, since they never
	/// existed upstream.
	pub fn remove(&mut self, id: EntityId) -> bool {
		match id {
			EntityId::Post(pid) => {
				let Some(post) = self.posts.remove(&pid) else {
					self.tombstone(id);
					return false;
				};
				let mut doomed: Vec<CommentId> = post.comments.iter().copied().collect();
				doomed.extend(self.comments.values().filter(|c| c.post == pid && !post.comments.contains(&c.id)).map(|c| c.id));
				for cid in doomed {
					self.comments.remove(&cid);
					self.clear_pending(EntityId::Comment(cid));
					self.tombstone(EntityId::Comment(cid));
				}
				self.clear_pending(id);
				self.tombstone(id);
				trace!(post = %pid, "store.remove");
				true
			}
			EntityId::Comment(cid) => {
				let Some(comment) = self.comments.remove(&cid) else {
					self.tombstone(id);
					return false;
				};
				let replies: Vec<CommentId> = self.comments.values().filter(|c| c.parent == Some(cid)).map(|c| c.id).collect();
				if let Some(post) = self.posts.get_mut(&comment.post) {
					post.comments.shift_remove(&cid);
					for reply in &replies {
						post.comments.shift_remove(reply);
					}
				}
				for reply in replies {
					self.comments.remove(&reply);
					self.clear_pending(EntityId::Comment(reply));
					self.tombstone(EntityId::Comment(reply));
				}
				self.clear_pending(id);
				self.tombstone(id);
				trace!(comment = %cid, "store.remove");
				true
			}
		}
	}

	fn tombstone(&mut self, id: EntityId) {
		if !id.is_temporary() {
			self.tombstones.insert(id);
		}
	}

	fn clear_pending(&mut self, subject: EntityId) {
		self.pending_reactions.retain(|(s, _)| *s != subject);
	}

	/// Sets or clears `author`'s reaction on `subject`.
	///
	/// A subject holds at most one reaction per author: setting a new kind
	/// overwrites, `None` removes. Returns the previous value, or `None` when
	/// the subject is not cached.
	pub fn patch_reaction(&mut self, subject: EntityId, author: UserId, kind: Option<ReactionKind>) -> Option<Option<ReactionKind>> {
		let set = match subject {
			EntityId::Post(id) => &mut self.posts.get_mut(&id)?.reactions,
			EntityId::Comment(id) => &mut self.comments.get_mut(&id)?.reactions,
		};
		Some(set.set(author, kind))
	}

	/// Marks or unmarks a reaction as in flight so snapshots keep the local value.
	pub fn set_reaction_pending(&mut self, subject: EntityId, author: UserId, pending: bool) {
		if pending {
			self.pending_reactions.insert((subject, author));
		} else {
			self.pending_reactions.remove(&(subject, author));
		}
	}

	/// Returns true if `author`'s reaction on `subject` is in flight.
	pub fn is_reaction_pending(&self, subject: EntityId, author: UserId) -> bool {
		self.pending_reactions.contains(&(subject, author))
	}

	/// Sets the local delete mark. Returns false if the entity is not cached.
	pub fn set_pending_delete(&mut self, id: EntityId, pending: bool) -> bool {
		match id {
			EntityId::Post(id) => self.posts.get_mut(&id).map(|p| p.pending_delete = pending).is_some(),
			EntityId::Comment(id) => self.comments.get_mut(&id).map(|c| c.pending_delete = pending).is_some(),
		}
	}

	/// Reaction `author` left on `subject`.
	pub fn reaction_of(&self, subject: EntityId, author: UserId) -> Option<ReactionKind> {
		self.get(subject).and_then(|e| e.reactions().get(author))
	}

	/// Number of reactions of `kind` on `subject`.
	pub fn reaction_count(&self, subject: EntityId, kind: ReactionKind) -> usize {
		self.get(subject).map_or(0, |e| e.reactions().count(kind))
	}

	/// Returns true if `author` reacted to `subject` with `kind`.
	pub fn has_reacted(&self, subject: EntityId, author: UserId, kind: ReactionKind) -> bool {
		self.reaction_of(subject, author) == Some(kind)
	}

	/// Replaces a temporary post id with the server id.
	///
	/// Comments and pending reactions follow the post. If the server copy is
	/// already cached, the placeholder is folded into it.
	pub fn rekey_post(&mut self, temp: PostId, real: PostId) -> bool {
		let Some(mut post) = self.posts.remove(&temp) else {
			return false;
		};
		for cid in &post.comments {
			if let Some(comment) = self.comments.get_mut(cid) {
				comment.post = real;
			}
		}
		self.rekey_pending(EntityId::Post(temp), EntityId::Post(real));
		match self.posts.get_mut(&real) {
			Some(existing) => existing.comments.extend(post.comments),
			None => {
				post.id = real;
				self.posts.insert(real, post);
			}
		}
		trace!(temp = %temp, real = %real, "store.rekey_post");
		true
	}

	/// Replaces a temporary comment id with the server id, keeping its position.
	pub fn rekey_comment(&mut self, temp: CommentId, real: CommentId) -> bool {
		let Some(mut comment) = self.comments.remove(&temp) else {
			return false;
		};
		if let Some(post) = self.posts.get_mut(&comment.post)
			&& let Some(index) = post.comments.get_index_of(&temp)
		{
			post.comments.shift_remove_index(index);
			if !post.comments.contains(&real) {
				post.comments.shift_insert(index, real);
			}
		}
		for reply in self.comments.values_mut() {
			if reply.parent == Some(temp) {
				reply.parent = Some(real);
			}
		}
		self.rekey_pending(EntityId::Comment(temp), EntityId::Comment(real));
		if !self.comments.contains_key(&real) {
			comment.id = real;
			self.comments.insert(real, comment);
		}
		trace!(temp = %temp, real = %real, "store.rekey_comment");
		true
	}

	fn rekey_pending(&mut self, temp: EntityId, real: EntityId) {
		let moved: Vec<UserId> = self.pending_reactions.iter().filter(|(s, _)| *s == temp).map(|(_, a)| *a).collect();
		for author in moved {
			self.pending_reactions.remove(&(temp, author));
			self.pending_reactions.insert((real, author));
		}
	}

	/// Applies `patch` to every entity matched by `predicate`. Returns how many
	/// entities were affected.
	pub fn apply_patch(&mut self, predicate: impl Fn(EntityRef<'_>) -> bool, patch: &EntityPatch) -> usize {
		let mut matched: Vec<EntityId> = self.posts.values().map(EntityRef::Post).filter(|e| predicate(*e)).map(|e| e.id()).collect();
		matched.extend(self.comments.values().map(EntityRef::Comment).filter(|e| predicate(*e)).map(|e| e.id()));

		let mut affected = 0;
		for id in matched {
			let applied = match patch {
				EntityPatch::Evict => self.remove(id),
				EntityPatch::AuthorAvatar(avatar) => self.author_mut(id).is_some_and(|author| {
					let changed = author.avatar != *avatar;
					author.avatar.clone_from(avatar);
					changed
				}),
				EntityPatch::AuthorName(name) => self.author_mut(id).is_some_and(|author| {
					let changed = author.username != *name;
					author.username.clone_from(name);
					changed
				}),
			};
			if applied {
				affected += 1;
			}
		}
		affected
	}

	fn author_mut(&mut self, id: EntityId) -> Option<&mut Author> {
		match id {
			EntityId::Post(id) => self.posts.get_mut(&id).map(|p| &mut p.author),
			EntityId::Comment(id) => self.comments.get_mut(&id).map(|c| &mut c.author),
		}
	}
}
