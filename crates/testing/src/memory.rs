//! In-memory [`DataService`] with the server's observable rules.
//!
//! Posts are served newest first. Reacting, commenting and posting require
//! group membership; deletes require authorship or the admin role; deleting a
//! group removes everything in it. Ids are assigned from counters.
//!
//! Tests steer it through fault queues ([`MemoryService::fail_next_mutation`],
//! [`MemoryService::fail_next_fetch`]) and gates that park mutations or page
//! fetches until released ([`MemoryService::hold_mutations`],
//! [`MemoryService::hold_fetches`]).

use std::collections::{BTreeMap, HashMap, VecDeque};

use agora_model::{
	ActivityKind, Author, CommentId, CommentRecord, DataService, FeedScope, GroupId, Membership, Mutation, MutationResponse, Page, PostId, PostRecord, Reaction,
	ReactionKind, Role, ServiceError, UserId,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::fixtures;

/// Minutes after the fixture epoch at which server-created entities start.
const CLOCK_START: i64 = 100_000;

#[derive(Debug, Default)]
struct ServerState {
	acting_user: Option<UserId>,
	users: HashMap<UserId, Author>,
	memberships: HashMap<(GroupId, UserId), Role>,
	posts: BTreeMap<PostId, PostRecord>,
	next_post: i64,
	next_comment: i64,
	clock: i64,
	mutation_faults: VecDeque<ServiceError>,
	fetch_faults: VecDeque<ServiceError>,
	mutation_log: Vec<Mutation>,
	fetch_log: Vec<(FeedScope, u32)>,
}

/// Parks requests while held and counts how many arrived.
struct Gate {
	held: watch::Sender<bool>,
	started: watch::Sender<usize>,
}

impl Gate {
	fn new() -> Self {
		Self {
			held: watch::channel(false).0,
			started: watch::channel(0).0,
		}
	}

	fn set_held(&self, held: bool) {
		self.held.send_replace(held);
	}

	async fn pass(&self) {
		self.started.send_modify(|started| *started += 1);
		let mut held = self.held.subscribe();
		let _ = held.wait_for(|held| !*held).await;
	}

	async fn started(&self, count: usize) {
		let mut started = self.started.subscribe();
		let _ = started.wait_for(|started| *started >= count).await;
	}
}

/// In-memory server.
pub struct MemoryService {
	state: Mutex<ServerState>,
	mutations: Gate,
	fetches: Gate,
}

impl Default for MemoryService {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryService {
	/// Empty server with nobody signed in.
	pub fn new() -> Self {
		Self {
			state: Mutex::new(ServerState {
				next_post: 1_000,
				next_comment: 1_000,
				clock: CLOCK_START,
				..ServerState::default()
			}),
			mutations: Gate::new(),
			fetches: Gate::new(),
		}
	}

	/// Sets the user whose credentials accompany every request.
	pub fn acting_as(self, user: UserId) -> Self {
		self.state.lock().acting_user = Some(user);
		self
	}

	/// Registers `user` in `group` with `role`.
	pub fn with_member(self, group: GroupId, user: UserId, role: Role) -> Self {
		self.add_member(group, user, role);
		self
	}

	/// Registers every membership.
	pub fn with_memberships(self, memberships: impl IntoIterator<Item = Membership>) -> Self {
		for Membership { group, user, role } in memberships {
			self.add_member(group, user, role);
		}
		self
	}

	/// Registers `user` in `group` with `role`.
	pub fn add_member(&self, group: GroupId, user: UserId, role: Role) {
		let mut state = self.state.lock();
		state.users.entry(user).or_insert_with(|| fixtures::author(user.0));
		state.memberships.insert((group, user), role);
	}

	/// Stores a post as if another client had created it.
	pub fn seed_post(&self, record: PostRecord) {
		let mut state = self.state.lock();
		state.users.entry(record.author.id).or_insert_with(|| record.author.clone());
		state.posts.insert(record.id, record);
	}

	/// Stores several posts.
	pub fn seed_posts(&self, records: impl IntoIterator<Item = PostRecord>) {
		for record in records {
			self.seed_post(record);
		}
	}

	/// Current server copy of a post.
	pub fn post(&self, id: PostId) -> Option<PostRecord> {
		self.state.lock().posts.get(&id).cloned()
	}

	/// Deletes a post behind the client's back.
	pub fn remove_post(&self, id: PostId) -> Option<PostRecord> {
		self.state.lock().posts.remove(&id)
	}

	/// Sets a reaction behind the client's back.
	pub fn set_reaction(&self, post: PostId, author: UserId, kind: Option<ReactionKind>) {
		if let Some(record) = self.state.lock().posts.get_mut(&post) {
			set_reaction(&mut record.reactions, author, kind);
		}
	}

	/// Queues an error returned by the next mutation instead of applying it.
	pub fn fail_next_mutation(&self, error: ServiceError) {
		self.state.lock().mutation_faults.push_back(error);
	}

	/// Queues an error returned by the next page or post fetch.
	pub fn fail_next_fetch(&self, error: ServiceError) {
		self.state.lock().fetch_faults.push_back(error);
	}

	/// Parks every mutation until [`Self::release_mutations`].
	pub fn hold_mutations(&self) {
		self.mutations.set_held(true);
	}

	/// Lets parked mutations proceed.
	pub fn release_mutations(&self) {
		self.mutations.set_held(false);
	}

	/// Waits until at least `count` mutations reached the server.
	pub async fn mutations_started(&self, count: usize) {
		self.mutations.started(count).await;
	}

	/// Parks every page fetch until [`Self::release_fetches`].
	pub fn hold_fetches(&self) {
		self.fetches.set_held(true);
	}

	/// Lets parked page fetches proceed.
	pub fn release_fetches(&self) {
		self.fetches.set_held(false);
	}

	/// Waits until at least `count` page fetches reached the server.
	pub async fn fetches_started(&self, count: usize) {
		self.fetches.started(count).await;
	}

	/// Mutations received so far, in arrival order.
	pub fn mutation_log(&self) -> Vec<Mutation> {
		self.state.lock().mutation_log.clone()
	}

	/// Page fetches received so far.
	pub fn fetch_log(&self) -> Vec<(FeedScope, u32)> {
		self.state.lock().fetch_log.clone()
	}

	fn scoped_posts(state: &ServerState, scope: &FeedScope) -> Vec<PostRecord> {
		let mut posts: Vec<PostRecord> = state.posts.values().filter(|p| in_scope(p, scope)).cloned().collect();
		posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
		posts
	}

	fn apply(state: &mut ServerState, mutation: &Mutation) -> Result<MutationResponse, ServiceError> {
		let user = state.acting_user.ok_or(ServiceError::Unauthorized)?;
		match mutation {
			Mutation::ReactToPost { post, reaction } => {
				let group = state.posts.get(post).ok_or(ServiceError::NotFound)?.group;
				require_member(state, group, user)?;
				if let Some(record) = state.posts.get_mut(post) {
					set_reaction(&mut record.reactions, user, *reaction);
				}
				Ok(MutationResponse::ack())
			}
			Mutation::ReactToComment { comment, reaction } => {
				let (post, group) = find_comment(state, *comment).ok_or(ServiceError::NotFound)?;
				require_member(state, group, user)?;
				if let Some(record) = state.posts.get_mut(&post).and_then(|p| p.comments.iter_mut().find(|c| c.id == *comment)) {
					set_reaction(&mut record.reactions, user, *reaction);
				}
				Ok(MutationResponse::ack())
			}
			Mutation::AddComment { post, body, reply_to } => {
				let group = state.posts.get(post).ok_or(ServiceError::NotFound)?.group;
				require_member(state, group, user)?;
				if let Some(parent) = reply_to
					&& find_comment(state, *parent).map(|(p, _)| p) != Some(*post)
				{
					return Err(ServiceError::NotFound);
				}
				let id = CommentId(state.next_comment);
				state.next_comment += 1;
				state.clock += 1;
				let record = CommentRecord {
					id,
					post: *post,
					parent: *reply_to,
					author: author_of(state, user),
					body: body.clone(),
					created_at: fixtures::at(state.clock),
					reactions: Vec::new(),
				};
				if let Some(target) = state.posts.get_mut(post) {
					target.comments.push(record.clone());
				}
				Ok(MutationResponse::with_entity(record))
			}
			Mutation::CreatePost { group, body, image } => {
				require_member(state, *group, user)?;
				let id = PostId(state.next_post);
				state.next_post += 1;
				state.clock += 1;
				let record = PostRecord {
					id,
					author: author_of(state, user),
					group: *group,
					body: body.clone(),
					image: image.clone(),
					created_at: fixtures::at(state.clock),
					comments: Vec::new(),
					reactions: Vec::new(),
				};
				state.posts.insert(id, record.clone());
				Ok(MutationResponse::with_entity(record))
			}
			Mutation::DeletePost { post } => {
				let target = state.posts.get(post).ok_or(ServiceError::NotFound)?;
				let (group, author) = (target.group, target.author.id);
				if author != user && state.memberships.get(&(group, user)) != Some(&Role::Admin) {
					return Err(ServiceError::PermissionDenied);
				}
				state.posts.remove(post);
				Ok(MutationResponse::ack())
			}
			Mutation::DeleteComment { comment } => {
				let (post, group) = find_comment(state, *comment).ok_or(ServiceError::NotFound)?;
				let is_author = state.posts[&post].comments.iter().any(|c| c.id == *comment && c.author.id == user);
				if !is_author && state.memberships.get(&(group, user)) != Some(&Role::Admin) {
					return Err(ServiceError::PermissionDenied);
				}
				if let Some(record) = state.posts.get_mut(&post) {
					record.comments.retain(|c| c.id != *comment && c.parent != Some(*comment));
				}
				Ok(MutationResponse::ack())
			}
			Mutation::DeleteGroup { group } => {
				if state.memberships.get(&(*group, user)) != Some(&Role::Admin) {
					return Err(ServiceError::PermissionDenied);
				}
				state.posts.retain(|_, p| p.group != *group);
				state.memberships.retain(|(g, _), _| g != group);
				Ok(MutationResponse::ack())
			}
		}
	}
}

fn in_scope(post: &PostRecord, scope: &FeedScope) -> bool {
	match scope {
		FeedScope::Group { group } => post.group == *group,
		FeedScope::Membership { groups } => groups.contains(&post.group),
		FeedScope::AuthorActivity { user, kind } => match kind {
			ActivityKind::Authored => post.author.id == *user,
			ActivityKind::CommentedOn => post.comments.iter().any(|c| c.author.id == *user),
			ActivityKind::Reacted(kind) => post.reactions.iter().any(|r| r.author == *user && r.kind == *kind),
		},
	}
}

fn require_member(state: &ServerState, group: GroupId, user: UserId) -> Result<(), ServiceError> {
	if state.memberships.contains_key(&(group, user)) {
		Ok(())
	} else {
		Err(ServiceError::PermissionDenied)
	}
}

fn find_comment(state: &ServerState, id: CommentId) -> Option<(PostId, GroupId)> {
	state.posts.values().find(|p| p.comments.iter().any(|c| c.id == id)).map(|p| (p.id, p.group))
}

fn author_of(state: &ServerState, user: UserId) -> Author {
	state.users.get(&user).cloned().unwrap_or_else(|| fixtures::author(user.0))
}

fn set_reaction(reactions: &mut Vec<Reaction>, author: UserId, kind: Option<ReactionKind>) {
	reactions.retain(|r| r.author != author);
	if let Some(kind) = kind {
		reactions.push(Reaction { author, kind });
	}
}

#[async_trait]
impl DataService for MemoryService {
	async fn fetch_page(&self, scope: &FeedScope, page: u32, page_size: u32) -> Result<Page, ServiceError> {
		self.fetches.pass().await;
		let mut state = self.state.lock();
		state.fetch_log.push((scope.clone(), page));
		if let Some(error) = state.fetch_faults.pop_front() {
			return Err(error);
		}
		if let FeedScope::Group { group } = scope {
			let user = state.acting_user.ok_or(ServiceError::Unauthorized)?;
			require_member(&state, *group, user)?;
		}

		let posts = Self::scoped_posts(&state, scope);
		let size = page_size.max(1) as usize;
		let start = (page.max(1) as usize - 1) * size;
		let end = (start + size).min(posts.len());
		let slice = posts.get(start..end).map(<[PostRecord]>::to_vec).unwrap_or_default();
		debug!(scope = %scope, page, returned = slice.len(), "memory.fetch_page");
		Ok(Page {
			posts: slice,
			has_more: end < posts.len(),
		})
	}

	async fn fetch_post(&self, post: PostId) -> Result<PostRecord, ServiceError> {
		let mut state = self.state.lock();
		if let Some(error) = state.fetch_faults.pop_front() {
			return Err(error);
		}
		state.posts.get(&post).cloned().ok_or(ServiceError::NotFound)
	}

	async fn mutate(&self, mutation: &Mutation) -> Result<MutationResponse, ServiceError> {
		self.mutations.pass().await;

		let mut state = self.state.lock();
		state.mutation_log.push(mutation.clone());
		if let Some(error) = state.mutation_faults.pop_front() {
			debug!(kind = mutation.kind().as_str(), %error, "memory.mutate.injected_fault");
			return Err(error);
		}
		let result = Self::apply(&mut state, mutation);
		debug!(kind = mutation.kind().as_str(), ok = result.is_ok(), "memory.mutate");
		result
	}
}
