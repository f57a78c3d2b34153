//! Shared setup for feed cache integration tests.

use std::sync::Arc;
use std::time::Duration;

use agora_cache::{CacheConfig, CacheError, FeedCache, Projection};
use agora_model::{GroupId, Membership, Role, UserId};
use agora_testing::{MemoryService, StaticAuth, fixtures};
use parking_lot::Mutex;

pub const ME: UserId = UserId(1);
pub const FRIEND: UserId = UserId(2);
pub const BOOKS: GroupId = GroupId(1);
pub const GAMES: GroupId = GroupId(2);

pub struct World {
	pub service: Arc<MemoryService>,
	pub auth: Arc<StaticAuth>,
	pub cache: FeedCache,
	pub errors: Arc<Mutex<Vec<CacheError>>>,
}

/// Ten posts by `FRIEND`, ids 1..=10 with id 1 the newest, alternating between
/// `BOOKS` (odd ids) and `GAMES` (even ids). The local user belongs to both
/// groups. Pages hold five posts and periodic refreshes default to 20 seconds.
pub fn world() -> World {
	let _ = tracing_subscriber::fmt::try_init();

	let memberships = [
		member(BOOKS, ME, Role::User),
		member(GAMES, ME, Role::User),
		member(BOOKS, FRIEND, Role::Admin),
		member(GAMES, FRIEND, Role::Admin),
	];
	let service = Arc::new(MemoryService::new().acting_as(ME).with_memberships(memberships));
	service.seed_posts((1..=10).map(|id| fixtures::post(id, if id % 2 == 1 { 1 } else { 2 }, 2, 100 - id)));

	let auth = Arc::new(StaticAuth::from_memberships(ME, memberships));
	let errors = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&errors);
	let config = CacheConfig::from_toml_str("page_size = 5\nrefresh_interval_ms = 20000").expect("valid config");
	let cache = FeedCache::builder(service.clone(), auth.clone())
		.config(config)
		.on_error(move |error| sink.lock().push(error.clone()))
		.build();

	World { service, auth, cache, errors }
}

fn member(group: GroupId, user: UserId, role: Role) -> Membership {
	Membership { group, user, role }
}

/// Records every projection a subscription delivers.
#[derive(Clone, Default)]
pub struct Recorder {
	seen: Arc<Mutex<Vec<Projection>>>,
}

impl Recorder {
	pub fn callback(&self) -> impl Fn(&Projection) + Send + Sync + 'static {
		let seen = Arc::clone(&self.seen);
		move |projection| seen.lock().push(projection.clone())
	}

	pub fn count(&self) -> usize {
		self.seen.lock().len()
	}

	pub fn last(&self) -> Projection {
		self.seen.lock().last().cloned().expect("at least one delivery")
	}
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
	for _ in 0..200 {
		if check() {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	check()
}
