//! Record builders with predictable ids and timestamps.

use agora_model::{Author, CommentId, CommentRecord, GroupId, PostId, PostRecord, Reaction, ReactionKind, UserId};
use chrono::{DateTime, Duration, Utc};

/// Epoch all fixture timestamps are relative to: 2025-01-01T00:00:00Z.
const BASE_SECS: i64 = 1_735_689_600;

/// Timestamp `minutes` after the fixture epoch.
pub fn at(minutes: i64) -> DateTime<Utc> {
	DateTime::<Utc>::from_timestamp(BASE_SECS, 0).unwrap_or_default() + Duration::minutes(minutes)
}

/// Author summary named `user{id}`.
pub fn author(id: u64) -> Author {
	Author::new(UserId(id), format!("user{id}"))
}

/// Post without comments or reactions, created `minutes` after the epoch.
pub fn post(id: i64, group: u64, author_id: u64, minutes: i64) -> PostRecord {
	PostRecord {
		id: PostId(id),
		author: author(author_id),
		group: GroupId(group),
		body: format!("post {id}"),
		image: None,
		created_at: at(minutes),
		comments: Vec::new(),
		reactions: Vec::new(),
	}
}

/// Top-level comment without reactions.
pub fn comment(id: i64, post: i64, author_id: u64, minutes: i64) -> CommentRecord {
	CommentRecord {
		id: CommentId(id),
		post: PostId(post),
		parent: None,
		author: author(author_id),
		body: format!("comment {id}"),
		created_at: at(minutes),
		reactions: Vec::new(),
	}
}

/// Wire reaction.
pub fn reaction(author_id: u64, kind: ReactionKind) -> Reaction {
	Reaction {
		author: UserId(author_id),
		kind,
	}
}

/// `count` posts in `group` with ids `first..first + count`, newest last.
pub fn posts(first: i64, count: i64, group: u64, author_id: u64) -> Vec<PostRecord> {
	(first..first + count).map(|id| post(id, group, author_id, id)).collect()
}
