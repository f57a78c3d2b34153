//! Per-feed pagination state.
//!
//! ```text
//! Empty -> Loading(1) -> Loaded(1) -> Loading(2) -> Loaded(2) -> ... -> Exhausted(n)
//! ```
//!
//! A cursor records the ids of its feed in fetch order and never owns entities.
//! Starting a load while one is in flight is a no-op, so repeated scroll
//! triggers cannot fetch the same page twice. Every load is tied to the epoch
//! it started in; [`PageCursor::reset`] opens a new epoch and results from the
//! old one are dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use agora_model::{FeedScope, PostId};
use indexmap::IndexSet;

static EPOCHS: AtomicU64 = AtomicU64::new(1);

fn next_epoch() -> u64 {
	EPOCHS.fetch_add(1, Ordering::Relaxed)
}

/// Pagination phase of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorPhase {
	/// Nothing fetched yet.
	Empty,
	/// Page `page` is being fetched.
	Loading {
		/// Page in flight.
		page: u32,
	},
	/// Pages up to `page` are loaded and more exist.
	Loaded {
		/// Last loaded page.
		page: u32,
	},
	/// Pages up to `page` are loaded and the server has no more.
	Exhausted {
		/// Last loaded page.
		page: u32,
	},
}

/// Permission to fetch one page, issued by [`PageCursor::begin_load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTicket {
	/// 1-based page number.
	pub page: u32,
	/// Requested page size.
	pub page_size: u32,
	epoch: u64,
}

/// Pagination state of one feed scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
	scope: FeedScope,
	page_size: u32,
	phase: CursorPhase,
	ids: IndexSet<PostId>,
	epoch: u64,
}

impl PageCursor {
	/// Empty cursor for `scope`.
	pub fn new(scope: FeedScope, page_size: u32) -> Self {
		Self {
			scope,
			page_size: page_size.max(1),
			phase: CursorPhase::Empty,
			ids: IndexSet::new(),
			epoch: next_epoch(),
		}
	}

	/// Scope this cursor pages through.
	pub fn scope(&self) -> &FeedScope {
		&self.scope
	}

	/// Current phase.
	pub fn phase(&self) -> CursorPhase {
		self.phase
	}

	/// Page size used for requests.
	pub fn page_size(&self) -> u32 {
		self.page_size
	}

	/// Ids in fetch order, with locally pinned posts first.
	pub fn ids(&self) -> impl Iterator<Item = PostId> + '_ {
		self.ids.iter().copied()
	}

	/// Number of recorded ids.
	pub fn len(&self) -> usize {
		self.ids.len()
	}

	/// Returns true when no id is recorded.
	pub fn is_empty(&self) -> bool {
		self.ids.is_empty()
	}

	/// Returns true if `id` belongs to this feed.
	pub fn contains(&self, id: PostId) -> bool {
		self.ids.contains(&id)
	}

	/// Last fully loaded page, 0 before the first page arrives.
	pub fn loaded_pages(&self) -> u32 {
		match self.phase {
			CursorPhase::Empty => 0,
			CursorPhase::Loading { page } => page - 1,
			CursorPhase::Loaded { page } | CursorPhase::Exhausted { page } => page,
		}
	}

	/// Returns true while a page is in flight.
	pub fn is_loading(&self) -> bool {
		matches!(self.phase, CursorPhase::Loading { .. })
	}

	/// Returns true unless the server reported the last page.
	pub fn has_more(&self) -> bool {
		!matches!(self.phase, CursorPhase::Exhausted { .. })
	}

	/// Starts fetching the next page.
	///
	/// Returns `None` while another page is in flight or once the feed is
	/// exhausted.
	pub fn begin_load(&mut self) -> Option<PageTicket> {
		let page = match self.phase {
			CursorPhase::Loading { .. } | CursorPhase::Exhausted { .. } => return None,
			CursorPhase::Empty => 1,
			CursorPhase::Loaded { page } => page + 1,
		};
		self.phase = CursorPhase::Loading { page };
		Some(PageTicket {
			page,
			page_size: self.page_size,
			epoch: self.epoch,
		})
	}

	/// Returns true if `ticket` still belongs to the in-flight load.
	pub fn accepts(&self, ticket: &PageTicket) -> bool {
		ticket.epoch == self.epoch && self.phase == CursorPhase::Loading { page: ticket.page }
	}

	/// Records the result of the load `ticket` was issued for. Returns false if
	/// the ticket is stale and nothing was recorded.
	pub fn complete_load(&mut self, ticket: &PageTicket, ids: impl IntoIterator<Item = PostId>, has_more: bool) -> bool {
		if !self.accepts(ticket) {
			return false;
		}
		self.append_page(ids, has_more);
		true
	}

	/// Reverts the phase after a failed load. Stale tickets are ignored.
	pub fn fail_load(&mut self, ticket: &PageTicket) {
		if !self.accepts(ticket) {
			return;
		}
		self.phase = match ticket.page {
			0 | 1 => CursorPhase::Empty,
			page => CursorPhase::Loaded { page: page - 1 },
		};
	}

	/// Appends the ids of the next page, skipping ids already recorded, and sets
	/// whether more pages exist.
	pub fn append_page(&mut self, ids: impl IntoIterator<Item = PostId>, has_more: bool) {
		let page = match self.phase {
			CursorPhase::Loading { page } => page,
			_ => self.loaded_pages() + 1,
		};
		self.ids.extend(ids);
		self.phase = if has_more {
			CursorPhase::Loaded { page }
		} else {
			CursorPhase::Exhausted { page }
		};
	}

	/// Folds a fresh copy of page 1 into the head of the feed. Unseen ids are
	/// inserted at the front in the given order; deeper pages are untouched.
	/// Returns how many ids were added.
	pub fn merge_head(&mut self, ids: impl IntoIterator<Item = PostId>) -> usize {
		let mut at = 0;
		for id in ids {
			if self.ids.contains(&id) {
				continue;
			}
			self.ids.shift_insert(at, id);
			at += 1;
		}
		at
	}

	/// Pins a locally created post at the head of the feed.
	pub fn pin(&mut self, id: PostId) {
		if !self.ids.contains(&id) {
			self.ids.shift_insert(0, id);
		}
	}

	/// Replaces a temporary id in place.
	pub fn rekey(&mut self, temp: PostId, real: PostId) -> bool {
		let Some(index) = self.ids.get_index_of(&temp) else {
			return false;
		};
		self.ids.shift_remove_index(index);
		if !self.ids.contains(&real) {
			self.ids.shift_insert(index, real);
		}
		true
	}

	/// Drops an id from the feed.
	pub fn remove(&mut self, id: PostId) -> bool {
		self.ids.shift_remove(&id)
	}

	/// Keeps only ids for which `keep` returns true.
	pub fn retain(&mut self, mut keep: impl FnMut(PostId) -> bool) {
		self.ids.retain(|id| keep(*id));
	}

	/// Returns the cursor to `Empty` and invalidates in-flight loads.
	pub fn reset(&mut self) {
		self.phase = CursorPhase::Empty;
		self.ids.clear();
		self.epoch = next_epoch();
	}
}
