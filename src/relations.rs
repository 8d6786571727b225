//! Relation management: the item↔term many-to-many links.
//!
//! Every mutation here keeps the counterpart term's cached `item_count` in
//! step inside the same transaction, so the count invariant holds at every
//! commit boundary. Duplicate links and missing links are expected
//! conditions, not failures: relinking an existing pair is a warned no-op
//! and unlinking an absent pair is a warned no-op, and neither touches the
//! count.

use tracing::{debug, warn};

use crate::error::CatalogResult;
use crate::model::{ItemId, TermId};
use crate::store::Store;

impl Store {
	/// Link an item to a term. Returns `false` (and warns) when the pair is
	/// already linked; the count is only incremented for a new link.
	pub fn link(&mut self, item: ItemId, term: TermId) -> CatalogResult<bool> {
		// fail NotFound before touching anything
		let _ = self.item(item)?;
		let _ = self.term(term)?;
		if self.relation_exists(item, term)? {
			warn!("item {item} is already related to category {term}");
			return Ok(false);
		}
		self.transaction(|store| {
			store.insert_relation_row(item, term)?;
			store.adjust_term_count(term, 1)?;
			debug!("linked item {item} to category {term}");
			Ok(true)
		})
	}

	/// Remove the link between an item and a term. Returns `false` (and
	/// warns) when no such link exists. Clears the item's primary category
	/// if it pointed at the unlinked term.
	pub fn unlink(&mut self, item: ItemId, term: TermId) -> CatalogResult<bool> {
		let current = self.item(item)?;
		let _ = self.term(term)?;
		self.transaction(|store| {
			if !store.delete_relation_row(item, term)? {
				warn!("item {item} has no relation to category {term}");
				return Ok(false);
			}
			store.adjust_term_count(term, -1)?;
			if current.primary_category == Some(term) {
				store.set_primary_category(item, None)?;
			}
			debug!("unlinked item {item} from category {term}");
			Ok(true)
		})
	}

	/// Remove every link of one item, decrementing each counterpart term's
	/// count. Returns the number of links removed.
	pub fn unlink_all_for_item(&mut self, item: ItemId) -> CatalogResult<usize> {
		let _ = self.item(item)?;
		let terms = self.term_ids_for_item(item)?;
		self.transaction(|store| {
			for term in &terms {
				store.delete_relation_row(item, *term)?;
				store.adjust_term_count(*term, -1)?;
			}
			store.set_primary_category(item, None)?;
			Ok(terms.len())
		})
	}

	/// Remove every link of one term and zero its count. Returns the number
	/// of links removed.
	pub fn unlink_all_for_term(&mut self, term: TermId) -> CatalogResult<usize> {
		let _ = self.term(term)?;
		let items = self.item_ids_for_term(term)?;
		self.transaction(|store| {
			for item in &items {
				store.delete_relation_row(*item, term)?;
				if store.item(*item)?.primary_category == Some(term) {
					store.set_primary_category(*item, None)?;
				}
			}
			store.adjust_term_count(term, -(items.len() as i64))?;
			Ok(items.len())
		})
	}
}
