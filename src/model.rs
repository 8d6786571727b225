//! Core entity types for the catalog.
//!
//! An [`Item`] is one cataloged file or web link. A [`Term`] is one category
//! inside a [`Taxonomy`]. Items and terms are joined by an unordered
//! many-to-many relation; each term caches the number of items related to it
//! in [`Term::item_count`], which the relation layer keeps consistent
//! transactionally.
//!
//! Everything here is a plain value. Persistence, encoding and invariant
//! enforcement live in the store; these types never touch storage directly.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Timestamp format used in the persisted catalog and in snapshots.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Surrogate key of an [`Item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

/// Surrogate key of a [`Term`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermId(pub i64);

impl std::fmt::Display for ItemId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.0.fmt(f)
	}
}

impl std::fmt::Display for TermId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.0.fmt(f)
	}
}

/// One cataloged file or web link.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
	pub id: ItemId,
	/// Display name, decoded from its percent-encoded stored form
	pub name: String,
	/// Noun name of the owning [`ItemType`]
	pub item_type: String,
	/// Lowercase file extension without the dot; empty for pure web links
	pub extension: String,
	/// Source URL, if the item came from the web
	pub source: Option<String>,
	pub modified: NaiveDateTime,
	pub created: NaiveDateTime,
	pub description: Option<String>,
	/// Must reference a term this item is currently related to
	pub primary_category: Option<TermId>,
	/// MD5 of the data file, lowercase hex. Stale-tolerant: refreshed only
	/// by explicit hash synchronization.
	pub content_hash: Option<String>,
}

/// Attributes for creating an [`Item`]. `name` and `item_type` are
/// mandatory; timestamps default to the current time when absent.
#[derive(Debug, Clone, Default)]
pub struct NewItem {
	pub name: String,
	pub item_type: String,
	pub extension: String,
	pub source: Option<String>,
	pub modified: Option<NaiveDateTime>,
	pub created: Option<NaiveDateTime>,
	pub description: Option<String>,
	pub content_hash: Option<String>,
}

/// Partial update of an [`Item`]; `None` fields are left untouched.
/// The primary category is deliberately absent: it is set through its own
/// operation so the relation invariant can be checked.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
	pub name: Option<String>,
	pub item_type: Option<String>,
	pub extension: Option<String>,
	pub source: Option<String>,
	pub modified: Option<NaiveDateTime>,
	pub description: Option<String>,
	pub content_hash: Option<String>,
}

/// One category: a named node in one taxonomy.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
	pub id: TermId,
	pub name: String,
	/// Stable key (`table_name`) of the owning [`Taxonomy`]
	pub taxonomy: String,
	pub description: Option<String>,
	/// `None` = root of its taxonomy
	pub parent: Option<TermId>,
	/// Cached count of distinct related items, maintained transactionally
	pub item_count: i64,
}

/// Attributes for creating a [`Term`]. `name` and `taxonomy` are mandatory.
#[derive(Debug, Clone, Default)]
pub struct NewTerm {
	pub name: String,
	pub taxonomy: String,
	pub description: Option<String>,
	pub parent: Option<TermId>,
}

/// Partial update of a [`Term`]; the doubled `Option` on `parent`
/// distinguishes "leave alone" from "reparent to root".
#[derive(Debug, Clone, Default)]
pub struct TermPatch {
	pub name: Option<String>,
	pub description: Option<String>,
	pub parent: Option<Option<TermId>>,
}

/// A named grouping of terms with presentation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxonomy {
	pub noun_name: String,
	pub plural_name: String,
	/// Filesystem folder name used for shortcut trees
	pub dir_name: String,
	/// Stable key; terms reference taxonomies by this
	pub table_name: String,
	pub enabled: bool,
	/// Whether parent/child nesting is meaningful for this taxonomy
	pub has_children: bool,
	/// Flat, unordered tag-style taxonomy
	pub is_tags: bool,
	pub colour: Option<String>,
}

impl Taxonomy {
	/// Case-insensitive match of a user token against any of this
	/// taxonomy's four names.
	pub fn matches_token(&self, token: &str) -> bool {
		let token = token.to_lowercase();
		[
			&self.noun_name,
			&self.plural_name,
			&self.dir_name,
			&self.table_name,
		]
		.iter()
		.any(|name| name.to_lowercase() == token)
	}
}

/// A named classification of file kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemType {
	pub noun_name: String,
	pub plural_name: String,
	/// Folder under the data directory where files of this type live
	pub dir_name: String,
	pub table_name: String,
	pub enabled: bool,
	/// Lowercase extensions claimed by this type
	pub extensions: Vec<String>,
}

impl ItemType {
	/// A type with no registered extensions holds pure URL items.
	pub fn is_weblinks(&self) -> bool {
		self.extensions.is_empty()
	}

	/// A type that registers both `html` and `htm` holds saved web pages,
	/// which carry a companion `_files` directory on disk.
	pub fn is_webpages(&self) -> bool {
		self.has_extension("html") && self.has_extension("htm")
	}

	pub fn has_extension(&self, ext: &str) -> bool {
		let ext = ext.to_lowercase();
		self.extensions.iter().any(|e| *e == ext)
	}

	pub fn add_extension(&mut self, ext: &str) {
		let ext = ext.to_lowercase();
		if !self.has_extension(&ext) {
			self.extensions.push(ext);
		}
	}
}

/// Columns of an item row that queries can compare, group and sort on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemColumn {
	Id,
	Name,
	Type,
	Extension,
	Source,
	Modified,
	Created,
	Description,
	PrimaryCategory,
	Hash,
}

/// Columns of a term row that queries can compare, group and sort on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermColumn {
	Id,
	Name,
	Taxonomy,
	Description,
	Parent,
	ItemCount,
}

/// Sort key for item queries. `Size` and `FileModified` are derived from
/// filesystem stats and sorted after the primary query runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemSortKey {
	#[default]
	Id,
	Name,
	Type,
	Extension,
	Source,
	Modified,
	Created,
	Hash,
	RelationCount,
	Size,
	FileModified,
}

/// Sort key for term queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TermSortKey {
	Id,
	Name,
	Taxonomy,
	#[default]
	ItemCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
	#[default]
	Ascending,
	Descending,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_item_type_flags() {
		let weblinks = ItemType {
			noun_name: "Weblink".to_string(),
			plural_name: "Weblinks".to_string(),
			dir_name: "weblinks".to_string(),
			table_name: "weblink".to_string(),
			enabled: true,
			extensions: vec![],
		};
		assert!(weblinks.is_weblinks());
		assert!(!weblinks.is_webpages());

		let mut webpages = ItemType {
			noun_name: "Webpage".to_string(),
			plural_name: "Webpages".to_string(),
			dir_name: "webpages".to_string(),
			table_name: "webpage".to_string(),
			enabled: true,
			extensions: vec!["html".to_string()],
		};
		assert!(!webpages.is_webpages());
		webpages.add_extension("HTM");
		assert!(webpages.is_webpages());
		assert!(!webpages.is_weblinks());
		assert!(webpages.has_extension("HTML"));

		// adding an already-known extension is a no-op
		webpages.add_extension("htm");
		assert_eq!(webpages.extensions.len(), 2);
	}

	#[test]
	fn test_taxonomy_token_match() {
		let tags = Taxonomy {
			noun_name: "Tag".to_string(),
			plural_name: "Tags".to_string(),
			dir_name: "tags".to_string(),
			table_name: "tag".to_string(),
			enabled: true,
			has_children: false,
			is_tags: true,
			colour: None,
		};
		assert!(tags.matches_token("tag"));
		assert!(tags.matches_token("Tags"));
		assert!(tags.matches_token("TAG"));
		assert!(!tags.matches_token("genre"));
	}
}
