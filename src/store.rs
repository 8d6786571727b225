//! SQLite-backed entity store.
//!
//! Owns the catalog file and is the sole mutator of the six persisted
//! collections: items, terms, relations, options, item types and
//! taxonomies. Callers never see SQL or raw rows; they see the value types
//! from [`crate::model`] and the error taxonomy from [`crate::error`].
//!
//! Two boundary rules are enforced here and nowhere else:
//!
//! - Text fields that may carry reserved characters (names, sources,
//!   descriptions, option keys/values) are percent-encoded on write and
//!   decoded on read. The store only guarantees round-trip fidelity.
//! - Reads decode strictly: a persisted boolean that is not 0/1, a
//!   timestamp that does not parse, or a byte sequence that is not valid
//!   UTF-8 after decoding fails with [`StoreError::CorruptValue`] instead
//!   of silently defaulting.
//!
//! Mutations run inside a transaction. A caller doing thousands of
//! operations brackets them with [`Store::begin_batch`] /
//! [`Store::end_batch`]; outside a batch every counted mutation opens and
//! commits its own transaction, so the count invariants hold at every
//! commit boundary.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{Local, NaiveDateTime};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::{CatalogError, CatalogResult, EntityKind, StoreError, StoreResult};
use crate::model::{
	Item, ItemId, ItemPatch, ItemType, NewItem, NewTerm, Taxonomy, Term, TermId, TermPatch,
	TIME_FORMAT,
};

/// Current on-disk catalog version, persisted under the
/// `catalog_version` option key.
pub const CATALOG_VERSION: u32 = 1;

const VERSION_KEY: &str = "catalog_version";

/// Characters kept verbatim at the storage boundary; everything else is
/// percent-encoded. Mirrors the unreserved set plus `/` so paths and URLs
/// stay readable in the raw database.
const STORAGE_SET: &AsciiSet = &NON_ALPHANUMERIC
	.remove(b'_')
	.remove(b'.')
	.remove(b'-')
	.remove(b'~')
	.remove(b'/');

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS items (
	item_id INTEGER PRIMARY KEY AUTOINCREMENT,
	item_name TEXT NOT NULL,
	item_type TEXT NOT NULL,
	item_ext TEXT NOT NULL DEFAULT '',
	item_source TEXT,
	item_time TEXT NOT NULL,
	item_creation_time TEXT NOT NULL,
	item_description TEXT,
	item_primary_category INTEGER,
	item_md5 TEXT
);
CREATE TABLE IF NOT EXISTS terms (
	term_id INTEGER PRIMARY KEY AUTOINCREMENT,
	term_name TEXT NOT NULL,
	term_taxonomy TEXT NOT NULL,
	term_description TEXT,
	term_parent INTEGER,
	term_count INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS terms_name_taxonomy ON terms (term_name, term_taxonomy);
CREATE TABLE IF NOT EXISTS term_relations (
	item_id INTEGER NOT NULL REFERENCES items (item_id),
	term_id INTEGER NOT NULL REFERENCES terms (term_id),
	PRIMARY KEY (item_id, term_id)
) WITHOUT ROWID;
CREATE TABLE IF NOT EXISTS options (
	option_name TEXT PRIMARY KEY,
	option_value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS item_types (
	table_name TEXT PRIMARY KEY,
	noun_name TEXT NOT NULL,
	plural_name TEXT NOT NULL,
	dir_name TEXT NOT NULL,
	enabled INTEGER NOT NULL,
	extensions TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS taxonomies (
	table_name TEXT PRIMARY KEY,
	noun_name TEXT NOT NULL,
	plural_name TEXT NOT NULL,
	dir_name TEXT NOT NULL,
	enabled INTEGER NOT NULL,
	has_children INTEGER NOT NULL,
	is_tags INTEGER NOT NULL,
	colour TEXT
);
";

/// Percent-encode a text value for storage.
pub(crate) fn encode_text(value: &str) -> String {
	utf8_percent_encode(value, STORAGE_SET).to_string()
}

/// Decode a stored text value, failing on malformed byte sequences.
pub(crate) fn decode_text(value: &str, column: &'static str) -> StoreResult<String> {
	percent_decode_str(value)
		.decode_utf8()
		.map(|cow| cow.into_owned())
		.map_err(|_| StoreError::CorruptValue {
			column,
			value: value.to_string(),
		})
}

fn decode_opt_text(value: Option<String>, column: &'static str) -> StoreResult<Option<String>> {
	value.map(|v| decode_text(&v, column)).transpose()
}

fn decode_bool(value: i64, column: &'static str) -> StoreResult<bool> {
	match value {
		0 => Ok(false),
		1 => Ok(true),
		other => Err(StoreError::CorruptValue {
			column,
			value: other.to_string(),
		}),
	}
}

fn decode_time(value: &str, column: &'static str) -> StoreResult<NaiveDateTime> {
	NaiveDateTime::parse_from_str(value, TIME_FORMAT).map_err(|_| StoreError::CorruptValue {
		column,
		value: value.to_string(),
	})
}

fn now() -> NaiveDateTime {
	Local::now().naive_local()
}

struct RawItem {
	id: i64,
	name: String,
	item_type: String,
	extension: String,
	source: Option<String>,
	modified: String,
	created: String,
	description: Option<String>,
	primary_category: Option<i64>,
	content_hash: Option<String>,
}

impl RawItem {
	const COLUMNS: &'static str = "item_id, item_name, item_type, item_ext, item_source, \
		item_time, item_creation_time, item_description, item_primary_category, item_md5";

	fn from_row(row: &Row) -> rusqlite::Result<RawItem> {
		Ok(RawItem {
			id: row.get(0)?,
			name: row.get(1)?,
			item_type: row.get(2)?,
			extension: row.get(3)?,
			source: row.get(4)?,
			modified: row.get(5)?,
			created: row.get(6)?,
			description: row.get(7)?,
			primary_category: row.get(8)?,
			content_hash: row.get(9)?,
		})
	}

	fn decode(self) -> StoreResult<Item> {
		Ok(Item {
			id: ItemId(self.id),
			name: decode_text(&self.name, "item_name")?,
			item_type: self.item_type,
			extension: self.extension,
			source: decode_opt_text(self.source, "item_source")?,
			modified: decode_time(&self.modified, "item_time")?,
			created: decode_time(&self.created, "item_creation_time")?,
			description: decode_opt_text(self.description, "item_description")?,
			primary_category: self.primary_category.map(TermId),
			content_hash: self.content_hash,
		})
	}
}

struct RawTerm {
	id: i64,
	name: String,
	taxonomy: String,
	description: Option<String>,
	parent: Option<i64>,
	item_count: i64,
}

impl RawTerm {
	const COLUMNS: &'static str =
		"term_id, term_name, term_taxonomy, term_description, term_parent, term_count";

	fn from_row(row: &Row) -> rusqlite::Result<RawTerm> {
		Ok(RawTerm {
			id: row.get(0)?,
			name: row.get(1)?,
			taxonomy: row.get(2)?,
			description: row.get(3)?,
			parent: row.get(4)?,
			item_count: row.get(5)?,
		})
	}

	fn decode(self) -> StoreResult<Term> {
		// 0 is the legacy encoding of "no parent"
		let parent = match self.parent {
			None | Some(0) => None,
			Some(id) => Some(TermId(id)),
		};
		Ok(Term {
			id: TermId(self.id),
			name: decode_text(&self.name, "term_name")?,
			taxonomy: self.taxonomy,
			description: decode_opt_text(self.description, "term_description")?,
			parent,
			item_count: self.item_count,
		})
	}
}

/// An open catalog.
#[derive(Debug)]
pub struct Store {
	conn: Connection,
	in_batch: bool,
}

impl Store {
	/// Open (or create) a catalog file, migrating a fresh database to the
	/// current schema and seeding the default option/type/taxonomy sets.
	pub fn open(path: impl AsRef<Path>) -> CatalogResult<Store> {
		let conn = Connection::open(path).map_err(StoreError::from)?;
		Store::init(conn)
	}

	/// Open a throwaway in-memory catalog. Used by tests and dry runs.
	pub fn open_in_memory() -> CatalogResult<Store> {
		let conn = Connection::open_in_memory().map_err(StoreError::from)?;
		Store::init(conn)
	}

	fn init(conn: Connection) -> CatalogResult<Store> {
		conn.execute_batch("PRAGMA foreign_keys = ON;")
			.map_err(StoreError::from)?;
		conn.execute_batch(SCHEMA).map_err(StoreError::from)?;
		let mut store = Store {
			conn,
			in_batch: false,
		};
		match store.option(VERSION_KEY)? {
			None => store.seed_defaults()?,
			Some(version) => {
				let found: u32 = version.parse().map_err(|_| StoreError::CorruptValue {
					column: VERSION_KEY,
					value: version.clone(),
				})?;
				if found != CATALOG_VERSION {
					return Err(StoreError::VersionMismatch {
						expected: CATALOG_VERSION,
						found,
					}
					.into());
				}
			}
		}
		Ok(store)
	}

	fn seed_defaults(&mut self) -> CatalogResult<()> {
		debug!("seeding new catalog with default options, item types and taxonomies");
		self.transaction(|store| {
			store.set_option(VERSION_KEY, &CATALOG_VERSION.to_string())?;
			for (key, value) in crate::context::Options::default().to_map() {
				store.set_option(&key, &value)?;
			}
			store.write_item_types(&crate::context::default_item_types())?;
			store.write_taxonomies(&crate::context::default_taxonomies())?;
			Ok(())
		})
	}

	// --- transaction control ---

	/// Begin a caller-scoped transaction covering many operations.
	/// Idempotent: beginning inside an open batch is a no-op.
	pub fn begin_batch(&mut self) -> CatalogResult<()> {
		if !self.in_batch {
			self.conn
				.execute_batch("BEGIN IMMEDIATE;")
				.map_err(StoreError::from)?;
			self.in_batch = true;
		}
		Ok(())
	}

	/// Commit the open batch, if any.
	pub fn end_batch(&mut self) -> CatalogResult<()> {
		if self.in_batch {
			self.conn
				.execute_batch("COMMIT;")
				.map_err(StoreError::from)?;
			self.in_batch = false;
		}
		Ok(())
	}

	/// Roll the open batch back, discarding every operation since
	/// [`Store::begin_batch`].
	pub fn rollback_batch(&mut self) -> CatalogResult<()> {
		if self.in_batch {
			self.conn
				.execute_batch("ROLLBACK;")
				.map_err(StoreError::from)?;
			self.in_batch = false;
		}
		Ok(())
	}

	/// Run `f` atomically. Inside an open batch this just runs `f` (the
	/// batch is the transaction); otherwise it opens one, committing on
	/// success and rolling back on error.
	pub(crate) fn transaction<T>(
		&mut self,
		f: impl FnOnce(&mut Store) -> CatalogResult<T>,
	) -> CatalogResult<T> {
		if self.in_batch {
			return f(self);
		}
		self.begin_batch()?;
		match f(self) {
			Ok(value) => {
				self.end_batch()?;
				Ok(value)
			}
			Err(err) => {
				let _ = self.rollback_batch();
				Err(err)
			}
		}
	}

	// --- items ---

	pub fn create_item(&mut self, new: &NewItem) -> CatalogResult<ItemId> {
		if new.name.is_empty() {
			return Err(CatalogError::MissingRequiredField {
				entity: EntityKind::Item,
				field: "name",
			});
		}
		if new.item_type.is_empty() {
			return Err(CatalogError::MissingRequiredField {
				entity: EntityKind::Item,
				field: "type",
			});
		}
		let modified = new.modified.unwrap_or_else(now);
		let created = new.created.unwrap_or_else(now);
		self.conn
			.execute(
				"INSERT INTO items (item_name, item_type, item_ext, item_source, item_time, \
				 item_creation_time, item_description, item_md5) \
				 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
				params![
					encode_text(&new.name),
					new.item_type,
					new.extension.to_lowercase(),
					new.source.as_deref().map(encode_text),
					modified.format(TIME_FORMAT).to_string(),
					created.format(TIME_FORMAT).to_string(),
					new.description.as_deref().map(encode_text),
					new.content_hash,
				],
			)
			.map_err(StoreError::from)?;
		let id = ItemId(self.conn.last_insert_rowid());
		debug!("created item {} '{}'", id, new.name);
		Ok(id)
	}

	pub fn find_item(&self, id: ItemId) -> CatalogResult<Option<Item>> {
		let raw = self
			.conn
			.prepare(&format!(
				"SELECT {} FROM items WHERE item_id = ?1",
				RawItem::COLUMNS
			))
			.map_err(StoreError::from)?
			.query_row(params![id.0], RawItem::from_row)
			.optional()
			.map_err(StoreError::from)?;
		Ok(raw.map(RawItem::decode).transpose()?)
	}

	pub fn item(&self, id: ItemId) -> CatalogResult<Item> {
		self.find_item(id)?.ok_or(CatalogError::NotFound {
			kind: EntityKind::Item,
			token: id.to_string(),
		})
	}

	/// All items, ascending by id.
	pub fn items(&self) -> CatalogResult<Vec<Item>> {
		self.query_items(
			&format!("SELECT {} FROM items ORDER BY item_id", RawItem::COLUMNS),
			Vec::new(),
		)
	}

	pub fn items_by_hash(&self, hash: &str) -> CatalogResult<Vec<Item>> {
		self.query_items(
			&format!(
				"SELECT {} FROM items WHERE item_md5 = ?1 ORDER BY item_id",
				RawItem::COLUMNS
			),
			vec![rusqlite::types::Value::from(hash.to_string())],
		)
	}

	pub fn update_item(&mut self, id: ItemId, patch: &ItemPatch) -> CatalogResult<()> {
		// existence check up front so an empty patch still reports NotFound
		let _ = self.item(id)?;
		let mut sets: Vec<String> = Vec::new();
		let mut values: Vec<rusqlite::types::Value> = Vec::new();
		let mut push = |sets: &mut Vec<String>, column: &str, value: rusqlite::types::Value| {
			sets.push(format!("{} = ?{}", column, values.len() + 1));
			values.push(value);
		};
		if let Some(name) = &patch.name {
			push(&mut sets, "item_name", encode_text(name).into());
		}
		if let Some(item_type) = &patch.item_type {
			push(&mut sets, "item_type", item_type.clone().into());
		}
		if let Some(ext) = &patch.extension {
			push(&mut sets, "item_ext", ext.to_lowercase().into());
		}
		if let Some(source) = &patch.source {
			push(&mut sets, "item_source", encode_text(source).into());
		}
		if let Some(modified) = &patch.modified {
			push(
				&mut sets,
				"item_time",
				modified.format(TIME_FORMAT).to_string().into(),
			);
		}
		if let Some(description) = &patch.description {
			push(&mut sets, "item_description", encode_text(description).into());
		}
		if let Some(hash) = &patch.content_hash {
			push(&mut sets, "item_md5", hash.clone().into());
		}
		if sets.is_empty() {
			return Ok(());
		}
		values.push(id.0.into());
		let sql = format!(
			"UPDATE items SET {} WHERE item_id = ?{}",
			sets.join(", "),
			values.len()
		);
		self.conn
			.execute(&sql, rusqlite::params_from_iter(values))
			.map_err(StoreError::from)?;
		Ok(())
	}

	/// Set or clear an item's primary category. A primary category must be
	/// one of the item's related terms.
	pub fn set_primary_category(
		&mut self,
		item: ItemId,
		term: Option<TermId>,
	) -> CatalogResult<()> {
		let _ = self.item(item)?;
		if let Some(term) = term {
			if !self.relation_exists(item, term)? {
				return Err(CatalogError::NotRelated { item, term });
			}
		}
		self.conn
			.execute(
				"UPDATE items SET item_primary_category = ?1 WHERE item_id = ?2",
				params![term.map(|t| t.0), item.0],
			)
			.map_err(StoreError::from)?;
		Ok(())
	}

	/// Delete an item, removing all its relations and decrementing every
	/// counterpart term's cached count within one transaction.
	pub fn delete_item(&mut self, id: ItemId) -> CatalogResult<()> {
		let _ = self.item(id)?;
		self.transaction(|store| {
			for term in store.term_ids_for_item(id)? {
				store.adjust_term_count(term, -1)?;
			}
			store
				.conn
				.execute("DELETE FROM term_relations WHERE item_id = ?1", params![id.0])
				.map_err(StoreError::from)?;
			store
				.conn
				.execute("DELETE FROM items WHERE item_id = ?1", params![id.0])
				.map_err(StoreError::from)?;
			debug!("deleted item {}", id);
			Ok(())
		})
	}

	// --- terms ---

	/// Create a term. With `replace_on_conflict`, an existing term with the
	/// same (name, taxonomy) is updated in place and its id returned
	/// instead of inserting a sibling.
	pub fn create_term(&mut self, new: &NewTerm, replace_on_conflict: bool) -> CatalogResult<TermId> {
		if new.name.is_empty() {
			return Err(CatalogError::MissingRequiredField {
				entity: EntityKind::Term,
				field: "name",
			});
		}
		if new.taxonomy.is_empty() {
			return Err(CatalogError::MissingRequiredField {
				entity: EntityKind::Term,
				field: "taxonomy",
			});
		}
		// the parent must already exist, which also rules out a term being
		// born its own parent: the new rowid is not a term yet
		if let Some(parent) = new.parent {
			let _ = self.term(parent)?;
		}
		if replace_on_conflict {
			if let Some(existing) = self.terms_by_name(&new.name, &new.taxonomy)?.into_iter().next()
			{
				self.update_term(
					existing.id,
					&TermPatch {
						description: new.description.clone(),
						parent: Some(new.parent),
						..TermPatch::default()
					},
				)?;
				return Ok(existing.id);
			}
		}
		self.conn
			.execute(
				"INSERT INTO terms (term_name, term_taxonomy, term_description, term_parent) \
				 VALUES (?1, ?2, ?3, ?4)",
				params![
					encode_text(&new.name),
					new.taxonomy,
					new.description.as_deref().map(encode_text),
					new.parent.map(|p| p.0),
				],
			)
			.map_err(StoreError::from)?;
		let id = TermId(self.conn.last_insert_rowid());
		debug!("created category {} '{}:{}'", id, new.taxonomy, new.name);
		Ok(id)
	}

	pub fn find_term(&self, id: TermId) -> CatalogResult<Option<Term>> {
		let raw = self
			.conn
			.prepare(&format!(
				"SELECT {} FROM terms WHERE term_id = ?1",
				RawTerm::COLUMNS
			))
			.map_err(StoreError::from)?
			.query_row(params![id.0], RawTerm::from_row)
			.optional()
			.map_err(StoreError::from)?;
		Ok(raw.map(RawTerm::decode).transpose()?)
	}

	pub fn term(&self, id: TermId) -> CatalogResult<Term> {
		self.find_term(id)?.ok_or(CatalogError::NotFound {
			kind: EntityKind::Term,
			token: id.to_string(),
		})
	}

	/// All terms, ascending by id.
	pub fn terms(&self) -> CatalogResult<Vec<Term>> {
		self.query_terms(
			&format!("SELECT {} FROM terms ORDER BY term_id", RawTerm::COLUMNS),
			Vec::new(),
		)
	}

	/// Exact-name matches within one taxonomy, ascending by id. More than
	/// one element means the catalog holds ambiguous duplicates.
	pub fn terms_by_name(&self, name: &str, taxonomy: &str) -> CatalogResult<Vec<Term>> {
		self.query_terms(
			&format!(
				"SELECT {} FROM terms WHERE term_name = ?1 AND term_taxonomy = ?2 \
				 ORDER BY term_id",
				RawTerm::COLUMNS
			),
			vec![
				encode_text(name).into(),
				rusqlite::types::Value::from(taxonomy.to_string()),
			],
		)
	}

	pub fn terms_in_taxonomy(&self, taxonomy: &str) -> CatalogResult<Vec<Term>> {
		self.query_terms(
			&format!(
				"SELECT {} FROM terms WHERE term_taxonomy = ?1 ORDER BY term_id",
				RawTerm::COLUMNS
			),
			vec![rusqlite::types::Value::from(taxonomy.to_string())],
		)
	}

	pub fn update_term(&mut self, id: TermId, patch: &TermPatch) -> CatalogResult<()> {
		let _ = self.term(id)?;
		if let Some(new_parent) = patch.parent.flatten() {
			let _ = self.term(new_parent)?;
			if new_parent == id || self.is_ancestor(id, new_parent)? {
				return Err(CatalogError::InvalidInput {
					input: new_parent.to_string(),
					reason: "a category cannot become its own ancestor".to_string(),
				});
			}
		}
		let mut sets: Vec<String> = Vec::new();
		let mut values: Vec<rusqlite::types::Value> = Vec::new();
		if let Some(name) = &patch.name {
			sets.push(format!("term_name = ?{}", values.len() + 1));
			values.push(encode_text(name).into());
		}
		if let Some(description) = &patch.description {
			sets.push(format!("term_description = ?{}", values.len() + 1));
			values.push(encode_text(description).into());
		}
		if let Some(parent) = &patch.parent {
			sets.push(format!("term_parent = ?{}", values.len() + 1));
			values.push(match parent {
				Some(p) => p.0.into(),
				None => rusqlite::types::Value::Null,
			});
		}
		if sets.is_empty() {
			return Ok(());
		}
		values.push(id.0.into());
		let sql = format!(
			"UPDATE terms SET {} WHERE term_id = ?{}",
			sets.join(", "),
			values.len()
		);
		self.conn
			.execute(&sql, rusqlite::params_from_iter(values))
			.map_err(StoreError::from)?;
		Ok(())
	}

	/// Whether `ancestor` appears in `descendant`'s parent chain. Bounded
	/// by a visited set so a corrupt chain cannot loop.
	fn is_ancestor(&self, ancestor: TermId, descendant: TermId) -> CatalogResult<bool> {
		let mut visited = HashSet::new();
		let mut cursor = self.term(descendant)?.parent;
		while let Some(current) = cursor {
			if current == ancestor {
				return Ok(true);
			}
			if !visited.insert(current) {
				return Err(CatalogError::Invariant(format!(
					"cycle in category parent chain at {current}"
				)));
			}
			cursor = self.find_term(current)?.and_then(|t| t.parent);
		}
		Ok(false)
	}

	/// Delete a term, removing its relations and clearing it from any
	/// item's primary category. Child terms are not cascaded; reparenting
	/// or deleting them is the caller's responsibility.
	pub fn delete_term(&mut self, id: TermId) -> CatalogResult<()> {
		let _ = self.term(id)?;
		self.transaction(|store| {
			store
				.conn
				.execute(
					"UPDATE items SET item_primary_category = NULL \
					 WHERE item_primary_category = ?1",
					params![id.0],
				)
				.map_err(StoreError::from)?;
			store
				.conn
				.execute("DELETE FROM term_relations WHERE term_id = ?1", params![id.0])
				.map_err(StoreError::from)?;
			store
				.conn
				.execute("DELETE FROM terms WHERE term_id = ?1", params![id.0])
				.map_err(StoreError::from)?;
			debug!("deleted category {}", id);
			Ok(())
		})
	}

	// --- relations (raw rows; counted operations live in relations.rs) ---

	pub fn relation_exists(&self, item: ItemId, term: TermId) -> CatalogResult<bool> {
		let count: i64 = self
			.conn
			.query_row(
				"SELECT COUNT(*) FROM term_relations WHERE item_id = ?1 AND term_id = ?2",
				params![item.0, term.0],
				|row| row.get(0),
			)
			.map_err(StoreError::from)?;
		Ok(count > 0)
	}

	pub(crate) fn insert_relation_row(&self, item: ItemId, term: TermId) -> CatalogResult<()> {
		self.conn
			.execute(
				"INSERT INTO term_relations (item_id, term_id) VALUES (?1, ?2)",
				params![item.0, term.0],
			)
			.map_err(StoreError::from)?;
		Ok(())
	}

	pub(crate) fn delete_relation_row(&self, item: ItemId, term: TermId) -> CatalogResult<bool> {
		let removed = self
			.conn
			.execute(
				"DELETE FROM term_relations WHERE item_id = ?1 AND term_id = ?2",
				params![item.0, term.0],
			)
			.map_err(StoreError::from)?;
		Ok(removed > 0)
	}

	pub(crate) fn adjust_term_count(&self, term: TermId, delta: i64) -> CatalogResult<()> {
		let changed = self
			.conn
			.execute(
				"UPDATE terms SET term_count = term_count + ?1 WHERE term_id = ?2",
				params![delta, term.0],
			)
			.map_err(StoreError::from)?;
		if changed == 0 {
			return Err(CatalogError::Invariant(format!(
				"count adjustment for missing category {term}"
			)));
		}
		Ok(())
	}

	pub fn term_ids_for_item(&self, item: ItemId) -> CatalogResult<Vec<TermId>> {
		let mut stmt = self
			.conn
			.prepare("SELECT term_id FROM term_relations WHERE item_id = ?1 ORDER BY term_id")
			.map_err(StoreError::from)?;
		let ids = stmt
			.query_map(params![item.0], |row| row.get::<_, i64>(0))
			.map_err(StoreError::from)?
			.collect::<Result<Vec<_>, _>>()
			.map_err(StoreError::from)?;
		Ok(ids.into_iter().map(TermId).collect())
	}

	pub fn item_ids_for_term(&self, term: TermId) -> CatalogResult<Vec<ItemId>> {
		let mut stmt = self
			.conn
			.prepare("SELECT item_id FROM term_relations WHERE term_id = ?1 ORDER BY item_id")
			.map_err(StoreError::from)?;
		let ids = stmt
			.query_map(params![term.0], |row| row.get::<_, i64>(0))
			.map_err(StoreError::from)?
			.collect::<Result<Vec<_>, _>>()
			.map_err(StoreError::from)?;
		Ok(ids.into_iter().map(ItemId).collect())
	}

	/// Every relation pair, ordered (item, term). Snapshot export and the
	/// invariant checks in tests use this.
	pub fn relations(&self) -> CatalogResult<Vec<(ItemId, TermId)>> {
		let mut stmt = self
			.conn
			.prepare("SELECT item_id, term_id FROM term_relations ORDER BY item_id, term_id")
			.map_err(StoreError::from)?;
		let pairs = stmt
			.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))
			.map_err(StoreError::from)?
			.collect::<Result<Vec<_>, _>>()
			.map_err(StoreError::from)?;
		Ok(pairs
			.into_iter()
			.map(|(i, t)| (ItemId(i), TermId(t)))
			.collect())
	}

	/// The live relation count for one term, bypassing the cache.
	pub fn live_count(&self, term: TermId) -> CatalogResult<i64> {
		let count = self
			.conn
			.query_row(
				"SELECT COUNT(*) FROM term_relations WHERE term_id = ?1",
				params![term.0],
				|row| row.get(0),
			)
			.map_err(StoreError::from)?;
		Ok(count)
	}

	/// Recompute every term's cached count from the live relation set. The
	/// only sanctioned lazy recomputation; normal operations maintain the
	/// counts incrementally.
	pub fn rebuild_counts(&mut self) -> CatalogResult<()> {
		self.conn
			.execute(
				"UPDATE terms SET term_count = (SELECT COUNT(*) FROM term_relations \
				 WHERE term_relations.term_id = terms.term_id)",
				[],
			)
			.map_err(StoreError::from)?;
		Ok(())
	}

	// --- options ---

	pub fn option(&self, key: &str) -> CatalogResult<Option<String>> {
		let value: Option<String> = self
			.conn
			.query_row(
				"SELECT option_value FROM options WHERE option_name = ?1",
				params![encode_text(key)],
				|row| row.get(0),
			)
			.optional()
			.map_err(StoreError::from)?;
		Ok(value
			.map(|v| decode_text(&v, "option_value"))
			.transpose()?)
	}

	pub fn set_option(&mut self, key: &str, value: &str) -> CatalogResult<()> {
		self.conn
			.execute(
				"INSERT INTO options (option_name, option_value) VALUES (?1, ?2) \
				 ON CONFLICT (option_name) DO UPDATE SET option_value = excluded.option_value",
				params![encode_text(key), encode_text(value)],
			)
			.map_err(StoreError::from)?;
		Ok(())
	}

	pub fn options(&self) -> CatalogResult<BTreeMap<String, String>> {
		let mut stmt = self
			.conn
			.prepare("SELECT option_name, option_value FROM options")
			.map_err(StoreError::from)?;
		let rows = stmt
			.query_map([], |row| {
				Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
			})
			.map_err(StoreError::from)?
			.collect::<Result<Vec<_>, _>>()
			.map_err(StoreError::from)?;
		let mut map = BTreeMap::new();
		for (key, value) in rows {
			let key = decode_text(&key, "option_name")?;
			if key == VERSION_KEY {
				continue;
			}
			map.insert(key, decode_text(&value, "option_value")?);
		}
		Ok(map)
	}

	/// Replace the persisted options wholesale (the catalog version key is
	/// kept).
	pub fn write_options(&mut self, options: &BTreeMap<String, String>) -> CatalogResult<()> {
		self.transaction(|store| {
			store
				.conn
				.execute(
					"DELETE FROM options WHERE option_name != ?1",
					params![encode_text(VERSION_KEY)],
				)
				.map_err(StoreError::from)?;
			for (key, value) in options {
				store.set_option(key, value)?;
			}
			Ok(())
		})
	}

	// --- item types / taxonomies ---

	pub fn load_item_types(&self) -> CatalogResult<Vec<ItemType>> {
		let mut stmt = self
			.conn
			.prepare(
				"SELECT table_name, noun_name, plural_name, dir_name, enabled, extensions \
				 FROM item_types ORDER BY noun_name",
			)
			.map_err(StoreError::from)?;
		let rows = stmt
			.query_map([], |row| {
				Ok((
					row.get::<_, String>(0)?,
					row.get::<_, String>(1)?,
					row.get::<_, String>(2)?,
					row.get::<_, String>(3)?,
					row.get::<_, i64>(4)?,
					row.get::<_, String>(5)?,
				))
			})
			.map_err(StoreError::from)?
			.collect::<Result<Vec<_>, _>>()
			.map_err(StoreError::from)?;
		let mut types = Vec::with_capacity(rows.len());
		for (table_name, noun_name, plural_name, dir_name, enabled, extensions) in rows {
			let extensions: Vec<String> =
				serde_json::from_str(&extensions).map_err(|_| StoreError::CorruptValue {
					column: "extensions",
					value: extensions.clone(),
				})?;
			types.push(ItemType {
				table_name,
				noun_name,
				plural_name,
				dir_name,
				enabled: decode_bool(enabled, "enabled")?,
				extensions,
			});
		}
		Ok(types)
	}

	pub fn write_item_types(&mut self, types: &[ItemType]) -> CatalogResult<()> {
		self.transaction(|store| {
			store
				.conn
				.execute("DELETE FROM item_types", [])
				.map_err(StoreError::from)?;
			for t in types {
				store
					.conn
					.execute(
						"INSERT INTO item_types \
						 (table_name, noun_name, plural_name, dir_name, enabled, extensions) \
						 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
						params![
							t.table_name,
							t.noun_name,
							t.plural_name,
							t.dir_name,
							t.enabled as i64,
							serde_json::to_string(&t.extensions)
								.map_err(CatalogError::from)?,
						],
					)
					.map_err(StoreError::from)?;
			}
			Ok(())
		})
	}

	pub fn load_taxonomies(&self) -> CatalogResult<Vec<Taxonomy>> {
		let mut stmt = self
			.conn
			.prepare(
				"SELECT table_name, noun_name, plural_name, dir_name, enabled, has_children, \
				 is_tags, colour FROM taxonomies ORDER BY noun_name",
			)
			.map_err(StoreError::from)?;
		let rows = stmt
			.query_map([], |row| {
				Ok((
					row.get::<_, String>(0)?,
					row.get::<_, String>(1)?,
					row.get::<_, String>(2)?,
					row.get::<_, String>(3)?,
					row.get::<_, i64>(4)?,
					row.get::<_, i64>(5)?,
					row.get::<_, i64>(6)?,
					row.get::<_, Option<String>>(7)?,
				))
			})
			.map_err(StoreError::from)?
			.collect::<Result<Vec<_>, _>>()
			.map_err(StoreError::from)?;
		let mut taxonomies = Vec::with_capacity(rows.len());
		for (table_name, noun_name, plural_name, dir_name, enabled, has_children, is_tags, colour) in
			rows
		{
			taxonomies.push(Taxonomy {
				table_name,
				noun_name,
				plural_name,
				dir_name,
				enabled: decode_bool(enabled, "enabled")?,
				has_children: decode_bool(has_children, "has_children")?,
				is_tags: decode_bool(is_tags, "is_tags")?,
				colour,
			});
		}
		Ok(taxonomies)
	}

	pub fn write_taxonomies(&mut self, taxonomies: &[Taxonomy]) -> CatalogResult<()> {
		self.transaction(|store| {
			store
				.conn
				.execute("DELETE FROM taxonomies", [])
				.map_err(StoreError::from)?;
			for t in taxonomies {
				store
					.conn
					.execute(
						"INSERT INTO taxonomies (table_name, noun_name, plural_name, dir_name, \
						 enabled, has_children, is_tags, colour) \
						 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
						params![
							t.table_name,
							t.noun_name,
							t.plural_name,
							t.dir_name,
							t.enabled as i64,
							t.has_children as i64,
							t.is_tags as i64,
							t.colour,
						],
					)
					.map_err(StoreError::from)?;
			}
			Ok(())
		})
	}

	// --- compiled-query executors ---

	pub(crate) fn query_items(
		&self,
		sql: &str,
		params: Vec<rusqlite::types::Value>,
	) -> CatalogResult<Vec<Item>> {
		let mut stmt = self.conn.prepare(sql).map_err(StoreError::from)?;
		let raws = stmt
			.query_map(rusqlite::params_from_iter(params), RawItem::from_row)
			.map_err(StoreError::from)?
			.collect::<Result<Vec<_>, _>>()
			.map_err(StoreError::from)?;
		let mut items = Vec::with_capacity(raws.len());
		for raw in raws {
			items.push(raw.decode()?);
		}
		Ok(items)
	}

	pub(crate) fn query_terms(
		&self,
		sql: &str,
		params: Vec<rusqlite::types::Value>,
	) -> CatalogResult<Vec<Term>> {
		let mut stmt = self.conn.prepare(sql).map_err(StoreError::from)?;
		let raws = stmt
			.query_map(rusqlite::params_from_iter(params), RawTerm::from_row)
			.map_err(StoreError::from)?
			.collect::<Result<Vec<_>, _>>()
			.map_err(StoreError::from)?;
		let mut terms = Vec::with_capacity(raws.len());
		for raw in raws {
			terms.push(raw.decode()?);
		}
		Ok(terms)
	}

	/// Item columns selected by every compiled item query.
	pub(crate) fn item_columns() -> &'static str {
		RawItem::COLUMNS
	}

	/// Term columns selected by every compiled term query.
	pub(crate) fn term_columns() -> &'static str {
		RawTerm::COLUMNS
	}
}
