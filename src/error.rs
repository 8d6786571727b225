//! Error types for the cataloging engine

use thiserror::Error;

use crate::model::{ItemId, TermId};

/// The kind of entity a lookup or mutation was aimed at.
///
/// Carried inside [`CatalogError::NotFound`] so callers can report *what*
/// failed to resolve without string-matching the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
	Item,
	Term,
	Taxonomy,
	ItemType,
	Relation,
	Option,
}

impl std::fmt::Display for EntityKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			EntityKind::Item => "item",
			EntityKind::Term => "category",
			EntityKind::Taxonomy => "taxonomy",
			EntityKind::ItemType => "item type",
			EntityKind::Relation => "relation",
			EntityKind::Option => "option",
		};
		f.write_str(name)
	}
}

/// Failure modes of the cataloging engine.
///
/// The variants split into three families with different handling policies:
///
/// - **Expected domain conditions** — `NotFound`, `Ambiguous`,
///   `DuplicateRelation`, `MissingRequiredField`, `DepthExceeded`,
///   `InvalidInput`. These are normal outcomes of user input and are
///   surfaced to the caller to act on. `Ambiguous` and `DuplicateRelation`
///   are usually downgraded to warnings at the call site: resolution takes
///   the first match, a duplicate link is a no-op.
/// - **Storage faults** — `Store`, `Io`, `Json`. The catalog file or a file
///   on disk could not be read or written, or a persisted value failed the
///   strict decode step. Recoverable only by fixing the environment.
/// - **Invariant faults** — `Invariant`. A committed operation would leave a
///   cached count or a primary-category reference inconsistent. This is
///   unreachable through the public contract; seeing it means a logic bug,
///   not bad user input, and callers should treat it as fatal.
///
/// Unresolvable references inside an *optional* query predicate never reach
/// this type at all: the query composer degrades the clause to an
/// impossible-match guard instead of failing the query.
#[derive(Debug, Error)]
pub enum CatalogError {
	/// A token, ID or path did not resolve to an existing entity
	#[error("{kind} not found: {token}")]
	NotFound { kind: EntityKind, token: String },

	/// More than one term matched a (name, taxonomy) pair
	#[error("ambiguous category '{name}' in taxonomy '{taxonomy}': {matches} matches")]
	Ambiguous {
		name: String,
		taxonomy: String,
		matches: usize,
	},

	/// The item is already linked to the term
	#[error("item {item} is already related to category {term}")]
	DuplicateRelation { item: ItemId, term: TermId },

	/// Creation was attempted without a mandatory attribute
	#[error("missing required field '{field}' for {entity}")]
	MissingRequiredField {
		entity: EntityKind,
		field: &'static str,
	},

	/// An ancestor walk ran past the configured maximum category depth
	#[error("category {term} exceeds the maximum nesting depth of {max_depth}")]
	DepthExceeded { term: TermId, max_depth: u32 },

	/// A primary category was assigned that the item is not related to
	#[error("item {item} has no relation to category {term}")]
	NotRelated { item: ItemId, term: TermId },

	/// Caller-supplied input that cannot be interpreted at all
	#[error("invalid input '{input}': {reason}")]
	InvalidInput { input: String, reason: String },

	/// A committed operation would violate a count or reference invariant.
	/// Unreachable through the public contract; indicates a logic bug.
	#[error("catalog invariant violated: {0}")]
	Invariant(String),

	/// Storage-boundary errors from the underlying catalog file
	#[error("storage error: {0}")]
	Store(#[from] StoreError),

	/// Filesystem I/O errors from the data/shortcut directories
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// Snapshot serialization/deserialization errors
	#[error("snapshot error: {0}")]
	Json(#[from] serde_json::Error),
}

/// Storage-boundary errors.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("database error: {0}")]
	Sqlite(#[from] rusqlite::Error),

	/// A persisted value failed the strict decode step
	#[error("corrupt value in column '{column}': {value}")]
	CorruptValue { column: &'static str, value: String },

	#[error("catalog version mismatch: expected {expected}, found {found}")]
	VersionMismatch { expected: u32, found: u32 },
}

/// Convenience alias used throughout the public API.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Convenience alias for storage-boundary results.
pub type StoreResult<T> = Result<T, StoreError>;
