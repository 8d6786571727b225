//! Resolution of user-supplied tokens into canonical catalog entities.
//!
//! Category tokens come in several shapes: a numeric term ID, a
//! `"taxonomy:name"` pair, or a bare name that falls under the configured
//! default taxonomy. Item tokens may be a numeric ID, a shortcut symlink
//! (whose target carries the ID as its file stem), or any path whose stem
//! is the ID.
//!
//! Not-found is an expected outcome for categories: the caller usually
//! wants to auto-create the category, so the taxonomy key the token
//! resolved against is returned even when no term matched. Ambiguity
//! (several same-named terms in one taxonomy) takes the first match with a
//! warning; callers that need a hard guarantee use
//! [`resolve_category_strict`].

use std::path::Path;

use tracing::warn;

use crate::context::CatalogContext;
use crate::error::{CatalogError, CatalogResult, EntityKind};
use crate::model::{Item, ItemId, Term, TermId};
use crate::store::Store;

/// Outcome of category resolution. `NotFound` still names the taxonomy the
/// token was resolved against so the category can be created there.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryMatch {
    Found(Term),
    NotFound { taxonomy: String },
}

impl CategoryMatch {
    pub fn term(self) -> Option<Term> {
        match self {
            CategoryMatch::Found(term) => Some(term),
            CategoryMatch::NotFound { .. } => None,
        }
    }

    /// The taxonomy key the token resolved against, found or not.
    pub fn taxonomy(&self) -> &str {
        match self {
            CategoryMatch::Found(term) => &term.taxonomy,
            CategoryMatch::NotFound { taxonomy } => taxonomy,
        }
    }
}

/// Split a category token into its taxonomy part and name part. No `:`
/// means the whole token is the name, under the default taxonomy.
fn split_token(token: &str) -> (Option<&str>, &str) {
    match token.split_once(':') {
        Some((taxonomy, name)) => (Some(taxonomy), name),
        None => (None, token),
    }
}

/// Resolve a category token to a term.
///
/// The taxonomy part (or the default taxonomy for bare names) is matched
/// case-insensitively against every configured taxonomy's noun, plural,
/// directory and table names; an unknown part is passed through lowercased
/// so the caller can create the taxonomy. An exact name match within the
/// taxonomy wins; several matches warn and take the first; a purely numeric
/// token with no name match falls back to direct term-ID lookup.
pub fn resolve_category(
    store: &Store,
    ctx: &CatalogContext,
    token: &str,
) -> CatalogResult<CategoryMatch> {
    let (taxonomy_part, name) = split_token(token);
    if name.is_empty() {
        return Err(CatalogError::InvalidInput {
            input: token.to_string(),
            reason: "category name is missing".to_string(),
        });
    }
    let taxonomy = match ctx.resolve_taxonomy(taxonomy_part.unwrap_or("")) {
        Some(taxonomy) => taxonomy.table_name.clone(),
        // unknown taxonomy token: pass the key through for auto-creation
        None => taxonomy_part.unwrap_or("").to_lowercase(),
    };

    let matches = store.terms_by_name(name, &taxonomy)?;
    if matches.len() > 1 {
        warn!(
            "category '{}' matches {} terms in taxonomy '{}', using the first",
            name,
            matches.len(),
            taxonomy
        );
    }
    if let Some(term) = matches.into_iter().next() {
        return Ok(CategoryMatch::Found(term));
    }

    // numeric fallback: the token itself may be a term ID
    if let Ok(id) = token.parse::<i64>() {
        if let Some(term) = store.find_term(TermId(id))? {
            return Ok(CategoryMatch::Found(term));
        }
    }

    Ok(CategoryMatch::NotFound { taxonomy })
}

/// Like [`resolve_category`], but ambiguity and not-found are hard errors.
pub fn resolve_category_strict(
    store: &Store,
    ctx: &CatalogContext,
    token: &str,
) -> CatalogResult<Term> {
    let (taxonomy_part, name) = split_token(token);
    if name.is_empty() {
        return Err(CatalogError::InvalidInput {
            input: token.to_string(),
            reason: "category name is missing".to_string(),
        });
    }
    if let Some(taxonomy) = ctx.resolve_taxonomy(taxonomy_part.unwrap_or("")) {
        let matches = store.terms_by_name(name, &taxonomy.table_name)?;
        if matches.len() > 1 {
            return Err(CatalogError::Ambiguous {
                name: name.to_string(),
                taxonomy: taxonomy.table_name.clone(),
                matches: matches.len(),
            });
        }
        if let Some(term) = matches.into_iter().next() {
            return Ok(term);
        }
    }
    if let Ok(id) = token.parse::<i64>() {
        if let Some(term) = store.find_term(TermId(id))? {
            return Ok(term);
        }
    }
    Err(CatalogError::NotFound {
        kind: EntityKind::Term,
        token: token.to_string(),
    })
}

/// Extract the numeric item ID carried by a token: a symlink's target stem,
/// a plain number, or any path's file stem.
fn item_id_from_token(token: &str) -> Option<ItemId> {
    let path = Path::new(token);
    let stem = if path.symlink_metadata().map(|m| m.file_type().is_symlink()).unwrap_or(false) {
        let target = std::fs::read_link(path).ok()?;
        target.file_stem()?.to_str()?.to_string()
    } else if let Ok(id) = token.parse::<i64>() {
        return Some(ItemId(id));
    } else {
        path.file_stem()?.to_str()?.to_string()
    };
    stem.parse::<i64>().ok().map(ItemId)
}

/// Resolve an item token (ID, shortcut symlink or data-file path) to the
/// item it names.
pub fn resolve_item(store: &Store, token: &str) -> CatalogResult<Item> {
    let id = item_id_from_token(token).ok_or_else(|| CatalogError::NotFound {
        kind: EntityKind::Item,
        token: token.to_string(),
    })?;
    store.find_item(id)?.ok_or_else(|| CatalogError::NotFound {
        kind: EntityKind::Item,
        token: token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewItem, NewTerm};

    fn fixture() -> (Store, CatalogContext) {
        let store = Store::open_in_memory().unwrap();
        let ctx = CatalogContext::load(&store).unwrap();
        (store, ctx)
    }

    fn term(name: &str, taxonomy: &str) -> NewTerm {
        NewTerm {
            name: name.to_string(),
            taxonomy: taxonomy.to_string(),
            ..NewTerm::default()
        }
    }

    #[test_log::test]
    fn test_explicit_and_default_taxonomy_forms_are_equivalent() {
        let (mut store, ctx) = fixture();
        let id = store.create_term(&term("vacation", "tag"), false).unwrap();

        let explicit = resolve_category(&store, &ctx, "tag:vacation").unwrap();
        let bare = resolve_category(&store, &ctx, "vacation").unwrap();
        assert_eq!(explicit.clone().term().unwrap().id, id);
        assert_eq!(explicit, bare);
    }

    #[test_log::test]
    fn test_plural_and_capitalized_taxonomy_tokens() {
        let (mut store, ctx) = fixture();
        let id = store.create_term(&term("vacation", "tag"), false).unwrap();
        for token in ["Tags:vacation", "TAG:vacation", "tags:vacation"] {
            let resolved = resolve_category(&store, &ctx, token).unwrap();
            assert_eq!(resolved.term().unwrap().id, id, "token {token}");
        }
    }

    #[test_log::test]
    fn test_not_found_carries_taxonomy_for_auto_create() {
        let (store, ctx) = fixture();
        let miss = resolve_category(&store, &ctx, "tag:nowhere").unwrap();
        assert_eq!(miss, CategoryMatch::NotFound { taxonomy: "tag".to_string() });
        // unknown taxonomy part passes through as the new taxonomy key
        let miss = resolve_category(&store, &ctx, "Genre:jazz").unwrap();
        assert_eq!(miss.taxonomy(), "genre");
    }

    #[test_log::test]
    fn test_empty_name_part_is_invalid() {
        let (store, ctx) = fixture();
        assert!(matches!(
            resolve_category(&store, &ctx, "tag:"),
            Err(CatalogError::InvalidInput { .. })
        ));
    }

    #[test_log::test]
    fn test_numeric_fallback() {
        let (mut store, ctx) = fixture();
        let id = store.create_term(&term("vacation", "tag"), false).unwrap();
        let resolved = resolve_category(&store, &ctx, &id.to_string()).unwrap();
        assert_eq!(resolved.term().unwrap().id, id);
    }

    #[test_log::test]
    fn test_ambiguous_takes_first_strict_fails() {
        let (mut store, ctx) = fixture();
        let first = store.create_term(&term("dup", "tag"), false).unwrap();
        store.create_term(&term("dup", "tag"), false).unwrap();

        let resolved = resolve_category(&store, &ctx, "tag:dup").unwrap();
        assert_eq!(resolved.term().unwrap().id, first);

        assert!(matches!(
            resolve_category_strict(&store, &ctx, "tag:dup"),
            Err(CatalogError::Ambiguous { matches: 2, .. })
        ));
    }

    #[test_log::test]
    fn test_resolve_item_from_id_and_path() {
        let (mut store, _ctx) = fixture();
        let id = store
            .create_item(&NewItem {
                name: "a".to_string(),
                item_type: "Document".to_string(),
                extension: "txt".to_string(),
                ..NewItem::default()
            })
            .unwrap();
        assert_eq!(resolve_item(&store, &id.to_string()).unwrap().id, id);
        let path = format!("/somewhere/documents/{id}.txt");
        assert_eq!(resolve_item(&store, &path).unwrap().id, id);
        assert!(matches!(
            resolve_item(&store, "/somewhere/readme.txt"),
            Err(CatalogError::NotFound { .. })
        ));
    }

    #[cfg(unix)]
    #[test_log::test]
    fn test_resolve_item_through_symlink() {
        let (mut store, _ctx) = fixture();
        let id = store
            .create_item(&NewItem {
                name: "a".to_string(),
                item_type: "Document".to_string(),
                extension: "txt".to_string(),
                ..NewItem::default()
            })
            .unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let link = dir.path().join("Holiday notes.txt");
        std::os::unix::fs::symlink(format!("/data/documents/{id}.txt"), &link).unwrap();
        let resolved = resolve_item(&store, link.to_str().unwrap()).unwrap();
        assert_eq!(resolved.id, id);
    }
}
