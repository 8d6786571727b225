//! Category tree resolution: bounded ancestor walks over the term
//! parent chain.
//!
//! The hierarchy is an adjacency of `term -> parent term` references.
//! Reparenting validates against cycles at write time, so a walk can only
//! run too long if the configured depth limit is smaller than an existing
//! chain — in which case resolution fails with `DepthExceeded` instead of
//! silently truncating the path.

use crate::error::{CatalogError, CatalogResult};
use crate::model::{Term, TermId};
use crate::store::Store;

/// The ordered ancestor names of a term, root first, immediate parent
/// last. A root term yields an empty path. At most `max_depth` ancestors
/// are visited; a longer chain is an error.
pub fn ancestor_path(store: &Store, term: TermId, max_depth: u32) -> CatalogResult<Vec<String>> {
    Ok(ancestors(store, term, max_depth)?
        .into_iter()
        .map(|t| t.name)
        .collect())
}

/// Like [`ancestor_path`], but returns the full terms.
pub fn ancestors(store: &Store, term: TermId, max_depth: u32) -> CatalogResult<Vec<Term>> {
    let mut chain: Vec<Term> = Vec::new();
    let mut cursor = store.term(term)?.parent;
    while let Some(parent) = cursor {
        if chain.len() as u32 >= max_depth {
            return Err(CatalogError::DepthExceeded { term, max_depth });
        }
        let node = store.term(parent)?;
        cursor = node.parent;
        chain.push(node);
    }
    chain.reverse();
    Ok(chain)
}
