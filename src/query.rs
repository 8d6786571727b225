//! The query composer: named optional predicates over items and terms.
//!
//! An [`ItemQuery`] or [`TermQuery`] is a plain configuration object whose
//! fields are independently combinable predicate groups. Groups combine
//! with AND; within a group the semantics are documented per field. The
//! composer resolves category and taxonomy tokens, builds a typed
//! [`Expr`] tree and hands it to the [`crate::sql`] adapter; it never sees
//! SQL text.
//!
//! ## Degradation, not failure
//!
//! A category or taxonomy token inside a predicate that does not resolve is
//! replaced by an impossible-match guard (term id `-1`) with a warning, so
//! one stale reference cannot abort the rest of a composed query. Required
//! single-entity operations go through [`crate::resolver`] directly and
//! fail hard instead.
//!
//! ## Cost model
//!
//! Filesystem stats (file size, on-disk modification time) are computed
//! only when a size filter, a stat-derived sort key, byte-level duplicate
//! comparison or an explicit `with_stats` request needs them — one stat per
//! SQL-filtered row, never per catalog row. Byte-level duplicate detection
//! first buckets candidates by size and only compares file pairs within a
//! bucket.
//!
//! ## Determinism
//!
//! Every sort key carries an item/term-id tie-break, so the same catalog
//! state and configuration always produce the same ordering. The only
//! exception is the explicitly requested [`Page::Shuffle`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::context::CatalogContext;
use crate::error::{CatalogError, CatalogResult};
use crate::files;
use crate::model::{
    Item, ItemColumn, ItemSortKey, SortOrder, Term, TermColumn, TermSortKey, TIME_FORMAT,
};
use crate::resolver::{resolve_category, CategoryMatch};
use crate::sql::{self, Arg, CmpOp, Expr, Membership};
use crate::store::{encode_text, Store};

/// Impossible-match guard substituted for unresolvable category references.
const UNRESOLVED_GUARD: i64 = -1;

/// Result-set slicing applied after filtering and sorting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Page {
    #[default]
    All,
    /// Random order (the one non-deterministic mode, by request)
    Shuffle,
    First(usize),
    Last(usize),
    /// 0-based fixed-size page: `page = 1, per_page = 2` over five sorted
    /// rows yields sorted indices 2 and 3
    Number { per_page: usize, page: usize },
    /// The final (possibly partial) fixed-size page
    LastPage { per_page: usize },
}

/// One matched item plus its lazily computed stat columns. `size` and
/// `file_modified` are `None` unless the query needed stats, or when the
/// item has no file on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemHit {
    pub item: Item,
    pub size: Option<u64>,
    pub file_modified: Option<NaiveDateTime>,
}

/// Predicate configuration for item searches. Every field is optional;
/// the default matches all items ordered ascending by id.
#[derive(Debug, Clone, Default)]
pub struct ItemQuery {
    /// Free-text phrase matched as a substring of name, source or
    /// description (OR across the three fields)
    pub phrase: Option<String>,
    /// Each word must appear in name, source or description (AND across
    /// words, OR across fields per word)
    pub keywords: Vec<String>,
    pub name_equals: Option<String>,
    pub source_equals: Option<String>,
    pub description_equals: Option<String>,
    pub name_contains: Vec<String>,
    pub name_not_contains: Vec<String>,
    pub source_contains: Vec<String>,
    pub source_not_contains: Vec<String>,
    pub description_contains: Vec<String>,
    pub description_not_contains: Vec<String>,
    /// Category tokens the item must have ALL of
    pub with_all_categories: Vec<String>,
    /// Category tokens the item must have ANY of
    pub with_any_categories: Vec<String>,
    /// Category tokens the item must have NONE of
    pub without_categories: Vec<String>,
    /// Taxonomy tokens at least one of the item's relations must fall in
    pub in_taxonomies: Vec<String>,
    /// Taxonomy tokens none of the item's relations may fall in
    pub not_in_taxonomies: Vec<String>,
    pub id_min: Option<i64>,
    pub id_max: Option<i64>,
    pub modified_after: Option<NaiveDateTime>,
    pub modified_before: Option<NaiveDateTime>,
    pub created_after: Option<NaiveDateTime>,
    pub created_before: Option<NaiveDateTime>,
    /// Item-type noun names to include / exclude
    pub types: Vec<String>,
    pub exclude_types: Vec<String>,
    pub extensions: Vec<String>,
    pub exclude_extensions: Vec<String>,
    /// Category tokens the primary category must / must not be
    pub primary_categories: Vec<String>,
    pub exclude_primary_categories: Vec<String>,
    pub source_null: Option<bool>,
    pub description_null: Option<bool>,
    pub hash_null: Option<bool>,
    /// Keep only items whose value in this column is shared with another
    /// item (content-hash duplicates, same-name items, ...)
    pub duplicates_on: Option<ItemColumn>,
    /// Keep only items whose file is byte-for-byte equal to another
    /// matched item's file
    pub byte_duplicates: bool,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    /// Compute size/file-modified columns even when no filter needs them
    pub with_stats: bool,
    pub sort: ItemSortKey,
    pub order: SortOrder,
    pub page: Page,
}

/// Predicate configuration for category searches.
#[derive(Debug, Clone, Default)]
pub struct TermQuery {
    /// Each word must appear in name or description
    pub keywords: Vec<String>,
    pub name_equals: Option<String>,
    pub name_contains: Vec<String>,
    pub name_not_contains: Vec<String>,
    /// Taxonomy tokens to include / exclude
    pub taxonomies: Vec<String>,
    pub exclude_taxonomies: Vec<String>,
    pub id_min: Option<i64>,
    pub id_max: Option<i64>,
    pub min_count: Option<i64>,
    pub max_count: Option<i64>,
    /// Terms related to ANY of these items
    pub with_items: Vec<crate::model::ItemId>,
    pub duplicates_on: Option<TermColumn>,
    pub sort: TermSortKey,
    pub order: SortOrder,
    pub page: Page,
}

/// Substring leaf over one encoded-text column.
fn contains(column: ItemColumn, needle: &str) -> Expr<ItemColumn> {
    Expr::Cmp(column, CmpOp::Contains, Arg::Text(encode_text(needle)))
}

fn not_contains(column: ItemColumn, needle: &str) -> Expr<ItemColumn> {
    Expr::Cmp(column, CmpOp::NotContains, Arg::Text(encode_text(needle)))
}

/// A word matched against any of the three item text fields.
fn word_in_text_fields(word: &str) -> Expr<ItemColumn> {
    Expr::Or(vec![
        contains(ItemColumn::Name, word),
        contains(ItemColumn::Source, word),
        contains(ItemColumn::Description, word),
    ])
}

/// Resolve a category token to a membership leaf, degrading unresolvable
/// tokens to the impossible-match guard.
fn category_membership(
    store: &Store,
    ctx: &CatalogContext,
    token: &str,
) -> CatalogResult<Membership> {
    match resolve_category(store, ctx, token) {
        Ok(CategoryMatch::Found(term)) => Ok(Membership::ItemHasTerm(term.id.0)),
        Ok(CategoryMatch::NotFound { taxonomy }) => {
            warn!("category '{token}' not found in taxonomy '{taxonomy}', clause matches nothing");
            Ok(Membership::ItemHasTerm(UNRESOLVED_GUARD))
        }
        Err(CatalogError::InvalidInput { input, reason }) => {
            warn!("ignoring malformed category token '{input}': {reason}");
            Ok(Membership::ItemHasTerm(UNRESOLVED_GUARD))
        }
        Err(err) => Err(err),
    }
}

/// Resolve a category token to its term id for primary-category filters,
/// degrading to the guard id.
fn category_id(store: &Store, ctx: &CatalogContext, token: &str) -> CatalogResult<i64> {
    Ok(match category_membership(store, ctx, token)? {
        Membership::ItemHasTerm(id) => id,
        _ => UNRESOLVED_GUARD,
    })
}

/// Map taxonomy tokens to stable taxonomy keys. Unknown tokens pass
/// through lowercased, where they match no stored relation.
fn taxonomy_keys(ctx: &CatalogContext, tokens: &[String]) -> Vec<String> {
    tokens
        .iter()
        .map(|token| match ctx.resolve_taxonomy(token) {
            Some(taxonomy) => taxonomy.table_name.clone(),
            None => {
                warn!("taxonomy '{token}' is not configured, clause matches nothing");
                token.to_lowercase()
            }
        })
        .collect()
}

fn time_arg(time: &NaiveDateTime) -> Arg {
    Arg::Text(time.format(TIME_FORMAT).to_string())
}

/// Build the typed predicate tree for an item query. Pure with respect to
/// the filesystem; only category/taxonomy resolution reads the store.
pub fn compose_item_expr(
    store: &Store,
    ctx: &CatalogContext,
    q: &ItemQuery,
) -> CatalogResult<Expr<ItemColumn>> {
    let mut groups: Vec<Expr<ItemColumn>> = Vec::new();

    if let Some(phrase) = &q.phrase {
        groups.push(word_in_text_fields(phrase));
    }
    for word in &q.keywords {
        groups.push(word_in_text_fields(word));
    }
    if let Some(name) = &q.name_equals {
        groups.push(Expr::Cmp(
            ItemColumn::Name,
            CmpOp::Eq,
            Arg::Text(encode_text(name)),
        ));
    }
    if let Some(source) = &q.source_equals {
        groups.push(Expr::Cmp(
            ItemColumn::Source,
            CmpOp::Eq,
            Arg::Text(encode_text(source)),
        ));
    }
    if let Some(description) = &q.description_equals {
        groups.push(Expr::Cmp(
            ItemColumn::Description,
            CmpOp::Eq,
            Arg::Text(encode_text(description)),
        ));
    }
    for needle in &q.name_contains {
        groups.push(contains(ItemColumn::Name, needle));
    }
    for needle in &q.name_not_contains {
        groups.push(not_contains(ItemColumn::Name, needle));
    }
    for needle in &q.source_contains {
        groups.push(contains(ItemColumn::Source, needle));
    }
    for needle in &q.source_not_contains {
        groups.push(not_contains(ItemColumn::Source, needle));
    }
    for needle in &q.description_contains {
        groups.push(contains(ItemColumn::Description, needle));
    }
    for needle in &q.description_not_contains {
        groups.push(not_contains(ItemColumn::Description, needle));
    }

    for token in &q.with_all_categories {
        groups.push(Expr::Related(category_membership(store, ctx, token)?));
    }
    if !q.with_any_categories.is_empty() {
        let any = q
            .with_any_categories
            .iter()
            .map(|token| Ok(Expr::Related(category_membership(store, ctx, token)?)))
            .collect::<CatalogResult<Vec<_>>>()?;
        groups.push(Expr::Or(any));
    }
    for token in &q.without_categories {
        groups.push(Expr::Not(Box::new(Expr::Related(category_membership(
            store, ctx, token,
        )?))));
    }

    if !q.in_taxonomies.is_empty() {
        groups.push(Expr::Related(Membership::ItemInTaxonomies(taxonomy_keys(
            ctx,
            &q.in_taxonomies,
        ))));
    }
    if !q.not_in_taxonomies.is_empty() {
        groups.push(Expr::Not(Box::new(Expr::Related(
            Membership::ItemInTaxonomies(taxonomy_keys(ctx, &q.not_in_taxonomies)),
        ))));
    }

    if let Some(min) = q.id_min {
        groups.push(Expr::Cmp(ItemColumn::Id, CmpOp::Ge, Arg::Int(min)));
    }
    if let Some(max) = q.id_max {
        groups.push(Expr::Cmp(ItemColumn::Id, CmpOp::Le, Arg::Int(max)));
    }
    if let Some(after) = &q.modified_after {
        groups.push(Expr::Cmp(ItemColumn::Modified, CmpOp::Ge, time_arg(after)));
    }
    if let Some(before) = &q.modified_before {
        groups.push(Expr::Cmp(ItemColumn::Modified, CmpOp::Le, time_arg(before)));
    }
    if let Some(after) = &q.created_after {
        groups.push(Expr::Cmp(ItemColumn::Created, CmpOp::Ge, time_arg(after)));
    }
    if let Some(before) = &q.created_before {
        groups.push(Expr::Cmp(ItemColumn::Created, CmpOp::Le, time_arg(before)));
    }

    if !q.types.is_empty() {
        groups.push(Expr::In(
            ItemColumn::Type,
            q.types.iter().cloned().map(Arg::Text).collect(),
        ));
    }
    if !q.exclude_types.is_empty() {
        groups.push(Expr::Not(Box::new(Expr::In(
            ItemColumn::Type,
            q.exclude_types.iter().cloned().map(Arg::Text).collect(),
        ))));
    }
    if !q.extensions.is_empty() {
        groups.push(Expr::In(
            ItemColumn::Extension,
            q.extensions
                .iter()
                .map(|e| Arg::Text(e.to_lowercase()))
                .collect(),
        ));
    }
    if !q.exclude_extensions.is_empty() {
        groups.push(Expr::Not(Box::new(Expr::In(
            ItemColumn::Extension,
            q.exclude_extensions
                .iter()
                .map(|e| Arg::Text(e.to_lowercase()))
                .collect(),
        ))));
    }

    if !q.primary_categories.is_empty() {
        let ids = q
            .primary_categories
            .iter()
            .map(|token| Ok(Arg::Int(category_id(store, ctx, token)?)))
            .collect::<CatalogResult<Vec<_>>>()?;
        groups.push(Expr::In(ItemColumn::PrimaryCategory, ids));
    }
    if !q.exclude_primary_categories.is_empty() {
        let ids = q
            .exclude_primary_categories
            .iter()
            .map(|token| Ok(Arg::Int(category_id(store, ctx, token)?)))
            .collect::<CatalogResult<Vec<_>>>()?;
        // items without any primary category are kept by an exclusion
        groups.push(Expr::Or(vec![
            Expr::Null(ItemColumn::PrimaryCategory, true),
            Expr::Not(Box::new(Expr::In(ItemColumn::PrimaryCategory, ids))),
        ]));
    }

    if let Some(is_null) = q.source_null {
        groups.push(Expr::Null(ItemColumn::Source, is_null));
    }
    if let Some(is_null) = q.description_null {
        groups.push(Expr::Null(ItemColumn::Description, is_null));
    }
    if let Some(is_null) = q.hash_null {
        groups.push(Expr::Null(ItemColumn::Hash, is_null));
    }
    if let Some(column) = q.duplicates_on {
        groups.push(Expr::DuplicateGroup(column));
    }

    Ok(Expr::all(groups))
}

/// Build the typed predicate tree for a term query.
pub fn compose_term_expr(ctx: &CatalogContext, q: &TermQuery) -> Expr<TermColumn> {
    let mut groups: Vec<Expr<TermColumn>> = Vec::new();

    for word in &q.keywords {
        groups.push(Expr::Or(vec![
            Expr::Cmp(
                TermColumn::Name,
                CmpOp::Contains,
                Arg::Text(encode_text(word)),
            ),
            Expr::Cmp(
                TermColumn::Description,
                CmpOp::Contains,
                Arg::Text(encode_text(word)),
            ),
        ]));
    }
    if let Some(name) = &q.name_equals {
        groups.push(Expr::Cmp(
            TermColumn::Name,
            CmpOp::Eq,
            Arg::Text(encode_text(name)),
        ));
    }
    for needle in &q.name_contains {
        groups.push(Expr::Cmp(
            TermColumn::Name,
            CmpOp::Contains,
            Arg::Text(encode_text(needle)),
        ));
    }
    for needle in &q.name_not_contains {
        groups.push(Expr::Cmp(
            TermColumn::Name,
            CmpOp::NotContains,
            Arg::Text(encode_text(needle)),
        ));
    }
    if !q.taxonomies.is_empty() {
        groups.push(Expr::In(
            TermColumn::Taxonomy,
            taxonomy_keys(ctx, &q.taxonomies)
                .into_iter()
                .map(Arg::Text)
                .collect(),
        ));
    }
    if !q.exclude_taxonomies.is_empty() {
        groups.push(Expr::Not(Box::new(Expr::In(
            TermColumn::Taxonomy,
            taxonomy_keys(ctx, &q.exclude_taxonomies)
                .into_iter()
                .map(Arg::Text)
                .collect(),
        ))));
    }
    if let Some(min) = q.id_min {
        groups.push(Expr::Cmp(TermColumn::Id, CmpOp::Ge, Arg::Int(min)));
    }
    if let Some(max) = q.id_max {
        groups.push(Expr::Cmp(TermColumn::Id, CmpOp::Le, Arg::Int(max)));
    }
    if let Some(min) = q.min_count {
        groups.push(Expr::Cmp(TermColumn::ItemCount, CmpOp::Ge, Arg::Int(min)));
    }
    if let Some(max) = q.max_count {
        groups.push(Expr::Cmp(TermColumn::ItemCount, CmpOp::Le, Arg::Int(max)));
    }
    if !q.with_items.is_empty() {
        groups.push(Expr::Or(
            q.with_items
                .iter()
                .map(|item| Expr::Related(Membership::TermHasItem(item.0)))
                .collect(),
        ));
    }
    if let Some(column) = q.duplicates_on {
        groups.push(Expr::DuplicateGroup(column));
    }

    Expr::all(groups)
}

/// Run an item query: compile, execute, stat (when needed), post-filter,
/// post-sort and paginate.
pub fn search_items(
    store: &Store,
    ctx: &CatalogContext,
    q: &ItemQuery,
) -> CatalogResult<Vec<ItemHit>> {
    let expr = compose_item_expr(store, ctx, q)?;
    let (sql_text, params) = sql::item_select(&expr, q.sort, q.order);
    debug!("item query: {sql_text}");
    let items = store.query_items(&sql_text, params)?;

    let needs_stats = q.with_stats
        || q.byte_duplicates
        || q.min_size.is_some()
        || q.max_size.is_some()
        || matches!(q.sort, ItemSortKey::Size | ItemSortKey::FileModified);

    let mut hits: Vec<ItemHit> = Vec::with_capacity(items.len());
    let mut paths: Vec<Option<PathBuf>> = Vec::with_capacity(items.len());
    for item in items {
        let (mut size, mut file_modified, mut path) = (None, None, None);
        if needs_stats {
            if let Some(data_dir) = &ctx.options.data_dir {
                let candidate = files::data_file_path(
                    data_dir,
                    &ctx.dir_for_type(&item.item_type),
                    item.id,
                    &item.extension,
                );
                size = files::file_size(&candidate).ok();
                file_modified = files::file_mod_time(&candidate).ok();
                if size.is_some() {
                    path = Some(candidate);
                }
            }
        }
        hits.push(ItemHit {
            item,
            size,
            file_modified,
        });
        paths.push(path);
    }
    if needs_stats && ctx.options.data_dir.is_none() {
        warn!("query needs file stats but no data directory is configured");
    }

    if q.min_size.is_some() || q.max_size.is_some() {
        let min = q.min_size.unwrap_or(0);
        let max = q.max_size.unwrap_or(u64::MAX);
        let filtered: Vec<(ItemHit, Option<PathBuf>)> = hits
            .into_iter()
            .zip(paths)
            .filter(|(hit, _)| hit.size.map(|s| s >= min && s <= max).unwrap_or(false))
            .collect();
        (hits, paths) = filtered.into_iter().unzip();
    }

    if q.byte_duplicates {
        let keep = byte_duplicate_flags(&hits, &paths);
        hits = hits
            .into_iter()
            .zip(keep)
            .filter_map(|(hit, keep)| keep.then_some(hit))
            .collect();
    }

    match q.sort {
        ItemSortKey::Size => sort_hits_by(&mut hits, q.order, |hit| hit.size),
        ItemSortKey::FileModified => sort_hits_by(&mut hits, q.order, |hit| hit.file_modified),
        _ => {}
    }

    Ok(paginate(hits, &q.page))
}

/// Run a term query.
pub fn search_terms(
    store: &Store,
    ctx: &CatalogContext,
    q: &TermQuery,
) -> CatalogResult<Vec<Term>> {
    let expr = compose_term_expr(ctx, q);
    let (sql_text, params) = sql::term_select(&expr, q.sort, q.order);
    debug!("term query: {sql_text}");
    let terms = store.query_terms(&sql_text, params)?;
    Ok(paginate(terms, &q.page))
}

/// Which hits have at least one byte-for-byte equal partner. Candidates
/// are bucketed by size first; files that cannot be read compare unequal.
fn byte_duplicate_flags(hits: &[ItemHit], paths: &[Option<PathBuf>]) -> Vec<bool> {
    let mut by_size: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
    for (index, hit) in hits.iter().enumerate() {
        if let (Some(size), Some(_)) = (hit.size, &paths[index]) {
            by_size.entry(size).or_default().push(index);
        }
    }
    let mut keep = vec![false; hits.len()];
    for bucket in by_size.values().filter(|b| b.len() > 1) {
        for (offset, &a) in bucket.iter().enumerate() {
            for &b in &bucket[offset + 1..] {
                if keep[a] && keep[b] {
                    continue;
                }
                let equal = match (&paths[a], &paths[b]) {
                    (Some(pa), Some(pb)) => files::compare_files(pa, pb).unwrap_or_else(|err| {
                        warn!("byte comparison failed for {}: {err}", pa.display());
                        false
                    }),
                    _ => false,
                };
                if equal {
                    keep[a] = true;
                    keep[b] = true;
                }
            }
        }
    }
    keep
}

/// Sort hits by a stat-derived key. Items without a file sort last in
/// either direction; ties fall back to ascending id.
fn sort_hits_by<K: Ord + Copy>(
    hits: &mut [ItemHit],
    order: SortOrder,
    key: impl Fn(&ItemHit) -> Option<K>,
) {
    hits.sort_by(|a, b| {
        let ordering = match (key(a), key(b)) {
            (Some(ka), Some(kb)) => match order {
                SortOrder::Ascending => ka.cmp(&kb),
                SortOrder::Descending => kb.cmp(&ka),
            },
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        };
        ordering.then(a.item.id.cmp(&b.item.id))
    });
}

/// Apply the configured result-set slice.
fn paginate<T: Clone>(mut rows: Vec<T>, page: &Page) -> Vec<T> {
    match page {
        Page::All => rows,
        Page::Shuffle => {
            rows.shuffle(&mut rand::thread_rng());
            rows
        }
        Page::First(n) => {
            rows.truncate(*n);
            rows
        }
        Page::Last(n) => {
            let skip = rows.len().saturating_sub(*n);
            rows.split_off(skip)
        }
        Page::Number { per_page, page } => {
            if *per_page == 0 {
                return Vec::new();
            }
            rows.chunks(*per_page)
                .nth(*page)
                .map(|chunk| chunk.to_vec())
                .unwrap_or_default()
        }
        Page::LastPage { per_page } => {
            if *per_page == 0 {
                return Vec::new();
            }
            rows.chunks(*per_page)
                .last()
                .map(|chunk| chunk.to_vec())
                .unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemId, NewItem, NewTerm, TermId};

    /// Five items and three tag categories with known relation sets:
    /// x = {1, 2, 4}, y = {2, 3}, z = {4, 5}.
    fn fixture() -> (Store, CatalogContext, Vec<ItemId>, Vec<TermId>) {
        let mut store = Store::open_in_memory().unwrap();
        let ctx = CatalogContext::load(&store).unwrap();
        let names = ["alpha", "beta", "gamma", "delta", "epsilon"];
        let types = ["Document", "Document", "Image", "Image", "Video"];
        let exts = ["txt", "pdf", "png", "jpg", "mkv"];
        let mut items = Vec::new();
        for i in 0..5 {
            items.push(
                store
                    .create_item(&NewItem {
                        name: names[i].to_string(),
                        item_type: types[i].to_string(),
                        extension: exts[i].to_string(),
                        ..NewItem::default()
                    })
                    .unwrap(),
            );
        }
        let mut terms = Vec::new();
        for name in ["x", "y", "z"] {
            terms.push(
                store
                    .create_term(
                        &NewTerm {
                            name: name.to_string(),
                            taxonomy: "tag".to_string(),
                            ..NewTerm::default()
                        },
                        false,
                    )
                    .unwrap(),
            );
        }
        for (item, term) in [(0, 0), (1, 0), (3, 0), (1, 1), (2, 1), (3, 2), (4, 2)] {
            store.link(items[item], terms[term]).unwrap();
        }
        (store, ctx, items, terms)
    }

    fn ids(hits: &[ItemHit]) -> Vec<ItemId> {
        hits.iter().map(|hit| hit.item.id).collect()
    }

    #[test_log::test]
    fn test_with_and_without_categories() {
        let (store, ctx, items, _) = fixture();
        let q = ItemQuery {
            with_all_categories: vec!["tag:x".to_string()],
            without_categories: vec!["tag:y".to_string()],
            ..ItemQuery::default()
        };
        let hits = search_items(&store, &ctx, &q).unwrap();
        // every x-item without a y relation, none with one
        assert_eq!(ids(&hits), vec![items[0], items[3]]);
    }

    #[test_log::test]
    fn test_any_categories() {
        let (store, ctx, items, _) = fixture();
        let q = ItemQuery {
            with_any_categories: vec!["tag:y".to_string(), "tag:z".to_string()],
            ..ItemQuery::default()
        };
        let hits = search_items(&store, &ctx, &q).unwrap();
        assert_eq!(ids(&hits), vec![items[1], items[2], items[3], items[4]]);
    }

    #[test_log::test]
    fn test_unresolved_category_degrades_not_aborts() {
        let (store, ctx, _, _) = fixture();
        // inclusion of a nonexistent category matches nothing
        let q = ItemQuery {
            with_all_categories: vec!["tag:nowhere".to_string()],
            ..ItemQuery::default()
        };
        assert!(search_items(&store, &ctx, &q).unwrap().is_empty());

        // exclusion of a nonexistent category excludes nothing
        let q = ItemQuery {
            without_categories: vec!["tag:nowhere".to_string()],
            ..ItemQuery::default()
        };
        assert_eq!(search_items(&store, &ctx, &q).unwrap().len(), 5);
    }

    #[test_log::test]
    fn test_pagination_fixed_pages() {
        let (store, ctx, items, _) = fixture();
        let q = ItemQuery {
            page: Page::Number {
                per_page: 2,
                page: 1,
            },
            ..ItemQuery::default()
        };
        let hits = search_items(&store, &ctx, &q).unwrap();
        // sorted indices 2 and 3 of the five id-ordered results
        assert_eq!(ids(&hits), vec![items[2], items[3]]);

        let q = ItemQuery {
            page: Page::LastPage { per_page: 2 },
            ..ItemQuery::default()
        };
        let hits = search_items(&store, &ctx, &q).unwrap();
        assert_eq!(ids(&hits), vec![items[4]]);

        let q = ItemQuery {
            page: Page::Number {
                per_page: 2,
                page: 9,
            },
            ..ItemQuery::default()
        };
        assert!(search_items(&store, &ctx, &q).unwrap().is_empty());
    }

    #[test_log::test]
    fn test_first_and_last() {
        let (store, ctx, items, _) = fixture();
        let q = ItemQuery {
            page: Page::First(2),
            ..ItemQuery::default()
        };
        assert_eq!(
            ids(&search_items(&store, &ctx, &q).unwrap()),
            vec![items[0], items[1]]
        );
        let q = ItemQuery {
            page: Page::Last(2),
            ..ItemQuery::default()
        };
        assert_eq!(
            ids(&search_items(&store, &ctx, &q).unwrap()),
            vec![items[3], items[4]]
        );
    }

    #[test_log::test]
    fn test_type_and_extension_filters() {
        let (store, ctx, items, _) = fixture();
        let q = ItemQuery {
            types: vec!["Image".to_string()],
            ..ItemQuery::default()
        };
        assert_eq!(
            ids(&search_items(&store, &ctx, &q).unwrap()),
            vec![items[2], items[3]]
        );
        let q = ItemQuery {
            exclude_extensions: vec!["TXT".to_string(), "mkv".to_string()],
            ..ItemQuery::default()
        };
        assert_eq!(
            ids(&search_items(&store, &ctx, &q).unwrap()),
            vec![items[1], items[2], items[3]]
        );
    }

    #[test_log::test]
    fn test_keywords_match_through_encoding() {
        let (mut store, ctx, _, _) = fixture();
        let special = store
            .create_item(&NewItem {
                name: "summer trip & photos".to_string(),
                item_type: "Document".to_string(),
                extension: "txt".to_string(),
                ..NewItem::default()
            })
            .unwrap();
        let q = ItemQuery {
            keywords: vec!["summer trip".to_string(), "photos".to_string()],
            ..ItemQuery::default()
        };
        let hits = search_items(&store, &ctx, &q).unwrap();
        assert_eq!(ids(&hits), vec![special]);
    }

    #[test_log::test]
    fn test_exact_source_and_description_match() {
        let (mut store, ctx, _, _) = fixture();
        let exact = store
            .create_item(&NewItem {
                name: "bookmark".to_string(),
                item_type: "Weblink".to_string(),
                source: Some("https://example.com/a".to_string()),
                description: Some("summer trip".to_string()),
                ..NewItem::default()
            })
            .unwrap();
        store
            .create_item(&NewItem {
                name: "other".to_string(),
                item_type: "Weblink".to_string(),
                source: Some("https://example.com/a/b".to_string()),
                description: Some("summer trip notes".to_string()),
                ..NewItem::default()
            })
            .unwrap();

        // exact match, not substring: the longer source does not qualify
        let q = ItemQuery {
            source_equals: Some("https://example.com/a".to_string()),
            ..ItemQuery::default()
        };
        assert_eq!(ids(&search_items(&store, &ctx, &q).unwrap()), vec![exact]);

        let q = ItemQuery {
            description_equals: Some("summer trip".to_string()),
            ..ItemQuery::default()
        };
        assert_eq!(ids(&search_items(&store, &ctx, &q).unwrap()), vec![exact]);
    }

    #[test_log::test]
    fn test_duplicates_on_hash() {
        let (mut store, ctx, items, _) = fixture();
        let patch = |hash: &str| crate::model::ItemPatch {
            content_hash: Some(hash.to_string()),
            ..crate::model::ItemPatch::default()
        };
        store.update_item(items[0], &patch("aaaa")).unwrap();
        store.update_item(items[1], &patch("aaaa")).unwrap();
        store.update_item(items[2], &patch("bbbb")).unwrap();
        let q = ItemQuery {
            duplicates_on: Some(ItemColumn::Hash),
            ..ItemQuery::default()
        };
        let hits = search_items(&store, &ctx, &q).unwrap();
        assert_eq!(ids(&hits), vec![items[0], items[1]]);
    }

    #[test_log::test]
    fn test_sort_name_descending_is_deterministic() {
        let (store, ctx, items, _) = fixture();
        let q = ItemQuery {
            sort: ItemSortKey::Name,
            order: SortOrder::Descending,
            ..ItemQuery::default()
        };
        let first = ids(&search_items(&store, &ctx, &q).unwrap());
        let second = ids(&search_items(&store, &ctx, &q).unwrap());
        assert_eq!(first, second);
        // gamma, epsilon, delta, beta, alpha
        assert_eq!(
            first,
            vec![items[2], items[4], items[3], items[1], items[0]]
        );
    }

    #[test_log::test]
    fn test_relation_count_sort() {
        let (store, ctx, items, _) = fixture();
        let q = ItemQuery {
            sort: ItemSortKey::RelationCount,
            order: SortOrder::Descending,
            ..ItemQuery::default()
        };
        let hits = search_items(&store, &ctx, &q).unwrap();
        // items 2 and 4 (0-based 1 and 3) have two relations each
        assert_eq!(
            ids(&hits),
            vec![items[1], items[3], items[0], items[2], items[4]]
        );
    }

    #[test_log::test]
    fn test_size_filter_and_byte_duplicates() {
        let (mut store, mut ctx, _, _) = fixture();
        let dir = tempfile::TempDir::new().unwrap();
        ctx.options.data_dir = Some(dir.path().to_path_buf());
        let docs = dir.path().join("documents");
        std::fs::create_dir_all(&docs).unwrap();

        let mut make = |name: &str, content: &[u8]| {
            let id = store
                .create_item(&NewItem {
                    name: name.to_string(),
                    item_type: "Document".to_string(),
                    extension: "txt".to_string(),
                    ..NewItem::default()
                })
                .unwrap();
            std::fs::write(docs.join(format!("{id}.txt")), content).unwrap();
            id
        };
        let twin_a = make("twin a", b"same bytes here");
        let twin_b = make("twin b", b"same bytes here");
        let decoy = make("decoy", b"same bytes hare"); // equal size, different bytes
        let small = make("small", b"tiny");

        let q = ItemQuery {
            min_size: Some(10),
            types: vec!["Document".to_string()],
            ..ItemQuery::default()
        };
        let hits = search_items(&store, &ctx, &q).unwrap();
        // the five fixture items have no files on disk and never match a
        // size filter; `small` is under the threshold
        assert_eq!(ids(&hits), vec![twin_a, twin_b, decoy]);
        assert!(hits.iter().all(|hit| hit.size == Some(15)));

        let q = ItemQuery {
            byte_duplicates: true,
            types: vec!["Document".to_string()],
            ..ItemQuery::default()
        };
        let hits = search_items(&store, &ctx, &q).unwrap();
        assert_eq!(ids(&hits), vec![twin_a, twin_b]);
        let _ = small;
    }

    #[test_log::test]
    fn test_search_terms_by_count_and_taxonomy() {
        let (mut store, ctx, _, terms) = fixture();
        store
            .create_term(
                &NewTerm {
                    name: "lonely".to_string(),
                    taxonomy: "genre".to_string(),
                    ..NewTerm::default()
                },
                false,
            )
            .unwrap();

        // default ordering is ascending cached item count
        let all = search_terms(&store, &ctx, &TermQuery::default()).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].item_count, 0);
        assert_eq!(all.last().unwrap().id, terms[0]);

        let q = TermQuery {
            min_count: Some(2),
            taxonomies: vec!["Tags".to_string()],
            ..TermQuery::default()
        };
        let found = search_terms(&store, &ctx, &q).unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|t| t.taxonomy == "tag" && t.item_count >= 2));
    }

    #[test_log::test]
    fn test_terms_for_items() {
        let (store, ctx, items, terms) = fixture();
        let q = TermQuery {
            with_items: vec![items[1]],
            sort: TermSortKey::Id,
            ..TermQuery::default()
        };
        let found = search_terms(&store, &ctx, &q).unwrap();
        assert_eq!(
            found.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![terms[0], terms[1]]
        );
    }

    #[test]
    fn test_paginate_edges() {
        let rows: Vec<i32> = (0..5).collect();
        assert_eq!(
            paginate(rows.clone(), &Page::Number { per_page: 2, page: 1 }),
            vec![2, 3]
        );
        assert_eq!(
            paginate(rows.clone(), &Page::LastPage { per_page: 2 }),
            vec![4]
        );
        assert_eq!(paginate(rows.clone(), &Page::Last(7)), rows.clone());
        assert!(paginate(rows.clone(), &Page::Number { per_page: 0, page: 0 }).is_empty());
        let shuffled = paginate(rows.clone(), &Page::Shuffle);
        assert_eq!(shuffled.len(), 5);
    }
}
