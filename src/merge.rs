//! Consolidation operations: merging duplicate items, categories and
//! taxonomies, and reconciling catalog rows with the data directory.
//!
//! Every operation here is all-or-nothing. Each runs inside a single
//! store transaction, so a failure midway leaves relation rows, cached
//! counts and primary categories exactly as they were.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::context::{capitalize, pluralize, CatalogContext};
use crate::error::{CatalogError, CatalogResult, EntityKind};
use crate::files;
use crate::model::{Item, ItemId, ItemPatch, NewItem, NewTerm, Taxonomy, Term, TermId, TermPatch};
use crate::resolver::{resolve_category, CategoryMatch};
use crate::store::Store;

/// Which duplicate survives a dedupe merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeepPolicy {
    /// Keep the earliest-created duplicate (lowest id breaks ties)
    #[default]
    Oldest,
    /// Keep the latest-created duplicate (highest id breaks ties)
    Newest,
}

/// Outcome of [`dedupe_items`].
#[derive(Debug, Default)]
pub struct DedupeReport {
    /// Items whose stored hash was recomputed from disk
    pub hashed: usize,
    /// Donor items removed by merging, returned so the caller can clean
    /// up their data files
    pub removed: Vec<Item>,
}

/// Merge `donors` into `target`: the target gains every relation any
/// donor holds, empty target fields are backfilled from the first donor
/// that has a value, and the donors are deleted. Returns the deleted
/// donor items so the caller can remove their data files.
pub fn merge_items(
    store: &mut Store,
    target: ItemId,
    donors: &[ItemId],
) -> CatalogResult<Vec<Item>> {
    let current = store.item(target)?;
    store.transaction(|store| {
        let mut removed = Vec::new();
        let mut patch = ItemPatch::default();
        for &donor in donors {
            if donor == target {
                warn!("item {} listed as its own merge donor, skipping", donor);
                continue;
            }
            let donor_item = store.item(donor)?;
            for term in store.term_ids_for_item(donor)? {
                if !store.relation_exists(target, term)? {
                    store.link(target, term)?;
                }
            }
            if current.source.is_none() && patch.source.is_none() {
                patch.source = donor_item.source.clone();
            }
            if current.description.is_none() && patch.description.is_none() {
                patch.description = donor_item.description.clone();
            }
            store.delete_item(donor)?;
            removed.push(donor_item);
        }
        if patch.source.is_some() || patch.description.is_some() {
            store.update_item(target, &patch)?;
        }
        info!("merged {} items into item {}", removed.len(), target);
        Ok(removed)
    })
}

/// Merge duplicate categories: every item related to a donor becomes
/// related to `target`, donor children are reparented under `target`,
/// primary categories pointing at a donor are remapped, and the donors
/// are deleted.
pub fn merge_categories(
    store: &mut Store,
    target: TermId,
    donors: &[TermId],
) -> CatalogResult<Vec<Term>> {
    let current = store.term(target)?;
    store.transaction(|store| {
        let mut removed = Vec::new();
        let mut description = None;
        for &donor in donors {
            if donor == target {
                warn!("category {} listed as its own merge donor, skipping", donor);
                continue;
            }
            let donor_term = store.term(donor)?;
            for item in store.item_ids_for_term(donor)? {
                if !store.relation_exists(item, target)? {
                    store.link(item, target)?;
                }
                if store.item(item)?.primary_category == Some(donor) {
                    store.set_primary_category(item, Some(target))?;
                }
            }
            for child in store.terms_in_taxonomy(&donor_term.taxonomy)? {
                if child.parent == Some(donor) && child.id != target {
                    store.update_term(
                        child.id,
                        &TermPatch {
                            parent: Some(Some(target)),
                            ..TermPatch::default()
                        },
                    )?;
                }
            }
            if current.description.is_none() && description.is_none() {
                description = donor_term.description.clone();
            }
            store.delete_term(donor)?;
            removed.push(donor_term);
        }
        if let Some(description) = description {
            store.update_term(
                target,
                &TermPatch {
                    description: Some(description),
                    ..TermPatch::default()
                },
            )?;
        }
        info!("merged {} categories into category {}", removed.len(), target);
        Ok(removed)
    })
}

/// Fold every term of the `donor` taxonomy into `target` and drop the
/// donor taxonomy definition. A donor term whose name already exists in
/// the target taxonomy is merged into it; otherwise an equivalent term
/// is created there first. Parent links between moved terms are
/// preserved. Returns the number of terms moved.
pub fn merge_taxonomies(
    store: &mut Store,
    ctx: &mut CatalogContext,
    target: &str,
    donor: &str,
) -> CatalogResult<usize> {
    let target_tax = ctx
        .resolve_taxonomy(target)
        .ok_or_else(|| CatalogError::NotFound {
            kind: EntityKind::Taxonomy,
            token: target.to_string(),
        })?
        .table_name
        .clone();
    let donor_tax = ctx
        .resolve_taxonomy(donor)
        .ok_or_else(|| CatalogError::NotFound {
            kind: EntityKind::Taxonomy,
            token: donor.to_string(),
        })?
        .table_name
        .clone();
    if target_tax == donor_tax {
        return Err(CatalogError::InvalidInput {
            input: donor.to_string(),
            reason: "cannot merge a taxonomy into itself".to_string(),
        });
    }

    let retained: Vec<Taxonomy> = ctx
        .taxonomies
        .iter()
        .filter(|t| t.table_name != donor_tax)
        .cloned()
        .collect();
    let moved = store.transaction(|store| {
        let donor_terms = store.terms_in_taxonomy(&donor_tax)?;
        // old donor id -> id of its counterpart in the target taxonomy
        let mut mapped: BTreeMap<TermId, TermId> = BTreeMap::new();
        let mut created: Vec<TermId> = Vec::new();
        for term in &donor_terms {
            let counterpart = match store
                .terms_by_name(&term.name, &target_tax)?
                .into_iter()
                .next()
            {
                Some(existing) => existing.id,
                None => {
                    let id = store.create_term(
                        &NewTerm {
                            name: term.name.clone(),
                            taxonomy: target_tax.clone(),
                            description: term.description.clone(),
                            parent: None,
                        },
                        false,
                    )?;
                    created.push(id);
                    id
                }
            };
            mapped.insert(term.id, counterpart);
        }
        // restore hierarchy among newly created terms before the donors go
        // away; terms that already existed in the target keep their parents
        for term in &donor_terms {
            let new_id = mapped[&term.id];
            if !created.contains(&new_id) {
                continue;
            }
            if let Some(parent) = term.parent.and_then(|p| mapped.get(&p).copied()) {
                if parent != new_id {
                    store.update_term(
                        new_id,
                        &TermPatch {
                            parent: Some(Some(parent)),
                            ..TermPatch::default()
                        },
                    )?;
                }
            }
        }
        for term in &donor_terms {
            merge_categories(store, mapped[&term.id], &[term.id])?;
        }
        // the donor definition goes away in the same transaction as its terms
        store.write_taxonomies(&retained)?;
        Ok(donor_terms.len())
    })?;

    ctx.taxonomies = retained;
    info!("merged taxonomy '{}' into '{}' ({} terms)", donor_tax, target_tax, moved);
    Ok(moved)
}

/// Cross-link a set of categories: every item related to any of them
/// becomes related to all of them. Tokens naming no existing category
/// are created first, along with a taxonomy definition when the taxonomy
/// part is unknown. Returns the number of links created.
pub fn sync_categories(
    store: &mut Store,
    ctx: &mut CatalogContext,
    tokens: &[String],
) -> CatalogResult<usize> {
    if tokens.is_empty() {
        return Err(CatalogError::InvalidInput {
            input: String::new(),
            reason: "no categories to synchronize".to_string(),
        });
    }
    let mut taxonomies = ctx.taxonomies.clone();
    let created = store.transaction(|store| {
        let mut terms: Vec<TermId> = Vec::new();
        for token in tokens {
            let id = match resolve_category(store, ctx, token)? {
                CategoryMatch::Found(term) => term.id,
                CategoryMatch::NotFound { taxonomy } => {
                    if !taxonomies.iter().any(|t| t.table_name == taxonomy) {
                        let noun = capitalize(&taxonomy);
                        taxonomies.push(Taxonomy {
                            plural_name: pluralize(&noun),
                            dir_name: pluralize(&noun).to_lowercase(),
                            table_name: taxonomy.clone(),
                            noun_name: noun,
                            enabled: true,
                            has_children: true,
                            is_tags: false,
                            colour: None,
                        });
                        store.write_taxonomies(&taxonomies)?;
                    }
                    let name = token.split_once(':').map(|(_, n)| n).unwrap_or(token);
                    let id = store.create_term(
                        &NewTerm {
                            name: name.to_string(),
                            taxonomy,
                            ..NewTerm::default()
                        },
                        false,
                    )?;
                    debug!("created category {} for '{}'", id, token);
                    id
                }
            };
            if !terms.contains(&id) {
                terms.push(id);
            }
        }
        // items related to any category in the set, collected before any
        // new links are made
        let mut items: Vec<ItemId> = Vec::new();
        for &term in &terms {
            for item in store.item_ids_for_term(term)? {
                if !items.contains(&item) {
                    items.push(item);
                }
            }
        }
        let mut created = 0;
        for &item in &items {
            for &term in &terms {
                if !store.relation_exists(item, term)? {
                    store.link(item, term)?;
                    created += 1;
                }
            }
        }
        debug!(
            "category sync related {} items to {} categories with {} new links",
            items.len(),
            terms.len(),
            created
        );
        Ok(created)
    })?;
    ctx.taxonomies = taxonomies;
    Ok(created)
}

/// Copy an item: same fields, same relations, same primary category.
/// The data file is not copied; that is the caller's concern.
pub fn clone_item(store: &mut Store, source: ItemId) -> CatalogResult<ItemId> {
    let original = store.item(source)?;
    store.transaction(|store| {
        let id = store.create_item(&NewItem {
            name: original.name.clone(),
            item_type: original.item_type.clone(),
            extension: original.extension.clone(),
            source: original.source.clone(),
            modified: Some(original.modified),
            created: None,
            description: original.description.clone(),
            content_hash: original.content_hash.clone(),
        })?;
        for term in store.term_ids_for_item(source)? {
            store.link(id, term)?;
        }
        if let Some(primary) = original.primary_category {
            store.set_primary_category(id, Some(primary))?;
        }
        info!("cloned item {} as {}", source, id);
        Ok(id)
    })
}

/// Recompute the content hash of every file-backed item from disk.
/// Items whose data file is missing are skipped with a warning. Returns
/// the number of items whose stored hash changed.
pub fn sync_item_hashes(store: &mut Store, ctx: &CatalogContext) -> CatalogResult<usize> {
    let data_dir = require_data_dir(ctx)?;
    let mut updated = 0;
    for item in store.items()? {
        let Some(path) = backing_file(ctx, &data_dir, &item) else {
            continue;
        };
        if !files::file_exists(&path) {
            warn!("item {} has no file at {}, skipping hash", item.id, path.display());
            continue;
        }
        let hash = files::content_hash(&path)?;
        if item.content_hash.as_deref() != Some(hash.as_str()) {
            store.update_item(
                item.id,
                &ItemPatch {
                    content_hash: Some(hash),
                    ..ItemPatch::default()
                },
            )?;
            updated += 1;
        }
    }
    info!("hash sync updated {} items", updated);
    Ok(updated)
}

/// Align each file-backed item's modification date with its file on
/// disk. Returns the number of items updated.
pub fn sync_item_dates(store: &mut Store, ctx: &CatalogContext) -> CatalogResult<usize> {
    let data_dir = require_data_dir(ctx)?;
    let mut updated = 0;
    for item in store.items()? {
        let Some(path) = backing_file(ctx, &data_dir, &item) else {
            continue;
        };
        if !files::file_exists(&path) {
            warn!("item {} has no file at {}, skipping date", item.id, path.display());
            continue;
        }
        let modified = files::file_mod_time(&path)?;
        if item.modified != modified {
            store.update_item(
                item.id,
                &ItemPatch {
                    modified: Some(modified),
                    ..ItemPatch::default()
                },
            )?;
            updated += 1;
        }
    }
    info!("date sync updated {} items", updated);
    Ok(updated)
}

/// Find items whose files hash identically and merge each group down to
/// one survivor chosen by `policy`. Hashes are refreshed from disk
/// first, so stale stored hashes cannot cause false groups.
pub fn dedupe_items(
    store: &mut Store,
    ctx: &CatalogContext,
    policy: KeepPolicy,
) -> CatalogResult<DedupeReport> {
    let mut report = DedupeReport {
        hashed: sync_item_hashes(store, ctx)?,
        removed: Vec::new(),
    };

    let mut groups: BTreeMap<String, Vec<Item>> = BTreeMap::new();
    for item in store.items()? {
        if let Some(hash) = &item.content_hash {
            groups.entry(hash.clone()).or_default().push(item);
        }
    }
    for (hash, mut group) in groups {
        if group.len() < 2 {
            continue;
        }
        group.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.0.cmp(&b.id.0)));
        let survivor = match policy {
            KeepPolicy::Oldest => group.remove(0),
            KeepPolicy::Newest => group.remove(group.len() - 1),
        };
        debug!("hash {} has {} duplicates of item {}", hash, group.len(), survivor.id);
        let donor_ids: Vec<ItemId> = group.iter().map(|i| i.id).collect();
        report
            .removed
            .extend(merge_items(store, survivor.id, &donor_ids)?);
    }
    info!("dedupe removed {} items", report.removed.len());
    Ok(report)
}

fn require_data_dir(ctx: &CatalogContext) -> CatalogResult<std::path::PathBuf> {
    ctx.options
        .data_dir
        .clone()
        .ok_or_else(|| CatalogError::InvalidInput {
            input: "default_data_dir".to_string(),
            reason: "no data directory is configured".to_string(),
        })
}

/// The path backing an item, or `None` for pure URL items.
fn backing_file(
    ctx: &CatalogContext,
    data_dir: &std::path::Path,
    item: &Item,
) -> Option<std::path::PathBuf> {
    let weblink = ctx
        .item_type(&item.item_type)
        .map(|t| t.is_weblinks())
        .unwrap_or(false);
    if weblink {
        return None;
    }
    Some(files::data_file_path(
        data_dir,
        &ctx.dir_for_type(&item.item_type),
        item.id,
        &item.extension,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (Store, CatalogContext) {
        let store = Store::open_in_memory().unwrap();
        let ctx = CatalogContext::load(&store).unwrap();
        (store, ctx)
    }

    fn new_item(name: &str) -> NewItem {
        NewItem {
            name: name.to_string(),
            item_type: "Document".to_string(),
            extension: "txt".to_string(),
            ..NewItem::default()
        }
    }

    fn new_term(name: &str, taxonomy: &str) -> NewTerm {
        NewTerm {
            name: name.to_string(),
            taxonomy: taxonomy.to_string(),
            ..NewTerm::default()
        }
    }

    fn assert_counts_consistent(store: &Store) {
        for term in store.terms().unwrap() {
            assert_eq!(
                term.item_count,
                store.live_count(term.id).unwrap(),
                "cached count for term {} drifted",
                term.id
            );
        }
    }

    #[test_log::test]
    fn test_merge_items_unions_relations_and_backfills() {
        let (mut store, _ctx) = fixture();
        let target = store.create_item(&new_item("keep")).unwrap();
        let donor = store
            .create_item(&NewItem {
                source: Some("http://donor".to_string()),
                description: Some("donated".to_string()),
                ..new_item("toss")
            })
            .unwrap();
        let shared = store.create_term(&new_term("shared", "tag"), false).unwrap();
        let only_donor = store.create_term(&new_term("only", "tag"), false).unwrap();
        store.link(target, shared).unwrap();
        store.link(donor, shared).unwrap();
        store.link(donor, only_donor).unwrap();

        let removed = merge_items(&mut store, target, &[donor]).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, donor);
        assert!(store.find_item(donor).unwrap().is_none());

        let merged = store.item(target).unwrap();
        assert_eq!(merged.source.as_deref(), Some("http://donor"));
        assert_eq!(merged.description.as_deref(), Some("donated"));
        assert_eq!(store.term_ids_for_item(target).unwrap(), vec![shared, only_donor]);
        // the shared term counted both before the merge, only one after
        assert_eq!(store.term(shared).unwrap().item_count, 1);
        assert_counts_consistent(&store);
    }

    #[test_log::test]
    fn test_merge_item_into_itself_is_a_noop() {
        let (mut store, _ctx) = fixture();
        let id = store.create_item(&new_item("solo")).unwrap();
        let removed = merge_items(&mut store, id, &[id]).unwrap();
        assert!(removed.is_empty());
        assert!(store.find_item(id).unwrap().is_some());
    }

    #[test_log::test]
    fn test_merge_categories_remaps_primary_and_children() {
        let (mut store, _ctx) = fixture();
        let target = store.create_term(&new_term("music", "tag"), false).unwrap();
        let donor = store.create_term(&new_term("musik", "tag"), false).unwrap();
        let child = store
            .create_term(
                &NewTerm {
                    parent: Some(donor),
                    ..new_term("jazz", "tag")
                },
                false,
            )
            .unwrap();
        let item = store.create_item(&new_item("album")).unwrap();
        store.link(item, donor).unwrap();
        store.set_primary_category(item, Some(donor)).unwrap();

        let removed = merge_categories(&mut store, target, &[donor]).unwrap();
        assert_eq!(removed[0].id, donor);
        assert!(store.find_term(donor).unwrap().is_none());
        assert_eq!(store.item(item).unwrap().primary_category, Some(target));
        assert_eq!(store.term(child).unwrap().parent, Some(target));
        assert_eq!(store.term(target).unwrap().item_count, 1);
        assert_counts_consistent(&store);
    }

    fn genre_taxonomy() -> Taxonomy {
        Taxonomy {
            noun_name: "Genre".to_string(),
            plural_name: "Genres".to_string(),
            dir_name: "genres".to_string(),
            table_name: "genre".to_string(),
            enabled: true,
            has_children: true,
            is_tags: false,
            colour: None,
        }
    }

    #[test_log::test]
    fn test_merge_taxonomies_moves_and_merges_terms() {
        let (mut store, mut ctx) = fixture();
        ctx.taxonomies.push(genre_taxonomy());
        store.write_taxonomies(&ctx.taxonomies).unwrap();

        // "jazz" exists on both sides, "blues" only in the donor
        let target_jazz = store.create_term(&new_term("jazz", "tag"), false).unwrap();
        let donor_jazz = store.create_term(&new_term("jazz", "genre"), false).unwrap();
        let donor_blues = store.create_term(&new_term("blues", "genre"), false).unwrap();
        let item = store.create_item(&new_item("record")).unwrap();
        store.link(item, donor_jazz).unwrap();
        store.link(item, donor_blues).unwrap();

        let moved = merge_taxonomies(&mut store, &mut ctx, "tag", "genre").unwrap();
        assert_eq!(moved, 2);
        assert!(store.terms_in_taxonomy("genre").unwrap().is_empty());
        assert!(ctx.taxonomy("genre").is_none());
        assert!(store.relation_exists(item, target_jazz).unwrap());
        let blues = store.terms_by_name("blues", "tag").unwrap();
        assert_eq!(blues.len(), 1);
        assert!(store.relation_exists(item, blues[0].id).unwrap());
        assert_counts_consistent(&store);
    }

    #[test_log::test]
    fn test_merge_taxonomy_into_itself_fails() {
        let (mut store, mut ctx) = fixture();
        assert!(matches!(
            merge_taxonomies(&mut store, &mut ctx, "tag", "Tags"),
            Err(CatalogError::InvalidInput { .. })
        ));
    }

    #[test_log::test]
    fn test_merge_taxonomies_rolls_back_as_one_unit() {
        let (mut store, mut ctx) = fixture();
        ctx.taxonomies.push(genre_taxonomy());
        store.write_taxonomies(&ctx.taxonomies).unwrap();
        store.create_term(&new_term("blues", "genre"), false).unwrap();

        store.begin_batch().unwrap();
        merge_taxonomies(&mut store, &mut ctx, "tag", "genre").unwrap();
        store.rollback_batch().unwrap();

        // the term move and the definition removal revert together
        assert_eq!(store.terms_in_taxonomy("genre").unwrap().len(), 1);
        assert!(store
            .load_taxonomies()
            .unwrap()
            .iter()
            .any(|t| t.table_name == "genre"));
    }

    #[test_log::test]
    fn test_sync_categories_cross_links_the_item_union() {
        let (mut store, mut ctx) = fixture();
        let a = store.create_item(&new_item("a")).unwrap();
        let b = store.create_item(&new_item("b")).unwrap();
        let c = store.create_item(&new_item("c")).unwrap();
        let x = store.create_term(&new_term("x", "tag"), false).unwrap();
        let y = store.create_term(&new_term("y", "tag"), false).unwrap();
        let outside = store.create_term(&new_term("outside", "tag"), false).unwrap();
        store.link(a, x).unwrap();
        store.link(b, x).unwrap();
        store.link(c, y).unwrap();
        store.link(c, outside).unwrap();

        // union of x and y holders = {a, b, c}; missing links are a-y,
        // b-y and c-x
        let tokens = vec!["tag:x".to_string(), "tag:y".to_string()];
        assert_eq!(sync_categories(&mut store, &mut ctx, &tokens).unwrap(), 3);
        for item in [a, b, c] {
            assert!(store.relation_exists(item, x).unwrap());
            assert!(store.relation_exists(item, y).unwrap());
        }
        // categories outside the set are untouched
        assert_eq!(store.term(outside).unwrap().item_count, 1);
        // a second sync creates nothing
        assert_eq!(sync_categories(&mut store, &mut ctx, &tokens).unwrap(), 0);
        assert_counts_consistent(&store);
    }

    #[test_log::test]
    fn test_sync_categories_creates_missing_categories() {
        let (mut store, mut ctx) = fixture();
        let item = store.create_item(&new_item("doc")).unwrap();
        let x = store.create_term(&new_term("x", "tag"), false).unwrap();
        store.link(item, x).unwrap();

        let tokens = vec!["x".to_string(), "genre:jazz".to_string()];
        assert_eq!(sync_categories(&mut store, &mut ctx, &tokens).unwrap(), 1);
        let jazz = store.terms_by_name("jazz", "genre").unwrap();
        assert_eq!(jazz.len(), 1);
        assert!(store.relation_exists(item, jazz[0].id).unwrap());
        // the unknown taxonomy part got a definition
        assert!(ctx.taxonomy("genre").is_some());
        assert!(store
            .load_taxonomies()
            .unwrap()
            .iter()
            .any(|t| t.table_name == "genre"));
        assert_counts_consistent(&store);

        assert!(matches!(
            sync_categories(&mut store, &mut ctx, &[]),
            Err(CatalogError::InvalidInput { .. })
        ));
    }

    #[test_log::test]
    fn test_clone_item_copies_relations_and_primary() {
        let (mut store, _ctx) = fixture();
        let source = store
            .create_item(&NewItem {
                description: Some("original".to_string()),
                ..new_item("doc")
            })
            .unwrap();
        let term = store.create_term(&new_term("work", "tag"), false).unwrap();
        store.link(source, term).unwrap();
        store.set_primary_category(source, Some(term)).unwrap();

        let copy = clone_item(&mut store, source).unwrap();
        assert_ne!(copy, source);
        let cloned = store.item(copy).unwrap();
        assert_eq!(cloned.name, "doc");
        assert_eq!(cloned.description.as_deref(), Some("original"));
        assert_eq!(cloned.primary_category, Some(term));
        assert_eq!(store.term(term).unwrap().item_count, 2);
        assert_counts_consistent(&store);
    }

    fn file_fixture() -> (Store, CatalogContext, TempDir) {
        let (store, mut ctx) = fixture();
        let dir = TempDir::new().unwrap();
        ctx.options.data_dir = Some(dir.path().to_path_buf());
        std::fs::create_dir_all(dir.path().join("documents")).unwrap();
        (store, ctx, dir)
    }

    fn write_data_file(dir: &TempDir, id: ItemId, contents: &[u8]) {
        std::fs::write(dir.path().join(format!("documents/{id}.txt")), contents).unwrap();
    }

    #[test_log::test]
    fn test_sync_item_hashes_skips_missing_files() {
        let (mut store, ctx, dir) = file_fixture();
        let hashed = store.create_item(&new_item("present")).unwrap();
        let _ghost = store.create_item(&new_item("ghost")).unwrap();
        write_data_file(&dir, hashed, b"abc");

        assert_eq!(sync_item_hashes(&mut store, &ctx).unwrap(), 1);
        assert_eq!(
            store.item(hashed).unwrap().content_hash.as_deref(),
            Some("900150983cd24fb0d6963f7d28e17f72")
        );
        // second run changes nothing
        assert_eq!(sync_item_hashes(&mut store, &ctx).unwrap(), 0);
    }

    #[test_log::test]
    fn test_sync_item_dates_follows_the_file() {
        let (mut store, ctx, dir) = file_fixture();
        let id = store.create_item(&new_item("doc")).unwrap();
        write_data_file(&dir, id, b"abc");

        let updated = sync_item_dates(&mut store, &ctx).unwrap();
        assert!(updated <= 1);
        let expected = files::file_mod_time(&dir.path().join(format!("documents/{id}.txt"))).unwrap();
        assert_eq!(store.item(id).unwrap().modified, expected);
    }

    #[test_log::test]
    fn test_dedupe_keeps_oldest_by_default() {
        let (mut store, ctx, dir) = file_fixture();
        let first = store.create_item(&new_item("first")).unwrap();
        let second = store.create_item(&new_item("second")).unwrap();
        let unique = store.create_item(&new_item("unique")).unwrap();
        write_data_file(&dir, first, b"same bytes");
        write_data_file(&dir, second, b"same bytes");
        write_data_file(&dir, unique, b"other bytes");
        let term = store.create_term(&new_term("keepers", "tag"), false).unwrap();
        store.link(second, term).unwrap();

        let report = dedupe_items(&mut store, &ctx, KeepPolicy::Oldest).unwrap();
        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.removed[0].id, second);
        assert!(store.find_item(first).unwrap().is_some());
        assert!(store.find_item(unique).unwrap().is_some());
        // the survivor inherits the donor's category
        assert!(store.relation_exists(first, term).unwrap());
        assert_counts_consistent(&store);
    }

    #[test_log::test]
    fn test_dedupe_keep_newest() {
        let (mut store, ctx, dir) = file_fixture();
        let first = store.create_item(&new_item("first")).unwrap();
        let second = store.create_item(&new_item("second")).unwrap();
        write_data_file(&dir, first, b"same bytes");
        write_data_file(&dir, second, b"same bytes");

        let report = dedupe_items(&mut store, &ctx, KeepPolicy::Newest).unwrap();
        assert_eq!(report.removed[0].id, first);
        assert!(store.find_item(second).unwrap().is_some());
    }
}
