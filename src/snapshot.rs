//! Portable catalog snapshots.
//!
//! A snapshot is a self-contained JSON document carrying the options,
//! taxonomy and item-type definitions, every category and every item,
//! with all cross-references expressed by name rather than by row id.
//! That makes snapshots mergeable: importing into a non-empty catalog
//! resolves categories by name and creates only what is missing.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::CatalogContext;
use crate::error::{CatalogError, CatalogResult};
use crate::model::{
    ItemId, ItemPatch, ItemType, NewItem, NewTerm, Taxonomy, TermId, TermPatch, TIME_FORMAT,
};
use crate::store::Store;

/// The complete exported form of a catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub information: SnapshotInfo,
    pub options: BTreeMap<String, String>,
    pub item_types: Vec<ItemType>,
    pub taxonomies: Vec<Taxonomy>,
    pub categories: Vec<SnapshotTerm>,
    pub items: Vec<SnapshotItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub name: String,
    pub version: String,
    pub created: String,
}

/// One exported category. `parent` names a category in the same taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotTerm {
    pub name: String,
    pub taxonomy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// One exported item. Categories are grouped per taxonomy key; the
/// primary category is a `"taxonomy:name"` token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotItem {
    pub name: String,
    pub item_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub extension: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub modified: String,
    pub created: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub categories: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_category: Option<String>,
}

/// Counters returned by [`import_snapshot`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub items_created: usize,
    pub items_updated: usize,
    pub categories_created: usize,
}

/// Export the catalog, or just the items in `id_filter`, as a snapshot.
/// Category definitions are always exported in full so a filtered
/// snapshot still imports cleanly.
pub fn export_snapshot(
    store: &Store,
    ctx: &CatalogContext,
    id_filter: Option<&[ItemId]>,
) -> CatalogResult<Snapshot> {
    let terms = store.terms()?;
    let term_by_id: BTreeMap<TermId, usize> =
        terms.iter().enumerate().map(|(i, t)| (t.id, i)).collect();

    let categories = terms
        .iter()
        .map(|term| SnapshotTerm {
            name: term.name.clone(),
            taxonomy: term.taxonomy.clone(),
            description: term.description.clone(),
            parent: term
                .parent
                .and_then(|p| term_by_id.get(&p))
                .map(|&i| terms[i].name.clone()),
        })
        .collect();

    let mut items = Vec::new();
    for item in store.items()? {
        if let Some(wanted) = id_filter {
            if !wanted.contains(&item.id) {
                continue;
            }
        }
        let mut categories: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for term_id in store.term_ids_for_item(item.id)? {
            if let Some(&i) = term_by_id.get(&term_id) {
                categories
                    .entry(terms[i].taxonomy.clone())
                    .or_default()
                    .push(terms[i].name.clone());
            }
        }
        let primary_category = item
            .primary_category
            .and_then(|p| term_by_id.get(&p))
            .map(|&i| format!("{}:{}", terms[i].taxonomy, terms[i].name));
        items.push(SnapshotItem {
            name: item.name,
            item_type: item.item_type,
            extension: item.extension,
            source: item.source,
            modified: item.modified.format(TIME_FORMAT).to_string(),
            created: item.created.format(TIME_FORMAT).to_string(),
            description: item.description,
            content_hash: item.content_hash,
            categories,
            primary_category,
        });
    }

    Ok(Snapshot {
        information: SnapshotInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created: Local::now().naive_local().format(TIME_FORMAT).to_string(),
        },
        options: store.options()?,
        item_types: ctx.item_types.clone(),
        taxonomies: ctx.taxonomies.clone(),
        categories,
        items,
    })
}

/// Import a snapshot into the catalog, all within one transaction.
///
/// Taxonomy and item-type definitions absent from the catalog are added;
/// present ones are left alone, as are options that already have a value.
/// Categories are matched by (name, taxonomy) and created when missing.
/// With `update_on_duplicate_hash`, an incoming item whose content hash
/// matches an existing item updates that item in place instead of
/// inserting a duplicate.
pub fn import_snapshot(
    store: &mut Store,
    ctx: &mut CatalogContext,
    snapshot: &Snapshot,
    update_on_duplicate_hash: bool,
) -> CatalogResult<ImportReport> {
    let mut taxonomies = ctx.taxonomies.clone();
    for taxonomy in &snapshot.taxonomies {
        if !taxonomies.iter().any(|t| t.table_name == taxonomy.table_name) {
            debug!("importing taxonomy definition '{}'", taxonomy.table_name);
            taxonomies.push(taxonomy.clone());
        }
    }
    let mut item_types = ctx.item_types.clone();
    for item_type in &snapshot.item_types {
        if !item_types.iter().any(|t| t.noun_name == item_type.noun_name) {
            debug!("importing item type definition '{}'", item_type.noun_name);
            item_types.push(item_type.clone());
        }
    }

    let report = store.transaction(|store| {
        let mut report = ImportReport::default();
        store.write_taxonomies(&taxonomies)?;
        store.write_item_types(&item_types)?;
        for (key, value) in &snapshot.options {
            if store.option(key)?.is_none() {
                store.set_option(key, value)?;
            }
        }

        // first pass creates missing categories, second restores parents
        let mut ids: BTreeMap<(String, String), TermId> = BTreeMap::new();
        for category in &snapshot.categories {
            let key = (category.taxonomy.clone(), category.name.clone());
            let id = match store
                .terms_by_name(&category.name, &category.taxonomy)?
                .into_iter()
                .next()
            {
                Some(existing) => existing.id,
                None => {
                    report.categories_created += 1;
                    store.create_term(
                        &NewTerm {
                            name: category.name.clone(),
                            taxonomy: category.taxonomy.clone(),
                            description: category.description.clone(),
                            parent: None,
                        },
                        false,
                    )?
                }
            };
            ids.insert(key, id);
        }
        for category in &snapshot.categories {
            let Some(parent_name) = &category.parent else {
                continue;
            };
            let id = ids[&(category.taxonomy.clone(), category.name.clone())];
            let parent = ids
                .get(&(category.taxonomy.clone(), parent_name.clone()))
                .copied();
            match parent {
                Some(parent) if store.term(id)?.parent.is_none() => {
                    store.update_term(
                        id,
                        &TermPatch {
                            parent: Some(Some(parent)),
                            ..TermPatch::default()
                        },
                    )?;
                }
                Some(_) => {}
                None => warn!(
                    "category '{}:{}' names unknown parent '{}'",
                    category.taxonomy, category.name, parent_name
                ),
            }
        }

        for entry in &snapshot.items {
            let modified = parse_time(&entry.modified)?;
            let created = parse_time(&entry.created)?;

            let duplicate = match (&entry.content_hash, update_on_duplicate_hash) {
                (Some(hash), true) => store.items_by_hash(hash)?.into_iter().next(),
                _ => None,
            };
            let id = match duplicate {
                Some(existing) => {
                    debug!(
                        "item '{}' matches existing item {} by hash, updating",
                        entry.name, existing.id
                    );
                    store.update_item(
                        existing.id,
                        &ItemPatch {
                            name: Some(entry.name.clone()),
                            source: entry.source.clone(),
                            modified: Some(modified),
                            description: entry.description.clone(),
                            ..ItemPatch::default()
                        },
                    )?;
                    report.items_updated += 1;
                    existing.id
                }
                None => {
                    report.items_created += 1;
                    store.create_item(&NewItem {
                        name: entry.name.clone(),
                        item_type: entry.item_type.clone(),
                        extension: entry.extension.clone(),
                        source: entry.source.clone(),
                        modified: Some(modified),
                        created: Some(created),
                        description: entry.description.clone(),
                        content_hash: entry.content_hash.clone(),
                    })?
                }
            };

            for (taxonomy, names) in &entry.categories {
                for name in names {
                    let key = (taxonomy.clone(), name.clone());
                    let term = match ids.get(&key) {
                        Some(&id) => id,
                        None => {
                            // a category the snapshot's category list missed
                            report.categories_created += 1;
                            let id = store.create_term(
                                &NewTerm {
                                    name: name.clone(),
                                    taxonomy: taxonomy.clone(),
                                    ..NewTerm::default()
                                },
                                false,
                            )?;
                            ids.insert(key, id);
                            id
                        }
                    };
                    if !store.relation_exists(id, term)? {
                        store.link(id, term)?;
                    }
                }
            }

            if let Some(token) = &entry.primary_category {
                match token.split_once(':') {
                    Some((taxonomy, name)) => {
                        match ids.get(&(taxonomy.to_string(), name.to_string())) {
                            Some(&term) => store.set_primary_category(id, Some(term))?,
                            None => warn!(
                                "item '{}' names unknown primary category '{}'",
                                entry.name, token
                            ),
                        }
                    }
                    None => warn!(
                        "item '{}' has malformed primary category token '{}'",
                        entry.name, token
                    ),
                }
            }
        }
        Ok(report)
    })?;

    ctx.taxonomies = taxonomies;
    ctx.item_types = item_types;
    ctx.options = crate::context::Options::from_map(store.options()?)?;
    info!(
        "import complete: {} items created, {} updated, {} categories created",
        report.items_created, report.items_updated, report.categories_created
    );
    Ok(report)
}

/// Write a snapshot as pretty-printed JSON.
pub fn write_snapshot(snapshot: &Snapshot, path: &Path) -> CatalogResult<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), snapshot)?;
    Ok(())
}

/// Read a snapshot back from JSON.
pub fn read_snapshot(path: &Path) -> CatalogResult<Snapshot> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn parse_time(value: &str) -> CatalogResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIME_FORMAT).map_err(|_| CatalogError::InvalidInput {
        input: value.to_string(),
        reason: "not a valid timestamp".to_string(),
    })
}
