use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::{subscriber::set_global_default, warn, Level};
use tracing_subscriber::EnvFilter;

use filecat::context::{capitalize, pluralize, CatalogContext};
use filecat::files;
use filecat::merge::{self, KeepPolicy};
use filecat::model::{
    Item, ItemColumn, ItemPatch, ItemSortKey, NewItem, SortOrder, Taxonomy, TermColumn, TermId,
    TermPatch, TermSortKey, TIME_FORMAT,
};
use filecat::query::{self, ItemQuery, Page, TermQuery};
use filecat::resolver::{self, CategoryMatch};
use filecat::snapshot;
use filecat::Store;

fn init_tracing(verbosity: u8) {
    // Map -q/-v to tracing levels; default WARN
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr) // logs to stderr
        .with_target(false)
        .with_level(true)
        .compact()
        .finish();

    // Ignore error if already set in tests or env
    let _ = set_global_default(subscriber);
}

fn main() {
    let opts = Opts::parse();
    init_tracing(opts.verbose.saturating_sub(opts.quiet));
    if let Err(e) = run(opts) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(opts: Opts) -> anyhow::Result<()> {
    if let Command::Init { path, autoload, data_dir, shortcuts_dir } = &opts.command {
        return cmd_init(path, *autoload, data_dir.as_deref(), shortcuts_dir.as_deref());
    }

    let catalog = opts
        .catalog
        .or_else(|| load_config().autoload_catalog)
        .context("no catalog given; pass --catalog or run `fcat init --autoload`")?;
    let mut store = Store::open(&catalog)?;
    let mut ctx = CatalogContext::load(&store)?;

    match opts.command {
        Command::Init { .. } => unreachable!("handled above"),
        Command::Add(args) => cmd_add(&mut store, &mut ctx, args)?,
        Command::Items(args) => cmd_items(&store, &ctx, args)?,
        Command::Categories(args) => cmd_categories(&store, &ctx, args)?,
        Command::Update(args) => cmd_update(&mut store, args)?,
        Command::UpdateCategory(args) => cmd_update_category(&mut store, &ctx, args)?,
        Command::Delete { items, keep_files } => {
            for token in items {
                let item = resolver::resolve_item(&store, &token)?;
                store.delete_item(item.id)?;
                if !keep_files {
                    remove_data_file(&ctx, &item);
                }
                println!("deleted item {} ({})", item.id, item.name);
            }
        }
        Command::DeleteCategory { categories } => {
            for token in categories {
                let term = resolver::resolve_category_strict(&store, &ctx, &token)?;
                store.delete_term(term.id)?;
                println!("deleted category {} ({}:{})", term.id, term.taxonomy, term.name);
            }
        }
        Command::Link { item, categories } => {
            let item = resolver::resolve_item(&store, &item)?;
            for token in categories {
                let term = ensure_category(&mut store, &mut ctx, &token)?;
                if store.link(item.id, term)? {
                    println!("linked item {} to category {}", item.id, term);
                }
            }
        }
        Command::Unlink { item, categories } => {
            let item = resolver::resolve_item(&store, &item)?;
            for token in categories {
                let term = resolver::resolve_category_strict(&store, &ctx, &token)?;
                if store.unlink(item.id, term.id)? {
                    println!("unlinked item {} from category {}", item.id, term.id);
                }
            }
        }
        Command::SetPrimary { item, category, clear } => {
            let item = resolver::resolve_item(&store, &item)?;
            if clear {
                store.set_primary_category(item.id, None)?;
                println!("cleared primary category of item {}", item.id);
            } else {
                let token = category.context("give a category or pass --clear")?;
                let term = resolver::resolve_category_strict(&store, &ctx, &token)?;
                store.set_primary_category(item.id, Some(term.id))?;
                println!("item {} primary category set to {}", item.id, term.id);
            }
        }
        Command::Clone { item } => {
            let original = resolver::resolve_item(&store, &item)?;
            let copy = merge::clone_item(&mut store, original.id)?;
            if let (Some(src), Some(data_dir)) =
                (data_file_for(&ctx, &original), ctx.options.data_dir.as_ref())
            {
                if files::file_exists(&src) {
                    let dest = files::data_file_path(
                        data_dir,
                        &ctx.dir_for_type(&original.item_type),
                        copy,
                        &original.extension,
                    );
                    std::fs::copy(&src, &dest)
                        .with_context(|| format!("copying {} to {}", src.display(), dest.display()))?;
                }
            }
            println!("cloned item {} as {}", original.id, copy);
        }
        Command::MergeItems { target, donors, keep_files } => {
            let target = resolver::resolve_item(&store, &target)?.id;
            let donors = donors
                .iter()
                .map(|t| resolver::resolve_item(&store, t).map(|i| i.id))
                .collect::<Result<Vec<_>, _>>()?;
            let removed = merge::merge_items(&mut store, target, &donors)?;
            if !keep_files {
                for item in &removed {
                    remove_data_file(&ctx, item);
                }
            }
            println!("merged {} items into {}", removed.len(), target);
        }
        Command::MergeCategories { target, donors } => {
            let target = resolver::resolve_category_strict(&store, &ctx, &target)?.id;
            let donors = donors
                .iter()
                .map(|t| resolver::resolve_category_strict(&store, &ctx, t).map(|c| c.id))
                .collect::<Result<Vec<_>, _>>()?;
            let removed = merge::merge_categories(&mut store, target, &donors)?;
            println!("merged {} categories into {}", removed.len(), target);
        }
        Command::MergeTaxonomies { target, donor } => {
            let moved = merge::merge_taxonomies(&mut store, &mut ctx, &target, &donor)?;
            println!("moved {moved} categories out of '{donor}'");
        }
        Command::SyncCategories { categories } => {
            let created = merge::sync_categories(&mut store, &mut ctx, &categories)?;
            println!("created {created} links");
        }
        Command::Dedupe { keep, keep_files } => {
            let report = merge::dedupe_items(&mut store, &ctx, keep.into())?;
            if !keep_files {
                for item in &report.removed {
                    remove_data_file(&ctx, item);
                }
            }
            println!(
                "rehashed {} items, removed {} duplicates",
                report.hashed,
                report.removed.len()
            );
        }
        Command::SyncHashes => {
            let updated = merge::sync_item_hashes(&mut store, &ctx)?;
            println!("updated hashes on {updated} items");
        }
        Command::SyncDates => {
            let updated = merge::sync_item_dates(&mut store, &ctx)?;
            println!("updated dates on {updated} items");
        }
        Command::Shortcuts => {
            let report = files::create_shortcuts(&store, &ctx)?;
            println!("{} shortcuts created, {} skipped", report.created, report.skipped);
        }
        Command::Verify => {
            let report = files::verify_files(&store, &ctx)?;
            for item in &report.missing {
                println!("missing\t{}\t{}", item.id, item.name);
            }
            for path in &report.orphans {
                println!("orphan\t{}", path.display());
            }
            println!(
                "{} items missing files, {} orphan files",
                report.missing.len(),
                report.orphans.len()
            );
        }
        Command::RebuildCounts => {
            store.rebuild_counts()?;
            println!("relation counts rebuilt");
        }
        Command::Export { output, items } => {
            let filter = if items.is_empty() {
                None
            } else {
                Some(
                    items
                        .iter()
                        .map(|t| resolver::resolve_item(&store, t).map(|i| i.id))
                        .collect::<Result<Vec<_>, _>>()?,
                )
            };
            let snap = snapshot::export_snapshot(&store, &ctx, filter.as_deref())?;
            snapshot::write_snapshot(&snap, &output)?;
            println!(
                "exported {} items and {} categories to {}",
                snap.items.len(),
                snap.categories.len(),
                output.display()
            );
        }
        Command::Import { input, update_on_hash } => {
            let snap = snapshot::read_snapshot(&input)?;
            let report = snapshot::import_snapshot(&mut store, &mut ctx, &snap, update_on_hash)?;
            println!(
                "{} items created, {} updated, {} categories created",
                report.items_created, report.items_updated, report.categories_created
            );
        }
        Command::Option { action } => match action {
            OptionCmd::List => {
                for (key, value) in store.options()? {
                    println!("{key} = {value}");
                }
            }
            OptionCmd::Get { key } => match store.option(&key)? {
                Some(value) => println!("{value}"),
                None => bail!("option '{key}' is not set"),
            },
            OptionCmd::Set { key, value } => {
                store.set_option(&key, &value)?;
                println!("{key} = {value}");
            }
        },
    }
    Ok(())
}

fn cmd_init(
    path: &Path,
    autoload: bool,
    data_dir: Option<&Path>,
    shortcuts_dir: Option<&Path>,
) -> anyhow::Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    let mut store = Store::open(path)?;
    if let Some(dir) = data_dir {
        store.set_option("default_data_dir", &dir.display().to_string())?;
        std::fs::create_dir_all(dir)?;
    }
    if let Some(dir) = shortcuts_dir {
        store.set_option("default_shortcuts_dir", &dir.display().to_string())?;
    }
    if autoload {
        let mut config = load_config();
        config.autoload_catalog = Some(path.canonicalize()?);
        save_config(&config)?;
    }
    println!("created catalog at {}", path.display());
    Ok(())
}

fn cmd_add(store: &mut Store, ctx: &mut CatalogContext, args: AddArgs) -> anyhow::Result<()> {
    let is_url = ["http://", "https://", "ftp://"]
        .iter()
        .any(|scheme| args.target.starts_with(scheme));

    let modified = args.modified.as_deref().map(parse_timestamp).transpose()?;
    let id = if is_url {
        let noun = ctx
            .item_types
            .iter()
            .find(|t| t.is_weblinks())
            .map(|t| t.noun_name.clone())
            .unwrap_or_else(|| "Weblink".to_string());
        store.create_item(&NewItem {
            name: args.name.clone().unwrap_or_else(|| args.target.clone()),
            item_type: args.item_type.clone().unwrap_or(noun),
            extension: String::new(),
            source: Some(args.target.clone()),
            modified,
            description: args.description.clone(),
            ..NewItem::default()
        })?
    } else {
        let path = PathBuf::from(&args.target);
        if !files::file_exists(&path) {
            bail!("{} is not a file", path.display());
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        let item_type = match &args.item_type {
            Some(noun) => noun.clone(),
            None => match ctx.type_for_extension(&ext) {
                Some(t) => t.noun_name.clone(),
                None => {
                    let noun = ctx.spawn_type_for_extension(&ext);
                    store.write_item_types(&ctx.item_types)?;
                    noun
                }
            },
        };
        let name = match &args.name {
            Some(name) => name.clone(),
            None => path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.to_string())
                .context("file name is not valid UTF-8")?,
        };
        let id = store.create_item(&NewItem {
            name,
            item_type: item_type.clone(),
            extension: ext.clone(),
            source: args.source.clone(),
            modified: modified.or_else(|| files::file_mod_time(&path).ok()),
            description: args.description.clone(),
            ..NewItem::default()
        })?;
        match ctx.options.data_dir.as_ref() {
            Some(data_dir) => {
                let dest = files::data_file_path(data_dir, &ctx.dir_for_type(&item_type), id, &ext);
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(&path, &dest)
                    .with_context(|| format!("copying {} to {}", path.display(), dest.display()))?;
                let hash = files::content_hash(&dest)?;
                store.update_item(
                    id,
                    &ItemPatch {
                        content_hash: Some(hash),
                        ..ItemPatch::default()
                    },
                )?;
            }
            None => warn!("no data directory configured, file not copied into the catalog"),
        }
        id
    };

    for token in &args.categories {
        let term = ensure_category(store, ctx, token)?;
        store.link(id, term)?;
    }
    if let Some(token) = &args.primary {
        let term = ensure_category(store, ctx, token)?;
        store.link(id, term)?;
        store.set_primary_category(id, Some(term))?;
    }
    println!("added item {id}");
    Ok(())
}

fn cmd_items(store: &Store, ctx: &CatalogContext, args: ItemsArgs) -> anyhow::Result<()> {
    let q = ItemQuery {
        keywords: args.keywords,
        name_equals: args.name_equals,
        source_equals: args.source_equals,
        description_equals: args.description_equals,
        name_contains: args.name_contains,
        name_not_contains: args.name_not_contains,
        with_all_categories: args.with,
        with_any_categories: args.any,
        without_categories: args.without,
        in_taxonomies: args.taxonomy,
        not_in_taxonomies: args.not_taxonomy,
        id_min: args.id_min,
        id_max: args.id_max,
        modified_after: args.modified_after.map(|s| parse_timestamp(&s)).transpose()?,
        modified_before: args.modified_before.map(|s| parse_timestamp(&s)).transpose()?,
        created_after: args.created_after.map(|s| parse_timestamp(&s)).transpose()?,
        created_before: args.created_before.map(|s| parse_timestamp(&s)).transpose()?,
        types: args.item_type,
        exclude_types: args.not_type,
        extensions: args.ext,
        exclude_extensions: args.not_ext,
        primary_categories: args.primary,
        exclude_primary_categories: args.not_primary,
        source_null: args.missing_source.then_some(true),
        description_null: args.missing_description.then_some(true),
        hash_null: args.missing_hash.then_some(true),
        duplicates_on: args.duplicates.map(ItemColumn::from),
        byte_duplicates: args.byte_duplicates,
        min_size: args.min_size.map(|s| files::parse_bytes(&s)).transpose()?,
        max_size: args.max_size.map(|s| files::parse_bytes(&s)).transpose()?,
        with_stats: args.stats,
        sort: args.sort.map(ItemSortKey::from).unwrap_or_default(),
        order: if args.desc { SortOrder::Descending } else { SortOrder::Ascending },
        page: page_from(&args.paging),
        ..ItemQuery::default()
    };
    let hits = query::search_items(store, ctx, &q)?;
    for hit in &hits {
        let mut line = format!("{}\t{}\t{}", hit.item.id, hit.item.item_type, hit.item.name);
        if q.with_stats || q.sort == ItemSortKey::Size {
            match hit.size {
                Some(size) => line.push_str(&format!("\t{}", files::format_bytes(size))),
                None => line.push_str("\t-"),
            }
        }
        println!("{line}");
    }
    println!("{} items", hits.len());
    Ok(())
}

fn cmd_categories(store: &Store, ctx: &CatalogContext, args: CategoriesArgs) -> anyhow::Result<()> {
    let q = TermQuery {
        keywords: args.keywords,
        taxonomies: args.taxonomy,
        exclude_taxonomies: args.not_taxonomy,
        min_count: args.min_count,
        max_count: args.max_count,
        with_items: args
            .of_item
            .iter()
            .map(|t| resolver::resolve_item(store, t).map(|i| i.id))
            .collect::<Result<Vec<_>, _>>()?,
        duplicates_on: args.duplicates.then_some(TermColumn::Name),
        sort: args.sort.map(TermSortKey::from).unwrap_or_default(),
        order: if args.desc { SortOrder::Descending } else { SortOrder::Ascending },
        page: page_from(&args.paging),
        ..TermQuery::default()
    };
    let terms = query::search_terms(store, ctx, &q)?;
    for term in &terms {
        println!("{}\t{}\t{}\t{}", term.id, term.taxonomy, term.name, term.item_count);
    }
    println!("{} categories", terms.len());
    Ok(())
}

fn cmd_update(store: &mut Store, args: UpdateArgs) -> anyhow::Result<()> {
    let item = resolver::resolve_item(store, &args.item)?;
    let patch = ItemPatch {
        name: args.name,
        item_type: args.item_type,
        extension: args.ext,
        source: args.source,
        modified: args.modified.map(|s| parse_timestamp(&s)).transpose()?,
        description: args.description,
        content_hash: None,
    };
    store.update_item(item.id, &patch)?;
    println!("updated item {}", item.id);
    Ok(())
}

fn cmd_update_category(
    store: &mut Store,
    ctx: &CatalogContext,
    args: UpdateCategoryArgs,
) -> anyhow::Result<()> {
    let term = resolver::resolve_category_strict(store, ctx, &args.category)?;
    let parent = match args.parent.as_deref() {
        None => None,
        Some("none") => Some(None),
        Some(token) => Some(Some(resolver::resolve_category_strict(store, ctx, token)?.id)),
    };
    store.update_term(
        term.id,
        &TermPatch {
            name: args.name,
            description: args.description,
            parent,
        },
    )?;
    println!("updated category {}", term.id);
    Ok(())
}

/// Resolve a category token, creating the category (and, for an unknown
/// taxonomy part, the taxonomy definition) when it does not exist yet.
fn ensure_category(
    store: &mut Store,
    ctx: &mut CatalogContext,
    token: &str,
) -> anyhow::Result<TermId> {
    match resolver::resolve_category(store, ctx, token)? {
        CategoryMatch::Found(term) => Ok(term.id),
        CategoryMatch::NotFound { taxonomy } => {
            if ctx.taxonomy(&taxonomy).is_none() {
                let noun = capitalize(&taxonomy);
                ctx.taxonomies.push(Taxonomy {
                    plural_name: pluralize(&noun),
                    dir_name: pluralize(&noun).to_lowercase(),
                    table_name: taxonomy.clone(),
                    noun_name: noun,
                    enabled: true,
                    has_children: true,
                    is_tags: false,
                    colour: None,
                });
                store.write_taxonomies(&ctx.taxonomies)?;
            }
            let name = token.split_once(':').map(|(_, n)| n).unwrap_or(token);
            let id = store.create_term(
                &filecat::model::NewTerm {
                    name: name.to_string(),
                    taxonomy,
                    ..Default::default()
                },
                false,
            )?;
            println!("created category {id} ({token})");
            Ok(id)
        }
    }
}

fn parse_timestamp(value: &str) -> anyhow::Result<NaiveDateTime> {
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, TIME_FORMAT) {
        return Ok(ts);
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("'{value}' is not a date or timestamp"))?;
    date.and_hms_opt(0, 0, 0)
        .context("date has no midnight (should not happen)")
}

fn data_file_for(ctx: &CatalogContext, item: &Item) -> Option<PathBuf> {
    let weblink = ctx
        .item_type(&item.item_type)
        .map(|t| t.is_weblinks())
        .unwrap_or(false);
    if weblink {
        return None;
    }
    let data_dir = ctx.options.data_dir.as_ref()?;
    Some(files::data_file_path(
        data_dir,
        &ctx.dir_for_type(&item.item_type),
        item.id,
        &item.extension,
    ))
}

fn remove_data_file(ctx: &CatalogContext, item: &Item) {
    if let Some(path) = data_file_for(ctx, item) {
        if files::file_exists(&path) {
            if let Err(err) = std::fs::remove_file(&path) {
                warn!("could not remove {}: {err}", path.display());
            }
        }
    }
}

// --- persistent CLI configuration ---

#[derive(Debug, Default, Serialize, Deserialize)]
struct Config {
    autoload_catalog: Option<PathBuf>,
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("filecat").join("config.json"))
}

fn load_config() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => serde_json::from_str(&text).unwrap_or_else(|err| {
            warn!("ignoring malformed config at {}: {err}", path.display());
            Config::default()
        }),
        Err(_) => Config::default(),
    }
}

fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_path().context("no config directory on this platform")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, serde_json::to_string_pretty(config)?)?;
    Ok(())
}

// --- argument surface ---

#[derive(Parser)]
#[command(version, about = "file catalog CLI")]
pub struct Opts {
    /// Increase verbosity (-v, -vv). Default WARN.
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Decrease verbosity (-q). Each -q reduces level by one step.
    #[arg(short = 'q', action = clap::ArgAction::Count, global = true)]
    pub quiet: u8,
    /// Catalog database to operate on (defaults to the autoload catalog)
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new catalog
    Init {
        path: PathBuf,
        /// Open this catalog by default from now on
        #[arg(long)]
        autoload: bool,
        /// Directory the catalog copies item files into
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Directory shortcut trees are generated under
        #[arg(long)]
        shortcuts_dir: Option<PathBuf>,
    },
    /// Catalog a file or URL
    Add(AddArgs),
    /// Search items
    Items(ItemsArgs),
    /// Search categories
    Categories(CategoriesArgs),
    /// Edit an item's fields
    Update(UpdateArgs),
    /// Edit a category's fields
    UpdateCategory(UpdateCategoryArgs),
    /// Delete items (and their data files)
    Delete {
        items: Vec<String>,
        /// Leave data files on disk
        #[arg(long)]
        keep_files: bool,
    },
    /// Delete categories
    DeleteCategory { categories: Vec<String> },
    /// Relate an item to categories, creating them as needed
    Link { item: String, categories: Vec<String> },
    /// Remove relations between an item and categories
    Unlink { item: String, categories: Vec<String> },
    /// Set or clear an item's primary category
    SetPrimary {
        item: String,
        category: Option<String>,
        #[arg(long)]
        clear: bool,
    },
    /// Duplicate an item, its relations and its data file
    Clone { item: String },
    /// Merge donor items into a target item
    MergeItems {
        target: String,
        donors: Vec<String>,
        /// Leave donor data files on disk
        #[arg(long)]
        keep_files: bool,
    },
    /// Merge donor categories into a target category
    MergeCategories { target: String, donors: Vec<String> },
    /// Fold one taxonomy's categories into another
    MergeTaxonomies { target: String, donor: String },
    /// Relate every item under any of the given categories to all of them
    SyncCategories {
        /// Category tokens (name or taxonomy:name), created when missing
        #[arg(required = true)]
        categories: Vec<String>,
    },
    /// Merge items whose files hash identically
    Dedupe {
        /// Which duplicate survives
        #[arg(long, value_enum, default_value_t = Keep::Oldest)]
        keep: Keep,
        /// Leave duplicate data files on disk
        #[arg(long)]
        keep_files: bool,
    },
    /// Recompute content hashes from the data directory
    SyncHashes,
    /// Align item dates with their files
    SyncDates,
    /// Rebuild the shortcut tree
    Shortcuts,
    /// Report missing data files and orphans
    Verify,
    /// Recompute cached relation counts from the relation table
    RebuildCounts,
    /// Write the catalog (or selected items) to a JSON snapshot
    Export {
        output: PathBuf,
        /// Export only these items
        #[arg(long = "item")]
        items: Vec<String>,
    },
    /// Merge a JSON snapshot into the catalog
    Import {
        input: PathBuf,
        /// Update existing items that share a content hash instead of
        /// inserting duplicates
        #[arg(long)]
        update_on_hash: bool,
    },
    /// Read or write catalog options
    #[command(name = "options")]
    Option {
        #[command(subcommand)]
        action: OptionCmd,
    },
}

#[derive(Subcommand)]
pub enum OptionCmd {
    List,
    Get { key: String },
    Set { key: String, value: String },
}

#[derive(Args)]
pub struct AddArgs {
    /// File path or URL to catalog
    pub target: String,
    /// Display name (defaults to the file stem or URL)
    #[arg(long)]
    pub name: Option<String>,
    /// Categories to relate, `taxonomy:name` or bare names
    #[arg(short = 'c', long = "category")]
    pub categories: Vec<String>,
    /// Primary category (implies a relation)
    #[arg(long)]
    pub primary: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// Source URL for file items
    #[arg(long)]
    pub source: Option<String>,
    /// Modification date, `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`
    /// (defaults to the file's mtime)
    #[arg(long)]
    pub modified: Option<String>,
    /// Override the inferred item type
    #[arg(long = "type")]
    pub item_type: Option<String>,
}

#[derive(Args, Default)]
pub struct Paging {
    /// Keep only the first N results
    #[arg(long)]
    pub first: Option<usize>,
    /// Keep only the last N results
    #[arg(long)]
    pub last: Option<usize>,
    /// 0-based page number (with --per-page)
    #[arg(long)]
    pub page: Option<usize>,
    #[arg(long)]
    pub per_page: Option<usize>,
    /// The final page (with --per-page)
    #[arg(long)]
    pub last_page: bool,
    /// Random order
    #[arg(long)]
    pub shuffle: bool,
}

fn page_from(paging: &Paging) -> Page {
    if paging.shuffle {
        Page::Shuffle
    } else if let Some(n) = paging.first {
        Page::First(n)
    } else if let Some(n) = paging.last {
        Page::Last(n)
    } else if let Some(per_page) = paging.per_page {
        if paging.last_page {
            Page::LastPage { per_page }
        } else {
            Page::Number { per_page, page: paging.page.unwrap_or(0) }
        }
    } else {
        Page::All
    }
}

#[derive(Args)]
pub struct ItemsArgs {
    /// Words that must all appear in name, source or description
    pub keywords: Vec<String>,
    #[arg(long)]
    pub name_equals: Option<String>,
    #[arg(long)]
    pub source_equals: Option<String>,
    #[arg(long)]
    pub description_equals: Option<String>,
    #[arg(long)]
    pub name_contains: Vec<String>,
    #[arg(long)]
    pub name_not_contains: Vec<String>,
    /// Categories the item must have all of
    #[arg(long = "with")]
    pub with: Vec<String>,
    /// Categories the item must have any of
    #[arg(long = "any")]
    pub any: Vec<String>,
    /// Categories the item must have none of
    #[arg(long = "without")]
    pub without: Vec<String>,
    #[arg(long)]
    pub taxonomy: Vec<String>,
    #[arg(long)]
    pub not_taxonomy: Vec<String>,
    #[arg(long)]
    pub id_min: Option<i64>,
    #[arg(long)]
    pub id_max: Option<i64>,
    #[arg(long)]
    pub modified_after: Option<String>,
    #[arg(long)]
    pub modified_before: Option<String>,
    #[arg(long)]
    pub created_after: Option<String>,
    #[arg(long)]
    pub created_before: Option<String>,
    #[arg(long = "type")]
    pub item_type: Vec<String>,
    #[arg(long)]
    pub not_type: Vec<String>,
    #[arg(long)]
    pub ext: Vec<String>,
    #[arg(long)]
    pub not_ext: Vec<String>,
    #[arg(long)]
    pub primary: Vec<String>,
    #[arg(long)]
    pub not_primary: Vec<String>,
    #[arg(long)]
    pub missing_source: bool,
    #[arg(long)]
    pub missing_description: bool,
    #[arg(long)]
    pub missing_hash: bool,
    /// Keep only items sharing this column's value with another item
    #[arg(long, value_enum)]
    pub duplicates: Option<DupColumn>,
    /// Keep only items whose files are byte-for-byte duplicates
    #[arg(long)]
    pub byte_duplicates: bool,
    /// Minimum file size, e.g. `10MB`
    #[arg(long)]
    pub min_size: Option<String>,
    #[arg(long)]
    pub max_size: Option<String>,
    /// Show file sizes
    #[arg(long)]
    pub stats: bool,
    #[arg(long, value_enum)]
    pub sort: Option<ItemSort>,
    /// Sort descending
    #[arg(long)]
    pub desc: bool,
    #[command(flatten)]
    pub paging: Paging,
}

#[derive(Args)]
pub struct CategoriesArgs {
    /// Words that must all appear in name or description
    pub keywords: Vec<String>,
    #[arg(long)]
    pub taxonomy: Vec<String>,
    #[arg(long)]
    pub not_taxonomy: Vec<String>,
    #[arg(long)]
    pub min_count: Option<i64>,
    #[arg(long)]
    pub max_count: Option<i64>,
    /// Categories related to any of these items
    #[arg(long = "of-item")]
    pub of_item: Vec<String>,
    /// Keep only same-named categories
    #[arg(long)]
    pub duplicates: bool,
    #[arg(long, value_enum)]
    pub sort: Option<TermSort>,
    #[arg(long)]
    pub desc: bool,
    #[command(flatten)]
    pub paging: Paging,
}

#[derive(Args)]
pub struct UpdateArgs {
    pub item: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long = "type")]
    pub item_type: Option<String>,
    #[arg(long)]
    pub ext: Option<String>,
    #[arg(long)]
    pub source: Option<String>,
    #[arg(long)]
    pub modified: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args)]
pub struct UpdateCategoryArgs {
    pub category: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// New parent category token, or `none` to move to the root
    #[arg(long)]
    pub parent: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Keep {
    Oldest,
    Newest,
}

impl From<Keep> for KeepPolicy {
    fn from(keep: Keep) -> Self {
        match keep {
            Keep::Oldest => KeepPolicy::Oldest,
            Keep::Newest => KeepPolicy::Newest,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum DupColumn {
    Name,
    Source,
    Hash,
}

impl From<DupColumn> for ItemColumn {
    fn from(column: DupColumn) -> Self {
        match column {
            DupColumn::Name => ItemColumn::Name,
            DupColumn::Source => ItemColumn::Source,
            DupColumn::Hash => ItemColumn::Hash,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ItemSort {
    Id,
    Name,
    Type,
    Extension,
    Source,
    Modified,
    Created,
    Hash,
    Relations,
    Size,
    FileModified,
}

impl From<ItemSort> for ItemSortKey {
    fn from(sort: ItemSort) -> Self {
        match sort {
            ItemSort::Id => ItemSortKey::Id,
            ItemSort::Name => ItemSortKey::Name,
            ItemSort::Type => ItemSortKey::Type,
            ItemSort::Extension => ItemSortKey::Extension,
            ItemSort::Source => ItemSortKey::Source,
            ItemSort::Modified => ItemSortKey::Modified,
            ItemSort::Created => ItemSortKey::Created,
            ItemSort::Hash => ItemSortKey::Hash,
            ItemSort::Relations => ItemSortKey::RelationCount,
            ItemSort::Size => ItemSortKey::Size,
            ItemSort::FileModified => ItemSortKey::FileModified,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum TermSort {
    Id,
    Name,
    Taxonomy,
    Count,
}

impl From<TermSort> for TermSortKey {
    fn from(sort: TermSort) -> Self {
        match sort {
            TermSort::Id => TermSortKey::Id,
            TermSort::Name => TermSortKey::Name,
            TermSort::Taxonomy => TermSortKey::Taxonomy,
            TermSort::Count => TermSortKey::ItemCount,
        }
    }
}
