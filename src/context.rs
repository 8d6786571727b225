//! Catalog-wide context: configured taxonomies, item types and options.
//!
//! A [`CatalogContext`] is constructed once when a catalog is opened and
//! passed explicitly into every component call that needs configuration.
//! Nothing here is global or mutated behind the caller's back; operations
//! that change the configured sets (merging a taxonomy away, spawning an
//! item type for an unknown extension) take `&mut CatalogContext` and
//! persist the new sets through the store in the same transaction.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::warn;

use crate::error::{CatalogResult, StoreError};
use crate::model::{ItemType, Taxonomy};
use crate::store::Store;

/// Recognized option keys. Unknown keys are carried in [`Options::extra`]
/// untouched.
pub const OPT_DEFAULT_TAXONOMY: &str = "default_taxonomy";
pub const OPT_CATEGORY_LEVELS: &str = "cat_lvls";
pub const OPT_DATA_DIR: &str = "default_data_dir";
pub const OPT_SHORTCUTS_DIR: &str = "default_shortcuts_dir";

/// Decoded catalog options with typed accessors for the recognized keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Taxonomy key used when a category token carries no taxonomy part
    pub default_taxonomy: String,
    /// Maximum category nesting depth; 0 disables the hierarchy entirely
    pub category_levels: u32,
    pub data_dir: Option<PathBuf>,
    pub shortcuts_dir: Option<PathBuf>,
    /// Unrecognized keys, preserved verbatim for round-tripping
    pub extra: BTreeMap<String, String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            default_taxonomy: "tag".to_string(),
            category_levels: 3,
            data_dir: None,
            shortcuts_dir: None,
            extra: BTreeMap::new(),
        }
    }
}

impl Options {
    /// Strict decode from the persisted key/value map. Malformed values for
    /// recognized keys are a storage fault, not a silent default.
    pub fn from_map(map: BTreeMap<String, String>) -> Result<Self, StoreError> {
        let mut options = Options::default();
        for (key, value) in map {
            match key.as_str() {
                OPT_DEFAULT_TAXONOMY => options.default_taxonomy = value,
                OPT_CATEGORY_LEVELS => {
                    options.category_levels =
                        value.parse().map_err(|_| StoreError::CorruptValue {
                            column: OPT_CATEGORY_LEVELS,
                            value: value.clone(),
                        })?;
                }
                OPT_DATA_DIR => options.data_dir = Some(PathBuf::from(value)),
                OPT_SHORTCUTS_DIR => options.shortcuts_dir = Some(PathBuf::from(value)),
                _ => {
                    options.extra.insert(key, value);
                }
            }
        }
        Ok(options)
    }

    /// The persisted form of these options.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = self.extra.clone();
        map.insert(
            OPT_DEFAULT_TAXONOMY.to_string(),
            self.default_taxonomy.clone(),
        );
        map.insert(
            OPT_CATEGORY_LEVELS.to_string(),
            self.category_levels.to_string(),
        );
        if let Some(dir) = &self.data_dir {
            map.insert(OPT_DATA_DIR.to_string(), dir.display().to_string());
        }
        if let Some(dir) = &self.shortcuts_dir {
            map.insert(OPT_SHORTCUTS_DIR.to_string(), dir.display().to_string());
        }
        map
    }
}

/// The configured state of one open catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogContext {
    pub taxonomies: Vec<Taxonomy>,
    pub item_types: Vec<ItemType>,
    pub options: Options,
}

impl Default for CatalogContext {
    fn default() -> Self {
        CatalogContext {
            taxonomies: default_taxonomies(),
            item_types: default_item_types(),
            options: Options::default(),
        }
    }
}

impl CatalogContext {
    /// Load the persisted context from an open catalog.
    pub fn load(store: &Store) -> CatalogResult<Self> {
        let options = Options::from_map(store.options()?)?;
        Ok(CatalogContext {
            taxonomies: store.load_taxonomies()?,
            item_types: store.load_item_types()?,
            options,
        })
    }

    /// Look a taxonomy up by its stable key.
    pub fn taxonomy(&self, table_name: &str) -> Option<&Taxonomy> {
        self.taxonomies.iter().find(|t| t.table_name == table_name)
    }

    /// Resolve a user-supplied taxonomy token against the configured
    /// taxonomies by any of their four names. An empty token means the
    /// default taxonomy. Multiple matches take the first with a warning.
    pub fn resolve_taxonomy(&self, token: &str) -> Option<&Taxonomy> {
        if token.is_empty() {
            return self.taxonomy(&self.options.default_taxonomy);
        }
        let mut matches = self.taxonomies.iter().filter(|t| t.matches_token(token));
        let first = matches.next()?;
        let rest = matches.count();
        if rest > 0 {
            warn!(
                "taxonomy token '{}' matches {} taxonomies, using '{}'",
                token,
                rest + 1,
                first.table_name
            );
        }
        Some(first)
    }

    pub fn item_type(&self, noun_name: &str) -> Option<&ItemType> {
        self.item_types.iter().find(|t| t.noun_name == noun_name)
    }

    /// The item type that claims the given file extension, if any.
    pub fn type_for_extension(&self, ext: &str) -> Option<&ItemType> {
        self.item_types.iter().find(|t| t.has_extension(ext))
    }

    /// Data-directory folder name for an item type noun; falls back to the
    /// noun itself when the type is unknown.
    pub fn dir_for_type(&self, noun_name: &str) -> String {
        self.item_type(noun_name)
            .map(|t| t.dir_name.clone())
            .unwrap_or_else(|| noun_name.to_string())
    }

    /// Register a new item type for an extension no configured type claims,
    /// named after the extension. Returns the new type's noun name.
    pub fn spawn_type_for_extension(&mut self, ext: &str) -> String {
        let noun = capitalize(ext);
        let item_type = ItemType {
            plural_name: pluralize(&noun),
            dir_name: pluralize(&noun).to_lowercase(),
            table_name: ext.to_lowercase(),
            noun_name: noun.clone(),
            enabled: true,
            extensions: vec![ext.to_lowercase()],
        };
        self.item_types.push(item_type);
        noun
    }
}

/// The default taxonomy set: a single flat tag taxonomy.
pub fn default_taxonomies() -> Vec<Taxonomy> {
    vec![Taxonomy {
        noun_name: "Tag".to_string(),
        plural_name: "Tags".to_string(),
        dir_name: "tags".to_string(),
        table_name: "tag".to_string(),
        enabled: true,
        has_children: false,
        is_tags: true,
        colour: None,
    }]
}

/// The default item-type set with canonical extension lists.
pub fn default_item_types() -> Vec<ItemType> {
    let make = |noun: &str, plural: &str, table: &str, exts: &[&str]| ItemType {
        noun_name: noun.to_string(),
        plural_name: plural.to_string(),
        dir_name: plural.to_lowercase(),
        table_name: table.to_string(),
        enabled: true,
        extensions: exts.iter().map(|e| e.to_string()).collect(),
    };
    vec![
        make(
            "Webpage",
            "Webpages",
            "webpage",
            &["html", "htm", "xhtml", "xht"],
        ),
        make(
            "Document",
            "Documents",
            "document",
            &["pdf", "doc", "docx", "txt", "odt", "mobi", "epub", "rtf", "abw"],
        ),
        make(
            "Image",
            "Images",
            "image",
            &["jpeg", "jpg", "png", "apng", "gif", "bmp", "svg", "ico"],
        ),
        make("Weblink", "Weblinks", "weblink", &[]),
        make(
            "Audio",
            "Audio",
            "audio",
            &["mp3", "flac", "wav", "wma", "mid", "ogg", "m4a"],
        ),
        make(
            "Video",
            "Videos",
            "video",
            &["flv", "mp4", "avi", "m4v", "mkv", "mov", "mpeg", "mpg", "wmv", "3gp"],
        ),
    ]
}

/// First letter uppercased, the rest lowercased.
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// English-ish pluralization used when naming auto-created item types.
pub fn pluralize(noun: &str) -> String {
    let lower = noun.to_lowercase();
    let last = lower.chars().last();
    let second_last = lower.chars().rev().nth(1);
    match (second_last, last) {
        (_, Some('s')) | (_, Some('x')) | (_, Some('z')) => format!("{noun}es"),
        (Some(prev), Some('h')) if !"aeioudgkprt".contains(prev) => format!("{noun}es"),
        (Some(prev), Some('y')) if "aeiou".contains(prev) => {
            format!("{}ies", &noun[..noun.len() - 1])
        }
        _ => format!("{noun}s"),
    }
}
