//! Filesystem collaborators: content hashing, stats, byte comparison,
//! the data-directory layout, shortcut trees and data-dir verification.
//!
//! The catalog itself never depends on files being present; everything
//! here tolerates missing files and reports them instead of failing the
//! catalog operation that asked.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::context::CatalogContext;
use crate::error::{CatalogError, CatalogResult};
use crate::model::{Item, ItemId};
use crate::store::Store;
use crate::tree;

/// Read block size for hashing and byte comparison.
const BLOCK_SIZE: usize = 4096;

pub fn file_exists(path: &Path) -> bool {
    path.is_file()
}

pub fn file_size(path: &Path) -> io::Result<u64> {
    Ok(fs::metadata(path)?.len())
}

/// On-disk modification time in local time, truncated to seconds.
pub fn file_mod_time(path: &Path) -> io::Result<NaiveDateTime> {
    let modified = fs::metadata(path)?.modified()?;
    let local: DateTime<Local> = modified.into();
    let naive = local.naive_local();
    // stored timestamps have second precision
    Ok(naive.with_nanosecond(0).unwrap_or(naive))
}

/// MD5 of a file's contents as lowercase hex, read in fixed-size blocks.
pub fn content_hash(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = [0u8; BLOCK_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }
    Ok(format!("{:x}", context.compute()))
}

/// Byte-for-byte equality of two files. A size mismatch short-circuits
/// without reading either file.
pub fn compare_files(a: &Path, b: &Path) -> io::Result<bool> {
    if file_size(a)? != file_size(b)? {
        return Ok(false);
    }
    let mut file_a = File::open(a)?;
    let mut file_b = File::open(b)?;
    let mut buf_a = [0u8; BLOCK_SIZE];
    let mut buf_b = [0u8; BLOCK_SIZE];
    loop {
        let read_a = file_a.read(&mut buf_a)?;
        let read_b = file_b.read(&mut buf_b)?;
        if read_a != read_b || buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

/// Human-readable size, powers of 1024.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in ["bytes", "KB", "MB", "GB"] {
        if value < 1024.0 {
            return format!("{value:.0}{unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.0}TB")
}

/// Parse a size like `"512"`, `"10MB"` or `"1.5 GB"` into bytes.
pub fn parse_bytes(input: &str) -> CatalogResult<u64> {
    let trimmed = input.trim();
    let invalid = |reason: &str| CatalogError::InvalidInput {
        input: input.to_string(),
        reason: reason.to_string(),
    };
    if trimmed.is_empty() {
        return Err(invalid("empty size"));
    }
    let split = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let number: f64 = number
        .trim()
        .parse()
        .map_err(|_| invalid("not a number"))?;
    if number < 0.0 {
        return Err(invalid("negative size"));
    }
    let multiplier: u64 = match unit.trim().to_uppercase().as_str() {
        "" | "B" => 1,
        "KB" => 1 << 10,
        "MB" => 1 << 20,
        "GB" => 1 << 30,
        "TB" => 1 << 40,
        _ => return Err(invalid("unknown unit")),
    };
    Ok((number * multiplier as f64) as u64)
}

/// Where an item's data file lives: `<data_dir>/<type dir>/<id>.<ext>`.
pub fn data_file_path(data_dir: &Path, type_dir: &str, id: ItemId, ext: &str) -> PathBuf {
    let file_name = if ext.is_empty() {
        id.to_string()
    } else {
        format!("{id}.{ext}")
    };
    data_dir.join(type_dir).join(file_name)
}

/// Platform extension for URL shortcut files.
pub fn desktop_file_ext() -> &'static str {
    if cfg!(windows) || cfg!(target_os = "macos") {
        "url"
    } else {
        "desktop"
    }
}

fn desktop_file_contents(name: &str, url: &str) -> String {
    if cfg!(windows) || cfg!(target_os = "macos") {
        format!("[InternetShortcut]\nURL={url}\n")
    } else {
        format!("[Desktop Entry]\nEncoding=UTF-8\nName={name}\nType=Link\nURL={url}\n")
    }
}

/// Write a URL shortcut file, creating parent directories as needed.
pub fn write_desktop_file(path: &Path, name: &str, url: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, desktop_file_contents(name, url))
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Create a symlink at `link` pointing at `target`, creating parent
/// directories. An existing link is replaced only with `overwrite`.
pub fn create_link(target: &Path, link: &Path, overwrite: bool) -> io::Result<bool> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    if link.symlink_metadata().is_ok() {
        if !overwrite {
            return Ok(false);
        }
        fs::remove_file(link)?;
    }
    symlink(target, link)?;
    Ok(true)
}

/// Counters returned by [`create_shortcuts`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShortcutReport {
    pub created: usize,
    pub skipped: usize,
}

/// Materialize the shortcut tree: one folder per enabled taxonomy, the
/// term's ancestor path underneath (for hierarchical taxonomies), and one
/// link per related item. Web-link items get URL shortcut files carrying
/// their source; everything else gets a symlink into the data directory.
/// Existing taxonomy folders are rebuilt from scratch.
pub fn create_shortcuts(store: &Store, ctx: &CatalogContext) -> CatalogResult<ShortcutReport> {
    let shortcuts_dir = ctx.options.shortcuts_dir.as_ref().ok_or_else(|| {
        CatalogError::InvalidInput {
            input: "default_shortcuts_dir".to_string(),
            reason: "no shortcuts directory is configured".to_string(),
        }
    })?;
    let data_dir = ctx
        .options
        .data_dir
        .as_ref()
        .ok_or_else(|| CatalogError::InvalidInput {
            input: "default_data_dir".to_string(),
            reason: "no data directory is configured".to_string(),
        })?;

    let mut report = ShortcutReport::default();
    for taxonomy in ctx.taxonomies.iter().filter(|t| t.enabled) {
        let base = shortcuts_dir.join(&taxonomy.dir_name);
        if base.exists() {
            fs::remove_dir_all(&base)?;
        }
        for term in store.terms_in_taxonomy(&taxonomy.table_name)? {
            let mut dir = base.clone();
            if taxonomy.has_children && ctx.options.category_levels > 0 {
                for ancestor in
                    tree::ancestor_path(store, term.id, ctx.options.category_levels)?
                {
                    dir = dir.join(ancestor);
                }
            }
            dir = dir.join(&term.name);
            for item_id in store.item_ids_for_term(term.id)? {
                let item = store.item(item_id)?;
                let is_weblink = ctx
                    .item_type(&item.item_type)
                    .map(|t| t.is_weblinks())
                    .unwrap_or(false);
                if is_weblink {
                    let Some(url) = &item.source else {
                        warn!("weblink item {} has no source, skipping shortcut", item.id);
                        report.skipped += 1;
                        continue;
                    };
                    let link = dir.join(format!("{}.{}", item.name, desktop_file_ext()));
                    write_desktop_file(&link, &item.name, url)?;
                } else {
                    let target =
                        data_file_path(data_dir, &ctx.dir_for_type(&item.item_type), item.id, &item.extension);
                    if !file_exists(&target) {
                        debug!("item {} has no data file, skipping shortcut", item.id);
                        report.skipped += 1;
                        continue;
                    }
                    let link_name = if item.extension.is_empty() {
                        item.name.clone()
                    } else {
                        format!("{}.{}", item.name, item.extension)
                    };
                    create_link(&target, &dir.join(link_name), true)?;
                }
                report.created += 1;
            }
        }
    }
    info!(
        "shortcut tree rebuilt: {} created, {} skipped",
        report.created, report.skipped
    );
    Ok(report)
}

/// Discrepancies between the catalog and the data directory.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct VerifyReport {
    /// Items whose expected data file is absent
    pub missing: Vec<Item>,
    /// Files in the data directory no catalog row accounts for
    pub orphans: Vec<PathBuf>,
}

/// Walk the data directory and reconcile it against the catalog. Webpage
/// companion `_files` directories are not the catalog's to track and are
/// skipped.
pub fn verify_files(store: &Store, ctx: &CatalogContext) -> CatalogResult<VerifyReport> {
    let data_dir = ctx
        .options
        .data_dir
        .as_ref()
        .ok_or_else(|| CatalogError::InvalidInput {
            input: "default_data_dir".to_string(),
            reason: "no data directory is configured".to_string(),
        })?;

    let mut expected: std::collections::BTreeMap<PathBuf, ()> = std::collections::BTreeMap::new();
    let mut report = VerifyReport::default();
    for item in store.items()? {
        let path = data_file_path(data_dir, &ctx.dir_for_type(&item.item_type), item.id, &item.extension);
        if !file_exists(&path) {
            report.missing.push(item);
        }
        expected.insert(path, ());
    }

    if data_dir.is_dir() {
        let walker = WalkDir::new(data_dir).into_iter().filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry.file_name().to_string_lossy().ends_with("_files"))
        });
        for entry in walker {
            let entry = entry.map_err(|err| {
                CatalogError::Io(io::Error::new(io::ErrorKind::Other, err.to_string()))
            })?;
            if entry.file_type().is_file() && !expected.contains_key(entry.path()) {
                report.orphans.push(entry.path().to_path_buf());
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewItem, NewTerm};
    use tempfile::TempDir;

    #[test]
    fn test_content_hash_known_vectors() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("empty");
        std::fs::write(&empty, b"").unwrap();
        assert_eq!(
            content_hash(&empty).unwrap(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        let abc = dir.path().join("abc");
        std::fs::write(&abc, b"abc").unwrap();
        assert_eq!(
            content_hash(&abc).unwrap(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_compare_files() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        std::fs::write(&a, b"identical contents").unwrap();
        std::fs::write(&b, b"identical contents").unwrap();
        std::fs::write(&c, b"different contents").unwrap();
        assert!(compare_files(&a, &b).unwrap());
        assert!(!compare_files(&a, &c).unwrap());
    }

    #[test]
    fn test_format_and_parse_bytes() {
        assert_eq!(format_bytes(512), "512bytes");
        assert_eq!(format_bytes(2048), "2KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5MB");

        assert_eq!(parse_bytes("512").unwrap(), 512);
        assert_eq!(parse_bytes("2KB").unwrap(), 2048);
        assert_eq!(parse_bytes("1.5 GB").unwrap(), 1_610_612_736);
        assert_eq!(parse_bytes("10 mb").unwrap(), 10 * 1024 * 1024);
        assert!(parse_bytes("ten").is_err());
        assert!(parse_bytes("10 parsecs").is_err());
    }

    #[test]
    fn test_data_file_path() {
        let path = data_file_path(Path::new("/data"), "documents", ItemId(42), "pdf");
        assert_eq!(path, PathBuf::from("/data/documents/42.pdf"));
        let bare = data_file_path(Path::new("/data"), "weblinks", ItemId(7), "");
        assert_eq!(bare, PathBuf::from("/data/weblinks/7"));
    }

    fn shortcut_fixture() -> (Store, CatalogContext, TempDir) {
        let mut store = Store::open_in_memory().unwrap();
        let mut ctx = CatalogContext::load(&store).unwrap();
        let dir = TempDir::new().unwrap();
        ctx.options.data_dir = Some(dir.path().join("data"));
        ctx.options.shortcuts_dir = Some(dir.path().join("shortcuts"));

        let item = store
            .create_item(&NewItem {
                name: "notes".to_string(),
                item_type: "Document".to_string(),
                extension: "txt".to_string(),
                ..NewItem::default()
            })
            .unwrap();
        let docs = dir.path().join("data/documents");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join(format!("{item}.txt")), b"hello").unwrap();
        let term = store
            .create_term(
                &NewTerm {
                    name: "work".to_string(),
                    taxonomy: "tag".to_string(),
                    ..NewTerm::default()
                },
                false,
            )
            .unwrap();
        store.link(item, term).unwrap();
        (store, ctx, dir)
    }

    #[cfg(unix)]
    #[test_log::test]
    fn test_create_shortcuts_symlinks() {
        let (store, ctx, dir) = shortcut_fixture();
        let report = create_shortcuts(&store, &ctx).unwrap();
        assert_eq!(report, ShortcutReport { created: 1, skipped: 0 });
        let link = dir.path().join("shortcuts/tags/work/notes.txt");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_to_string(&link).unwrap(), "hello");

        // rebuilding is idempotent
        let report = create_shortcuts(&store, &ctx).unwrap();
        assert_eq!(report.created, 1);
    }

    #[test_log::test]
    fn test_create_shortcuts_weblink() {
        let (mut store, ctx, dir) = shortcut_fixture();
        let link_item = store
            .create_item(&NewItem {
                name: "favorite site".to_string(),
                item_type: "Weblink".to_string(),
                source: Some("https://example.com".to_string()),
                ..NewItem::default()
            })
            .unwrap();
        let term = store.terms().unwrap().pop().unwrap().id;
        store.link(link_item, term).unwrap();

        let report = create_shortcuts(&store, &ctx).unwrap();
        assert_eq!(report.created, 2);
        let file = dir.path().join(format!(
            "shortcuts/tags/work/favorite site.{}",
            desktop_file_ext()
        ));
        let contents = std::fs::read_to_string(file).unwrap();
        assert!(contents.contains("URL=https://example.com"));
    }

    #[test_log::test]
    fn test_verify_files_reports_missing_and_orphans() {
        let (mut store, ctx, dir) = shortcut_fixture();
        // an item with no file on disk
        let ghost = store
            .create_item(&NewItem {
                name: "ghost".to_string(),
                item_type: "Document".to_string(),
                extension: "pdf".to_string(),
                ..NewItem::default()
            })
            .unwrap();
        // a file no item accounts for
        let stray = dir.path().join("data/documents/999.txt");
        std::fs::write(&stray, b"stray").unwrap();
        // webpage companion directories are ignored
        let companion = dir.path().join("data/webpages/3_files");
        std::fs::create_dir_all(&companion).unwrap();
        std::fs::write(companion.join("style.css"), b"body{}").unwrap();

        let report = verify_files(&store, &ctx).unwrap();
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].id, ghost);
        assert_eq!(report.orphans, vec![stray]);
    }
}
