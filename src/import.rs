//! Bulk import of reference data and price snapshots
//!
//! Walks a directory of JSON exports and loads them into the cache database.
//! Files named `prices.json`, `price_jita.json` and the like hold market
//! snapshots; every other `.json` file holds item records. A file may contain
//! a single record or an array of them.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::db;
use crate::models::{ItemType, MaterialEntry, PriceQuote, TypeId};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// Item record as exported by the reference data source
#[derive(Debug, Clone, Deserialize)]
pub struct TypeRecord {
    pub type_id: i64,
    pub name: String,
    pub volume: f64,
    #[serde(default)]
    pub portion_size: Option<i64>,
    #[serde(default, deserialize_with = "lenient_materials")]
    pub materials: Vec<MaterialEntry>,
}

/// Breakdown entries that do not even parse are dropped; the rest are kept
/// as given and classified when reprocessing.
fn lenient_materials<'de, D>(deserializer: D) -> std::result::Result<Vec<MaterialEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(material) => Some(material),
            Err(e) => {
                debug!("Dropping breakdown entry: {}", e);
                None
            }
        })
        .collect())
}

/// Market snapshot record
#[derive(Debug, Clone, Deserialize)]
pub struct PriceRecord {
    pub type_id: i64,
    #[serde(default)]
    pub sell_min: Option<f64>,
    #[serde(default)]
    pub buy_max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataFile {
    Types(PathBuf),
    Prices(PathBuf),
}

fn valid_type_id(raw: i64) -> Option<TypeId> {
    TypeId::try_from(raw).ok().filter(|id| *id > 0)
}

/// Find every JSON export under a directory
pub fn find_data_files(dir: &Path) -> Result<Vec<DataFile>> {
    let price_name = Regex::new(r"(?i)^prices?([-_].*)?\.json$")?;
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if price_name.is_match(filename) {
            files.push(DataFile::Prices(path.to_path_buf()));
        } else {
            files.push(DataFile::Types(path.to_path_buf()));
        }
    }

    Ok(files)
}

/// Split a file into records, decoding each one on its own.
///
/// Only a file that is not JSON at all fails as a whole; a record that does
/// not match `T` comes back as its own error.
pub fn parse_records<T: DeserializeOwned>(content: &str) -> Result<Vec<serde_json::Result<T>>> {
    let raw: OneOrMany<Value> = serde_json::from_str(content)?;
    Ok(raw.into_vec().into_iter().map(serde_json::from_value).collect())
}

pub fn parse_type_records(content: &str) -> Result<Vec<serde_json::Result<TypeRecord>>> {
    parse_records(content)
}

pub fn parse_price_records(content: &str) -> Result<Vec<serde_json::Result<PriceRecord>>> {
    parse_records(content)
}

impl TypeRecord {
    /// Convert to reference data; `None` when identity, name or volume is unusable.
    ///
    /// Breakdown entries are kept as given and filtered when reprocessing.
    pub fn into_item(self) -> Option<ItemType> {
        let type_id = valid_type_id(self.type_id)?;
        let name = self.name.trim().to_string();
        if name.is_empty() || !self.volume.is_finite() || self.volume < 0.0 {
            return None;
        }
        let portion_size = self
            .portion_size
            .and_then(|p| u32::try_from(p).ok())
            .filter(|p| *p > 0)
            .unwrap_or(1);

        Some(ItemType {
            type_id,
            name,
            volume: self.volume,
            portion_size,
            materials: self.materials,
        })
    }
}

fn import_types(conn: &Connection, path: &Path, fetched_at: i64, stats: &mut ImportStats) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let records = parse_type_records(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    for (idx, record) in records.into_iter().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("  Unreadable item record #{} in {}: {}", idx, path.display(), e);
                stats.errors += 1;
                continue;
            }
        };
        let raw_id = record.type_id;
        match record.into_item() {
            Some(item) => {
                db::upsert_type(conn, &item, fetched_at)?;
                stats.types += 1;
                stats.materials += item.materials.len();
            }
            None => {
                warn!("  Invalid item record {} in {}", raw_id, path.display());
                stats.errors += 1;
            }
        }
    }
    Ok(())
}

fn import_prices(conn: &Connection, path: &Path, fetched_at: i64, stats: &mut ImportStats) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let records = parse_price_records(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    for (idx, record) in records.into_iter().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("  Unreadable price record #{} in {}: {}", idx, path.display(), e);
                stats.errors += 1;
                continue;
            }
        };
        let Some(type_id) = valid_type_id(record.type_id) else {
            warn!("  Invalid price record {} in {}", record.type_id, path.display());
            stats.errors += 1;
            continue;
        };
        if record.sell_min.is_none() && record.buy_max.is_none() {
            stats.skipped += 1;
            continue;
        }
        let quote = PriceQuote {
            sell_min: record.sell_min,
            buy_max: record.buy_max,
        };
        db::upsert_price(conn, type_id, &quote, fetched_at)?;
        stats.prices += 1;
    }
    Ok(())
}

/// Import every export under `dir`, stamping entries with `fetched_at` (Unix seconds)
pub fn import_directory(conn: &Connection, dir: &Path, fetched_at: i64) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    info!("Scanning {} for data files...", dir.display());
    let files = find_data_files(dir)?;
    info!("Found {} data files", files.len());

    for file in &files {
        let result = match file {
            DataFile::Types(path) => import_types(conn, path, fetched_at, &mut stats),
            DataFile::Prices(path) => import_prices(conn, path, fetched_at, &mut stats),
        };
        match result {
            Ok(()) => {
                let path = match file {
                    DataFile::Types(p) | DataFile::Prices(p) => p,
                };
                info!("  Loaded {}", path.display());
            }
            Err(e) => {
                warn!("  {:#}", e);
                stats.errors += 1;
            }
        }
    }

    Ok(stats)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub types: usize,
    pub materials: usize,
    pub prices: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} items ({} material entries) and {} prices. Skipped: {}, Errors: {}",
            self.types, self.materials, self.prices, self.skipped, self.errors
        )
    }
}
