use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classify::ClassificationResult;
use crate::extract::ExtractedFields;

pub const HEADER: [&str; 7] = [
    "Domain",
    "Title",
    "Description",
    "Blog Status",
    "Niche Category",
    "Status Code",
    "Timestamp",
];

/// One persisted row, written exactly once per processed domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Domain")]
    pub domain: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Blog Status")]
    pub is_blog: bool,
    #[serde(rename = "Niche Category")]
    pub niche: String,
    #[serde(rename = "Status Code")]
    pub status_code: u16,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

impl Record {
    pub fn new(domain: &str, fields: &ExtractedFields, class: &ClassificationResult) -> Self {
        Self {
            domain: domain.to_string(),
            title: fields.title.clone(),
            description: fields.description.clone(),
            is_blog: class.is_blog,
            niche: class.niche.to_string(),
            status_code: fields.status_code,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Append-only CSV record store. Held by a single writer; every append is
/// flushed before returning so a crash never loses an acknowledged row.
pub struct RecordStore {
    writer: csv::Writer<File>,
}

impl RecordStore {
    /// Open for appending, writing the header iff the file is new or empty.
    /// Existing rows are never touched.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open record store {}", path.display()))?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if size == 0 {
            writer.write_record(HEADER)?;
            writer.flush()?;
        }
        Ok(Self { writer })
    }

    pub fn append(&mut self, record: &Record) -> Result<()> {
        self.writer
            .serialize(record)
            .context("Failed to write record")?;
        self.writer.flush().context("Failed to flush record store")?;
        Ok(())
    }
}

/// Rebuild the already-processed set from the persisted store. Malformed
/// rows (e.g. a line truncated by a crash mid-write) are skipped with a
/// warning; they were never acknowledged, so their domains run again.
pub fn load_index(path: &Path) -> Result<HashSet<String>> {
    let mut index = HashSet::new();
    if !path.exists() {
        return Ok(index);
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to read record store {}", path.display()))?;

    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping unreadable record: {}", e);
                continue;
            }
        };
        if record.len() < HEADER.len() {
            warn!("Skipping truncated record ({} fields)", record.len());
            continue;
        }
        let domain = record.get(0).unwrap_or("").trim();
        if !domain.is_empty() {
            index.insert(domain.to_string());
        }
    }
    Ok(index)
}

/// Counts over the persisted store, for the `stats` subcommand.
pub struct StoreStats {
    pub total: usize,
    pub ok: usize,
    pub failed: usize,
    pub blogs: usize,
    pub distinct_niches: usize,
}

pub fn read_stats(path: &Path) -> Result<StoreStats> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to read record store {}", path.display()))?;

    let mut total = 0usize;
    let mut ok = 0usize;
    let mut failed = 0usize;
    let mut blogs = 0usize;
    let mut niches = HashSet::new();

    for result in reader.deserialize::<Record>() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping unreadable record: {}", e);
                continue;
            }
        };
        total += 1;
        if record.status_code == 0 {
            failed += 1;
        } else {
            ok += 1;
        }
        if record.is_blog {
            blogs += 1;
        }
        niches.insert(record.niche);
    }

    Ok(StoreStats {
        total,
        ok,
        failed,
        blogs,
        distinct_niches: niches.len(),
    })
}
