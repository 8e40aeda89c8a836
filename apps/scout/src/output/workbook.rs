//! Tabular output. One UTF-8 CSV (with BOM so spreadsheet apps pick the
//! encoding) per run, rewritten wholesale on every flush.
//!
//! History is read back from CSV and from `.xlsx` sheets left by earlier
//! tooling; only the first worksheet of a workbook is read.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, Reader, Xlsx};
use tracing::debug;

use crate::errors::AppError;
use crate::models::{CandidateRecord, COLUMNS};

pub const EXTENSION: &str = "csv";
const WORKBOOK_EXTENSION: &str = "xlsx";
const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Writes `records` to `path` with a 1-based 序号 column. The file is written
/// to a temporary sibling first and renamed into place, so a crash mid-write
/// never leaves a truncated sheet behind.
pub fn write_records(path: &Path, records: &[CandidateRecord]) -> Result<(), AppError> {
    let rows = records
        .iter()
        .enumerate()
        .map(|(i, record)| record.to_row(i + 1));
    write_rows(path, rows)
}

pub fn write_rows<I>(path: &Path, rows: I) -> Result<(), AppError>
where
    I: IntoIterator<Item = [String; 12]>,
{
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(BOM)?;
    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
        writer.write_record(COLUMNS)?;
        for row in rows {
            writer.write_record(&row)?;
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| AppError::persistence(path, e.error))?;
    debug!("Wrote sheet {}", path.display());
    Ok(())
}

/// A sheet read back from disk. Headers are whatever that file used;
/// older runs may lack optional columns or carry extra ones.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell at `column`, empty when the row is short.
    pub fn cell<'a>(&'a self, row: &'a [String], column: usize) -> &'a str {
        row.get(column).map(String::as_str).unwrap_or("")
    }
}

pub fn read_sheet(path: &Path) -> Result<Sheet, AppError> {
    if has_extension(path, WORKBOOK_EXTENSION) {
        read_workbook(path)
    } else {
        read_csv(path)
    }
}

fn read_csv(path: &Path) -> Result<Sheet, AppError> {
    let raw = fs::read(path)?;
    let body: &[u8] = raw.strip_prefix(BOM).unwrap_or(&raw);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body);

    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(String::from).collect());
    }

    Ok(Sheet { headers, rows })
}

fn read_workbook(path: &Path) -> Result<Sheet, AppError> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range?,
        None => {
            return Ok(Sheet {
                headers: Vec::new(),
                rows: Vec::new(),
            })
        }
    };

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<String>>());
    let headers = rows
        .next()
        .unwrap_or_default()
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    Ok(Sheet {
        headers,
        rows: rows.collect(),
    })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Sheets this tool can read back, excluding office lock and temp files.
pub fn is_sheet(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with("~$") || name.starts_with(".~lock") || name.starts_with('.') {
        return false;
    }
    has_extension(path, EXTENSION) || has_extension(path, WORKBOOK_EXTENSION)
}

/// Every sheet under `root`, recursively, in a stable order.
pub fn find_sheets(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    collect_sheets(root, &mut found);
    found.sort();
    found
}

fn collect_sheets(dir: &Path, found: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_sheets(&path, found);
        } else if is_sheet(&path) {
            found.push(path);
        }
    }
}
