//! Candidate identity for deduplication across runs.
//!
//! A signature is (cleaned full name, title, tenure). The name is cleaned of
//! masking asterisks and 先生/女士 so "张三" scraped today matches "张三先生"
//! written by an earlier run. Signatures only answer "seen before?"; they
//! never point back to a record.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::output::workbook::{find_sheets, read_sheet};
use crate::qualification::names::signature_name;

pub const NAME_COLUMN: &str = "姓名";
pub const TITLE_COLUMN: &str = "职位";
pub const TENURE_COLUMN: &str = "在职时间";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateSignature {
    pub name: String,
    pub title: String,
    pub tenure: String,
}

impl CandidateSignature {
    pub fn new(name: &str, title: &str, tenure: &str) -> Self {
        Self {
            name: signature_name(name),
            title: title.trim().to_string(),
            tenure: tenure.trim().to_string(),
        }
    }

    /// Rows with an empty name can't identify anybody and are not indexed.
    pub fn is_indexable(&self) -> bool {
        !self.name.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DedupIndex {
    seen: HashSet<CandidateSignature>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, signature: &CandidateSignature) -> bool {
        self.seen.contains(signature)
    }

    /// Returns false when the signature was already present.
    pub fn add(&mut self, signature: CandidateSignature) -> bool {
        self.seen.insert(signature)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Indexes every readable sheet under `root`. Files without the
    /// name/title/tenure columns are skipped; unreadable files are logged
    /// and skipped. Returns the number of signatures now in the index.
    pub fn load_from(&mut self, root: &Path) -> usize {
        let sheets = find_sheets(root);
        for path in &sheets {
            match self.load_file(path) {
                Ok(Some(rows)) => debug!("Indexed {rows} rows from {}", path.display()),
                Ok(None) => debug!("Skipping {}: missing required columns", path.display()),
                Err(e) => warn!("Failed to read history file {}: {e}", path.display()),
            }
        }
        info!(
            "Loaded {} historical signatures from {} files",
            self.len(),
            sheets.len()
        );
        self.len()
    }

    fn load_file(&mut self, path: &Path) -> Result<Option<usize>, crate::errors::AppError> {
        let sheet = read_sheet(path)?;
        let (Some(name), Some(title), Some(tenure)) = (
            sheet.column(NAME_COLUMN),
            sheet.column(TITLE_COLUMN),
            sheet.column(TENURE_COLUMN),
        ) else {
            return Ok(None);
        };

        let mut indexed = 0;
        for row in &sheet.rows {
            let signature = CandidateSignature::new(
                sheet.cell(row, name),
                sheet.cell(row, title),
                sheet.cell(row, tenure),
            );
            if signature.is_indexable() {
                self.add(signature);
                indexed += 1;
            }
        }
        Ok(Some(indexed))
    }
}
