//! Seed sheets: candidates pasted from elsewhere, written in the standard
//! column order so later runs treat them as already seen.
//!
//! Input is one candidate per line, `姓名 公司 职位 [电话] [在职时间]`,
//! separated by tabs, runs of two or more spaces, or single spaces (tried
//! in that order). A line holding a single token without digits sets the
//! category for the lines after it.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use crate::errors::AppError;
use crate::output::workbook;
use crate::qualification::tenure::normalize;

const UNCATEGORIZED: &str = "未分类";
const PREVIEW_ROWS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedCandidate {
    pub name: String,
    pub employer: String,
    pub title: String,
    pub phone: String,
    pub tenure: String,
    pub category: Option<String>,
}

fn wide_gap() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}").expect("valid regex"))
}

fn split_fields(line: &str) -> Vec<&str> {
    let tabs: Vec<&str> = line.split('\t').collect();
    if tabs.len() >= 3 {
        return tabs;
    }
    let wide: Vec<&str> = wide_gap().split(line).collect();
    if wide.len() >= 3 {
        return wide;
    }
    line.split_whitespace().collect()
}

pub fn parse_candidate_line(line: &str) -> Option<SeedCandidate> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let parts = split_fields(line);
    if parts.len() < 3 {
        return None;
    }
    let field = |i: usize| parts.get(i).map(|p| p.trim().to_string()).unwrap_or_default();
    Some(SeedCandidate {
        name: field(0),
        employer: field(1),
        title: field(2),
        phone: field(3),
        tenure: normalize(&field(4)),
        category: None,
    })
}

fn is_category_line(line: &str) -> bool {
    line.split_whitespace().count() == 1 && !line.chars().any(|c| c.is_ascii_digit())
}

pub fn parse_content(content: &str) -> Vec<SeedCandidate> {
    let mut current_category: Option<String> = None;
    let mut candidates = Vec::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if is_category_line(line) {
            current_category = Some(line.to_string());
            continue;
        }
        if let Some(mut candidate) = parse_candidate_line(line) {
            candidate.category = current_category.clone();
            candidates.push(candidate);
        }
    }
    candidates
}

/// Category of a candidate: its own, else `fallback`, else its employer.
fn category_of<'a>(candidate: &'a SeedCandidate, fallback: Option<&'a str>) -> &'a str {
    candidate
        .category
        .as_deref()
        .or(fallback)
        .filter(|c| !c.is_empty())
        .or(Some(candidate.employer.as_str()).filter(|e| !e.is_empty()))
        .unwrap_or(UNCATEGORIZED)
}

pub fn seed_filename(category: Option<&str>) -> String {
    match category.filter(|c| !c.trim().is_empty()) {
        Some(category) => format!("{}-查重数据.{}", category.trim(), workbook::EXTENSION),
        None => format!("查重数据.{}", workbook::EXTENSION),
    }
}

/// Writes the seed sheet. The 公司 column repeats the category.
pub fn write_seed_sheet(
    path: &Path,
    candidates: &[SeedCandidate],
    fallback_category: Option<&str>,
) -> Result<usize, AppError> {
    if candidates.is_empty() {
        return Err(AppError::Validation(
            "no candidate lines could be parsed (expected: 姓名 公司 职位 电话 在职时间)".to_string(),
        ));
    }
    let rows = candidates.iter().enumerate().map(|(i, c)| {
        let category = category_of(c, fallback_category).to_string();
        [
            (i + 1).to_string(),
            category.clone(),
            category,
            c.name.clone(),
            c.employer.clone(),
            c.title.clone(),
            c.phone.clone(),
            c.tenure.clone(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ]
    });
    workbook::write_rows(path, rows)?;
    info!("Wrote {} seed candidates to {}", candidates.len(), path.display());
    Ok(candidates.len())
}

/// Candidates per category, in category order.
pub fn category_counts(candidates: &[SeedCandidate], fallback: Option<&str>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for candidate in candidates {
        *counts
            .entry(category_of(candidate, fallback).to_string())
            .or_insert(0) += 1;
    }
    counts
}

pub fn preview(candidates: &[SeedCandidate]) -> String {
    let mut out = String::from("序号\t分类\t姓名\t在职公司\t职位\t在职时间\n");
    for (i, c) in candidates.iter().take(PREVIEW_ROWS).enumerate() {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\n",
            i + 1,
            c.category.as_deref().unwrap_or(""),
            c.name,
            c.employer,
            c.title,
            c.tenure
        ));
    }
    if candidates.len() > PREVIEW_ROWS {
        out.push_str("...\n");
    }
    out.push_str(&format!("总计: {} 条候选人数据", candidates.len()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qualification::signature::{CandidateSignature, DedupIndex};

    #[test]
    fn test_line_separators_in_order() {
        let tabbed = parse_candidate_line("张三\tAcme 中国\t产品经理\t138\t2020.01 - 至今").unwrap();
        assert_eq!(tabbed.employer, "Acme 中国");
        assert_eq!(tabbed.tenure, "20/1-Present");

        let wide = parse_candidate_line("李四  Globex Inc  数据分析师").unwrap();
        assert_eq!(wide.employer, "Globex Inc");
        assert_eq!(wide.phone, "");

        let narrow = parse_candidate_line("王五 Initech 工程师 139").unwrap();
        assert_eq!(narrow.title, "工程师");
        assert_eq!(narrow.phone, "139");

        assert!(parse_candidate_line("只有 两段").is_none());
    }

    #[test]
    fn test_category_lines_apply_to_following_candidates() {
        let content = "上游\n张三 Acme PM\n\n下游\n李四 Globex QA\n王五 Initech 2号线\n";
        let parsed = parse_content(content);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].category.as_deref(), Some("上游"));
        assert_eq!(parsed[1].category.as_deref(), Some("下游"));
        assert_eq!(parsed[2].category.as_deref(), Some("下游"));
    }

    #[test]
    fn test_written_sheet_feeds_dedup_index() {
        let dir = tempfile::tempdir().unwrap();
        let candidates = parse_content("张三\tAcme\tPM\t\t2020.01 - 至今\n李四 Globex QA");
        let path = dir.path().join(seed_filename(Some("上游")));
        assert_eq!(write_seed_sheet(&path, &candidates, Some("上游")).unwrap(), 2);

        let sheet = workbook::read_sheet(&path).unwrap();
        let company = sheet.column("公司").unwrap();
        assert_eq!(sheet.cell(&sheet.rows[0], company), "上游");

        let mut index = DedupIndex::new();
        assert_eq!(index.load_from(dir.path()), 2);
        assert!(index.contains(&CandidateSignature::new("张三", "PM", "20/1-Present")));
    }

    #[test]
    fn test_category_fallback_is_employer() {
        let candidates = parse_content("张三 Acme PM\n李四 Acme QA");
        let counts = category_counts(&candidates, None);
        assert_eq!(counts.get("Acme"), Some(&2));
        let counts = category_counts(&candidates, Some("上游"));
        assert_eq!(counts.get("上游"), Some(&2));
    }

    #[test]
    fn test_nothing_parsed_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_seed_sheet(&dir.path().join("x.csv"), &parse_content("标题\n"), None);
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_seed_filename() {
        assert_eq!(seed_filename(Some("上游")), "上游-查重数据.csv");
        assert_eq!(seed_filename(Some("  ")), "查重数据.csv");
    }
}
