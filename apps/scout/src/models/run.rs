use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Placeholder in the briefing template replaced by the searched employer.
pub const COMPANY_PLACEHOLDER: &str = "__COMPANY__";

/// One employer to search, with an optional cap on accepted candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployerTarget {
    pub name: String,
    /// `None` means unbounded.
    pub quota: Option<u32>,
}

impl EmployerTarget {
    pub fn quota_reached(&self, accepted: u32) -> bool {
        self.quota.is_some_and(|q| accepted >= q)
    }
}

/// Immutable configuration of one run, produced by the interactive prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfiguration {
    pub category: String,
    pub employers: Vec<EmployerTarget>,
    /// Empty means "unrestricted": one pass per employer with no keyword.
    pub positions: Vec<String>,
    pub briefing_template: String,
    pub view_phone: bool,
    pub initials_only: bool,
    /// "YY/M" or "Present".
    pub min_tenure_end: String,
    pub min_last_login: Option<NaiveDate>,
    /// File name (not path) of the run's spreadsheet.
    pub output_filename: String,
    /// Set when the operator kept the generated file name; enables renaming
    /// the output after the positions actually searched.
    pub default_stem: Option<String>,
    pub zip_label: String,
}

impl RunConfiguration {
    pub fn briefing_for(&self, employer: &str) -> String {
        self.briefing_template.replace(COMPANY_PLACEHOLDER, employer)
    }

    pub fn search_positions(&self) -> Vec<String> {
        if self.positions.is_empty() {
            vec![String::new()]
        } else {
            self.positions.clone()
        }
    }
}

/// Parses "公司A 10/公司B 5/公司C" into employer targets. A trailing
/// integer separated by a space is the quota.
pub fn parse_employers(raw: &str) -> Vec<EmployerTarget> {
    raw.split('/')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.rsplit_once(' ') {
            Some((name, quota)) if !name.trim().is_empty() => match quota.trim().parse::<u32>() {
                Ok(q) => EmployerTarget {
                    name: name.trim().to_string(),
                    quota: Some(q),
                },
                Err(_) => EmployerTarget {
                    name: entry.to_string(),
                    quota: None,
                },
            },
            _ => EmployerTarget {
                name: entry.to_string(),
                quota: None,
            },
        })
        .collect()
}

/// Parses "产品经理-数据分析师" into position keywords.
pub fn parse_positions(raw: &str) -> Vec<String> {
    raw.split('-')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// "<category>-<employer names>", the stem every default file name starts with.
pub fn default_stem(category: &str, employers: &[EmployerTarget]) -> String {
    let names: Vec<&str> = employers.iter().map(|e| e.name.as_str()).collect();
    format!("{}-{}", category, names.join("-"))
}

pub fn default_filename(stem: &str, positions: &[String], extension: &str) -> String {
    let positions: Vec<&str> = positions
        .iter()
        .map(String::as_str)
        .filter(|p| !p.is_empty())
        .collect();
    if positions.is_empty() {
        format!("{stem}.{extension}")
    } else {
        format!("{stem}-{}.{extension}", positions.join("-"))
    }
}
