use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

fn any_date() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4}/\d{2}/\d{2})").expect("valid regex"))
}

fn labelled_date() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"最后登录.*?(\d{4}/\d{2}/\d{2})").expect("valid regex"))
}

/// Parses an operator-entered login threshold. Accepts "YYYY/MM/DD",
/// "YY/MM/DD", "YYYY/MM" and "YY/MM", with '-' or '/' separators.
/// Month-only inputs resolve to the first of the month.
pub fn parse_login_threshold(input: &str) -> Option<NaiveDate> {
    let normalized = input.trim().replace('-', "/");
    let parts: Vec<&str> = normalized.split('/').collect();
    // chrono's %Y happily reads "24" as year 24, so pick the year format by width.
    let year_fmt = match parts.first().map(|y| y.len()) {
        Some(4) => "%Y",
        Some(2) => "%y",
        _ => return None,
    };
    let full = match parts.len() {
        3 => normalized.clone(),
        2 => format!("{normalized}/01"),
        _ => return None,
    };
    NaiveDate::parse_from_str(&full, &format!("{year_fmt}/%m/%d")).ok()
}

/// Finds the last-login date on a profile. The tab-bar area is tried first;
/// the header is searched for a labelled date and then for any date.
pub fn find_login_date(area_text: Option<&str>, header_text: Option<&str>) -> Option<NaiveDate> {
    let from_area = area_text.and_then(|t| any_date().captures(t));
    let raw = match from_area {
        Some(caps) => caps[1].to_string(),
        None => {
            let header = header_text?;
            labelled_date()
                .captures(header)
                .or_else(|| any_date().captures(header))
                .map(|caps| caps[1].to_string())?
        }
    };
    NaiveDate::parse_from_str(&raw, "%Y/%m/%d").ok()
}

pub fn format_login_date(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_threshold_formats() {
        assert_eq!(parse_login_threshold("2024/03/05"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_login_threshold("2024-03-05"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_login_threshold("24/3/5"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_login_threshold("2024/03"), Some(ymd(2024, 3, 1)));
        assert_eq!(parse_login_threshold("24/3"), Some(ymd(2024, 3, 1)));
    }

    #[test]
    fn test_threshold_rejects_blank_and_garbage() {
        assert_eq!(parse_login_threshold(""), None);
        assert_eq!(parse_login_threshold("   "), None);
        assert_eq!(parse_login_threshold("last week"), None);
    }

    #[test]
    fn test_find_login_date_prefers_area() {
        let found = find_login_date(Some("最近活跃 2025/09/30"), Some("最后登录 2020/01/01"));
        assert_eq!(found, Some(ymd(2025, 9, 30)));
    }

    #[test]
    fn test_find_login_date_falls_back_to_labelled_header() {
        let header = "更新于 2019/01/01 ... 最后登录：2025/10/02";
        assert_eq!(find_login_date(Some("no date"), Some(header)), Some(ymd(2025, 10, 2)));
    }

    #[test]
    fn test_find_login_date_any_header_date() {
        assert_eq!(
            find_login_date(None, Some("活跃 2024/12/31")),
            Some(ymd(2024, 12, 31))
        );
        assert_eq!(find_login_date(None, Some("nothing")), None);
        assert_eq!(find_login_date(None, None), None);
    }

    #[test]
    fn test_format_login_date() {
        assert_eq!(format_login_date(ymd(2026, 1, 9)), "2026/01/09");
    }
}
