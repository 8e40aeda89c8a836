//! Tenure intervals: normalizing scraped date ranges and comparing their ends.
//!
//! Canonical form is "YY/M-YY/M" or "YY/M-Present". Each side encodes to an
//! integer `year * 100 + month`, with "Present" above every real month.

use std::sync::OnceLock;

use regex::Regex;

pub const PRESENT: &str = "Present";

/// Encoded value of "Present". Exceeds every `YY/M` encoding (max 9912).
pub const PRESENT_VALUE: u32 = 999_999;

fn month_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{2})/(\d{1,2})").expect("valid regex"))
}

fn range_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(\d{4})\.(\d{1,2})\s*-\s*(\d{4})\.(\d{1,2})|(\d{4})\.(\d{1,2})\s*-\s*(至今|to present|present)",
        )
        .expect("valid regex")
    })
}

fn open_end_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s*-\s*(?:至今|to present|present)").expect("valid regex"))
}

fn year_month() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})\.(\d{1,2})").expect("valid regex"))
}

/// Maps "Present" or a "YY/M" token to a comparable integer.
/// Anything unparseable maps to 0, the earliest possible value.
pub fn encode(token: &str) -> u32 {
    let token = token.trim();
    if token.eq_ignore_ascii_case(PRESENT) {
        return PRESENT_VALUE;
    }
    let Some(caps) = month_token().captures(token) else {
        return 0;
    };
    let year: u32 = caps[1].parse().unwrap_or(0);
    let month: u32 = caps[2].parse().unwrap_or(0);
    if !(1..=12).contains(&month) {
        return 0;
    }
    year * 100 + month
}

/// Normalizes scraped text such as "（2021.03 - 2024.07，3年4个月）" to
/// "21/3-24/7". Text that matches neither form comes back cleaned but
/// otherwise unchanged.
pub fn normalize(raw: &str) -> String {
    let cleaned = clean(raw);

    if let Some(caps) = range_pattern().captures(&cleaned) {
        if let (Some(sy), Some(sm), Some(ey), Some(em)) =
            (caps.get(1), caps.get(2), caps.get(3), caps.get(4))
        {
            return format!(
                "{}/{}-{}/{}",
                short_year(sy.as_str()),
                plain_month(sm.as_str()),
                short_year(ey.as_str()),
                plain_month(em.as_str())
            );
        }
        if let (Some(sy), Some(sm)) = (caps.get(5), caps.get(6)) {
            return format!(
                "{}/{}-{PRESENT}",
                short_year(sy.as_str()),
                plain_month(sm.as_str())
            );
        }
    }

    // Permissive fallback: an open range whose start is loosely formatted.
    if open_end_marker().is_match(&cleaned) {
        let start = open_end_marker().split(&cleaned).next().unwrap_or_default();
        if let Some(caps) = year_month().captures(start) {
            return format!(
                "{}/{}-{PRESENT}",
                short_year(&caps[1]),
                plain_month(&caps[2])
            );
        }
    }

    cleaned
}

/// True when the interval's end is not before `min_end` ("YY/M" or "Present").
pub fn is_tenure_ok(tenure: &str, min_end: &str) -> bool {
    encode(end_token(tenure)) >= encode(min_end)
}

/// Right-hand side of the interval, or the whole string without a separator.
pub fn end_token(tenure: &str) -> &str {
    match tenure.split_once('-') {
        Some((_, end)) => end.trim(),
        None => tenure.trim(),
    }
}

/// Accepts "Present" or a "YY/M" token as a tenure threshold.
pub fn is_valid_threshold(token: &str) -> bool {
    encode(token) > 0
}

fn clean(raw: &str) -> String {
    let trimmed = raw
        .trim()
        .trim_matches(|c| matches!(c, '（' | '）' | '(' | ')'))
        .trim();
    let without_duration = trimmed
        .split([',', '，'])
        .next()
        .unwrap_or_default()
        .trim();
    without_duration.to_string()
}

fn short_year(year: &str) -> &str {
    &year[year.len().saturating_sub(2)..]
}

fn plain_month(month: &str) -> u32 {
    month.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_present_and_tokens() {
        assert_eq!(encode("Present"), PRESENT_VALUE);
        assert_eq!(encode(" present "), PRESENT_VALUE);
        assert_eq!(encode("21/3"), 2103);
        assert_eq!(encode("24/12"), 2412);
    }

    #[test]
    fn test_encode_unparseable_is_zero() {
        assert_eq!(encode(""), 0);
        assert_eq!(encode("garbage"), 0);
        assert_eq!(encode("24/13"), 0);
        assert_eq!(encode("24/0"), 0);
    }

    #[test]
    fn test_encode_preserves_calendar_order() {
        let mut tokens = Vec::new();
        for year in 0..100 {
            for month in 1..=12 {
                tokens.push(((year, month), format!("{year:02}/{month}")));
            }
        }
        for window in tokens.windows(2) {
            let (earlier, later) = (&window[0], &window[1]);
            assert!(earlier.0 < later.0);
            assert!(encode(&earlier.1) < encode(&later.1), "{} vs {}", earlier.1, later.1);
            assert!(encode(PRESENT) > encode(&later.1));
        }
    }

    #[test]
    fn test_normalize_closed_range_with_duration() {
        assert_eq!(normalize("（2021.03 - 2024.07，3年4个月）"), "21/3-24/7");
        assert_eq!(normalize("(2019.11-2020.2, 3 months)"), "19/11-20/2");
    }

    #[test]
    fn test_normalize_open_range() {
        assert_eq!(normalize("2022.01 - 至今"), "22/1-Present");
        assert_eq!(normalize("2022.01 - To Present"), "22/1-Present");
        assert_eq!(normalize("（2018.10 - PRESENT，6年）"), "18/10-Present");
    }

    #[test]
    fn test_normalize_unparseable_passes_through() {
        assert_eq!(normalize("garbage"), "garbage");
        assert_eq!(normalize(&normalize("garbage")), "garbage");
        assert_eq!(normalize("（未填写）"), "未填写");
    }

    #[test]
    fn test_normalize_is_idempotent_on_canonical_output() {
        let once = normalize("2021.03 - 2024.07");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn test_is_tenure_ok() {
        assert!(is_tenure_ok("21/3-24/7", "24/1"));
        assert!(!is_tenure_ok("21/3-23/1", "24/1"));
        assert!(is_tenure_ok("21/3-Present", "24/1"));
        assert!(is_tenure_ok("21/3-Present", "Present"));
        assert!(!is_tenure_ok("21/3-24/7", "Present"));
    }

    #[test]
    fn test_non_conforming_tenure_fails_recency() {
        assert!(!is_tenure_ok("garbage", "24/1"));
        assert!(!is_tenure_ok("", "20/1"));
    }

    #[test]
    fn test_end_token_without_separator() {
        assert_eq!(end_token("24/7"), "24/7");
        assert_eq!(end_token("21/3 - Present"), "Present");
    }

    #[test]
    fn test_threshold_validation() {
        assert!(is_valid_threshold("Present"));
        assert!(is_valid_threshold("24/1"));
        assert!(!is_valid_threshold("2024"));
    }
}
