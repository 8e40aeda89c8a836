use std::sync::OnceLock;

use pinyin::ToPinyin;
use regex::Regex;

const MR: &str = "先生";
const MS: &str = "女士";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    fn honorific(self) -> &'static str {
        match self {
            Gender::Male => MR,
            Gender::Female => MS,
        }
    }
}

fn gender_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*(男|女)\s*").expect("valid regex"))
}

/// Reads the gender out of a profile's info line ("男 | 35岁 | 本科 ...").
pub fn parse_gender(info_text: &str) -> Option<Gender> {
    let caps = gender_marker().captures(info_text)?;
    match &caps[1] {
        "男" => Some(Gender::Male),
        "女" => Some(Gender::Female),
        _ => None,
    }
}

/// Removes the site's masking asterisks and surrounding whitespace.
pub fn strip_placeholders(name: &str) -> String {
    name.trim().replace('*', "")
}

/// Name as it appears in the spreadsheet.
///
/// With `initials_only` the surname becomes its pinyin initial plus an
/// honorific ("Z先生"); otherwise an honorific is appended when the gender is
/// known and the name does not carry one yet.
pub fn display_name(raw: &str, gender: Option<Gender>, initials_only: bool) -> String {
    let clean = strip_placeholders(raw);
    if initials_only {
        return initials(&clean, gender);
    }
    match gender {
        Some(g) if !clean.contains(MR) && !clean.contains(MS) => format!("{clean}{}", g.honorific()),
        _ => clean,
    }
}

fn initials(name: &str, gender: Option<Gender>) -> String {
    let Some(surname) = name.chars().next() else {
        return String::new();
    };
    let letter = surname
        .to_pinyin()
        .map(|p| p.first_letter().to_uppercase())
        .unwrap_or_else(|| surname.to_uppercase().to_string());
    match gender {
        Some(g) => format!("{letter}{}", g.honorific()),
        None => letter,
    }
}

/// Name component of the dedup signature: placeholders and honorifics removed.
pub fn signature_name(name: &str) -> String {
    strip_placeholders(name)
        .replace(MR, "")
        .replace(MS, "")
        .trim()
        .to_string()
}
