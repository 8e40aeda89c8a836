//! Everything a run writes: the spreadsheet, resume documents, per-employer
//! zip bundles, and the housekeeping of prior outputs.

use std::path::{Path, PathBuf};

pub mod archive;
pub mod checkpoint;
pub mod documents;
pub mod housekeeping;
pub mod workbook;

/// First free path among `stem.ext`, `stem-1.ext`, `stem-2.ext`, ...
pub fn unique_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let first = dir.join(format!("{stem}.{extension}"));
    if !first.exists() {
        return first;
    }
    (1..)
        .map(|n| dir.join(format!("{stem}-{n}.{extension}")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// Makes scraped text safe to use as one file-name component.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_unique_path_suffixes_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_path(dir.path(), "1-猎聘-张先生", "html");
        assert!(first.ends_with("1-猎聘-张先生.html"));
        fs::write(&first, "x").unwrap();

        let second = unique_path(dir.path(), "1-猎聘-张先生", "html");
        assert!(second.ends_with("1-猎聘-张先生-1.html"));
        fs::write(&second, "x").unwrap();

        assert!(unique_path(dir.path(), "1-猎聘-张先生", "html").ends_with("1-猎聘-张先生-2.html"));
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component(" A/B:C "), "A_B_C");
        assert_eq!(sanitize_component("张先生"), "张先生");
        assert_eq!(sanitize_component("  "), "unnamed");
    }
}
