//! Per-employer zip bundles of the resume documents accepted in a run.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::AppError;
use crate::output::{sanitize_component, unique_path};

/// `"<source>-<employer>-<n>份-<label>"`
pub fn bundle_stem(source_label: &str, employer: &str, count: usize, zip_label: &str) -> String {
    format!(
        "{}-{}-{count}份-{}",
        sanitize_component(source_label),
        sanitize_component(employer),
        sanitize_component(zip_label)
    )
}

/// Zips `files` into a new archive under `dir`. Files that disappeared
/// since they were written are skipped and not counted in the name.
pub fn bundle_employer(
    dir: &Path,
    source_label: &str,
    employer: &str,
    zip_label: &str,
    files: &[PathBuf],
) -> Result<Option<PathBuf>, AppError> {
    let sources: Vec<(&str, File)> = files
        .iter()
        .filter_map(|file| {
            let name = file.file_name().and_then(|n| n.to_str())?;
            match File::open(file) {
                Ok(source) => Some((name, source)),
                Err(e) => {
                    warn!("Skipping {} in bundle: {e}", file.display());
                    None
                }
            }
        })
        .collect();
    if sources.is_empty() {
        return Ok(None);
    }

    std::fs::create_dir_all(dir)?;
    let count = sources.len();
    let stem = bundle_stem(source_label, employer, count, zip_label);
    let path = unique_path(dir, &stem, "zip");

    let mut zip = ZipWriter::new(File::create(&path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, mut source) in sources {
        zip.start_file(name, options)?;
        io::copy(&mut source, &mut zip)?;
    }
    zip.finish()?;

    info!("Bundled {count} documents into {}", path.display());
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;

    #[test]
    fn test_bundle_contains_every_document() {
        let dir = tempfile::tempdir().unwrap();
        let resumes = dir.path().join("resumes");
        fs::create_dir_all(&resumes).unwrap();
        let a = resumes.join("1-猎聘-张先生.html");
        let b = resumes.join("2-猎聘-李女士.html");
        fs::write(&a, "<p>a</p>").unwrap();
        fs::write(&b, "<p>b</p>").unwrap();

        let zips = dir.path().join("zips");
        let path = bundle_employer(&zips, "猎聘", "Acme", "ZTZ", &[a, b])
            .unwrap()
            .unwrap();
        assert!(path.ends_with("猎聘-Acme-2份-ZTZ.zip"));

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
        let mut body = String::new();
        archive
            .by_name("2-猎聘-李女士.html")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "<p>b</p>");
    }

    #[test]
    fn test_bundle_name_collision_gets_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("1.html");
        fs::write(&doc, "x").unwrap();

        let first = bundle_employer(dir.path(), "猎聘", "Acme", "ZTZ", &[doc.clone()])
            .unwrap()
            .unwrap();
        let second = bundle_employer(dir.path(), "猎聘", "Acme", "ZTZ", &[doc])
            .unwrap()
            .unwrap();
        assert_ne!(first, second);
        assert!(second.ends_with("猎聘-Acme-1份-ZTZ-1.zip"));
    }

    #[test]
    fn test_missing_documents_not_counted_in_name() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("1-猎聘-张先生.docx");
        fs::write(&kept, "x").unwrap();
        let gone = dir.path().join("2-猎聘-李女士.docx");

        let zips = dir.path().join("zips");
        let path = bundle_employer(&zips, "猎聘", "Acme", "ZTZ", &[kept, gone.clone()])
            .unwrap()
            .unwrap();
        assert!(path.ends_with("猎聘-Acme-1份-ZTZ.zip"));
        let archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);

        assert!(bundle_employer(&zips, "猎聘", "Acme", "ZTZ", &[gone])
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_no_documents_no_bundle() {
        let dir = tempfile::tempdir().unwrap();
        assert!(bundle_employer(dir.path(), "猎聘", "Acme", "ZTZ", &[])
            .unwrap()
            .is_none());
    }
}
