//! Per-candidate resume documents.
//!
//! The profile page HTML is flattened into a `.docx`: block elements become
//! paragraphs, `<b>`/`<strong>`/`<th>` become bold runs and headings get a
//! larger size. Scripts, styles and images are dropped.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use docx_rs::{Docx, Paragraph, Run};
use scraper::{ElementRef, Html, Node};
use tracing::info;

use crate::errors::AppError;
use crate::output::{sanitize_component, unique_path};
use crate::retry::{retry_with_backoff, BackoffPolicy};

pub const EXTENSION: &str = "docx";

const DROPPED_ELEMENTS: [&str; 7] = ["head", "script", "style", "noscript", "img", "svg", "button"];
const BLOCK_ELEMENTS: [&str; 23] = [
    "address", "article", "aside", "br", "dd", "div", "dl", "dt", "footer", "h1", "h2", "h3", "h4",
    "h5", "h6", "header", "li", "ol", "p", "section", "table", "tr", "ul",
];
const BOLD_ELEMENTS: [&str; 3] = ["b", "strong", "th"];
const HEADING_ELEMENTS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];
/// Half-points, i.e. 14pt.
const HEADING_SIZE: usize = 28;

/// `"<seq>-<source>-<name>"`, the stem every resume file starts with.
pub fn document_stem(sequence: u64, source_label: &str, display_name: &str) -> String {
    format!(
        "{sequence}-{}-{}",
        sanitize_component(source_label),
        sanitize_component(display_name)
    )
}

/// Writes the resume document under `dir`, retrying per `policy`.
/// Returns the path written.
pub async fn save_resume(
    dir: &Path,
    stem: &str,
    html: &str,
    policy: &BackoffPolicy,
) -> Result<PathBuf, AppError> {
    let body = render_docx(&resume_blocks(html))?;
    let path = unique_path(dir, stem, EXTENSION);

    let outcome = retry_with_backoff(policy, "Resume save", |_| {
        let path = path.clone();
        let body = body.clone();
        async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, body).await
        }
    })
    .await;

    let attempts = outcome.attempts();
    outcome
        .into_result()
        .map_err(|e| AppError::persistence(&path, e))?;
    info!("Saved resume {} (attempts: {attempts})", path.display());
    Ok(path)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub bold: bool,
}

/// One output paragraph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub spans: Vec<Span>,
    pub heading: bool,
}

impl Block {
    #[cfg(test)]
    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }
}

/// Paragraphs of the page's visible text, whitespace collapsed.
pub fn resume_blocks(html: &str) -> Vec<Block> {
    let document = Html::parse_document(html);
    let mut collector = Collector::default();
    collector.walk(document.root_element(), false, false);
    collector.end_block();
    collector.blocks
}

#[derive(Default)]
struct Collector {
    blocks: Vec<Block>,
    current: Block,
    pending_space: bool,
}

impl Collector {
    fn walk(&mut self, element: ElementRef<'_>, bold: bool, heading: bool) {
        let tag = element.value().name();
        if DROPPED_ELEMENTS.contains(&tag) {
            return;
        }
        let block = BLOCK_ELEMENTS.contains(&tag);
        if block {
            self.end_block();
        }
        if tag == "br" {
            return;
        }
        let heading = heading || HEADING_ELEMENTS.contains(&tag);
        let bold = bold || heading || BOLD_ELEMENTS.contains(&tag);

        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.push_text(text, bold, heading),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.walk(child, bold, heading);
                    }
                }
                _ => {}
            }
        }

        if block {
            self.end_block();
        }
    }

    fn push_text(&mut self, raw: &str, bold: bool, heading: bool) {
        let words: Vec<&str> = raw.split_whitespace().collect();
        if words.is_empty() {
            self.pending_space |= !raw.is_empty();
            return;
        }
        let mut text = String::new();
        if (self.pending_space || raw.starts_with(char::is_whitespace)) && !self.current.spans.is_empty() {
            text.push(' ');
        }
        text.push_str(&words.join(" "));
        self.pending_space = raw.ends_with(char::is_whitespace);
        self.current.heading |= heading;

        match self.current.spans.last_mut() {
            Some(last) if last.bold == bold => last.text.push_str(&text),
            _ => self.current.spans.push(Span { text, bold }),
        }
    }

    fn end_block(&mut self) {
        self.pending_space = false;
        let block = std::mem::take(&mut self.current);
        if !block.spans.is_empty() {
            self.blocks.push(block);
        }
    }
}

/// Packs `blocks` into `.docx` bytes.
pub fn render_docx(blocks: &[Block]) -> Result<Vec<u8>, AppError> {
    let mut docx = Docx::new();
    for block in blocks {
        let mut paragraph = Paragraph::new();
        for span in &block.spans {
            let mut run = Run::new().add_text(span.text.as_str());
            if span.bold {
                run = run.bold();
            }
            if block.heading {
                run = run.size(HEADING_SIZE);
            }
            paragraph = paragraph.add_run(run);
        }
        docx = docx.add_paragraph(paragraph);
    }

    let mut buffer = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buffer)
        .map_err(|e| AppError::Document(e.to_string()))?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::time::Duration;

    const PAGE: &str = r#"<html><head><style>.x{}</style><script>alert(1)</script></head>
<body><div style="color:red" class="resume"><h3>张三</h3>
<p>Acme &amp; Co   <b>PM</b><br>2020.01 - 至今</p>
<img src="data:image/png;base64,AAAA"><ul><li>payments</li><li>risk</li></ul></div></body></html>"#;

    fn document_xml(bytes: Vec<u8>) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        xml
    }

    #[test]
    fn test_blocks_follow_page_structure() {
        let blocks = resume_blocks(PAGE);
        let texts: Vec<String> = blocks.iter().map(Block::text).collect();
        assert_eq!(texts, ["张三", "Acme & Co PM", "2020.01 - 至今", "payments", "risk"]);
        assert!(blocks[0].heading);
        assert_eq!(
            blocks[1].spans,
            vec![
                Span { text: "Acme & Co".to_string(), bold: false },
                Span { text: " PM".to_string(), bold: true },
            ]
        );
    }

    #[test]
    fn test_blocks_drop_scripts_and_styles() {
        let texts: Vec<String> = resume_blocks(PAGE).iter().map(Block::text).collect();
        assert!(texts.iter().all(|t| !t.contains("alert") && !t.contains(".x{}")));
    }

    #[test]
    fn test_render_docx_holds_text() {
        let xml = document_xml(render_docx(&resume_blocks(PAGE)).unwrap());
        assert!(xml.contains("张三"));
        assert!(xml.contains("2020.01 - 至今"));
        assert!(!xml.contains("alert"));
    }

    #[test]
    fn test_document_stem() {
        assert_eq!(document_stem(3, "猎聘", "张先生"), "3-猎聘-张先生");
        assert_eq!(document_stem(1, "猎聘", "A/B"), "1-猎聘-A_B");
    }

    #[tokio::test]
    async fn test_save_resume_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let policy = BackoffPolicy::constant(3, Duration::ZERO);
        let first = save_resume(dir.path(), "1-猎聘-张先生", PAGE, &policy).await.unwrap();
        let second = save_resume(dir.path(), "1-猎聘-张先生", PAGE, &policy).await.unwrap();
        assert_ne!(first, second);
        assert!(first.ends_with("1-猎聘-张先生.docx"));
        assert!(second.ends_with("1-猎聘-张先生-1.docx"));
        assert!(document_xml(std::fs::read(&first).unwrap()).contains("payments"));
    }

    #[tokio::test]
    async fn test_save_resume_reports_persistence_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("resumes");
        std::fs::write(&blocker, "not a directory").unwrap();

        let policy = BackoffPolicy::constant(3, Duration::ZERO);
        let err = save_resume(&blocker, "1-猎聘-张先生", PAGE, &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence { .. }));
    }
}
