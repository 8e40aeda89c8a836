use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const DEFAULT_LLM_API_URL: &str = "https://ark.cn-beijing.volces.com/api/v3/chat/completions";
const DEFAULT_LLM_MODEL: &str = "doubao-seed-1-6-lite-251015";
const DEFAULT_SEARCH_URL: &str = "https://h.liepin.com/search/getConditionItem";
const DEFAULT_SOURCE_LABEL: &str = "猎聘";

/// Process configuration loaded from environment variables.
/// The LLM key is optional here; `run` demands it through `require_llm_api_key`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub llm_api_key: Option<String>,
    pub llm_api_url: String,
    pub llm_model: String,
    pub workdir: PathBuf,
    pub search_url: String,
    pub source_label: String,
    pub rust_log: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let llm_api_key = optional_env("LLM_API_KEY").or_else(|| optional_env("VOLC_SECRETKEY"));

        Ok(Settings {
            llm_api_key,
            llm_api_url: env_or("LLM_API_URL", DEFAULT_LLM_API_URL),
            llm_model: env_or("LLM_MODEL", DEFAULT_LLM_MODEL),
            workdir: PathBuf::from(env_or("SCOUT_WORKDIR", ".")),
            search_url: env_or("SCOUT_SEARCH_URL", DEFAULT_SEARCH_URL),
            source_label: env_or("SCOUT_SOURCE_LABEL", DEFAULT_SOURCE_LABEL),
            rust_log: env_or("RUST_LOG", "info"),
        })
    }

    pub fn with_workdir(mut self, workdir: Option<PathBuf>) -> Self {
        if let Some(dir) = workdir {
            self.workdir = dir;
        }
        self
    }

    pub fn require_llm_api_key(&self) -> Result<&str> {
        self.llm_api_key
            .as_deref()
            .context("Required environment variable 'LLM_API_KEY' (or 'VOLC_SECRETKEY') is not set")
    }

    pub fn layout(&self) -> OutputLayout {
        OutputLayout::new(&self.workdir)
    }
}

/// Directory layout of everything a run reads or produces.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub data_dir: PathBuf,
    pub resumes_dir: PathBuf,
    pub zips_dir: PathBuf,
    pub session_file: PathBuf,
}

impl OutputLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            data_dir: root.join("data"),
            resumes_dir: root.join("resumes"),
            zips_dir: root.join("zips"),
            session_file: root.join("state.json"),
        }
    }

    pub fn output_dirs(&self) -> [&Path; 3] {
        [&self.data_dir, &self.resumes_dir, &self.zips_dir]
    }

    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in self.output_dirs() {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    optional_env(key).unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_places_everything_under_root() {
        let layout = OutputLayout::new(Path::new("/work"));
        assert_eq!(layout.data_dir, PathBuf::from("/work/data"));
        assert_eq!(layout.resumes_dir, PathBuf::from("/work/resumes"));
        assert_eq!(layout.zips_dir, PathBuf::from("/work/zips"));
        assert_eq!(layout.session_file, PathBuf::from("/work/state.json"));
    }

    #[test]
    fn test_with_workdir_overrides_only_when_given() {
        let settings = Settings {
            llm_api_key: None,
            llm_api_url: DEFAULT_LLM_API_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            workdir: PathBuf::from("."),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            source_label: DEFAULT_SOURCE_LABEL.to_string(),
            rust_log: "info".to_string(),
        };
        let kept = settings.clone().with_workdir(None);
        assert_eq!(kept.workdir, PathBuf::from("."));
        let moved = settings.with_workdir(Some(PathBuf::from("/tmp/x")));
        assert_eq!(moved.workdir, PathBuf::from("/tmp/x"));
        assert!(moved.require_llm_api_key().is_err());
    }
}
