use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{Config, DEFAULT_MINIMUM_ISSUE_PAGES};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),

    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("setting {key} ({value:?}) is not a directory")]
    NotADirectory { key: &'static str, value: String },

    #[error("setting {key} ({value:?}) is not a valid number")]
    InvalidNumber { key: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

pub(crate) fn parse(path: &Path) -> Result<Config> {
    let raw = read_settings_file(path)?;

    let config = Config {
        db_path: PathBuf::from(require(&raw, "DB_PATH")?),
        ghostscript: tool(&raw, "GHOSTSCRIPT", "gs"),
        pdf_separate: tool(&raw, "PDF_SEPARATE", "pdfseparate"),
        derivative_builder: tool(&raw, "DERIVATIVE_BUILDER", "make-derivatives"),
        pdf_batch_marc_org_code: require(&raw, "PDF_BATCH_MARC_ORG_CODE")?.to_string(),
        workflow_path: dir(&raw, "WORKFLOW_PATH")?,
        page_review_path: dir(&raw, "PDF_PAGE_REVIEW_PATH")?,
        master_backup_path: dir(&raw, "MASTER_PDF_BACKUP_PATH")?,
        batch_output_path: dir(&raw, "BATCH_OUTPUT_PATH")?,
        minimum_issue_pages: number(&raw, "MINIMUM_ISSUE_PAGES", DEFAULT_MINIMUM_ISSUE_PAGES)?,
    };

    Ok(config)
}

/// Reads the dotenv-format settings file into a map without touching the
/// process environment.
pub fn read_settings_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for entry in dotenvy::from_path_iter(path)? {
        let (key, value) = entry?;
        map.insert(key, value);
    }
    Ok(map)
}

fn require<'a>(raw: &'a BTreeMap<String, String>, key: &'static str) -> Result<&'a str> {
    match raw.get(key).map(String::as_str) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn tool(raw: &BTreeMap<String, String>, key: &str, default: &str) -> PathBuf {
    match raw.get(key) {
        Some(v) if !v.is_empty() => PathBuf::from(v),
        _ => PathBuf::from(default),
    }
}

fn dir(raw: &BTreeMap<String, String>, key: &'static str) -> Result<PathBuf> {
    let value = require(raw, key)?;
    let path = PathBuf::from(value);
    if !path.is_dir() {
        return Err(ConfigError::NotADirectory {
            key,
            value: value.to_string(),
        });
    }
    Ok(path)
}

fn number(raw: &BTreeMap<String, String>, key: &'static str, default: usize) -> Result<usize> {
    match raw.get(key) {
        Some(v) if !v.is_empty() => v.parse().map_err(|_| ConfigError::InvalidNumber {
            key,
            value: v.clone(),
        }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn write_config(dir: &Path, extra: &str) -> PathBuf {
        let workflow = dir.join("workflow");
        let review = dir.join("page-review");
        let backup = dir.join("backup");
        let batches = dir.join("batches");
        for p in [&workflow, &review, &backup, &batches] {
            fs::create_dir_all(p).unwrap();
        }

        let path = dir.join("settings");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "# presswork settings").unwrap();
        writeln!(f, "DB_PATH={}", dir.join("presswork.db").display()).unwrap();
        writeln!(f, "PDF_BATCH_MARC_ORG_CODE=oru").unwrap();
        writeln!(f, "WORKFLOW_PATH=\"{}\"", workflow.display()).unwrap();
        writeln!(f, "PDF_PAGE_REVIEW_PATH={}", review.display()).unwrap();
        writeln!(f, "MASTER_PDF_BACKUP_PATH={}", backup.display()).unwrap();
        writeln!(f, "BATCH_OUTPUT_PATH={}", batches.display()).unwrap();
        writeln!(f, "{extra}").unwrap();
        path
    }

    #[test]
    fn parses_a_complete_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "MINIMUM_ISSUE_PAGES=3\nGHOSTSCRIPT=/opt/gs/bin/gs");

        let config = Config::parse(&path).unwrap();
        assert_eq!(config.pdf_batch_marc_org_code, "oru");
        assert_eq!(config.minimum_issue_pages, 3);
        assert_eq!(config.ghostscript, PathBuf::from("/opt/gs/bin/gs"));
        // Quoted value unwrapped by the dotenv parser
        assert_eq!(config.workflow_path, dir.path().join("workflow"));
    }

    #[test]
    fn tools_default_to_path_lookup_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "");
        let config = Config::parse(&path).unwrap();
        assert_eq!(config.ghostscript, PathBuf::from("gs"));
        assert_eq!(config.pdf_separate, PathBuf::from("pdfseparate"));
        assert_eq!(config.minimum_issue_pages, DEFAULT_MINIMUM_ISSUE_PAGES);
    }

    #[test]
    fn missing_path_setting_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings");
        fs::write(&path, "DB_PATH=/tmp/x.db\n").unwrap();
        assert!(matches!(
            Config::parse(&path),
            Err(ConfigError::Missing("PDF_BATCH_MARC_ORG_CODE"))
        ));
    }

    #[test]
    fn nonexistent_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "WORKFLOW_PATH=/nonexistent/workflow");
        assert!(matches!(
            Config::parse(&path),
            Err(ConfigError::NotADirectory { key: "WORKFLOW_PATH", .. })
        ));
    }

    #[test]
    fn missing_settings_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::parse(&dir.path().join("nope")),
            Err(ConfigError::EnvFile(_))
        ));
    }

    #[test]
    fn malformed_lines_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings");
        fs::write(&path, "DB_PATH=/tmp/x.db\nnot a setting\n").unwrap();
        assert!(matches!(
            read_settings_file(&path),
            Err(ConfigError::EnvFile(_))
        ));
    }

    #[test]
    fn bad_number_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "MINIMUM_ISSUE_PAGES=lots");
        assert!(matches!(
            Config::parse(&path),
            Err(ConfigError::InvalidNumber { key: "MINIMUM_ISSUE_PAGES", .. })
        ));
    }
}
