//! Output artifact and checkpoint files.
//!
//! Both are written atomically: serialized to a hidden temp file next to the
//! target, then renamed over it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use tocscraper_crawler::ScrapeSession;
use tocscraper_shared::{Result, ScrapeOutput, ScraperError};

/// `<dir>/<name>.json`
pub fn output_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.json"))
}

/// Write the final artifact for one source.
#[instrument(skip_all, fields(dir = %dir.display(), name = %name))]
pub fn write_output(dir: &Path, name: &str, output: &ScrapeOutput) -> Result<PathBuf> {
    let path = output_path(dir, name);
    write_json_atomic(&path, output)?;
    info!(
        path = %path.display(),
        sections = output.sections.len(),
        "wrote output"
    );
    Ok(path)
}

/// Pretty-print `data` to `path` via a temp file and rename.
fn write_json_atomic<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| ScraperError::io(dir, e))?;

    let json = serde_json::to_string_pretty(data)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.json".to_string());
    let temp = dir.join(format!(".{file_name}.tmp"));

    std::fs::write(&temp, json).map_err(|e| ScraperError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| ScraperError::io(path, e))?;
    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub key: String,
    pub html: String,
}

/// Leaf content captured so far for one source, so that an interrupted run
/// can be resumed without re-extracting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub source_url: String,
    pub output_name: String,
    pub updated_at: DateTime<Utc>,
    pub entries: Vec<CheckpointEntry>,
}

impl Checkpoint {
    /// `<dir>/<name>.checkpoint.json`
    pub fn path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.checkpoint.json"))
    }

    /// Snapshot the scraped keys of `session`.
    pub fn from_session(session: &ScrapeSession, output_name: &str) -> Self {
        Self {
            source_url: session.source_url().to_string(),
            output_name: output_name.to_string(),
            updated_at: Utc::now(),
            entries: session
                .scraped_entries()
                .into_iter()
                .map(|(key, html)| CheckpointEntry { key, html })
                .collect(),
        }
    }

    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = Self::path(dir, &self.output_name);
        write_json_atomic(&path, self)?;
        debug!(entries = self.entries.len(), "checkpoint written");
        Ok(path)
    }

    /// Load the checkpoint for `name`, or `None` if there is none.
    pub fn load(dir: &Path, name: &str) -> Result<Option<Self>> {
        let path = Self::path(dir, name);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ScraperError::io(&path, e)),
        };
        let checkpoint = serde_json::from_str(&content).map_err(|e| {
            ScraperError::Serialization(format!("invalid checkpoint {}: {e}", path.display()))
        })?;
        Ok(Some(checkpoint))
    }

    /// Delete the checkpoint for `name`. Missing files are fine.
    pub fn remove(dir: &Path, name: &str) -> Result<()> {
        let path = Self::path(dir, name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ScraperError::io(&path, e)),
        }
    }

    pub fn into_entries(self) -> impl Iterator<Item = (String, String)> {
        self.entries.into_iter().map(|e| (e.key, e.html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tocscraper_shared::{FlatSection, OutputMetadata, ScrapeStats};
    use url::Url;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tocscraper-output-test-{}",
            uuid::Uuid::now_v7()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn output() -> ScrapeOutput {
        ScrapeOutput {
            metadata: OutputMetadata {
                source_url: "https://codelibrary.amlegal.com/codes/town/latest".into(),
                output_name: "town".into(),
                scraper_name: "amlegal".into(),
                scraper_version: "0.1.0".into(),
                csv_file: None,
                scraped_at: Utc::now(),
                stats: ScrapeStats::default(),
            },
            sections: vec![
                FlatSection {
                    key: "D1".into(),
                    value: "Sec. 1".into(),
                    path: vec!["Sec. 1".into()],
                    depth: 0,
                    url: None,
                    has_children: false,
                    html: Some("<p>One</p>".into()),
                    html_error: None,
                },
                FlatSection {
                    key: "D2".into(),
                    value: "Sec. 2".into(),
                    path: vec!["Sec. 2".into()],
                    depth: 0,
                    url: None,
                    has_children: false,
                    html: None,
                    html_error: Some("timed out".into()),
                },
            ],
        }
    }

    #[test]
    fn output_strips_keys_and_uses_wire_names() {
        let tmp = temp_dir();
        let path = write_output(&tmp, "town", &output()).unwrap();
        assert_eq!(path, tmp.join("town.json"));
        assert!(!tmp.join(".town.json.tmp").exists());

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            value["metadata"]["sourceUrl"],
            "https://codelibrary.amlegal.com/codes/town/latest"
        );
        assert!(value["metadata"].get("csvFile").is_none());

        let first = &value["sections"][0];
        assert!(first.get("key").is_none());
        assert_eq!(first["has_children"], false);
        assert_eq!(first["html"], "<p>One</p>");
        assert!(first.get("htmlError").is_none());

        let second = &value["sections"][1];
        assert!(second.get("html").is_none());
        assert_eq!(second["htmlError"], "timed out");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn checkpoint_round_trip_and_removal() {
        let tmp = temp_dir();
        let mut session =
            ScrapeSession::new(Url::parse("https://library.municode.com/ca/town/codes").unwrap());
        session.record("S2", "<p>two</p>");
        session.record("S1", "<p>one</p>");

        let checkpoint = Checkpoint::from_session(&session, "town");
        checkpoint.write(&tmp).unwrap();

        let loaded = Checkpoint::load(&tmp, "town").unwrap().expect("checkpoint exists");
        assert_eq!(loaded.source_url, "https://library.municode.com/ca/town/codes");
        let keys: Vec<String> = loaded.into_entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["S1", "S2"]);

        Checkpoint::remove(&tmp, "town").unwrap();
        assert!(Checkpoint::load(&tmp, "town").unwrap().is_none());
        // Removing twice is fine.
        Checkpoint::remove(&tmp, "town").unwrap();

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn corrupt_checkpoint_is_an_error() {
        let tmp = temp_dir();
        std::fs::write(Checkpoint::path(&tmp, "town"), "{not json").unwrap();
        let err = Checkpoint::load(&tmp, "town").unwrap_err();
        assert!(matches!(err, ScraperError::Serialization(_)));
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
