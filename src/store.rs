use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::StoreConfig;
use crate::errors::{ScreenFlowError, ScreenFlowResult};
use crate::graph::document::ConfigDocument;

/// What the store knows about one application document on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub app_name: String,
    pub package_name: String,
    pub path: PathBuf,
    pub node_count: usize,
    pub function_count: usize,
}

/// Index of application documents found under a set of directories.
pub struct ConfigStore {
    directories: Vec<PathBuf>,
    entries: BTreeMap<String, ConfigSummary>,
}

impl ConfigStore {
    pub fn new(directories: Vec<PathBuf>) -> Self {
        Self {
            directories,
            entries: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.directories.clone())
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rescans every directory. The first document seen for a package wins.
    pub async fn refresh(&mut self) -> ScreenFlowResult<usize> {
        self.entries.clear();
        for dir in self.directories.clone() {
            if !dir.exists() {
                tracing::debug!(dir = %dir.display(), "config directory does not exist, skipping");
                continue;
            }
            self.scan_dir(&dir).await?;
        }
        tracing::info!(configs = self.entries.len(), "config store refreshed");
        Ok(self.entries.len())
    }

    async fn scan_dir(&mut self, dir: &Path) -> ScreenFlowResult<()> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if path.is_dir() {
                        Box::pin(self.scan_dir(&path)).await?;
                    } else if path.extension().is_some_and(|ext| ext == "json") {
                        if let Err(e) = self.index_file(&path).await {
                            tracing::warn!(path = %path.display(), error = %e, "skipping unreadable config");
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "failed to read directory entry");
                    continue;
                }
            }
        }
        Ok(())
    }

    async fn index_file(&mut self, path: &Path) -> ScreenFlowResult<()> {
        let content = tokio::fs::read_to_string(path).await?;
        let doc = ConfigDocument::from_json(&content)?;
        if let Some(existing) = self.entries.get(&doc.package_name) {
            tracing::warn!(
                package = %doc.package_name,
                kept = %existing.path.display(),
                ignored = %path.display(),
                "duplicate config for package"
            );
            return Ok(());
        }
        let summary = ConfigSummary {
            app_name: doc.app_name.clone(),
            package_name: doc.package_name.clone(),
            path: path.to_path_buf(),
            node_count: doc.nodes.len(),
            function_count: doc.functions.len(),
        };
        tracing::debug!(package = %summary.package_name, path = %path.display(), "config indexed");
        self.entries.insert(doc.package_name, summary);
        Ok(())
    }

    /// Case-insensitive substring match on application or package name.
    /// An empty query lists everything.
    pub fn search(&self, query: &str) -> Vec<&ConfigSummary> {
        let needle = query.trim().to_lowercase();
        self.entries
            .values()
            .filter(|s| {
                needle.is_empty()
                    || s.app_name.to_lowercase().contains(&needle)
                    || s.package_name.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn get(&self, package_name: &str) -> Option<&ConfigSummary> {
        self.entries.get(package_name)
    }

    pub async fn load(&self, package_name: &str) -> ScreenFlowResult<ConfigDocument> {
        let summary = self.entries.get(package_name).ok_or_else(|| {
            ScreenFlowError::Config(format!("no configuration stored for package '{package_name}'"))
        })?;
        let content = tokio::fs::read_to_string(&summary.path).await?;
        ConfigDocument::from_json(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    async fn store_with_fixtures() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("messaging");
        std::fs::create_dir_all(&nested).unwrap();
        write(
            dir.path(),
            "mail.json",
            r#"{"appName": "Mailer", "packageName": "com.example.mail", "nodes": [{"name": "Inbox"}]}"#,
        );
        write(
            &nested,
            "chat.json",
            r#"{"appName": "Chatter", "packageName": "com.example.chat", "functions": [{}, {}]}"#,
        );
        write(dir.path(), "broken.json", "{ not json");
        write(dir.path(), "notes.txt", "ignored");

        let mut store = ConfigStore::new(vec![dir.path().to_path_buf(), dir.path().join("missing")]);
        store.refresh().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn indexes_nested_json_and_skips_broken_files() {
        let (_dir, store) = store_with_fixtures().await;
        assert_eq!(store.len(), 2);
        let chat = store.get("com.example.chat").unwrap();
        assert_eq!(chat.app_name, "Chatter");
        assert_eq!(chat.function_count, 2);
    }

    #[tokio::test]
    async fn search_is_case_insensitive() {
        let (_dir, store) = store_with_fixtures().await;
        let hits: Vec<&str> = store.search("CHAT").iter().map(|s| s.package_name.as_str()).collect();
        assert_eq!(hits, vec!["com.example.chat"]);
        assert_eq!(store.search("example").len(), 2);
        assert_eq!(store.search("").len(), 2);
        assert!(store.search("calendar").is_empty());
    }

    #[tokio::test]
    async fn load_by_package() {
        let (_dir, store) = store_with_fixtures().await;
        let doc = store.load("com.example.mail").await.unwrap();
        assert_eq!(doc.nodes.len(), 1);
        assert!(store.load("com.example.none").await.is_err());
    }
}
