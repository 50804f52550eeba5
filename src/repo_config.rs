//! Repository-level configuration.
//!
//! Handles loading and parsing `.proptune.toml` files from the project under
//! study. This configuration controls how property tests are recognised and
//! which command runs them.

use serde::Deserialize;
use std::path::Path;

use crate::extract::{AttributeMarker, ExtractOptions};

const FILE_NAME: &str = ".proptune.toml";

/// Repository-level configuration loaded from `.proptune.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    /// Attribute names that mark a property test. Default: `["proptest"]`.
    #[serde(default = "default_markers")]
    pub markers: Vec<String>,

    /// Crates whose imports never make a test require external packages.
    #[serde(default = "default_testing_libraries")]
    pub testing_libraries: Vec<String>,

    /// Glob patterns, relative to the project root, left out of extraction.
    #[serde(default)]
    pub skip: Vec<String>,

    /// Shell command replacing `cargo test`. Supports `{locator}`, `{unit}`,
    /// `{name}` and `{report}` placeholders and must write a JSON report.
    #[serde(default)]
    pub test_command: Option<String>,

    /// Per-run timeout override in seconds.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

fn default_markers() -> Vec<String> {
    vec!["proptest".to_string()]
}

fn default_testing_libraries() -> Vec<String> {
    vec!["proptest".to_string(), "test_strategy".to_string()]
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            markers: default_markers(),
            testing_libraries: default_testing_libraries(),
            skip: Vec::new(),
            test_command: None,
            timeout_seconds: None,
        }
    }
}

impl RepoConfig {
    /// Check if `.proptune.toml` exists in the repository.
    pub fn exists(repo_path: &Path) -> bool {
        repo_path.join(FILE_NAME).exists()
    }

    /// Load configuration from `.proptune.toml`.
    ///
    /// Returns `None` if the file doesn't exist or is invalid, and the
    /// default config if it is empty or whitespace-only.
    pub fn load(repo_path: &Path) -> Option<Self> {
        let config_path = repo_path.join(FILE_NAME);
        if !config_path.exists() {
            return None;
        }
        let content = std::fs::read_to_string(&config_path).ok()?;
        if content.trim().is_empty() {
            return Some(Self::default());
        }
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Ignoring invalid {}: {}", config_path.display(), e);
                None
            }
        }
    }

    /// [`RepoConfig::load`], falling back to defaults.
    pub fn load_or_default(repo_path: &Path) -> Self {
        Self::load(repo_path).unwrap_or_default()
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            marker: Box::new(AttributeMarker::new(self.markers.iter().cloned())),
            skip: self.skip.clone(),
            testing_libraries: self.testing_libraries.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_exists_returns_false_when_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert!(!RepoConfig::exists(temp_dir.path()));
    }

    #[test]
    fn test_exists_returns_true_when_present() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(".proptune.toml"), "").unwrap();
        assert!(RepoConfig::exists(temp_dir.path()));
    }

    #[test]
    fn test_load_returns_none_when_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert!(RepoConfig::load(temp_dir.path()).is_none());
    }

    #[test]
    fn test_load_whitespace_only_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(".proptune.toml"), "   \n\n  ").unwrap();

        let config = RepoConfig::load(temp_dir.path()).unwrap();
        assert_eq!(config.markers, vec!["proptest"]);
        assert_eq!(config.testing_libraries, vec!["proptest", "test_strategy"]);
        assert!(config.skip.is_empty());
        assert!(config.test_command.is_none());
    }

    #[test]
    fn test_load_valid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_content = r#"
markers = ["proptest", "quickcheck"]
skip = ["benches/**", "fuzz/**"]
test_command = "./run-one.sh {locator} {report}"
timeout_seconds = 60
"#;
        std::fs::write(temp_dir.path().join(".proptune.toml"), config_content).unwrap();

        let config = RepoConfig::load(temp_dir.path()).unwrap();
        assert_eq!(config.markers, vec!["proptest", "quickcheck"]);
        assert_eq!(config.skip.len(), 2);
        assert_eq!(
            config.test_command.as_deref(),
            Some("./run-one.sh {locator} {report}")
        );
        assert_eq!(config.timeout_seconds, Some(60));
        // not set, keeps its default
        assert_eq!(config.testing_libraries, vec!["proptest", "test_strategy"]);
    }

    #[test]
    fn test_load_invalid_toml_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(".proptune.toml"), "invalid {{{{ toml").unwrap();

        assert!(RepoConfig::load(temp_dir.path()).is_none());
        assert!(RepoConfig::load_or_default(temp_dir.path()).test_command.is_none());
    }

    #[test]
    fn test_custom_marker_reaches_extraction() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(".proptune.toml"),
            "markers = [\"quickcheck\"]\n",
        )
        .unwrap();
        std::fs::create_dir_all(temp_dir.path().join("src")).unwrap();
        std::fs::write(
            temp_dir.path().join("src/lib.rs"),
            "#[quickcheck]\nfn qc_rev(xs: Vec<u8>) -> bool { true }\n\n#[proptest]\nfn prop_rev(xs: Vec<u8>) {}\n",
        )
        .unwrap();

        let options = RepoConfig::load_or_default(temp_dir.path()).extract_options();
        let index = crate::extract::ProjectIndex::load(temp_dir.path(), &options).unwrap();
        let names: Vec<&str> = index
            .find_property_tests()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["qc_rev"]);
    }
}
