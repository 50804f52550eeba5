//! Disposable project copies.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::extract::find_source_files;

/// Top-level entries never copied: build output and VCS metadata.
const EXCLUDED_ENTRIES: &[&str] = &["target", ".git"];

/// A throwaway clone of a project, owned by one session.
///
/// Layout inside the temp dir: `project/` holds the copied sources, `target/`
/// is the cargo build directory and `reports/` collects runner reports. The
/// whole tree is removed when the copy is dropped.
#[derive(Debug)]
pub struct WorkingCopy {
    dir: TempDir,
    project: PathBuf,
    sources: Vec<PathBuf>,
    runs: AtomicUsize,
}

impl WorkingCopy {
    /// Copy `root` into a fresh temp dir.
    pub async fn create(root: &Path) -> Result<Self> {
        let root = root.to_path_buf();

        // fs_extra is synchronous
        let dir = tokio::task::spawn_blocking(move || -> Result<TempDir> {
            let dir = tempfile::TempDir::with_prefix("proptune-")?;
            let project = dir.path().join("project");
            std::fs::create_dir_all(&project)?;
            std::fs::create_dir_all(dir.path().join("reports"))?;

            let mut entries = Vec::new();
            for entry in std::fs::read_dir(&root)? {
                let entry = entry?;
                let name = entry.file_name();
                if EXCLUDED_ENTRIES.iter().any(|excluded| name == *excluded) {
                    continue;
                }
                entries.push(entry.path());
            }

            let options = fs_extra::dir::CopyOptions {
                overwrite: false,
                skip_exist: false,
                buffer_size: 64 * 1024, // 64KB buffer
                copy_inside: false,
                content_only: false,
                depth: 0, // Unlimited depth
            };

            fs_extra::copy_items(&entries, &project, &options).map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "failed to copy {}: {}",
                    root.display(),
                    e
                )))
            })?;

            Ok(dir)
        })
        .await
        .map_err(|e| Error::Runner(format!("copy task panicked: {e}")))??;

        let project = dir.path().join("project");
        let sources = find_source_files(&project, &[])?;

        tracing::debug!(
            "Working copy at {} ({} source files)",
            project.display(),
            sources.len()
        );

        Ok(Self {
            dir,
            project,
            sources,
            runs: AtomicUsize::new(0),
        })
    }

    /// Root of the copied project.
    pub fn project(&self) -> &Path {
        &self.project
    }

    /// Absolute paths of the copy's `.rs` files.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Build directory for runners; never inside the original tree.
    pub fn target_dir(&self) -> PathBuf {
        self.dir.path().join("target")
    }

    /// A report path not used by any earlier run of this copy.
    pub fn next_report_path(&self, extension: &str) -> PathBuf {
        let n = self.runs.fetch_add(1, Ordering::Relaxed);
        self.dir
            .path()
            .join("reports")
            .join(format!("run-{n}.{extension}"))
    }

    /// Map a unit path relative to the project root into the copy.
    pub fn resolve(&self, unit: &Path) -> PathBuf {
        self.project.join(unit)
    }
}
