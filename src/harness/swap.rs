//! Swapping function definitions in and out of a working copy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use syn::{ImplItem, Item, ItemFn};

use crate::error::{Error, Result};
use crate::source::{function_items, item_to_method, parse_unit, render_file};

/// A named set of replacement definitions parsed from a code block.
#[derive(Debug, Clone)]
pub struct Definitions {
    by_name: BTreeMap<String, ItemFn>,
}

impl Definitions {
    /// Parse every function in `code`. Later duplicates win.
    pub fn parse(label: &str, code: &str) -> Result<Self> {
        let file = parse_unit(Path::new(label), code)?;
        let by_name = function_items(&file)
            .into_iter()
            .map(|item| (item.sig.ident.to_string(), item))
            .collect();
        Ok(Self { by_name })
    }

    pub fn from_items(items: impl IntoIterator<Item = ItemFn>) -> Self {
        Self {
            by_name: items
                .into_iter()
                .map(|item| (item.sig.ident.to_string(), item))
                .collect(),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Rewrite every same-named function in `items`; returns how many changed.
    fn apply(&self, items: &mut [Item]) -> usize {
        let mut changed = 0;
        for item in items {
            match item {
                Item::Fn(func) => {
                    if let Some(replacement) = self.by_name.get(&func.sig.ident.to_string()) {
                        *func = replacement.clone();
                        changed += 1;
                    }
                }
                Item::Mod(module) => {
                    if let Some((_, inner)) = &mut module.content {
                        changed += self.apply(inner);
                    }
                }
                Item::Impl(block) => {
                    for impl_item in &mut block.items {
                        if let ImplItem::Fn(method) = impl_item {
                            if let Some(replacement) =
                                self.by_name.get(&method.sig.ident.to_string())
                            {
                                *method = item_to_method(replacement, method);
                                changed += 1;
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        changed
    }
}

/// Pristine bytes of every file a swap rewrote.
///
/// [`SwapGuard::restore`] writes them back. Dropping an unrestored guard does
/// the same synchronously so no exit path leaves the copy mutated.
#[derive(Debug)]
#[must_use = "a swap must be restored"]
pub struct SwapGuard {
    snapshots: Vec<(PathBuf, Vec<u8>)>,
    restored: bool,
}

impl SwapGuard {
    /// Number of files the swap touched.
    pub fn files_changed(&self) -> usize {
        self.snapshots.len()
    }

    pub async fn restore(mut self) -> Result<()> {
        self.restored = true;
        let snapshots = std::mem::take(&mut self.snapshots);
        for (path, original) in snapshots.iter().rev() {
            if let Err(e) = tokio::fs::write(path, original).await {
                tracing::warn!("CRITICAL: Failed to restore {}: {}", path.display(), e);
                // Try once more
                tokio::fs::write(path, original).await?;
            }
        }
        Ok(())
    }
}

impl Drop for SwapGuard {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        for (path, original) in self.snapshots.iter().rev() {
            if let Err(e) = std::fs::write(path, original) {
                tracing::warn!("CRITICAL: Failed to restore {}: {}", path.display(), e);
            }
        }
    }
}

/// Replace every definition in `files` that shares a name with one of
/// `definitions`, file by file. All other items are left as parsed.
pub async fn swap_definitions(files: &[PathBuf], definitions: &Definitions) -> Result<SwapGuard> {
    let mut guard = SwapGuard {
        snapshots: Vec::new(),
        restored: false,
    };

    if definitions.is_empty() {
        return Ok(guard);
    }

    for path in files {
        let original = tokio::fs::read(path).await?;
        let Ok(text) = std::str::from_utf8(&original) else {
            continue;
        };
        let mut file = match parse_unit(path, text) {
            Ok(file) => file,
            Err(e) => {
                tracing::debug!("Not swapping into unparsable unit: {}", e);
                continue;
            }
        };

        if definitions.apply(&mut file.items) == 0 {
            continue;
        }

        let rewritten = render_file(&file).ok_or_else(|| {
            Error::Runner(format!("could not print swapped unit {}", path.display()))
        })?;

        // Snapshot first so a failed write is still rolled back.
        guard.snapshots.push((path.clone(), original));
        tokio::fs::write(path, rewritten).await?;
    }

    Ok(guard)
}
