//! Import tagging.

use serde::Serialize;
use syn::{Item, ItemUse, UseTree};

use crate::source::render_items;

/// Crate roots shipped with the toolchain.
const STANDARD_ROOTS: &[&str] = &["std", "core", "alloc", "proc_macro", "test"];

/// Path roots that always refer to the current crate.
const LOCAL_ROOTS: &[&str] = &["crate", "self", "super"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    Standard,
    Local,
    External,
}

/// One `use` declaration as it appears in a source unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Import {
    pub text: String,
    pub kind: ImportKind,
}

impl Import {
    pub(crate) fn from_item(item: &ItemUse) -> Self {
        let text = render_items(vec![Item::Use(item.clone())])
            .map(|text| text.trim().to_string())
            .unwrap_or_default();
        let kind = use_root(&item.tree)
            .map(|root| classify_root(&root))
            .unwrap_or(ImportKind::Local);
        Self { text, kind }
    }
}

/// Tag a crate root name.
pub fn classify_root(root: &str) -> ImportKind {
    if STANDARD_ROOTS.contains(&root) {
        ImportKind::Standard
    } else if LOCAL_ROOTS.contains(&root) {
        ImportKind::Local
    } else {
        ImportKind::External
    }
}

fn use_root(tree: &UseTree) -> Option<String> {
    match tree {
        UseTree::Path(path) => Some(path.ident.to_string()),
        UseTree::Name(name) => Some(name.ident.to_string()),
        UseTree::Rename(rename) => Some(rename.ident.to_string()),
        UseTree::Glob(_) => None,
        UseTree::Group(group) => group.items.first().and_then(use_root),
    }
}

/// Every `use` item in a unit, including those inside inline modules.
pub(crate) fn collect_imports(items: &[Item], out: &mut Vec<Import>) {
    for item in items {
        match item {
            Item::Use(item) => out.push(Import::from_item(item)),
            Item::Mod(module) => {
                if let Some((_, inner)) = &module.content {
                    collect_imports(inner, out);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imports(code: &str) -> Vec<Import> {
        let file = syn::parse_file(code).unwrap();
        let mut out = Vec::new();
        collect_imports(&file.items, &mut out);
        out
    }

    #[test]
    fn test_classify_roots() {
        assert_eq!(classify_root("std"), ImportKind::Standard);
        assert_eq!(classify_root("core"), ImportKind::Standard);
        assert_eq!(classify_root("super"), ImportKind::Local);
        assert_eq!(classify_root("crate"), ImportKind::Local);
        assert_eq!(classify_root("proptest"), ImportKind::External);
    }

    #[test]
    fn test_collects_nested_imports() {
        let found = imports(
            r#"
use std::collections::BTreeMap;
mod tests {
    use super::*;
    use proptest::prelude::*;
}
"#,
        );
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].text, "use std::collections::BTreeMap;");
        assert_eq!(found[0].kind, ImportKind::Standard);
        assert_eq!(found[1].kind, ImportKind::Local);
        assert_eq!(found[2].kind, ImportKind::External);
    }

    #[test]
    fn test_group_and_rename_roots() {
        let found = imports("use {serde::Serialize, std::fmt};\nuse regex as re;");
        assert_eq!(found[0].kind, ImportKind::External);
        assert_eq!(found[1].kind, ImportKind::External);
    }
}
