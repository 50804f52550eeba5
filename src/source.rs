//! Parsing and printing helpers for Rust source units.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use proc_macro2::LineColumn;
use syn::spanned::Spanned;
use syn::{File, ImplItem, ImplItemFn, Item, ItemFn};

use crate::error::{Error, Result};

/// Parse a whole source unit, attributing failures to `path`.
pub fn parse_unit(path: &Path, text: &str) -> Result<File> {
    syn::parse_file(text).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Print a syntax tree back to source text.
///
/// Returns `None` when the printer panics or its output does not parse again,
/// which callers treat as "regeneration failed".
pub fn render_file(file: &File) -> Option<String> {
    let text = panic::catch_unwind(AssertUnwindSafe(|| prettyplease::unparse(file))).ok()?;
    syn::parse_file(&text).ok()?;
    Some(text)
}

/// Print a standalone sequence of items.
pub fn render_items(items: Vec<Item>) -> Option<String> {
    render_file(&File {
        shebang: None,
        attrs: Vec::new(),
        items,
    })
}

/// Print one function definition, attributes included.
pub fn render_fn(func: &ItemFn) -> Option<String> {
    render_items(vec![Item::Fn(func.clone())])
}

/// The text `node` was parsed from, comments and layout intact.
///
/// `text` must be the source the node was parsed from.
pub fn original_text(text: &str, node: &impl Spanned) -> Option<String> {
    let span = node.span();
    let start = byte_offset(text, span.start())?;
    let end = byte_offset(text, span.end())?;
    text.get(start..end).map(str::to_string)
}

/// Lines are 1-based, columns count chars.
fn byte_offset(text: &str, at: LineColumn) -> Option<usize> {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(at.line.checked_sub(1)?)
        .map(str::len)
        .sum();
    let line = text.get(line_start..)?;
    let column = line
        .char_indices()
        .nth(at.column)
        .map_or(line.len(), |(i, _)| i);
    Some(line_start + column)
}

/// Every function definition in a file, in source order: free functions at any
/// depth of inline modules plus methods of `impl` blocks.
pub fn function_items(file: &File) -> Vec<ItemFn> {
    let mut out = Vec::new();
    collect_functions(&file.items, &mut out);
    out
}

fn collect_functions(items: &[Item], out: &mut Vec<ItemFn>) {
    for item in items {
        match item {
            Item::Fn(func) => out.push(func.clone()),
            Item::Mod(module) => {
                if let Some((_, inner)) = &module.content {
                    collect_functions(inner, out);
                }
            }
            Item::Impl(block) => {
                for impl_item in &block.items {
                    if let ImplItem::Fn(method) = impl_item {
                        out.push(method_to_item(method));
                    }
                }
            }
            _ => {}
        }
    }
}

/// View an `impl` method as a free function item.
pub fn method_to_item(method: &ImplItemFn) -> ItemFn {
    ItemFn {
        attrs: method.attrs.clone(),
        vis: method.vis.clone(),
        sig: method.sig.clone(),
        block: Box::new(method.block.clone()),
    }
}

/// Write a free function item back into an `impl` method slot.
pub fn item_to_method(func: &ItemFn, slot: &ImplItemFn) -> ImplItemFn {
    ImplItemFn {
        attrs: func.attrs.clone(),
        vis: func.vis.clone(),
        defaultness: slot.defaultness,
        sig: func.sig.clone(),
        block: (*func.block).clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_items_walks_modules_and_impls() {
        let file = syn::parse_file(
            r#"
fn top() {}
mod inner {
    fn nested() {}
    mod deeper { fn deepest() {} }
}
struct S;
impl S {
    fn method(&self) -> u32 { 1 }
}
"#,
        )
        .unwrap();

        let names: Vec<String> = function_items(&file)
            .iter()
            .map(|f| f.sig.ident.to_string())
            .collect();
        assert_eq!(names, vec!["top", "nested", "deepest", "method"]);
    }

    #[test]
    fn test_render_fn_round_trips() {
        let file = syn::parse_file("fn add(a: u32, b: u32) -> u32 { a + b }").unwrap();
        let func = function_items(&file).remove(0);
        let text = render_fn(&func).unwrap();
        assert!(text.contains("fn add(a: u32, b: u32) -> u32"));
        assert!(syn::parse_file(&text).is_ok());
    }

    #[test]
    fn test_original_text_keeps_comments_and_layout() {
        let text = "use x::y;\n\nmod tests {\n    /// Sorted stays sorted.\n    #[test]\n    fn sorted() {\n        // keep this\n        assert!(true);\n    }\n}\n";
        let file = syn::parse_file(text).unwrap();
        let func = function_items(&file).remove(0);
        assert_eq!(
            original_text(text, &func).as_deref(),
            Some("/// Sorted stays sorted.\n    #[test]\n    fn sorted() {\n        // keep this\n        assert!(true);\n    }")
        );
    }

    #[test]
    fn test_original_text_counts_chars_not_bytes() {
        let text = "const S: &str = \"héllo\"; fn after() { let _ = \"ü\"; }\n";
        let file = syn::parse_file(text).unwrap();
        let func = function_items(&file).remove(0);
        assert_eq!(
            original_text(text, &func).as_deref(),
            Some("fn after() { let _ = \"ü\"; }")
        );
    }

    #[test]
    fn test_parse_unit_reports_path() {
        let err = parse_unit(Path::new("src/broken.rs"), "fn broken( {").unwrap_err();
        assert!(err.to_string().contains("src/broken.rs"));
    }
}
