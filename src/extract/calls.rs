//! Call-site discovery inside function bodies.

use std::collections::BTreeSet;

use proc_macro2::{Delimiter, TokenStream, TokenTree};
use syn::visit::{self, Visit};
use syn::{Expr, ExprCall, ExprMethodCall, ItemFn, Macro};

/// Names called from a function body. Attributes and the signature are not
/// scanned, so strategy expressions in `#[strategy(..)]` do not count.
pub(crate) fn called_names(func: &ItemFn) -> BTreeSet<String> {
    let mut collector = CallCollector::default();
    collector.visit_block(&func.block);
    collector.names
}

#[derive(Default)]
struct CallCollector {
    names: BTreeSet<String>,
}

impl<'ast> Visit<'ast> for CallCollector {
    fn visit_expr_call(&mut self, call: &'ast ExprCall) {
        if let Expr::Path(path) = &*call.func {
            if let Some(segment) = path.path.segments.last() {
                self.names.insert(segment.ident.to_string());
            }
        }
        visit::visit_expr_call(self, call);
    }

    fn visit_expr_method_call(&mut self, call: &'ast ExprMethodCall) {
        self.names.insert(call.method.to_string());
        visit::visit_expr_method_call(self, call);
    }

    // Macro bodies are opaque to syn; `ident(...)` inside them counts as a call.
    fn visit_macro(&mut self, mac: &'ast Macro) {
        scan_tokens(mac.tokens.clone(), &mut self.names);
    }
}

fn scan_tokens(tokens: TokenStream, names: &mut BTreeSet<String>) {
    let mut last_ident: Option<String> = None;
    for tree in tokens {
        match tree {
            TokenTree::Ident(ident) => last_ident = Some(ident.to_string()),
            TokenTree::Group(group) => {
                if group.delimiter() == Delimiter::Parenthesis {
                    if let Some(name) = last_ident.take() {
                        names.insert(name);
                    }
                }
                scan_tokens(group.stream(), names);
                last_ident = None;
            }
            _ => last_ident = None,
        }
    }
}
