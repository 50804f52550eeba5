//! Single-site syntactic mutation.

use rand::seq::SliceRandom;
use rand::Rng;
use syn::visit_mut::{self, VisitMut};
use syn::{BinOp, Expr, ExprLit, ExprParen, ExprUnary, Lit, LitBool, LitInt, UnOp};

use super::operators::{
    binop_from_symbol, binop_symbol, MutationFamily, INDEX_SENTINEL, MEMBERSHIP_METHODS,
};
use crate::source::render_file;

/// What a single mutation changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMutation {
    pub family: MutationFamily,
    pub from: String,
    pub to: String,
}

impl std::fmt::Display for AppliedMutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: `{}` -> `{}`", self.family, self.from, self.to)
    }
}

/// Rewrite one randomly chosen eligible site of `code`.
///
/// Returns the input unchanged when it does not parse, has no eligible site, or
/// the rewritten tree cannot be printed back. Never fails.
pub fn apply_single_mutation<R: Rng + ?Sized>(code: &str, rng: &mut R) -> String {
    match mutate_once(code, rng) {
        Some((mutated, applied)) => {
            tracing::trace!("Applied {}", applied);
            mutated
        }
        None => code.to_string(),
    }
}

/// Like [`apply_single_mutation`], but reports what was changed.
pub fn mutate_once<R: Rng + ?Sized>(code: &str, rng: &mut R) -> Option<(String, AppliedMutation)> {
    let mut file = syn::parse_file(code).ok()?;

    let mut counter = SiteWalker::new(None, rng);
    counter.visit_file_mut(&mut file);
    let sites = counter.seen;
    if sites == 0 {
        return None;
    }

    let target = rng.gen_range(0..sites);
    let mut walker = SiteWalker::new(Some(target), rng);
    walker.visit_file_mut(&mut file);
    let applied = walker.applied?;

    let text = render_file(&file)?;
    Some((text, applied))
}

/// Number of eligible mutation sites in `code` (0 if it does not parse).
pub fn count_sites(code: &str) -> usize {
    let Ok(mut file) = syn::parse_file(code) else {
        return 0;
    };
    let mut rng = rand::rngs::mock::StepRng::new(0, 0);
    let mut counter = SiteWalker::new(None, &mut rng);
    counter.visit_file_mut(&mut file);
    counter.seen
}

#[derive(Debug, Clone, Copy)]
enum Site {
    Binary(MutationFamily),
    Unary,
    MembershipIn,
    MembershipNotIn,
    Index,
    Literal,
    Guard,
}

/// Walks every expression in a fixed order. With no target it only counts
/// eligible sites; with a target it rewrites the site at that position.
struct SiteWalker<'r, R: Rng + ?Sized> {
    seen: usize,
    target: Option<usize>,
    rng: &'r mut R,
    applied: Option<AppliedMutation>,
    /// Set right before descending into the call under a `!x.contains(..)`.
    suppress_membership: bool,
}

impl<'r, R: Rng + ?Sized> SiteWalker<'r, R> {
    fn new(target: Option<usize>, rng: &'r mut R) -> Self {
        Self {
            seen: 0,
            target,
            rng,
            applied: None,
            suppress_membership: false,
        }
    }

    fn hit(&mut self) -> bool {
        let index = self.seen;
        self.seen += 1;
        self.target == Some(index)
    }

    fn pick(&mut self, family: MutationFamily, current: &str) -> Option<&'static str> {
        let options: Vec<&'static str> = family
            .alternatives()
            .iter()
            .copied()
            .filter(|alt| *alt != current)
            .collect();
        options.choose(&mut *self.rng).copied()
    }

    fn apply(&mut self, site: Site, expr: &mut Expr) {
        self.applied = match site {
            Site::Binary(family) => self.mutate_binary(family, expr),
            Site::Unary => self.mutate_unary(expr),
            Site::MembershipIn => {
                let inner = expr.clone();
                *expr = Expr::Unary(ExprUnary {
                    attrs: Vec::new(),
                    op: UnOp::Not(Default::default()),
                    expr: Box::new(inner),
                });
                Some(applied(MutationFamily::Membership, "in", "not in"))
            }
            Site::MembershipNotIn => match expr {
                Expr::Unary(unary) => {
                    let inner = (*unary.expr).clone();
                    *expr = inner;
                    Some(applied(MutationFamily::Membership, "not in", "in"))
                }
                _ => None,
            },
            Site::Index => self.mutate_index(expr),
            Site::Literal => match expr {
                Expr::Lit(ExprLit {
                    lit: Lit::Bool(lit),
                    ..
                }) => {
                    let from = lit.value;
                    lit.value = !from;
                    Some(applied(
                        MutationFamily::LiteralConstant,
                        &from.to_string(),
                        &(!from).to_string(),
                    ))
                }
                _ => None,
            },
            Site::Guard => self.mutate_guard(expr),
        };
    }

    fn mutate_binary(&mut self, family: MutationFamily, expr: &mut Expr) -> Option<AppliedMutation> {
        let Expr::Binary(binary) = expr else {
            return None;
        };
        let from = binop_symbol(&binary.op)?;
        let to = self.pick(family, from)?;
        binary.op = binop_from_symbol(to)?;
        Some(applied(family, from, to))
    }

    fn mutate_unary(&mut self, expr: &mut Expr) -> Option<AppliedMutation> {
        let Expr::Unary(unary) = expr else {
            return None;
        };
        let from = match unary.op {
            UnOp::Not(_) => "!",
            UnOp::Neg(_) => "-",
            _ => return None,
        };
        let to = self.pick(MutationFamily::Unary, from)?;
        match to {
            "!" => unary.op = UnOp::Not(Default::default()),
            "-" => unary.op = UnOp::Neg(Default::default()),
            _ => {
                let inner = unary.expr.clone();
                *expr = Expr::Paren(ExprParen {
                    attrs: Vec::new(),
                    paren_token: Default::default(),
                    expr: inner,
                });
            }
        }
        Some(applied(MutationFamily::Unary, from, to))
    }

    fn mutate_index(&mut self, expr: &mut Expr) -> Option<AppliedMutation> {
        let Expr::Index(index) = expr else {
            return None;
        };
        let Expr::Lit(ExprLit {
            lit: Lit::Int(lit), ..
        }) = &*index.index
        else {
            return None;
        };
        let value: u128 = lit.base10_parse().ok()?;
        let suffix = lit.suffix().to_string();
        let span = lit.span();

        let mut options: Vec<Option<u128>> = value.checked_add(1).map(Some).into_iter().collect();
        options.push(None);
        options.extend(value.checked_sub(1).map(Some));
        let choice = *options.choose(&mut *self.rng)?;

        let from = format!("[{}]", lit.base10_digits());
        let (replacement, to): (Expr, String) = match choice {
            Some(n) => (
                Expr::Lit(ExprLit {
                    attrs: Vec::new(),
                    lit: Lit::Int(LitInt::new(&format!("{n}{suffix}"), span)),
                }),
                format!("[{n}]"),
            ),
            None => (
                syn::parse_str(INDEX_SENTINEL).ok()?,
                format!("[{INDEX_SENTINEL}]"),
            ),
        };
        *index.index = replacement;
        Some(applied(MutationFamily::IndexOffset, &from, &to))
    }

    fn mutate_guard(&mut self, expr: &mut Expr) -> Option<AppliedMutation> {
        let Expr::If(branch) = expr else {
            return None;
        };
        let value = match &*branch.cond {
            Expr::Lit(ExprLit {
                lit: Lit::Bool(lit),
                ..
            }) => !lit.value,
            _ => self.rng.gen_bool(0.5),
        };
        *branch.cond = Expr::Lit(ExprLit {
            attrs: Vec::new(),
            lit: Lit::Bool(LitBool::new(value, proc_macro2::Span::call_site())),
        });
        Some(applied(
            MutationFamily::ConditionalGuard,
            "condition",
            &value.to_string(),
        ))
    }

    fn classify(&mut self, expr: &Expr) -> Option<Site> {
        let suppressed = std::mem::take(&mut self.suppress_membership);
        match expr {
            Expr::Binary(binary) => binop_symbol(&binary.op)
                .and_then(MutationFamily::of_binary)
                .map(Site::Binary),
            Expr::Unary(unary) => match unary.op {
                UnOp::Not(_) if is_membership_call(&unary.expr) => Some(Site::MembershipNotIn),
                UnOp::Not(_) | UnOp::Neg(_) => Some(Site::Unary),
                _ => None,
            },
            Expr::MethodCall(_) if !suppressed && is_membership_call(expr) => {
                Some(Site::MembershipIn)
            }
            Expr::Index(index) => matches!(
                &*index.index,
                Expr::Lit(ExprLit {
                    lit: Lit::Int(_),
                    ..
                })
            )
            .then_some(Site::Index),
            Expr::Lit(ExprLit {
                lit: Lit::Bool(_), ..
            }) => Some(Site::Literal),
            Expr::If(branch) if !binds_pattern(&branch.cond) => Some(Site::Guard),
            _ => None,
        }
    }
}

impl<R: Rng + ?Sized> VisitMut for SiteWalker<'_, R> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if self.applied.is_some() {
            return;
        }

        if let Some(site) = self.classify(expr) {
            if self.hit() {
                self.apply(site, expr);
                return;
            }
            if matches!(site, Site::MembershipNotIn) {
                self.suppress_membership = true;
            }
        }

        visit_mut::visit_expr_mut(self, expr);
    }
}

fn applied(family: MutationFamily, from: &str, to: &str) -> AppliedMutation {
    AppliedMutation {
        family,
        from: from.to_string(),
        to: to.to_string(),
    }
}

fn is_membership_call(expr: &Expr) -> bool {
    match expr {
        Expr::MethodCall(call) => MEMBERSHIP_METHODS
            .iter()
            .any(|method| call.method == method),
        _ => false,
    }
}

/// `if let` and let-chains bind names, so their condition cannot be replaced.
fn binds_pattern(cond: &Expr) -> bool {
    match cond {
        Expr::Let(_) => true,
        Expr::Binary(binary) if matches!(binary.op, BinOp::And(_)) => {
            binds_pattern(&binary.left) || binds_pattern(&binary.right)
        }
        Expr::Paren(paren) => binds_pattern(&paren.expr),
        _ => false,
    }
}
