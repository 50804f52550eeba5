//! The mutation operator catalogue.
//!
//! Every family has a fixed set of alternatives and a site is only ever
//! rewritten into another member of its own family.

use serde::{Deserialize, Serialize};
use syn::BinOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationFamily {
    Relational,
    /// `x.contains(y)` and its negation.
    Membership,
    Arithmetic,
    Bitwise,
    Shift,
    BooleanConnective,
    Unary,
    CompoundAssign,
    /// Integer-literal subscripts, `v[3]`.
    IndexOffset,
    /// `true` / `false`.
    LiteralConstant,
    /// The condition of an `if`.
    ConditionalGuard,
}

impl std::fmt::Display for MutationFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Relational => write!(f, "relational"),
            Self::Membership => write!(f, "membership"),
            Self::Arithmetic => write!(f, "arithmetic"),
            Self::Bitwise => write!(f, "bitwise"),
            Self::Shift => write!(f, "shift"),
            Self::BooleanConnective => write!(f, "boolean_connective"),
            Self::Unary => write!(f, "unary"),
            Self::CompoundAssign => write!(f, "compound_assign"),
            Self::IndexOffset => write!(f, "index_offset"),
            Self::LiteralConstant => write!(f, "literal_constant"),
            Self::ConditionalGuard => write!(f, "conditional_guard"),
        }
    }
}

pub const RELATIONAL: &[&str] = &["==", "!=", "<", "<=", ">", ">="];
pub const MEMBERSHIP: &[&str] = &["in", "not in"];
pub const ARITHMETIC: &[&str] = &["+", "-", "*", "/", "%"];
pub const BITWISE: &[&str] = &["&", "|", "^"];
pub const SHIFT: &[&str] = &["<<", ">>"];
pub const BOOLEAN_CONNECTIVE: &[&str] = &["&&", "||"];
/// The empty symbol drops the operator.
pub const UNARY: &[&str] = &["!", "-", ""];
pub const COMPOUND_ASSIGN: &[&str] = &[
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<=", ">>=",
];
pub const LITERAL_CONSTANT: &[&str] = &["true", "false"];
pub const CONDITIONAL_GUARD: &[&str] = &["true", "false"];

/// Method names treated as a membership test.
pub const MEMBERSHIP_METHODS: &[&str] = &["contains", "contains_key"];

/// Replacement used to force an out-of-range subscript.
pub const INDEX_SENTINEL: &str = "usize::MAX";

impl MutationFamily {
    /// The enumerated symbols of a family. Index offsets are computed from the
    /// literal and have no fixed set.
    pub fn alternatives(self) -> &'static [&'static str] {
        match self {
            Self::Relational => RELATIONAL,
            Self::Membership => MEMBERSHIP,
            Self::Arithmetic => ARITHMETIC,
            Self::Bitwise => BITWISE,
            Self::Shift => SHIFT,
            Self::BooleanConnective => BOOLEAN_CONNECTIVE,
            Self::Unary => UNARY,
            Self::CompoundAssign => COMPOUND_ASSIGN,
            Self::IndexOffset => &[],
            Self::LiteralConstant => LITERAL_CONSTANT,
            Self::ConditionalGuard => CONDITIONAL_GUARD,
        }
    }

    /// Family of a binary operator symbol.
    pub fn of_binary(symbol: &str) -> Option<Self> {
        [
            Self::Relational,
            Self::Arithmetic,
            Self::Bitwise,
            Self::Shift,
            Self::BooleanConnective,
            Self::CompoundAssign,
        ]
        .into_iter()
        .find(|family| family.alternatives().contains(&symbol))
    }
}

pub fn binop_symbol(op: &BinOp) -> Option<&'static str> {
    let symbol = match op {
        BinOp::Add(_) => "+",
        BinOp::Sub(_) => "-",
        BinOp::Mul(_) => "*",
        BinOp::Div(_) => "/",
        BinOp::Rem(_) => "%",
        BinOp::And(_) => "&&",
        BinOp::Or(_) => "||",
        BinOp::BitXor(_) => "^",
        BinOp::BitAnd(_) => "&",
        BinOp::BitOr(_) => "|",
        BinOp::Shl(_) => "<<",
        BinOp::Shr(_) => ">>",
        BinOp::Eq(_) => "==",
        BinOp::Lt(_) => "<",
        BinOp::Le(_) => "<=",
        BinOp::Ne(_) => "!=",
        BinOp::Ge(_) => ">=",
        BinOp::Gt(_) => ">",
        BinOp::AddAssign(_) => "+=",
        BinOp::SubAssign(_) => "-=",
        BinOp::MulAssign(_) => "*=",
        BinOp::DivAssign(_) => "/=",
        BinOp::RemAssign(_) => "%=",
        BinOp::BitXorAssign(_) => "^=",
        BinOp::BitAndAssign(_) => "&=",
        BinOp::BitOrAssign(_) => "|=",
        BinOp::ShlAssign(_) => "<<=",
        BinOp::ShrAssign(_) => ">>=",
        _ => return None,
    };
    Some(symbol)
}

pub fn binop_from_symbol(symbol: &str) -> Option<BinOp> {
    let op = match symbol {
        "+" => BinOp::Add(Default::default()),
        "-" => BinOp::Sub(Default::default()),
        "*" => BinOp::Mul(Default::default()),
        "/" => BinOp::Div(Default::default()),
        "%" => BinOp::Rem(Default::default()),
        "&&" => BinOp::And(Default::default()),
        "||" => BinOp::Or(Default::default()),
        "^" => BinOp::BitXor(Default::default()),
        "&" => BinOp::BitAnd(Default::default()),
        "|" => BinOp::BitOr(Default::default()),
        "<<" => BinOp::Shl(Default::default()),
        ">>" => BinOp::Shr(Default::default()),
        "==" => BinOp::Eq(Default::default()),
        "<" => BinOp::Lt(Default::default()),
        "<=" => BinOp::Le(Default::default()),
        "!=" => BinOp::Ne(Default::default()),
        ">=" => BinOp::Ge(Default::default()),
        ">" => BinOp::Gt(Default::default()),
        "+=" => BinOp::AddAssign(Default::default()),
        "-=" => BinOp::SubAssign(Default::default()),
        "*=" => BinOp::MulAssign(Default::default()),
        "/=" => BinOp::DivAssign(Default::default()),
        "%=" => BinOp::RemAssign(Default::default()),
        "^=" => BinOp::BitXorAssign(Default::default()),
        "&=" => BinOp::BitAndAssign(Default::default()),
        "|=" => BinOp::BitOrAssign(Default::default()),
        "<<=" => BinOp::ShlAssign(Default::default()),
        ">>=" => BinOp::ShrAssign(Default::default()),
        _ => return None,
    };
    Some(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_binary_families_are_disjoint() {
        let families = [
            RELATIONAL,
            ARITHMETIC,
            BITWISE,
            SHIFT,
            BOOLEAN_CONNECTIVE,
            COMPOUND_ASSIGN,
        ];
        let mut seen = BTreeSet::new();
        for family in families {
            for symbol in family {
                assert!(seen.insert(*symbol), "{symbol} appears in two families");
            }
        }
    }

    #[test]
    fn test_of_binary() {
        assert_eq!(MutationFamily::of_binary("<="), Some(MutationFamily::Relational));
        assert_eq!(MutationFamily::of_binary("%"), Some(MutationFamily::Arithmetic));
        assert_eq!(MutationFamily::of_binary("^"), Some(MutationFamily::Bitwise));
        assert_eq!(MutationFamily::of_binary(">>"), Some(MutationFamily::Shift));
        assert_eq!(MutationFamily::of_binary("||"), Some(MutationFamily::BooleanConnective));
        assert_eq!(MutationFamily::of_binary("<<="), Some(MutationFamily::CompoundAssign));
        assert_eq!(MutationFamily::of_binary("in"), None);
    }

    #[test]
    fn test_symbol_round_trip() {
        for family in [
            MutationFamily::Relational,
            MutationFamily::Arithmetic,
            MutationFamily::Bitwise,
            MutationFamily::Shift,
            MutationFamily::BooleanConnective,
            MutationFamily::CompoundAssign,
        ] {
            for symbol in family.alternatives() {
                let op = binop_from_symbol(symbol).unwrap();
                assert_eq!(binop_symbol(&op), Some(*symbol));
            }
        }
    }

    #[test]
    fn test_family_display() {
        assert_eq!(MutationFamily::CompoundAssign.to_string(), "compound_assign");
        assert_eq!(MutationFamily::ConditionalGuard.to_string(), "conditional_guard");
    }
}
