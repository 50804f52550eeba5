//! Random syntactic mutation of dependency code.
//!
//! This module provides:
//! - The operator catalogue, grouped into families that never cross
//! - Single-site mutation of a code string
//! - Higher-order mutant generation and batch sampling

pub mod mutator;
pub mod operators;

pub use mutator::{apply_single_mutation, count_sites, mutate_once, AppliedMutation};
pub use operators::MutationFamily;

use std::collections::BTreeSet;

use rand::seq::IteratorRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::source::render_file;

/// Length of the hex id given to each mutant.
const MUTANT_ID_LEN: usize = 12;

/// One mutated variant of a dependency closure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mutant {
    pub id: String,
    pub code: String,
}

impl Mutant {
    pub fn new(code: String) -> Self {
        Self {
            id: compute_hash(&code)[..MUTANT_ID_LEN].to_string(),
            code,
        }
    }
}

/// Compute a SHA256 hash of the content
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Build a flat set of first- and higher-order mutants of `code`.
///
/// Each level mutates every member of the previous level's new variants
/// `target_count` times. Level one starts from `code` itself. The input, in
/// both its raw and printed form, is never part of the result.
pub fn generate_mutants<R: Rng + ?Sized>(
    code: &str,
    target_count: usize,
    max_depth: usize,
    rng: &mut R,
) -> BTreeSet<String> {
    let original_forms: BTreeSet<String> = std::iter::once(code.to_string())
        .chain(
            syn::parse_file(code)
                .ok()
                .and_then(|file| render_file(&file)),
        )
        .collect();

    let mut result = BTreeSet::new();
    let mut frontier = vec![code.to_string()];

    for depth in 0..max_depth {
        let mut next = Vec::new();
        for parent in &frontier {
            for _ in 0..target_count {
                let candidate = apply_single_mutation(parent, rng);
                if original_forms.contains(&candidate) {
                    continue;
                }
                if result.insert(candidate.clone()) {
                    next.push(candidate);
                }
            }
        }
        tracing::debug!(
            "Mutation depth {}: {} new variants ({} total)",
            depth + 1,
            next.len(),
            result.len()
        );
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    result
}

/// Upper bound on the size of [`generate_mutants`]' result.
pub fn max_mutant_count(target_count: usize, max_depth: usize) -> usize {
    (1..=max_depth as u32)
        .map(|depth| target_count.saturating_pow(depth))
        .fold(0usize, usize::saturating_add)
}

/// Sample up to `count` distinct mutants. Smaller sets are taken whole.
pub fn sample_batch<R: Rng + ?Sized>(
    mutants: &BTreeSet<String>,
    count: usize,
    rng: &mut R,
) -> Vec<Mutant> {
    let mut picked: Vec<Mutant> = if mutants.len() <= count {
        mutants.iter().cloned().map(Mutant::new).collect()
    } else {
        mutants
            .iter()
            .cloned()
            .choose_multiple(rng, count)
            .into_iter()
            .map(Mutant::new)
            .collect()
    };
    picked.sort();
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const DEPS: &str = r#"
fn clamp(x: i64, lo: i64, hi: i64) -> i64 {
    if x < lo {
        lo
    } else if x > hi {
        hi
    } else {
        x + 0
    }
}
"#;

    fn generate(seed: u64, target: usize, depth: usize) -> BTreeSet<String> {
        let mut rng = StdRng::seed_from_u64(seed);
        generate_mutants(DEPS, target, depth, &mut rng)
    }

    // =========================================================================
    // Generation
    // =========================================================================

    #[test]
    fn test_original_never_included() {
        let printed = render_file(&syn::parse_file(DEPS).unwrap()).unwrap();
        for seed in 0..20 {
            let mutants = generate(seed, 5, 2);
            assert!(!mutants.is_empty());
            assert!(!mutants.contains(DEPS));
            assert!(!mutants.contains(&printed));
        }
    }

    #[test]
    fn test_result_size_is_bounded() {
        for (target, depth) in [(1, 1), (3, 2), (4, 3)] {
            let mutants = generate(7, target, depth);
            assert!(mutants.len() <= max_mutant_count(target, depth));
        }
    }

    #[test]
    fn test_same_seed_same_set() {
        assert_eq!(generate(11, 6, 2), generate(11, 6, 2));
    }

    #[test]
    fn test_every_mutant_parses() {
        for code in generate(3, 8, 2) {
            assert!(syn::parse_file(&code).is_ok(), "{code}");
        }
    }

    #[test]
    fn test_no_sites_no_mutants() {
        let mut rng = StdRng::seed_from_u64(0);
        let mutants = generate_mutants("fn id(x: u8) -> u8 { x }", 10, 2, &mut rng);
        assert!(mutants.is_empty());
    }

    #[test]
    fn test_zero_depth_is_empty() {
        assert!(generate(1, 10, 0).is_empty());
    }

    #[test]
    fn test_max_mutant_count() {
        assert_eq!(max_mutant_count(10, 2), 110);
        assert_eq!(max_mutant_count(3, 1), 3);
        assert_eq!(max_mutant_count(3, 0), 0);
    }

    // =========================================================================
    // Sampling
    // =========================================================================

    #[test]
    fn test_sample_takes_whole_small_set() {
        let set: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let batch = sample_batch(&set, 10, &mut rng);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_sample_is_distinct_and_sized() {
        let set: BTreeSet<String> = (0..50).map(|i| format!("fn f() -> u8 {{ {i} }}")).collect();
        let mut rng = StdRng::seed_from_u64(9);
        let batch = sample_batch(&set, 10, &mut rng);
        assert_eq!(batch.len(), 10);
        let ids: BTreeSet<_> = batch.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids.len(), 10);
        assert!(batch.iter().all(|m| set.contains(&m.code)));
    }

    #[test]
    fn test_mutant_id_is_stable() {
        let a = Mutant::new("fn f() {}".to_string());
        let b = Mutant::new("fn f() {}".to_string());
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), MUTANT_ID_LEN);
        assert_ne!(a.id, Mutant::new("fn g() {}".to_string()).id);
    }
}
