//! Over-representation analysis: one-sided hypergeometric test of each
//! gene set against a fixed subset drawn from a background universe.

use statrs::distribution::{Discrete, Hypergeometric};
use std::collections::HashSet;

use super::{AnnotationCorpus, EnrichmentOptions, EnrichmentResult, Method};
use crate::stats::benjamini_hochberg;

/// P(X >= hits) for X ~ Hypergeometric(universe, set_size, subset_size).
pub fn hypergeometric_upper_tail(universe: u64, set_size: u64, subset_size: u64, hits: u64) -> f64 {
    if hits == 0 {
        return 1.0;
    }
    let Ok(dist) = Hypergeometric::new(universe, set_size, subset_size) else {
        return f64::NAN;
    };
    // Summing the pmf keeps precision in the far tail where 1 - cdf does not.
    let upper = set_size.min(subset_size);
    (hits..=upper).map(|x| dist.pmf(x)).sum::<f64>().min(1.0)
}

/// Test every gene set of `corpus`. Subset genes outside the universe are
/// ignored, set members are restricted to the universe before the size
/// limits apply, and only sets with at least one hit are tested.
///
/// Returns terms with BH-adjusted p at most `options.p_cutoff`, by
/// ascending p.
pub fn ora(
    subset: &[&str],
    universe: &[&str],
    corpus: &AnnotationCorpus,
    options: &EnrichmentOptions,
) -> Vec<EnrichmentResult> {
    let universe: HashSet<&str> = universe.iter().copied().collect();
    let subset: HashSet<&str> = subset.iter().copied().filter(|g| universe.contains(g)).collect();
    let (n_universe, n_subset) = (universe.len() as u64, subset.len() as u64);
    if n_subset == 0 {
        return Vec::new();
    }

    let mut tested = Vec::new();
    for set in &corpus.sets {
        let members: Vec<&str> = set
            .genes
            .iter()
            .map(String::as_str)
            .filter(|g| universe.contains(g))
            .collect();
        if members.len() < options.min_set_size || members.len() > options.max_set_size {
            continue;
        }
        let hits: Vec<String> = members
            .iter()
            .filter(|g| subset.contains(*g))
            .map(|g| g.to_string())
            .collect();
        if hits.is_empty() {
            continue;
        }

        let m = members.len() as u64;
        let k = hits.len() as u64;
        let expected = n_subset as f64 * m as f64 / n_universe as f64;
        tested.push(EnrichmentResult {
            method: Method::Ora,
            corpus: corpus.name.clone(),
            term: set.term.clone(),
            description: set.description.clone(),
            set_size: members.len(),
            overlap: hits.len(),
            score: k as f64 / expected,
            p_value: hypergeometric_upper_tail(n_universe, m, n_subset, k),
            p_adjust: f64::NAN,
            genes: hits,
        });
    }

    finish(tested, options.p_cutoff)
}

/// Adjust, filter by `p_cutoff` and order by ascending p.
pub(super) fn finish(mut tested: Vec<EnrichmentResult>, p_cutoff: f64) -> Vec<EnrichmentResult> {
    let raw: Vec<f64> = tested.iter().map(|r| r.p_value).collect();
    for (result, adj) in tested.iter_mut().zip(benjamini_hochberg(&raw)) {
        result.p_adjust = adj;
    }
    tested.retain(|r| r.p_adjust <= p_cutoff);
    tested.sort_by(|a, b| a.p_value.total_cmp(&b.p_value).then_with(|| a.term.cmp(&b.term)));
    tested
}
