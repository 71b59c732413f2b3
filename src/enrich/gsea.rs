//! Preranked gene-set enrichment analysis.
//!
//! Enrichment score is the weighted (p = 1) Kolmogorov–Smirnov running sum of
//! Subramanian et al. (2005). Significance comes from a gene-label
//! permutation null: random sets of the same size drawn from the ranked
//! list. Each gene set gets its own RNG seeded from the configured seed and
//! the set's position in the corpus, so results do not depend on thread
//! scheduling.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::HashMap;

use super::ora::finish;
use super::{AnnotationCorpus, EnrichmentOptions, EnrichmentResult, Method};
use crate::ranked::RankedList;

/// Signed running-sum extreme and the rank at which it occurs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningSum {
    pub es: f64,
    pub peak: usize,
}

/// Enrichment score of the set at sorted rank positions `hits` within
/// `scores` (sorted descending).
pub fn enrichment_score(scores: &[f64], hits: &[usize]) -> RunningSum {
    let n = scores.len();
    let nh = hits.len();
    if nh == 0 || nh >= n {
        return RunningSum { es: 0.0, peak: 0 };
    }

    let total: f64 = hits.iter().map(|&h| scores[h].abs()).sum();
    let weight = |h: usize| {
        if total > 0.0 {
            scores[h].abs() / total
        } else {
            1.0 / nh as f64
        }
    };
    let miss = 1.0 / (n - nh) as f64;

    let mut best = RunningSum { es: 0.0, peak: 0 };
    let mut hit_sum = 0.0;
    for (j, &pos) in hits.iter().enumerate() {
        let misses = (pos - j) as f64 * miss;
        let before = hit_sum - misses;
        if before.abs() > best.es.abs() {
            best = RunningSum {
                es: before,
                peak: pos.saturating_sub(1),
            };
        }
        hit_sum += weight(pos);
        let after = hit_sum - misses;
        if after.abs() > best.es.abs() {
            best = RunningSum { es: after, peak: pos };
        }
    }
    best
}

/// Run GSEA for every gene set of `corpus` against `ranked`.
///
/// Returns terms with BH-adjusted p at most `options.p_cutoff`, by
/// ascending p.
pub fn gsea(
    ranked: &RankedList,
    corpus: &AnnotationCorpus,
    options: &EnrichmentOptions,
) -> Vec<EnrichmentResult> {
    let ids: Vec<&str> = ranked.ids().collect();
    let scores: Vec<f64> = ranked.scores().collect();
    let rank_of: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let tested: Vec<EnrichmentResult> = corpus
        .sets
        .par_iter()
        .enumerate()
        .filter_map(|(set_index, set)| {
            let mut hits: Vec<usize> = set
                .genes
                .iter()
                .filter_map(|g| rank_of.get(g.as_str()).copied())
                .collect();
            if hits.len() < options.min_set_size
                || hits.len() > options.max_set_size
                || hits.len() >= scores.len()
            {
                return None;
            }
            hits.sort_unstable();

            let observed = enrichment_score(&scores, &hits);
            let seed = options.seed.wrapping_add(set_index as u64);
            let null = permutation_null(&scores, hits.len(), options.permutations, seed);
            let (nes, p_value) = normalize(observed.es, &null);

            let leading_edge: Vec<String> = hits
                .iter()
                .filter(|&&h| if observed.es >= 0.0 { h <= observed.peak } else { h > observed.peak })
                .map(|&h| ids[h].to_string())
                .collect();

            Some(EnrichmentResult {
                method: Method::Gsea,
                corpus: corpus.name.clone(),
                term: set.term.clone(),
                description: set.description.clone(),
                set_size: hits.len(),
                overlap: leading_edge.len(),
                score: nes,
                p_value,
                p_adjust: f64::NAN,
                genes: leading_edge,
            })
        })
        .collect();

    finish(tested, options.p_cutoff)
}

fn permutation_null(scores: &[f64], set_size: usize, permutations: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut positions: Vec<usize> = (0..scores.len()).collect();
    let mut sample = Vec::with_capacity(set_size);

    (0..permutations)
        .map(|_| {
            let (chosen, _) = positions.partial_shuffle(&mut rng, set_size);
            sample.clear();
            sample.extend_from_slice(chosen);
            sample.sort_unstable();
            enrichment_score(scores, &sample).es
        })
        .collect()
}

/// NES and nominal p-value against the same-signed part of the null.
fn normalize(es: f64, null: &[f64]) -> (f64, f64) {
    let same_sign: Vec<f64> = if es >= 0.0 {
        null.iter().copied().filter(|v| *v >= 0.0).collect()
    } else {
        null.iter().copied().filter(|v| *v < 0.0).collect()
    };
    let as_extreme = if es >= 0.0 {
        same_sign.iter().filter(|v| **v >= es).count()
    } else {
        same_sign.iter().filter(|v| **v <= es).count()
    };
    let p_value = (as_extreme + 1) as f64 / (same_sign.len() + 1) as f64;

    let mean_abs = same_sign.iter().map(|v| v.abs()).sum::<f64>() / same_sign.len() as f64;
    let nes = if mean_abs > 0.0 { es / mean_abs } else { f64::NAN };
    (nes, p_value.min(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::GeneSet;

    fn ranked(n: usize) -> RankedList {
        RankedList::new((0..n).map(|i| (format!("g{i}"), 2.0 - i as f64 * 0.04)).collect()).unwrap()
    }

    fn set(term: &str, genes: impl Iterator<Item = usize>) -> GeneSet {
        GeneSet {
            term: term.into(),
            description: String::new(),
            genes: genes.map(|i| format!("g{i}")).collect(),
        }
    }

    fn options() -> EnrichmentOptions {
        EnrichmentOptions {
            permutations: 500,
            p_cutoff: 1.0,
            ..EnrichmentOptions::default()
        }
    }

    #[test]
    fn top_set_scores_one() {
        let scores = vec![3.0, 2.0, 1.0, 0.5, 0.1];
        let run = enrichment_score(&scores, &[0, 1]);
        assert!((run.es - 1.0).abs() < 1e-12);
        assert_eq!(run.peak, 1);

        let bottom = enrichment_score(&scores, &[3, 4]);
        assert!((bottom.es + 1.0).abs() < 1e-12);
        assert_eq!(bottom.peak, 2);
    }

    #[test]
    fn detects_both_tails() {
        let corpus = AnnotationCorpus {
            name: "Reactome".into(),
            sets: vec![
                set("up", 0..12),
                set("down", 88..100),
                set("spread", (0..100).step_by(8)),
            ],
        };
        let results = gsea(&ranked(100), &corpus, &options());
        let by_term = |t: &str| results.iter().find(|r| r.term == t).unwrap();

        let up = by_term("up");
        assert!(up.score > 1.0);
        assert!(up.p_value < 0.01);
        assert_eq!(up.overlap, 12);

        let down = by_term("down");
        assert!(down.score < -1.0);
        assert!(down.p_value < 0.01);

        let spread = by_term("spread");
        assert!(spread.p_value > 0.05);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let corpus = AnnotationCorpus {
            name: "GO".into(),
            sets: vec![set("a", (0..100).step_by(7)), set("b", 20..35)],
        };
        let first = gsea(&ranked(100), &corpus, &options());
        let second = gsea(&ranked(100), &corpus, &options());
        assert_eq!(first, second);
    }

    #[test]
    fn size_limits_skip_sets() {
        let corpus = AnnotationCorpus {
            name: "DO".into(),
            sets: vec![set("small", 0..3)],
        };
        assert!(gsea(&ranked(50), &corpus, &options()).is_empty());
    }
}
