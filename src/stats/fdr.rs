/// Benjamini–Hochberg adjusted p-values, returned in input order.
///
/// NaN inputs stay NaN and do not count towards the number of tests.
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..p_values.len())
        .filter(|&i| !p_values[i].is_nan())
        .collect();
    order.sort_unstable_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let n = order.len() as f64;
    let mut adjusted = vec![f64::NAN; p_values.len()];
    let mut running_min: f64 = 1.0;

    // Walk from the largest p-value down, carrying the minimum.
    for (rank, &idx) in order.iter().enumerate().rev() {
        let q = p_values[idx] * n / (rank + 1) as f64;
        running_min = running_min.min(q);
        adjusted[idx] = running_min.min(1.0);
    }
    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reference_values() {
        // p.adjust(c(0.01, 0.04, 0.03, 0.005), "BH")
        let adj = benjamini_hochberg(&[0.01, 0.04, 0.03, 0.005]);
        let expected = [0.02, 0.04, 0.04, 0.02];
        for (a, e) in adj.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "{a} vs {e}");
        }
    }

    #[test]
    fn adjusted_is_monotone_and_not_below_raw() {
        let raw = [0.2, 0.001, 0.7, 0.04, 0.03, 0.9, 0.0005, 0.5];
        let adj = benjamini_hochberg(&raw);

        let mut idx: Vec<usize> = (0..raw.len()).collect();
        idx.sort_by(|&a, &b| raw[a].total_cmp(&raw[b]));
        for w in idx.windows(2) {
            assert!(adj[w[0]] <= adj[w[1]]);
        }
        for (r, a) in raw.iter().zip(&adj) {
            assert!(a >= r);
            assert!(*a <= 1.0);
        }
    }

    #[test]
    fn nan_passes_through() {
        let adj = benjamini_hochberg(&[0.01, f64::NAN, 0.02]);
        assert!(adj[1].is_nan());
        assert!((adj[0] - 0.02).abs() < 1e-12);
        assert!((adj[2] - 0.02).abs() < 1e-12);
    }

    #[test]
    fn empty_input() {
        assert!(benjamini_hochberg(&[]).is_empty());
    }
}
