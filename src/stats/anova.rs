use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use super::describe::mean;

/// One-way ANOVA summary for a single response.
#[derive(Debug, Clone, PartialEq)]
pub struct OneWay {
    pub f_statistic: f64,
    pub df_between: f64,
    pub df_within: f64,
    /// Within-group mean square, reused by the Tukey post-hoc test
    pub mse: f64,
    pub p_value: f64,
}

/// Fit a one-way ANOVA of the response against group membership.
///
/// `groups` holds the observations of each level; empty levels are ignored.
/// Returns `None` when fewer than two levels remain or there are no
/// within-group degrees of freedom.
pub fn one_way(groups: &[Vec<f64>]) -> Option<OneWay> {
    let groups: Vec<&Vec<f64>> = groups.iter().filter(|g| !g.is_empty()).collect();
    let k = groups.len();
    let n: usize = groups.iter().map(|g| g.len()).sum();
    if k < 2 || n <= k {
        return None;
    }

    let grand = groups.iter().flat_map(|g| g.iter()).sum::<f64>() / n as f64;
    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for g in &groups {
        let m = mean(g);
        ss_between += g.len() as f64 * (m - grand).powi(2);
        ss_within += g.iter().map(|x| (x - m).powi(2)).sum::<f64>();
    }

    let df_between = (k - 1) as f64;
    let df_within = (n - k) as f64;
    let ms_between = ss_between / df_between;
    let mse = ss_within / df_within;

    let (f_statistic, p_value) = if mse > 0.0 {
        let f = ms_between / mse;
        let dist = FisherSnedecor::new(df_between, df_within).ok()?;
        (f, dist.sf(f))
    } else if ms_between > 0.0 {
        // No residual variation but separated means.
        (f64::INFINITY, 0.0)
    } else {
        (f64::NAN, 1.0)
    };

    Some(OneWay {
        f_statistic,
        df_between,
        df_within,
        mse,
        p_value,
    })
}
