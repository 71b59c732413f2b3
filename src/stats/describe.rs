/// Arithmetic mean; NaN for an empty slice.
#[inline]
pub fn mean(slice: &[f64]) -> f64 {
    slice.iter().sum::<f64>() / slice.len() as f64
}

/// Unbiased sample variance (n - 1 denominator); NaN below two values.
#[inline]
pub fn variance(slice: &[f64]) -> f64 {
    let n = slice.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(slice);
    slice.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n - 1) as f64
}

/// Sample standard deviation
#[inline]
pub fn stddev(slice: &[f64]) -> f64 {
    variance(slice).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moments() {
        let x = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&x), 5.0);
        assert!((variance(&x) - 32.0 / 7.0).abs() < 1e-12);
        assert!(variance(&[1.0]).is_nan());
        assert!(mean(&[]).is_nan());
    }
}
