/// Rounds to `ndigits` decimals like Python 3 `round`, working on the exact
/// binary value: `2.675` is stored just below itself and becomes `2.67`.
pub(crate) fn py_round(value: f64, ndigits: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }

    format!("{value:.ndigits$}").parse::<f64>().unwrap_or(value)
}

/// Median of a depth array; the mean of the two middle values for even
/// lengths. `None` for an empty array.
pub(crate) fn median_depth(values: &[u32]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    let middle = sorted.len() / 2;
    let (lower, upper, _) = sorted.select_nth_unstable(middle);
    let upper = f64::from(*upper);
    if values.len() % 2 == 1 {
        return Some(upper);
    }

    let lower = lower.iter().copied().max().map_or(upper, f64::from);
    Some((lower + upper) / 2.0)
}

/// Largest present value, skipping gaps. `None` when nothing is present.
pub(crate) fn max_present(values: &[Option<f64>]) -> Option<f64> {
    values.iter().flatten().copied().reduce(f64::max)
}

#[cfg(test)]
mod tests {
    use super::{max_present, median_depth, py_round};

    #[test]
    fn py_round_matches_python_ties() {
        assert_eq!(py_round(2.675, 2), 2.67);
        assert_eq!(py_round(1.0 / 3.0, 3), 0.333);
        assert_eq!(py_round(2.0 / 3.0, 3), 0.667);
        assert!(py_round(f64::NAN, 3).is_nan());
    }

    #[test]
    fn median_depth_handles_odd_and_even_lengths() {
        assert_eq!(median_depth(&[]), None);
        assert_eq!(median_depth(&[7]), Some(7.0));
        assert_eq!(median_depth(&[5, 1, 3]), Some(3.0));
        assert_eq!(median_depth(&[4, 1, 3, 2]), Some(2.5));
        assert_eq!(median_depth(&[0, 0, 2, 2]), Some(1.0));
    }

    #[test]
    fn max_present_skips_missing_values() {
        assert_eq!(max_present(&[]), None);
        assert_eq!(max_present(&[None, None]), None);
        assert_eq!(max_present(&[None, Some(0.25), Some(0.0), None]), Some(0.25));
    }
}
