//! 简单统计工具.

use ordered_float::OrderedFloat;

/// 丢弃非有限值后升序排序.
pub(crate) fn sorted_finite<I: IntoIterator<Item = f64>>(values: I) -> Vec<f64> {
    let mut v: Vec<f64> = values.into_iter().filter(|x| x.is_finite()).collect();
    v.sort_unstable_by_key(|x| OrderedFloat(*x));
    v
}

/// 对已升序排序的数据求第 `q` (0 ~ 100) 百分位, 相邻秩之间线性插值.
///
/// `sorted` 为空时返回 NaN.
pub(crate) fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    let pos = (q / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::{percentile_sorted, sorted_finite};

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_percentile_linear() {
        let v = sorted_finite([4.0, 1.0, f64::NAN, 3.0, 2.0]);
        assert_eq!(v, [1.0, 2.0, 3.0, 4.0]);
        assert!(f64_eq(percentile_sorted(&v, 0.0), 1.0));
        assert!(f64_eq(percentile_sorted(&v, 50.0), 2.5));
        assert!(f64_eq(percentile_sorted(&v, 10.0), 1.3));
        assert!(f64_eq(percentile_sorted(&v, 100.0), 4.0));
        assert!(percentile_sorted(&[], 50.0).is_nan());
    }
}
