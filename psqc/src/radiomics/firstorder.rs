//! 一阶统计特征. 除熵与均匀度使用离散灰度直方图外, 均基于原始强度.

use super::roi::Roi;
use super::NamedFeatures;
use crate::consts::radiomics::{EPS, VOXEL_ARRAY_SHIFT};
use crate::stats::{percentile_sorted, sorted_finite};

pub(crate) fn compute(roi: &Roi) -> NamedFeatures {
    let n = roi.voxel_count() as f64;
    let sorted = sorted_finite(roi.values.iter().copied());
    let pct = |q: f64| percentile_sorted(&sorted, q);

    let minimum = sorted[0];
    let maximum = sorted[sorted.len() - 1];
    let p10 = pct(10.0);
    let p90 = pct(90.0);
    let median = pct(50.0);
    let iqr = pct(75.0) - pct(25.0);

    let mean = roi.values.iter().sum::<f64>() / n;
    let energy: f64 = roi.values.iter().map(|v| (v + VOXEL_ARRAY_SHIFT).powi(2)).sum();
    let voxel_volume: f64 = roi.spacing.iter().product();

    let central = |k: i32| roi.values.iter().map(|v| (v - mean).powi(k)).sum::<f64>() / n;
    let m2 = central(2);
    let m3 = central(3);
    let m4 = central(4);
    let (skewness, kurtosis) = match m2 {
        v if v == 0.0 => (0.0, 0.0),
        v => (m3 / v.powf(1.5), m4 / (v * v)),
    };

    let mad = roi.values.iter().map(|v| (v - mean).abs()).sum::<f64>() / n;
    let robust: Vec<f64> = roi
        .values
        .iter()
        .copied()
        .filter(|v| *v >= p10 && *v <= p90)
        .collect();
    let robust_mad = match robust.len() {
        0 => 0.0,
        len => {
            let m = robust.iter().sum::<f64>() / len as f64;
            robust.iter().map(|v| (v - m).abs()).sum::<f64>() / len as f64
        }
    };

    // 离散灰度直方图.
    let mut histogram = vec![0.0_f64; roi.gray_levels.len()];
    for (_, level) in roi.voxels() {
        histogram[roi.level_index(level)] += 1.0;
    }
    let (entropy, uniformity) = histogram.iter().fold((0.0, 0.0), |(e, u), c| {
        let p = c / n;
        (e - p * (p + EPS).log2(), u + p * p)
    });

    vec![
        ("10Percentile", p10),
        ("90Percentile", p90),
        ("Energy", energy),
        ("Entropy", entropy),
        ("InterquartileRange", iqr),
        ("Kurtosis", kurtosis),
        ("Maximum", maximum),
        ("Mean", mean),
        ("MeanAbsoluteDeviation", mad),
        ("Median", median),
        ("Minimum", minimum),
        ("Range", maximum - minimum),
        ("RobustMeanAbsoluteDeviation", robust_mad),
        ("RootMeanSquared", (energy / n).sqrt()),
        ("Skewness", skewness),
        ("TotalEnergy", voxel_volume * energy),
        ("Uniformity", uniformity),
        ("Variance", m2),
    ]
}

#[cfg(test)]
mod tests {
    use super::compute;
    use crate::radiomics::roi::Roi;
    use crate::radiomics::Region;
    use ndarray::{array, Array3};

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_firstorder_values() {
        let image = array![[[1.0_f32, 2.0, 3.0, 4.0]]];
        let mask = Array3::from_elem((1, 1, 4), true);
        let roi = Roi::new(image.view(), mask.view(), [0.5, 1.0, 2.0], Region::WholeProstate, 3)
            .unwrap();
        let fs = compute(&roi);
        assert_eq!(fs.len(), 18);
        let get = |name: &str| fs.iter().find(|(n, _)| *n == name).unwrap().1;

        assert!(f64_eq(get("Mean"), 2.5));
        assert!(f64_eq(get("Median"), 2.5));
        assert!(f64_eq(get("Minimum"), 1.0));
        assert!(f64_eq(get("Maximum"), 4.0));
        assert!(f64_eq(get("Range"), 3.0));
        assert!(f64_eq(get("10Percentile"), 1.3));
        assert!(f64_eq(get("90Percentile"), 3.7));
        assert!(f64_eq(get("InterquartileRange"), 1.5));
        assert!(f64_eq(get("Energy"), 30.0));
        assert!(f64_eq(get("TotalEnergy"), 30.0));
        assert!(f64_eq(get("RootMeanSquared"), 7.5_f64.sqrt()));
        assert!(f64_eq(get("Variance"), 1.25));
        assert!(f64_eq(get("MeanAbsoluteDeviation"), 1.0));
        // [1.3, 3.7] 内的值为 2, 3.
        assert!(f64_eq(get("RobustMeanAbsoluteDeviation"), 0.5));
        assert!(f64_eq(get("Skewness"), 0.0));
        assert!(f64_eq(get("Kurtosis"), (2.0 * 2.25_f64.powi(2) + 2.0 * 0.25_f64.powi(2)) / 4.0 / 1.5625));
        // w = 1, lo = 1 - (1 mod 1) = 1 => 灰度 1, 2, 3, 4 各一个.
        assert!(f64_eq(get("Uniformity"), 0.25));
        assert!((get("Entropy") - 2.0).abs() < 1e-9);
    }
}
