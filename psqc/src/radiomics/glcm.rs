//! 灰度共生矩阵 (GLCM) 特征.
//!
//! 对 13 个方向分别统计距离为 1 的灰度对, 矩阵对称化并归一化后逐方向计算特征,
//! 最后对非空方向取平均. 灰度取离散后的实际值, 未出现的灰度不占行列.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2, Axis};

use super::neighbours::DIRECTIONS_13;
use super::roi::Roi;
use super::{average_features, FeatureClass, NamedFeatures};
use crate::consts::radiomics::EPS;
use crate::error::ExtractionError;

pub(crate) fn compute(roi: &Roi) -> Result<NamedFeatures, ExtractionError> {
    let per_angle: Vec<NamedFeatures> = DIRECTIONS_13
        .iter()
        .filter_map(|d| {
            let p = cooccurrence(roi, *d);
            let total = p.sum();
            (total > 0.0).then(|| angle_features(&(p / total), &roi.gray_levels))
        })
        .collect();
    average_features(per_angle)
        .ok_or(ExtractionError::DegenerateTexture(roi.region, FeatureClass::Glcm))
}

/// 单方向的对称共生计数矩阵.
fn cooccurrence(roi: &Roi, direction: (isize, isize, isize)) -> Array2<f64> {
    let n = roi.gray_levels.len();
    let mut p = Array2::<f64>::zeros((n, n));
    for (idx, level) in roi.voxels() {
        if let Some(other) = roi.level_at(idx, direction) {
            let (a, b) = (roi.level_index(level), roi.level_index(other));
            p[(a, b)] += 1.0;
            p[(b, a)] += 1.0;
        }
    }
    p
}

/// 单方向归一化矩阵 `p` 上的全部特征.
fn angle_features(p: &Array2<f64>, gray_levels: &[u32]) -> NamedFeatures {
    let ng_max = gray_levels.last().copied().unwrap_or(1) as usize;
    let g: Vec<f64> = gray_levels.iter().map(|v| *v as f64).collect();
    let n = g.len();

    let px: Array1<f64> = p.sum_axis(Axis(1));
    let py: Array1<f64> = p.sum_axis(Axis(0));
    let ux: f64 = px.iter().zip(&g).map(|(p, i)| p * i).sum();
    let uy: f64 = py.iter().zip(&g).map(|(p, j)| p * j).sum();
    let sigx = px.iter().zip(&g).map(|(p, i)| p * (i - ux).powi(2)).sum::<f64>().sqrt();
    let sigy = py.iter().zip(&g).map(|(p, j)| p * (j - uy).powi(2)).sum::<f64>().sqrt();

    // p_{x+y}(k), k = 2 ..= 2 Ng; p_{x-y}(k), k = 0 .. Ng.
    let mut sum_p = vec![0.0; 2 * ng_max + 1];
    let mut diff_p = vec![0.0; ng_max];

    let mut autocorrelation = 0.0;
    let mut cluster_prominence = 0.0;
    let mut cluster_shade = 0.0;
    let mut cluster_tendency = 0.0;
    let mut contrast = 0.0;
    let mut correlation_num = 0.0;
    let mut joint_energy = 0.0;
    let mut joint_entropy = 0.0;
    let mut hxy1 = 0.0;
    let mut hxy2 = 0.0;
    let mut max_probability = 0.0_f64;
    let mut sum_squares = 0.0;

    for a in 0..n {
        for b in 0..n {
            let v = p[(a, b)];
            let pxy = px[a] * py[b];
            hxy1 -= v * (pxy + EPS).log2();
            hxy2 -= pxy * (pxy + EPS).log2();
            if v == 0.0 {
                continue;
            }
            let (i, j) = (g[a], g[b]);
            let t = i + j - ux - uy;
            autocorrelation += v * i * j;
            cluster_prominence += v * t.powi(4);
            cluster_shade += v * t.powi(3);
            cluster_tendency += v * t.powi(2);
            contrast += v * (i - j).powi(2);
            correlation_num += v * (i - ux) * (j - uy);
            joint_energy += v * v;
            joint_entropy -= v * (v + EPS).log2();
            max_probability = max_probability.max(v);
            sum_squares += v * (i - ux).powi(2);
            sum_p[(i + j) as usize] += v;
            diff_p[(i - j).abs() as usize] += v;
        }
    }

    let entropy = |q: &Array1<f64>| -q.iter().map(|v| v * (v + EPS).log2()).sum::<f64>();
    let hx = entropy(&px);
    let hy = entropy(&py);
    let hxy = joint_entropy;

    let correlation = match sigx * sigy {
        s if s == 0.0 => 1.0,
        s => correlation_num / s,
    };

    let ng = ng_max as f64;
    let mut difference_average = 0.0;
    let mut id = 0.0;
    let mut idn = 0.0;
    let mut idm = 0.0;
    let mut idmn = 0.0;
    let mut inverse_variance = 0.0;
    let mut difference_entropy = 0.0;
    for (k, v) in diff_p.iter().enumerate() {
        let k = k as f64;
        difference_average += k * v;
        id += v / (1.0 + k);
        idn += v / (1.0 + k / ng);
        idm += v / (1.0 + k * k);
        idmn += v / (1.0 + k * k / (ng * ng));
        if k > 0.0 {
            inverse_variance += v / (k * k);
        }
        difference_entropy -= v * (v + EPS).log2();
    }
    let difference_variance: f64 = diff_p
        .iter()
        .enumerate()
        .map(|(k, v)| (k as f64 - difference_average).powi(2) * v)
        .sum();

    let mut sum_average = 0.0;
    let mut sum_entropy = 0.0;
    for (k, v) in sum_p.iter().enumerate().skip(2) {
        sum_average += k as f64 * v;
        sum_entropy -= v * (v + EPS).log2();
    }

    let imc1 = match hx.max(hy) {
        m if m == 0.0 => 0.0,
        m => (hxy - hxy1) / m,
    };
    let imc2 = (1.0 - (-2.0 * (hxy2 - hxy)).exp()).max(0.0).sqrt();

    vec![
        ("Autocorrelation", autocorrelation),
        ("ClusterProminence", cluster_prominence),
        ("ClusterShade", cluster_shade),
        ("ClusterTendency", cluster_tendency),
        ("Contrast", contrast),
        ("Correlation", correlation),
        ("DifferenceAverage", difference_average),
        ("DifferenceEntropy", difference_entropy),
        ("DifferenceVariance", difference_variance),
        ("Id", id),
        ("Idm", idm),
        ("Idmn", idmn),
        ("Idn", idn),
        ("Imc1", imc1),
        ("Imc2", imc2),
        ("InverseVariance", inverse_variance),
        ("JointAverage", ux),
        ("JointEnergy", joint_energy),
        ("JointEntropy", joint_entropy),
        ("MCC", mcc(p, &px, &py)),
        ("MaximumProbability", max_probability),
        ("SumAverage", sum_average),
        ("SumEntropy", sum_entropy),
        ("SumSquares", sum_squares),
    ]
}

/// 最大相关系数: `Q(i, k) = Σ_j p(i, j) p(k, j) / (px(i) py(j))` 的第二大特征值的平方根.
///
/// 对称矩阵下即 `p(i, j) / sqrt(px(i) py(j))` 的第二大特征值绝对值.
/// 只有一个灰度时为 1.
fn mcc(p: &Array2<f64>, px: &Array1<f64>, py: &Array1<f64>) -> f64 {
    let n = p.nrows();
    if n < 2 {
        return 1.0;
    }
    let a = DMatrix::from_fn(n, n, |r, c| {
        let d = (px[r] * py[c]).sqrt();
        match d > 0.0 {
            true => p[(r, c)] / d,
            false => 0.0,
        }
    });
    let mut eigen: Vec<f64> = a.symmetric_eigenvalues().iter().map(|v| v.abs()).collect();
    eigen.sort_unstable_by(|x, y| y.total_cmp(x));
    eigen[1]
}

#[cfg(test)]
mod tests {
    use super::{angle_features, compute};
    use crate::radiomics::roi::Roi;
    use crate::radiomics::Region;
    use ndarray::{array, Array3};

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn get(fs: &[(&'static str, f64)], name: &str) -> f64 {
        fs.iter().find(|(n, _)| *n == name).unwrap().1
    }

    #[test]
    fn test_glcm_two_levels() {
        // 灰度 1, 2 各一对, 对称矩阵归一化后为 [[0, .5], [.5, 0]].
        let p = array![[0.0, 0.5], [0.5, 0.0]];
        let fs = angle_features(&p, &[1, 2]);
        assert_eq!(fs.len(), 24);
        assert!(f64_eq(get(&fs, "Contrast"), 1.0));
        assert!(f64_eq(get(&fs, "JointAverage"), 1.5));
        assert!(f64_eq(get(&fs, "Autocorrelation"), 2.0));
        assert!(f64_eq(get(&fs, "Correlation"), -1.0));
        assert!(f64_eq(get(&fs, "JointEnergy"), 0.5));
        assert!(f64_eq(get(&fs, "JointEntropy"), 1.0));
        assert!(f64_eq(get(&fs, "DifferenceAverage"), 1.0));
        assert!(f64_eq(get(&fs, "Id"), 0.5));
        assert!(f64_eq(get(&fs, "Idm"), 0.5));
        assert!(f64_eq(get(&fs, "InverseVariance"), 1.0));
        assert!(f64_eq(get(&fs, "SumAverage"), 3.0));
        assert!(f64_eq(get(&fs, "MaximumProbability"), 0.5));
        assert!(f64_eq(get(&fs, "MCC"), 1.0));
        assert!(f64_eq(get(&fs, "SumSquares"), 0.25));
    }

    #[test]
    fn test_glcm_degenerate() {
        let image = Array3::from_shape_fn((3, 3, 3), |(z, y, x)| (z + y + x) as f32);
        let mut mask = Array3::from_elem((3, 3, 3), false);
        mask[(0, 0, 0)] = true;
        mask[(2, 2, 2)] = true;
        let roi = Roi::new(image.view(), mask.view(), [1.0; 3], Region::Apex, 64).unwrap();
        assert!(compute(&roi).is_err());
    }

    #[test]
    fn test_glcm_line() {
        // 1 x 1 x 4 的直线, 灰度 1, 1, 2, 2 (bin 宽 = 2).
        let image = array![[[0.0_f32, 0.0, 2.0, 2.0]]];
        let mask = Array3::from_elem((1, 1, 4), true);
        let roi = Roi::new(image.view(), mask.view(), [1.0; 3], Region::Base, 1).unwrap();
        assert_eq!(roi.gray_levels, [1, 2]);
        let fs = compute(&roi).unwrap();
        // 仅 (0, 0, 1) 方向非空: 计数 [[2, 1], [1, 2]] / 6.
        assert!(f64_eq(get(&fs, "Contrast"), 1.0 / 3.0));
        assert!(f64_eq(get(&fs, "JointAverage"), 1.5));
    }
}
