//! 邻域灰度差矩阵 (NGTDM) 特征.
//!
//! 对区域内每个体素, 取其 26 邻域内位于区域中的体素的平均灰度 `Ā`,
//! 累加 `s_i = Σ |i - Ā|`. 没有有效邻居的体素不参与统计.

use super::neighbours::neighbours_26;
use super::roi::Roi;
use super::{FeatureClass, NamedFeatures};
use crate::consts::radiomics::COARSENESS_ON_ZERO;
use crate::error::ExtractionError;

pub(crate) fn compute(roi: &Roi) -> Result<NamedFeatures, ExtractionError> {
    let n_levels = roi.gray_levels.len();
    let mut counts = vec![0.0_f64; n_levels];
    let mut sums = vec![0.0_f64; n_levels];

    for (idx, level) in roi.voxels() {
        let (total, valid) = neighbours_26()
            .filter_map(|d| roi.level_at(idx, d))
            .fold((0.0, 0_u32), |(t, n), l| (t + l as f64, n + 1));
        if valid == 0 {
            continue;
        }
        let r = roi.level_index(level);
        counts[r] += 1.0;
        sums[r] += (level as f64 - total / valid as f64).abs();
    }

    let nvp: f64 = counts.iter().sum();
    if nvp == 0.0 {
        return Err(ExtractionError::DegenerateTexture(
            roi.region,
            FeatureClass::Ngtdm,
        ));
    }

    // (i, p_i, s_i), 仅保留 p_i > 0 的灰度.
    let rows: Vec<(f64, f64, f64)> = roi
        .gray_levels
        .iter()
        .zip(counts.iter().zip(&sums))
        .filter(|(_, (n, _))| **n > 0.0)
        .map(|(i, (n, s))| (*i as f64, n / nvp, *s))
        .collect();
    let ngp = rows.len() as f64;
    let sum_s: f64 = rows.iter().map(|r| r.2).sum();
    let sum_ps: f64 = rows.iter().map(|r| r.1 * r.2).sum();

    let coarseness = match sum_ps {
        v if v == 0.0 => COARSENESS_ON_ZERO,
        v => 1.0 / v,
    };

    let mut contrast_sum = 0.0;
    let mut busyness_den = 0.0;
    let mut complexity = 0.0;
    let mut strength_num = 0.0;
    for (i, pi, si) in &rows {
        for (j, pj, sj) in &rows {
            let d = i - j;
            contrast_sum += pi * pj * d * d;
            busyness_den += (i * pi - j * pj).abs();
            complexity += d.abs() * (pi * si + pj * sj) / (pi + pj);
            strength_num += (pi + pj) * d * d;
        }
    }

    let contrast = match ngp > 1.0 {
        true => contrast_sum / (ngp * (ngp - 1.0)) * sum_s / nvp,
        false => 0.0,
    };
    let busyness = match busyness_den {
        v if v == 0.0 => 0.0,
        v => sum_ps / v,
    };
    let strength = match sum_s {
        v if v == 0.0 => 0.0,
        v => strength_num / v,
    };

    Ok(vec![
        ("Busyness", busyness),
        ("Coarseness", coarseness),
        ("Complexity", complexity / nvp),
        ("Contrast", contrast),
        ("Strength", strength),
    ])
}
