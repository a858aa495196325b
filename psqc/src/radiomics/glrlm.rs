//! 灰度游程矩阵 (GLRLM) 特征.
//!
//! 游程沿 13 个方向统计, 离开区域或灰度改变即中断. 逐方向计算后取平均.

use super::matrix::{EmphasisStats, LengthCounter};
use super::neighbours::DIRECTIONS_13;
use super::roi::Roi;
use super::{average_features, FeatureClass, NamedFeatures};
use crate::error::ExtractionError;

pub(crate) fn compute(roi: &Roi) -> Result<NamedFeatures, ExtractionError> {
    let per_angle: Vec<NamedFeatures> = DIRECTIONS_13
        .iter()
        .filter_map(|d| {
            let counts = run_lengths(roi, *d).into_counts();
            EmphasisStats::new(&roi.gray_levels, &counts).map(|s| features(&s))
        })
        .collect();
    average_features(per_angle)
        .ok_or(ExtractionError::DegenerateTexture(roi.region, FeatureClass::Glrlm))
}

/// 单方向的游程计数.
fn run_lengths(roi: &Roi, (dz, dy, dx): (isize, isize, isize)) -> LengthCounter {
    let mut counter = LengthCounter::new(roi.gray_levels.len());
    for (idx, level) in roi.voxels() {
        // 只从游程起点开始计数.
        if roi.level_at(idx, (-dz, -dy, -dx)) == Some(level) {
            continue;
        }
        let mut length = 1;
        while roi.level_at(idx, (dz * length, dy * length, dx * length)) == Some(level) {
            length += 1;
        }
        counter.add(roi.level_index(level), length as usize);
    }
    counter
}

fn features(s: &EmphasisStats) -> NamedFeatures {
    // 每个体素在每个方向上恰属于一个游程, 因此 Np = Σ P j.
    let voxels = s.mass;
    vec![
        ("GrayLevelNonUniformity", s.gray_non_uniformity),
        (
            "GrayLevelNonUniformityNormalized",
            s.gray_non_uniformity_normalized(),
        ),
        ("GrayLevelVariance", s.gray_variance),
        ("HighGrayLevelRunEmphasis", s.high_gray),
        ("LongRunEmphasis", s.long),
        ("LongRunHighGrayLevelEmphasis", s.long_high_gray),
        ("LongRunLowGrayLevelEmphasis", s.long_low_gray),
        ("LowGrayLevelRunEmphasis", s.low_gray),
        ("RunEntropy", s.entropy),
        ("RunLengthNonUniformity", s.length_non_uniformity),
        (
            "RunLengthNonUniformityNormalized",
            s.length_non_uniformity_normalized(),
        ),
        ("RunPercentage", s.total / voxels),
        ("RunVariance", s.length_variance),
        ("ShortRunEmphasis", s.short),
        ("ShortRunHighGrayLevelEmphasis", s.short_high_gray),
        ("ShortRunLowGrayLevelEmphasis", s.short_low_gray),
    ]
}

#[cfg(test)]
mod tests {
    use super::{compute, run_lengths};
    use crate::radiomics::roi::Roi;
    use crate::radiomics::Region;
    use ndarray::{array, Array3};

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_glrlm_runs_along_x() {
        // 灰度 1, 1, 1, 2, 1; 第 5 个体素不在区域内.
        let image = array![[[0.0_f32, 0.0, 0.0, 1.0, 0.0, 0.0]]];
        let mut mask = Array3::from_elem((1, 1, 6), true);
        mask[(0, 0, 4)] = false;
        let roi = Roi::new(image.view(), mask.view(), [1.0; 3], Region::WholeProstate, 1).unwrap();
        assert_eq!(roi.gray_levels, [1, 2]);

        let m = run_lengths(&roi, (0, 0, 1)).into_counts();
        assert_eq!(m, array![[1.0, 0.0, 1.0], [1.0, 0.0, 0.0]]);
        // 其他方向上所有游程长度均为 1.
        let m = run_lengths(&roi, (0, 1, 0)).into_counts();
        assert_eq!(m, array![[4.0], [1.0]]);
    }

    #[test]
    fn test_glrlm_features() {
        let image = array![[[0.0_f32, 0.0, 0.0, 1.0]]];
        let mask = Array3::from_elem((1, 1, 4), true);
        let roi = Roi::new(image.view(), mask.view(), [1.0; 3], Region::WholeProstate, 1).unwrap();
        let fs = compute(&roi).unwrap();
        assert_eq!(fs.len(), 16);
        let get = |name: &str| fs.iter().find(|(n, _)| *n == name).unwrap().1;
        // 12 个方向: 4 个长度 1 的游程; x 方向: [[0, 0, 1], [1, 0, 0]].
        let rp = (12.0 * 1.0 + 2.0 / 4.0) / 13.0;
        assert!(f64_eq(get("RunPercentage"), rp));
        let sre = (12.0 * 1.0 + (1.0 / 9.0 + 1.0) / 2.0) / 13.0;
        assert!(f64_eq(get("ShortRunEmphasis"), sre));
    }
}
