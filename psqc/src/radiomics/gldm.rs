//! 灰度相依矩阵 (GLDM) 特征.
//!
//! 体素的相依数为其 26 邻域内位于区域中, 且灰度差不超过 α 的体素个数;
//! 矩阵列 `j = 相依数 + 1`.

use super::matrix::{EmphasisStats, LengthCounter};
use super::neighbours::neighbours_26;
use super::roi::Roi;
use super::{FeatureClass, NamedFeatures};
use crate::consts::radiomics::GLDM_ALPHA;
use crate::error::ExtractionError;

pub(crate) fn compute(roi: &Roi) -> Result<NamedFeatures, ExtractionError> {
    let mut counter = LengthCounter::new(roi.gray_levels.len());
    for (idx, level) in roi.voxels() {
        let dependent = neighbours_26()
            .filter_map(|d| roi.level_at(idx, d))
            .filter(|l| l.abs_diff(level) <= GLDM_ALPHA)
            .count();
        counter.add(roi.level_index(level), dependent + 1);
    }
    let counts = counter.into_counts();
    let s = EmphasisStats::new(&roi.gray_levels, &counts)
        .ok_or(ExtractionError::DegenerateTexture(roi.region, FeatureClass::Gldm))?;

    Ok(vec![
        ("DependenceEntropy", s.entropy),
        ("DependenceNonUniformity", s.length_non_uniformity),
        (
            "DependenceNonUniformityNormalized",
            s.length_non_uniformity_normalized(),
        ),
        ("DependenceVariance", s.length_variance),
        ("GrayLevelNonUniformity", s.gray_non_uniformity),
        ("GrayLevelVariance", s.gray_variance),
        ("HighGrayLevelEmphasis", s.high_gray),
        ("LargeDependenceEmphasis", s.long),
        ("LargeDependenceHighGrayLevelEmphasis", s.long_high_gray),
        ("LargeDependenceLowGrayLevelEmphasis", s.long_low_gray),
        ("LowGrayLevelEmphasis", s.low_gray),
        ("SmallDependenceEmphasis", s.short),
        ("SmallDependenceHighGrayLevelEmphasis", s.short_high_gray),
        ("SmallDependenceLowGrayLevelEmphasis", s.short_low_gray),
    ])
}
