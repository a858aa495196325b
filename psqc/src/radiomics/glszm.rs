//! 灰度区域大小矩阵 (GLSZM) 特征. 区域为同灰度体素的 26 连通分量.

use std::collections::VecDeque;

use ndarray::Array3;

use super::matrix::{EmphasisStats, LengthCounter};
use super::neighbours::neighbours_26;
use super::roi::Roi;
use super::{FeatureClass, NamedFeatures};
use crate::error::ExtractionError;

pub(crate) fn compute(roi: &Roi) -> Result<NamedFeatures, ExtractionError> {
    let counts = zone_sizes(roi).into_counts();
    let s = EmphasisStats::new(&roi.gray_levels, &counts)
        .ok_or(ExtractionError::DegenerateTexture(roi.region, FeatureClass::Glszm))?;
    let voxels = roi.voxel_count() as f64;
    Ok(vec![
        ("GrayLevelNonUniformity", s.gray_non_uniformity),
        (
            "GrayLevelNonUniformityNormalized",
            s.gray_non_uniformity_normalized(),
        ),
        ("GrayLevelVariance", s.gray_variance),
        ("HighGrayLevelZoneEmphasis", s.high_gray),
        ("LargeAreaEmphasis", s.long),
        ("LargeAreaHighGrayLevelEmphasis", s.long_high_gray),
        ("LargeAreaLowGrayLevelEmphasis", s.long_low_gray),
        ("LowGrayLevelZoneEmphasis", s.low_gray),
        ("SizeZoneNonUniformity", s.length_non_uniformity),
        (
            "SizeZoneNonUniformityNormalized",
            s.length_non_uniformity_normalized(),
        ),
        ("SmallAreaEmphasis", s.short),
        ("SmallAreaHighGrayLevelEmphasis", s.short_high_gray),
        ("SmallAreaLowGrayLevelEmphasis", s.short_low_gray),
        ("ZoneEntropy", s.entropy),
        ("ZonePercentage", s.total / voxels),
        ("ZoneVariance", s.length_variance),
    ])
}

/// 以广度优先搜索标记连通分量, 统计每个分量的灰度与大小.
fn zone_sizes(roi: &Roi) -> LengthCounter {
    let mut counter = LengthCounter::new(roi.gray_levels.len());
    let mut visited = Array3::from_elem(roi.levels.dim(), false);
    let mut queue = VecDeque::new();

    for (start, level) in roi.voxels() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        let mut size = 0;
        while let Some(idx) = queue.pop_front() {
            size += 1;
            for d in neighbours_26() {
                if roi.level_at(idx, d) != Some(level) {
                    continue;
                }
                // level_at 保证索引合法.
                let n = (
                    idx.0.wrapping_add_signed(d.0),
                    idx.1.wrapping_add_signed(d.1),
                    idx.2.wrapping_add_signed(d.2),
                );
                if !visited[n] {
                    visited[n] = true;
                    queue.push_back(n);
                }
            }
        }
        counter.add(roi.level_index(level), size);
    }
    counter
}
