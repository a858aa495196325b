//! 单个区域的感兴趣体 (ROI): 包围盒裁剪与强度离散化.

use ndarray::{s, Array3, ArrayView3, Zip};

use super::Region;
use crate::error::ExtractionError;
use crate::Idx3d;

/// 裁剪到区域包围盒内的图像, 标注与离散灰度.
#[derive(Debug, Clone)]
pub(crate) struct Roi {
    pub region: Region,
    /// 包围盒内的区域标注.
    pub mask: Array3<bool>,
    /// 离散灰度, 区域外为 0, 区域内从 1 开始.
    pub levels: Array3<u32>,
    /// 区域内出现过的灰度, 升序.
    pub gray_levels: Vec<u32>,
    /// 区域内体素强度, 按行优先顺序.
    pub values: Vec<f64>,
    /// `(z, y, x)` 排列的体素分辨率.
    pub spacing: [f64; 3],
}

impl Roi {
    /// 以 `bin_count` 个等宽 bin 离散化区域内强度.
    ///
    /// bin 宽度 `w = (max - min) / bin_count`, 下界 `lo = min - (min mod w)`,
    /// 灰度 `floor((x - lo) / w) + 1`.
    pub fn new(
        image: ArrayView3<'_, f32>,
        mask: ArrayView3<'_, bool>,
        spacing: [f64; 3],
        region: Region,
        bin_count: u32,
    ) -> Result<Self, ExtractionError> {
        let ((z0, y0, x0), (z1, y1, x1)) =
            bounding_box(mask).ok_or(ExtractionError::EmptyRegion(region))?;
        let image = image.slice(s![z0..=z1, y0..=y1, x0..=x1]).mapv(|v| v as f64);
        let mask = mask.slice(s![z0..=z1, y0..=y1, x0..=x1]).to_owned();

        let values: Vec<f64> = Zip::from(&image)
            .and(&mask)
            .fold(Vec::new(), |mut acc, v, m| {
                if *m {
                    acc.push(*v);
                }
                acc
            });
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ExtractionError::NonFiniteIntensity(region));
        }
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        let width = (max - min) / bin_count as f64;
        if !(width > 0.0) {
            return Err(ExtractionError::FlatIntensity(region));
        }
        let low = min - min.rem_euclid(width);

        let levels = Zip::from(&image).and(&mask).map_collect(|v, m| match *m {
            true => ((v - low) / width).floor() as u32 + 1,
            false => 0,
        });
        let mut gray_levels: Vec<u32> = levels.iter().copied().filter(|l| *l > 0).collect();
        gray_levels.sort_unstable();
        gray_levels.dedup();

        Ok(Self {
            region,
            mask,
            levels,
            gray_levels,
            values,
            spacing,
        })
    }

    /// 区域内体素个数.
    #[inline]
    pub fn voxel_count(&self) -> usize {
        self.values.len()
    }

    /// 位于区域内的相邻体素的灰度. 越界或在区域外时返回 `None`.
    #[inline]
    pub fn level_at(&self, (z, y, x): Idx3d, (dz, dy, dx): (isize, isize, isize)) -> Option<u32> {
        let z = z.checked_add_signed(dz)?;
        let y = y.checked_add_signed(dy)?;
        let x = x.checked_add_signed(dx)?;
        match self.levels.get((z, y, x)) {
            Some(l) if *l > 0 => Some(*l),
            _ => None,
        }
    }

    /// 灰度 `level` 在 [`Roi::gray_levels`] 中的位置.
    #[inline]
    pub fn level_index(&self, level: u32) -> usize {
        self.gray_levels.partition_point(|l| *l < level)
    }

    /// 按行优先顺序遍历区域内体素的索引与灰度.
    pub fn voxels(&self) -> impl Iterator<Item = (Idx3d, u32)> + '_ {
        self.levels
            .indexed_iter()
            .filter(|(_, l)| **l > 0)
            .map(|(idx, l)| (idx, *l))
    }
}

/// 前景包围盒 (两端均包含). 没有前景时返回 `None`.
fn bounding_box(mask: ArrayView3<'_, bool>) -> Option<(Idx3d, Idx3d)> {
    mask.indexed_iter()
        .filter(|(_, m)| **m)
        .fold(None, |acc, ((z, y, x), _)| match acc {
            None => Some(((z, y, x), (z, y, x))),
            Some(((z0, y0, x0), (z1, y1, x1))) => Some((
                (z0.min(z), y0.min(y), x0.min(x)),
                (z1.max(z), y1.max(y), x1.max(x)),
            )),
        })
}

#[cfg(test)]
mod tests {
    use super::Roi;
    use crate::error::ExtractionError;
    use crate::radiomics::Region;
    use ndarray::Array3;

    #[test]
    fn test_roi_crop_and_levels() {
        let image = Array3::from_shape_fn((3, 4, 4), |(z, y, x)| (z * 16 + y * 4 + x) as f32);
        let mut mask = Array3::from_elem((3, 4, 4), false);
        mask[(1, 1, 1)] = true;
        mask[(1, 2, 3)] = true;
        mask[(2, 1, 2)] = true;

        let roi = Roi::new(image.view(), mask.view(), [1.0; 3], Region::WholeProstate, 4).unwrap();
        assert_eq!(roi.mask.dim(), (2, 2, 3));
        assert_eq!(roi.values, [21.0, 27.0, 38.0]);
        assert_eq!(roi.voxel_count(), 3);
        // w = 17 / 4 = 4.25, lo = 21 - 21 mod 4.25 = 17.
        assert_eq!(roi.levels[(0, 0, 0)], 1);
        assert_eq!(roi.levels[(0, 1, 2)], 3);
        assert_eq!(roi.levels[(1, 0, 1)], 5);
        assert_eq!(roi.levels[(0, 0, 1)], 0);
        assert_eq!(roi.gray_levels, [1, 3, 5]);
        assert_eq!(roi.level_index(5), 2);
        assert_eq!(roi.level_at((0, 0, 0), (1, 0, 1)), Some(5));
        assert_eq!(roi.level_at((0, 0, 0), (-1, 0, 0)), None);
        assert_eq!(roi.level_at((0, 0, 0), (0, 0, 1)), None);
    }

    #[test]
    fn test_roi_errors() {
        let image = Array3::from_elem((2, 2, 2), 5.0_f32);
        let empty = Array3::from_elem((2, 2, 2), false);
        let full = Array3::from_elem((2, 2, 2), true);
        let e = Roi::new(image.view(), empty.view(), [1.0; 3], Region::Apex, 64).unwrap_err();
        assert_eq!(e, ExtractionError::EmptyRegion(Region::Apex));
        let e = Roi::new(image.view(), full.view(), [1.0; 3], Region::Base, 64).unwrap_err();
        assert_eq!(e, ExtractionError::FlatIntensity(Region::Base));

        let mut image = image;
        image[(0, 0, 0)] = f32::NAN;
        let e = Roi::new(image.view(), full.view(), [1.0; 3], Region::Base, 64).unwrap_err();
        assert_eq!(e, ExtractionError::NonFiniteIntensity(Region::Base));
    }
}
