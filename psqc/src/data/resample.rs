//! 将标注重采样到另一网格.

use nalgebra::Vector3;
use ndarray::Array3;

use super::{Geometry, Mask, SpatialAttr};
use crate::Idx3d;

/// 以最近邻插值将 `mask` 重采样到由 `geometry` 和 `shape` 描述的网格.
///
/// 目标体素中心的物理坐标被映射回 `mask` 的连续索引并四舍五入;
/// 落在 `mask` 网格之外的体素记为背景.
pub fn resample_nearest(mask: &Mask, geometry: &Geometry, shape: Idx3d) -> Mask {
    let (sz, sy, sx) = mask.shape();
    let src = mask.data();
    let round = |c: f64, len: usize| {
        let i = (c + 0.5).floor();
        (i >= 0.0 && i < len as f64).then_some(i as usize)
    };

    let data = Array3::from_shape_fn(shape, |idx| {
        let p: Vector3<f64> = geometry.index_to_physical(idx);
        let c = mask.geometry().physical_to_continuous_index(&p);
        match (round(c.z, sz), round(c.y, sy), round(c.x, sx)) {
            (Some(z), Some(y), Some(x)) => src[(z, y, x)],
            _ => 0,
        }
    });
    Mask::new(data, geometry.clone())
}
