//! 测试用合成数据: 64x64x20 体积中的球形前列腺.

use ndarray::Array3;

use crate::data::{Geometry, Mask, Volume, VolumePair};

/// `(z, y, x)` 排列的数据形状.
pub const SHAPE: (usize, usize, usize) = (20, 64, 64);

/// 球心与半径 (体素).
pub const CENTER: (i64, i64, i64) = (10, 32, 32);
pub const RADIUS: i64 = 6;

/// 球内体素个数.
pub const SPHERE_VOXELS: usize = 925;

/// `[x, y, z]` 分辨率.
pub const SPACING: [f64; 3] = [0.5, 0.5, 3.0];

fn in_sphere((z, y, x): (usize, usize, usize)) -> bool {
    let d = |a: usize, c: i64| (a as i64 - c).pow(2);
    d(z, CENTER.0) + d(y, CENTER.1) + d(x, CENTER.2) <= RADIUS * RADIUS
}

pub fn geometry() -> Geometry {
    Geometry::from_spacing(SPACING).unwrap()
}

pub fn sphere_mask() -> Mask {
    Mask::new(Array3::from_shape_fn(SHAPE, |i| in_sphere(i) as u8), geometry())
}

/// 球内偏亮且带有确定性纹理, 球外为较暗的背景.
pub fn sphere_image() -> Volume {
    let data = Array3::from_shape_fn(SHAPE, |idx @ (z, y, x)| {
        let texture = ((z * 7 + y * 13 + x * 31) % 17) as f32;
        match in_sphere(idx) {
            true => 200.0 + 4.0 * texture + (y as f32 - 32.0).abs(),
            false => 50.0 + texture,
        }
    });
    Volume::new(data, geometry())
}

pub fn sphere_pair() -> VolumePair {
    VolumePair {
        image: sphere_image(),
        mask: sphere_mask(),
    }
}
