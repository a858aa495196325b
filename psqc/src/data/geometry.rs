//! 体素网格的物理空间信息.
//!
//! 数据数组按 `(z, y, x)` 索引 (与 `Idx3d` 一致), 而 `spacing`, `origin`
//! 以及方向矩阵的列均按物理坐标 `(x, y, z)` 排列. 物理坐标系采用 LPS.

use nalgebra::{Matrix3, Vector3};

use crate::consts::GEOMETRY_TOLERANCE;
use crate::error::GeometryError;
use crate::Idx3d;

/// 体素网格的空间元信息: 分辨率, 原点与方向.
///
/// 该结构是只读的. 构造时会校验分辨率并预先计算物理坐标到索引的逆变换.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    spacing: Vector3<f64>,
    origin: Vector3<f64>,
    direction: Matrix3<f64>,
    /// `(direction * diag(spacing))^-1`.
    inverse: Matrix3<f64>,
}

impl Default for Geometry {
    /// 单位分辨率, 零原点, 单位方向.
    fn default() -> Self {
        Self {
            spacing: Vector3::repeat(1.0),
            origin: Vector3::zeros(),
            direction: Matrix3::identity(),
            inverse: Matrix3::identity(),
        }
    }
}

impl Geometry {
    /// 由 `[x, y, z]` 分辨率 (毫米), 原点和方向矩阵创建网格信息.
    ///
    /// `direction` 按行优先给出, 第 `k` 列为第 `k` 个索引轴在物理空间中的方向.
    pub fn new(
        spacing: [f64; 3],
        origin: [f64; 3],
        direction: [f64; 9],
    ) -> Result<Self, GeometryError> {
        if !spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
            return Err(GeometryError::InvalidSpacing(spacing));
        }
        if !origin.iter().chain(direction.iter()).all(|v| v.is_finite()) {
            return Err(GeometryError::SingularDirection);
        }
        let spacing = Vector3::from(spacing);
        let direction = Matrix3::from_row_slice(&direction);
        let inverse = (direction * Matrix3::from_diagonal(&spacing))
            .try_inverse()
            .ok_or(GeometryError::SingularDirection)?;
        Ok(Self {
            spacing,
            origin: Vector3::from(origin),
            direction,
            inverse,
        })
    }

    /// 仅指定分辨率, 原点为零, 方向为单位阵.
    pub fn from_spacing(spacing: [f64; 3]) -> Result<Self, GeometryError> {
        Self::new(spacing, [0.0; 3], identity_rows())
    }

    /// `[x, y, z]` 分辨率, 以毫米为单位.
    #[inline]
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing.into()
    }

    /// 按数据索引顺序 `(z, y, x)` 排列的分辨率.
    #[inline]
    pub fn spacing_zyx(&self) -> [f64; 3] {
        [self.spacing.z, self.spacing.y, self.spacing.x]
    }

    /// 索引 `(0, 0, 0)` 体素中心的物理坐标.
    #[inline]
    pub fn origin(&self) -> [f64; 3] {
        self.origin.into()
    }

    /// 方向矩阵.
    #[inline]
    pub fn direction(&self) -> &Matrix3<f64> {
        &self.direction
    }

    /// 单个体素的体积, 以立方毫米为单位.
    #[inline]
    pub fn voxel_volume(&self) -> f64 {
        self.spacing.iter().product()
    }

    /// 索引 `(z, y, x)` 对应体素中心的物理坐标.
    pub fn index_to_physical(&self, (z, y, x): Idx3d) -> Vector3<f64> {
        let idx = Vector3::new(x as f64, y as f64, z as f64);
        self.origin + self.direction * self.spacing.component_mul(&idx)
    }

    /// 物理坐标 `p` 对应的连续索引, 按 `(x, y, z)` 排列.
    #[inline]
    pub fn physical_to_continuous_index(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.inverse * (p - self.origin)
    }

    /// 在 [`GEOMETRY_TOLERANCE`] 容差下判断两个网格的空间信息是否一致.
    pub fn approx_eq(&self, other: &Geometry) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= GEOMETRY_TOLERANCE * a.abs().max(1.0);
        self.spacing
            .iter()
            .zip(other.spacing.iter())
            .chain(self.origin.iter().zip(other.origin.iter()))
            .chain(self.direction.iter().zip(other.direction.iter()))
            .all(|(a, b)| close(*a, *b))
    }
}

/// 行优先的 3x3 单位阵.
#[inline]
pub(crate) const fn identity_rows() -> [f64; 9] {
    [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
}
