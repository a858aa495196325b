//! 3D 图像与标注的基础数据结构, 以及各种格式的读写.

use std::ops::{Index, IndexMut};
use std::path::Path;

use ndarray::{Array3, ArrayView, ArrayViewMut, Axis, Ix3};

use crate::error::LoadError;
use crate::{Idx2d, Idx3d};

pub mod geometry;
mod nifti_io;
pub mod resample;
pub mod series;

pub use geometry::Geometry;

/// 3D 数据的共用属性和部分通用操作.
pub trait SpatialAttr {
    /// 获取空间元信息.
    fn geometry(&self) -> &Geometry;

    /// 获取数据形状大小, 按 `(z, y, x)` 排列.
    fn shape(&self) -> Idx3d;

    /// 获取数据水平切片形状大小.
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 是否存在体素个数为 0 的轴.
    #[inline]
    fn is_empty_grid(&self) -> bool {
        self.size() == 0
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率, 按 `(z, y, x)` 排列, 以毫米为单位.
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        self.geometry().spacing_zyx()
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.geometry().voxel_volume()
    }

    /// 与 `other` 是否处于同一个体素网格 (形状与空间信息均一致).
    #[inline]
    fn same_grid<T: SpatialAttr>(&self, other: &T) -> bool {
        self.shape() == other.shape() && self.geometry().approx_eq(other.geometry())
    }
}

/// 3D 标量图像 (如 T2 加权 MRI), 强度以 `f32` 保存.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    geometry: Geometry,
    data: Array3<f32>,
}

impl SpatialAttr for Volume {
    #[inline]
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for Volume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for Volume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl Volume {
    /// 由 `(z, y, x)` 排列的强度数组和空间信息直接创建图像.
    #[inline]
    pub fn new(data: Array3<f32>, geometry: Geometry) -> Self {
        Self { geometry, data }
    }

    /// 打开 nii / nii.gz 格式的单文件 3D 图像.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let (data, geometry) = nifti_io::read_nifti(path.as_ref())?;
        Ok(Self { geometry, data })
    }

    /// 将图像保存为 nii / nii.gz 文件. 是否压缩由扩展名决定.
    pub fn save_nifti<P: AsRef<Path>>(&self, path: P) -> Result<(), LoadError> {
        nifti_io::write_nifti_f32(path.as_ref(), self.data.view(), &self.geometry)
    }

    /// 获取 z 空间的第 `z_index` 层切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> ArrayView<'_, f32, ndarray::Ix2> {
        self.data.index_axis(Axis(0), z_index)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, f32, Ix3> {
        self.data.view_mut()
    }

    /// 拆分为数据与空间信息.
    #[inline]
    pub fn into_parts(self) -> (Array3<f32>, Geometry) {
        (self.data, self.geometry)
    }
}

/// 3D 分割标注, 标签值以 `u8` 保存. 任意非零标签都视为前景.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    geometry: Geometry,
    data: Array3<u8>,
}

impl SpatialAttr for Mask {
    #[inline]
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for Mask {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for Mask {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl Mask {
    /// 由 `(z, y, x)` 排列的标签数组和空间信息直接创建标注.
    #[inline]
    pub fn new(data: Array3<u8>, geometry: Geometry) -> Self {
        Self { geometry, data }
    }

    /// 将强度图像按 `u8` 饱和截断转换为标注.
    ///
    /// 负数和 NaN 变为 0, 大于 255 的值变为 255, 小数部分直接舍去.
    pub fn from_volume(volume: Volume) -> Self {
        let (data, geometry) = volume.into_parts();
        Self {
            geometry,
            data: data.mapv(|v| v as u8),
        }
    }

    /// 打开 nii / nii.gz 格式的单文件 3D 标注.
    #[inline]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        Volume::open(path).map(Self::from_volume)
    }

    /// 将标注保存为 nii / nii.gz 文件.
    pub fn save_nifti<P: AsRef<Path>>(&self, path: P) -> Result<(), LoadError> {
        nifti_io::write_nifti_u8(path.as_ref(), self.data.view(), &self.geometry)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u8, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, u8, Ix3> {
        self.data.view_mut()
    }

    /// 获取前景体素个数.
    #[inline]
    pub fn count_foreground(&self) -> usize {
        self.data.iter().filter(|p| **p != 0).count()
    }

    /// 是否不存在前景体素.
    #[inline]
    pub fn is_background(&self) -> bool {
        self.data.iter().all(|p| *p == 0)
    }

    /// 二值化: 非零标签为 `true`.
    #[inline]
    pub fn binarized(&self) -> Array3<bool> {
        self.data.mapv(|p| p != 0)
    }

    /// 按升序收集含有前景的水平切片索引.
    pub fn foreground_slices(&self) -> Vec<usize> {
        self.data
            .axis_iter(Axis(0))
            .enumerate()
            .filter_map(|(z, s)| s.iter().any(|p| *p != 0).then_some(z))
            .collect()
    }
}

/// 同一网格上的 3D 图像与对应的标注.
///
/// 该结构完全透明, 仅包含两个公开的 `image` 和 `mask` 子结构.
///
/// # 注意
///
/// 由 [`crate::prepare::prepare_data`] 创建时, 两者保证处于同一网格;
/// 直接构造时一致性由用户保证.
#[derive(Debug, Clone)]
pub struct VolumePair {
    /// 3D 图像.
    pub image: Volume,

    /// 3D 标注.
    pub mask: Mask,
}
