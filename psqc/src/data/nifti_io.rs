//! nii / nii.gz 单文件读写.

use std::path::Path;

use nalgebra::{Matrix3, Vector3};
use ndarray::{Array3, ArrayView3, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use super::geometry::{identity_rows, Geometry};
use crate::error::LoadError;

/// RAS 与 LPS 之间的转换 (x, y 取反).
const RAS_TO_LPS: [f64; 3] = [-1.0, -1.0, 1.0];

/// 读取 nifti 文件, 返回 `(z, y, x)` 排列的强度数组和空间信息.
///
/// 斜率与截距 (`scl_slope`, `scl_inter`) 由 `nifti` 在转换时施加.
pub(super) fn read_nifti(path: &Path) -> Result<(Array3<f32>, Geometry), LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_owned()));
    }
    let nifti_err = |source| LoadError::Nifti {
        path: path.to_owned(),
        source,
    };
    let unsupported = |reason: String| LoadError::Unsupported {
        path: path.to_owned(),
        reason,
    };

    let obj = ReaderOptions::new().read_file(path).map_err(nifti_err)?;
    let geometry = geometry_from_header(obj.header()).map_err(|e| unsupported(e.to_string()))?;

    // [W, H, z, ...]
    let mut data = obj
        .into_volume()
        .into_ndarray::<f32>()
        .map_err(nifti_err)?;
    while data.ndim() > 3 && data.shape()[data.ndim() - 1] == 1 {
        let last = data.ndim() - 1;
        data = data.index_axis_move(Axis(last), 0);
    }
    if data.ndim() == 2 {
        data = data.insert_axis(Axis(2));
    }
    let shape = data.shape().to_vec();
    let data = data
        .into_dimensionality::<Ix3>()
        .map_err(|_| unsupported(format!("expected a 3D volume, found shape {shape:?}")))?;

    // [W, H, z] -> [z, H, W].
    let data = data.permuted_axes([2, 1, 0]).as_standard_layout().into_owned();
    Ok((data, geometry))
}

/// 生成将 `(z, y, x)` 排列的数组写入 nifti 文件的函数. 空间信息写入 sform.
macro_rules! impl_write_nifti {
    ($name: ident, $t: ty) => {
        pub(super) fn $name(
            path: &Path,
            data: ArrayView3<'_, $t>,
            geometry: &Geometry,
        ) -> Result<(), LoadError> {
            let header = header_from_geometry(geometry);
            // [z, H, W] -> [W, H, z].
            let data = data.permuted_axes([2, 1, 0]);
            WriterOptions::new(path)
                .reference_header(&header)
                .write_nifti(&data)
                .map_err(|source| LoadError::Nifti {
                    path: path.to_owned(),
                    source,
                })
        }
    };
}

impl_write_nifti!(write_nifti_f32, f32);
impl_write_nifti!(write_nifti_u8, u8);

/// 按 sform > qform > pixdim 的优先级恢复空间信息, 并转换到 LPS.
fn geometry_from_header(h: &NiftiHeader) -> Result<Geometry, crate::error::GeometryError> {
    let pixdim = |i: usize| match h.pixdim[i].abs() as f64 {
        v if v > 0.0 && v.is_finite() => v,
        _ => 1.0,
    };
    let spacing = [pixdim(1), pixdim(2), pixdim(3)];

    let (rotation, origin) = if h.sform_code > 0 {
        let rows = [h.srow_x, h.srow_y, h.srow_z];
        let affine = Matrix3::from_fn(|r, c| rows[r][c] as f64);
        let mut rotation = Matrix3::identity();
        for (c, mut col) in rotation.column_iter_mut().enumerate() {
            let axis = affine.column(c);
            let norm = axis.norm();
            if norm > 0.0 {
                col.copy_from(&(axis / norm));
            }
        }
        let origin = Vector3::new(rows[0][3] as f64, rows[1][3] as f64, rows[2][3] as f64);
        (rotation, origin)
    } else if h.qform_code > 0 {
        let (b, c, d) = (
            h.quatern_b as f64,
            h.quatern_c as f64,
            h.quatern_d as f64,
        );
        let a = (1.0 - b * b - c * c - d * d).max(0.0).sqrt();
        let qfac = if h.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        #[rustfmt::skip]
        let rotation = Matrix3::new(
            a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d),         qfac * 2.0 * (b * d + a * c),
            2.0 * (b * c + a * d),         a * a + c * c - b * b - d * d, qfac * 2.0 * (c * d - a * b),
            2.0 * (b * d - a * c),         2.0 * (c * d + a * b),         qfac * (a * a + d * d - b * b - c * c),
        );
        let origin = Vector3::new(
            h.quatern_x as f64,
            h.quatern_y as f64,
            h.quatern_z as f64,
        );
        (rotation, origin)
    } else {
        (Matrix3::from_row_slice(&identity_rows()), Vector3::zeros())
    };

    let flip = Matrix3::from_diagonal(&Vector3::from(RAS_TO_LPS));
    let rotation = flip * rotation;
    let origin = flip * origin;

    let mut direction = [0.0; 9];
    for r in 0..3 {
        for c in 0..3 {
            direction[r * 3 + c] = rotation[(r, c)];
        }
    }
    Geometry::new(spacing, origin.into(), direction)
}

/// 由空间信息构造仅含 sform 的 header. 数据类型和维度由写入器填充.
fn header_from_geometry(geometry: &Geometry) -> NiftiHeader {
    let flip = Matrix3::from_diagonal(&Vector3::from(RAS_TO_LPS));
    let spacing = Vector3::from(geometry.spacing());
    let affine = flip * geometry.direction() * Matrix3::from_diagonal(&spacing);
    let origin = flip * Vector3::from(geometry.origin());

    let mut header = NiftiHeader::default();
    header.pixdim[0] = 1.0;
    for (i, s) in geometry.spacing().iter().enumerate() {
        header.pixdim[i + 1] = *s as f32;
    }
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;
    header.qform_code = 0;
    header.sform_code = 1;
    let row = |r: usize| {
        [
            affine[(r, 0)] as f32,
            affine[(r, 1)] as f32,
            affine[(r, 2)] as f32,
            origin[r] as f32,
        ]
    };
    header.srow_x = row(0);
    header.srow_y = row(1);
    header.srow_z = row(2);
    header
}

#[cfg(test)]
mod tests {
    use crate::data::{Geometry, Mask, SpatialAttr, Volume};
    use ndarray::{Array3, Array4};
    use nifti::writer::WriterOptions;
    use nifti::NiftiHeader;

    #[test]
    fn test_nifti_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.nii.gz");

        let data = Array3::from_shape_fn((3, 4, 5), |(z, y, x)| (z * 100 + y * 10 + x) as f32);
        let geometry = Geometry::new(
            [0.5, 0.75, 2.5],
            [-12.0, 30.5, 7.25],
            [0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0],
        )
        .unwrap();
        let volume = Volume::new(data, geometry);
        volume.save_nifti(&path).unwrap();

        let back = Volume::open(&path).unwrap();
        assert_eq!(back.shape(), (3, 4, 5));
        assert_eq!(back.data(), volume.data());
        assert_eq!(back[(2, 3, 4)], 234.0);
        assert!(back.geometry().approx_eq(volume.geometry()));
    }

    #[test]
    fn test_nifti_mask_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.nii");

        let mut data = Array3::<u8>::zeros((2, 3, 3));
        data[(1, 1, 1)] = 1;
        data[(1, 2, 1)] = 1;
        let mask = Mask::new(data, Geometry::default());
        mask.save_nifti(&path).unwrap();

        let back = Mask::open(&path).unwrap();
        assert_eq!(back.data(), mask.data());
        assert!(back.same_grid(&mask));
    }

    #[test]
    fn test_nifti_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Volume::open(dir.path().join("nope.nii")).unwrap_err();
        assert!(matches!(err, crate::error::LoadError::NotFound(_)));
    }

    #[test]
    fn test_nifti_qform_and_trailing_axis() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qform.nii");

        let mut header = NiftiHeader::default();
        header.sform_code = 0;
        header.qform_code = 1;
        header.pixdim = [1.0, 2.0, 3.0, 4.0, 1.0, 1.0, 1.0, 1.0];
        header.quatern_x = 10.0;
        header.quatern_y = -20.0;
        header.quatern_z = 5.0;
        // [W, H, z, t]
        let data = Array4::from_shape_fn((4, 3, 2, 1), |(x, y, z, _)| (z * 100 + y * 10 + x) as f32);
        WriterOptions::new(&path)
            .reference_header(&header)
            .write_nifti(&data)
            .unwrap();

        let back = Volume::open(&path).unwrap();
        assert_eq!(back.shape(), (2, 3, 4));
        assert_eq!(back[(1, 2, 3)], 123.0);
        let expected = Geometry::new(
            [2.0, 3.0, 4.0],
            [-10.0, 20.0, 5.0],
            [-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0],
        )
        .unwrap();
        assert!(back.geometry().approx_eq(&expected));
    }
}
