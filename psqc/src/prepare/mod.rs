//! 数据准备: 解析输入, 读取图像与标注, 对齐网格, 强度归一化.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::data::resample::resample_nearest;
use crate::data::series::{read_dicom_file, read_series};
use crate::data::{Mask, SpatialAttr, Volume, VolumePair};
use crate::error::{ExtractionError, GeometryError, LoadError, PsqcResult};

mod normalize;

pub use normalize::{DualReferenceNormalizer, IntensityNormalizer};

/// 3D 图像的来源.
#[derive(Debug, Clone)]
pub enum VolumeSource {
    /// 单个文件 (nii / nii.gz / dcm).
    File(PathBuf),
    /// 切片目录 (DICOM 序列或二维切片图像).
    Directory(PathBuf),
    /// 已在内存中的图像.
    InMemory(Volume),
}

/// 3D 标注的来源.
#[derive(Debug, Clone)]
pub enum MaskSource {
    /// 单个文件 (nii / nii.gz / dcm).
    File(PathBuf),
    /// 切片目录.
    Directory(PathBuf),
    /// 已在内存中的标注.
    InMemory(Mask),
}

impl VolumeSource {
    /// 由路径构造来源. 没有扩展名的路径视为目录, 否则视为单个文件.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match path.extension() {
            None => Self::Directory(path.to_owned()),
            Some(_) => Self::File(path.to_owned()),
        }
    }

    /// 读取图像.
    pub fn load(self) -> Result<Volume, LoadError> {
        match self {
            Self::File(p) => load_file(&p),
            Self::Directory(p) => load_directory(&p),
            Self::InMemory(v) => Ok(v),
        }
    }
}

impl MaskSource {
    /// 由路径构造来源. 规则同 [`VolumeSource::from_path`].
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match path.extension() {
            None => Self::Directory(path.to_owned()),
            Some(_) => Self::File(path.to_owned()),
        }
    }

    /// 读取标注. 文件中的标签值按 `u8` 饱和截断.
    pub fn load(self) -> Result<Mask, LoadError> {
        match self {
            Self::File(p) => load_file(&p).map(Mask::from_volume),
            Self::Directory(p) => load_directory(&p).map(Mask::from_volume),
            Self::InMemory(m) => Ok(m),
        }
    }
}

macro_rules! impl_from_path {
    ($source: ty) => {
        impl From<&str> for $source {
            fn from(value: &str) -> Self {
                Self::from_path(value)
            }
        }

        impl From<&Path> for $source {
            fn from(value: &Path) -> Self {
                Self::from_path(value)
            }
        }

        impl From<PathBuf> for $source {
            fn from(value: PathBuf) -> Self {
                Self::from_path(value)
            }
        }
    };
}

impl_from_path!(VolumeSource);
impl_from_path!(MaskSource);

impl From<Volume> for VolumeSource {
    fn from(value: Volume) -> Self {
        Self::InMemory(value)
    }
}

impl From<Mask> for MaskSource {
    fn from(value: Mask) -> Self {
        Self::InMemory(value)
    }
}

impl fmt::Display for VolumeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(p) | Self::Directory(p) => write!(f, "{}", p.display()),
            Self::InMemory(v) => write!(f, "<in-memory volume {:?}>", v.shape()),
        }
    }
}

impl fmt::Display for MaskSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(p) | Self::Directory(p) => write!(f, "{}", p.display()),
            Self::InMemory(m) => write!(f, "<in-memory mask {:?}>", m.shape()),
        }
    }
}

fn load_file(path: &Path) -> Result<Volume, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_owned()));
    }
    if path.is_dir() {
        return read_series(path);
    }
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if name.ends_with(".nii") || name.ends_with(".nii.gz") {
        Volume::open(path)
    } else if name.ends_with(".dcm") {
        read_dicom_file(path)
    } else {
        Err(LoadError::Unsupported {
            path: path.to_owned(),
            reason: "expected a .nii, .nii.gz or .dcm file".to_owned(),
        })
    }
}

fn load_directory(path: &Path) -> Result<Volume, LoadError> {
    if path.is_dir() {
        read_series(path)
    } else if path.is_file() {
        // 没有扩展名的普通文件按 nifti 读取.
        Volume::open(path)
    } else {
        Err(LoadError::NotFound(path.to_owned()))
    }
}

/// 读取并对齐图像与标注.
///
/// 1. 读取两者, 检查网格非空;
/// 2. 标注没有前景时报错;
/// 3. 网格不一致时将标注以最近邻插值重采样到图像网格;
/// 4. `input_normalized` 为 `false` 时以 `normalizer` 归一化图像强度.
pub fn prepare_data(
    image: VolumeSource,
    mask: MaskSource,
    input_normalized: bool,
    normalizer: &dyn IntensityNormalizer,
) -> PsqcResult<VolumePair> {
    let image = image.load()?;
    let mut mask = mask.load()?;
    if image.is_empty_grid() {
        return Err(GeometryError::EmptyGrid("image").into());
    }
    if mask.is_empty_grid() {
        return Err(GeometryError::EmptyGrid("mask").into());
    }
    log::debug!(
        "image shape {:?} spacing {:?}, mask shape {:?} spacing {:?}",
        image.shape(),
        image.geometry().spacing(),
        mask.shape(),
        mask.geometry().spacing(),
    );

    if mask.is_background() {
        return Err(ExtractionError::EmptyMask.into());
    }
    if !mask.same_grid(&image) {
        log::debug!("resampling mask onto the image grid");
        mask = resample_nearest(&mask, image.geometry(), image.shape());
        if mask.is_background() {
            return Err(GeometryError::Disjoint.into());
        }
    }

    let image = match input_normalized {
        true => image,
        false => normalizer.normalize(&image)?,
    };
    Ok(VolumePair { image, mask })
}

#[cfg(test)]
mod tests {
    use super::{prepare_data, DualReferenceNormalizer, MaskSource, VolumeSource};
    use crate::data::{Geometry, Mask, SpatialAttr, Volume};
    use crate::error::{ExtractionError, GeometryError, LoadError, PsqcError};
    use ndarray::Array3;

    fn image() -> Volume {
        let data = Array3::from_shape_fn((4, 4, 4), |(z, y, x)| (z * 16 + y * 4 + x) as f32);
        Volume::new(data, Geometry::default())
    }

    #[test]
    fn test_source_from_path() {
        assert!(matches!(VolumeSource::from("a/b/series"), VolumeSource::Directory(_)));
        assert!(matches!(VolumeSource::from("a/b/t2.nii.gz"), VolumeSource::File(_)));
        assert!(matches!(MaskSource::from("mask.nii"), MaskSource::File(_)));
    }

    #[test]
    fn test_load_missing_and_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let err = VolumeSource::from(dir.path().join("nope.nii")).load().unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
        let err = VolumeSource::from(dir.path().join("nope")).load().unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));

        let txt = dir.path().join("image.txt");
        std::fs::write(&txt, b"hello").unwrap();
        let err = VolumeSource::from(txt).load().unwrap_err();
        assert!(matches!(err, LoadError::Unsupported { .. }));
    }

    #[test]
    fn test_load_extensionless_nifti() {
        let dir = tempfile::tempdir().unwrap();
        let with_ext = dir.path().join("t2.nii");
        image().save_nifti(&with_ext).unwrap();
        let without_ext = dir.path().join("t2");
        std::fs::rename(&with_ext, &without_ext).unwrap();

        let source = VolumeSource::from(without_ext);
        assert!(matches!(source, VolumeSource::Directory(_)));
        assert_eq!(source.load().unwrap().data(), image().data());
    }

    #[test]
    fn test_prepare_empty_mask() {
        let mask = Mask::new(Array3::zeros((4, 4, 4)), Geometry::default());
        let n = DualReferenceNormalizer::default();
        let err = prepare_data(image().into(), mask.into(), true, &n).unwrap_err();
        assert!(matches!(err, PsqcError::Extraction(ExtractionError::EmptyMask)));
    }

    #[test]
    fn test_prepare_resample_and_disjoint() {
        let n = DualReferenceNormalizer::default();

        let coarse = Geometry::from_spacing([2.0, 2.0, 2.0]).unwrap();
        let mut data = Array3::<u8>::zeros((2, 2, 2));
        data[(0, 0, 0)] = 1;
        let mask = Mask::new(data, coarse);
        let pair = prepare_data(image().into(), mask.into(), true, &n).unwrap();
        assert!(pair.mask.same_grid(&pair.image));
        assert_eq!(pair.mask.count_foreground(), 1);
        assert_eq!(pair.image.data(), image().data());

        let far = Geometry::new([1.0; 3], [0.0, 0.0, 50.0], [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
            .unwrap();
        let mask = Mask::new(Array3::from_elem((2, 2, 2), 1), far);
        let err = prepare_data(image().into(), mask.into(), true, &n).unwrap_err();
        assert!(matches!(err, PsqcError::Geometry(GeometryError::Disjoint)));
    }

    #[test]
    fn test_prepare_normalizes_unless_told_not_to() {
        let n = DualReferenceNormalizer::default();
        let mask = Mask::new(Array3::from_elem((4, 4, 4), 1), Geometry::default());
        let pair = prepare_data(image().into(), mask.clone().into(), false, &n).unwrap();
        assert_ne!(pair.image.data(), image().data());
        let pair = prepare_data(image().into(), mask.into(), true, &n).unwrap();
        assert_eq!(pair.image.data(), image().data());
    }

    #[test]
    fn test_prepare_empty_grid() {
        let n = DualReferenceNormalizer::default();
        let empty = Volume::new(Array3::zeros((0, 4, 4)), Geometry::default());
        let mask = Mask::new(Array3::from_elem((4, 4, 4), 1), Geometry::default());
        let err = prepare_data(empty.into(), mask.into(), true, &n).unwrap_err();
        assert!(matches!(err, PsqcError::Geometry(GeometryError::EmptyGrid("image"))));
    }
}
