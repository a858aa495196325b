//! 目录形式的切片序列读取: DICOM 序列或二维灰度切片图像.
//!
//! 目录内的隐藏文件 (以 `.` 开头) 被忽略. 只要存在带有 `DICM` 前导码的文件,
//! 目录就按 DICOM 序列读取, 否则按 png / tif / tiff / bmp / pgm 切片读取.
//! DICOMDIR 等不含图像的 DICOM 对象被跳过.

use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use dicom_core::value::PrimitiveValue;
use dicom_core::Tag;
use dicom_dictionary_std::{tags, uids};
use dicom_object::{open_file, DefaultDicomObject};
use either::Either;
use image::{DynamicImage, GenericImageView};
use itertools::Itertools;
use nalgebra::Vector3;
use ndarray::{Array2, Array3, Axis};

use super::Geometry;
use super::Volume;
use crate::error::LoadError;

/// 支持的二维切片扩展名 (小写).
const RASTER_EXTENSIONS: [&str; 5] = ["png", "tif", "tiff", "bmp", "pgm"];

/// 仅支持未压缩的小端传输语法.
const NATIVE_TRANSFER_SYNTAXES: [&str; 2] = ["1.2.840.10008.1.2", "1.2.840.10008.1.2.1"];

/// 读取目录形式的 3D 图像.
pub fn read_series<P: AsRef<Path>>(dir: P) -> Result<Volume, LoadError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(LoadError::NotFound(dir.to_owned()));
    }
    let files = list_files(dir)?;

    let dicom_files = files
        .iter()
        .filter(|p| has_dicom_preamble(p))
        .cloned()
        .collect_vec();
    if !dicom_files.is_empty() {
        log::debug!("reading {} DICOM files from {dir:?}", dicom_files.len());
        return read_dicom_series(dir, &dicom_files);
    }

    let raster_files = files.into_iter().filter(|p| is_raster(p)).collect_vec();
    if raster_files.is_empty() {
        return Err(LoadError::EmptySeries(dir.to_owned()));
    }
    log::debug!("reading {} slice images from {dir:?}", raster_files.len());
    read_raster_series(dir, &raster_files)
}

/// 读取单个 (单帧) DICOM 文件.
pub fn read_dicom_file<P: AsRef<Path>>(path: P) -> Result<Volume, LoadError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_owned()));
    }
    read_dicom_series(path, &[path.to_owned()])
}

/// 按自然序列出目录下的非隐藏普通文件.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let io_err = |source| LoadError::Io {
        path: dir.to_owned(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by_cached_key(|p| natural_key(p));
    Ok(files)
}

/// 文件名的自然排序键: 连续数字按数值比较, 其余部分按字符串比较.
fn natural_key(path: &Path) -> Vec<Either<u64, String>> {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.chars()
        .group_by(|c| c.is_ascii_digit())
        .into_iter()
        .map(|(digit, chunk)| {
            let chunk: String = chunk.collect();
            match digit {
                true => chunk.parse::<u64>().map_or(Either::Right(chunk), Either::Left),
                false => Either::Right(chunk),
            }
        })
        .collect()
}

fn has_dicom_preamble(path: &Path) -> bool {
    let mut header = [0_u8; 132];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut header))
        .map(|_| &header[128..] == b"DICM")
        .unwrap_or(false)
}

fn is_raster(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|e| RASTER_EXTENSIONS.contains(&e.as_str()))
}

/// 二维切片序列: 单位分辨率, 零原点, 单位方向, 按文件名自然序堆叠.
fn read_raster_series(dir: &Path, files: &[PathBuf]) -> Result<Volume, LoadError> {
    let slices = files
        .iter()
        .map(|p| read_raster(p))
        .collect::<Result<Vec<_>, _>>()?;
    let shape = slices[0].dim();
    if let Some((p, s)) = files.iter().zip(&slices).find(|(_, s)| s.dim() != shape) {
        return Err(LoadError::InconsistentSeries {
            path: dir.to_owned(),
            reason: format!("{p:?} has shape {:?}, expected {shape:?}", s.dim()),
        });
    }

    let mut data = Array3::zeros((slices.len(), shape.0, shape.1));
    for (mut dst, src) in data.axis_iter_mut(Axis(0)).zip(&slices) {
        dst.assign(src);
    }
    Ok(Volume::new(data, Geometry::default()))
}

/// 读取单张灰度切片, 返回 `(y, x)` 排列的强度.
fn read_raster(path: &Path) -> Result<Array2<f32>, LoadError> {
    let img = image::open(path).map_err(|source| LoadError::Raster {
        path: path.to_owned(),
        source,
    })?;
    let (w, h) = img.dimensions();
    let (w, h) = (w as usize, h as usize);
    let pixels: Vec<f32> = match img {
        DynamicImage::ImageLuma8(img) => img.pixels().map(|p| p.0[0] as f32).collect(),
        DynamicImage::ImageLuma16(img) => img.pixels().map(|p| p.0[0] as f32).collect(),
        DynamicImage::ImageLumaA8(img) => img.pixels().map(|p| p.0[0] as f32).collect(),
        DynamicImage::ImageLumaA16(img) => img.pixels().map(|p| p.0[0] as f32).collect(),
        other => {
            return Err(LoadError::Unsupported {
                path: path.to_owned(),
                reason: format!("slice image is not grayscale ({:?})", other.color()),
            })
        }
    };
    Array2::from_shape_vec((h, w), pixels).map_err(|e| LoadError::Unsupported {
        path: path.to_owned(),
        reason: e.to_string(),
    })
}

/// 单个 DICOM 切片.
struct DicomSlice {
    path: PathBuf,
    series_uid: Option<String>,
    rows: usize,
    cols: usize,
    /// ImagePositionPatient.
    position: Option<Vector3<f64>>,
    /// ImageOrientationPatient 的行方向与列方向.
    orientation: (Vector3<f64>, Vector3<f64>),
    /// PixelSpacing: 行间距, 列间距.
    pixel_spacing: [f64; 2],
    thickness: Option<f64>,
    instance: Option<i64>,
    pixels: Vec<f32>,
}

impl DicomSlice {
    /// 读取单个切片. 不含图像的对象 (DICOMDIR, 缺少 Rows 或 PixelData) 返回 `None`.
    fn open(path: &Path) -> Result<Option<Self>, LoadError> {
        let dicom_err = |message: String| LoadError::Dicom {
            path: path.to_owned(),
            message,
        };
        let obj = open_file(path).map_err(|e| dicom_err(e.to_string()))?;
        if !is_image(&obj) {
            return Ok(None);
        }

        let ts = obj.meta().transfer_syntax().trim_end_matches('\0');
        if !NATIVE_TRANSFER_SYNTAXES.contains(&ts) {
            return Err(LoadError::Unsupported {
                path: path.to_owned(),
                reason: format!("transfer syntax {ts} is not native little endian"),
            });
        }

        let rows = tag_int(&obj, tags::ROWS).ok_or_else(|| dicom_err("missing Rows".into()))?;
        let cols =
            tag_int(&obj, tags::COLUMNS).ok_or_else(|| dicom_err("missing Columns".into()))?;
        let (rows, cols) = (rows as usize, cols as usize);

        let orientation = match tag_f64s(&obj, tags::IMAGE_ORIENTATION_PATIENT) {
            Some(v) if v.len() == 6 => (
                Vector3::new(v[0], v[1], v[2]),
                Vector3::new(v[3], v[4], v[5]),
            ),
            _ => (Vector3::x(), Vector3::y()),
        };
        let position = tag_f64s(&obj, tags::IMAGE_POSITION_PATIENT)
            .filter(|v| v.len() == 3)
            .map(|v| Vector3::new(v[0], v[1], v[2]));
        let pixel_spacing = match tag_f64s(&obj, tags::PIXEL_SPACING) {
            Some(v) if v.len() == 2 && v.iter().all(|s| *s > 0.0) => [v[0], v[1]],
            _ => [1.0, 1.0],
        };
        let thickness = tag_f64s(&obj, tags::SLICE_THICKNESS)
            .and_then(|v| v.first().copied())
            .filter(|t| *t > 0.0);
        let instance = tag_int(&obj, tags::INSTANCE_NUMBER);
        let series_uid = obj
            .element(tags::SERIES_INSTANCE_UID)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.trim_end_matches('\0').trim().to_owned())
            .filter(|s| !s.is_empty());

        let pixels = decode_pixels(&obj, rows * cols).map_err(dicom_err)?;

        Ok(Some(Self {
            path: path.to_owned(),
            series_uid,
            rows,
            cols,
            position,
            orientation,
            pixel_spacing,
            thickness,
            instance,
            pixels,
        }))
    }

    #[inline]
    fn normal(&self) -> Vector3<f64> {
        self.orientation.0.cross(&self.orientation.1)
    }
}

fn is_image(obj: &DefaultDicomObject) -> bool {
    obj.meta().media_storage_sop_class_uid() != uids::MEDIA_STORAGE_DIRECTORY_STORAGE
        && obj.element(tags::ROWS).is_ok()
        && obj.element(tags::PIXEL_DATA).is_ok()
}

fn tag_int(obj: &DefaultDicomObject, tag: Tag) -> Option<i64> {
    obj.element(tag).ok().and_then(|e| e.to_int::<i64>().ok())
}

fn tag_f64s(obj: &DefaultDicomObject, tag: Tag) -> Option<Vec<f64>> {
    let s = obj.element(tag).ok()?.to_str().ok()?;
    s.split('\\')
        .map(|v| v.trim_matches(|c: char| c.is_whitespace() || c == '\0').parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()
}

/// 解码单帧灰度像素并施加 RescaleSlope / RescaleIntercept.
fn decode_pixels(obj: &DefaultDicomObject, count: usize) -> Result<Vec<f32>, String> {
    let samples = tag_int(obj, tags::SAMPLES_PER_PIXEL).unwrap_or(1);
    if samples != 1 {
        return Err(format!("expected 1 sample per pixel, found {samples}"));
    }
    let bits = tag_int(obj, tags::BITS_ALLOCATED).unwrap_or(16);
    let signed = tag_int(obj, tags::PIXEL_REPRESENTATION).unwrap_or(0) == 1;

    let elem = obj
        .element(tags::PIXEL_DATA)
        .map_err(|_| "missing PixelData".to_owned())?;
    // 统一转换为小端字节流.
    let bytes: Vec<u8> = match elem.value().primitive() {
        Some(PrimitiveValue::U8(b)) => b.to_vec(),
        Some(PrimitiveValue::U16(w)) => w.iter().flat_map(|v| v.to_le_bytes()).collect(),
        Some(PrimitiveValue::I16(w)) => w.iter().flat_map(|v| v.to_le_bytes()).collect(),
        Some(PrimitiveValue::U32(w)) => w.iter().flat_map(|v| v.to_le_bytes()).collect(),
        Some(PrimitiveValue::I32(w)) => w.iter().flat_map(|v| v.to_le_bytes()).collect(),
        _ => return Err("PixelData is encapsulated or has an unexpected type".to_owned()),
    };

    let width = match bits {
        8 | 16 | 32 => bits as usize / 8,
        _ => return Err(format!("unsupported BitsAllocated {bits}")),
    };
    if bytes.len() < count * width {
        return Err(format!(
            "PixelData holds {} bytes, expected {}",
            bytes.len(),
            count * width
        ));
    }
    let bytes = &bytes[..count * width];
    let raw: Vec<f64> = match (width, signed) {
        (1, false) => bytes.iter().map(|b| *b as f64).collect(),
        (1, true) => bytes.iter().map(|b| *b as i8 as f64).collect(),
        (2, false) => bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]) as f64)
            .collect(),
        (2, true) => bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f64)
            .collect(),
        (_, false) => bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
            .collect(),
        (_, true) => bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
            .collect(),
    };

    let first = |tag| tag_f64s(obj, tag).and_then(|v| v.first().copied());
    let slope = first(tags::RESCALE_SLOPE).unwrap_or(1.0);
    let intercept = first(tags::RESCALE_INTERCEPT).unwrap_or(0.0);
    Ok(raw.into_iter().map(|v| (v * slope + intercept) as f32).collect())
}

/// 读取 DICOM 文件列表. 多个序列共存时只读取 SeriesInstanceUID 字典序最小的序列,
/// 没有 SeriesInstanceUID 的切片仅在所有切片都没有时被读取.
fn read_dicom_series(dir: &Path, files: &[PathBuf]) -> Result<Volume, LoadError> {
    let mut slices = Vec::with_capacity(files.len());
    for path in files {
        match DicomSlice::open(path)? {
            Some(slice) => slices.push(slice),
            None => log::debug!("skipping {path:?}, not an image object"),
        }
    }
    if slices.is_empty() {
        return Err(LoadError::EmptySeries(dir.to_owned()));
    }

    let uid = slices.iter().filter_map(|s| s.series_uid.clone()).min();
    let before = slices.len();
    slices.retain(|s| s.series_uid == uid);
    if slices.len() < before {
        log::warn!(
            "{dir:?} holds several DICOM series, reading only series {:?} ({} of {before} files)",
            uid.as_deref().unwrap_or("<none>"),
            slices.len(),
        );
    }

    let (rows, cols) = (slices[0].rows, slices[0].cols);
    if let Some(s) = slices.iter().find(|s| (s.rows, s.cols) != (rows, cols)) {
        return Err(LoadError::InconsistentSeries {
            path: dir.to_owned(),
            reason: format!(
                "{:?} is {}x{}, expected {rows}x{cols}",
                s.path, s.rows, s.cols
            ),
        });
    }

    // 沿法向的投影 > InstanceNumber > 文件名.
    let normal = slices[0].normal();
    let projection = |s: &DicomSlice| s.position.map(|p| p.dot(&normal));
    slices.sort_by(|a, b| {
        let by_position = match (projection(a), projection(b)) {
            (Some(pa), Some(pb)) => pa.partial_cmp(&pb).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        };
        by_position
            .then_with(|| a.instance.cmp(&b.instance))
            .then_with(|| natural_key(&a.path).cmp(&natural_key(&b.path)))
    });

    let first = &slices[0];
    let z_spacing = match (projection(first), slices.last().and_then(projection)) {
        (Some(p0), Some(p1)) if slices.len() > 1 && (p1 - p0).abs() > 0.0 => {
            (p1 - p0).abs() / (slices.len() - 1) as f64
        }
        _ => first.thickness.unwrap_or(1.0),
    };
    let spacing = [first.pixel_spacing[1], first.pixel_spacing[0], z_spacing];
    let (r, c) = first.orientation;
    let n = first.normal();
    #[rustfmt::skip]
    let direction = [
        r.x, c.x, n.x,
        r.y, c.y, n.y,
        r.z, c.z, n.z,
    ];
    let origin = first.position.map_or([0.0; 3], Into::into);
    let geometry =
        Geometry::new(spacing, origin, direction).map_err(|e| LoadError::InconsistentSeries {
            path: dir.to_owned(),
            reason: e.to_string(),
        })?;

    let mut data = Array3::zeros((slices.len(), rows, cols));
    for (mut dst, s) in data.axis_iter_mut(Axis(0)).zip(&slices) {
        let src = ndarray::ArrayView2::from_shape((rows, cols), &s.pixels).map_err(|e| {
            LoadError::Dicom {
                path: s.path.clone(),
                message: e.to_string(),
            }
        })?;
        dst.assign(&src);
    }
    Ok(Volume::new(data, geometry))
}
